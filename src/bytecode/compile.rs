use tracing::{debug, trace};

use crate::{
    bytecode::{
        code_seq::CodeSeq,
        compile_error::CompileError,
        frame::{self, ScopeKind},
        image::{ImageLayout, ProgramImage},
        literal_pool::LiteralPool,
        op::{Instr, Reg},
        verify::verify_targets,
    },
    lang::{
        binding::{Binding, IdKind, local_offset, param_offset},
        node::{Block, ConstDef, Ident, Number, ProcDecl},
        program::Program,
    },
};

/// One translation session. Owns the literal pool, so independent sessions
/// never share data segment state.
pub struct Compiler {
    pool: LiteralPool,
    layout: ImageLayout,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self::with_layout(ImageLayout::default())
    }

    pub fn with_layout(layout: ImageLayout) -> Self {
        Self {
            pool: LiteralPool::new(),
            layout,
        }
    }

    /// Translate a whole program into an executable image.
    ///
    /// Any error aborts the translation; no partial image is produced.
    pub fn compile_program(mut self, program: &Program) -> Result<ProgramImage, CompileError> {
        let text = self
            .compile_block(&program.block, ScopeKind::Program)?
            .to_vec();

        verify_targets(&text).map_err(|e| CompileError::internal(e.to_string()))?;

        let data: Vec<i32> = self.pool.freeze().into_values().collect();
        debug!(
            instructions = text.len(),
            literals = data.len(),
            "program compiled"
        );

        ProgramImage::new(text, data, self.layout)
    }

    /// Declarations, frame entry, statements, frame exit, then release of
    /// every declared cell. The program scope also ends with the shutdown
    /// sequence.
    pub fn compile_block(&mut self, block: &Block, kind: ScopeKind) -> Result<CodeSeq, CompileError> {
        let cells = cell_count(block)?;
        let mut index = 0;

        let mut decls = CodeSeq::empty();
        for def in block.const_decls.iter().flat_map(|d| &d.defs) {
            decls = decls.concat(self.compile_const(def, index, cells)?);
            index += 1;
        }
        for name in block.var_decls.iter().flat_map(|d| &d.names) {
            check_decl(name, IdKind::Variable, index, cells)?;
            decls = decls.push(reserve()).push(Instr::Lit {
                t: Reg::Sp,
                ot: 0,
                imm: 0,
            });
            index += 1;
        }
        let procs = self.compile_procs(&block.proc_decls, index, cells)?;
        let stmts = self.compile_stmts(&block.stmts)?;

        trace!(?kind, cells, statements = block.stmts.len(), "scope compiled");

        let seq = decls
            .concat(procs)
            .concat(frame::save_frame(kind, cells)?)
            .concat(stmts)
            .concat(frame::restore_frame(kind))
            .concat(frame::deallocate(cells)?);

        Ok(match kind {
            ScopeKind::Program => seq.concat(frame::program_shutdown()),
            ScopeKind::Block | ScopeKind::Procedure => seq,
        })
    }

    /// Pool offset of a literal, ready for a `GP`-relative operand.
    pub fn literal(&mut self, number: &Number) -> Result<i16, CompileError> {
        let offset = self.pool.lookup_or_insert(&number.text, number.value);
        frame::mem_offset("literal pool offset", offset as i64)
    }

    fn compile_const(&mut self, def: &ConstDef, index: u32, cells: u32) -> Result<CodeSeq, CompileError> {
        check_decl(&def.name, IdKind::Constant, index, cells)?;
        let os = self.literal(&def.value)?;
        Ok(CodeSeq::from_instrs([
            reserve(),
            Instr::Cpw {
                t: Reg::Sp,
                ot: 0,
                s: Reg::Gp,
                os,
            },
        ]))
    }

    /// Procedure cells hold the absolute address of their body. Layout:
    ///
    /// ```text
    ///   0, 1:       SRI SP,1 ; LEA SP,0,d_0
    ///   ...
    ///   2m-2, 2m-1: SRI SP,1 ; LEA SP,0,d_(m-1)
    ///   2m:         JREL (sum of body lengths + 1)
    ///   2m+1..:     body_0, body_1, ...
    /// ```
    fn compile_procs(&mut self, procs: &[ProcDecl], first: u32, cells: u32) -> Result<CodeSeq, CompileError> {
        if procs.is_empty() {
            return Ok(CodeSeq::empty());
        }

        let mut bodies = Vec::with_capacity(procs.len());
        for (i, proc) in procs.iter().enumerate() {
            check_decl(&proc.name, IdKind::Procedure, first + i as u32, cells)?;
            bodies.push(self.compile_proc(proc)?);
        }

        let m = procs.len() as i64;
        let mut preceding = 0i64;
        let mut table = CodeSeq::empty();
        for (i, body) in bodies.iter().enumerate() {
            let lea_at = 2 * i as i64 + 1;
            let body_at = 2 * m + 1 + preceding;
            table = table.push(reserve()).push(Instr::Lea {
                t: Reg::Sp,
                ot: 0,
                off: frame::mem_offset("procedure distance", body_at - lea_at)?,
            });
            preceding += body.len() as i64;
        }

        let table = table.push(jrel(preceding + 1)?);
        Ok(bodies.into_iter().fold(table, CodeSeq::concat))
    }

    fn compile_proc(&mut self, proc: &ProcDecl) -> Result<CodeSeq, CompileError> {
        let cells = cell_count(&proc.block)?;
        let params = u32::try_from(proc.params.len()).map_err(|_| {
            CompileError::overflow("parameter count", proc.params.len() as i64, u32::MAX as i64)
        })?;

        for (j, param) in proc.params.iter().enumerate() {
            let binding = resolve(param)?;
            if binding.kind != IdKind::Variable {
                return Err(CompileError::binding_kind(
                    &param.name,
                    binding.kind,
                    "declare parameter",
                ));
            }
            check_offset(param, binding, param_offset(j as u32, params, cells))?;
        }

        let body = self.compile_block(&proc.block, ScopeKind::Procedure)?;
        trace!(name = %proc.name.name, params, instructions = body.len(), "procedure compiled");

        Ok(frame::prologue().concat(body).concat(frame::epilogue()))
    }
}

pub(crate) fn reserve() -> Instr {
    Instr::Sri { reg: Reg::Sp, imm: 1 }
}

pub(crate) fn release() -> Instr {
    Instr::Ari { reg: Reg::Sp, imm: 1 }
}

/// `JREL distance`, checked against the jump field.
pub(crate) fn jrel(distance: i64) -> Result<Instr, CompileError> {
    let off = i32::try_from(distance)
        .map_err(|_| CompileError::overflow("jump distance", distance, i32::MAX as i64))?;
    Ok(Instr::Jrel { off })
}

pub(crate) fn resolve(ident: &Ident) -> Result<Binding, CompileError> {
    ident
        .binding
        .ok_or_else(|| CompileError::unresolved(&ident.name))
}

/// Frame offset of a binding as an instruction operand.
pub(crate) fn frame_slot(binding: Binding) -> Result<i16, CompileError> {
    frame::mem_offset("frame offset", binding.offset as i64)
}

fn cell_count(block: &Block) -> Result<u32, CompileError> {
    let cells = block.declared_cells();
    u32::try_from(cells)
        .map_err(|_| CompileError::overflow("declared cells", cells as i64, u32::MAX as i64))
}

fn check_decl(ident: &Ident, kind: IdKind, index: u32, cells: u32) -> Result<(), CompileError> {
    let binding = resolve(ident)?;
    if binding.kind != kind {
        let usage = match kind {
            IdKind::Constant => "define constant",
            IdKind::Variable => "declare variable",
            IdKind::Procedure => "declare procedure",
        };
        return Err(CompileError::binding_kind(&ident.name, binding.kind, usage));
    }
    check_offset(ident, binding, local_offset(index, cells))
}

fn check_offset(ident: &Ident, binding: Binding, expected: u32) -> Result<(), CompileError> {
    if binding.levels_outward != 0 {
        return Err(CompileError::internal(format!(
            "declaration of '{}' is bound {} scopes out",
            ident.name, binding.levels_outward
        )));
    }
    if binding.offset != expected {
        return Err(CompileError::LayoutMismatch {
            name: ident.name.clone(),
            expected,
            found: binding.offset,
        });
    }
    Ok(())
}
