//! Activation-record code fragments.
//!
//! Every scope (the program, a nested block, a procedure body) owns a frame:
//! the cells its declarations reserve plus a link cell at `FP+0` holding the
//! frame pointer of the lexically enclosing scope. These helpers produce the
//! fixed instruction sequences that build and tear down such frames.

use crate::bytecode::{
    code_seq::CodeSeq,
    compile_error::CompileError,
    op::{Instr, Reg},
};

/// Which kind of scope a frame belongs to. Procedure frames find their
/// static link above the saved registers instead of in `FP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Program,
    Block,
    Procedure,
}

/// Cells between a procedure's declared cells and its static link: the saved
/// frame pointer and the saved return address.
const SAVED_REGS: u32 = 2;

pub fn mem_offset(what: &'static str, offset: i64) -> Result<i16, CompileError> {
    i16::try_from(offset).map_err(|_| CompileError::overflow(what, offset, i16::MAX as i64))
}

pub fn stack_adjust(cells: u32) -> Result<u16, CompileError> {
    u16::try_from(cells)
        .map_err(|_| CompileError::overflow("stack adjustment", cells as i64, u16::MAX as i64))
}

fn reserve() -> Instr {
    Instr::Sri { reg: Reg::Sp, imm: 1 }
}

fn release() -> Instr {
    Instr::Ari { reg: Reg::Sp, imm: 1 }
}

/// Push the link cell and make it the new frame. `cells` is the number of
/// cells the scope has already reserved.
pub fn save_frame(kind: ScopeKind, cells: u32) -> Result<CodeSeq, CompileError> {
    let link = match kind {
        ScopeKind::Program | ScopeKind::Block => Instr::Swr {
            t: Reg::Sp,
            ot: 0,
            s: Reg::Fp,
        },
        ScopeKind::Procedure => Instr::Cpw {
            t: Reg::Sp,
            ot: 0,
            s: Reg::Sp,
            os: mem_offset("static link offset", cells as i64 + SAVED_REGS as i64 + 1)?,
        },
    };

    Ok(CodeSeq::from_instrs([
        reserve(),
        link,
        Instr::Cpr {
            t: Reg::Fp,
            s: Reg::Sp,
        },
    ]))
}

/// Pop the link cell. Program and block frames also restore `FP` from it;
/// a procedure's caller frame pointer is restored by the epilogue instead.
pub fn restore_frame(kind: ScopeKind) -> CodeSeq {
    let unwind = CodeSeq::single(Instr::Cpr {
        t: Reg::Sp,
        s: Reg::Fp,
    });
    match kind {
        ScopeKind::Program | ScopeKind::Block => unwind
            .push(Instr::Lwr {
                t: Reg::Fp,
                s: Reg::Sp,
                os: 0,
            })
            .push(release()),
        ScopeKind::Procedure => unwind.push(release()),
    }
}

/// Load the frame pointer of the scope `levels_outward` static links away.
///
/// Returns the register holding the address together with the code that
/// computes it. The current frame needs no code.
pub fn compute_base_address(levels_outward: u32) -> (Reg, CodeSeq) {
    if levels_outward == 0 {
        return (Reg::Fp, CodeSeq::empty());
    }

    let mut seq = CodeSeq::single(Instr::Cpr {
        t: Reg::At,
        s: Reg::Fp,
    });
    for _ in 0..levels_outward {
        seq = seq.push(Instr::Lwr {
            t: Reg::At,
            s: Reg::At,
            os: 0,
        });
    }
    (Reg::At, seq)
}

/// Release `cells` stack cells.
pub fn deallocate(cells: u32) -> Result<CodeSeq, CompileError> {
    if cells == 0 {
        return Ok(CodeSeq::empty());
    }
    Ok(CodeSeq::single(Instr::Ari {
        reg: Reg::Sp,
        imm: stack_adjust(cells)?,
    }))
}

pub fn program_shutdown() -> CodeSeq {
    CodeSeq::single(Instr::Exit { code: 0 })
}

/// Save the return address and the caller's frame pointer on entry to a
/// procedure body.
pub fn prologue() -> CodeSeq {
    CodeSeq::from_instrs([
        reserve(),
        Instr::Swr {
            t: Reg::Sp,
            ot: 0,
            s: Reg::Ra,
        },
        reserve(),
        Instr::Swr {
            t: Reg::Sp,
            ot: 0,
            s: Reg::Fp,
        },
    ])
}

pub fn epilogue() -> CodeSeq {
    CodeSeq::from_instrs([
        Instr::Lwr {
            t: Reg::Fp,
            s: Reg::Sp,
            os: 0,
        },
        release(),
        Instr::Lwr {
            t: Reg::Ra,
            s: Reg::Sp,
            os: 0,
        },
        release(),
        Instr::Rtn,
    ])
}
