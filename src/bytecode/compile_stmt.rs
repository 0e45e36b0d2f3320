//! Statement translation.
//!
//! Control flow is laid out without labels: each sub-sequence is translated
//! completely first, and the jumps around it are computed from its finished
//! length.

use tracing::trace;

use crate::{
    bytecode::{
        code_seq::CodeSeq,
        compile::{Compiler, frame_slot, jrel, release, reserve, resolve},
        compile_error::CompileError,
        frame::{self, ScopeKind},
        op::{Instr, Reg},
    },
    lang::{
        binding::IdKind,
        node::{Condition, Expr, Ident, Stmt, stmt_kind_name},
    },
};

impl Compiler {
    pub fn compile_stmts(&mut self, stmts: &[Stmt]) -> Result<CodeSeq, CompileError> {
        let mut seq = CodeSeq::empty();
        for stmt in stmts {
            seq = seq.concat(self.compile_stmt(stmt)?);
        }
        Ok(seq)
    }

    pub fn compile_stmt(&mut self, stmt: &Stmt) -> Result<CodeSeq, CompileError> {
        trace!(kind = stmt_kind_name(stmt), "compiling statement");

        match stmt {
            Stmt::Assign { target, expr } => self.compile_assign(target, expr),
            Stmt::Read { target } => compile_read(target),
            Stmt::Print { expr } => Ok(CodeSeq::single(reserve())
                .concat(self.compile_expr(expr)?)
                .push(Instr::Pint { s: Reg::Sp, os: 0 })
                .push(release())),
            Stmt::Call { callee, args } => self.compile_call(callee, args),
            Stmt::If {
                cond,
                then_stmts,
                else_stmts,
            } => self.compile_if(cond, then_stmts, else_stmts),
            Stmt::While { cond, body } => self.compile_while(cond, body),
            Stmt::Block(block) => self.compile_block(block, ScopeKind::Block),
        }
    }

    fn compile_assign(&mut self, target: &Ident, expr: &Expr) -> Result<CodeSeq, CompileError> {
        let value = self.compile_expr(expr)?;

        let binding = resolve(target)?;
        if binding.kind != IdKind::Variable {
            return Err(CompileError::binding_kind(
                &target.name,
                binding.kind,
                "assign to",
            ));
        }
        let ot = frame_slot(binding)?;
        let (base, walk) = frame::compute_base_address(binding.levels_outward);

        Ok(CodeSeq::single(reserve())
            .concat(value)
            .concat(walk)
            .push(Instr::Cpw {
                t: base,
                ot,
                s: Reg::Sp,
                os: 0,
            })
            .push(release()))
    }

    /// Arguments are pushed left to right, then the static link, so the
    /// first argument ends up farthest from the callee's frame pointer.
    fn compile_call(&mut self, callee: &Ident, args: &[Expr]) -> Result<CodeSeq, CompileError> {
        let binding = resolve(callee)?;
        if binding.kind != IdKind::Procedure {
            return Err(CompileError::binding_kind(&callee.name, binding.kind, "call"));
        }
        let os = frame_slot(binding)?;

        let mut seq = CodeSeq::empty();
        for arg in args {
            seq = seq.push(reserve()).concat(self.compile_expr(arg)?);
        }

        let pushed = u32::try_from(args.len() + 1)
            .map_err(|_| CompileError::overflow("argument count", args.len() as i64, u32::MAX as i64))?;
        let (base, walk) = frame::compute_base_address(binding.levels_outward);

        Ok(seq
            .concat(walk)
            .push(reserve())
            .push(Instr::Swr {
                t: Reg::Sp,
                ot: 0,
                s: base,
            })
            .push(Instr::Call { s: base, os })
            .push(Instr::Ari {
                reg: Reg::Sp,
                imm: frame::stack_adjust(pushed)?,
            }))
    }

    /// ```text
    ///   <cond>                  ; skips the next instruction when true
    ///   JREL then'+1            ; false: to else
    ///   <then>
    ///   JREL else+1             ; only when else is non-empty
    ///   <else>
    /// ```
    fn compile_if(
        &mut self,
        cond: &Condition,
        then_stmts: &[Stmt],
        else_stmts: &[Stmt],
    ) -> Result<CodeSeq, CompileError> {
        let cond = self.compile_cond(cond)?;
        let then_seq = self.compile_stmts(then_stmts)?;
        let else_seq = self.compile_stmts(else_stmts)?;

        let then_seq = if else_seq.is_empty() {
            then_seq
        } else {
            then_seq.push(jrel(else_seq.len() as i64 + 1)?)
        };

        Ok(cond
            .push(jrel(then_seq.len() as i64 + 1)?)
            .concat(then_seq)
            .concat(else_seq))
    }

    /// ```text
    ///   JREL body+1             ; enter at the condition
    ///   <body>
    ///   <cond>                  ; skips the next instruction when true
    ///   JREL 2                  ; false: leave the loop
    ///   JREL -(1+body+cond)     ; true: back to the body
    /// ```
    fn compile_while(&mut self, cond: &Condition, body: &[Stmt]) -> Result<CodeSeq, CompileError> {
        let body = self.compile_stmts(body)?;
        let cond = self.compile_cond(cond)?;

        let guard = jrel(body.len() as i64 + 1)?;
        let back = jrel(-(1 + body.len() as i64 + cond.len() as i64))?;

        Ok(CodeSeq::single(guard)
            .concat(body)
            .concat(cond)
            .push(Instr::Jrel { off: 2 })
            .push(back))
    }
}

fn compile_read(target: &Ident) -> Result<CodeSeq, CompileError> {
    let binding = resolve(target)?;
    if binding.kind != IdKind::Variable {
        return Err(CompileError::binding_kind(
            &target.name,
            binding.kind,
            "read into",
        ));
    }
    let ot = frame_slot(binding)?;
    let (base, walk) = frame::compute_base_address(binding.levels_outward);
    Ok(walk.push(Instr::Rint { t: base, ot }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::op::ZeroTest;
    use crate::lang::binding::Binding;
    use crate::lang::node::RelOp;

    fn stmts(compiler: &mut Compiler, stmts: &[Stmt]) -> Vec<Instr> {
        compiler.compile_stmts(stmts).unwrap().to_vec()
    }

    fn print(n: i32) -> Stmt {
        Stmt::Print {
            expr: Expr::number(n),
        }
    }

    fn cond() -> Condition {
        Condition::rel(RelOp::Lt, Expr::number(1), Expr::number(2))
    }

    fn cond_len() -> usize {
        Compiler::new().compile_cond(&cond()).unwrap().len()
    }

    #[test]
    fn test_if_else_distances() {
        let mut c = Compiler::new();
        let text = stmts(
            &mut c,
            &[Stmt::If {
                cond: cond(),
                then_stmts: vec![print(1)],
                else_stmts: vec![print(2), print(3)],
            }],
        );

        let lc = cond_len();
        // each print is 4 instructions
        assert_eq!(text[lc], Instr::Jrel { off: 4 + 1 + 1 });
        assert_eq!(text[lc + 1 + 4], Instr::Jrel { off: 8 + 1 });
        assert_eq!(text.len(), lc + 1 + 5 + 8);
    }

    #[test]
    fn test_if_without_else_has_no_skip() {
        let mut c = Compiler::new();
        let text = stmts(
            &mut c,
            &[Stmt::If {
                cond: cond(),
                then_stmts: vec![print(1)],
                else_stmts: vec![],
            }],
        );

        let lc = cond_len();
        assert_eq!(text[lc], Instr::Jrel { off: 5 });
        assert_eq!(text.len(), lc + 1 + 4);
        let jumps = text
            .iter()
            .filter(|i| matches!(i, Instr::Jrel { .. }))
            .count();
        assert_eq!(jumps, 1);
    }

    #[test]
    fn test_while_distances() {
        let mut c = Compiler::new();
        let text = stmts(
            &mut c,
            &[Stmt::While {
                cond: cond(),
                body: vec![print(7), print(8)],
            }],
        );

        let lc = cond_len() as i32;
        let lb = 8;
        assert_eq!(text[0], Instr::Jrel { off: lb + 1 });
        assert_eq!(
            text[(lb + lc + 1) as usize],
            Instr::Jrel { off: 2 }
        );
        assert_eq!(
            text[(lb + lc + 2) as usize],
            Instr::Jrel {
                off: -(1 + lb + lc)
            }
        );
        assert_eq!(text.len() as i32, lb + lc + 3);
    }

    #[test]
    fn test_assign_to_constant_emits_nothing() {
        let mut c = Compiler::new();
        let err = c
            .compile_stmt(&Stmt::Assign {
                target: Ident::new("k", Binding::constant(1, 0)),
                expr: Expr::number(3),
            })
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "compile error: cannot assign to 'k': it is a constant"
        );
    }

    #[test]
    fn test_assign_to_outer_variable_walks_links() {
        let mut c = Compiler::new();
        let text = stmts(
            &mut c,
            &[Stmt::Assign {
                target: Ident::new("x", Binding::variable(3, 2)),
                expr: Expr::number(1),
            }],
        );

        assert_eq!(
            &text[2..6],
            &[
                Instr::Cpr {
                    t: Reg::At,
                    s: Reg::Fp
                },
                Instr::Lwr {
                    t: Reg::At,
                    s: Reg::At,
                    os: 0
                },
                Instr::Lwr {
                    t: Reg::At,
                    s: Reg::At,
                    os: 0
                },
                Instr::Cpw {
                    t: Reg::At,
                    ot: 3,
                    s: Reg::Sp,
                    os: 0
                },
            ]
        );
    }

    #[test]
    fn test_read_targets_variable_cell() {
        let mut c = Compiler::new();
        let text = stmts(
            &mut c,
            &[Stmt::Read {
                target: Ident::new("v", Binding::variable(2, 0)),
            }],
        );
        assert_eq!(text, vec![Instr::Rint { t: Reg::Fp, ot: 2 }]);

        let err = c
            .compile_stmt(&Stmt::Read {
                target: Ident::new("p", Binding::procedure(1, 0)),
            })
            .unwrap_err();
        assert!(err.to_string().contains("cannot read into 'p'"));
    }

    #[test]
    fn test_call_pushes_args_then_static_link() {
        let mut c = Compiler::new();
        let text = stmts(
            &mut c,
            &[Stmt::Call {
                callee: Ident::new("p", Binding::procedure(4, 1)),
                args: vec![Expr::number(10), Expr::number(20)],
            }],
        );

        let tail = &text[text.len() - 4..];
        assert_eq!(
            tail,
            &[
                reserve(),
                Instr::Swr {
                    t: Reg::Sp,
                    ot: 0,
                    s: Reg::At
                },
                Instr::Call { s: Reg::At, os: 4 },
                Instr::Ari { reg: Reg::Sp, imm: 3 },
            ]
        );
        assert_eq!(text[0], reserve());
        assert_eq!(text[2], reserve());
    }

    #[test]
    fn test_calling_a_variable_is_rejected() {
        let mut c = Compiler::new();
        let err = c
            .compile_stmt(&Stmt::Call {
                callee: Ident::new("v", Binding::variable(1, 0)),
                args: vec![],
            })
            .unwrap_err();
        assert!(matches!(
            err,
            CompileError::BindingKind {
                found: IdKind::Variable,
                usage: "call",
                ..
            }
        ));
    }

    #[test]
    fn test_condition_branch_reads_released_cell() {
        let mut c = Compiler::new();
        let seq = c.compile_cond(&cond()).unwrap().to_vec();
        assert_eq!(
            seq.last(),
            Some(&Instr::Branch {
                test: ZeroTest::Ltz,
                s: Reg::Sp,
                os: -1,
                off: 2
            })
        );
    }
}
