// =============================================================================
// Expressions and conditions
// =============================================================================
//
// Expression code writes its value into the cell at SP, which the caller has
// already reserved, and leaves SP where it found it.
//
// Condition code is stack-neutral. It falls through its last instruction when
// the condition is false and skips exactly one instruction when it is true.

use crate::{
    bytecode::{
        code_seq::CodeSeq,
        compile::{Compiler, frame_slot, jrel, release, reserve, resolve},
        compile_error::CompileError,
        frame,
        op::{Alu, Instr, Reg, ZeroTest},
    },
    lang::{
        binding::IdKind,
        node::{ArithOp, Condition, Expr, RelOp},
    },
};

fn alu(op: ArithOp) -> Alu {
    match op {
        ArithOp::Add => Alu::Add,
        ArithOp::Sub => Alu::Sub,
        ArithOp::Mul => Alu::Mul,
        ArithOp::Div => Alu::Div,
    }
}

/// Branch test applied to `lhs - rhs`.
fn zero_test(op: RelOp) -> ZeroTest {
    match op {
        RelOp::Eq => ZeroTest::Eq,
        RelOp::Ne => ZeroTest::Ne,
        RelOp::Lt => ZeroTest::Ltz,
        RelOp::Le => ZeroTest::Lez,
        RelOp::Gt => ZeroTest::Gtz,
        RelOp::Ge => ZeroTest::Gez,
    }
}

impl Compiler {
    pub fn compile_expr(&mut self, expr: &Expr) -> Result<CodeSeq, CompileError> {
        match expr {
            Expr::Number(number) => Ok(CodeSeq::single(Instr::Cpw {
                t: Reg::Sp,
                ot: 0,
                s: Reg::Gp,
                os: self.literal(number)?,
            })),

            Expr::Ident(ident) => {
                let binding = resolve(ident)?;
                if binding.kind == IdKind::Procedure {
                    return Err(CompileError::binding_kind(
                        &ident.name,
                        binding.kind,
                        "use the value of",
                    ));
                }
                let os = frame_slot(binding)?;
                let (base, walk) = frame::compute_base_address(binding.levels_outward);
                Ok(walk.push(Instr::Cpw {
                    t: Reg::Sp,
                    ot: 0,
                    s: base,
                    os,
                }))
            }

            // ( -- ) rhs below lhs, result into the caller's cell two up
            Expr::Binary { op, lhs, rhs } => {
                let operands = self.compile_operands(lhs, rhs)?;
                Ok(operands
                    .push(Instr::Arith {
                        op: alu(*op),
                        t: Reg::Sp,
                        ot: 2,
                        s: Reg::Sp,
                        os: 1,
                    })
                    .push(release())
                    .push(release()))
            }

            Expr::Negate(inner) => Ok(CodeSeq::single(reserve())
                .concat(self.compile_expr(inner)?)
                .push(Instr::Neg {
                    t: Reg::Sp,
                    ot: 1,
                    s: Reg::Sp,
                    os: 0,
                })
                .push(release())),
        }
    }

    pub fn compile_cond(&mut self, cond: &Condition) -> Result<CodeSeq, CompileError> {
        match cond {
            Condition::Rel { op, lhs, rhs } => self.compile_test(Alu::Sub, zero_test(*op), lhs, rhs),

            Condition::Divisible { dividend, divisor } => {
                self.compile_test(Alu::Mod, ZeroTest::Eq, dividend, divisor)
            }

            Condition::Not(inner) => Ok(self.compile_cond(inner)?.push(Instr::Jrel { off: 2 })),

            Condition::And(lhs, rhs) => {
                let lhs = self.compile_cond(lhs)?;
                let rhs = self.compile_cond(rhs)?;
                Ok(lhs.push(jrel(rhs.len() as i64 + 1)?).concat(rhs))
            }

            Condition::Or(lhs, rhs) => {
                let lhs = self.compile_cond(lhs)?;
                let rhs = self.compile_cond(rhs)?;
                Ok(lhs
                    .push(Instr::Jrel { off: 2 })
                    .push(jrel(rhs.len() as i64 + 2)?)
                    .concat(rhs))
            }
        }
    }

    /// Evaluate `rhs` then `lhs` into two fresh cells, leaving SP on `lhs`.
    fn compile_operands(&mut self, lhs: &Expr, rhs: &Expr) -> Result<CodeSeq, CompileError> {
        let rhs = self.compile_expr(rhs)?;
        let lhs = self.compile_expr(lhs)?;
        Ok(CodeSeq::single(reserve())
            .concat(rhs)
            .push(reserve())
            .concat(lhs))
    }

    /// Combine the operands into the `rhs` cell, release both cells, then
    /// branch on the combined value, which still sits just below SP.
    fn compile_test(
        &mut self,
        combine: Alu,
        test: ZeroTest,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<CodeSeq, CompileError> {
        let operands = self.compile_operands(lhs, rhs)?;
        Ok(operands
            .push(Instr::Arith {
                op: combine,
                t: Reg::Sp,
                ot: 1,
                s: Reg::Sp,
                os: 1,
            })
            .push(release())
            .push(release())
            .push(Instr::Branch {
                test,
                s: Reg::Sp,
                os: -1,
                off: 2,
            }))
    }
}
