//! Property tests for the code generator, checked by running the VM
//!
//! Random expression and condition trees are compiled into complete programs
//! and executed. The printed results must agree with a direct evaluation of
//! the tree, and compiling the same tree twice must give identical images.

use pl0gen::bytecode::{Compiler, ProgramImage, op::WORD_WIDTH, op::Reg};
use pl0gen::lang::{
    node::{ArithOp, Block, Condition, Expr, Ident, RelOp, Stmt, VarDecl},
    program::Program,
    resolve::resolve_program,
};
use pl0gen::runtime::{RuntimeError, VmBc};
use proptest::prelude::*;

// =============================================================================
// STRATEGY GENERATORS
// =============================================================================

fn arith_op() -> impl Strategy<Value = ArithOp> {
    prop_oneof![
        Just(ArithOp::Add),
        Just(ArithOp::Sub),
        Just(ArithOp::Mul),
        Just(ArithOp::Div),
    ]
}

fn rel_op() -> impl Strategy<Value = RelOp> {
    prop_oneof![
        Just(RelOp::Eq),
        Just(RelOp::Ne),
        Just(RelOp::Lt),
        Just(RelOp::Le),
        Just(RelOp::Gt),
        Just(RelOp::Ge),
    ]
}

/// Arithmetic over small literals, division by zero included
fn expr_tree() -> impl Strategy<Value = Expr> {
    let leaf = (-50i32..50).prop_map(Expr::number);
    leaf.prop_recursive(4, 32, 2, |inner| {
        prop_oneof![
            (arith_op(), inner.clone(), inner.clone()).prop_map(|(op, l, r)| Expr::binary(op, l, r)),
            inner.prop_map(Expr::negate),
        ]
    })
}

/// Conditions whose operands stay far from overflow
fn cond_tree() -> impl Strategy<Value = Condition> {
    let rel = (rel_op(), -20i32..20, -20i32..20)
        .prop_map(|(op, a, b)| Condition::rel(op, Expr::number(a), Expr::number(b)));
    let divisible = (-30i32..30, 1i32..7).prop_map(|(a, b)| Condition::Divisible {
        dividend: Expr::number(a),
        divisor: Expr::number(b),
    });

    prop_oneof![rel, divisible].prop_recursive(4, 24, 2, |inner| {
        prop_oneof![
            inner.clone().prop_map(Condition::not),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| Condition::and(a, b)),
            (inner.clone(), inner).prop_map(|(a, b)| Condition::or(a, b)),
        ]
    })
}

// =============================================================================
// REFERENCE EVALUATION
// =============================================================================

/// `None` when some division has a zero divisor
fn eval(expr: &Expr) -> Option<i32> {
    match expr {
        Expr::Number(n) => Some(n.value),
        Expr::Ident(_) => None,
        Expr::Binary { op, lhs, rhs } => {
            let (l, r) = (eval(lhs)?, eval(rhs)?);
            match op {
                ArithOp::Add => Some(l.wrapping_add(r)),
                ArithOp::Sub => Some(l.wrapping_sub(r)),
                ArithOp::Mul => Some(l.wrapping_mul(r)),
                ArithOp::Div if r == 0 => None,
                ArithOp::Div => Some(l.wrapping_div(r)),
            }
        }
        Expr::Negate(inner) => eval(inner).map(i32::wrapping_neg),
    }
}

fn holds(cond: &Condition) -> bool {
    match cond {
        Condition::Rel { op, lhs, rhs } => {
            let (l, r) = (eval(lhs).unwrap(), eval(rhs).unwrap());
            match op {
                RelOp::Eq => l == r,
                RelOp::Ne => l != r,
                RelOp::Lt => l < r,
                RelOp::Le => l <= r,
                RelOp::Gt => l > r,
                RelOp::Ge => l >= r,
            }
        }
        Condition::Divisible { dividend, divisor } => {
            eval(dividend).unwrap() % eval(divisor).unwrap() == 0
        }
        Condition::Not(inner) => !holds(inner),
        Condition::And(a, b) => holds(a) && holds(b),
        Condition::Or(a, b) => holds(a) || holds(b),
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn compile(block: Block) -> ProgramImage {
    let mut program = Program::new(block);
    resolve_program(&mut program).unwrap();
    Compiler::new().compile_program(&program).unwrap()
}

fn run(image: &ProgramImage) -> (Result<i32, RuntimeError>, String, VmBc) {
    let mut vm = VmBc::new();
    let mut out = Vec::new();
    let result = vm.run(image, &mut "".as_bytes(), &mut out);
    (result, String::from_utf8(out).unwrap(), vm)
}

fn print_block(expr: Expr) -> Block {
    Block {
        stmts: vec![Stmt::Print { expr }],
        ..Block::default()
    }
}

fn choose_block(cond: Condition) -> Block {
    Block {
        stmts: vec![Stmt::If {
            cond,
            then_stmts: vec![Stmt::Print { expr: Expr::number(1) }],
            else_stmts: vec![Stmt::Print { expr: Expr::number(0) }],
        }],
        ..Block::default()
    }
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn expressions_evaluate_like_the_tree(expr in expr_tree()) {
        let expected = eval(&expr);
        let image = compile(print_block(expr));
        let (result, out, _) = run(&image);

        match expected {
            Some(v) => {
                prop_assert_eq!(result, Ok(0));
                prop_assert_eq!(out, format!("{}\n", v));
            }
            None => {
                let divided_by_zero = matches!(result, Err(RuntimeError::DivisionByZero { .. }));
                prop_assert!(divided_by_zero, "expected division by zero, got {:?}", result);
            }
        }
    }

    #[test]
    fn conditions_choose_the_right_branch(cond in cond_tree()) {
        let expected = if holds(&cond) { "1\n" } else { "0\n" };
        let image = compile(choose_block(cond));
        let (result, out, vm) = run(&image);

        prop_assert_eq!(result, Ok(0));
        prop_assert_eq!(out, expected);

        let bottom = (image.header().stack_bottom as usize / WORD_WIDTH) as i32;
        prop_assert_eq!(vm.reg(Reg::Sp), bottom);
    }

    #[test]
    fn compilation_is_deterministic(cond in cond_tree(), expr in expr_tree()) {
        let block = Block {
            stmts: vec![Stmt::While {
                cond,
                body: vec![Stmt::Print { expr }],
            }],
            ..Block::default()
        };
        let program = Program::new(block);

        let a = Compiler::new().compile_program(&program).unwrap();
        let b = Compiler::new().compile_program(&program).unwrap();
        prop_assert_eq!(a.to_bytes(), b.to_bytes());
    }

    #[test]
    fn loops_sum_a_range(k in 0i32..40) {
        let id = |name: &str| Expr::Ident(Ident::unresolved(name));
        let assign = |name: &str, expr: Expr| Stmt::Assign {
            target: Ident::unresolved(name),
            expr,
        };

        let image = compile(Block {
            var_decls: vec![VarDecl {
                names: vec![Ident::unresolved("i"), Ident::unresolved("s")],
            }],
            stmts: vec![
                Stmt::While {
                    cond: Condition::rel(RelOp::Lt, id("i"), Expr::number(k)),
                    body: vec![
                        assign("i", Expr::binary(ArithOp::Add, id("i"), Expr::number(1))),
                        assign("s", Expr::binary(ArithOp::Add, id("s"), id("i"))),
                    ],
                },
                Stmt::Print { expr: id("s") },
            ],
            ..Block::default()
        });

        let (result, out, _) = run(&image);
        prop_assert_eq!(result, Ok(0));
        prop_assert_eq!(out, format!("{}\n", k * (k + 1) / 2));
    }
}
