use serde::{Deserialize, Serialize};

use super::binding::Binding;

/// An identifier occurrence together with its resolved binding.
///
/// `binding` is `None` only when the front end failed to resolve the name,
/// which the code generator treats as a fatal internal error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ident {
    pub name: String,
    pub binding: Option<Binding>,
}

impl Ident {
    pub fn new(name: impl Into<String>, binding: Binding) -> Self {
        Self {
            name: name.into(),
            binding: Some(binding),
        }
    }

    pub fn unresolved(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            binding: None,
        }
    }
}

/// A numeric literal as written in the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Number {
    pub text: String,
    pub value: i32,
}

impl Number {
    pub fn new(value: i32) -> Self {
        Self {
            text: value.to_string(),
            value,
        }
    }
}

/// A lexical scope: declarations followed by statements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub const_decls: Vec<ConstDecl>,
    pub var_decls: Vec<VarDecl>,
    pub proc_decls: Vec<ProcDecl>,
    pub stmts: Vec<Stmt>,
}

impl Block {
    /// Number of frame cells the block's declarations reserve.
    pub fn declared_cells(&self) -> usize {
        let consts: usize = self.const_decls.iter().map(|d| d.defs.len()).sum();
        let vars: usize = self.var_decls.iter().map(|d| d.names.len()).sum();
        consts + vars + self.proc_decls.len()
    }
}

/// `const x = 1, y = 2;`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstDecl {
    pub defs: Vec<ConstDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstDef {
    pub name: Ident,
    pub value: Number,
}

/// `var a, b;`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarDecl {
    pub names: Vec<Ident>,
}

/// `procedure p(a, b); <block>;`
///
/// Parameters are passed by value and bound as variables of the procedure's
/// own scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcDecl {
    pub name: Ident,
    pub params: Vec<Ident>,
    pub block: Block,
}

/// Arithmetic operators of binary expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Relational operators of conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl std::fmt::Display for ArithOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        };
        write!(f, "{}", s)
    }
}

impl std::fmt::Display for RelOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RelOp::Eq => "=",
            RelOp::Ne => "<>",
            RelOp::Lt => "<",
            RelOp::Le => "<=",
            RelOp::Gt => ">",
            RelOp::Ge => ">=",
        };
        write!(f, "{}", s)
    }
}

/// Statement forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stmt {
    // ──────────────────────────── Data movement ─────────────────────────
    /// `x := expr`
    ///
    /// Frame effect: `( -- )`
    Assign { target: Ident, expr: Expr },

    /// `read x`
    ///
    /// Frame effect: `( -- )`
    Read { target: Ident },

    /// `print expr`
    ///
    /// Frame effect: `( -- )`
    Print { expr: Expr },

    // ──────────────────────────── Control flow ──────────────────────────
    /// `call p(args...)`
    ///
    /// Arguments are evaluated left to right.
    Call { callee: Ident, args: Vec<Expr> },

    /// `if cond then ... else ... end`
    ///
    /// An empty `else_stmts` means there is no else branch.
    If {
        cond: Condition,
        then_stmts: Vec<Stmt>,
        else_stmts: Vec<Stmt>,
    },

    /// `while cond do ... end`
    While { cond: Condition, body: Vec<Stmt> },

    /// A nested scope with its own declarations.
    Block(Box<Block>),
}

/// Expression forms. Every expression yields one integer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expr {
    /// Literal, loaded from the literal pool.
    ///
    /// Frame effect: `( -- n )`
    Number(Number),

    /// Constant or variable reference.
    ///
    /// Frame effect: `( -- x )`
    Ident(Ident),

    /// `lhs op rhs`
    ///
    /// Frame effect: `( -- lhs op rhs )`
    Binary {
        op: ArithOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },

    /// `-expr`
    Negate(Box<Expr>),
}

impl Expr {
    pub fn number(value: i32) -> Self {
        Expr::Number(Number::new(value))
    }

    pub fn ident(name: impl Into<String>, binding: Binding) -> Self {
        Expr::Ident(Ident::new(name, binding))
    }

    pub fn binary(op: ArithOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn negate(expr: Expr) -> Self {
        Expr::Negate(Box::new(expr))
    }
}

/// Boolean conditions guarding `if` and `while`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    /// `lhs op rhs`
    Rel { op: RelOp, lhs: Expr, rhs: Expr },

    /// `divisible dividend by divisor`
    Divisible { dividend: Expr, divisor: Expr },

    /// `not cond`
    Not(Box<Condition>),

    /// `lhs and rhs`, right side evaluated only when the left holds
    And(Box<Condition>, Box<Condition>),

    /// `lhs or rhs`, right side evaluated only when the left fails
    Or(Box<Condition>, Box<Condition>),
}

impl Condition {
    pub fn rel(op: RelOp, lhs: Expr, rhs: Expr) -> Self {
        Condition::Rel { op, lhs, rhs }
    }

    pub fn not(cond: Condition) -> Self {
        Condition::Not(Box::new(cond))
    }

    pub fn and(lhs: Condition, rhs: Condition) -> Self {
        Condition::And(Box::new(lhs), Box::new(rhs))
    }

    pub fn or(lhs: Condition, rhs: Condition) -> Self {
        Condition::Or(Box::new(lhs), Box::new(rhs))
    }
}

/// Human-readable name of a statement form, used in diagnostics and traces.
pub fn stmt_kind_name(stmt: &Stmt) -> &'static str {
    match stmt {
        Stmt::Assign { .. } => "assign",
        Stmt::Read { .. } => "read",
        Stmt::Print { .. } => "print",
        Stmt::Call { .. } => "call",
        Stmt::If { .. } => "if",
        Stmt::While { .. } => "while",
        Stmt::Block(_) => "block",
    }
}
