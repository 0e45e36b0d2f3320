use serde::{Deserialize, Serialize};

use super::node::Block;

/// Checked PL/0 program, as handed over by the front end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    /// The outermost scope.
    pub block: Block,
}

impl Program {
    pub fn new(block: Block) -> Self {
        Self { block }
    }

    /// Encode the program in the postcard interchange format the front end
    /// writes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Decode a program written by the front end. Unknown node tags and
    /// truncated input are rejected here, before code generation starts.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::binding::Binding;
    use crate::lang::node::{Condition, Expr, Ident, RelOp, Stmt, VarDecl};

    fn sample() -> Program {
        Program::new(Block {
            var_decls: vec![VarDecl {
                names: vec![Ident::new("x", Binding::variable(1, 0))],
            }],
            stmts: vec![Stmt::While {
                cond: Condition::rel(
                    RelOp::Lt,
                    Expr::ident("x", Binding::variable(1, 0)),
                    Expr::number(3),
                ),
                body: vec![Stmt::Print {
                    expr: Expr::ident("x", Binding::variable(1, 0)),
                }],
            }],
            ..Block::default()
        })
    }

    #[test]
    fn test_interchange_format_reads_back_same_tree() {
        let program = sample();
        let bytes = program.to_bytes().unwrap();
        assert_eq!(Program::from_bytes(&bytes).unwrap(), program);
    }

    #[test]
    fn test_truncated_input_is_rejected() {
        let bytes = sample().to_bytes().unwrap();
        assert!(Program::from_bytes(&bytes[..bytes.len() / 2]).is_err());
    }

    #[test]
    fn test_unknown_statement_tag_is_rejected() {
        // empty const, var and proc lists, then one statement tagged 42
        let bytes = [0u8, 0, 0, 1, 42];
        assert!(Program::from_bytes(&bytes).is_err());
    }
}
