use thiserror::Error;

use crate::lang::binding::IdKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// The front end handed over an identifier without a binding.
    #[error("compile error: identifier '{name}' was never resolved")]
    Unresolved { name: String },

    /// An identifier is used in a way its declaration does not allow.
    #[error("compile error: cannot {usage} '{name}': it is a {found}")]
    BindingKind {
        name: String,
        found: IdKind,
        usage: &'static str,
    },

    /// A frame offset, distance or segment size does not fit its field.
    #[error("compile error: {what} of {value} exceeds the limit of {limit}")]
    CapacityOverflow {
        what: &'static str,
        value: i64,
        limit: i64,
    },

    /// A declaration's binding disagrees with the frame layout.
    #[error("compile error: '{name}' is bound at frame offset {found}, expected {expected}")]
    LayoutMismatch {
        name: String,
        expected: u32,
        found: u32,
    },

    /// Internal compiler error (shouldn't happen in normal use)
    #[error("compile error: internal error: {0}")]
    Internal(String),
}

impl CompileError {
    pub fn unresolved(name: &str) -> Self {
        CompileError::Unresolved {
            name: name.to_string(),
        }
    }

    pub fn binding_kind(name: &str, found: IdKind, usage: &'static str) -> Self {
        CompileError::BindingKind {
            name: name.to_string(),
            found,
            usage,
        }
    }

    pub fn overflow(what: &'static str, value: i64, limit: i64) -> Self {
        CompileError::CapacityOverflow { what, value, limit }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        CompileError::Internal(msg.into())
    }
}
