use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("runtime error: image rejected: {0}")]
    Load(String),

    #[error("runtime error: address {addr} out of range at pc={pc}")]
    AddressOutOfRange { pc: usize, addr: i64 },

    #[error("runtime error: stack overflow at pc={pc} (sp={sp})")]
    StackOverflow { pc: usize, sp: i64 },

    #[error("runtime error: jump to {target} outside the program")]
    PcOutOfRange { target: i64 },

    #[error("runtime error: division by zero at pc={pc}")]
    DivisionByZero { pc: usize },

    #[error("runtime error: expected an integer, read {input:?} at pc={pc}")]
    BadInput { pc: usize, input: String },

    #[error("runtime error: input exhausted at pc={pc}")]
    EndOfInput { pc: usize },

    #[error("runtime error: execution step limit exceeded ({0})")]
    StepLimit(u64),

    #[error("runtime error: i/o failure: {0}")]
    Io(String),
}

impl From<std::io::Error> for RuntimeError {
    fn from(e: std::io::Error) -> Self {
        RuntimeError::Io(e.to_string())
    }
}
