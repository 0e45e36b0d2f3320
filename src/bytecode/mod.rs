pub mod code_seq;
pub mod compile;
pub mod compile_error;
pub mod compile_expr;
pub mod compile_stmt;
pub mod disasm;
pub mod frame;
pub mod image;
pub mod literal_pool;
pub mod op;
pub mod verify;

pub use code_seq::CodeSeq;
pub use compile::Compiler;
pub use compile_error::CompileError;
pub use image::{ImageLayout, ProgramImage};
pub use op::Instr;
