//! Code generation for a PL/0-family language.
//!
//! A checked [`lang::program::Program`] is translated by
//! [`bytecode::Compiler`] into a [`bytecode::ProgramImage`], which
//! [`runtime::VmBc`] can execute directly or after a trip through
//! [`bytecode::ProgramImage::to_bytes`].

pub mod bytecode;
pub mod lang;
pub mod runtime;
