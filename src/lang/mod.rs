//! # PL/0 Abstract Syntax Tree
//!
//! This module defines the checked Abstract Syntax Tree consumed by the code
//! generator. The tree is produced by the front end (scanner, parser, scope
//! checker, type checker) and handed over with every identifier already
//! resolved to a [`binding::Binding`]. Trees built by hand (tests, the demo
//! program) can get their bindings from [`resolve::resolve_program`].
//!
//! ## Documentation conventions
//!
//! - Frame effects are written as `( before -- after )` over the evaluation
//!   stack, top of stack on the right.
//! - "Cell" means one machine word of stack or data memory.

pub mod binding;
pub mod node;
pub mod program;
pub mod resolve;
