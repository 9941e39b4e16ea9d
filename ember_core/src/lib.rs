//! Core definitions shared across the ember toolchain.
//!
//! This crate is deliberately small: source spans and the error taxonomy.
//! Everything else (AST, bytecode, values) lives in the crate that owns it.

pub mod error;
pub mod span;

pub use error::{EmberError, EmberResult, RuntimeError};
pub use span::Span;

/// Toolchain version, surfaced by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
