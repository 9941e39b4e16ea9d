//! The ember compiler: desugaring, resolution, tail-call analysis and
//! bytecode generation.
//!
//! The pipeline is a sequence of synchronous, total passes over immutable
//! trees:
//!
//! ```text
//! AST ── desugar (placeholders → pipeline → pattern params)
//!     ── resolve (two-phase lexical validation)
//!     ── generate (single walk, one code unit)
//! ```
//!
//! Compilation is single-threaded and purely functional over its inputs; a
//! compile either produces an immutable [`bytecode::CodeUnit`] or fails with
//! the first compile-time error.

pub mod analysis;
pub mod bytecode;
pub mod codegen;
pub mod desugar;
pub mod scope;
pub mod tailcall;

use bytecode::CodeUnit;
use ember_core::EmberResult;
use ember_parser::ast::Program;
use std::sync::Arc;

/// Compile a parsed program into an executable code unit.
pub fn compile(program: Program) -> EmberResult<Arc<CodeUnit>> {
    let program = desugar::desugar(program);
    scope::resolve(&program)?;
    Ok(Arc::new(codegen::generate(&program)))
}

/// Parse and compile source text.
pub fn compile_source(source: &str) -> EmberResult<Arc<CodeUnit>> {
    compile(ember_parser::parse(source)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_source_end_to_end() {
        let unit = compile_source("let inc = _ + 1; inc(5)").expect("compile error");
        assert!(!unit.main.instructions.is_empty());
        assert_eq!(unit.functions.len(), 1);
    }

    #[test]
    fn test_compile_surfaces_resolve_errors() {
        let err = compile_source("missing").unwrap_err();
        assert_eq!(err.kind(), "ResolveError");
    }

    #[test]
    fn test_compile_surfaces_parse_errors() {
        let err = compile_source("let = ").unwrap_err();
        assert_eq!(err.kind(), "ParseError");
    }
}
