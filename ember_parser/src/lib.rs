//! Lexer, AST definitions and parser for the ember language.
//!
//! The parser produces an immutable, span-carrying AST; all semantic
//! validation (name resolution, `return`/`break` placement) happens later in
//! `ember_compiler`. Syntax errors abort at the first offence.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

use ember_core::EmberResult;

/// Parse source text into a program AST.
pub fn parse(source: &str) -> EmberResult<ast::Program> {
    let tokens = lexer::Lexer::new(source).tokenize()?;
    parser::Parser::new(tokens).parse_program()
}
