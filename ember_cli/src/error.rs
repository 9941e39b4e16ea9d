//! Error formatting and exit-code handling.

use crate::diagnostics::{self, SourceMap};
use ember_core::EmberError;
use std::process::ExitCode;

// =============================================================================
// Exit Codes
// =============================================================================

/// Successful execution.
pub const EXIT_SUCCESS: u8 = 0;
/// Compile or runtime failure.
pub const EXIT_ERROR: u8 = 1;
/// Command-line usage error.
pub const EXIT_USAGE_ERROR: u8 = 2;

// =============================================================================
// Error Formatting
// =============================================================================

/// Format an error against its source, print to stderr, return the exit
/// code.
pub fn report(error: &EmberError, source: Option<&str>, filename: &str) -> ExitCode {
    eprintln!("{}", format_error_string(error, source, filename));
    ExitCode::from(EXIT_ERROR)
}

/// Format an error into a string (separated out for testing).
pub fn format_error_string(error: &EmberError, source: Option<&str>, filename: &str) -> String {
    match (error.span(), source) {
        (Some(span), Some(src)) => {
            let source_map = SourceMap::new(src, filename);
            diagnostics::render_source_error(&source_map, span, error.kind(), error.message())
        }
        _ => diagnostics::render_simple_error(error.kind(), error.message()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_error_renders_with_context() {
        let err = ember_compiler::compile_source("let x = missing_name").unwrap_err();
        let output = format_error_string(&err, Some("let x = missing_name"), "t.mb");
        assert!(output.contains("ResolveError"));
        assert!(output.contains("missing_name"));
        assert!(output.contains("t.mb"));
    }

    #[test]
    fn test_runtime_error_renders_without_context() {
        let err = ember_vm::eval("1 / 0").unwrap_err();
        let output = format_error_string(&err, Some("1 / 0"), "t.mb");
        assert_eq!(output, "RuntimeError: division by zero");
    }
}
