//! Error taxonomy for compilation and execution.
//!
//! Compile-time errors (`Lex`, `Parse`, `Resolve`) carry the span of the
//! offending source and abort the whole compile at first occurrence; there is
//! no recovery or continuation. Runtime errors carry a message only.
//!
//! The `return`/`break` control signals are *not* errors and never appear
//! here; they are internal to the VM and are caught at their defining
//! boundaries (see `ember_vm`).

use crate::span::Span;

/// A runtime failure raised by the value contract during execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    /// Human-readable description.
    pub message: String,
}

impl RuntimeError {
    /// Create a new runtime error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RuntimeError: {}", self.message)
    }
}

impl std::error::Error for RuntimeError {}

/// Any error the toolchain can surface to a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmberError {
    /// Tokenization failure.
    Lex {
        /// Description of the bad input.
        message: String,
        /// Location of the offending bytes.
        span: Span,
    },
    /// Syntactic failure.
    Parse {
        /// Description of the unexpected construct.
        message: String,
        /// Location of the offending tokens.
        span: Span,
    },
    /// Semantic failure: unresolved name, misplaced `return`/`break`,
    /// assignment to an immutable binding.
    Resolve {
        /// Description of the violation.
        message: String,
        /// Location of the offending reference.
        span: Span,
    },
    /// Execution failure, no source position.
    Runtime(RuntimeError),
}

impl EmberError {
    /// Kind tag for display and exit-code selection.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            EmberError::Lex { .. } => "LexError",
            EmberError::Parse { .. } => "ParseError",
            EmberError::Resolve { .. } => "ResolveError",
            EmberError::Runtime(_) => "RuntimeError",
        }
    }

    /// The source span, if this error has one.
    #[must_use]
    pub fn span(&self) -> Option<Span> {
        match self {
            EmberError::Lex { span, .. }
            | EmberError::Parse { span, .. }
            | EmberError::Resolve { span, .. } => Some(*span),
            EmberError::Runtime(_) => None,
        }
    }

    /// The bare message, without the kind tag.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            EmberError::Lex { message, .. }
            | EmberError::Parse { message, .. }
            | EmberError::Resolve { message, .. } => message,
            EmberError::Runtime(e) => &e.message,
        }
    }
}

impl std::fmt::Display for EmberError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind(), self.message())
    }
}

impl std::error::Error for EmberError {}

impl From<RuntimeError> for EmberError {
    fn from(e: RuntimeError) -> Self {
        EmberError::Runtime(e)
    }
}

/// Result type used across the toolchain.
pub type EmberResult<T> = Result<T, EmberError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        let lex = EmberError::Lex {
            message: "bad".into(),
            span: Span::new(0, 1),
        };
        assert_eq!(lex.kind(), "LexError");
        assert_eq!(lex.span(), Some(Span::new(0, 1)));

        let rt = EmberError::Runtime(RuntimeError::new("boom"));
        assert_eq!(rt.kind(), "RuntimeError");
        assert_eq!(rt.span(), None);
        assert_eq!(rt.to_string(), "RuntimeError: boom");
    }

    #[test]
    fn test_display_includes_message() {
        let err = EmberError::Resolve {
            message: "unresolved identifier 'foo'".into(),
            span: Span::new(4, 7),
        };
        assert_eq!(
            err.to_string(),
            "ResolveError: unresolved identifier 'foo'"
        );
    }
}
