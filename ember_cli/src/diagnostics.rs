//! Source-mapped error diagnostics with caret display.
//!
//! Translates `Span` byte offsets into line:column positions and renders
//! error messages against the original source with caret/tilde underlines.

use ember_core::Span;

// =============================================================================
// Source Map
// =============================================================================

/// Pre-computed line offset table for O(log n) span-to-position lookup.
///
/// Built once per source file; lookups binary-search the line starts.
#[derive(Debug, Clone)]
pub struct SourceMap {
    /// Byte offsets of each line start (always starts with 0).
    line_starts: Vec<usize>,
    /// The original source text.
    source: String,
    /// Filename for display.
    filename: String,
}

/// A resolved source position (1-indexed line, 0-indexed column).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePosition {
    /// 1-indexed line number.
    pub line: usize,
    /// 0-indexed column (byte offset from line start).
    pub column: usize,
}

impl SourceMap {
    /// Build a source map from source text and filename.
    pub fn new(source: &str, filename: &str) -> Self {
        let mut line_starts = vec![0usize];
        for (i, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self {
            line_starts,
            source: source.to_string(),
            filename: filename.to_string(),
        }
    }

    /// Resolve a byte offset to a source position.
    #[inline]
    pub fn resolve(&self, offset: usize) -> SourcePosition {
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(insert) => insert.saturating_sub(1),
        };
        let column = offset.saturating_sub(self.line_starts[line_idx]);
        SourcePosition {
            line: line_idx + 1,
            column,
        }
    }

    /// Get the text of a line (1-indexed), without its trailing newline.
    pub fn line_text(&self, line: usize) -> Option<&str> {
        if line == 0 || line > self.line_starts.len() {
            return None;
        }
        let start = self.line_starts[line - 1];
        let end = if line < self.line_starts.len() {
            self.line_starts[line]
        } else {
            self.source.len()
        };
        let text = &self.source[start..end];
        Some(text.trim_end_matches('\n').trim_end_matches('\r'))
    }

    /// Get the filename.
    #[inline]
    pub fn filename(&self) -> &str {
        &self.filename
    }
}

// =============================================================================
// Error Rendering
// =============================================================================

/// Render an error with source context and a caret underline:
///
/// ```text
///   file "solution.mb", line 3
///     let x = undefined_name
///             ~~~~~~^~~~~~~~
/// ResolveError: unresolved identifier `undefined_name`
/// ```
pub fn render_source_error(
    source_map: &SourceMap,
    span: Span,
    error_kind: &str,
    message: &str,
) -> String {
    let mut output = String::with_capacity(256);

    let pos = source_map.resolve(span.start as usize);
    let end_pos = source_map.resolve((span.end.saturating_sub(1).max(span.start)) as usize);

    output.push_str(&format!(
        "  file \"{}\", line {}\n",
        source_map.filename(),
        pos.line,
    ));

    if let Some(line_text) = source_map.line_text(pos.line) {
        output.push_str(&format!("    {line_text}\n"));

        let caret_start = pos.column;
        let caret_end = if pos.line == end_pos.line {
            end_pos.column + 1
        } else {
            line_text.len()
        };
        let caret_len = caret_end.saturating_sub(caret_start).max(1);

        output.push_str("    ");
        for _ in 0..caret_start {
            output.push(' ');
        }
        if caret_len == 1 {
            output.push('^');
        } else {
            let mid = caret_len / 2;
            for i in 0..caret_len {
                output.push(if i == mid { '^' } else { '~' });
            }
        }
        output.push('\n');
    }

    output.push_str(&format!("{error_kind}: {message}"));
    output
}

/// Render an error without a source position.
pub fn render_simple_error(error_kind: &str, message: &str) -> String {
    format!("{error_kind}: {message}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_map_lines() {
        let sm = SourceMap::new("line1\nline2\nline3", "test.mb");
        assert_eq!(sm.line_text(1), Some("line1"));
        assert_eq!(sm.line_text(3), Some("line3"));
        assert_eq!(sm.line_text(4), None);
    }

    #[test]
    fn test_resolve_positions() {
        let sm = SourceMap::new("hello\nworld", "test.mb");
        assert_eq!(sm.resolve(0), SourcePosition { line: 1, column: 0 });
        assert_eq!(sm.resolve(3), SourcePosition { line: 1, column: 3 });
        assert_eq!(sm.resolve(6), SourcePosition { line: 2, column: 0 });
        assert_eq!(sm.resolve(8), SourcePosition { line: 2, column: 2 });
    }

    #[test]
    fn test_render_source_error() {
        let sm = SourceMap::new("let x = missing", "test.mb");
        let output = render_source_error(
            &sm,
            Span::new(8, 15),
            "ResolveError",
            "unresolved identifier `missing`",
        );
        assert!(output.contains("file \"test.mb\", line 1"));
        assert!(output.contains("let x = missing"));
        assert!(output.contains('^'));
        assert!(output.contains("ResolveError: unresolved identifier `missing`"));
    }

    #[test]
    fn test_render_second_line() {
        let sm = SourceMap::new("let a = 1\nlet b = nope", "test.mb");
        let output = render_source_error(&sm, Span::new(18, 22), "ResolveError", "nope");
        assert!(output.contains("line 2"));
        assert!(output.contains("let b = nope"));
    }

    #[test]
    fn test_render_simple_error() {
        assert_eq!(
            render_simple_error("RuntimeError", "division by zero"),
            "RuntimeError: division by zero"
        );
    }
}
