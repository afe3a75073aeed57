use std::fmt;

use thiserror::Error;

/// A malformed token sequence. Parsing stops at the first one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[parser] line {line}:{column}: expected {expected}, found {found}")]
pub struct ParseError {
    pub expected: String,
    pub found: String,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    pub fn new(expected: impl Into<String>, found: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            expected: expected.into(),
            found: found.into(),
            line,
            column,
        }
    }
}

/// Failure to recover an action body from raw source text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("[extract] no '{{' found on line {line}")]
    PositionNotFound { line: usize },
    #[error("[extract] line {line}:{column}: block opened here is never closed (depth {depth} at end of input)")]
    UnbalancedDelimiters {
        offset: usize,
        line: usize,
        column: usize,
        depth: usize,
    },
}

/// Anything that can go wrong turning one source text into a syntax tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

impl SyntaxError {
    pub fn line(&self) -> usize {
        match self {
            SyntaxError::Parse(e) => e.line,
            SyntaxError::Extract(ExtractError::PositionNotFound { line } | ExtractError::UnbalancedDelimiters { line, .. }) => *line,
        }
    }

    /// Format the error with the offending source line underneath.
    pub fn format_with_source(&self, source: &str) -> String {
        let line = self.line();
        match source.lines().nth(line.saturating_sub(1)) {
            Some(text) => format!("{self}\n  {line:>4} | {text}"),
            None => self.to_string(),
        }
    }
}

/// 1-based line and column of a byte offset.
pub(crate) fn offset_to_line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for (i, ch) in source.char_indices() {
        if i >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

/// Short human description of a token for "expected X, found Y" messages.
pub(crate) struct Found<'a> {
    pub kind: &'a str,
    pub text: &'a str,
}

impl fmt::Display for Found<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.text.is_empty() {
            f.write_str(self.kind)
        } else {
            write!(f, "{} `{}`", self.kind, self.text)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn line_col_counts_newlines() {
        assert_eq!(offset_to_line_col("ab\ncd", 0), (1, 1));
        assert_eq!(offset_to_line_col("ab\ncd", 4), (2, 2));
    }

    #[test]
    fn parse_error_display() {
        let e = ParseError::new("':'", "identifier `x`", 3, 7);
        assert_eq!(e.to_string(), "[parser] line 3:7: expected ':', found identifier `x`");
    }

    #[test]
    fn format_with_source_shows_line() {
        let e = SyntaxError::from(ParseError::new("'{'", "end of input", 2, 1));
        let out = e.format_with_source("data A\nroute");
        assert!(out.ends_with("   2 | route"));
    }
}
