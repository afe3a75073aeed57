//! Recovers the exact text of an action body from the original source.
//!
//! Action bodies are written in an embedded imperative language the DSL
//! tokenizer does not understand, so their text is re-scanned from the raw
//! source with brace and quote bookkeeping instead of being rebuilt from tokens.

use super::error::{offset_to_line_col, ExtractError};

/// A `{ ... }` block found by [`extract_balanced_block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalancedBlock<'a> {
    /// Contents between the delimiters, trimmed.
    pub text: &'a str,
    /// Offset of the closing `}`.
    pub close_offset: usize,
    /// Offset just past the closing `}`.
    pub end_offset: usize,
}

/// Offset of the first `{` on the given 1-based line.
pub fn locate_open_delimiter(source: &str, line: usize) -> Result<usize, ExtractError> {
    let not_found = ExtractError::PositionNotFound { line };
    if line == 0 {
        return Err(not_found);
    }

    let mut line_start = 0;
    let mut current = 1;
    let bytes = source.as_bytes();
    while current < line {
        match bytes.get(line_start..).and_then(|rest| rest.iter().position(|&b| b == b'\n')) {
            Some(nl) => {
                line_start += nl + 1;
                current += 1;
            }
            None => return Err(not_found),
        }
    }

    bytes
        .get(line_start..)
        .unwrap_or_default()
        .iter()
        .take_while(|&&b| b != b'\n')
        .position(|&b| b == b'{')
        .map(|i| line_start + i)
        .ok_or(not_found)
}

#[derive(Clone, Copy)]
enum Region {
    Code,
    Quoted(u8),
    LineComment,
    BlockComment,
}

/// Scan forward from the `{` at `open_offset` to its matching `}`.
///
/// Braces inside `'`, `"` or `` ` `` quotes and inside `//` or `/* */`
/// comments do not count. Inside quotes a backslash consumes the next byte.
pub fn extract_balanced_block(source: &str, open_offset: usize) -> Result<BalancedBlock<'_>, ExtractError> {
    let bytes = source.as_bytes();
    let content_start = open_offset + 1;
    let mut depth = 1usize;
    let mut region = Region::Code;
    let mut pos = content_start;

    while let Some(&b) = bytes.get(pos) {
        let next = bytes.get(pos + 1).copied();
        match region {
            Region::Quoted(quote) => {
                if b == b'\\' {
                    pos += 2;
                    continue;
                }
                if b == quote {
                    region = Region::Code;
                }
            }
            Region::LineComment => {
                if b == b'\n' {
                    region = Region::Code;
                }
            }
            Region::BlockComment => {
                if b == b'*' && next == Some(b'/') {
                    region = Region::Code;
                    pos += 2;
                    continue;
                }
            }
            Region::Code => match b {
                b'\'' | b'"' | b'`' => region = Region::Quoted(b),
                b'/' if next == Some(b'/') => region = Region::LineComment,
                b'/' if next == Some(b'*') => {
                    region = Region::BlockComment;
                    pos += 2;
                    continue;
                }
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        let text = source.get(content_start..pos).unwrap_or_default().trim();
                        return Ok(BalancedBlock {
                            text,
                            close_offset: pos,
                            end_offset: pos + 1,
                        });
                    }
                }
                _ => {}
            },
        }
        pos += 1;
    }

    let (line, column) = offset_to_line_col(source, open_offset);
    Err(ExtractError::UnbalancedDelimiters {
        offset: open_offset,
        line,
        column,
        depth,
    })
}
