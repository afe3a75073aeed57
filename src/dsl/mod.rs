//! Front end: source text to a merged syntax tree.
//!
//! tokenize → parse (raw-body extraction for `do` blocks) → resolve imports

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod raw_body;
pub mod resolver;

use ast::SyntaxTree;
use error::SyntaxError;

/// Parse a single source string. Imports are recorded on the tree but not
/// followed; use [`resolver::resolve_modules`] for a whole project.
pub fn parse_source(source: &str) -> Result<SyntaxTree, SyntaxError> {
    parser::parse(source)
}
