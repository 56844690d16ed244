pub mod body;
pub mod expr;
pub mod parser;
pub mod pos;
pub mod printer;

use std::sync::Arc;

use crate::body::Body;

/// A parsed schema document.
#[derive(Debug, Clone)]
pub struct File {
    /// Top-level attributes and blocks.
    pub body: Body,
    /// The source file ID (for error reporting with codespan-reporting).
    pub source_id: usize,
    /// Name used when rendering source ranges.
    pub filename: Arc<str>,
}

/// Parse `source` as a single document named `filename`.
pub fn parse(
    source: &str,
    filename: &str,
    source_id: usize,
) -> Result<File, Vec<parser::ParseError>> {
    parser::Parser::new(source.to_string(), filename, source_id).parse()
}
