pub mod error;
mod expression;
mod lexer;
mod structural;

use std::ops::Range;
use std::sync::Arc;

pub use error::ParseError;

use crate::File;
use crate::pos::{LineIndex, SourceRange};
use lexer::{LexError, Spanned, Token};

/// Parser entry point.
pub struct Parser {
    source: String,
    filename: Arc<str>,
    file_id: usize,
}

impl Parser {
    pub fn new(source: String, filename: &str, file_id: usize) -> Self {
        Parser {
            source,
            filename: Arc::from(filename),
            file_id,
        }
    }

    /// Parse the source into a complete document. Parsing stops at the first error.
    pub fn parse(&self) -> Result<File, Vec<ParseError>> {
        let index = LineIndex::new(&self.source);
        let tokens = lexer::tokenize(&self.source, 0..self.source.len())
            .map_err(|e| vec![self.lex_error(&index, e)])?;
        let mut cursor = Cursor {
            source: &self.source,
            index: &index,
            filename: self.filename.clone(),
            file_id: self.file_id,
            tokens,
            pos: 0,
            nesting: 0,
        };
        let mut body = cursor.parse_body(false).map_err(|e| vec![e])?;
        body.range = index.range(&self.filename, 0..self.source.len());
        Ok(File {
            body,
            source_id: self.file_id,
            filename: self.filename.clone(),
        })
    }

    fn lex_error(&self, index: &LineIndex<'_>, e: LexError) -> ParseError {
        ParseError::error(e.message, index.range(&self.filename, e.span), self.file_id)
    }
}

/// Token cursor shared by the structural and expression parsers.
///
/// While `nesting` is non-zero (inside brackets, parentheses, or an
/// interpolation) newline tokens are insignificant and skipped.
struct Cursor<'a> {
    source: &'a str,
    index: &'a LineIndex<'a>,
    filename: Arc<str>,
    file_id: usize,
    tokens: Vec<Spanned>,
    pos: usize,
    nesting: usize,
}

impl<'a> Cursor<'a> {
    /// A cursor over `source[span]`, used for `${ ... }` interpolations.
    fn sub(&self, span: Range<usize>) -> Result<Cursor<'a>, ParseError> {
        let tokens = lexer::tokenize(self.source, span).map_err(|e| {
            ParseError::error(e.message, self.range(e.span), self.file_id)
        })?;
        Ok(Cursor {
            source: self.source,
            index: self.index,
            filename: self.filename.clone(),
            file_id: self.file_id,
            tokens,
            pos: 0,
            nesting: 1,
        })
    }

    fn skip_insignificant(&mut self) {
        if self.nesting > 0 {
            self.skip_newlines();
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.tokens.get(self.pos), Some(Spanned { token: Token::Newline, .. })) {
            self.pos += 1;
        }
    }

    fn current(&self) -> &Spanned {
        // The token stream always ends with Eof.
        let last = self.tokens.len() - 1;
        &self.tokens[self.pos.min(last)]
    }

    fn peek(&mut self) -> &Token {
        self.skip_insignificant();
        &self.current().token
    }

    fn peek_span(&mut self) -> Range<usize> {
        self.skip_insignificant();
        self.current().span.clone()
    }

    /// The `n`th significant token after the current one.
    fn lookahead(&mut self, n: usize) -> &Token {
        self.skip_insignificant();
        let mut seen = 0;
        let mut i = self.pos;
        while i + 1 < self.tokens.len() {
            i += 1;
            if self.nesting > 0 && self.tokens[i].token == Token::Newline {
                continue;
            }
            seen += 1;
            if seen == n {
                return &self.tokens[i].token;
            }
        }
        &self.tokens[self.tokens.len() - 1].token
    }

    fn advance(&mut self) -> Spanned {
        self.skip_insignificant();
        let tok = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn at(&mut self, token: &Token) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(token)
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<Spanned, ParseError> {
        if self.at(&token) {
            return Ok(self.advance());
        }
        let span = self.peek_span();
        let found = self.peek().describe();
        Err(self.error(format!("expected {}, found {}", what, found), span))
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<Spanned, ParseError> {
        match self.peek() {
            Token::Ident(name) if name == keyword => Ok(self.advance()),
            other => {
                let found = other.describe();
                let span = self.peek_span();
                Err(self.error(format!("expected {:?}, found {}", keyword, found), span))
            }
        }
    }

    fn range(&self, span: Range<usize>) -> SourceRange {
        self.index.range(&self.filename, span)
    }

    fn error(&self, message: impl Into<String>, span: Range<usize>) -> ParseError {
        ParseError::error(message, self.range(span), self.file_id)
    }
}
