use crate::body::{Attribute, Block, Body, Label};
use crate::parser::error::ParseError;
use crate::parser::lexer::{RawPart, Token};

use super::Cursor;

impl<'a> Cursor<'a> {
    /// Parse attributes and blocks until end of input, or until the closing
    /// `}` when `closing` is set (the brace itself is left for the caller).
    pub(super) fn parse_body(&mut self, closing: bool) -> Result<Body, ParseError> {
        let mut body = Body::empty();
        loop {
            self.skip_newlines();
            let span = self.peek_span();
            match self.peek() {
                Token::Eof if closing => {
                    return Err(self.error("unclosed block; expected '}'", span));
                }
                Token::Eof => break,
                Token::RBrace if closing => break,
                Token::Ident(_) => {}
                other => {
                    let found = other.describe();
                    return Err(self.error(
                        format!("expected an attribute or block definition, found {}", found),
                        span,
                    ));
                }
            }

            if matches!(self.lookahead(1), Token::Assign) {
                let attr = self.parse_attribute()?;
                push_attribute(&mut body, attr, self)?;
            } else {
                let block = self.parse_block()?;
                body.blocks.push(block);
            }
            self.end_of_item(closing)?;
        }
        Ok(body)
    }

    /// `name = expr`; the cursor is at the name.
    fn parse_attribute(&mut self) -> Result<Attribute, ParseError> {
        let name_tok = self.advance();
        let Token::Ident(name) = name_tok.token else {
            return Err(self.error("expected an attribute name", name_tok.span));
        };
        self.expect(Token::Assign, "'='")?;
        let expr = self.parse_expression()?;
        let name_range = self.range(name_tok.span.clone());
        Ok(Attribute {
            name,
            range: name_range.to(&expr.range),
            name_range,
            expr,
        })
    }

    /// `kind "label" label { ... }`; the cursor is at the block type.
    fn parse_block(&mut self) -> Result<Block, ParseError> {
        let kind_tok = self.advance();
        let Token::Ident(kind) = kind_tok.token else {
            return Err(self.error("expected a block type", kind_tok.span));
        };

        let mut labels = Vec::new();
        loop {
            let span = self.peek_span();
            match self.peek().clone() {
                Token::LBrace => break,
                Token::Ident(value) => {
                    self.advance();
                    labels.push(Label {
                        value,
                        range: self.range(span),
                    });
                }
                Token::Quoted(parts) => {
                    let value = match parts.as_slice() {
                        [RawPart::Literal(s)] => s.clone(),
                        _ => {
                            return Err(self.error(
                                "block labels may not contain template interpolations",
                                span,
                            ));
                        }
                    };
                    self.advance();
                    labels.push(Label {
                        value,
                        range: self.range(span),
                    });
                }
                other => {
                    return Err(self.error(
                        format!(
                            "invalid block definition; expected a label or '{{', found {}",
                            other.describe()
                        ),
                        span,
                    ));
                }
            }
        }

        let open = self.advance();
        let body = if matches!(self.peek(), Token::Newline) {
            self.parse_body(true)?
        } else {
            self.parse_single_line_body()?
        };
        let close = self.expect(Token::RBrace, "'}'")?;

        Ok(Block {
            kind,
            labels,
            body: Body {
                range: self.range(open.span.start..close.span.end),
                ..body
            },
            range: self.range(kind_tok.span.start..close.span.end),
            kind_range: self.range(kind_tok.span),
        })
    }

    /// `block { attr = value }` on one line: at most one attribute, no nested blocks.
    fn parse_single_line_body(&mut self) -> Result<Body, ParseError> {
        let mut body = Body::empty();
        if matches!(self.peek(), Token::RBrace) {
            return Ok(body);
        }
        let span = self.peek_span();
        if !matches!(self.peek(), Token::Ident(_)) || !matches!(self.lookahead(1), Token::Assign) {
            return Err(self.error(
                "a single-line block definition may contain only a single attribute",
                span,
            ));
        }
        body.attributes.push(self.parse_attribute()?);
        if !matches!(self.peek(), Token::RBrace) {
            let span = self.peek_span();
            return Err(self.error(
                "a single-line block definition may contain only a single attribute",
                span,
            ));
        }
        Ok(body)
    }

    /// Each attribute or block ends at a newline, end of input, or the
    /// enclosing block's closing brace.
    fn end_of_item(&mut self, closing: bool) -> Result<(), ParseError> {
        let span = self.peek_span();
        match self.peek() {
            Token::Newline => {
                self.advance();
                Ok(())
            }
            Token::Eof => Ok(()),
            Token::RBrace if closing => Ok(()),
            other => {
                let found = other.describe();
                Err(self.error(
                    format!("unexpected {}; expected a newline", found),
                    span,
                ))
            }
        }
    }
}

fn push_attribute(body: &mut Body, attr: Attribute, cursor: &Cursor<'_>) -> Result<(), ParseError> {
    if let Some(prev) = body.attribute(&attr.name) {
        return Err(ParseError::error(
            format!("duplicate attribute {:?}", attr.name),
            attr.name_range.clone(),
            cursor.file_id,
        )
        .with_note(format!("previously defined at {}", prev.name_range)));
    }
    body.attributes.push(attr);
    Ok(())
}
