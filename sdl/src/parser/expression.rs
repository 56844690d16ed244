use std::ops::Range;

use crate::expr::{
    BinaryOp, Expr, ExprKind, ForExpr, Heredoc, Literal, ObjectItem, ObjectKey, Step,
    TemplatePart, Traversal, UnaryOp,
};
use crate::parser::error::ParseError;
use crate::parser::lexer::{RawPart, Token};

use super::Cursor;

// ---------------------------------------------------------------------------
// Binding powers
// ---------------------------------------------------------------------------

const BP_CONDITIONAL: u8 = 2; // ? :
const BP_OR: u8 = 4; // ||
const BP_AND: u8 = 6; // &&
const BP_EQUALITY: u8 = 8; // == !=
const BP_COMPARISON: u8 = 10; // < > <= >=
const BP_ADDITIVE: u8 = 12; // + -
const BP_MULTIPLICATIVE: u8 = 14; // * / %
const BP_UNARY: u8 = 16; // ! -

fn infix_bp(token: &Token) -> Option<(u8, u8)> {
    match token {
        Token::Question => Some((BP_CONDITIONAL, BP_CONDITIONAL)),
        Token::PipePipe => Some((BP_OR, BP_OR + 1)),
        Token::AmpAmp => Some((BP_AND, BP_AND + 1)),
        Token::EqEq | Token::BangEq => Some((BP_EQUALITY, BP_EQUALITY + 1)),
        Token::Gt | Token::Lt | Token::GtEq | Token::LtEq => {
            Some((BP_COMPARISON, BP_COMPARISON + 1))
        }
        Token::Plus | Token::Minus => Some((BP_ADDITIVE, BP_ADDITIVE + 1)),
        Token::Star | Token::Slash | Token::Percent => {
            Some((BP_MULTIPLICATIVE, BP_MULTIPLICATIVE + 1))
        }
        _ => None,
    }
}

fn binary_op(token: &Token) -> Option<BinaryOp> {
    Some(match token {
        Token::Plus => BinaryOp::Add,
        Token::Minus => BinaryOp::Subtract,
        Token::Star => BinaryOp::Multiply,
        Token::Slash => BinaryOp::Divide,
        Token::Percent => BinaryOp::Modulo,
        Token::EqEq => BinaryOp::Equal,
        Token::BangEq => BinaryOp::NotEqual,
        Token::Gt => BinaryOp::Greater,
        Token::Lt => BinaryOp::Less,
        Token::GtEq => BinaryOp::GreaterOrEqual,
        Token::LtEq => BinaryOp::LessOrEqual,
        Token::AmpAmp => BinaryOp::And,
        Token::PipePipe => BinaryOp::Or,
        _ => return None,
    })
}

impl<'a> Cursor<'a> {
    pub(super) fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_expr(0)
    }

    // ------------------------------------------------------------------
    // Pratt parser core
    // ------------------------------------------------------------------

    fn parse_expr(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        let mut left = self.parse_prefix()?;

        loop {
            let Some((l_bp, r_bp)) = infix_bp(self.peek()) else {
                break;
            };
            if l_bp < min_bp {
                break;
            }

            let op = self.advance();
            if op.token == Token::Question {
                let then = self.parse_expr(0)?;
                self.expect(Token::Colon, "':' in conditional expression")?;
                let otherwise = self.parse_expr(r_bp)?;
                let range = left.range.to(&otherwise.range);
                left = Expr::new(
                    ExprKind::Conditional {
                        condition: Box::new(left),
                        then: Box::new(then),
                        otherwise: Box::new(otherwise),
                    },
                    range,
                );
                continue;
            }

            let Some(op_kind) = binary_op(&op.token) else {
                return Err(self.error("unexpected infix operator", op.span));
            };
            let right = self.parse_expr(r_bp)?;
            let range = left.range.to(&right.range);
            left = Expr::new(
                ExprKind::Binary {
                    op: op_kind,
                    lhs: Box::new(left),
                    rhs: Box::new(right),
                },
                range,
            );
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            Token::Bang => UnaryOp::Not,
            Token::Minus => UnaryOp::Negate,
            _ => return self.parse_postfix(),
        };
        let tok = self.advance();
        let operand = self.parse_expr(BP_UNARY)?;
        let range = self.range(tok.span).to(&operand.range);
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            range,
        ))
    }

    /// A primary expression followed by any `.attr` and `[key]` accessors.
    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Token::Dot => {
                    let dot = self.advance();
                    let tok = self.advance();
                    let step_range = self.range(dot.span.start..tok.span.end);
                    let step = match tok.token {
                        Token::Ident(name) => Step::Attr {
                            name,
                            range: step_range,
                        },
                        Token::Number(n) if n.fract() == 0.0 => Step::Index {
                            key: Literal::Number(n),
                            range: step_range,
                        },
                        Token::Star => {
                            return Err(self.error("splat expressions are not supported", tok.span));
                        }
                        other => {
                            return Err(self.error(
                                format!("expected an attribute name, found {}", other.describe()),
                                tok.span,
                            ));
                        }
                    };
                    expr = append_step(expr, step);
                }
                Token::LBrack => {
                    let open = self.advance();
                    self.nesting += 1;
                    let key = self.parse_expr(0)?;
                    let close = self.expect(Token::RBrack, "']'")?;
                    self.nesting -= 1;
                    let step_range = self.range(open.span.start..close.span.end);
                    expr = match (&expr.kind, literal_key(&key)) {
                        (ExprKind::Traversal(_), Some(lit)) => append_step(
                            expr,
                            Step::Index {
                                key: lit,
                                range: step_range,
                            },
                        ),
                        _ => {
                            let range = expr.range.to(&step_range);
                            Expr::new(
                                ExprKind::Index {
                                    collection: Box::new(expr),
                                    key: Box::new(key),
                                },
                                range,
                            )
                        }
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let tok = self.advance();
        let range = self.range(tok.span.clone());
        match tok.token {
            Token::Number(n) => Ok(Expr::new(ExprKind::Literal(Literal::Number(n)), range)),
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::new(ExprKind::Literal(Literal::Bool(true)), range)),
                "false" => Ok(Expr::new(ExprKind::Literal(Literal::Bool(false)), range)),
                "null" => Ok(Expr::new(ExprKind::Literal(Literal::Null), range)),
                _ if self.tokens[self.pos].token == Token::LParen => {
                    self.parse_call(name, tok.span)
                }
                _ => Ok(Expr::new(
                    ExprKind::Traversal(Traversal {
                        root: name,
                        root_range: range.clone(),
                        steps: Vec::new(),
                    }),
                    range,
                )),
            },
            Token::Quoted(parts) => {
                let parts = self.template_parts(parts)?;
                Ok(Expr::new(ExprKind::Template(parts), range))
            }
            Token::Heredoc {
                marker,
                strip_indent,
                raw,
                parts,
            } => {
                let parts = self.template_parts(parts)?;
                Ok(Expr::new(
                    ExprKind::Heredoc(Heredoc {
                        marker,
                        strip_indent,
                        raw,
                        parts,
                    }),
                    range,
                ))
            }
            Token::LParen => {
                self.nesting += 1;
                let inner = self.parse_expr(0)?;
                let close = self.expect(Token::RParen, "')'")?;
                self.nesting -= 1;
                Ok(Expr::new(
                    ExprKind::Parens(Box::new(inner)),
                    self.range(tok.span.start..close.span.end),
                ))
            }
            Token::LBrack => self.parse_tuple(tok.span),
            Token::LBrace => self.parse_object(tok.span),
            other => Err(self.error(
                format!("expected an expression, found {}", other.describe()),
                tok.span,
            )),
        }
    }

    fn template_parts(&self, raw: Vec<RawPart>) -> Result<Vec<TemplatePart>, ParseError> {
        raw.into_iter()
            .map(|part| match part {
                RawPart::Literal(s) => Ok(TemplatePart::Literal(s)),
                RawPart::Interpolation(span) => {
                    self.parse_interpolation(span).map(TemplatePart::Interpolation)
                }
            })
            .collect()
    }

    fn parse_interpolation(&self, span: Range<usize>) -> Result<Expr, ParseError> {
        let trimmed = trim_strip_markers(self.source, span);
        if self.source[trimmed.clone()].trim().is_empty() {
            return Err(self.error("empty template interpolation", trimmed));
        }
        let mut sub = self.sub(trimmed)?;
        let expr = sub.parse_expr(0)?;
        sub.expect(Token::Eof, "'}' to close the interpolation")?;
        Ok(expr)
    }

    fn parse_call(&mut self, name: String, name_span: Range<usize>) -> Result<Expr, ParseError> {
        self.advance(); // (
        self.nesting += 1;
        let mut args = Vec::new();
        let mut expand_final = false;
        loop {
            if self.at(&Token::RParen) {
                break;
            }
            args.push(self.parse_expr(0)?);
            if self.at(&Token::Ellipsis) {
                self.advance();
                expand_final = true;
                break;
            }
            if self.at(&Token::Comma) {
                self.advance();
                continue;
            }
            break;
        }
        let close = self.expect(Token::RParen, "')' to close the argument list")?;
        self.nesting -= 1;
        Ok(Expr::new(
            ExprKind::FunctionCall {
                name,
                args,
                expand_final,
            },
            self.range(name_span.start..close.span.end),
        ))
    }

    /// `[a, b, c]` or `[for ...]`; the `[` is consumed.
    fn parse_tuple(&mut self, open: Range<usize>) -> Result<Expr, ParseError> {
        self.nesting += 1;
        if self.at_for() {
            let for_expr = self.parse_for(false)?;
            let close = self.expect(Token::RBrack, "']'")?;
            self.nesting -= 1;
            return Ok(Expr::new(
                ExprKind::For(Box::new(for_expr)),
                self.range(open.start..close.span.end),
            ));
        }
        let mut items = Vec::new();
        loop {
            if self.at(&Token::RBrack) {
                break;
            }
            items.push(self.parse_expr(0)?);
            if self.at(&Token::Comma) {
                self.advance();
                continue;
            }
            break;
        }
        let close = self.expect(Token::RBrack, "',' or ']'")?;
        self.nesting -= 1;
        Ok(Expr::new(
            ExprKind::Tuple(items),
            self.range(open.start..close.span.end),
        ))
    }

    /// `{ k = v, ... }` or `{for ...}`; the `{` is consumed.
    fn parse_object(&mut self, open: Range<usize>) -> Result<Expr, ParseError> {
        self.nesting += 1;
        if self.at_for() {
            let for_expr = self.parse_for(true)?;
            let close = self.expect(Token::RBrace, "'}'")?;
            self.nesting -= 1;
            return Ok(Expr::new(
                ExprKind::For(Box::new(for_expr)),
                self.range(open.start..close.span.end),
            ));
        }
        let mut items = Vec::new();
        loop {
            if self.at(&Token::RBrace) {
                break;
            }
            let ident = match self.peek() {
                Token::Ident(name) => Some(name.clone()),
                _ => None,
            };
            let bare_key = matches!(self.lookahead(1), Token::Assign | Token::Colon);
            let key = match ident {
                Some(name) if bare_key => {
                    self.advance();
                    ObjectKey::Ident(name)
                }
                _ => ObjectKey::Expr(self.parse_expr(0)?),
            };
            if self.at(&Token::Assign) || self.at(&Token::Colon) {
                self.advance();
            } else {
                let span = self.peek_span();
                return Err(self.error("expected '=' after object key", span));
            }
            let value = self.parse_expr(0)?;
            items.push(ObjectItem { key, value });
            if self.at(&Token::Comma) {
                self.advance();
            }
        }
        let close = self.expect(Token::RBrace, "'}'")?;
        self.nesting -= 1;
        Ok(Expr::new(
            ExprKind::Object(items),
            self.range(open.start..close.span.end),
        ))
    }

    fn at_for(&mut self) -> bool {
        matches!(self.peek(), Token::Ident(kw) if kw == "for")
            && matches!(self.lookahead(1), Token::Ident(_))
    }

    /// `for k, v in coll : [key =>] value [...] [if cond]`; stops before the closing bracket.
    fn parse_for(&mut self, object: bool) -> Result<ForExpr, ParseError> {
        self.expect_keyword("for")?;
        let first = self.expect_ident()?;
        let (key_var, value_var) = if self.at(&Token::Comma) {
            self.advance();
            (Some(first), self.expect_ident()?)
        } else {
            (None, first)
        };
        self.expect_keyword("in")?;
        let collection = self.parse_expr(0)?;
        self.expect(Token::Colon, "':'")?;

        let key = if object {
            let key = self.parse_expr(0)?;
            self.expect(Token::FatArrow, "'=>'")?;
            Some(key)
        } else {
            None
        };
        let value = self.parse_expr(0)?;
        let group = object && self.at(&Token::Ellipsis);
        if group {
            self.advance();
        }
        let condition = match self.peek() {
            Token::Ident(kw) if kw == "if" => {
                self.advance();
                Some(self.parse_expr(0)?)
            }
            _ => None,
        };
        Ok(ForExpr {
            key_var,
            value_var,
            collection,
            key,
            value,
            condition,
            group,
        })
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        let tok = self.expect(Token::Ident(String::new()), "an identifier")?;
        match tok.token {
            Token::Ident(name) => Ok(name),
            _ => Err(self.error("expected an identifier", tok.span)),
        }
    }
}

/// Attach an accessor step. Bare traversals grow in place; anything else
/// becomes an attribute or index access on the evaluated value.
fn append_step(expr: Expr, step: Step) -> Expr {
    let range = expr.range.to(step.range());
    match expr.kind {
        ExprKind::Traversal(mut t) => {
            t.steps.push(step);
            Expr::new(ExprKind::Traversal(t), range)
        }
        kind => {
            let object = Box::new(Expr::new(kind, expr.range));
            let kind = match step {
                Step::Attr { name, .. } => ExprKind::GetAttr { object, name },
                Step::Index { key, range: key_range } => ExprKind::Index {
                    collection: object,
                    key: Box::new(Expr::new(ExprKind::Literal(key), key_range)),
                },
            };
            Expr::new(kind, range)
        }
    }
}

/// A constant index key usable as a static traversal step.
fn literal_key(key: &Expr) -> Option<Literal> {
    match &key.kind {
        ExprKind::Literal(lit @ (Literal::String(_) | Literal::Number(_))) => Some(lit.clone()),
        ExprKind::Template(_) => key.static_string().map(Literal::String),
        _ => None,
    }
}

/// Drop the `~` whitespace-strip markers of `${~ ... ~}`.
fn trim_strip_markers(source: &str, span: Range<usize>) -> Range<usize> {
    let text = &source[span.clone()];
    let start = if text.starts_with('~') { span.start + 1 } else { span.start };
    let end = if text.len() > 1 && text.ends_with('~') { span.end - 1 } else { span.end };
    start..end
}

#[cfg(test)]
mod tests {
    use crate::expr::{BinaryOp, ExprKind, Literal, Step};

    fn expr(src: &str) -> crate::expr::Expr {
        let file = crate::parse(&format!("v = {}\n", src), "test.hcl", 0).unwrap();
        file.body.attributes[0].expr.clone()
    }

    #[test]
    fn precedence() {
        let e = expr("1 + 2 * 3");
        let ExprKind::Binary { op, rhs, .. } = e.kind else {
            panic!("expected binary")
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(rhs.kind, ExprKind::Binary { op: BinaryOp::Multiply, .. }));
    }

    #[test]
    fn conditional_is_right_associative() {
        let e = expr("a ? 1 : b ? 2 : 3");
        let ExprKind::Conditional { otherwise, .. } = e.kind else {
            panic!("expected conditional")
        };
        assert!(matches!(otherwise.kind, ExprKind::Conditional { .. }));
    }

    #[test]
    fn traversal_with_index_steps() {
        let e = expr("table[\"users\"].column[0]");
        let ExprKind::Traversal(t) = e.kind else {
            panic!("expected traversal")
        };
        assert_eq!(t.root, "table");
        assert_eq!(t.steps.len(), 3);
        assert!(matches!(
            &t.steps[2],
            Step::Index { key: Literal::Number(n), .. } if *n == 0.0
        ));
    }

    #[test]
    fn dynamic_index_is_an_index_expression() {
        let e = expr("local.m[var.k]");
        assert!(matches!(e.kind, ExprKind::Index { .. }));
    }

    #[test]
    fn multiline_tuple_and_object() {
        let e = expr("[\n  1,\n  2,\n]");
        assert!(matches!(e.kind, ExprKind::Tuple(ref items) if items.len() == 2));
        let e = expr("{\n  a = 1\n  \"b\" = 2\n}");
        assert!(matches!(e.kind, ExprKind::Object(ref items) if items.len() == 2));
    }

    #[test]
    fn for_expressions() {
        let e = expr("[for s in var.list : upper(s) if s != \"\"]");
        let ExprKind::For(f) = e.kind else {
            panic!("expected for")
        };
        assert_eq!(f.value_var, "s");
        assert!(f.key.is_none());
        assert!(f.condition.is_some());

        let e = expr("{for k, v in var.m : k => v...}");
        let ExprKind::For(f) = e.kind else {
            panic!("expected for")
        };
        assert_eq!(f.key_var.as_deref(), Some("k"));
        assert!(f.group);
    }

    #[test]
    fn function_call_with_expansion() {
        let e = expr("format(\"%s-%s\", local.parts...)");
        let ExprKind::FunctionCall {
            name,
            args,
            expand_final,
        } = e.kind
        else {
            panic!("expected call")
        };
        assert_eq!(name, "format");
        assert_eq!(args.len(), 2);
        assert!(expand_final);
    }

    #[test]
    fn interpolation_ranges_point_into_the_file() {
        let e = expr("\"x-${local.name}\"");
        let trav = e.traversals()[0].clone();
        assert_eq!(trav.dotted(), "local.name");
        assert_eq!(trav.root_range.start.column, 10);
    }
}
