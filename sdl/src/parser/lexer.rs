use std::ops::Range;

/// A piece of a quoted string or heredoc before its interpolations are parsed.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RawPart {
    Literal(String),
    /// Byte range of the expression source between `${` and `}`.
    Interpolation(Range<usize>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Ident(String),
    Number(f64),
    Quoted(Vec<RawPart>),
    Heredoc {
        marker: String,
        strip_indent: bool,
        raw: String,
        parts: Vec<RawPart>,
    },

    LBrace,
    RBrace,
    LBrack,
    RBrack,
    LParen,
    RParen,

    Assign,   // =
    EqEq,     // ==
    BangEq,   // !=
    Lt,
    Gt,
    LtEq,
    GtEq,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    AmpAmp,   // &&
    PipePipe, // ||
    Bang,     // !
    Question, // ?
    Colon,    // :
    Comma,
    Dot,
    Ellipsis, // ...
    FatArrow, // =>

    Newline,
    Eof,
}

impl Token {
    pub(crate) fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("identifier {:?}", name),
            Token::Number(n) => format!("number {}", n),
            Token::Quoted(_) => "quoted string".to_string(),
            Token::Heredoc { .. } => "heredoc".to_string(),
            Token::Newline => "newline".to_string(),
            Token::Eof => "end of file".to_string(),
            other => format!("{:?}", other),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Spanned {
    pub token: Token,
    pub span: Range<usize>,
}

#[derive(Debug, Clone)]
pub(crate) struct LexError {
    pub message: String,
    pub span: Range<usize>,
}

impl LexError {
    fn new(message: impl Into<String>, span: Range<usize>) -> Self {
        LexError {
            message: message.into(),
            span,
        }
    }
}

/// Tokenize `source[range]`. Spans are absolute offsets into `source`.
pub(crate) fn tokenize(source: &str, range: Range<usize>) -> Result<Vec<Spanned>, LexError> {
    Lexer {
        src: source,
        pos: range.start,
        end: range.end,
    }
    .run()
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    end: usize,
}

impl<'a> Lexer<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..self.end]
    }

    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn starts_with(&self, s: &str) -> bool {
        self.rest().starts_with(s)
    }

    fn run(mut self) -> Result<Vec<Spanned>, LexError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let start = self.pos;
            let Some(c) = self.peek_char() else {
                tokens.push(Spanned {
                    token: Token::Eof,
                    span: start..start,
                });
                break;
            };
            let token = match c {
                '\n' => {
                    self.pos += 1;
                    Token::Newline
                }
                '"' => {
                    self.pos += 1;
                    Token::Quoted(self.quoted(start)?)
                }
                '<' if self.at_heredoc() => self.heredoc()?,
                c if c.is_alphabetic() || c == '_' => Token::Ident(self.ident()),
                c if c.is_ascii_digit() => Token::Number(self.number()?),
                _ => self.punct()?,
            };
            tokens.push(Spanned {
                token,
                span: start..self.pos,
            });
        }
        Ok(tokens)
    }

    /// Skip spaces and comments, stopping at newlines.
    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek_char() {
                Some(' ' | '\t' | '\r') => self.pos += 1,
                Some('#') => self.skip_line(),
                Some('/') if self.starts_with("//") => self.skip_line(),
                Some('/') if self.starts_with("/*") => {
                    let start = self.pos;
                    match self.rest()[2..].find("*/") {
                        Some(idx) => self.pos += idx + 4,
                        None => {
                            return Err(LexError::new("unterminated comment", start..self.end));
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn skip_line(&mut self) {
        match self.rest().find('\n') {
            Some(idx) => self.pos += idx,
            None => self.pos = self.end,
        }
    }

    fn ident(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c.is_alphanumeric() || c == '_' || c == '-' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        self.src[start..self.pos].to_string()
    }

    fn number(&mut self) -> Result<f64, LexError> {
        let start = self.pos;
        let bytes = self.src.as_bytes();
        let digit_at = |i: usize| i < self.end && bytes[i].is_ascii_digit();
        while digit_at(self.pos) {
            self.pos += 1;
        }
        if self.pos < self.end && bytes[self.pos] == b'.' && digit_at(self.pos + 1) {
            self.pos += 1;
            while digit_at(self.pos) {
                self.pos += 1;
            }
        }
        if self.pos < self.end && matches!(bytes[self.pos], b'e' | b'E') {
            let mut p = self.pos + 1;
            if p < self.end && matches!(bytes[p], b'+' | b'-') {
                p += 1;
            }
            if digit_at(p) {
                self.pos = p;
                while digit_at(self.pos) {
                    self.pos += 1;
                }
            }
        }
        self.src[start..self.pos]
            .parse::<f64>()
            .map_err(|_| LexError::new("invalid number literal", start..self.pos))
    }

    fn punct(&mut self) -> Result<Token, LexError> {
        const MULTI: &[(&str, Token)] = &[
            ("...", Token::Ellipsis),
            ("==", Token::EqEq),
            ("!=", Token::BangEq),
            ("<=", Token::LtEq),
            (">=", Token::GtEq),
            ("&&", Token::AmpAmp),
            ("||", Token::PipePipe),
            ("=>", Token::FatArrow),
        ];
        for (text, token) in MULTI {
            if self.starts_with(text) {
                self.pos += text.len();
                return Ok(token.clone());
            }
        }
        let start = self.pos;
        let c = self.peek_char().unwrap_or('\0');
        self.pos += c.len_utf8();
        let token = match c {
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            '[' => Token::LBrack,
            ']' => Token::RBrack,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '=' => Token::Assign,
            '<' => Token::Lt,
            '>' => Token::Gt,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '!' => Token::Bang,
            '?' => Token::Question,
            ':' => Token::Colon,
            ',' => Token::Comma,
            '.' => Token::Dot,
            other => {
                return Err(LexError::new(
                    format!("invalid character {:?}", other),
                    start..self.pos,
                ));
            }
        };
        Ok(token)
    }

    // ------------------------------------------------------------------
    // Templates
    // ------------------------------------------------------------------

    /// Lex the body of a quoted string; `self.pos` is just past the opening quote.
    fn quoted(&mut self, open: usize) -> Result<Vec<RawPart>, LexError> {
        let mut parts = Vec::new();
        let mut lit = String::new();
        loop {
            let Some(c) = self.peek_char() else {
                return Err(LexError::new("unterminated string literal", open..self.pos));
            };
            match c {
                '"' => {
                    self.pos += 1;
                    break;
                }
                '\n' => {
                    return Err(LexError::new("unterminated string literal", open..self.pos));
                }
                '\\' => {
                    self.pos += 1;
                    lit.push(self.escape()?);
                }
                '$' if self.starts_with("$${") => {
                    self.pos += 3;
                    lit.push_str("${");
                }
                '%' if self.starts_with("%%{") => {
                    self.pos += 3;
                    lit.push_str("%{");
                }
                '$' if self.starts_with("${") => {
                    if !lit.is_empty() {
                        parts.push(RawPart::Literal(std::mem::take(&mut lit)));
                    }
                    parts.push(RawPart::Interpolation(self.interpolation()?));
                }
                '%' if self.starts_with("%{") => {
                    return Err(LexError::new(
                        "template directives are not supported",
                        self.pos..self.pos + 2,
                    ));
                }
                c => {
                    lit.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }
        if !lit.is_empty() || parts.is_empty() {
            parts.push(RawPart::Literal(lit));
        }
        Ok(parts)
    }

    fn escape(&mut self) -> Result<char, LexError> {
        let start = self.pos - 1;
        let Some(c) = self.peek_char() else {
            return Err(LexError::new("invalid escape sequence", start..self.pos));
        };
        self.pos += c.len_utf8();
        let decoded = match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '"' => '"',
            '\\' => '\\',
            'u' | 'U' => {
                let len = if c == 'u' { 4 } else { 8 };
                let hex = self.rest().get(..len).unwrap_or("");
                let code = u32::from_str_radix(hex, 16)
                    .ok()
                    .filter(|_| hex.len() == len)
                    .and_then(char::from_u32)
                    .ok_or_else(|| {
                        LexError::new("invalid unicode escape sequence", start..self.pos)
                    })?;
                self.pos += len;
                code
            }
            _ => return Err(LexError::new("invalid escape sequence", start..self.pos)),
        };
        Ok(decoded)
    }

    /// Consume `${ ... }` and return the range of the expression source inside it.
    fn interpolation(&mut self) -> Result<Range<usize>, LexError> {
        let open = self.pos;
        self.pos += 2;
        let inner_start = self.pos;
        let mut depth = 0usize;
        while let Some(c) = self.peek_char() {
            match c {
                '{' => depth += 1,
                '}' if depth == 0 => {
                    let inner = inner_start..self.pos;
                    self.pos += 1;
                    return Ok(inner);
                }
                '}' => depth -= 1,
                '"' => {
                    self.skip_nested_string();
                    continue;
                }
                _ => {}
            }
            self.pos += c.len_utf8();
        }
        Err(LexError::new(
            "unterminated template interpolation",
            open..self.pos,
        ))
    }

    fn skip_nested_string(&mut self) {
        self.pos += 1;
        while let Some(c) = self.peek_char() {
            self.pos += c.len_utf8();
            match c {
                '\\' => {
                    if let Some(n) = self.peek_char() {
                        self.pos += n.len_utf8();
                    }
                }
                '"' | '\n' => return,
                _ => {}
            }
        }
    }

    fn at_heredoc(&self) -> bool {
        let rest = self.rest();
        let after = rest
            .strip_prefix("<<-")
            .or_else(|| rest.strip_prefix("<<"));
        matches!(after.and_then(|s| s.chars().next()), Some(c) if c.is_alphabetic() || c == '_')
    }

    fn heredoc(&mut self) -> Result<Token, LexError> {
        let open = self.pos;
        self.pos += 2;
        let strip_indent = self.starts_with("-");
        if strip_indent {
            self.pos += 1;
        }
        let marker = self.ident();
        while matches!(self.peek_char(), Some(' ' | '\t' | '\r')) {
            self.pos += 1;
        }
        if self.peek_char() != Some('\n') {
            return Err(LexError::new(
                "heredoc marker must be followed by a newline",
                open..self.pos,
            ));
        }
        self.pos += 1;

        // Body lines as (start, end) where end includes the newline.
        let mut lines = Vec::new();
        loop {
            if self.pos >= self.end {
                return Err(LexError::new(
                    format!("unterminated heredoc; expected closing marker {:?}", marker),
                    open..self.end,
                ));
            }
            let line_start = self.pos;
            let line_end = match self.rest().find('\n') {
                Some(idx) => self.pos + idx,
                None => self.end,
            };
            if self.src[line_start..line_end].trim() == marker {
                self.pos = line_end;
                break;
            }
            let with_newline = (line_end + 1).min(self.end);
            lines.push((line_start, with_newline));
            self.pos = with_newline;
        }

        let raw: String = lines.iter().map(|&(s, e)| &self.src[s..e]).collect();
        let indent = if strip_indent {
            lines
                .iter()
                .filter(|&&(s, e)| !self.src[s..e].trim().is_empty())
                .map(|&(s, e)| leading_whitespace(&self.src[s..e]))
                .min()
                .unwrap_or(0)
        } else {
            0
        };

        let mut parts: Vec<RawPart> = Vec::new();
        for &(s, e) in &lines {
            let strip = indent.min(leading_whitespace(&self.src[s..e]));
            for part in self.heredoc_line(s + strip, e)? {
                match (parts.last_mut(), part) {
                    (Some(RawPart::Literal(prev)), RawPart::Literal(next)) => prev.push_str(&next),
                    (_, part) => parts.push(part),
                }
            }
        }
        if parts.is_empty() {
            parts.push(RawPart::Literal(String::new()));
        }
        Ok(Token::Heredoc {
            marker,
            strip_indent,
            raw,
            parts,
        })
    }

    /// Split one heredoc line into parts. Heredocs have no backslash escapes.
    fn heredoc_line(&self, start: usize, end: usize) -> Result<Vec<RawPart>, LexError> {
        let mut sub = Lexer {
            src: self.src,
            pos: start,
            end,
        };
        let mut parts = Vec::new();
        let mut lit = String::new();
        while let Some(c) = sub.peek_char() {
            if sub.starts_with("$${") {
                sub.pos += 3;
                lit.push_str("${");
            } else if sub.starts_with("%%{") {
                sub.pos += 3;
                lit.push_str("%{");
            } else if sub.starts_with("${") {
                if !lit.is_empty() {
                    parts.push(RawPart::Literal(std::mem::take(&mut lit)));
                }
                parts.push(RawPart::Interpolation(sub.interpolation()?));
            } else if sub.starts_with("%{") {
                return Err(LexError::new(
                    "template directives are not supported",
                    sub.pos..sub.pos + 2,
                ));
            } else {
                lit.push(c);
                sub.pos += c.len_utf8();
            }
        }
        if !lit.is_empty() {
            parts.push(RawPart::Literal(lit));
        }
        Ok(parts)
    }
}

fn leading_whitespace(line: &str) -> usize {
    line.chars().take_while(|c| *c == ' ' || *c == '\t').count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        tokenize(src, 0..src.len())
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn punctuation_and_idents() {
        assert_eq!(
            kinds("a-b == c..."),
            vec![
                Token::Ident("a-b".into()),
                Token::EqEq,
                Token::Ident("c".into()),
                Token::Ellipsis,
                Token::Eof
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("# one\n// two\n/* three */ x"),
            vec![
                Token::Newline,
                Token::Newline,
                Token::Ident("x".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn quoted_string_escapes() {
        let src = r#""a\n$${b}%%{c}""#;
        assert_eq!(
            kinds(src)[0],
            Token::Quoted(vec![RawPart::Literal("a\n${b}%{c}".into())])
        );
    }

    #[test]
    fn quoted_string_interpolation_range() {
        let src = r#""x${ local.a }y""#;
        let Token::Quoted(parts) = &kinds(src)[0] else {
            panic!("expected quoted string")
        };
        assert_eq!(parts.len(), 3);
        let RawPart::Interpolation(r) = &parts[1] else {
            panic!("expected interpolation")
        };
        assert_eq!(&src[r.clone()], " local.a ");
    }

    #[test]
    fn heredoc_strips_common_indent() {
        let src = "<<-EOT\n  hello\n  world\nEOT\n";
        let tokens = kinds(src);
        let Token::Heredoc { raw, parts, .. } = &tokens[0] else {
            panic!("expected heredoc")
        };
        assert_eq!(raw, "  hello\n  world\n");
        assert_eq!(parts, &vec![RawPart::Literal("hello\nworld\n".into())]);
        assert_eq!(tokens[1], Token::Newline);
    }

    #[test]
    fn directives_are_rejected() {
        let src = r#""%{ if true }x%{ endif }""#;
        assert!(tokenize(src, 0..src.len()).is_err());
    }
}
