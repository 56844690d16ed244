pub mod traversal;

pub use traversal::{Step, Traversal};

use crate::pos::SourceRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation: -x
    Negate,
    /// Logical not: !x
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    And,
    Or,
    Equal,
    NotEqual,
    Greater,
    Less,
    GreaterOrEqual,
    LessOrEqual,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Greater => ">",
            BinaryOp::Less => "<",
            BinaryOp::GreaterOrEqual => ">=",
            BinaryOp::LessOrEqual => "<=",
        }
    }
}

/// A literal scalar as written in the source.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

/// A piece of a quoted string or heredoc.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    /// Literal text, with escapes already decoded.
    Literal(String),
    /// `${ expr }`
    Interpolation(Expr),
}

/// A `<<MARK` or `<<-MARK` string.
#[derive(Debug, Clone, PartialEq)]
pub struct Heredoc {
    pub marker: String,
    /// `<<-` form: common leading indentation is removed from every line.
    pub strip_indent: bool,
    /// Body lines exactly as written (escapes not decoded), each ending in a newline.
    pub raw: String,
    pub parts: Vec<TemplatePart>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKey {
    /// A bare identifier key, taken literally.
    Ident(String),
    /// A quoted or parenthesized key expression.
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectItem {
    pub key: ObjectKey,
    pub value: Expr,
}

/// `[for k, v in coll : value if cond]` or `{for k, v in coll : key => value}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ForExpr {
    pub key_var: Option<String>,
    pub value_var: String,
    pub collection: Expr,
    /// Present for the object form.
    pub key: Option<Expr>,
    pub value: Expr,
    pub condition: Option<Expr>,
    /// Object form with `...`: values sharing a key are grouped into lists.
    pub group: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Template(Vec<TemplatePart>),
    Heredoc(Heredoc),
    Traversal(Traversal),
    GetAttr {
        object: Box<Expr>,
        name: String,
    },
    Index {
        collection: Box<Expr>,
        key: Box<Expr>,
    },
    Tuple(Vec<Expr>),
    Object(Vec<ObjectItem>),
    FunctionCall {
        name: String,
        args: Vec<Expr>,
        /// The final argument is a collection spread with `...`.
        expand_final: bool,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    For(Box<ForExpr>),
    Parens(Box<Expr>),
}

/// An unevaluated expression with its source range.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub range: SourceRange,
}

impl Expr {
    pub fn new(kind: ExprKind, range: SourceRange) -> Self {
        Expr { kind, range }
    }

    fn synthetic(kind: ExprKind) -> Self {
        Expr {
            kind,
            range: SourceRange::default(),
        }
    }

    pub fn string(s: impl Into<String>) -> Self {
        Expr::synthetic(ExprKind::Literal(Literal::String(s.into())))
    }

    pub fn number(n: f64) -> Self {
        Expr::synthetic(ExprKind::Literal(Literal::Number(n)))
    }

    pub fn bool(b: bool) -> Self {
        Expr::synthetic(ExprKind::Literal(Literal::Bool(b)))
    }

    pub fn null() -> Self {
        Expr::synthetic(ExprKind::Literal(Literal::Null))
    }

    /// A bare identifier, e.g. an enum value such as `SUN`.
    pub fn ident(name: impl Into<String>) -> Self {
        Expr::synthetic(ExprKind::Traversal(Traversal::root(name)))
    }

    pub fn traversal(traversal: Traversal) -> Self {
        Expr::synthetic(ExprKind::Traversal(traversal))
    }

    pub fn tuple(items: Vec<Expr>) -> Self {
        Expr::synthetic(ExprKind::Tuple(items))
    }

    pub fn object(items: Vec<ObjectItem>) -> Self {
        Expr::synthetic(ExprKind::Object(items))
    }

    pub fn heredoc(heredoc: Heredoc) -> Self {
        Expr::synthetic(ExprKind::Heredoc(heredoc))
    }

    /// The string value of a template or literal that has no interpolations.
    pub fn static_string(&self) -> Option<String> {
        match &self.kind {
            ExprKind::Literal(Literal::String(s)) => Some(s.clone()),
            ExprKind::Template(parts) => static_parts(parts),
            ExprKind::Heredoc(h) => static_parts(&h.parts),
            _ => None,
        }
    }

    /// Every scope traversal mentioned anywhere in the expression, in source order.
    /// Variables bound by `for` expressions are not filtered out.
    pub fn traversals(&self) -> Vec<&Traversal> {
        let mut out = Vec::new();
        self.collect_traversals(&mut out);
        out
    }

    fn collect_traversals<'a>(&'a self, out: &mut Vec<&'a Traversal>) {
        match &self.kind {
            ExprKind::Literal(_) => {}
            ExprKind::Template(parts) => collect_parts(parts, out),
            ExprKind::Heredoc(h) => collect_parts(&h.parts, out),
            ExprKind::Traversal(t) => out.push(t),
            ExprKind::GetAttr { object, .. } => object.collect_traversals(out),
            ExprKind::Index { collection, key } => {
                collection.collect_traversals(out);
                key.collect_traversals(out);
            }
            ExprKind::Tuple(items) => items.iter().for_each(|e| e.collect_traversals(out)),
            ExprKind::Object(items) => {
                for item in items {
                    if let ObjectKey::Expr(k) = &item.key {
                        k.collect_traversals(out);
                    }
                    item.value.collect_traversals(out);
                }
            }
            ExprKind::FunctionCall { args, .. } => {
                args.iter().for_each(|e| e.collect_traversals(out))
            }
            ExprKind::Unary { operand, .. } => operand.collect_traversals(out),
            ExprKind::Binary { lhs, rhs, .. } => {
                lhs.collect_traversals(out);
                rhs.collect_traversals(out);
            }
            ExprKind::Conditional {
                condition,
                then,
                otherwise,
            } => {
                condition.collect_traversals(out);
                then.collect_traversals(out);
                otherwise.collect_traversals(out);
            }
            ExprKind::For(f) => {
                f.collection.collect_traversals(out);
                if let Some(k) = &f.key {
                    k.collect_traversals(out);
                }
                f.value.collect_traversals(out);
                if let Some(c) = &f.condition {
                    c.collect_traversals(out);
                }
            }
            ExprKind::Parens(inner) => inner.collect_traversals(out),
        }
    }

    /// Reports whether the expression mentions a traversal starting with `path`
    /// (for example `["atlas", "env"]` matches `atlas.env` and `atlas.env.url`).
    pub fn uses_traversal(&self, path: &[&str]) -> bool {
        self.traversals().iter().any(|t| t.has_prefix(path))
    }
}

fn static_parts(parts: &[TemplatePart]) -> Option<String> {
    let mut s = String::new();
    for part in parts {
        match part {
            TemplatePart::Literal(l) => s.push_str(l),
            TemplatePart::Interpolation(_) => return None,
        }
    }
    Some(s)
}

fn collect_parts<'a>(parts: &'a [TemplatePart], out: &mut Vec<&'a Traversal>) {
    for part in parts {
        if let TemplatePart::Interpolation(e) = part {
            e.collect_traversals(out);
        }
    }
}
