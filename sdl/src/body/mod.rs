use crate::expr::Expr;
use crate::pos::SourceRange;

/// The contents of a document or of a block: attributes and child blocks,
/// each kept in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Body {
    pub attributes: Vec<Attribute>,
    pub blocks: Vec<Block>,
    pub range: SourceRange,
}

impl Body {
    pub fn empty() -> Self {
        Body::default()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.blocks.is_empty()
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Child blocks of the given type, in declaration order.
    pub fn blocks_of<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Block> + 'a {
        self.blocks.iter().filter(move |b| b.kind == kind)
    }
}

/// A named expression inside a body: `name = expr`.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub expr: Expr,
    /// Covers `name = expr`.
    pub range: SourceRange,
    pub name_range: SourceRange,
}

impl Attribute {
    pub fn new(name: impl Into<String>, expr: Expr) -> Self {
        Attribute {
            name: name.into(),
            expr,
            range: SourceRange::default(),
            name_range: SourceRange::default(),
        }
    }
}

/// A block label: `table "users" {}` has the single label `users`.
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub value: String,
    pub range: SourceRange,
}

impl Label {
    pub fn new(value: impl Into<String>) -> Self {
        Label {
            value: value.into(),
            range: SourceRange::default(),
        }
    }
}

/// A typed, labeled node: `kind "label" ... { body }`.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub kind: String,
    pub labels: Vec<Label>,
    pub body: Body,
    pub range: SourceRange,
    pub kind_range: SourceRange,
}

impl Block {
    pub fn new(kind: impl Into<String>) -> Self {
        Block {
            kind: kind.into(),
            labels: Vec::new(),
            body: Body::empty(),
            range: SourceRange::default(),
            kind_range: SourceRange::default(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(Label::new(label));
        self
    }

    pub fn label(&self, idx: usize) -> Option<&str> {
        self.labels.get(idx).map(|l| l.value.as_str())
    }

    pub fn label_values(&self) -> Vec<&str> {
        self.labels.iter().map(|l| l.value.as_str()).collect()
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.body.attribute(name)
    }

    /// The range covering the block header (type and labels).
    pub fn header_range(&self) -> SourceRange {
        match self.labels.last() {
            Some(label) => self.kind_range.to(&label.range),
            None => self.kind_range.clone(),
        }
    }
}
