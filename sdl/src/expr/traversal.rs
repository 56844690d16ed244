use crate::expr::Literal;
use crate::pos::SourceRange;

/// One step after the root of a traversal.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// `.name`
    Attr { name: String, range: SourceRange },
    /// `[key]` with a literal key.
    Index { key: Literal, range: SourceRange },
}

impl Step {
    pub fn range(&self) -> &SourceRange {
        match self {
            Step::Attr { range, .. } | Step::Index { range, .. } => range,
        }
    }

    /// The step as a path segment: attribute names and string or integral keys.
    pub fn segment(&self) -> Option<String> {
        match self {
            Step::Attr { name, .. } => Some(name.clone()),
            Step::Index {
                key: Literal::String(s),
                ..
            } => Some(s.clone()),
            Step::Index {
                key: Literal::Number(n),
                ..
            } if n.fract() == 0.0 => Some(format!("{}", *n as i64)),
            Step::Index { .. } => None,
        }
    }
}

/// A static path rooted at a name in scope: `data.sql.tenants.output`,
/// `table["users"].column.id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Traversal {
    pub root: String,
    pub root_range: SourceRange,
    pub steps: Vec<Step>,
}

impl Traversal {
    pub fn root(name: impl Into<String>) -> Self {
        Traversal {
            root: name.into(),
            root_range: SourceRange::default(),
            steps: Vec::new(),
        }
    }

    /// Build a traversal from path segments, using index steps for segments
    /// that are not valid identifiers.
    pub fn from_segments<S: AsRef<str>>(segments: &[S]) -> Option<Self> {
        let (first, rest) = segments.split_first()?;
        let mut t = Traversal::root(first.as_ref());
        for seg in rest {
            let seg = seg.as_ref();
            if is_identifier(seg) {
                t.steps.push(Step::Attr {
                    name: seg.to_string(),
                    range: SourceRange::default(),
                });
            } else {
                t.steps.push(Step::Index {
                    key: Literal::String(seg.to_string()),
                    range: SourceRange::default(),
                });
            }
        }
        Some(t)
    }

    pub fn attr(mut self, name: impl Into<String>) -> Self {
        self.steps.push(Step::Attr {
            name: name.into(),
            range: SourceRange::default(),
        });
        self
    }

    /// Range from the root through the last step.
    pub fn range(&self) -> SourceRange {
        match self.steps.last() {
            Some(step) => self.root_range.to(step.range()),
            None => self.root_range.clone(),
        }
    }

    /// Range from the root through step `n` (exclusive), i.e. the first `n` steps.
    pub fn range_through(&self, n: usize) -> SourceRange {
        match n.checked_sub(1).and_then(|i| self.steps.get(i)) {
            Some(step) => self.root_range.to(step.range()),
            None => self.root_range.clone(),
        }
    }

    /// Root and every step rendered as path segments; `None` for dynamic keys.
    pub fn segments(&self) -> Option<Vec<String>> {
        let mut out = vec![self.root.clone()];
        for step in &self.steps {
            out.push(step.segment()?);
        }
        Some(out)
    }

    pub fn has_prefix(&self, path: &[&str]) -> bool {
        let Some((first, rest)) = path.split_first() else {
            return true;
        };
        if self.root != *first || rest.len() > self.steps.len() {
            return false;
        }
        rest.iter()
            .zip(&self.steps)
            .all(|(want, step)| step.segment().as_deref() == Some(*want))
    }

    /// Dotted rendering used in messages: `data.sql.tenants.output`.
    pub fn dotted(&self) -> String {
        let mut s = self.root.clone();
        for step in &self.steps {
            match step.segment() {
                Some(seg) if is_identifier(&seg) => {
                    s.push('.');
                    s.push_str(&seg);
                }
                Some(seg) => s.push_str(&format!("[{:?}]", seg)),
                None => s.push_str("[?]"),
            }
        }
        s
    }
}

/// Identifiers start with a letter or underscore and continue with letters,
/// digits, underscores or dashes.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}
