//! Rendering bound values back into document text.

use std::collections::HashMap;
use std::sync::Arc;

use sdl::body::{Attribute, Block, Body, Label};
use sdl::expr::traversal::is_identifier;
use sdl::expr::{Expr, Heredoc, ObjectItem, ObjectKey, TemplatePart};
use sdl::printer::{self, escape_heredoc};

use crate::bind::{self, Bind};
use crate::error::Result;
use crate::registry::{self, Registry};
use crate::resource::{Attr, Resource};
use crate::value::Value;

/// Renders [`Bind`] types and [`Resource`] trees as text.
pub struct Marshaler {
    registry: Arc<Registry>,
    scoped_enums: HashMap<String, Vec<String>>,
}

impl Default for Marshaler {
    fn default() -> Self {
        Marshaler::new(registry::global())
    }
}

impl Marshaler {
    pub fn new(registry: Arc<Registry>) -> Self {
        let scoped_enums = registry.scoped_enums().clone();
        Marshaler {
            registry,
            scoped_enums,
        }
    }

    /// Print `values` bare in the attribute at `path`.
    pub fn with_scoped_enums<S: Into<String>>(
        mut self,
        path: &str,
        values: impl IntoIterator<Item = S>,
    ) -> Self {
        self.scoped_enums
            .entry(path.to_string())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    pub(crate) fn with_enum_table(mut self, enums: &HashMap<String, Vec<String>>) -> Self {
        for (path, values) in enums {
            self.scoped_enums
                .entry(path.clone())
                .or_default()
                .extend(values.iter().cloned());
        }
        self
    }

    pub fn marshal<T: Bind>(&self, value: &T) -> Result<String> {
        let resource = bind::encode(value, &self.registry)?;
        Ok(self.render(&resource))
    }

    /// Render the attributes and children of `root` as a document.
    pub fn render(&self, root: &Resource) -> String {
        printer::format_body(&self.body(root, None))
    }

    fn body(&self, r: &Resource, path: Option<&str>) -> Body {
        let mut body = Body::empty();
        for attr in &r.attrs {
            body.attributes.push(self.attribute(attr, path));
        }
        for child in &r.children {
            let child_path = match path {
                Some(p) => format!("{}.{}", p, child.kind),
                None => child.kind.clone(),
            };
            let mut block = Block::new(child.kind.clone());
            for label in [&child.qualifier, &child.name] {
                if !label.is_empty() {
                    block.labels.push(Label::new(label.clone()));
                }
            }
            block.body = self.body(child, Some(&child_path));
            body.blocks.push(block);
        }
        body
    }

    fn attribute(&self, attr: &Attr, path: Option<&str>) -> Attribute {
        let path = match path {
            Some(p) => format!("{}.{}", p, attr.name),
            None => attr.name.clone(),
        };
        let enums = self.scoped_enums.get(&path).map(Vec::as_slice).unwrap_or(&[]);
        Attribute::new(attr.name.clone(), expr(&attr.value, enums))
    }
}

fn expr(value: &Value, enums: &[String]) -> Expr {
    match value {
        Value::Null => Expr::null(),
        Value::Bool(b) => Expr::bool(*b),
        Value::Number(n) => Expr::number(*n),
        Value::String(s) if enums.iter().any(|e| e == s) => Expr::ident(s.clone()),
        Value::String(s) => heredoc(s).unwrap_or_else(|| Expr::string(s.clone())),
        Value::List(items) => Expr::tuple(items.iter().map(|v| expr(v, enums)).collect()),
        Value::Map(entries) => Expr::object(
            entries
                .iter()
                .map(|(k, v)| ObjectItem {
                    key: if is_identifier(k) {
                        ObjectKey::Ident(k.clone())
                    } else {
                        ObjectKey::Expr(Expr::string(k.clone()))
                    },
                    value: expr(v, &[]),
                })
                .collect(),
        ),
        Value::Ref(r) => match r.traversal() {
            Some(t) => Expr::traversal(t),
            None => Expr::string(r.path.clone()),
        },
    }
}

/// A string written as `<<[-]MARK\n...\nMARK` prints as that heredoc.
fn heredoc(s: &str) -> Option<Expr> {
    let rest = s.strip_prefix("<<")?;
    let (strip_indent, rest) = match rest.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, rest),
    };
    let (marker, rest) = rest.split_once('\n')?;
    if !is_identifier(marker) {
        return None;
    }
    let text = rest.strip_suffix(marker)?;
    if !(text.is_empty() || text.ends_with('\n')) {
        return None;
    }
    Some(Expr::heredoc(Heredoc {
        marker: marker.to_string(),
        strip_indent,
        raw: escape_heredoc(text),
        parts: vec![TemplatePart::Literal(text.to_string())],
    }))
}

/// Render `value` with the process-wide registry.
pub fn marshal<T: Bind>(value: &T) -> Result<String> {
    Marshaler::default().marshal(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Ref;

    fn render(attrs: Vec<Attr>) -> String {
        let mut root = Resource::default();
        root.attrs = attrs;
        Marshaler::new(Arc::new(Registry::default()))
            .with_scoped_enums("mixed1", ["enum"])
            .with_scoped_enums("mixed2", ["enum1", "enum2"])
            .render(&root)
    }

    #[test]
    fn enums_print_bare() {
        let out = render(vec![
            Attr::new("mixed1", vec!["string", "enum"]),
            Attr::new("mixed2", vec!["enum1", "enum2"]),
            Attr::new("mixed3", vec!["string1", "string1"]),
        ]);
        assert_eq!(
            out,
            "mixed1 = [\"string\", enum]\nmixed2 = [enum1, enum2]\nmixed3 = [\"string1\", \"string1\"]\n"
        );
    }

    #[test]
    fn references_print_as_traversals() {
        let out = render(vec![Attr::new(
            "schema",
            Value::Ref(Ref::new("$schema.public")),
        )]);
        assert_eq!(out, "schema = schema.public\n");
    }

    #[test]
    fn heredoc_strings() {
        let out = render(vec![Attr::new("hd", "<<-EOT\n  a ${b}\nEOT")]);
        assert_eq!(out, "hd = <<-EOT\n  a $${b}\nEOT\n");
        assert!(heredoc("<<EOT no newline").is_none());
        assert!(heredoc("<<EOT\nunterminated").is_none());
    }

    #[test]
    fn labels_and_empty_blocks() {
        let mut person = Resource::new("person");
        person.qualifier = "dr".into();
        person.name = "jekyll".into();
        let mut root = Resource::default();
        root.children.push(person);
        let out = Marshaler::new(Arc::new(Registry::default())).render(&root);
        assert_eq!(out, "person \"dr\" \"jekyll\" {\n}\n");
    }
}
