//! The generic evaluated tree. Typed targets bind from it, and an extension
//! field keeps the parts of it no other field claimed.

use serde::Serialize;

use sdl::pos::SourceRange;

use crate::bind::{self, Bind};
use crate::error::Result;
use crate::registry::{self, Registry};
use crate::value::Value;

/// An evaluated block.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Resource {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub qualifier: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attrs: Vec<Attr>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Resource>,
    /// Set only when position tracking is enabled.
    #[serde(skip)]
    pub range: Option<SourceRange>,
    /// Where the block was read from, for error messages.
    #[serde(skip)]
    pub(crate) origin: SourceRange,
}

/// An evaluated attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attr {
    pub name: String,
    pub value: Value,
    #[serde(skip)]
    pub range: Option<SourceRange>,
    #[serde(skip)]
    pub(crate) origin: SourceRange,
}

impl Attr {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Attr {
            name: name.into(),
            value: value.into(),
            range: None,
            origin: SourceRange::default(),
        }
    }

    pub fn range(&self) -> Option<&SourceRange> {
        self.range.as_ref()
    }
}

impl Resource {
    pub fn new(kind: impl Into<String>) -> Self {
        Resource {
            kind: kind.into(),
            ..Resource::default()
        }
    }

    pub fn attr(&self, name: &str) -> Option<&Attr> {
        self.attrs.iter().find(|a| a.name == name)
    }

    /// The first child block of the given type.
    pub fn resource(&self, kind: &str) -> Option<&Resource> {
        self.children.iter().find(|r| r.kind == kind)
    }

    pub fn resources(&self, kind: &str) -> Vec<&Resource> {
        self.children.iter().filter(|r| r.kind == kind).collect()
    }

    pub fn range(&self) -> Option<&SourceRange> {
        self.range.as_ref()
    }

    /// Bind this resource into `T`, resolving polymorphic blocks through the
    /// process-wide registry.
    pub fn decode<T: Bind>(&self) -> Result<T> {
        self.decode_with(&registry::global())
    }

    pub fn decode_with<T: Bind>(&self, registry: &Registry) -> Result<T> {
        let mut target = T::default();
        bind::decode_into(&mut target, self, registry)?;
        Ok(target)
    }

    /// Range for error messages: the exposed range, else the origin.
    pub(crate) fn error_range(&self) -> &SourceRange {
        self.range.as_ref().unwrap_or(&self.origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Resource {
        let mut root = Resource::default();
        root.attrs.push(Attr::new("baz", 1.0));
        let mut foo = Resource::new("foo");
        foo.name = "a".into();
        root.children.push(foo.clone());
        foo.name = "b".into();
        root.children.push(foo);
        root
    }

    #[test]
    fn lookups() {
        let root = sample();
        assert_eq!(root.attr("baz").map(|a| &a.value), Some(&Value::Number(1.0)));
        assert_eq!(root.resource("foo").map(|r| r.name.as_str()), Some("a"));
        assert_eq!(root.resources("foo").len(), 2);
        assert!(root.resource("bar").is_none());
        assert!(root.range().is_none());
    }

    #[test]
    fn serializes_without_positions() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert_eq!(
            json,
            r#"{"name":"","type":"","attrs":[{"name":"baz","value":1.0}],"children":[{"name":"a","type":"foo"},{"name":"b","type":"foo"}]}"#
        );
    }
}
