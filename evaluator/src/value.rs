use std::collections::BTreeMap;
use std::fmt;

use sdl::expr::Traversal;
use sdl::expr::traversal::is_identifier;
use sdl::printer::{format_number, quote};
use serde::Serialize;

/// A fully evaluated value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    /// Keys are kept sorted, which makes iteration order deterministic.
    Map(BTreeMap<String, Value>),
    Ref(Ref),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "object",
            Value::Ref(_) => "reference",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Attribute lookup on an object value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(m) => m.get(key),
            _ => None,
        }
    }

    /// String conversion: numbers and bools convert to their literal text.
    pub fn to_string_value(&self) -> Result<String, &'static str> {
        match self {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(format_number(*n)),
            Value::Bool(b) => Ok(b.to_string()),
            _ => Err("a string is required"),
        }
    }

    /// Number conversion: strings holding a decimal number convert.
    pub fn to_number(&self) -> Result<f64, &'static str> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::String(s) => s.trim().parse::<f64>().map_err(|_| "a number is required"),
            _ => Err("a number is required"),
        }
    }

    /// Bool conversion: the strings `"true"` and `"false"` convert.
    pub fn to_bool(&self) -> Result<bool, &'static str> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::String(s) if s == "true" => Ok(true),
            Value::String(s) if s == "false" => Ok(false),
            _ => Err("a bool is required"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} = {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Ref(r) => write!(f, "{}", r.path),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<V: Into<Value>> From<Vec<V>> for Value {
    fn from(items: Vec<V>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

/// A resolved pointer to a block, e.g. `$table.users.column.id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Ref {
    pub path: String,
}

impl Ref {
    pub fn new(path: impl Into<String>) -> Self {
        Ref { path: path.into() }
    }

    /// Build the canonical path from block types and labels.
    pub fn from_segments<S: AsRef<str>>(segments: &[S]) -> Self {
        let mut path = String::from("$");
        for (i, seg) in segments.iter().enumerate() {
            let seg = seg.as_ref();
            if is_identifier(seg) {
                if i > 0 {
                    path.push('.');
                }
                path.push_str(seg);
            } else {
                path.push('[');
                path.push_str(&quote(seg));
                path.push(']');
            }
        }
        Ref { path }
    }

    /// The path split back into its segments.
    pub fn segments(&self) -> Vec<String> {
        let mut out = Vec::new();
        let path = self.path.strip_prefix('$').unwrap_or(&self.path);
        let mut chars = path.chars().peekable();
        let mut current = String::new();
        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    if !current.is_empty() {
                        out.push(std::mem::take(&mut current));
                    }
                }
                '[' if chars.peek() == Some(&'"') => {
                    if !current.is_empty() {
                        out.push(std::mem::take(&mut current));
                    }
                    chars.next();
                    let mut seg = String::new();
                    while let Some(c) = chars.next() {
                        match c {
                            '\\' => match chars.next() {
                                Some('n') => seg.push('\n'),
                                Some('t') => seg.push('\t'),
                                Some('r') => seg.push('\r'),
                                Some(other) => seg.push(other),
                                None => {}
                            },
                            '"' => break,
                            c => seg.push(c),
                        }
                    }
                    if chars.peek() == Some(&']') {
                        chars.next();
                    }
                    out.push(seg);
                }
                c => current.push(c),
            }
        }
        if !current.is_empty() {
            out.push(current);
        }
        out
    }

    /// The path as a traversal expression, for printing.
    pub fn traversal(&self) -> Option<Traversal> {
        Traversal::from_segments(&self.segments())
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_paths() {
        let r = Ref::from_segments(&["table", "users", "column", "id"]);
        assert_eq!(r.path, "$table.users.column.id");
        assert_eq!(r.segments(), vec!["table", "users", "column", "id"]);

        let r = Ref::from_segments(&["table", "my users"]);
        assert_eq!(r.path, "$table[\"my users\"]");
        assert_eq!(r.segments(), vec!["table", "my users"]);
    }

    #[test]
    fn conversions() {
        assert_eq!(Value::from("443").to_number(), Ok(443.0));
        assert_eq!(Value::from("b").to_number(), Err("a number is required"));
        assert_eq!(Value::from(443.0).to_string_value().unwrap(), "443");
        assert_eq!(Value::from("true").to_bool(), Ok(true));
    }

    #[test]
    fn serializes_as_plain_json() {
        let v = Value::map([
            ("a", Value::from(1.5)),
            ("r", Value::Ref(Ref::new("$schema.public"))),
            ("n", Value::Null),
        ]);
        assert_eq!(
            serde_json::to_string(&v).unwrap(),
            r#"{"a":1.5,"n":null,"r":"$schema.public"}"#
        );
    }
}
