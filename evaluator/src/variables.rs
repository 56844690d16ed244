//! Input variables: `variable "name" { type = ... default = ... }` blocks
//! bound against caller-supplied values.

use std::collections::BTreeMap;

use sdl::body::Block;
use sdl::expr::{Expr, ExprKind, ObjectKey};

use crate::error::{Error, ErrorKind, Result};
use crate::expression::{StaticScope, evaluate};
use crate::value::Value;

/// A variable type constraint.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TypeExpr {
    String,
    Number,
    Bool,
    Any,
    List(Box<TypeExpr>),
    Set(Box<TypeExpr>),
    Map(Box<TypeExpr>),
    Object(Vec<(String, TypeExpr)>),
    Tuple(Vec<TypeExpr>),
}

impl TypeExpr {
    pub fn parse(expr: &Expr) -> Result<TypeExpr> {
        let invalid = |what: &str| {
            Error::type_mismatch(format!("Invalid type specification; {}", what), &expr.range)
        };
        match &expr.kind {
            ExprKind::Traversal(t) if t.steps.is_empty() => match t.root.as_str() {
                "string" => Ok(TypeExpr::String),
                "number" => Ok(TypeExpr::Number),
                "bool" => Ok(TypeExpr::Bool),
                "any" => Ok(TypeExpr::Any),
                other => Err(invalid(&format!("the keyword {:?} is not a type", other))),
            },
            ExprKind::FunctionCall { name, args, .. } => {
                let [arg] = args.as_slice() else {
                    return Err(invalid(&format!("{}() takes exactly one argument", name)));
                };
                match name.as_str() {
                    "list" => Ok(TypeExpr::List(Box::new(TypeExpr::parse(arg)?))),
                    "set" => Ok(TypeExpr::Set(Box::new(TypeExpr::parse(arg)?))),
                    "map" => Ok(TypeExpr::Map(Box::new(TypeExpr::parse(arg)?))),
                    "object" => {
                        let ExprKind::Object(items) = &arg.kind else {
                            return Err(invalid("object() requires an object of attribute types"));
                        };
                        let mut fields = Vec::with_capacity(items.len());
                        for item in items {
                            let key = match &item.key {
                                ObjectKey::Ident(name) => name.clone(),
                                ObjectKey::Expr(e) => e
                                    .static_string()
                                    .ok_or_else(|| invalid("object attribute names must be static"))?,
                            };
                            fields.push((key, TypeExpr::parse(&item.value)?));
                        }
                        Ok(TypeExpr::Object(fields))
                    }
                    "tuple" => {
                        let ExprKind::Tuple(items) = &arg.kind else {
                            return Err(invalid("tuple() requires a list of element types"));
                        };
                        items
                            .iter()
                            .map(TypeExpr::parse)
                            .collect::<Result<Vec<_>>>()
                            .map(TypeExpr::Tuple)
                    }
                    other => Err(invalid(&format!("{}() is not a type constructor", other))),
                }
            }
            _ => Err(invalid("a type keyword or constructor is required")),
        }
    }

    /// Convert `value` to this type. Null converts to every type.
    pub fn convert(&self, value: Value) -> std::result::Result<Value, String> {
        if value.is_null() {
            return Ok(value);
        }
        match self {
            TypeExpr::Any => Ok(value),
            TypeExpr::String => Ok(Value::String(value.to_string_value()?)),
            TypeExpr::Number => Ok(Value::Number(value.to_number()?)),
            TypeExpr::Bool => Ok(Value::Bool(value.to_bool()?)),
            TypeExpr::List(elem) | TypeExpr::Set(elem) => {
                let Value::List(items) = value else {
                    return Err("a list is required".to_string());
                };
                let mut out: Vec<Value> = Vec::with_capacity(items.len());
                for item in items {
                    let item = elem.convert(item)?;
                    if matches!(self, TypeExpr::Set(_)) && out.contains(&item) {
                        continue;
                    }
                    out.push(item);
                }
                Ok(Value::List(out))
            }
            TypeExpr::Map(elem) => {
                let Value::Map(entries) = value else {
                    return Err("a map is required".to_string());
                };
                entries
                    .into_iter()
                    .map(|(k, v)| elem.convert(v).map(|v| (k, v)))
                    .collect::<std::result::Result<BTreeMap<_, _>, _>>()
                    .map(Value::Map)
            }
            TypeExpr::Object(fields) => {
                let Value::Map(mut entries) = value else {
                    return Err("an object is required".to_string());
                };
                let mut out = BTreeMap::new();
                for (name, ty) in fields {
                    let v = entries.remove(name).unwrap_or(Value::Null);
                    out.insert(name.clone(), ty.convert(v)?);
                }
                Ok(Value::Map(out))
            }
            TypeExpr::Tuple(types) => {
                let Value::List(items) = value else {
                    return Err("a tuple is required".to_string());
                };
                if items.len() != types.len() {
                    return Err(format!("a tuple of {} elements is required", types.len()));
                }
                types
                    .iter()
                    .zip(items)
                    .map(|(ty, v)| ty.convert(v))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map(Value::List)
            }
        }
    }
}

/// Bind every declared variable. Caller values win over defaults; values for
/// undeclared names are ignored.
pub(crate) fn bind(
    declared: &[&Block],
    supplied: &BTreeMap<String, Value>,
) -> Result<BTreeMap<String, Value>> {
    let mut out = BTreeMap::new();
    for block in declared {
        let name = block.label(0).unwrap_or_default();
        let context = || format!("variable {:?}", name);
        let ty = match block.attribute("type") {
            Some(attr) => TypeExpr::parse(&attr.expr).map_err(|e| e.with_context(context()))?,
            None => TypeExpr::Any,
        };
        let value = match (supplied.get(name), block.attribute("default")) {
            (Some(v), _) => v.clone(),
            (None, Some(default)) => {
                evaluate(&mut StaticScope, &default.expr).map_err(|e| e.with_context(context()))?
            }
            (None, None) => {
                return Err(Error::at(
                    ErrorKind::UndefinedVariable(name.to_string()),
                    &block.header_range(),
                ));
            }
        };
        let value = ty
            .convert(value)
            .map_err(|reason| Error::new(ErrorKind::TypeMismatch(reason)).with_context(context()))?;
        out.insert(name.to_string(), value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_of(src: &str) -> TypeExpr {
        let file = sdl::parse(&format!("t = {}\n", src), "t.hcl", 0).unwrap();
        TypeExpr::parse(&file.body.attributes[0].expr).unwrap()
    }

    #[test]
    fn parses_type_constructors() {
        assert_eq!(type_of("string"), TypeExpr::String);
        assert_eq!(
            type_of("list(object({ name = string, port = number }))"),
            TypeExpr::List(Box::new(TypeExpr::Object(vec![
                ("name".to_string(), TypeExpr::String),
                ("port".to_string(), TypeExpr::Number),
            ])))
        );
    }

    #[test]
    fn converts_nested_values() {
        let ty = type_of("list(object({ name = string, port = number }))");
        let ok = Value::List(vec![Value::map([
            ("name", Value::from("atlasgo.io")),
            ("port", Value::from("443")),
        ])]);
        assert_eq!(
            ty.convert(ok).unwrap(),
            Value::List(vec![Value::map([
                ("name", Value::from("atlasgo.io")),
                ("port", Value::from(443.0)),
            ])])
        );
        let bad = Value::List(vec![Value::map([
            ("name", Value::from("a")),
            ("port", Value::from("b")),
        ])]);
        assert_eq!(ty.convert(bad).unwrap_err(), "a number is required");
    }

    #[test]
    fn sets_drop_duplicates() {
        let ty = type_of("set(string)");
        let v = ty.convert(vec!["a", "b", "a"].into()).unwrap();
        assert_eq!(v, vec!["a", "b"].into());
    }

    #[test]
    fn missing_required_variable() {
        let file = sdl::parse("variable \"url\" {\n  type = string\n}\n", "", 0).unwrap();
        let blocks: Vec<&Block> = file.body.blocks.iter().collect();
        let err = bind(&blocks, &BTreeMap::new()).unwrap_err();
        assert_eq!(
            err.to_string(),
            ":1,1-15: missing value for required variable \"url\""
        );
    }
}
