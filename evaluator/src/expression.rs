//! Evaluation of `sdl` expressions against a scope of named values.

use std::collections::BTreeMap;

use sdl::expr::{
    BinaryOp, Expr, ExprKind, ForExpr, Literal, ObjectKey, Step, TemplatePart, Traversal, UnaryOp,
};
use sdl::pos::SourceRange;

use crate::error::{Error, Result};
use crate::functions;
use crate::value::{Ref, Value};

/// The names an expression can see.
pub(crate) trait Scope {
    /// Resolve a traversal's root, returning its value and how many of the
    /// traversal's steps were consumed doing so. Remaining steps are applied
    /// to the returned value.
    fn resolve(&mut self, traversal: &Traversal) -> Result<(Value, usize)>;

    /// Read attribute `name` of the block a reference points to.
    fn ref_attr(&mut self, r: &Ref, name: &str, range: &SourceRange) -> Result<Value>;
}

/// A scope with no names at all, used for variable defaults.
pub(crate) struct StaticScope;

impl Scope for StaticScope {
    fn resolve(&mut self, traversal: &Traversal) -> Result<(Value, usize)> {
        Err(Error::unknown(
            format!(
                "Variables not allowed; {} cannot be referenced here",
                traversal.dotted()
            ),
            &traversal.range(),
        ))
    }

    fn ref_attr(&mut self, r: &Ref, _name: &str, range: &SourceRange) -> Result<Value> {
        Err(Error::unknown(
            format!("Variables not allowed; {} cannot be referenced here", r),
            range,
        ))
    }
}

pub(crate) fn evaluate<S: Scope + ?Sized>(scope: &mut S, expr: &Expr) -> Result<Value> {
    Evaluator {
        scope,
        bindings: Vec::new(),
    }
    .eval(expr)
}

struct Evaluator<'s, S: ?Sized> {
    scope: &'s mut S,
    /// Variables bound by enclosing `for` expressions, innermost last.
    bindings: Vec<(String, Value)>,
}

impl<S: Scope + ?Sized> Evaluator<'_, S> {
    fn eval(&mut self, expr: &Expr) -> Result<Value> {
        match &expr.kind {
            ExprKind::Literal(lit) => Ok(literal(lit)),
            ExprKind::Template(parts) => self.template(parts),
            ExprKind::Heredoc(h) => self.template(&h.parts),
            ExprKind::Traversal(t) => self.traversal(t),
            ExprKind::GetAttr { object, name } => {
                let value = self.eval(object)?;
                self.get_attr(value, name, &expr.range)
            }
            ExprKind::Index { collection, key } => {
                let value = self.eval(collection)?;
                let key = self.eval(key)?;
                self.index(value, &key, &expr.range)
            }
            ExprKind::Tuple(items) => items
                .iter()
                .map(|e| self.eval(e))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            ExprKind::Object(items) => {
                let mut out = BTreeMap::new();
                for item in items {
                    let key = match &item.key {
                        ObjectKey::Ident(name) => name.clone(),
                        ObjectKey::Expr(e) => self.eval(e)?.to_string_value().map_err(|_| {
                            Error::type_mismatch("Invalid object key; a string is required", &e.range)
                        })?,
                    };
                    out.insert(key, self.eval(&item.value)?);
                }
                Ok(Value::Map(out))
            }
            ExprKind::FunctionCall {
                name,
                args,
                expand_final,
            } => {
                let mut values = args
                    .iter()
                    .map(|e| self.eval(e))
                    .collect::<Result<Vec<_>>>()?;
                if *expand_final {
                    match values.pop() {
                        Some(Value::List(items)) => values.extend(items),
                        Some(other) => {
                            return Err(Error::type_mismatch(
                                format!(
                                    "Invalid expanding argument value; a list is required, got {}",
                                    other.type_name()
                                ),
                                &expr.range,
                            ));
                        }
                        None => {}
                    }
                }
                functions::call(name, values, &expr.range)
            }
            ExprKind::Unary { op, operand } => {
                let value = self.eval(operand)?;
                match op {
                    UnaryOp::Negate => Ok(Value::Number(-number(&value, &operand.range)?)),
                    UnaryOp::Not => Ok(Value::Bool(!boolean(&value, &operand.range)?)),
                }
            }
            ExprKind::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs),
            ExprKind::Conditional {
                condition,
                then,
                otherwise,
            } => {
                let cond = self.eval(condition)?;
                if boolean(&cond, &condition.range)? {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            ExprKind::For(f) => self.for_expr(f, &expr.range),
            ExprKind::Parens(inner) => self.eval(inner),
        }
    }

    fn template(&mut self, parts: &[TemplatePart]) -> Result<Value> {
        // A lone interpolation yields its value unchanged.
        if let [TemplatePart::Interpolation(e)] = parts {
            return self.eval(e);
        }
        let mut out = String::new();
        for part in parts {
            match part {
                TemplatePart::Literal(s) => out.push_str(s),
                TemplatePart::Interpolation(e) => {
                    let value = self.eval(e)?;
                    let s = value.to_string_value().map_err(|_| {
                        Error::type_mismatch(
                            format!(
                                "Invalid template interpolation value; cannot include a {} in a string",
                                value.type_name()
                            ),
                            &e.range,
                        )
                    })?;
                    out.push_str(&s);
                }
            }
        }
        Ok(Value::String(out))
    }

    fn traversal(&mut self, t: &Traversal) -> Result<Value> {
        let bound = self
            .bindings
            .iter()
            .rev()
            .find(|(name, _)| *name == t.root)
            .map(|(_, v)| v.clone());
        let (mut value, consumed) = match bound {
            Some(v) => (v, 0),
            None => self.scope.resolve(t)?,
        };
        for step in &t.steps[consumed.min(t.steps.len())..] {
            value = match step {
                Step::Attr { name, range } => self.get_attr(value, name, range)?,
                Step::Index { key, range } => self.index(value, &literal(key), range)?,
            };
        }
        Ok(value)
    }

    fn get_attr(&mut self, value: Value, name: &str, range: &SourceRange) -> Result<Value> {
        match value {
            Value::Map(mut m) => m.remove(name).ok_or_else(|| {
                Error::unknown(
                    format!(
                        "Unsupported attribute; This object does not have an attribute named {:?}.",
                        name
                    ),
                    range,
                )
            }),
            Value::Ref(r) => self.scope.ref_attr(&r, name, range),
            Value::Null => Err(Error::type_mismatch(
                "Attempt to get attribute from null value",
                range,
            )),
            other => Err(Error::type_mismatch(
                format!(
                    "Unsupported attribute; Can't access attributes on a {}.",
                    other.type_name()
                ),
                range,
            )),
        }
    }

    fn index(&mut self, value: Value, key: &Value, range: &SourceRange) -> Result<Value> {
        match value {
            Value::List(mut items) => {
                let n = number(key, range)?;
                if n < 0.0 || n.fract() != 0.0 || n as usize >= items.len() {
                    return Err(Error::type_mismatch(
                        format!(
                            "Invalid index; the collection has {} elements",
                            items.len()
                        ),
                        range,
                    ));
                }
                Ok(items.swap_remove(n as usize))
            }
            Value::Map(_) | Value::Ref(_) => {
                let key = key.to_string_value().map_err(|reason| {
                    Error::type_mismatch(format!("Invalid index; {}", reason), range)
                })?;
                self.get_attr(value, &key, range)
            }
            other => Err(Error::type_mismatch(
                format!("Invalid index; cannot index a {}", other.type_name()),
                range,
            )),
        }
    }

    fn binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Result<Value> {
        // Logical operators short-circuit.
        match op {
            BinaryOp::And => {
                let l = self.eval(lhs)?;
                if !boolean(&l, &lhs.range)? {
                    return Ok(Value::Bool(false));
                }
                let r = self.eval(rhs)?;
                return Ok(Value::Bool(boolean(&r, &rhs.range)?));
            }
            BinaryOp::Or => {
                let l = self.eval(lhs)?;
                if boolean(&l, &lhs.range)? {
                    return Ok(Value::Bool(true));
                }
                let r = self.eval(rhs)?;
                return Ok(Value::Bool(boolean(&r, &rhs.range)?));
            }
            _ => {}
        }

        let l = self.eval(lhs)?;
        let r = self.eval(rhs)?;
        match op {
            BinaryOp::Equal => return Ok(Value::Bool(l == r)),
            BinaryOp::NotEqual => return Ok(Value::Bool(l != r)),
            _ => {}
        }
        let a = number(&l, &lhs.range)?;
        let b = number(&r, &rhs.range)?;
        let range = lhs.range.to(&rhs.range);
        Ok(match op {
            BinaryOp::Add => Value::Number(a + b),
            BinaryOp::Subtract => Value::Number(a - b),
            BinaryOp::Multiply => Value::Number(a * b),
            BinaryOp::Divide => {
                if b == 0.0 {
                    return Err(Error::type_mismatch("Divide by zero", &range));
                }
                Value::Number(a / b)
            }
            BinaryOp::Modulo => {
                if b == 0.0 {
                    return Err(Error::type_mismatch("Divide by zero", &range));
                }
                Value::Number(a % b)
            }
            BinaryOp::Greater => Value::Bool(a > b),
            BinaryOp::Less => Value::Bool(a < b),
            BinaryOp::GreaterOrEqual => Value::Bool(a >= b),
            BinaryOp::LessOrEqual => Value::Bool(a <= b),
            BinaryOp::And | BinaryOp::Or | BinaryOp::Equal | BinaryOp::NotEqual => {
                unreachable!("handled above")
            }
        })
    }

    fn for_expr(&mut self, f: &ForExpr, range: &SourceRange) -> Result<Value> {
        let collection = self.eval(&f.collection)?;
        let pairs: Vec<(Value, Value)> = match collection {
            Value::List(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (Value::Number(i as f64), v))
                .collect(),
            Value::Map(m) => m.into_iter().map(|(k, v)| (Value::String(k), v)).collect(),
            other => {
                return Err(Error::type_mismatch(
                    format!(
                        "Iteration over non-iterable value; a list or object is required, got {}",
                        other.type_name()
                    ),
                    &f.collection.range,
                ));
            }
        };

        let mut list = Vec::new();
        let mut map: BTreeMap<String, Value> = BTreeMap::new();
        for (key, value) in pairs {
            let depth = self.bindings.len();
            if let Some(k) = &f.key_var {
                self.bindings.push((k.clone(), key));
            }
            self.bindings.push((f.value_var.clone(), value));
            let result = self.for_item(f, range, &mut list, &mut map);
            self.bindings.truncate(depth);
            result?;
        }
        Ok(if f.key.is_some() {
            Value::Map(map)
        } else {
            Value::List(list)
        })
    }

    fn for_item(
        &mut self,
        f: &ForExpr,
        range: &SourceRange,
        list: &mut Vec<Value>,
        map: &mut BTreeMap<String, Value>,
    ) -> Result<()> {
        if let Some(cond) = &f.condition {
            let keep = self.eval(cond)?;
            if !boolean(&keep, &cond.range)? {
                return Ok(());
            }
        }
        let value = self.eval(&f.value)?;
        let Some(key_expr) = &f.key else {
            list.push(value);
            return Ok(());
        };
        let key = self.eval(key_expr)?.to_string_value().map_err(|_| {
            Error::type_mismatch("Invalid object key; a string is required", &key_expr.range)
        })?;
        if f.group {
            match map.entry(key).or_insert_with(|| Value::List(Vec::new())) {
                Value::List(items) => items.push(value),
                _ => unreachable!("grouped entries are lists"),
            }
        } else if map.insert(key.clone(), value).is_some() {
            return Err(Error::type_mismatch(
                format!(
                    "Duplicate object key; two elements produced the key {:?}; use `...` to group them",
                    key
                ),
                range,
            ));
        }
        Ok(())
    }
}

fn literal(lit: &Literal) -> Value {
    match lit {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Number(n) => Value::Number(*n),
        Literal::String(s) => Value::String(s.clone()),
    }
}

fn number(value: &Value, range: &SourceRange) -> Result<f64> {
    value
        .to_number()
        .map_err(|reason| Error::type_mismatch(format!("Invalid operand; {}", reason), range))
}

fn boolean(value: &Value, range: &SourceRange) -> Result<bool> {
    value
        .to_bool()
        .map_err(|reason| Error::type_mismatch(format!("Invalid operand; {}", reason), range))
}
