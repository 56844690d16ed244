//! Built-in functions callable from expressions.

use std::collections::BTreeMap;

use sdl::pos::SourceRange;

use crate::error::{Error, Result};
use crate::value::Value;

pub(crate) fn call(name: &str, args: Vec<Value>, range: &SourceRange) -> Result<Value> {
    let call = Call { name, range };
    match name {
        "length" => {
            call.arity(&args, 1)?;
            let n = match &args[0] {
                Value::String(s) => s.chars().count(),
                Value::List(items) => items.len(),
                Value::Map(m) => m.len(),
                other => return Err(call.mismatch(format!("cannot take the length of {}", other.type_name()))),
            };
            Ok(Value::Number(n as f64))
        }
        "upper" => call.map_string(&args, |s| s.to_uppercase()),
        "lower" => call.map_string(&args, |s| s.to_lowercase()),
        "trimspace" => call.map_string(&args, |s| s.trim().to_string()),
        "title" => call.map_string(&args, |s| {
            let mut out = String::with_capacity(s.len());
            let mut boundary = true;
            for c in s.chars() {
                if boundary {
                    out.extend(c.to_uppercase());
                } else {
                    out.push(c);
                }
                boundary = !c.is_alphanumeric();
            }
            out
        }),
        "format" => {
            let Some((fmt, rest)) = args.split_first() else {
                return Err(call.mismatch("at least one argument is required"));
            };
            let fmt = call.string(fmt)?;
            format(&call, &fmt, rest).map(Value::String)
        }
        "join" => {
            call.arity(&args, 2)?;
            let sep = call.string(&args[0])?;
            let parts = call
                .list(&args[1])?
                .iter()
                .map(|v| call.string(v))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::String(parts.join(&sep)))
        }
        "split" => {
            call.arity(&args, 2)?;
            let sep = call.string(&args[0])?;
            let s = call.string(&args[1])?;
            Ok(Value::List(s.split(sep.as_str()).map(Value::from).collect()))
        }
        "replace" => {
            call.arity(&args, 3)?;
            let s = call.string(&args[0])?;
            let from = call.string(&args[1])?;
            let to = call.string(&args[2])?;
            Ok(Value::String(s.replace(&from, &to)))
        }
        "startswith" | "endswith" => {
            call.arity(&args, 2)?;
            let s = call.string(&args[0])?;
            let affix = call.string(&args[1])?;
            Ok(Value::Bool(if name == "startswith" {
                s.starts_with(&affix)
            } else {
                s.ends_with(&affix)
            }))
        }
        "contains" => {
            call.arity(&args, 2)?;
            Ok(Value::Bool(call.list(&args[0])?.contains(&args[1])))
        }
        "concat" => {
            let mut out = Vec::new();
            for arg in &args {
                out.extend(call.list(arg)?.iter().cloned());
            }
            Ok(Value::List(out))
        }
        "keys" => {
            call.arity(&args, 1)?;
            let m = call.object(&args[0])?;
            Ok(Value::List(m.keys().map(|k| Value::from(k.as_str())).collect()))
        }
        "values" => {
            call.arity(&args, 1)?;
            let m = call.object(&args[0])?;
            Ok(Value::List(m.values().cloned().collect()))
        }
        "lookup" => {
            if args.len() != 2 && args.len() != 3 {
                return Err(call.mismatch("2 or 3 arguments are required"));
            }
            let m = call.object(&args[0])?;
            let key = call.string(&args[1])?;
            match (m.get(&key), args.get(2)) {
                (Some(v), _) => Ok(v.clone()),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => Err(call.mismatch(format!("key {:?} not found", key))),
            }
        }
        "merge" => {
            let mut out = BTreeMap::new();
            for arg in &args {
                if arg.is_null() {
                    continue;
                }
                out.extend(call.object(arg)?.clone());
            }
            Ok(Value::Map(out))
        }
        "coalesce" => args
            .into_iter()
            .find(|v| !v.is_null() && *v != Value::String(String::new()))
            .ok_or_else(|| call.mismatch("no non-null, non-empty-string arguments")),
        "element" => {
            call.arity(&args, 2)?;
            let items = call.list(&args[0])?;
            if items.is_empty() {
                return Err(call.mismatch("cannot use element function with an empty list"));
            }
            let idx = call.index(&args[1])?;
            Ok(items[idx % items.len()].clone())
        }
        "flatten" => {
            call.arity(&args, 1)?;
            let mut out = Vec::new();
            flatten(call.list(&args[0])?, &mut out);
            Ok(Value::List(out))
        }
        "distinct" | "toset" => {
            call.arity(&args, 1)?;
            let mut out: Vec<Value> = Vec::new();
            for item in call.list(&args[0])? {
                if !out.contains(item) {
                    out.push(item.clone());
                }
            }
            Ok(Value::List(out))
        }
        "tolist" => {
            call.arity(&args, 1)?;
            Ok(Value::List(call.list(&args[0])?.to_vec()))
        }
        "tomap" => {
            call.arity(&args, 1)?;
            Ok(Value::Map(call.object(&args[0])?.clone()))
        }
        "tostring" => {
            call.arity(&args, 1)?;
            call.string(&args[0]).map(Value::String)
        }
        "tonumber" => {
            call.arity(&args, 1)?;
            args[0]
                .to_number()
                .map(Value::Number)
                .map_err(|reason| call.mismatch(reason))
        }
        "tobool" => {
            call.arity(&args, 1)?;
            args[0]
                .to_bool()
                .map(Value::Bool)
                .map_err(|reason| call.mismatch(reason))
        }
        "jsonencode" => {
            call.arity(&args, 1)?;
            serde_json::to_string(&args[0])
                .map(Value::String)
                .map_err(|e| call.mismatch(e.to_string()))
        }
        _ => Err(Error::unknown(
            format!("Call to unknown function; There is no function named {:?}.", name),
            range,
        )),
    }
}

struct Call<'a> {
    name: &'a str,
    range: &'a SourceRange,
}

impl Call<'_> {
    fn mismatch(&self, reason: impl AsRef<str>) -> Error {
        Error::type_mismatch(
            format!("Invalid function argument; {}: {}", self.name, reason.as_ref()),
            self.range,
        )
    }

    fn arity(&self, args: &[Value], n: usize) -> Result<()> {
        if args.len() == n {
            Ok(())
        } else {
            Err(self.mismatch(format!(
                "{} argument(s) required, {} given",
                n,
                args.len()
            )))
        }
    }

    fn string(&self, v: &Value) -> Result<String> {
        v.to_string_value().map_err(|reason| self.mismatch(reason))
    }

    fn list<'v>(&self, v: &'v Value) -> Result<&'v [Value]> {
        match v {
            Value::List(items) => Ok(items),
            other => Err(self.mismatch(format!("a list is required, got {}", other.type_name()))),
        }
    }

    fn object<'v>(&self, v: &'v Value) -> Result<&'v BTreeMap<String, Value>> {
        match v {
            Value::Map(m) => Ok(m),
            other => Err(self.mismatch(format!("an object is required, got {}", other.type_name()))),
        }
    }

    fn index(&self, v: &Value) -> Result<usize> {
        let n = v.to_number().map_err(|reason| self.mismatch(reason))?;
        if n < 0.0 || n.fract() != 0.0 {
            return Err(self.mismatch("a non-negative whole number is required"));
        }
        Ok(n as usize)
    }

    fn map_string(&self, args: &[Value], f: impl Fn(&str) -> String) -> Result<Value> {
        self.arity(args, 1)?;
        Ok(Value::String(f(&self.string(&args[0])?)))
    }
}

fn flatten(items: &[Value], out: &mut Vec<Value>) {
    for item in items {
        match item {
            Value::List(inner) => flatten(inner, out),
            other => out.push(other.clone()),
        }
    }
}

/// `format` verbs: `%s`, `%d`, `%v`, `%q` and `%%`.
fn format(call: &Call<'_>, fmt: &str, args: &[Value]) -> Result<String> {
    let mut out = String::new();
    let mut args = args.iter();
    let mut chars = fmt.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let verb = chars
            .next()
            .ok_or_else(|| call.mismatch("format string ends with a lone '%'"))?;
        if verb == '%' {
            out.push('%');
            continue;
        }
        let arg = args
            .next()
            .ok_or_else(|| call.mismatch("not enough arguments for format string"))?;
        match verb {
            's' | 'v' => out.push_str(&call.string(arg).unwrap_or_else(|_| arg.to_string())),
            'd' => {
                let n = arg.to_number().map_err(|reason| call.mismatch(reason))?;
                out.push_str(&(n.trunc() as i64).to_string());
            }
            'q' => out.push_str(&sdl::printer::quote(&call.string(arg)?)),
            other => return Err(call.mismatch(format!("unsupported format verb %{}", other))),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(name: &str, args: Vec<Value>) -> Result<Value> {
        call(name, args, &SourceRange::default())
    }

    #[test]
    fn string_functions() {
        assert_eq!(run("upper", vec!["a8m".into()]).unwrap(), Value::from("A8M"));
        assert_eq!(
            run("format", vec!["%s:%d%%".into(), "host".into(), Value::from(443.0)]).unwrap(),
            Value::from("host:443%")
        );
        assert_eq!(
            run("join", vec!["-".into(), vec!["a", "b"].into()]).unwrap(),
            Value::from("a-b")
        );
    }

    #[test]
    fn toset_removes_duplicates_in_order() {
        let v = run("toset", vec![vec!["b", "a", "b"].into()]).unwrap();
        assert_eq!(v, vec!["b", "a"].into());
    }

    #[test]
    fn unknown_function() {
        let err = run("nope", vec![]).unwrap_err();
        assert!(err.to_string().contains("no function named \"nope\""));
    }
}
