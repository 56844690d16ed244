//! `sdl.toml`: input variables and scoped enums for a project.
//!
//! ```toml
//! [variables]
//! tenants = ["atlas", "ent"]
//!
//! [enums]
//! "env.driver" = ["MYSQL", "POSTGRES"]
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, bail};
use evaluator::{Value, Variables};
use serde::Deserialize;

pub const DEFAULT_PATH: &str = "sdl.toml";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub variables: BTreeMap<String, toml::Value>,
    /// Attribute path to the identifiers accepted bare there.
    #[serde(default)]
    pub enums: BTreeMap<String, Vec<String>>,
}

impl Config {
    /// Load `path`. A missing file at the default location is an empty config.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Config> {
        let (path, explicit) = match path {
            Some(p) => (p, true),
            None => (Path::new(DEFAULT_PATH), false),
        };
        if !explicit && !path.exists() {
            return Ok(Config::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read '{}'", path.display()))?;
        toml::from_str(&text).with_context(|| format!("invalid config '{}'", path.display()))
    }

    /// Config variables overridden by `--var` flags.
    pub fn variables(&self, overrides: &[String]) -> anyhow::Result<Variables> {
        let mut vars: Variables = self
            .variables
            .iter()
            .map(|(k, v)| (k.clone(), from_toml(v)))
            .collect();
        for flag in overrides {
            let Some((key, value)) = flag.split_once('=') else {
                bail!("invalid --var '{}': expected key=value", flag);
            };
            vars.insert(key.trim().to_string(), parse_var(value));
        }
        Ok(vars)
    }
}

/// Numbers become numbers, `true`/`false` become bools, everything else is a string.
fn parse_var(s: &str) -> Value {
    if let Ok(n) = s.parse::<f64>() {
        return Value::Number(n);
    }
    match s {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(s.to_string()),
    }
}

fn from_toml(v: &toml::Value) -> Value {
    match v {
        toml::Value::String(s) => Value::String(s.clone()),
        toml::Value::Integer(n) => Value::Number(*n as f64),
        toml::Value::Float(n) => Value::Number(*n),
        toml::Value::Boolean(b) => Value::Bool(*b),
        toml::Value::Datetime(d) => Value::String(d.to_string()),
        toml::Value::Array(items) => Value::List(items.iter().map(from_toml).collect()),
        toml::Value::Table(t) => Value::Map(
            t.iter()
                .map(|(k, v)| (k.clone(), from_toml(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_variables_and_enums() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sdl.toml");
        std::fs::write(
            &path,
            "[variables]\ntenants = [\"atlas\", \"ent\"]\nport = 3306\n\n[enums]\n\"env.driver\" = [\"MYSQL\"]\n",
        )
        .unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.enums["env.driver"], vec!["MYSQL"]);

        let vars = config.variables(&["port=5432".into(), "debug=true".into()]).unwrap();
        assert_eq!(vars["tenants"], Value::from(vec!["atlas", "ent"]));
        assert_eq!(vars["port"], Value::Number(5432.0));
        assert_eq!(vars["debug"], Value::Bool(true));
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().starts_with("cannot read"));
    }

    #[test]
    fn malformed_var_flag() {
        let err = Config::default().variables(&["novalue".into()]).unwrap_err();
        assert_eq!(err.to_string(), "invalid --var 'novalue': expected key=value");
    }
}
