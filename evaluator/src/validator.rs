//! Schema validators observe every evaluated block and attribute once, in
//! document order, before the document is bound.

use tracing::debug;

use crate::error::{Error, ErrorKind, Result};
use crate::registry::Registry;
use crate::resource::{Attr, Resource};

/// Work deferred until the whole document validated cleanly.
pub type Commit = Box<dyn FnOnce() -> anyhow::Result<()>>;

fn noop() -> Commit {
    Box::new(|| Ok(()))
}

pub trait SchemaValidator {
    fn validate_block(&mut self, block: &Resource) -> anyhow::Result<Commit>;

    fn validate_attribute(&mut self, _attr: &Attr) -> anyhow::Result<Commit> {
        Ok(noop())
    }

    /// Findings accumulated over the walk. Any finding fails the evaluation.
    fn finish(&mut self) -> Vec<String> {
        Vec::new()
    }
}

/// Walk `document` with every registered validator. Commits run only when no
/// validator reported anything.
pub(crate) fn validate(registry: &Registry, document: &Resource) -> Result<()> {
    if registry.validators().is_empty() {
        return Ok(());
    }
    let mut findings = Vec::new();
    let mut commits = Vec::new();
    for factory in registry.validators() {
        let mut validator = factory();
        let mut walk = Walk {
            validator: validator.as_mut(),
            findings: &mut findings,
            commits: &mut commits,
        };
        for attr in &document.attrs {
            walk.attribute(attr);
        }
        for child in &document.children {
            walk.block(child);
        }
        findings.extend(validator.finish());
    }
    debug!(
        findings = findings.len(),
        commits = commits.len(),
        "schema validation done"
    );
    if !findings.is_empty() {
        return Err(Error::new(ErrorKind::Validation(findings)));
    }
    for commit in commits {
        commit().map_err(|e| Error::new(ErrorKind::Validation(vec![e.to_string()])))?;
    }
    Ok(())
}

struct Walk<'a> {
    validator: &'a mut dyn SchemaValidator,
    findings: &'a mut Vec<String>,
    commits: &'a mut Vec<Commit>,
}

impl Walk<'_> {
    fn record(&mut self, result: anyhow::Result<Commit>) {
        match result {
            Ok(commit) => self.commits.push(commit),
            Err(e) => self.findings.push(e.to_string()),
        }
    }

    fn attribute(&mut self, attr: &Attr) {
        let result = self.validator.validate_attribute(attr);
        self.record(result);
    }

    fn block(&mut self, block: &Resource) {
        let result = self.validator.validate_block(block);
        self.record(result);
        for attr in &block.attrs {
            self.attribute(attr);
        }
        for child in &block.children {
            self.block(child);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Default)]
    struct Counts {
        blocks: usize,
        attrs: usize,
        committed: usize,
    }

    struct Counter {
        counts: Arc<Mutex<Counts>>,
        reject: Option<&'static str>,
    }

    impl SchemaValidator for Counter {
        fn validate_block(&mut self, block: &Resource) -> anyhow::Result<Commit> {
            if Some(block.name.as_str()) == self.reject {
                anyhow::bail!("block {} is not allowed", block.name);
            }
            self.counts.lock().unwrap().blocks += 1;
            let counts = self.counts.clone();
            Ok(Box::new(move || {
                counts.lock().unwrap().committed += 1;
                Ok(())
            }))
        }

        fn validate_attribute(&mut self, _: &Attr) -> anyhow::Result<Commit> {
            self.counts.lock().unwrap().attrs += 1;
            Ok(noop())
        }
    }

    fn document() -> Resource {
        let mut root = Resource::default();
        root.attrs.push(Attr::new("attr1", "a"));
        for name in ["a", "b"] {
            let mut block = Resource::new("block");
            block.name = name.into();
            block.attrs.push(Attr::new("x", 1.0));
            root.children.push(block);
        }
        root
    }

    fn registry(counts: &Arc<Mutex<Counts>>, reject: Option<&'static str>) -> Registry {
        let counts = counts.clone();
        Registry::builder()
            .schema_validator(move || {
                Box::new(Counter {
                    counts: counts.clone(),
                    reject,
                }) as Box<dyn SchemaValidator>
            })
            .build()
    }

    #[test]
    fn visits_every_node_and_commits() {
        let counts = Arc::new(Mutex::new(Counts::default()));
        validate(&registry(&counts, None), &document()).unwrap();
        let c = counts.lock().unwrap();
        assert_eq!((c.blocks, c.attrs, c.committed), (2, 3, 2));
    }

    #[test]
    fn findings_skip_commits() {
        let counts = Arc::new(Mutex::new(Counts::default()));
        let err = validate(&registry(&counts, Some("a")), &document()).unwrap_err();
        assert_eq!(err.to_string(), "block a is not allowed");
        let c = counts.lock().unwrap();
        // The walk continues past the failing block.
        assert_eq!((c.blocks, c.attrs, c.committed), (1, 3, 0));
    }
}
