use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use sdl::File;
use tracing::debug;

use crate::bind::{self, Bind};
use crate::environment::{EvalContext, Options};
use crate::error::{Error, ErrorKind, Result};
use crate::marshal::Marshaler;
use crate::registry::{self, Registry};
use crate::resource::Resource;
use crate::validator;
use crate::value::Value;

/// Input variables supplied by the caller, keyed by variable name.
pub type Variables = BTreeMap<String, Value>;

/// Evaluates documents into [`Resource`] trees and typed targets.
pub struct Evaluator {
    registry: Arc<Registry>,
    options: Options,
}

impl Default for Evaluator {
    fn default() -> Self {
        Evaluator::new()
    }
}

impl Evaluator {
    /// An evaluator backed by the process-wide registry.
    pub fn new() -> Self {
        Evaluator::with_registry(registry::global())
    }

    pub fn with_registry(registry: Arc<Registry>) -> Self {
        let options = Options {
            with_pos: false,
            scoped_enums: registry.scoped_enums().clone(),
        };
        Evaluator { registry, options }
    }

    /// Keep source ranges on the evaluated tree.
    pub fn with_pos(mut self) -> Self {
        self.options.with_pos = true;
        self
    }

    /// Accept `values` as bare identifiers in the attribute at `path`.
    pub fn with_scoped_enums<S: Into<String>>(
        mut self,
        path: &str,
        values: impl IntoIterator<Item = S>,
    ) -> Self {
        self.options
            .scoped_enums
            .entry(path.to_string())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Evaluate `source` as an unnamed document into `target`.
    pub fn eval_source<T: Bind>(&self, source: &str, target: &mut T, vars: &Variables) -> Result<()> {
        let file = parse(source, "", 0)?;
        self.eval_parsed(std::slice::from_ref(&file), target, vars)
    }

    pub fn eval_file<T: Bind>(
        &self,
        path: impl AsRef<Path>,
        target: &mut T,
        vars: &Variables,
    ) -> Result<()> {
        self.eval_files(&[path], target, vars)
    }

    /// Evaluate several files as one document.
    pub fn eval_files<T: Bind, P: AsRef<Path>>(
        &self,
        paths: &[P],
        target: &mut T,
        vars: &Variables,
    ) -> Result<()> {
        let files = read_files(paths)?;
        self.eval_parsed(&files, target, vars)
    }

    pub fn eval_parsed<T: Bind>(&self, files: &[File], target: &mut T, vars: &Variables) -> Result<()> {
        let document = self.eval_resource(files, vars)?;
        bind::decode_into(target, &document, &self.registry)
    }

    /// Evaluate and validate `files`, returning the untyped tree.
    pub fn eval_resource(&self, files: &[File], vars: &Variables) -> Result<Resource> {
        debug!(files = files.len(), "evaluating document");
        let mut ctx = EvalContext::load(Arc::clone(&self.registry), &self.options, files, vars)?;
        let document = ctx.document()?;
        validator::validate(&self.registry, &document)?;
        Ok(document)
    }

    /// Render `value` using this evaluator's registry and scoped enums.
    pub fn marshal<T: Bind>(&self, value: &T) -> Result<String> {
        Marshaler::new(Arc::clone(&self.registry))
            .with_enum_table(&self.options.scoped_enums)
            .marshal(value)
    }
}

fn parse(source: &str, filename: &str, source_id: usize) -> Result<File> {
    sdl::parse(source, filename, source_id).map_err(|errors| Error::new(ErrorKind::Parse(errors)))
}

/// Read and parse `paths`; source ids follow the order of `paths`.
pub fn read_files<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<File>> {
    let mut files = Vec::with_capacity(paths.len());
    let mut errors = Vec::new();
    for (id, path) in paths.iter().enumerate() {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| {
            Error::new(ErrorKind::Io {
                path: path.display().to_string(),
                source,
            })
        })?;
        match sdl::parse(&source, &path.display().to_string(), id) {
            Ok(file) => files.push(file),
            Err(errs) => errors.extend(errs),
        }
    }
    if !errors.is_empty() {
        return Err(Error::new(ErrorKind::Parse(errors)));
    }
    Ok(files)
}
