//! Hooks, schema validators and polymorphic block types.
//!
//! A [`Registry`] is assembled with a [`RegistryBuilder`] and is immutable
//! afterwards. It can be handed to an evaluator directly, or installed once as
//! the process-wide registry that [`global`] returns.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, OnceLock};

use sdl::body::Block;

use crate::bind::{self, Bind};
use crate::environment::HookScope;
use crate::error::{Error, ErrorKind, Result};
use crate::resource::Resource;
use crate::validator::SchemaValidator;
use crate::value::Value;

/// Computes the value of a hook-backed block (data source, init block or
/// type-label block).
pub type Hook =
    Arc<dyn Fn(&mut HookScope<'_, '_>, &Block) -> anyhow::Result<Value> + Send + Sync>;

/// Creates a fresh validator for one evaluation.
pub type ValidatorFactory = Arc<dyn Fn() -> Box<dyn SchemaValidator> + Send + Sync>;

type PolyDecoder = Arc<dyn Fn(&Resource, &Registry) -> Result<Box<dyn Any>> + Send + Sync>;

#[derive(Default)]
pub struct Registry {
    data_sources: HashMap<String, Hook>,
    init_blocks: HashMap<String, Hook>,
    type_labels: HashMap<(String, String), Hook>,
    validators: Vec<ValidatorFactory>,
    /// Keyed by the `TypeId` of the field type (e.g. `dyn Animal`) and keyword.
    poly: HashMap<(TypeId, String), PolyDecoder>,
    /// Keyword of each registered concrete type.
    keywords: HashMap<TypeId, String>,
    scoped_enums: HashMap<String, Vec<String>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub(crate) fn data_source(&self, kind: &str) -> Option<&Hook> {
        self.data_sources.get(kind)
    }

    pub(crate) fn init_block(&self, name: &str) -> Option<&Hook> {
        self.init_blocks.get(name)
    }

    pub(crate) fn type_label(&self, kind: &str, label: &str) -> Option<&Hook> {
        self.type_labels.get(&(kind.to_string(), label.to_string()))
    }

    pub(crate) fn validators(&self) -> &[ValidatorFactory] {
        &self.validators
    }

    pub(crate) fn scoped_enums(&self) -> &HashMap<String, Vec<String>> {
        &self.scoped_enums
    }

    pub(crate) fn keyword(&self, concrete: TypeId) -> Option<&str> {
        self.keywords.get(&concrete).map(String::as_str)
    }

    /// Decode `resource` as the type registered for its keyword under `I`.
    /// `None` when no type is registered.
    pub(crate) fn decode_poly<I: ?Sized + 'static>(
        &self,
        resource: &Resource,
    ) -> Option<Result<Box<I>>> {
        let decoder = self
            .poly
            .get(&(TypeId::of::<I>(), resource.kind.clone()))?;
        Some(decoder(resource, self).and_then(|any| {
            any.downcast::<Box<I>>().map(|b| *b).map_err(|_| {
                Error::at(
                    ErrorKind::Binding {
                        field: resource.kind.clone(),
                        reason: "registered constructor returned a different type".to_string(),
                    },
                    resource.error_range(),
                )
            })
        }))
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    registry: Registry,
}

impl RegistryBuilder {
    /// Handle `data "<kind>" "<name>" { ... }` blocks.
    pub fn data_source(
        mut self,
        kind: &str,
        hook: impl Fn(&mut HookScope<'_, '_>, &Block) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.registry
            .data_sources
            .insert(kind.to_string(), Arc::new(hook));
        self
    }

    /// Handle the unlabeled top-level block `<name> { ... }`, whose value is
    /// then available as `<name>`.
    pub fn init_block(
        mut self,
        name: &str,
        hook: impl Fn(&mut HookScope<'_, '_>, &Block) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.registry
            .init_blocks
            .insert(name.to_string(), Arc::new(hook));
        self
    }

    /// Handle `<kind> "<label>" "<name>" { ... }` blocks, available as
    /// `<kind>.<label>.<name>`.
    pub fn type_label_block(
        mut self,
        kind: &str,
        label: &str,
        hook: impl Fn(&mut HookScope<'_, '_>, &Block) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.registry
            .type_labels
            .insert((kind.to_string(), label.to_string()), Arc::new(hook));
        self
    }

    pub fn schema_validator(
        mut self,
        factory: impl Fn() -> Box<dyn SchemaValidator> + Send + Sync + 'static,
    ) -> Self {
        self.registry.validators.push(Arc::new(factory));
        self
    }

    /// Register `T` as the implementation of `I` for blocks of type `keyword`.
    pub fn register<I: ?Sized + 'static, T: Bind>(
        mut self,
        keyword: &str,
        ctor: fn(T) -> Box<I>,
    ) -> Self {
        let decoder: PolyDecoder = Arc::new(move |resource, registry| {
            let mut value = T::default();
            bind::decode_into(&mut value, resource, registry)?;
            Ok(Box::new(ctor(value)) as Box<dyn Any>)
        });
        self.registry
            .poly
            .insert((TypeId::of::<I>(), keyword.to_string()), decoder);
        self.registry
            .keywords
            .insert(TypeId::of::<T>(), keyword.to_string());
        self
    }

    /// Values written as bare identifiers in the attribute at `path`
    /// (block types and attribute name joined with dots, e.g. `env.driver`).
    pub fn scoped_enums<S: Into<String>>(
        mut self,
        path: &str,
        values: impl IntoIterator<Item = S>,
    ) -> Self {
        self.registry
            .scoped_enums
            .entry(path.to_string())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> Registry {
        self.registry
    }
}

static INSTALLED: OnceLock<Arc<Registry>> = OnceLock::new();
static EMPTY: LazyLock<Arc<Registry>> = LazyLock::new(|| Arc::new(Registry::default()));

#[derive(Debug, thiserror::Error)]
#[error("a process-wide registry is already installed")]
pub struct AlreadyInstalled;

/// Install the process-wide registry. Must happen before any evaluation that
/// relies on it; a second installation fails.
pub fn install(registry: Registry) -> Result<(), AlreadyInstalled> {
    INSTALLED
        .set(Arc::new(registry))
        .map_err(|_| AlreadyInstalled)
}

/// The installed registry, or an empty one.
pub fn global() -> Arc<Registry> {
    INSTALLED
        .get()
        .cloned()
        .unwrap_or_else(|| Arc::clone(&EMPTY))
}
