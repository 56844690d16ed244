//! Descriptor-driven binding between [`Resource`] trees and Rust types.
//!
//! A type describes its fields once through a [`Binding`] builder; the
//! descriptors drive both decoding (evaluated tree into the type) and
//! encoding (the type back into a tree for marshaling).

pub mod coerce;

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use sdl::pos::SourceRange;
use tracing::debug;

use crate::error::{Error, ErrorKind, Result};
use crate::registry::Registry;
use crate::resource::{Attr, Resource};

pub use coerce::{FromValue, IntoValue};

/// A type that can be decoded from and encoded to a block body.
pub trait Bind: Default + 'static {
    /// Describe the fields of `Self` on an empty builder.
    ///
    /// ```ignore
    /// fn binding(b: Binding<Self>) -> Binding<Self> {
    ///     b.name(|t| &t.name, |t| &mut t.name)
    ///         .attr("schema", |t| &t.schema, |t| &mut t.schema)
    /// }
    /// ```
    fn binding(b: Binding<Self>) -> Binding<Self>;
}

/// Encoding through a trait object. Implemented for every [`Bind`] type, and
/// used as a supertrait of traits whose boxed values are bound polymorphically.
pub trait Encode: Any {
    fn encode_resource(&self, registry: &Registry) -> Result<Resource>;
    /// The `TypeId` of the concrete type behind a trait object.
    fn concrete_type(&self) -> TypeId;
}

impl<T: Bind> Encode for T {
    fn encode_resource(&self, registry: &Registry) -> Result<Resource> {
        binding_of::<T>().encode(self, registry)
    }

    fn concrete_type(&self) -> TypeId {
        TypeId::of::<T>()
    }
}

type DecodeFn<T> = Box<dyn Fn(&mut T, &mut Decoder<'_>) -> Result<()> + Send + Sync>;
type EncodeFn<T> = Box<dyn Fn(&T, &mut Resource, &Registry) -> Result<()> + Send + Sync>;

struct Field<T> {
    decode: DecodeFn<T>,
    encode: EncodeFn<T>,
    /// Extension fields decode after every other field.
    extension: bool,
}

/// Field descriptors of `T`.
pub struct Binding<T> {
    fields: Vec<Field<T>>,
    /// Attribute names claimed by attribute fields.
    attrs: HashSet<String>,
    /// Block types claimed by block fields.
    kinds: HashSet<String>,
    has_range: bool,
    has_poly: bool,
    has_extension: bool,
}

/// Decoding state for one resource.
struct Decoder<'r> {
    resource: &'r Resource,
    registry: &'r Registry,
    /// Children already bound to a field.
    claimed: Vec<bool>,
}

impl<T: 'static> Default for Binding<T> {
    fn default() -> Self {
        Binding::new()
    }
}

impl<T: 'static> Binding<T> {
    pub fn new() -> Self {
        Binding {
            fields: Vec::new(),
            attrs: HashSet::new(),
            kinds: HashSet::new(),
            has_range: false,
            has_poly: false,
            has_extension: false,
        }
    }

    fn field(
        mut self,
        decode: impl Fn(&mut T, &mut Decoder<'_>) -> Result<()> + Send + Sync + 'static,
        encode: impl Fn(&T, &mut Resource, &Registry) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.fields.push(Field {
            decode: Box::new(decode),
            encode: Box::new(encode),
            extension: false,
        });
        self
    }

    /// An attribute field. Absent and null attributes leave the field as is.
    pub fn attr<V: FromValue + IntoValue + 'static>(
        mut self,
        name: &str,
        get: fn(&T) -> &V,
        get_mut: fn(&mut T) -> &mut V,
    ) -> Self {
        self.attrs.insert(name.to_string());
        let (d, e) = (name.to_string(), name.to_string());
        self.field(
            move |t, cx| {
                let Some(attr) = cx.resource.attr(&d) else {
                    return Ok(());
                };
                if attr.value.is_null() {
                    return Ok(());
                }
                *get_mut(t) = V::from_value(&attr.value).map_err(|reason| {
                    Error::type_mismatch(reason, attr.range.as_ref().unwrap_or(&attr.origin))
                        .with_context(format!("attribute {:?}", d))
                })?;
                Ok(())
            },
            move |t, r, _| {
                if let Some(value) = get(t).into_value() {
                    r.attrs.push(Attr::new(e.as_str(), value));
                }
                Ok(())
            },
        )
    }

    /// The block's name label (its last label).
    pub fn name(self, get: fn(&T) -> &String, get_mut: fn(&mut T) -> &mut String) -> Self {
        self.field(
            move |t, cx| {
                *get_mut(t) = cx.resource.name.clone();
                Ok(())
            },
            move |t, r, _| {
                r.name = get(t).clone();
                Ok(())
            },
        )
    }

    /// The block's qualifier (the first of two labels).
    pub fn qualifier(self, get: fn(&T) -> &String, get_mut: fn(&mut T) -> &mut String) -> Self {
        self.field(
            move |t, cx| {
                *get_mut(t) = cx.resource.qualifier.clone();
                Ok(())
            },
            move |t, r, _| {
                r.qualifier = get(t).clone();
                Ok(())
            },
        )
    }

    /// A name read from the `name` attribute, falling back to the label.
    /// Encoded as the label.
    pub fn name_attr(
        mut self,
        get: fn(&T) -> &String,
        get_mut: fn(&mut T) -> &mut String,
    ) -> Self {
        self.attrs.insert("name".to_string());
        self.field(
            move |t, cx| {
                let from_attr = cx
                    .resource
                    .attr("name")
                    .and_then(|a| a.value.to_string_value().ok());
                *get_mut(t) = from_attr.unwrap_or_else(|| cx.resource.name.clone());
                Ok(())
            },
            move |t, r, _| {
                r.name = get(t).clone();
                Ok(())
            },
        )
    }

    /// The block's source range, set only when position tracking is enabled.
    /// A binding with a range field keeps the range off its extension.
    pub fn range(mut self, get_mut: fn(&mut T) -> &mut Option<SourceRange>) -> Self {
        self.has_range = true;
        self.field(
            move |t, cx| {
                *get_mut(t) = cx.resource.range.clone();
                Ok(())
            },
            |_, _, _| Ok(()),
        )
    }

    /// An optional child block.
    pub fn block<C: Bind>(
        mut self,
        kind: &str,
        get: fn(&T) -> &Option<C>,
        get_mut: fn(&mut T) -> &mut Option<C>,
    ) -> Self {
        self.kinds.insert(kind.to_string());
        let (d, e) = (kind.to_string(), kind.to_string());
        self.field(
            move |t, cx| {
                if let Some(child) = cx.resource.resource(&d) {
                    let target = get_mut(t).get_or_insert_with(C::default);
                    decode_into(target, child, cx.registry)?;
                }
                Ok(())
            },
            move |t, r, registry| {
                if let Some(c) = get(t) {
                    r.children.push(encode_child(c, &e, registry)?);
                }
                Ok(())
            },
        )
    }

    /// A child block held by value. Always encoded, even when empty.
    pub fn inline_block<C: Bind>(
        mut self,
        kind: &str,
        get: fn(&T) -> &C,
        get_mut: fn(&mut T) -> &mut C,
    ) -> Self {
        self.kinds.insert(kind.to_string());
        let (d, e) = (kind.to_string(), kind.to_string());
        self.field(
            move |t, cx| match cx.resource.resource(&d) {
                Some(child) => decode_into(get_mut(t), child, cx.registry),
                None => Ok(()),
            },
            move |t, r, registry| {
                r.children.push(encode_child(get(t), &e, registry)?);
                Ok(())
            },
        )
    }

    /// Every child block of a type, in document order.
    pub fn blocks<C: Bind>(
        mut self,
        kind: &str,
        get: fn(&T) -> &Vec<C>,
        get_mut: fn(&mut T) -> &mut Vec<C>,
    ) -> Self {
        self.kinds.insert(kind.to_string());
        let (d, e) = (kind.to_string(), kind.to_string());
        self.field(
            move |t, cx| {
                let children = cx.resource.resources(&d);
                if children.is_empty() {
                    return Ok(());
                }
                let mut out = Vec::with_capacity(children.len());
                for child in children {
                    let mut c = C::default();
                    decode_into(&mut c, child, cx.registry)?;
                    out.push(c);
                }
                *get_mut(t) = out;
                Ok(())
            },
            move |t, r, registry| {
                for c in get(t) {
                    r.children.push(encode_child(c, &e, registry)?);
                }
                Ok(())
            },
        )
    }

    /// The first child block whose type is registered for `I`.
    pub fn poly<I: ?Sized + Encode + 'static>(
        mut self,
        get: fn(&T) -> &Option<Box<I>>,
        get_mut: fn(&mut T) -> &mut Option<Box<I>>,
    ) -> Self {
        self.has_poly = true;
        self.field(
            move |t, cx| {
                if let Some(value) = cx.take_poly::<I>(true)?.pop() {
                    *get_mut(t) = Some(value);
                }
                Ok(())
            },
            move |t, r, registry| {
                if let Some(v) = get(t) {
                    r.children.push(encode_poly(v.as_ref(), registry)?);
                }
                Ok(())
            },
        )
    }

    /// Every child block whose type is registered for `I`.
    pub fn polys<I: ?Sized + Encode + 'static>(
        mut self,
        get: fn(&T) -> &Vec<Box<I>>,
        get_mut: fn(&mut T) -> &mut Vec<Box<I>>,
    ) -> Self {
        self.has_poly = true;
        self.field(
            move |t, cx| {
                let values = cx.take_poly::<I>(false)?;
                if !values.is_empty() {
                    *get_mut(t) = values;
                }
                Ok(())
            },
            move |t, r, registry| {
                for v in get(t) {
                    r.children.push(encode_poly(v.as_ref(), registry)?);
                }
                Ok(())
            },
        )
    }

    /// Collects every attribute and child block no other field claimed.
    pub fn extension(
        mut self,
        get: fn(&T) -> &Resource,
        get_mut: fn(&mut T) -> &mut Resource,
    ) -> Self {
        self.has_extension = true;
        self.fields.push(Field {
            decode: Box::new(move |t, cx| {
                *get_mut(t) = cx.resource.clone();
                Ok(())
            }),
            encode: Box::new(move |t, r, _| {
                let ext = get(t);
                r.attrs.extend(ext.attrs.iter().cloned());
                r.children.extend(ext.children.iter().cloned());
                Ok(())
            }),
            extension: true,
        });
        self
    }

    fn decode(&self, target: &mut T, resource: &Resource, registry: &Registry) -> Result<()> {
        let mut cx = Decoder {
            resource,
            registry,
            claimed: resource
                .children
                .iter()
                .map(|c| self.kinds.contains(&c.kind))
                .collect(),
        };
        for field in self.fields.iter().filter(|f| !f.extension) {
            (field.decode)(target, &mut cx)?;
        }
        if self.has_extension {
            let unclaimed = Resource {
                name: resource.name.clone(),
                qualifier: resource.qualifier.clone(),
                kind: resource.kind.clone(),
                attrs: resource
                    .attrs
                    .iter()
                    .filter(|a| !self.attrs.contains(&a.name))
                    .cloned()
                    .collect(),
                children: resource
                    .children
                    .iter()
                    .zip(&cx.claimed)
                    .filter(|(_, claimed)| !**claimed)
                    .map(|(c, _)| c.clone())
                    .collect(),
                range: if self.has_range {
                    None
                } else {
                    resource.range.clone()
                },
                origin: resource.origin.clone(),
            };
            let mut ext = Decoder {
                resource: &unclaimed,
                registry,
                claimed: Vec::new(),
            };
            for field in self.fields.iter().filter(|f| f.extension) {
                (field.decode)(target, &mut ext)?;
            }
        } else if self.has_poly {
            if let Some(idx) = cx.claimed.iter().position(|c| !c) {
                let child = &resource.children[idx];
                return Err(Error::at(
                    ErrorKind::Binding {
                        field: child.kind.clone(),
                        reason: "no type is registered for this block".to_string(),
                    },
                    child.error_range(),
                ));
            }
        }
        Ok(())
    }

    fn encode(&self, source: &T, registry: &Registry) -> Result<Resource> {
        let mut r = Resource::default();
        for field in &self.fields {
            (field.encode)(source, &mut r, registry)?;
        }
        Ok(r)
    }
}

impl Decoder<'_> {
    /// Decode unclaimed children registered for `I`, claiming them.
    fn take_poly<I: ?Sized + 'static>(&mut self, first_only: bool) -> Result<Vec<Box<I>>> {
        let mut out = Vec::new();
        for (idx, child) in self.resource.children.iter().enumerate() {
            if self.claimed[idx] {
                continue;
            }
            let Some(value) = self.registry.decode_poly::<I>(child) else {
                continue;
            };
            self.claimed[idx] = true;
            out.push(value?);
            if first_only {
                break;
            }
        }
        Ok(out)
    }
}

fn encode_child<C: Bind>(c: &C, kind: &str, registry: &Registry) -> Result<Resource> {
    let mut r = binding_of::<C>().encode(c, registry)?;
    r.kind = kind.to_string();
    Ok(r)
}

fn encode_poly<I: ?Sized + Encode>(v: &I, registry: &Registry) -> Result<Resource> {
    let mut r = v.encode_resource(registry)?;
    r.kind = registry
        .keyword(v.concrete_type())
        .ok_or_else(|| {
            Error::new(ErrorKind::Binding {
                field: r.name.clone(),
                reason: "the value's type is not registered".to_string(),
            })
        })?
        .to_string();
    Ok(r)
}

/// Bind `resource` into an existing `target`. Fields with nothing to decode
/// keep their current values.
pub fn decode_into<T: Bind>(target: &mut T, resource: &Resource, registry: &Registry) -> Result<()> {
    binding_of::<T>().decode(target, resource, registry)
}

/// Encode `source` as an untyped resource (kind left empty).
pub fn encode<T: Bind>(source: &T, registry: &Registry) -> Result<Resource> {
    binding_of::<T>().encode(source, registry)
}

type Cache = RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>;

static BINDINGS: LazyLock<Cache> = LazyLock::new(|| RwLock::new(HashMap::new()));

/// The descriptors of `T`, built on first use and cached for the process.
pub(crate) fn binding_of<T: Bind>() -> Arc<Binding<T>> {
    let id = TypeId::of::<T>();
    let cached = BINDINGS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&id)
        .cloned();
    if let Some(Ok(binding)) = cached.map(|b| b.downcast::<Binding<T>>()) {
        return binding;
    }
    let binding = Arc::new(T::binding(Binding::new()));
    debug!(
        ty = std::any::type_name::<T>(),
        fields = binding.fields.len(),
        "caching binding"
    );
    BINDINGS
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(id, binding.clone());
    binding
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Ref, Value};

    #[derive(Debug, Default, PartialEq)]
    struct Column {
        name: String,
        null: bool,
    }

    impl Bind for Column {
        fn binding(b: Binding<Self>) -> Binding<Self> {
            b.name(|c| &c.name, |c| &mut c.name)
                .attr("null", |c| &c.null, |c| &mut c.null)
        }
    }

    #[derive(Debug, Default, PartialEq)]
    struct Table {
        name: String,
        schema: Option<Ref>,
        columns: Vec<Column>,
        extra: Resource,
    }

    impl Bind for Table {
        fn binding(b: Binding<Self>) -> Binding<Self> {
            b.name(|t| &t.name, |t| &mut t.name)
                .attr("schema", |t| &t.schema, |t| &mut t.schema)
                .blocks("column", |t| &t.columns, |t| &mut t.columns)
                .extension(|t| &t.extra, |t| &mut t.extra)
        }
    }

    fn table() -> Resource {
        let mut id = Resource::new("column");
        id.name = "id".into();
        id.attrs.push(Attr::new("null", false));
        let mut index = Resource::new("index");
        index.name = "idx".into();
        let mut t = Resource::new("table");
        t.name = "users".into();
        t.attrs.push(Attr::new("schema", Value::Ref(Ref::new("$schema.public"))));
        t.attrs.push(Attr::new("comment", "users table"));
        t.children.push(id);
        t.children.push(index);
        t
    }

    #[test]
    fn decode_claims_fields_and_extends_the_rest() {
        let registry = Registry::default();
        let t: Table = table().decode_with(&registry).unwrap();
        assert_eq!(t.name, "users");
        assert_eq!(t.schema, Some(Ref::new("$schema.public")));
        assert_eq!(
            t.columns,
            vec![Column {
                name: "id".into(),
                null: false
            }]
        );
        assert_eq!(t.extra.attrs.len(), 1);
        assert_eq!(t.extra.attrs[0].name, "comment");
        assert_eq!(t.extra.resources("index").len(), 1);
        assert!(t.extra.resource("column").is_none());
    }

    #[test]
    fn encode_follows_field_order() {
        let registry = Registry::default();
        let t: Table = table().decode_with(&registry).unwrap();
        let r = encode(&t, &registry).unwrap();
        let names: Vec<&str> = r.attrs.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["schema", "comment"]);
        let kinds: Vec<&str> = r.children.iter().map(|c| c.kind.as_str()).collect();
        assert_eq!(kinds, vec!["column", "index"]);
    }

    #[test]
    fn coercion_errors_name_the_attribute() {
        let mut r = Resource::new("column");
        r.attrs.push(Attr::new("null", "maybe"));
        let err = r.decode_with::<Column>(&Registry::default()).unwrap_err();
        assert_eq!(err.to_string(), "attribute \"null\": a bool is required");
    }
}
