//! The evaluation context of one document: every named value the document
//! can reference, resolved lazily with memoization and cycle detection.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use sdl::File;
use sdl::body::{Attribute, Block};
use sdl::expr::{Expr, Traversal};
use sdl::pos::SourceRange;
use tracing::{debug, trace};

use crate::error::{Error, ErrorKind, Result};
use crate::expander::{self, BlockId, BlockTree};
use crate::expression::{self, Scope};
use crate::reference;
use crate::registry::{Hook, Registry};
use crate::resource::{Attr, Resource};
use crate::value::{Ref, Value};
use crate::variables;

/// Nested evaluations deeper than this are reported as a cycle. Sized so the
/// deepest chain still fits a 2 MiB thread stack in unoptimised builds.
const MAX_DEPTH: usize = 64;

/// Evaluation settings for one call.
#[derive(Debug, Clone, Default)]
pub(crate) struct Options {
    /// Expose source ranges on the evaluated tree.
    pub with_pos: bool,
    /// Attribute path (`env.driver`) to the identifiers accepted bare there.
    pub scoped_enums: HashMap<String, Vec<String>>,
}

/// A lazily evaluated value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum NodeKey {
    Local(String),
    Data(String, String),
    InitBlock(String),
    TypeLabel(String, String, String),
    Attr(BlockId, String),
}

#[derive(Debug)]
enum NodeState {
    Evaluating,
    Done(Value),
}

pub(crate) struct EvalContext<'f> {
    registry: Arc<Registry>,
    options: &'f Options,
    variables: BTreeMap<String, Value>,
    variable_blocks: Vec<&'f Block>,
    /// Locals in declaration order.
    locals: Vec<&'f Attribute>,
    data: HashMap<(String, String), &'f Block>,
    init_blocks: HashMap<String, &'f Block>,
    type_labels: HashMap<(String, String, String), &'f Block>,
    root_attrs: Vec<&'f Attribute>,
    pub(crate) tree: BlockTree<'f>,
    nodes: HashMap<NodeKey, NodeState>,
    depth: usize,
    /// Block each reference path was last resolved to.
    pub(crate) ref_targets: HashMap<String, BlockId>,
}

impl<'f> EvalContext<'f> {
    /// Index `files`, bind variables, expand `for_each` blocks and evaluate
    /// every local.
    pub fn load(
        registry: Arc<Registry>,
        options: &'f Options,
        files: &'f [File],
        supplied: &BTreeMap<String, Value>,
    ) -> Result<Self> {
        let mut ctx = EvalContext {
            registry,
            options,
            variables: BTreeMap::new(),
            variable_blocks: Vec::new(),
            locals: Vec::new(),
            data: HashMap::new(),
            init_blocks: HashMap::new(),
            type_labels: HashMap::new(),
            root_attrs: Vec::new(),
            tree: BlockTree::default(),
            nodes: HashMap::new(),
            depth: 0,
            ref_targets: HashMap::new(),
        };
        let mut templates = Vec::new();
        for file in files {
            ctx.index(file, &mut templates)?;
        }
        ctx.variables = variables::bind(&ctx.variable_blocks, supplied)?;
        expander::expand(&mut ctx, templates)?;
        for attr in ctx.locals.clone() {
            ctx.local(&attr.name, &attr.name_range)?;
        }
        Ok(ctx)
    }

    fn index(&mut self, file: &'f File, templates: &mut Vec<BlockId>) -> Result<()> {
        for attr in &file.body.attributes {
            if self.root_attrs.iter().any(|a| a.name == attr.name) {
                return Err(duplicate(format!("attribute {:?}", attr.name), &attr.name_range));
            }
            self.root_attrs.push(attr);
        }
        for block in &file.body.blocks {
            let labels = block.label_values();
            match (block.kind.as_str(), labels.as_slice()) {
                ("variable", [name]) => {
                    if self.variable_blocks.iter().any(|b| b.label(0) == Some(*name)) {
                        return Err(duplicate(format!("variable {:?}", name), &block.header_range()));
                    }
                    self.variable_blocks.push(block);
                }
                ("variable", _) => return Err(label_count(block, "a name")),
                ("locals", []) => {
                    for attr in &block.body.attributes {
                        if self.locals.iter().any(|a| a.name == attr.name) {
                            return Err(duplicate(format!("local.{}", attr.name), &attr.name_range));
                        }
                        self.locals.push(attr);
                    }
                }
                ("locals", _) => return Err(label_count(block, "no labels")),
                ("data", [kind, name]) => {
                    let key = (kind.to_string(), name.to_string());
                    if self.data.insert(key, block).is_some() {
                        return Err(duplicate(format!("data.{}.{}", kind, name), &block.header_range()));
                    }
                }
                ("data", _) => return Err(label_count(block, "a type and a name")),
                (kind, []) if self.registry.init_block(kind).is_some() => {
                    if self.init_blocks.insert(kind.to_string(), block).is_some() {
                        return Err(duplicate(format!("block {:?}", kind), &block.header_range()));
                    }
                }
                (kind, [label, name]) if self.registry.type_label(kind, label).is_some() => {
                    let key = (kind.to_string(), label.to_string(), name.to_string());
                    if self.type_labels.insert(key, block).is_some() {
                        return Err(duplicate(
                            format!("{}.{}.{}", kind, label, name),
                            &block.header_range(),
                        ));
                    }
                }
                _ => {
                    self.tree.register(block, None, templates)?;
                }
            }
        }
        Ok(())
    }

    /// Run `f` as the evaluation of `key`, declared at `range`, guarding
    /// against re-entry.
    fn guarded(
        &mut self,
        key: NodeKey,
        name: String,
        range: &SourceRange,
        memoize: bool,
        f: impl FnOnce(&mut Self) -> Result<Value>,
    ) -> Result<Value> {
        match self.nodes.get(&key) {
            Some(NodeState::Done(v)) => return Ok(v.clone()),
            Some(NodeState::Evaluating) => {
                return Err(Error::at(ErrorKind::CyclicReference(name), range));
            }
            None => {}
        }
        if self.depth >= MAX_DEPTH {
            return Err(Error::at(ErrorKind::CyclicReference(name), range));
        }
        trace!(node = %name, "evaluating");
        self.nodes.insert(key.clone(), NodeState::Evaluating);
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        match &result {
            Ok(v) if memoize => {
                self.nodes.insert(key, NodeState::Done(v.clone()));
            }
            _ => {
                self.nodes.remove(&key);
            }
        }
        result
    }

    /// Evaluate `attr` in the scope of `block` (the top level when `None`).
    /// Not memoized.
    pub fn eval_in(&mut self, block: Option<BlockId>, attr: &'f Attribute) -> Result<Value> {
        let mut scope = BlockScope {
            ctx: self,
            block,
            attr: Some(attr),
        };
        expression::evaluate(&mut scope, &attr.expr)
    }

    /// The memoized value of attribute `name` of block `id`.
    pub fn eval_attr(&mut self, id: BlockId, name: &str) -> Result<Option<Value>> {
        let block = self.tree.node(id).block;
        let Some(attr) = block.attribute(name) else {
            return Ok(None);
        };
        let label = format!("{}.{}", self.tree.describe(id), name);
        self.guarded(
            NodeKey::Attr(id, name.to_string()),
            label,
            &attr.name_range,
            true,
            |ctx| ctx.eval_in(Some(id), attr),
        )
        .map(Some)
    }

    /// True while attribute `name` of block `id` is being evaluated.
    pub fn attr_in_progress(&self, id: BlockId, name: &str) -> bool {
        matches!(
            self.nodes.get(&NodeKey::Attr(id, name.to_string())),
            Some(NodeState::Evaluating)
        )
    }

    fn local(&mut self, name: &str, range: &SourceRange) -> Result<Value> {
        let Some(attr) = self.locals.iter().find(|a| a.name == name).copied() else {
            return Err(unsupported(name, range));
        };
        self.guarded(
            NodeKey::Local(name.to_string()),
            format!("local.{}", name),
            &attr.name_range,
            true,
            |ctx| ctx.eval_in(None, attr),
        )
    }

    fn variable(&self, name: &str, range: &SourceRange) -> Result<Value> {
        self.variables
            .get(name)
            .cloned()
            .ok_or_else(|| unsupported(name, range))
    }

    /// `data.<kind>.<name>`. Hooks are called on every reference.
    fn data_source(&mut self, t: &Traversal) -> Result<Value> {
        let key = match (segment(t, 0), segment(t, 1)) {
            (Some(kind), Some(name)) => (kind, name),
            _ => return Err(unknown_data(t)),
        };
        let Some(block) = self.data.get(&key).copied() else {
            return Err(unknown_data(t));
        };
        let hook = self
            .registry
            .data_source(&key.0)
            .cloned()
            .ok_or_else(|| {
                Error::at(
                    ErrorKind::UnresolvedHook {
                        kind: "data source",
                        name: key.0.clone(),
                    },
                    &block.header_range(),
                )
            })?;
        let name = format!("data.{}.{}", key.0, key.1);
        self.guarded(
            NodeKey::Data(key.0, key.1),
            name,
            &block.header_range(),
            false,
            |ctx| ctx.call_hook(&hook, block),
        )
    }

    fn init_block(&mut self, name: &str) -> Result<Value> {
        let Some(block) = self.init_blocks.get(name).copied() else {
            return Err(ErrorKind::UnresolvedHook {
                kind: "init block",
                name: name.to_string(),
            }
            .into());
        };
        let hook = self.registry.init_block(name).cloned().ok_or_else(|| {
            Error::at(
                ErrorKind::UnresolvedHook {
                    kind: "init block",
                    name: name.to_string(),
                },
                &block.header_range(),
            )
        })?;
        self.guarded(
            NodeKey::InitBlock(name.to_string()),
            name.to_string(),
            &block.header_range(),
            true,
            |ctx| ctx.call_hook(&hook, block),
        )
    }

    /// `<kind>.<label>.<name>` of a registered type-label block, or `None`
    /// when the traversal names no such block.
    fn type_label(&mut self, t: &Traversal) -> Result<Option<Value>> {
        let (Some(label), Some(name)) = (segment(t, 0), segment(t, 1)) else {
            return Ok(None);
        };
        let key = (t.root.clone(), label, name);
        let Some(block) = self.type_labels.get(&key).copied() else {
            return Ok(None);
        };
        let Some(hook) = self.registry.type_label(&key.0, &key.1).cloned() else {
            return Ok(None);
        };
        let name = format!("{}.{}.{}", key.0, key.1, key.2);
        self.guarded(
            NodeKey::TypeLabel(key.0, key.1, key.2),
            name,
            &block.header_range(),
            false,
            |ctx| ctx.call_hook(&hook, block),
        )
        .map(Some)
    }

    fn call_hook(&mut self, hook: &Hook, block: &'f Block) -> Result<Value> {
        debug!(block = %describe(block), "invoking hook");
        let mut scope = HookScope { ctx: self, block };
        hook(&mut scope, block).map_err(|err| match err.downcast::<Error>() {
            Ok(err) => err,
            Err(source) => Error::at(
                ErrorKind::Hook {
                    block: describe(block),
                    source,
                },
                &block.header_range(),
            ),
        })
    }

    /// Evaluate the whole expanded document into a resource tree.
    pub fn document(&mut self) -> Result<Resource> {
        let mut root = Resource::default();
        for attr in self.root_attrs.clone() {
            let value = self.eval_in(None, attr)?;
            root.attrs.push(self.attr(attr, value));
        }
        for id in self.tree.top_level() {
            root.children.push(self.resource(id)?);
        }
        Ok(root)
    }

    fn resource(&mut self, id: BlockId) -> Result<Resource> {
        let node = self.tree.node(id);
        let block = node.block;
        let (qualifier, name) = match node.labels.as_slice() {
            [] => (String::new(), String::new()),
            [name] => (String::new(), name.clone()),
            [qualifier, .., name] => (qualifier.clone(), name.clone()),
        };
        let mut r = Resource {
            name,
            qualifier,
            kind: block.kind.clone(),
            attrs: Vec::new(),
            children: Vec::new(),
            range: self.options.with_pos.then(|| block.range.clone()),
            origin: block.range.clone(),
        };
        for attr in &block.body.attributes {
            if attr.name == "for_each" {
                continue;
            }
            let value = self.eval_attr(id, &attr.name)?.unwrap_or(Value::Null);
            r.attrs.push(self.attr(attr, value));
        }
        for child in self.tree.children(id) {
            r.children.push(self.resource(child)?);
        }
        Ok(r)
    }

    fn attr(&self, attr: &Attribute, value: Value) -> Attr {
        Attr {
            name: attr.name.clone(),
            value,
            range: self.options.with_pos.then(|| attr.range.clone()),
            origin: attr.range.clone(),
        }
    }
}

/// The scope of an expression inside a block (or at the top level).
pub(crate) struct BlockScope<'c, 'f> {
    ctx: &'c mut EvalContext<'f>,
    block: Option<BlockId>,
    /// The attribute being evaluated, if any.
    attr: Option<&'f Attribute>,
}

impl BlockScope<'_, '_> {
    /// Bare identifiers accepted as enum values in the current attribute.
    fn is_enum(&self, ident: &str) -> bool {
        let Some(attr) = self.attr else {
            return false;
        };
        let path = match self.block {
            Some(id) => format!("{}.{}", self.ctx.tree.kind_path(id), attr.name),
            None => attr.name.clone(),
        };
        self.ctx
            .options
            .scoped_enums
            .get(&path)
            .is_some_and(|values| values.iter().any(|v| v == ident))
    }
}

impl Scope for BlockScope<'_, '_> {
    fn resolve(&mut self, t: &Traversal) -> Result<(Value, usize)> {
        if t.steps.is_empty() && self.is_enum(&t.root) {
            return Ok((Value::String(t.root.clone()), 0));
        }
        match t.root.as_str() {
            "each" => {
                if let Some(each) = self.block.and_then(|id| self.ctx.tree.each(id)) {
                    let value = Value::map([("key", each.key.clone()), ("value", each.value.clone())]);
                    return Ok((value, 0));
                }
            }
            "var" => {
                return match segment(t, 0) {
                    Some(name) => {
                        let v = self.ctx.variable(&name, t.steps[0].range())?;
                        Ok((v, 1))
                    }
                    None => Ok((Value::Map(self.ctx.variables.clone()), 0)),
                };
            }
            "local" => {
                let Some(name) = segment(t, 0) else {
                    return Err(Error::unknown(
                        "Invalid reference; local must be followed by an attribute name",
                        &t.root_range,
                    ));
                };
                let v = self.ctx.local(&name, t.steps[0].range())?;
                return Ok((v, 1));
            }
            "data" => return self.ctx.data_source(t).map(|v| (v, 2)),
            _ => {}
        }
        if self.ctx.init_blocks.contains_key(&t.root) {
            return self.ctx.init_block(&t.root).map(|v| (v, 0));
        }
        if let Some(v) = self.ctx.type_label(t)? {
            return Ok((v, 2));
        }
        if let Some(found) = reference::resolve(self.ctx, self.block, self.attr, t)? {
            return Ok(found);
        }
        Err(Error::unknown(
            format!(
                "Unknown variable; There is no variable named {:?}.",
                t.root
            ),
            &t.root_range,
        ))
    }

    fn ref_attr(&mut self, r: &Ref, name: &str, range: &SourceRange) -> Result<Value> {
        reference::ref_attr(self.ctx, r, name, range)
    }
}

/// What a hook sees: the top-level scope and the block it computes.
pub struct HookScope<'c, 'f> {
    ctx: &'c mut EvalContext<'f>,
    block: &'f Block,
}

impl HookScope<'_, '_> {
    /// Evaluate `expr` in the top-level scope.
    pub fn eval(&mut self, expr: &Expr) -> Result<Value> {
        let mut scope = BlockScope {
            ctx: self.ctx,
            block: None,
            attr: None,
        };
        expression::evaluate(&mut scope, expr)
    }

    /// Evaluate attribute `name` of the hook's block, if it has one.
    pub fn attr(&mut self, name: &str) -> Result<Option<Value>> {
        let block = self.block;
        match block.attribute(name) {
            Some(attr) => self.ctx.eval_in(None, attr).map(Some),
            None => Ok(None),
        }
    }

    /// Like [`HookScope::attr`], but a missing attribute is an error.
    pub fn required(&mut self, name: &str) -> Result<Value> {
        self.attr(name)?.ok_or_else(|| {
            Error::unknown(
                format!(
                    "Missing required argument; The argument {:?} is required.",
                    name
                ),
                &self.block.range,
            )
        })
    }

    pub fn label(&self, idx: usize) -> Option<&str> {
        self.block.label(idx)
    }
}

/// Step `i` of `t` as a path segment.
fn segment(t: &Traversal, i: usize) -> Option<String> {
    t.steps.get(i).and_then(|s| s.segment())
}

/// `data "sql" "tenants"`
fn describe(block: &Block) -> String {
    let mut s = block.kind.clone();
    for label in &block.labels {
        s.push_str(&format!(" {:?}", label.value));
    }
    s
}

fn duplicate(what: String, range: &SourceRange) -> Error {
    Error::at(
        ErrorKind::DuplicateLabelDefinition(format!("{} is already defined", what)),
        range,
    )
}

fn label_count(block: &Block, expected: &str) -> Error {
    Error::at(
        ErrorKind::Binding {
            field: block.kind.clone(),
            reason: format!("block requires {}", expected),
        },
        &block.header_range(),
    )
}

fn unsupported(name: &str, range: &SourceRange) -> Error {
    Error::unknown(
        format!(
            "Unsupported attribute; This object does not have an attribute named {:?}.",
            name
        ),
        range,
    )
}

fn unknown_data(t: &Traversal) -> Error {
    Error::unknown(
        format!("Unknown data source; {} does not exist", t.dotted()),
        &t.root_range,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    fn chain(len: usize) -> String {
        let mut source = String::from("locals {\n");
        for i in 0..len {
            source.push_str(&format!("  l{} = local.l{}\n", i, i + 1));
        }
        source.push_str(&format!("  l{} = \"end\"\n}}\nout = local.l0\n", len));
        source
    }

    fn document(registry: Registry, source: &str) -> Result<Resource> {
        let files = vec![sdl::parse(source, "", 0).unwrap()];
        let options = Options::default();
        let mut ctx = EvalContext::load(Arc::new(registry), &options, &files, &BTreeMap::new())?;
        ctx.document()
    }

    #[test]
    fn deep_chains_stop_at_the_depth_bound() {
        // Runs on a thread with the default stack size.
        let handle = std::thread::spawn(|| {
            let short = document(Registry::default(), &chain(MAX_DEPTH - 1));
            let long = document(Registry::default(), &chain(MAX_DEPTH + 36));
            (short.map(|r| r.attrs[0].value.clone()), long.map(|_| ()))
        });
        let (short, long) = handle.join().unwrap();
        assert_eq!(short.unwrap(), Value::from("end"));

        let err = long.unwrap_err();
        assert!(matches!(
            &err.kind,
            ErrorKind::CyclicReference(name) if *name == format!("local.l{}", MAX_DEPTH)
        ));
        // `l64` is declared on line 66.
        assert_eq!(err.range.unwrap().start.line, MAX_DEPTH + 2);
    }

    #[test]
    fn locals_are_memoized_and_hooks_are_not() {
        let source = "data \"x\" \"a\" {\n  v = local.n\n}\nlocals {\n  n = 1\n  m = data.x.a.v\n}\n";
        let files = vec![sdl::parse(source, "", 0).unwrap()];
        let options = Options::default();
        let registry = Registry::builder()
            .data_source("x", |scope, _| Ok(Value::map([("v", scope.required("v")?)])))
            .build();
        let ctx = EvalContext::load(Arc::new(registry), &options, &files, &BTreeMap::new()).unwrap();
        assert!(matches!(
            ctx.nodes.get(&NodeKey::Local("m".into())),
            Some(NodeState::Done(Value::Number(n))) if *n == 1.0
        ));
        assert!(!ctx.nodes.contains_key(&NodeKey::Data("x".into(), "a".into())));
        assert_eq!(ctx.depth, 0);
    }

    #[test]
    fn duplicate_locals_are_rejected() {
        let err = document(Registry::default(), "locals {\n  a = 1\n}\nlocals {\n  a = 2\n}\n")
            .unwrap_err();
        assert_eq!(err.to_string(), ":5,3-4: local.a is already defined");
    }
}
