//! The expanded document: every block of the input with `for_each`
//! templates replaced by their instances.

use sdl::body::Block;
use tracing::debug;

use crate::environment::EvalContext;
use crate::error::{Error, ErrorKind, Result};
use crate::value::Value;

pub(crate) type BlockId = usize;

/// The `each` binding of one `for_each` instance.
#[derive(Debug, Clone)]
pub(crate) struct Each {
    pub key: Value,
    pub value: Value,
}

#[derive(Debug)]
pub(crate) struct BlockNode<'f> {
    pub block: &'f Block,
    pub parent: Option<BlockId>,
    /// Declared labels, or the derived label of a `for_each` instance.
    pub labels: Vec<String>,
    /// Child nodes in declaration order. Templates stay in place and are
    /// flattened into their instances on iteration.
    pub children: Vec<BlockId>,
    pub each: Option<Each>,
    pub template: bool,
    pub instances: Vec<BlockId>,
}

/// Arena of block nodes with parent links.
#[derive(Debug, Default)]
pub(crate) struct BlockTree<'f> {
    nodes: Vec<BlockNode<'f>>,
    roots: Vec<BlockId>,
}

impl<'f> BlockTree<'f> {
    pub fn node(&self, id: BlockId) -> &BlockNode<'f> {
        &self.nodes[id]
    }

    /// Top-level blocks in document order, templates replaced by instances.
    pub fn top_level(&self) -> Vec<BlockId> {
        self.flatten(&self.roots)
    }

    pub fn children(&self, id: BlockId) -> Vec<BlockId> {
        self.flatten(&self.nodes[id].children)
    }

    fn flatten(&self, ids: &[BlockId]) -> Vec<BlockId> {
        let mut out = Vec::with_capacity(ids.len());
        for &id in ids {
            let node = &self.nodes[id];
            if node.template {
                out.extend(&node.instances);
            } else {
                out.push(id);
            }
        }
        out
    }

    /// The nearest `each` binding at or above `id`.
    pub fn each(&self, id: BlockId) -> Option<&Each> {
        let mut cur = Some(id);
        while let Some(i) = cur {
            let node = &self.nodes[i];
            if let Some(each) = &node.each {
                return Some(each);
            }
            cur = node.parent;
        }
        None
    }

    /// Block types from the top of the document down to `id`, e.g. `table.column`.
    pub fn kind_path(&self, id: BlockId) -> String {
        let mut kinds = Vec::new();
        let mut cur = Some(id);
        while let Some(i) = cur {
            kinds.push(self.nodes[i].block.kind.as_str());
            cur = self.nodes[i].parent;
        }
        kinds.reverse();
        kinds.join(".")
    }

    /// A readable name for messages: `table.users.column.id`.
    pub fn describe(&self, id: BlockId) -> String {
        let mut parts = Vec::new();
        let mut cur = Some(id);
        while let Some(i) = cur {
            let node = &self.nodes[i];
            let mut part = node.block.kind.clone();
            for label in &node.labels {
                part.push('.');
                part.push_str(label);
            }
            parts.push(part);
            cur = node.parent;
        }
        parts.reverse();
        parts.join(".")
    }

    /// Add a node without linking it under its parent.
    fn alloc(&mut self, node: BlockNode<'f>) -> BlockId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn push(&mut self, node: BlockNode<'f>) -> BlockId {
        let parent = node.parent;
        let id = self.alloc(node);
        match parent {
            Some(p) => self.nodes[p].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    /// Register `block` and its descendants. Blocks with `for_each` become
    /// template nodes and are appended to `templates` unexpanded.
    pub fn register(
        &mut self,
        block: &'f Block,
        parent: Option<BlockId>,
        templates: &mut Vec<BlockId>,
    ) -> Result<BlockId> {
        let template = block.attribute("for_each").is_some();
        if template && !block.labels.is_empty() {
            return Err(Error::at(
                ErrorKind::DuplicateLabelDefinition(format!(
                    "block {:?} has both a label and for_each; instance labels come from for_each",
                    block.kind
                )),
                &block.header_range(),
            ));
        }
        let id = self.push(BlockNode {
            block,
            parent,
            labels: block.labels.iter().map(|l| l.value.clone()).collect(),
            children: Vec::new(),
            each: None,
            template,
            instances: Vec::new(),
        });
        if template {
            templates.push(id);
        } else {
            self.register_children(id, templates)?;
        }
        Ok(id)
    }

    fn register_children(&mut self, id: BlockId, templates: &mut Vec<BlockId>) -> Result<()> {
        let block = self.nodes[id].block;
        for child in &block.body.blocks {
            self.register(child, Some(id), templates)?;
        }
        Ok(())
    }
}

/// Replace every template in `templates` (document order) with one instance
/// per element of its `for_each` collection.
pub(crate) fn expand(ctx: &mut EvalContext<'_>, templates: Vec<BlockId>) -> Result<()> {
    for template in templates {
        expand_template(ctx, template)?;
    }
    Ok(())
}

fn expand_template(ctx: &mut EvalContext<'_>, template: BlockId) -> Result<()> {
    let node = ctx.tree.node(template);
    let (block, parent) = (node.block, node.parent);
    let Some(for_each) = block.attribute("for_each") else {
        return Ok(());
    };
    // The collection is evaluated in the scope enclosing the template.
    let collection = ctx.eval_in(parent, for_each)?;
    let items: Vec<Each> = match collection {
        Value::List(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, value)| Each {
                key: match &value {
                    Value::String(s) => Value::String(s.clone()),
                    _ => Value::Number(i as f64),
                },
                value,
            })
            .collect(),
        Value::Map(entries) => entries
            .into_iter()
            .map(|(k, value)| Each {
                key: Value::String(k),
                value,
            })
            .collect(),
        other => {
            return Err(Error::type_mismatch(
                format!(
                    "Invalid for_each argument; a list, set or map is required, got {}",
                    other.type_name()
                ),
                &for_each.expr.range,
            ));
        }
    };
    debug!(
        block = %block.kind,
        instances = items.len(),
        "expanding for_each block"
    );

    for each in items {
        let mut nested = Vec::new();
        let instance = ctx.tree.alloc(BlockNode {
            block,
            parent,
            labels: Vec::new(),
            children: Vec::new(),
            each: Some(each),
            template: false,
            instances: Vec::new(),
        });
        ctx.tree.nodes[template].instances.push(instance);
        ctx.tree.register_children(instance, &mut nested)?;
        let label = instance_label(ctx, instance)?;
        ctx.tree.nodes[instance].labels = vec![label];
        expand(ctx, nested)?;
    }
    Ok(())
}

/// An instance is labeled by its `name` attribute, or by `each.key`.
fn instance_label(ctx: &mut EvalContext<'_>, instance: BlockId) -> Result<String> {
    let block = ctx.tree.node(instance).block;
    if let Some(attr) = block.attribute("name") {
        let value = ctx.eval_attr(instance, "name")?.unwrap_or(Value::Null);
        return value.to_string_value().map_err(|reason| {
            Error::type_mismatch(format!("Invalid block label; {}", reason), &attr.expr.range)
        });
    }
    match ctx.tree.node(instance).each.as_ref().map(|e| &e.key) {
        Some(Value::String(key)) => Ok(key.clone()),
        _ => Err(Error::type_mismatch(
            "Invalid block label; each.key must be a string, set a name attribute instead",
            &block.header_range(),
        )),
    }
}
