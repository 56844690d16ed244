//! Resolution of traversals that name blocks, e.g. `table.users.column.id`.
//!
//! Block types are looked up from the innermost enclosing block outwards to
//! the top level. Within one level the first block in document order whose
//! labels (or `name` attribute) match wins.

use sdl::body::Attribute;
use sdl::expr::Traversal;
use sdl::pos::SourceRange;

use crate::environment::EvalContext;
use crate::error::{Error, ErrorKind, Result};
use crate::expander::BlockId;
use crate::value::{Ref, Value};

enum Match {
    /// No block of the traversal's type at this level.
    NoKind,
    /// Blocks of the type exist, none with matching labels.
    Unmatched,
    /// The traversal stops at a block type, before naming a block.
    Partial,
    Found {
        path: Vec<String>,
        id: BlockId,
        /// Path segments consumed, the root included.
        consumed: usize,
    },
}

/// Resolve `t` as a block reference from `scope`. Returns the reference and
/// the number of traversal steps it consumed, or `None` when no level of the
/// document declares a block of the traversal's root type.
pub(crate) fn resolve(
    ctx: &mut EvalContext<'_>,
    scope: Option<BlockId>,
    attr: Option<&Attribute>,
    t: &Traversal,
) -> Result<Option<(Value, usize)>> {
    let mut segments = vec![t.root.clone()];
    segments.extend(t.steps.iter().map_while(|s| s.segment()));

    let mut levels = Vec::new();
    let mut cur = scope;
    while let Some(id) = cur {
        levels.push(ctx.tree.children(id));
        cur = ctx.tree.node(id).parent;
    }
    levels.push(ctx.tree.top_level());

    let mut kind_seen = false;
    for candidates in levels {
        match match_level(ctx, &candidates, &segments)? {
            Match::NoKind => {}
            Match::Unmatched => kind_seen = true,
            Match::Partial => {
                return Err(match attr {
                    Some(attr) => Error::at(
                        ErrorKind::InvalidReference(attr.name.clone()),
                        &attr.range,
                    ),
                    None => Error::at(ErrorKind::InvalidReference(t.dotted()), &t.range()),
                });
            }
            Match::Found { path, id, consumed } => {
                let r = Ref::from_segments(&path);
                ctx.ref_targets.insert(r.path.clone(), id);
                return Ok(Some((Value::Ref(r), consumed - 1)));
            }
        }
    }
    if kind_seen {
        return Err(Error::unknown(
            format!("Unknown reference; {} does not exist", t.dotted()),
            &t.range(),
        ));
    }
    Ok(None)
}

fn match_level(ctx: &mut EvalContext<'_>, candidates: &[BlockId], segs: &[String]) -> Result<Match> {
    let kind = &segs[0];
    let of_kind: Vec<BlockId> = candidates
        .iter()
        .copied()
        .filter(|&id| ctx.tree.node(id).block.kind == *kind)
        .collect();
    if of_kind.is_empty() {
        return Ok(Match::NoKind);
    }
    if segs.len() == 1 {
        return Ok(Match::Partial);
    }

    let mut hit = of_kind.iter().find_map(|&id| {
        let labels = &ctx.tree.node(id).labels;
        let n = labels.len();
        (n > 0 && segs.len() > n && segs[1..=n] == labels[..]).then_some((id, n + 1))
    });
    if hit.is_none() {
        for &id in &of_kind {
            if ctx.attr_in_progress(id, "name") {
                continue;
            }
            if let Some(Value::String(name)) = ctx.eval_attr(id, "name")? {
                if name == segs[1] {
                    hit = Some((id, 2));
                    break;
                }
            }
        }
    }
    let Some((id, consumed)) = hit else {
        return Ok(Match::Unmatched);
    };

    let mut path = vec![kind.clone()];
    path.extend(canonical_labels(ctx, id)?);
    if segs.len() > consumed {
        let children = ctx.tree.children(id);
        match match_level(ctx, &children, &segs[consumed..])? {
            Match::Found {
                path: rest,
                id,
                consumed: more,
            } => {
                path.extend(rest);
                return Ok(Match::Found {
                    path,
                    id,
                    consumed: consumed + more,
                });
            }
            Match::NoKind => {}
            other => return Ok(other),
        }
    }
    Ok(Match::Found { path, id, consumed })
}

/// Labels used in reference paths: the `name` attribute when it evaluates to
/// a string, the declared labels otherwise.
fn canonical_labels(ctx: &mut EvalContext<'_>, id: BlockId) -> Result<Vec<String>> {
    let labels = ctx.tree.node(id).labels.clone();
    if labels.len() > 1 || ctx.attr_in_progress(id, "name") {
        return Ok(labels);
    }
    match ctx.eval_attr(id, "name")? {
        Some(Value::String(name)) => Ok(vec![name]),
        _ => Ok(labels),
    }
}

/// Attribute `name` of the block `r` points to. `name` falls back to the
/// block's label.
pub(crate) fn ref_attr(
    ctx: &mut EvalContext<'_>,
    r: &Ref,
    name: &str,
    range: &SourceRange,
) -> Result<Value> {
    let Some(&id) = ctx.ref_targets.get(&r.path) else {
        return Err(Error::unknown(
            format!("Unknown reference; {} does not exist", r),
            range,
        ));
    };
    if let Some(value) = ctx.eval_attr(id, name)? {
        return Ok(value);
    }
    if name == "name" {
        if let Some(label) = ctx.tree.node(id).labels.last() {
            return Ok(Value::String(label.clone()));
        }
    }
    Err(Error::unknown(
        format!(
            "Unsupported attribute; {} has no attribute named {:?}.",
            r, name
        ),
        range,
    ))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use crate::environment::Options;
    use crate::registry::Registry;

    use super::*;

    /// The value of top-level attribute `out`.
    fn out(source: &str) -> Result<Value> {
        let files = vec![sdl::parse(source, "", 0).unwrap()];
        let options = Options::default();
        let mut ctx = EvalContext::load(
            Arc::new(Registry::default()),
            &options,
            &files,
            &BTreeMap::new(),
        )?;
        let doc = ctx.document()?;
        Ok(doc.attr("out").unwrap().value.clone())
    }

    #[test]
    fn paths_use_the_name_attribute() {
        let v = out("family \"default\" {\n  name = \"tam\"\n}\nout = family.default\n").unwrap();
        assert_eq!(v, Value::Ref(Ref::new("$family.tam")));
    }

    #[test]
    fn qualified_and_nested_paths() {
        let source = r#"
table "public" "users" {
  column "id" {}
}
out = [table.public.users, table.public.users.column.id]
"#;
        assert_eq!(
            out(source).unwrap(),
            Value::List(vec![
                Value::Ref(Ref::new("$table.public.users")),
                Value::Ref(Ref::new("$table.public.users.column.id")),
            ])
        );
    }

    #[test]
    fn attributes_through_references() {
        let source = "schema \"s1\" {\n  comment = \"c\"\n}\nout = [schema.s1.name, schema.s1.comment]\n";
        assert_eq!(out(source).unwrap(), Value::from(vec!["s1", "c"]));

        let err = out("schema \"s1\" {}\nout = schema.s1.owner\n").unwrap_err();
        assert!(err.to_string().contains("Unsupported attribute"), "{}", err);
    }

    #[test]
    fn a_bare_block_type_is_not_a_reference() {
        let err = out("schema \"s1\" {}\nout = schema\n").unwrap_err();
        assert_eq!(err.to_string(), ":2,1-13: invalid reference used in out");
    }
}
