//! Canonical text rendering of documents.
//!
//! Attributes print before child blocks, `=` signs are aligned across runs of
//! consecutive attributes, and heredocs are written back from their raw text.

use std::fmt;

use crate::body::{Attribute, Block, Body};
use crate::expr::{Expr, ExprKind, Literal, ObjectItem, ObjectKey, Step, TemplatePart};

const INDENT: &str = "  ";

/// Render a document body.
pub fn format_body(body: &Body) -> String {
    let mut out = String::new();
    write_body(&mut out, body, 0);
    out
}

/// Render a single expression as it would appear on the right of `=`.
pub fn format_expr(expr: &Expr) -> String {
    render_expr(expr, 0, false)
}

impl fmt::Display for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_body(self))
    }
}

fn write_body(out: &mut String, body: &Body, depth: usize) {
    write_attributes(out, &body.attributes, depth);
    for block in &body.blocks {
        write_block(out, block, depth);
    }
}

fn write_attributes(out: &mut String, attrs: &[Attribute], depth: usize) {
    let rendered: Vec<(&str, String)> = attrs
        .iter()
        .map(|a| (a.name.as_str(), render_expr(&a.expr, depth, false)))
        .collect();
    write_aligned(out, &rendered, depth);
}

/// Write `key = value` lines, padding keys to a common width within each
/// run. A run ends after a value that spans several lines.
fn write_aligned(out: &mut String, items: &[(&str, String)], depth: usize) {
    let indent = INDENT.repeat(depth);
    let mut start = 0;
    while start < items.len() {
        let mut end = start;
        while end < items.len() {
            end += 1;
            if items[end - 1].1.contains('\n') {
                break;
            }
        }
        let width = items[start..end]
            .iter()
            .map(|(k, _)| k.chars().count())
            .max()
            .unwrap_or(0);
        for (key, value) in &items[start..end] {
            let pad = width - key.chars().count();
            out.push_str(&indent);
            out.push_str(key);
            out.push_str(&" ".repeat(pad));
            out.push_str(" = ");
            out.push_str(value);
            out.push('\n');
        }
        start = end;
    }
}

fn write_block(out: &mut String, block: &Block, depth: usize) {
    let indent = INDENT.repeat(depth);
    out.push_str(&indent);
    out.push_str(&block.kind);
    for label in &block.labels {
        out.push(' ');
        out.push_str(&quote(&label.value));
    }
    out.push_str(" {\n");
    write_body(out, &block.body, depth + 1);
    out.push_str(&indent);
    out.push_str("}\n");
}

fn render_expr(expr: &Expr, depth: usize, inline: bool) -> String {
    match &expr.kind {
        ExprKind::Literal(lit) => render_literal(lit),
        ExprKind::Template(parts) => {
            let mut s = String::from("\"");
            for part in parts {
                match part {
                    TemplatePart::Literal(text) => s.push_str(&escape(text)),
                    TemplatePart::Interpolation(e) => {
                        s.push_str("${");
                        s.push_str(&render_expr(e, depth, true));
                        s.push('}');
                    }
                }
            }
            s.push('"');
            s
        }
        ExprKind::Heredoc(h) => {
            let dash = if h.strip_indent { "-" } else { "" };
            format!("<<{}{}\n{}{}", dash, h.marker, h.raw, h.marker)
        }
        ExprKind::Traversal(t) => {
            let mut s = t.root.clone();
            for step in &t.steps {
                match step {
                    Step::Attr { name, .. } => {
                        s.push('.');
                        s.push_str(name);
                    }
                    Step::Index { key, .. } => {
                        s.push('[');
                        s.push_str(&render_literal(key));
                        s.push(']');
                    }
                }
            }
            s
        }
        ExprKind::GetAttr { object, name } => {
            format!("{}.{}", render_expr(object, depth, inline), name)
        }
        ExprKind::Index { collection, key } => format!(
            "{}[{}]",
            render_expr(collection, depth, inline),
            render_expr(key, depth, true)
        ),
        ExprKind::Tuple(items) => {
            let items: Vec<String> = items.iter().map(|e| render_expr(e, depth, true)).collect();
            format!("[{}]", items.join(", "))
        }
        ExprKind::Object(items) => render_object(items, depth, inline),
        ExprKind::FunctionCall {
            name,
            args,
            expand_final,
        } => {
            let args: Vec<String> = args.iter().map(|e| render_expr(e, depth, true)).collect();
            let spread = if *expand_final { "..." } else { "" };
            format!("{}({}{})", name, args.join(", "), spread)
        }
        ExprKind::Unary { op, operand } => {
            let sym = match op {
                crate::expr::UnaryOp::Negate => "-",
                crate::expr::UnaryOp::Not => "!",
            };
            format!("{}{}", sym, render_expr(operand, depth, inline))
        }
        ExprKind::Binary { op, lhs, rhs } => format!(
            "{} {} {}",
            render_expr(lhs, depth, inline),
            op.symbol(),
            render_expr(rhs, depth, inline)
        ),
        ExprKind::Conditional {
            condition,
            then,
            otherwise,
        } => format!(
            "{} ? {} : {}",
            render_expr(condition, depth, inline),
            render_expr(then, depth, inline),
            render_expr(otherwise, depth, inline)
        ),
        ExprKind::For(f) => {
            let vars = match &f.key_var {
                Some(k) => format!("{}, {}", k, f.value_var),
                None => f.value_var.clone(),
            };
            let collection = render_expr(&f.collection, depth, true);
            let value = render_expr(&f.value, depth, true);
            let cond = f
                .condition
                .as_ref()
                .map(|c| format!(" if {}", render_expr(c, depth, true)))
                .unwrap_or_default();
            match &f.key {
                Some(key) => format!(
                    "{{for {} in {} : {} => {}{}{}}}",
                    vars,
                    collection,
                    render_expr(key, depth, true),
                    value,
                    if f.group { "..." } else { "" },
                    cond
                ),
                None => format!("[for {} in {} : {}{}]", vars, collection, value, cond),
            }
        }
        ExprKind::Parens(inner) => format!("({})", render_expr(inner, depth, inline)),
    }
}

fn render_object(items: &[ObjectItem], depth: usize, inline: bool) -> String {
    if items.is_empty() {
        return "{}".to_string();
    }
    let keys: Vec<String> = items.iter().map(|item| render_key(&item.key, depth)).collect();
    if inline {
        let pairs: Vec<String> = keys
            .iter()
            .zip(items)
            .map(|(k, item)| format!("{} = {}", k, render_expr(&item.value, depth, true)))
            .collect();
        return format!("{{ {} }}", pairs.join(", "));
    }
    let rendered: Vec<(&str, String)> = keys
        .iter()
        .zip(items)
        .map(|(k, item)| (k.as_str(), render_expr(&item.value, depth + 1, false)))
        .collect();
    let mut s = String::from("{\n");
    write_aligned(&mut s, &rendered, depth + 1);
    s.push_str(&INDENT.repeat(depth));
    s.push('}');
    s
}

fn render_key(key: &ObjectKey, depth: usize) -> String {
    match key {
        ObjectKey::Ident(name) => name.clone(),
        ObjectKey::Expr(e) => render_expr(e, depth, true),
    }
}

fn render_literal(lit: &Literal) -> String {
    match lit {
        Literal::Null => "null".to_string(),
        Literal::Bool(b) => b.to_string(),
        Literal::Number(n) => format_number(*n),
        Literal::String(s) => quote(s),
    }
}

/// Integral values print without a fractional part.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// A quoted string literal whose content re-parses to exactly `s`.
pub fn quote(s: &str) -> String {
    format!("\"{}\"", escape(s))
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' | '%' if chars.peek() == Some(&'{') => {
                out.push(c);
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

/// Escape template markers in raw heredoc text: `${` becomes `$${` and `%{`
/// becomes `%%{`.
pub fn escape_heredoc(s: &str) -> String {
    s.replace("${", "$${").replace("%{", "%%{")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_template_markers() {
        assert_eq!(
            quote("Hello ${username} %{ if x }"),
            "\"Hello $${username} %%{ if x }\""
        );
        assert_eq!(escape_heredoc("$${{text}}, %%%{text}"), "$$${{text}}, %%%%{text}");
    }

    #[test]
    fn numbers() {
        assert_eq!(format_number(100.0), "100");
        assert_eq!(format_number(-2.5), "-2.5");
    }
}
