use sdl::expr::{ExprKind, TemplatePart};
use sdl::printer::format_body;

fn parse(source: &str) -> sdl::File {
    sdl::parse(source, "test.hcl", 0).expect("parse failed")
}

fn parse_err(source: &str) -> String {
    let errs = sdl::parse(source, "test.hcl", 0).expect_err("expected a parse error");
    errs[0].to_string()
}

fn reprint(source: &str) -> String {
    format_body(&parse(source).body)
}

#[test]
fn canonical_documents_round_trip() {
    let docs = [
        "i  = 1\nb  = true\ns  = \"hello, world\"\nsl = [\"hello\", \"world\"]\nbl = [true, false]\nhd = <<-EOT\n  hello\n  world\nEOT\nvars = {\n  a = \"a\"\n}\n",
        "endpoint \"/hello\" {\n  description = \"the hello handler\"\n  timeout_ms  = 100\n  handler {\n    active = true\n    addr   = \":8080\"\n  }\n}\n",
        "person \"dr\" \"jekyll\" {\n}\n",
        "table \"t1\" {\n  schema = schema.s1\n}\n",
    ];
    for doc in docs {
        assert_eq!(reprint(doc), doc);
    }
}

#[test]
fn attributes_print_before_blocks() {
    let out = reprint("a \"x\" {}\nref = a.x\n");
    assert_eq!(out, "ref = a.x\na \"x\" {\n}\n");
}

#[test]
fn blocks_and_labels() {
    let file = parse("table users {\n  column \"id\" {\n    type = int\n  }\n}\n");
    let table = &file.body.blocks[0];
    assert_eq!(table.kind, "table");
    assert_eq!(table.label_values(), vec!["users"]);
    let column = &table.body.blocks[0];
    assert_eq!(column.label(0), Some("id"));
    assert!(column.attribute("type").is_some());
    assert_eq!(table.range.to_string(), "test.hcl:1,1-5,2");
}

#[test]
fn single_line_blocks() {
    let file = parse("schema \"s1\" {}\nschema \"s2\" { comment = \"c\" }\n");
    assert!(file.body.blocks[0].body.is_empty());
    assert_eq!(file.body.blocks[1].body.attributes.len(), 1);
}

#[test]
fn heredoc_round_trip_keeps_escapes() {
    let src = "value = <<-TEXT\n Hello $${username}, %%{ if true }\n $$${{text}}, %%%%{text}\nTEXT\n";
    let file = parse(src);
    let ExprKind::Heredoc(h) = &file.body.attributes[0].expr.kind else {
        panic!("expected heredoc")
    };
    assert_eq!(
        h.parts,
        vec![TemplatePart::Literal(
            "Hello ${username}, %{ if true }\n$${{text}}, %%%{text}\n".to_string()
        )]
    );
    assert_eq!(reprint(src), src);
}

#[test]
fn uses_traversal_looks_through_expressions() {
    let file = parse(
        "a = \"${atlas.env}\"\nb = upper(atlas.env.url)\nc = x ? \"y\" : atlas.env\nd = \"atlas.env\"\n",
    );
    let attr = |name: &str| file.body.attribute(name).unwrap().expr.clone();
    assert!(attr("a").uses_traversal(&["atlas", "env"]));
    assert!(attr("b").uses_traversal(&["atlas", "env"]));
    assert!(attr("c").uses_traversal(&["atlas", "env"]));
    assert!(!attr("d").uses_traversal(&["atlas", "env"]));
}

#[test]
fn syntax_errors() {
    assert_eq!(
        parse_err("a = 1\na = 2\n"),
        "test.hcl:2,1-2: duplicate attribute \"a\""
    );
    assert!(parse_err("a = \"${x\n").contains("unterminated"));
    assert!(parse_err("block {\n").contains("unclosed block"));
    assert!(parse_err("a = \"%{ if x }y%{ endif }\"\n").contains("directives"));
    assert!(parse_err("a = 1 2\n").contains("expected a newline"));
}

#[test]
fn parse_errors_convert_to_diagnostics() {
    let errs = sdl::parse("a = \n", "test.hcl", 7).unwrap_err();
    let diag = errs[0].to_diagnostic();
    assert_eq!(diag.labels[0].file_id, 7);
}
