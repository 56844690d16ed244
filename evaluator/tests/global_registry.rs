use evaluator::registry::{self, AlreadyInstalled};
use evaluator::{Bind, Binding, Encode, Evaluator, Registry, Resource, Value, Variables, marshal};

trait Shape: Encode {
    fn area(&self) -> f64;
}

#[derive(Debug, Default)]
struct Square {
    name: String,
    side: f64,
}

impl Bind for Square {
    fn binding(b: Binding<Self>) -> Binding<Self> {
        b.name(|s| &s.name, |s| &mut s.name)
            .attr("side", |s| &s.side, |s| &mut s.side)
    }
}

impl Shape for Square {
    fn area(&self) -> f64 {
        self.side * self.side
    }
}

#[derive(Default)]
struct Canvas {
    shapes: Vec<Box<dyn Shape>>,
    title: String,
}

impl Bind for Canvas {
    fn binding(b: Binding<Self>) -> Binding<Self> {
        b.attr("title", |c| &c.title, |c| &mut c.title)
            .polys(|c| &c.shapes, |c| &mut c.shapes)
    }
}

fn install() {
    let registry = Registry::builder()
        .register::<dyn Shape, Square>("square", |s| Box::new(s) as Box<dyn Shape>)
        .scoped_enums("title", ["untitled"])
        .data_source("const", |scope, _| Ok(Value::map([("v", scope.required("v")?)])))
        .build();
    // Tests in this file share the process; the first one installs.
    let _ = registry::install(registry);
}

#[test]
fn evaluator_uses_the_installed_registry() {
    install();
    let source = "title = untitled\nsquare \"a\" {\n  side = data.const.two.v\n}\ndata \"const\" \"two\" {\n  v = 2\n}\n";
    let mut canvas = Canvas::default();
    Evaluator::new()
        .eval_source(source, &mut canvas, &Variables::new())
        .unwrap();
    assert_eq!(canvas.title, "untitled");
    assert_eq!(canvas.shapes.len(), 1);
    assert_eq!(canvas.shapes[0].area(), 4.0);

    assert_eq!(
        marshal(&canvas).unwrap(),
        "title = untitled\nsquare \"a\" {\n  side = 2\n}\n"
    );
}

#[test]
fn resources_decode_through_the_installed_registry() {
    install();
    let mut square = Resource::new("square");
    square.name = "b".into();
    square.attrs.push(evaluator::Attr::new("side", 3.0));
    let mut root = Resource::default();
    root.children.push(square);
    let canvas: Canvas = root.decode().unwrap();
    assert_eq!(canvas.shapes[0].area(), 9.0);
}

#[test]
fn second_installation_fails() {
    install();
    let err: AlreadyInstalled = registry::install(Registry::default()).unwrap_err();
    assert_eq!(err.to_string(), "a process-wide registry is already installed");
}
