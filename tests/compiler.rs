use std::{fs, io::Write};

use ddlc::{
    ast::{NodeKind, NodeRef, PrimitiveType, Resolution},
    context::Context,
    driver::{ExitStatus, RunOptions, RunReport, Session},
    generators::{Generator, GeneratorError, dispatch, outline::OutlineGenerator},
    materialize::materialize_strings,
    parser::parse_file,
    patch::{patch_context, patch_graph},
};

#[derive(Default)]
struct Recorder {
    declarations: Vec<(String, NodeKind, u32)>,
}

impl Generator for Recorder {
    fn on_declaration(&mut self, decl: NodeRef<'_>, _filename: &str) -> Result<(), GeneratorError> {
        self.declarations.push((
            decl.name().unwrap_or_default().to_string(),
            decl.kind(),
            decl.line(),
        ));
        Ok(())
    }
}

fn session(sources: &[(&str, &str)], recorder: &mut Recorder) -> RunReport<Vec<String>> {
    let mut session = Session::new(RunOptions::default(), recorder, Vec::<String>::new());
    for (name, text) in sources {
        session.parse_source(name, *text);
    }
    session.finish().unwrap()
}

fn field_resolution(ctx: &Context, decl: &str, field: &str) -> Resolution {
    let decl = ctx.get(ctx.lookup(decl).unwrap());
    let field = decl.fields().find(|f| f.name() == Some(field)).unwrap();
    field.type_expr().unwrap().type_ref().unwrap().resolution
}

#[test]
fn forward_reference() {
    let mut recorder = Recorder::default();
    let report = session(
        &[("zoo.ddl", "Zoo: struct { head: Animal*; }\nAnimal: struct { legs: u8; }")],
        &mut recorder,
    );

    assert_eq!(report.error_count, 0);
    let ctx = &report.context;
    assert_eq!(
        field_resolution(ctx, "Zoo", "head"),
        Resolution::Declaration(ctx.lookup("Animal").unwrap())
    );
}

#[test]
fn self_reference_terminates() {
    let mut ctx = Context::default();
    let root = parse_file(&mut ctx, "Node: struct { next: Node; }", "node.ddl");
    patch_graph(&mut ctx, root);

    assert!(ctx.errors().is_empty());
    let node = ctx.lookup("Node").unwrap();
    assert_eq!(field_resolution(&ctx, "Node", "next"), Resolution::Declaration(node));
}

#[test]
fn undefined_type() {
    let mut recorder = Recorder::default();
    let report = session(&[("foo.ddl", "\nFoo: struct {\n    x: Bar;\n}")], &mut recorder);

    assert_eq!(report.status, ExitStatus::Failure);
    assert_eq!(report.sink, vec!["ERROR (foo.ddl:3): undeclared identifier 'Bar'"]);
    assert_eq!(
        field_resolution(&report.context, "Foo", "x"),
        Resolution::Undeclared
    );
}

#[test]
fn duplicate_declaration() {
    let mut recorder = Recorder::default();
    let report = session(
        &[("dup.ddl", "Foo: struct { a: u8; }\nFoo: enum { A }")],
        &mut recorder,
    );

    assert_eq!(
        report.sink,
        vec!["ERROR (dup.ddl:2): duplicate declaration of 'Foo', first declared at dup.ddl:1"]
    );
    let first = report.context.get(report.context.lookup("Foo").unwrap());
    assert_eq!(first.kind(), NodeKind::StructDecl);
    assert_eq!(first.line(), 1);
}

#[test]
fn cross_file_resolution() {
    let mut ctx = Context::default();
    parse_file(&mut ctx, "Animal: struct { legs: u8; }", "a.ddl");
    parse_file(&mut ctx, "Owner: struct { pet: Animal; }", "b.ddl");
    patch_context(&mut ctx);

    assert!(ctx.errors().is_empty());
    let pet = ctx.get(ctx.lookup("Owner").unwrap()).fields().next().unwrap();
    let target = pet.type_expr().unwrap().target().unwrap();
    assert_eq!(target.file_name(), "a.ddl");
    assert_eq!(target.name(), Some("Animal"));
}

#[test]
fn recovery_after_missing_colon() {
    let mut recorder = Recorder::default();
    let report = session(
        &[("bad.ddl", "Broken struct { a: int; }\nGood: struct { b: int; }")],
        &mut recorder,
    );

    assert_eq!(report.error_count, 1);
    assert_eq!(
        report.sink,
        vec!["ERROR (bad.ddl:1): expected ':', found identifier 'struct'"]
    );
    assert_eq!(
        recorder.declarations,
        vec![("Good".to_string(), NodeKind::StructDecl, 2)]
    );
    assert_eq!(
        field_resolution(&report.context, "Good", "b"),
        Resolution::Builtin(PrimitiveType::I32)
    );
}

#[test]
fn materialization_is_stable() {
    let mut ctx = Context::default();
    let root = parse_file(&mut ctx, "Pair: struct { left: u8; right: u8; }", "pair.ddl");
    patch_graph(&mut ctx, root);

    assert!(materialize_strings(&mut ctx, root) > 0);
    let before = names(&ctx, root);
    assert_eq!(materialize_strings(&mut ctx, root), 0);
    assert_eq!(names(&ctx, root), before);
    assert_eq!(before, vec!["Pair", "left", "u8", "right", "u8"]);
}

fn names(ctx: &Context, root: ddlc::NodeId) -> Vec<String> {
    fn walk(node: NodeRef<'_>, out: &mut Vec<String>) {
        if let Some(text) = node.node().materialized() {
            out.push(text.to_string());
        }
        for child in node.children() {
            walk(child, out);
        }
    }

    let mut out = Vec::new();
    walk(ctx.get(root), &mut out);
    out
}

#[test]
fn callbacks_see_only_top_level_declarations() {
    let mut ctx = Context::default();
    let root = parse_file(
        &mut ctx,
        "@a A: struct { x: u8; y: u8; }\nB: enum { One, Two }\nC: proc(p: A) -> B",
        "abc.ddl",
    );
    patch_graph(&mut ctx, root);

    let mut recorder = Recorder::default();
    dispatch(&ctx, root, &mut recorder, "abc.ddl").unwrap();

    assert_eq!(
        recorder.declarations,
        vec![
            ("A".to_string(), NodeKind::StructDecl, 1),
            ("B".to_string(), NodeKind::EnumDecl, 2),
            ("C".to_string(), NodeKind::ProcedureDecl, 3),
        ]
    );
}

#[test]
fn compile_example() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/example.ddl");
    let mut outline = OutlineGenerator::new(Vec::<u8>::new(), None);

    let mut session = Session::new(RunOptions::default(), &mut outline, Vec::<String>::new());
    assert!(session.parse_file(path).is_some());
    let report = session.finish().unwrap();

    assert!(report.sink.is_empty(), "{:#?}", report.sink);
    assert_eq!(report.status, ExitStatus::Success);
    assert_eq!(outline.declarations(), 7);

    let ctx = &report.context;
    let shape = ctx.get(ctx.lookup("Shape").unwrap());
    assert!(shape.has_tag("packed"));
    assert_eq!(shape.line(), 13);
    assert_eq!(
        field_resolution(ctx, "Shape", "next"),
        Resolution::Declaration(shape.id())
    );
    assert_eq!(
        field_resolution(ctx, "Shape", "style"),
        Resolution::Declaration(ctx.lookup("Style").unwrap())
    );

    let kinds: Vec<_> = ctx
        .get(ctx.lookup("ShapeKind").unwrap())
        .members()
        .map(|m| m.value().unwrap())
        .collect();
    assert_eq!(kinds, vec![0, 10, 11]);

    let styles: Vec<_> = ctx
        .get(ctx.lookup("Style").unwrap())
        .members()
        .map(|m| m.value().unwrap())
        .collect();
    assert_eq!(styles, vec![1, 2, 0x80]);

    let text = String::from_utf8(outline.into_inner()).unwrap();
    assert!(text.contains("struct Shape @packed\n"));
    assert!(text.contains("    vertices: Vec3[8]\n"));
    assert!(text.contains("    layer: u8 @range(0, 255)\n"));
    assert!(text.contains("proc area(shape: Shape*, scale: f32) -> f64 @export\n"));
}

#[test]
fn unreadable_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.ddl");
    let mut file = fs::File::create(&good).unwrap();
    writeln!(file, "Good: struct {{ other: Missing; }}").unwrap();
    drop(file);

    let mut recorder = Recorder::default();
    let mut session = Session::new(RunOptions::default(), &mut recorder, Vec::<String>::new());
    assert!(session.parse_file(dir.path().join("absent.ddl")).is_none());
    assert!(session.parse_file(&good).is_some());
    let report = session.finish().unwrap();

    assert_eq!(report.error_count, 2);
    assert!(report.sink[0].contains("absent.ddl:0): could not load"));
    assert!(report.sink[1].ends_with("good.ddl:1): undeclared identifier 'Missing'"));
    assert_eq!(recorder.declarations.len(), 1);
}
