use std::io;

use thiserror::Error;

use crate::{
    ast::{NodeId, NodeRef},
    context::Context,
};

pub mod outline;

/// Per-run callbacks that consume the resolved declaration graph.
///
/// `on_init` and `on_cleanup` run once per run; `on_declaration` runs once for
/// every top-level declaration of every file, in source order.
pub trait Generator {
    fn on_init(&mut self) {}

    fn on_declaration(&mut self, decl: NodeRef<'_>, filename: &str) -> Result<(), GeneratorError>;

    fn on_cleanup(&mut self) {}
}

impl<G: Generator + ?Sized> Generator for &mut G {
    fn on_init(&mut self) {
        (**self).on_init();
    }

    fn on_declaration(&mut self, decl: NodeRef<'_>, filename: &str) -> Result<(), GeneratorError> {
        (**self).on_declaration(decl, filename)
    }

    fn on_cleanup(&mut self) {
        (**self).on_cleanup();
    }
}

/// Failure raised by a generator callback.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("generator output failed: {0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Custom(String),
}

/// Calls `on_declaration` for each top-level declaration under `root`.
///
/// Fields, members, tags and type references are never visited. The first
/// callback failure stops the walk and is returned as is.
pub fn dispatch<G: Generator + ?Sized>(
    ctx: &Context,
    root: NodeId,
    generator: &mut G,
    filename: &str,
) -> Result<(), GeneratorError> {
    for decl in ctx.get(root).children() {
        if decl.kind().is_declaration() {
            generator.on_declaration(decl, filename)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ast::NodeKind, parser::parse_file};

    #[derive(Default)]
    struct Recorder {
        seen: Vec<(NodeKind, String, String)>,
        fail_on: Option<&'static str>,
    }

    impl Generator for Recorder {
        fn on_declaration(&mut self, decl: NodeRef<'_>, filename: &str) -> Result<(), GeneratorError> {
            let name = decl.name().unwrap_or_default().to_string();
            if self.fail_on == Some(name.as_str()) {
                return Err(GeneratorError::Custom(format!("refusing {name}")));
            }
            self.seen.push((decl.kind(), name, filename.to_string()));
            Ok(())
        }
    }

    const SOURCE: &str = "@a First: struct { x: u8; y: Second; }\nSecond: enum { One, Two }\nThird: proc(p: First) -> u8";

    #[test]
    fn test_dispatch_visits_declarations_in_order() {
        let mut ctx = Context::default();
        let root = parse_file(&mut ctx, SOURCE, "order.ddl");

        let mut recorder = Recorder::default();
        dispatch(&ctx, root, &mut recorder, "order.ddl").unwrap();

        assert_eq!(
            recorder.seen,
            vec![
                (NodeKind::StructDecl, "First".into(), "order.ddl".into()),
                (NodeKind::EnumDecl, "Second".into(), "order.ddl".into()),
                (NodeKind::ProcedureDecl, "Third".into(), "order.ddl".into()),
            ]
        );
    }

    #[test]
    fn test_dispatch_stops_on_first_failure() {
        let mut ctx = Context::default();
        let root = parse_file(&mut ctx, SOURCE, "order.ddl");

        let mut recorder = Recorder {
            fail_on: Some("Second"),
            ..Recorder::default()
        };
        let error = dispatch(&ctx, root, &mut recorder, "order.ddl").unwrap_err();

        assert_eq!(error.to_string(), "refusing Second");
        assert_eq!(recorder.seen.len(), 1);
    }
}
