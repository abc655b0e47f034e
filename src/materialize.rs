//! String materialization: copies source spans into strings owned by the nodes.
//!
//! Until this pass runs, names are slices of the file's source buffer. After
//! it, every node reachable from the root carries its own copy and the buffer
//! can be released with [`Context::release_source`].

use tracing::debug;

use crate::{ast::NodeId, context::Context};

/// Materializes every span reachable from `root` through children and tags.
///
/// Nodes that already hold a copy are left alone, so running the pass again
/// is a no-op. Returns the number of nodes that received a new copy.
pub fn materialize_strings(ctx: &mut Context, root: NodeId) -> usize {
    let mut materialized = 0;
    let mut stack = vec![root];

    while let Some(id) = stack.pop() {
        let node = ctx.node(id);
        stack.extend(node.children().iter().chain(node.tags()).copied());

        if node.span().is_none() || node.materialized().is_some() {
            continue;
        }
        let Some(owned) = ctx.source_text(id).map(Box::<str>::from) else {
            continue;
        };
        ctx.node_mut(id).text = Some(owned);
        materialized += 1;
    }

    debug!(materialized, "materialized strings");
    materialized
}

/// Materializes every file in the context.
pub fn materialize_context(ctx: &mut Context) -> usize {
    let roots: Vec<NodeId> = ctx.roots().collect();
    roots
        .into_iter()
        .map(|root| materialize_strings(ctx, root))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ast::NodeKind, parser::parse_file};

    const SOURCE: &str = "@doc(\"a point\") Point: struct { x: f32; y: f32; }\nAxis: enum { X = 1, Y }";

    fn owned_strings(ctx: &Context) -> Vec<(NodeKind, String)> {
        (0..ctx.node_count() as u32)
            .map(NodeId)
            .filter_map(|id| {
                let node = ctx.node(id);
                node.materialized()
                    .map(|text| (node.kind(), text.to_string()))
            })
            .collect()
    }

    #[test]
    fn test_every_span_gets_a_copy() {
        let mut ctx = Context::default();
        let root = parse_file(&mut ctx, SOURCE, "point.ddl");
        let count = materialize_strings(&mut ctx, root);

        // 2 declarations, 1 tag, 1 tag argument, 2 fields, 2 type references,
        // 2 members, 1 member literal.
        assert_eq!(count, 11);
        let strings = owned_strings(&ctx);
        assert!(strings.contains(&(NodeKind::StructDecl, "Point".to_string())));
        assert!(strings.contains(&(NodeKind::Literal, "\"a point\"".to_string())));
        assert!(strings.contains(&(NodeKind::Literal, "1".to_string())));
        assert!(strings.contains(&(NodeKind::TypeReference, "f32".to_string())));
    }

    #[test]
    fn test_materialization_is_idempotent() {
        let mut ctx = Context::default();
        let root = parse_file(&mut ctx, SOURCE, "point.ddl");

        materialize_strings(&mut ctx, root);
        let first = owned_strings(&ctx);

        assert_eq!(materialize_strings(&mut ctx, root), 0);
        assert_eq!(owned_strings(&ctx), first);
    }

    #[test]
    fn test_names_survive_released_source() {
        let mut ctx = Context::default();
        let root = parse_file(&mut ctx, String::from(SOURCE), "point.ddl");
        materialize_context(&mut ctx);

        let file = ctx.node(root).location().file;
        ctx.release_source(file);
        assert!(ctx.file(file).source().is_none());

        let point = ctx.get(ctx.node(root).children()[0]);
        assert_eq!(point.name(), Some("Point"));
        let fields: Vec<_> = point.fields().map(|f| f.name().unwrap()).collect();
        assert_eq!(fields, vec!["x", "y"]);

        assert_eq!(materialize_strings(&mut ctx, root), 0);
        let point = ctx.get(ctx.node(root).children()[0]);
        assert_eq!(point.name(), Some("Point"));
    }
}
