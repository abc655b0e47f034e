//! Symbol patching: turns type-reference names into links.
//!
//! Resolution is a name lookup against the context-wide symbol table, so the
//! only traversal is the walk over the ownership tree, which cannot cycle.
//! Reference cycles (`Node: struct { next: Node*; }`) need no special care.

use tracing::debug;

use crate::{
    ast::{NodeId, NodeKind, PrimitiveType, Resolution},
    context::Context,
    error::DiagnosticKind,
};

/// Resolves every not-yet-linked type reference reachable from `root`.
///
/// A name is looked up in the symbol table first and among the builtin
/// primitives second. Misses are reported as `undeclared identifier` and the
/// reference is marked [`Resolution::Undeclared`]; a later pass retries it.
pub fn patch_graph(ctx: &mut Context, root: NodeId) {
    let mut patches: Vec<(NodeId, Resolution)> = Vec::new();
    let mut stack = vec![root];

    while let Some(id) = stack.pop() {
        let node = ctx.node(id);
        stack.extend(node.children().iter().rev().copied());

        let Some(type_ref) = node.type_ref() else {
            continue;
        };
        if node.kind() == NodeKind::TypeReference && !type_ref.resolution.is_resolved() {
            patches.push((id, resolve(ctx, id)));
        }
    }

    let mut undeclared = 0usize;
    for (id, resolution) in &patches {
        if *resolution == Resolution::Undeclared {
            undeclared += 1;
            let name = ctx.text(*id).unwrap_or("<unavailable>").to_string();
            let location = ctx.node(*id).location();
            ctx.report(
                DiagnosticKind::Symbol,
                location,
                format!("undeclared identifier '{name}'"),
            );
        }
        if let Some(type_ref) = ctx.node_mut(*id).type_ref.as_mut() {
            type_ref.resolution = *resolution;
        }
    }

    debug!(references = patches.len(), undeclared, "patched graph");
}

/// Patches every file root in the context.
pub fn patch_context(ctx: &mut Context) {
    let roots: Vec<NodeId> = ctx.roots().collect();
    for root in roots {
        patch_graph(ctx, root);
    }
}

fn resolve(ctx: &Context, id: NodeId) -> Resolution {
    let Some(name) = ctx.text(id) else {
        return Resolution::Undeclared;
    };

    if let Some(target) = ctx.lookup(name) {
        return Resolution::Declaration(target);
    }
    match PrimitiveType::from_name(name) {
        Some(primitive) if ctx.config().builtin_primitives => Resolution::Builtin(primitive),
        _ => Resolution::Undeclared,
    }
}
