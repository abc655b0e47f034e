//! Run-scoped state shared by every phase of the pipeline.
//!
//! A [`Context`] owns the node arena, the symbol table, the error stack and
//! the registry of parsed files. Several files parsed into the same context
//! see each other's declarations, and every node stays valid until the
//! context is dropped.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::{
    ast::{FileId, Location, Node, NodeId, NodeKind, NodeRef},
    error::{Diagnostic, DiagnosticKind, ErrorStack, OverflowPolicy},
};

/// Configuration settings for a [`Context`].
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Maximum number of errors held between drains.
    pub error_capacity: usize,
    /// What to do once `error_capacity` is reached.
    pub overflow: OverflowPolicy,
    /// Resolve `u32`, `f64`, `int`, ... without a declaration.
    pub builtin_primitives: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig {
            error_capacity: 256,
            overflow: OverflowPolicy::Truncate,
            builtin_primitives: true,
        }
    }
}

/// A file parsed into a context.
#[derive(Debug, Clone)]
pub struct SourceFile {
    name: String,
    root: NodeId,
    source: Option<Arc<str>>,
}

impl SourceFile {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The source buffer, until [`Context::release_source`] drops it.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }
}

#[derive(Debug, Clone)]
pub struct Context {
    config: ContextConfig,
    nodes: Vec<Node>,
    files: Vec<SourceFile>,
    symbols: FxHashMap<Box<str>, NodeId>,
    errors: ErrorStack,
}

impl Default for Context {
    fn default() -> Self {
        Context::new(ContextConfig::default())
    }
}

impl Context {
    pub fn new(config: ContextConfig) -> Self {
        let errors = ErrorStack::new(config.error_capacity, config.overflow);
        Context {
            config,
            nodes: Vec::new(),
            files: Vec::new(),
            symbols: FxHashMap::default(),
            errors,
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    // --- Arena ---

    /// # Panics
    ///
    /// Panics if the arena already holds `u32::MAX + 1` nodes.
    pub(crate) fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(next_handle(self.nodes.len(), "nodes"));
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// A navigable view of `id`.
    pub fn get(&self, id: NodeId) -> NodeRef<'_> {
        NodeRef::new(self, id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn push_child(&mut self, parent: NodeId, child: NodeId) {
        self.node_mut(parent).children.push(child);
    }

    // --- Files ---

    /// Registers a file and allocates its root node.
    pub(crate) fn add_file(&mut self, name: &str, source: Arc<str>) -> (FileId, NodeId) {
        let file = FileId(next_handle(self.files.len(), "files"));
        let root = self.alloc(Node::new(NodeKind::FileRoot, Location { file, line: 1 }));
        self.files.push(SourceFile {
            name: name.to_string(),
            root,
            source: Some(source),
        });
        (file, root)
    }

    pub fn file(&self, id: FileId) -> &SourceFile {
        &self.files[id.index()]
    }

    /// Files in the order they were parsed.
    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.files.iter().map(SourceFile::root)
    }

    /// Drops the source buffer of `file`. Materialized strings stay valid;
    /// spans that were never materialized become unreadable.
    pub fn release_source(&mut self, file: FileId) {
        if self.files[file.index()].source.take().is_some() {
            debug!(file = %self.files[file.index()].name, "released source buffer");
        }
    }

    /// The raw source slice behind a node's span, if the buffer is still held.
    pub fn source_text(&self, id: NodeId) -> Option<&str> {
        let node = self.node(id);
        let source = self.file(node.location.file).source()?;
        node.span?.text(source)
    }

    /// The node's text: the materialized copy when there is one, otherwise
    /// the raw source slice.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        self.node(id)
            .materialized()
            .or_else(|| self.source_text(id))
    }

    // --- Symbols ---

    /// Looks up a declaration by name across every file in the context.
    pub fn lookup(&self, name: &str) -> Option<NodeId> {
        self.symbols.get(name).copied()
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    /// Enters a declaration into the symbol table. The first declaration of a
    /// name wins; later ones are reported and left out of the table.
    pub(crate) fn declare(&mut self, decl: NodeId) {
        let Some(name) = self.text(decl).map(Box::<str>::from) else {
            return;
        };
        let location = self.node(decl).location;

        if let Some(&first) = self.symbols.get(&name) {
            let previous = self.node(first).location;
            let message = format!(
                "duplicate declaration of '{name}', first declared at {}:{}",
                self.file(previous.file).name(),
                previous.line
            );
            self.report(DiagnosticKind::Symbol, location, message);
            return;
        }
        self.symbols.insert(name, decl);
    }

    // --- Errors ---

    pub fn errors(&self) -> &ErrorStack {
        &self.errors
    }

    pub fn errors_mut(&mut self) -> &mut ErrorStack {
        &mut self.errors
    }

    /// Records a diagnostic at a location inside a registered file.
    pub fn report(&mut self, kind: DiagnosticKind, location: Location, message: impl Into<String>) {
        let file = self.files[location.file.index()].name.clone();
        self.errors
            .push(Diagnostic::new(kind, file, location.line, message));
    }

    /// Records a diagnostic for a file that never made it into the registry.
    pub fn report_unlocated(
        &mut self,
        kind: DiagnosticKind,
        file: &str,
        message: impl Into<String>,
    ) {
        self.errors.push(Diagnostic::new(kind, file, 0, message));
    }
}

/// Handles are `u32`; a context holds at most 2^32 nodes and 2^32 files.
fn next_handle(len: usize, what: &str) -> u32 {
    match u32::try_from(len) {
        Ok(handle) => handle,
        Err(_) => panic!("context cannot hold more than {} {what}", u64::from(u32::MAX) + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Span;

    fn declaration(ctx: &mut Context, file: FileId, line: u32, span: Span) -> NodeId {
        ctx.alloc(Node::named(NodeKind::StructDecl, Location { file, line }, span))
    }

    #[test]
    fn test_first_declaration_wins() {
        let mut ctx = Context::default();
        let (file, _) = ctx.add_file("a.ddl", Arc::from("Foo\nFoo"));
        let first = declaration(&mut ctx, file, 1, Span::new(0, 3));
        let second = declaration(&mut ctx, file, 2, Span::new(4, 7));

        ctx.declare(first);
        ctx.declare(second);

        assert_eq!(ctx.lookup("Foo"), Some(first));
        assert_eq!(ctx.symbol_count(), 1);
        let errors = ctx.errors().entries();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, DiagnosticKind::Symbol);
        assert_eq!(errors[0].line, 2);
        assert!(errors[0].message.contains("first declared at a.ddl:1"));
    }

    #[test]
    fn test_text_prefers_materialized_copy() {
        let mut ctx = Context::default();
        let (file, _) = ctx.add_file("a.ddl", Arc::from("Alpha"));
        let decl = declaration(&mut ctx, file, 1, Span::new(0, 5));

        assert_eq!(ctx.text(decl), Some("Alpha"));
        ctx.release_source(file);
        assert_eq!(ctx.text(decl), None);

        ctx.node_mut(decl).text = Some("Alpha".into());
        assert_eq!(ctx.text(decl), Some("Alpha"));
        assert_eq!(ctx.source_text(decl), None);
    }

    #[test]
    fn test_files_are_kept_in_parse_order() {
        let mut ctx = Context::default();
        let (_, first_root) = ctx.add_file("one.ddl", Arc::from(""));
        let (_, second_root) = ctx.add_file("two.ddl", Arc::from(""));

        let names: Vec<&str> = ctx.files().iter().map(SourceFile::name).collect();
        assert_eq!(names, vec!["one.ddl", "two.ddl"]);
        assert_eq!(ctx.roots().collect::<Vec<_>>(), vec![first_root, second_root]);
        assert_eq!(ctx.node(first_root).kind(), NodeKind::FileRoot);
    }

    #[test]
    fn test_handles_cover_the_full_u32_range() {
        assert_eq!(next_handle(0, "nodes"), 0);
        assert_eq!(next_handle(u32::MAX as usize, "nodes"), u32::MAX);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    #[should_panic(expected = "context cannot hold more than 4294967296 nodes")]
    fn test_handle_overflow_panics() {
        next_handle(u32::MAX as usize + 1, "nodes");
    }

    #[test]
    fn test_unlocated_report_uses_line_zero() {
        let mut ctx = Context::default();
        ctx.report_unlocated(DiagnosticKind::Io, "missing.ddl", "could not load");
        assert_eq!(
            ctx.errors().entries()[0].to_string(),
            "ERROR (missing.ddl:0): could not load"
        );
    }
}
