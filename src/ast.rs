use std::fmt;

use crate::{context::Context, lexer::Span};

/// Handle to a node stored in a [`Context`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to a file registered in a [`Context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub(crate) u32);

impl FileId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Where a node was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub file: FileId,
    /// 1-based source line.
    pub line: u32,
}

/// Every kind of node in the declaration graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Root of one parsed file; its children are the top-level declarations.
    FileRoot,
    StructDecl,
    UnionDecl,
    EnumDecl,
    FlagsDecl,
    ProcedureDecl,
    /// A struct/union field or a procedure parameter.
    Field,
    /// A member of an enum or flags set.
    EnumMember,
    TypeReference,
    Tag,
    Literal,
}

impl NodeKind {
    /// Returns true for the kinds that may appear as top-level declarations.
    pub fn is_declaration(self) -> bool {
        matches!(
            self,
            NodeKind::StructDecl
                | NodeKind::UnionDecl
                | NodeKind::EnumDecl
                | NodeKind::FlagsDecl
                | NodeKind::ProcedureDecl
        )
    }

    /// The keyword that introduces a declaration of this kind, if any.
    pub fn keyword(self) -> Option<&'static str> {
        match self {
            NodeKind::StructDecl => Some("struct"),
            NodeKind::UnionDecl => Some("union"),
            NodeKind::EnumDecl => Some("enum"),
            NodeKind::FlagsDecl => Some("flags"),
            NodeKind::ProcedureDecl => Some("proc"),
            _ => None,
        }
    }
}

/// Represents the primitive types every context understands without a declaration.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum PrimitiveType {
    /// Boolean type (1 byte).
    Bool,
    /// Character (1 byte).
    Char,
    /// Unsigned 8-bit integer.
    U8,
    /// Unsigned 16-bit integer.
    U16,
    /// Unsigned 32-bit integer.
    U32,
    /// Unsigned 64-bit integer.
    U64,
    /// Signed 8-bit integer.
    I8,
    /// Signed 16-bit integer.
    I16,
    /// Signed 32-bit integer.
    I32,
    /// Signed 64-bit integer.
    I64,
    /// 32-bit floating point number.
    F32,
    /// 64-bit floating point number.
    F64,
}

impl PrimitiveType {
    /// Maps a type name onto a primitive, accepting the C spellings `int`,
    /// `float` and `double` as aliases.
    pub fn from_name(name: &str) -> Option<Self> {
        let primitive = match name {
            "bool" => PrimitiveType::Bool,
            "char" => PrimitiveType::Char,
            "u8" => PrimitiveType::U8,
            "u16" => PrimitiveType::U16,
            "u32" => PrimitiveType::U32,
            "u64" => PrimitiveType::U64,
            "i8" => PrimitiveType::I8,
            "i16" => PrimitiveType::I16,
            "i32" | "int" => PrimitiveType::I32,
            "i64" => PrimitiveType::I64,
            "f32" | "float" => PrimitiveType::F32,
            "f64" | "double" => PrimitiveType::F64,
            _ => return None,
        };
        Some(primitive)
    }

    /// Gets the size in bits of a primitive type.
    pub fn get_bit_width(&self) -> usize {
        self.get_byte_size() * 8
    }

    /// Gets the size in bytes of a primitive type.
    pub fn get_byte_size(&self) -> usize {
        match self {
            PrimitiveType::Bool | PrimitiveType::Char | PrimitiveType::U8 | PrimitiveType::I8 => 1,
            PrimitiveType::U16 | PrimitiveType::I16 => 2,
            PrimitiveType::U32 | PrimitiveType::I32 | PrimitiveType::F32 => 4,
            PrimitiveType::U64 | PrimitiveType::I64 | PrimitiveType::F64 => 8,
        }
    }
}

/// One `[...]` suffix on a type expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayLength {
    /// `[]`
    Unsized,
    /// `[N]`
    Fixed(u64),
}

impl fmt::Display for ArrayLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrayLength::Unsized => write!(f, "[]"),
            ArrayLength::Fixed(len) => write!(f, "[{len}]"),
        }
    }
}

/// What a type reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resolution {
    /// Not yet visited by the patch pass.
    #[default]
    Pending,
    /// Linked to a declaration in the same context. The link does not own its target.
    Declaration(NodeId),
    /// Names a builtin primitive.
    Builtin(PrimitiveType),
    /// The patch pass found no declaration of this name.
    Undeclared,
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Declaration(_) | Resolution::Builtin(_))
    }
}

/// Modifiers and resolution state carried by a `TypeReference` node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeRef {
    /// Number of `*` suffixes.
    pub pointer_depth: u8,
    /// `[...]` suffixes in source order.
    pub array_lengths: Vec<ArrayLength>,
    pub resolution: Resolution,
}

/// Classification of a `Literal` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    Integer,
    String,
    Identifier,
    /// Anything else; the text is kept verbatim.
    Raw,
}

/// A single node of the declaration graph.
///
/// Nodes are allocated in a [`Context`] and never freed individually. The
/// `children` and `tags` lists form the ownership tree; type references link
/// back into the graph through [`Resolution::Declaration`] only.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) location: Location,
    pub(crate) children: Vec<NodeId>,
    pub(crate) tags: Vec<NodeId>,
    /// Raw span into the file's source buffer.
    pub(crate) span: Option<Span>,
    /// Owned copy of `span`, filled in by the materializer.
    pub(crate) text: Option<Box<str>>,
    pub(crate) type_ref: Option<TypeRef>,
    pub(crate) value: Option<u64>,
    pub(crate) literal_kind: Option<LiteralKind>,
}

impl Node {
    pub(crate) fn new(kind: NodeKind, location: Location) -> Self {
        Node {
            kind,
            location,
            children: Vec::new(),
            tags: Vec::new(),
            span: None,
            text: None,
            type_ref: None,
            value: None,
            literal_kind: None,
        }
    }

    pub(crate) fn named(kind: NodeKind, location: Location, span: Span) -> Self {
        Node {
            span: Some(span),
            ..Node::new(kind, location)
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn tags(&self) -> &[NodeId] {
        &self.tags
    }

    pub fn span(&self) -> Option<Span> {
        self.span
    }

    /// The owned string produced by the materializer, if it has run.
    pub fn materialized(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn type_ref(&self) -> Option<&TypeRef> {
        self.type_ref.as_ref()
    }

    /// Member value for `EnumMember`, integer value for integer `Literal`s.
    pub fn value(&self) -> Option<u64> {
        self.value
    }

    pub fn literal_kind(&self) -> Option<LiteralKind> {
        self.literal_kind
    }
}

/// A borrowed view of a node together with the context that owns it.
///
/// This is what generator callbacks receive; it walks the graph without
/// exposing arena handles to the caller.
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    ctx: &'a Context,
    id: NodeId,
}

impl<'a> NodeRef<'a> {
    pub(crate) fn new(ctx: &'a Context, id: NodeId) -> Self {
        NodeRef { ctx, id }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn context(&self) -> &'a Context {
        self.ctx
    }

    pub fn node(&self) -> &'a Node {
        self.ctx.node(self.id)
    }

    pub fn kind(&self) -> NodeKind {
        self.node().kind
    }

    pub fn line(&self) -> u32 {
        self.node().location.line
    }

    /// Name of the file this node was parsed from.
    pub fn file_name(&self) -> &'a str {
        self.ctx.file(self.node().location.file).name()
    }

    /// The node's text: its name for named nodes, the verbatim text for literals.
    pub fn name(&self) -> Option<&'a str> {
        self.ctx.text(self.id)
    }

    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let ctx = self.ctx;
        self.node().children.iter().map(move |&id| NodeRef::new(ctx, id))
    }

    pub fn tags(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let ctx = self.ctx;
        self.node().tags.iter().map(move |&id| NodeRef::new(ctx, id))
    }

    /// Finds an attached tag by name.
    pub fn tag(&self, name: &str) -> Option<NodeRef<'a>> {
        self.tags().find(|tag| tag.name() == Some(name))
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.tag(name).is_some()
    }

    /// Fields of a struct or union, or parameters of a procedure.
    pub fn fields(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        self.children().filter(|child| child.kind() == NodeKind::Field)
    }

    pub fn members(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        self.children()
            .filter(|child| child.kind() == NodeKind::EnumMember)
    }

    /// The type of a field, or the return type of a procedure.
    pub fn type_expr(&self) -> Option<NodeRef<'a>> {
        self.children()
            .find(|child| child.kind() == NodeKind::TypeReference)
    }

    pub fn type_ref(&self) -> Option<&'a TypeRef> {
        self.node().type_ref.as_ref()
    }

    /// The declaration a type reference was linked to by the patch pass.
    pub fn target(&self) -> Option<NodeRef<'a>> {
        match self.type_ref()?.resolution {
            Resolution::Declaration(id) => Some(NodeRef::new(self.ctx, id)),
            _ => None,
        }
    }

    pub fn value(&self) -> Option<u64> {
        self.node().value
    }
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("name", &self.name())
            .field("line", &self.line())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_type_sizes() {
        assert_eq!(PrimitiveType::Bool.get_bit_width(), 8);
        assert_eq!(PrimitiveType::U8.get_bit_width(), 8);
        assert_eq!(PrimitiveType::U32.get_bit_width(), 32);
        assert_eq!(PrimitiveType::F64.get_bit_width(), 64);

        assert_eq!(PrimitiveType::Bool.get_byte_size(), 1);
        assert_eq!(PrimitiveType::U16.get_byte_size(), 2);
        assert_eq!(PrimitiveType::I32.get_byte_size(), 4);
        assert_eq!(PrimitiveType::F64.get_byte_size(), 8);
    }

    #[test]
    fn test_primitive_aliases() {
        assert_eq!(PrimitiveType::from_name("int"), Some(PrimitiveType::I32));
        assert_eq!(PrimitiveType::from_name("double"), Some(PrimitiveType::F64));
        assert_eq!(PrimitiveType::from_name("char"), Some(PrimitiveType::Char));
        assert_eq!(PrimitiveType::from_name("Int"), None);
        assert_eq!(PrimitiveType::from_name("string"), None);
    }

    #[test]
    fn test_declaration_kinds() {
        assert!(NodeKind::StructDecl.is_declaration());
        assert!(NodeKind::ProcedureDecl.is_declaration());
        assert!(!NodeKind::Field.is_declaration());
        assert!(!NodeKind::FileRoot.is_declaration());
        assert_eq!(NodeKind::FlagsDecl.keyword(), Some("flags"));
        assert_eq!(NodeKind::Tag.keyword(), None);
    }

    #[test]
    fn test_resolution_state() {
        assert!(!Resolution::Pending.is_resolved());
        assert!(!Resolution::Undeclared.is_resolved());
        assert!(Resolution::Builtin(PrimitiveType::U8).is_resolved());
        assert!(Resolution::Declaration(NodeId(3)).is_resolved());
    }

    #[test]
    fn test_array_length_display() {
        assert_eq!(ArrayLength::Unsized.to_string(), "[]");
        assert_eq!(ArrayLength::Fixed(16).to_string(), "[16]");
    }
}
