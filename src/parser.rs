use std::sync::Arc;

use tracing::debug;

use crate::{
    ast::{ArrayLength, FileId, LiteralKind, Location, Node, NodeId, NodeKind, TypeRef},
    context::Context,
    error::DiagnosticKind,
    lexer::{Lexer, Span, Token, TokenKind},
};

/// Parses one source buffer into `ctx` and returns the new file root.
///
/// Syntax and lexical errors are recorded on the context; the parser recovers
/// and keeps going, so the root always comes back holding every declaration
/// that parsed cleanly.
pub fn parse_file(ctx: &mut Context, source: impl Into<Arc<str>>, filename: &str) -> NodeId {
    let source: Arc<str> = source.into();
    let (file, root) = ctx.add_file(filename, Arc::clone(&source));

    let errors_before = ctx.errors().total();
    Parser::new(ctx, &source, file).parse_declarations(root);

    debug!(
        file = filename,
        declarations = ctx.node(root).children().len(),
        errors = ctx.errors().total() - errors_before,
        "parsed file"
    );
    root
}

/// Whether the parser is reading declarations or skipping to the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    Parsing,
    /// Discarding tokens after an error. `from` is the offset of the token the
    /// failed declaration started at, which never counts as a restart point.
    Recovering { from: usize },
}

/// A syntax error on its way out of the declaration being parsed.
#[derive(Debug)]
struct SyntaxError {
    line: u32,
    message: String,
}

type ParseResult<T> = Result<T, SyntaxError>;

/// The contextual keywords that introduce a declaration body.
fn declaration_kind(keyword: &str) -> Option<NodeKind> {
    match keyword {
        "struct" => Some(NodeKind::StructDecl),
        "union" => Some(NodeKind::UnionDecl),
        "enum" => Some(NodeKind::EnumDecl),
        "flags" => Some(NodeKind::FlagsDecl),
        "proc" => Some(NodeKind::ProcedureDecl),
        _ => None,
    }
}

/// Recursive-descent parser from DDL source into the declaration graph.
pub(crate) struct Parser<'a> {
    ctx: &'a mut Context,
    lexer: Lexer<'a>,
    file: FileId,
    current_token: Token,
    state: ParserState,
    /// Open `{`, `(` and `[` among the tokens consumed so far.
    nesting: usize,
}

impl<'a> Parser<'a> {
    /// Creates a new parser and grabs the first token.
    pub(crate) fn new(ctx: &'a mut Context, source: &'a str, file: FileId) -> Self {
        let mut parser = Parser {
            ctx,
            lexer: Lexer::new(source),
            file,
            current_token: Token {
                kind: TokenKind::Eof,
                span: Span::default(),
                line: 1,
            },
            state: ParserState::Parsing,
            nesting: 0,
        };
        parser.current_token = parser.next_significant();
        parser
    }

    fn source(&self) -> &'a str {
        self.lexer.source()
    }

    fn location(&self, line: u32) -> Location {
        Location {
            file: self.file,
            line,
        }
    }

    /// Pulls the next token, recording and skipping lexical errors.
    fn next_significant(&mut self) -> Token {
        loop {
            let token = self.lexer.next_token();
            match &token.kind {
                TokenKind::Error(error) => {
                    let location = self.location(token.line);
                    self.ctx.report(DiagnosticKind::Lex, location, error.to_string());
                }
                _ => return token,
            }
        }
    }

    /// Advances the parser to the next token and returns the one it consumed.
    fn advance(&mut self) -> Token {
        let next = self.next_significant();
        let consumed = std::mem::replace(&mut self.current_token, next);
        self.nesting = self
            .nesting
            .saturating_add_signed(consumed.kind.nesting_delta());
        consumed
    }

    fn at(&self, kind: &TokenKind) -> bool {
        &self.current_token.kind == kind
    }

    /// Checks if the current token matches an expected kind and consumes it.
    fn consume(&mut self, expected: TokenKind) -> ParseResult<Token> {
        if self.current_token.kind == expected {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&expected.to_string()))
        }
    }

    /// Builds an "expected X, found Y" error at the current token.
    fn unexpected(&self, expected: &str) -> SyntaxError {
        let token = &self.current_token;
        let found = match token.kind {
            TokenKind::Identifier | TokenKind::Integer(_) | TokenKind::String => {
                format!("{} '{}'", token.kind, token.text(self.source()))
            }
            _ => token.kind.to_string(),
        };
        SyntaxError {
            line: token.line,
            message: format!("expected {expected}, found {found}"),
        }
    }

    /// Helper to consume an Identifier and return its span and line.
    fn consume_identifier(&mut self, what: &str) -> ParseResult<(Span, u32)> {
        if self.at(&TokenKind::Identifier) {
            let token = self.advance();
            Ok((token.span, token.line))
        } else {
            Err(self.unexpected(what))
        }
    }

    // --- Core Parsing Functions ---

    /// Parses declarations until end of file, attaching each one to `root`.
    fn parse_declarations(mut self, root: NodeId) {
        while !self.at(&TokenKind::Eof) {
            match self.state {
                ParserState::Parsing => {
                    let start = self.current_token.span.start;
                    match self.parse_declaration() {
                        Ok(decl) => {
                            self.ctx.push_child(root, decl);
                            self.ctx.declare(decl);
                        }
                        Err(error) => {
                            let location = self.location(error.line);
                            self.ctx
                                .report(DiagnosticKind::Syntax, location, error.message);
                            self.state = ParserState::Recovering { from: start };
                        }
                    }
                }
                ParserState::Recovering { from } => {
                    while !self.at_sync_point(from) {
                        self.advance();
                    }
                    // Brackets left open by the failed declaration stay unmatched.
                    self.nesting = 0;
                    self.state = ParserState::Parsing;
                }
            }
        }
    }

    /// A place where a new declaration can start: `name : keyword` with its
    /// opening bracket at any depth; `name :`, a tag, or end of file outside
    /// any brackets.
    fn at_sync_point(&mut self, from: usize) -> bool {
        if self.at(&TokenKind::Eof) {
            return true;
        }
        if self.current_token.span.start == from {
            return false;
        }
        if self.at_declaration_start() {
            return true;
        }
        if self.nesting > 0 {
            return false;
        }
        match self.current_token.kind {
            TokenKind::At | TokenKind::OpenBracket => true,
            TokenKind::Identifier => self.lexer.peek().kind == TokenKind::Colon,
            _ => false,
        }
    }

    /// `name : struct {`, `name : proc (` and the like. A field cannot look
    /// like this, so it marks a declaration even inside unbalanced brackets.
    fn at_declaration_start(&mut self) -> bool {
        if !self.at(&TokenKind::Identifier) || self.lexer.peek().kind != TokenKind::Colon {
            return false;
        }

        let source = self.source();
        let keyword = self.lexer.peek_nth(1);
        let kind = match keyword.kind {
            TokenKind::Identifier => declaration_kind(keyword.text(source)),
            _ => None,
        };
        let opener = match kind {
            Some(NodeKind::ProcedureDecl) => TokenKind::OpenParen,
            Some(_) => TokenKind::OpenBrace,
            None => return false,
        };
        self.lexer.peek_nth(2).kind == opener
    }

    /// Parses `tags name : keyword body ;?`.
    fn parse_declaration(&mut self) -> ParseResult<NodeId> {
        let tags = self.parse_tags()?;
        let (name, line) = self.consume_identifier("a declaration name")?;
        self.consume(TokenKind::Colon)?;

        let keyword = self.current_token.text(self.source());
        let kind = match (&self.current_token.kind, declaration_kind(keyword)) {
            (TokenKind::Identifier, Some(kind)) => kind,
            _ => return Err(self.unexpected("'struct', 'union', 'enum', 'flags' or 'proc'")),
        };
        self.advance();

        let location = self.location(line);
        let decl = self.ctx.alloc(Node::named(kind, location, name));
        self.ctx.node_mut(decl).tags = tags;

        match kind {
            NodeKind::StructDecl | NodeKind::UnionDecl => self.parse_fields(decl)?,
            NodeKind::EnumDecl | NodeKind::FlagsDecl => self.parse_members(decl, kind)?,
            _ => self.parse_procedure(decl)?,
        }

        if self.at(&TokenKind::Semicolon) {
            self.advance();
        }
        Ok(decl)
    }

    // --- Tags ---

    /// Parses any number of `@name(args)` and `[name(args)]` annotations.
    fn parse_tags(&mut self) -> ParseResult<Vec<NodeId>> {
        let mut tags = Vec::new();
        loop {
            match self.current_token.kind {
                TokenKind::At => {
                    self.advance();
                    tags.push(self.parse_tag()?);
                }
                TokenKind::OpenBracket => {
                    self.advance();
                    tags.push(self.parse_tag()?);
                    self.consume(TokenKind::CloseBracket)?;
                }
                _ => return Ok(tags),
            }
        }
    }

    fn parse_tag(&mut self) -> ParseResult<NodeId> {
        let (name, line) = self.consume_identifier("a tag name")?;
        let location = self.location(line);
        let tag = self.ctx.alloc(Node::named(NodeKind::Tag, location, name));

        if self.at(&TokenKind::OpenParen) {
            self.advance();
            self.parse_tag_arguments(tag)?;
        }
        Ok(tag)
    }

    /// Reads comma-separated arguments up to the matching `)` without
    /// interpreting them. Each argument becomes a `Literal` spanning its raw
    /// tokens. A declaration start ends an unclosed argument list.
    fn parse_tag_arguments(&mut self, tag: NodeId) -> ParseResult<()> {
        let mut depth = 0usize;
        let mut argument: Vec<Token> = Vec::new();

        loop {
            if self.at_declaration_start() {
                return Err(self.unexpected("')'"));
            }
            match self.current_token.kind {
                TokenKind::Eof => return Err(self.unexpected("')'")),
                TokenKind::CloseParen if depth == 0 => {
                    self.push_tag_argument(tag, &argument);
                    self.advance();
                    return Ok(());
                }
                TokenKind::Comma if depth == 0 => {
                    self.push_tag_argument(tag, &argument);
                    argument.clear();
                    self.advance();
                }
                _ => {
                    depth = depth.saturating_add_signed(self.current_token.kind.nesting_delta());
                    argument.push(self.advance());
                }
            }
        }
    }

    fn push_tag_argument(&mut self, tag: NodeId, tokens: &[Token]) {
        let (Some(first), Some(last)) = (tokens.first(), tokens.last()) else {
            return;
        };

        let (kind, value) = match tokens {
            [single] => match single.kind {
                TokenKind::Integer(value) => (LiteralKind::Integer, Some(value)),
                TokenKind::String => (LiteralKind::String, None),
                TokenKind::Identifier => (LiteralKind::Identifier, None),
                _ => (LiteralKind::Raw, None),
            },
            _ => (LiteralKind::Raw, None),
        };

        let mut literal = Node::named(
            NodeKind::Literal,
            self.location(first.line),
            first.span.to(last.span),
        );
        literal.literal_kind = Some(kind);
        literal.value = value;
        let literal = self.ctx.alloc(literal);
        self.ctx.push_child(tag, literal);
    }

    // --- Struct and Union Parsing ---

    /// Parses `{ (field ;)* }`.
    fn parse_fields(&mut self, decl: NodeId) -> ParseResult<()> {
        self.consume(TokenKind::OpenBrace)?;

        while !self.at(&TokenKind::CloseBrace) && !self.at(&TokenKind::Eof) {
            let field = self.parse_field()?;
            self.consume(TokenKind::Semicolon)?;
            self.ctx.push_child(decl, field);
        }

        self.consume(TokenKind::CloseBrace)?;
        Ok(())
    }

    /// Parses `tags name : typeExpr`; used for fields and parameters alike.
    fn parse_field(&mut self) -> ParseResult<NodeId> {
        let tags = self.parse_tags()?;
        let (name, line) = self.consume_identifier("a field name")?;
        self.consume(TokenKind::Colon)?;
        let type_expr = self.parse_type()?;

        let mut field = Node::named(NodeKind::Field, self.location(line), name);
        field.tags = tags;
        field.children.push(type_expr);
        Ok(self.ctx.alloc(field))
    }

    // --- Type Parsing ---

    /// Parses a type name followed by `*` and `[N]` / `[]` suffixes. The
    /// reference is left unresolved for the patch pass.
    fn parse_type(&mut self) -> ParseResult<NodeId> {
        let (name, line) = self.consume_identifier("a type name")?;
        let mut type_ref = TypeRef::default();

        loop {
            if self.at(&TokenKind::Star) {
                self.advance();
                type_ref.pointer_depth = type_ref.pointer_depth.saturating_add(1);
            } else if self.at_array_suffix() {
                self.advance();
                let length = match self.current_token.kind {
                    TokenKind::Integer(len) => {
                        self.advance();
                        ArrayLength::Fixed(len)
                    }
                    _ => ArrayLength::Unsized,
                };
                self.consume(TokenKind::CloseBracket)?;
                type_ref.array_lengths.push(length);
            } else {
                break;
            }
        }

        let mut node = Node::named(NodeKind::TypeReference, self.location(line), name);
        node.type_ref = Some(type_ref);
        Ok(self.ctx.alloc(node))
    }

    /// `[` opens an array suffix only when followed by a length or `]`; a
    /// name after it starts a tag on whatever comes next.
    fn at_array_suffix(&mut self) -> bool {
        self.at(&TokenKind::OpenBracket)
            && matches!(
                self.lexer.peek().kind,
                TokenKind::Integer(_) | TokenKind::CloseBracket
            )
    }

    // --- Enum and Flags Parsing ---

    /// Parses `{ (tags name (= INTEGER)? ,?)* }`.
    ///
    /// Enum members count up from the previous value, starting at 0. Flags
    /// members without an explicit value get bit `1 << position`.
    fn parse_members(&mut self, decl: NodeId, kind: NodeKind) -> ParseResult<()> {
        self.consume(TokenKind::OpenBrace)?;

        let mut next_value = Some(0u64);
        let mut position = 0u32;

        while !self.at(&TokenKind::CloseBrace) && !self.at(&TokenKind::Eof) {
            let tags = self.parse_tags()?;
            let (name, line) = self.consume_identifier("a member name")?;

            let mut member = Node::named(NodeKind::EnumMember, self.location(line), name);
            member.tags = tags;

            let value = if self.at(&TokenKind::Assign) {
                self.advance();
                let (value, literal) = self.parse_integer_literal()?;
                member.children.push(literal);
                value
            } else {
                let auto = match kind {
                    NodeKind::FlagsDecl => 1u64.checked_shl(position),
                    _ => next_value,
                };
                match auto {
                    Some(value) => value,
                    None => {
                        let member_name = name.text(self.source()).unwrap_or_default();
                        return Err(SyntaxError {
                            line,
                            message: format!("value of member '{member_name}' does not fit in 64 bits"),
                        });
                    }
                }
            };
            member.value = Some(value);
            next_value = value.checked_add(1);
            position = position.saturating_add(1);

            let member = self.ctx.alloc(member);
            self.ctx.push_child(decl, member);

            if self.at(&TokenKind::Comma) {
                self.advance();
            }
        }

        self.consume(TokenKind::CloseBrace)?;
        Ok(())
    }

    fn parse_integer_literal(&mut self) -> ParseResult<(u64, NodeId)> {
        let value = match self.current_token.kind {
            TokenKind::Integer(value) => value,
            _ => return Err(self.unexpected("an integer literal")),
        };
        let token = self.advance();

        let mut literal = Node::named(NodeKind::Literal, self.location(token.line), token.span);
        literal.literal_kind = Some(LiteralKind::Integer);
        literal.value = Some(value);
        Ok((value, self.ctx.alloc(literal)))
    }

    // --- Procedure Parsing ---

    /// Parses `( (param (, param)*)? ) (-> typeExpr)?`.
    fn parse_procedure(&mut self, decl: NodeId) -> ParseResult<()> {
        self.consume(TokenKind::OpenParen)?;

        if !self.at(&TokenKind::CloseParen) {
            loop {
                let param = self.parse_field()?;
                self.ctx.push_child(decl, param);
                if !self.at(&TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
        }
        self.consume(TokenKind::CloseParen)?;

        if self.at(&TokenKind::Arrow) {
            self.advance();
            let return_type = self.parse_type()?;
            self.ctx.push_child(decl, return_type);
        }
        Ok(())
    }
}
