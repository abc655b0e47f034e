use std::{
    collections::VecDeque,
    fmt::{self, Display},
};

use thiserror::Error;

/// Byte range of a token in its source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The text this span covers, or `None` if it does not fit `source`.
    pub fn text<'a>(&self, source: &'a str) -> Option<&'a str> {
        source.get(self.start..self.end)
    }
}

/// Lexical errors. They travel through the token stream as [`TokenKind::Error`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unterminated block comment")]
    UnterminatedComment,
    #[error("unrecognized character '{0}'")]
    UnexpectedCharacter(char),
    #[error("invalid or oversized integer literal '{0}'")]
    InvalidInteger(String),
}

// The core token definition for the DDL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier or contextual keyword; the text lives in the source buffer.
    Identifier,
    /// Decimal or hexadecimal integer literal.
    Integer(u64),
    /// Quoted string literal; the span includes the quotes.
    String,
    // Delimiters and Operators
    OpenBrace,    // {
    CloseBrace,   // }
    OpenParen,    // (
    CloseParen,   // )
    OpenBracket,  // [
    CloseBracket, // ]
    Comma,        // ,
    Colon,        // :
    Semicolon,    // ;
    Star,         // *
    At,           // @
    Assign,       // =
    Arrow,        // ->
    /// End of File
    Eof,
    Error(LexError),
}

impl TokenKind {
    /// Change in bracket nesting caused by consuming this token.
    pub fn nesting_delta(&self) -> isize {
        match self {
            TokenKind::OpenBrace | TokenKind::OpenParen | TokenKind::OpenBracket => 1,
            TokenKind::CloseBrace | TokenKind::CloseParen | TokenKind::CloseBracket => -1,
            _ => 0,
        }
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Identifier => "identifier",
            TokenKind::Integer(_) => "integer literal",
            TokenKind::String => "string literal",
            TokenKind::OpenBrace => "'{'",
            TokenKind::CloseBrace => "'}'",
            TokenKind::OpenParen => "'('",
            TokenKind::CloseParen => "')'",
            TokenKind::OpenBracket => "'['",
            TokenKind::CloseBracket => "']'",
            TokenKind::Comma => "','",
            TokenKind::Colon => "':'",
            TokenKind::Semicolon => "';'",
            TokenKind::Star => "'*'",
            TokenKind::At => "'@'",
            TokenKind::Assign => "'='",
            TokenKind::Arrow => "'->'",
            TokenKind::Eof => "end of file",
            TokenKind::Error(_) => "invalid token",
        };
        f.write_str(text)
    }
}

// A full token, including its kind and its location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// 1-based line on which the token starts.
    pub line: u32,
}

impl Token {
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        self.span.text(source).unwrap_or_default()
    }
}

/// Scans DDL source one token at a time.
///
/// Whitespace and comments are skipped between tokens. Errors are returned as
/// [`TokenKind::Error`] tokens positioned where the offending construct began,
/// and end of file is a sentinel that is returned indefinitely.
pub struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    peeked: VecDeque<Token>,
}

impl<'a> Lexer<'a> {
    /// Creates a new Lexer from the input source string.
    pub fn new(source: &'a str) -> Self {
        Lexer {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            peeked: VecDeque::new(),
        }
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    /// Consumes and returns the next token.
    pub fn next_token(&mut self) -> Token {
        match self.peeked.pop_front() {
            Some(token) => token,
            None => self.scan(),
        }
    }

    /// Returns the next token without consuming it.
    pub fn peek(&mut self) -> &Token {
        self.peek_nth(0)
    }

    /// Returns the token `n` places ahead of the next one without consuming
    /// anything; `peek_nth(0)` is the next token.
    pub fn peek_nth(&mut self, n: usize) -> &Token {
        while self.peeked.len() <= n {
            let token = self.scan();
            self.peeked.push_back(token);
        }
        &self.peeked[n]
    }

    fn peek_byte(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_byte_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    /// Consumes one byte, keeping the line count in step.
    fn bump(&mut self) {
        if self.peek_byte() == Some(b'\n') {
            self.line += 1;
        }
        self.pos += 1;
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.pos += 1;
        kind
    }

    fn scan(&mut self) -> Token {
        if let Some(error) = self.skip_trivia() {
            return error;
        }

        let start = self.pos;
        let line = self.line;
        let kind = match self.peek_byte() {
            None => TokenKind::Eof,
            Some(b'{') => self.single(TokenKind::OpenBrace),
            Some(b'}') => self.single(TokenKind::CloseBrace),
            Some(b'(') => self.single(TokenKind::OpenParen),
            Some(b')') => self.single(TokenKind::CloseParen),
            Some(b'[') => self.single(TokenKind::OpenBracket),
            Some(b']') => self.single(TokenKind::CloseBracket),
            Some(b',') => self.single(TokenKind::Comma),
            Some(b':') => self.single(TokenKind::Colon),
            Some(b';') => self.single(TokenKind::Semicolon),
            Some(b'*') => self.single(TokenKind::Star),
            Some(b'@') => self.single(TokenKind::At),
            Some(b'=') => self.single(TokenKind::Assign),
            Some(b'-') if self.peek_byte_at(1) == Some(b'>') => {
                self.pos += 2;
                TokenKind::Arrow
            }
            Some(b'"') => self.take_string(),
            Some(c) if c.is_ascii_alphabetic() || c == b'_' => self.take_identifier(),
            Some(c) if c.is_ascii_digit() => self.take_number(),
            Some(_) => {
                let c = self.source[start..].chars().next().unwrap_or('\u{fffd}');
                self.pos += c.len_utf8();
                TokenKind::Error(LexError::UnexpectedCharacter(c))
            }
        };

        Token {
            kind,
            span: Span::new(start, self.pos),
            line,
        }
    }

    /// Skips whitespace and comments. An unterminated block comment comes back
    /// as an error token.
    fn skip_trivia(&mut self) -> Option<Token> {
        loop {
            match (self.peek_byte(), self.peek_byte_at(1)) {
                (Some(c), _) if c.is_ascii_whitespace() => self.bump(),
                (Some(b'/'), Some(b'/')) => {
                    while self.peek_byte().is_some_and(|c| c != b'\n') {
                        self.pos += 1;
                    }
                }
                (Some(b'/'), Some(b'*')) => {
                    if let Err(error) = self.skip_block_comment() {
                        return Some(error);
                    }
                }
                _ => return None,
            }
        }
    }

    /// Block comments nest.
    fn skip_block_comment(&mut self) -> Result<(), Token> {
        let start = self.pos;
        let line = self.line;
        self.pos += 2;

        let mut depth = 1usize;
        while depth > 0 {
            match (self.peek_byte(), self.peek_byte_at(1)) {
                (None, _) => {
                    return Err(Token {
                        kind: TokenKind::Error(LexError::UnterminatedComment),
                        span: Span::new(start, self.pos),
                        line,
                    });
                }
                (Some(b'*'), Some(b'/')) => {
                    depth -= 1;
                    self.pos += 2;
                }
                (Some(b'/'), Some(b'*')) => {
                    depth += 1;
                    self.pos += 2;
                }
                _ => self.bump(),
            }
        }
        Ok(())
    }

    /// Parses a quoted string. A backslash escapes whatever follows it.
    fn take_string(&mut self) -> TokenKind {
        self.pos += 1;
        loop {
            match self.peek_byte() {
                None => return TokenKind::Error(LexError::UnterminatedString),
                Some(b'"') => {
                    self.pos += 1;
                    return TokenKind::String;
                }
                Some(b'\\') => {
                    self.pos += 1;
                    if self.peek_byte().is_some() {
                        self.bump();
                    }
                }
                Some(_) => self.bump(),
            }
        }
    }

    /// Parses an identifier or contextual keyword.
    fn take_identifier(&mut self) -> TokenKind {
        while self
            .peek_byte()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_')
        {
            self.pos += 1;
        }
        TokenKind::Identifier
    }

    /// Parses a decimal or `0x` hexadecimal integer literal.
    fn take_number(&mut self) -> TokenKind {
        let start = self.pos;
        let hex = self.peek_byte() == Some(b'0') && matches!(self.peek_byte_at(1), Some(b'x' | b'X'));

        let (digits_start, radix) = if hex {
            self.pos += 2;
            (self.pos, 16)
        } else {
            (self.pos, 10)
        };

        while self.peek_byte().is_some_and(|c| {
            if hex {
                c.is_ascii_hexdigit()
            } else {
                c.is_ascii_digit()
            }
        }) {
            self.pos += 1;
        }

        let digits = &self.source[digits_start..self.pos];
        match u64::from_str_radix(digits, radix) {
            Ok(value) => TokenKind::Integer(value),
            Err(_) => TokenKind::Error(LexError::InvalidInteger(
                self.source[start..self.pos].to_string(),
            )),
        }
    }
}

impl<'a> From<&'a str> for Lexer<'a> {
    fn from(source: &'a str) -> Self {
        Lexer::new(source)
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    /// Yields tokens up to, but not including, end of file.
    fn next(&mut self) -> Option<Self::Item> {
        let token = self.next_token();
        match token.kind {
            TokenKind::Eof => None,
            _ => Some(token),
        }
    }
}
