use std::fmt;

use jl_ast::{Diagnostic, Position};
use serde::Serialize;
use thiserror::Error;

pub const KEYWORDS: [&str; 4] = ["module", "type", "const", "let"];
pub const TYPE_NAMES: [&str; 3] = ["Number", "String", "Boolean"];

/// Lexical class of a token. Keywords and type names share the identifier
/// scanner and are told apart by their lexeme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TokenKind {
    Keyword,
    Identifier,
    TypeName,
    Symbol,
    NumberLiteral,
    FloatLiteral,
    StringLiteral,
    BooleanLiteral,
    EndOfFile,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Keyword => "keyword",
            TokenKind::Identifier => "identifier",
            TokenKind::TypeName => "type name",
            TokenKind::Symbol => "symbol",
            TokenKind::NumberLiteral => "integer literal",
            TokenKind::FloatLiteral => "float literal",
            TokenKind::StringLiteral => "string literal",
            TokenKind::BooleanLiteral => "boolean literal",
            TokenKind::EndOfFile => "end of input",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    /// Exact source text; empty for `EndOfFile`.
    pub lexeme: String,
    pub position: Position,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, position: Position) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            position,
        }
    }

    pub fn line(&self) -> usize {
        self.position.line
    }

    pub fn column(&self) -> usize {
        self.position.column
    }

    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Keyword && self.lexeme == keyword
    }

    pub fn is_symbol(&self, symbol: &str) -> bool {
        self.kind == TokenKind::Symbol && self.lexeme == symbol
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::NumberLiteral
                | TokenKind::FloatLiteral
                | TokenKind::StringLiteral
                | TokenKind::BooleanLiteral
        )
    }

    /// Unquoted, unescaped contents of a string literal.
    pub fn string_value(&self) -> Option<String> {
        if self.kind != TokenKind::StringLiteral {
            return None;
        }
        let inner = self
            .lexeme
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))?;
        let mut value = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(ch) = chars.next() {
            if ch != '\\' {
                value.push(ch);
                continue;
            }
            match chars.next() {
                Some('n') => value.push('\n'),
                Some('t') => value.push('\t'),
                Some('r') => value.push('\r'),
                Some('0') => value.push('\0'),
                Some('\\') => value.push('\\'),
                Some('"') => value.push('"'),
                Some(other) => {
                    value.push('\\');
                    value.push(other);
                }
                None => value.push('\\'),
            }
        }
        Some(value)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::EndOfFile => f.write_str("end of input"),
            _ => write!(f, "`{}`", self.lexeme),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("unexpected character '{character}'")]
    UnexpectedCharacter { character: char, position: Position },

    /// Reported at the opening quote.
    #[error("unterminated string literal")]
    UnterminatedString { position: Position },

    #[error("invalid number `{lexeme}`: expected digits after the decimal point")]
    InvalidNumber { lexeme: String, position: Position },
}

impl LexError {
    pub fn position(&self) -> Position {
        match self {
            LexError::UnexpectedCharacter { position, .. }
            | LexError::UnterminatedString { position }
            | LexError::InvalidNumber { position, .. } => *position,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(self.to_string(), self.position())
    }
}

/// Scans the whole input, ending with exactly one `EndOfFile` token.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let tokens = Lexer::new(source).collect::<Result<Vec<_>, _>>()?;
    tracing::trace!(count = tokens.len(), "tokenized source");
    Ok(tokens)
}

pub struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    finished: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            line: 1,
            column: 1,
            finished: false,
        }
    }

    fn current_position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.source[self.pos..].chars().nth(offset)
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn eat_while(&mut self, pred: impl Fn(char) -> bool) {
        while let Some(ch) = self.peek() {
            if !pred(ch) {
                break;
            }
            self.advance();
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r' | '\n') => {
                    self.advance();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    self.eat_while(|ch| ch != '\n');
                }
                _ => break,
            }
        }
    }

    fn token(&self, kind: TokenKind, start: usize, position: Position) -> Token {
        Token::new(kind, &self.source[start..self.pos], position)
    }

    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace_and_comments();

        let start = self.pos;
        let position = self.current_position();

        let Some(ch) = self.peek() else {
            return Ok(Token::new(TokenKind::EndOfFile, "", position));
        };

        match ch {
            'a'..='z' | 'A'..='Z' => Ok(self.lex_word(start, position)),
            '0'..='9' => self.lex_number(start, position),
            '"' => self.lex_string(start, position),
            '=' => {
                self.advance();
                if self.peek() == Some('>') {
                    self.advance();
                }
                Ok(self.token(TokenKind::Symbol, start, position))
            }
            '{' | '}' | '(' | ')' | ':' | '.' | ',' | '-' => {
                self.advance();
                Ok(self.token(TokenKind::Symbol, start, position))
            }
            character => Err(LexError::UnexpectedCharacter {
                character,
                position,
            }),
        }
    }

    fn lex_word(&mut self, start: usize, position: Position) -> Token {
        self.eat_while(|ch| ch.is_ascii_alphanumeric() || ch == '_');
        let text = &self.source[start..self.pos];
        let kind = if KEYWORDS.contains(&text) {
            TokenKind::Keyword
        } else if TYPE_NAMES.contains(&text) {
            TokenKind::TypeName
        } else if text == "true" || text == "false" {
            TokenKind::BooleanLiteral
        } else {
            TokenKind::Identifier
        };
        self.token(kind, start, position)
    }

    fn lex_number(&mut self, start: usize, position: Position) -> Result<Token, LexError> {
        self.eat_while(|ch| ch.is_ascii_digit());

        if self.peek() != Some('.') {
            return Ok(self.token(TokenKind::NumberLiteral, start, position));
        }

        if !self.peek_at(1).is_some_and(|ch| ch.is_ascii_digit()) {
            self.advance(); // include the '.' in the reported lexeme
            return Err(LexError::InvalidNumber {
                lexeme: self.source[start..self.pos].to_string(),
                position,
            });
        }

        self.advance(); // consume '.'
        self.eat_while(|ch| ch.is_ascii_digit());
        Ok(self.token(TokenKind::FloatLiteral, start, position))
    }

    fn lex_string(&mut self, start: usize, position: Position) -> Result<Token, LexError> {
        self.advance(); // consume opening quote
        loop {
            match self.peek() {
                None | Some('\n') => return Err(LexError::UnterminatedString { position }),
                Some('\\') => {
                    self.advance();
                    if self.peek().is_some_and(|ch| ch != '\n') {
                        self.advance();
                    }
                }
                Some('"') => {
                    self.advance();
                    return Ok(self.token(TokenKind::StringLiteral, start, position));
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let result = self.next_token();
        if !matches!(&result, Ok(tok) if tok.kind != TokenKind::EndOfFile) {
            self.finished = true;
        }
        Some(result)
    }
}
