use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;

use jl_ast::*;
use jl_lexer::{Token, TokenKind};
use thiserror::Error;

/// Where a duplicated name was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameScope {
    Declaration,
    Field,
    Key,
}

impl fmt::Display for NameScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NameScope::Declaration => "declaration",
            NameScope::Field => "field",
            NameScope::Key => "key",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("expected {expected}, found `{found}`")]
    UnexpectedToken {
        expected: String,
        found: String,
        position: Position,
    },

    /// Positioned at the second occurrence.
    #[error("duplicate {scope} `{name}`")]
    DuplicateName {
        name: String,
        scope: NameScope,
        first: Position,
        second: Position,
    },

    #[error("expected {expected}, found end of input")]
    UnexpectedEndOfInput { expected: String, position: Position },

    #[error("invalid numeric literal `{lexeme}`")]
    InvalidLiteral { lexeme: String, position: Position },

    /// Positioned at the first `{` past the limit.
    #[error("objects nested more than {limit} levels deep")]
    NestingTooDeep { limit: usize, position: Position },

    /// A hand-built token list with `EndOfFile` before its last element.
    #[error("unexpected `{found}` after end of input")]
    TokensAfterEndOfInput { found: String, position: Position },
}

impl ParseError {
    pub fn position(&self) -> Position {
        match self {
            ParseError::UnexpectedToken { position, .. }
            | ParseError::UnexpectedEndOfInput { position, .. }
            | ParseError::InvalidLiteral { position, .. }
            | ParseError::NestingTooDeep { position, .. }
            | ParseError::TokensAfterEndOfInput { position, .. } => *position,
            ParseError::DuplicateName { second, .. } => *second,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::error(self.to_string(), self.position());
        match self {
            ParseError::DuplicateName { name, first, .. } => {
                diag.with_note(format!("`{}` was first defined at {}", name, first))
            }
            _ => diag,
        }
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;

/// Maximum number of nested `{ ... }` object types or object literals.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Builds the AST for a token stream produced by `jl_lexer::tokenize`.
pub fn parse(tokens: Vec<Token>) -> Result<Program> {
    let mut parser = Parser::new(tokens)?;
    let program = parser.parse_program()?;
    tracing::debug!(modules = program.modules.len(), "parsed program");
    Ok(program)
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

fn unexpected_token(token: &Token, expected: &str) -> ParseError {
    match token.kind {
        TokenKind::EndOfFile => ParseError::UnexpectedEndOfInput {
            expected: expected.to_string(),
            position: token.position,
        },
        _ => ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found: token.lexeme.clone(),
            position: token.position,
        },
    }
}

fn ensure_unique<'a>(names: impl IntoIterator<Item = &'a Ident>, scope: NameScope) -> Result<()> {
    let mut seen: HashMap<&str, Position> = HashMap::new();
    for ident in names {
        match seen.entry(ident.name.as_str()) {
            Entry::Occupied(first) => {
                return Err(ParseError::DuplicateName {
                    name: ident.name.clone(),
                    scope,
                    first: *first.get(),
                    second: ident.position,
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(ident.position);
            }
        }
    }
    Ok(())
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Result<Self> {
        if let Some(eof) = tokens.iter().position(|t| t.kind == TokenKind::EndOfFile) {
            if let Some(extra) = tokens.get(eof + 1) {
                return Err(ParseError::TokensAfterEndOfInput {
                    found: extra.lexeme.clone(),
                    position: extra.position,
                });
            }
        }
        if tokens.last().is_none_or(|t| t.kind != TokenKind::EndOfFile) {
            let position = tokens
                .last()
                .map(|t| Position::new(t.line(), t.column() + t.lexeme.chars().count()))
                .unwrap_or_else(Position::start);
            tokens.push(Token::new(TokenKind::EndOfFile, "", position));
        }
        Ok(Self {
            tokens,
            pos: 0,
            depth: 0,
        })
    }

    // ── Utility methods ────────────────────────────────────

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn at_eof(&self) -> bool {
        self.peek().kind == TokenKind::EndOfFile
    }

    /// Never moves past the first `EndOfFile`.
    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if tok.kind != TokenKind::EndOfFile {
            self.pos += 1;
        }
        tok
    }

    fn unexpected<T>(&self, expected: &str) -> Result<T> {
        Err(unexpected_token(self.peek(), expected))
    }

    fn eat_symbol(&mut self, symbol: &str) -> bool {
        if self.peek().is_symbol(symbol) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, symbol: &str) -> Result<Token> {
        if self.peek().is_symbol(symbol) {
            Ok(self.advance())
        } else {
            self.unexpected(&format!("`{}`", symbol))
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<Token> {
        if self.peek().is_keyword(keyword) {
            Ok(self.advance())
        } else {
            self.unexpected(&format!("`{}`", keyword))
        }
    }

    fn expect_ident(&mut self) -> Result<Ident> {
        if self.peek().kind == TokenKind::Identifier {
            let tok = self.advance();
            Ok(Ident::new(tok.lexeme, tok.position))
        } else {
            self.unexpected("identifier")
        }
    }

    /// `{` element (`,` element)* `,`? `}`
    ///
    /// Shared by object types and object literals.
    fn braced<T>(&mut self, element: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        let open = self.expect_symbol("{")?;
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(ParseError::NestingTooDeep {
                limit: MAX_NESTING_DEPTH,
                position: open.position,
            });
        }
        self.depth += 1;
        let items = self.braced_items(element);
        self.depth -= 1;
        items
    }

    fn braced_items<T>(
        &mut self,
        mut element: impl FnMut(&mut Self) -> Result<T>,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while !self.peek().is_symbol("}") {
            items.push(element(self)?);
            if !self.eat_symbol(",") {
                break;
            }
        }
        if !self.peek().is_symbol("}") {
            return self.unexpected("`,` or `}`");
        }
        self.advance();
        Ok(items)
    }

    // ── Module parsing ─────────────────────────────────────

    pub fn parse_program(&mut self) -> Result<Program> {
        let mut modules = Vec::new();
        while !self.at_eof() {
            modules.push(self.parse_module()?);
        }
        Ok(Program { modules })
    }

    fn parse_module(&mut self) -> Result<Module> {
        self.expect_keyword("module")?;
        let name = self.expect_ident()?;
        self.expect_symbol("{")?;

        let mut declarations = Vec::new();
        while !self.peek().is_symbol("}") {
            declarations.push(self.parse_declaration()?);
        }
        self.advance(); // consume '}'

        ensure_unique(declarations.iter().map(Declaration::name), NameScope::Declaration)?;
        tracing::trace!(
            module = %name.name,
            declarations = declarations.len(),
            "parsed module"
        );
        Ok(Module { name, declarations })
    }

    fn parse_declaration(&mut self) -> Result<Declaration> {
        if self.peek().is_keyword("type") {
            self.parse_type_decl().map(Declaration::Type)
        } else if self.peek().is_keyword("const") {
            self.parse_binding().map(Declaration::Const)
        } else if self.peek().is_keyword("let") {
            self.parse_binding().map(Declaration::Let)
        } else {
            self.unexpected("`type`, `const`, `let` or `}`")
        }
    }

    // ── Type declarations ──────────────────────────────────

    fn parse_type_decl(&mut self) -> Result<TypeDecl> {
        self.advance(); // consume 'type'
        let name = self.expect_ident()?;
        self.expect_symbol("=>")?;
        let body = self.parse_object_type()?;
        Ok(TypeDecl { name, body })
    }

    fn parse_object_type(&mut self) -> Result<ObjectType> {
        let fields = self.braced(Self::parse_field)?;
        ensure_unique(fields.iter().map(|f| &f.name), NameScope::Field)?;
        Ok(ObjectType { fields })
    }

    fn parse_field(&mut self) -> Result<Field> {
        let name = self.expect_ident()?;
        self.expect_symbol(":")?;
        let ty = self.parse_type_ref()?;
        Ok(Field { name, ty })
    }

    fn parse_type_ref(&mut self) -> Result<TypeRef> {
        let kind = self.peek().kind;
        match kind {
            TokenKind::Symbol if self.peek().is_symbol("{") => {
                self.parse_object_type().map(TypeRef::Object)
            }
            TokenKind::TypeName => {
                let tok = self.advance();
                PrimitiveType::from_name(&tok.lexeme)
                    .map(TypeRef::Primitive)
                    .ok_or_else(|| unexpected_token(&tok, "type"))
            }
            TokenKind::Identifier => {
                let tok = self.advance();
                Ok(TypeRef::Named(Ident::new(tok.lexeme, tok.position)))
            }
            _ => self.unexpected("type"),
        }
    }

    // ── Bindings ───────────────────────────────────────────

    fn parse_binding(&mut self) -> Result<BindingDecl> {
        self.advance(); // consume 'const' / 'let'
        let name = self.expect_ident()?;
        self.expect_symbol("=")?;
        let value = self.parse_literal()?;
        Ok(BindingDecl { name, value })
    }

    fn parse_literal(&mut self) -> Result<Literal> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Symbol if tok.lexeme == "{" => self.parse_object_literal(),
            TokenKind::Symbol if tok.lexeme == "-" => {
                self.advance();
                let number = self.peek().clone();
                if number.position != Position::new(tok.line(), tok.column() + 1) {
                    return self.unexpected("number directly after `-`");
                }
                let lexeme = format!("-{}", number.lexeme);
                match number.kind {
                    TokenKind::NumberLiteral => {
                        self.advance();
                        integer_literal(&lexeme, tok.position)
                    }
                    TokenKind::FloatLiteral => {
                        self.advance();
                        float_literal(&lexeme, tok.position)
                    }
                    _ => self.unexpected("number directly after `-`"),
                }
            }
            TokenKind::NumberLiteral => {
                self.advance();
                integer_literal(&tok.lexeme, tok.position)
            }
            TokenKind::FloatLiteral => {
                self.advance();
                float_literal(&tok.lexeme, tok.position)
            }
            TokenKind::StringLiteral => {
                self.advance();
                Ok(Literal::String(tok.string_value().unwrap_or_default()))
            }
            TokenKind::BooleanLiteral => {
                self.advance();
                Ok(Literal::Boolean(tok.lexeme == "true"))
            }
            _ => self.unexpected("literal value"),
        }
    }

    fn parse_object_literal(&mut self) -> Result<Literal> {
        let entries = self.braced(|p| {
            let key = p.expect_ident()?;
            p.expect_symbol(":")?;
            let value = p.parse_literal()?;
            Ok((key, value))
        })?;
        ensure_unique(entries.iter().map(|(key, _)| key), NameScope::Key)?;
        Ok(Literal::Object(
            entries.into_iter().map(|(key, value)| (key.name, value)).collect(),
        ))
    }
}

fn integer_literal(lexeme: &str, position: Position) -> Result<Literal> {
    lexeme
        .parse::<i64>()
        .map(Literal::Integer)
        .map_err(|_| ParseError::InvalidLiteral {
            lexeme: lexeme.to_string(),
            position,
        })
}

fn float_literal(lexeme: &str, position: Position) -> Result<Literal> {
    lexeme
        .parse::<f64>()
        .map(Literal::Float)
        .map_err(|_| ParseError::InvalidLiteral {
            lexeme: lexeme.to_string(),
            position,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jl_lexer::tokenize;

    fn parse_src(src: &str) -> Result<Program> {
        parse(tokenize(src).expect("source should lex"))
    }

    fn parse_ok(src: &str) -> Program {
        match parse_src(src) {
            Ok(program) => program,
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }

    fn single_module(src: &str) -> Module {
        let mut program = parse_ok(src);
        assert_eq!(program.modules.len(), 1);
        program.modules.remove(0)
    }

    fn type_body<'a>(module: &'a Module, name: &str) -> &'a ObjectType {
        match module.declaration(name) {
            Some(Declaration::Type(t)) => &t.body,
            other => panic!("expected type `{}`, got {:?}", name, other),
        }
    }

    fn binding_value<'a>(module: &'a Module, name: &str) -> &'a Literal {
        match module.declaration(name) {
            Some(Declaration::Const(b)) | Some(Declaration::Let(b)) => &b.value,
            other => panic!("expected binding `{}`, got {:?}", name, other),
        }
    }

    #[test]
    fn empty_program() {
        assert!(parse_ok("").modules.is_empty());
        assert!(parse_ok("// only a comment\n").modules.is_empty());
    }

    #[test]
    fn basic_module_exact_ast() {
        let program = parse_ok("module test { let x = 42 }");
        assert_eq!(
            program,
            Program {
                modules: vec![Module {
                    name: Ident::new("test", Position::new(1, 8)),
                    declarations: vec![Declaration::Let(BindingDecl {
                        name: Ident::new("x", Position::new(1, 19)),
                        value: Literal::Integer(42),
                    })],
                }],
            }
        );
    }

    #[test]
    fn type_declaration() {
        let m = single_module("module types {\n  type Point => {\n    x: Number,\n    y: Number\n  }\n}");
        let body = type_body(&m, "Point");
        let names: Vec<&str> = body.fields.iter().map(|f| f.name.name.as_str()).collect();
        assert_eq!(names, vec!["x", "y"]);
        assert!(body
            .fields
            .iter()
            .all(|f| f.ty == TypeRef::Primitive(PrimitiveType::Number)));
    }

    #[test]
    fn nested_object_type_and_named_reference() {
        let m = single_module(
            "module linalg {
                type Matrix => {
                    elements: Vector3D,
                    metadata: { created: String, modified: String }
                }
            }",
        );
        let body = type_body(&m, "Matrix");
        match &body.field("elements").unwrap().ty {
            TypeRef::Named(ident) => assert_eq!(ident.name, "Vector3D"),
            other => panic!("expected named reference, got {:?}", other),
        }
        match &body.field("metadata").unwrap().ty {
            TypeRef::Object(inner) => {
                assert_eq!(inner.fields.len(), 2);
                assert_eq!(inner.fields[0].name.name, "created");
                assert_eq!(inner.fields[1].name.name, "modified");
                assert!(inner
                    .fields
                    .iter()
                    .all(|f| f.ty == TypeRef::Primitive(PrimitiveType::String)));
            }
            other => panic!("expected inline object, got {:?}", other),
        }
    }

    #[test]
    fn deep_nesting() {
        let m = single_module("module m { type T => { a: { b: { c: Boolean } } } }");
        let a = &type_body(&m, "T").fields[0];
        let TypeRef::Object(b) = &a.ty else { panic!("a is not an object") };
        let TypeRef::Object(c) = &b.fields[0].ty else { panic!("b is not an object") };
        assert_eq!(c.fields[0].ty, TypeRef::Primitive(PrimitiveType::Boolean));
    }

    #[test]
    fn empty_object_type() {
        let m = single_module("module m { type Unit => {} }");
        assert!(type_body(&m, "Unit").fields.is_empty());
    }

    #[test]
    fn trailing_comma_in_type() {
        let m = single_module("module m { type P => { x: Number, y: Number, } }");
        assert_eq!(type_body(&m, "P").fields.len(), 2);
    }

    #[test]
    fn object_literal_in_source_order() {
        for src in [
            "module m { const origin = { x: 0, y: 0, z: 0 } }",
            "module m { const origin = { x: 0, y: 0, z: 0, } }",
        ] {
            let m = single_module(src);
            assert_eq!(
                binding_value(&m, "origin"),
                &Literal::Object(vec![
                    ("x".into(), Literal::Integer(0)),
                    ("y".into(), Literal::Integer(0)),
                    ("z".into(), Literal::Integer(0)),
                ])
            );
        }
    }

    #[test]
    fn nested_object_literal() {
        let m = single_module(
            r#"module m { let cfg = { name: "svc", limits: { cpu: 1.5, on: true } } }"#,
        );
        assert_eq!(
            binding_value(&m, "cfg"),
            &Literal::Object(vec![
                ("name".into(), Literal::String("svc".into())),
                (
                    "limits".into(),
                    Literal::Object(vec![
                        ("cpu".into(), Literal::Float(1.5)),
                        ("on".into(), Literal::Boolean(true)),
                    ])
                ),
            ])
        );
    }

    #[test]
    fn const_literals() {
        let m = single_module(
            "module constants {
                const PI = 3.14159
                const GREETING = \"Hello\"
                const ENABLED = true
                const DISABLED = false
                let answer = 42
            }",
        );
        assert_eq!(binding_value(&m, "PI"), &Literal::Float(3.14159));
        assert_eq!(binding_value(&m, "GREETING"), &Literal::String("Hello".into()));
        assert_eq!(binding_value(&m, "ENABLED"), &Literal::Boolean(true));
        assert_eq!(binding_value(&m, "DISABLED"), &Literal::Boolean(false));
        assert_eq!(binding_value(&m, "answer"), &Literal::Integer(42));
        assert!(matches!(m.declarations[0], Declaration::Const(_)));
        assert!(matches!(m.declarations[4], Declaration::Let(_)));
    }

    #[test]
    fn integer_and_float_stay_distinct() {
        let m = single_module("module m { let a = 1 let b = 1.0 }");
        assert_eq!(binding_value(&m, "a"), &Literal::Integer(1));
        assert_eq!(binding_value(&m, "b"), &Literal::Float(1.0));
    }

    #[test]
    fn negative_numbers() {
        let m = single_module(
            "module m { let a = -5 let b = -0.25 let c = -9223372036854775808 }",
        );
        assert_eq!(binding_value(&m, "a"), &Literal::Integer(-5));
        assert_eq!(binding_value(&m, "b"), &Literal::Float(-0.25));
        assert_eq!(binding_value(&m, "c"), &Literal::Integer(i64::MIN));
    }

    #[test]
    fn minus_without_number() {
        let err = parse_src("module m { let a = -true }").unwrap_err();
        assert!(matches!(
            err,
            ParseError::UnexpectedToken { ref expected, ref found, .. }
                if expected == "number directly after `-`" && found == "true"
        ));
    }

    #[test]
    fn minus_must_touch_its_number() {
        for src in [
            "module m { let a = - 5 }",
            "module m { let a = -\n// c\n5 }",
            "module m { let a = -\n5.5 }",
        ] {
            let err = parse_src(src).unwrap_err();
            assert!(
                matches!(
                    err,
                    ParseError::UnexpectedToken { ref expected, .. }
                        if expected == "number directly after `-`"
                ),
                "{}: {:?}",
                src,
                err
            );
        }
        assert_eq!(
            parse_src("module m { let a = - 5 }").unwrap_err().position(),
            Position::new(1, 22)
        );
    }

    #[test]
    fn integer_overflow() {
        let err = parse_src("module m { let big = 9223372036854775808 }").unwrap_err();
        assert_eq!(
            err,
            ParseError::InvalidLiteral {
                lexeme: "9223372036854775808".into(),
                position: Position::new(1, 22),
            }
        );
    }

    #[test]
    fn escaped_string_value() {
        let m = single_module(r#"module m { let s = "a \"quoted\" word" }"#);
        assert_eq!(binding_value(&m, "s"), &Literal::String("a \"quoted\" word".into()));
    }

    #[test]
    fn declaration_order_preserved() {
        let m = single_module(
            "module m { let c = 1 type A => { x: Number } const b = 2 type D => { y: A } }",
        );
        let names: Vec<&str> = m.declarations.iter().map(|d| d.name().name.as_str()).collect();
        assert_eq!(names, vec!["c", "A", "b", "D"]);
    }

    #[test]
    fn multiple_modules() {
        let program = parse_ok("module a { let x = 1 }\nmodule b { let x = 2 }");
        let names: Vec<&str> = program.modules.iter().map(|m| m.name.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn empty_module() {
        let m = single_module("module nothing {}");
        assert_eq!(m.name.name, "nothing");
        assert!(m.declarations.is_empty());
    }

    #[test]
    fn duplicate_field() {
        let err = parse_src("module m { type T => { a: Number, a: String } }").unwrap_err();
        assert_eq!(
            err,
            ParseError::DuplicateName {
                name: "a".into(),
                scope: NameScope::Field,
                first: Position::new(1, 24),
                second: Position::new(1, 35),
            }
        );
        assert_eq!(err.position(), Position::new(1, 35));
    }

    #[test]
    fn same_field_name_in_nested_objects_is_fine() {
        let m = single_module("module m { type T => { a: Number, b: { a: String } } }");
        assert_eq!(type_body(&m, "T").fields.len(), 2);
    }

    #[test]
    fn duplicate_declaration_across_kinds() {
        let err = parse_src("module m {\n  type P => { x: Number }\n  const P = 1\n}").unwrap_err();
        assert_eq!(
            err,
            ParseError::DuplicateName {
                name: "P".into(),
                scope: NameScope::Declaration,
                first: Position::new(2, 8),
                second: Position::new(3, 9),
            }
        );
    }

    #[test]
    fn duplicate_object_literal_key() {
        let err = parse_src("module m { const o = { x: 1, x: 2 } }").unwrap_err();
        assert!(matches!(
            err,
            ParseError::DuplicateName { scope: NameScope::Key, .. }
        ));
    }

    #[test]
    fn missing_field_type() {
        let err = parse_src("module m { type T => { x: } }").unwrap_err();
        assert_eq!(
            err,
            ParseError::UnexpectedToken {
                expected: "type".into(),
                found: "}".into(),
                position: Position::new(1, 27),
            }
        );
        assert_eq!(err.to_string(), "expected type, found `}`");
    }

    #[test]
    fn missing_comma_between_fields() {
        let err = parse_src("module m { type T => { a: Number b: String } }").unwrap_err();
        assert!(matches!(
            err,
            ParseError::UnexpectedToken { ref expected, ref found, .. }
                if expected == "`,` or `}`" && found == "b"
        ));
    }

    #[test]
    fn type_decl_requires_arrow() {
        let err = parse_src("module m { type T = { x: Number } }").unwrap_err();
        assert!(matches!(
            err,
            ParseError::UnexpectedToken { ref expected, .. } if expected == "`=>`"
        ));
    }

    #[test]
    fn top_level_must_be_module() {
        let err = parse_src("let x = 1").unwrap_err();
        assert_eq!(
            err,
            ParseError::UnexpectedToken {
                expected: "`module`".into(),
                found: "let".into(),
                position: Position::new(1, 1),
            }
        );
    }

    #[test]
    fn bare_keywords_are_not_fields() {
        let err = parse_src("module m { type Everything => { module type const let } }").unwrap_err();
        assert!(matches!(
            err,
            ParseError::UnexpectedToken { ref expected, ref found, .. }
                if expected == "identifier" && found == "module"
        ));
    }

    #[test]
    fn unknown_declaration_keyword() {
        let err = parse_src("module m { module inner {} }").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { ref found, .. } if found == "module"));
    }

    #[test]
    fn identifier_is_not_a_literal() {
        let err = parse_src("module m { let a = b }").unwrap_err();
        assert!(matches!(
            err,
            ParseError::UnexpectedToken { ref expected, .. } if expected == "literal value"
        ));
    }

    #[test]
    fn unexpected_end_of_input() {
        let err = parse_src("module m { type T => {").unwrap_err();
        assert_eq!(
            err,
            ParseError::UnexpectedEndOfInput {
                expected: "identifier".into(),
                position: Position::new(1, 23),
            }
        );
        assert_eq!(err.to_string(), "expected identifier, found end of input");
    }

    #[test]
    fn unclosed_module() {
        let err = parse_src("module m {\n  let x = 1\n").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedEndOfInput { .. }));
    }

    #[test]
    fn token_list_without_eof() {
        assert!(parse(Vec::new()).unwrap().modules.is_empty());

        let tokens = vec![Token::new(TokenKind::Keyword, "module", Position::start())];
        assert_eq!(
            parse(tokens).unwrap_err(),
            ParseError::UnexpectedEndOfInput {
                expected: "identifier".into(),
                position: Position::new(1, 7),
            }
        );
    }

    #[test]
    fn tokens_after_eof_are_rejected() {
        let mut tokens = tokenize("module a {}").unwrap();
        tokens.extend(tokenize("module b {}").unwrap());
        assert_eq!(
            parse(tokens).unwrap_err(),
            ParseError::TokensAfterEndOfInput {
                found: "module".into(),
                position: Position::start(),
            }
        );
    }

    fn nested_type(depth: usize) -> String {
        format!(
            "module m {{ type T => {}{{}}{} }}",
            "{ a: ".repeat(depth - 1),
            " }".repeat(depth - 1)
        )
    }

    fn nested_literal(depth: usize) -> String {
        format!(
            "module m {{ let v = {}1{} }}",
            "{ a: ".repeat(depth),
            " }".repeat(depth)
        )
    }

    #[test]
    fn nesting_at_limit_parses() {
        let m = single_module(&nested_type(MAX_NESTING_DEPTH));
        let mut body = type_body(&m, "T");
        let mut levels = 1;
        while let Some(TypeRef::Object(inner)) = body.fields.first().map(|f| &f.ty) {
            body = inner;
            levels += 1;
        }
        assert_eq!(levels, MAX_NESTING_DEPTH);

        let m = single_module(&nested_literal(MAX_NESTING_DEPTH));
        assert!(matches!(binding_value(&m, "v"), Literal::Object(_)));
    }

    #[test]
    fn nesting_past_limit_is_an_error() {
        let err = parse_src(&nested_type(MAX_NESTING_DEPTH + 1)).unwrap_err();
        // `module m { type T => ` is 21 columns, each level adds `{ a: `.
        assert_eq!(
            err,
            ParseError::NestingTooDeep {
                limit: MAX_NESTING_DEPTH,
                position: Position::new(1, 22 + 5 * MAX_NESTING_DEPTH),
            }
        );
        assert_eq!(err.to_string(), "objects nested more than 128 levels deep");

        let err = parse_src(&nested_literal(MAX_NESTING_DEPTH + 1)).unwrap_err();
        assert!(matches!(err, ParseError::NestingTooDeep { .. }));
    }

    #[test]
    fn very_deep_nesting_does_not_overflow() {
        for src in [nested_type(10_000), nested_literal(10_000)] {
            let err = parse_src(&src).unwrap_err();
            assert!(matches!(err, ParseError::NestingTooDeep { limit: MAX_NESTING_DEPTH, .. }));
        }
    }

    #[test]
    fn duplicate_diagnostic_has_note() {
        let err = parse_src("module m { let a = 1 let a = 2 }").unwrap_err();
        let diag = err.to_diagnostic();
        assert_eq!(diag.message, "duplicate declaration `a`");
        assert_eq!(diag.position, Position::new(1, 26));
        assert_eq!(diag.note.as_deref(), Some("`a` was first defined at 1:16"));
    }
}
