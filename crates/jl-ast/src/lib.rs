use std::fmt;

use serde::{Serialize, Serializer};

/// 1-based line/column location in source text. Columns count characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    pub fn start() -> Self {
        Self { line: 1, column: 1 }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ident {
    pub name: String,
    pub position: Position,
}

impl Ident {
    pub fn new(name: impl Into<String>, position: Position) -> Self {
        Self {
            name: name.into(),
            position,
        }
    }
}

// ── Top-level ──────────────────────────────────────────────

/// Everything parsed from one source document.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Program {
    pub modules: Vec<Module>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Module {
    pub name: Ident,
    pub declarations: Vec<Declaration>,
}

impl Module {
    pub fn declaration(&self, name: &str) -> Option<&Declaration> {
        self.declarations.iter().find(|d| d.name().name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Declaration {
    Type(TypeDecl),
    Const(BindingDecl),
    Let(BindingDecl),
}

impl Declaration {
    pub fn name(&self) -> &Ident {
        match self {
            Declaration::Type(t) => &t.name,
            Declaration::Const(b) | Declaration::Let(b) => &b.name,
        }
    }
}

// ── Types ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeDecl {
    pub name: Ident,
    pub body: ObjectType,
}

/// Structural record type. Field order follows the source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectType {
    pub fields: Vec<Field>,
}

impl ObjectType {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: Ident,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TypeRef {
    Primitive(PrimitiveType),
    /// Reference to a type declared elsewhere; resolved by later stages.
    Named(Ident),
    Object(ObjectType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PrimitiveType {
    Number,
    String,
    Boolean,
}

impl PrimitiveType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Number" => Some(PrimitiveType::Number),
            "String" => Some(PrimitiveType::String),
            "Boolean" => Some(PrimitiveType::Boolean),
            _ => None,
        }
    }
}

// ── Bindings ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BindingDecl {
    pub name: Ident,
    pub value: Literal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Literal {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    /// Entries in source order; keys are unique. Serializes as a map.
    Object(#[serde(serialize_with = "serialize_entries")] Vec<(String, Literal)>),
}

fn serialize_entries<S: Serializer>(
    entries: &[(String, Literal)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(entries.iter().map(|(key, value)| (key, value)))
}

impl Literal {
    pub fn get(&self, key: &str) -> Option<&Literal> {
        match self {
            Literal::Object(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }
}

// ── Diagnostic ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub position: Position,
    pub note: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, position: Position) -> Self {
        Self {
            message: message.into(),
            position,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Formats the diagnostic with the offending source line and a caret.
    pub fn render(&self, file: &str, source: &str) -> String {
        let Position { line, column } = self.position;
        let text = source.lines().nth(line.saturating_sub(1)).unwrap_or("");
        let gutter = " ".repeat(line.to_string().len());

        // Keep tabs so the caret lines up under tab-indented source.
        let pad: String = text
            .chars()
            .take(column.saturating_sub(1))
            .map(|c| if c == '\t' { '\t' } else { ' ' })
            .collect();

        let mut out = format!("{}:{}:{}: error: {}\n", file, line, column, self.message);
        out.push_str(&format!("{} |\n", gutter));
        out.push_str(&format!("{} | {}\n", line, text));
        out.push_str(&format!("{} | {}^\n", gutter, pad));
        if let Some(note) = &self.note {
            out.push_str(&format!("{} = note: {}\n", gutter, note));
        }
        out
    }
}
