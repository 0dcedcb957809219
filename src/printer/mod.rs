//! Token stream emitted by the writer and the sink that consumes it.
//!
//! Tokens are immutable and reach a [`Printer`] strictly in emission order.
//! A GUI collaborator can implement [`Printer`] to index declarations and
//! hyperlink references; [`PlainTextPrinter`] accumulates source text.

mod plain_text;

pub use self::plain_text::*;

/// What a declaration or reference token names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    Type,
    Field,
    Method,
    Constructor,
    Package,
    Module,
}

/// Structural markers bracketing token ranges.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Marker {
    Comment,
    Javadoc,
    Error,
    ImportStatements,
    TypeDeclaration,
    Statement,
    /// Wraps a qualifier (such as `this.`) that may be left out.
    OptionalPrefix,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Text(String),
    Keyword(&'static str),
    NumericConstant(String),
    /// A string or char literal, quotes included, already Java-escaped.
    StringConstant {
        literal: String,
        owner: String,
    },
    Declaration {
        kind: ReferenceKind,
        internal_name: String,
        name: String,
        descriptor: String,
    },
    Reference {
        kind: ReferenceKind,
        internal_name: String,
        name: String,
        descriptor: String,
        owner: String,
    },
    /// Original source line of the statement being printed. Only valid
    /// between a `Start(Statement)` / `End(Statement)` pair.
    LineNumber(u32),
    Start(Marker),
    End(Marker),
}

impl Token {
    pub fn text(s: impl Into<String>) -> Token {
        Token::Text(s.into())
    }

    /// Text this token prints when nothing is suppressed.
    pub fn as_str(&self) -> &str {
        match self {
            Token::Text(s) | Token::NumericConstant(s) => s,
            Token::Keyword(k) => k,
            Token::StringConstant { literal, .. } => literal,
            Token::Declaration { name, .. } | Token::Reference { name, .. } => name,
            Token::LineNumber(_) | Token::Start(_) | Token::End(_) => "",
        }
    }

    /// Forwards the token to the matching printer callback.
    pub fn emit(&self, printer: &mut dyn Printer) {
        match self {
            Token::Text(s) => printer.print_text(s),
            Token::Keyword(k) => printer.print_keyword(k),
            Token::NumericConstant(s) => printer.print_numeric_constant(s),
            Token::StringConstant { literal, owner } => printer.print_string_constant(literal, owner),
            Token::Declaration {
                kind,
                internal_name,
                name,
                descriptor,
            } => printer.print_declaration(*kind, internal_name, name, descriptor),
            Token::Reference {
                kind,
                internal_name,
                name,
                descriptor,
                owner,
            } => printer.print_reference(*kind, internal_name, name, descriptor, owner),
            Token::LineNumber(_) => {}
            Token::Start(marker) => printer.start_marker(*marker),
            Token::End(marker) => printer.end_marker(*marker),
        }
    }
}

/// The source line a token range claims: the first `LineNumber` that sits
/// inside a statement.
pub fn statement_line(tokens: &[Token]) -> Option<u32> {
    let mut depth = 0usize;
    for token in tokens {
        match token {
            Token::Start(Marker::Statement) => depth += 1,
            Token::End(Marker::Statement) => depth = depth.saturating_sub(1),
            Token::LineNumber(n) if depth > 0 => return Some(*n),
            _ => {}
        }
    }
    None
}

/// Receiver of print events. Line structure is explicit: every printed line
/// sits between `start_line` and `end_line`, and blank lines are requested
/// through `extra_line`.
pub trait Printer {
    fn start(&mut self, max_line_number: u32, major_version: u16, minor_version: u16);
    fn end(&mut self);

    fn print_text(&mut self, text: &str);
    fn print_numeric_constant(&mut self, constant: &str);
    fn print_string_constant(&mut self, constant: &str, owner_internal_name: &str);
    fn print_keyword(&mut self, keyword: &str);
    fn print_declaration(&mut self, kind: ReferenceKind, internal_name: &str, name: &str, descriptor: &str);
    fn print_reference(
        &mut self,
        kind: ReferenceKind,
        internal_name: &str,
        name: &str,
        descriptor: &str,
        owner_internal_name: &str,
    );

    fn indent(&mut self);
    fn unindent(&mut self);

    fn start_line(&mut self, line_number: Option<u32>);
    fn end_line(&mut self);
    fn extra_line(&mut self, count: u32);

    fn start_marker(&mut self, marker: Marker);
    fn end_marker(&mut self, marker: Marker);
}
