use std::path::PathBuf;

use crate::token::Position;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexErrorKind {
    #[error("invalid character '{}'", .ch.escape_default())]
    InvalidChar { ch: char },
    #[error("expected '=' after '!', found {}", describe_char(.found))]
    BangWithoutEq { found: Option<char> },
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("malformed char literal")]
    InvalidCharLiteral,
    #[error("unterminated block comment")]
    UnterminatedComment,
    #[error("invalid escape sequence '\\{}'", .ch.escape_default())]
    InvalidEscape { ch: char },
    #[error("integer literal overflows 64 bits")]
    IntOverflow,
}

fn describe_char(c: &Option<char>) -> String {
    match c {
        Some(c) => format!("'{}'", c.escape_default()),
        None => "end of input".into(),
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("lex error at {pos}: {kind}")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub pos: Position,
}

/// Violations of the typing rules. Carries no position; the parser attaches one.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("can't use void in an expression")]
    VoidInExpression,
    #[error("pointer level mismatch: can't use {src} as {dst}")]
    PointerLevelMismatch { dst: String, src: String },
    #[error("can't assign {src} to {dst} (narrowing)")]
    Narrowing { dst: String, src: String },
    #[error("can't dereference non-pointer type {ty}")]
    NotAPointer { ty: String },
    #[error("can't dereference {ty} {levels} times")]
    OverDeref { ty: String, levels: u32 },
    #[error("operator '{op}' is not defined for {left} and {right}")]
    InvalidPointerArithmetic { op: &'static str, left: String, right: String },
    #[error("can't compare {left} with {right}")]
    IncomparableTypes { left: String, right: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SemanticError {
    #[error("redefinition of symbol '{name}'")]
    Redefinition { name: String },
    #[error("'{name}' is not defined before use")]
    Undeclared { name: String },
    #[error("'{name}' is a variable, not a function")]
    NotAFunction { name: String },
    #[error("'{name}' is a function, not a variable")]
    NotAVariable { name: String },
    #[error("function '{name}' expects {expected} argument(s), found {found}")]
    ArgumentCount { name: String, expected: usize, found: usize },
    #[error("bad argument to '{name}': {source}")]
    ArgumentType { name: String, source: TypeError },
    #[error("function '{name}' declares more than one parameter")]
    TooManyParameters { name: String },
    #[error("break statement outside of a loop")]
    BreakOutsideLoop,
    #[error("void function '{func}' can't return a value")]
    ReturnValueFromVoid { func: String },
    #[error("function '{func}' must return a value")]
    MissingReturnValue { func: String },
    #[error("return statement outside of a function")]
    ReturnOutsideFunction,
    #[error("variable '{name}' can't have type void")]
    VoidVariable { name: String },
    #[error("can't assign to array '{name}'")]
    AssignToArray { name: String },
    #[error("global '{name}' can only be initialized with a literal")]
    NonLiteralGlobalInit { name: String },
    #[error("array '{name}' must have a nonzero length")]
    ZeroLengthArray { name: String },
    #[error("can't take the address of this expression")]
    InvalidAddressOf,
    #[error("expression can't be assigned to")]
    NotAssignable,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    #[error("{0}")]
    Lex(LexErrorKind),
    #[error("in {construct}: expected {expected}, found {found}")]
    UnexpectedToken { construct: &'static str, expected: String, found: String },
    #[error("{0}")]
    Type(#[from] TypeError),
    #[error("{0}")]
    Semantic(#[from] SemanticError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("error at {pos}: {kind}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub pos: Position,
}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        ParseError { kind: ParseErrorKind::Lex(e.kind), pos: e.pos }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodegenError {
    #[error("out of registers")]
    OutOfRegisters,
    #[error("register {reg} is already free")]
    DoubleFree { reg: &'static str },
    #[error("can't free reserved register {reg}")]
    ReservedRegister { reg: &'static str },
    #[error("{count} register(s) still in use after a statement")]
    RegisterLeak { count: usize },
    #[error("redefinition of data symbol '{name}'")]
    DuplicateDataSymbol { name: String },
    #[error("break statement outside of a loop")]
    BreakOutsideLoop,
    #[error("unsupported lvalue: {kind}")]
    UnsupportedLvalue { kind: &'static str },
    #[error("initializer of '{name}' is not a literal")]
    NonStaticInitializer { name: String },
    #[error("can't lower a {kind} node")]
    InvalidNode { kind: &'static str },
    #[error("void call to '{name}' used as a value")]
    VoidValue { name: String },
    #[error("failed to format assembly")]
    Fmt(#[from] std::fmt::Error),
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("codegen error: {0}")]
    Codegen(#[from] CodegenError),
    #[error("{}: {source}", .path.display())]
    Io { path: PathBuf, source: std::io::Error },
}

pub type LexResult<T> = Result<T, LexError>;
pub type TypeResult<T> = Result<T, TypeError>;
pub type ParseResult<T> = Result<T, ParseError>;
pub type CodegenResult<T> = Result<T, CodegenError>;
pub type CompileResult<T> = Result<T, CompileError>;
