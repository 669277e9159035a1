use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self { Self { line, column } }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    IntLit(u64),
    CharLit(u8),
    StrLit(String),
    Ident(String),

    // Keywords
    Void,
    Char,
    Int,
    Long,
    If,
    Else,
    While,
    Do,
    For,
    Break,
    Return,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Amp,
    Assign,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,

    // Punctuation
    Semicolon,
    Comma,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,

    Eof,
}

impl TokenKind {
    /// Keyword lookup for an identifier-shaped lexeme.
    pub fn keyword(s: &str) -> Option<TokenKind> {
        let kind = match s {
            "void" => TokenKind::Void,
            "char" => TokenKind::Char,
            "int" => TokenKind::Int,
            "long" => TokenKind::Long,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "do" => TokenKind::Do,
            "for" => TokenKind::For,
            "break" => TokenKind::Break,
            "return" => TokenKind::Return,
            _ => return None,
        };
        Some(kind)
    }

    pub fn is_type_keyword(&self) -> bool {
        matches!(self, TokenKind::Void | TokenKind::Char | TokenKind::Int | TokenKind::Long)
    }

    /// Short human-readable name used in diagnostics.
    pub fn name(&self) -> &'static str {
        use TokenKind::*;
        match self {
            IntLit(_) => "integer literal",
            CharLit(_) => "char literal",
            StrLit(_) => "string literal",
            Ident(_) => "identifier",
            Void => "void",
            Char => "char",
            Int => "int",
            Long => "long",
            If => "if",
            Else => "else",
            While => "while",
            Do => "do",
            For => "for",
            Break => "break",
            Return => "return",
            Plus => "+",
            Minus => "-",
            Star => "*",
            Slash => "/",
            Amp => "&",
            Assign => "=",
            EqEq => "==",
            NotEq => "!=",
            Lt => "<",
            Le => "<=",
            Gt => ">",
            Ge => ">=",
            Semicolon => ";",
            Comma => ",",
            LParen => "(",
            RParen => ")",
            LBrace => "{",
            RBrace => "}",
            LBracket => "[",
            RBracket => "]",
            Eof => "end of input",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::IntLit(v) => write!(f, "{v}"),
            TokenKind::CharLit(c) => write!(f, "'{}'", c.escape_ascii()),
            TokenKind::StrLit(s) => write!(f, "{s:?}"),
            TokenKind::Ident(s) => write!(f, "{s}"),
            other => f.write_str(other.name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Position,
}
