use std::collections::VecDeque;

use tracing::trace;

use crate::error::{LexError, LexErrorKind, LexResult};
use crate::token::{Position, Token, TokenKind};

pub struct Lexer {
    input: Vec<char>,
    idx: usize,
    line: usize,
    col: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self { input: source.chars().collect(), idx: 0, line: 1, col: 1 }
    }

    fn pos(&self) -> Position { Position::new(self.line, self.col) }

    fn peek(&self) -> Option<char> { self.input.get(self.idx).copied() }

    fn peek_next(&self) -> Option<char> { self.input.get(self.idx + 1).copied() }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.idx += 1;
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn match_next(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else { false }
    }

    fn err(kind: LexErrorKind, pos: Position) -> LexError { LexError { kind, pos } }

    fn skip_ws_and_comments(&mut self) -> LexResult<()> {
        loop {
            match (self.peek(), self.peek_next()) {
                (Some(c), _) if c.is_whitespace() => { self.bump(); }
                (Some('/'), Some('/')) => {
                    while let Some(c) = self.peek() { if c == '\n' { break; } self.bump(); }
                }
                (Some('/'), Some('*')) => {
                    let start = self.pos();
                    self.bump();
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('*') if self.peek() == Some('/') => { self.bump(); break; }
                            Some(_) => {}
                            None => return Err(Self::err(LexErrorKind::UnterminatedComment, start)),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn read_ident_or_kw(&mut self) -> Token {
        let pos = self.pos();
        let mut s = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' { s.push(ch); self.bump(); } else { break; }
        }
        let kind = TokenKind::keyword(&s).unwrap_or(TokenKind::Ident(s));
        Token { kind, pos }
    }

    fn read_number(&mut self) -> LexResult<Token> {
        let pos = self.pos();
        let mut value: u64 = 0;
        while let Some(ch) = self.peek() {
            let Some(d) = ch.to_digit(10) else { break };
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(u64::from(d)))
                .ok_or(Self::err(LexErrorKind::IntOverflow, pos))?;
            self.bump();
        }
        Ok(Token { kind: TokenKind::IntLit(value), pos })
    }

    fn read_escape(&mut self, start: Position) -> LexResult<char> {
        match self.bump() {
            Some('n') => Ok('\n'),
            Some('t') => Ok('\t'),
            Some('0') => Ok('\0'),
            Some('\\') => Ok('\\'),
            Some('"') => Ok('"'),
            Some('\'') => Ok('\''),
            Some(ch) => Err(Self::err(LexErrorKind::InvalidEscape { ch }, start)),
            None => Err(Self::err(LexErrorKind::UnterminatedString, start)),
        }
    }

    fn read_string(&mut self) -> LexResult<Token> {
        let start = self.pos();
        self.bump(); // opening quote
        let mut s = String::new();
        loop {
            match self.bump() {
                Some('"') => break,
                Some('\\') => s.push(self.read_escape(start)?),
                Some('\n') | None => return Err(Self::err(LexErrorKind::UnterminatedString, start)),
                Some(ch) => s.push(ch),
            }
        }
        Ok(Token { kind: TokenKind::StrLit(s), pos: start })
    }

    fn read_char(&mut self) -> LexResult<Token> {
        let start = self.pos();
        self.bump(); // opening quote
        let ch = match self.bump() {
            Some('\\') => self.read_escape(start)?,
            Some('\'') | Some('\n') | None => return Err(Self::err(LexErrorKind::InvalidCharLiteral, start)),
            Some(ch) => ch,
        };
        if !ch.is_ascii() || !self.match_next('\'') {
            return Err(Self::err(LexErrorKind::InvalidCharLiteral, start));
        }
        Ok(Token { kind: TokenKind::CharLit(ch as u8), pos: start })
    }

    pub fn next_token(&mut self) -> LexResult<Token> {
        self.skip_ws_and_comments()?;
        let pos = self.pos();
        let Some(ch) = self.peek() else { return Ok(Token { kind: TokenKind::Eof, pos }) };
        let tok = match ch {
            'a'..='z' | 'A'..='Z' | '_' => return Ok(self.read_ident_or_kw()),
            '0'..='9' => return self.read_number(),
            '"' => return self.read_string(),
            '\'' => return self.read_char(),
            _ => {
                self.bump();
                let kind = match ch {
                    '+' => TokenKind::Plus,
                    '-' => TokenKind::Minus,
                    '*' => TokenKind::Star,
                    '/' => TokenKind::Slash,
                    '&' => TokenKind::Amp,
                    ';' => TokenKind::Semicolon,
                    ',' => TokenKind::Comma,
                    '(' => TokenKind::LParen,
                    ')' => TokenKind::RParen,
                    '{' => TokenKind::LBrace,
                    '}' => TokenKind::RBrace,
                    '[' => TokenKind::LBracket,
                    ']' => TokenKind::RBracket,
                    '=' => if self.match_next('=') { TokenKind::EqEq } else { TokenKind::Assign },
                    '<' => if self.match_next('=') { TokenKind::Le } else { TokenKind::Lt },
                    '>' => if self.match_next('=') { TokenKind::Ge } else { TokenKind::Gt },
                    '!' => {
                        if self.match_next('=') { TokenKind::NotEq } else {
                            return Err(Self::err(LexErrorKind::BangWithoutEq { found: self.peek() }, pos));
                        }
                    }
                    _ => return Err(Self::err(LexErrorKind::InvalidChar { ch }, pos)),
                };
                Token { kind, pos }
            }
        };
        Ok(tok)
    }

    /// Lex the whole input, including the trailing `Eof` token.
    pub fn tokenize(mut self) -> LexResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let done = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if done { return Ok(tokens); }
        }
    }
}

/// Lookahead queue over the lexer.
///
/// Tokens are lexed lazily; `peek_at` fills the queue as deep as asked, `next`
/// consumes from the front, and `push_back` returns tokens to the front so
/// the next `next` yields them again. Once the lexer reaches the end of input
/// every further request yields `Eof`.
pub struct TokenStream {
    lexer: Lexer,
    cache: VecDeque<Token>,
}

impl TokenStream {
    pub fn new(source: &str) -> Self {
        Self { lexer: Lexer::new(source), cache: VecDeque::new() }
    }

    fn fill(&mut self, depth: usize) -> LexResult<()> {
        while self.cache.len() <= depth {
            let tok = self.lexer.next_token()?;
            trace!(kind = ?tok.kind, pos = %tok.pos, "token");
            self.cache.push_back(tok);
        }
        Ok(())
    }

    pub fn peek(&mut self) -> LexResult<&Token> { self.peek_at(0) }

    pub fn peek_at(&mut self, n: usize) -> LexResult<&Token> {
        self.fill(n)?;
        Ok(&self.cache[n])
    }

    pub fn next(&mut self) -> LexResult<Token> {
        self.fill(0)?;
        match self.cache.pop_front() {
            Some(tok) => Ok(tok),
            None => Ok(Token { kind: TokenKind::Eof, pos: self.lexer.pos() }),
        }
    }

    pub fn push_back(&mut self, tok: Token) {
        self.cache.push_front(tok);
    }
}
