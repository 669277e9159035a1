use std::sync::Arc;

use tracing::debug;

use crate::ast::*;
use crate::error::{ParseError, ParseErrorKind, ParseResult, SemanticError, TypeError};
use crate::lexer::TokenStream;
use crate::symtab::{Param, SymbolId, SymbolKind, SymbolTable};
use crate::token::{Position, Token, TokenKind};
use crate::types::{self, Type, TypeKind, TY_CHAR, TY_INT, TY_LONG};

type Decl = (SymbolId, Option<Expr>, Position);

/// Recursive-descent parser that type-checks every node as it is built.
pub struct Parser {
    tokens: TokenStream,
    symbols: SymbolTable,
    loop_depth: usize,
    current_function: Option<SymbolId>,
}

fn located<T, E: Into<ParseErrorKind>>(res: Result<T, E>, pos: Position) -> ParseResult<T> {
    res.map_err(|e| ParseError { kind: e.into(), pos })
}

impl Parser {
    pub fn new(src: &str) -> Self {
        Self {
            tokens: TokenStream::new(src),
            symbols: SymbolTable::with_builtins(),
            loop_depth: 0,
            current_function: None,
        }
    }

    pub fn parse_program(mut self) -> ParseResult<Program> {
        let mut items = Vec::new();
        while *self.peek()? != TokenKind::Eof {
            if self.is_function_ahead()? {
                items.push(self.parse_function()?);
            } else {
                for (var, init, pos) in self.parse_var_decl(true)? {
                    items.push(Item::Global { var, init, pos });
                }
            }
        }
        debug!(items = items.len(), symbols = self.symbols.len(), "parsed program");
        Ok(Program { items, symbols: self.symbols })
    }

    fn peek(&mut self) -> ParseResult<&TokenKind> { Ok(&self.tokens.peek()?.kind) }

    fn peek_at(&mut self, n: usize) -> ParseResult<&TokenKind> { Ok(&self.tokens.peek_at(n)?.kind) }

    fn pos(&mut self) -> ParseResult<Position> { Ok(self.tokens.peek()?.pos) }

    fn eat(&mut self, kind: &TokenKind) -> ParseResult<bool> {
        if self.peek()? == kind {
            self.tokens.next()?;
            Ok(true)
        } else { Ok(false) }
    }

    fn expect(&mut self, expected: TokenKind, construct: &'static str) -> ParseResult<Token> {
        let tok = self.tokens.next()?;
        if tok.kind == expected { Ok(tok) } else { Err(Self::unexpected(construct, expected.name(), &tok)) }
    }

    fn expect_ident(&mut self, construct: &'static str) -> ParseResult<(String, Position)> {
        let tok = self.tokens.next()?;
        match tok.kind {
            TokenKind::Ident(name) => Ok((name, tok.pos)),
            _ => Err(Self::unexpected(construct, "identifier", &tok)),
        }
    }

    fn unexpected(construct: &'static str, expected: &str, found: &Token) -> ParseError {
        ParseError {
            kind: ParseErrorKind::UnexpectedToken { construct, expected: expected.into(), found: found.kind.to_string() },
            pos: found.pos,
        }
    }

    fn err<T>(kind: impl Into<ParseErrorKind>, pos: Position) -> ParseResult<T> {
        Err(ParseError { kind: kind.into(), pos })
    }

    fn require_value(e: &Expr) -> ParseResult<()> {
        if e.ty.is_void() { Self::err(TypeError::VoidInExpression, e.pos) } else { Ok(()) }
    }

    /// `type *... ident (` without consuming anything.
    fn is_function_ahead(&mut self) -> ParseResult<bool> {
        if !self.peek()?.is_type_keyword() {
            return Ok(false);
        }
        let mut n = 1;
        while *self.peek_at(n)? == TokenKind::Star {
            n += 1;
        }
        if !matches!(self.peek_at(n)?, TokenKind::Ident(_)) {
            return Ok(false);
        }
        Ok(*self.peek_at(n + 1)? == TokenKind::LParen)
    }

    fn parse_var_decl(&mut self, global: bool) -> ParseResult<Vec<Decl>> {
        let ty = types::resolve(&mut self.tokens)?;
        let mut decls = Vec::new();
        loop {
            let (name, pos) = self.expect_ident("declaration")?;
            if ty.is_void() {
                return Self::err(SemanticError::VoidVariable { name }, pos);
            }
            let var_ty = if self.eat(&TokenKind::LBracket)? {
                let tok = self.tokens.next()?;
                let len = match tok.kind {
                    TokenKind::IntLit(n) => u32::try_from(n)
                        .map_err(|_| Self::unexpected("array declaration", "array length below 2^32", &tok))?,
                    _ => return Err(Self::unexpected("array declaration", "array length", &tok)),
                };
                if len == 0 {
                    return Self::err(SemanticError::ZeroLengthArray { name }, pos);
                }
                self.expect(TokenKind::RBracket, "array declaration")?;
                types::array_of(&ty, len)
            } else {
                ty.clone()
            };
            let var = located(self.symbols.declare(&name, SymbolKind::Variable, var_ty), pos)?;
            let init = if self.eat(&TokenKind::Assign)? { Some(self.parse_initializer(var, global)?) } else { None };
            decls.push((var, init, pos));
            if !self.eat(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect(TokenKind::Semicolon, "declaration")?;
        Ok(decls)
    }

    fn parse_initializer(&mut self, var: SymbolId, global: bool) -> ParseResult<Expr> {
        let value = self.parse_expr()?;
        let (name, ty) = {
            let sym = self.symbols.get(var);
            (sym.name.clone(), sym.ty.clone())
        };
        if global && !value.is_literal() {
            return Self::err(SemanticError::NonLiteralGlobalInit { name }, value.pos);
        }
        if !ty.is_array() {
            located(types::check_assignable(&ty, &value.ty), value.pos)?;
            return Ok(value);
        }
        // Only `char name[N] = "..."` initializes an array; the bound grows to fit.
        let needed = match &value.kind {
            ExprKind::StrLit(s) if ty.pointer_level == 1 && ty.kind == TypeKind::Char => s.len() as u32 + 1,
            _ => return Self::err(SemanticError::AssignToArray { name }, value.pos),
        };
        if needed > ty.array_len {
            self.symbols.refine_type(var, types::array_of(&TY_CHAR, needed));
        }
        Ok(value)
    }

    fn parse_function(&mut self) -> ParseResult<Item> {
        let ret = types::resolve(&mut self.tokens)?;
        let (name, pos) = self.expect_ident("function declaration")?;
        let func = located(
            self.symbols.declare(&name, SymbolKind::Function { params: Vec::new(), builtin: false }, ret),
            pos,
        )?;
        self.expect(TokenKind::LParen, "parameter list")?;
        if *self.peek()? == TokenKind::Void && *self.peek_at(1)? == TokenKind::RParen {
            self.tokens.next()?;
        } else if *self.peek()? != TokenKind::RParen {
            loop {
                let ty = types::resolve(&mut self.tokens)?;
                let (pname, ppos) = self.expect_ident("parameter list")?;
                if ty.is_void() {
                    return Self::err(SemanticError::VoidVariable { name: pname }, ppos);
                }
                if !self.symbols.get(func).params().is_empty() {
                    return Self::err(SemanticError::TooManyParameters { name }, ppos);
                }
                let storage = located(self.symbols.declare(&pname, SymbolKind::Variable, ty.clone()), ppos)?;
                located(self.symbols.add_param(func, Param { name: pname, ty, storage: Some(storage) }), ppos)?;
                if !self.eat(&TokenKind::Comma)? {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "parameter list")?;
        self.current_function = Some(func);
        let body = self.parse_block()?;
        self.current_function = None;
        debug!(function = %name, statements = body.len(), "parsed function");
        Ok(Item::Function { func, body, pos })
    }

    fn parse_block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect(TokenKind::LBrace, "block")?;
        let mut stmts = Vec::new();
        loop {
            match self.peek()? {
                TokenKind::RBrace => {
                    self.tokens.next()?;
                    return Ok(stmts);
                }
                TokenKind::Eof => {
                    let tok = self.tokens.next()?;
                    return Err(Self::unexpected("block", "}", &tok));
                }
                _ => self.parse_stmt_into(&mut stmts)?,
            }
        }
    }

    /// A braced block or a single statement.
    fn parse_body(&mut self) -> ParseResult<Vec<Stmt>> {
        if *self.peek()? == TokenKind::LBrace {
            return self.parse_block();
        }
        let mut stmts = Vec::new();
        self.parse_stmt_into(&mut stmts)?;
        Ok(stmts)
    }

    fn parse_loop_body(&mut self) -> ParseResult<Vec<Stmt>> {
        self.loop_depth += 1;
        let body = self.parse_body();
        self.loop_depth -= 1;
        body
    }

    fn parse_condition(&mut self, construct: &'static str) -> ParseResult<Expr> {
        self.expect(TokenKind::LParen, construct)?;
        let cond = self.parse_expr()?;
        Self::require_value(&cond)?;
        self.expect(TokenKind::RParen, construct)?;
        Ok(cond)
    }

    fn parse_stmt_into(&mut self, out: &mut Vec<Stmt>) -> ParseResult<()> {
        let pos = self.pos()?;
        let kind = self.peek()?.clone();
        match kind {
            k if k.is_type_keyword() => {
                for (var, init, pos) in self.parse_var_decl(false)? {
                    out.push(Stmt::VarDecl { var, init, pos });
                }
            }
            TokenKind::LBrace => out.extend(self.parse_block()?),
            TokenKind::If => {
                self.tokens.next()?;
                let cond = self.parse_condition("if statement")?;
                let then_body = self.parse_body()?;
                let else_body = if self.eat(&TokenKind::Else)? { Some(self.parse_body()?) } else { None };
                out.push(Stmt::If { cond, then_body, else_body, pos });
            }
            TokenKind::While => {
                self.tokens.next()?;
                let cond = self.parse_condition("while statement")?;
                let body = self.parse_loop_body()?;
                out.push(Stmt::While { cond, body, pos });
            }
            TokenKind::Do => {
                self.tokens.next()?;
                let body = self.parse_loop_body()?;
                self.expect(TokenKind::While, "do-while statement")?;
                let cond = self.parse_condition("do-while statement")?;
                self.expect(TokenKind::Semicolon, "do-while statement")?;
                out.push(Stmt::DoWhile { body, cond, pos });
            }
            TokenKind::For => out.push(self.parse_for()?),
            TokenKind::Break => {
                self.tokens.next()?;
                if self.loop_depth == 0 {
                    return Self::err(SemanticError::BreakOutsideLoop, pos);
                }
                self.expect(TokenKind::Semicolon, "break statement")?;
                out.push(Stmt::Break(pos));
            }
            TokenKind::Return => out.push(self.parse_return()?),
            TokenKind::Semicolon => {
                self.tokens.next()?;
                out.push(Stmt::Empty(pos));
            }
            TokenKind::Ident(_) if *self.peek_at(1)? == TokenKind::LParen => {
                let call = self.parse_primary()?;
                self.expect(TokenKind::Semicolon, "call statement")?;
                out.push(Stmt::Call(call));
            }
            _ => {
                let assign = self.parse_assignment()?;
                self.expect(TokenKind::Semicolon, "assignment")?;
                out.push(assign);
            }
        }
        Ok(())
    }

    fn parse_for(&mut self) -> ParseResult<Stmt> {
        let pos = self.expect(TokenKind::For, "for statement")?.pos;
        self.expect(TokenKind::LParen, "for statement")?;
        let mut init = Vec::new();
        if self.peek()?.is_type_keyword() {
            for (var, init_expr, pos) in self.parse_var_decl(false)? {
                init.push(Stmt::VarDecl { var, init: init_expr, pos });
            }
        } else if !self.eat(&TokenKind::Semicolon)? {
            init.push(self.parse_assignment()?);
            self.expect(TokenKind::Semicolon, "for statement")?;
        }
        let cond = self.parse_expr()?;
        Self::require_value(&cond)?;
        self.expect(TokenKind::Semicolon, "for statement")?;
        let update = if *self.peek()? == TokenKind::RParen { None } else { Some(Box::new(self.parse_assignment()?)) };
        self.expect(TokenKind::RParen, "for statement")?;
        let body = self.parse_loop_body()?;
        Ok(Stmt::For { init, cond, update, body, pos })
    }

    fn parse_return(&mut self) -> ParseResult<Stmt> {
        let pos = self.expect(TokenKind::Return, "return statement")?.pos;
        let Some(func) = self.current_function else {
            return Self::err(SemanticError::ReturnOutsideFunction, pos);
        };
        let (fname, ret) = {
            let sym = self.symbols.get(func);
            (sym.name.clone(), sym.ty.clone())
        };
        if self.eat(&TokenKind::Semicolon)? {
            if !ret.is_void() {
                return Self::err(SemanticError::MissingReturnValue { func: fname }, pos);
            }
            return Ok(Stmt::Return { value: None, func, pos });
        }
        let value = self.parse_expr()?;
        if ret.is_void() {
            return Self::err(SemanticError::ReturnValueFromVoid { func: fname }, value.pos);
        }
        located(types::check_assignable(&ret, &value.ty), value.pos)?;
        self.expect(TokenKind::Semicolon, "return statement")?;
        Ok(Stmt::Return { value: Some(value), func, pos })
    }

    /// `target = value` without the trailing `;`.
    fn parse_assignment(&mut self) -> ParseResult<Stmt> {
        let target = self.parse_unary()?;
        let pos = target.pos;
        match &target.kind {
            ExprKind::Var(_) | ExprKind::Deref { .. } | ExprKind::Index { .. } => {}
            ExprKind::AddressOf(inner) => {
                if let ExprKind::Var(id) = inner.kind {
                    let sym = self.symbols.get(id);
                    if sym.ty.is_array() {
                        return Self::err(SemanticError::AssignToArray { name: sym.name.clone() }, pos);
                    }
                }
                return Self::err(SemanticError::NotAssignable, pos);
            }
            _ => return Self::err(SemanticError::NotAssignable, pos),
        }
        self.expect(TokenKind::Assign, "assignment")?;
        let value = self.parse_expr()?;
        located(types::check_assignable(&target.ty, &value.ty), value.pos)?;
        Ok(Stmt::Assign { target, value, pos })
    }

    pub fn parse_expr(&mut self) -> ParseResult<Expr> { self.parse_compare() }

    fn parse_compare(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_add_sub()?;
        loop {
            let op = match self.peek()? {
                TokenKind::EqEq => CmpOp::Eq,
                TokenKind::NotEq => CmpOp::Ne,
                TokenKind::Lt => CmpOp::Lt,
                TokenKind::Le => CmpOp::Le,
                TokenKind::Gt => CmpOp::Gt,
                TokenKind::Ge => CmpOp::Ge,
                _ => break,
            };
            let pos = self.tokens.next()?.pos;
            let right = self.parse_add_sub()?;
            located(types::check_comparable(&left.ty, &right.ty), pos)?;
            left = Expr::new(ExprKind::Compare { op, left: Box::new(left), right: Box::new(right) }, TY_INT.clone(), pos);
        }
        Ok(left)
    }

    fn parse_add_sub(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_mul_div()?;
        loop {
            let op = match self.peek()? {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            let pos = self.tokens.next()?.pos;
            let right = self.parse_mul_div()?;
            left = Self::additive(op, left, right, pos)?;
        }
        Ok(left)
    }

    fn scaled(e: Expr, size: u32) -> Expr {
        let pos = e.pos;
        Expr::new(ExprKind::Scale { expr: Box::new(e), size }, TY_LONG.clone(), pos)
    }

    /// `+`/`-` with pointer arithmetic: the integer side is scaled to bytes.
    fn additive(op: BinOp, left: Expr, right: Expr, pos: Position) -> ParseResult<Expr> {
        Self::require_value(&left)?;
        Self::require_value(&right)?;
        let (lp, rp) = (left.ty.is_pointer(), right.ty.is_pointer());
        let ty = match (lp, rp) {
            (false, false) => located(types::combine_for_expr(&left.ty, &right.ty), pos)?,
            (true, false) => left.ty.decay(),
            (false, true) if op == BinOp::Add => right.ty.decay(),
            _ => {
                return Self::err(
                    TypeError::InvalidPointerArithmetic {
                        op: op.symbol(),
                        left: left.ty.to_string(),
                        right: right.ty.to_string(),
                    },
                    pos,
                )
            }
        };
        let (left, right) = match (lp, rp) {
            (true, false) => {
                let size = left.ty.elem_size();
                (left, Self::scaled(right, size))
            }
            (false, true) => {
                let size = right.ty.elem_size();
                (Self::scaled(left, size), right)
            }
            _ => (left, right),
        };
        Ok(Expr::new(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, ty, pos))
    }

    fn parse_mul_div(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek()? {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                _ => break,
            };
            let pos = self.tokens.next()?.pos;
            let right = self.parse_unary()?;
            Self::require_value(&left)?;
            Self::require_value(&right)?;
            if left.ty.is_pointer() || right.ty.is_pointer() {
                return Self::err(
                    TypeError::InvalidPointerArithmetic {
                        op: op.symbol(),
                        left: left.ty.to_string(),
                        right: right.ty.to_string(),
                    },
                    pos,
                );
            }
            let ty = located(types::combine_for_expr(&left.ty, &right.ty), pos)?;
            left = Expr::new(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, ty, pos);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        match self.peek()? {
            TokenKind::Amp => {
                let pos = self.tokens.next()?.pos;
                let inner = self.parse_primary()?;
                let addressable = matches!(inner.kind, ExprKind::Var(_) | ExprKind::Index { .. });
                // A bare array name already evaluates to its address.
                let decayed = matches!(inner.kind, ExprKind::AddressOf(_));
                if decayed {
                    Ok(inner)
                } else if addressable {
                    let ty = types::pointer_of(&inner.ty);
                    Ok(Expr::new(ExprKind::AddressOf(Box::new(inner)), ty, pos))
                } else {
                    Self::err(SemanticError::InvalidAddressOf, pos)
                }
            }
            TokenKind::Star => {
                let pos = self.pos()?;
                let mut levels = 0;
                while self.eat(&TokenKind::Star)? {
                    levels += 1;
                }
                let operand = self.parse_unary()?;
                let ty = located(types::deref(&operand.ty, levels), pos)?;
                Ok(Expr::new(ExprKind::Deref { expr: Box::new(operand), levels }, ty, pos))
            }
            _ => self.parse_primary(),
        }
    }

    fn literal_type(v: u64) -> Arc<Type> {
        if v <= u64::from(u8::MAX) {
            TY_CHAR.clone()
        } else if v <= i32::MAX as u64 {
            TY_INT.clone()
        } else {
            TY_LONG.clone()
        }
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let tok = self.tokens.next()?;
        let pos = tok.pos;
        match tok.kind {
            TokenKind::IntLit(v) => Ok(Expr::new(ExprKind::IntLit(v), Self::literal_type(v), pos)),
            TokenKind::CharLit(c) => Ok(Expr::new(ExprKind::IntLit(u64::from(c)), TY_CHAR.clone(), pos)),
            TokenKind::StrLit(s) => {
                let ty = types::array_of(&TY_CHAR, s.len() as u32 + 1);
                Ok(Expr::new(ExprKind::StrLit(s), ty, pos))
            }
            TokenKind::LParen => {
                let e = self.parse_expr()?;
                self.expect(TokenKind::RParen, "parenthesized expression")?;
                Ok(e)
            }
            TokenKind::Ident(name) => self.parse_ident(name, pos),
            other => Self::err(
                ParseErrorKind::UnexpectedToken { construct: "expression", expected: "expression".into(), found: other.to_string() },
                pos,
            ),
        }
    }

    fn parse_ident(&mut self, name: String, pos: Position) -> ParseResult<Expr> {
        let Some(id) = self.symbols.find(&name) else {
            return Self::err(SemanticError::Undeclared { name }, pos);
        };
        let (ty, is_function) = {
            let sym = self.symbols.get(id);
            (sym.ty.clone(), sym.is_function())
        };
        if *self.peek()? == TokenKind::LParen {
            if !is_function {
                return Self::err(SemanticError::NotAFunction { name }, pos);
            }
            return self.parse_call(id, name, pos);
        }
        if is_function {
            return Self::err(SemanticError::NotAVariable { name }, pos);
        }
        if *self.peek()? == TokenKind::LBracket {
            return self.parse_index(id, ty, pos);
        }
        let var = Expr::new(ExprKind::Var(id), ty.clone(), pos);
        if ty.is_array() {
            return Ok(Expr::new(ExprKind::AddressOf(Box::new(var)), ty.decay(), pos));
        }
        Ok(var)
    }

    fn parse_call(&mut self, id: SymbolId, name: String, pos: Position) -> ParseResult<Expr> {
        self.expect(TokenKind::LParen, "function call")?;
        let mut args = Vec::new();
        if !self.eat(&TokenKind::RParen)? {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat(&TokenKind::Comma)? {
                    break;
                }
            }
            self.expect(TokenKind::RParen, "function call")?;
        }
        let sym = self.symbols.get(id);
        let params = sym.params();
        if params.len() != args.len() {
            return Self::err(SemanticError::ArgumentCount { name, expected: params.len(), found: args.len() }, pos);
        }
        for (param, arg) in params.iter().zip(&args) {
            types::check_assignable(&param.ty, &arg.ty).map_err(|source| ParseError {
                kind: SemanticError::ArgumentType { name: name.clone(), source }.into(),
                pos: arg.pos,
            })?;
        }
        let ret = sym.ty.clone();
        let arg = args.pop().map(Box::new);
        Ok(Expr::new(ExprKind::Call { func: id, arg }, ret, pos))
    }

    /// `name[i]` becomes `*(base + i * elem_size)`.
    fn parse_index(&mut self, id: SymbolId, ty: Arc<Type>, pos: Position) -> ParseResult<Expr> {
        let bracket = self.expect(TokenKind::LBracket, "index")?.pos;
        let index = self.parse_expr()?;
        self.expect(TokenKind::RBracket, "index")?;
        Self::require_value(&index)?;
        if index.ty.is_pointer() {
            return Self::err(
                TypeError::InvalidPointerArithmetic { op: "[]", left: ty.to_string(), right: index.ty.to_string() },
                index.pos,
            );
        }
        let elem = located(types::deref(&ty, 1), bracket)?;
        let var = Expr::new(ExprKind::Var(id), ty.clone(), pos);
        let base = if ty.is_array() { Expr::new(ExprKind::AddressOf(Box::new(var)), ty.decay(), pos) } else { var };
        let offset = Self::scaled(index, ty.elem_size());
        Ok(Expr::new(ExprKind::Index { base: Box::new(base), offset: Box::new(offset) }, elem, pos))
    }
}
