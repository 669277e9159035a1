use std::fmt;
use std::sync::Arc;

use crate::symtab::{SymbolId, SymbolTable};
use crate::token::Position;
use crate::types::Type;

#[derive(Debug)]
pub struct Program {
    pub items: Vec<Item>,
    pub symbols: SymbolTable,
}

#[derive(Debug)]
pub enum Item {
    /// A file-scope declaration; the initializer, if any, is a literal.
    Global { var: SymbolId, init: Option<Expr>, pos: Position },
    Function { func: SymbolId, body: Vec<Stmt>, pos: Position },
}

#[derive(Debug)]
pub enum Stmt {
    VarDecl { var: SymbolId, init: Option<Expr>, pos: Position },
    Assign { target: Expr, value: Expr, pos: Position },
    Call(Expr),
    If { cond: Expr, then_body: Vec<Stmt>, else_body: Option<Vec<Stmt>>, pos: Position },
    While { cond: Expr, body: Vec<Stmt>, pos: Position },
    DoWhile { body: Vec<Stmt>, cond: Expr, pos: Position },
    For { init: Vec<Stmt>, cond: Expr, update: Option<Box<Stmt>>, body: Vec<Stmt>, pos: Position },
    Break(Position),
    Return { value: Option<Expr>, func: SymbolId, pos: Position },
    Empty(Position),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp { Add, Sub, Mul, Div }

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp { Eq, Ne, Lt, Le, Gt, Ge }

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        })
    }
}

/// An expression node. Every node carries its resolved type.
#[derive(Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Arc<Type>,
    pub pos: Position,
}

#[derive(Debug)]
pub enum ExprKind {
    IntLit(u64),
    StrLit(String),
    Var(SymbolId),
    /// Storage address of a variable or of an indexed element.
    AddressOf(Box<Expr>),
    Binary { op: BinOp, left: Box<Expr>, right: Box<Expr> },
    Compare { op: CmpOp, left: Box<Expr>, right: Box<Expr> },
    Deref { expr: Box<Expr>, levels: u32 },
    /// `*(base + offset)` where `offset` is already in bytes.
    Index { base: Box<Expr>, offset: Box<Expr> },
    /// Integer operand multiplied by an element size for pointer arithmetic.
    Scale { expr: Box<Expr>, size: u32 },
    Call { func: SymbolId, arg: Option<Box<Expr>> },
    /// Left behind once a node's children have been moved out during teardown.
    Detached,
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Arc<Type>, pos: Position) -> Self { Self { kind, ty, pos } }

    pub fn is_literal(&self) -> bool { matches!(self.kind, ExprKind::IntLit(_) | ExprKind::StrLit(_)) }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            ExprKind::IntLit(_) => "integer literal",
            ExprKind::StrLit(_) => "string literal",
            ExprKind::Var(_) => "variable",
            ExprKind::AddressOf(_) => "address-of",
            ExprKind::Binary { .. } => "arithmetic",
            ExprKind::Compare { .. } => "comparison",
            ExprKind::Deref { .. } => "dereference",
            ExprKind::Index { .. } => "index",
            ExprKind::Scale { .. } => "scaled offset",
            ExprKind::Call { .. } => "call",
            ExprKind::Detached => "detached",
        }
    }

    fn take_children(&mut self, out: &mut Vec<Box<Expr>>) {
        match std::mem::replace(&mut self.kind, ExprKind::Detached) {
            ExprKind::AddressOf(e) | ExprKind::Deref { expr: e, .. } | ExprKind::Scale { expr: e, .. } => out.push(e),
            ExprKind::Binary { left, right, .. }
            | ExprKind::Compare { left, right, .. }
            | ExprKind::Index { base: left, offset: right } => {
                out.push(right);
                out.push(left);
            }
            ExprKind::Call { arg, .. } => out.extend(arg),
            ExprKind::IntLit(_) | ExprKind::StrLit(_) | ExprKind::Var(_) | ExprKind::Detached => {}
        }
    }
}

impl Drop for Expr {
    fn drop(&mut self) {
        let mut worklist = Vec::new();
        self.take_children(&mut worklist);
        while let Some(mut node) = worklist.pop() {
            node.take_children(&mut worklist);
        }
    }
}
