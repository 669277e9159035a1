use std::fmt;
use std::sync::{Arc, LazyLock};

use crate::error::{ParseError, ParseErrorKind, ParseResult, TypeError, TypeResult};
use crate::lexer::TokenStream;
use crate::token::TokenKind;

/// Width of a pointer in bits.
pub const POINTER_BITS: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Void,
    Char,
    Int,
    Long,
}

impl TypeKind {
    pub fn name(self) -> &'static str {
        match self {
            TypeKind::Void => "void",
            TypeKind::Char => "char",
            TypeKind::Int => "int",
            TypeKind::Long => "long",
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            TypeKind::Void => 0,
            TypeKind::Char => 8,
            TypeKind::Int => 32,
            TypeKind::Long => 64,
        }
    }
}

/// A resolved type.
///
/// Pointer types keep `base` pointing at the level-0 type they were built
/// from; an array is a level-1 (or deeper) pointer with a nonzero
/// `array_len`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Type {
    pub kind: TypeKind,
    pub size: u32,
    pub pointer_level: u32,
    pub array_len: u32,
    pub base: Option<Arc<Type>>,
}

fn primitive(kind: TypeKind) -> Arc<Type> {
    Arc::new(Type { kind, size: kind.bits(), pointer_level: 0, array_len: 0, base: None })
}

pub static TY_VOID: LazyLock<Arc<Type>> = LazyLock::new(|| primitive(TypeKind::Void));
pub static TY_CHAR: LazyLock<Arc<Type>> = LazyLock::new(|| primitive(TypeKind::Char));
pub static TY_INT: LazyLock<Arc<Type>> = LazyLock::new(|| primitive(TypeKind::Int));
pub static TY_LONG: LazyLock<Arc<Type>> = LazyLock::new(|| primitive(TypeKind::Long));

impl Type {
    pub fn primitive(kind: TypeKind) -> Arc<Type> {
        match kind {
            TypeKind::Void => TY_VOID.clone(),
            TypeKind::Char => TY_CHAR.clone(),
            TypeKind::Int => TY_INT.clone(),
            TypeKind::Long => TY_LONG.clone(),
        }
    }

    pub fn is_void(&self) -> bool { self.pointer_level == 0 && self.kind == TypeKind::Void }

    pub fn is_pointer(&self) -> bool { self.pointer_level > 0 }

    pub fn is_array(&self) -> bool { self.array_len > 0 }

    pub fn is_integer(&self) -> bool { self.pointer_level == 0 && self.kind != TypeKind::Void }

    /// A plain 64-bit integer, the one scalar allowed to stand in for a pointer.
    fn is_pointer_sized_integer(&self) -> bool { self.pointer_level == 0 && self.kind == TypeKind::Long }

    /// Width in bytes of a value of this type held in a register or loaded from memory.
    pub fn value_bytes(&self) -> u32 { self.size / 8 }

    /// Byte size of one element this pointer refers to.
    pub fn elem_size(&self) -> u32 {
        if self.pointer_level > 1 {
            POINTER_BITS / 8
        } else {
            self.base.as_ref().map_or(0, |b| b.size / 8)
        }
    }

    /// Bytes of storage a variable of this type occupies.
    pub fn storage_bytes(&self) -> u32 {
        if self.is_array() { self.elem_size() * self.array_len } else { self.value_bytes() }
    }

    /// The type an array evaluates to when used as a value.
    pub fn decay(self: &Arc<Self>) -> Arc<Type> {
        if !self.is_array() {
            return self.clone();
        }
        let mut ty = (**self).clone();
        ty.array_len = 0;
        Arc::new(ty)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.name())?;
        let stars = if self.is_array() { self.pointer_level - 1 } else { self.pointer_level };
        for _ in 0..stars {
            f.write_str("*")?;
        }
        if self.is_array() {
            write!(f, "[{}]", self.array_len)?;
        }
        Ok(())
    }
}

/// Reads a primitive type keyword followed by any number of `*`.
pub fn resolve(tokens: &mut TokenStream) -> ParseResult<Arc<Type>> {
    let tok = tokens.next()?;
    let mut ty = match tok.kind {
        TokenKind::Void => Type::primitive(TypeKind::Void),
        TokenKind::Char => Type::primitive(TypeKind::Char),
        TokenKind::Int => Type::primitive(TypeKind::Int),
        TokenKind::Long => Type::primitive(TypeKind::Long),
        other => {
            return Err(ParseError {
                kind: ParseErrorKind::UnexpectedToken {
                    construct: "type",
                    expected: "type name".into(),
                    found: other.to_string(),
                },
                pos: tok.pos,
            })
        }
    };
    while tokens.peek()?.kind == TokenKind::Star {
        tokens.next()?;
        ty = pointer_of(&ty);
    }
    Ok(ty)
}

pub fn pointer_of(ty: &Arc<Type>) -> Arc<Type> {
    let base = if ty.is_pointer() { ty.base.clone() } else { Some(ty.clone()) };
    Arc::new(Type {
        kind: ty.kind,
        size: POINTER_BITS,
        pointer_level: ty.pointer_level + 1,
        array_len: 0,
        base,
    })
}

pub fn array_of(elem: &Arc<Type>, len: u32) -> Arc<Type> {
    let mut ty = (*pointer_of(elem)).clone();
    ty.array_len = len;
    Arc::new(ty)
}

pub fn deref(ty: &Arc<Type>, levels: u32) -> TypeResult<Arc<Type>> {
    if !ty.is_pointer() {
        return Err(TypeError::NotAPointer { ty: ty.to_string() });
    }
    if levels > ty.pointer_level {
        return Err(TypeError::OverDeref { ty: ty.to_string(), levels });
    }
    let level = ty.pointer_level - levels;
    if level == 0 {
        return Ok(ty.base.clone().unwrap_or_else(|| Type::primitive(ty.kind)));
    }
    Ok(Arc::new(Type {
        kind: ty.kind,
        size: POINTER_BITS,
        pointer_level: level,
        array_len: 0,
        base: ty.base.clone(),
    }))
}

/// Result type of an arithmetic expression over two operands.
pub fn combine_for_expr(left: &Arc<Type>, right: &Arc<Type>) -> TypeResult<Arc<Type>> {
    if left == right {
        return Ok(left.clone());
    }
    if left.is_void() != right.is_void() {
        return Err(TypeError::VoidInExpression);
    }
    if right.size > left.size { Ok(right.clone()) } else { Ok(left.clone()) }
}

pub fn check_assignable(dst: &Type, src: &Type) -> TypeResult<()> {
    if dst.is_void() != src.is_void() {
        return Err(TypeError::VoidInExpression);
    }
    if dst.pointer_level != src.pointer_level {
        let exempt = (dst.is_pointer() && src.is_pointer_sized_integer())
            || (src.is_pointer() && dst.is_pointer_sized_integer());
        if !exempt {
            return Err(TypeError::PointerLevelMismatch { dst: dst.to_string(), src: src.to_string() });
        }
    }
    if dst.size < src.size {
        return Err(TypeError::Narrowing { dst: dst.to_string(), src: src.to_string() });
    }
    Ok(())
}

/// Comparisons accept equal pointer levels, or a pointer against any integer.
pub fn check_comparable(left: &Type, right: &Type) -> TypeResult<()> {
    if left.is_void() || right.is_void() {
        return Err(TypeError::VoidInExpression);
    }
    if left.pointer_level != right.pointer_level && !left.is_integer() && !right.is_integer() {
        return Err(TypeError::IncomparableTypes { left: left.to_string(), right: right.to_string() });
    }
    Ok(())
}
