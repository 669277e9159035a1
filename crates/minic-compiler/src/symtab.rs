use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::SemanticError;
use crate::types::{pointer_of, Type, TY_CHAR, TY_LONG, TY_VOID};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub ty: Arc<Type>,
    /// Global variable the incoming argument is stored into; `None` for built-ins.
    pub storage: Option<SymbolId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Function { params: Vec<Param>, builtin: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub ty: Arc<Type>,
    pub kind: SymbolKind,
}

impl Symbol {
    pub fn is_function(&self) -> bool { matches!(self.kind, SymbolKind::Function { .. }) }

    pub fn params(&self) -> &[Param] {
        match &self.kind {
            SymbolKind::Function { params, .. } => params,
            SymbolKind::Variable => &[],
        }
    }

    pub fn is_builtin(&self) -> bool { matches!(self.kind, SymbolKind::Function { builtin: true, .. }) }
}

/// The single global scope. Append-only; names are unique.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    index: HashMap<String, SymbolId>,
}

impl SymbolTable {
    pub fn new() -> Self { Self::default() }

    /// A table pre-seeded with the runtime library routines.
    pub fn with_builtins() -> Self {
        let mut table = Self::new();
        let builtins: [(&str, Option<(&str, Arc<Type>)>); 4] = [
            ("print", Some(("value", TY_LONG.clone()))),
            ("print_char", Some(("ch", TY_CHAR.clone()))),
            ("print_str", Some(("s", pointer_of(&TY_CHAR)))),
            ("print_ln", None),
        ];
        for (name, param) in builtins {
            let params = param
                .into_iter()
                .map(|(pname, ty)| Param { name: pname.into(), ty, storage: None })
                .collect();
            table.insert(Symbol {
                name: name.into(),
                ty: TY_VOID.clone(),
                kind: SymbolKind::Function { params, builtin: true },
            });
        }
        table
    }

    fn insert(&mut self, symbol: Symbol) -> SymbolId {
        let id = SymbolId(self.symbols.len());
        self.index.insert(symbol.name.clone(), id);
        self.symbols.push(symbol);
        id
    }

    pub fn declare(&mut self, name: &str, kind: SymbolKind, ty: Arc<Type>) -> Result<SymbolId, SemanticError> {
        if self.index.contains_key(name) {
            return Err(SemanticError::Redefinition { name: name.into() });
        }
        debug!(symbol = name, ty = %ty, function = matches!(kind, SymbolKind::Function { .. }), "declare symbol");
        Ok(self.insert(Symbol { name: name.into(), ty, kind }))
    }

    pub fn find(&self, name: &str) -> Option<SymbolId> { self.index.get(name).copied() }

    pub fn get(&self, id: SymbolId) -> &Symbol { &self.symbols[id.0] }

    /// Replaces a variable's type once its final array bound is known.
    pub fn refine_type(&mut self, id: SymbolId, ty: Arc<Type>) {
        let sym = &mut self.symbols[id.0];
        debug!(symbol = %sym.name, from = %sym.ty, to = %ty, "refine symbol type");
        sym.ty = ty;
    }

    /// Appends a parameter to a function's argument list. At most one is supported.
    pub fn add_param(&mut self, func: SymbolId, param: Param) -> Result<(), SemanticError> {
        let sym = &mut self.symbols[func.0];
        match &mut sym.kind {
            SymbolKind::Function { params, .. } if params.is_empty() => {
                params.push(param);
                Ok(())
            }
            SymbolKind::Function { .. } => Err(SemanticError::TooManyParameters { name: sym.name.clone() }),
            SymbolKind::Variable => Err(SemanticError::NotAFunction { name: sym.name.clone() }),
        }
    }

    pub fn len(&self) -> usize { self.symbols.len() }

    pub fn is_empty(&self) -> bool { self.symbols.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TY_INT;
    use pretty_assertions::assert_eq;

    #[test]
    fn builtins_are_preseeded() {
        let table = SymbolTable::with_builtins();
        let print = table.get(table.find("print").unwrap());
        assert!(print.is_builtin());
        assert_eq!(print.params()[0].ty, TY_LONG.clone());
        assert!(table.get(table.find("print_ln").unwrap()).params().is_empty());
        assert_eq!(table.find("main"), None);
    }

    #[test]
    fn redefinition_is_rejected() {
        let mut table = SymbolTable::with_builtins();
        let id = table.declare("a", SymbolKind::Variable, TY_INT.clone()).unwrap();
        assert_eq!(table.get(id).name, "a");
        assert_eq!(
            table.declare("a", SymbolKind::Variable, TY_CHAR.clone()).unwrap_err(),
            SemanticError::Redefinition { name: "a".into() }
        );
        assert_eq!(
            table.declare("print", SymbolKind::Variable, TY_INT.clone()).unwrap_err(),
            SemanticError::Redefinition { name: "print".into() }
        );
    }

    #[test]
    fn single_parameter_limit() {
        let mut table = SymbolTable::new();
        let f = table
            .declare("f", SymbolKind::Function { params: vec![], builtin: false }, TY_INT.clone())
            .unwrap();
        let x = table.declare("x", SymbolKind::Variable, TY_INT.clone()).unwrap();
        let param = Param { name: "x".into(), ty: TY_INT.clone(), storage: Some(x) };
        table.add_param(f, param.clone()).unwrap();
        assert_eq!(table.get(f).params(), &[param.clone()]);
        assert_eq!(table.add_param(f, param).unwrap_err(), SemanticError::TooManyParameters { name: "f".into() });
    }
}
