use std::collections::HashMap;

use super::{Ty, TyRef};

pub type ScopeId = usize;

/// Identifies a symbol by owning scope and slot; stable across the whole
/// pipeline, so AST and TAC refer to symbols without owning them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SymbolId {
    pub scope: ScopeId,
    pub index: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SymbolKind {
    Global,
    Local,
    Param(usize),
    Proc,
}

#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub ty: TyRef,
    /// Parameter types; meaningful for `Proc` symbols only (`ty` then holds
    /// the return type, `Null` for procedures).
    pub params: Vec<TyRef>,
    /// Runtime-provided subroutine: declared `.extern`, no code emitted.
    pub external: bool,
    /// Raw initializer bytes for string-literal globals.
    pub data: Option<Vec<u8>>,
    /// Assigned during backend frame layout, not at creation.
    pub offset: i32,
    pub base_reg: &'static str,
}

impl Symbol {
    pub fn new(name: impl Into<String>, kind: SymbolKind, ty: TyRef) -> Self {
        Self {
            name: name.into(),
            kind,
            ty,
            params: vec![],
            external: false,
            data: None,
            offset: 0,
            base_reg: "",
        }
    }

    pub fn proc(name: impl Into<String>, ret: TyRef, params: Vec<TyRef>) -> Self {
        let mut s = Self::new(name, SymbolKind::Proc, ret);
        s.params = params;
        s
    }
}

#[derive(Debug)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    /// The Proc symbol this scope implements; `None` for the module scope.
    pub owner: Option<SymbolId>,
    pub name: String,
    symbols: Vec<Symbol>,
    by_name: HashMap<String, usize>,
}

/// How far `find_symbol` searches.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Search {
    /// The given scope only; used to detect redeclarations.
    LocalOnly,
    /// The given scope, then the enclosing chain out to the global scope.
    Chain,
}

/// Arena of all scopes of one compilation. Scope 0 is the global (module)
/// scope; children hold a non-owning parent id.
#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
}

impl SymbolTable {
    pub const GLOBAL: ScopeId = 0;

    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                parent: None,
                owner: None,
                name: String::new(),
                symbols: vec![],
                by_name: HashMap::new(),
            }],
        }
    }

    pub fn push_scope(&mut self, parent: ScopeId, name: impl Into<String>) -> ScopeId {
        let id = self.scopes.len();
        self.scopes.push(Scope {
            parent: Some(parent),
            owner: None,
            name: name.into(),
            symbols: vec![],
            by_name: HashMap::new(),
        });
        id
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id]
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.scopes[id.scope].symbols[id.index]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.scopes[id.scope].symbols[id.index]
    }

    /// All symbols of one scope, in declaration order.
    pub fn symbols_of(&self, scope: ScopeId) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.scopes[scope]
            .symbols
            .iter()
            .enumerate()
            .map(move |(index, s)| (SymbolId { scope, index }, s))
    }

    /// Insert a symbol; `Err` with the clashing name when the exact scope
    /// already declares it. Shadowing an enclosing scope is not an error.
    pub fn add_symbol(&mut self, scope: ScopeId, symbol: Symbol) -> Result<SymbolId, String> {
        let s = &mut self.scopes[scope];
        if s.by_name.contains_key(&symbol.name) {
            return Err(symbol.name);
        }
        let index = s.symbols.len();
        s.by_name.insert(symbol.name.clone(), index);
        s.symbols.push(symbol);
        Ok(SymbolId { scope, index })
    }

    /// Insert a compiler-generated symbol (temporary, string literal).
    /// Generated names are unique by construction and not subject to the
    /// redeclaration check.
    pub fn add_generated(&mut self, scope: ScopeId, symbol: Symbol) -> SymbolId {
        let s = &mut self.scopes[scope];
        let index = s.symbols.len();
        s.symbols.push(symbol);
        SymbolId { scope, index }
    }

    pub fn find_symbol(&self, scope: ScopeId, name: &str, search: Search) -> Option<SymbolId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = &self.scopes[id];
            if let Some(&index) = s.by_name.get(name) {
                return Some(SymbolId { scope: id, index });
            }
            if search == Search::LocalOnly {
                return None;
            }
            current = s.parent;
        }
        None
    }

    /// Declared return type of the subroutine owning `scope`; `Null` for
    /// the module scope.
    pub fn return_type(&self, scope: ScopeId, types: &super::TypeInterner) -> TyRef {
        match self.scopes[scope].owner {
            Some(owner) => self.symbol(owner).ty.clone(),
            None => types.null(),
        }
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

/// True when a scalar of this type occupies a single byte in memory.
pub fn is_byte_sized(ty: &Ty) -> bool {
    ty.data_size() == 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::TypeInterner;

    #[test]
    fn redeclaration_in_same_scope_fails() {
        let tm = TypeInterner::new();
        let mut st = SymbolTable::new();
        st.add_symbol(
            SymbolTable::GLOBAL,
            Symbol::new("x", SymbolKind::Global, tm.int()),
        )
        .unwrap();
        let err = st.add_symbol(
            SymbolTable::GLOBAL,
            Symbol::new("x", SymbolKind::Global, tm.char()),
        );
        assert_eq!(err, Err("x".to_string()));
    }

    #[test]
    fn shadowing_resolves_to_nearest_scope() {
        let tm = TypeInterner::new();
        let mut st = SymbolTable::new();
        let outer = st
            .add_symbol(
                SymbolTable::GLOBAL,
                Symbol::new("x", SymbolKind::Global, tm.int()),
            )
            .unwrap();
        let inner_scope = st.push_scope(SymbolTable::GLOBAL, "p");
        let inner = st
            .add_symbol(inner_scope, Symbol::new("x", SymbolKind::Local, tm.char()))
            .unwrap();

        assert_eq!(st.find_symbol(inner_scope, "x", Search::Chain), Some(inner));
        assert_eq!(
            st.find_symbol(SymbolTable::GLOBAL, "x", Search::Chain),
            Some(outer)
        );
    }

    #[test]
    fn local_only_search_ignores_enclosing_scope() {
        let tm = TypeInterner::new();
        let mut st = SymbolTable::new();
        st.add_symbol(
            SymbolTable::GLOBAL,
            Symbol::new("x", SymbolKind::Global, tm.int()),
        )
        .unwrap();
        let inner = st.push_scope(SymbolTable::GLOBAL, "p");
        assert_eq!(st.find_symbol(inner, "x", Search::LocalOnly), None);
        assert!(st.find_symbol(inner, "x", Search::Chain).is_some());
    }
}
