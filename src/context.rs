use crate::analyzer::{Symbol, SymbolKind, SymbolTable, TypeInterner};

/// Everything one compilation owns: the type intern table, the scope tree,
/// and the string-literal counter. Constructed fresh per `compile()`
/// invocation so no state leaks between compilations.
#[derive(Debug)]
pub struct Context {
    pub types: TypeInterner,
    pub symbols: SymbolTable,
    str_index: usize,
}

impl Context {
    pub fn new() -> Self {
        let mut ctx = Self {
            types: TypeInterner::new(),
            symbols: SymbolTable::new(),
            str_index: 0,
        };
        ctx.install_runtime();
        ctx
    }

    /// Register the external runtime entry points in the global scope so
    /// calls to them resolve like ordinary subroutines. Their code is
    /// supplied by the runtime; the backend only declares them `.extern`.
    fn install_runtime(&mut self) {
        let tm = &self.types;
        let any_ptr = tm.pointer(tm.null());
        let char_arr = tm.pointer(tm.array(None, tm.char()));

        let runtime = [
            Symbol::proc("DIM", tm.int(), vec![any_ptr.clone(), tm.int()]),
            Symbol::proc("DOFS", tm.int(), vec![any_ptr]),
            Symbol::proc("ReadInt", tm.int(), vec![]),
            Symbol::proc("WriteInt", tm.null(), vec![tm.int()]),
            Symbol::proc("WriteStr", tm.null(), vec![char_arr]),
            Symbol::proc("WriteChar", tm.null(), vec![tm.char()]),
            Symbol::proc("WriteLn", tm.null(), vec![]),
        ];

        for mut sym in runtime {
            sym.external = true;
            self.symbols
                .add_symbol(SymbolTable::GLOBAL, sym)
                .expect("runtime symbols are installed once");
        }
    }

    /// Intern a string literal as a global `char[len+1]` carrying its
    /// initializer bytes; returns the generated symbol.
    pub fn add_string_literal(&mut self, bytes: &[u8]) -> crate::analyzer::SymbolId {
        self.str_index += 1;
        let ty = self
            .types
            .array(Some(bytes.len() + 1), self.types.char());
        let mut sym = Symbol::new(
            format!("_str_{}", self.str_index),
            SymbolKind::Global,
            ty,
        );
        sym.data = Some(bytes.to_vec());
        self.symbols.add_generated(SymbolTable::GLOBAL, sym)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
