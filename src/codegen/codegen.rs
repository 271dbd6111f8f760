use std::fmt::{self, Write};

use crate::analyzer::{is_byte_sized, ScopeId, SymbolId, SymbolKind, SymbolTable, Ty};
use crate::context::Context;
use crate::lexer::escape;
use crate::parser::Module;
use crate::tac::{Instr, LoweredScope, Operand, TacOp};

/// Bytes a callee-saved register spill occupies below the saved %ebp
/// (%ebx, %esi, %edi). Locals start below this.
const SAVED_REGS: i32 = 12;

/// Emit 32-bit x86 (AT&T syntax) for the lowered scopes. Subroutines are
/// emitted in order; the module body becomes `main`.
pub fn emit(ctx: &mut Context, module: &Module, scopes: &[LoweredScope]) -> String {
    let mut cg = Codegen {
        ctx,
        module_name: module.name.clone(),
        out: String::new(),
    };
    // Writing into a String cannot fail.
    let _ = cg.run(scopes);
    cg.out
}

struct Codegen<'a> {
    ctx: &'a mut Context,
    module_name: String,
    out: String,
}

impl Codegen<'_> {
    fn run(&mut self, scopes: &[LoweredScope]) -> fmt::Result {
        writeln!(self.out, "# module {}", self.module_name)?;
        writeln!(self.out)?;
        writeln!(self.out, "\t.text")?;
        writeln!(self.out, "\t.align 4")?;
        writeln!(self.out)?;

        let externs: Vec<String> = self
            .ctx
            .symbols
            .symbols_of(SymbolTable::GLOBAL)
            .filter(|(_, s)| s.kind == SymbolKind::Proc && s.external)
            .map(|(_, s)| s.name.clone())
            .collect();
        for name in externs {
            writeln!(self.out, "\t.extern {}", name)?;
        }
        writeln!(self.out)?;
        writeln!(self.out, "\t.global main")?;

        for scope in scopes {
            self.emit_scope(scope)?;
        }

        self.emit_data()?;
        writeln!(self.out)?;
        writeln!(self.out, "\t.end")?;
        Ok(())
    }

    /// Label prefix of a scope: the subroutine name, or the module name for
    /// the module body.
    fn prefix(&self, scope: ScopeId) -> String {
        if scope == SymbolTable::GLOBAL {
            self.module_name.clone()
        } else {
            self.ctx.symbols.scope(scope).name.clone()
        }
    }

    fn emit_scope(&mut self, lowered: &LoweredScope) -> fmt::Result {
        let scope = lowered.scope;
        let prefix = self.prefix(scope);
        let fn_name = if scope == SymbolTable::GLOBAL {
            "main".to_string()
        } else {
            prefix.clone()
        };

        let frame = self.compute_stack_offsets(scope);

        writeln!(self.out)?;
        writeln!(self.out, "# scope {}", prefix)?;
        writeln!(self.out, "{}:", fn_name)?;

        // prologue
        writeln!(self.out, "\tpushl\t%ebp")?;
        writeln!(self.out, "\tmovl\t%esp, %ebp")?;
        writeln!(self.out, "\tpushl\t%ebx")?;
        writeln!(self.out, "\tpushl\t%esi")?;
        writeln!(self.out, "\tpushl\t%edi")?;
        if frame > 0 {
            writeln!(self.out, "\tsubl\t${}, %esp", frame)?;
        }
        self.emit_zero_init(frame)?;
        self.emit_local_array_headers(scope)?;

        for instr in &lowered.instrs {
            self.emit_instr(&prefix, instr)?;
        }

        // epilogue
        writeln!(self.out, "l_{}_exit:", prefix)?;
        if frame > 0 {
            writeln!(self.out, "\taddl\t${}, %esp", frame)?;
        }
        writeln!(self.out, "\tpopl\t%edi")?;
        writeln!(self.out, "\tpopl\t%esi")?;
        writeln!(self.out, "\tpopl\t%ebx")?;
        writeln!(self.out, "\tpopl\t%ebp")?;
        writeln!(self.out, "\tret")?;
        Ok(())
    }

    /// Assign frame offsets: parameters sit above the saved %ebp and return
    /// address at `8 + 4*index`; locals and temporaries grow downward from
    /// just below the callee-saved registers. Returns the local area size,
    /// rounded up to a word.
    fn compute_stack_offsets(&mut self, scope: ScopeId) -> i32 {
        let ids: Vec<SymbolId> = self.ctx.symbols.symbols_of(scope).map(|(id, _)| id).collect();
        let mut offset = -SAVED_REGS;
        for id in ids {
            let sym = self.ctx.symbols.symbol_mut(id);
            match sym.kind {
                SymbolKind::Param(index) => {
                    sym.offset = 8 + 4 * index as i32;
                    sym.base_reg = "%ebp";
                }
                SymbolKind::Local => {
                    let size = sym.ty.size() as i32;
                    if sym.ty.align() == 4 {
                        offset = (offset - size) & !3;
                    } else {
                        offset -= size;
                    }
                    sym.offset = offset;
                    sym.base_reg = "%ebp";
                }
                SymbolKind::Global | SymbolKind::Proc => {}
            }
        }
        ((-offset - SAVED_REGS) + 3) & !3
    }

    /// Clear the local area so temporaries and locals start from zero.
    /// Large areas use `rep stosl`; small ones an unrolled store sequence.
    fn emit_zero_init(&mut self, frame: i32) -> fmt::Result {
        if frame == 0 {
            return Ok(());
        }
        let low = -SAVED_REGS - frame;
        if frame >= 20 {
            writeln!(self.out, "\tcld")?;
            writeln!(self.out, "\txorl\t%eax, %eax")?;
            writeln!(self.out, "\tmovl\t${}, %ecx", frame / 4)?;
            writeln!(self.out, "\tleal\t{}(%ebp), %edi", low)?;
            writeln!(self.out, "\trep\tstosl")?;
        } else {
            let mut off = low;
            while off < -SAVED_REGS {
                writeln!(self.out, "\tmovl\t$0, {}(%ebp)", off)?;
                off += 4;
            }
        }
        Ok(())
    }

    /// Write the dimension headers of local arrays: the dimension count,
    /// then one extent word per dimension, at the start of the slot.
    fn emit_local_array_headers(&mut self, scope: ScopeId) -> fmt::Result {
        let arrays: Vec<(i32, Vec<usize>)> = self
            .ctx
            .symbols
            .symbols_of(scope)
            .filter(|(_, s)| s.kind == SymbolKind::Local && s.ty.is_array())
            .map(|(_, s)| (s.offset, extents(&s.ty)))
            .collect();
        for (offset, dims) in arrays {
            writeln!(self.out, "\tmovl\t${}, {}(%ebp)", dims.len(), offset)?;
            for (d, extent) in dims.iter().enumerate() {
                writeln!(
                    self.out,
                    "\tmovl\t${}, {}(%ebp)",
                    extent,
                    offset + 4 * (d as i32 + 1)
                )?;
            }
        }
        Ok(())
    }

    fn emit_instr(&mut self, prefix: &str, instr: &Instr) -> fmt::Result {
        let comment = instr.render(self.ctx);
        match instr.op {
            TacOp::Label => {
                let Some(Operand::Label(l)) = instr.dest else {
                    return Ok(());
                };
                writeln!(self.out, "l_{}_{}:", prefix, l)?;
                return Ok(());
            }
            TacOp::Goto => {
                let Some(Operand::Label(l)) = instr.dest else {
                    return Ok(());
                };
                writeln!(self.out, "\tjmp\tl_{}_{}", prefix, l)?;
                return Ok(());
            }
            _ => {}
        }
        writeln!(self.out, "\t# {}", comment)?;

        match instr.op {
            TacOp::Assign => {
                self.load(instr.src1.as_ref(), "%eax")?;
                self.store(instr.dest.as_ref(), "%eax")?;
            }
            TacOp::Add | TacOp::Sub | TacOp::Mul | TacOp::Div => {
                self.load(instr.src1.as_ref(), "%eax")?;
                self.load(instr.src2.as_ref(), "%ebx")?;
                match instr.op {
                    TacOp::Add => writeln!(self.out, "\taddl\t%ebx, %eax")?,
                    TacOp::Sub => writeln!(self.out, "\tsubl\t%ebx, %eax")?,
                    TacOp::Mul => writeln!(self.out, "\timull\t%ebx")?,
                    TacOp::Div => {
                        writeln!(self.out, "\tcdq")?;
                        writeln!(self.out, "\tidivl\t%ebx")?;
                    }
                    _ => {}
                }
                self.store(instr.dest.as_ref(), "%eax")?;
            }
            TacOp::Neg => {
                self.load(instr.src1.as_ref(), "%eax")?;
                writeln!(self.out, "\tnegl\t%eax")?;
                self.store(instr.dest.as_ref(), "%eax")?;
            }
            TacOp::Address => {
                let Some(Operand::Sym(sym)) = instr.src1 else {
                    return Ok(());
                };
                let loc = self.loc(sym);
                writeln!(self.out, "\tleal\t{}, %eax", loc)?;
                self.store(instr.dest.as_ref(), "%eax")?;
            }
            TacOp::BrEq | TacOp::BrNe | TacOp::BrLt | TacOp::BrLe | TacOp::BrGt | TacOp::BrGe => {
                self.load(instr.src1.as_ref(), "%eax")?;
                self.load(instr.src2.as_ref(), "%ebx")?;
                writeln!(self.out, "\tcmpl\t%ebx, %eax")?;
                let cc = match instr.op {
                    TacOp::BrEq => "e",
                    TacOp::BrNe => "ne",
                    TacOp::BrLt => "l",
                    TacOp::BrLe => "le",
                    TacOp::BrGt => "g",
                    _ => "ge",
                };
                let Some(Operand::Label(l)) = instr.dest else {
                    return Ok(());
                };
                writeln!(self.out, "\tj{}\tl_{}_{}", cc, prefix, l)?;
            }
            TacOp::Param => {
                self.load(instr.src1.as_ref(), "%eax")?;
                writeln!(self.out, "\tpushl\t%eax")?;
            }
            TacOp::Call => {
                let Some(Operand::Sym(callee)) = instr.src1 else {
                    return Ok(());
                };
                let sym = self.ctx.symbols.symbol(callee);
                let name = sym.name.clone();
                let nargs = sym.params.len();
                writeln!(self.out, "\tcall\t{}", name)?;
                if nargs > 0 {
                    writeln!(self.out, "\taddl\t${}, %esp", 4 * nargs)?;
                }
                if instr.dest.is_some() {
                    self.store(instr.dest.as_ref(), "%eax")?;
                }
            }
            TacOp::Return => {
                if instr.src1.is_some() {
                    self.load(instr.src1.as_ref(), "%eax")?;
                }
                writeln!(self.out, "\tjmp\tl_{}_exit", prefix)?;
            }
            TacOp::Label | TacOp::Goto => {}
        }
        Ok(())
    }

    /// Addressable location of a symbol: frame slot for locals and
    /// parameters, its label for module-level data.
    fn loc(&self, id: SymbolId) -> String {
        let sym = self.ctx.symbols.symbol(id);
        match sym.kind {
            SymbolKind::Global => sym.name.clone(),
            _ => format!("{}({})", sym.offset, sym.base_reg),
        }
    }

    /// Load an operand into a full register. Byte-sized storage is widened
    /// with movzbl; `Ref` operands dereference through %edi.
    fn load(&mut self, op: Option<&Operand>, reg: &str) -> fmt::Result {
        match op {
            Some(Operand::Const(v)) => writeln!(self.out, "\tmovl\t${}, {}", v, reg),
            Some(Operand::Sym(id)) => {
                let loc = self.loc(*id);
                if is_byte_sized(&self.ctx.symbols.symbol(*id).ty) {
                    writeln!(self.out, "\tmovzbl\t{}, {}", loc, reg)
                } else {
                    writeln!(self.out, "\tmovl\t{}, {}", loc, reg)
                }
            }
            Some(Operand::Ref(id)) => {
                let loc = self.loc(*id);
                writeln!(self.out, "\tmovl\t{}, %edi", loc)?;
                if self.points_at_byte(*id) {
                    writeln!(self.out, "\tmovzbl\t(%edi), {}", reg)
                } else {
                    writeln!(self.out, "\tmovl\t(%edi), {}", reg)
                }
            }
            _ => Ok(()),
        }
    }

    /// Store %eax (or its low byte) into the destination operand.
    fn store(&mut self, op: Option<&Operand>, reg: &str) -> fmt::Result {
        let byte_reg = if reg == "%eax" { "%al" } else { "%bl" };
        match op {
            Some(Operand::Sym(id)) => {
                let loc = self.loc(*id);
                if is_byte_sized(&self.ctx.symbols.symbol(*id).ty) {
                    writeln!(self.out, "\tmovb\t{}, {}", byte_reg, loc)
                } else {
                    writeln!(self.out, "\tmovl\t{}, {}", reg, loc)
                }
            }
            Some(Operand::Ref(id)) => {
                let loc = self.loc(*id);
                writeln!(self.out, "\tmovl\t{}, %edi", loc)?;
                if self.points_at_byte(*id) {
                    writeln!(self.out, "\tmovb\t{}, (%edi)", byte_reg)
                } else {
                    writeln!(self.out, "\tmovl\t{}, (%edi)", reg)
                }
            }
            _ => Ok(()),
        }
    }

    /// Whether the pointer held by this symbol addresses byte-sized storage.
    fn points_at_byte(&self, id: SymbolId) -> bool {
        match &*self.ctx.symbols.symbol(id).ty {
            Ty::Ptr(inner) => is_byte_sized(inner),
            _ => false,
        }
    }

    /// Module-level variables and interned string literals. Arrays carry
    /// their dimension header in front of the payload.
    fn emit_data(&mut self) -> fmt::Result {
        let globals: Vec<(String, std::rc::Rc<Ty>, Option<Vec<u8>>)> = self
            .ctx
            .symbols
            .symbols_of(SymbolTable::GLOBAL)
            .filter(|(_, s)| s.kind == SymbolKind::Global)
            .map(|(_, s)| (s.name.clone(), s.ty.clone(), s.data.clone()))
            .collect();
        if globals.is_empty() {
            return Ok(());
        }

        writeln!(self.out)?;
        writeln!(self.out, "\t.data")?;
        writeln!(self.out, "\t.align 4")?;
        writeln!(self.out)?;

        for (name, ty, data) in globals {
            if ty.is_array() {
                let dims = extents(&ty);
                writeln!(self.out, "{}:\t.long {}", name, dims.len())?;
                for extent in &dims {
                    writeln!(self.out, "\t.long {}", extent)?;
                }
                match data {
                    Some(bytes) => writeln!(self.out, "\t.asciz \"{}\"", escape(&bytes))?,
                    None => writeln!(self.out, "\t.skip {}", ty.data_size())?,
                }
            } else {
                writeln!(self.out, "{}:\t.skip {}", name, ty.size().max(1))?;
            }
            writeln!(self.out, "\t.align 4")?;
        }
        Ok(())
    }
}

/// Static extents of an array type, outermost dimension first.
fn extents(ty: &Ty) -> Vec<usize> {
    let mut dims = vec![];
    let mut t = ty;
    while let Ty::Array(n, inner) = t {
        dims.push(n.unwrap_or(0));
        t = inner;
    }
    dims
}
