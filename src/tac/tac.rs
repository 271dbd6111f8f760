use crate::analyzer::{ScopeId, SymbolId};
use crate::context::Context;

pub type LabelId = usize;

/// A TAC operand is a tag, not a class hierarchy: the backend switches on it
/// directly.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Operand {
    /// Value of a named or generated symbol.
    Sym(SymbolId),
    /// Value at the address held by the symbol (array element access).
    Ref(SymbolId),
    Const(i64),
    Label(LabelId),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TacOp {
    /// dest = src1
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    /// dest = -src1
    Neg,
    /// dest = address of src1 (array decay, element base)
    Address,
    /// Conditional branches: jump to `dest` when src1 <relop> src2 holds.
    /// Boolean operators never reach TAC; short-circuit lowering turns them
    /// into branch structure.
    BrEq,
    BrNe,
    BrLt,
    BrLe,
    BrGt,
    BrGe,
    Goto,
    Label,
    /// Push src1 as the argument numbered by `dest`. Parameters are emitted
    /// highest index first so the stack ends up in cdecl order.
    Param,
    /// Call src1; dest receives the return value for functions.
    Call,
    /// Return src1 (if any) and leave the subroutine.
    Return,
}

impl TacOp {
    pub fn is_branch(&self) -> bool {
        matches!(
            self,
            TacOp::BrEq | TacOp::BrNe | TacOp::BrLt | TacOp::BrLe | TacOp::BrGt | TacOp::BrGe
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Instr {
    pub op: TacOp,
    pub dest: Option<Operand>,
    pub src1: Option<Operand>,
    pub src2: Option<Operand>,
}

impl Instr {
    pub fn new(
        op: TacOp,
        dest: Option<Operand>,
        src1: Option<Operand>,
        src2: Option<Operand>,
    ) -> Self {
        Self {
            op,
            dest,
            src1,
            src2,
        }
    }

    /// Human-readable rendition for debug logging.
    pub fn render(&self, ctx: &Context) -> String {
        let p = |o: &Option<Operand>| match o {
            None => String::new(),
            Some(Operand::Sym(s)) => ctx.symbols.symbol(*s).name.clone(),
            Some(Operand::Ref(s)) => format!("*{}", ctx.symbols.symbol(*s).name),
            Some(Operand::Const(c)) => c.to_string(),
            Some(Operand::Label(l)) => format!("L{}", l),
        };
        format!(
            "{:?} {} {} {}",
            self.op,
            p(&self.dest),
            p(&self.src1),
            p(&self.src2)
        )
    }
}

/// The lowered body of one scope, in source order: subroutines first, the
/// module body last.
#[derive(Debug)]
pub struct LoweredScope {
    pub scope: ScopeId,
    pub instrs: Vec<Instr>,
}
