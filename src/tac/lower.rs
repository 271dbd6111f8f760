use crate::analyzer::{
    designator_ty, ScopeId, Search, Symbol, SymbolId, SymbolKind, SymbolTable, Ty, TyRef,
};
use crate::context::Context;
use crate::parser::{BinOp, CallExpr, Designator, Expr, Module, Stmt, UnOp};

use super::{Instr, LabelId, LoweredScope, Operand, TacOp};

/// Lower a checked module to TAC, one instruction list per scope.
/// Subroutines come first, the module body last, matching emission order in
/// the backend.
pub fn lower_module(ctx: &mut Context, module: &Module) -> Vec<LoweredScope> {
    let mut out = vec![];
    for sub in &module.subroutines {
        out.push(lower_scope(ctx, sub.scope, &sub.body));
    }
    out.push(lower_scope(ctx, module.scope, &module.body));
    out
}

fn lower_scope(ctx: &mut Context, scope: ScopeId, body: &[Stmt]) -> LoweredScope {
    let mut lowerer = Lowerer {
        ctx,
        scope,
        instrs: vec![],
        next_label: 0,
        temp_index: 0,
    };
    lowerer.lower_stmts(body);
    LoweredScope {
        scope,
        instrs: lowerer.instrs,
    }
}

struct Lowerer<'a> {
    ctx: &'a mut Context,
    scope: ScopeId,
    instrs: Vec<Instr>,
    next_label: LabelId,
    temp_index: usize,
}

impl Lowerer<'_> {
    fn emit(&mut self, op: TacOp, dest: Option<Operand>, src1: Option<Operand>, src2: Option<Operand>) {
        self.instrs.push(Instr::new(op, dest, src1, src2));
    }

    fn new_label(&mut self) -> LabelId {
        let l = self.next_label;
        self.next_label += 1;
        l
    }

    fn place_label(&mut self, l: LabelId) {
        self.emit(TacOp::Label, Some(Operand::Label(l)), None, None);
    }

    fn goto(&mut self, l: LabelId) {
        self.emit(TacOp::Goto, Some(Operand::Label(l)), None, None);
    }

    /// Temporaries are ordinary generated locals of the scope; the backend
    /// assigns them frame slots like declared variables.
    fn new_temp(&mut self, ty: TyRef) -> SymbolId {
        self.temp_index += 1;
        let name = format!("t{}", self.temp_index);
        self.ctx
            .symbols
            .add_generated(self.scope, Symbol::new(name, SymbolKind::Local, ty))
    }

    fn lower_stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.lower_stmt(stmt);
        }
    }

    fn lower_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Assign { lhs, rhs, .. } => {
                let value = self.expr_value(rhs);
                if lhs.indices.is_empty() {
                    self.emit(TacOp::Assign, Some(Operand::Sym(lhs.sym)), Some(value), None);
                } else {
                    let addr = self.element_addr(lhs);
                    self.emit(TacOp::Assign, Some(Operand::Ref(addr)), Some(value), None);
                }
            }
            Stmt::Call(call) => {
                self.lower_call(call);
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
                ..
            } => {
                let lt = self.new_label();
                let lf = self.new_label();
                let lend = self.new_label();
                self.expr_cond(cond, lt, lf);
                self.place_label(lt);
                self.lower_stmts(then_body);
                self.goto(lend);
                self.place_label(lf);
                self.lower_stmts(else_body);
                self.place_label(lend);
            }
            Stmt::While { cond, body, .. } => {
                let lcond = self.new_label();
                let lbody = self.new_label();
                let lend = self.new_label();
                self.place_label(lcond);
                self.expr_cond(cond, lbody, lend);
                self.place_label(lbody);
                self.lower_stmts(body);
                self.goto(lcond);
                self.place_label(lend);
            }
            Stmt::Return { value, .. } => {
                let v = value.as_ref().map(|v| self.expr_value(v));
                self.emit(TacOp::Return, None, v, None);
            }
        }
    }

    /// Evaluate an expression for its value. Boolean-typed operator trees go
    /// through the two-label protocol and come back as a 0/1 temporary;
    /// plain boolean storage reads stay direct loads.
    fn expr_value(&mut self, expr: &Expr) -> Operand {
        match expr {
            Expr::IntConst { value, .. } => Operand::Const(*value),
            Expr::BoolConst { value, .. } => Operand::Const(*value as i64),
            Expr::CharConst { value, .. } => Operand::Const(*value as i64),
            Expr::StrConst { sym, .. } => {
                let ty = self.ctx.symbols.symbol(*sym).ty.clone();
                let t = self.new_temp(self.ctx.types.pointer(ty));
                self.emit(TacOp::Address, Some(Operand::Sym(t)), Some(Operand::Sym(*sym)), None);
                Operand::Sym(t)
            }
            Expr::Designator(d) => self.designator_value(d),
            Expr::Call(c) => self
                .lower_call(c)
                .unwrap_or(Operand::Const(0)),
            Expr::Unary { op, operand, .. } => match op {
                UnOp::Pos => self.expr_value(operand),
                UnOp::Neg => {
                    if let Expr::IntConst { value, .. } = &**operand {
                        return Operand::Const(-value);
                    }
                    let v = self.expr_value(operand);
                    let t = self.new_temp(self.ctx.types.int());
                    self.emit(TacOp::Neg, Some(Operand::Sym(t)), Some(v), None);
                    Operand::Sym(t)
                }
                UnOp::Not => self.materialize_bool(expr),
            },
            Expr::Binary { op, lhs, rhs, .. } => {
                if op.is_relational() || op.is_logical() {
                    return self.materialize_bool(expr);
                }
                let l = self.expr_value(lhs);
                let r = self.expr_value(rhs);
                let t = self.new_temp(self.ctx.types.int());
                let tac = match op {
                    BinOp::Add => TacOp::Add,
                    BinOp::Sub => TacOp::Sub,
                    BinOp::Mul => TacOp::Mul,
                    BinOp::Div => TacOp::Div,
                    _ => unreachable!("handled above"),
                };
                self.emit(tac, Some(Operand::Sym(t)), Some(l), Some(r));
                Operand::Sym(t)
            }
        }
    }

    /// Two-label protocol, value position: run the condition into a fresh
    /// boolean temporary holding 1 or 0.
    fn materialize_bool(&mut self, expr: &Expr) -> Operand {
        let t = self.new_temp(self.ctx.types.boolean());
        let lt = self.new_label();
        let lf = self.new_label();
        let lend = self.new_label();
        self.expr_cond(expr, lt, lf);
        self.place_label(lt);
        self.emit(TacOp::Assign, Some(Operand::Sym(t)), Some(Operand::Const(1)), None);
        self.goto(lend);
        self.place_label(lf);
        self.emit(TacOp::Assign, Some(Operand::Sym(t)), Some(Operand::Const(0)), None);
        self.place_label(lend);
        Operand::Sym(t)
    }

    /// Two-label protocol, branch position: evaluate `expr` as control flow
    /// ending in a jump to `ltrue` or `lfalse`. `&&` and `||` short-circuit
    /// here without ever producing a boolean value.
    fn expr_cond(&mut self, expr: &Expr, ltrue: LabelId, lfalse: LabelId) {
        match expr {
            Expr::Binary {
                op: BinOp::And,
                lhs,
                rhs,
                ..
            } => {
                let lmid = self.new_label();
                self.expr_cond(lhs, lmid, lfalse);
                self.place_label(lmid);
                self.expr_cond(rhs, ltrue, lfalse);
            }
            Expr::Binary {
                op: BinOp::Or,
                lhs,
                rhs,
                ..
            } => {
                let lmid = self.new_label();
                self.expr_cond(lhs, ltrue, lmid);
                self.place_label(lmid);
                self.expr_cond(rhs, ltrue, lfalse);
            }
            Expr::Binary { op, lhs, rhs, .. } if op.is_relational() => {
                let l = self.expr_value(lhs);
                let r = self.expr_value(rhs);
                let tac = match op {
                    BinOp::Equal => TacOp::BrEq,
                    BinOp::NotEqual => TacOp::BrNe,
                    BinOp::LessThan => TacOp::BrLt,
                    BinOp::LessEqual => TacOp::BrLe,
                    BinOp::GreaterThan => TacOp::BrGt,
                    BinOp::GreaterEqual => TacOp::BrGe,
                    _ => unreachable!("guard checked relational"),
                };
                self.emit(tac, Some(Operand::Label(ltrue)), Some(l), Some(r));
                self.goto(lfalse);
            }
            Expr::Unary {
                op: UnOp::Not,
                operand,
                ..
            } => self.expr_cond(operand, lfalse, ltrue),
            Expr::BoolConst { value, .. } => {
                self.goto(if *value { ltrue } else { lfalse });
            }
            // Boolean storage reads and function results: compare with 1.
            _ => {
                let v = self.expr_value(expr);
                self.emit(
                    TacOp::BrEq,
                    Some(Operand::Label(ltrue)),
                    Some(v),
                    Some(Operand::Const(1)),
                );
                self.goto(lfalse);
            }
        }
    }

    fn designator_value(&mut self, d: &Designator) -> Operand {
        let ty = designator_ty(self.ctx, d);
        if d.indices.is_empty() {
            // Whole arrays only occur as call arguments; they decay to the
            // address of the dimension header.
            if ty.is_array() {
                let t = self.new_temp(self.ctx.types.pointer(ty));
                self.emit(TacOp::Address, Some(Operand::Sym(t)), Some(Operand::Sym(d.sym)), None);
                return Operand::Sym(t);
            }
            return Operand::Sym(d.sym);
        }
        let addr = self.element_addr(d);
        // A partially indexed array denotes the subarray; its value is the
        // subarray's data address, not a load through it.
        if ty.is_array() {
            return Operand::Sym(addr);
        }
        Operand::Ref(addr)
    }

    /// Address of the element (or subarray) a designator names. The data
    /// region starts `4 * (ndim + 1)` bytes past the header; indices are
    /// linearized left-to-right, reading extents from the type when static
    /// and from the runtime `DIM` call when open.
    fn element_addr(&mut self, d: &Designator) -> SymbolId {
        let sym_ty = self.ctx.symbols.symbol(d.sym).ty.clone();
        let (arr_ty, base) = if let Ty::Ptr(inner) = &*sym_ty {
            (inner.clone(), Operand::Sym(d.sym))
        } else {
            let t = self.new_temp(self.ctx.types.pointer(sym_ty.clone()));
            self.emit(TacOp::Address, Some(Operand::Sym(t)), Some(Operand::Sym(d.sym)), None);
            (sym_ty, Operand::Sym(t))
        };
        let ndim = arr_ty.ndim();

        let mut acc = self.expr_value(&d.indices[0]);
        let mut cur = arr_ty.clone();
        for (k, index) in d.indices.iter().enumerate().skip(1) {
            cur = cur.inner().unwrap_or_else(|| self.ctx.types.null());
            let extent = match &*cur {
                Ty::Array(Some(n), _) => Operand::Const(*n as i64),
                _ => self.call_dim(base, k + 1),
            };
            acc = self.arith(TacOp::Mul, acc, extent);
            let i = self.expr_value(index);
            acc = self.arith(TacOp::Add, acc, i);
        }

        let mut applied = arr_ty;
        for _ in &d.indices {
            applied = applied.inner().unwrap_or_else(|| self.ctx.types.null());
        }
        let scaled = self.arith(TacOp::Mul, acc, Operand::Const(applied.data_size() as i64));
        let offset = self.arith(
            TacOp::Add,
            Operand::Const(4 * (ndim as i64 + 1)),
            scaled,
        );

        let addr = self.new_temp(self.ctx.types.pointer(applied));
        self.emit(TacOp::Add, Some(Operand::Sym(addr)), Some(base), Some(offset));
        addr
    }

    /// Integer arithmetic helper for address computation: folds constant
    /// operands so static indices reduce to a single immediate offset.
    fn arith(&mut self, op: TacOp, a: Operand, b: Operand) -> Operand {
        match (op, a, b) {
            (TacOp::Add, Operand::Const(x), Operand::Const(y)) => Operand::Const(x + y),
            (TacOp::Mul, Operand::Const(x), Operand::Const(y)) => Operand::Const(x * y),
            (TacOp::Add, v, Operand::Const(0)) | (TacOp::Add, Operand::Const(0), v) => v,
            (TacOp::Mul, v, Operand::Const(1)) | (TacOp::Mul, Operand::Const(1), v) => v,
            _ => {
                let t = self.new_temp(self.ctx.types.int());
                self.emit(op, Some(Operand::Sym(t)), Some(a), Some(b));
                Operand::Sym(t)
            }
        }
    }

    /// Runtime extent query: `DIM(base, dim)` with 1-based `dim`.
    fn call_dim(&mut self, base: Operand, dim: usize) -> Operand {
        let dim_sym = self
            .ctx
            .symbols
            .find_symbol(SymbolTable::GLOBAL, "DIM", Search::LocalOnly)
            .expect("runtime symbols are installed at context creation");
        let t = self.new_temp(self.ctx.types.int());
        self.emit(TacOp::Param, Some(Operand::Const(1)), Some(Operand::Const(dim as i64)), None);
        self.emit(TacOp::Param, Some(Operand::Const(0)), Some(base), None);
        self.emit(TacOp::Call, Some(Operand::Sym(t)), Some(Operand::Sym(dim_sym)), None);
        Operand::Sym(t)
    }

    /// Arguments evaluate left-to-right; Param instructions then come out
    /// highest index first so pushes land in cdecl order.
    fn lower_call(&mut self, call: &CallExpr) -> Option<Operand> {
        let args: Vec<Operand> = call.args.iter().map(|a| self.expr_value(a)).collect();
        for (i, arg) in args.into_iter().enumerate().rev() {
            self.emit(TacOp::Param, Some(Operand::Const(i as i64)), Some(arg), None);
        }

        let ret = self.ctx.symbols.symbol(call.sym).ty.clone();
        let dest = if *ret == Ty::Null {
            None
        } else {
            Some(Operand::Sym(self.new_temp(ret)))
        };
        self.emit(TacOp::Call, dest, Some(Operand::Sym(call.sym)), None);
        dest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::check_module;
    use crate::lexer::Scanner;
    use crate::parser::Parser;

    fn lower(input: &str) -> (Vec<LoweredScope>, Context) {
        let mut ctx = Context::new();
        let module = Parser::new(Scanner::tokenize(input), &mut ctx).parse().unwrap();
        check_module(&ctx, &module).unwrap();
        let scopes = lower_module(&mut ctx, &module);
        (scopes, ctx)
    }

    fn wrap(decls: &str, stmt: &str) -> String {
        format!("module t; {} begin {} end t.", decls, stmt)
    }

    fn ops(scope: &LoweredScope) -> Vec<TacOp> {
        scope.instrs.iter().map(|i| i.op).collect()
    }

    #[test]
    fn arithmetic_is_lowered_inner_first() {
        let (scopes, _) = lower(&wrap("var x: integer;", "x := 2 + 3 * 4"));
        let body = &scopes[0];
        assert_eq!(ops(body), vec![TacOp::Mul, TacOp::Add, TacOp::Assign]);
        // The Add consumes the Mul's temporary.
        let mul_dest = body.instrs[0].dest;
        assert_eq!(body.instrs[1].src2, mul_dest);
    }

    #[test]
    fn while_condition_short_circuits_without_a_boolean_temp() {
        let (scopes, ctx) = lower(&wrap(
            "var a, b: boolean;",
            "while (a && b) do a := false end",
        ));
        let body = &scopes[0];
        // Two conditional branches, one per operand, and no generated
        // temporary holding a boolean value.
        let branches = body.instrs.iter().filter(|i| i.op.is_branch()).count();
        assert_eq!(branches, 2);
        let generated = ctx
            .symbols
            .symbols_of(SymbolTable::GLOBAL)
            .filter(|(_, s)| s.name.starts_with('t') && s.name[1..].parse::<u32>().is_ok())
            .count();
        assert_eq!(generated, 0);
    }

    #[test]
    fn relational_in_value_position_materializes_zero_or_one() {
        let (scopes, _) = lower(&wrap("var b: boolean; x: integer;", "b := x < 1"));
        let body = &scopes[0];
        assert!(body.instrs.iter().any(|i| i.op == TacOp::BrLt));
        let stores: Vec<_> = body
            .instrs
            .iter()
            .filter(|i| i.op == TacOp::Assign && matches!(i.src1, Some(Operand::Const(0 | 1))))
            .collect();
        assert_eq!(stores.len(), 2);
    }

    #[test]
    fn static_array_index_folds_to_an_immediate_offset() {
        let (scopes, _) = lower(&wrap(
            "var a: integer[5]; x: integer;",
            "x := a[3]",
        ));
        let body = &scopes[0];
        // header 4*(1+1) = 8, plus 3*4 = 12.
        assert_eq!(ops(body), vec![TacOp::Address, TacOp::Add, TacOp::Assign]);
        assert_eq!(body.instrs[1].src2, Some(Operand::Const(20)));
    }

    #[test]
    fn open_array_extent_comes_from_the_runtime() {
        let (scopes, ctx) = lower(
            "module t; var m: integer[3][4]; \
             procedure p(v: integer[][]); var x: integer; begin x := v[1][2] end p; \
             begin p(m) end t.",
        );
        let p = &scopes[0];
        let calls: Vec<_> = p.instrs.iter().filter(|i| i.op == TacOp::Call).collect();
        assert_eq!(calls.len(), 1);
        let Some(Operand::Sym(callee)) = calls[0].src1 else {
            panic!("call without a callee");
        };
        assert_eq!(ctx.symbols.symbol(callee).name, "DIM");
    }

    #[test]
    fn concrete_array_parameter_indexes_through_the_pointer() {
        let (scopes, ctx) = lower(
            "module t; var a: integer[5]; \
             procedure p(v: integer[5]); begin v[0] := 1 end p; \
             begin p(a) end t.",
        );
        let p = &scopes[0];
        // The parameter slot already holds the array's header address, so
        // the callee never takes the address of the slot itself.
        assert!(p.instrs.iter().all(|i| i.op != TacOp::Address));
        let add = &p.instrs[0];
        assert_eq!(add.op, TacOp::Add);
        let param = ctx.symbols.find_symbol(p.scope, "v", Search::LocalOnly).unwrap();
        assert_eq!(add.src1, Some(Operand::Sym(param)));
        assert_eq!(add.src2, Some(Operand::Const(8)));
        // The caller passes the header address.
        let main = &scopes[1];
        assert!(main.instrs.iter().any(|i| i.op == TacOp::Address));
    }

    #[test]
    fn subarray_argument_passes_its_address() {
        let (scopes, ctx) = lower(
            "module t; var m: integer[3][4]; x: integer; \
             function sum(v: integer[]): integer; begin return 0 end sum; \
             begin x := sum(m[1]) end t.",
        );
        let main = &scopes[1];
        let param = main
            .instrs
            .iter()
            .find(|i| i.op == TacOp::Param)
            .unwrap();
        let Some(Operand::Sym(arg)) = param.src1 else {
            panic!("expected the subarray address, got {:?}", param.src1);
        };
        assert!(ctx.symbols.symbol(arg).ty.is_pointer());
    }

    #[test]
    fn params_are_emitted_highest_index_first() {
        let (scopes, _) = lower(
            "module t; procedure p(a, b: integer); begin end p; \
             begin p(1, 2) end t.",
        );
        let body = &scopes[1];
        let params: Vec<_> = body
            .instrs
            .iter()
            .filter(|i| i.op == TacOp::Param)
            .map(|i| (i.dest, i.src1))
            .collect();
        assert_eq!(
            params,
            vec![
                (Some(Operand::Const(1)), Some(Operand::Const(2))),
                (Some(Operand::Const(0)), Some(Operand::Const(1))),
            ]
        );
    }

    #[test]
    fn negated_minimum_integer_folds_to_a_constant() {
        let (scopes, _) = lower(&wrap("var x: integer;", "x := -2147483648"));
        let body = &scopes[0];
        assert_eq!(
            body.instrs[0],
            Instr::new(
                TacOp::Assign,
                Some(Operand::Sym(SymbolId { scope: 0, index: 7 })),
                Some(Operand::Const(-2147483648)),
                None
            )
        );
    }

    #[test]
    fn subroutine_scopes_come_before_the_module_scope() {
        let (scopes, _) = lower(
            "module t; procedure p(); begin end p; begin end t.",
        );
        assert_eq!(scopes.len(), 2);
        assert_eq!(scopes[1].scope, SymbolTable::GLOBAL);
        assert_ne!(scopes[0].scope, SymbolTable::GLOBAL);
    }
}
