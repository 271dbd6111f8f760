use crate::context::Context;
use crate::error::{CompileError, CompileResult};
use crate::parser::{BinOp, CallExpr, Designator, Expr, Module, Stmt, UnOp};

use super::{ScopeId, Ty, TyRef};

/// Check the whole module after parsing. The AST is structurally sound at
/// this point; this pass enforces the typing rules and the i32 range of
/// integer constants.
pub fn check_module(ctx: &Context, module: &Module) -> CompileResult<()> {
    let checker = Checker { ctx };
    for sub in &module.subroutines {
        let ret = &ctx.symbols.symbol(sub.sym).ty;
        if !ret.is_scalar() && **ret != Ty::Null {
            return Err(CompileError::semantic(
                &sub.token,
                format!("function '{}' must return a base type", sub.name),
            ));
        }
        checker.check_stmts(sub.scope, &sub.body)?;
    }
    checker.check_stmts(module.scope, &module.body)
}

/// Type of a designator after applying its indices. Open-array parameters
/// index like the arrays they point at, so a leading pointer is peeled when
/// indices are present.
pub fn designator_ty(ctx: &Context, d: &Designator) -> TyRef {
    let mut t = ctx.symbols.symbol(d.sym).ty.clone();
    if !d.indices.is_empty() {
        if let Ty::Ptr(inner) = &*t.clone() {
            t = inner.clone();
        }
    }
    for _ in &d.indices {
        t = match t.inner() {
            Some(inner) => inner,
            None => break,
        };
    }
    t
}

struct Checker<'a> {
    ctx: &'a Context,
}

impl Checker<'_> {
    fn check_stmts(&self, scope: ScopeId, stmts: &[Stmt]) -> CompileResult<()> {
        for stmt in stmts {
            self.check_stmt(scope, stmt)?;
        }
        Ok(())
    }

    fn check_stmt(&self, scope: ScopeId, stmt: &Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::Assign { token, lhs, rhs } => {
                let lt = self.check_designator(scope, lhs)?;
                if !lt.is_scalar() || lt.is_pointer() {
                    return Err(CompileError::semantic(
                        token,
                        "assignment target must be of a base type",
                    ));
                }
                let rt = self.check_expr(scope, rhs)?;
                if !lt.matches(&rt) {
                    return Err(CompileError::semantic(
                        token,
                        format!("incompatible types in assignment ({} := {})", lt, rt),
                    ));
                }
                Ok(())
            }
            Stmt::Call(call) => {
                self.check_call(scope, call)?;
                Ok(())
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
                ..
            } => {
                self.check_cond(scope, cond)?;
                self.check_stmts(scope, then_body)?;
                self.check_stmts(scope, else_body)
            }
            Stmt::While { cond, body, .. } => {
                self.check_cond(scope, cond)?;
                self.check_stmts(scope, body)
            }
            Stmt::Return { token, value } => {
                let ret = self.ctx.symbols.return_type(scope, &self.ctx.types);
                match (&*ret, value) {
                    (Ty::Null, None) => Ok(()),
                    (Ty::Null, Some(_)) => Err(CompileError::semantic(
                        token,
                        "superfluous expression after return",
                    )),
                    (_, None) => Err(CompileError::semantic(
                        token,
                        "expression expected after return",
                    )),
                    (_, Some(v)) => {
                        let vt = self.check_expr(scope, v)?;
                        if !ret.matches(&vt) {
                            return Err(CompileError::semantic(
                                token,
                                format!("return type mismatch ({} instead of {})", vt, ret),
                            ));
                        }
                        Ok(())
                    }
                }
            }
        }
    }

    fn check_cond(&self, scope: ScopeId, cond: &Expr) -> CompileResult<()> {
        let t = self.check_expr(scope, cond)?;
        if !t.is_boolean() {
            return Err(CompileError::semantic(
                cond.token(),
                "boolean expression expected",
            ));
        }
        Ok(())
    }

    fn check_expr(&self, scope: ScopeId, expr: &Expr) -> CompileResult<TyRef> {
        match expr {
            Expr::Binary {
                token,
                op,
                lhs,
                rhs,
            } => {
                let lt = self.check_expr(scope, lhs)?;
                let rt = self.check_expr(scope, rhs)?;
                self.check_binary(token, *op, &lt, &rt)
            }
            Expr::Unary { token, op, operand } => match op {
                UnOp::Pos | UnOp::Neg => {
                    // -2147483648 is representable even though its absolute
                    // value alone is not.
                    if let Expr::IntConst { value, .. } = &**operand {
                        self.check_int_range(token, if *op == UnOp::Neg { -value } else { *value })?;
                        return Ok(self.ctx.types.int());
                    }
                    let t = self.check_expr(scope, operand)?;
                    if !t.is_int() {
                        return Err(CompileError::semantic(
                            token,
                            format!("unary sign applied to {}", t),
                        ));
                    }
                    Ok(self.ctx.types.int())
                }
                UnOp::Not => {
                    let t = self.check_expr(scope, operand)?;
                    if !t.is_boolean() {
                        return Err(CompileError::semantic(
                            token,
                            format!("'!' applied to {}", t),
                        ));
                    }
                    Ok(self.ctx.types.boolean())
                }
            },
            Expr::Designator(d) => self.check_designator(scope, d),
            Expr::Call(c) => {
                let ret = self.check_call(scope, c)?;
                if *ret == Ty::Null {
                    return Err(CompileError::semantic(
                        &c.token,
                        format!(
                            "procedure '{}' used in an expression",
                            self.ctx.symbols.symbol(c.sym).name
                        ),
                    ));
                }
                Ok(ret)
            }
            Expr::IntConst { token, value } => {
                self.check_int_range(token, *value)?;
                Ok(self.ctx.types.int())
            }
            Expr::BoolConst { .. } => Ok(self.ctx.types.boolean()),
            Expr::CharConst { .. } => Ok(self.ctx.types.char()),
            Expr::StrConst { sym, .. } => Ok(self.ctx.symbols.symbol(*sym).ty.clone()),
        }
    }

    fn check_int_range(&self, token: &crate::lexer::Token, value: i64) -> CompileResult<()> {
        if value < i32::MIN as i64 || value > i32::MAX as i64 {
            return Err(CompileError::semantic(
                token,
                format!("integer constant out of range ({})", value),
            ));
        }
        Ok(())
    }

    fn check_binary(
        &self,
        token: &crate::lexer::Token,
        op: BinOp,
        lt: &Ty,
        rt: &Ty,
    ) -> CompileResult<TyRef> {
        match op {
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => {
                if !lt.is_int() || !rt.is_int() {
                    return Err(CompileError::semantic(
                        token,
                        format!("arithmetic operation on {} and {}", lt, rt),
                    ));
                }
                Ok(self.ctx.types.int())
            }
            BinOp::And | BinOp::Or => {
                if !lt.is_boolean() || !rt.is_boolean() {
                    return Err(CompileError::semantic(
                        token,
                        format!("logical operation on {} and {}", lt, rt),
                    ));
                }
                Ok(self.ctx.types.boolean())
            }
            BinOp::Equal | BinOp::NotEqual => {
                if !(lt.matches(rt) && (lt.is_int() || lt.is_char() || lt.is_boolean())) {
                    return Err(CompileError::semantic(
                        token,
                        format!("comparison of {} and {}", lt, rt),
                    ));
                }
                Ok(self.ctx.types.boolean())
            }
            BinOp::LessThan | BinOp::LessEqual | BinOp::GreaterThan | BinOp::GreaterEqual => {
                if !(lt.matches(rt) && (lt.is_int() || lt.is_char())) {
                    return Err(CompileError::semantic(
                        token,
                        format!("ordered comparison of {} and {}", lt, rt),
                    ));
                }
                Ok(self.ctx.types.boolean())
            }
        }
    }

    fn check_designator(&self, scope: ScopeId, d: &Designator) -> CompileResult<TyRef> {
        let mut t = self.ctx.symbols.symbol(d.sym).ty.clone();
        if !d.indices.is_empty() {
            if let Ty::Ptr(inner) = &*t.clone() {
                t = inner.clone();
            }
        }
        for index in &d.indices {
            if !t.is_array() {
                return Err(CompileError::semantic(
                    index.token(),
                    format!("indexing a non-array value of type {}", t),
                ));
            }
            let it = self.check_expr(scope, index)?;
            if !it.is_int() {
                return Err(CompileError::semantic(
                    index.token(),
                    format!("array index must be integer, got {}", it),
                ));
            }
            t = t.inner().unwrap_or_else(|| self.ctx.types.null());
        }
        Ok(t)
    }

    /// Resolve a call against the callee signature; returns the return type.
    fn check_call(&self, scope: ScopeId, call: &CallExpr) -> CompileResult<TyRef> {
        let callee = self.ctx.symbols.symbol(call.sym);
        if call.args.len() != callee.params.len() {
            return Err(CompileError::semantic(
                &call.token,
                format!(
                    "'{}' expects {} argument(s), got {}",
                    callee.name,
                    callee.params.len(),
                    call.args.len()
                ),
            ));
        }
        for (i, (arg, param)) in call.args.iter().zip(&callee.params).enumerate() {
            let at = self.check_expr(scope, arg)?;
            if !param.matches(&at) {
                return Err(CompileError::semantic(
                    arg.token(),
                    format!(
                        "argument {} of '{}': expected {}, got {}",
                        i + 1,
                        callee.name,
                        param,
                        at
                    ),
                ));
            }
        }
        Ok(callee.ty.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Scanner;
    use crate::parser::Parser;

    fn check(input: &str) -> CompileResult<()> {
        let mut ctx = Context::new();
        let module = Parser::new(Scanner::tokenize(input), &mut ctx).parse()?;
        check_module(&ctx, &module)
    }

    fn wrap(decls: &str, stmt: &str) -> String {
        format!("module t; {} begin {} end t.", decls, stmt)
    }

    #[test]
    fn assignment_types_must_match() {
        let err = check(&wrap("var b: boolean;", "b := 1")).unwrap_err();
        assert!(err.to_string().contains("incompatible types in assignment"));
        assert!(check(&wrap("var b: boolean;", "b := true")).is_ok());
    }

    #[test]
    fn array_assignment_is_rejected() {
        let err = check(&wrap("var a, b: integer[5];", "a := b")).unwrap_err();
        assert!(err.to_string().contains("base type"));
    }

    #[test]
    fn call_arity_is_enforced() {
        let err = check(&wrap("", "WriteInt(1, 2)")).unwrap_err();
        assert!(err.to_string().contains("expects 1 argument(s), got 2"));
    }

    #[test]
    fn argument_types_are_enforced() {
        let err = check(&wrap("", "WriteInt(true)")).unwrap_err();
        assert!(err.to_string().contains("argument 1 of 'WriteInt'"));
    }

    #[test]
    fn ordered_comparison_forbids_boolean() {
        let err = check(&wrap("var b: boolean;", "b := true < false")).unwrap_err();
        assert!(err.to_string().contains("ordered comparison"));
        assert!(check(&wrap("var b: boolean;", "b := 'a' < 'b'")).is_ok());
    }

    #[test]
    fn equality_allows_boolean() {
        assert!(check(&wrap("var b: boolean;", "b := b = true")).is_ok());
    }

    #[test]
    fn over_indexing_is_rejected() {
        let err = check(&wrap("var a: integer[5]; x: integer;", "x := a[1][2]")).unwrap_err();
        assert!(err.to_string().contains("indexing a non-array"));
    }

    #[test]
    fn index_must_be_integer() {
        let err = check(&wrap("var a: integer[5]; x: integer;", "x := a[true]")).unwrap_err();
        assert!(err.to_string().contains("array index must be integer"));
    }

    #[test]
    fn partially_indexed_array_is_not_assignable() {
        let err = check(&wrap(
            "var m: integer[3][4]; x: integer;",
            "x := m[1]",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("incompatible types"));
    }

    #[test]
    fn condition_must_be_boolean() {
        let err = check(&wrap("var x: integer;", "if (x) then end")).unwrap_err();
        assert!(err.to_string().contains("boolean expression expected"));
    }

    #[test]
    fn procedure_call_in_expression_is_rejected() {
        let err = check(&wrap("var x: integer;", "x := WriteLn()")).unwrap_err();
        assert!(err.to_string().contains("used in an expression"));
    }

    #[test]
    fn return_rules_follow_the_subroutine_kind() {
        let err = check(
            "module t; procedure p(); begin return 1 end p; begin end t.",
        )
        .unwrap_err();
        assert!(err.to_string().contains("superfluous expression"));

        let err = check(
            "module t; function f(): integer; begin return end f; begin end t.",
        )
        .unwrap_err();
        assert!(err.to_string().contains("expression expected after return"));

        assert!(check(
            "module t; function f(): integer; begin return 1 end f; begin end t."
        )
        .is_ok());
    }

    #[test]
    fn int_constants_are_range_checked() {
        let err = check(&wrap("var x: integer;", "x := 2147483648")).unwrap_err();
        assert!(err.to_string().contains("out of range"));
        assert!(check(&wrap("var x: integer;", "x := -2147483648")).is_ok());
        assert!(check(&wrap("var x: integer;", "x := 2147483647")).is_ok());
    }

    #[test]
    fn open_array_parameter_accepts_any_extent() {
        assert!(check(
            "module t; var a: integer[7]; x: integer; \
             function sum(v: integer[]): integer; begin return v[0] end sum; \
             begin x := sum(a) end t."
        )
        .is_ok());
    }

    #[test]
    fn concrete_array_parameter_checks_the_extent() {
        assert!(check(
            "module t; var a: integer[5]; \
             procedure p(v: integer[5]); begin v[0] := 1 end p; \
             begin p(a) end t."
        )
        .is_ok());
        let err = check(
            "module t; var a: integer[7]; \
             procedure p(v: integer[5]); begin end p; \
             begin p(a) end t."
        )
        .unwrap_err();
        assert!(err.to_string().contains("argument 1 of 'p'"));
    }

    #[test]
    fn subarray_passes_to_an_open_array_parameter() {
        assert!(check(
            "module t; var m: integer[3][4]; x: integer; \
             function sum(v: integer[]): integer; begin return v[0] end sum; \
             begin x := sum(m[1]) end t."
        )
        .is_ok());
    }

    #[test]
    fn runtime_dim_accepts_any_array() {
        assert!(check(&wrap(
            "var m: char[3][9]; x: integer;",
            "x := DIM(m, 2)",
        ))
        .is_ok());
    }

    #[test]
    fn string_literal_passes_to_writestr() {
        assert!(check(&wrap("", "WriteStr(\"hello\")")).is_ok());
    }
}
