use crate::analyzer::{ScopeId, Search, Symbol, SymbolId, SymbolKind, SymbolTable, TyRef};
use crate::context::Context;
use crate::error::{CompileError, CompileResult};
use crate::lexer::{Token, TokenKind};

use super::{BinOp, CallExpr, Designator, Expr, Module, Stmt, Subroutine, UnOp};

/// Recursive-descent parser: one method per grammar production. Declarations
/// register their symbols in the scope chain as they are recognized, and
/// identifiers are resolved eagerly, so undeclared names and redeclarations
/// surface at parse time. The first violation aborts the parse.
#[derive(Debug)]
pub struct Parser<'a> {
    tokens: Vec<Token>,
    index: usize,
    ctx: &'a mut Context,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, ctx: &'a mut Context) -> Self {
        Self {
            tokens,
            index: 0,
            ctx,
        }
    }

    pub fn parse(mut self) -> CompileResult<Module> {
        self.module()
    }

    /// The token stream always ends with an EOF token, so peeking is total.
    fn peek(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.index.min(last)]
    }

    /// Raise a lexical diagnostic for scanner sentinel tokens, otherwise
    /// hand the token back for grammar checks.
    fn checked_peek(&self) -> CompileResult<&Token> {
        let t = self.peek();
        if let TokenKind::Error(message) = &t.kind {
            return Err(CompileError::lexical(t, message.clone()));
        }
        Ok(t)
    }

    fn advance(&mut self) -> Token {
        let t = self.peek().clone();
        if self.index < self.tokens.len() {
            self.index += 1;
        }
        t
    }

    fn consume(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> CompileResult<Token> {
        let t = self.checked_peek()?;
        if &t.kind != kind {
            return Err(CompileError::syntax(
                t,
                format!("expected {:?}, got '{}'", kind, t.name()),
            ));
        }
        Ok(self.advance())
    }

    fn expect_ident(&mut self) -> CompileResult<(Token, String)> {
        let t = self.checked_peek()?;
        if let TokenKind::Ident(name) = &t.kind {
            let name = name.clone();
            Ok((self.advance(), name))
        } else {
            Err(CompileError::syntax(
                t,
                format!("expected identifier, got '{}'", t.name()),
            ))
        }
    }

    fn resolve(&self, scope: ScopeId, token: &Token, name: &str) -> CompileResult<SymbolId> {
        self.ctx
            .symbols
            .find_symbol(scope, name, Search::Chain)
            .ok_or_else(|| {
                CompileError::semantic(token, format!("undeclared identifier '{}'", name))
            })
    }

    /// module = "module" ident ";" varDeclaration { subroutineDecl }
    ///          "begin" statSequence "end" ident "."
    fn module(&mut self) -> CompileResult<Module> {
        let token = self.expect(&TokenKind::Module)?;
        let (_, name) = self.expect_ident()?;
        self.expect(&TokenKind::SemiColon)?;

        let scope = SymbolTable::GLOBAL;
        self.ctx.symbols.scope_mut(scope).name = name.clone();

        self.var_declaration(scope, SymbolKind::Global)?;

        let mut subroutines = vec![];
        loop {
            let kind = self.checked_peek()?.kind.clone();
            match kind {
                TokenKind::Procedure | TokenKind::Function => {
                    subroutines.push(self.subroutine_decl()?);
                }
                TokenKind::Begin => break,
                _ => {
                    let t = self.peek();
                    return Err(CompileError::syntax(
                        t,
                        format!("invalid subroutine declaration, got '{}'", t.name()),
                    ));
                }
            }
        }

        self.expect(&TokenKind::Begin)?;
        let body = self.stat_sequence(scope)?;
        self.expect(&TokenKind::End)?;

        let (close, close_name) = self.expect_ident()?;
        if close_name != name {
            return Err(CompileError::syntax(&close, "module identifier not matched"));
        }
        self.expect(&TokenKind::Dot)?;
        self.expect(&TokenKind::Eof)?;

        Ok(Module {
            token,
            name,
            scope,
            subroutines,
            body,
        })
    }

    /// varDeclaration = [ "var" varDecl ";" { varDecl ";" } ]
    fn var_declaration(&mut self, scope: ScopeId, kind: SymbolKind) -> CompileResult<()> {
        if !self.consume(&TokenKind::Var) {
            return Ok(());
        }

        loop {
            let (names, ty) = self.var_decl(scope, false)?;
            for (token, name) in names {
                self.add_var(scope, &token, name, kind.clone(), ty.clone())?;
            }
            self.expect(&TokenKind::SemiColon)?;

            match self.checked_peek()?.kind {
                TokenKind::Procedure | TokenKind::Function | TokenKind::Begin => return Ok(()),
                _ => {}
            }
        }
    }

    /// varDecl = ident { "," ident } ":" type
    ///
    /// Duplicate names inside one declaration group are rejected here, while
    /// collecting, before the type is even parsed.
    fn var_decl(
        &mut self,
        scope: ScopeId,
        open_allowed: bool,
    ) -> CompileResult<(Vec<(Token, String)>, TyRef)> {
        let mut names: Vec<(Token, String)> = vec![];
        loop {
            let (token, name) = self.expect_ident()?;
            let clash = names.iter().any(|(_, n)| n == &name)
                || self
                    .ctx
                    .symbols
                    .find_symbol(scope, &name, Search::LocalOnly)
                    .is_some();
            if clash {
                return Err(CompileError::semantic(
                    &token,
                    format!("duplicate declaration of '{}'", name),
                ));
            }
            names.push((token, name));

            if !self.consume(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::Colon)?;
        let ty = self.parse_type(open_allowed)?;
        Ok((names, ty))
    }

    fn add_var(
        &mut self,
        scope: ScopeId,
        token: &Token,
        name: String,
        kind: SymbolKind,
        ty: TyRef,
    ) -> CompileResult<SymbolId> {
        // A module-level variable named `main` would emit a data label
        // duplicating the entry point.
        if kind == SymbolKind::Global && name == "main" {
            return Err(CompileError::semantic(
                token,
                "variable name 'main' collides with the module entry",
            ));
        }
        self.ctx
            .symbols
            .add_symbol(scope, Symbol::new(name, kind, ty))
            .map_err(|name| {
                CompileError::semantic(token, format!("duplicate declaration of '{}'", name))
            })
    }

    /// subroutineDecl = (procedureDecl | functionDecl) subroutineBody ident ";"
    fn subroutine_decl(&mut self) -> CompileResult<Subroutine> {
        let is_function = matches!(self.peek().kind, TokenKind::Function);
        let token = self.advance();

        let (name_token, name) = self.expect_ident()?;
        if self
            .ctx
            .symbols
            .find_symbol(SymbolTable::GLOBAL, &name, Search::LocalOnly)
            .is_some()
        {
            return Err(CompileError::semantic(
                &name_token,
                format!("duplicate declaration of '{}'", name),
            ));
        }
        // The module body is emitted under the module's label prefix and as
        // `main`; a subroutine reusing either name would duplicate labels.
        let module_name = &self.ctx.symbols.scope(SymbolTable::GLOBAL).name;
        if &name == module_name || name == "main" {
            return Err(CompileError::semantic(
                &name_token,
                format!("subroutine name '{}' collides with the module entry", name),
            ));
        }

        // formalParam = "(" [ varDecl { ";" varDecl } ] ")"
        let scope = self.ctx.symbols.push_scope(SymbolTable::GLOBAL, name.clone());
        let mut param_types = vec![];
        if self.consume(&TokenKind::OpenParen) {
            if !self.consume(&TokenKind::CloseParen) {
                loop {
                    let (names, ty) = self.var_decl(scope, true)?;
                    for (token, pname) in names {
                        let index = param_types.len();
                        param_types.push(ty.clone());
                        self.add_var(scope, &token, pname, SymbolKind::Param(index), ty.clone())?;
                    }
                    if !self.consume(&TokenKind::SemiColon) {
                        break;
                    }
                }
                self.expect(&TokenKind::CloseParen)?;
            }
        }

        // functionDecl carries ":" type; procedures return the null type.
        let ret = if is_function {
            self.expect(&TokenKind::Colon)?;
            self.parse_type(false)?
        } else {
            self.ctx.types.null()
        };
        self.expect(&TokenKind::SemiColon)?;

        let sym = self
            .ctx
            .symbols
            .add_symbol(
                SymbolTable::GLOBAL,
                Symbol::proc(name.clone(), ret, param_types),
            )
            .map_err(|name| {
                CompileError::semantic(
                    &name_token,
                    format!("duplicate declaration of '{}'", name),
                )
            })?;
        self.ctx.symbols.scope_mut(scope).owner = Some(sym);

        // subroutineBody = varDeclaration "begin" statSequence "end"
        self.var_declaration(scope, SymbolKind::Local)?;
        self.expect(&TokenKind::Begin)?;
        let body = self.stat_sequence(scope)?;
        self.expect(&TokenKind::End)?;

        let (close, close_name) = self.expect_ident()?;
        if close_name != name {
            return Err(CompileError::syntax(
                &close,
                "subroutine identifier not matched",
            ));
        }
        self.expect(&TokenKind::SemiColon)?;

        Ok(Subroutine {
            token,
            name,
            sym,
            scope,
            body,
        })
    }

    /// statSequence = [ statement { ";" statement } ]
    fn stat_sequence(&mut self, scope: ScopeId) -> CompileResult<Vec<Stmt>> {
        let mut stmts = vec![];
        if matches!(
            self.checked_peek()?.kind,
            TokenKind::End | TokenKind::Else
        ) {
            return Ok(stmts);
        }

        loop {
            stmts.push(self.statement(scope)?);
            if !self.consume(&TokenKind::SemiColon) {
                return Ok(stmts);
            }
        }
    }

    /// statement = assignment | subroutineCall | ifStatement
    ///           | whileStatement | returnStatement
    fn statement(&mut self, scope: ScopeId) -> CompileResult<Stmt> {
        let kind = self.checked_peek()?.kind.clone();
        match kind {
            TokenKind::Ident(_) => self.assignment_or_call(scope),
            TokenKind::If => self.if_statement(scope),
            TokenKind::While => self.while_statement(scope),
            TokenKind::Return => self.return_statement(scope),
            _ => {
                let t = self.peek();
                Err(CompileError::syntax(
                    t,
                    format!("statement expected, got '{}'", t.name()),
                ))
            }
        }
    }

    /// A statement beginning with an identifier is a call when the symbol
    /// resolves to a subroutine, otherwise an assignment.
    fn assignment_or_call(&mut self, scope: ScopeId) -> CompileResult<Stmt> {
        let t = self.peek().clone();
        let TokenKind::Ident(name) = &t.kind else {
            unreachable!("caller checked for an identifier");
        };
        let sym = self.resolve(scope, &t, name)?;

        if self.ctx.symbols.symbol(sym).kind == SymbolKind::Proc {
            return Ok(Stmt::Call(self.subroutine_call(scope)?));
        }

        // assignment = qualident ":=" expression
        let lhs = self.qualident(scope)?;
        let token = self.expect(&TokenKind::Assign)?;
        let rhs = self.expression(scope)?;
        Ok(Stmt::Assign { token, lhs, rhs })
    }

    /// subroutineCall = ident "(" [ expression { "," expression } ] ")"
    fn subroutine_call(&mut self, scope: ScopeId) -> CompileResult<CallExpr> {
        let (token, name) = self.expect_ident()?;
        let sym = self.resolve(scope, &token, &name)?;
        if self.ctx.symbols.symbol(sym).kind != SymbolKind::Proc {
            return Err(CompileError::semantic(
                &token,
                format!("'{}' is not a subroutine", name),
            ));
        }

        self.expect(&TokenKind::OpenParen)?;
        let mut args = vec![];
        if !self.consume(&TokenKind::CloseParen) {
            loop {
                args.push(self.expression(scope)?);
                if !self.consume(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::CloseParen)?;
        }

        Ok(CallExpr { token, sym, args })
    }

    /// ifStatement = "if" "(" expression ")" "then" statSequence
    ///               [ "else" statSequence ] "end"
    fn if_statement(&mut self, scope: ScopeId) -> CompileResult<Stmt> {
        let token = self.expect(&TokenKind::If)?;
        self.expect(&TokenKind::OpenParen)?;
        let cond = self.expression(scope)?;
        self.expect(&TokenKind::CloseParen)?;
        self.expect(&TokenKind::Then)?;
        let then_body = self.stat_sequence(scope)?;
        let else_body = if self.consume(&TokenKind::Else) {
            self.stat_sequence(scope)?
        } else {
            vec![]
        };
        self.expect(&TokenKind::End)?;
        Ok(Stmt::If {
            token,
            cond,
            then_body,
            else_body,
        })
    }

    /// whileStatement = "while" "(" expression ")" "do" statSequence "end"
    fn while_statement(&mut self, scope: ScopeId) -> CompileResult<Stmt> {
        let token = self.expect(&TokenKind::While)?;
        self.expect(&TokenKind::OpenParen)?;
        let cond = self.expression(scope)?;
        self.expect(&TokenKind::CloseParen)?;
        self.expect(&TokenKind::Do)?;
        let body = self.stat_sequence(scope)?;
        self.expect(&TokenKind::End)?;
        Ok(Stmt::While { token, cond, body })
    }

    /// returnStatement = "return" [ expression ]
    fn return_statement(&mut self, scope: ScopeId) -> CompileResult<Stmt> {
        let token = self.expect(&TokenKind::Return)?;
        let value = if self.starts_expression() {
            Some(self.expression(scope)?)
        } else {
            None
        };
        Ok(Stmt::Return { token, value })
    }

    fn starts_expression(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Plus
                | TokenKind::Minus
                | TokenKind::Not
                | TokenKind::OpenParen
                | TokenKind::Ident(_)
                | TokenKind::Num(_)
                | TokenKind::CharLit(_)
                | TokenKind::StrLit(_)
                | TokenKind::True
                | TokenKind::False
        )
    }

    /// expression = simpleexpr [ relOp simpleexpr ]
    ///
    /// Relational operators are non-associative: at most one per expression.
    fn expression(&mut self, scope: ScopeId) -> CompileResult<Expr> {
        let lhs = self.simple_expr(scope)?;

        let op = match self.peek().kind {
            TokenKind::Equal => BinOp::Equal,
            TokenKind::NotEqual => BinOp::NotEqual,
            TokenKind::LessThan => BinOp::LessThan,
            TokenKind::LessEqual => BinOp::LessEqual,
            TokenKind::GreaterThan => BinOp::GreaterThan,
            TokenKind::GreaterEqual => BinOp::GreaterEqual,
            _ => return Ok(lhs),
        };
        let token = self.advance();
        let rhs = self.simple_expr(scope)?;
        Ok(Expr::Binary {
            token,
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    /// simpleexpr = ["+"|"-"] term { ("+"|"-"|"||") term }
    ///
    /// A leading sign is parsed once and wraps the whole additive chain.
    fn simple_expr(&mut self, scope: ScopeId) -> CompileResult<Expr> {
        let sign = match self.peek().kind {
            TokenKind::Plus => Some(UnOp::Pos),
            TokenKind::Minus => Some(UnOp::Neg),
            _ => None,
        };
        let sign = sign.map(|op| (self.advance(), op));

        let mut n = self.term(scope)?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                TokenKind::OrOr => BinOp::Or,
                _ => break,
            };
            let token = self.advance();
            let rhs = self.term(scope)?;
            n = Expr::Binary {
                token,
                op,
                lhs: Box::new(n),
                rhs: Box::new(rhs),
            };
        }

        Ok(match sign {
            Some((token, op)) => Expr::Unary {
                token,
                op,
                operand: Box::new(n),
            },
            None => n,
        })
    }

    /// term = factor { ("*"|"/"|"&&") factor }
    fn term(&mut self, scope: ScopeId) -> CompileResult<Expr> {
        let mut n = self.factor(scope)?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::AndAnd => BinOp::And,
                _ => break,
            };
            let token = self.advance();
            let rhs = self.factor(scope)?;
            n = Expr::Binary {
                token,
                op,
                lhs: Box::new(n),
                rhs: Box::new(rhs),
            };
        }
        Ok(n)
    }

    /// factor = qualident | number | boolean | char | string
    ///        | "(" expression ")" | subroutineCall | "!" factor
    fn factor(&mut self, scope: ScopeId) -> CompileResult<Expr> {
        let t = self.checked_peek()?.clone();
        match &t.kind {
            TokenKind::Num(value) => {
                let value = *value;
                let token = self.advance();
                Ok(Expr::IntConst { token, value })
            }
            TokenKind::True | TokenKind::False => {
                let value = t.kind == TokenKind::True;
                let token = self.advance();
                Ok(Expr::BoolConst { token, value })
            }
            TokenKind::CharLit(value) => {
                let value = *value;
                let token = self.advance();
                Ok(Expr::CharConst { token, value })
            }
            TokenKind::StrLit(bytes) => {
                let sym = self.ctx.add_string_literal(bytes);
                let token = self.advance();
                Ok(Expr::StrConst { token, sym })
            }
            TokenKind::OpenParen => {
                self.advance();
                let e = self.expression(scope)?;
                self.expect(&TokenKind::CloseParen)?;
                Ok(e)
            }
            TokenKind::Not => {
                let token = self.advance();
                let operand = self.factor(scope)?;
                Ok(Expr::Unary {
                    token,
                    op: UnOp::Not,
                    operand: Box::new(operand),
                })
            }
            TokenKind::Ident(name) => {
                let sym = self.resolve(scope, &t, name)?;
                if self.ctx.symbols.symbol(sym).kind == SymbolKind::Proc {
                    Ok(Expr::Call(self.subroutine_call(scope)?))
                } else {
                    Ok(Expr::Designator(self.qualident(scope)?))
                }
            }
            _ => Err(CompileError::syntax(
                &t,
                format!("factor expected, got '{}'", t.name()),
            )),
        }
    }

    /// qualident = ident { "[" expression "]" }
    fn qualident(&mut self, scope: ScopeId) -> CompileResult<Designator> {
        let (token, name) = self.expect_ident()?;
        let sym = self.resolve(scope, &token, &name)?;
        if self.ctx.symbols.symbol(sym).kind == SymbolKind::Proc {
            return Err(CompileError::semantic(
                &token,
                format!("'{}' is a subroutine, not a variable", name),
            ));
        }

        let mut indices = vec![];
        while self.consume(&TokenKind::OpenSquareBrace) {
            indices.push(self.expression(scope)?);
            self.expect(&TokenKind::CloseSquareBrace)?;
        }

        Ok(Designator {
            token,
            sym,
            indices,
        })
    }

    /// type = basetype { "[" [ number ] "]" }
    ///
    /// Each bracket wraps the current type, so the last dimension written is
    /// the one indexed first. An empty bracket is an open dimension, legal
    /// only in formal parameters. Array parameters are passed by reference,
    /// open or not: the formal's effective type is a pointer to the array,
    /// and the caller pushes the address of the dimension header.
    fn parse_type(&mut self, open_allowed: bool) -> CompileResult<TyRef> {
        let t = self.checked_peek()?.clone();
        let mut ty = match t.kind {
            TokenKind::IntType => self.ctx.types.int(),
            TokenKind::CharType => self.ctx.types.char(),
            TokenKind::BoolType => self.ctx.types.boolean(),
            _ => {
                return Err(CompileError::syntax(
                    &t,
                    format!("invalid type, got '{}'", t.name()),
                ))
            }
        };
        self.advance();

        while self.consume(&TokenKind::OpenSquareBrace) {
            if self.consume(&TokenKind::CloseSquareBrace) {
                if !open_allowed {
                    return Err(CompileError::semantic(
                        &t,
                        "open array type is only allowed for formal parameters",
                    ));
                }
                ty = self.ctx.types.array(None, ty);
            } else {
                let nt = self.checked_peek()?.clone();
                let TokenKind::Num(n) = nt.kind else {
                    return Err(CompileError::syntax(
                        &nt,
                        format!("array dimension expected, got '{}'", nt.name()),
                    ));
                };
                if n <= 0 {
                    return Err(CompileError::semantic(
                        &nt,
                        format!("invalid array dimension ({})", n),
                    ));
                }
                self.advance();
                ty = self.ctx.types.array(Some(n as usize), ty);
                self.expect(&TokenKind::CloseSquareBrace)?;
            }
        }

        if open_allowed && ty.is_array() {
            ty = self.ctx.types.pointer(ty);
        }
        Ok(ty)
    }
}
