use crate::analyzer::{ScopeId, SymbolId};
use crate::lexer::Token;

/// One compiled unit: the module scope plus its subroutines. Statement
/// sequences are owned `Vec`s inside their scope node; scopes reference
/// symbols by id only.
#[derive(Debug)]
pub struct Module {
    pub token: Token,
    pub name: String,
    pub scope: ScopeId,
    pub subroutines: Vec<Subroutine>,
    pub body: Vec<Stmt>,
}

#[derive(Debug)]
pub struct Subroutine {
    pub token: Token,
    pub name: String,
    /// The Proc symbol in the module scope.
    pub sym: SymbolId,
    pub scope: ScopeId,
    pub body: Vec<Stmt>,
}

#[derive(Debug, PartialEq)]
pub enum Stmt {
    Assign {
        token: Token,
        lhs: Designator,
        rhs: Expr,
    },
    Call(CallExpr),
    If {
        token: Token,
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    While {
        token: Token,
        cond: Expr,
        body: Vec<Stmt>,
    },
    Return {
        token: Token,
        value: Option<Expr>,
    },
}

/// A storage location: a resolved identifier with optional array indices.
#[derive(Debug, PartialEq)]
pub struct Designator {
    pub token: Token,
    pub sym: SymbolId,
    pub indices: Vec<Expr>,
}

#[derive(Debug, PartialEq)]
pub struct CallExpr {
    pub token: Token,
    pub sym: SymbolId,
    pub args: Vec<Expr>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
}

impl BinOp {
    pub fn is_relational(&self) -> bool {
        matches!(
            self,
            BinOp::Equal
                | BinOp::NotEqual
                | BinOp::LessThan
                | BinOp::LessEqual
                | BinOp::GreaterThan
                | BinOp::GreaterEqual
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UnOp {
    Pos,
    Neg,
    Not,
}

#[derive(Debug, PartialEq)]
pub enum Expr {
    Binary {
        token: Token,
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        token: Token,
        op: UnOp,
        operand: Box<Expr>,
    },
    Designator(Designator),
    Call(CallExpr),
    IntConst {
        token: Token,
        value: i64,
    },
    BoolConst {
        token: Token,
        value: bool,
    },
    CharConst {
        token: Token,
        value: u8,
    },
    /// Resolves to the generated global holding the literal bytes.
    StrConst {
        token: Token,
        sym: SymbolId,
    },
}

impl Expr {
    pub fn token(&self) -> &Token {
        match self {
            Expr::Binary { token, .. }
            | Expr::Unary { token, .. }
            | Expr::IntConst { token, .. }
            | Expr::BoolConst { token, .. }
            | Expr::CharConst { token, .. }
            | Expr::StrConst { token, .. } => token,
            Expr::Designator(d) => &d.token,
            Expr::Call(c) => &c.token,
        }
    }
}
