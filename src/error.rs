use thiserror::Error;

use crate::lexer::Token;

/// A compilation is aborted by the first diagnostic; every error carries the
/// position of the offending token and renders as `<line>:<col>: <message>`.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum CompileError {
    #[error("{line}:{col}: {message}")]
    Lexical {
        line: usize,
        col: usize,
        message: String,
    },
    #[error("{line}:{col}: {message}")]
    Syntax {
        line: usize,
        col: usize,
        message: String,
    },
    #[error("{line}:{col}: {message}")]
    Semantic {
        line: usize,
        col: usize,
        message: String,
    },
}

pub type CompileResult<T> = Result<T, CompileError>;

impl CompileError {
    pub fn lexical(token: &Token, message: impl Into<String>) -> Self {
        Self::Lexical {
            line: token.line,
            col: token.col,
            message: message.into(),
        }
    }

    pub fn syntax(token: &Token, message: impl Into<String>) -> Self {
        Self::Syntax {
            line: token.line,
            col: token.col,
            message: message.into(),
        }
    }

    pub fn semantic(token: &Token, message: impl Into<String>) -> Self {
        Self::Semantic {
            line: token.line,
            col: token.col,
            message: message.into(),
        }
    }
}
