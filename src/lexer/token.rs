use std::fmt;

use phf::phf_map;

pub static KEYWORDS: phf::Map<&str, TokenKind> = phf_map! {
    "module" => TokenKind::Module,
    "begin" => TokenKind::Begin,
    "end" => TokenKind::End,
    "if" => TokenKind::If,
    "then" => TokenKind::Then,
    "else" => TokenKind::Else,
    "while" => TokenKind::While,
    "do" => TokenKind::Do,
    "return" => TokenKind::Return,
    "var" => TokenKind::Var,
    "procedure" => TokenKind::Procedure,
    "function" => TokenKind::Function,
    "integer" => TokenKind::IntType,
    "char" => TokenKind::CharType,
    "boolean" => TokenKind::BoolType,
    "true" => TokenKind::True,
    "false" => TokenKind::False,
};

pub static TWO_SYMBOLS_TOKENS: phf::Map<&str, TokenKind> = phf_map! {
    ":=" => TokenKind::Assign,
    "<=" => TokenKind::LessEqual,
    ">=" => TokenKind::GreaterEqual,
    "&&" => TokenKind::AndAnd,
    "||" => TokenKind::OrOr,
};

pub static ONE_SYMBOL_TOKENS: phf::Map<char, TokenKind> = phf_map! {
    '+' => TokenKind::Plus,
    '-' => TokenKind::Minus,
    '*' => TokenKind::Star,
    '/' => TokenKind::Slash,
    '!' => TokenKind::Not,
    '=' => TokenKind::Equal,
    '#' => TokenKind::NotEqual,
    '<' => TokenKind::LessThan,
    '>' => TokenKind::GreaterThan,
    ';' => TokenKind::SemiColon,
    ':' => TokenKind::Colon,
    ',' => TokenKind::Comma,
    '.' => TokenKind::Dot,
    '[' => TokenKind::OpenSquareBrace,
    ']' => TokenKind::CloseSquareBrace,
    '(' => TokenKind::OpenParen,
    ')' => TokenKind::CloseParen,
};

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Module,
    Begin,
    End,
    If,
    Then,
    Else,
    While,
    Do,
    Return,
    Var,
    Procedure,
    Function,
    IntType,
    CharType,
    BoolType,
    True,
    False,

    Ident(String),
    Num(i64),
    CharLit(u8),
    StrLit(Vec<u8>),

    Plus,
    Minus,
    Star,
    Slash,
    AndAnd,
    OrOr,
    Not,

    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,

    Assign,
    SemiColon,
    Colon,
    Comma,
    Dot,
    OpenSquareBrace,
    CloseSquareBrace,
    OpenParen,
    CloseParen,

    Eof,
    /// Lexical failure carried as a sentinel; the parser turns it into a
    /// diagnostic when it reaches the bad position.
    Error(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub col: usize,
}

impl Token {
    /// The lexeme as it would appear in a diagnostic.
    pub fn name(&self) -> String {
        match &self.kind {
            TokenKind::Ident(s) => s.clone(),
            TokenKind::Num(n) => n.to_string(),
            TokenKind::CharLit(c) => format!("'{}'", escape(&[*c])),
            TokenKind::StrLit(s) => format!("\"{}\"", escape(s)),
            TokenKind::Eof => "<EOF>".to_string(),
            TokenKind::Error(m) => m.clone(),
            k => format!("{:?}", k),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.col, self.name())
    }
}

/// Escape raw literal bytes back into source/assembly notation.
pub fn escape(bytes: &[u8]) -> String {
    let mut s = String::new();
    for &b in bytes {
        match b {
            b'\n' => s.push_str("\\n"),
            b'\t' => s.push_str("\\t"),
            0 => s.push_str("\\0"),
            b'\'' => s.push_str("\\'"),
            b'"' => s.push_str("\\\""),
            b'\\' => s.push_str("\\\\"),
            _ => s.push(b as char),
        }
    }
    s
}

/// Resolve one source escape sequence, `None` for an unknown one.
pub fn unescape_char(c: char) -> Option<u8> {
    match c {
        'n' => Some(b'\n'),
        't' => Some(b'\t'),
        '0' => Some(0),
        '\'' => Some(b'\''),
        '"' => Some(b'"'),
        '\\' => Some(b'\\'),
        _ => None,
    }
}
