use super::{
    token::{unescape_char, KEYWORDS, ONE_SYMBOL_TOKENS, TWO_SYMBOLS_TOKENS},
    Token, TokenKind,
};

#[derive(Debug)]
pub struct Scanner {
    chars: Vec<char>,
    index: usize,
    line: usize,
    col: usize,
    tokens: Vec<Token>,
}

impl Scanner {
    fn new(s: &str) -> Self {
        Self {
            chars: s.chars().collect(),
            index: 0,
            line: 1,
            col: 1,
            tokens: vec![],
        }
    }

    /// Tokenize the whole source, appending an EOF token. Lexical failures
    /// become `TokenKind::Error` sentinels instead of aborting the scan.
    pub fn tokenize(s: &str) -> Vec<Token> {
        let mut scanner = Scanner::new(s);
        scanner.scan();
        scanner.tokens
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.index).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.chars.get(self.index + 1).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.index += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn push(&mut self, kind: TokenKind, line: usize, col: usize) {
        self.tokens.push(Token { kind, line, col });
    }

    fn scan(&mut self) {
        loop {
            self.skip_whitespace_and_comments();

            let line = self.line;
            let col = self.col;
            let Some(c) = self.peek() else {
                self.push(TokenKind::Eof, line, col);
                return;
            };

            if c.is_ascii_digit() {
                self.scan_number(line, col);
            } else if c.is_ascii_alphabetic() {
                self.scan_identifier(line, col);
            } else if c == '\'' {
                self.scan_char(line, col);
            } else if c == '"' {
                self.scan_string(line, col);
            } else if let Some(kind) = self.peek2().and_then(|c2| {
                let pair: String = [c, c2].iter().collect();
                TWO_SYMBOLS_TOKENS.get(pair.as_str())
            }) {
                self.bump();
                self.bump();
                self.push(kind.clone(), line, col);
            } else if let Some(kind) = ONE_SYMBOL_TOKENS.get(&c) {
                self.bump();
                self.push(kind.clone(), line, col);
            } else {
                self.bump();
                self.push(
                    TokenKind::Error(format!("invalid character '{}'", c)),
                    line,
                    col,
                );
            }
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek2() == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => return,
            }
        }
    }

    fn scan_number(&mut self, line: usize, col: usize) {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            s.push(c);
            self.bump();
        }
        match s.parse::<i64>() {
            Ok(v) => self.push(TokenKind::Num(v), line, col),
            Err(_) => self.push(TokenKind::Error(format!("invalid number '{}'", s)), line, col),
        }
    }

    fn scan_identifier(&mut self, line: usize, col: usize) {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if !c.is_ascii_alphanumeric() && c != '_' {
                break;
            }
            s.push(c);
            self.bump();
        }
        if let Some(kind) = KEYWORDS.get(&s) {
            self.push(kind.clone(), line, col);
        } else {
            self.push(TokenKind::Ident(s), line, col);
        }
    }

    /// One byte of literal content, resolving escapes. `None` on a bad or
    /// unterminated escape.
    fn scan_literal_byte(&mut self) -> Option<u8> {
        let c = self.bump()?;
        if c == '\\' {
            unescape_char(self.bump()?)
        } else if c.is_ascii() {
            Some(c as u8)
        } else {
            None
        }
    }

    fn scan_char(&mut self, line: usize, col: usize) {
        self.bump(); // opening quote
        let Some(b) = self.scan_literal_byte() else {
            self.push(
                TokenKind::Error("invalid character constant".to_string()),
                line,
                col,
            );
            return;
        };
        if self.peek() == Some('\'') {
            self.bump();
            self.push(TokenKind::CharLit(b), line, col);
        } else {
            self.push(
                TokenKind::Error("unterminated character constant".to_string()),
                line,
                col,
            );
        }
    }

    fn scan_string(&mut self, line: usize, col: usize) {
        self.bump(); // opening quote
        let mut bytes = vec![];
        loop {
            match self.peek() {
                None | Some('\n') => {
                    self.push(
                        TokenKind::Error("unterminated string constant".to_string()),
                        line,
                        col,
                    );
                    return;
                }
                Some('"') => {
                    self.bump();
                    self.push(TokenKind::StrLit(bytes), line, col);
                    return;
                }
                Some(_) => match self.scan_literal_byte() {
                    Some(b) => bytes.push(b),
                    None => {
                        self.push(
                            TokenKind::Error("invalid escape in string constant".to_string()),
                            line,
                            col,
                        );
                        return;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Scanner::tokenize(input).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn scans_operators_and_keywords() {
        assert_eq!(
            kinds("module m; begin x := 1 end m."),
            vec![
                TokenKind::Module,
                TokenKind::Ident("m".to_string()),
                TokenKind::SemiColon,
                TokenKind::Begin,
                TokenKind::Ident("x".to_string()),
                TokenKind::Assign,
                TokenKind::Num(1),
                TokenKind::End,
                TokenKind::Ident("m".to_string()),
                TokenKind::Dot,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn scans_two_char_operators() {
        assert_eq!(
            kinds("<= >= := && || < > = #"),
            vec![
                TokenKind::LessEqual,
                TokenKind::GreaterEqual,
                TokenKind::Assign,
                TokenKind::AndAnd,
                TokenKind::OrOr,
                TokenKind::LessThan,
                TokenKind::GreaterThan,
                TokenKind::Equal,
                TokenKind::NotEqual,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn skips_line_comments() {
        assert_eq!(
            kinds("1 // comment ; end\n2"),
            vec![TokenKind::Num(1), TokenKind::Num(2), TokenKind::Eof]
        );
    }

    #[test]
    fn scans_char_and_string_literals() {
        assert_eq!(
            kinds("'a' '\\n' \"hi\\n\""),
            vec![
                TokenKind::CharLit(b'a'),
                TokenKind::CharLit(b'\n'),
                TokenKind::StrLit(b"hi\n".to_vec()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lone_ampersand_is_an_error_token() {
        let tokens = Scanner::tokenize("a & b");
        assert!(matches!(tokens[1].kind, TokenKind::Error(_)));
    }

    #[test]
    fn tracks_positions() {
        let tokens = Scanner::tokenize("x\n  y");
        assert_eq!((tokens[0].line, tokens[0].col), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].col), (2, 3));
    }

    #[test]
    fn unterminated_string_is_an_error_token() {
        let tokens = Scanner::tokenize("\"abc");
        assert!(matches!(tokens[0].kind, TokenKind::Error(_)));
    }
}
