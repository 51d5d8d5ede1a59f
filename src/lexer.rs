// src/lexer.rs
use std::fmt;

use tracing::debug;

use crate::error::LexError;

/// 1-based source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pos {
    pub line: u32,
    pub col: u32,
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Var, For, Print,
    Int, Str,
    Plus, Minus, Star, Slash,
    Lt, LtEq, Gt, GtEq, EqEq, Eq,
    LParen, RParen, LBrace, RBrace, Semicolon,
    Eof,
}

/// Coarse classification of a token kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Identifier,
    Keyword,
    IntegerLiteral,
    StringLiteral,
    Operator,
    Punctuation,
    EndOfInput,
}

impl TokenKind {
    pub fn category(self) -> Category {
        use TokenKind::*;
        match self {
            Ident => Category::Identifier,
            Var | For | Print => Category::Keyword,
            Int => Category::IntegerLiteral,
            Str => Category::StringLiteral,
            Plus | Minus | Star | Slash | Lt | LtEq | Gt | GtEq | EqEq | Eq => Category::Operator,
            LParen | RParen | LBrace | RBrace | Semicolon => Category::Punctuation,
            Eof => Category::EndOfInput,
        }
    }
}

/// A lexed token. For string literals `text` holds the contents between the quotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub pos: Pos,
}

impl Token {
    /// Human-readable description used in parse errors.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::Str => format!("string \"{}\"", self.text),
            _ => format!("'{}'", self.text),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:<6} {:?} {:?}", self.pos.to_string(), self.kind, self.text)
    }
}

const KEYWORDS: &[(&str, TokenKind)] = &[
    ("var", TokenKind::Var),
    ("for", TokenKind::For),
    ("print", TokenKind::Print),
];

pub struct Lexer<'a> {
    src: &'a str,
    input: &'a [u8],
    pos: usize,
    line: u32,
    col: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { src: source, input: source.as_bytes(), pos: 0, line: 1, col: 1 }
    }

    fn advance(&mut self) {
        if self.cur() == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        self.pos += 1;
    }
    fn cur(&self) -> u8 { self.input.get(self.pos).copied().unwrap_or(0) }
    fn peek(&self) -> u8 { self.input.get(self.pos + 1).copied().unwrap_or(0) }
    fn here(&self) -> Pos { Pos { line: self.line, col: self.col } }
    fn at_end(&self) -> bool { self.pos >= self.input.len() }

    fn skip_whitespace(&mut self) {
        while !self.at_end() {
            match self.cur() {
                b' ' | b'\t' | b'\n' | b'\r' => self.advance(),
                b'/' if self.peek() == b'/' => self.skip_line_comment(),
                _ => break,
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while !self.at_end() && self.cur() != b'\n' {
            self.advance();
        }
    }

    fn push(&self, tokens: &mut Vec<Token>, kind: TokenKind, start: usize, pos: Pos) {
        tokens.push(Token { kind, text: self.src[start..self.pos].to_string(), pos });
    }

    pub fn lex(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::with_capacity(self.input.len() / 4 + 1);

        loop {
            self.skip_whitespace();
            if self.at_end() { break; }

            let start = self.pos;
            let pos = self.here();
            match self.cur() {
                b'0'..=b'9' => {
                    while self.cur().is_ascii_digit() {
                        self.advance();
                    }
                    let text = &self.src[start..self.pos];
                    if text.parse::<i64>().is_err() {
                        return Err(LexError::IntegerOverflow { text: text.to_string(), pos });
                    }
                    self.push(&mut tokens, TokenKind::Int, start, pos);
                }
                b'"' => {
                    self.advance();
                    let body = self.pos;
                    while !self.at_end() && self.cur() != b'"' {
                        self.advance();
                    }
                    if self.at_end() {
                        return Err(LexError::UnterminatedString { pos });
                    }
                    tokens.push(Token {
                        kind: TokenKind::Str,
                        text: self.src[body..self.pos].to_string(),
                        pos,
                    });
                    self.advance();
                }
                b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                    while matches!(self.cur(), b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_') {
                        self.advance();
                    }
                    let word = &self.src[start..self.pos];
                    let kind = KEYWORDS
                        .iter()
                        .find(|(kw, _)| *kw == word)
                        .map(|(_, kind)| *kind)
                        .unwrap_or(TokenKind::Ident);
                    self.push(&mut tokens, kind, start, pos);
                }
                b'<' | b'>' | b'=' => {
                    let first = self.cur();
                    self.advance();
                    let kind = match (first, self.cur()) {
                        (b'<', b'=') => { self.advance(); TokenKind::LtEq }
                        (b'>', b'=') => { self.advance(); TokenKind::GtEq }
                        (b'=', b'=') => { self.advance(); TokenKind::EqEq }
                        (b'<', _) => TokenKind::Lt,
                        (b'>', _) => TokenKind::Gt,
                        _ => TokenKind::Eq,
                    };
                    self.push(&mut tokens, kind, start, pos);
                }
                single => {
                    let kind = match single {
                        b'+' => TokenKind::Plus,
                        b'-' => TokenKind::Minus,
                        b'*' => TokenKind::Star,
                        b'/' => TokenKind::Slash,
                        b'(' => TokenKind::LParen,
                        b')' => TokenKind::RParen,
                        b'{' => TokenKind::LBrace,
                        b'}' => TokenKind::RBrace,
                        b';' => TokenKind::Semicolon,
                        _ => {
                            let ch = self.src[start..].chars().next().unwrap_or('\0');
                            return Err(LexError::UnexpectedChar { ch, pos });
                        }
                    };
                    self.advance();
                    self.push(&mut tokens, kind, start, pos);
                }
            }
        }

        tokens.push(Token { kind: TokenKind::Eof, text: String::new(), pos: self.here() });
        debug!(tokens = tokens.len(), "lexing finished");
        Ok(tokens)
    }
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).lex()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn empty() {
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
        assert_eq!(kinds("  \n\t // nothing here"), vec![TokenKind::Eof]);
    }

    #[test]
    fn keywords_and_identifiers() {
        use TokenKind::*;
        assert_eq!(kinds("var for print variable _x print2"), vec![Var, For, Print, Ident, Ident, Ident, Eof]);
        let toks = tokenize("fortune").unwrap();
        assert_eq!(toks[0].kind.category(), Category::Identifier);
        assert_eq!(toks[0].text, "fortune");
    }

    #[test]
    fn longest_match_operators() {
        use TokenKind::*;
        assert_eq!(kinds("<= < >= > == = + - * /"), vec![LtEq, Lt, GtEq, Gt, EqEq, Eq, Plus, Minus, Star, Slash, Eof]);
        assert_eq!(kinds("i>=0"), vec![Ident, GtEq, Int, Eof]);
    }

    #[test]
    fn literals_keep_source_text() {
        let toks = tokenize("42 \"hello world\"").unwrap();
        assert_eq!((toks[0].kind, toks[0].text.as_str()), (TokenKind::Int, "42"));
        assert_eq!((toks[1].kind, toks[1].text.as_str()), (TokenKind::Str, "hello world"));
        assert_eq!(toks[1].kind.category(), Category::StringLiteral);
    }

    #[test]
    fn positions() {
        let toks = tokenize("var x\n  = 1;").unwrap();
        assert_eq!(toks[1].pos, Pos { line: 1, col: 5 });
        assert_eq!(toks[2].pos, Pos { line: 2, col: 3 });
    }

    #[test]
    fn unexpected_char() {
        let err = tokenize("var x = 1 @ 2;").unwrap_err();
        assert_eq!(err, LexError::UnexpectedChar { ch: '@', pos: Pos { line: 1, col: 11 } });
    }

    #[test]
    fn unterminated_string() {
        assert!(matches!(tokenize("print(\"oops);"), Err(LexError::UnterminatedString { .. })));
    }

    #[test]
    fn integer_overflow() {
        assert!(matches!(tokenize("99999999999999999999"), Err(LexError::IntegerOverflow { .. })));
    }
}
