// src/parser.rs
use tracing::debug;

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::{Token, TokenKind};

type PResult<T> = Result<T, ParseError>;

/// Expression subtree paired with its nesting depth.
type Sub = (Expr, usize);

/// Deepest expression tree (and deepest parenthesis nesting) the parser accepts.
/// Later stages walk expressions recursively, so this bounds their stack use.
pub const MAX_EXPR_DEPTH: usize = 256;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    eof: Token,
    groups: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        let eof_pos = tokens.last().map(|t| t.pos).unwrap_or(crate::lexer::Pos { line: 1, col: 1 });
        let eof = Token { kind: TokenKind::Eof, text: String::new(), pos: eof_pos };
        Self { tokens, pos: 0, eof, groups: 0 }
    }

    fn cur(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&self.eof)
    }

    fn peek_kind(&self) -> TokenKind {
        self.tokens.get(self.pos + 1).map(|t| t.kind).unwrap_or(TokenKind::Eof)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.cur().kind == kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.cur().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn error(&self, expected: &'static str) -> ParseError {
        let found = self.cur();
        ParseError::Expected { expected, found: found.describe(), pos: found.pos }
    }

    fn eat(&mut self, kind: TokenKind, expected: &'static str) -> PResult<Token> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(expected))
        }
    }

    pub fn parse(&mut self) -> PResult<Vec<Stmt>> {
        let mut stmts = vec![];
        while !self.at(TokenKind::Eof) {
            stmts.push(self.stmt()?);
        }
        debug!(statements = stmts.len(), "parsing finished");
        Ok(stmts)
    }

    fn stmt(&mut self) -> PResult<Stmt> {
        match self.cur().kind {
            TokenKind::Var => self.var_decl(),
            TokenKind::For => self.for_stmt(),
            TokenKind::Print => self.print_stmt(),
            TokenKind::LBrace => Ok(Stmt::Block(self.block()?)),
            _ => {
                let stmt = self.simple()?;
                self.eat(TokenKind::Semicolon, "';' after expression")?;
                Ok(stmt)
            }
        }
    }

    fn var_decl(&mut self) -> PResult<Stmt> {
        self.eat(TokenKind::Var, "'var'")?;
        let name = self.eat(TokenKind::Ident, "variable name after 'var'")?.text;
        self.eat(TokenKind::Eq, "'=' in variable declaration")?;
        let init = self.expr()?;
        self.eat(TokenKind::Semicolon, "';' after variable declaration")?;
        Ok(Stmt::VarDecl { name, init })
    }

    fn for_stmt(&mut self) -> PResult<Stmt> {
        self.eat(TokenKind::For, "'for'")?;
        self.eat(TokenKind::LParen, "'(' after 'for'")?;
        let init = if self.at(TokenKind::Var) {
            self.var_decl()?
        } else {
            let s = self.simple()?;
            self.eat(TokenKind::Semicolon, "';' after loop initializer")?;
            s
        };
        let cond = self.expr()?;
        self.eat(TokenKind::Semicolon, "';' after loop condition")?;
        let post = self.simple()?;
        self.eat(TokenKind::RParen, "')' after loop clauses")?;
        let body = self.block()?;
        Ok(Stmt::For { init: Box::new(init), cond, post: Box::new(post), body })
    }

    fn print_stmt(&mut self) -> PResult<Stmt> {
        self.eat(TokenKind::Print, "'print'")?;
        self.eat(TokenKind::LParen, "'(' after 'print'")?;
        let e = self.expr()?;
        self.eat(TokenKind::RParen, "')' after print argument")?;
        self.eat(TokenKind::Semicolon, "';' after print statement")?;
        Ok(Stmt::Print(e))
    }

    fn block(&mut self) -> PResult<Vec<Stmt>> {
        self.eat(TokenKind::LBrace, "'{' to open a block")?;
        let mut stmts = vec![];
        while !self.at(TokenKind::RBrace) {
            if self.at(TokenKind::Eof) {
                return Err(self.error("'}' to close the block"));
            }
            stmts.push(self.stmt()?);
        }
        self.eat(TokenKind::RBrace, "'}' to close the block")?;
        Ok(stmts)
    }

    /// Assignment or bare expression, without the trailing ';'.
    fn simple(&mut self) -> PResult<Stmt> {
        if self.at(TokenKind::Ident) && self.peek_kind() == TokenKind::Eq {
            let name = self.advance().text;
            self.advance();
            let value = self.expr()?;
            return Ok(Stmt::Assign { name, value });
        }
        Ok(Stmt::Expr(self.expr()?))
    }

    fn expr(&mut self) -> PResult<Expr> {
        Ok(self.comparison()?.0)
    }

    fn too_deep(&self) -> ParseError {
        ParseError::TooDeep { limit: MAX_EXPR_DEPTH, pos: self.cur().pos }
    }

    /// Joins two operands, failing once the tree would nest past `MAX_EXPR_DEPTH`.
    fn binary(&self, op: BinOp, left: Sub, right: Sub) -> PResult<Sub> {
        let depth = left.1.max(right.1) + 1;
        if depth > MAX_EXPR_DEPTH {
            return Err(self.too_deep());
        }
        Ok((Expr::Binary { op, left: Box::new(left.0), right: Box::new(right.0) }, depth))
    }

    // Non-associative: at most one relational operator.
    fn comparison(&mut self) -> PResult<Sub> {
        let left = self.additive()?;
        let op = match self.cur().kind {
            TokenKind::Lt => BinOp::Lt,
            TokenKind::LtEq => BinOp::Le,
            TokenKind::Gt => BinOp::Gt,
            TokenKind::GtEq => BinOp::Ge,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.additive()?;
        self.binary(op, left, right)
    }

    fn additive(&mut self) -> PResult<Sub> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.cur().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.multiplicative()?;
            left = self.binary(op, left, right)?;
        }
    }

    fn multiplicative(&mut self) -> PResult<Sub> {
        let mut left = self.primary()?;
        loop {
            let op = match self.cur().kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.primary()?;
            left = self.binary(op, left, right)?;
        }
    }

    fn primary(&mut self) -> PResult<Sub> {
        match self.cur().kind {
            TokenKind::Int => {
                let tok = self.advance();
                // The lexer already rejected out-of-range literals.
                let v = tok.text.parse::<i64>().map_err(|_| ParseError::Expected {
                    expected: "integer literal",
                    found: tok.describe(),
                    pos: tok.pos,
                })?;
                Ok((Expr::Int(v), 0))
            }
            TokenKind::Str => Ok((Expr::Str(self.advance().text), 0)),
            TokenKind::Ident => Ok((Expr::Var(self.advance().text), 0)),
            TokenKind::LParen => {
                if self.groups >= MAX_EXPR_DEPTH {
                    return Err(self.too_deep());
                }
                self.advance();
                self.groups += 1;
                let inner = self.comparison();
                self.groups -= 1;
                let inner = inner?;
                self.eat(TokenKind::RParen, "')' to close the group")?;
                Ok(inner)
            }
            _ => Err(self.error("expression")),
        }
    }
}

pub fn parse(tokens: Vec<Token>) -> Result<Vec<Stmt>, ParseError> {
    Parser::new(tokens).parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_src(src: &str) -> PResult<Vec<Stmt>> {
        parse(tokenize(src).unwrap())
    }

    fn bin(op: BinOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary { op, left: Box::new(left), right: Box::new(right) }
    }

    #[test]
    fn empty_program() {
        assert_eq!(parse_src("").unwrap(), vec![]);
    }

    #[test]
    fn precedence_and_associativity() {
        let stmts = parse_src("print(2 + 3 * 4 - 1);").unwrap();
        let expected = bin(
            BinOp::Sub,
            bin(BinOp::Add, Expr::Int(2), bin(BinOp::Mul, Expr::Int(3), Expr::Int(4))),
            Expr::Int(1),
        );
        assert_eq!(stmts, vec![Stmt::Print(expected)]);

        let stmts = parse_src("x = 8 / 4 / 2;").unwrap();
        let expected = bin(BinOp::Div, bin(BinOp::Div, Expr::Int(8), Expr::Int(4)), Expr::Int(2));
        assert_eq!(stmts, vec![Stmt::Assign { name: "x".into(), value: expected }]);
    }

    #[test]
    fn for_loop() {
        let stmts = parse_src("for (var i = 6; i >= 0; i = i - 1) { print(i); }").unwrap();
        let Stmt::For { init, cond, post, body } = &stmts[0] else {
            panic!("expected for loop, got {:?}", stmts[0]);
        };
        assert_eq!(**init, Stmt::VarDecl { name: "i".into(), init: Expr::Int(6) });
        assert_eq!(*cond, bin(BinOp::Ge, Expr::Var("i".into()), Expr::Int(0)));
        assert_eq!(
            **post,
            Stmt::Assign { name: "i".into(), value: bin(BinOp::Sub, Expr::Var("i".into()), Expr::Int(1)) }
        );
        assert_eq!(body, &vec![Stmt::Print(Expr::Var("i".into()))]);
    }

    #[test]
    fn blocks_and_expression_statements() {
        let stmts = parse_src("{ var a = \"hi\"; a; { (a); } }").unwrap();
        assert_eq!(
            stmts,
            vec![Stmt::Block(vec![
                Stmt::VarDecl { name: "a".into(), init: Expr::Str("hi".into()) },
                Stmt::Expr(Expr::Var("a".into())),
                Stmt::Block(vec![Stmt::Expr(Expr::Var("a".into()))]),
            ])]
        );
    }

    #[test]
    fn comparison_is_non_associative() {
        let err = parse_src("print(1 < 2 < 3);").unwrap_err();
        let ParseError::Expected { expected, found, .. } = err else {
            panic!("expected a missing-token error");
        };
        assert_eq!(expected, "')' after print argument");
        assert_eq!(found, "'<'");
    }

    #[test]
    fn missing_semicolon() {
        let err = parse_src("var x = 1\nprint(x);").unwrap_err();
        assert!(matches!(
            err,
            ParseError::Expected { expected: "';' after variable declaration", pos: crate::lexer::Pos { line: 2, col: 1 }, .. }
        ));
    }

    #[test]
    fn unclosed_block() {
        let err = parse_src("{ print(1);").unwrap_err();
        let ParseError::Expected { expected, found, .. } = err else {
            panic!("expected a missing-token error");
        };
        assert_eq!((expected, found.as_str()), ("'}' to close the block", "end of input"));
    }

    #[test]
    fn malformed_loop_header() {
        assert!(parse_src("for (var i = 0; i < 3) { }").is_err());
        assert!(parse_src("for var i = 0; i < 3; i = i + 1 { }").is_err());
        assert!(parse_src("for (var i = 0; i < 3; i = i + 1) print(i);").is_err());
    }

    #[test]
    fn long_chains_within_the_limit_parse() {
        let src = format!("print(1{});", " + 1".repeat(MAX_EXPR_DEPTH - 1));
        assert_eq!(parse_src(&src).unwrap().len(), 1);
    }

    #[test]
    fn overlong_chain_is_rejected() {
        let src = format!("print(1{});", " + 1".repeat(9_999));
        assert!(matches!(parse_src(&src), Err(ParseError::TooDeep { limit: MAX_EXPR_DEPTH, .. })));
        let src = format!("var x = 2{};", " * 2".repeat(MAX_EXPR_DEPTH + 1));
        assert!(matches!(parse_src(&src), Err(ParseError::TooDeep { .. })));
    }

    #[test]
    fn deep_parentheses_are_rejected() {
        let src = format!("print({}1{});", "(".repeat(10_000), ")".repeat(10_000));
        assert!(matches!(parse_src(&src), Err(ParseError::TooDeep { .. })));
        let src = format!("print({}1{});", "(".repeat(MAX_EXPR_DEPTH), ")".repeat(MAX_EXPR_DEPTH));
        assert!(parse_src(&src).is_ok());
    }

    #[test]
    fn equality_has_no_production() {
        assert!(parse_src("print(1 == 1);").is_err());
    }
}
