// src/ast.rs
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add, Sub, Mul, Div,
    Lt, Le, Gt, Ge,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    Str(String),
    Var(String),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    VarDecl {
        name: String,
        init: Expr,
    },
    Assign {
        name: String,
        value: Expr,
    },
    Print(Expr),
    Block(Vec<Stmt>),
    /// `init` is a `VarDecl`, `Assign` or `Expr`; so is `post`.
    For {
        init: Box<Stmt>,
        cond: Expr,
        post: Box<Stmt>,
        body: Vec<Stmt>,
    },
    Expr(Expr),
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::Int(i) => write!(f, "{}", i),
            Expr::Str(s) => write!(f, "\"{}\"", s),
            Expr::Var(name) => write!(f, "{}", name),
            Expr::Binary { op, left, right } => write!(f, "({} {} {})", left, op.symbol(), right),
        }
    }
}

impl Stmt {
    fn write_indented(&self, f: &mut fmt::Formatter, depth: usize) -> fmt::Result {
        let pad = "  ".repeat(depth);
        match self {
            Stmt::VarDecl { name, init } => write!(f, "{}var {} = {};", pad, name, init),
            Stmt::Assign { name, value } => write!(f, "{}{} = {};", pad, name, value),
            Stmt::Print(e) => write!(f, "{}print({});", pad, e),
            Stmt::Expr(e) => write!(f, "{}{};", pad, e),
            Stmt::Block(body) => {
                writeln!(f, "{}{{", pad)?;
                for s in body {
                    s.write_indented(f, depth + 1)?;
                    writeln!(f)?;
                }
                write!(f, "{}}}", pad)
            }
            Stmt::For { init, cond, post, body } => {
                let post = post.to_string();
                writeln!(f, "{}for ({} {}; {}) {{", pad, init, cond, post.trim_end_matches(';'))?;
                for s in body {
                    s.write_indented(f, depth + 1)?;
                    writeln!(f)?;
                }
                write!(f, "{}}}", pad)
            }
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.write_indented(f, 0)
    }
}
