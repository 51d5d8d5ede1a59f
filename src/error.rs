// src/error.rs
use thiserror::Error;

use crate::ir::OpCode;
use crate::lexer::Pos;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexError {
    #[error("unexpected character '{ch}' at {pos}")]
    UnexpectedChar { ch: char, pos: Pos },
    #[error("unterminated string literal starting at {pos}")]
    UnterminatedString { pos: Pos },
    #[error("integer literal {text} out of range at {pos}")]
    IntegerOverflow { text: String, pos: Pos },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("expected {expected}, found {found} at {pos}")]
    Expected {
        expected: &'static str,
        found: String,
        pos: Pos,
    },
    #[error("expression nested deeper than {limit} levels at {pos}")]
    TooDeep { limit: usize, pos: Pos },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodegenError {
    #[error("undeclared variable '{name}'")]
    UndeclaredVariable { name: String },
    #[error("variable '{name}' is already declared in this scope")]
    Redeclaration { name: String },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("stack underflow at instruction {ip}")]
    StackUnderflow { ip: usize },
    #[error("type mismatch at instruction {ip}: {op} on {left} and {right}")]
    TypeMismatch {
        ip: usize,
        op: OpCode,
        left: &'static str,
        right: &'static str,
    },
    #[error("division by zero at instruction {ip}")]
    DivisionByZero { ip: usize },
    #[error("integer overflow in {op} at instruction {ip}")]
    Overflow { ip: usize, op: OpCode },
    #[error("variable slot {slot} out of range at instruction {ip}")]
    SlotOutOfRange { ip: usize, slot: i64 },
    #[error("jump target {target} out of range at instruction {ip}")]
    JumpOutOfRange { ip: usize, target: i64 },
    #[error("{op} at instruction {ip} is missing its operand")]
    MissingOperand { ip: usize, op: OpCode },
    #[error("{op} at instruction {ip} has an operand of the wrong kind")]
    InvalidOperand { ip: usize, op: OpCode },
    #[error("loop condition at instruction {ip} is a {found}, expected an integer")]
    ConditionType { ip: usize, found: &'static str },
    #[error("failed to write output at instruction {ip}: {message}")]
    Output { ip: usize, message: String },
    #[error("program ended without HALT")]
    MissingHalt,
    #[error("execution stopped after {limit} steps")]
    StepLimitExceeded { limit: u64 },
}

/// Failure of any pipeline stage. Earlier stages failing means later ones never ran.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("Lexer Error: {0}")]
    Lex(#[from] LexError),
    #[error("Parser Error: {0}")]
    Parse(#[from] ParseError),
    #[error("Codegen Error: {0}")]
    Codegen(#[from] CodegenError),
    #[error("Runtime Error: {0}")]
    Runtime(#[from] RuntimeError),
}

impl Error {
    /// Short name of the stage that failed, used for logging.
    pub fn stage(&self) -> &'static str {
        match self {
            Error::Lex(_) => "lex",
            Error::Parse(_) => "parse",
            Error::Codegen(_) => "codegen",
            Error::Runtime(_) => "runtime",
        }
    }
}
