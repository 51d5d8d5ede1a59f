// src/ir.rs
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Push, Pop, Store, Load,
    Add, Sub, Mul, Div,
    CmpLt, CmpLe, CmpGt, CmpGe,
    JmpIfFalse, Jmp,
    Print,
    Halt,
}

impl OpCode {
    pub fn name(self) -> &'static str {
        match self {
            OpCode::Push => "PUSH",
            OpCode::Pop => "POP",
            OpCode::Store => "STORE",
            OpCode::Load => "LOAD",
            OpCode::Add => "ADD",
            OpCode::Sub => "SUB",
            OpCode::Mul => "MUL",
            OpCode::Div => "DIV",
            OpCode::CmpLt => "CMP_LT",
            OpCode::CmpLe => "CMP_LE",
            OpCode::CmpGt => "CMP_GT",
            OpCode::CmpGe => "CMP_GE",
            OpCode::JmpIfFalse => "JMP_IF_FALSE",
            OpCode::Jmp => "JMP",
            OpCode::Print => "PRINT",
            OpCode::Halt => "HALT",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Integer operands are literals, slot indices or absolute jump targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Int(i64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub op: OpCode,
    pub operand: Option<Operand>,
}

impl Instruction {
    pub fn new(op: OpCode) -> Self {
        Self { op, operand: None }
    }

    pub fn with_int(op: OpCode, n: i64) -> Self {
        Self { op, operand: Some(Operand::Int(n)) }
    }

    pub fn push_str(s: impl Into<String>) -> Self {
        Self { op: OpCode::Push, operand: Some(Operand::Str(s.into())) }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.operand {
            None => write!(f, "{}", self.op),
            Some(Operand::Int(n)) => write!(f, "{} {}", self.op, n),
            Some(Operand::Str(s)) => write!(f, "{} \"{}\"", self.op, s),
        }
    }
}

/// Flat bytecode plus the number of variable slots it addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    pub instructions: Vec<Instruction>,
    pub slot_count: usize,
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, instr) in self.instructions.iter().enumerate() {
            writeln!(f, "{}: {}", i, instr)?;
        }
        Ok(())
    }
}
