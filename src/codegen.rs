// src/codegen.rs
use std::collections::HashMap;

use tracing::debug;

use crate::ast::*;
use crate::error::CodegenError;
use crate::ir::{Instruction, OpCode, Operand, Program};

type CResult<T> = Result<T, CodegenError>;

/// Single-pass bytecode emitter. Name resolution is lexical and happens
/// entirely here; the VM only ever sees slot indices.
pub struct Codegen {
    code: Vec<Instruction>,
    scopes: Vec<HashMap<String, usize>>,
    slot_count: usize,
}

impl Codegen {
    pub fn new() -> Self {
        Self {
            code: Vec::with_capacity(64),
            scopes: vec![HashMap::new()],
            slot_count: 0,
        }
    }

    fn emit(&mut self, ins: Instruction) -> usize {
        let p = self.code.len();
        self.code.push(ins);
        p
    }

    fn patch(&mut self, pos: usize, target: usize) {
        if let Some(ins) = self.code.get_mut(pos) {
            ins.operand = Some(Operand::Int(target as i64));
        }
    }

    fn resolve(&self, name: &str) -> CResult<usize> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
            .ok_or_else(|| CodegenError::UndeclaredVariable { name: name.to_string() })
    }

    fn declare(&mut self, name: &str) -> CResult<usize> {
        let slot = self.slot_count;
        // The global scope at index 0 is never popped.
        let depth = self.scopes.len() - 1;
        let scope = &mut self.scopes[depth];
        if scope.contains_key(name) {
            return Err(CodegenError::Redeclaration { name: name.to_string() });
        }
        scope.insert(name.to_string(), slot);
        self.slot_count += 1;
        Ok(slot)
    }

    fn scoped<F>(&mut self, f: F) -> CResult<()>
    where
        F: FnOnce(&mut Self) -> CResult<()>,
    {
        self.scopes.push(HashMap::new());
        let result = f(self);
        self.scopes.pop();
        result
    }

    pub fn generate(mut self, stmts: &[Stmt]) -> CResult<Program> {
        for s in stmts {
            self.stmt(s)?;
        }
        self.emit(Instruction::new(OpCode::Halt));
        debug!(instructions = self.code.len(), slots = self.slot_count, "code generation finished");
        Ok(Program { instructions: self.code, slot_count: self.slot_count })
    }

    fn stmt(&mut self, s: &Stmt) -> CResult<()> {
        match s {
            Stmt::VarDecl { name, init } => {
                self.expr(init)?;
                let slot = self.declare(name)?;
                self.emit(Instruction::with_int(OpCode::Store, slot as i64));
            }
            Stmt::Assign { name, value } => {
                self.expr(value)?;
                let slot = self.resolve(name)?;
                self.emit(Instruction::with_int(OpCode::Store, slot as i64));
            }
            Stmt::Print(e) => {
                self.expr(e)?;
                self.emit(Instruction::new(OpCode::Print));
            }
            Stmt::Expr(e) => {
                self.expr(e)?;
                self.emit(Instruction::new(OpCode::Pop));
            }
            Stmt::Block(body) => {
                self.scoped(|cg| body.iter().try_for_each(|s| cg.stmt(s)))?;
            }
            Stmt::For { init, cond, post, body } => {
                self.scoped(|cg| {
                    cg.stmt(init)?;
                    let start = cg.code.len();
                    cg.expr(cond)?;
                    let jf = cg.emit(Instruction::with_int(OpCode::JmpIfFalse, 0));
                    cg.scoped(|cg| body.iter().try_for_each(|s| cg.stmt(s)))?;
                    cg.stmt(post)?;
                    cg.emit(Instruction::with_int(OpCode::Jmp, start as i64));
                    let end = cg.code.len();
                    cg.patch(jf, end);
                    Ok(())
                })?;
            }
        }
        Ok(())
    }

    fn expr(&mut self, e: &Expr) -> CResult<()> {
        match e {
            Expr::Int(i) => { self.emit(Instruction::with_int(OpCode::Push, *i)); }
            Expr::Str(s) => { self.emit(Instruction::push_str(s.as_str())); }
            Expr::Var(name) => {
                let slot = self.resolve(name)?;
                self.emit(Instruction::with_int(OpCode::Load, slot as i64));
            }
            Expr::Binary { op, left, right } => {
                self.expr(left)?;
                self.expr(right)?;
                let op = match op {
                    BinOp::Add => OpCode::Add,
                    BinOp::Sub => OpCode::Sub,
                    BinOp::Mul => OpCode::Mul,
                    BinOp::Div => OpCode::Div,
                    BinOp::Lt => OpCode::CmpLt,
                    BinOp::Le => OpCode::CmpLe,
                    BinOp::Gt => OpCode::CmpGt,
                    BinOp::Ge => OpCode::CmpGe,
                };
                self.emit(Instruction::new(op));
            }
        }
        Ok(())
    }
}

impl Default for Codegen {
    fn default() -> Self {
        Self::new()
    }
}

pub fn generate(stmts: &[Stmt]) -> Result<Program, CodegenError> {
    Codegen::new().generate(stmts)
}
