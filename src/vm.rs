// src/vm.rs
use std::fmt;
use std::io::{self, Write};

use tracing::{debug, trace, warn};

use crate::error::RuntimeError;
use crate::ir::{Instruction, OpCode, Operand, Program};

type RResult<T> = Result<T, RuntimeError>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Str(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Str(_) => "string",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Str(s) => write!(f, "{}", s),
        }
    }
}

/// Receives printed values in execution order. A failed write stops execution.
pub trait OutputSink {
    fn push(&mut self, value: &Value) -> io::Result<()>;
}

impl OutputSink for Vec<Value> {
    fn push(&mut self, value: &Value) -> io::Result<()> {
        Vec::push(self, value.clone());
        Ok(())
    }
}

/// Writes one value per line to stdout.
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn push(&mut self, value: &Value) -> io::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", value)?;
        out.flush()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VmConfig {
    /// Upper bound on executed instructions; `None` runs until HALT.
    pub max_steps: Option<u64>,
}

pub struct VM {
    config: VmConfig,
    stack: Vec<Value>,
    slots: Vec<Value>,
}

impl VM {
    pub fn new(config: VmConfig) -> Self {
        Self {
            config,
            stack: Vec::with_capacity(64),
            slots: Vec::new(),
        }
    }

    /// Height of the operand stack, as left by the last `execute`.
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    fn pop(&mut self, ip: usize) -> RResult<Value> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow { ip })
    }

    fn operand<'p>(ip: usize, ins: &'p Instruction) -> RResult<&'p Operand> {
        ins.operand.as_ref().ok_or(RuntimeError::MissingOperand { ip, op: ins.op })
    }

    fn int_operand(ip: usize, ins: &Instruction) -> RResult<i64> {
        match Self::operand(ip, ins)? {
            Operand::Int(n) => Ok(*n),
            Operand::Str(_) => Err(RuntimeError::InvalidOperand { ip, op: ins.op }),
        }
    }

    fn slot(&self, ip: usize, ins: &Instruction) -> RResult<usize> {
        let slot = Self::int_operand(ip, ins)?;
        match usize::try_from(slot) {
            Ok(i) if i < self.slots.len() => Ok(i),
            _ => Err(RuntimeError::SlotOutOfRange { ip, slot }),
        }
    }

    fn target(ip: usize, ins: &Instruction, len: usize) -> RResult<usize> {
        let target = Self::int_operand(ip, ins)?;
        match usize::try_from(target) {
            Ok(t) if t < len => Ok(t),
            _ => Err(RuntimeError::JumpOutOfRange { ip, target }),
        }
    }

    fn int_pair(&mut self, ip: usize, op: OpCode) -> RResult<(i64, i64)> {
        let right = self.pop(ip)?;
        let left = self.pop(ip)?;
        match (left, right) {
            (Value::Int(a), Value::Int(b)) => Ok((a, b)),
            (a, b) => Err(RuntimeError::TypeMismatch {
                ip,
                op,
                left: a.type_name(),
                right: b.type_name(),
            }),
        }
    }

    fn arith(&mut self, ip: usize, op: OpCode) -> RResult<()> {
        let (a, b) = self.int_pair(ip, op)?;
        let result = match op {
            OpCode::Add => a.checked_add(b),
            OpCode::Sub => a.checked_sub(b),
            OpCode::Mul => a.checked_mul(b),
            OpCode::Div if b == 0 => return Err(RuntimeError::DivisionByZero { ip }),
            OpCode::Div => a.checked_div(b),
            _ => unreachable!("arith called with {}", op),
        };
        let v = result.ok_or(RuntimeError::Overflow { ip, op })?;
        self.stack.push(Value::Int(v));
        Ok(())
    }

    fn compare(&mut self, ip: usize, op: OpCode) -> RResult<()> {
        let (a, b) = self.int_pair(ip, op)?;
        let holds = match op {
            OpCode::CmpLt => a < b,
            OpCode::CmpLe => a <= b,
            OpCode::CmpGt => a > b,
            OpCode::CmpGe => a >= b,
            _ => unreachable!("compare called with {}", op),
        };
        self.stack.push(Value::Int(holds as i64));
        Ok(())
    }

    /// Runs `program` from instruction 0 until HALT. Values already handed to
    /// `sink` stay there if execution fails part way.
    pub fn execute(&mut self, program: &Program, sink: &mut dyn OutputSink) -> RResult<()> {
        let code = &program.instructions;
        self.stack.clear();
        self.slots = vec![Value::Int(0); program.slot_count];

        let mut ip = 0;
        let mut steps: u64 = 0;
        let mut printed = 0usize;

        loop {
            let Some(ins) = code.get(ip) else {
                return Err(RuntimeError::MissingHalt);
            };
            if let Some(limit) = self.config.max_steps {
                if steps >= limit {
                    warn!(limit, ip, "execution stopped: step limit reached");
                    return Err(RuntimeError::StepLimitExceeded { limit });
                }
            }
            steps += 1;
            trace!(ip, op = %ins.op, depth = self.stack.len(), "exec");

            match ins.op {
                OpCode::Push => {
                    let v = match Self::operand(ip, ins)? {
                        Operand::Int(n) => Value::Int(*n),
                        Operand::Str(s) => Value::Str(s.clone()),
                    };
                    self.stack.push(v);
                }
                OpCode::Pop => {
                    self.pop(ip)?;
                }
                OpCode::Store => {
                    let slot = self.slot(ip, ins)?;
                    let v = self.pop(ip)?;
                    self.slots[slot] = v;
                }
                OpCode::Load => {
                    let slot = self.slot(ip, ins)?;
                    self.stack.push(self.slots[slot].clone());
                }
                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div => self.arith(ip, ins.op)?,
                OpCode::CmpLt | OpCode::CmpLe | OpCode::CmpGt | OpCode::CmpGe => self.compare(ip, ins.op)?,
                OpCode::JmpIfFalse => {
                    let target = Self::target(ip, ins, code.len())?;
                    match self.pop(ip)? {
                        Value::Int(0) => {
                            ip = target;
                            continue;
                        }
                        Value::Int(_) => {}
                        other => {
                            return Err(RuntimeError::ConditionType { ip, found: other.type_name() });
                        }
                    }
                }
                OpCode::Jmp => {
                    ip = Self::target(ip, ins, code.len())?;
                    continue;
                }
                OpCode::Print => {
                    let v = self.pop(ip)?;
                    sink.push(&v).map_err(|e| {
                        warn!(ip, error = %e, "failed to write program output");
                        RuntimeError::Output { ip, message: e.to_string() }
                    })?;
                    printed += 1;
                }
                OpCode::Halt => {
                    debug!(steps, printed, "execution halted");
                    return Ok(());
                }
            }
            ip += 1;
        }
    }
}

impl Default for VM {
    fn default() -> Self {
        Self::new(VmConfig::default())
    }
}

/// Executes `program` with no step limit and collects everything it prints.
pub fn execute(program: &Program) -> RResult<Vec<Value>> {
    let mut out: Vec<Value> = Vec::new();
    VM::default().execute(program, &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prog(slot_count: usize, instructions: Vec<Instruction>) -> Program {
        Program { instructions, slot_count }
    }

    fn int(op: OpCode, n: i64) -> Instruction {
        Instruction::with_int(op, n)
    }

    fn op(op: OpCode) -> Instruction {
        Instruction::new(op)
    }

    #[test]
    fn halt_only() {
        let mut vm = VM::default();
        let mut out: Vec<Value> = Vec::new();
        vm.execute(&prog(0, vec![op(OpCode::Halt)]), &mut out).unwrap();
        assert!(out.is_empty());
        assert_eq!(vm.stack_depth(), 0);
    }

    #[test]
    fn arithmetic_and_print() {
        let p = prog(1, vec![
            int(OpCode::Push, 7),
            int(OpCode::Push, 2),
            op(OpCode::Div),
            int(OpCode::Store, 0),
            int(OpCode::Load, 0),
            Instruction::push_str("x"),
            op(OpCode::Print),
            op(OpCode::Print),
            op(OpCode::Halt),
        ]);
        assert_eq!(execute(&p).unwrap(), vec![Value::Str("x".into()), Value::Int(3)]);
    }

    #[test]
    fn comparisons_yield_integers() {
        let p = prog(0, vec![
            int(OpCode::Push, 1), int(OpCode::Push, 2), op(OpCode::CmpLt), op(OpCode::Print),
            int(OpCode::Push, 2), int(OpCode::Push, 2), op(OpCode::CmpGt), op(OpCode::Print),
            int(OpCode::Push, 2), int(OpCode::Push, 2), op(OpCode::CmpLe), op(OpCode::Print),
            op(OpCode::Halt),
        ]);
        assert_eq!(execute(&p).unwrap(), vec![Value::Int(1), Value::Int(0), Value::Int(1)]);
    }

    #[test]
    fn slots_start_at_zero() {
        let p = prog(2, vec![int(OpCode::Load, 1), op(OpCode::Print), op(OpCode::Halt)]);
        assert_eq!(execute(&p).unwrap(), vec![Value::Int(0)]);
    }

    #[test]
    fn division_by_zero_keeps_earlier_output() {
        let p = prog(0, vec![
            int(OpCode::Push, 1), op(OpCode::Print),
            int(OpCode::Push, 5), int(OpCode::Push, 0), op(OpCode::Div), op(OpCode::Print),
            op(OpCode::Halt),
        ]);
        let mut out: Vec<Value> = Vec::new();
        let err = VM::default().execute(&p, &mut out).unwrap_err();
        assert_eq!(err, RuntimeError::DivisionByZero { ip: 4 });
        assert_eq!(out, vec![Value::Int(1)]);
    }

    #[test]
    fn stack_underflow() {
        let p = prog(0, vec![op(OpCode::Pop), op(OpCode::Halt)]);
        assert_eq!(execute(&p), Err(RuntimeError::StackUnderflow { ip: 0 }));
    }

    #[test]
    fn string_arithmetic_is_rejected() {
        let p = prog(0, vec![Instruction::push_str("a"), int(OpCode::Push, 1), op(OpCode::Add), op(OpCode::Halt)]);
        assert_eq!(
            execute(&p),
            Err(RuntimeError::TypeMismatch { ip: 2, op: OpCode::Add, left: "string", right: "integer" })
        );
    }

    #[test]
    fn overflow_is_an_error() {
        let p = prog(0, vec![int(OpCode::Push, i64::MAX), int(OpCode::Push, 1), op(OpCode::Add), op(OpCode::Halt)]);
        assert_eq!(execute(&p), Err(RuntimeError::Overflow { ip: 2, op: OpCode::Add }));
    }

    #[test]
    fn out_of_range_slot_and_jump() {
        let p = prog(1, vec![int(OpCode::Load, 1), op(OpCode::Halt)]);
        assert_eq!(execute(&p), Err(RuntimeError::SlotOutOfRange { ip: 0, slot: 1 }));
        let p = prog(0, vec![int(OpCode::Store, -1), op(OpCode::Halt)]);
        assert_eq!(execute(&p), Err(RuntimeError::SlotOutOfRange { ip: 0, slot: -1 }));
        let p = prog(0, vec![int(OpCode::Jmp, 9), op(OpCode::Halt)]);
        assert_eq!(execute(&p), Err(RuntimeError::JumpOutOfRange { ip: 0, target: 9 }));
    }

    #[test]
    fn missing_halt_and_operand() {
        assert_eq!(execute(&prog(0, vec![])), Err(RuntimeError::MissingHalt));
        assert_eq!(execute(&prog(0, vec![int(OpCode::Push, 1)])), Err(RuntimeError::MissingHalt));
        assert_eq!(
            execute(&prog(0, vec![op(OpCode::Push), op(OpCode::Halt)])),
            Err(RuntimeError::MissingOperand { ip: 0, op: OpCode::Push })
        );
    }

    #[test]
    fn conditional_jump() {
        // 3, 2, 1 via a hand-written countdown.
        let p = prog(1, vec![
            int(OpCode::Push, 3), int(OpCode::Store, 0),
            int(OpCode::Load, 0), int(OpCode::Push, 0), op(OpCode::CmpGt), int(OpCode::JmpIfFalse, 13),
            int(OpCode::Load, 0), op(OpCode::Print),
            int(OpCode::Load, 0), int(OpCode::Push, 1), op(OpCode::Sub), int(OpCode::Store, 0),
            int(OpCode::Jmp, 2),
            op(OpCode::Halt),
        ]);
        assert_eq!(execute(&p).unwrap(), vec![Value::Int(3), Value::Int(2), Value::Int(1)]);
    }

    #[test]
    fn string_condition_is_rejected() {
        let p = prog(0, vec![Instruction::push_str("yes"), int(OpCode::JmpIfFalse, 2), op(OpCode::Halt)]);
        assert_eq!(execute(&p), Err(RuntimeError::ConditionType { ip: 1, found: "string" }));
    }

    struct BrokenPipe {
        accepted: usize,
    }

    impl OutputSink for BrokenPipe {
        fn push(&mut self, _value: &Value) -> io::Result<()> {
            if self.accepted == 0 {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
            }
            self.accepted -= 1;
            Ok(())
        }
    }

    #[test]
    fn failed_write_stops_execution() {
        let p = prog(0, vec![
            int(OpCode::Push, 1), op(OpCode::Print),
            int(OpCode::Push, 2), op(OpCode::Print),
            int(OpCode::Push, 3), op(OpCode::Print),
            op(OpCode::Halt),
        ]);
        let mut sink = BrokenPipe { accepted: 1 };
        let err = VM::default().execute(&p, &mut sink).unwrap_err();
        assert_eq!(err, RuntimeError::Output { ip: 3, message: "pipe closed".into() });
    }

    #[test]
    fn step_limit() {
        let p = prog(0, vec![int(OpCode::Jmp, 0), op(OpCode::Halt)]);
        let mut vm = VM::new(VmConfig { max_steps: Some(100) });
        let err = vm.execute(&p, &mut Vec::<Value>::new()).unwrap_err();
        assert_eq!(err, RuntimeError::StepLimitExceeded { limit: 100 });
    }
}
