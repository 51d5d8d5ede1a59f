//! A miniature toolchain: source text is lexed, parsed into an AST, compiled
//! to flat stack bytecode and executed by a small virtual machine.
//!
//! Each stage has its own entry point (`lexer::tokenize`, `parser::parse`,
//! `codegen::generate`, `vm::execute`) and error type. The helpers below chain
//! them and stop at the first failure.

pub mod ast;
pub mod codegen;
pub mod config;
pub mod error;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod vm;

pub use error::Error;
pub use ir::Program;
pub use vm::{OutputSink, Value, VmConfig, VM};

/// Lex, parse and generate bytecode for `source`.
pub fn compile(source: &str) -> Result<Program, Error> {
    let tokens = lexer::tokenize(source)?;
    let stmts = parser::parse(tokens)?;
    Ok(codegen::generate(&stmts)?)
}

/// Compile and run `source`, streaming printed values into `sink`.
pub fn run_with(source: &str, config: &VmConfig, sink: &mut dyn OutputSink) -> Result<(), Error> {
    let program = compile(source)?;
    VM::new(*config).execute(&program, sink)?;
    Ok(())
}

/// Compile and run `source`, returning everything it printed.
pub fn run(source: &str) -> Result<Vec<Value>, Error> {
    let mut out: Vec<Value> = Vec::new();
    run_with(source, &VmConfig::default(), &mut out)?;
    Ok(out)
}
