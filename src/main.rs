// src/main.rs
use std::fs;
use std::process;

use anyhow::Context;
use tracing::{error, info};

use minibc::config::{Config, Source, DEMO_SOURCE, USAGE};
use minibc::vm::StdoutSink;
use minibc::{codegen, lexer, parser, Error, VmConfig, VM};

fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("{}", USAGE);
            process::exit(2);
        }
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_max_level(config.log_level)
        .init();

    let source = match load_source(&config.source) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    };

    if let Err(e) = run(&config, &source) {
        error!(stage = e.stage(), "pipeline failed");
        eprintln!("{}", e);
        process::exit(1);
    }
}

fn load_source(source: &Source) -> anyhow::Result<String> {
    match source {
        Source::Demo => Ok(DEMO_SOURCE.to_string()),
        Source::File(path) => {
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
        }
    }
}

fn run(config: &Config, source: &str) -> Result<(), Error> {
    info!(source = ?config.source, dump = config.dump, "starting");

    if config.dump {
        println!("Input program:\n{}\n", source);
    }

    let tokens = lexer::tokenize(source)?;
    if config.dump {
        println!("Tokens:");
        for token in &tokens {
            println!("{}", token);
        }
        println!();
    }

    let stmts = parser::parse(tokens)?;
    if config.dump {
        println!("AST:");
        for stmt in &stmts {
            println!("{}", stmt);
        }
        println!();
    }

    let program = codegen::generate(&stmts)?;
    if config.dump {
        println!("Bytecode:");
        print!("{}", program);
        println!();
        println!("Output:");
    }

    let mut vm = VM::new(VmConfig { max_steps: config.max_steps });
    vm.execute(&program, &mut StdoutSink)?;
    Ok(())
}
