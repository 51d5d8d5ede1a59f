// src/config.rs
use std::env;
use std::path::PathBuf;

use thiserror::Error;
use tracing::Level;

pub const LOG_ENV: &str = "MINIBC_LOG";
pub const SOURCE_EXTENSION: &str = "mb";

pub const USAGE: &str = "Usage: minibc [--dump] [--max-steps N] [file.mb]";

/// Runs when no file is given.
pub const DEMO_SOURCE: &str = r#"
for (var i = 6; i >= 0; i = i - 1) {
    print(i);
}
"#;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("unknown option '{0}'")]
    UnknownOption(String),
    #[error("--max-steps needs a positive integer, got '{0}'")]
    BadStepLimit(String),
    #[error("source files must have the .mb extension: {0}")]
    BadExtension(String),
    #[error("only one source file may be given")]
    TooManyFiles,
    #[error("invalid MINIBC_LOG level '{0}'")]
    BadLogLevel(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Demo,
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub source: Source,
    pub dump: bool,
    pub max_steps: Option<u64>,
    pub log_level: Level,
}

impl Config {
    /// Reads the process arguments (without the program name) and `MINIBC_LOG`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let level = env::var(LOG_ENV).ok();
        Self::from_args(env::args().skip(1), level.as_deref())
    }

    pub fn from_args<I>(args: I, log_level: Option<&str>) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut source = Source::Demo;
        let mut dump = false;
        let mut max_steps = None;

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--dump" => dump = true,
                "--max-steps" => {
                    let raw = args.next().unwrap_or_default();
                    match raw.parse::<u64>() {
                        Ok(n) if n > 0 => max_steps = Some(n),
                        _ => return Err(ConfigError::BadStepLimit(raw)),
                    }
                }
                opt if opt.starts_with("--") => return Err(ConfigError::UnknownOption(opt.to_string())),
                raw => {
                    if source != Source::Demo {
                        return Err(ConfigError::TooManyFiles);
                    }
                    let path = PathBuf::from(raw);
                    if path.extension().and_then(|e| e.to_str()) != Some(SOURCE_EXTENSION) {
                        return Err(ConfigError::BadExtension(raw.to_string()));
                    }
                    source = Source::File(path);
                }
            }
        }

        Ok(Self { source, dump, max_steps, log_level: parse_level(log_level)? })
    }
}

fn parse_level(raw: Option<&str>) -> Result<Level, ConfigError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(Level::WARN),
        Some(level) => level.parse::<Level>().map_err(|_| ConfigError::BadLogLevel(level.to_string())),
    }
}
