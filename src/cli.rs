use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use clap::{App, Arg, ArgMatches};
use log::{LevelFilter, SetLoggerError};
use simplelog::{Config, WriteLogger};
use snafu::{ResultExt, Snafu};

/// Exit code for every failure: bad input program, unusable log or output file.
pub const ERR_COMPILE: i32 = 1;

#[derive(Debug, Snafu)]
pub enum CliError {
  #[snafu(display("cannot create log file {}: {source}", path.display()))]
  LogFile { path: PathBuf, source: io::Error },
  #[snafu(display("cannot install logger: {source}"))]
  Logger { source: SetLoggerError },
  #[snafu(display("cannot write {}: {source}", path.display()))]
  Output { path: PathBuf, source: io::Error },
}

pub fn configure_cli() -> App<'static, 'static> {
  App::new("rcc9")
    .version(env!("CARGO_PKG_VERSION"))
    .about("Compiles a small subset of C into x86-64 assembly (Intel syntax)")
    .arg(
      Arg::with_name("source")
        .index(1)
        .required(true)
        .help("The whole program text to compile"),
    )
    .arg(
      Arg::with_name("output")
        .short("o")
        .long("output")
        .takes_value(true)
        .help("Write the assembly to this file instead of standard output"),
    )
    .arg(
      Arg::with_name("log")
        .long("log")
        .takes_value(true)
        .help("Write a trace of every compilation stage to this file"),
    )
    .arg(
      Arg::with_name("log-level")
        .long("log-level")
        .takes_value(true)
        .possible_values(&["error", "warn", "info", "debug", "trace"])
        .default_value("debug")
        .help("How much detail to write to the --log file"),
    )
}

/// Everything the binary needs from the command line.
#[derive(Debug, Clone)]
pub struct Options {
  pub source: String,
  pub output: Option<PathBuf>,
  pub log_file: Option<PathBuf>,
  pub log_level: LevelFilter,
}

impl Options {
  pub fn from_matches(matches: &ArgMatches) -> Self {
    Self {
      source: matches.value_of("source").unwrap_or_default().to_string(),
      output: matches.value_of("output").map(PathBuf::from),
      log_file: matches.value_of("log").map(PathBuf::from),
      log_level: matches
        .value_of("log-level")
        .and_then(|level| level.parse().ok())
        .unwrap_or(LevelFilter::Debug),
    }
  }
}

/// Route the `log` facade to `path`. Without this call logging is a no-op.
pub fn configure_logging(path: &Path, level: LevelFilter) -> Result<(), CliError> {
  let file = File::create(path).context(LogFileSnafu { path })?;
  WriteLogger::init(level, Config::default(), file).context(LoggerSnafu)
}

pub fn write_output(path: &Path, asm: &str) -> Result<(), CliError> {
  std::fs::write(path, asm).context(OutputSnafu { path })
}
