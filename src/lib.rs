//! Crate root: wires together the compilation pipeline.
//!
//! - `tokenizer` performs lexical analysis and produces a flat token stream.
//! - `parser` owns all syntactic knowledge and returns the program AST.
//! - `resolve` assigns types, normalises pointer arithmetic and folds `sizeof`.
//! - `codegen` lowers the typed program into x86-64 assembly.
//! - `error` centralises reporting utilities shared by the other modules.

pub mod ast;
pub mod codegen;
pub mod error;
pub mod parser;
pub mod resolve;
pub mod tokenizer;
pub mod ty;

use log::debug;

pub use error::{CompileError, CompileResult};

/// Compile a source string into Intel-syntax assembly.
pub fn generate_assembly(src: &str) -> CompileResult<String> {
  let tokens = tokenizer::tokenize(src)?;
  debug!("tokenized {} tokens", tokens.len());
  let mut program = parser::parse(tokens, src)?;
  debug!(
    "parsed {} functions and {} globals",
    program.functions.len(),
    program.globals.len()
  );
  resolve::add_type(&mut program, src)?;
  codegen::generate(&mut program, src)
}
