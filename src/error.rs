//! Shared error utilities used across the compilation pipeline.
//!
//! Every diagnostic is anchored at a byte offset in the source. Rendering
//! reprints the line that contains the offset and puts a caret under the
//! offending column, in the style of chibicc.

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu)]
pub enum CompileError {
  /// A character that starts no token.
  #[snafu(display("{line}\n{marker} {message}"))]
  Lex {
    loc: usize,
    line: String,
    marker: String,
    message: String,
  },
  /// A token the grammar does not allow at this point.
  #[snafu(display("{line}\n{marker} {message}"))]
  Syntax {
    loc: usize,
    line: String,
    marker: String,
    message: String,
  },
  /// An identifier with no visible declaration.
  #[snafu(display("{line}\n{marker} {message}"))]
  Name {
    loc: usize,
    line: String,
    marker: String,
    message: String,
  },
  /// Invalid operand types, non-lvalues and conflicting definitions.
  #[snafu(display("{line}\n{marker} {message}"))]
  Type {
    loc: usize,
    line: String,
    marker: String,
    message: String,
  },
}

/// Split out the source line holding `loc` and build the caret marker for it.
fn locate(src: &str, loc: usize) -> (usize, String, String) {
  let mut safe_loc = loc.min(src.len());
  while !src.is_char_boundary(safe_loc) {
    safe_loc -= 1;
  }
  let start = src[..safe_loc].rfind('\n').map_or(0, |i| i + 1);
  let end = src[safe_loc..]
    .find('\n')
    .map_or(src.len(), |i| safe_loc + i);
  let column = src[start..safe_loc].chars().count();
  let marker = format!("{}^", " ".repeat(column));
  (safe_loc, src[start..end].to_string(), marker)
}

impl CompileError {
  pub fn lex(src: &str, loc: usize, message: impl Into<String>) -> Self {
    let (loc, line, marker) = locate(src, loc);
    Self::Lex {
      loc,
      line,
      marker,
      message: message.into(),
    }
  }

  pub fn syntax(src: &str, loc: usize, message: impl Into<String>) -> Self {
    let (loc, line, marker) = locate(src, loc);
    Self::Syntax {
      loc,
      line,
      marker,
      message: message.into(),
    }
  }

  pub fn name(src: &str, loc: usize, message: impl Into<String>) -> Self {
    let (loc, line, marker) = locate(src, loc);
    Self::Name {
      loc,
      line,
      marker,
      message: message.into(),
    }
  }

  pub fn ty(src: &str, loc: usize, message: impl Into<String>) -> Self {
    let (loc, line, marker) = locate(src, loc);
    Self::Type {
      loc,
      line,
      marker,
      message: message.into(),
    }
  }

  /// Byte offset in the source the error points at.
  pub fn loc(&self) -> usize {
    match self {
      Self::Lex { loc, .. }
      | Self::Syntax { loc, .. }
      | Self::Name { loc, .. }
      | Self::Type { loc, .. } => *loc,
    }
  }

  /// The bare message, without the source excerpt.
  pub fn message(&self) -> &str {
    match self {
      Self::Lex { message, .. }
      | Self::Syntax { message, .. }
      | Self::Name { message, .. }
      | Self::Type { message, .. } => message,
    }
  }
}
