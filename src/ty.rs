//! Value types understood by the compiler and their sizes on x86-64.

/// Size in bytes of `int` and of every pointer on the target.
pub const WORD_SIZE: i64 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
  Int,
  Char,
  Ptr(Box<Type>),
  Array(Box<Type>, i64),
}

impl Type {
  pub fn int() -> Self {
    Self::Int
  }

  pub fn char() -> Self {
    Self::Char
  }

  pub fn pointer_to(base: Type) -> Self {
    Self::Ptr(Box::new(base))
  }

  pub fn array_of(base: Type, len: i64) -> Self {
    Self::Array(Box::new(base), len)
  }

  pub fn is_array(&self) -> bool {
    matches!(self, Self::Array(..))
  }

  /// The pointee of a pointer or the element type of an array.
  pub fn base(&self) -> Option<&Type> {
    match self {
      Self::Ptr(base) | Self::Array(base, _) => Some(base.as_ref()),
      Self::Int | Self::Char => None,
    }
  }

  pub fn size(&self) -> i64 {
    match self {
      Self::Char => 1,
      Self::Int | Self::Ptr(_) => WORD_SIZE,
      Self::Array(base, len) => base.size() * len,
    }
  }
}
