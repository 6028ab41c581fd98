//! Syntax tree, variables and functions shared by the parser, the type
//! resolver and the code generator.

use crate::ty::Type;

/// Binary operators that survive parsing. `>` and `>=` are rewritten into
/// `Lt`/`Le` with swapped operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  Eq,
  Ne,
  Lt,
  Le,
}

/// Where a variable lives: an index into the current function's locals or
/// into the program's globals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarRef {
  Local(usize),
  Global(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Var {
  pub name: String,
  pub ty: Type,
  pub is_local: bool,
  /// Distance below `rbp`; assigned by the code generator.
  pub offset: i64,
}

impl Var {
  pub fn local(name: impl Into<String>, ty: Type) -> Self {
    Self {
      name: name.into(),
      ty,
      is_local: true,
      offset: 0,
    }
  }

  pub fn global(name: impl Into<String>, ty: Type) -> Self {
    Self {
      name: name.into(),
      ty,
      is_local: false,
      offset: 0,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
  Num(i64),
  Var(VarRef),
  Binary {
    op: BinaryOp,
    lhs: Box<Node>,
    rhs: Box<Node>,
  },
  Assign {
    lhs: Box<Node>,
    rhs: Box<Node>,
  },
  Addr(Box<Node>),
  Deref(Box<Node>),
  Return(Box<Node>),
  Block(Vec<Node>),
  If {
    cond: Box<Node>,
    then: Box<Node>,
    els: Option<Box<Node>>,
  },
  /// `for` and `while` loops; a missing condition loops forever.
  For {
    init: Option<Box<Node>>,
    cond: Option<Box<Node>>,
    inc: Option<Box<Node>>,
    body: Box<Node>,
  },
  FunCall {
    name: String,
    args: Vec<Node>,
  },
  Null,
  ExprStmt(Box<Node>),
  /// Replaced by a `Num` during type resolution.
  Sizeof(Box<Node>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
  pub kind: NodeKind,
  /// Filled in by the type resolver for expressions; statements stay `None`.
  pub ty: Option<Type>,
  /// Byte offset of the token that introduced this node.
  pub loc: usize,
}

impl Node {
  pub fn new(kind: NodeKind, loc: usize) -> Self {
    Self { kind, ty: None, loc }
  }

  pub fn number(value: i64, loc: usize) -> Self {
    Self::new(NodeKind::Num(value), loc)
  }

  pub fn var(var: VarRef, loc: usize) -> Self {
    Self::new(NodeKind::Var(var), loc)
  }

  pub fn binary(op: BinaryOp, lhs: Node, rhs: Node, loc: usize) -> Self {
    Self::new(
      NodeKind::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
      },
      loc,
    )
  }

  pub fn assign(lhs: Node, rhs: Node, loc: usize) -> Self {
    Self::new(
      NodeKind::Assign {
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
      },
      loc,
    )
  }

  pub fn addr(operand: Node, loc: usize) -> Self {
    Self::new(NodeKind::Addr(Box::new(operand)), loc)
  }

  pub fn deref(operand: Node, loc: usize) -> Self {
    Self::new(NodeKind::Deref(Box::new(operand)), loc)
  }

  pub fn expr_stmt(expr: Node) -> Self {
    let loc = expr.loc;
    Self::new(NodeKind::ExprStmt(Box::new(expr)), loc)
  }

  /// Can this node designate a storage location?
  pub fn is_lvalue(&self) -> bool {
    matches!(self.kind, NodeKind::Var(_) | NodeKind::Deref(_))
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
  pub name: String,
  /// Parameters in declaration order, as indices into `locals`.
  pub params: Vec<usize>,
  pub body: Vec<Node>,
  /// Every local including parameters, in declaration order.
  pub locals: Vec<Var>,
  pub stack_size: i64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
  pub globals: Vec<Var>,
  pub functions: Vec<Function>,
}

impl Program {
  pub fn function(&self, name: &str) -> Option<&Function> {
    self.functions.iter().find(|f| f.name == name)
  }
}
