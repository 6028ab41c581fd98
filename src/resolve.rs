//! Type resolution: a post-order walk that gives every expression a type.
//!
//! Besides annotating nodes, the walk normalises pointer arithmetic so the
//! pointer operand of `+` is always on the left, folds `sizeof` into integer
//! literals, and rejects the operand combinations the code generator cannot
//! lower.

use log::debug;

use crate::ast::{BinaryOp, Function, Node, NodeKind, Program, Var, VarRef};
use crate::error::{CompileError, CompileResult};
use crate::ty::Type;

/// Annotate every function body in the program.
pub fn add_type(program: &mut Program, source: &str) -> CompileResult<()> {
  let globals = &program.globals;
  for function in &mut program.functions {
    let Function { name, body, locals, .. } = function;
    let resolver = Resolver {
      source,
      locals,
      globals,
    };
    for stmt in body.iter_mut() {
      resolver.visit(stmt)?;
    }
    debug!("resolved types in {name}");
  }
  Ok(())
}

struct Resolver<'a> {
  source: &'a str,
  locals: &'a [Var],
  globals: &'a [Var],
}

impl Resolver<'_> {
  fn var(&self, var: VarRef) -> &Var {
    match var {
      VarRef::Local(idx) => &self.locals[idx],
      VarRef::Global(idx) => &self.globals[idx],
    }
  }

  fn type_of<'n>(&self, node: &'n Node) -> CompileResult<&'n Type> {
    node
      .ty
      .as_ref()
      .ok_or_else(|| CompileError::ty(self.source, node.loc, "expression has no value"))
  }

  fn visit(&self, node: &mut Node) -> CompileResult<()> {
    let loc = node.loc;
    let mut folded_size = None;

    let ty = match &mut node.kind {
      NodeKind::Num(_) => Some(Type::int()),
      NodeKind::Var(var) => Some(self.var(*var).ty.clone()),
      NodeKind::Binary { op, lhs, rhs } => {
        self.visit(lhs)?;
        self.visit(rhs)?;
        Some(self.binary(*op, lhs, rhs, loc)?)
      }
      NodeKind::Assign { lhs, rhs } => {
        self.visit(lhs)?;
        self.visit(rhs)?;
        let lhs_ty = self.type_of(lhs)?;
        if !lhs.is_lvalue() || lhs_ty.is_array() {
          return Err(CompileError::ty(self.source, lhs.loc, "not an lvalue"));
        }
        self.type_of(rhs)?;
        Some(lhs_ty.clone())
      }
      NodeKind::Addr(operand) => {
        self.visit(operand)?;
        if !operand.is_lvalue() {
          return Err(CompileError::ty(self.source, operand.loc, "not an lvalue"));
        }
        let ty = match self.type_of(operand)? {
          Type::Array(base, _) => Type::pointer_to((**base).clone()),
          ty => Type::pointer_to(ty.clone()),
        };
        Some(ty)
      }
      NodeKind::Deref(operand) => {
        self.visit(operand)?;
        let Some(base) = self.type_of(operand)?.base() else {
          return Err(CompileError::ty(
            self.source,
            loc,
            "invalid pointer dereference",
          ));
        };
        Some(base.clone())
      }
      NodeKind::FunCall { args, .. } => {
        for arg in args.iter_mut() {
          self.visit(arg)?;
          self.type_of(arg)?;
        }
        Some(Type::int())
      }
      NodeKind::Sizeof(operand) => {
        self.visit(operand)?;
        folded_size = Some(self.type_of(operand)?.size());
        Some(Type::int())
      }
      NodeKind::Return(expr) => {
        self.visit(expr)?;
        self.type_of(expr)?;
        None
      }
      NodeKind::ExprStmt(expr) => {
        self.visit(expr)?;
        None
      }
      NodeKind::Block(body) => {
        for stmt in body.iter_mut() {
          self.visit(stmt)?;
        }
        None
      }
      NodeKind::If { cond, then, els } => {
        self.visit(cond)?;
        self.type_of(cond)?;
        self.visit(then)?;
        if let Some(els) = els {
          self.visit(els)?;
        }
        None
      }
      NodeKind::For {
        init,
        cond,
        inc,
        body,
      } => {
        if let Some(init) = init {
          self.visit(init)?;
        }
        if let Some(cond) = cond {
          self.visit(cond)?;
          self.type_of(cond)?;
        }
        if let Some(inc) = inc {
          self.visit(inc)?;
        }
        self.visit(body)?;
        None
      }
      NodeKind::Null => None,
    };

    if let Some(size) = folded_size {
      node.kind = NodeKind::Num(size);
    }
    node.ty = ty;
    Ok(())
  }

  fn binary(
    &self,
    op: BinaryOp,
    lhs: &mut Box<Node>,
    rhs: &mut Box<Node>,
    loc: usize,
  ) -> CompileResult<Type> {
    match op {
      BinaryOp::Add => {
        if self.type_of(rhs)?.base().is_some() && self.type_of(lhs)?.base().is_none() {
          std::mem::swap(lhs, rhs);
        }
        if self.type_of(rhs)?.base().is_some() {
          return Err(CompileError::ty(
            self.source,
            loc,
            "invalid pointer arithmetic operands",
          ));
        }
        Ok(self.type_of(lhs)?.clone())
      }
      BinaryOp::Sub => {
        if self.type_of(rhs)?.base().is_some() {
          return Err(CompileError::ty(
            self.source,
            loc,
            "invalid pointer arithmetic operands",
          ));
        }
        Ok(self.type_of(lhs)?.clone())
      }
      BinaryOp::Mul | BinaryOp::Div | BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le => {
        self.type_of(lhs)?;
        self.type_of(rhs)?;
        Ok(Type::int())
      }
    }
  }
}
