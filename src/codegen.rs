//! Code generation: lower the typed AST into x86-64 assembly (Intel syntax).
//!
//! The emitter uses a simple stack machine: every expression leaves a single
//! 8-byte value on the stack and statements pop intermediate results as we
//! chain them. Locals live on the stack frame and are addressed relative to
//! `rbp`, globals relative to `rip`.

use log::debug;

use crate::ast::{BinaryOp, Function, Node, NodeKind, Program, Var, VarRef};
use crate::error::{CompileError, CompileResult};
use crate::ty::{Type, WORD_SIZE};

const ARGREG8: [&str; 6] = ["rdi", "rsi", "rdx", "rcx", "r8", "r9"];
const ARGREG1: [&str; 6] = ["dil", "sil", "dl", "cl", "r8b", "r9b"];

/// `rsp` must be a multiple of this at every `call`.
const CALL_ALIGN: i64 = 16;

/// Largest frame whose offsets and `sub rsp` fit a 32-bit immediate, with
/// room left for word alignment.
pub const MAX_FRAME_SIZE: i64 = i32::MAX as i64 - WORD_SIZE;

const REGISTERS: &[&str] = &[
  "rax", "rbx", "rcx", "rdx", "rsi", "rdi", "rbp", "rsp", "eax", "ebx", "ecx", "edx", "esi",
  "edi", "ebp", "esp", "ax", "bx", "cx", "dx", "si", "di", "bp", "sp", "al", "bl", "cl", "dl",
  "ah", "bh", "ch", "dh", "sil", "dil", "bpl", "spl", "r8", "r9", "r10", "r11", "r12", "r13",
  "r14", "r15", "r8d", "r9d", "r10d", "r11d", "r12d", "r13d", "r14d", "r15d", "r8w", "r9w",
  "r10w", "r11w", "r12w", "r13w", "r14w", "r15w", "r8b", "r9b", "r10b", "r11b", "r12b", "r13b",
  "r14b", "r15b", "rip", "eip", "cs", "ds", "es", "fs", "gs", "ss",
];

const OPERAND_KEYWORDS: &[&str] = &[
  "byte", "word", "dword", "qword", "xmmword", "ptr", "offset", "flat", "short", "near", "far",
];

/// Names the Intel-syntax assembler reads as a register or operand keyword
/// instead of a symbol. The assembler ignores case here.
pub fn is_assembler_reserved(name: &str) -> bool {
  let name = name.to_ascii_lowercase();
  REGISTERS.contains(&name.as_str()) || OPERAND_KEYWORDS.contains(&name.as_str())
}

pub fn align_to(n: i64, align: i64) -> i64 {
  (n + align - 1) / align * align
}

/// Give every local its frame offset and size each function's frame.
pub fn assign_lvar_offsets(program: &mut Program) {
  for func in &mut program.functions {
    let mut offset = 0;
    for var in &mut func.locals {
      offset += var.ty.size();
      var.offset = offset;
    }
    func.stack_size = align_to(offset, WORD_SIZE);
  }
}

/// Emit assembly for a whole program.
pub fn generate(program: &mut Program, source: &str) -> CompileResult<String> {
  assign_lvar_offsets(program);

  let mut codegen = Codegen::new(program, source);
  codegen.asm.push_str(".intel_syntax noprefix\n");
  codegen.asm.push_str(".section .note.GNU-stack,\"\",@progbits\n");
  codegen.emit_data();
  codegen.emit_text()?;
  Ok(codegen.asm)
}

struct Codegen<'a> {
  program: &'a Program,
  source: &'a str,
  asm: String,
  /// Next number handed out for `.L.*.N` labels.
  label_seq: usize,
  /// Words pushed on top of the current frame.
  depth: i64,
  stack_size: i64,
}

impl<'a> Codegen<'a> {
  fn new(program: &'a Program, source: &'a str) -> Self {
    Self {
      program,
      source,
      asm: String::new(),
      label_seq: 1,
      depth: 0,
      stack_size: 0,
    }
  }

  fn next_label(&mut self) -> usize {
    let seq = self.label_seq;
    self.label_seq += 1;
    seq
  }

  fn push(&mut self) {
    self.asm.push_str("    push rax\n");
    self.depth += 1;
  }

  fn pop(&mut self, reg: &str) {
    self.asm.push_str(&format!("    pop {reg}\n"));
    self.depth -= 1;
  }

  fn internal(&self, node: &Node, message: &str) -> CompileError {
    CompileError::ty(self.source, node.loc, message)
  }

  fn emit_data(&mut self) {
    self.asm.push_str(".data\n");
    for var in &self.program.globals {
      self.asm.push_str(&format!("{}:\n", var.name));
      self.asm.push_str(&format!("    .zero {}\n", var.ty.size()));
    }
  }

  fn emit_text(&mut self) -> CompileResult<()> {
    self.asm.push_str(".text\n");
    let program = self.program;
    for func in &program.functions {
      self.emit_function(func)?;
    }
    Ok(())
  }

  fn emit_function(&mut self, func: &Function) -> CompileResult<()> {
    debug!(
      "codegen {}: stack_size={} params=[{}] locals=[{}]",
      func.name,
      func.stack_size,
      func
        .params
        .iter()
        .map(|&idx| func.locals[idx].name.as_str())
        .collect::<Vec<_>>()
        .join(", "),
      func
        .locals
        .iter()
        .map(|var| format!("{}@{}", var.name, var.offset))
        .collect::<Vec<_>>()
        .join(", ")
    );

    self.depth = 0;
    self.stack_size = func.stack_size;

    self.asm.push_str(&format!(".global {}\n", func.name));
    self.asm.push_str(&format!("{}:\n", func.name));

    // Prologue
    self.asm.push_str("    push rbp\n");
    self.asm.push_str("    mov rbp, rsp\n");
    if func.stack_size > 0 {
      self.asm.push_str(&format!("    sub rsp, {}\n", func.stack_size));
    }

    for (i, &idx) in func.params.iter().enumerate() {
      self.store_param(&func.locals[idx], i);
    }

    for stmt in &func.body {
      self.emit_stmt(stmt, func)?;
    }
    debug_assert_eq!(self.depth, 0, "unbalanced stack in {}", func.name);

    // Epilogue
    self.asm.push_str(&format!(".L.return.{}:\n", func.name));
    self.asm.push_str("    mov rsp, rbp\n");
    self.asm.push_str("    pop rbp\n");
    self.asm.push_str("    ret\n");
    Ok(())
  }

  /// Copy the `i`th incoming argument into its local slot.
  fn store_param(&mut self, var: &Var, i: usize) {
    let byte = var.ty.size() == 1;
    if let Some(&reg8) = ARGREG8.get(i) {
      let reg = if byte { ARGREG1[i] } else { reg8 };
      self
        .asm
        .push_str(&format!("    mov [rbp-{}], {reg}\n", var.offset));
      return;
    }

    // Past the register budget the caller left the argument above our return address.
    let slot = 2 * WORD_SIZE + WORD_SIZE * (i - ARGREG8.len()) as i64;
    self.asm.push_str(&format!("    mov rax, [rbp+{slot}]\n"));
    let reg = if byte { "al" } else { "rax" };
    self
      .asm
      .push_str(&format!("    mov [rbp-{}], {reg}\n", var.offset));
  }

  fn emit_stmt(&mut self, node: &Node, func: &Function) -> CompileResult<()> {
    match &node.kind {
      NodeKind::Null => {}
      NodeKind::ExprStmt(expr) => {
        self.emit_expr(expr, func)?;
        self.asm.push_str("    add rsp, 8\n");
        self.depth -= 1;
      }
      NodeKind::Return(expr) => {
        self.emit_expr(expr, func)?;
        self.pop("rax");
        self.asm.push_str(&format!("    jmp .L.return.{}\n", func.name));
      }
      NodeKind::Block(body) => {
        for stmt in body {
          self.emit_stmt(stmt, func)?;
        }
      }
      NodeKind::If { cond, then, els } => {
        let c = self.next_label();
        self.emit_expr(cond, func)?;
        self.pop("rax");
        self.asm.push_str("    cmp rax, 0\n");
        self.asm.push_str(&format!("    je  .L.else.{c}\n"));
        self.emit_stmt(then, func)?;
        self.asm.push_str(&format!("    jmp .L.end.{c}\n"));
        self.asm.push_str(&format!(".L.else.{c}:\n"));
        if let Some(els) = els {
          self.emit_stmt(els, func)?;
        }
        self.asm.push_str(&format!(".L.end.{c}:\n"));
      }
      NodeKind::For {
        init,
        cond,
        inc,
        body,
      } => {
        let c = self.next_label();
        if let Some(init) = init {
          self.emit_stmt(init, func)?;
        }
        self.asm.push_str(&format!(".L.begin.{c}:\n"));
        if let Some(cond) = cond {
          self.emit_expr(cond, func)?;
          self.pop("rax");
          self.asm.push_str("    cmp rax, 0\n");
          self.asm.push_str(&format!("    je  .L.end.{c}\n"));
        }
        self.emit_stmt(body, func)?;
        if let Some(inc) = inc {
          self.emit_stmt(inc, func)?;
        }
        self.asm.push_str(&format!("    jmp .L.begin.{c}\n"));
        self.asm.push_str(&format!(".L.end.{c}:\n"));
      }
      _ => return Err(self.internal(node, "expected a statement")),
    }
    Ok(())
  }

  /// Emit stack-based code for a single expression node.
  fn emit_expr(&mut self, node: &Node, func: &Function) -> CompileResult<()> {
    let ty = node
      .ty
      .as_ref()
      .ok_or_else(|| self.internal(node, "expression has no type"))?;

    match &node.kind {
      NodeKind::Num(value) => {
        if i32::try_from(*value).is_ok() {
          self.asm.push_str(&format!("    push {value}\n"));
          self.depth += 1;
        } else {
          self.asm.push_str(&format!("    mov rax, {value}\n"));
          self.push();
        }
      }
      NodeKind::Var(_) => {
        self.emit_addr(node, func)?;
        if !ty.is_array() {
          self.load(ty);
        }
      }
      NodeKind::Addr(operand) => self.emit_addr(operand, func)?,
      NodeKind::Deref(operand) => {
        self.emit_expr(operand, func)?;
        if !ty.is_array() {
          self.load(ty);
        }
      }
      NodeKind::Assign { lhs, rhs } => {
        self.emit_addr(lhs, func)?;
        self.emit_expr(rhs, func)?;
        self.store(ty);
      }
      NodeKind::FunCall { name, args } => self.emit_call(name, args, func)?,
      NodeKind::Binary { op, lhs, rhs } => {
        self.emit_expr(lhs, func)?;
        self.emit_expr(rhs, func)?;
        self.pop("rdi");
        self.pop("rax");
        self.emit_binary(*op, ty);
        self.push();
      }
      _ => return Err(self.internal(node, "expected an expression")),
    }
    Ok(())
  }

  fn emit_binary(&mut self, op: BinaryOp, ty: &Type) {
    let compare = |set: &str| format!("    cmp rax, rdi\n    {set} al\n    movzb rax, al\n");
    let text = match op {
      BinaryOp::Add | BinaryOp::Sub => {
        let scale = ty
          .base()
          .map(|base| format!("    imul rdi, {}\n", base.size()))
          .unwrap_or_default();
        let mnemonic = if op == BinaryOp::Add { "add" } else { "sub" };
        format!("{scale}    {mnemonic} rax, rdi\n")
      }
      BinaryOp::Mul => "    imul rax, rdi\n".to_string(),
      BinaryOp::Div => "    cqo\n    idiv rdi\n".to_string(),
      BinaryOp::Eq => compare("sete"),
      BinaryOp::Ne => compare("setne"),
      BinaryOp::Lt => compare("setl"),
      BinaryOp::Le => compare("setle"),
    };
    self.asm.push_str(&text);
  }

  /// Arguments are evaluated left to right. The first six end up in
  /// registers, the rest in an outgoing area so the 7th sits at `[rsp]`.
  fn emit_call(&mut self, name: &str, args: &[Node], func: &Function) -> CompileResult<()> {
    let nregs = args.len().min(ARGREG8.len());
    let nstack = (args.len() - nregs) as i64;

    let frame_words = self.stack_size / WORD_SIZE;
    let words_per_align = CALL_ALIGN / WORD_SIZE;
    let padding = (frame_words + self.depth + nstack) % words_per_align;
    let reserved = padding + nstack;
    if reserved > 0 {
      self
        .asm
        .push_str(&format!("    sub rsp, {}\n", reserved * WORD_SIZE));
      self.depth += reserved;
    }

    for (i, arg) in args.iter().enumerate() {
      self.emit_expr(arg, func)?;
      if i >= ARGREG8.len() {
        self.pop("rax");
        self
          .asm
          .push_str(&format!("    mov [rsp+{}], rax\n", WORD_SIZE * i as i64));
      }
    }

    for reg in ARGREG8[..nregs].iter().rev() {
      self.pop(reg);
    }

    self.asm.push_str("    mov rax, 0\n");
    self.asm.push_str(&format!("    call {name}\n"));
    if reserved > 0 {
      self
        .asm
        .push_str(&format!("    add rsp, {}\n", reserved * WORD_SIZE));
      self.depth -= reserved;
    }
    self.push();
    Ok(())
  }

  /// Push the address of an lvalue.
  fn emit_addr(&mut self, node: &Node, func: &Function) -> CompileResult<()> {
    match &node.kind {
      NodeKind::Var(VarRef::Local(idx)) => {
        let offset = func.locals[*idx].offset;
        self.asm.push_str(&format!("    lea rax, [rbp-{offset}]\n"));
        self.push();
      }
      NodeKind::Var(VarRef::Global(idx)) => {
        let name = &self.program.globals[*idx].name;
        self.asm.push_str(&format!("    lea rax, [rip+{name}]\n"));
        self.push();
      }
      NodeKind::Deref(operand) => self.emit_expr(operand, func)?,
      _ => return Err(self.internal(node, "not an lvalue")),
    }
    Ok(())
  }

  /// Replace the address on top of the stack with the value it points at.
  fn load(&mut self, ty: &Type) {
    self.pop("rax");
    if ty.size() == 1 {
      self.asm.push_str("    movsx rax, byte ptr [rax]\n");
    } else {
      self.asm.push_str("    mov rax, [rax]\n");
    }
    self.push();
  }

  /// Pop a value and an address, store, and leave the value on the stack.
  fn store(&mut self, ty: &Type) {
    self.pop("rdi");
    self.pop("rax");
    if ty.size() == 1 {
      self.asm.push_str("    mov [rax], dil\n");
    } else {
      self.asm.push_str("    mov [rax], rdi\n");
    }
    self.asm.push_str("    push rdi\n");
    self.depth += 1;
  }
}
