//! Recursive-descent parser producing functions and global variables.
//!
//! The parser mirrors the classic chibicc structure: a precedence-climbing
//! set of expression helpers under a thin statement and declaration layer.
//! All mutable state (the token cursor and the symbol tables) lives in a
//! `Parser` value threaded through every rule.
//!
//! ```text
//! program     = (global-var | function)*
//! function    = basetype ident "(" params? ")" "{" stmt* "}"
//! params      = param ("," param)*
//! param       = basetype ident
//! global-var  = basetype ident ("[" num "]")* ";"
//! basetype    = ("char" | "int") "*"*
//! stmt        = "return" expr ";"
//!             | "if" "(" expr ")" stmt ("else" stmt)?
//!             | "for" "(" expr? ";" expr? ";" expr? ")" stmt
//!             | "while" "(" expr ")" stmt
//!             | "{" stmt* "}"
//!             | declaration
//!             | expr ";"
//! declaration = basetype ident ("[" num "]")* ("=" expr)? ";"
//! expr        = assign
//! assign      = equality ("=" assign)?
//! equality    = relational (("==" | "!=") relational)*
//! relational  = add (("<" | "<=" | ">" | ">=") add)*
//! add         = mul (("+" | "-") mul)*
//! mul         = unary (("*" | "/") unary)*
//! unary       = ("+" | "-" | "&" | "*") unary | postfix
//! postfix     = primary ("[" expr "]")*
//! primary     = "(" expr ")" | "sizeof" "(" type-name ")" | "sizeof" unary
//!             | ident ("(" args? ")")? | num
//! type-name   = basetype ("[" num "]")*
//! args        = assign ("," assign)*
//! ```

use log::{debug, trace};

use crate::ast::{BinaryOp, Function, Node, NodeKind, Program, Var, VarRef};
use crate::codegen::{MAX_FRAME_SIZE, is_assembler_reserved};
use crate::error::{CompileError, CompileResult};
use crate::tokenizer::{Token, TokenKind, describe_token, token_text};
use crate::ty::Type;

/// Parse a whole translation unit from the token stream.
pub fn parse(tokens: Vec<Token>, source: &str) -> CompileResult<Program> {
  let mut parser = Parser::new(TokenStream::new(tokens, source));
  let mut program = Program::default();

  while !parser.stream.is_eof() {
    if parser.is_function()? {
      let function = parser.function()?;
      debug!(
        "parsed function {} ({} params, {} locals, {} statements)",
        function.name,
        function.params.len(),
        function.locals.len(),
        function.body.len()
      );
      trace!("AST of {}: {:#?}", function.name, function.body);
      program.functions.push(function);
    } else {
      parser.global_var()?;
    }
  }

  program.globals = parser.globals;
  Ok(program)
}

struct Parser<'a> {
  stream: TokenStream<'a>,
  /// Locals of the function being parsed, in declaration order.
  locals: Vec<Var>,
  /// Bytes taken by `locals` so far.
  frame_size: i64,
  globals: Vec<Var>,
  function_names: Vec<String>,
}

impl<'a> Parser<'a> {
  fn new(stream: TokenStream<'a>) -> Self {
    Self {
      stream,
      locals: Vec::new(),
      frame_size: 0,
      globals: Vec::new(),
      function_names: Vec::new(),
    }
  }

  fn source(&self) -> &'a str {
    self.stream.source
  }

  /// Latest declaration wins: locals first, then globals.
  fn find_var(&self, name: &str) -> Option<VarRef> {
    if let Some(idx) = self.locals.iter().rposition(|v| v.name == name) {
      return Some(VarRef::Local(idx));
    }
    self
      .globals
      .iter()
      .rposition(|v| v.name == name)
      .map(VarRef::Global)
  }

  fn push_local(&mut self, name: String, ty: Type, loc: usize) -> CompileResult<usize> {
    match self.frame_size.checked_add(ty.size()) {
      Some(total) if total <= MAX_FRAME_SIZE => self.frame_size = total,
      _ => {
        return Err(CompileError::ty(
          self.source(),
          loc,
          "stack frame too large",
        ));
      }
    }
    self.locals.push(Var::local(name, ty));
    Ok(self.locals.len() - 1)
  }

  /// Symbols are spliced into operands as-is, so they must not read as a
  /// register or an operand keyword.
  fn check_symbol_name(&self, name: &str, loc: usize) -> CompileResult<()> {
    if is_assembler_reserved(name) {
      return Err(CompileError::ty(
        self.source(),
        loc,
        format!("'{name}' is reserved by the assembler"),
      ));
    }
    Ok(())
  }

  fn check_global_name(&self, name: &str, loc: usize) -> CompileResult<()> {
    let taken = self.globals.iter().any(|v| v.name == name)
      || self.function_names.iter().any(|f| f == name);
    if taken {
      return Err(CompileError::ty(
        self.source(),
        loc,
        format!("redefinition of '{name}'"),
      ));
    }
    self.check_symbol_name(name, loc)
  }

  /// Peek past `basetype ident` to see whether a `(` follows, then rewind.
  fn is_function(&mut self) -> CompileResult<bool> {
    let saved = self.stream.pos;
    self.basetype()?;
    let is_func = self.stream.get_ident().is_ok() && self.stream.equal("(");
    self.stream.pos = saved;
    Ok(is_func)
  }

  fn at_basetype(&self) -> bool {
    self.stream.at("int") || self.stream.at("char")
  }

  // basetype = ("char" | "int") "*"*
  fn basetype(&mut self) -> CompileResult<Type> {
    let mut ty = if self.stream.equal("char") {
      Type::char()
    } else {
      self.stream.skip("int")?;
      Type::int()
    };
    while self.stream.equal("*") {
      ty = Type::pointer_to(ty);
    }
    Ok(ty)
  }

  /// ("[" num "]")*, outermost dimension first.
  fn type_suffix(&mut self, ty: Type) -> CompileResult<Type> {
    if !self.stream.equal("[") {
      return Ok(ty);
    }
    let (len, loc) = self.stream.get_number()?;
    self.stream.skip("]")?;
    let inner = self.type_suffix(ty)?;
    if inner.size().checked_mul(len).is_none() {
      return Err(CompileError::ty(self.source(), loc, "array too large"));
    }
    Ok(Type::array_of(inner, len))
  }

  // global-var = basetype ident ("[" num "]")* ";"
  fn global_var(&mut self) -> CompileResult<()> {
    let base = self.basetype()?;
    let (name, loc) = self.stream.get_ident()?;
    let ty = self.type_suffix(base)?;
    self.stream.skip(";")?;
    self.check_global_name(&name, loc)?;
    self.globals.push(Var::global(name, ty));
    Ok(())
  }

  // function = basetype ident "(" params? ")" "{" stmt* "}"
  fn function(&mut self) -> CompileResult<Function> {
    self.locals.clear();
    self.frame_size = 0;

    self.basetype()?;
    let (name, loc) = self.stream.get_ident()?;
    self.check_global_name(&name, loc)?;
    self.function_names.push(name.clone());

    self.stream.skip("(")?;
    let params = self.params()?;
    self.stream.skip("{")?;

    let mut body = Vec::new();
    while !self.stream.equal("}") {
      body.push(self.stmt()?);
    }

    Ok(Function {
      name,
      params,
      body,
      locals: std::mem::take(&mut self.locals),
      stack_size: 0,
    })
  }

  // params = param ("," param)*
  // param  = basetype ident
  fn params(&mut self) -> CompileResult<Vec<usize>> {
    let mut params = Vec::new();
    if self.stream.equal(")") {
      return Ok(params);
    }
    loop {
      let ty = self.basetype()?;
      let (name, loc) = self.stream.get_ident()?;
      params.push(self.push_local(name, ty, loc)?);
      if self.stream.equal(")") {
        return Ok(params);
      }
      self.stream.skip(",")?;
    }
  }

  // declaration = basetype ident ("[" num "]")* ("=" expr)? ";"
  fn declaration(&mut self) -> CompileResult<Node> {
    let loc = self.stream.loc();
    let base = self.basetype()?;
    let (name, name_loc) = self.stream.get_ident()?;
    let ty = self.type_suffix(base)?;
    let idx = self.push_local(name, ty, name_loc)?;

    if self.stream.equal(";") {
      return Ok(Node::new(NodeKind::Null, loc));
    }

    let assign_loc = self.stream.loc();
    self.stream.skip("=")?;
    let lhs = Node::var(VarRef::Local(idx), name_loc);
    let rhs = self.expr()?;
    self.stream.skip(";")?;
    Ok(Node::expr_stmt(Node::assign(lhs, rhs, assign_loc)))
  }

  fn stmt(&mut self) -> CompileResult<Node> {
    let loc = self.stream.loc();

    if self.stream.equal("return") {
      let expr = self.expr()?;
      self.stream.skip(";")?;
      return Ok(Node::new(NodeKind::Return(Box::new(expr)), loc));
    }

    if self.stream.equal("if") {
      self.stream.skip("(")?;
      let cond = self.expr()?;
      self.stream.skip(")")?;
      let then = self.stmt()?;
      let els = if self.stream.equal("else") {
        Some(Box::new(self.stmt()?))
      } else {
        None
      };
      return Ok(Node::new(
        NodeKind::If {
          cond: Box::new(cond),
          then: Box::new(then),
          els,
        },
        loc,
      ));
    }

    if self.stream.equal("for") {
      self.stream.skip("(")?;
      let init = self.optional_expr(";")?.map(Node::expr_stmt);
      let cond = self.optional_expr(";")?;
      let inc = self.optional_expr(")")?.map(Node::expr_stmt);
      let body = self.stmt()?;
      return Ok(Node::new(
        NodeKind::For {
          init: init.map(Box::new),
          cond: cond.map(Box::new),
          inc: inc.map(Box::new),
          body: Box::new(body),
        },
        loc,
      ));
    }

    if self.stream.equal("while") {
      self.stream.skip("(")?;
      let cond = self.expr()?;
      self.stream.skip(")")?;
      let body = self.stmt()?;
      return Ok(Node::new(
        NodeKind::For {
          init: None,
          cond: Some(Box::new(cond)),
          inc: None,
          body: Box::new(body),
        },
        loc,
      ));
    }

    if self.stream.equal("{") {
      let mut body = Vec::new();
      while !self.stream.equal("}") {
        body.push(self.stmt()?);
      }
      return Ok(Node::new(NodeKind::Block(body), loc));
    }

    if self.at_basetype() {
      return self.declaration();
    }

    let expr = self.expr()?;
    self.stream.skip(";")?;
    Ok(Node::expr_stmt(expr))
  }

  /// `expr? terminator`, as used by the three clauses of a `for` header.
  fn optional_expr(&mut self, terminator: &str) -> CompileResult<Option<Node>> {
    if self.stream.equal(terminator) {
      return Ok(None);
    }
    let expr = self.expr()?;
    self.stream.skip(terminator)?;
    Ok(Some(expr))
  }

  fn expr(&mut self) -> CompileResult<Node> {
    self.assign()
  }

  fn assign(&mut self) -> CompileResult<Node> {
    let node = self.equality()?;

    let loc = self.stream.loc();
    if self.stream.equal("=") {
      let rhs = self.assign()?;
      return Ok(Node::assign(node, rhs, loc));
    }

    Ok(node)
  }

  fn equality(&mut self) -> CompileResult<Node> {
    let mut node = self.relational()?;

    loop {
      let loc = self.stream.loc();
      let op = match self.stream.punctuator() {
        Some("==") => BinaryOp::Eq,
        Some("!=") => BinaryOp::Ne,
        _ => break,
      };
      self.stream.pos += 1;
      let rhs = self.relational()?;
      node = Node::binary(op, node, rhs, loc);
    }

    Ok(node)
  }

  fn relational(&mut self) -> CompileResult<Node> {
    let mut node = self.add()?;

    loop {
      let loc = self.stream.loc();
      let Some(op_str) = self
        .stream
        .punctuator()
        .filter(|op| matches!(*op, "<" | "<=" | ">" | ">="))
      else {
        break;
      };
      self.stream.pos += 1;
      let rhs = self.add()?;
      node = match op_str {
        "<" => Node::binary(BinaryOp::Lt, node, rhs, loc),
        "<=" => Node::binary(BinaryOp::Le, node, rhs, loc),
        ">" => Node::binary(BinaryOp::Lt, rhs, node, loc),
        _ => Node::binary(BinaryOp::Le, rhs, node, loc),
      };
    }

    Ok(node)
  }

  fn add(&mut self) -> CompileResult<Node> {
    let mut node = self.mul()?;

    loop {
      let loc = self.stream.loc();
      let op = match self.stream.punctuator() {
        Some("+") => BinaryOp::Add,
        Some("-") => BinaryOp::Sub,
        _ => break,
      };
      self.stream.pos += 1;
      let rhs = self.mul()?;
      node = Node::binary(op, node, rhs, loc);
    }

    Ok(node)
  }

  fn mul(&mut self) -> CompileResult<Node> {
    let mut node = self.unary()?;

    loop {
      let loc = self.stream.loc();
      let op = match self.stream.punctuator() {
        Some("*") => BinaryOp::Mul,
        Some("/") => BinaryOp::Div,
        _ => break,
      };
      self.stream.pos += 1;
      let rhs = self.unary()?;
      node = Node::binary(op, node, rhs, loc);
    }

    Ok(node)
  }

  fn unary(&mut self) -> CompileResult<Node> {
    let loc = self.stream.loc();

    if self.stream.equal("+") {
      return self.unary();
    }

    if self.stream.equal("-") {
      let operand = self.unary()?;
      return Ok(Node::binary(
        BinaryOp::Sub,
        Node::number(0, loc),
        operand,
        loc,
      ));
    }

    if self.stream.equal("&") {
      let operand = self.unary()?;
      return Ok(Node::addr(operand, loc));
    }

    if self.stream.equal("*") {
      let operand = self.unary()?;
      return Ok(Node::deref(operand, loc));
    }

    self.postfix()
  }

  // x[y] is short for *(x+y)
  fn postfix(&mut self) -> CompileResult<Node> {
    let mut node = self.primary()?;

    loop {
      let loc = self.stream.loc();
      if !self.stream.equal("[") {
        return Ok(node);
      }
      let index = self.expr()?;
      self.stream.skip("]")?;
      node = Node::deref(Node::binary(BinaryOp::Add, node, index, loc), loc);
    }
  }

  fn primary(&mut self) -> CompileResult<Node> {
    let loc = self.stream.loc();

    if self.stream.equal("(") {
      let node = self.expr()?;
      self.stream.skip(")")?;
      return Ok(node);
    }

    if self.stream.equal("sizeof") {
      if self.stream.at("(") && self.stream.at_nth(1, &["int", "char"]) {
        self.stream.skip("(")?;
        let base = self.basetype()?;
        let ty = self.type_suffix(base)?;
        self.stream.skip(")")?;
        return Ok(Node::number(ty.size(), loc));
      }
      let operand = self.unary()?;
      return Ok(Node::new(NodeKind::Sizeof(Box::new(operand)), loc));
    }

    if self.stream.peek().map(|token| token.kind) == Some(TokenKind::Ident) {
      let (name, loc) = self.stream.get_ident()?;

      if self.stream.equal("(") {
        self.check_symbol_name(&name, loc)?;
        let args = self.func_args()?;
        return Ok(Node::new(NodeKind::FunCall { name, args }, loc));
      }

      let Some(var) = self.find_var(&name) else {
        return Err(CompileError::name(
          self.source(),
          loc,
          format!("undefined variable '{name}'"),
        ));
      };
      return Ok(Node::var(var, loc));
    }

    let (value, loc) = self.stream.get_number()?;
    Ok(Node::number(value, loc))
  }

  // args = assign ("," assign)*
  fn func_args(&mut self) -> CompileResult<Vec<Node>> {
    let mut args = Vec::new();
    if self.stream.equal(")") {
      return Ok(args);
    }
    loop {
      args.push(self.assign()?);
      if self.stream.equal(")") {
        return Ok(args);
      }
      self.stream.skip(",")?;
    }
  }
}

/// Lightweight cursor over the token vector.
struct TokenStream<'a> {
  tokens: Vec<Token>,
  source: &'a str,
  pos: usize,
}

impl<'a> TokenStream<'a> {
  /// Take ownership of the token stream; the parser will advance `pos` as it consumes input.
  fn new(tokens: Vec<Token>, source: &'a str) -> Self {
    Self {
      tokens,
      source,
      pos: 0,
    }
  }

  fn peek(&self) -> Option<&Token> {
    self.tokens.get(self.pos)
  }

  /// Byte offset of the current token, or the end of input.
  fn loc(&self) -> usize {
    self.peek().map_or(self.source.len(), |token| token.loc)
  }

  /// Text of the current token when it is a punctuator.
  fn punctuator(&self) -> Option<&'a str> {
    let source = self.source;
    self
      .peek()
      .filter(|token| token.kind == TokenKind::Punctuator)
      .map(|token| token_text(token, source))
  }

  fn matches(&self, token: &Token, op: &str) -> bool {
    matches!(token.kind, TokenKind::Punctuator | TokenKind::Keyword)
      && token.len == op.len()
      && token_text(token, self.source) == op
  }

  /// Does the current token spell `op`? Nothing is consumed.
  fn at(&self, op: &str) -> bool {
    self.peek().is_some_and(|token| self.matches(token, op))
  }

  /// Does the token `n` places ahead spell any of `ops`?
  fn at_nth(&self, n: usize, ops: &[&str]) -> bool {
    self
      .tokens
      .get(self.pos + n)
      .is_some_and(|token| ops.iter().any(|op| self.matches(token, op)))
  }

  /// Consume the current token if it matches the provided punctuator or keyword.
  fn equal(&mut self, op: &str) -> bool {
    if self.at(op) {
      self.pos += 1;
      return true;
    }
    false
  }

  fn skip(&mut self, s: &str) -> CompileResult<()> {
    if self.equal(s) {
      Ok(())
    } else {
      let got = describe_token(self.peek(), self.source);
      Err(CompileError::syntax(
        self.source,
        self.loc(),
        format!("expected \"{s}\", but got \"{got}\""),
      ))
    }
  }

  /// Parse the current token as an integer literal returning its value and location.
  fn get_number(&mut self) -> CompileResult<(i64, usize)> {
    if let Some(token) = self.peek()
      && token.kind == TokenKind::Num
      && let Some(value) = token.value
    {
      let loc = token.loc;
      self.pos += 1;
      return Ok((value, loc));
    }

    let got = describe_token(self.peek(), self.source);
    Err(CompileError::syntax(
      self.source,
      self.loc(),
      format!("expected a number, but got \"{got}\""),
    ))
  }

  /// Parse the current token as an identifier.
  fn get_ident(&mut self) -> CompileResult<(String, usize)> {
    if let Some(token) = self.peek()
      && token.kind == TokenKind::Ident
    {
      let ident = token_text(token, self.source).to_string();
      let loc = token.loc;
      self.pos += 1;
      return Ok((ident, loc));
    }

    let got = describe_token(self.peek(), self.source);
    Err(CompileError::syntax(
      self.source,
      self.loc(),
      format!("expected an identifier, but got \"{got}\""),
    ))
  }

  fn is_eof(&self) -> bool {
    matches!(self.peek().map(|token| token.kind), Some(TokenKind::Eof) | None)
  }
}
