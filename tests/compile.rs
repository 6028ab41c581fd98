use std::collections::HashSet;

use rcc9::ast::Program;
use rcc9::{CompileError, codegen, generate_assembly, parser, resolve, tokenizer};

fn lower(src: &str) -> Program {
  let mut program = parser::parse(tokenizer::tokenize(src).expect("tokenize"), src).expect("parse");
  resolve::add_type(&mut program, src).expect("resolve");
  codegen::generate(&mut program, src).expect("codegen");
  program
}

#[test]
fn frames_cover_their_locals() {
  let sources = [
    "int main() { return 0; }",
    "int main() { char c; return 0; }",
    "int f(int a, char b, char *c) { int d[3]; char e[7]; return 0; }",
    "int main() { int a[2][3]; char b; int c; return 0; }",
  ];
  for src in sources {
    let program = lower(src);
    for func in &program.functions {
      let total: i64 = func.locals.iter().map(|v| v.ty.size()).sum();
      assert_eq!(func.stack_size % 8, 0, "{src}");
      assert!(func.stack_size >= total, "{src}");
    }
  }
}

#[test]
fn sizeof_is_constant_folded() {
  for (expr, size) in [("sizeof(int)", 8), ("sizeof(char)", 1), ("sizeof(int[4])", 32)] {
    let asm = generate_assembly(&format!("int main() {{ return {expr}; }}")).expect("compile");
    assert!(
      asm.contains(&format!("    push {size}\n    pop rax\n    jmp .L.return.main\n")),
      "{expr}"
    );
  }
}

#[test]
fn pointer_steps_follow_pointee_size() {
  let asm = generate_assembly("int main() { int *p; return p + 1; }").expect("compile");
  assert!(asm.contains("    push 1\n    pop rdi\n    pop rax\n    imul rdi, 8\n    add rax, rdi\n"));
  let asm = generate_assembly("int main() { char *p; return p + 1; }").expect("compile");
  assert!(asm.contains("    push 1\n    pop rdi\n    pop rax\n    imul rdi, 1\n    add rax, rdi\n"));
}

#[test]
fn array_name_and_first_element_address_share_a_base() {
  let decayed = generate_assembly("int main() { int a[3]; int *p; p = a; return 0; }").expect("compile");
  assert!(decayed.contains("    lea rax, [rbp-24]\n    push rax\n    pop rdi\n"));

  let indexed = generate_assembly("int main() { int a[3]; int *p; p = &a[0]; return 0; }").expect("compile");
  assert!(indexed.contains("    lea rax, [rbp-24]\n    push rax\n    push 0\n"));
  assert!(!indexed.contains("mov rax, [rax]"));
}

#[test]
fn call_arguments_fill_registers_in_order() {
  let asm = generate_assembly("int main() { return f(1, 2, 3); }").expect("compile");
  let call = asm.find("    call f\n").expect("call");
  let setup: Vec<_> = asm[..call].lines().rev().take(7).collect();
  assert_eq!(
    setup,
    vec![
      "    mov rax, 0",
      "    pop rdi",
      "    pop rsi",
      "    pop rdx",
      "    push 3",
      "    push 2",
      "    push 1",
    ]
  );
}

#[test]
fn undeclared_identifier_fails_with_name_error() {
  let err = generate_assembly("int main() { return x; }").unwrap_err();
  assert!(matches!(err, CompileError::Name { .. }));
  assert_eq!(err.to_string(), "int main() { return x; }\n                    ^ undefined variable 'x'");
}

#[test]
fn first_error_wins() {
  let err = generate_assembly("int main() { int *p; return p + p; } int f() { return y; }").unwrap_err();
  assert!(matches!(err, CompileError::Name { .. }));
  let err = generate_assembly("int main() { int *p; return p + p; }").unwrap_err();
  assert!(matches!(err, CompileError::Type { .. }));
  let err = generate_assembly("int main() { return 1 $ 2; }").unwrap_err();
  assert!(matches!(err, CompileError::Lex { .. }));
}

const LOOPY: &str = "
int g;
int count(int n) {
  int i;
  int total;
  total = 0;
  for (i = 0; i < n; i = i + 1) {
    if (i == 3) total = total + 10; else total = total + 1;
  }
  while (total > 100) total = total - 1;
  return total;
}
int main() {
  if (count(5) >= 14) return 1;
  return 0;
}
";

#[test]
fn recompiling_is_byte_identical() {
  let first = generate_assembly(LOOPY).expect("compile");
  let second = generate_assembly(LOOPY).expect("compile");
  assert_eq!(first, second);
}

#[test]
fn every_label_is_defined_once_and_referenced_labels_exist() {
  let asm = generate_assembly(LOOPY).expect("compile");

  let mut defined = HashSet::new();
  for line in asm.lines() {
    if let Some(label) = line.strip_suffix(':')
      && label.starts_with(".L.")
    {
      assert!(defined.insert(label.to_string()), "{label} defined twice");
    }
  }

  for line in asm.lines() {
    let line = line.trim();
    if let Some(target) = line
      .strip_prefix("jmp ")
      .or_else(|| line.strip_prefix("je "))
    {
      assert!(defined.contains(target.trim()), "{target} is never defined");
    }
  }

  assert!(defined.contains(".L.return.count"));
  assert!(defined.contains(".L.return.main"));
}

#[test]
fn output_has_data_then_text() {
  let asm = generate_assembly("int g[2]; int main() { return 0; }").expect("compile");
  let data = asm.find(".data\n").expect("data section");
  let text = asm.find(".text\n").expect("text section");
  assert!(asm.starts_with(".intel_syntax noprefix\n.section .note.GNU-stack,\"\",@progbits\n.data\n"));
  assert_eq!(asm.matches(".note.GNU-stack").count(), 1);
  assert!(data < text);
  assert!(asm.contains("g:\n    .zero 16\n"));
  assert!(asm.contains(".global main\nmain:\n    push rbp\n    mov rbp, rsp\n"));
  assert!(asm.ends_with(".L.return.main:\n    mov rsp, rbp\n    pop rbp\n    ret\n"));
}
