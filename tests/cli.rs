// Drives the compiled binary. The run_* tests assemble and execute the output
// and quietly pass on hosts without an x86-64 Linux toolchain.

use std::fs;
use std::path::PathBuf;
use std::process::{self, Command, Output};

fn rcc9(args: &[&str]) -> Output {
  Command::new(env!("CARGO_BIN_EXE_rcc9"))
    .args(args)
    .output()
    .expect("failed to spawn rcc9")
}

fn scratch(name: &str) -> PathBuf {
  let dir = std::env::temp_dir().join(format!("rcc9-{}-{name}", process::id()));
  fs::create_dir_all(&dir).expect("create scratch dir");
  dir
}

/// Compile, assemble, link and run `src`, returning its exit status.
fn run(name: &str, src: &str) -> Option<i32> {
  if !cfg!(all(target_arch = "x86_64", target_os = "linux")) {
    return None;
  }
  if Command::new("cc").arg("--version").output().is_err() {
    return None;
  }

  let output = rcc9(&[src]);
  assert!(
    output.status.success(),
    "compile failed: {}",
    String::from_utf8_lossy(&output.stderr)
  );

  let dir = scratch(name);
  let asm_path = dir.join("out.s");
  let exe_path = dir.join("out");
  fs::write(&asm_path, &output.stdout).expect("write assembly");

  let link = Command::new("cc")
    .arg("-o")
    .arg(&exe_path)
    .arg(&asm_path)
    .output()
    .expect("spawn cc");
  assert!(
    link.status.success(),
    "cc failed: {}",
    String::from_utf8_lossy(&link.stderr)
  );

  let status = Command::new(&exe_path).status().expect("run program");
  let _ = fs::remove_dir_all(&dir);
  status.code()
}

fn check(name: &str, expected: i32, src: &str) {
  if let Some(code) = run(name, src) {
    assert_eq!(code, expected, "{src}");
  }
}

#[test]
fn prints_assembly_and_exits_zero() {
  let output = rcc9(&["int main() { return 42; }"]);
  assert!(output.status.success());
  let stdout = String::from_utf8_lossy(&output.stdout);
  assert!(stdout.starts_with(".intel_syntax noprefix\n"));
  assert!(stdout.contains("    push 42\n"));
  assert!(output.stderr.is_empty());
}

#[test]
fn undeclared_identifier_prints_nothing_on_stdout() {
  let output = rcc9(&["int main() { return y; }"]);
  assert_eq!(output.status.code(), Some(1));
  assert!(output.stdout.is_empty());
  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(stderr.contains("int main() { return y; }\n"));
  assert!(stderr.contains("^ undefined variable 'y'"));
}

#[test]
fn lex_errors_exit_one() {
  let output = rcc9(&["int main() { return 1 # 2; }"]);
  assert_eq!(output.status.code(), Some(1));
  assert!(output.stdout.is_empty());
  assert!(String::from_utf8_lossy(&output.stderr).contains("invalid token: '#'"));
}

#[test]
fn missing_source_is_a_usage_error() {
  let output = rcc9(&[]);
  assert!(!output.status.success());
  assert!(output.stdout.is_empty());
}

#[test]
fn output_flag_writes_a_file() {
  let dir = scratch("output-flag");
  let path = dir.join("main.s");
  let output = rcc9(&["-o", path.to_str().expect("utf-8 path"), "int main() { return 0; }"]);
  assert!(output.status.success());
  assert!(output.stdout.is_empty());
  let asm = fs::read_to_string(&path).expect("read output");
  assert!(asm.contains(".global main\n"));
  let _ = fs::remove_dir_all(&dir);
}

#[test]
fn log_flag_traces_the_stages() {
  let dir = scratch("log-flag");
  let path = dir.join("trace.log");
  let output = rcc9(&[
    "--log",
    path.to_str().expect("utf-8 path"),
    "int main() { int x; x = 1; return x; }",
  ]);
  assert!(output.status.success());
  let log = fs::read_to_string(&path).expect("read log");
  assert!(log.contains("parsed function main"));
  assert!(log.contains("codegen main: stack_size=8"));
  let _ = fs::remove_dir_all(&dir);
}

#[test]
fn trace_level_dumps_the_ast() {
  let dir = scratch("log-trace");
  let path = dir.join("trace.log");
  let output = rcc9(&[
    "--log",
    path.to_str().expect("utf-8 path"),
    "--log-level",
    "trace",
    "int main() { return 3; }",
  ]);
  assert!(output.status.success());
  let log = fs::read_to_string(&path).expect("read log");
  assert!(log.contains("AST of main: ["));
  assert!(log.contains("Return("));
  assert!(log.contains("Num(\n"));
  let _ = fs::remove_dir_all(&dir);
}

#[test]
fn global_named_like_an_operand_keyword_is_rejected() {
  let output = rcc9(&["int byte; int main() { byte = 5; return byte; }"]);
  assert_eq!(output.status.code(), Some(1));
  assert!(output.stdout.is_empty());
  assert!(String::from_utf8_lossy(&output.stderr).contains("'byte' is reserved by the assembler"));
}

#[test]
fn run_array_sum() {
  check(
    "array-sum",
    3,
    "int main(){ int a[2]; a[0]=1; a[1]=2; return a[0]+a[1]; }",
  );
}

#[test]
fn run_arithmetic_and_comparisons() {
  check("arith", 47, "int main() { return 5 + 6 * 7; }");
  check("neg", 10, "int main() { return -10 + 20; }");
  check("div", 4, "int main() { return (3 + 5) / 2; }");
  check("cmp", 2, "int main() { return (1 < 2) + (2 <= 2) - (3 > 4) + (4 >= 5) - (1 != 1) + (2 == 3); }");
}

#[test]
fn run_control_flow() {
  check(
    "loops",
    55,
    "int main() { int i; int s; s = 0; for (i = 1; i <= 10; i = i + 1) s = s + i; return s; }",
  );
  check(
    "while",
    16,
    "int main() { int x; x = 1; while (x < 10) x = x * 2; return x; }",
  );
  check(
    "if-else",
    7,
    "int main() { int x; x = 3; if (x == 2) return 5; else if (x == 3) return 7; return 9; }",
  );
}

#[test]
fn run_functions() {
  check(
    "fib",
    55,
    "int fib(int n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); } int main() { return fib(10); }",
  );
  check(
    "eight-args",
    36,
    "int add8(int a, int b, int c, int d, int e, int f, int g, int h) { return a+b+c+d+e+f+g+h; }
     int main() { return add8(1, 2, 3, 4, 5, 6, 7, 8); }",
  );
  check(
    "order",
    21,
    "int sub(int a, int b) { return a - b; } int main() { return sub(30, 9); }",
  );
}

#[test]
fn run_pointers_and_arrays() {
  check(
    "addr",
    7,
    "int main() { int x; int *p; p = &x; *p = 7; return x; }",
  );
  check(
    "decay",
    1,
    "int main() { int a[3]; return a == &a[0]; }",
  );
  check(
    "ptr-arith",
    3,
    "int main() { int a[4]; int *p; a[3] = 3; p = a; return *(p + 3); }",
  );
  check(
    "matrix",
    9,
    "int main() { int x[2][3]; int *y; y = x; y[5] = 9; return x[1][2]; }",
  );
}

#[test]
fn run_globals_and_chars() {
  check(
    "globals",
    6,
    "char s[3]; int main() { s[0] = 1; s[1] = 2; return s[0] + s[1] + sizeof(s); }",
  );
  check(
    "char-param",
    44,
    "int f(char c) { return c; } int main() { return f(300 - 256); }",
  );
  check(
    "global-int",
    12,
    "int g; int set(int v) { g = v; return 0; } int main() { set(12); return g; }",
  );
}
