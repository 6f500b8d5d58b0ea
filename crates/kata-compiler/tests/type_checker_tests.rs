//! Type-checker integration tests.
//!
//! Each test parses and checks a snippet via `kata_compiler::type_check` and
//! asserts on the presence (or absence) of specific diagnostic codes.

use kata_types::{DiagnosticCode, Diagnostics, Severity};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn check(source: &str) -> Diagnostics {
    kata_compiler::type_check(source, "test.ts")
}

fn describe(diagnostics: &Diagnostics) -> Vec<String> {
    diagnostics.iter().map(|d| format!("{}: {}", d.code, d.message)).collect()
}

fn assert_ok(source: &str) {
    let diagnostics = check(source);
    assert!(
        !diagnostics.has_errors(),
        "expected no errors, got {}:\n{:#?}",
        diagnostics.total_errors,
        describe(&diagnostics)
    );
}

fn assert_error(source: &str, expected_code: DiagnosticCode) {
    let diagnostics = check(source);
    assert!(
        diagnostics
            .errors()
            .any(|d| d.code == expected_code),
        "expected error code {:?}, got: {:?}",
        expected_code,
        describe(&diagnostics)
    );
}

fn first_error_message(source: &str) -> String {
    check(source)
        .errors()
        .next()
        .map(|d| d.message.clone())
        .unwrap_or_default()
}

fn warning_codes(source: &str) -> Vec<DiagnosticCode> {
    check(source).warnings().map(|d| d.code).collect()
}

// ══════════════════════════════════════════════════════════════════════════════
// Declarations
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_inferred_declarations() {
    assert_ok(
        r#"
const a = 1
let b = "two"
let c = true
const d = [1, 2, 3]
console.log(a, b, c, d)
"#,
    );
}

#[test]
fn test_annotated_declarations() {
    assert_ok(
        r#"
let n: number = 1
let s: string
let xs: number[] = []
let grid: number[][] = [[], [1]]
let e: Error = new Error("boom")
console.log(n, s, xs, grid, e.message)
"#,
    );
}

#[test]
fn test_initializer_mismatch() {
    assert_error(r#"let n: number = "one""#, DiagnosticCode::TYPE_MISMATCH);
    assert_eq!(
        first_error_message(r#"let n: number = "one"; console.log(n)"#),
        "Type 'string' is not assignable to type 'number'"
    );
}

#[test]
fn test_empty_array_needs_type() {
    assert_error("let xs = []\nconsole.log(xs)", DiagnosticCode::EMPTY_ARRAY_NEEDS_TYPE);
}

#[test]
fn test_mixed_array_elements_rejected() {
    assert_error("const xs = [1, 'a']\nconsole.log(xs)", DiagnosticCode::TYPE_MISMATCH);
}

#[test]
fn test_missing_annotation_and_value() {
    assert_error("let x\nconsole.log(x)", DiagnosticCode::MISSING_ANNOTATION);
}

#[test]
fn test_const_requires_initializer() {
    assert_error("const x: number\nconsole.log(x)", DiagnosticCode::CONST_WITHOUT_INIT);
}

#[test]
fn test_unknown_type_annotation() {
    assert_error("let m: Map = 1", DiagnosticCode::UNKNOWN_TYPE);
}

#[test]
fn test_redeclaration_in_same_scope() {
    assert_error("let x = 1\nlet x = 2\nconsole.log(x)", DiagnosticCode::ALREADY_DECLARED);
}

#[test]
fn test_shadowing_in_inner_block() {
    assert_ok(
        r#"
let x = 1
{
  let x = "inner"
  console.log(x)
}
console.log(x)
"#,
    );
}

#[test]
fn test_block_scoped_name_not_visible_outside() {
    assert_error("{ let y = 1; console.log(y) }\nconsole.log(y)", DiagnosticCode::UNKNOWN_NAME);
}

#[test]
fn test_assign_to_const() {
    assert_error("const x = 1\nx = 2", DiagnosticCode::ASSIGN_TO_CONST);
    assert_error("const x = 1\nx++", DiagnosticCode::ASSIGN_TO_CONST);
}

#[test]
fn test_assignment_type_mismatch() {
    assert_error("let x = 1\nx = 'a'\nconsole.log(x)", DiagnosticCode::TYPE_MISMATCH);
    assert_error("let s = 'a'\ns -= 1\nconsole.log(s)", DiagnosticCode::INVALID_OPERANDS);
}

#[test]
fn test_string_index_assignment_rejected() {
    assert_error("let s = 'abc'\ns[0] = 'x'\nconsole.log(s)", DiagnosticCode::TYPE_MISMATCH);
}

#[test]
fn test_void_variable_rejected() {
    assert_error("let v: void = print(1)", DiagnosticCode::TYPE_MISMATCH);
}

// ══════════════════════════════════════════════════════════════════════════════
// Names
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_unknown_name_suggests_close_match() {
    let diagnostics = check("let count = 1\nconsole.log(cuont)");
    let error = diagnostics.errors().next().expect("an error");
    assert_eq!(error.code, DiagnosticCode::UNKNOWN_NAME);
    assert_eq!(error.message, "Cannot find name 'cuont'");
    assert_eq!(error.suggestion.as_deref(), Some("Did you mean 'count'?"));
}

#[test]
fn test_misspelled_namespace() {
    let diagnostics = check("consol.log(1)");
    let error = diagnostics.errors().next().expect("an error");
    assert_eq!(error.code, DiagnosticCode::UNKNOWN_NAME);
    assert_eq!(error.suggestion.as_deref(), Some("Did you mean 'console'?"));
}

#[test]
fn test_unknown_console_method() {
    assert_error("console.table([1])", DiagnosticCode::UNKNOWN_PROPERTY);
}

#[test]
fn test_function_used_as_value() {
    assert_error("function f(): void {}\nconst g = f\nconsole.log(g)", DiagnosticCode::TYPE_MISMATCH);
}

#[test]
fn test_variable_shadowing_namespace() {
    assert_error("const Math = 1\nconsole.log(Math.floor(1.5))", DiagnosticCode::UNKNOWN_PROPERTY);
}

// ══════════════════════════════════════════════════════════════════════════════
// Operators
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_string_concatenation_with_numbers() {
    assert_ok("const n = 3\nconsole.log('n = ' + n, n + '!')");
}

#[test]
fn test_arithmetic_requires_numbers() {
    assert_error("console.log('a' * 2)", DiagnosticCode::INVALID_OPERANDS);
    assert_error("console.log(true + 1)", DiagnosticCode::INVALID_OPERANDS);
}

#[test]
fn test_relational_operand_types() {
    assert_ok("console.log(1 < 2, 'a' < 'b')");
    assert_error("console.log(1 < 'b')", DiagnosticCode::INVALID_OPERANDS);
}

#[test]
fn test_unrelated_comparison() {
    assert_eq!(
        first_error_message("console.log(1 === '1')"),
        "This comparison appears to be unintentional because the types 'number' and 'string' have no overlap"
    );
}

#[test]
fn test_loose_equality_warns() {
    let diagnostics = check("console.log(1 == 1)");
    assert!(!diagnostics.has_errors());
    assert_eq!(warning_codes("console.log(1 == 1)"), vec![DiagnosticCode::LOOSE_EQUALITY]);
}

#[test]
fn test_logical_operators_require_booleans() {
    assert_error("console.log(1 && true)", DiagnosticCode::INVALID_OPERANDS);
    assert_ok("console.log(1 < 2 && !false || true)");
}

#[test]
fn test_condition_must_be_boolean() {
    assert_error("const n = 1\nif (n) { console.log(n) }", DiagnosticCode::TYPE_MISMATCH);
    assert_error("while (1) { }", DiagnosticCode::TYPE_MISMATCH);
}

#[test]
fn test_conditional_branches_agree() {
    assert_ok("const n = 2\nconsole.log(n > 1 ? 'big' : 'small')");
    assert_error("const n = 2\nconsole.log(n > 1 ? 'big' : 0)", DiagnosticCode::TYPE_MISMATCH);
}

#[test]
fn test_unary_plus_converts() {
    assert_ok("console.log(+'42', +true, -3)");
    assert_error("console.log(-'3')", DiagnosticCode::INVALID_OPERANDS);
}

#[test]
fn test_index_types() {
    assert_ok("const xs = [1, 2]\nconst s = 'ab'\nconsole.log(xs[0] + 1, s[1])");
    assert_error("const xs = [1, 2]\nconsole.log(xs['0'])", DiagnosticCode::TYPE_MISMATCH);
    assert_error("const n = 1\nconsole.log(n[0])", DiagnosticCode::TYPE_MISMATCH);
}

// ══════════════════════════════════════════════════════════════════════════════
// Built-ins
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_string_methods() {
    assert_ok(
        r#"
const s = " Hello "
const parts: string[] = s.trim().toLowerCase().split("l")
console.log(s.length, s.includes("H"), s.indexOf("e"), s.slice(1, 3), s.charAt(0), parts)
console.log("ab".repeat(2), s.startsWith(" "), s.endsWith("o"), s.toUpperCase())
"#,
    );
}

#[test]
fn test_array_methods() {
    assert_ok(
        r#"
const xs: number[] = []
const n: number = xs.push(1, 2, 3)
const last: number = xs.pop()
const copy: number[] = xs.slice(1).reverse()
console.log(n, last, copy, xs.join("-"), xs.includes(2), xs.indexOf(2), xs.length)
"#,
    );
}

#[test]
fn test_array_push_element_type() {
    assert_error("const xs = [1]\nxs.push('a')", DiagnosticCode::TYPE_MISMATCH);
}

#[test]
fn test_math_and_globals() {
    assert_ok(
        r#"
console.log(Math.floor(1.5), Math.max(1, 2, 3), Math.min(), Math.PI, Math.pow(2, 8))
console.log(String(1), Number("2"), parseInt("3"), isNaN(NaN), Infinity)
console.log((1.005).toFixed(2), (10).toString(), true.toString())
"#,
    );
}

#[test]
fn test_wrong_argument_count() {
    assert_error("console.log(Math.floor(1, 2))", DiagnosticCode::WRONG_ARG_COUNT);
    assert_eq!(
        first_error_message("console.log(Math.floor())"),
        "Expected 1 argument, but got 0"
    );
    assert_error("console.log('a'.slice())", DiagnosticCode::WRONG_ARG_COUNT);
    assert_error("const xs = [1]\nxs.push()", DiagnosticCode::WRONG_ARG_COUNT);
}

#[test]
fn test_argument_type_mismatch() {
    assert_eq!(
        first_error_message("console.log(Math.sqrt('4'))"),
        "Argument of type 'string' is not assignable to parameter of type 'number'"
    );
}

#[test]
fn test_unknown_property() {
    assert_eq!(
        first_error_message("const n = 1\nconsole.log(n.length)"),
        "Property 'length' does not exist on type 'number'"
    );
}

#[test]
fn test_method_used_as_property() {
    assert_error("const s = 'a'\nconsole.log(s.trim)", DiagnosticCode::TYPE_MISMATCH);
}

#[test]
fn test_property_called_as_method() {
    assert_error("const s = 'a'\nconsole.log(s.length())", DiagnosticCode::NOT_CALLABLE);
}

#[test]
fn test_void_value_used() {
    assert_error("const x = console.log(1)", DiagnosticCode::VOID_VALUE_USED);
    assert_error("console.log(print(1))", DiagnosticCode::VOID_VALUE_USED);
}

#[test]
fn test_new_error() {
    assert_ok("const e = new Error('x')\nconst f = new Error()\nconsole.log(e.message, f.toString())");
    assert_error("const e = new Error(1)\nconsole.log(e)", DiagnosticCode::TYPE_MISMATCH);
}

// ══════════════════════════════════════════════════════════════════════════════
// Functions & control flow
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_functions_are_hoisted() {
    assert_ok(
        r#"
console.log(double(21))
function double(n: number): number {
  return n * 2
}
"#,
    );
}

#[test]
fn test_recursive_function() {
    assert_ok(
        r#"
function fib(n: number): number {
  if (n < 2) {
    return n
  }
  return fib(n - 1) + fib(n - 2)
}
console.log(fib(10))
"#,
    );
}

#[test]
fn test_call_arity_and_types() {
    let source = "function add(a: number, b: number): number { return a + b }\n";
    assert_error(&format!("{source}console.log(add(1))"), DiagnosticCode::WRONG_ARG_COUNT);
    assert_error(&format!("{source}console.log(add(1, 'b'))"), DiagnosticCode::TYPE_MISMATCH);
}

#[test]
fn test_calling_a_variable() {
    assert_error("const n = 1\nn()", DiagnosticCode::NOT_CALLABLE);
}

#[test]
fn test_return_type_mismatch() {
    assert_error("function f(): number { return 'a' }", DiagnosticCode::TYPE_MISMATCH);
    assert_error("function f(): number { return }", DiagnosticCode::TYPE_MISMATCH);
}

#[test]
fn test_missing_return() {
    assert_error(
        "function f(n: number): number { if (n > 0) { return 1 } }",
        DiagnosticCode::MISSING_RETURN,
    );
    assert_ok("function f(n: number): number { if (n > 0) { return 1 } else { return 2 } }");
    assert_ok("function f(): number { while (true) { } }");
    assert_ok("function f(): number { throw new Error('no') }");
}

#[test]
fn test_infinite_loop_with_break_needs_return() {
    assert_error(
        "function f(): number { while (true) { break } }",
        DiagnosticCode::MISSING_RETURN,
    );
}

#[test]
fn test_return_outside_function() {
    assert_error("return 1", DiagnosticCode::RETURN_OUTSIDE_FUNCTION);
}

#[test]
fn test_break_and_continue_outside_loop() {
    assert_error("break", DiagnosticCode::BREAK_OUTSIDE_LOOP);
    assert_error("if (true) { continue }", DiagnosticCode::BREAK_OUTSIDE_LOOP);
    assert_ok("for (let i = 0; i < 3; i++) { if (i === 1) { continue } if (i === 2) { break } }");
}

#[test]
fn test_loop_depth_does_not_leak_into_functions() {
    assert_error(
        "while (false) {}\nfunction f(): void { break }",
        DiagnosticCode::BREAK_OUTSIDE_LOOP,
    );
}

#[test]
fn test_for_of_element_types() {
    assert_ok("for (const n of [1, 2]) { console.log(n * 2) }");
    assert_ok("for (const c of 'abc') { console.log(c.toUpperCase()) }");
    assert_error("for (const c of 3) { console.log(c) }", DiagnosticCode::TYPE_MISMATCH);
}

#[test]
fn test_duplicate_function() {
    assert_error(
        "function f(): void {}\nfunction f(): void {}",
        DiagnosticCode::ALREADY_DECLARED,
    );
}

#[test]
fn test_variable_conflicts_with_function() {
    assert_error("function f(): void {}\nconst f = 1", DiagnosticCode::ALREADY_DECLARED);
}

#[test]
fn test_functions_read_globals() {
    assert_ok(
        r#"
let total = 0
function add(n: number): void {
  total += n
}
add(2)
console.log(total)
"#,
    );
}

// ══════════════════════════════════════════════════════════════════════════════
// Warnings
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_unused_variable_warning() {
    let diagnostics = check("const unused = 1");
    assert!(!diagnostics.has_errors());
    let warning = diagnostics.warnings().next().expect("a warning");
    assert_eq!(warning.code, DiagnosticCode::UNUSED_VARIABLE);
    assert_eq!(warning.severity, Severity::Warning);
    assert_eq!(warning.message, "'unused' is declared but its value is never read");
}

#[test]
fn test_write_only_variable_is_unused() {
    assert_eq!(
        warning_codes("let x = 1\nx = 2"),
        vec![DiagnosticCode::UNUSED_VARIABLE]
    );
}

#[test]
fn test_underscore_and_parameters_not_reported() {
    assert!(warning_codes("const _ignored = 1\nfunction f(n: number): void {}\nf(1)").is_empty());
}

#[test]
fn test_unreachable_code_warning() {
    let source = r#"
function f(): number {
  return 1
  console.log("never")
  console.log("also never")
}
console.log(f())
"#;
    assert_eq!(warning_codes(source), vec![DiagnosticCode::UNREACHABLE_CODE]);
}

#[test]
fn test_warnings_keep_source_order() {
    let diagnostics = check("const a = 1\nconst b = 2");
    let names: Vec<_> = diagnostics.warnings().map(|d| d.span.start_line).collect();
    assert_eq!(names, vec![1, 2]);
}

// ══════════════════════════════════════════════════════════════════════════════
// Pipeline ordering
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_syntax_errors_skip_checking() {
    let diagnostics = check("let x: number = 'a'\nlet y = (");
    assert!(diagnostics
        .errors()
        .all(|d| d.code != DiagnosticCode::TYPE_MISMATCH));
}

#[test]
fn test_diagnostic_carries_source_line() {
    let diagnostics = check("let n = 1\nlet s: string = n\nconsole.log(s)");
    let error = diagnostics.errors().next().expect("an error");
    assert_eq!(error.source_line, "let s: string = n");
    assert_eq!(error.span.start_line, 2);
    assert_eq!(error.file, "test.ts");
}

#[test]
fn test_check_determinism() {
    let source = "let x: number = 'a'\nconst unused = [1]\nconsole.log(y)";
    let reference = check(source);
    for i in 0..100 {
        assert_eq!(check(source), reference, "Determinism failure at iteration {i}");
    }
}
