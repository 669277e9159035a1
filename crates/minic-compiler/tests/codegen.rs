use minic_compiler::{compile, CodegenError, CompileError};

fn asm(src: &str) -> String {
    match compile(src) {
        Ok(asm) => asm,
        Err(e) => panic!("expected ok, got error: {e}\nsource:\n{src}"),
    }
}

/// Asserts `expected` appears as consecutive lines, ignoring indentation.
fn assert_lines(asm: &str, expected: &[&str]) {
    let lines: Vec<&str> = asm.lines().map(str::trim).collect();
    let found = lines.windows(expected.len()).any(|w| w == expected);
    assert!(found, "missing sequence {expected:#?}\nin:\n{asm}");
}

#[test]
fn pointer_offset_is_scaled_by_element_size() {
    let out = asm("int *p; long q; void main() { q = p + 3; }");
    assert_lines(
        &out,
        &["mov r12, qword [rel $p]", "mov r13, 3", "mov r14, 4", "imul r13, r14", "add r12, r13", "mov qword [rel $q], r12"],
    );
}

#[test]
fn pointer_to_pointer_scales_by_eight() {
    let out = asm("int **pp; long q; void main() { q = pp + 1; }");
    assert_lines(&out, &["mov r13, 1", "mov r14, 8", "imul r13, r14"]);
}

#[test]
fn char_pointer_needs_no_scaling() {
    let out = asm("char *s; long q; void main() { q = s + 2; }");
    assert_lines(&out, &["mov r12, qword [rel $s]", "mov r13, 2", "add r12, r13"]);
    assert!(!out.contains("imul"));
}

#[test]
fn array_index_loads_through_computed_address() {
    let out = asm("int a[10]; int i; int x; void main() { x = a[i]; }");
    assert_lines(
        &out,
        &[
            "lea r12, [rel $a]",
            "movsxd r13, dword [rel $i]",
            "mov r14, 4",
            "imul r13, r14",
            "add r12, r13",
            "movsxd r12, dword [r12]",
            "mov dword [rel $x], r12d",
        ],
    );
    assert!(out.contains("$a: resd 10\n"));
}

#[test]
fn store_through_array_index() {
    let out = asm("char buf[4]; void main() { buf[1] = 'z'; }");
    assert_lines(&out, &["mov r12, 122", "lea r13, [rel $buf]", "mov r14, 1", "add r13, r14", "mov byte [r13], r12b"]);
}

#[test]
fn multi_level_dereference() {
    let out = asm("int v; int **pp; void main() { v = **pp; **pp = 7; }");
    assert_lines(&out, &["mov r12, qword [rel $pp]", "mov r12, qword [r12]", "movsxd r12, dword [r12]"]);
    assert_lines(&out, &["mov r12, 7", "mov r13, qword [rel $pp]", "mov r13, qword [r13]", "mov dword [r13], r12d"]);
}

#[test]
fn comparison_materializes_zero_or_one() {
    let out = asm("int a; int b; void main() { b = a < 3; }");
    assert_lines(&out, &["cmp r12, r13", "setl r12b", "movzx r12, r12b", "mov dword [rel $b], r12d"]);
}

#[test]
fn division_goes_through_rax() {
    let out = asm("long a; void main() { a = a / 3; }");
    assert_lines(&out, &["mov rax, r12", "cqo", "idiv r13", "mov r12, rax"]);
}

#[test]
fn break_jumps_to_loop_end() {
    let out = asm("int x; void main() { while (1) { if (x) { break; } } }");
    assert_lines(
        &out,
        &[
            "__label.0:",
            "mov r12, 1",
            "cmp r12, 1",
            "jne __label.1",
            "movsxd r12, dword [rel $x]",
            "cmp r12, 1",
            "jne __label.2",
            "jmp __label.1",
            "__label.2:",
            "jmp __label.0",
            "__label.1:",
        ],
    );
}

#[test]
fn break_leaves_only_the_innermost_loop() {
    let out = asm("void main() { while (1) { do { break; } while (1); } }");
    // outer while owns labels 0/1, inner do-while 2/3
    assert_lines(&out, &["__label.2:", "jmp __label.3"]);
    assert_lines(&out, &["je __label.2", "__label.3:", "jmp __label.0", "__label.1:"]);
}

#[test]
fn condition_holds_only_when_one() {
    let out = asm("int x; void main() { while (x) { x = 0; } }");
    assert_lines(&out, &["movsxd r12, dword [rel $x]", "cmp r12, 1", "jne __label.1"]);
    assert!(!out.contains("cmp r12, 0"));

    let out = asm("int x; void main() { do { x = x - 1; } while (x); }");
    assert_lines(&out, &["movsxd r12, dword [rel $x]", "cmp r12, 1", "je __label.0", "__label.1:"]);
}

#[test]
fn if_else_layout() {
    let out = asm("int x; void main() { if (x) x = 1; else x = 2; }");
    assert_lines(&out, &["jne __label.0", "mov r12, 1", "mov dword [rel $x], r12d", "jmp __label.1", "__label.0:"]);
    assert_lines(&out, &["mov r12, 2", "mov dword [rel $x], r12d", "__label.1:"]);
}

#[test]
fn function_call_and_return() {
    let out = asm("int f(int x) { return x + 1; } int y; void main() { y = f(2); }");
    assert_lines(
        &out,
        &[
            "global $f",
            "$f:",
            "push rbp",
            "mov rbp, rsp",
            "push r12",
            "push r13",
            "push r14",
            "push r15",
            "mov dword [rel $x], edi",
        ],
    );
    assert_lines(
        &out,
        &["add r12, r13", "movsxd rax, r12d", "pop r15", "pop r14", "pop r13", "pop r12", "pop rbp", "ret"],
    );
    assert_lines(&out, &["mov r12, 2", "mov rdi, r12", "call $f", "mov r12, rax", "mov dword [rel $y], r12d"]);
    assert!(out.contains("$x: resd 1\n"));
}

#[test]
fn function_without_return_yields_zero() {
    let out = asm("void main() { }");
    assert_lines(
        &out,
        &["$main:", "push rbp", "mov rbp, rsp", "push r12", "push r13", "push r14", "push r15", "xor eax, eax", "pop r15"],
    );
    assert!(out.ends_with("ret\nsection .note.GNU-stack noalloc noexec nowrite progbits\n"));
}

#[test]
fn builtins_are_external_and_declared_once() {
    let out = asm("void main() { print(1); print(2); print_ln(); }");
    assert_eq!(out.matches("extern print\n").count(), 1);
    assert!(out.contains("extern print_ln\n"));
    assert!(!out.contains("extern print_str"));
    assert_lines(&out, &["mov r12, 1", "mov rdi, r12", "call print wrt ..plt"]);
    assert!(out.starts_with("default rel\n"));
}

#[test]
fn user_functions_are_not_external() {
    let out = asm("void g() { } void main() { g(); }");
    assert!(!out.contains("extern"));
    assert_lines(&out, &["call $g"]);
}

#[test]
fn register_and_keyword_names_stay_identifiers() {
    let out = asm("long r12; void main() { r12 = 1; print(r12); }");
    assert_lines(&out, &["mov r12, 1", "mov qword [rel $r12], r12"]);
    assert_lines(&out, &["mov r12, qword [rel $r12]", "mov rdi, r12", "call print wrt ..plt"]);
    assert!(out.contains("$r12: resq 1\n"));

    let out = asm("long byte; long rel; long rax; void main() { byte = rel; rax = 2; }");
    assert_lines(&out, &["mov r12, qword [rel $rel]", "mov qword [rel $byte], r12"]);
    assert_lines(&out, &["mov r12, 2", "mov qword [rel $rax], r12"]);
}

#[test]
fn generated_names_never_clash_with_identifiers() {
    let out = asm("char __str__0; int __label__0; void main() { print_str(\"x\"); while (__label__0) { break; } }");
    assert!(out.contains("$__str.0: db 120,0\n"));
    assert!(out.contains("$__str__0: resb 1\n"));
    assert_lines(&out, &["lea r12, [rel $__str.0]"]);
    assert_lines(&out, &["movsxd r12, dword [rel $__label__0]", "cmp r12, 1", "jne __label.1"]);
}

#[test]
fn global_initializers_go_to_data() {
    let out = asm("int n = 5; char s[8] = \"hi\"; char *m = \"yo\"; long z;");
    assert!(out.contains(
        "section .data\n$n: dd 5\n$s: db 104,105,0,0,0,0,0,0\n$__str.0: db 121,111,0\n$m: dq $__str.0\n"
    ));
    assert!(out.contains("section .bss\n$z: resq 1\n"));
}

#[test]
fn string_literal_as_argument() {
    let out = asm("void main() { print_str(\"ok\"); }");
    assert_lines(&out, &["lea r12, [rel $__str.0]", "mov rdi, r12", "call print_str wrt ..plt"]);
    assert!(out.contains("$__str.0: db 111,107,0\n"));
}

#[test]
fn local_literal_initializer_is_static_data() {
    let out = asm("void main() { char c = 'a'; int n = 5; }");
    assert!(out.contains("section .data\n$c: db 97\n$n: dd 5\n"));
    assert!(!out.contains("[rel $c]"));
    assert!(!out.contains("[rel $n]"));
}

#[test]
fn local_expression_initializer_is_stored_at_runtime() {
    let out = asm("int n = 5; void main() { int k = n + 1; }");
    assert_lines(&out, &["movsxd r12, dword [rel $n]", "mov r13, 1", "add r12, r13", "mov dword [rel $k], r12d"]);
    assert!(out.contains("$k: resd 1\n"));
}

#[test]
fn deep_right_nesting_runs_out_of_registers() {
    let err = compile("long a; void main() { a = 1 + (2 + (3 + (4 + 5))); }").unwrap_err();
    assert!(matches!(err, CompileError::Codegen(CodegenError::OutOfRegisters)));
    // the same sum nested to the left only ever needs two registers
    asm("long a; void main() { a = (((1 + 2) + 3) + 4) + 5; }");
}

#[test]
fn indexing_a_pointer_loads_it_first() {
    let out = asm("int *p; int x; void main() { x = p[2]; }");
    assert_lines(
        &out,
        &["mov r12, qword [rel $p]", "mov r13, 2", "mov r14, 4", "imul r13, r14", "add r12, r13", "movsxd r12, dword [r12]"],
    );
}

#[test]
fn address_of_element_skips_the_load() {
    let out = asm("int a[4]; int *p; void main() { p = &a[1]; }");
    assert_lines(
        &out,
        &["lea r12, [rel $a]", "mov r13, 1", "mov r14, 4", "imul r13, r14", "add r12, r13", "mov qword [rel $p], r12"],
    );
}
