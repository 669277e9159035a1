use minic_compiler::ast::{Item, Stmt};
use minic_compiler::error::{LexErrorKind, ParseErrorKind, SemanticError, TypeError};
use minic_compiler::{parse, Program};

fn check_ok(src: &str) -> Program {
    match parse(src) {
        Ok(p) => p,
        Err(e) => panic!("expected ok, got error: {e}\nsource:\n{src}"),
    }
}

fn check_err(src: &str) -> ParseErrorKind {
    match parse(src) {
        Ok(_) => panic!("expected error, got ok\nsource:\n{src}"),
        Err(e) => e.kind,
    }
}

#[test]
fn widening_is_allowed() {
    check_ok("char c; int i; long l; void main() { i = c; l = i; l = c; }");
}

#[test]
fn narrowing_is_rejected() {
    assert!(matches!(
        check_err("char c; int i; void main() { c = i; }"),
        ParseErrorKind::Type(TypeError::Narrowing { .. })
    ));
    assert!(matches!(
        check_err("char f() { return 300; }"),
        ParseErrorKind::Type(TypeError::Narrowing { .. })
    ));
}

#[test]
fn pointer_levels_must_match() {
    assert!(matches!(
        check_err("int *p; int i; void main() { p = i; }"),
        ParseErrorKind::Type(TypeError::PointerLevelMismatch { .. })
    ));
    assert!(matches!(
        check_err("int *p; int **q; void main() { q = p; }"),
        ParseErrorKind::Type(TypeError::PointerLevelMismatch { .. })
    ));
}

#[test]
fn long_stands_in_for_a_pointer() {
    check_ok("long l; int *p; char **s; void main() { p = l; l = p; s = l; }");
}

#[test]
fn void_value_is_rejected() {
    assert!(matches!(
        check_err("void f() { } int x; void main() { x = f(); }"),
        ParseErrorKind::Type(TypeError::VoidInExpression)
    ));
    assert!(matches!(
        check_err("void f() { } long x; void main() { x = f() + 1; }"),
        ParseErrorKind::Type(TypeError::VoidInExpression)
    ));
    assert!(matches!(check_err("void v;"), ParseErrorKind::Semantic(SemanticError::VoidVariable { .. })));
}

#[test]
fn names_must_be_declared_once() {
    assert!(matches!(
        check_err("void main() { y = 1; }"),
        ParseErrorKind::Semantic(SemanticError::Undeclared { .. })
    ));
    assert!(matches!(check_err("int a; char a;"), ParseErrorKind::Semantic(SemanticError::Redefinition { .. })));
    assert!(matches!(
        check_err("int print;"),
        ParseErrorKind::Semantic(SemanticError::Redefinition { .. })
    ));
    // use before declaration, even when declared later
    assert!(matches!(
        check_err("void main() { g = 1; } int g;"),
        ParseErrorKind::Semantic(SemanticError::Undeclared { .. })
    ));
}

#[test]
fn functions_and_variables_are_not_interchangeable() {
    assert!(matches!(
        check_err("int a; void main() { a(); }"),
        ParseErrorKind::Semantic(SemanticError::NotAFunction { .. })
    ));
    assert!(matches!(
        check_err("void f() { } void main() { f = 1; }"),
        ParseErrorKind::Semantic(SemanticError::NotAVariable { .. })
    ));
}

#[test]
fn calls_are_checked_against_parameters() {
    assert_eq!(
        check_err("void main() { print(1, 2); }"),
        ParseErrorKind::Semantic(SemanticError::ArgumentCount { name: "print".into(), expected: 1, found: 2 })
    );
    assert!(matches!(
        check_err("void main() { print_ln(1); }"),
        ParseErrorKind::Semantic(SemanticError::ArgumentCount { expected: 0, found: 1, .. })
    ));
    assert!(matches!(
        check_err("void main() { print_str(5); }"),
        ParseErrorKind::Semantic(SemanticError::ArgumentType { source: TypeError::PointerLevelMismatch { .. }, .. })
    ));
    assert!(matches!(
        check_err("long l; void main() { print_char(l); }"),
        ParseErrorKind::Semantic(SemanticError::ArgumentType { source: TypeError::Narrowing { .. }, .. })
    ));
    check_ok("int f(char c) { return c; } void main() { print(f('a')); }");
}

#[test]
fn at_most_one_parameter() {
    assert!(matches!(
        check_err("int f(int a, int b) { return a; }"),
        ParseErrorKind::Semantic(SemanticError::TooManyParameters { .. })
    ));
    check_ok("int f(void) { return 1; }");
}

#[test]
fn break_needs_an_enclosing_loop() {
    assert!(matches!(check_err("void main() { break; }"), ParseErrorKind::Semantic(SemanticError::BreakOutsideLoop)));
    assert!(matches!(
        check_err("int x; void main() { if (x) break; }"),
        ParseErrorKind::Semantic(SemanticError::BreakOutsideLoop)
    ));
    check_ok("int x; void main() { while (1) { if (x) { break; } } do break; while (1); for (;1;) break; }");
}

#[test]
fn return_matches_function_type() {
    assert!(matches!(
        check_err("void f() { return 1; }"),
        ParseErrorKind::Semantic(SemanticError::ReturnValueFromVoid { .. })
    ));
    assert!(matches!(
        check_err("int f() { return; }"),
        ParseErrorKind::Semantic(SemanticError::MissingReturnValue { .. })
    ));
    check_ok("void f() { return; } int g() { return 1; } long h() { return g(); }");
}

#[test]
fn dereference_depth_is_checked() {
    assert!(matches!(
        check_err("int *p; int x; void main() { x = **p; }"),
        ParseErrorKind::Type(TypeError::OverDeref { levels: 2, .. })
    ));
    assert!(matches!(
        check_err("int x; int y; void main() { y = *x; }"),
        ParseErrorKind::Type(TypeError::NotAPointer { .. })
    ));
    check_ok("int **pp; int x; void main() { x = **pp; *pp = &x; }");
}

#[test]
fn pointer_arithmetic_rules() {
    assert!(matches!(
        check_err("int *p; int *q; void main() { p = p + q; }"),
        ParseErrorKind::Type(TypeError::InvalidPointerArithmetic { op: "+", .. })
    ));
    assert!(matches!(
        check_err("int *p; void main() { p = p * 2; }"),
        ParseErrorKind::Type(TypeError::InvalidPointerArithmetic { op: "*", .. })
    ));
    assert!(matches!(
        check_err("int *p; void main() { p = 1 - p; }"),
        ParseErrorKind::Type(TypeError::InvalidPointerArithmetic { op: "-", .. })
    ));
    check_ok("int *p; void main() { p = p - 1; p = 2 + p; }");
}

#[test]
fn comparisons() {
    check_ok("int *p; int x; void main() { x = p == 0; x = p != p; }");
    assert!(matches!(
        check_err("int *p; int **q; int x; void main() { x = p == q; }"),
        ParseErrorKind::Type(TypeError::IncomparableTypes { .. })
    ));
}

#[test]
fn arrays_and_initializers() {
    assert!(matches!(
        check_err("int a[3]; int *p; void main() { a = p; }"),
        ParseErrorKind::Semantic(SemanticError::AssignToArray { .. })
    ));
    assert!(matches!(
        check_err("int a = 1 + 2;"),
        ParseErrorKind::Semantic(SemanticError::NonLiteralGlobalInit { .. })
    ));
    assert!(matches!(check_err("int a[0];"), ParseErrorKind::Semantic(SemanticError::ZeroLengthArray { .. })));
    check_ok("int n = 5; char s[8] = \"hi\"; char *m = \"yo\"; void main() { int k = n + 1; }");
}

#[test]
fn address_of_needs_storage() {
    assert!(matches!(
        check_err("int *p; void main() { p = &5; }"),
        ParseErrorKind::Semantic(SemanticError::InvalidAddressOf)
    ));
    check_ok("int a[4]; int *p; void main() { p = &a[1]; p = &a; }");
}

#[test]
fn syntax_errors_name_the_construct() {
    let err = parse("void main() { int x }").unwrap_err();
    assert_eq!(err.pos.line, 1);
    match err.kind {
        ParseErrorKind::UnexpectedToken { construct, found, .. } => {
            assert_eq!(construct, "declaration");
            assert_eq!(found, "}");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn lex_errors_surface_through_the_parser() {
    let err = parse("int x;\nvoid main() {\n  x = x ! 1;\n}").unwrap_err();
    assert!(matches!(err.kind, ParseErrorKind::Lex(LexErrorKind::BangWithoutEq { .. })));
    assert_eq!(err.pos.line, 3);
}

#[test]
fn else_binds_to_nearest_if() {
    let program = check_ok("int a; int b; int x; void main() { if (a) if (b) x = 1; else x = 2; }");
    let Some(Item::Function { body, .. }) = program.items.last() else { panic!("expected a function") };
    let Stmt::If { then_body, else_body, .. } = &body[0] else { panic!("expected if") };
    assert!(else_body.is_none());
    assert!(matches!(&then_body[0], Stmt::If { else_body: Some(_), .. }));
}

#[test]
fn declaration_list_shares_the_type() {
    let program = check_ok("int *a, b;");
    let a = program.symbols.find("a").unwrap();
    let b = program.symbols.find("b").unwrap();
    assert_eq!(program.symbols.get(a).ty.to_string(), "int*");
    assert_eq!(program.symbols.get(b).ty.to_string(), "int*");
}
