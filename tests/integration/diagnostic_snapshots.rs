//! Rendered diagnostics, as an editor integration would print them.
#[path = "../common/mod.rs"]
mod common;

use common::*;
use gradual::CheckOutput;
use gradual::ast::{Annotation, AstBuilder};
use insta::assert_snapshot;

fn render(out: &CheckOutput) -> String {
    out.diagnostics.iter().map(|d| d.to_string()).collect::<Vec<_>>().join("\n")
}

fn trail(out: &CheckOutput) -> String {
    out.diagnostics[0]
        .kind
        .trail()
        .unwrap_or_default()
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn no_method() {
    let b = AstBuilder::new();
    let out = check(&core(), b.call(b.int(1), "foo", vec![]));
    assert_snapshot!(render(&out), @"error[NoMethod] 1..2: Type `1` does not have method `foo`");
}

#[test]
fn incompatible_assignment() {
    let b = AstBuilder::new();
    let assign = b.assign("s", b.int(1)).with_annotation(Annotation::VarType {
        name: "s".into(),
        ty: string(),
    });
    let out = check(&core(), assign);
    assert_snapshot!(
        render(&out),
        @"error[IncompatibleAssignment] 1..2: Cannot assign a value of type `1` to a variable of type `String`"
    );
}

#[test]
fn argument_type_mismatch_with_trail() {
    let b = AstBuilder::new();
    let out = check(&core(), b.call(b.str("a"), "*", vec![b.str("b")]));
    assert_snapshot!(
        render(&out),
        @r#"error[ArgumentTypeMismatch] 1..2: Cannot pass a value of type `"b"` as argument #0 of type `Integer`"#
    );
    assert_snapshot!(trail(&out), @r#"
    "b" <: Integer
    String <: Integer
    "#);
}

#[test]
fn unresolved_overloading_lists_candidates() {
    let b = AstBuilder::new();
    let out = check(&core(), b.call(b.int(1), "+", vec![b.str("a")]));
    assert_snapshot!(
        render(&out),
        @"error[UnresolvedOverloading] 2..3: Cannot find compatible overloading of method `+` of type `1`"
    );

    let gradual::diagnostics::DiagnosticKind::UnresolvedOverloading { candidates, .. } = &out.diagnostics[0].kind
    else {
        panic!("expected an overloading failure");
    };
    let listed = candidates.iter().map(|c| c.to_string()).collect::<Vec<_>>().join("\n");
    assert_snapshot!(listed, @r"
    (Integer) -> Integer
    (Float) -> Float
    (Rational) -> Rational
    (Complex) -> Complex
    ");
}

#[test]
fn required_block_missing() {
    let b = AstBuilder::new();
    let out = check(&core(), b.call(b.int(3), "times", vec![]));
    assert_snapshot!(render(&out), @"error[RequiredBlockMissing] 1..2: Method `times` requires a block");
}

#[test]
fn mixed_severities() {
    let b = AstBuilder::new();
    let asserted = b.int(1).with_annotation(Annotation::Assertion(string()));
    let case = b.case(Some(b.var("x")), vec![b.when(vec![b.nil()], None)], None);
    let root = b.begin(vec![asserted, case]).with_annotation(Annotation::VarType {
        name: "x".into(),
        ty: int(),
    });
    let out = check(&core(), root);
    assert_snapshot!(render(&out), @r"
    warning[FalseAssertion] 0..1: Assertion cannot hold: a value of type `1` is never `String`
    hint[UnreachableValueBranch] 3..4: The branch is unreachable because the condition is exhaustive; it evaluates to `nil`
    ");
}
