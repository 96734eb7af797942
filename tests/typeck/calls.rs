//! Method calls: lookup, arity, keywords, argument types and overloads.
#[path = "../common/mod.rs"]
mod common;

use common::*;
use gradual::ast::{Annotation, Arg, AstBuilder, Node};
use gradual::diagnostics::{ArgPosition, DiagnosticKind};
use gradual::typeck::{DeclTable, MethodType, Params, Type};

fn pin(node: Node, name: &str, ty: Type) -> Node {
    node.with_annotation(Annotation::VarType { name: name.to_string(), ty })
}

/// `deliver: (String, ?Integer, to: String, ?cc: String) -> bool`
fn mailer() -> DeclTable {
    let deliver = Params::positional(vec![string()])
        .with_optional(int())
        .with_keyword("to", string())
        .with_optional_keyword("cc", string());
    core_with([
        class("Mailer")
            .method("deliver", vec![MethodType::new(deliver, bool_())])
            .method("notify", vec![mt(vec![string()], Type::Nil)])
            .method("configure", vec![MethodType::new(Params::empty().with_rest_keywords(int()), Type::Nil)]),
        class("Stats").method("sum", vec![mt(vec![array(ty("Numeric"))], ty("Numeric"))]),
    ])
}

fn on_mailer(b: &AstBuilder, method: &str, args: Vec<Arg>) -> Node {
    b.call_args(Some(b.var("m")), method, args, None)
}

fn check_mailer(call: Node) -> gradual::CheckOutput {
    check(&mailer(), pin(call, "m", ty("Mailer")))
}

#[test]
fn accepted_call() {
    let b = AstBuilder::new();
    let call = on_mailer(&b, "deliver", vec![Arg::Positional(b.str("hi")), b.kwarg("to", b.str("a@b"))]);
    let call_id = call.id;
    let out = check_mailer(call);
    assert_kinds(&out, &[]);
    assert_eq!(type_of(&out, call_id), bool_());
}

#[test]
fn missing_positional_argument() {
    let b = AstBuilder::new();
    let call = on_mailer(&b, "deliver", vec![b.kwarg("to", b.str("a@b"))]);
    let call_id = call.id;
    let out = check_mailer(call);
    assert_kinds(&out, &["ExpectedArgumentMissing"]);
    assert_eq!(out.diagnostics[0].node, call_id);
    assert_eq!(out.diagnostics[0].kind, DiagnosticKind::ExpectedArgumentMissing { expected: 1, given: 0 });
    assert_eq!(type_of(&out, call_id), bool_());
}

#[test]
fn extra_positional_argument() {
    let b = AstBuilder::new();
    let extra = b.int(2);
    let extra_id = extra.id;
    let args = vec![
        Arg::Positional(b.str("hi")),
        Arg::Positional(b.int(1)),
        Arg::Positional(extra),
        b.kwarg("to", b.str("a@b")),
    ];
    let out = check_mailer(on_mailer(&b, "deliver", args));
    assert_kinds(&out, &["ExtraArgumentGiven"]);
    assert_eq!(out.diagnostics[0].node, extra_id);
    assert_eq!(out.diagnostics[0].kind, DiagnosticKind::ExtraArgumentGiven { max: 2, given: 3 });
}

#[test]
fn missing_keyword_argument() {
    let b = AstBuilder::new();
    let out = check_mailer(on_mailer(&b, "deliver", vec![Arg::Positional(b.str("hi"))]));
    assert_kinds(&out, &["ExpectedKeywordMissing"]);
    assert_eq!(out.diagnostics[0].kind, DiagnosticKind::ExpectedKeywordMissing { missing: vec!["to".into()] });
}

#[test]
fn keyword_splat_may_supply_required_keywords() {
    let b = AstBuilder::new();
    let args = vec![Arg::Positional(b.str("hi")), Arg::KwSplat(b.var("opts"))];
    let out = check_mailer(on_mailer(&b, "deliver", args));
    assert_kinds(&out, &[]);
}

#[test]
fn unexpected_keyword_argument() {
    let b = AstBuilder::new();
    let bcc = b.str("c@d");
    let bcc_id = bcc.id;
    let args = vec![Arg::Positional(b.str("hi")), b.kwarg("to", b.str("a@b")), b.kwarg("bcc", bcc)];
    let out = check_mailer(on_mailer(&b, "deliver", args));
    assert_kinds(&out, &["UnexpectedKeywordArgument"]);
    assert_eq!(out.diagnostics[0].node, bcc_id);
}

#[test]
fn keywords_to_a_method_without_keywords() {
    let b = AstBuilder::new();
    let args = vec![Arg::Positional(b.str("hi")), b.kwarg("urgent", b.true_())];
    let out = check_mailer(on_mailer(&b, "notify", args));
    assert_kinds(&out, &["UnexpectedKeywordArgument"]);

    let b = AstBuilder::new();
    let args = vec![Arg::Positional(b.str("hi")), Arg::KwSplat(b.var("opts"))];
    let out = check_mailer(on_mailer(&b, "notify", args));
    assert_kinds(&out, &["ExtraKeywordGiven"]);
}

#[test]
fn rest_keywords() {
    let b = AstBuilder::new();
    let args = vec![b.kwarg("retries", b.int(3)), b.kwarg("timeout", b.int(5))];
    let out = check_mailer(on_mailer(&b, "configure", args));
    assert_kinds(&out, &[]);

    let b = AstBuilder::new();
    let out = check_mailer(on_mailer(&b, "configure", vec![b.kwarg("retries", b.str("x"))]));
    assert_kinds(&out, &["ArgumentTypeMismatch"]);
    assert_eq!(
        out.diagnostics[0].kind.to_string(),
        "Cannot pass a value of type `\"x\"` as argument `retries:` of type `Integer`"
    );
}

#[test]
fn positional_argument_type_mismatch() {
    let b = AstBuilder::new();
    let arg = b.int(1);
    let arg_id = arg.id;
    let call = on_mailer(&b, "notify", vec![Arg::Positional(arg)]);
    let call_id = call.id;
    let out = check_mailer(call);

    assert_kinds(&out, &["ArgumentTypeMismatch"]);
    let diag = &out.diagnostics[0];
    assert_eq!(diag.node, arg_id);
    match &diag.kind {
        DiagnosticKind::ArgumentTypeMismatch { position, expected, actual, trail } => {
            assert_eq!(*position, ArgPosition::Positional(0));
            assert_eq!(*expected, string());
            assert_eq!(*actual, Type::int(1));
            assert!(!trail.is_empty());
        }
        other => panic!("unexpected diagnostic {other:?}"),
    }
    assert_eq!(type_of(&out, call_id), Type::Nil);
}

#[test]
fn arguments_are_checked_against_the_expected_parameter() {
    let b = AstBuilder::new();
    let list = b.array(vec![b.int(1), b.int(2)]);
    let list_id = list.id;
    let call = b.call(b.var("s"), "sum", vec![list]);
    let out = check(&mailer(), pin(call, "s", ty("Stats")));
    assert_kinds(&out, &[]);
    assert_eq!(type_of(&out, list_id), array(ty("Numeric")));
}

#[test]
fn overload_selection() {
    let b = AstBuilder::new();
    let int_plus = b.call(b.var("x"), "+", vec![b.int(1)]);
    let int_id = int_plus.id;
    let float_plus = b.call(b.var("x"), "+", vec![b.var("f")]);
    let float_id = float_plus.id;
    let root = pin(pin(b.begin(vec![int_plus, float_plus]), "x", int()), "f", ty("Float"));
    let out = check(&core(), root);

    assert_kinds(&out, &[]);
    assert_eq!(type_of(&out, int_id), int());
    assert_eq!(type_of(&out, float_id), ty("Float"));
}

#[test]
fn no_overload_matches() {
    let b = AstBuilder::new();
    let call = b.call(b.var("x"), "+", vec![b.str("a")]);
    let call_id = call.id;
    let out = check(&core(), pin(call, "x", int()));

    assert_kinds(&out, &["UnresolvedOverloading"]);
    match &out.diagnostics[0].kind {
        DiagnosticKind::UnresolvedOverloading { ty: recv_ty, method, candidates } => {
            assert_eq!(*recv_ty, int());
            assert_eq!(method, "+");
            let params: Vec<&[Type]> = candidates.iter().map(|c| c.params.required.as_slice()).collect();
            assert_eq!(params, vec![[ty("Integer")], [ty("Float")], [ty("Rational")], [ty("Complex")]]);
        }
        other => panic!("unexpected diagnostic {other:?}"),
    }
    assert_eq!(type_of(&out, call_id), Type::Any);
}

#[test]
fn missing_methods() {
    let b = AstBuilder::new();
    let call = b.call(b.int(1), "foo", vec![]);
    let call_id = call.id;
    let out = check(&core(), call);
    assert_kinds(&out, &["NoMethod"]);
    assert_eq!(out.diagnostics[0].kind.to_string(), "Type `1` does not have method `foo`");
    assert_eq!(type_of(&out, call_id), Type::Any);
}

#[test]
fn untyped_receivers_accept_anything() {
    let b = AstBuilder::new();
    let arg = b.int(1);
    let arg_id = arg.id;
    let call = b.call(b.var("anything"), "whatever", vec![arg]);
    let call_id = call.id;
    let out = check(&core(), call);
    assert_kinds(&out, &[]);
    assert_eq!(type_of(&out, call_id), Type::Any);
    assert_eq!(type_of(&out, arg_id), Type::int(1));
}

#[test]
fn untyped_members_are_ignored_for_lookup() {
    let b = AstBuilder::new();
    let call = b.call(b.var("x"), "zero?", vec![]);
    let call_id = call.id;
    let out = check(&core(), pin(call, "x", Type::union([int(), Type::Any])));
    assert_kinds(&out, &[]);
    assert_eq!(type_of(&out, call_id), bool_());
}

#[test]
fn union_receivers() {
    let b = AstBuilder::new();
    let call = b.call(b.var("x"), "to_s", vec![]);
    let call_id = call.id;
    let out = check(&core(), pin(call, "x", Type::union([int(), string()])));
    assert_kinds(&out, &[]);
    assert_eq!(type_of(&out, call_id), string());
}

#[test]
fn receiverless_calls_go_to_self() {
    let b = AstBuilder::new();
    let call = b.send("puts", vec![b.str("a"), b.int(1)]);
    let call_id = call.id;
    let out = check(&core(), call);
    assert_kinds(&out, &[]);
    assert_eq!(type_of(&out, call_id), Type::Nil);
}
