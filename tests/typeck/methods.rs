//! Generic methods, blocks, constructors and procs.
#[path = "../common/mod.rs"]
mod common;

use common::*;
use gradual::ast::{Annotation, AstBuilder, Node};
use gradual::diagnostics::{DiagnosticKind, Severity};
use gradual::typeck::{DeclTable, Type, TypeDecl};

fn pin(node: Node, name: &str, ty: Type) -> Node {
    node.with_annotation(Annotation::VarType { name: name.to_string(), ty })
}

fn with_point() -> DeclTable {
    core_with([
        class("Point").method("initialize", vec![mt(vec![int(), int()], Type::Void)]),
        TypeDecl::interface("_ToS").method("to_s", vec![mt(vec![], string())]),
    ])
}

#[test]
fn block_result_solves_the_method_variable() {
    let b = AstBuilder::new();
    let body = b.call(b.var("n"), "to_s", vec![]);
    let call = b.call_with_block(b.var("x"), "yield_self", vec![], b.block(&["n"], Some(body)));
    let call_id = call.id;
    let out = check(&core(), pin(call, "x", int()));
    assert_kinds(&out, &[]);
    assert_eq!(type_of(&out, call_id), string());
}

#[test]
fn block_parameters_come_from_the_receiver() {
    let b = AstBuilder::new();
    let param_read = b.var("s");
    let param_id = param_read.id;
    let body = b.call(param_read, "zero?", vec![]);
    let call = b.call_with_block(b.var("xs"), "map", vec![], b.block(&["s"], Some(body)));
    let call_id = call.id;
    let out = check(&core(), pin(call, "xs", array(int())));

    assert_kinds(&out, &[]);
    assert_eq!(type_of(&out, param_id), int());
    assert_eq!(type_of(&out, call_id), array(bool_()));
}

#[test]
fn void_blocks_accept_any_body() {
    let b = AstBuilder::new();
    let body = b.call(b.var("e"), "zero?", vec![]);
    let call = b.call_with_block(b.var("xs"), "each", vec![], b.block(&["e"], Some(body)));
    let call_id = call.id;
    let out = check(&core(), pin(call, "xs", array(int())));
    assert_kinds(&out, &[]);
    assert_eq!(type_of(&out, call_id), array(int()));
}

#[test]
fn block_body_mismatch() {
    let b = AstBuilder::new();
    let body = b.var("e");
    let body_id = body.id;
    let block = b.block(&["e"], Some(body));
    let block_span = block.span;
    let call = b.call_with_block(b.var("xs"), "select", vec![], block);
    let out = check(&core(), pin(call, "xs", array(int())));

    assert_kinds(&out, &["BlockBodyTypeMismatch"]);
    assert_eq!(out.diagnostics[0].node, body_id);
    assert_eq!(out.diagnostics[0].span, block_span);
    assert!(matches!(
        &out.diagnostics[0].kind,
        DiagnosticKind::BlockBodyTypeMismatch { expected, actual, .. } if *expected == bool_() && *actual == int()
    ));
}

#[test]
fn expected_type_steers_the_block() {
    let b = AstBuilder::new();
    let mapped = b.call_with_block(b.var("xs"), "map", vec![], b.block(&["e"], Some(b.var("e"))));
    let mapped_id = mapped.id;
    let root = pin(pin(b.assign("ys", mapped), "xs", array(int())), "ys", array(ty("Numeric")));
    let out = check(&core(), root);

    assert_kinds(&out, &[]);
    assert_eq!(type_of(&out, mapped_id), array(ty("Numeric")));
}

#[test]
fn required_block_missing() {
    let b = AstBuilder::new();
    let call = b.call(b.var("xs"), "map", vec![]);
    let call_id = call.id;
    let out = check(&core(), pin(call, "xs", array(int())));

    assert_kinds(&out, &["RequiredBlockMissing"]);
    assert_eq!(out.diagnostics[0].node, call_id);
    assert_eq!(type_of(&out, call_id), array(Type::Any));
}

#[test]
fn unexpected_block_is_still_checked() {
    let b = AstBuilder::new();
    let block = b.block(&[], Some(b.send("foo", vec![])));
    let call = b.call_with_block(b.var("x"), "zero?", vec![], block);
    let call_id = call.id;
    let out = check(&core(), pin(call, "x", int()));

    assert_kinds(&out, &["UnexpectedBlockGiven", "NoMethod"]);
    assert_eq!(out.diagnostics[0].severity, Severity::Warning);
    assert_eq!(type_of(&out, call_id), bool_());
}

#[test]
fn generic_parameter_bound_from_an_argument() {
    let b = AstBuilder::new();
    let call = b.call(b.var("xs"), "fetch", vec![b.int(0), b.str("none")]);
    let call_id = call.id;
    let out = check(&core(), pin(call, "xs", array(int())));
    assert_kinds(&out, &[]);
    assert_eq!(type_of(&out, call_id), Type::union([int(), string()]));
}

#[test]
fn first_matching_overload_wins() {
    let b = AstBuilder::new();
    let call = b.call(b.var("xs"), "fetch", vec![b.int(0)]);
    let call_id = call.id;
    let out = check(&core(), pin(call, "xs", array(string())));
    assert_kinds(&out, &[]);
    assert_eq!(type_of(&out, call_id), string());
}

#[test]
fn generic_receiver_arguments() {
    let b = AstBuilder::new();
    let good = b.call(b.var("xs"), "include?", vec![b.int(1)]);
    let bad = b.call(b.var("xs"), "include?", vec![b.str("a")]);
    let out = check(&core(), pin(b.begin(vec![good, bad]), "xs", array(int())));
    assert_kinds(&out, &["ArgumentTypeMismatch"]);
}

#[test]
fn constructors() {
    let b = AstBuilder::new();
    let good = b.call(b.constant("Point"), "new", vec![b.int(1), b.int(2)]);
    let good_id = good.id;
    let bad = b.call(b.constant("Point"), "new", vec![b.str("a"), b.int(2)]);
    let bad_id = bad.id;
    let out = check(&with_point(), b.begin(vec![good, bad]));

    assert_kinds(&out, &["ArgumentTypeMismatch"]);
    assert_eq!(type_of(&out, good_id), ty("Point"));
    assert_eq!(type_of(&out, bad_id), ty("Point"));
}

#[test]
fn generic_constructor_without_arguments() {
    let b = AstBuilder::new();
    let call = b.call(b.constant("Array"), "new", vec![]);
    let call_id = call.id;
    let out = check(&core(), call);
    assert_kinds(&out, &[]);
    assert_eq!(type_of(&out, call_id), array(Type::Any));
}

#[test]
fn class_methods_come_from_class() {
    let b = AstBuilder::new();
    let call = b.call(b.constant("Point"), "name", vec![]);
    let call_id = call.id;
    let out = check(&with_point(), call);
    assert_eq!(type_of(&out, call_id), string());
}

#[test]
fn interface_receivers() {
    let b = AstBuilder::new();
    let call = b.call(b.var("x"), "to_s", vec![]);
    let call_id = call.id;
    let out = check(&with_point(), pin(call, "x", ty("_ToS")));
    assert_kinds(&out, &[]);
    assert_eq!(type_of(&out, call_id), string());

    let b = AstBuilder::new();
    let root = pin(b.call(b.var("x"), "upcase", vec![]), "x", ty("_ToS"));
    let out = check(&with_point(), root);
    assert_kinds(&out, &["NoMethod"]);
}

#[test]
fn passing_values_to_interface_parameters() {
    let decls = core_with([
        TypeDecl::interface("_ToS").method("to_s", vec![mt(vec![], string())]),
        class("Printer").method("print", vec![mt(vec![ty("_ToS")], Type::Nil)]),
        TypeDecl::class("Blob").inherits(&["BasicObject"]),
    ]);
    let b = AstBuilder::new();
    let ok = b.call(b.var("p"), "print", vec![b.int(1)]);
    let bad = b.call(b.var("p"), "print", vec![b.var("q")]);
    let root = pin(pin(b.begin(vec![ok, bad]), "p", ty("Printer")), "q", ty("Blob"));
    let out = check(&decls, root);
    assert_kinds(&out, &["ArgumentTypeMismatch"]);
}

#[test]
fn procs_are_callable() {
    let proc_type = Type::proc(mt(vec![int()], string()));
    let b = AstBuilder::new();
    let good = b.call(b.var("f"), "call", vec![b.int(1)]);
    let good_id = good.id;
    let bad = b.call(b.var("f"), "call", vec![b.str("a")]);
    let out = check(&core(), pin(b.begin(vec![good, bad]), "f", proc_type));

    assert_kinds(&out, &["ArgumentTypeMismatch"]);
    assert_eq!(type_of(&out, good_id), string());
}

#[test]
fn safe_navigation_wraps_the_result() {
    let b = AstBuilder::new();
    let call = b.safe_call(b.var("x"), "first", vec![]);
    let call_id = call.id;
    let out = check(&core(), pin(call, "x", Type::optional(array(int()))));
    assert_kinds(&out, &[]);
    assert_eq!(type_of(&out, call_id), Type::optional(int()));
}

#[test]
fn safe_navigation_on_nil_is_nil() {
    let b = AstBuilder::new();
    let call = b.safe_call(b.nil(), "to_s", vec![]);
    let call_id = call.id;
    let out = check(&core(), call);
    assert_kinds(&out, &[]);
    assert_eq!(type_of(&out, call_id), Type::Nil);

    let b = AstBuilder::new();
    let call = b.safe_call(b.var("x"), "center", vec![b.call(b.int(1), "bar", vec![])]);
    let call_id = call.id;
    let out = check(&core(), pin(call, "x", Type::Nil));
    assert_kinds(&out, &["NoMethod"]);
    assert_eq!(type_of(&out, call_id), Type::Nil);
}
