//! Shared fixtures: a small core library of declarations and helpers for
//! checking hand-built trees.
#![allow(dead_code)]

use gradual::ast::{Node, NodeId, Unit};
use gradual::config::CheckerConfig;
use gradual::typeck::types::{BlockType, MethodType, Params, Type, TypeParam};
use gradual::typeck::{DeclTable, TypeDecl};
use gradual::{CheckOutput, check_unit};

pub const OBJECT_CHAIN: &[&str] = &["Object", "Kernel", "BasicObject"];

pub fn ty(name: &str) -> Type {
    Type::named(name)
}

pub fn int() -> Type {
    ty("Integer")
}

pub fn string() -> Type {
    ty("String")
}

pub fn bool_() -> Type {
    Type::Bool
}

pub fn array(elem: Type) -> Type {
    Type::instance("Array", vec![elem])
}

/// `(params) -> ret`
pub fn mt(params: Vec<Type>, ret: Type) -> MethodType {
    MethodType::new(Params::positional(params), ret)
}

/// A class inheriting from `Object`.
pub fn class(name: &str) -> TypeDecl {
    TypeDecl::class(name).inherits(OBJECT_CHAIN)
}

/// A class inheriting from `parents` and then `Object`.
pub fn subclass(name: &str, parents: &[&str]) -> TypeDecl {
    TypeDecl::class(name).inherits(parents).inherits(OBJECT_CHAIN)
}

pub fn core() -> DeclTable {
    let x = TypeParam::new("X");
    let u = TypeParam::new("U");
    let elem = Type::var("Elem");

    let basic_object = TypeDecl::class("BasicObject")
        .method("initialize", vec![mt(vec![], Type::Void)])
        .method("!", vec![mt(vec![], bool_())])
        .method("==", vec![mt(vec![Type::Any], bool_())]);

    let kernel = TypeDecl::module("Kernel")
        .method("is_a?", vec![mt(vec![ty("Class")], bool_())])
        .method("kind_of?", vec![mt(vec![ty("Class")], bool_())])
        .method("instance_of?", vec![mt(vec![ty("Class")], bool_())])
        .method("nil?", vec![mt(vec![], bool_())])
        .method("===", vec![mt(vec![Type::Any], bool_())])
        .method("to_s", vec![mt(vec![], string())])
        .method("puts", vec![MethodType::new(Params::empty().with_rest(Type::Any), Type::Nil)])
        .method(
            "yield_self",
            vec![
                MethodType::new(Params::empty(), Type::var("X"))
                    .with_type_params(vec![x.clone()])
                    .with_block(BlockType::new(Params::positional(vec![Type::SelfType]), Type::var("X"))),
            ],
        )
        .method(
            "then",
            vec![
                MethodType::new(Params::empty(), Type::var("X"))
                    .with_type_params(vec![x])
                    .with_block(BlockType::new(Params::positional(vec![Type::SelfType]), Type::var("X"))),
            ],
        );

    let object = TypeDecl::class("Object").inherits(&["Kernel", "BasicObject"]);

    let numeric = class("Numeric").method("integer?", vec![mt(vec![], bool_())]);

    let integer = subclass("Integer", &["Numeric"])
        .method(
            "+",
            vec![
                mt(vec![int()], int()),
                mt(vec![ty("Float")], ty("Float")),
                mt(vec![ty("Rational")], ty("Rational")),
                mt(vec![ty("Complex")], ty("Complex")),
            ],
        )
        .method("-", vec![mt(vec![int()], int())])
        .method("*", vec![mt(vec![int()], int())])
        .method("<", vec![mt(vec![int()], bool_())])
        .method("zero?", vec![mt(vec![], bool_())])
        .method("nonzero?", vec![mt(vec![], Type::optional(int()))])
        .method("to_s", vec![mt(vec![], string())])
        .method(
            "times",
            vec![MethodType::new(Params::empty(), int()).with_block(BlockType::new(Params::positional(vec![int()]), Type::Void))],
        );

    let float = subclass("Float", &["Numeric"])
        .method("+", vec![mt(vec![ty("Float")], ty("Float"))])
        .method("floor", vec![mt(vec![], int())]);
    let rational = subclass("Rational", &["Numeric"]);
    let complex = subclass("Complex", &["Numeric"]);

    let string_decl = class("String")
        .method("+", vec![mt(vec![string()], string())])
        .method("*", vec![mt(vec![int()], string())])
        .method("size", vec![mt(vec![], int())])
        .method("length", vec![mt(vec![], int())])
        .method("upcase", vec![mt(vec![], string())])
        .method("to_s", vec![mt(vec![], string())])
        .method("to_sym", vec![mt(vec![], ty("Symbol"))])
        .method("start_with?", vec![mt(vec![string()], bool_())]);

    let symbol = class("Symbol")
        .method("to_s", vec![mt(vec![], string())])
        .method("to_sym", vec![mt(vec![], ty("Symbol"))]);

    let nil_class = class("NilClass").method("to_s", vec![mt(vec![], string())]);
    let true_class = class("TrueClass").method("&", vec![mt(vec![Type::Any], bool_())]);
    let false_class = class("FalseClass").method("&", vec![mt(vec![Type::Any], Type::Literal(gradual::typeck::types::Literal::False))]);

    let array_decl = TypeDecl::class("Array")
        .with_params(vec![TypeParam::new("Elem")])
        .inherits(OBJECT_CHAIN)
        .method("first", vec![mt(vec![], Type::optional(elem.clone()))])
        .method("[]", vec![mt(vec![int()], Type::optional(elem.clone()))])
        .method("<<", vec![mt(vec![elem.clone()], array(elem.clone()))])
        .method("include?", vec![mt(vec![elem.clone()], bool_())])
        .method("size", vec![mt(vec![], int())])
        .method("join", vec![MethodType::new(Params::empty().with_optional(string()), string())])
        .method(
            "each",
            vec![MethodType::new(Params::empty(), array(elem.clone()))
                .with_block(BlockType::new(Params::positional(vec![elem.clone()]), Type::Void))],
        )
        .method(
            "map",
            vec![MethodType::new(Params::empty(), array(Type::var("U")))
                .with_type_params(vec![u])
                .with_block(BlockType::new(Params::positional(vec![elem.clone()]), Type::var("U")))],
        )
        .method(
            "select",
            vec![MethodType::new(Params::empty(), array(elem.clone()))
                .with_block(BlockType::new(Params::positional(vec![elem.clone()]), bool_()))],
        )
        .method(
            "fetch",
            vec![
                mt(vec![int()], elem.clone()),
                mt(vec![int(), Type::var("D")], Type::union([elem.clone(), Type::var("D")]))
                    .with_type_params(vec![TypeParam::new("D")]),
            ],
        );

    let hash = TypeDecl::class("Hash")
        .with_params(vec![TypeParam::new("K"), TypeParam::new("V")])
        .inherits(OBJECT_CHAIN)
        .method("[]", vec![mt(vec![Type::var("K")], Type::optional(Type::var("V")))])
        .method("[]=", vec![mt(vec![Type::var("K"), Type::var("V")], Type::var("V"))])
        .method("fetch", vec![mt(vec![Type::var("K")], Type::var("V"))])
        .method("keys", vec![mt(vec![], array(Type::var("K")))]);

    let proc_decl = class("Proc")
        .method("call", vec![MethodType::new(Params::empty().with_rest(Type::Any), Type::Any)])
        .method("arity", vec![mt(vec![], int())]);

    let class_decl = subclass("Class", &["Module"]).method("name", vec![mt(vec![], string())]);
    let module = class("Module").method("name", vec![mt(vec![], string())]);

    DeclTable::from_decls([
        basic_object,
        kernel,
        object,
        numeric,
        integer,
        float,
        rational,
        complex,
        string_decl,
        symbol,
        nil_class,
        true_class,
        false_class,
        array_decl,
        hash,
        proc_decl,
        class_decl,
        module,
    ])
}

/// The core library plus `extra`.
pub fn core_with(extra: impl IntoIterator<Item = TypeDecl>) -> DeclTable {
    let mut decls = core();
    for decl in extra {
        decls.insert(decl);
    }
    decls
}

pub fn check(decls: &DeclTable, root: Node) -> CheckOutput {
    check_unit(decls, &Unit::new(root), CheckerConfig::default()).unwrap()
}

/// Diagnostic kind names in reporting order.
pub fn kinds(output: &CheckOutput) -> Vec<&'static str> {
    output.diagnostics.iter().map(|d| d.name()).collect()
}

pub fn assert_kinds(output: &CheckOutput, expected: &[&str]) {
    let actual = kinds(output);
    assert_eq!(actual, expected, "diagnostics: {:#?}", output.diagnostics);
}

pub fn type_of(output: &CheckOutput, node: NodeId) -> Type {
    output.type_of(node).cloned().unwrap_or_else(|| panic!("no type recorded for {node}"))
}
