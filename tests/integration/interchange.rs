//! Units and declarations read from JSON, and checker output written back.
use gradual::ast::{NodeId, Unit};
use gradual::config::CheckerConfig;
use gradual::typeck::decls::DeclKind;
use gradual::typeck::types::{Literal, Variance};
use gradual::typeck::{DeclTable, Type};
use gradual::{CheckOutput, check_unit};
use serde_json::json;

const DECLS: &str = r#"{
  "types": {
    "Integer": { "name": "Integer", "ancestors": [{ "name": "Integer" }] },
    "Counter": {
      "name": "Counter",
      "ancestors": [{ "name": "Counter" }],
      "methods": {
        "count": [{ "return_type": { "Instance": { "name": "Integer" } } }],
        "add": [{
          "params": { "required": [{ "Instance": { "name": "Integer" } }] },
          "return_type": "Self"
        }]
      }
    },
    "_Countable": {
      "name": "_Countable",
      "kind": "interface",
      "ancestors": [{ "name": "_Countable" }],
      "methods": {
        "count": [{ "return_type": { "Instance": { "name": "Integer" } } }]
      }
    },
    "Box": {
      "name": "Box",
      "type_params": [{ "name": "T", "variance": "covariant" }],
      "ancestors": [{ "name": "Box", "args": [{ "Var": { "name": "T" } }] }]
    }
  }
}"#;

/// `c.count` and `c.reset` under `@type var c: Counter`.
const UNIT: &str = r#"{
  "root": {
    "id": 0,
    "span": { "start": 0, "end": 20 },
    "kind": { "Begin": [
      {
        "id": 1,
        "span": { "start": 0, "end": 7 },
        "kind": { "Call": {
          "receiver": { "id": 2, "span": { "start": 0, "end": 1 }, "kind": { "LocalVar": "c" } },
          "method": "count"
        } }
      },
      {
        "id": 3,
        "span": { "start": 8, "end": 15 },
        "kind": { "Call": {
          "receiver": { "id": 4, "span": { "start": 8, "end": 9 }, "kind": { "LocalVar": "c" } },
          "method": "reset"
        } }
      }
    ] },
    "annotations": [
      { "VarType": { "name": "c", "ty": { "Instance": { "name": "Counter" } } } }
    ]
  }
}"#;

fn checked() -> CheckOutput {
    let decls = DeclTable::from_json(DECLS).unwrap();
    let unit = Unit::from_json(UNIT).unwrap();
    check_unit(&decls, &unit, CheckerConfig::default()).unwrap()
}

#[test]
fn declarations_from_json() {
    let decls = DeclTable::from_json(DECLS).unwrap();

    let counter = decls.get("Counter").unwrap();
    assert_eq!(counter.kind, DeclKind::Class);
    assert_eq!(counter.methods["add"][0].return_type, Type::SelfType);
    assert_eq!(counter.methods["add"][0].params.required, vec![Type::named("Integer")]);

    assert!(decls.get("_Countable").unwrap().is_interface());

    let boxed = decls.get("Box").unwrap();
    assert_eq!(boxed.type_params[0].variance, Variance::Covariant);
    assert_eq!(boxed.self_type(), Type::instance("Box", vec![Type::var("T")]));
}

#[test]
fn units_from_json_are_checked() {
    let out = checked();
    assert_eq!(out.type_of(NodeId(1)), Some(&Type::named("Integer")));
    assert_eq!(out.type_of(NodeId(3)), Some(&Type::Any));
    assert_eq!(out.diagnostics.len(), 1);
    assert_eq!(out.diagnostics[0].node, NodeId(3));
    assert_eq!(out.diagnostics[0].name(), "NoMethod");
}

#[test]
fn output_serializes_types_and_diagnostics() {
    let value = serde_json::to_value(checked()).unwrap();

    assert_eq!(value["node_types"]["1"], json!({ "Instance": { "name": "Integer", "args": [] } }));
    assert_eq!(value["node_types"]["3"], json!("Any"));
    assert_eq!(
        value["diagnostics"][0],
        json!({
            "node": 3,
            "span": { "start": 8, "end": 15 },
            "severity": "error",
            "kind": "NoMethod",
            "ty": { "Instance": { "name": "Counter", "args": [] } },
            "method": "reset",
        })
    );
}

#[test]
fn literal_and_proc_types_from_json() {
    let ty: Type = serde_json::from_str(r#"{ "Literal": { "Str": "a" } }"#).unwrap();
    assert_eq!(ty, Type::Literal(Literal::Str("a".into())));
    assert_eq!(ty.to_string(), "\"a\"");

    let ty: Type = serde_json::from_str(
        r#"{ "Proc": { "params": { "required": ["Nil"] }, "return_type": "Bool" } }"#,
    )
    .unwrap();
    assert_eq!(ty.to_string(), "^(nil) -> bool");
}

#[test]
fn malformed_json_is_rejected() {
    assert!(Unit::from_json(r#"{ "root": { "id": 0 } }"#).is_err());
    assert!(DeclTable::from_json(r#"{ "types": { "A": { "kind": "struct" } } }"#).is_err());
}
