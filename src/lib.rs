pub mod ast;
pub mod config;
pub mod diagnostics;
pub mod span;
pub mod typeck;

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use tracing::debug;

use ast::{Node, NodeId, Unit};
use config::CheckerConfig;
use diagnostics::{CheckError, Diagnostic};
use typeck::{Construction, DeclTable, Subtyping, Type, TypeEnv, Typing};

/// Node types and settled diagnostics of one checked unit.
#[derive(Debug, Clone, Serialize)]
pub struct CheckOutput {
    pub node_types: BTreeMap<NodeId, Type>,
    pub diagnostics: Vec<Diagnostic>,
}

impl CheckOutput {
    pub fn type_of(&self, node: NodeId) -> Option<&Type> {
        self.node_types.get(&node)
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == diagnostics::Severity::Error)
    }
}

/// The checking context of one unit. Shapes and subtyping results are
/// cached while the unit is checked and dropped with the session, so every
/// unit starts from a cold cache and sees its own declaration reports.
pub struct Session<'d> {
    checker: Subtyping<'d>,
    config: CheckerConfig,
}

impl<'d> Session<'d> {
    pub fn new(decls: &'d DeclTable, config: CheckerConfig) -> Result<Self, CheckError> {
        config.validate()?;
        Ok(Self { checker: Subtyping::new(decls), config })
    }

    /// Types every node of `unit`, consuming the session. Fails only on a
    /// malformed tree; type errors are returned as diagnostics.
    pub fn check(mut self, unit: &Unit) -> Result<CheckOutput, CheckError> {
        validate_tree(&unit.root)?;
        let decls = self.checker.decls();
        let top_self = if decls.contains("Object") { Type::named("Object") } else { Type::Any };
        debug!(root = %unit.root.id, "checking unit");

        let mut typing = Typing::new();
        let mut construction = Construction::new(&mut self.checker, &mut typing);
        construction.synthesize(&unit.root, TypeEnv::new(top_self), None)?;

        let (node_types, diagnostics) = typing.into_parts();
        let diagnostics = self.config.apply(diagnostics);
        debug!(
            nodes = node_types.len(),
            diagnostics = diagnostics.len(),
            memo = self.checker.memo_len(),
            "unit checked"
        );
        Ok(CheckOutput { node_types, diagnostics })
    }
}

/// Check a single unit in a fresh session.
pub fn check_unit(decls: &DeclTable, unit: &Unit, config: CheckerConfig) -> Result<CheckOutput, CheckError> {
    Session::new(decls, config)?.check(unit)
}

/// Node ids must be unique within a unit.
fn validate_tree(root: &Node) -> Result<(), CheckError> {
    let mut seen = HashSet::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if !seen.insert(node.id) {
            return Err(CheckError::malformed(node.id, "duplicate node id"));
        }
        node.for_each_child(|child| stack.push(child));
    }
    Ok(())
}
