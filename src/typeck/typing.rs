use std::collections::BTreeMap;

use serde::Serialize;

use crate::ast::NodeId;
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::span::Span;

use super::types::Type;

/// The result of checking one unit: a type per node and the diagnostics in
/// the order they were found.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Typing {
    node_types: BTreeMap<NodeId, Type>,
    diagnostics: Vec<Diagnostic>,
}

impl Typing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, node: NodeId, ty: Type) {
        self.node_types.insert(node, ty);
    }

    pub fn type_of(&self, node: NodeId) -> Option<&Type> {
        self.node_types.get(&node)
    }

    pub fn node_types(&self) -> &BTreeMap<NodeId, Type> {
        &self.node_types
    }

    pub fn report(&mut self, node: NodeId, span: Span, kind: DiagnosticKind) {
        self.diagnostics.push(Diagnostic::new(node, span, kind));
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_parts(self) -> (BTreeMap<NodeId, Type>, Vec<Diagnostic>) {
        (self.node_types, self.diagnostics)
    }
}
