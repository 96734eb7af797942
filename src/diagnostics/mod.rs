use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ast::NodeId;
use crate::span::Span;
use crate::typeck::subtyping::Relation;
use crate::typeck::types::{MethodType, Type};

/// Conditions that abort checking a unit.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("Malformed syntax tree at node {node}: {reason}")]
    MalformedTree { node: NodeId, reason: String },

    #[error("Configuration error: {msg}")]
    Config { msg: String },
}

impl CheckError {
    pub fn malformed(node: NodeId, reason: impl Into<String>) -> Self {
        Self::MalformedTree { node, reason: reason.into() }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config { msg: msg.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Information,
    Hint,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Information => "information",
            Severity::Hint => "hint",
        };
        write!(f, "{s}")
    }
}

/// Where an argument sits in a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ArgPosition {
    Positional(usize),
    Keyword(String),
}

impl std::fmt::Display for ArgPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgPosition::Positional(i) => write!(f, "#{i}"),
            ArgPosition::Keyword(name) => write!(f, "`{name}:`"),
        }
    }
}

/// Every recoverable type error, with its structured payload.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind")]
pub enum DiagnosticKind {
    #[error("Cannot assign a value of type `{rhs}` to a variable of type `{lhs}`")]
    IncompatibleAssignment { lhs: Type, rhs: Type, trail: Vec<Relation> },

    #[error("Setter method `{method}` has body of type `{actual}`, expected `{expected}`")]
    SetterBodyTypeMismatch { method: String, expected: Type, actual: Type, trail: Vec<Relation> },

    #[error("Setter method `{method}` cannot return a value of type `{actual}`, expected `{expected}`")]
    SetterReturnTypeMismatch { method: String, expected: Type, actual: Type, trail: Vec<Relation> },

    #[error("Method `{method}` has body of type `{actual}`, expected `{expected}`")]
    MethodBodyTypeMismatch { method: String, expected: Type, actual: Type, trail: Vec<Relation> },

    #[error("Cannot return a value of type `{actual}`, expected `{expected}`")]
    ReturnTypeMismatch { expected: Type, actual: Type, trail: Vec<Relation> },

    #[error("Type `{ty}` does not have method `{method}`")]
    NoMethod { ty: Type, method: String },

    #[error("Cannot find compatible overloading of method `{method}` of type `{ty}`")]
    UnresolvedOverloading { ty: Type, method: String, candidates: Vec<MethodType> },

    #[error("Cannot pass a value of type `{actual}` as argument {position} of type `{expected}`")]
    ArgumentTypeMismatch { position: ArgPosition, expected: Type, actual: Type, trail: Vec<Relation> },

    #[error("Unexpected keyword argument `{name}`")]
    UnexpectedKeywordArgument { name: String },

    #[error("Expected keyword argument(s) missing: {}", .missing.join(", "))]
    ExpectedKeywordMissing { missing: Vec<String> },

    #[error("Keyword arguments given to a method that accepts none")]
    ExtraKeywordGiven,

    #[error("More positional arguments are required: expected {expected}, given {given}")]
    ExpectedArgumentMissing { expected: usize, given: usize },

    #[error("Too many positional arguments: {given} given, at most {max} accepted")]
    ExtraArgumentGiven { max: usize, given: usize },

    #[error("The branch is unreachable")]
    UnreachableBranch,

    #[error("The branch is unreachable because the condition is exhaustive; it evaluates to `{ty}`")]
    UnreachableValueBranch { ty: Type },

    #[error("Block has body of type `{actual}`, expected `{expected}`")]
    BlockBodyTypeMismatch { expected: Type, actual: Type, trail: Vec<Relation> },

    #[error("Method `{method}` does not accept a block")]
    UnexpectedBlockGiven { method: String },

    #[error("Method `{method}` requires a block")]
    RequiredBlockMissing { method: String },

    #[error("Assertion cannot hold: a value of type `{actual}` is never `{asserted}`")]
    FalseAssertion { asserted: Type, actual: Type },

    #[error("Cannot find the declaration of constant `{name}`")]
    UnknownConstant { name: String },

    #[error("Declaration of `{type_name}` is ill-formed: {reason}")]
    IllFormedDeclaration { type_name: String, reason: String },
}

impl DiagnosticKind {
    /// Every kind name, as used in configuration overrides.
    pub const NAMES: &'static [&'static str] = &[
        "IncompatibleAssignment",
        "SetterBodyTypeMismatch",
        "SetterReturnTypeMismatch",
        "MethodBodyTypeMismatch",
        "ReturnTypeMismatch",
        "NoMethod",
        "UnresolvedOverloading",
        "ArgumentTypeMismatch",
        "UnexpectedKeywordArgument",
        "ExpectedKeywordMissing",
        "ExtraKeywordGiven",
        "ExpectedArgumentMissing",
        "ExtraArgumentGiven",
        "UnreachableBranch",
        "UnreachableValueBranch",
        "BlockBodyTypeMismatch",
        "UnexpectedBlockGiven",
        "RequiredBlockMissing",
        "FalseAssertion",
        "UnknownConstant",
        "IllFormedDeclaration",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DiagnosticKind::IncompatibleAssignment { .. } => "IncompatibleAssignment",
            DiagnosticKind::SetterBodyTypeMismatch { .. } => "SetterBodyTypeMismatch",
            DiagnosticKind::SetterReturnTypeMismatch { .. } => "SetterReturnTypeMismatch",
            DiagnosticKind::MethodBodyTypeMismatch { .. } => "MethodBodyTypeMismatch",
            DiagnosticKind::ReturnTypeMismatch { .. } => "ReturnTypeMismatch",
            DiagnosticKind::NoMethod { .. } => "NoMethod",
            DiagnosticKind::UnresolvedOverloading { .. } => "UnresolvedOverloading",
            DiagnosticKind::ArgumentTypeMismatch { .. } => "ArgumentTypeMismatch",
            DiagnosticKind::UnexpectedKeywordArgument { .. } => "UnexpectedKeywordArgument",
            DiagnosticKind::ExpectedKeywordMissing { .. } => "ExpectedKeywordMissing",
            DiagnosticKind::ExtraKeywordGiven => "ExtraKeywordGiven",
            DiagnosticKind::ExpectedArgumentMissing { .. } => "ExpectedArgumentMissing",
            DiagnosticKind::ExtraArgumentGiven { .. } => "ExtraArgumentGiven",
            DiagnosticKind::UnreachableBranch => "UnreachableBranch",
            DiagnosticKind::UnreachableValueBranch { .. } => "UnreachableValueBranch",
            DiagnosticKind::BlockBodyTypeMismatch { .. } => "BlockBodyTypeMismatch",
            DiagnosticKind::UnexpectedBlockGiven { .. } => "UnexpectedBlockGiven",
            DiagnosticKind::RequiredBlockMissing { .. } => "RequiredBlockMissing",
            DiagnosticKind::FalseAssertion { .. } => "FalseAssertion",
            DiagnosticKind::UnknownConstant { .. } => "UnknownConstant",
            DiagnosticKind::IllFormedDeclaration { .. } => "IllFormedDeclaration",
        }
    }

    /// The derivation trail for kinds caused by a failed subtyping check.
    pub fn trail(&self) -> Option<&[Relation]> {
        match self {
            DiagnosticKind::IncompatibleAssignment { trail, .. }
            | DiagnosticKind::SetterBodyTypeMismatch { trail, .. }
            | DiagnosticKind::SetterReturnTypeMismatch { trail, .. }
            | DiagnosticKind::MethodBodyTypeMismatch { trail, .. }
            | DiagnosticKind::ReturnTypeMismatch { trail, .. }
            | DiagnosticKind::ArgumentTypeMismatch { trail, .. }
            | DiagnosticKind::BlockBodyTypeMismatch { trail, .. } => Some(trail),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub node: NodeId,
    pub span: Span,
    pub severity: Severity,
    #[serde(flatten)]
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    /// A diagnostic at `span`; severity is settled when the session finishes.
    pub fn new(node: NodeId, span: Span, kind: DiagnosticKind) -> Self {
        Self { node, span, severity: Severity::Error, kind }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}] {}: {}", self.severity, self.kind.name(), self.span, self.kind)
    }
}
