//! Declaration tables supplied by the signature layer.
//!
//! Tables are assumed validated upstream (no duplicate declarations, no cyclic
//! ancestors). They are immutable during checking and may be shared read-only
//! between sessions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::{MethodType, Type, TypeParam};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclKind {
    #[default]
    Class,
    Module,
    /// Structural: any type whose shape provides the methods is a subtype.
    Interface,
}

/// One entry of an ancestor chain. `args` are written in terms of the
/// declaring type's own parameters; entries with equal `depth` are equally
/// specific.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ancestor {
    pub name: String,
    #[serde(default)]
    pub args: Vec<Type>,
    #[serde(default)]
    pub depth: u32,
}

impl Ancestor {
    pub fn new(name: impl Into<String>, args: Vec<Type>, depth: u32) -> Self {
        Self { name: name.into(), args, depth }
    }
}

/// Most-specific-first ancestors of a type, starting with the type itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AncestorChain(pub Vec<Ancestor>);

impl AncestorChain {
    pub fn find(&self, name: &str) -> Option<&Ancestor> {
        self.0.iter().find(|a| a.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ancestor> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Groups of equally specific ancestors, most specific group first.
    pub fn by_depth(&self) -> Vec<Vec<&Ancestor>> {
        let mut groups: BTreeMap<u32, Vec<&Ancestor>> = BTreeMap::new();
        for ancestor in &self.0 {
            groups.entry(ancestor.depth).or_default().push(ancestor);
        }
        groups.into_values().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDecl {
    pub name: String,
    #[serde(default)]
    pub kind: DeclKind,
    #[serde(default)]
    pub type_params: Vec<TypeParam>,
    #[serde(default)]
    pub ancestors: AncestorChain,
    /// Locally declared instance methods: name to overloads in declaration order.
    #[serde(default)]
    pub methods: BTreeMap<String, Vec<MethodType>>,
    #[serde(default)]
    pub singleton_methods: BTreeMap<String, Vec<MethodType>>,
}

impl TypeDecl {
    pub fn class(name: &str) -> Self {
        Self::with_kind(name, DeclKind::Class)
    }

    pub fn module(name: &str) -> Self {
        Self::with_kind(name, DeclKind::Module)
    }

    pub fn interface(name: &str) -> Self {
        Self::with_kind(name, DeclKind::Interface)
    }

    fn with_kind(name: &str, kind: DeclKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            type_params: Vec::new(),
            ancestors: AncestorChain(vec![Ancestor::new(name, Vec::new(), 0)]),
            methods: BTreeMap::new(),
            singleton_methods: BTreeMap::new(),
        }
    }

    /// Declares the type parameters; the chain's self entry is updated to
    /// refer to them.
    pub fn with_params(mut self, params: Vec<TypeParam>) -> Self {
        let self_args: Vec<Type> = params.iter().map(TypeParam::to_var).collect();
        if let Some(own) = self.ancestors.0.iter_mut().find(|a| a.name == self.name) {
            own.args = self_args;
        }
        self.type_params = params;
        self
    }

    /// Appends a less specific ancestor one level below the current deepest.
    pub fn ancestor(mut self, name: &str, args: Vec<Type>) -> Self {
        let depth = self.ancestors.0.last().map_or(0, |a| a.depth + 1);
        self.ancestors.0.push(Ancestor::new(name, args, depth));
        self
    }

    /// Appends an ancestor at an explicit depth (for mixins of equal specificity).
    pub fn ancestor_at(mut self, name: &str, args: Vec<Type>, depth: u32) -> Self {
        self.ancestors.0.push(Ancestor::new(name, args, depth));
        self
    }

    /// Appends non-generic ancestors in order.
    pub fn inherits(self, names: &[&str]) -> Self {
        names.iter().fold(self, |decl, name| decl.ancestor(name, Vec::new()))
    }

    pub fn method(mut self, name: &str, overloads: Vec<MethodType>) -> Self {
        let stamped = overloads
            .into_iter()
            .map(|mt| mt.declared_in(&self.name, name))
            .collect();
        self.methods.insert(name.to_string(), stamped);
        self
    }

    pub fn singleton_method(mut self, name: &str, overloads: Vec<MethodType>) -> Self {
        let stamped = overloads
            .into_iter()
            .map(|mt| mt.declared_in(&format!("singleton({})", self.name), name))
            .collect();
        self.singleton_methods.insert(name.to_string(), stamped);
        self
    }

    pub fn is_interface(&self) -> bool {
        self.kind == DeclKind::Interface
    }

    /// The instance type with the declared parameters as arguments.
    pub fn self_type(&self) -> Type {
        Type::instance(self.name.clone(), self.type_params.iter().map(TypeParam::to_var).collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeclTable {
    #[serde(default)]
    pub types: BTreeMap<String, TypeDecl>,
}

impl DeclTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_decls(decls: impl IntoIterator<Item = TypeDecl>) -> Self {
        let mut table = Self::new();
        for decl in decls {
            table.insert(decl);
        }
        table
    }

    pub fn insert(&mut self, decl: TypeDecl) {
        self.types.insert(decl.name.clone(), decl);
    }

    pub fn get(&self, name: &str) -> Option<&TypeDecl> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
