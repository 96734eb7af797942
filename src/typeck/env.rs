use std::collections::{BTreeMap, BTreeSet};

use super::subtyping::Assumptions;
use super::types::Type;

/// The body being checked, for `return`.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodContext {
    /// `None` inside a lambda.
    pub name: Option<String>,
    pub return_type: Type,
}

impl MethodContext {
    pub fn method(name: &str, return_type: Type) -> Self {
        Self { name: Some(name.to_string()), return_type }
    }

    pub fn lambda(return_type: Type) -> Self {
        Self { name: None, return_type }
    }

    /// `def x=(v)`; `==` and friends are not setters.
    pub fn is_setter(&self) -> bool {
        self.name.as_deref().is_some_and(is_setter_name)
    }
}

pub fn is_setter_name(name: &str) -> bool {
    name.len() > 1
        && name.ends_with('=')
        && !matches!(name, "==" | "!=" | "===" | "<=" | ">=" | "[]=")
        && name.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_')
}

/// Flow-sensitive typing environment.
///
/// Environments are values: a branch works on a fork and the results are
/// joined afterwards.
#[derive(Debug, Clone)]
pub struct TypeEnv {
    locals: BTreeMap<String, Type>,
    pinned: BTreeMap<String, Type>,
    pub self_type: Type,
    pub assumptions: Assumptions,
    pub method: Option<MethodContext>,
    reachable: bool,
}

impl TypeEnv {
    pub fn new(self_type: Type) -> Self {
        Self {
            locals: BTreeMap::new(),
            pinned: BTreeMap::new(),
            assumptions: Assumptions::new().with_self(self_type.clone()),
            self_type,
            method: None,
            reachable: true,
        }
    }

    /// A fresh scope for a method or class body: no locals, same declarations
    /// of generic variables.
    pub fn scope(&self, self_type: Type) -> Self {
        let mut env = Self::new(self_type.clone());
        env.assumptions = self.assumptions.clone().with_self(self_type);
        env
    }

    /// Current type of `name`: the narrowed type if any, else its declaration.
    pub fn get(&self, name: &str) -> Option<&Type> {
        self.locals.get(name).or_else(|| self.pinned.get(name))
    }

    pub fn pinned(&self, name: &str) -> Option<&Type> {
        self.pinned.get(name)
    }

    pub fn pin(&mut self, name: &str, ty: Type) {
        self.locals.insert(name.to_string(), ty.clone());
        self.pinned.insert(name.to_string(), ty);
    }

    /// Records what `name` is known to hold from here on.
    pub fn set(&mut self, name: &str, ty: Type) {
        self.locals.insert(name.to_string(), ty);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.locals.keys().chain(self.pinned.keys()).map(String::as_str)
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable
    }

    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    pub fn mark_unreachable(&mut self) {
        self.reachable = false;
    }

    /// Joins branch results. Unreachable branches do not contribute; a local
    /// missing from some reachable branch may be `nil` after the join.
    pub fn join(base: &TypeEnv, branches: Vec<TypeEnv>) -> TypeEnv {
        let reachable: Vec<TypeEnv> = branches.into_iter().filter(|e| e.reachable).collect();
        if reachable.is_empty() {
            return base.clone().unreachable();
        }

        let mut names: BTreeSet<&str> = BTreeSet::new();
        for env in &reachable {
            names.extend(env.locals.keys().map(String::as_str));
        }

        let mut joined = base.clone();
        joined.reachable = true;
        for name in names {
            let mut types = Vec::with_capacity(reachable.len());
            for env in &reachable {
                match env.get(name) {
                    Some(ty) => types.push(ty.clone()),
                    None => types.push(Type::Nil),
                }
            }
            joined.locals.insert(name.to_string(), Type::union(types));
        }
        joined
    }
}
