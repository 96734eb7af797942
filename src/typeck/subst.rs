use std::collections::{BTreeMap, BTreeSet};

use super::types::{MethodType, Type, TypeParam};

/// A mapping from generic variable names to types, plus an optional
/// replacement for `self`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Substitution {
    map: BTreeMap<String, Type>,
    self_type: Option<Type>,
}

impl Substitution {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Pairs declared parameters with arguments position by position. Missing
    /// arguments map to `untyped`; surplus arguments are ignored.
    pub fn build(params: &[TypeParam], args: &[Type]) -> Self {
        let map = params
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.clone(), args.get(i).cloned().unwrap_or(Type::Any)))
            .collect();
        Self { map, self_type: None }
    }

    pub fn with_self(mut self, self_type: Type) -> Self {
        self.self_type = Some(self_type);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, ty: Type) {
        self.map.insert(name.into(), ty);
    }

    pub fn get(&self, name: &str) -> Option<&Type> {
        self.map.get(name)
    }

    pub fn self_type(&self) -> Option<&Type> {
        self.self_type.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty() && self.self_type.is_none()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }

    /// Ordered merge. With `overwrite`, entries of `other` win on conflicting
    /// keys; without it the receiver's entries are kept.
    pub fn merge(&self, other: &Substitution, overwrite: bool) -> Substitution {
        let mut merged = self.clone();
        for (name, ty) in &other.map {
            if overwrite || !merged.map.contains_key(name) {
                merged.map.insert(name.clone(), ty.clone());
            }
        }
        if overwrite || merged.self_type.is_none() {
            if let Some(self_type) = &other.self_type {
                merged.self_type = Some(self_type.clone());
            }
        }
        merged
    }

    /// The substitution without the given variables.
    pub fn except<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Substitution {
        let mut reduced = self.clone();
        for name in names {
            reduced.map.remove(name);
        }
        reduced
    }

    pub fn apply(&self, ty: &Type) -> Type {
        if self.is_empty() {
            return ty.clone();
        }
        match ty {
            Type::Var(var) => self.map.get(&var.name).cloned().unwrap_or_else(|| ty.clone()),
            Type::SelfType => self.self_type.clone().unwrap_or(Type::SelfType),
            Type::Proc(method_type) => Type::Proc(Box::new(self.apply_method(method_type))),
            other => other.map_inner_types(&mut |t| self.apply(t)),
        }
    }

    /// Applies to a method type. The method's own type parameters shadow
    /// same-named entries of this substitution.
    pub fn apply_method(&self, method_type: &MethodType) -> MethodType {
        if method_type.type_params.is_empty() {
            return method_type.map_types(&mut |t| self.apply(t));
        }
        let inner = self.except(method_type.type_params.iter().map(|p| p.name.as_str()));
        let mut applied = method_type.map_types(&mut |t| inner.apply(t));
        applied.type_params = method_type
            .type_params
            .iter()
            .map(|p| TypeParam {
                name: p.name.clone(),
                variance: p.variance,
                bound: p.bound.as_ref().map(|b| inner.apply(b)),
            })
            .collect();
        applied
    }
}

/// Generic variables occurring free in `ty`.
pub fn free_variables(ty: &Type) -> BTreeSet<String> {
    let mut vars = BTreeSet::new();
    collect_free(ty, &mut vars);
    vars
}

pub fn free_variables_in_method(method_type: &MethodType) -> BTreeSet<String> {
    let mut vars = BTreeSet::new();
    collect_free_method(method_type, &mut vars);
    vars
}

fn collect_free(ty: &Type, vars: &mut BTreeSet<String>) {
    match ty {
        Type::Var(var) => {
            vars.insert(var.name.clone());
        }
        Type::Instance { args, .. } => args.iter().for_each(|a| collect_free(a, vars)),
        Type::Union(ms) | Type::Intersection(ms) | Type::Tuple(ms) => {
            ms.iter().for_each(|m| collect_free(m, vars))
        }
        Type::Proc(method_type) => collect_free_method(method_type, vars),
        _ => {}
    }
}

fn collect_free_method(method_type: &MethodType, vars: &mut BTreeSet<String>) {
    let mut inner = BTreeSet::new();
    for ty in method_type.params.types() {
        collect_free(ty, &mut inner);
    }
    if let Some(block) = &method_type.block {
        block.params.types().for_each(|t| collect_free(t, &mut inner));
        collect_free(&block.return_type, &mut inner);
    }
    collect_free(&method_type.return_type, &mut inner);
    for param in &method_type.type_params {
        inner.remove(&param.name);
    }
    vars.extend(inner);
}
