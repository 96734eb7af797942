use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Variance of a generic parameter position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variance {
    Covariant,
    Contravariant,
    #[default]
    Invariant,
}

/// A declared generic parameter: `[out T < Comparable]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeParam {
    pub name: String,
    #[serde(default)]
    pub variance: Variance,
    #[serde(default)]
    pub bound: Option<Type>,
}

impl TypeParam {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), variance: Variance::Invariant, bound: None }
    }

    pub fn covariant(name: impl Into<String>) -> Self {
        Self { name: name.into(), variance: Variance::Covariant, bound: None }
    }

    pub fn contravariant(name: impl Into<String>) -> Self {
        Self { name: name.into(), variance: Variance::Contravariant, bound: None }
    }

    pub fn with_bound(mut self, bound: Type) -> Self {
        self.bound = Some(bound);
        self
    }

    pub fn to_var(&self) -> Type {
        Type::Var(TypeVar {
            name: self.name.clone(),
            bound: self.bound.clone().map(Box::new),
            variance: self.variance,
        })
    }
}

/// An occurrence of a generic variable.
///
/// Identity is the name alone: the bound and variance ride along for display and
/// for bodies checked against an abstract parameter, but two occurrences of `T`
/// are the same variable regardless of what each copy carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeVar {
    pub name: String,
    #[serde(default)]
    pub bound: Option<Box<Type>>,
    #[serde(default)]
    pub variance: Variance,
}

impl PartialEq for TypeVar {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for TypeVar {}

impl Hash for TypeVar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Literal {
    Int(i64),
    Str(String),
    Sym(String),
    True,
    False,
}

impl Literal {
    /// The nominal type whose methods a literal exposes.
    pub fn back_type(&self) -> Type {
        match self {
            Literal::Int(_) => Type::named("Integer"),
            Literal::Str(_) => Type::named("String"),
            Literal::Sym(_) => Type::named("Symbol"),
            Literal::True => Type::named("TrueClass"),
            Literal::False => Type::named("FalseClass"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// The untyped escape hatch: compatible with everything in both directions.
    Any,
    Top,
    Bot,
    Void,
    Nil,
    Bool,
    Literal(Literal),
    Instance {
        name: String,
        #[serde(default)]
        args: Vec<Type>,
    },
    /// The class object of a nominal type.
    Singleton(String),
    Union(Vec<Type>),
    Intersection(Vec<Type>),
    Tuple(Vec<Type>),
    #[serde(rename = "Self")]
    SelfType,
    Var(TypeVar),
    Proc(Box<MethodType>),
}

impl Type {
    pub fn named(name: impl Into<String>) -> Type {
        Type::Instance { name: name.into(), args: Vec::new() }
    }

    pub fn instance(name: impl Into<String>, args: Vec<Type>) -> Type {
        Type::Instance { name: name.into(), args }
    }

    pub fn var(name: impl Into<String>) -> Type {
        Type::Var(TypeVar { name: name.into(), bound: None, variance: Variance::Invariant })
    }

    pub fn int(value: i64) -> Type {
        Type::Literal(Literal::Int(value))
    }

    pub fn sym(value: impl Into<String>) -> Type {
        Type::Literal(Literal::Sym(value.into()))
    }

    pub fn str(value: impl Into<String>) -> Type {
        Type::Literal(Literal::Str(value.into()))
    }

    pub fn proc(method_type: MethodType) -> Type {
        Type::Proc(Box::new(method_type))
    }

    /// `T | nil`
    pub fn optional(ty: Type) -> Type {
        Type::union([ty, Type::Nil])
    }

    /// Builds a normalized union: nested unions are flattened, `bot` members
    /// vanish and duplicates are dropped, keeping the first occurrence's position.
    pub fn union(members: impl IntoIterator<Item = Type>) -> Type {
        let mut flat = Vec::new();
        for member in members {
            push_flat(&mut flat, member, true);
        }
        collapse(flat, Type::Bot, Type::Union)
    }

    /// Builds a normalized intersection; `top` is the unit.
    pub fn intersection(members: impl IntoIterator<Item = Type>) -> Type {
        let mut flat = Vec::new();
        for member in members {
            push_flat(&mut flat, member, false);
        }
        collapse(flat, Type::Top, Type::Intersection)
    }

    /// Union members, or the type itself for anything that is not a union.
    pub fn members(&self) -> &[Type] {
        match self {
            Type::Union(members) => members,
            other => std::slice::from_ref(other),
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Type::Any)
    }

    pub fn is_bot(&self) -> bool {
        matches!(self, Type::Bot)
    }

    pub fn is_nil(&self) -> bool {
        match self {
            Type::Nil => true,
            Type::Instance { name, .. } => name == "NilClass",
            _ => false,
        }
    }

    pub fn contains_nil(&self) -> bool {
        self.members().iter().any(|m| m.is_nil())
    }

    /// The structural stand-in for types whose methods come from a nominal type.
    pub fn back_type(&self) -> Option<Type> {
        match self {
            Type::Literal(lit) => Some(lit.back_type()),
            Type::Nil => Some(Type::named("NilClass")),
            Type::Bool => Some(Type::union([Type::Literal(Literal::True), Type::Literal(Literal::False)])),
            Type::Tuple(elems) => Some(Type::instance("Array", vec![Type::union(elems.iter().cloned())])),
            _ => None,
        }
    }

    /// Replaces literal types by their nominal type (`1` becomes `Integer`,
    /// `true | false` becomes `bool`).
    pub fn widen(&self) -> Type {
        match self {
            Type::Literal(Literal::True) | Type::Literal(Literal::False) => Type::Bool,
            Type::Literal(lit) => lit.back_type(),
            Type::Union(members) => {
                let has_true = members.contains(&Type::Literal(Literal::True));
                let has_false = members.contains(&Type::Literal(Literal::False));
                Type::union(members.iter().map(|m| {
                    if has_true && has_false && matches!(m, Type::Literal(Literal::True | Literal::False)) {
                        Type::Bool
                    } else {
                        m.widen()
                    }
                }))
            }
            Type::Tuple(elems) => Type::Tuple(elems.iter().map(Type::widen).collect()),
            other => other.clone(),
        }
    }

    /// Recursively transform all inner types via `f`, rebuilding the structure.
    /// Unions and intersections are re-normalized afterwards.
    pub fn map_inner_types(&self, f: &mut impl FnMut(&Type) -> Type) -> Type {
        match self {
            Type::Instance { name, args } => Type::Instance {
                name: name.clone(),
                args: args.iter().map(|a| f(a)).collect(),
            },
            Type::Union(members) => Type::union(members.iter().map(|m| f(m)).collect::<Vec<_>>()),
            Type::Intersection(members) => {
                Type::intersection(members.iter().map(|m| f(m)).collect::<Vec<_>>())
            }
            Type::Tuple(elems) => Type::Tuple(elems.iter().map(|e| f(e)).collect()),
            Type::Proc(method_type) => Type::Proc(Box::new(method_type.map_types(f))),
            // Leaf types
            _ => self.clone(),
        }
    }

    /// Returns true if any inner type (recursively) satisfies the predicate,
    /// including `self`.
    pub fn any_type(&self, pred: &impl Fn(&Type) -> bool) -> bool {
        if pred(self) {
            return true;
        }
        match self {
            Type::Instance { args, .. } => args.iter().any(|a| a.any_type(pred)),
            Type::Union(ms) | Type::Intersection(ms) | Type::Tuple(ms) => ms.iter().any(|m| m.any_type(pred)),
            Type::Proc(mt) => mt.any_type(pred),
            _ => false,
        }
    }
}

fn push_flat(out: &mut Vec<Type>, ty: Type, union: bool) {
    match ty {
        Type::Union(members) if union => {
            for member in members {
                push_flat(out, member, union);
            }
        }
        Type::Intersection(members) if !union => {
            for member in members {
                push_flat(out, member, union);
            }
        }
        Type::Bot if union => {}
        Type::Top if !union => {}
        other => {
            if !out.contains(&other) {
                out.push(other);
            }
        }
    }
}

fn collapse(mut flat: Vec<Type>, unit: Type, build: fn(Vec<Type>) -> Type) -> Type {
    match flat.len() {
        0 => unit,
        1 => flat.pop().unwrap_or(unit),
        _ => build(flat),
    }
}

/// Where a method type was declared, for merged-diagnostic traceability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodDecl {
    pub type_name: String,
    pub method_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Params {
    #[serde(default)]
    pub required: Vec<Type>,
    #[serde(default)]
    pub optional: Vec<Type>,
    #[serde(default)]
    pub rest: Option<Type>,
    #[serde(default)]
    pub required_keywords: BTreeMap<String, Type>,
    #[serde(default)]
    pub optional_keywords: BTreeMap<String, Type>,
    #[serde(default)]
    pub rest_keywords: Option<Type>,
}

impl Params {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn positional(required: Vec<Type>) -> Self {
        Self { required, ..Self::default() }
    }

    pub fn with_optional(mut self, ty: Type) -> Self {
        self.optional.push(ty);
        self
    }

    pub fn with_rest(mut self, ty: Type) -> Self {
        self.rest = Some(ty);
        self
    }

    pub fn with_keyword(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.required_keywords.insert(name.into(), ty);
        self
    }

    pub fn with_optional_keyword(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.optional_keywords.insert(name.into(), ty);
        self
    }

    pub fn with_rest_keywords(mut self, ty: Type) -> Self {
        self.rest_keywords = Some(ty);
        self
    }

    pub fn has_keywords(&self) -> bool {
        !self.required_keywords.is_empty()
            || !self.optional_keywords.is_empty()
            || self.rest_keywords.is_some()
    }

    /// Type accepted at positional index `index`, if any.
    pub fn positional_at(&self, index: usize) -> Option<&Type> {
        if index < self.required.len() {
            return self.required.get(index);
        }
        self.optional
            .get(index - self.required.len())
            .or(self.rest.as_ref())
    }

    /// Type accepted for keyword `name`, if any.
    pub fn keyword(&self, name: &str) -> Option<&Type> {
        self.required_keywords
            .get(name)
            .or_else(|| self.optional_keywords.get(name))
            .or(self.rest_keywords.as_ref())
    }

    /// Same required/optional/rest/keyword structure, ignoring the types.
    pub fn same_shape(&self, other: &Params) -> bool {
        self.required.len() == other.required.len()
            && self.optional.len() == other.optional.len()
            && self.rest.is_some() == other.rest.is_some()
            && self.required_keywords.keys().eq(other.required_keywords.keys())
            && self.optional_keywords.keys().eq(other.optional_keywords.keys())
            && self.rest_keywords.is_some() == other.rest_keywords.is_some()
    }

    pub fn map_types(&self, f: &mut impl FnMut(&Type) -> Type) -> Params {
        Params {
            required: self.required.iter().map(|t| f(t)).collect(),
            optional: self.optional.iter().map(|t| f(t)).collect(),
            rest: self.rest.as_ref().map(|t| f(t)),
            required_keywords: self.required_keywords.iter().map(|(k, t)| (k.clone(), f(t))).collect(),
            optional_keywords: self.optional_keywords.iter().map(|(k, t)| (k.clone(), f(t))).collect(),
            rest_keywords: self.rest_keywords.as_ref().map(|t| f(t)),
        }
    }

    pub fn types(&self) -> impl Iterator<Item = &Type> {
        self.required
            .iter()
            .chain(self.optional.iter())
            .chain(self.rest.iter())
            .chain(self.required_keywords.values())
            .chain(self.optional_keywords.values())
            .chain(self.rest_keywords.iter())
    }
}

/// The block a method accepts: `{ (Elem) -> bool }` or `?{ ... }` when optional.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockType {
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub params: Params,
    pub return_type: Type,
}

fn default_true() -> bool {
    true
}

impl BlockType {
    pub fn new(params: Params, return_type: Type) -> Self {
        Self { required: true, params, return_type }
    }

    pub fn optional(params: Params, return_type: Type) -> Self {
        Self { required: false, params, return_type }
    }

    pub fn to_proc(&self) -> Type {
        Type::proc(MethodType::new(self.params.clone(), self.return_type.clone()))
    }
}

/// A method signature; also the type of procs and lambdas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodType {
    #[serde(default)]
    pub type_params: Vec<TypeParam>,
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub block: Option<BlockType>,
    pub return_type: Type,
    #[serde(default)]
    pub decls: BTreeSet<MethodDecl>,
}

// Provenance is not part of a signature's identity.
impl PartialEq for MethodType {
    fn eq(&self, other: &Self) -> bool {
        self.type_params == other.type_params
            && self.params == other.params
            && self.block == other.block
            && self.return_type == other.return_type
    }
}

impl Eq for MethodType {}

impl Hash for MethodType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_params.hash(state);
        self.params.hash(state);
        self.block.hash(state);
        self.return_type.hash(state);
    }
}

impl MethodType {
    pub fn new(params: Params, return_type: Type) -> Self {
        Self {
            type_params: Vec::new(),
            params,
            block: None,
            return_type,
            decls: BTreeSet::new(),
        }
    }

    pub fn with_type_params(mut self, type_params: Vec<TypeParam>) -> Self {
        self.type_params = type_params;
        self
    }

    pub fn with_block(mut self, block: BlockType) -> Self {
        self.block = Some(block);
        self
    }

    pub fn declared_in(mut self, type_name: &str, method_name: &str) -> Self {
        self.decls.insert(MethodDecl {
            type_name: type_name.to_string(),
            method_name: method_name.to_string(),
        });
        self
    }

    pub fn map_types(&self, f: &mut impl FnMut(&Type) -> Type) -> MethodType {
        MethodType {
            type_params: self.type_params.clone(),
            params: self.params.map_types(f),
            block: self.block.as_ref().map(|b| BlockType {
                required: b.required,
                params: b.params.map_types(f),
                return_type: f(&b.return_type),
            }),
            return_type: f(&self.return_type),
            decls: self.decls.clone(),
        }
    }

    pub fn any_type(&self, pred: &impl Fn(&Type) -> bool) -> bool {
        self.params.types().any(|t| t.any_type(pred))
            || self.block.as_ref().is_some_and(|b| {
                b.params.types().any(|t| t.any_type(pred)) || b.return_type.any_type(pred)
            })
            || self.return_type.any_type(pred)
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Int(n) => write!(f, "{n}"),
            Literal::Str(s) => write!(f, "{s:?}"),
            Literal::Sym(s) => write!(f, ":{s}"),
            Literal::True => write!(f, "true"),
            Literal::False => write!(f, "false"),
        }
    }
}

fn write_joined(f: &mut std::fmt::Formatter<'_>, items: &[Type], sep: &str) -> std::fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, "{sep}")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Any => write!(f, "untyped"),
            Type::Top => write!(f, "top"),
            Type::Bot => write!(f, "bot"),
            Type::Void => write!(f, "void"),
            Type::Nil => write!(f, "nil"),
            Type::Bool => write!(f, "bool"),
            Type::Literal(lit) => write!(f, "{lit}"),
            Type::Instance { name, args } => {
                write!(f, "{name}")?;
                if !args.is_empty() {
                    write!(f, "[")?;
                    write_joined(f, args, ", ")?;
                    write!(f, "]")?;
                }
                Ok(())
            }
            Type::Singleton(name) => write!(f, "singleton({name})"),
            Type::Union(members) => {
                write!(f, "(")?;
                write_joined(f, members, " | ")?;
                write!(f, ")")
            }
            Type::Intersection(members) => {
                write!(f, "(")?;
                write_joined(f, members, " & ")?;
                write!(f, ")")
            }
            Type::Tuple(elems) => {
                write!(f, "[")?;
                write_joined(f, elems, ", ")?;
                write!(f, "]")
            }
            Type::SelfType => write!(f, "self"),
            Type::Var(var) => write!(f, "{}", var.name),
            Type::Proc(mt) => write!(f, "^{mt}"),
        }
    }
}

impl std::fmt::Display for Params {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        parts.extend(self.required.iter().map(|t| t.to_string()));
        parts.extend(self.optional.iter().map(|t| format!("?{t}")));
        if let Some(rest) = &self.rest {
            parts.push(format!("*{rest}"));
        }
        parts.extend(self.required_keywords.iter().map(|(k, t)| format!("{k}: {t}")));
        parts.extend(self.optional_keywords.iter().map(|(k, t)| format!("?{k}: {t}")));
        if let Some(rest) = &self.rest_keywords {
            parts.push(format!("**{rest}"));
        }
        write!(f, "({})", parts.join(", "))
    }
}

impl std::fmt::Display for MethodType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.type_params.is_empty() {
            let names: Vec<&str> = self.type_params.iter().map(|p| p.name.as_str()).collect();
            write!(f, "[{}] ", names.join(", "))?;
        }
        write!(f, "{}", self.params)?;
        if let Some(block) = &self.block {
            let opt = if block.required { "" } else { "?" };
            write!(f, " {opt}{{ {} -> {} }}", block.params, block.return_type)?;
        }
        write!(f, " -> {}", self.return_type)
    }
}
