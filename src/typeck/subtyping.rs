//! The `<:` relation.
//!
//! Judgments are memoized per session. A judgment re-entered while it is still
//! being decided is assumed to hold, which bounds recursion through recursive
//! structural types.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use tracing::trace;

use super::decls::DeclTable;
use super::shape::ShapeBuilder;
use super::subst::Substitution;
use super::types::{BlockType, Literal, MethodType, Params, Type, Variance};

/// Bounds of the generic variables in scope, plus what `self` stands for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Assumptions {
    pub self_type: Option<Type>,
    pub bounds: BTreeMap<String, Type>,
}

impl Assumptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_self(mut self, self_type: Type) -> Self {
        self.self_type = Some(self_type);
        self
    }

    /// Adds a variable; an unbounded variable is only known to be below `top`.
    pub fn with_var(mut self, name: impl Into<String>, bound: Option<Type>) -> Self {
        self.bounds.insert(name.into(), bound.unwrap_or(Type::Top));
        self
    }

    fn bound_of(&self, name: &str) -> Option<&Type> {
        self.bounds.get(name)
    }
}

/// One judgment attempted while deciding a relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Relation {
    Type { sub: Type, sup: Type },
    Method { name: String, sub: MethodType, sup: MethodType },
    /// `ty` must expose `name`.
    HasMethod { ty: Type, name: String },
}

impl Relation {
    pub fn types(sub: &Type, sup: &Type) -> Self {
        Relation::Type { sub: sub.clone(), sup: sup.clone() }
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Relation::Type { sub, sup } => write!(f, "{sub} <: {sup}"),
            Relation::Method { name, sub, sup } => write!(f, "#{name}: {sub} <: {sup}"),
            Relation::HasMethod { ty, name } => write!(f, "{ty} has #{name}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Rule {
    Reflexive,
    Any,
    UnionLeft,
    UnionRight { index: usize },
    IntersectionLeft { index: usize },
    IntersectionRight,
    Bot,
    Top,
    SelfType,
    Var,
    Literal,
    Bool,
    Tuple,
    Singleton,
    Nominal,
    Structural,
    Proc,
    Method,
    Memo,
    Cutoff,
}

/// How a relation was established.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Derivation {
    pub relation: Relation,
    pub rule: Rule,
    pub premises: Vec<Derivation>,
}

impl Derivation {
    fn leaf(relation: Relation, rule: Rule) -> Self {
        Self { relation, rule, premises: Vec::new() }
    }
}

/// Judgments from the root relation down to the first one that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub trail: Vec<Relation>,
}

impl Failure {
    fn at(relation: Relation) -> Self {
        Self { trail: vec![relation] }
    }

    fn within(relation: Relation, inner: Failure) -> Self {
        let mut trail = Vec::with_capacity(inner.trail.len() + 1);
        trail.push(relation);
        trail.extend(inner.trail);
        Self { trail }
    }

    /// The innermost failed judgment.
    pub fn leaf(&self) -> Option<&Relation> {
        self.trail.last()
    }
}

pub type Outcome = Result<Derivation, Failure>;

type Key = (Type, Type, Assumptions);

/// Session-scoped subtyping with its memo table and visiting set.
pub struct Subtyping<'d> {
    pub builder: ShapeBuilder<'d>,
    memo: HashMap<Key, Option<Failure>>,
    visiting: HashSet<Key>,
    memo_hits: usize,
    cutoffs: usize,
}

impl<'d> Subtyping<'d> {
    pub fn new(decls: &'d DeclTable) -> Self {
        Self::with_builder(ShapeBuilder::new(decls))
    }

    pub fn with_builder(builder: ShapeBuilder<'d>) -> Self {
        Self {
            builder,
            memo: HashMap::new(),
            visiting: HashSet::new(),
            memo_hits: 0,
            cutoffs: 0,
        }
    }

    pub fn decls(&self) -> &'d DeclTable {
        self.builder.decls()
    }

    pub fn is_subtype(&mut self, sub: &Type, sup: &Type, assumptions: &Assumptions) -> bool {
        self.check(sub, sup, assumptions).is_ok()
    }

    pub fn memo_len(&self) -> usize {
        self.memo.len()
    }

    pub fn memo_hits(&self) -> usize {
        self.memo_hits
    }

    pub fn cutoffs(&self) -> usize {
        self.cutoffs
    }

    /// Decides `sub <: sup`.
    pub fn check(&mut self, sub: &Type, sup: &Type, assumptions: &Assumptions) -> Outcome {
        let relation = Relation::types(sub, sup);

        if sub == sup {
            return Ok(Derivation::leaf(relation, Rule::Reflexive));
        }
        if sub.is_any() || sup.is_any() {
            return Ok(Derivation::leaf(relation, Rule::Any));
        }

        if let Type::Union(members) = sub {
            let mut premises = Vec::with_capacity(members.len());
            for member in members {
                match self.check(member, sup, assumptions) {
                    Ok(d) => premises.push(d),
                    Err(f) => return Err(Failure::within(relation, f)),
                }
            }
            return Ok(Derivation { relation, rule: Rule::UnionLeft, premises });
        }

        if let Type::Union(members) = sup {
            let mut first_failure = None;
            for (index, member) in members.iter().enumerate() {
                match self.check(sub, member, assumptions) {
                    Ok(d) => {
                        return Ok(Derivation { relation, rule: Rule::UnionRight { index }, premises: vec![d] });
                    }
                    Err(f) => {
                        first_failure.get_or_insert(f);
                    }
                }
            }
            return Err(match first_failure {
                Some(f) => Failure::within(relation, f),
                None => Failure::at(relation),
            });
        }

        let key: Key = (sub.clone(), sup.clone(), assumptions.clone());
        if let Some(cached) = self.memo.get(&key) {
            self.memo_hits += 1;
            trace!(%sub, %sup, "subtyping memo hit");
            return match cached {
                None => Ok(Derivation::leaf(relation, Rule::Memo)),
                Some(failure) => Err(failure.clone()),
            };
        }
        if self.visiting.contains(&key) {
            self.cutoffs += 1;
            trace!(%sub, %sup, "co-inductive cutoff");
            return Ok(Derivation::leaf(relation, Rule::Cutoff));
        }

        self.visiting.insert(key.clone());
        let outcome = self.check_core(relation, sub, sup, assumptions);
        self.visiting.remove(&key);
        self.memo.insert(key, outcome.as_ref().err().cloned());
        outcome
    }

    fn check_core(&mut self, relation: Relation, sub: &Type, sup: &Type, a: &Assumptions) -> Outcome {
        match (sub, sup) {
            (Type::Bot, _) => Ok(Derivation::leaf(relation, Rule::Bot)),
            (_, Type::Top) | (_, Type::Void) => Ok(Derivation::leaf(relation, Rule::Top)),

            (Type::SelfType, _) if a.self_type.is_some() => {
                let self_type = a.self_type.clone().unwrap_or(Type::SelfType);
                self.premise(relation, Rule::SelfType, &self_type, sup, a)
            }
            (_, Type::SelfType) if a.self_type.is_some() => {
                let self_type = a.self_type.clone().unwrap_or(Type::SelfType);
                self.premise(relation, Rule::SelfType, sub, &self_type, a)
            }

            (Type::Intersection(members), _) => {
                let mut first_failure = None;
                for (index, member) in members.iter().enumerate() {
                    match self.check(member, sup, a) {
                        Ok(d) => {
                            return Ok(Derivation {
                                relation,
                                rule: Rule::IntersectionLeft { index },
                                premises: vec![d],
                            });
                        }
                        Err(f) => {
                            first_failure.get_or_insert(f);
                        }
                    }
                }
                Err(match first_failure {
                    Some(f) => Failure::within(relation, f),
                    None => Failure::at(relation),
                })
            }
            (_, Type::Intersection(members)) => {
                let mut premises = Vec::with_capacity(members.len());
                for member in members {
                    match self.check(sub, member, a) {
                        Ok(d) => premises.push(d),
                        Err(f) => return Err(Failure::within(relation, f)),
                    }
                }
                Ok(Derivation { relation, rule: Rule::IntersectionRight, premises })
            }

            (Type::Var(var), _) => {
                let bound = a
                    .bound_of(&var.name)
                    .cloned()
                    .or_else(|| var.bound.as_deref().cloned());
                match bound {
                    Some(bound) if bound != Type::Top => self.premise(relation, Rule::Var, &bound, sup, a),
                    _ => Err(Failure::at(relation)),
                }
            }

            (Type::Literal(Literal::True | Literal::False), Type::Bool) => Ok(Derivation::leaf(relation, Rule::Bool)),
            (Type::Literal(_), Type::Literal(_)) => Err(Failure::at(relation)),
            (Type::Literal(lit), _) => self.premise(relation, Rule::Literal, &lit.back_type(), sup, a),

            (Type::Nil, Type::Instance { name, .. }) if name == "NilClass" => {
                Ok(Derivation::leaf(relation, Rule::Literal))
            }
            (Type::Instance { name, .. }, Type::Nil) if name == "NilClass" => {
                Ok(Derivation::leaf(relation, Rule::Literal))
            }
            (Type::Nil, _) => self.premise(relation, Rule::Literal, &Type::named("NilClass"), sup, a),

            (Type::Bool, _) => {
                let mut premises = Vec::with_capacity(2);
                for lit in [Literal::True, Literal::False] {
                    match self.check(&Type::Literal(lit), sup, a) {
                        Ok(d) => premises.push(d),
                        Err(f) => return Err(Failure::within(relation, f)),
                    }
                }
                Ok(Derivation { relation, rule: Rule::Bool, premises })
            }

            (Type::Tuple(left), Type::Tuple(right)) => {
                if left.len() != right.len() {
                    return Err(Failure::at(relation));
                }
                let mut premises = Vec::with_capacity(left.len());
                for (l, r) in left.iter().zip(right) {
                    match self.check(l, r, a) {
                        Ok(d) => premises.push(d),
                        Err(f) => return Err(Failure::within(relation, f)),
                    }
                }
                Ok(Derivation { relation, rule: Rule::Tuple, premises })
            }
            (Type::Tuple(elems), Type::Instance { name, args }) if name == "Array" && args.len() == 1 => {
                let mut premises = Vec::with_capacity(elems.len());
                for elem in elems {
                    match self.check(elem, &args[0], a) {
                        Ok(d) => premises.push(d),
                        Err(f) => return Err(Failure::within(relation, f)),
                    }
                }
                Ok(Derivation { relation, rule: Rule::Tuple, premises })
            }
            (Type::Tuple(_), _) => match sub.back_type() {
                Some(back) => self.premise(relation, Rule::Tuple, &back, sup, a),
                None => Err(Failure::at(relation)),
            },

            (Type::Singleton(c), Type::Singleton(d)) => {
                let in_chain = self
                    .decls()
                    .get(c)
                    .is_some_and(|decl| decl.ancestors.find(d).is_some());
                if in_chain {
                    Ok(Derivation::leaf(relation, Rule::Singleton))
                } else {
                    Err(Failure::at(relation))
                }
            }
            (Type::Singleton(_), Type::Instance { name, .. }) => {
                if self.is_interface(name) {
                    return self.structural(relation, sub, sup, a);
                }
                if self.decls().contains("Class") {
                    self.premise(relation, Rule::Singleton, &Type::named("Class"), sup, a)
                } else {
                    Err(Failure::at(relation))
                }
            }

            (Type::Proc(m1), Type::Proc(m2)) => match self.check_method("call", m1, m2, a) {
                Ok(d) => Ok(Derivation { relation, rule: Rule::Proc, premises: vec![d] }),
                Err(f) => Err(Failure::within(relation, f)),
            },
            (Type::Proc(_), Type::Instance { name, .. }) => {
                if self.is_interface(name) {
                    self.structural(relation, sub, sup, a)
                } else {
                    self.premise(relation, Rule::Proc, &Type::named("Proc"), sup, a)
                }
            }

            (Type::Instance { name: c, args: c_args }, Type::Instance { name: d, args: d_args }) => {
                match self.nominal(c, c_args, d, d_args, a) {
                    Some(Ok(premises)) => Ok(Derivation { relation, rule: Rule::Nominal, premises }),
                    Some(Err(f)) => Err(Failure::within(relation, f)),
                    None if self.is_interface(d) => self.structural(relation, sub, sup, a),
                    None => Err(Failure::at(relation)),
                }
            }

            _ => Err(Failure::at(relation)),
        }
    }

    fn premise(&mut self, relation: Relation, rule: Rule, sub: &Type, sup: &Type, a: &Assumptions) -> Outcome {
        match self.check(sub, sup, a) {
            Ok(d) => Ok(Derivation { relation, rule, premises: vec![d] }),
            Err(f) => Err(Failure::within(relation, f)),
        }
    }

    fn is_interface(&self, name: &str) -> bool {
        self.decls().get(name).is_some_and(|d| d.is_interface())
    }

    /// `None` when `d` is not an ancestor of `c`.
    fn nominal(
        &mut self,
        c: &str,
        c_args: &[Type],
        d: &str,
        d_args: &[Type],
        a: &Assumptions,
    ) -> Option<Result<Vec<Derivation>, Failure>> {
        let decls = self.decls();
        let c_decl = decls.get(c)?;
        let ancestor = c_decl.ancestors.find(d)?;
        let Some(d_decl) = decls.get(d) else {
            return Some(Err(Failure::at(Relation::types(&Type::named(c), &Type::named(d)))));
        };

        let subst = Substitution::build(&c_decl.type_params, c_args);
        let mut premises = Vec::new();
        for (i, param) in d_decl.type_params.iter().enumerate() {
            let actual = ancestor.args.get(i).map(|t| subst.apply(t)).unwrap_or(Type::Any);
            let expected = d_args.get(i).cloned().unwrap_or(Type::Any);
            let checks = match param.variance {
                Variance::Covariant => vec![(&actual, &expected)],
                Variance::Contravariant => vec![(&expected, &actual)],
                Variance::Invariant => vec![(&actual, &expected), (&expected, &actual)],
            };
            for (l, r) in checks {
                match self.check(l, r, a) {
                    Ok(d) => premises.push(d),
                    Err(f) => return Some(Err(f)),
                }
            }
        }
        Some(Ok(premises))
    }

    /// Every method of `sup`'s shape must be provided by `sub` with a
    /// compatible signature. Each overload of `sup` needs at least one
    /// overload of `sub` below it.
    fn structural(&mut self, relation: Relation, sub: &Type, sup: &Type, a: &Assumptions) -> Outcome {
        let names = self.builder.method_names(sup);
        let mut premises = Vec::new();
        for name in names {
            let Some(sup_entry) = self.builder.method(sup, &name) else { continue };
            let Some(sub_entry) = self.builder.method(sub, &name) else {
                return Err(Failure::within(
                    relation,
                    Failure::at(Relation::HasMethod { ty: sub.clone(), name }),
                ));
            };
            for sup_method in &sup_entry.method_types {
                let mut first_failure = None;
                let mut found = None;
                for sub_method in &sub_entry.method_types {
                    match self.check_method(&name, sub_method, sup_method, a) {
                        Ok(d) => {
                            found = Some(d);
                            break;
                        }
                        Err(f) => {
                            first_failure.get_or_insert(f);
                        }
                    }
                }
                match (found, first_failure) {
                    (Some(d), _) => premises.push(d),
                    (None, Some(f)) => return Err(Failure::within(relation, f)),
                    (None, None) => {
                        return Err(Failure::within(
                            relation,
                            Failure::at(Relation::HasMethod { ty: sub.clone(), name }),
                        ));
                    }
                }
            }
        }
        Ok(Derivation { relation, rule: Rule::Structural, premises })
    }

    /// `sub` can stand in for `sup`: parameters contravariant, return
    /// covariant, block return covariant and block parameters contravariant.
    pub fn check_method(&mut self, name: &str, sub: &MethodType, sup: &MethodType, a: &Assumptions) -> Outcome {
        let relation = Relation::Method { name: name.to_string(), sub: sub.clone(), sup: sup.clone() };

        let mut assumptions = a.clone();
        for param in &sup.type_params {
            assumptions = assumptions.with_var(param.name.clone(), param.bound.clone());
        }
        let sub = if sub.type_params.is_empty() {
            sub.clone()
        } else {
            let mut rename = Substitution::empty();
            let same_arity = sub.type_params.len() == sup.type_params.len();
            for (i, param) in sub.type_params.iter().enumerate() {
                let target = match sup.type_params.get(i) {
                    Some(p) if same_arity => p.to_var(),
                    _ => Type::Any,
                };
                rename.insert(param.name.clone(), target);
            }
            let mut renamed = sub.map_types(&mut |t| rename.apply(t));
            renamed.type_params.clear();
            renamed
        };

        let mut premises = Vec::new();
        let mut pairs: Vec<(Type, Type)> = Vec::new();
        if !params_pairs(&sub.params, &sup.params, &mut pairs) {
            return Err(Failure::at(relation));
        }
        match (&sub.block, &sup.block) {
            (None, _) => {}
            (Some(sb), None) => {
                if sb.required {
                    return Err(Failure::at(relation));
                }
            }
            (Some(sb), Some(tb)) => {
                if sb.required && !tb.required {
                    return Err(Failure::at(relation));
                }
                if !block_pairs(sb, tb, &mut pairs) {
                    return Err(Failure::at(relation));
                }
            }
        }
        pairs.push((sub.return_type.clone(), sup.return_type.clone()));

        for (l, r) in &pairs {
            match self.check(l, r, &assumptions) {
                Ok(d) => premises.push(d),
                Err(f) => return Err(Failure::within(relation, f)),
            }
        }
        Ok(Derivation { relation, rule: Rule::Method, premises })
    }
}

/// Collects the `(sub, sup)` pairs that must hold for a method accepting `sub`
/// parameters to be usable where `sup` parameters are promised. Returns false
/// when the arities are incompatible.
fn params_pairs(sub: &Params, sup: &Params, pairs: &mut Vec<(Type, Type)>) -> bool {
    if sub.required.len() > sup.required.len() {
        return false;
    }
    let sup_positional = sup.required.len() + sup.optional.len();
    for i in 0..sup_positional {
        let Some(sup_ty) = sup.positional_at(i) else { return false };
        let Some(sub_ty) = sub.positional_at(i) else { return false };
        pairs.push((sup_ty.clone(), sub_ty.clone()));
    }
    if let Some(sup_rest) = &sup.rest {
        let Some(sub_rest) = &sub.rest else { return false };
        pairs.push((sup_rest.clone(), sub_rest.clone()));
    }

    for name in sub.required_keywords.keys() {
        if !sup.required_keywords.contains_key(name) {
            return false;
        }
    }
    for (name, sup_ty) in sup.required_keywords.iter().chain(&sup.optional_keywords) {
        let Some(sub_ty) = sub.keyword(name) else { return false };
        pairs.push((sup_ty.clone(), sub_ty.clone()));
    }
    if let Some(sup_rest) = &sup.rest_keywords {
        let Some(sub_rest) = &sub.rest_keywords else { return false };
        pairs.push((sup_rest.clone(), sub_rest.clone()));
    }
    true
}

fn block_pairs(sub: &BlockType, sup: &BlockType, pairs: &mut Vec<(Type, Type)>) -> bool {
    if !params_pairs(&sub.params, &sup.params, pairs) {
        return false;
    }
    pairs.push((sub.return_type.clone(), sup.return_type.clone()));
    true
}
