//! Narrowing: what a condition being truthy or falsy says about locals, and
//! which branches it leaves reachable.

use crate::ast::{Arg, Node, NodeKind};
use crate::diagnostics::CheckError;

use super::construct::Construction;
use super::env::TypeEnv;
use super::types::{Literal, Type};

/// A checked condition with the environments for each outcome.
#[derive(Debug, Clone)]
pub struct Condition {
    pub ty: Type,
    pub truthy: TypeEnv,
    pub falsy: TypeEnv,
}

/// What a test splits a type into.
#[derive(Debug, Clone, PartialEq)]
pub struct Narrowing {
    pub truthy: Type,
    pub falsy: Type,
}

/// A `when` test against the remaining subject type. `tested` is what the
/// clause asks for, used for the subject when nothing matches.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseNarrowing {
    pub truthy: Type,
    pub falsy: Type,
    pub tested: Option<Type>,
}

const TYPE_TESTS: &[&str] = &["is_a?", "kind_of?", "instance_of?"];

impl<'a, 'd> Construction<'a, 'd> {
    /// Checks `node` as a condition.
    pub fn condition(&mut self, node: &Node, env: TypeEnv) -> Result<Condition, CheckError> {
        match &node.kind {
            NodeKind::And(..) | NodeKind::Or(..) | NodeKind::Not(_) => {
                let env = self.enter(node, env);
                let condition = self.logic(node, env)?;
                let ty = self.finish(node, condition.ty, &condition.truthy);
                Ok(Condition { ty, ..condition })
            }
            _ => {
                let (ty, env) = self.synthesize(node, env, None)?;
                Ok(self.narrow(node, ty, env))
            }
        }
    }

    /// `&&`, `||` and `!`, composed from their operands' conditions.
    pub(super) fn logic(&mut self, node: &Node, env: TypeEnv) -> Result<Condition, CheckError> {
        match &node.kind {
            NodeKind::And(left, right) => {
                let base = env.clone();
                let left = self.condition(left, env)?;
                let right_reachable = left.truthy.is_reachable();
                let right = self.condition(right, left.truthy)?;
                let mut types = vec![self.falsy_part(&left.ty)];
                if right_reachable {
                    types.push(right.ty);
                }
                Ok(Condition {
                    ty: Type::union(types),
                    truthy: right.truthy,
                    falsy: TypeEnv::join(&base, vec![left.falsy, right.falsy]),
                })
            }
            NodeKind::Or(left, right) => {
                let base = env.clone();
                let left = self.condition(left, env)?;
                let right_reachable = left.falsy.is_reachable();
                let right = self.condition(right, left.falsy)?;
                let mut types = vec![self.truthy_part(&left.ty)];
                if right_reachable {
                    types.push(right.ty);
                }
                Ok(Condition {
                    ty: Type::union(types),
                    truthy: TypeEnv::join(&base, vec![left.truthy, right.truthy]),
                    falsy: right.falsy,
                })
            }
            NodeKind::Not(inner) => {
                let inner = self.condition(inner, env)?;
                let ty = match (inner.truthy.is_reachable(), inner.falsy.is_reachable()) {
                    (false, true) => Type::Literal(Literal::True),
                    (true, false) => Type::Literal(Literal::False),
                    _ => Type::Bool,
                };
                Ok(Condition { ty, truthy: inner.falsy, falsy: inner.truthy })
            }
            _ => {
                let (ty, env) = self.synthesize(node, env, None)?;
                Ok(self.narrow(node, ty, env))
            }
        }
    }

    /// Splits `env` on the value of an already checked `node`.
    fn narrow(&mut self, node: &Node, ty: Type, env: TypeEnv) -> Condition {
        let mut truthy = env.clone();
        let mut falsy = env;
        let truthy_ty = self.truthy_part(&ty);
        let falsy_ty = self.falsy_part(&ty);
        if truthy_ty.is_bot() {
            truthy.mark_unreachable();
        }
        if falsy_ty.is_bot() {
            falsy.mark_unreachable();
        }

        match &node.kind {
            NodeKind::LocalVar(name) | NodeKind::LocalAssign { name, .. } => {
                truthy.set(name, truthy_ty);
                falsy.set(name, falsy_ty);
            }
            NodeKind::Call { receiver: Some(receiver), method, args, safe_nav, .. } => {
                self.narrow_call(receiver, method, args, *safe_nav, &mut truthy, &mut falsy);
            }
            _ => {}
        }
        Condition { ty, truthy, falsy }
    }

    fn narrow_call(
        &mut self,
        receiver: &Node,
        method: &str,
        args: &[Arg],
        safe_nav: bool,
        truthy: &mut TypeEnv,
        falsy: &mut TypeEnv,
    ) {
        let var = local_name(receiver);
        let Some(receiver_ty) = self.typing.type_of(receiver.id).cloned() else {
            return;
        };
        let receiver_ty = if safe_nav { self.non_nil(&receiver_ty) } else { receiver_ty };
        if safe_nav {
            if let Some(var) = var {
                truthy.set(var, receiver_ty.clone());
            }
        }

        match (method, args) {
            (m, [Arg::Positional(arg)]) if TYPE_TESTS.contains(&m) => {
                let Some(test) = self.tested_class(arg) else {
                    return;
                };
                let narrowing = self.type_test(&receiver_ty, &test, truthy);
                self.apply_narrowing(var, narrowing, test, !safe_nav, truthy, falsy);
            }
            ("nil?", []) if !safe_nav => {
                let narrowing = self.nil_test(&receiver_ty);
                self.apply_narrowing(var, narrowing, Type::Nil, true, truthy, falsy);
            }
            ("===", [Arg::Positional(arg)]) if !safe_nav => {
                let Some(test) = self.tested_class(receiver) else {
                    return;
                };
                let Some(arg_ty) = self.typing.type_of(arg.id).cloned() else {
                    return;
                };
                let narrowing = self.type_test(&arg_ty, &test, truthy);
                self.apply_narrowing(local_name(arg), narrowing, test, true, truthy, falsy);
            }
            _ => {}
        }
    }

    /// Marks the impossible outcome unreachable and rebinds the tested local.
    /// A local in a dead branch holds the tested type so the branch is still
    /// checked meaningfully.
    fn apply_narrowing(
        &mut self,
        var: Option<&str>,
        narrowing: Narrowing,
        tested: Type,
        narrow_falsy: bool,
        truthy: &mut TypeEnv,
        falsy: &mut TypeEnv,
    ) {
        if narrowing.truthy.is_bot() {
            truthy.mark_unreachable();
        }
        if narrow_falsy && narrowing.falsy.is_bot() {
            falsy.mark_unreachable();
        }
        let Some(var) = var else {
            return;
        };
        let bound = if narrowing.truthy.is_bot() { tested } else { narrowing.truthy };
        truthy.set(var, bound);
        if narrow_falsy {
            falsy.set(var, narrowing.falsy);
        }
    }

    /// The instance type a class-valued expression tests for.
    fn tested_class(&mut self, node: &Node) -> Option<Type> {
        match self.typing.type_of(node.id)? {
            Type::Singleton(name) => Some(self.instance_of(name)),
            _ => None,
        }
    }

    /// Instance type of `class` with unknown arguments.
    pub(super) fn instance_of(&self, class: &str) -> Type {
        let arity = self.checker.decls().get(class).map(|d| d.type_params.len()).unwrap_or(0);
        Type::instance(class, vec![Type::Any; arity])
    }

    /// `value.is_a?(C)`, member by member.
    pub fn type_test(&mut self, ty: &Type, test: &Type, env: &TypeEnv) -> Narrowing {
        let mut truthy = Vec::new();
        let mut falsy = Vec::new();
        for member in expand_bool(ty) {
            match &member {
                Type::Any => {
                    truthy.push(Type::Any);
                    falsy.push(Type::Any);
                }
                Type::Var(_) | Type::Top => {
                    truthy.push(test.clone());
                    falsy.push(member);
                }
                _ if self.checker.is_subtype(&member, test, &env.assumptions) => truthy.push(member),
                _ if self.checker.is_subtype(test, &member, &env.assumptions) => {
                    truthy.push(test.clone());
                    falsy.push(member);
                }
                _ => falsy.push(member),
            }
        }
        Narrowing { truthy: Type::union(truthy), falsy: Type::union(falsy) }
    }

    /// `when 1`, `when :sym`, `when nil` and friends.
    pub fn literal_test(&mut self, ty: &Type, literal: &Type, env: &TypeEnv) -> Narrowing {
        let mut truthy = Vec::new();
        let mut falsy = Vec::new();
        for member in expand_bool(ty) {
            if member == *literal || (member.is_nil() && literal.is_nil()) {
                truthy.push(literal.clone());
            } else if member.is_any() {
                truthy.push(Type::Any);
                falsy.push(Type::Any);
            } else if matches!(member, Type::Literal(_)) {
                falsy.push(member);
            } else if self.checker.is_subtype(literal, &member, &env.assumptions) {
                truthy.push(literal.clone());
                falsy.push(member);
            } else {
                falsy.push(member);
            }
        }
        Narrowing { truthy: Type::union(truthy), falsy: Type::union(falsy) }
    }

    /// `value.nil?`: the `nil` part against the rest.
    pub fn nil_test(&mut self, ty: &Type) -> Narrowing {
        let mut truthy = Vec::new();
        let mut falsy = Vec::new();
        for member in ty.members() {
            if member.is_nil() {
                truthy.push(member.clone());
            } else if self.admits(member, "NilClass") {
                truthy.push(Type::Nil);
                falsy.push(member.clone());
            } else {
                falsy.push(member.clone());
            }
        }
        Narrowing { truthy: Type::union(truthy), falsy: Type::union(falsy) }
    }

    /// Narrowing for one `when` test of a `case` with a subject.
    pub(super) fn case_test(&mut self, test: &Node, test_ty: &Type, remaining: &Type, env: &TypeEnv) -> CaseNarrowing {
        match (&test.kind, test_ty) {
            (_, Type::Singleton(name)) => {
                let tested = self.instance_of(name);
                let narrowing = self.type_test(remaining, &tested, env);
                CaseNarrowing { truthy: narrowing.truthy, falsy: narrowing.falsy, tested: Some(tested) }
            }
            (
                NodeKind::Nil
                | NodeKind::True
                | NodeKind::False
                | NodeKind::Int(_)
                | NodeKind::Str(_)
                | NodeKind::Sym(_),
                _,
            ) => {
                let narrowing = self.literal_test(remaining, test_ty, env);
                CaseNarrowing { truthy: narrowing.truthy, falsy: narrowing.falsy, tested: Some(test_ty.clone()) }
            }
            _ => CaseNarrowing { truthy: remaining.clone(), falsy: remaining.clone(), tested: None },
        }
    }

    /// The part of `ty` that can be truthy.
    pub fn truthy_part(&self, ty: &Type) -> Type {
        Type::union(expand_bool(ty).into_iter().filter(|m| !is_falsy_type(m)))
    }

    /// The part of `ty` that can be `nil` or `false`.
    pub fn falsy_part(&self, ty: &Type) -> Type {
        Type::union(expand_bool(ty).into_iter().filter(|m| {
            is_falsy_type(m)
                || matches!(m, Type::Any | Type::Top | Type::Void | Type::Var(_))
                || self.admits(m, "NilClass")
                || self.admits(m, "FalseClass")
        }))
    }

    fn non_nil(&self, ty: &Type) -> Type {
        Type::union(ty.members().iter().filter(|m| !m.is_nil()).cloned())
    }

    /// Whether values of class `class` may inhabit `member`: it is a
    /// variable, an interface, or one of the class's ancestors.
    fn admits(&self, member: &Type, class: &str) -> bool {
        let decls = self.checker.decls();
        match member {
            Type::Any | Type::Top | Type::Void | Type::Var(_) => true,
            Type::Instance { name, .. } => {
                decls.get(name).is_some_and(|d| d.is_interface())
                    || decls.get(class).is_some_and(|d| d.ancestors.find(name).is_some())
            }
            _ => false,
        }
    }
}

fn is_falsy_type(ty: &Type) -> bool {
    match ty {
        Type::Nil | Type::Literal(Literal::False) => true,
        Type::Instance { name, .. } => name == "NilClass" || name == "FalseClass",
        _ => false,
    }
}

/// Union members with `bool` split into `true | false`.
fn expand_bool(ty: &Type) -> Vec<Type> {
    let mut out = Vec::new();
    for member in ty.members() {
        match member {
            Type::Bool => {
                out.push(Type::Literal(Literal::True));
                out.push(Type::Literal(Literal::False));
            }
            other => out.push(other.clone()),
        }
    }
    out
}

fn local_name(node: &Node) -> Option<&str> {
    match &node.kind {
        NodeKind::LocalVar(name) => Some(name),
        _ => None,
    }
}
