//! Method calls: receiver lookup through shapes, overload selection, argument
//! and block checking, and instantiation of generic methods.

use std::collections::{BTreeMap, BTreeSet};

use tracing::trace;

use crate::ast::{Arg, CallBlock, Node, NodeKind};
use crate::diagnostics::{ArgPosition, CheckError, DiagnosticKind};

use super::construct::Construction;
use super::env::TypeEnv;
use super::shape::Entry;
use super::subst::{Substitution, free_variables};
use super::types::{MethodType, Params, Type};

/// A checked argument.
struct ArgValue<'n> {
    node: &'n Node,
    keyword: Option<&'n str>,
    splat: bool,
    ty: Type,
}

/// Why an overload does not accept a call. `at` is the offending argument,
/// or `None` for the call itself.
struct ArgError<'n> {
    at: Option<&'n Node>,
    kind: DiagnosticKind,
}

impl<'n> ArgError<'n> {
    fn call(kind: DiagnosticKind) -> Self {
        Self { at: None, kind }
    }

    fn at(node: &'n Node, kind: DiagnosticKind) -> Self {
        Self { at: Some(node), kind }
    }
}

/// An overload that accepts the arguments, with the type variables solved so far.
struct Matched {
    method_type: MethodType,
    bindings: BTreeMap<String, Type>,
}

impl<'a, 'd> Construction<'a, 'd> {
    pub(super) fn synthesize_call(
        &mut self,
        node: &Node,
        env: TypeEnv,
        hint: Option<&Type>,
    ) -> Result<(Type, TypeEnv), CheckError> {
        let NodeKind::Call { receiver, method, args, block, safe_nav } = &node.kind else {
            return Err(CheckError::malformed(node.id, "expected a method call"));
        };

        let (receiver_ty, env) = match receiver {
            Some(receiver) => self.synthesize(receiver, env, None)?,
            None => (env.self_type.clone(), env),
        };
        let mut lookup = if *safe_nav {
            Type::union(receiver_ty.members().iter().filter(|m| !m.is_nil()).cloned())
        } else {
            receiver_ty.clone()
        };
        if let Type::Union(members) = &lookup {
            if members.iter().any(Type::is_any) {
                lookup = Type::union(members.iter().filter(|m| !m.is_any()).cloned());
            }
        }

        if lookup.is_any() || lookup.is_bot() {
            let env = self.untyped_call(args, block.as_ref(), env)?;
            let ty = match (lookup.is_bot(), *safe_nav) {
                (true, false) => Type::Bot,
                // `nil&.m` never calls anything.
                (true, true) if receiver_ty.contains_nil() => Type::Nil,
                _ => Type::Any,
            };
            return Ok((ty, env));
        }

        let Some(entry) = self.checker.builder.method(&lookup, method) else {
            self.report(node, DiagnosticKind::NoMethod { ty: lookup, method: method.clone() });
            let env = self.untyped_call(args, block.as_ref(), env)?;
            return Ok((Type::Any, env));
        };
        trace!(receiver = %lookup, method = method.as_str(), overloads = entry.method_types.len(), "resolving call");

        let (ty, env) = self.apply_entry(node, &lookup, method, entry, args, block.as_ref(), env, hint)?;
        let ty = if *safe_nav && receiver_ty.contains_nil() { Type::optional(ty) } else { ty };
        Ok((ty, env))
    }

    /// Checks arguments and block of a call whose method type is unknown.
    fn untyped_call(&mut self, args: &[Arg], block: Option<&CallBlock>, env: TypeEnv) -> Result<TypeEnv, CheckError> {
        let mut env = env;
        for arg in args {
            env = self.synthesize(arg.value(), env, None)?.1;
        }
        if let Some(block) = block {
            self.check_block(block, &Params::empty(), None, &env)?;
        }
        Ok(env)
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_entry(
        &mut self,
        node: &Node,
        receiver: &Type,
        method: &str,
        entry: Entry,
        args: &[Arg],
        block: Option<&CallBlock>,
        env: TypeEnv,
        hint: Option<&Type>,
    ) -> Result<(Type, TypeEnv), CheckError> {
        let only = match entry.method_types.as_slice() {
            [only] => Some(erase_type_params(only)),
            _ => None,
        };

        let mut env = env;
        let mut values = Vec::with_capacity(args.len());
        let mut position = 0;
        for arg in args {
            let (keyword, splat, arg_hint) = match arg {
                Arg::Positional(_) => {
                    let h = only.as_ref().and_then(|m| m.params.positional_at(position).cloned());
                    position += 1;
                    (None, false, h)
                }
                Arg::Keyword { name, .. } => {
                    (Some(name.as_str()), false, only.as_ref().and_then(|m| m.params.keyword(name).cloned()))
                }
                Arg::KwSplat(_) => (None, true, None),
            };
            let (ty, e) = self.synthesize(arg.value(), env, arg_hint.as_ref())?;
            env = e;
            values.push(ArgValue { node: arg.value(), keyword, splat, ty });
        }

        let mut failures = Vec::new();
        for method_type in &entry.method_types {
            match self.match_overload(method, method_type, &values, block, &env) {
                Ok(matched) => {
                    let ty = self.finish_call(node, matched, block, &env, hint)?;
                    return Ok((ty, env));
                }
                Err(errors) => failures.push(errors),
            }
        }

        if let ([method_type], [errors]) = (entry.method_types.as_slice(), failures.as_slice()) {
            for error in errors {
                match error.at {
                    Some(arg) => self.report(arg, error.kind.clone()),
                    None => self.report(node, error.kind.clone()),
                }
            }
            let matched = Matched { method_type: method_type.clone(), bindings: BTreeMap::new() };
            let ty = self.finish_call(node, matched, block, &env, hint)?;
            return Ok((ty, env));
        }

        self.report(
            node,
            DiagnosticKind::UnresolvedOverloading {
                ty: receiver.clone(),
                method: method.to_string(),
                candidates: entry.method_types.clone(),
            },
        );
        if let Some(block) = block {
            self.check_block(block, &Params::empty(), None, &env)?;
        }
        Ok((Type::Any, env))
    }

    /// Arity, keywords and block presence first; argument types only when the
    /// call's shape fits.
    fn match_overload<'n>(
        &mut self,
        method: &str,
        method_type: &MethodType,
        values: &[ArgValue<'n>],
        block: Option<&CallBlock>,
        env: &TypeEnv,
    ) -> Result<Matched, Vec<ArgError<'n>>> {
        let params = &method_type.params;
        let positional: Vec<&ArgValue<'n>> = values.iter().filter(|v| v.keyword.is_none() && !v.splat).collect();
        let keywords: Vec<&ArgValue<'n>> = values.iter().filter(|v| v.keyword.is_some()).collect();
        let splats: Vec<&ArgValue<'n>> = values.iter().filter(|v| v.splat).collect();
        let mut errors = Vec::new();

        let required = params.required.len();
        if positional.len() < required {
            errors.push(ArgError::call(DiagnosticKind::ExpectedArgumentMissing {
                expected: required,
                given: positional.len(),
            }));
        }
        let max = required + params.optional.len();
        if params.rest.is_none() && positional.len() > max {
            errors.push(ArgError::at(
                positional[max].node,
                DiagnosticKind::ExtraArgumentGiven { max, given: positional.len() },
            ));
        }

        if params.has_keywords() {
            for value in &keywords {
                let name = value.keyword.unwrap_or_default();
                if params.keyword(name).is_none() {
                    errors.push(ArgError::at(
                        value.node,
                        DiagnosticKind::UnexpectedKeywordArgument { name: name.to_string() },
                    ));
                }
            }
            let missing: Vec<String> = params
                .required_keywords
                .keys()
                .filter(|k| !keywords.iter().any(|v| v.keyword == Some(k.as_str())))
                .cloned()
                .collect();
            if !missing.is_empty() && splats.is_empty() {
                errors.push(ArgError::call(DiagnosticKind::ExpectedKeywordMissing { missing }));
            }
        } else {
            for value in &keywords {
                errors.push(ArgError::at(
                    value.node,
                    DiagnosticKind::UnexpectedKeywordArgument { name: value.keyword.unwrap_or_default().to_string() },
                ));
            }
            for value in &splats {
                errors.push(ArgError::at(value.node, DiagnosticKind::ExtraKeywordGiven));
            }
        }

        match (&method_type.block, block) {
            (None, Some(_)) => errors.push(ArgError::call(DiagnosticKind::UnexpectedBlockGiven {
                method: method.to_string(),
            })),
            (Some(expected), None) if expected.required => {
                errors.push(ArgError::call(DiagnosticKind::RequiredBlockMissing { method: method.to_string() }))
            }
            _ => {}
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        let vars: BTreeSet<String> = method_type.type_params.iter().map(|p| p.name.clone()).collect();
        let mut bindings = BTreeMap::new();
        for (i, value) in positional.iter().enumerate() {
            if let Some(param) = params.positional_at(i) {
                unify(param, &value.ty, &vars, &mut bindings);
            }
        }
        for value in &keywords {
            if let Some(param) = value.keyword.and_then(|k| params.keyword(k)) {
                unify(param, &value.ty, &vars, &mut bindings);
            }
        }

        let instance = instantiate(&vars, &bindings);
        for (i, value) in positional.iter().enumerate() {
            let Some(param) = params.positional_at(i) else { continue };
            let expected = instance.apply(param);
            if let Err(failure) = self.subtype(&value.ty, &expected, env) {
                errors.push(ArgError::at(
                    value.node,
                    DiagnosticKind::ArgumentTypeMismatch {
                        position: ArgPosition::Positional(i),
                        expected,
                        actual: value.ty.clone(),
                        trail: failure.trail,
                    },
                ));
            }
        }
        for value in &keywords {
            let Some(name) = value.keyword else { continue };
            let Some(param) = params.keyword(name) else { continue };
            let expected = instance.apply(param);
            if let Err(failure) = self.subtype(&value.ty, &expected, env) {
                errors.push(ArgError::at(
                    value.node,
                    DiagnosticKind::ArgumentTypeMismatch {
                        position: ArgPosition::Keyword(name.to_string()),
                        expected,
                        actual: value.ty.clone(),
                        trail: failure.trail,
                    },
                ));
            }
        }

        if errors.is_empty() {
            Ok(Matched { method_type: method_type.clone(), bindings })
        } else {
            Err(errors)
        }
    }

    /// Checks the block against the selected overload and computes the
    /// call's type.
    fn finish_call(
        &mut self,
        node: &Node,
        matched: Matched,
        block: Option<&CallBlock>,
        env: &TypeEnv,
        hint: Option<&Type>,
    ) -> Result<Type, CheckError> {
        let Matched { method_type, mut bindings } = matched;
        let vars: BTreeSet<String> = method_type.type_params.iter().map(|p| p.name.clone()).collect();

        match (&method_type.block, block) {
            (Some(expected), Some(block)) => {
                let params = {
                    let partial = instantiate(&vars, &bindings);
                    expected.params.map_types(&mut |t| partial.apply(t))
                };
                let pending: BTreeSet<String> = free_variables(&expected.return_type)
                    .into_iter()
                    .filter(|v| vars.contains(v) && !bindings.contains_key(v))
                    .collect();
                if let Some(hint) = hint.filter(|h| !h.is_any()) {
                    unify(&method_type.return_type, hint, &pending, &mut bindings);
                }

                let open = free_variables(&expected.return_type)
                    .into_iter()
                    .any(|v| vars.contains(&v) && !bindings.contains_key(&v));
                let body_hint = (!open).then(|| instantiate(&vars, &bindings).apply(&expected.return_type));
                let (body_ty, body_env) = self.check_block(block, &params, body_hint.as_ref(), env)?;

                let pending: BTreeSet<String> = pending.into_iter().filter(|v| !bindings.contains_key(v)).collect();
                unify(&expected.return_type, &body_ty, &pending, &mut bindings);

                let expected_return = instantiate(&vars, &bindings).apply(&expected.return_type);
                if body_env.is_reachable() {
                    if let Err(failure) = self.subtype(&body_ty, &expected_return, &body_env) {
                        let anchor = block.body.as_ref().map_or(node.id, |body| body.id);
                        self.report_at(
                            anchor,
                            block.span,
                            DiagnosticKind::BlockBodyTypeMismatch {
                                expected: expected_return,
                                actual: body_ty,
                                trail: failure.trail,
                            },
                        );
                    }
                }
            }
            (None, Some(block)) => {
                self.check_block(block, &Params::empty(), None, env)?;
            }
            _ => {}
        }

        Ok(instantiate(&vars, &bindings).apply(&method_type.return_type))
    }

    /// Checks a block body with its parameters bound positionally.
    fn check_block(
        &mut self,
        block: &CallBlock,
        params: &Params,
        hint: Option<&Type>,
        env: &TypeEnv,
    ) -> Result<(Type, TypeEnv), CheckError> {
        let mut block_env = env.clone();
        for (i, name) in block.params.iter().enumerate() {
            block_env.set(name, params.positional_at(i).cloned().unwrap_or(Type::Any));
        }
        match &block.body {
            Some(body) => self.synthesize(body, block_env, hint),
            None => Ok((Type::Nil, block_env)),
        }
    }
}

/// The method type with its own generic variables replaced by `untyped`,
/// for steering argument checking.
fn erase_type_params(method_type: &MethodType) -> MethodType {
    if method_type.type_params.is_empty() {
        return method_type.clone();
    }
    let erase = Substitution::build(&method_type.type_params, &[]);
    let mut erased = method_type.map_types(&mut |t| erase.apply(t));
    erased.type_params.clear();
    erased
}

/// Substitution for the method's variables; unsolved ones become `untyped`.
fn instantiate(vars: &BTreeSet<String>, bindings: &BTreeMap<String, Type>) -> Substitution {
    let mut subst = Substitution::empty();
    for var in vars {
        subst.insert(var.clone(), bindings.get(var).cloned().unwrap_or(Type::Any));
    }
    subst
}

/// Binds the variables of `vars` occurring in `pattern` from the matching
/// parts of `actual`. A variable bound twice gets the union.
fn unify(pattern: &Type, actual: &Type, vars: &BTreeSet<String>, bindings: &mut BTreeMap<String, Type>) {
    if actual.is_bot() {
        return;
    }
    match (pattern, actual) {
        (Type::Var(var), _) if vars.contains(&var.name) => {
            let actual = actual.widen();
            let bound = match bindings.remove(&var.name) {
                Some(existing) => Type::union([existing, actual]),
                None => actual,
            };
            bindings.insert(var.name.clone(), bound);
        }
        (Type::Instance { name, args }, Type::Instance { name: actual_name, args: actual_args })
            if name == actual_name && args.len() == actual_args.len() =>
        {
            for (p, a) in args.iter().zip(actual_args) {
                unify(p, a, vars, bindings);
            }
        }
        (Type::Instance { name, args }, Type::Tuple(elems)) if name == "Array" && args.len() == 1 => {
            unify(&args[0], &Type::union(elems.iter().cloned()), vars, bindings);
        }
        (Type::Tuple(patterns), Type::Tuple(elems)) if patterns.len() == elems.len() => {
            for (p, a) in patterns.iter().zip(elems) {
                unify(p, a, vars, bindings);
            }
        }
        (Type::Union(members), _) => {
            let (open, closed): (Vec<&Type>, Vec<&Type>) =
                members.iter().partition(|m| m.any_type(&|t| matches!(t, Type::Var(v) if vars.contains(&v.name))));
            if let [open] = open.as_slice() {
                let rest = actual
                    .members()
                    .iter()
                    .filter(|m| !closed.contains(m) && !(m.is_nil() && closed.iter().any(|c| c.is_nil())))
                    .cloned();
                unify(open, &Type::union(rest), vars, bindings);
            }
        }
        (Type::Proc(pattern), Type::Proc(actual)) => {
            for (i, p) in pattern.params.required.iter().enumerate() {
                if let Some(a) = actual.params.positional_at(i) {
                    unify(p, a, vars, bindings);
                }
            }
            unify(&pattern.return_type, &actual.return_type, vars, bindings);
        }
        _ => {}
    }
}
