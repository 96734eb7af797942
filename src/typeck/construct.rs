//! Bidirectional, flow-sensitive type construction.
//!
//! `synthesize` walks a node with the environment that holds before it and an
//! optional expected type, records the node's type and returns it with the
//! environment that holds after it. Type errors become diagnostics and
//! checking continues with a best-effort type; only a malformed tree aborts.

use std::collections::HashSet;

use tracing::trace;

use crate::ast::{ElseClause, Node, NodeId, NodeKind, Param, ParamKind, When};
use crate::diagnostics::{CheckError, DiagnosticKind};
use crate::span::Span;

use super::env::{MethodContext, TypeEnv};
use super::subtyping::{Failure, Subtyping};
use super::types::{Literal, MethodType, Params, Type};
use super::typing::Typing;

pub struct Construction<'a, 'd> {
    pub(super) checker: &'a mut Subtyping<'d>,
    pub(super) typing: &'a mut Typing,
}

impl<'a, 'd> Construction<'a, 'd> {
    pub fn new(checker: &'a mut Subtyping<'d>, typing: &'a mut Typing) -> Self {
        Self { checker, typing }
    }

    /// Types `node` under `env`, steering with `hint` where the node's form
    /// allows it.
    pub fn synthesize(
        &mut self,
        node: &Node,
        env: TypeEnv,
        hint: Option<&Type>,
    ) -> Result<(Type, TypeEnv), CheckError> {
        let env = self.enter(node, env);
        let hint = node.assertion().or(hint).cloned();
        let (ty, env) = self.synthesize_kind(node, env, hint.as_ref())?;
        let ty = self.finish(node, ty, &env);
        Ok((ty, env))
    }

    /// Applies the node's variable annotations.
    pub(super) fn enter(&mut self, node: &Node, mut env: TypeEnv) -> TypeEnv {
        for (name, ty) in node.var_types() {
            self.checker.builder.check_known(ty);
            env.pin(name, ty.clone());
        }
        env
    }

    /// Applies the node's assertion, records the final type and turns
    /// declaration problems found on the way into diagnostics.
    pub(super) fn finish(&mut self, node: &Node, ty: Type, env: &TypeEnv) -> Type {
        let ty = match node.assertion() {
            Some(asserted) => {
                if self.checker.builder.check_known(asserted)
                    && !self.checker.is_subtype(&ty, asserted, &env.assumptions)
                    && !self.checker.is_subtype(asserted, &ty, &env.assumptions)
                {
                    self.report(node, DiagnosticKind::FalseAssertion { asserted: asserted.clone(), actual: ty });
                }
                asserted.clone()
            }
            None => ty,
        };
        for ill in self.checker.builder.take_ill_formed() {
            self.report(
                node,
                DiagnosticKind::IllFormedDeclaration { type_name: ill.type_name, reason: ill.reason },
            );
        }
        self.typing.record(node.id, ty.clone());
        ty
    }

    pub(super) fn report(&mut self, node: &Node, kind: DiagnosticKind) {
        self.typing.report(node.id, node.span, kind);
    }

    pub(super) fn report_at(&mut self, node: NodeId, span: Span, kind: DiagnosticKind) {
        self.typing.report(node, span, kind);
    }

    pub(super) fn subtype(&mut self, sub: &Type, sup: &Type, env: &TypeEnv) -> Result<(), Failure> {
        self.checker.check(sub, sup, &env.assumptions).map(|_| ())
    }

    fn synthesize_kind(
        &mut self,
        node: &Node,
        env: TypeEnv,
        hint: Option<&Type>,
    ) -> Result<(Type, TypeEnv), CheckError> {
        match &node.kind {
            NodeKind::Nil => Ok((Type::Nil, env)),
            NodeKind::True => Ok((Type::Literal(Literal::True), env)),
            NodeKind::False => Ok((Type::Literal(Literal::False), env)),
            NodeKind::Int(n) => Ok((Type::int(*n), env)),
            NodeKind::Str(s) => Ok((Type::str(s.clone()), env)),
            NodeKind::Sym(s) => Ok((Type::sym(s.clone()), env)),
            NodeKind::SelfRef => Ok((env.self_type.clone(), env)),
            NodeKind::LocalVar(name) => {
                let ty = env.get(name).cloned().unwrap_or(Type::Any);
                Ok((ty, env))
            }
            NodeKind::LocalAssign { name, value } => self.assign(node, name, value, env),
            NodeKind::Const(name) => {
                if self.checker.decls().contains(name) {
                    Ok((Type::Singleton(name.clone()), env))
                } else {
                    self.report(node, DiagnosticKind::UnknownConstant { name: name.clone() });
                    Ok((Type::Any, env))
                }
            }
            NodeKind::Call { .. } => self.synthesize_call(node, env, hint),
            NodeKind::And(..) | NodeKind::Or(..) | NodeKind::Not(_) => {
                let base = env.clone();
                let cond = self.logic(node, env)?;
                Ok((cond.ty, TypeEnv::join(&base, vec![cond.truthy, cond.falsy])))
            }
            NodeKind::If { cond, then_branch, else_branch } => {
                self.synthesize_if(cond, then_branch.as_deref(), else_branch.as_deref(), env, hint)
            }
            NodeKind::Case { subject, whens, else_clause } => match subject {
                Some(subject) => self.case_with_subject(node, subject, whens, else_clause.as_ref(), env, hint),
                None => self.case_without_subject(node, whens, else_clause.as_ref(), env, hint),
            },
            NodeKind::While { cond, body } => {
                let base = env.clone();
                let cond = self.condition(cond, env)?;
                let body_env = match body {
                    Some(body) => self.synthesize(body, cond.truthy, None)?.1,
                    None => cond.truthy,
                };
                Ok((Type::Nil, TypeEnv::join(&base, vec![cond.falsy, body_env])))
            }
            NodeKind::Begin(stmts) => {
                let mut env = env;
                let mut ty = Type::Nil;
                for (i, stmt) in stmts.iter().enumerate() {
                    let last = i + 1 == stmts.len();
                    let (t, e) = self.synthesize(stmt, env, if last { hint } else { None })?;
                    ty = t;
                    env = e;
                }
                Ok((ty, env))
            }
            NodeKind::Return(value) => self.synthesize_return(node, value.as_deref(), env),
            NodeKind::Array(elems) => self.synthesize_array(elems, env, hint),
            NodeKind::Lambda { params, body } => self.synthesize_lambda(node, params, body.as_deref(), env, hint),
            NodeKind::Def { name, params, body } => self.synthesize_def(node, name, params, body.as_deref(), env),
            NodeKind::Class { name, body } => {
                let self_type = if self.checker.decls().contains(name) {
                    Type::Singleton(name.clone())
                } else {
                    self.report(node, DiagnosticKind::UnknownConstant { name: name.clone() });
                    Type::Any
                };
                if let Some(body) = body {
                    self.synthesize(body, env.scope(self_type), None)?;
                }
                Ok((Type::Nil, env))
            }
        }
    }

    fn assign(
        &mut self,
        node: &Node,
        name: &str,
        value: &Node,
        env: TypeEnv,
    ) -> Result<(Type, TypeEnv), CheckError> {
        let Some(declared) = env.pinned(name).cloned() else {
            let (ty, mut env) = self.synthesize(value, env, None)?;
            let stored = ty.widen();
            env.set(name, stored.clone());
            return Ok((stored, env));
        };

        let (ty, mut env) = self.synthesize(value, env, Some(&declared))?;
        match self.subtype(&ty, &declared, &env) {
            Ok(()) => {
                let widened = ty.widen();
                let stored = if ty.is_any() {
                    declared
                } else if widened != ty && self.checker.is_subtype(&widened, &declared, &env.assumptions) {
                    widened
                } else {
                    ty
                };
                env.set(name, stored.clone());
                Ok((stored, env))
            }
            Err(failure) => {
                self.report(
                    node,
                    DiagnosticKind::IncompatibleAssignment { lhs: declared.clone(), rhs: ty, trail: failure.trail },
                );
                env.set(name, declared.clone());
                Ok((declared, env))
            }
        }
    }

    fn synthesize_if(
        &mut self,
        cond: &Node,
        then_branch: Option<&Node>,
        else_branch: Option<&Node>,
        env: TypeEnv,
        hint: Option<&Type>,
    ) -> Result<(Type, TypeEnv), CheckError> {
        let base = env.clone();
        let reachable = env.is_reachable();
        let condition = self.condition(cond, env)?;
        let then_reachable = condition.truthy.is_reachable();
        let else_reachable = condition.falsy.is_reachable();

        if reachable && !then_reachable && then_branch.is_some() {
            self.report(cond, DiagnosticKind::UnreachableBranch);
        }
        let (then_ty, then_env) = match then_branch {
            Some(branch) => self.synthesize(branch, condition.truthy, hint)?,
            None => (Type::Nil, condition.truthy),
        };

        if let Some(branch) = else_branch.filter(|_| reachable && !else_reachable) {
            self.report(branch, DiagnosticKind::UnreachableBranch);
        }
        let (else_ty, else_env) = match else_branch {
            Some(branch) => self.synthesize(branch, condition.falsy, hint)?,
            None => (Type::Nil, condition.falsy),
        };

        let mut types = Vec::new();
        if then_reachable {
            types.push(then_ty);
        }
        if else_reachable {
            types.push(else_ty);
        }
        Ok((Type::union(types), TypeEnv::join(&base, vec![then_env, else_env])))
    }

    fn case_with_subject(
        &mut self,
        node: &Node,
        subject: &Node,
        whens: &[When],
        else_clause: Option<&ElseClause>,
        env: TypeEnv,
        hint: Option<&Type>,
    ) -> Result<(Type, TypeEnv), CheckError> {
        check_when_clauses(node, whens)?;
        let (subject_ty, mut env) = self.synthesize(subject, env, None)?;
        let base = env.clone();
        let var = subject_var(subject);
        let case_reachable = env.is_reachable();

        let mut remaining = subject_ty.clone();
        let mut types = Vec::new();
        let mut branches = Vec::new();

        for when in whens {
            let mut matched = Vec::new();
            let mut tested = Vec::new();
            for test in &when.tests {
                let (test_ty, test_env) = self.synthesize(test, env, None)?;
                env = test_env;
                let narrowed = self.case_test(test, &test_ty, &remaining, &env);
                if let Some(t) = narrowed.tested {
                    tested.push(t);
                }
                matched.push(narrowed.truthy);
                remaining = narrowed.falsy;
            }

            let matched = Type::union(matched);
            let mut body_env = env.clone();
            if matched.is_bot() && !subject_ty.is_bot() {
                body_env.mark_unreachable();
            }
            if let Some(var) = var {
                let bound = if matched.is_bot() && !tested.is_empty() { Type::union(tested) } else { matched };
                body_env.set(var, bound);
                env.set(var, remaining.clone());
            }
            if remaining.is_bot() && !subject_ty.is_bot() {
                env.mark_unreachable();
            }

            let body_reachable = body_env.is_reachable();
            let (body_ty, body_env) = self.clause_body(when.body.as_deref(), body_env, hint)?;
            if case_reachable && !body_reachable {
                self.report_unreachable_clause(node.id, when.span, &body_ty);
            }
            if body_reachable {
                types.push(body_ty);
            }
            branches.push(body_env);
        }

        self.finish_case(node, else_clause, env, case_reachable, types, branches, &base, hint)
    }

    fn case_without_subject(
        &mut self,
        node: &Node,
        whens: &[When],
        else_clause: Option<&ElseClause>,
        env: TypeEnv,
        hint: Option<&Type>,
    ) -> Result<(Type, TypeEnv), CheckError> {
        check_when_clauses(node, whens)?;
        let base = env.clone();
        let mut env = env;
        let mut previous_reachable = env.is_reachable();
        let mut types = Vec::new();
        let mut branches = Vec::new();

        for when in whens {
            let incoming_reachable = env.is_reachable();
            let mut matched = Vec::new();
            for test in &when.tests {
                let condition = self.condition(test, env)?;
                matched.push(condition.truthy);
                env = condition.falsy;
            }
            let body_env = TypeEnv::join(&base, matched);
            let body_reachable = body_env.is_reachable();
            let (body_ty, body_env) = self.clause_body(when.body.as_deref(), body_env, hint)?;
            if incoming_reachable && !body_reachable {
                self.report_unreachable_clause(node.id, when.span, &body_ty);
            }
            if body_reachable {
                types.push(body_ty);
            }
            branches.push(body_env);
            previous_reachable = incoming_reachable;
        }

        self.finish_case(node, else_clause, env, previous_reachable, types, branches, &base, hint)
    }

    /// The `else` part of a `case`, explicit or implicit, and the join.
    #[allow(clippy::too_many_arguments)]
    fn finish_case(
        &mut self,
        node: &Node,
        else_clause: Option<&ElseClause>,
        env: TypeEnv,
        flag_else: bool,
        mut types: Vec<Type>,
        mut branches: Vec<TypeEnv>,
        base: &TypeEnv,
        hint: Option<&Type>,
    ) -> Result<(Type, TypeEnv), CheckError> {
        let else_reachable = env.is_reachable();
        match else_clause {
            Some(clause) => {
                let (else_ty, else_env) = self.clause_body(clause.body.as_deref(), env, hint)?;
                if flag_else && !else_reachable {
                    self.report_unreachable_clause(node.id, clause.span, &else_ty);
                }
                if else_reachable {
                    types.push(else_ty);
                }
                branches.push(else_env);
            }
            None => {
                if else_reachable {
                    types.push(Type::Nil);
                }
                branches.push(env);
            }
        }
        Ok((Type::union(types), TypeEnv::join(base, branches)))
    }

    fn clause_body(
        &mut self,
        body: Option<&Node>,
        env: TypeEnv,
        hint: Option<&Type>,
    ) -> Result<(Type, TypeEnv), CheckError> {
        match body {
            Some(body) => self.synthesize(body, env, hint),
            None => Ok((Type::Nil, env)),
        }
    }

    fn report_unreachable_clause(&mut self, node: NodeId, span: Span, body_ty: &Type) {
        let kind = if body_ty.is_bot() {
            DiagnosticKind::UnreachableBranch
        } else {
            DiagnosticKind::UnreachableValueBranch { ty: body_ty.widen() }
        };
        self.report_at(node, span, kind);
    }

    fn synthesize_return(
        &mut self,
        node: &Node,
        value: Option<&Node>,
        env: TypeEnv,
    ) -> Result<(Type, TypeEnv), CheckError> {
        let context = env.method.clone();
        let expected = context.as_ref().map(|c| c.return_type.clone());
        let (ty, env) = match value {
            Some(value) => self.synthesize(value, env, expected.as_ref())?,
            None => (Type::Nil, env),
        };
        if let Some(context) = context {
            if let Err(failure) = self.subtype(&ty, &context.return_type, &env) {
                let kind = match &context.name {
                    Some(method) if context.is_setter() => DiagnosticKind::SetterReturnTypeMismatch {
                        method: method.clone(),
                        expected: context.return_type.clone(),
                        actual: ty,
                        trail: failure.trail,
                    },
                    _ => DiagnosticKind::ReturnTypeMismatch {
                        expected: context.return_type.clone(),
                        actual: ty,
                        trail: failure.trail,
                    },
                };
                self.report(node, kind);
            }
        }
        Ok((Type::Bot, env.unreachable()))
    }

    /// Array literals are `Array[T]` of the widened element union, or a tuple
    /// when the expected type is a tuple of the same length.
    fn synthesize_array(
        &mut self,
        elems: &[Node],
        env: TypeEnv,
        hint: Option<&Type>,
    ) -> Result<(Type, TypeEnv), CheckError> {
        let tuple_hint = match hint {
            Some(Type::Tuple(hints)) if hints.len() == elems.len() => Some(hints.clone()),
            _ => None,
        };
        let elem_hint = match hint {
            Some(Type::Instance { name, args }) if name == "Array" && args.len() == 1 => Some(args[0].clone()),
            _ => None,
        };

        let mut env = env;
        let mut types = Vec::with_capacity(elems.len());
        for (i, elem) in elems.iter().enumerate() {
            let hint = tuple_hint.as_ref().map(|h| &h[i]).or(elem_hint.as_ref());
            let (ty, e) = self.synthesize(elem, env, hint)?;
            types.push(ty);
            env = e;
        }

        if tuple_hint.is_some() {
            return Ok((Type::Tuple(types), env));
        }
        let elem = if types.is_empty() {
            elem_hint.unwrap_or(Type::Any)
        } else {
            let elem = Type::union(types.iter().map(Type::widen));
            match elem_hint {
                Some(hinted) if self.checker.is_subtype(&elem, &hinted, &env.assumptions) => hinted,
                _ => elem,
            }
        };
        Ok((Type::instance("Array", vec![elem]), env))
    }

    fn synthesize_lambda(
        &mut self,
        node: &Node,
        params: &[String],
        body: Option<&Node>,
        env: TypeEnv,
        hint: Option<&Type>,
    ) -> Result<(Type, TypeEnv), CheckError> {
        let hinted = match hint {
            Some(Type::Proc(method_type)) => Some(method_type.as_ref().clone()),
            _ => None,
        };

        let mut body_env = env.clone();
        for (i, param) in params.iter().enumerate() {
            let ty = hinted
                .as_ref()
                .and_then(|h| h.params.positional_at(i).cloned())
                .unwrap_or(Type::Any);
            body_env.set(param, ty);
        }
        let return_type = hinted.as_ref().map(|h| h.return_type.clone()).unwrap_or(Type::Any);
        body_env.method = Some(MethodContext::lambda(return_type.clone()));

        let (body_ty, body_env) = match body {
            Some(body) => self.synthesize(body, body_env, hinted.as_ref().map(|h| &h.return_type))?,
            None => (Type::Nil, body_env),
        };

        let ty = match hinted {
            Some(hinted) => {
                if body_env.is_reachable() {
                    if let Err(failure) = self.subtype(&body_ty, &return_type, &body_env) {
                        self.report(
                            node,
                            DiagnosticKind::BlockBodyTypeMismatch {
                                expected: return_type,
                                actual: body_ty,
                                trail: failure.trail,
                            },
                        );
                    }
                }
                Type::proc(MethodType::new(hinted.params, hinted.return_type))
            }
            None => Type::proc(MethodType::new(
                Params::positional(vec![Type::Any; params.len()]),
                body_ty.widen(),
            )),
        };
        Ok((ty, env))
    }

    /// `def` inside a class body checks the body against the declared
    /// signature of the instance method; the first overload is used.
    fn synthesize_def(
        &mut self,
        node: &Node,
        name: &str,
        params: &[Param],
        body: Option<&Node>,
        env: TypeEnv,
    ) -> Result<(Type, TypeEnv), CheckError> {
        check_param_order(node, params)?;

        let decl = match &env.self_type {
            Type::Singleton(class) => self.checker.decls().get(class),
            _ => None,
        };
        let instance = decl.map(|d| d.self_type()).unwrap_or_else(|| env.self_type.clone());
        let declared = decl.and_then(|_| self.checker.builder.method(&instance, name)).and_then(|entry| {
            entry.method_types.into_iter().next()
        });
        trace!(method = name, declared = declared.is_some(), "checking method body");

        let mut scope = env.scope(instance.clone());
        if let Some(decl) = decl {
            for param in &decl.type_params {
                scope.assumptions = scope.assumptions.clone().with_var(param.name.clone(), param.bound.clone());
            }
        }
        if let Some(method_type) = &declared {
            for param in &method_type.type_params {
                scope.assumptions = scope.assumptions.clone().with_var(param.name.clone(), param.bound.clone());
            }
        }
        bind_params(&mut scope, params, declared.as_ref());

        let Some(method_type) = declared else {
            if let Some(body) = body {
                self.synthesize(body, scope, None)?;
            }
            return Ok((Type::sym(name), env));
        };

        let return_type = method_type.return_type.clone();
        let context = MethodContext::method(name, return_type.clone());
        let setter = context.is_setter();
        scope.method = Some(context);

        let (body_ty, body_env) = match body {
            Some(body) => self.synthesize(body, scope, Some(&return_type))?,
            None => (Type::Nil, scope),
        };
        if body_env.is_reachable() && return_type != Type::Void {
            if let Err(failure) = self.subtype(&body_ty, &return_type, &body_env) {
                let (method, expected, actual, trail) = (name.to_string(), return_type, body_ty, failure.trail);
                let kind = if setter {
                    DiagnosticKind::SetterBodyTypeMismatch { method, expected, actual, trail }
                } else {
                    DiagnosticKind::MethodBodyTypeMismatch { method, expected, actual, trail }
                };
                self.report(node, kind);
            }
        }
        Ok((Type::sym(name), env))
    }
}

/// The local a `case` subject stands for, so clauses can narrow it.
fn subject_var(subject: &Node) -> Option<&str> {
    match &subject.kind {
        NodeKind::LocalVar(name) | NodeKind::LocalAssign { name, .. } => Some(name),
        _ => None,
    }
}

fn check_when_clauses(node: &Node, whens: &[When]) -> Result<(), CheckError> {
    if whens.is_empty() {
        return Err(CheckError::malformed(node.id, "`case` without `when` clauses"));
    }
    if whens.iter().any(|w| w.tests.is_empty()) {
        return Err(CheckError::malformed(node.id, "`when` clause without tests"));
    }
    Ok(())
}

/// Positional parameters come first, then keywords, then at most one block.
fn check_param_order(node: &Node, params: &[Param]) -> Result<(), CheckError> {
    let mut names = HashSet::new();
    let mut seen_keyword = false;
    let mut seen_block = false;
    let mut rest = 0;
    let mut rest_keywords = 0;
    for param in params {
        if seen_block {
            return Err(CheckError::malformed(node.id, format!("parameter `{}` after the block parameter", param.name)));
        }
        if param.name != "_" && !names.insert(param.name.as_str()) {
            return Err(CheckError::malformed(node.id, format!("duplicate parameter `{}`", param.name)));
        }
        match param.kind {
            ParamKind::Required | ParamKind::Optional | ParamKind::Rest if seen_keyword => {
                return Err(CheckError::malformed(
                    node.id,
                    format!("positional parameter `{}` after keyword parameters", param.name),
                ));
            }
            ParamKind::Rest => rest += 1,
            ParamKind::RestKeywords => {
                seen_keyword = true;
                rest_keywords += 1;
            }
            ParamKind::RequiredKeyword | ParamKind::OptionalKeyword if rest_keywords > 0 => {
                return Err(CheckError::malformed(
                    node.id,
                    format!("keyword parameter `{}` after `**`", param.name),
                ));
            }
            ParamKind::RequiredKeyword | ParamKind::OptionalKeyword => seen_keyword = true,
            ParamKind::Block => seen_block = true,
            ParamKind::Required | ParamKind::Optional => {}
        }
    }
    if rest > 1 || rest_keywords > 1 {
        return Err(CheckError::malformed(node.id, "more than one rest parameter"));
    }
    Ok(())
}

/// Binds method parameters to the types the signature gives them.
fn bind_params(env: &mut TypeEnv, params: &[Param], declared: Option<&MethodType>) {
    let mut required = 0;
    let mut optional = 0;
    for param in params {
        let ty = declared.and_then(|mt| {
            let p = &mt.params;
            match param.kind {
                ParamKind::Required => {
                    required += 1;
                    p.required.get(required - 1).cloned()
                }
                ParamKind::Optional => {
                    optional += 1;
                    p.optional.get(optional - 1).cloned()
                }
                ParamKind::Rest => p.rest.clone().map(|t| Type::instance("Array", vec![t])),
                ParamKind::RequiredKeyword | ParamKind::OptionalKeyword => p.keyword(&param.name).cloned(),
                ParamKind::RestKeywords => p
                    .rest_keywords
                    .clone()
                    .map(|t| Type::instance("Hash", vec![Type::named("Symbol"), t])),
                ParamKind::Block => Some(match &mt.block {
                    Some(block) if block.required => block.to_proc(),
                    Some(block) => Type::optional(block.to_proc()),
                    None => Type::Nil,
                }),
            }
        });
        env.set(&param.name, ty.unwrap_or(Type::Any));
    }
}
