use std::cell::Cell;

use serde::{Deserialize, Serialize};

use crate::span::Span;
use crate::typeck::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One checked program unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub root: Node,
}

impl Unit {
    pub fn new(root: Node) -> Self {
        Self { root }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub span: Span,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

impl Node {
    pub fn new(id: NodeId, span: Span, kind: NodeKind) -> Self {
        Self { id, span, kind, annotations: Vec::new() }
    }

    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// The type asserted with `expr #: T`, if any.
    pub fn assertion(&self) -> Option<&Type> {
        self.annotations.iter().find_map(|a| match a {
            Annotation::Assertion(ty) => Some(ty),
            Annotation::VarType { .. } => None,
        })
    }

    /// Local variable types pinned by this node.
    pub fn var_types(&self) -> impl Iterator<Item = (&str, &Type)> {
        self.annotations.iter().filter_map(|a| match a {
            Annotation::VarType { name, ty } => Some((name.as_str(), ty)),
            Annotation::Assertion(_) => None,
        })
    }

    /// Calls `f` on every direct child node.
    pub fn for_each_child<'a>(&'a self, mut f: impl FnMut(&'a Node)) {
        let opt = |n: &'a Option<Box<Node>>| n.as_deref();
        match &self.kind {
            NodeKind::Nil
            | NodeKind::True
            | NodeKind::False
            | NodeKind::Int(_)
            | NodeKind::Str(_)
            | NodeKind::Sym(_)
            | NodeKind::SelfRef
            | NodeKind::LocalVar(_)
            | NodeKind::Const(_) => {}
            NodeKind::LocalAssign { value, .. } => f(value),
            NodeKind::Call { receiver, args, block, .. } => {
                if let Some(r) = opt(receiver) {
                    f(r);
                }
                for arg in args {
                    f(arg.value());
                }
                if let Some(body) = block.as_ref().and_then(|b| b.body.as_deref()) {
                    f(body);
                }
            }
            NodeKind::And(l, r) | NodeKind::Or(l, r) => {
                f(l);
                f(r);
            }
            NodeKind::Not(inner) => f(inner),
            NodeKind::If { cond, then_branch, else_branch } => {
                f(cond);
                opt(then_branch).into_iter().chain(opt(else_branch)).for_each(&mut f);
            }
            NodeKind::Case { subject, whens, else_clause } => {
                if let Some(s) = opt(subject) {
                    f(s);
                }
                for when in whens {
                    when.tests.iter().for_each(&mut f);
                    if let Some(body) = opt(&when.body) {
                        f(body);
                    }
                }
                if let Some(body) = else_clause.as_ref().and_then(|e| e.body.as_deref()) {
                    f(body);
                }
            }
            NodeKind::While { cond, body } => {
                f(cond);
                if let Some(b) = opt(body) {
                    f(b);
                }
            }
            NodeKind::Begin(stmts) | NodeKind::Array(stmts) => stmts.iter().for_each(f),
            NodeKind::Return(value) => {
                if let Some(v) = opt(value) {
                    f(v);
                }
            }
            NodeKind::Lambda { body, .. } | NodeKind::Def { body, .. } | NodeKind::Class { body, .. } => {
                if let Some(b) = opt(body) {
                    f(b);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Annotation {
    /// `@type var name: T`, scoped to the annotated node.
    VarType { name: String, ty: Type },
    /// `expr #: T`
    Assertion(Type),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    Nil,
    True,
    False,
    Int(i64),
    Str(String),
    Sym(String),
    SelfRef,
    LocalVar(String),
    LocalAssign {
        name: String,
        value: Box<Node>,
    },
    Const(String),
    Call {
        receiver: Option<Box<Node>>,
        method: String,
        #[serde(default)]
        args: Vec<Arg>,
        #[serde(default)]
        block: Option<CallBlock>,
        #[serde(default)]
        safe_nav: bool,
    },
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Not(Box<Node>),
    If {
        cond: Box<Node>,
        then_branch: Option<Box<Node>>,
        else_branch: Option<Box<Node>>,
    },
    Case {
        subject: Option<Box<Node>>,
        whens: Vec<When>,
        else_clause: Option<ElseClause>,
    },
    While {
        cond: Box<Node>,
        body: Option<Box<Node>>,
    },
    Begin(Vec<Node>),
    Return(Option<Box<Node>>),
    Array(Vec<Node>),
    Lambda {
        params: Vec<String>,
        body: Option<Box<Node>>,
    },
    Def {
        name: String,
        params: Vec<Param>,
        body: Option<Box<Node>>,
    },
    Class {
        name: String,
        body: Option<Box<Node>>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Arg {
    Positional(Node),
    Keyword { name: String, value: Node },
    /// `**hash`
    KwSplat(Node),
}

impl Arg {
    pub fn value(&self) -> &Node {
        match self {
            Arg::Positional(n) | Arg::KwSplat(n) => n,
            Arg::Keyword { value, .. } => value,
        }
    }
}

/// A `do |a, b| ... end` block attached to a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallBlock {
    #[serde(default)]
    pub params: Vec<String>,
    pub body: Option<Box<Node>>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct When {
    pub tests: Vec<Node>,
    pub body: Option<Box<Node>>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElseClause {
    pub body: Option<Box<Node>>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ParamKind {
    Required,
    Optional,
    Rest,
    RequiredKeyword,
    OptionalKeyword,
    RestKeywords,
    Block,
}

impl ParamKind {
    pub fn is_keyword(self) -> bool {
        matches!(self, ParamKind::RequiredKeyword | ParamKind::OptionalKeyword | ParamKind::RestKeywords)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
}

impl Param {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self { name: name.into(), kind }
    }

    pub fn required(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Required)
    }
}

/// Allocates node ids in creation order. Each node's span is derived from its
/// id, which keeps ranges distinct without source text.
#[derive(Debug, Default)]
pub struct AstBuilder {
    next: Cell<u32>,
}

impl AstBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, kind: NodeKind) -> Node {
        let id = self.next.get();
        self.next.set(id + 1);
        Node::new(NodeId(id), Span::new(id as usize, id as usize + 1), kind)
    }

    pub fn span(&self) -> Span {
        let id = self.next.get();
        self.next.set(id + 1);
        Span::new(id as usize, id as usize + 1)
    }

    pub fn nil(&self) -> Node {
        self.node(NodeKind::Nil)
    }

    pub fn true_(&self) -> Node {
        self.node(NodeKind::True)
    }

    pub fn false_(&self) -> Node {
        self.node(NodeKind::False)
    }

    pub fn int(&self, value: i64) -> Node {
        self.node(NodeKind::Int(value))
    }

    pub fn str(&self, value: &str) -> Node {
        self.node(NodeKind::Str(value.to_string()))
    }

    pub fn sym(&self, value: &str) -> Node {
        self.node(NodeKind::Sym(value.to_string()))
    }

    pub fn self_ref(&self) -> Node {
        self.node(NodeKind::SelfRef)
    }

    pub fn var(&self, name: &str) -> Node {
        self.node(NodeKind::LocalVar(name.to_string()))
    }

    pub fn assign(&self, name: &str, value: Node) -> Node {
        self.node(NodeKind::LocalAssign { name: name.to_string(), value: Box::new(value) })
    }

    pub fn constant(&self, name: &str) -> Node {
        self.node(NodeKind::Const(name.to_string()))
    }

    pub fn call(&self, receiver: Node, method: &str, args: Vec<Node>) -> Node {
        self.call_args(Some(receiver), method, args.into_iter().map(Arg::Positional).collect(), None)
    }

    /// A receiverless call such as `puts(x)`.
    pub fn send(&self, method: &str, args: Vec<Node>) -> Node {
        self.call_args(None, method, args.into_iter().map(Arg::Positional).collect(), None)
    }

    pub fn safe_call(&self, receiver: Node, method: &str, args: Vec<Node>) -> Node {
        let mut node = self.call(receiver, method, args);
        if let NodeKind::Call { safe_nav, .. } = &mut node.kind {
            *safe_nav = true;
        }
        node
    }

    pub fn call_args(&self, receiver: Option<Node>, method: &str, args: Vec<Arg>, block: Option<CallBlock>) -> Node {
        self.node(NodeKind::Call {
            receiver: receiver.map(Box::new),
            method: method.to_string(),
            args,
            block,
            safe_nav: false,
        })
    }

    pub fn call_with_block(&self, receiver: Node, method: &str, args: Vec<Node>, block: CallBlock) -> Node {
        self.call_args(Some(receiver), method, args.into_iter().map(Arg::Positional).collect(), Some(block))
    }

    pub fn block(&self, params: &[&str], body: Option<Node>) -> CallBlock {
        CallBlock {
            params: params.iter().map(|p| p.to_string()).collect(),
            body: body.map(Box::new),
            span: self.span(),
        }
    }

    pub fn kwarg(&self, name: &str, value: Node) -> Arg {
        Arg::Keyword { name: name.to_string(), value }
    }

    pub fn and(&self, left: Node, right: Node) -> Node {
        self.node(NodeKind::And(Box::new(left), Box::new(right)))
    }

    pub fn or(&self, left: Node, right: Node) -> Node {
        self.node(NodeKind::Or(Box::new(left), Box::new(right)))
    }

    pub fn not(&self, inner: Node) -> Node {
        self.node(NodeKind::Not(Box::new(inner)))
    }

    pub fn if_(&self, cond: Node, then_branch: Option<Node>, else_branch: Option<Node>) -> Node {
        self.node(NodeKind::If {
            cond: Box::new(cond),
            then_branch: then_branch.map(Box::new),
            else_branch: else_branch.map(Box::new),
        })
    }

    pub fn when(&self, tests: Vec<Node>, body: Option<Node>) -> When {
        When { tests, body: body.map(Box::new), span: self.span() }
    }

    pub fn else_clause(&self, body: Option<Node>) -> ElseClause {
        ElseClause { body: body.map(Box::new), span: self.span() }
    }

    pub fn case(&self, subject: Option<Node>, whens: Vec<When>, else_clause: Option<ElseClause>) -> Node {
        self.node(NodeKind::Case { subject: subject.map(Box::new), whens, else_clause })
    }

    pub fn while_(&self, cond: Node, body: Option<Node>) -> Node {
        self.node(NodeKind::While { cond: Box::new(cond), body: body.map(Box::new) })
    }

    pub fn begin(&self, stmts: Vec<Node>) -> Node {
        self.node(NodeKind::Begin(stmts))
    }

    pub fn ret(&self, value: Option<Node>) -> Node {
        self.node(NodeKind::Return(value.map(Box::new)))
    }

    pub fn array(&self, elems: Vec<Node>) -> Node {
        self.node(NodeKind::Array(elems))
    }

    pub fn lambda(&self, params: &[&str], body: Option<Node>) -> Node {
        self.node(NodeKind::Lambda {
            params: params.iter().map(|p| p.to_string()).collect(),
            body: body.map(Box::new),
        })
    }

    pub fn def(&self, name: &str, params: Vec<Param>, body: Option<Node>) -> Node {
        self.node(NodeKind::Def { name: name.to_string(), params, body: body.map(Box::new) })
    }

    pub fn class(&self, name: &str, body: Option<Node>) -> Node {
        self.node(NodeKind::Class { name: name.to_string(), body: body.map(Box::new) })
    }

    pub fn unit(&self, root: Node) -> Unit {
        Unit::new(root)
    }
}
