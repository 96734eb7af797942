//! Structural views of types: which methods a type exposes and with what
//! signatures.
//!
//! A nominal type's table is assembled from its ancestor chain once per
//! session. Instantiating it for concrete type arguments only pushes a pending
//! substitution; each method is substituted the first time it is looked up and
//! cached per name.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::decls::{DeclTable, TypeDecl};
use super::merge::union_method_types;
use super::subst::Substitution;
use super::types::{MethodType, Params, Type, TypeParam};

/// One or more overloads, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub method_types: Vec<MethodType>,
}

impl Entry {
    pub fn new(method_types: Vec<MethodType>) -> Self {
        Self { method_types }
    }
}

impl std::fmt::Display for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sigs: Vec<String> = self.method_types.iter().map(|m| m.to_string()).collect();
        write!(f, "{{ {} }}", sigs.join(" || "))
    }
}

/// Candidate entries of equal specificity, merged on first lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnionEntry {
    pub entries: Vec<Entry>,
}

impl UnionEntry {
    /// Collapses the candidates into one entry.
    ///
    /// Identical signature lists collapse to one entry with merged provenance.
    /// Otherwise every pair of overloads is merged and the successful merges
    /// are kept. When no pair merges the method is absent.
    pub fn resolve(&self) -> Option<Entry> {
        let mut entries = self.entries.iter();
        let first = entries.next()?.clone();
        entries.try_fold(first, |e1, e2| {
            if e1.method_types == e2.method_types {
                let merged = e1
                    .method_types
                    .iter()
                    .zip(&e2.method_types)
                    .map(|(m1, m2)| {
                        let mut m = m1.clone();
                        m.decls.extend(m2.decls.iter().cloned());
                        m
                    })
                    .collect();
                return Some(Entry::new(merged));
            }

            let mut method_types: Vec<MethodType> = Vec::new();
            for m1 in &e1.method_types {
                for m2 in &e2.method_types {
                    if let Some(merged) = union_method_types(m1, m2) {
                        if !method_types.contains(&merged) {
                            method_types.push(merged);
                        }
                    }
                }
            }
            if method_types.is_empty() {
                None
            } else {
                Some(Entry::new(method_types))
            }
        })
    }
}

impl std::fmt::Display for UnionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.entries.iter().map(|e| e.to_string()).collect();
        write!(f, "UnionEntry({})", parts.join(" | "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodEntry {
    Resolved(Entry),
    Union(UnionEntry),
}

pub type MethodTable = BTreeMap<String, MethodEntry>;

/// A method table with pending substitutions and a per-name resolution cache.
#[derive(Debug, Clone)]
pub struct Methods {
    substs: Vec<Substitution>,
    methods: Arc<MethodTable>,
    subst: Option<Substitution>,
    resolved: HashMap<String, Option<Entry>>,
    resolutions: usize,
}

impl Methods {
    pub fn new(methods: MethodTable) -> Self {
        Self::shared(Arc::new(methods))
    }

    fn shared(methods: Arc<MethodTable>) -> Self {
        Self {
            substs: Vec::new(),
            methods,
            subst: None,
            resolved: HashMap::new(),
            resolutions: 0,
        }
    }

    /// A view of the same table with one more pending substitution.
    pub fn push_substitution(&self, subst: Substitution) -> Methods {
        let mut substs = self.substs.clone();
        substs.push(subst);
        Methods {
            substs,
            ..Methods::shared(Arc::clone(&self.methods))
        }
    }

    /// All pending substitutions composed in order.
    pub fn subst(&mut self) -> &Substitution {
        let substs = &self.substs;
        self.subst.get_or_insert_with(|| {
            substs
                .iter()
                .fold(Substitution::empty(), |acc, s| acc.merge(s, true))
        })
    }

    /// Looks up `name`, resolving union entries and applying the pending
    /// substitution on first access.
    pub fn get(&mut self, name: &str) -> Option<Entry> {
        if let Some(cached) = self.resolved.get(name) {
            return cached.clone();
        }
        let table = Arc::clone(&self.methods);
        let entry = match table.get(name)? {
            MethodEntry::Resolved(entry) => Some(entry.clone()),
            MethodEntry::Union(union) => {
                self.resolutions += 1;
                trace!(method = name, candidates = union.entries.len(), "resolving union entry");
                union.resolve()
            }
        };
        let subst = self.subst().clone();
        let entry = entry.map(|e| Entry {
            method_types: e.method_types.iter().map(|m| subst.apply_method(m)).collect(),
        });
        self.resolved.insert(name.to_string(), entry.clone());
        entry
    }

    pub fn contains(&mut self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Replaces one method's entry. Only that name's cached resolution is
    /// dropped.
    pub fn set(&mut self, name: &str, entry: MethodEntry) {
        Arc::make_mut(&mut self.methods).insert(name.to_string(), entry);
        self.resolved.remove(name);
    }

    /// Names present in the table, including union entries that may turn out
    /// not to resolve.
    pub fn raw_names(&self) -> Vec<String> {
        self.methods.keys().cloned().collect()
    }

    /// Names whose entry resolves.
    pub fn names(&mut self) -> Vec<String> {
        self.raw_names()
            .into_iter()
            .filter(|name| self.contains(name))
            .collect()
    }

    /// How many times a union entry has been resolved through this view.
    pub fn resolutions(&self) -> usize {
        self.resolutions
    }
}

/// The structural view of one concrete type.
#[derive(Debug, Clone)]
pub struct Shape {
    pub ty: Type,
    pub methods: Methods,
}

impl Shape {
    pub fn method(&mut self, name: &str) -> Option<Entry> {
        self.methods.get(name)
    }
}

/// A declaration problem found while building shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllFormed {
    pub type_name: String,
    pub reason: String,
}

/// Session-scoped shape construction and caching.
pub struct ShapeBuilder<'d> {
    decls: &'d DeclTable,
    instance_tables: HashMap<String, Option<Arc<MethodTable>>>,
    singleton_tables: HashMap<String, Option<Arc<MethodTable>>>,
    shapes: HashMap<Type, Option<Shape>>,
    open: Option<Shape>,
    reported: HashSet<String>,
    ill_formed: Vec<IllFormed>,
}

impl<'d> ShapeBuilder<'d> {
    pub fn new(decls: &'d DeclTable) -> Self {
        Self {
            decls,
            instance_tables: HashMap::new(),
            singleton_tables: HashMap::new(),
            shapes: HashMap::new(),
            open: None,
            reported: HashSet::new(),
            ill_formed: Vec::new(),
        }
    }

    pub fn decls(&self) -> &'d DeclTable {
        self.decls
    }

    /// The shape of `ty`, built on first request. Types without a structural
    /// view (`untyped`, `top`, `bot`, `void`, unresolved `self`) have none.
    ///
    /// Types mentioning a variable are rebuilt on every request: variables
    /// compare by name, so two `T`s with different bounds share a cache key.
    pub fn shape(&mut self, ty: &Type) -> Option<&mut Shape> {
        if ty.any_type(&|t| matches!(t, Type::Var(_))) {
            self.open = self.build(ty);
            return self.open.as_mut();
        }
        if !self.shapes.contains_key(ty) {
            let built = self.build(ty);
            self.shapes.insert(ty.clone(), built);
        }
        self.shapes.get_mut(ty).and_then(Option::as_mut)
    }

    pub fn method(&mut self, ty: &Type, name: &str) -> Option<Entry> {
        self.shape(ty)?.method(name)
    }

    pub fn method_names(&mut self, ty: &Type) -> Vec<String> {
        self.shape(ty).map(|s| s.methods.names()).unwrap_or_default()
    }

    /// Declaration problems found since the last call.
    pub fn take_ill_formed(&mut self) -> Vec<IllFormed> {
        std::mem::take(&mut self.ill_formed)
    }

    pub fn has_ill_formed(&self) -> bool {
        !self.ill_formed.is_empty()
    }

    /// Reports nominal types in `ty` that have no declaration. Returns false
    /// when any was found.
    pub fn check_known(&mut self, ty: &Type) -> bool {
        let mut unknown = BTreeSet::new();
        collect_unknown(self.decls, ty, &mut unknown);
        for name in &unknown {
            self.report(name, "unknown type".to_string());
        }
        unknown.is_empty()
    }

    fn report(&mut self, type_name: &str, reason: String) {
        if self.reported.insert(type_name.to_string()) {
            warn!(type_name, %reason, "ill-formed declaration; its shape has no known methods");
            self.ill_formed.push(IllFormed { type_name: type_name.to_string(), reason });
        }
    }

    fn build(&mut self, ty: &Type) -> Option<Shape> {
        match ty {
            Type::Instance { name, args } => {
                let table = self.instance_table(name)?;
                let params = self.decls.get(name).map(|d| d.type_params.clone()).unwrap_or_default();
                debug!(ty = %ty, "building shape");
                let subst = Substitution::build(&params, args).with_self(ty.clone());
                Some(Shape {
                    ty: ty.clone(),
                    methods: Methods::shared(table).push_substitution(subst),
                })
            }
            Type::Singleton(name) => {
                let table = self.singleton_table(name)?;
                let subst = Substitution::empty().with_self(ty.clone());
                Some(Shape {
                    ty: ty.clone(),
                    methods: Methods::shared(table).push_substitution(subst),
                })
            }
            Type::Literal(_) | Type::Nil | Type::Bool | Type::Tuple(_) => {
                let back = ty.back_type()?;
                let methods = self.shape(&back)?.methods.clone();
                Some(Shape { ty: ty.clone(), methods })
            }
            Type::Union(members) => self.union_shape(ty, members),
            Type::Intersection(members) => self.intersection_shape(ty, members),
            Type::Proc(method_type) => {
                let mut table = match self.instance_table("Proc") {
                    Some(table) => (*table).clone(),
                    None => MethodTable::new(),
                };
                let entry = MethodEntry::Resolved(Entry::new(vec![(**method_type).clone()]));
                table.insert("call".to_string(), entry.clone());
                table.insert("[]".to_string(), entry);
                Some(Shape { ty: ty.clone(), methods: Methods::new(table) })
            }
            Type::Var(var) => {
                let bound = match &var.bound {
                    Some(bound) => (**bound).clone(),
                    None => Type::named("Object"),
                };
                let methods = self.shape(&bound)?.methods.clone();
                Some(Shape { ty: ty.clone(), methods })
            }
            Type::Any | Type::Top | Type::Bot | Type::Void | Type::SelfType => None,
        }
    }

    fn union_shape(&mut self, ty: &Type, members: &[Type]) -> Option<Shape> {
        let mut per_member: Vec<BTreeMap<String, Entry>> = Vec::new();
        for member in members {
            let shape = self.shape(member)?;
            let mut entries = BTreeMap::new();
            for name in shape.methods.raw_names() {
                if let Some(entry) = shape.method(&name) {
                    entries.insert(name, entry);
                }
            }
            per_member.push(entries);
        }
        let (first, rest) = per_member.split_first()?;
        let mut table = MethodTable::new();
        for name in first.keys() {
            if rest.iter().all(|m| m.contains_key(name)) {
                let entries = per_member.iter().filter_map(|m| m.get(name).cloned()).collect();
                table.insert(name.clone(), MethodEntry::Union(UnionEntry { entries }));
            }
        }
        Some(Shape { ty: ty.clone(), methods: Methods::new(table) })
    }

    fn intersection_shape(&mut self, ty: &Type, members: &[Type]) -> Option<Shape> {
        let mut table: BTreeMap<String, Vec<MethodType>> = BTreeMap::new();
        let mut any_shape = false;
        for member in members {
            let Some(shape) = self.shape(member) else { continue };
            any_shape = true;
            for name in shape.methods.raw_names() {
                if let Some(entry) = shape.method(&name) {
                    let overloads = table.entry(name).or_default();
                    for mt in entry.method_types {
                        if !overloads.contains(&mt) {
                            overloads.push(mt);
                        }
                    }
                }
            }
        }
        if !any_shape {
            return None;
        }
        let table = table
            .into_iter()
            .map(|(name, mts)| (name, MethodEntry::Resolved(Entry::new(mts))))
            .collect();
        Some(Shape { ty: ty.clone(), methods: Methods::new(table) })
    }

    /// Checks the parts of a declaration the shape depends on.
    fn validate(&self, decl: &TypeDecl) -> Result<(), String> {
        let mut seen = BTreeSet::new();
        for ancestor in decl.ancestors.iter() {
            if !seen.insert(ancestor.name.as_str()) {
                return Err(format!("ancestor `{}` appears more than once", ancestor.name));
            }
            let Some(ancestor_decl) = self.decls.get(&ancestor.name) else {
                return Err(format!("unknown ancestor `{}`", ancestor.name));
            };
            if ancestor.args.len() != ancestor_decl.type_params.len() {
                return Err(format!(
                    "ancestor `{}` expects {} type argument(s), got {}",
                    ancestor.name,
                    ancestor_decl.type_params.len(),
                    ancestor.args.len()
                ));
            }
        }
        Ok(())
    }

    /// The instance method table of `name` in terms of its own parameters.
    fn instance_table(&mut self, name: &str) -> Option<Arc<MethodTable>> {
        if let Some(cached) = self.instance_tables.get(name) {
            return cached.clone();
        }
        let table = self.assemble(name, |decl| &decl.methods);
        self.instance_tables.insert(name.to_string(), table.clone());
        table
    }

    fn singleton_table(&mut self, name: &str) -> Option<Arc<MethodTable>> {
        if let Some(cached) = self.singleton_tables.get(name) {
            return cached.clone();
        }
        let table = self.assemble(name, |decl| &decl.singleton_methods).map(|table| {
            let mut table = (*table).clone();
            if let Some(class_table) = self.instance_table("Class") {
                for (method, entry) in class_table.iter() {
                    table.entry(method.clone()).or_insert_with(|| entry.clone());
                }
            }
            if let Some(new) = self.synthesize_new(name) {
                table.insert("new".to_string(), new);
            }
            Arc::new(table)
        });
        self.singleton_tables.insert(name.to_string(), table.clone());
        table
    }

    /// `new` mirrors `initialize`, returning an instance. The class's type
    /// parameters become the method's own. A class declaring its own
    /// singleton `new` keeps it.
    fn synthesize_new(&mut self, name: &str) -> Option<MethodEntry> {
        let decls = self.decls;
        let decl = decls.get(name)?;
        if decl.is_interface() || decl.singleton_methods.contains_key("new") {
            return None;
        }
        let type_params: Vec<TypeParam> = decl.type_params.clone();
        let instance = decl.self_type();
        let initializers = self
            .instance_table(name)
            .and_then(|t| t.get("initialize").cloned());
        let overloads = match initializers {
            Some(MethodEntry::Resolved(entry)) => entry
                .method_types
                .into_iter()
                .map(|mt| MethodType {
                    type_params: type_params.iter().cloned().chain(mt.type_params).collect(),
                    return_type: instance.clone(),
                    ..mt
                })
                .collect(),
            _ => vec![MethodType::new(Params::empty(), instance).with_type_params(type_params)],
        };
        Some(MethodEntry::Resolved(Entry::new(
            overloads
                .into_iter()
                .map(|mt| mt.declared_in(&format!("singleton({name})"), "new"))
                .collect(),
        )))
    }

    /// Walks the ancestor chain most-specific-first. A name found in exactly
    /// one ancestor of the shallowest group defining it becomes an entry;
    /// several equally specific definitions become a union entry.
    fn assemble(
        &mut self,
        name: &str,
        select: impl Fn(&TypeDecl) -> &BTreeMap<String, Vec<MethodType>>,
    ) -> Option<Arc<MethodTable>> {
        let decls = self.decls;
        let Some(decl) = decls.get(name) else {
            self.report(name, "unknown type".to_string());
            return None;
        };
        if let Err(reason) = self.validate(decl) {
            self.report(name, reason);
            return None;
        }

        let mut table = MethodTable::new();
        for group in decl.ancestors.by_depth() {
            let mut found: BTreeMap<String, Vec<Entry>> = BTreeMap::new();
            for ancestor in group {
                let Some(ancestor_decl) = decls.get(&ancestor.name) else { continue };
                let subst = Substitution::build(&ancestor_decl.type_params, &ancestor.args);
                for (method, overloads) in select(ancestor_decl) {
                    if table.contains_key(method) {
                        continue;
                    }
                    let method_types = overloads.iter().map(|m| subst.apply_method(m)).collect();
                    found.entry(method.clone()).or_default().push(Entry::new(method_types));
                }
            }
            for (method, mut entries) in found {
                let entry = if entries.len() == 1 {
                    MethodEntry::Resolved(entries.remove(0))
                } else {
                    MethodEntry::Union(UnionEntry { entries })
                };
                table.insert(method, entry);
            }
        }
        Some(Arc::new(table))
    }
}

fn collect_unknown(decls: &DeclTable, ty: &Type, out: &mut BTreeSet<String>) {
    match ty {
        Type::Instance { name, args } => {
            if !decls.contains(name) {
                out.insert(name.clone());
            }
            args.iter().for_each(|a| collect_unknown(decls, a, out));
        }
        Type::Singleton(name) if !decls.contains(name) => {
            out.insert(name.clone());
        }
        Type::Union(ms) | Type::Intersection(ms) | Type::Tuple(ms) => {
            ms.iter().for_each(|m| collect_unknown(decls, m, out));
        }
        Type::Proc(mt) => {
            mt.params.types().for_each(|t| collect_unknown(decls, t, out));
            collect_unknown(decls, &mt.return_type, out);
        }
        _ => {}
    }
}
