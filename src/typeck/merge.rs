use std::collections::BTreeMap;

use super::types::{BlockType, MethodType, Params, Type};

/// Merges two signatures into one that accepts what either accepts and may
/// return what either returns.
///
/// Both inputs must have the same arity shape (required, optional, rest and
/// keyword structure, block presence); otherwise there is no merge.
pub fn union_method_types(m1: &MethodType, m2: &MethodType) -> Option<MethodType> {
    if m1 == m2 {
        let mut merged = m1.clone();
        merged.decls.extend(m2.decls.iter().cloned());
        return Some(merged);
    }

    if !m1.params.same_shape(&m2.params) {
        return None;
    }
    let same_generics = m1.type_params.len() == m2.type_params.len()
        && m1
            .type_params
            .iter()
            .zip(&m2.type_params)
            .all(|(a, b)| a.name == b.name);
    if !same_generics {
        return None;
    }

    let block = match (&m1.block, &m2.block) {
        (None, None) => None,
        (Some(b1), Some(b2)) if b1.required == b2.required && b1.params.same_shape(&b2.params) => {
            Some(BlockType {
                required: b1.required,
                params: union_params(&b1.params, &b2.params),
                return_type: Type::union([b1.return_type.clone(), b2.return_type.clone()]),
            })
        }
        _ => return None,
    };

    let mut decls = m1.decls.clone();
    decls.extend(m2.decls.iter().cloned());

    Some(MethodType {
        type_params: m1.type_params.clone(),
        params: union_params(&m1.params, &m2.params),
        block,
        return_type: Type::union([m1.return_type.clone(), m2.return_type.clone()]),
        decls,
    })
}

/// Position-wise union of two same-shaped parameter lists.
fn union_params(p1: &Params, p2: &Params) -> Params {
    let pairwise = |a: &[Type], b: &[Type]| -> Vec<Type> {
        a.iter()
            .zip(b)
            .map(|(x, y)| Type::union([x.clone(), y.clone()]))
            .collect()
    };
    let optional_pair = |a: &Option<Type>, b: &Option<Type>| match (a, b) {
        (Some(x), Some(y)) => Some(Type::union([x.clone(), y.clone()])),
        _ => None,
    };
    let keywords = |a: &BTreeMap<String, Type>, b: &BTreeMap<String, Type>| -> BTreeMap<String, Type> {
        a.iter()
            .filter_map(|(name, x)| {
                b.get(name)
                    .map(|y| (name.clone(), Type::union([x.clone(), y.clone()])))
            })
            .collect()
    };

    Params {
        required: pairwise(&p1.required, &p2.required),
        optional: pairwise(&p1.optional, &p2.optional),
        rest: optional_pair(&p1.rest, &p2.rest),
        required_keywords: keywords(&p1.required_keywords, &p2.required_keywords),
        optional_keywords: keywords(&p1.optional_keywords, &p2.optional_keywords),
        rest_keywords: optional_pair(&p1.rest_keywords, &p2.rest_keywords),
    }
}
