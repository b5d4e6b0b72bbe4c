//! Member resolution and shape matching.
//!
//! The resolver turns a type descriptor into a flat, ordered member list.
//! Matching ranks how well a concrete member type fits a contract shape so the
//! compiler can pick the closest overload.

use std::sync::Arc;

use crate::contract::{ContractRef, Shape};
use crate::descriptor::{MemberKind, Primitive, Reflect, TypeDescriptor, TypeKind, TypeRef};
use crate::value::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberForm {
    Property,
    Method,
}

impl MemberForm {
    pub fn as_str(self) -> &'static str {
        match self {
            MemberForm::Property => "property",
            MemberForm::Method => "method",
        }
    }
}

/// One member of a concrete type, with its types evaluated.
#[derive(Clone, Debug)]
pub struct ResolvedMember {
    /// Position in the descriptor's member list.
    pub index: usize,
    pub name: String,
    pub form: MemberForm,
    /// Parameter types; empty for properties.
    pub params: Vec<TypeRef>,
    /// Property type, or method return type.
    pub ret: TypeRef,
}

/// Produces the ordered member list of a concrete type.
pub trait TypeResolver: Send + Sync {
    fn resolve(&self, ty: &TypeRef) -> Vec<ResolvedMember>;
}

/// Resolves members straight from the type's descriptor.
#[derive(Clone, Copy, Debug, Default)]
pub struct DescriptorResolver;

impl TypeResolver for DescriptorResolver {
    fn resolve(&self, ty: &TypeRef) -> Vec<ResolvedMember> {
        ty.members()
            .iter()
            .enumerate()
            .map(|(index, member)| match member.kind() {
                MemberKind::Property { ty, .. } => ResolvedMember {
                    index,
                    name: member.name().to_string(),
                    form: MemberForm::Property,
                    params: Vec::new(),
                    ret: ty(),
                },
                MemberKind::Method { params, ret, .. } => ResolvedMember {
                    index,
                    name: member.name().to_string(),
                    form: MemberForm::Method,
                    params: params.iter().map(|p| p()).collect(),
                    ret: ret(),
                },
            })
            .collect()
    }
}

/// How closely a type fits a shape. Higher is better.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Fit {
    /// Matched only through `Shape::Any`, or an adapter handed back to a
    /// concrete parameter.
    Loose = 0,
    /// Matched after normalization: optional wrapping, enum-to-enum, int to
    /// float, or a nested contract.
    Converted = 1,
    Exact = 2,
}

/// Outcome of matching a member type against a shape.
#[derive(Clone, Debug)]
pub struct Match {
    pub fit: Fit,
    /// Set when the value must be exposed through a nested adapter:
    /// the nested contract and the concrete type it wraps.
    pub nested: Option<(ContractRef, TypeRef)>,
}

impl Match {
    fn direct(fit: Fit) -> Self {
        Self { fit, nested: None }
    }
}

/// Whether a value of type `ty` can be exposed where `shape` is expected.
/// `this` stands in for [`Shape::This`].
pub fn accepts(shape: &Shape, ty: &TypeRef, this: &ContractRef) -> Option<Match> {
    match shape {
        Shape::Any => Some(Match::direct(Fit::Loose)),
        Shape::Primitive(p) => match (ty.primitive_kind(), ty.optional_inner()) {
            (Some(actual), _) if actual == *p => Some(Match::direct(Fit::Exact)),
            (Some(Primitive::Int), _) if *p == Primitive::Float => {
                Some(Match::direct(Fit::Converted))
            }
            (None, Some(inner)) if inner.primitive_kind() == Some(*p) => {
                Some(Match::direct(Fit::Converted))
            }
            _ => None,
        },
        Shape::Enum => ty.is_enum().then(|| Match::direct(Fit::Converted)),
        Shape::Type(expected) => {
            if expected.type_id() == ty.type_id() {
                Some(Match::direct(Fit::Exact))
            } else if expected.is_assignable_from(ty) {
                Some(Match::direct(Fit::Converted))
            } else {
                None
            }
        }
        Shape::Contract(contract) => nested(contract, ty),
        Shape::This => nested(this, ty),
    }
}

fn nested(contract: &ContractRef, ty: &TypeRef) -> Option<Match> {
    let backing = match ty.kind() {
        TypeKind::Record(_) | TypeKind::Opaque => Arc::clone(ty),
        TypeKind::Optional(inner) => {
            let inner = inner();
            match inner.kind() {
                TypeKind::Record(_) | TypeKind::Opaque => inner,
                _ => return None,
            }
        }
        _ => return None,
    };
    Some(Match {
        fit: Fit::Converted,
        nested: Some((Arc::clone(contract), backing)),
    })
}

/// Whether a concrete parameter of type `param` can receive a value the
/// contract describes as `shape`. Parameters match contravariantly.
pub fn param_accepts(param: &TypeDescriptor, shape: &Shape) -> Option<Fit> {
    match shape {
        Shape::Any => Some(Fit::Loose),
        Shape::Primitive(p) => {
            if param.primitive_kind() == Some(*p) {
                Some(Fit::Exact)
            } else if param
                .optional_inner()
                .is_some_and(|inner| inner.primitive_kind() == Some(*p))
            {
                Some(Fit::Converted)
            } else {
                None
            }
        }
        Shape::Enum => param.is_enum().then_some(Fit::Converted),
        Shape::Type(given) => {
            if param.type_id() == given.type_id() {
                Some(Fit::Exact)
            } else if param.is_assignable_from(given) {
                Some(Fit::Converted)
            } else {
                None
            }
        }
        // Adapters are unwrapped to their instance before the call; the
        // instance type is only known at run time.
        Shape::Contract(_) | Shape::This => match param.kind() {
            TypeKind::Record(_) | TypeKind::Opaque | TypeKind::Optional(_) => Some(Fit::Loose),
            _ => None,
        },
    }
}

/// Whether a runtime argument can be passed where `shape` is declared. Used to
/// route a call between same-arity overloads of one contract member.
pub fn value_accepts(shape: &Shape, value: &Value<'_>) -> Option<Fit> {
    match shape {
        Shape::Any => Some(Fit::Loose),
        Shape::Primitive(p) => primitive_accepts(*p, value),
        Shape::Enum => matches!(value, Value::Enum(_)).then_some(Fit::Converted),
        Shape::Type(expected) => {
            if let Some(p) = expected.primitive_kind() {
                return primitive_accepts(p, value);
            }
            if let Some(inner) = expected.optional_inner() {
                return match value {
                    Value::Unit => Some(Fit::Converted),
                    other => value_accepts(&Shape::Type(inner), other).map(|_| Fit::Converted),
                };
            }
            match value {
                Value::Enum(_) if expected.is_enum() => Some(Fit::Converted),
                Value::Object(obj) => object_fit(expected, &obj.type_descriptor()),
                Value::Proxy(adapter) => {
                    object_fit(expected, &adapter.instance().type_descriptor()).map(|_| Fit::Loose)
                }
                _ => None,
            }
        }
        Shape::Contract(_) | Shape::This => match value {
            Value::Object(_) | Value::Proxy(_) => Some(Fit::Converted),
            _ => None,
        },
    }
}

fn primitive_accepts(expected: Primitive, value: &Value<'_>) -> Option<Fit> {
    match (expected, value) {
        (Primitive::Unit, Value::Unit)
        | (Primitive::Bool, Value::Bool(_))
        | (Primitive::Int, Value::Int(_))
        | (Primitive::Float, Value::Float(_))
        | (Primitive::Str, Value::Str(_)) => Some(Fit::Exact),
        (Primitive::Float, Value::Int(_)) => Some(Fit::Converted),
        _ => None,
    }
}

fn object_fit(expected: &TypeDescriptor, actual: &TypeDescriptor) -> Option<Fit> {
    if expected.type_id() == actual.type_id() {
        Some(Fit::Exact)
    } else if expected.is_assignable_from(actual) {
        Some(Fit::Converted)
    } else {
        None
    }
}
