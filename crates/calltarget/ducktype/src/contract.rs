//! Capability contracts: named, ordered member requirements that a concrete
//! type must satisfy to be adapted.

use std::fmt;
use std::sync::Arc;

use crate::descriptor::{Describe, Primitive, TypeRef};

pub type ContractRef = Arc<Contract>;

/// What a contract expects of a member's type.
#[derive(Clone)]
pub enum Shape {
    /// Anything; the value is passed through unchanged.
    Any,
    Primitive(Primitive),
    /// Any enum; values pass through by label and discriminant.
    Enum,
    /// A specific concrete type.
    Type(TypeRef),
    /// Another contract; the value is exposed as a nested adapter.
    Contract(ContractRef),
    /// The contract being declared. Allows linked structures.
    This,
}

impl Shape {
    pub fn unit() -> Self {
        Shape::Primitive(Primitive::Unit)
    }

    pub fn bool() -> Self {
        Shape::Primitive(Primitive::Bool)
    }

    pub fn int() -> Self {
        Shape::Primitive(Primitive::Int)
    }

    pub fn float() -> Self {
        Shape::Primitive(Primitive::Float)
    }

    pub fn string() -> Self {
        Shape::Primitive(Primitive::Str)
    }

    pub fn of<T: Describe>() -> Self {
        Shape::Type(T::describe())
    }

    pub fn contract(contract: &ContractRef) -> Self {
        Shape::Contract(Arc::clone(contract))
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Any => f.write_str("any"),
            Shape::Primitive(p) => p.fmt(f),
            Shape::Enum => f.write_str("enum"),
            Shape::Type(ty) => f.write_str(ty.name()),
            Shape::Contract(c) => write!(f, "contract {}", c.name()),
            Shape::This => f.write_str("contract Self"),
        }
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[derive(Clone, Debug)]
pub enum Requirement {
    Property(Shape),
    Method { params: Vec<Shape>, ret: Shape },
}

impl Requirement {
    pub fn form(&self) -> &'static str {
        match self {
            Requirement::Property(_) => "property",
            Requirement::Method { .. } => "method",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ContractMember {
    name: String,
    requirement: Requirement,
}

impl ContractMember {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn requirement(&self) -> &Requirement {
        &self.requirement
    }
}

/// A capability contract. Identity is the `Arc` allocation, not the name.
#[derive(Debug)]
pub struct Contract {
    name: String,
    members: Vec<ContractMember>,
}

impl Contract {
    pub fn builder(name: impl Into<String>) -> ContractBuilder {
        ContractBuilder {
            name: name.into(),
            members: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &[ContractMember] {
        &self.members
    }

    pub fn member(&self, name: &str) -> Option<&ContractMember> {
        self.members.iter().find(|m| m.name == name)
    }
}

impl fmt::Display for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

pub struct ContractBuilder {
    name: String,
    members: Vec<ContractMember>,
}

impl ContractBuilder {
    pub fn property(mut self, name: impl Into<String>, shape: Shape) -> Self {
        self.members.push(ContractMember {
            name: name.into(),
            requirement: Requirement::Property(shape),
        });
        self
    }

    pub fn method(mut self, name: impl Into<String>, params: Vec<Shape>, ret: Shape) -> Self {
        self.members.push(ContractMember {
            name: name.into(),
            requirement: Requirement::Method { params, ret },
        });
        self
    }

    pub fn build(self) -> ContractRef {
        Arc::new(Contract {
            name: self.name,
            members: self.members,
        })
    }
}
