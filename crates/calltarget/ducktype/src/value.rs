//! Dynamic values produced by member access on described types.

use std::borrow::Cow;
use std::fmt;

use crate::adapter::Adapter;
use crate::descriptor::{Describe, Reflect};

/// An enum value as seen through a descriptor.
///
/// Enum-to-enum adaptation passes values through unchanged; the contract side
/// reads the variant label or the discriminant, whichever it understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EnumValue {
    /// Variant label as declared on the concrete enum.
    pub variant: &'static str,
    /// Numeric discriminant.
    pub discriminant: i64,
}

impl EnumValue {
    pub const fn new(variant: &'static str, discriminant: i64) -> Self {
        Self {
            variant,
            discriminant,
        }
    }
}

/// A value read from a concrete instance, borrowed for `'a`.
///
/// Integers of every width are normalized to `Int`, floats to `Float`.
/// Object-typed members are exposed by reference; members whose contract
/// shape is itself a contract come back as `Proxy`.
#[derive(Clone)]
pub enum Value<'a> {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Cow<'a, str>),
    Enum(EnumValue),
    Object(&'a dyn Reflect),
    Proxy(Adapter<'a>),
}

impl<'a> Value<'a> {
    pub fn is_unit(&self) -> bool {
        matches!(self, Value::Unit)
    }

    pub fn is_proxy(&self) -> bool {
        matches!(self, Value::Proxy(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Enum(e) => Some(e.discriminant),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_ref()),
            Value::Enum(e) => Some(e.variant),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<EnumValue> {
        match self {
            Value::Enum(e) => Some(*e),
            _ => None,
        }
    }

    /// The referenced instance, looking through adapters.
    pub fn as_object(&self) -> Option<&'a dyn Reflect> {
        match self {
            Value::Object(obj) => Some(*obj),
            Value::Proxy(adapter) => Some(adapter.instance()),
            _ => None,
        }
    }

    pub fn as_proxy(&self) -> Option<&Adapter<'a>> {
        match self {
            Value::Proxy(adapter) => Some(adapter),
            _ => None,
        }
    }

    pub fn into_proxy(self) -> Option<Adapter<'a>> {
        match self {
            Value::Proxy(adapter) => Some(adapter),
            _ => None,
        }
    }

    /// Downcast a referenced instance to its concrete type.
    pub fn downcast_ref<T: Describe>(&self) -> Option<&'a T> {
        self.as_object().and_then(|obj| obj.downcast_ref::<T>())
    }

    /// Replace an adapter by the instance it wraps. Used when a contract-typed
    /// value is handed back to a concrete member.
    pub fn unwrap_proxy(&self) -> Value<'a> {
        match self {
            Value::Proxy(adapter) => Value::Object(adapter.instance()),
            other => other.clone(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Enum(_) => "enum",
            Value::Object(_) => "object",
            Value::Proxy(_) => "proxy",
        }
    }
}

impl fmt::Debug for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => f.write_str("Unit"),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Int(i) => f.debug_tuple("Int").field(i).finish(),
            Value::Float(x) => f.debug_tuple("Float").field(x).finish(),
            Value::Str(s) => f.debug_tuple("Str").field(s).finish(),
            Value::Enum(e) => f.debug_tuple("Enum").field(e).finish(),
            Value::Object(obj) => f
                .debug_tuple("Object")
                .field(&obj.type_descriptor().name())
                .finish(),
            Value::Proxy(adapter) => f.debug_tuple("Proxy").field(adapter).finish(),
        }
    }
}

macro_rules! int_values {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value<'_> {
                fn from(value: $ty) -> Self {
                    Value::Int(i64::from(value))
                }
            }
        )*
    };
}

int_values!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for Value<'_> {
    fn from(value: u64) -> Self {
        Value::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<usize> for Value<'_> {
    fn from(value: usize) -> Self {
        Value::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<bool> for Value<'_> {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f32> for Value<'_> {
    fn from(value: f32) -> Self {
        Value::Float(f64::from(value))
    }
}

impl From<f64> for Value<'_> {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl<'a> From<&'a str> for Value<'a> {
    fn from(value: &'a str) -> Self {
        Value::Str(Cow::Borrowed(value))
    }
}

impl<'a> From<&'a String> for Value<'a> {
    fn from(value: &'a String) -> Self {
        Value::Str(Cow::Borrowed(value.as_str()))
    }
}

impl From<String> for Value<'_> {
    fn from(value: String) -> Self {
        Value::Str(Cow::Owned(value))
    }
}

impl From<EnumValue> for Value<'_> {
    fn from(value: EnumValue) -> Self {
        Value::Enum(value)
    }
}

impl<'a, T> From<Option<T>> for Value<'a>
where
    T: Into<Value<'a>>,
{
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Unit)
    }
}
