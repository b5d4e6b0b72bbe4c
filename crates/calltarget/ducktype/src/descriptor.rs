//! Type descriptors: the runtime view of a concrete host type.
//!
//! A concrete type opts in by implementing [`Describe`], which yields a
//! process-lifetime [`TypeDescriptor`]. Every `Describe` type is also
//! [`Reflect`], the object-safe view used wherever the concrete type is only
//! known at run time.
//!
//! Member types are recorded as `fn() -> TypeRef` thunks so a record may refer
//! to itself (linked structures) without re-entering its own descriptor while
//! it is being built.

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

use crate::error::AccessError;
use crate::value::{EnumValue, Value};

/// Shared handle to a type descriptor.
pub type TypeRef = Arc<TypeDescriptor>;

/// Lazily evaluated type reference.
pub type TypeThunk = fn() -> TypeRef;

/// Primitive value categories. All integer widths collapse into `Int`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    Unit,
    Bool,
    Int,
    Float,
    Str,
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Primitive::Unit => "unit",
            Primitive::Bool => "bool",
            Primitive::Int => "int",
            Primitive::Float => "float",
            Primitive::Str => "str",
        };
        f.write_str(name)
    }
}

/// Object-safe runtime view of a described value.
pub trait Reflect: Any + Send + Sync {
    fn type_descriptor(&self) -> TypeRef;
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync>;
}

/// Implemented by every concrete type that can take part in adaptation.
pub trait Describe: Any + Send + Sync + Sized {
    fn describe() -> TypeRef;
}

impl<T: Describe> Reflect for T {
    fn type_descriptor(&self) -> TypeRef {
        T::describe()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync> {
        self
    }
}

impl dyn Reflect {
    /// `TypeId` of the concrete value behind the trait object.
    pub fn concrete_type_id(&self) -> TypeId {
        self.as_any().type_id()
    }

    pub fn is<T: Describe>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Describe>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

impl fmt::Debug for dyn Reflect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.type_descriptor().name())
    }
}

/// Reads a property from an instance of the owning type.
pub trait PropertyAccessor: Send + Sync {
    fn read<'a>(&self, target: &'a dyn Reflect) -> Result<Value<'a>, AccessError>;
}

/// Invokes a method on an instance of the owning type.
pub trait MethodAccessor: Send + Sync {
    fn invoke<'a>(
        &self,
        target: &'a dyn Reflect,
        args: &[Value<'_>],
    ) -> Result<Value<'a>, AccessError>;
}

fn downcast_target<'a, T: Describe>(target: &'a dyn Reflect) -> Result<&'a T, AccessError> {
    target
        .downcast_ref::<T>()
        .ok_or_else(|| AccessError::TypeMismatch {
            expected: T::describe().name().to_string(),
            found: target.type_descriptor().name().to_string(),
        })
}

struct FieldReader<T, F> {
    read: F,
    _target: PhantomData<fn(&T)>,
}

impl<T, F> PropertyAccessor for FieldReader<T, F>
where
    T: Describe,
    F: for<'a> Fn(&'a T) -> Value<'a> + Send + Sync,
{
    fn read<'a>(&self, target: &'a dyn Reflect) -> Result<Value<'a>, AccessError> {
        let target = downcast_target::<T>(target)?;
        Ok((self.read)(target))
    }
}

struct MethodInvoker<T, F> {
    invoke: F,
    _target: PhantomData<fn(&T)>,
}

impl<T, F> MethodAccessor for MethodInvoker<T, F>
where
    T: Describe,
    F: for<'a> Fn(&'a T, &[Value<'_>]) -> Result<Value<'a>, AccessError> + Send + Sync,
{
    fn invoke<'a>(
        &self,
        target: &'a dyn Reflect,
        args: &[Value<'_>],
    ) -> Result<Value<'a>, AccessError> {
        let target = downcast_target::<T>(target)?;
        (self.invoke)(target, args)
    }
}

/// A named member of a record type.
#[derive(Clone)]
pub struct Member {
    name: String,
    kind: MemberKind,
}

#[derive(Clone)]
pub enum MemberKind {
    Property {
        ty: TypeThunk,
        accessor: Arc<dyn PropertyAccessor>,
    },
    Method {
        params: Vec<TypeThunk>,
        ret: TypeThunk,
        accessor: Arc<dyn MethodAccessor>,
    },
}

impl Member {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &MemberKind {
        &self.kind
    }

    pub fn is_property(&self) -> bool {
        matches!(self.kind, MemberKind::Property { .. })
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            MemberKind::Property { ty, .. } => f
                .debug_struct("Property")
                .field("name", &self.name)
                .field("ty", &ty().name())
                .finish(),
            MemberKind::Method { params, ret, .. } => f
                .debug_struct("Method")
                .field("name", &self.name)
                .field("arity", &params.len())
                .field("ret", &ret().name())
                .finish(),
        }
    }
}

/// Shape of a concrete type.
#[derive(Clone)]
pub enum TypeKind {
    Primitive(Primitive),
    Enum(Vec<EnumValue>),
    /// Nullable wrapper around another type.
    Optional(TypeThunk),
    Record(Vec<Member>),
    Opaque,
}

impl fmt::Debug for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeKind::Primitive(p) => f.debug_tuple("Primitive").field(p).finish(),
            TypeKind::Enum(variants) => f.debug_tuple("Enum").field(variants).finish(),
            TypeKind::Optional(inner) => f.debug_tuple("Optional").field(&inner().name()).finish(),
            TypeKind::Record(members) => f.debug_tuple("Record").field(members).finish(),
            TypeKind::Opaque => f.write_str("Opaque"),
        }
    }
}

/// Runtime description of one concrete type.
pub struct TypeDescriptor {
    name: String,
    type_id: TypeId,
    kind: TypeKind,
}

impl TypeDescriptor {
    pub fn primitive<T: Any>(name: impl Into<String>, primitive: Primitive) -> TypeRef {
        Self::with_kind::<T>(name, TypeKind::Primitive(primitive))
    }

    pub fn enumeration<T: Any>(name: impl Into<String>, variants: &[(&'static str, i64)]) -> TypeRef {
        let variants = variants
            .iter()
            .map(|&(label, discriminant)| EnumValue::new(label, discriminant))
            .collect();
        Self::with_kind::<T>(name, TypeKind::Enum(variants))
    }

    pub fn optional<T: Any>(name: impl Into<String>, inner: TypeThunk) -> TypeRef {
        Self::with_kind::<T>(name, TypeKind::Optional(inner))
    }

    pub fn opaque<T: Any>(name: impl Into<String>) -> TypeRef {
        Self::with_kind::<T>(name, TypeKind::Opaque)
    }

    /// Start describing a record type.
    pub fn record<T: Describe>(name: impl Into<String>) -> RecordBuilder<T> {
        RecordBuilder {
            name: name.into(),
            members: Vec::new(),
            _target: PhantomData,
        }
    }

    fn with_kind<T: Any>(name: impl Into<String>, kind: TypeKind) -> TypeRef {
        Arc::new(Self {
            name: name.into(),
            type_id: TypeId::of::<T>(),
            kind,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    /// Declared members; empty for non-record kinds.
    pub fn members(&self) -> &[Member] {
        match &self.kind {
            TypeKind::Record(members) => members,
            _ => &[],
        }
    }

    pub fn primitive_kind(&self) -> Option<Primitive> {
        match self.kind {
            TypeKind::Primitive(p) => Some(p),
            _ => None,
        }
    }

    pub fn is_enum(&self) -> bool {
        matches!(self.kind, TypeKind::Enum(_))
    }

    /// Inner type of an optional, if this is one.
    pub fn optional_inner(&self) -> Option<TypeRef> {
        match self.kind {
            TypeKind::Optional(inner) => Some(inner()),
            _ => None,
        }
    }

    /// Whether a value of `source` may stand where `self` is expected:
    /// same type, `Optional(T)` from `T`, or any enum into an enum.
    pub fn is_assignable_from(&self, source: &TypeDescriptor) -> bool {
        if self.type_id == source.type_id {
            return true;
        }
        match &self.kind {
            TypeKind::Optional(inner) => inner().is_assignable_from(source),
            TypeKind::Enum(_) => source.is_enum(),
            _ => false,
        }
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for TypeDescriptor {}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Builder for record descriptors, typed on the record so accessors can
/// borrow fields directly.
pub struct RecordBuilder<T> {
    name: String,
    members: Vec<Member>,
    _target: PhantomData<fn(&T)>,
}

impl<T: Describe> RecordBuilder<T> {
    pub fn property<F>(mut self, name: impl Into<String>, ty: TypeThunk, read: F) -> Self
    where
        F: for<'a> Fn(&'a T) -> Value<'a> + Send + Sync + 'static,
    {
        self.members.push(Member {
            name: name.into(),
            kind: MemberKind::Property {
                ty,
                accessor: Arc::new(FieldReader {
                    read,
                    _target: PhantomData,
                }),
            },
        });
        self
    }

    pub fn method<F>(
        mut self,
        name: impl Into<String>,
        params: &[TypeThunk],
        ret: TypeThunk,
        invoke: F,
    ) -> Self
    where
        F: for<'a> Fn(&'a T, &[Value<'_>]) -> Result<Value<'a>, AccessError>
            + Send
            + Sync
            + 'static,
    {
        self.members.push(Member {
            name: name.into(),
            kind: MemberKind::Method {
                params: params.to_vec(),
                ret,
                accessor: Arc::new(MethodInvoker {
                    invoke,
                    _target: PhantomData,
                }),
            },
        });
        self
    }

    pub fn build(self) -> TypeRef {
        TypeDescriptor::with_kind::<T>(self.name, TypeKind::Record(self.members))
    }
}

macro_rules! primitive_descriptors {
    ($($ty:ty => $name:literal, $prim:ident;)*) => {
        $(
            impl Describe for $ty {
                fn describe() -> TypeRef {
                    static DESCRIPTOR: OnceLock<TypeRef> = OnceLock::new();
                    DESCRIPTOR
                        .get_or_init(|| TypeDescriptor::primitive::<$ty>($name, Primitive::$prim))
                        .clone()
                }
            }
        )*
    };
}

primitive_descriptors! {
    () => "()", Unit;
    bool => "bool", Bool;
    i8 => "i8", Int;
    i16 => "i16", Int;
    i32 => "i32", Int;
    i64 => "i64", Int;
    u8 => "u8", Int;
    u16 => "u16", Int;
    u32 => "u32", Int;
    u64 => "u64", Int;
    usize => "usize", Int;
    f32 => "f32", Float;
    f64 => "f64", Float;
    String => "String", Str;
    &'static str => "&str", Str;
}

impl Describe for Option<String> {
    fn describe() -> TypeRef {
        static DESCRIPTOR: OnceLock<TypeRef> = OnceLock::new();
        DESCRIPTOR
            .get_or_init(|| TypeDescriptor::optional::<Option<String>>("Option<String>", String::describe))
            .clone()
    }
}

fn str_argument<'v>(args: &'v [Value<'_>], position: usize) -> Result<&'v str, AccessError> {
    args.get(position)
        .and_then(Value::as_str)
        .ok_or_else(|| AccessError::InvalidArgument {
            position,
            reason: "expected a string".to_string(),
        })
}

macro_rules! string_map_descriptor {
    ($ty:ty, $name:literal) => {
        impl Describe for $ty {
            fn describe() -> TypeRef {
                static DESCRIPTOR: OnceLock<TypeRef> = OnceLock::new();
                DESCRIPTOR
                    .get_or_init(|| {
                        TypeDescriptor::record::<$ty>($name)
                            .property("Count", usize::describe, |map| Value::from(map.len()))
                            .method(
                                "Get",
                                &[String::describe],
                                <Option<String>>::describe,
                                |map, args| Ok(Value::from(map.get(str_argument(args, 0)?))),
                            )
                            .method(
                                "ContainsKey",
                                &[String::describe],
                                bool::describe,
                                |map, args| Ok(Value::from(map.contains_key(str_argument(args, 0)?))),
                            )
                            .build()
                    })
                    .clone()
            }
        }
    };
}

string_map_descriptor!(HashMap<String, String>, "HashMap<String, String>");
string_map_descriptor!(BTreeMap<String, String>, "BTreeMap<String, String>");

impl Describe for Vec<String> {
    fn describe() -> TypeRef {
        static DESCRIPTOR: OnceLock<TypeRef> = OnceLock::new();
        DESCRIPTOR
            .get_or_init(|| {
                TypeDescriptor::record::<Vec<String>>("Vec<String>")
                    .property("Count", usize::describe, |items| Value::from(items.len()))
                    .method("Get", &[i64::describe], <Option<String>>::describe, |items, args| {
                        let index = args
                            .first()
                            .and_then(Value::as_int)
                            .and_then(|i| usize::try_from(i).ok())
                            .ok_or_else(|| AccessError::InvalidArgument {
                                position: 0,
                                reason: "expected a non-negative index".to_string(),
                            })?;
                        Ok(Value::from(items.get(index)))
                    })
                    .method("Contains", &[String::describe], bool::describe, |items, args| {
                        let needle = str_argument(args, 0)?;
                        Ok(Value::from(items.iter().any(|item| item == needle)))
                    })
                    .build()
            })
            .clone()
    }
}
