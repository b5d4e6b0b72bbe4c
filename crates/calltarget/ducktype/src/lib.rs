//! Structural proxy compiler.
//!
//! Adapts concrete host types to capability contracts without either side
//! knowing the other at compile time. A concrete type describes itself once
//! through [`Describe`]; a [`Contract`] lists the members a consumer needs.
//! The [`ProxyCache`] compiles, on first use, a forwarding table bridging the
//! two and hands out borrowed [`Adapter`] views over concrete instances.
//!
//! ```ignore
//! let has_status = Contract::builder("HasStatusCode")
//!     .property("StatusCode", Shape::int())
//!     .build();
//! let cache = ProxyCache::new();
//! let adapter = cache.create(&has_status, &response)?;
//! assert_eq!(adapter.get("StatusCode")?.as_int(), Some(200));
//! ```

#![deny(unsafe_code)]

pub mod adapter;
pub mod cache;
pub mod compiler;
pub mod contract;
pub mod descriptor;
pub mod error;
pub mod resolver;
pub mod value;

pub use adapter::Adapter;
pub use cache::{ProxyCache, ProxyCacheStats, ProxyResult};
pub use compiler::ProxyDescriptor;
pub use contract::{Contract, ContractBuilder, ContractMember, ContractRef, Requirement, Shape};
pub use descriptor::{
    Describe, Member, MemberKind, MethodAccessor, Primitive, PropertyAccessor, RecordBuilder,
    Reflect, TypeDescriptor, TypeKind, TypeRef, TypeThunk,
};
pub use error::{AccessError, MemberResolutionError, ProxyCompilationError, ResolutionFailure};
pub use resolver::{DescriptorResolver, Fit, MemberForm, ResolvedMember, TypeResolver};
pub use value::{EnumValue, Value};
