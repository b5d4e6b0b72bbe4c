//! Error types for proxy compilation and adapter access.

use thiserror::Error;

/// Why a contract member could not be bound to the concrete type.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ResolutionFailure {
    #[error("no member with this name")]
    Missing,

    #[error("expected a {expected}, found a {found}")]
    WrongForm {
        expected: &'static str,
        found: &'static str,
    },

    #[error("expected {expected}, found {found}")]
    Incompatible { expected: String, found: String },

    #[error("no overload takes {arity} parameter(s) matching ({expected})")]
    NoOverload { arity: usize, expected: String },

    #[error("nested contract cannot be satisfied: {0}")]
    Nested(Box<MemberResolutionError>),
}

/// A contract member that the concrete type does not satisfy.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("member `{member}` of contract `{contract}` is not satisfied by `{concrete}`: {failure}")]
pub struct MemberResolutionError {
    pub contract: String,
    pub concrete: String,
    pub member: String,
    pub failure: ResolutionFailure,
}

/// Proxy compilation failure. Cached per (contract, concrete) pair.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProxyCompilationError {
    #[error("proxy compilation failed: {0}")]
    MemberResolution(#[from] MemberResolutionError),
}

impl ProxyCompilationError {
    fn resolution(&self) -> &MemberResolutionError {
        match self {
            ProxyCompilationError::MemberResolution(err) => err,
        }
    }

    /// Name of the first contract member that failed to resolve.
    pub fn member(&self) -> &str {
        &self.resolution().member
    }

    pub fn contract(&self) -> &str {
        &self.resolution().contract
    }

    pub fn concrete(&self) -> &str {
        &self.resolution().concrete
    }
}

/// Failure while reading or invoking a member through an adapter.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum AccessError {
    #[error("contract `{contract}` has no member `{member}`")]
    UnknownMember { contract: String, member: String },

    #[error("member `{member}` is a {found}, not a {expected}")]
    WrongForm {
        member: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("member `{member}` takes {expected} argument(s), got {found}")]
    Arity {
        member: String,
        expected: usize,
        found: usize,
    },

    #[error("no overload of `{member}` accepts ({found}); declared: {expected}")]
    NoOverload {
        member: String,
        expected: String,
        found: String,
    },

    #[error("expected an instance of `{expected}`, found `{found}`")]
    TypeMismatch { expected: String, found: String },

    #[error("invalid argument at position {position}: {reason}")]
    InvalidArgument { position: usize, reason: String },

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Unresolved(#[from] ProxyCompilationError),

    #[error("proxy cache dropped before nested contract `{contract}` was linked")]
    CacheDropped { contract: String },
}
