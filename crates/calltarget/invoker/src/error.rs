//! Error types for dispatch compilation, adaptation and hook execution.

use calltarget_ducktype::{AccessError, ProxyCompilationError};
use thiserror::Error;

use crate::hook::HookKind;

/// A hook signature that cannot be bound to a call site.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DispatchBuildError {
    #[error("integration `{integration}` has no {kind} hook")]
    MissingHook { integration: String, kind: HookKind },

    #[error("{kind} hook declares no generic slot for the instance type")]
    MissingInstanceSlot { kind: HookKind },

    #[error("{kind} hook declares {found} generic slot(s), expected {expected}")]
    GenericSlotCount {
        kind: HookKind,
        expected: &'static str,
        found: usize,
    },

    #[error("{kind} hook takes {found} parameter(s), at least {min} required")]
    TooFewParameters {
        kind: HookKind,
        min: usize,
        found: usize,
    },

    #[error("{kind} hook takes {found} parameter(s), at most {max} allowed")]
    TooManyParameters {
        kind: HookKind,
        max: usize,
        found: usize,
    },

    #[error("first parameter of the {kind} hook must be generic slot 0 (the instance)")]
    InstanceParameterMismatch { kind: HookKind },

    #[error("parameter {position} refers to undeclared generic slot {slot}")]
    UnknownGenericSlot { position: usize, slot: usize },

    #[error("parameter {position} of the {kind} hook cannot be {param}")]
    UnexpectedParameter {
        kind: HookKind,
        position: usize,
        param: &'static str,
    },

    #[error("parameter {position}: `{found}` is not assignable to `{expected}`")]
    Unassignable {
        position: usize,
        expected: String,
        found: String,
    },

    #[error("parameter {position} of the {kind} hook must be the exception parameter")]
    MissingExceptionParameter { kind: HookKind, position: usize },

    #[error("parameter {position} of the {kind} hook must be the state parameter")]
    MissingStateParameter { kind: HookKind, position: usize },

    #[error("return parameter must be generic slot 1 or the return type `{expected}`")]
    InvalidReturnParameter { expected: String },

    #[error("generic slot `{slot}` bound to both `{first}` and `{second}`")]
    ConflictingGenericBinding {
        slot: String,
        first: String,
        second: String,
    },
}

/// Any failure to adapt a call site to a hook. Trips the breaker.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum AdaptationError {
    #[error(transparent)]
    Proxy(#[from] ProxyCompilationError),

    #[error(transparent)]
    Build(#[from] DispatchBuildError),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error("hook expects {expected} argument(s), call site passed {found}")]
    ArgumentCount { expected: usize, found: usize },

    #[error("argument {position}: `{found}` is not assignable to `{expected}`")]
    Argument {
        position: usize,
        expected: String,
        found: String,
    },
}

impl AdaptationError {
    /// The contract member whose resolution failed, if that was the cause.
    pub fn member(&self) -> Option<&str> {
        match self {
            AdaptationError::Proxy(err) => Some(err.member()),
            AdaptationError::Access(AccessError::Unresolved(err)) => Some(err.member()),
            _ => None,
        }
    }
}

/// Failure reported by a hook body.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Access(#[from] AccessError),

    /// The hook's own duck cast failed. Treated as an adaptation failure.
    #[error(transparent)]
    Adaptation(#[from] ProxyCompilationError),
}

impl HookError {
    pub fn failed(message: impl Into<String>) -> Self {
        HookError::Failed(message.into())
    }

    /// Adaptation failure surfaced from inside the hook, if any.
    pub(crate) fn adaptation(&self) -> Option<AdaptationError> {
        match self {
            HookError::Adaptation(err) => Some(AdaptationError::Proxy(err.clone())),
            HookError::Access(err @ AccessError::Unresolved(_)) => {
                Some(AdaptationError::Access(err.clone()))
            }
            _ => None,
        }
    }
}

/// A hook failed or panicked while running.
#[derive(Debug, Error)]
pub enum HookExecutionError {
    #[error("{kind} hook of integration `{integration}` failed: {source}")]
    Failed {
        integration: String,
        kind: HookKind,
        #[source]
        source: HookError,
    },

    #[error("{kind} hook of integration `{integration}` panicked: {message}")]
    Panicked {
        integration: String,
        kind: HookKind,
        message: String,
    },
}

impl HookExecutionError {
    pub fn integration(&self) -> &str {
        match self {
            HookExecutionError::Failed { integration, .. }
            | HookExecutionError::Panicked { integration, .. } => integration,
        }
    }

    pub fn kind(&self) -> HookKind {
        match self {
            HookExecutionError::Failed { kind, .. } | HookExecutionError::Panicked { kind, .. } => {
                *kind
            }
        }
    }
}

/// Setup errors: configuration loading and logging bootstrap.
#[derive(Debug, Error)]
pub enum InvokerError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("logging initialization failed: {0}")]
    Logging(String),
}
