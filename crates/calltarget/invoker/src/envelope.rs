//! State and return envelopes exchanged between call sites and hooks.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Opaque state produced by a begin hook and handed unchanged to the matching
/// end hook.
#[derive(Clone, Default)]
pub struct StateEnvelope {
    payload: Option<Arc<dyn Any + Send + Sync>>,
    active: bool,
}

impl StateEnvelope {
    /// Active state carrying `payload`.
    pub fn new<T: Any + Send + Sync>(payload: T) -> Self {
        Self {
            payload: Some(Arc::new(payload)),
            active: true,
        }
    }

    /// Active state with no payload.
    pub fn active() -> Self {
        Self {
            payload: None,
            active: true,
        }
    }

    /// The state returned whenever a hook is skipped or fails.
    pub fn inert() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }

    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.as_deref().and_then(|p| p.downcast_ref::<T>())
    }

    /// Whether both envelopes carry the very same payload allocation.
    pub fn same_payload(&self, other: &StateEnvelope) -> bool {
        match (&self.payload, &other.payload) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for StateEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateEnvelope")
            .field("active", &self.active)
            .field("payload", &self.payload.is_some())
            .finish()
    }
}

/// Carries the instrumented call's return value back to the call site. End
/// hooks may replace it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReturnEnvelope<T = ()> {
    return_value: T,
}

impl<T> ReturnEnvelope<T> {
    pub fn new(return_value: T) -> Self {
        Self { return_value }
    }

    pub fn return_value(&self) -> &T {
        &self.return_value
    }

    pub fn into_return_value(self) -> T {
        self.return_value
    }
}

impl ReturnEnvelope<()> {
    pub fn inert() -> Self {
        Self { return_value: () }
    }
}
