//! Permanent per-tuple circuit breaker.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

/// Once tripped, stays tripped for the life of the process. There is no
/// half-open state and no retry.
#[derive(Debug, Default)]
pub struct CircuitBreaker {
    tripped: AtomicBool,
    reason: OnceLock<String>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::Acquire)
    }

    /// Trip the breaker. Returns `true` only for the call that tripped it.
    pub fn trip(&self, reason: impl fmt::Display) -> bool {
        let first = self.reason.get().is_none() && self.reason.set(reason.to_string()).is_ok();
        self.tripped.store(true, Ordering::Release);
        first
    }

    /// Why the breaker tripped.
    pub fn reason(&self) -> Option<&str> {
        self.reason.get().map(String::as_str)
    }
}
