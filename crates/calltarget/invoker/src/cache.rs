//! Dispatch cache: one compiled path (or one disabled marker) and one circuit
//! breaker per dispatch tuple.

use std::any::TypeId;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use calltarget_ducktype::Reflect;
use dashmap::DashMap;
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::breaker::CircuitBreaker;
use crate::error::AdaptationError;
use crate::hook::{HookKind, IntegrationRef};
use crate::path::DispatchPath;

/// (integration, hook kind, target type, argument types).
pub(crate) struct DispatchKey {
    integration: IntegrationRef,
    kind: HookKind,
    target: TypeId,
    args: SmallVec<[TypeId; 6]>,
}

impl DispatchKey {
    pub(crate) fn new(
        integration: &IntegrationRef,
        kind: HookKind,
        target: TypeId,
        args: SmallVec<[TypeId; 6]>,
    ) -> Self {
        Self {
            integration: Arc::clone(integration),
            kind,
            target,
            args,
        }
    }
}

impl PartialEq for DispatchKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.integration, &other.integration)
            && self.kind == other.kind
            && self.target == other.target
            && self.args == other.args
    }
}

impl Eq for DispatchKey {}

impl Hash for DispatchKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.integration).hash(state);
        self.kind.hash(state);
        self.target.hash(state);
        self.args.hash(state);
    }
}

pub(crate) enum Compiled {
    Ready(DispatchPath),
    Disabled,
}

#[derive(Default)]
pub(crate) struct DispatchCell {
    compiled: OnceLock<Compiled>,
    breaker: CircuitBreaker,
}

/// Call-site description used in diagnostics.
pub(crate) struct Site<'a> {
    pub(crate) integration: &'a str,
    pub(crate) kind: HookKind,
    pub(crate) target: &'a dyn Reflect,
}

/// Snapshot of dispatch activity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Paths compiled successfully.
    pub compiled: u64,
    /// Tuples whose breaker has tripped.
    pub disabled: u64,
    pub fast_invocations: u64,
    pub slow_invocations: u64,
    /// Calls skipped because the breaker was already tripped.
    pub short_circuits: u64,
    /// Hook bodies that failed or panicked.
    pub hook_failures: u64,
    pub entries: usize,
}

#[derive(Default)]
pub struct DispatchCache {
    cells: DashMap<DispatchKey, Arc<DispatchCell>>,
    compiled: AtomicU64,
    disabled: AtomicU64,
    fast_invocations: AtomicU64,
    slow_invocations: AtomicU64,
    short_circuits: AtomicU64,
    hook_failures: AtomicU64,
}

impl DispatchCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            compiled: self.compiled.load(Ordering::Relaxed),
            disabled: self.disabled.load(Ordering::Relaxed),
            fast_invocations: self.fast_invocations.load(Ordering::Relaxed),
            slow_invocations: self.slow_invocations.load(Ordering::Relaxed),
            short_circuits: self.short_circuits.load(Ordering::Relaxed),
            hook_failures: self.hook_failures.load(Ordering::Relaxed),
            entries: self.cells.len(),
        }
    }

    /// The cell for `key`, created on first use. Lookup takes a shard read
    /// lock; the returned `Arc` is held while the hook runs, no map lock is.
    pub(crate) fn cell(&self, key: DispatchKey) -> Arc<DispatchCell> {
        if let Some(cell) = self.cells.get(&key) {
            return Arc::clone(cell.value());
        }
        Arc::clone(self.cells.entry(key).or_default().value())
    }

    /// The compiled path for `cell`, compiling it on first use. `None` when the
    /// tuple is disabled.
    pub(crate) fn ready<'c, F>(&self, cell: &'c DispatchCell, site: &Site<'_>, compile: F) -> Option<&'c DispatchPath>
    where
        F: FnOnce() -> Result<DispatchPath, AdaptationError>,
    {
        if cell.breaker.is_tripped() {
            self.short_circuits.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        let compiled = cell.compiled.get_or_init(|| match compile() {
            Ok(path) => {
                self.compiled.fetch_add(1, Ordering::Relaxed);
                debug!(
                    integration = %site.integration,
                    kind = %site.kind,
                    target = %site.target.type_descriptor().name(),
                    "dispatch path ready"
                );
                Compiled::Ready(path)
            }
            Err(err) => {
                self.trip(cell, site, &err);
                Compiled::Disabled
            }
        });
        match compiled {
            Compiled::Ready(path) => Some(path),
            Compiled::Disabled => None,
        }
    }

    /// Disable the tuple permanently. Logs once per tuple.
    pub(crate) fn trip(&self, cell: &DispatchCell, site: &Site<'_>, err: &AdaptationError) {
        if cell.breaker.trip(err) {
            self.disabled.fetch_add(1, Ordering::Relaxed);
            warn!(
                integration = %site.integration,
                kind = %site.kind,
                target = %site.target.type_descriptor().name(),
                member = err.member().unwrap_or("-"),
                error = %err,
                "adaptation failed, call site disabled"
            );
        }
    }

    pub(crate) fn record_fast(&self) {
        self.fast_invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_slow(&self) {
        self.slow_invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_hook_failure(&self) {
        self.hook_failures.fetch_add(1, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for DispatchCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchCache")
            .field("stats", &self.stats())
            .finish()
    }
}
