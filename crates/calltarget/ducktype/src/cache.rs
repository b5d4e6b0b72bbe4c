//! Proxy cache: one compiled descriptor (or one cached failure) per
//! (contract, concrete type) pair.

use std::any::TypeId;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use tracing::{debug, instrument, warn};

use crate::adapter::Adapter;
use crate::compiler::{ProxyCompiler, ProxyDescriptor};
use crate::contract::ContractRef;
use crate::descriptor::{Describe, Reflect, TypeRef};
use crate::error::ProxyCompilationError;
use crate::resolver::{DescriptorResolver, TypeResolver};

pub type ProxyResult = Result<Arc<ProxyDescriptor>, ProxyCompilationError>;

/// Cache key. Contracts compare by allocation, concrete types by `TypeId`,
/// so two types sharing a display name never share a proxy.
#[derive(Clone)]
struct ProxyKey {
    contract: ContractRef,
    concrete: TypeId,
}

impl ProxyKey {
    fn new(contract: &ContractRef, concrete: &TypeRef) -> Self {
        Self {
            contract: Arc::clone(contract),
            concrete: concrete.type_id(),
        }
    }
}

impl PartialEq for ProxyKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.contract, &other.contract) && self.concrete == other.concrete
    }
}

impl Eq for ProxyKey {}

impl Hash for ProxyKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.contract).hash(state);
        self.concrete.hash(state);
    }
}

pub(crate) struct Shared {
    compiler: ProxyCompiler,
    cells: DashMap<ProxyKey, Arc<OnceLock<ProxyResult>>>,
    compiled: AtomicU64,
    failed: AtomicU64,
    hits: AtomicU64,
}

/// Snapshot of cache activity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProxyCacheStats {
    /// Descriptors compiled successfully.
    pub compiled: u64,
    /// Pairs whose compilation failed (each counted once).
    pub failed: u64,
    /// Lookups answered from an already published entry.
    pub hits: u64,
    pub entries: usize,
}

/// Registry of compiled proxies. Cloning yields another handle to the same
/// cache.
#[derive(Clone)]
pub struct ProxyCache {
    shared: Arc<Shared>,
}

impl ProxyCache {
    pub fn new() -> Self {
        Self::with_resolver(Arc::new(DescriptorResolver))
    }

    /// Cache backed by a custom member resolver.
    pub fn with_resolver(resolver: Arc<dyn TypeResolver>) -> Self {
        Self {
            shared: Arc::new(Shared {
                compiler: ProxyCompiler::new(resolver),
                cells: DashMap::new(),
                compiled: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                hits: AtomicU64::new(0),
            }),
        }
    }

    /// Descriptor for the pair, compiling it on first use. Failures are cached
    /// and returned again without recompiling.
    pub fn get_or_create(&self, contract: &ContractRef, concrete: &TypeRef) -> ProxyResult {
        get_or_create(&self.shared, contract, concrete)
    }

    pub fn get_or_create_for<T: Describe>(&self, contract: &ContractRef) -> ProxyResult {
        self.get_or_create(contract, &T::describe())
    }

    /// Adapt one instance, using its runtime type.
    pub fn create<'a>(
        &self,
        contract: &ContractRef,
        instance: &'a dyn Reflect,
    ) -> Result<Adapter<'a>, ProxyCompilationError> {
        let proxy = self.get_or_create(contract, &instance.type_descriptor())?;
        Ok(Adapter::bound(proxy, instance))
    }

    /// Whether the concrete type satisfies the contract.
    pub fn can_create(&self, contract: &ContractRef, concrete: &TypeRef) -> bool {
        self.get_or_create(contract, concrete).is_ok()
    }

    pub fn len(&self) -> usize {
        self.shared.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.cells.is_empty()
    }

    pub fn stats(&self) -> ProxyCacheStats {
        ProxyCacheStats {
            compiled: self.shared.compiled.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
            hits: self.shared.hits.load(Ordering::Relaxed),
            entries: self.shared.cells.len(),
        }
    }
}

impl Default for ProxyCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProxyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyCache")
            .field("stats", &self.stats())
            .finish()
    }
}

#[instrument(level = "trace", skip_all, fields(contract = %contract.name(), concrete = %concrete.name()))]
pub(crate) fn get_or_create(
    shared: &Arc<Shared>,
    contract: &ContractRef,
    concrete: &TypeRef,
) -> ProxyResult {
    let key = ProxyKey::new(contract, concrete);

    // A published entry costs a shard read lock; the per-key cell is not
    // waited on again.
    if let Some(cell) = shared.cells.get(&key) {
        if let Some(result) = cell.get() {
            shared.hits.fetch_add(1, Ordering::Relaxed);
            return result.clone();
        }
    }

    let cell = Arc::clone(shared.cells.entry(key).or_default().value());
    cell.get_or_init(|| {
        match shared
            .compiler
            .compile(contract, concrete, Arc::downgrade(shared))
        {
            Ok(proxy) => {
                shared.compiled.fetch_add(1, Ordering::Relaxed);
                debug!(
                    contract = %contract.name(),
                    concrete = %concrete.name(),
                    members = proxy.len(),
                    "compiled proxy"
                );
                Ok(Arc::new(proxy))
            }
            Err(err) => {
                shared.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    contract = %contract.name(),
                    concrete = %concrete.name(),
                    member = %err.member(),
                    error = %err,
                    "proxy compilation failed"
                );
                Err(err)
            }
        }
    })
    .clone()
}
