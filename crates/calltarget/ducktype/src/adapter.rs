//! Adapter instances: a borrowed concrete instance viewed through a contract.

use std::fmt;
use std::sync::Arc;

use crate::compiler::ProxyDescriptor;
use crate::contract::ContractRef;
use crate::descriptor::{Describe, Reflect};
use crate::error::AccessError;
use crate::value::Value;

/// Contract view over one concrete instance.
///
/// The adapter borrows the instance; it can never outlive it. Values read
/// through it borrow from the instance too, not from the adapter.
#[derive(Clone)]
pub struct Adapter<'a> {
    proxy: Arc<ProxyDescriptor>,
    instance: &'a dyn Reflect,
}

impl<'a> Adapter<'a> {
    /// Wrap `instance`. Fails if the instance is not of the descriptor's
    /// concrete type.
    pub fn new(proxy: Arc<ProxyDescriptor>, instance: &'a dyn Reflect) -> Result<Self, AccessError> {
        if instance.concrete_type_id() != proxy.concrete().type_id() {
            return Err(AccessError::TypeMismatch {
                expected: proxy.concrete().name().to_string(),
                found: instance.type_descriptor().name().to_string(),
            });
        }
        Ok(Self { proxy, instance })
    }

    /// Wrap an instance already known to match the descriptor.
    pub(crate) fn bound(proxy: Arc<ProxyDescriptor>, instance: &'a dyn Reflect) -> Self {
        Self { proxy, instance }
    }

    /// Read a contract property.
    pub fn get(&self, member: &str) -> Result<Value<'a>, AccessError> {
        self.proxy.get(self.instance, member)
    }

    /// Invoke a contract method. Adapter arguments are handed to the concrete
    /// method as the instances they wrap.
    pub fn call(&self, member: &str, args: &[Value<'_>]) -> Result<Value<'a>, AccessError> {
        self.proxy.call(self.instance, member, args)
    }

    /// The wrapped concrete instance.
    pub fn instance(&self) -> &'a dyn Reflect {
        self.instance
    }

    pub fn downcast<T: Describe>(&self) -> Option<&'a T> {
        self.instance.downcast_ref::<T>()
    }

    pub fn contract(&self) -> &ContractRef {
        self.proxy.contract()
    }

    pub fn descriptor(&self) -> &Arc<ProxyDescriptor> {
        &self.proxy
    }
}

impl fmt::Debug for Adapter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter")
            .field("contract", &self.proxy.contract().name())
            .field("concrete", &self.proxy.concrete().name())
            .finish()
    }
}
