//! Values as a hook sees them: passed through, adapted, or replaced.

use std::fmt;

use calltarget_ducktype::{AccessError, Adapter, Describe, Reflect, Value};

/// One hook argument.
pub enum Slot<'a> {
    /// The concrete value, unadapted.
    Value(&'a dyn Reflect),
    /// The concrete value viewed through the slot's contract.
    Proxy(Adapter<'a>),
    /// A value supplied by the hook itself. Only meaningful as the return
    /// value of an end hook, where it overrides the call's result.
    Replaced(Box<dyn Reflect>),
}

impl<'a> Slot<'a> {
    /// Override slot for an end hook's return value.
    pub fn replaced<T: Describe>(value: T) -> Self {
        Slot::Replaced(Box::new(value))
    }

    /// The concrete value behind the slot.
    pub fn instance(&self) -> &dyn Reflect {
        match self {
            Slot::Value(value) => *value,
            Slot::Proxy(adapter) => adapter.instance(),
            Slot::Replaced(value) => value.as_ref(),
        }
    }

    pub fn downcast_ref<T: Describe>(&self) -> Option<&T> {
        self.instance().downcast_ref::<T>()
    }

    pub fn as_proxy(&self) -> Option<&Adapter<'a>> {
        match self {
            Slot::Proxy(adapter) => Some(adapter),
            _ => None,
        }
    }

    pub fn is_replaced(&self) -> bool {
        matches!(self, Slot::Replaced(_))
    }

    /// Read a contract property. Only adapted slots expose contract members.
    pub fn get(&self, member: &str) -> Result<Value<'_>, AccessError> {
        match self {
            Slot::Proxy(adapter) => adapter.get(member),
            _ => Err(self.not_adapted(member)),
        }
    }

    /// Invoke a contract method on an adapted slot.
    pub fn call(&self, member: &str, args: &[Value<'_>]) -> Result<Value<'_>, AccessError> {
        match self {
            Slot::Proxy(adapter) => adapter.call(member, args),
            _ => Err(self.not_adapted(member)),
        }
    }

    fn not_adapted(&self, member: &str) -> AccessError {
        AccessError::UnknownMember {
            contract: format!("<unconstrained {}>", self.instance().type_descriptor().name()),
            member: member.to_string(),
        }
    }
}

impl fmt::Debug for Slot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Slot::Proxy(adapter) => f.debug_tuple("Proxy").field(adapter).finish(),
            Slot::Replaced(value) => f.debug_tuple("Replaced").field(value).finish(),
        }
    }
}
