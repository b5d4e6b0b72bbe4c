//! Compiled dispatch paths: per-tuple argument binders plus the hook body.

use std::sync::Arc;

use calltarget_ducktype::{Adapter, ContractRef, ProxyCache, ProxyDescriptor, Reflect, TypeRef};
use smallvec::{smallvec, SmallVec};

use crate::envelope::{ReturnEnvelope, StateEnvelope};
use crate::error::{AdaptationError, DispatchBuildError, HookError};
use crate::hook::{
    BeginBody, BeginCall, EndBody, EndCall, EndReturnBody, EndReturnCall, Exception,
};
use crate::slot::Slot;

/// Binds one argument whose concrete type is known at build time.
pub(crate) enum Binder {
    Pass,
    Adapt(Arc<ProxyDescriptor>),
}

impl Binder {
    fn bind<'a>(&self, value: &'a dyn Reflect) -> Result<Slot<'a>, AdaptationError> {
        match self {
            Binder::Pass => Ok(Slot::Value(value)),
            Binder::Adapt(proxy) => Ok(Slot::Proxy(Adapter::new(Arc::clone(proxy), value)?)),
        }
    }
}

/// Binds one argument whose concrete type is only known per call. Generic
/// binders carry their slot index.
pub(crate) enum SlowBinder {
    Pass(usize),
    Convert(usize, ContractRef),
    Check(TypeRef),
}

impl SlowBinder {
    fn slot(&self) -> Option<usize> {
        match self {
            SlowBinder::Pass(slot) | SlowBinder::Convert(slot, _) => Some(*slot),
            SlowBinder::Check(_) => None,
        }
    }

    fn bind<'a>(
        &self,
        position: usize,
        value: &'a dyn Reflect,
        proxies: &ProxyCache,
    ) -> Result<Slot<'a>, AdaptationError> {
        match self {
            SlowBinder::Pass(_) => Ok(Slot::Value(value)),
            SlowBinder::Convert(_, contract) => {
                Ok(Slot::Proxy(proxies.create(contract, value)?))
            }
            SlowBinder::Check(expected) => {
                let found = value.type_descriptor();
                if expected.is_assignable_from(&found) {
                    Ok(Slot::Value(value))
                } else {
                    Err(AdaptationError::Argument {
                        position,
                        expected: expected.name().to_string(),
                        found: found.name().to_string(),
                    })
                }
            }
        }
    }
}

/// Why a path invocation did not produce a result.
#[derive(Debug)]
pub(crate) enum PathFailure {
    Adaptation(AdaptationError),
    Hook(HookError),
}

impl From<AdaptationError> for PathFailure {
    fn from(err: AdaptationError) -> Self {
        PathFailure::Adaptation(err)
    }
}

impl From<HookError> for PathFailure {
    fn from(err: HookError) -> Self {
        match err.adaptation() {
            Some(adaptation) => PathFailure::Adaptation(adaptation),
            None => PathFailure::Hook(err),
        }
    }
}

pub(crate) struct BeginPath {
    pub(crate) body: Arc<BeginBody>,
    /// Present when the hook takes the instance.
    pub(crate) instance: Option<Binder>,
    pub(crate) args: SmallVec<[Binder; 6]>,
}

impl BeginPath {
    pub(crate) fn invoke(
        &self,
        integration: &str,
        instance: &dyn Reflect,
        args: &[&dyn Reflect],
        proxies: &ProxyCache,
    ) -> Result<StateEnvelope, PathFailure> {
        let instance = self
            .instance
            .as_ref()
            .map(|binder| binder.bind(instance))
            .transpose()?;
        let args = self
            .args
            .iter()
            .zip(args)
            .map(|(binder, arg)| binder.bind(*arg))
            .collect::<Result<SmallVec<_>, _>>()?;
        let call = BeginCall {
            integration,
            instance,
            args,
            proxies,
        };
        Ok((self.body)(&call)?)
    }
}

pub(crate) struct SlowBeginPath {
    pub(crate) body: Arc<BeginBody>,
    pub(crate) instance: Option<Binder>,
    pub(crate) params: SmallVec<[SlowBinder; 6]>,
    /// Generic slot names, indexed by slot.
    pub(crate) slots: SmallVec<[String; 4]>,
}

impl SlowBeginPath {
    /// Applies the build-time slot rule to runtime types: slot 0 is the
    /// target, and every argument bound to one slot must share a type.
    fn check_slots(
        &self,
        instance: &dyn Reflect,
        args: &[&dyn Reflect],
    ) -> Result<(), AdaptationError> {
        let mut bound: SmallVec<[Option<TypeRef>; 4]> = smallvec![None; self.slots.len()];
        if let Some(first) = bound.first_mut() {
            *first = Some(instance.type_descriptor());
        }
        for (binder, arg) in self.params.iter().zip(args) {
            let Some(entry) = binder.slot().and_then(|slot| bound.get_mut(slot)) else {
                continue;
            };
            let ty = arg.type_descriptor();
            match entry.as_ref() {
                Some(first) if first.type_id() != ty.type_id() => {
                    let slot = binder.slot().and_then(|slot| self.slots.get(slot));
                    return Err(DispatchBuildError::ConflictingGenericBinding {
                        slot: slot.cloned().unwrap_or_default(),
                        first: first.name().to_string(),
                        second: ty.name().to_string(),
                    }
                    .into());
                }
                Some(_) => {}
                None => *entry = Some(ty),
            }
        }
        Ok(())
    }

    pub(crate) fn invoke(
        &self,
        integration: &str,
        instance: &dyn Reflect,
        args: &[&dyn Reflect],
        proxies: &ProxyCache,
    ) -> Result<StateEnvelope, PathFailure> {
        if args.len() != self.params.len() {
            return Err(AdaptationError::ArgumentCount {
                expected: self.params.len(),
                found: args.len(),
            }
            .into());
        }
        self.check_slots(instance, args)?;
        let instance = self
            .instance
            .as_ref()
            .map(|binder| binder.bind(instance))
            .transpose()?;
        let args = self
            .params
            .iter()
            .zip(args)
            .enumerate()
            .map(|(position, (binder, arg))| binder.bind(position, *arg, proxies))
            .collect::<Result<SmallVec<_>, _>>()?;
        let call = BeginCall {
            integration,
            instance,
            args,
            proxies,
        };
        Ok((self.body)(&call)?)
    }
}

pub(crate) struct EndPath {
    pub(crate) body: Arc<EndBody>,
    pub(crate) instance: Option<Binder>,
}

impl EndPath {
    pub(crate) fn invoke(
        &self,
        integration: &str,
        instance: &dyn Reflect,
        exception: Option<Exception<'_>>,
        state: &StateEnvelope,
        proxies: &ProxyCache,
    ) -> Result<ReturnEnvelope, PathFailure> {
        let instance = self
            .instance
            .as_ref()
            .map(|binder| binder.bind(instance))
            .transpose()?;
        let call = EndCall {
            integration,
            instance,
            exception,
            state,
            proxies,
        };
        Ok((self.body)(&call)?)
    }
}

/// What an end hook did with the return value.
pub(crate) enum ReturnOutcome {
    Unchanged,
    Replaced(Box<dyn Reflect>),
    /// The hook handed back a borrowed value other than the original.
    Foreign(String),
}

pub(crate) struct EndReturnPath {
    pub(crate) body: Arc<EndReturnBody>,
    pub(crate) instance: Option<Binder>,
    pub(crate) ret: Binder,
}

impl EndReturnPath {
    pub(crate) fn invoke(
        &self,
        integration: &str,
        instance: &dyn Reflect,
        value: &dyn Reflect,
        exception: Option<Exception<'_>>,
        state: &StateEnvelope,
        proxies: &ProxyCache,
    ) -> Result<ReturnOutcome, PathFailure> {
        let instance = self
            .instance
            .as_ref()
            .map(|binder| binder.bind(instance))
            .transpose()?;
        let call = EndReturnCall {
            integration,
            instance,
            return_value: self.ret.bind(value)?,
            exception,
            state,
            proxies,
        };
        let returned = (self.body)(call)?.into_return_value();
        Ok(match returned {
            Slot::Replaced(replacement) => ReturnOutcome::Replaced(replacement),
            borrowed if same_object(borrowed.instance(), value) => ReturnOutcome::Unchanged,
            borrowed => ReturnOutcome::Foreign(borrowed.instance().type_descriptor().name().to_string()),
        })
    }
}

fn same_object(a: &dyn Reflect, b: &dyn Reflect) -> bool {
    std::ptr::eq(
        a as *const dyn Reflect as *const u8,
        b as *const dyn Reflect as *const u8,
    )
}

/// A compiled path of any hook kind.
pub(crate) enum DispatchPath {
    Begin(BeginPath),
    BeginSlow(SlowBeginPath),
    End(EndPath),
    EndReturn(EndReturnPath),
}

impl DispatchPath {
    pub(crate) fn as_begin(&self) -> Option<&BeginPath> {
        match self {
            DispatchPath::Begin(path) => Some(path),
            _ => None,
        }
    }

    pub(crate) fn as_begin_slow(&self) -> Option<&SlowBeginPath> {
        match self {
            DispatchPath::BeginSlow(path) => Some(path),
            _ => None,
        }
    }

    pub(crate) fn as_end(&self) -> Option<&EndPath> {
        match self {
            DispatchPath::End(path) => Some(path),
            _ => None,
        }
    }

    pub(crate) fn as_end_return(&self) -> Option<&EndReturnPath> {
        match self {
            DispatchPath::EndReturn(path) => Some(path),
            _ => None,
        }
    }
}
