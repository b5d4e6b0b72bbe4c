//! Dispatch compiler: validates a hook signature against a call site and
//! produces the bound path for one dispatch tuple.

use calltarget_ducktype::{ProxyCache, TypeRef};
use smallvec::{smallvec, SmallVec};
use tracing::debug;

use crate::error::{AdaptationError, DispatchBuildError};
use crate::hook::{GenericSlot, HookKind, HookParam, HookSignature, Integration};
use crate::path::{BeginPath, Binder, EndPath, EndReturnPath, SlowBeginPath, SlowBinder};

/// Records which concrete type each generic slot was bound to, in parameter
/// declaration order.
struct SlotBindings<'s> {
    slots: &'s [GenericSlot],
    bound: SmallVec<[Option<TypeRef>; 4]>,
}

impl<'s> SlotBindings<'s> {
    fn new(slots: &'s [GenericSlot]) -> Self {
        Self {
            slots,
            bound: smallvec![None; slots.len()],
        }
    }

    fn bind(
        &mut self,
        position: usize,
        slot: usize,
        ty: &TypeRef,
    ) -> Result<&'s GenericSlot, DispatchBuildError> {
        let declared = self
            .slots
            .get(slot)
            .ok_or(DispatchBuildError::UnknownGenericSlot { position, slot })?;
        if let Some(first) = &self.bound[slot] {
            if first.type_id() != ty.type_id() {
                return Err(DispatchBuildError::ConflictingGenericBinding {
                    slot: declared.name().to_string(),
                    first: first.name().to_string(),
                    second: ty.name().to_string(),
                });
            }
            return Ok(declared);
        }
        self.bound[slot] = Some(TypeRef::clone(ty));
        Ok(declared)
    }
}

pub(crate) struct DispatchCompiler {
    proxies: ProxyCache,
}

impl DispatchCompiler {
    pub(crate) fn new(proxies: ProxyCache) -> Self {
        Self { proxies }
    }

    /// Fixed-arity begin path for statically known argument types.
    pub(crate) fn compile_begin(
        &self,
        integration: &Integration,
        target: &TypeRef,
        args: &[TypeRef],
    ) -> Result<BeginPath, AdaptationError> {
        let kind = HookKind::Begin;
        let hook = integration.begin().ok_or_else(|| missing(integration, kind))?;
        let signature = hook.signature();
        let params = signature.params();
        let argc = args.len();

        let instance_slot = instance_slot(signature, kind)?;
        if params.len() < argc {
            return Err(DispatchBuildError::TooFewParameters {
                kind,
                min: argc,
                found: params.len(),
            }
            .into());
        }
        if params.len() > argc + 1 {
            return Err(DispatchBuildError::TooManyParameters {
                kind,
                max: argc + 1,
                found: params.len(),
            }
            .into());
        }
        let loaded = params.len() == argc + 1;
        if loaded {
            expect_instance_param(params, kind)?;
        }

        let mut bindings = SlotBindings::new(signature.generics());
        bindings.bind(0, 0, target)?;
        // The instance constraint is compiled even when the instance is not
        // passed to the hook.
        let instance = self.binder(instance_slot, target)?;

        let offset = usize::from(loaded);
        let mut binders: SmallVec<[Binder; 6]> = SmallVec::new();
        for (i, (param, arg)) in params[offset..].iter().zip(args).enumerate() {
            let position = offset + i;
            let binder = match param {
                HookParam::Generic(slot) => {
                    let declared = bindings.bind(position, *slot, arg)?;
                    self.binder(declared, arg)?
                }
                HookParam::Fixed(expected) => {
                    if !expected.is_assignable_from(arg) {
                        return Err(DispatchBuildError::Unassignable {
                            position,
                            expected: expected.name().to_string(),
                            found: arg.name().to_string(),
                        }
                        .into());
                    }
                    Binder::Pass
                }
                other => return Err(unexpected(kind, position, other).into()),
            };
            binders.push(binder);
        }

        debug!(
            integration = %integration.name(),
            target = %target.name(),
            arity = argc,
            loaded,
            "compiled begin path"
        );
        Ok(BeginPath {
            body: hook.body(),
            instance: loaded.then_some(instance),
            args: binders,
        })
    }

    /// Variable-arity begin path. Argument types are checked and adapted per
    /// call; the instance binder is still compiled here.
    pub(crate) fn compile_begin_slow(
        &self,
        integration: &Integration,
        target: &TypeRef,
    ) -> Result<SlowBeginPath, AdaptationError> {
        let kind = HookKind::BeginSlow;
        let hook = integration
            .begin()
            .ok_or_else(|| missing(integration, kind))?;
        let signature = hook.signature();
        let params = signature.params();

        let instance_slot = instance_slot(signature, kind)?;
        let loaded = matches!(params.first(), Some(HookParam::Generic(0)));
        let instance = self.binder(instance_slot, target)?;

        let offset = usize::from(loaded);
        let mut binders: SmallVec<[SlowBinder; 6]> = SmallVec::new();
        for (i, param) in params[offset..].iter().enumerate() {
            let position = offset + i;
            let binder = match param {
                HookParam::Generic(slot) => {
                    let declared = signature
                        .generics()
                        .get(*slot)
                        .ok_or(DispatchBuildError::UnknownGenericSlot {
                            position,
                            slot: *slot,
                        })?;
                    match declared.constraint() {
                        Some(contract) => SlowBinder::Convert(*slot, contract.clone()),
                        None => SlowBinder::Pass(*slot),
                    }
                }
                HookParam::Fixed(expected) => SlowBinder::Check(expected.clone()),
                other => return Err(unexpected(kind, position, other).into()),
            };
            binders.push(binder);
        }

        debug!(
            integration = %integration.name(),
            target = %target.name(),
            arity = binders.len(),
            loaded,
            "compiled slow begin path"
        );
        Ok(SlowBeginPath {
            body: hook.body(),
            instance: loaded.then_some(instance),
            params: binders,
            slots: signature
                .generics()
                .iter()
                .map(|slot| slot.name().to_string())
                .collect(),
        })
    }

    /// End path for calls without a return value:
    /// `[instance] exception state`, exactly one generic slot.
    pub(crate) fn compile_end(
        &self,
        integration: &Integration,
        target: &TypeRef,
    ) -> Result<EndPath, AdaptationError> {
        let kind = HookKind::End;
        let hook = integration.end().ok_or_else(|| missing(integration, kind))?;
        let signature = hook.signature();
        let params = signature.params();

        let instance_slot = instance_slot(signature, kind)?;
        if signature.generics().len() != 1 {
            return Err(DispatchBuildError::GenericSlotCount {
                kind,
                expected: "exactly 1",
                found: signature.generics().len(),
            }
            .into());
        }
        check_param_count(params, kind, 2, 3)?;
        let loaded = params.len() == 3;
        if loaded {
            expect_instance_param(params, kind)?;
        }
        let instance = self.binder(instance_slot, target)?;
        expect_tail(params, kind, usize::from(loaded))?;

        debug!(
            integration = %integration.name(),
            target = %target.name(),
            loaded,
            "compiled end path"
        );
        Ok(EndPath {
            body: hook.body(),
            instance: loaded.then_some(instance),
        })
    }

    /// End path for calls with a return value (also async end):
    /// `[instance] return exception state`, one or two generic slots.
    pub(crate) fn compile_end_return(
        &self,
        integration: &Integration,
        kind: HookKind,
        target: &TypeRef,
        ret: &TypeRef,
    ) -> Result<EndReturnPath, AdaptationError> {
        let hook = match kind {
            HookKind::AsyncEnd => integration.async_end(),
            _ => integration.end_with_return(),
        }
        .ok_or_else(|| missing(integration, kind))?;
        let signature = hook.signature();
        let params = signature.params();
        let generics = signature.generics();

        let instance_slot = instance_slot(signature, kind)?;
        if generics.len() > 2 {
            return Err(DispatchBuildError::GenericSlotCount {
                kind,
                expected: "1 or 2",
                found: generics.len(),
            }
            .into());
        }
        check_param_count(params, kind, 3, 4)?;
        let loaded = params.len() == 4;
        if loaded {
            expect_instance_param(params, kind)?;
        }
        let instance = self.binder(instance_slot, target)?;

        let offset = usize::from(loaded);
        let ret_binder = match &params[offset] {
            HookParam::Generic(1) => {
                let slot = generics.get(1).ok_or(DispatchBuildError::UnknownGenericSlot {
                    position: offset,
                    slot: 1,
                })?;
                self.binder(slot, ret)?
            }
            HookParam::Fixed(expected) if expected.type_id() == ret.type_id() => Binder::Pass,
            _ => {
                return Err(DispatchBuildError::InvalidReturnParameter {
                    expected: ret.name().to_string(),
                }
                .into())
            }
        };
        expect_tail(params, kind, offset + 1)?;

        debug!(
            integration = %integration.name(),
            target = %target.name(),
            return_type = %ret.name(),
            %kind,
            loaded,
            "compiled end path"
        );
        Ok(EndReturnPath {
            body: hook.body(),
            instance: loaded.then_some(instance),
            ret: ret_binder,
        })
    }

    fn binder(&self, slot: &GenericSlot, ty: &TypeRef) -> Result<Binder, AdaptationError> {
        Ok(match slot.constraint() {
            Some(contract) => Binder::Adapt(self.proxies.get_or_create(contract, ty)?),
            None => Binder::Pass,
        })
    }
}

fn missing(integration: &Integration, kind: HookKind) -> DispatchBuildError {
    DispatchBuildError::MissingHook {
        integration: integration.name().to_string(),
        kind,
    }
}

fn instance_slot(signature: &HookSignature, kind: HookKind) -> Result<&GenericSlot, DispatchBuildError> {
    signature
        .generics()
        .first()
        .ok_or(DispatchBuildError::MissingInstanceSlot { kind })
}

fn expect_instance_param(params: &[HookParam], kind: HookKind) -> Result<(), DispatchBuildError> {
    match params.first() {
        Some(HookParam::Generic(0)) => Ok(()),
        _ => Err(DispatchBuildError::InstanceParameterMismatch { kind }),
    }
}

fn check_param_count(
    params: &[HookParam],
    kind: HookKind,
    min: usize,
    max: usize,
) -> Result<(), DispatchBuildError> {
    if params.len() < min {
        Err(DispatchBuildError::TooFewParameters {
            kind,
            min,
            found: params.len(),
        })
    } else if params.len() > max {
        Err(DispatchBuildError::TooManyParameters {
            kind,
            max,
            found: params.len(),
        })
    } else {
        Ok(())
    }
}

/// `exception state` starting at `position`.
fn expect_tail(params: &[HookParam], kind: HookKind, position: usize) -> Result<(), DispatchBuildError> {
    if !matches!(params.get(position), Some(HookParam::Exception)) {
        return Err(DispatchBuildError::MissingExceptionParameter { kind, position });
    }
    if !matches!(params.get(position + 1), Some(HookParam::State)) {
        return Err(DispatchBuildError::MissingStateParameter {
            kind,
            position: position + 1,
        });
    }
    Ok(())
}

fn unexpected(kind: HookKind, position: usize, param: &HookParam) -> DispatchBuildError {
    DispatchBuildError::UnexpectedParameter {
        kind,
        position,
        param: param.label(),
    }
}
