//! Proxy compiler: binds every contract member to a concrete member and
//! produces the forwarding table for one (contract, concrete) pair.
//!
//! Compilation runs in two phases. Planning resolves each contract member
//! against the concrete type and recursively validates nested contracts
//! (cycle-safe, no cache access). Materialization turns the plan into
//! forwarding routines; nested contracts are linked to their own cached
//! descriptors on first access, so compiling one key never waits on another.

use std::any::TypeId;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use smallvec::SmallVec;
use tracing::trace;

use crate::adapter::Adapter;
use crate::cache::{self, Shared};
use crate::contract::{Contract, ContractRef, Requirement, Shape};
use crate::descriptor::{MemberKind, MethodAccessor, PropertyAccessor, Reflect, TypeRef};
use crate::error::{AccessError, MemberResolutionError, ProxyCompilationError, ResolutionFailure};
use crate::resolver::{
    accepts, param_accepts, value_accepts, Fit, MemberForm, ResolvedMember, TypeResolver,
};
use crate::value::Value;

type VisitKey = (*const Contract, TypeId);

/// A contract member bound to a concrete member.
struct Binding {
    name: String,
    index: usize,
    /// Contract parameter shapes; empty for properties.
    params: Vec<Shape>,
    nested: Option<(ContractRef, TypeRef)>,
}

pub struct ProxyCompiler {
    resolver: Arc<dyn TypeResolver>,
}

impl ProxyCompiler {
    pub fn new(resolver: Arc<dyn TypeResolver>) -> Self {
        Self { resolver }
    }

    /// Compile a descriptor. Nested links resolve through `cache` when first
    /// accessed.
    pub(crate) fn compile(
        &self,
        contract: &ContractRef,
        concrete: &TypeRef,
        cache: Weak<Shared>,
    ) -> Result<ProxyDescriptor, ProxyCompilationError> {
        let mut visiting = Vec::new();
        let bindings = self.plan(contract, concrete, &mut visiting)?;
        let routines = self.materialize(contract, concrete, bindings, &cache)?;
        trace!(
            contract = %contract.name(),
            concrete = %concrete.name(),
            routines = routines.len(),
            "proxy materialized"
        );
        Ok(ProxyDescriptor {
            contract: Arc::clone(contract),
            concrete: Arc::clone(concrete),
            routines,
        })
    }

    fn plan(
        &self,
        contract: &ContractRef,
        concrete: &TypeRef,
        visiting: &mut Vec<VisitKey>,
    ) -> Result<Vec<Binding>, MemberResolutionError> {
        visiting.push((Arc::as_ptr(contract), concrete.type_id()));
        let planned = self.plan_members(contract, concrete, visiting);
        visiting.pop();
        planned
    }

    fn plan_members(
        &self,
        contract: &ContractRef,
        concrete: &TypeRef,
        visiting: &mut Vec<VisitKey>,
    ) -> Result<Vec<Binding>, MemberResolutionError> {
        let members = self.resolver.resolve(concrete);
        let mut bindings = Vec::with_capacity(contract.members().len());

        for required in contract.members() {
            let fail = |failure| MemberResolutionError {
                contract: contract.name().to_string(),
                concrete: concrete.name().to_string(),
                member: required.name().to_string(),
                failure,
            };

            let candidates: SmallVec<[&ResolvedMember; 4]> = members
                .iter()
                .filter(|m| m.name == required.name())
                .collect();
            if candidates.is_empty() {
                return Err(fail(ResolutionFailure::Missing));
            }

            let (chosen, params, nested) = match required.requirement() {
                Requirement::Property(shape) => {
                    let candidate = candidates
                        .iter()
                        .find(|m| m.form == MemberForm::Property)
                        .ok_or_else(|| {
                            fail(ResolutionFailure::WrongForm {
                                expected: "property",
                                found: "method",
                            })
                        })?;
                    let matched = accepts(shape, &candidate.ret, contract).ok_or_else(|| {
                        fail(ResolutionFailure::Incompatible {
                            expected: shape.to_string(),
                            found: candidate.ret.name().to_string(),
                        })
                    })?;
                    (*candidate, Vec::new(), matched.nested)
                }
                Requirement::Method { params, ret } => {
                    let mut methods = candidates
                        .iter()
                        .copied()
                        .filter(|m| m.form == MemberForm::Method)
                        .peekable();
                    if methods.peek().is_none() {
                        return Err(fail(ResolutionFailure::WrongForm {
                            expected: "method",
                            found: "property",
                        }));
                    }

                    let mut best: Option<(u32, &ResolvedMember, Option<(ContractRef, TypeRef)>)> =
                        None;
                    for candidate in methods {
                        if candidate.params.len() != params.len() {
                            continue;
                        }
                        let Some(param_score) = candidate
                            .params
                            .iter()
                            .zip(params)
                            .map(|(param, shape)| param_accepts(param, shape).map(score))
                            .sum::<Option<u32>>()
                        else {
                            continue;
                        };
                        let Some(matched) = accepts(ret, &candidate.ret, contract) else {
                            continue;
                        };
                        let total = param_score + score(matched.fit);
                        // Strictly greater: ties keep the first declared overload.
                        if best.as_ref().map_or(true, |(current, _, _)| total > *current) {
                            best = Some((total, candidate, matched.nested));
                        }
                    }

                    let (_, candidate, nested) = best.ok_or_else(|| {
                        fail(ResolutionFailure::NoOverload {
                            arity: params.len(),
                            expected: params
                                .iter()
                                .map(ToString::to_string)
                                .collect::<Vec<_>>()
                                .join(", "),
                        })
                    })?;
                    (candidate, params.clone(), nested)
                }
            };

            if let Some((nested_contract, nested_ty)) = &nested {
                let key = (Arc::as_ptr(nested_contract), nested_ty.type_id());
                if !visiting.contains(&key) {
                    self.plan(nested_contract, nested_ty, visiting)
                        .map_err(|err| fail(ResolutionFailure::Nested(Box::new(err))))?;
                }
            }

            bindings.push(Binding {
                name: required.name().to_string(),
                index: chosen.index,
                params,
                nested,
            });
        }

        Ok(bindings)
    }

    fn materialize(
        &self,
        contract: &ContractRef,
        concrete: &TypeRef,
        bindings: Vec<Binding>,
        cache: &Weak<Shared>,
    ) -> Result<Vec<ForwardingRoutine>, MemberResolutionError> {
        bindings
            .into_iter()
            .map(|binding| -> Result<ForwardingRoutine, MemberResolutionError> {
                let member = concrete.members().get(binding.index).ok_or_else(|| {
                    MemberResolutionError {
                        contract: contract.name().to_string(),
                        concrete: concrete.name().to_string(),
                        member: binding.name.clone(),
                        failure: ResolutionFailure::Missing,
                    }
                })?;
                let target = match member.kind() {
                    MemberKind::Property { accessor, .. } => {
                        RoutineTarget::Read(Arc::clone(accessor))
                    }
                    MemberKind::Method { accessor, .. } => RoutineTarget::Invoke {
                        accessor: Arc::clone(accessor),
                        params: binding.params,
                    },
                };
                let conversion = match binding.nested {
                    None => Conversion::Identity,
                    Some((contract, concrete)) => Conversion::Nested(NestedLink {
                        contract,
                        concrete,
                        cache: Weak::clone(cache),
                        resolved: OnceLock::new(),
                    }),
                };
                Ok(ForwardingRoutine {
                    name: binding.name,
                    target,
                    conversion,
                })
            })
            .collect()
    }
}

fn score(fit: Fit) -> u32 {
    fit as u32
}

impl fmt::Debug for ProxyCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyCompiler").finish_non_exhaustive()
    }
}

/// Compiled adapter artifact for one (contract, concrete) pair: one
/// forwarding routine per contract member, in contract declaration order.
pub struct ProxyDescriptor {
    contract: ContractRef,
    concrete: TypeRef,
    routines: Vec<ForwardingRoutine>,
}

impl ProxyDescriptor {
    pub fn contract(&self) -> &ContractRef {
        &self.contract
    }

    pub fn concrete(&self) -> &TypeRef {
        &self.concrete
    }

    pub fn len(&self) -> usize {
        self.routines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routines.is_empty()
    }

    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.routines.iter().map(|r| r.name.as_str())
    }

    pub(crate) fn get<'a>(
        &self,
        instance: &'a dyn Reflect,
        member: &str,
    ) -> Result<Value<'a>, AccessError> {
        let mut found_method = false;
        for routine in self.routines.iter().filter(|r| r.name == member) {
            match &routine.target {
                RoutineTarget::Read(accessor) => {
                    let value = accessor.read(instance)?;
                    return routine.conversion.apply(value);
                }
                RoutineTarget::Invoke { .. } => found_method = true,
            }
        }
        Err(self.miss(member, found_method, "property", "method"))
    }

    pub(crate) fn call<'a>(
        &self,
        instance: &'a dyn Reflect,
        member: &str,
        args: &[Value<'_>],
    ) -> Result<Value<'a>, AccessError> {
        let mut found_property = false;
        let mut declared_arity = None;
        let mut same_arity = false;
        // Same-arity overloads are told apart by the runtime arguments; ties
        // keep the first declared.
        let mut best: Option<(u32, &ForwardingRoutine, &Arc<dyn MethodAccessor>)> = None;
        for routine in self.routines.iter().filter(|r| r.name == member) {
            match &routine.target {
                RoutineTarget::Invoke { accessor, params } if params.len() == args.len() => {
                    same_arity = true;
                    let Some(total) = params
                        .iter()
                        .zip(args)
                        .map(|(shape, arg)| value_accepts(shape, arg).map(score))
                        .sum::<Option<u32>>()
                    else {
                        continue;
                    };
                    if best.as_ref().map_or(true, |(current, _, _)| total > *current) {
                        best = Some((total, routine, accessor));
                    }
                }
                RoutineTarget::Invoke { params, .. } => {
                    declared_arity.get_or_insert(params.len());
                }
                RoutineTarget::Read(_) => found_property = true,
            }
        }
        if let Some((_, routine, accessor)) = best {
            let value = if args.iter().any(Value::is_proxy) {
                let unwrapped: SmallVec<[Value<'_>; 4]> =
                    args.iter().map(Value::unwrap_proxy).collect();
                accessor.invoke(instance, &unwrapped)?
            } else {
                accessor.invoke(instance, args)?
            };
            return routine.conversion.apply(value);
        }
        if same_arity {
            return Err(AccessError::NoOverload {
                member: member.to_string(),
                expected: self.signatures(member),
                found: args
                    .iter()
                    .map(Value::kind_name)
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }
        if let Some(expected) = declared_arity {
            return Err(AccessError::Arity {
                member: member.to_string(),
                expected,
                found: args.len(),
            });
        }
        Err(self.miss(member, found_property, "method", "property"))
    }

    fn signatures(&self, member: &str) -> String {
        self.routines
            .iter()
            .filter(|r| r.name == member)
            .filter_map(|r| match &r.target {
                RoutineTarget::Invoke { params, .. } => Some(format!(
                    "{member}({})",
                    params.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
                )),
                RoutineTarget::Read(_) => None,
            })
            .collect::<Vec<_>>()
            .join(" | ")
    }

    fn miss(
        &self,
        member: &str,
        other_form: bool,
        expected: &'static str,
        found: &'static str,
    ) -> AccessError {
        if other_form {
            AccessError::WrongForm {
                member: member.to_string(),
                expected,
                found,
            }
        } else {
            AccessError::UnknownMember {
                contract: self.contract.name().to_string(),
                member: member.to_string(),
            }
        }
    }
}

impl fmt::Debug for ProxyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyDescriptor")
            .field("contract", &self.contract.name())
            .field("concrete", &self.concrete.name())
            .field("members", &self.member_names().collect::<Vec<_>>())
            .finish()
    }
}

struct ForwardingRoutine {
    name: String,
    target: RoutineTarget,
    conversion: Conversion,
}

enum RoutineTarget {
    Read(Arc<dyn PropertyAccessor>),
    Invoke {
        accessor: Arc<dyn MethodAccessor>,
        /// Contract parameter shapes, used to route between overloads.
        params: Vec<Shape>,
    },
}

enum Conversion {
    Identity,
    Nested(NestedLink),
}

impl Conversion {
    fn apply<'a>(&self, value: Value<'a>) -> Result<Value<'a>, AccessError> {
        let link = match self {
            Conversion::Identity => return Ok(value),
            Conversion::Nested(link) => link,
        };
        let instance = match value {
            Value::Unit => return Ok(Value::Unit),
            Value::Object(obj) => obj,
            Value::Proxy(adapter) => adapter.instance(),
            other => {
                return Err(AccessError::TypeMismatch {
                    expected: link.concrete.name().to_string(),
                    found: other.kind_name().to_string(),
                })
            }
        };
        let proxy = link.descriptor()?;
        Adapter::new(proxy, instance).map(Value::Proxy)
    }
}

/// Lazy link from a routine to the descriptor of a nested pair. Held weakly so
/// self-referential contracts do not keep their own descriptors alive.
struct NestedLink {
    contract: ContractRef,
    concrete: TypeRef,
    cache: Weak<Shared>,
    resolved: OnceLock<Result<Weak<ProxyDescriptor>, ProxyCompilationError>>,
}

impl NestedLink {
    fn descriptor(&self) -> Result<Arc<ProxyDescriptor>, AccessError> {
        let dropped = || AccessError::CacheDropped {
            contract: self.contract.name().to_string(),
        };
        let resolved = match self.resolved.get() {
            Some(resolved) => resolved,
            None => {
                let shared = self.cache.upgrade().ok_or_else(dropped)?;
                self.resolved.get_or_init(|| {
                    cache::get_or_create(&shared, &self.contract, &self.concrete)
                        .map(|proxy| Arc::downgrade(&proxy))
                })
            }
        };
        match resolved {
            Ok(proxy) => proxy.upgrade().ok_or_else(dropped),
            Err(err) => Err(AccessError::Unresolved(err.clone())),
        }
    }
}
