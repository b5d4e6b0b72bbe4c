//! Hook descriptors: integrations, their signatures, and the call views
//! handed to hook bodies.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use calltarget_ducktype::{
    Adapter, ContractRef, Describe, ProxyCache, ProxyCompilationError, Reflect, TypeRef,
};
use smallvec::SmallVec;

use crate::envelope::{ReturnEnvelope, StateEnvelope};
use crate::error::HookError;
use crate::slot::Slot;

/// Exception observed by the instrumented call, if any.
pub type Exception<'a> = &'a (dyn Error + Send + Sync + 'static);

pub type IntegrationRef = Arc<Integration>;

pub type BeginBody = dyn for<'a> Fn(&BeginCall<'a>) -> Result<StateEnvelope, HookError> + Send + Sync;
pub type EndBody = dyn for<'a> Fn(&EndCall<'a>) -> Result<ReturnEnvelope, HookError> + Send + Sync;
pub type EndReturnBody =
    dyn for<'a> Fn(EndReturnCall<'a>) -> Result<ReturnEnvelope<Slot<'a>>, HookError> + Send + Sync;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookKind {
    Begin,
    BeginSlow,
    End,
    EndReturn,
    AsyncEnd,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HookKind::Begin => "begin",
            HookKind::BeginSlow => "begin (slow path)",
            HookKind::End => "end",
            HookKind::EndReturn => "end with return",
            HookKind::AsyncEnd => "async end",
        };
        f.write_str(name)
    }
}

/// A generic type slot of a hook, optionally constrained to a contract.
#[derive(Clone)]
pub struct GenericSlot {
    name: String,
    constraint: Option<ContractRef>,
}

impl GenericSlot {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn constraint(&self) -> Option<&ContractRef> {
        self.constraint.as_ref()
    }
}

impl fmt::Debug for GenericSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericSlot")
            .field("name", &self.name)
            .field("constraint", &self.constraint.as_ref().map(|c| c.name()))
            .finish()
    }
}

/// One declared hook parameter.
#[derive(Clone, Debug)]
pub enum HookParam {
    /// Bound to the concrete type found at this position.
    Generic(usize),
    /// A fixed concrete type. The argument must be assignable to it and is
    /// handed over as the caller's type, not converted: `Fixed(Option<String>)`
    /// may receive a `String`, an enum parameter the caller's enum. Downcast
    /// to the caller's type or inspect `Slot::instance().type_descriptor()`.
    Fixed(TypeRef),
    Exception,
    State,
}

impl HookParam {
    pub fn fixed<T: Describe>() -> Self {
        HookParam::Fixed(T::describe())
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            HookParam::Generic(_) => "a generic parameter",
            HookParam::Fixed(_) => "a fixed parameter",
            HookParam::Exception => "the exception parameter",
            HookParam::State => "the state parameter",
        }
    }
}

/// Generic slots plus ordered parameters of one hook.
#[derive(Clone, Debug, Default)]
pub struct HookSignature {
    generics: Vec<GenericSlot>,
    params: Vec<HookParam>,
}

impl HookSignature {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an unconstrained generic slot.
    pub fn generic(mut self, name: impl Into<String>) -> Self {
        self.generics.push(GenericSlot {
            name: name.into(),
            constraint: None,
        });
        self
    }

    /// Declare a generic slot constrained to `contract`.
    pub fn constrained(mut self, name: impl Into<String>, contract: &ContractRef) -> Self {
        self.generics.push(GenericSlot {
            name: name.into(),
            constraint: Some(Arc::clone(contract)),
        });
        self
    }

    pub fn param(mut self, param: HookParam) -> Self {
        self.params.push(param);
        self
    }

    pub fn generics(&self) -> &[GenericSlot] {
        &self.generics
    }

    pub fn params(&self) -> &[HookParam] {
        &self.params
    }
}

/// A hook body together with its declared signature.
pub struct Hook<B: ?Sized> {
    signature: HookSignature,
    body: Arc<B>,
}

impl<B: ?Sized> Hook<B> {
    pub fn signature(&self) -> &HookSignature {
        &self.signature
    }

    pub(crate) fn body(&self) -> Arc<B> {
        Arc::clone(&self.body)
    }
}

impl<B: ?Sized> fmt::Debug for Hook<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// A named set of hooks observing one kind of call.
#[derive(Debug)]
pub struct Integration {
    name: String,
    begin: Option<Hook<BeginBody>>,
    end: Option<Hook<EndBody>>,
    end_return: Option<Hook<EndReturnBody>>,
    async_end: Option<Hook<EndReturnBody>>,
}

impl Integration {
    pub fn builder(name: impl Into<String>) -> IntegrationBuilder {
        IntegrationBuilder {
            integration: Integration {
                name: name.into(),
                begin: None,
                end: None,
                end_return: None,
                async_end: None,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn begin(&self) -> Option<&Hook<BeginBody>> {
        self.begin.as_ref()
    }

    pub fn end(&self) -> Option<&Hook<EndBody>> {
        self.end.as_ref()
    }

    pub fn end_with_return(&self) -> Option<&Hook<EndReturnBody>> {
        self.end_return.as_ref()
    }

    pub fn async_end(&self) -> Option<&Hook<EndReturnBody>> {
        self.async_end.as_ref()
    }
}

pub struct IntegrationBuilder {
    integration: Integration,
}

impl IntegrationBuilder {
    pub fn begin<F>(mut self, signature: HookSignature, body: F) -> Self
    where
        F: for<'a> Fn(&BeginCall<'a>) -> Result<StateEnvelope, HookError> + Send + Sync + 'static,
    {
        self.integration.begin = Some(Hook {
            signature,
            body: Arc::new(body),
        });
        self
    }

    pub fn end<F>(mut self, signature: HookSignature, body: F) -> Self
    where
        F: for<'a> Fn(&EndCall<'a>) -> Result<ReturnEnvelope, HookError> + Send + Sync + 'static,
    {
        self.integration.end = Some(Hook {
            signature,
            body: Arc::new(body),
        });
        self
    }

    pub fn end_with_return<F>(mut self, signature: HookSignature, body: F) -> Self
    where
        F: for<'a> Fn(EndReturnCall<'a>) -> Result<ReturnEnvelope<Slot<'a>>, HookError>
            + Send
            + Sync
            + 'static,
    {
        self.integration.end_return = Some(Hook {
            signature,
            body: Arc::new(body),
        });
        self
    }

    pub fn async_end<F>(mut self, signature: HookSignature, body: F) -> Self
    where
        F: for<'a> Fn(EndReturnCall<'a>) -> Result<ReturnEnvelope<Slot<'a>>, HookError>
            + Send
            + Sync
            + 'static,
    {
        self.integration.async_end = Some(Hook {
            signature,
            body: Arc::new(body),
        });
        self
    }

    pub fn build(self) -> IntegrationRef {
        Arc::new(self.integration)
    }
}

/// What a begin hook sees.
pub struct BeginCall<'a> {
    pub(crate) integration: &'a str,
    pub(crate) instance: Option<Slot<'a>>,
    pub(crate) args: SmallVec<[Slot<'a>; 6]>,
    pub(crate) proxies: &'a ProxyCache,
}

impl<'a> BeginCall<'a> {
    pub fn integration(&self) -> &str {
        self.integration
    }

    /// The target instance, when the hook declares it.
    pub fn instance(&self) -> Option<&Slot<'a>> {
        self.instance.as_ref()
    }

    pub fn arg(&self, position: usize) -> Option<&Slot<'a>> {
        self.args.get(position)
    }

    pub fn args(&self) -> &[Slot<'a>] {
        &self.args
    }

    /// Adapt any value to a contract at run time.
    pub fn duck_cast<'v>(
        &self,
        contract: &ContractRef,
        value: &'v dyn Reflect,
    ) -> Result<Adapter<'v>, ProxyCompilationError> {
        self.proxies.create(contract, value)
    }
}

/// What an end hook without a return value sees.
pub struct EndCall<'a> {
    pub(crate) integration: &'a str,
    pub(crate) instance: Option<Slot<'a>>,
    pub(crate) exception: Option<Exception<'a>>,
    pub(crate) state: &'a StateEnvelope,
    pub(crate) proxies: &'a ProxyCache,
}

impl<'a> EndCall<'a> {
    pub fn integration(&self) -> &str {
        self.integration
    }

    pub fn instance(&self) -> Option<&Slot<'a>> {
        self.instance.as_ref()
    }

    pub fn exception(&self) -> Option<Exception<'a>> {
        self.exception
    }

    pub fn state(&self) -> &'a StateEnvelope {
        self.state
    }

    pub fn duck_cast<'v>(
        &self,
        contract: &ContractRef,
        value: &'v dyn Reflect,
    ) -> Result<Adapter<'v>, ProxyCompilationError> {
        self.proxies.create(contract, value)
    }
}

/// What an end hook with a return value sees. Passed by value so the hook can
/// hand `return_value` back unchanged.
pub struct EndReturnCall<'a> {
    pub integration: &'a str,
    pub instance: Option<Slot<'a>>,
    pub return_value: Slot<'a>,
    pub exception: Option<Exception<'a>>,
    pub state: &'a StateEnvelope,
    pub(crate) proxies: &'a ProxyCache,
}

impl<'a> EndReturnCall<'a> {
    /// Leave the return value as it is.
    pub fn pass_through(self) -> Result<ReturnEnvelope<Slot<'a>>, HookError> {
        Ok(ReturnEnvelope::new(self.return_value))
    }

    pub fn duck_cast<'v>(
        &self,
        contract: &ContractRef,
        value: &'v dyn Reflect,
    ) -> Result<Adapter<'v>, ProxyCompilationError> {
        self.proxies.create(contract, value)
    }
}
