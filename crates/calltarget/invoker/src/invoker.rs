//! Invocation façade: the entry points instrumented call sites use.

use std::any::{Any, TypeId};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use calltarget_ducktype::{Describe, ProxyCache, Reflect, TypeRef};
use smallvec::{smallvec, SmallVec};
use tracing::{error, instrument, warn};

use crate::cache::{DispatchCache, DispatchCell, DispatchKey, DispatchStats, Site};
use crate::compiler::DispatchCompiler;
use crate::config::InvokerConfig;
use crate::envelope::{ReturnEnvelope, StateEnvelope};
use crate::error::HookExecutionError;
use crate::hook::{Exception, HookKind, IntegrationRef};
use crate::path::{DispatchPath, PathFailure, ReturnOutcome};

/// Receives hook failures and panics. Adaptation failures never reach it.
pub trait HookErrorPolicy: Send + Sync {
    fn on_hook_error(&self, error: &HookExecutionError);
}

/// Default policy: log at error level.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogHookErrors;

impl HookErrorPolicy for LogHookErrors {
    fn on_hook_error(&self, err: &HookExecutionError) {
        error!(
            integration = %err.integration(),
            kind = %err.kind(),
            error = %err,
            "hook execution failed"
        );
    }
}

/// Dispatches instrumented calls to integration hooks.
///
/// Every entry point is infallible from the caller's point of view: when a
/// hook cannot be bound, is disabled, fails or panics, the inert envelope (or
/// the original return value) comes back and the call proceeds unmodified.
pub struct Invoker {
    config: InvokerConfig,
    proxies: ProxyCache,
    compiler: DispatchCompiler,
    dispatch: DispatchCache,
    policy: Arc<dyn HookErrorPolicy>,
}

impl Invoker {
    pub fn new(config: InvokerConfig) -> Self {
        Self::with_proxies(config, ProxyCache::new())
    }

    /// Share an existing proxy cache.
    pub fn with_proxies(config: InvokerConfig, proxies: ProxyCache) -> Self {
        Self {
            config,
            compiler: DispatchCompiler::new(proxies.clone()),
            proxies,
            dispatch: DispatchCache::new(),
            policy: Arc::new(LogHookErrors),
        }
    }

    pub fn with_error_policy(mut self, policy: Arc<dyn HookErrorPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &InvokerConfig {
        &self.config
    }

    pub fn proxies(&self) -> &ProxyCache {
        &self.proxies
    }

    pub fn stats(&self) -> DispatchStats {
        self.dispatch.stats()
    }

    pub fn begin0<T: Describe>(&self, integration: &IntegrationRef, instance: &T) -> StateEnvelope {
        self.begin_fast(integration, instance, &[])
    }

    pub fn begin1<T, A0>(&self, integration: &IntegrationRef, instance: &T, a0: &A0) -> StateEnvelope
    where
        T: Describe,
        A0: Describe,
    {
        self.begin_fast(integration, instance, &[a0])
    }

    pub fn begin2<T, A0, A1>(
        &self,
        integration: &IntegrationRef,
        instance: &T,
        a0: &A0,
        a1: &A1,
    ) -> StateEnvelope
    where
        T: Describe,
        A0: Describe,
        A1: Describe,
    {
        self.begin_fast(integration, instance, &[a0, a1])
    }

    pub fn begin3<T, A0, A1, A2>(
        &self,
        integration: &IntegrationRef,
        instance: &T,
        a0: &A0,
        a1: &A1,
        a2: &A2,
    ) -> StateEnvelope
    where
        T: Describe,
        A0: Describe,
        A1: Describe,
        A2: Describe,
    {
        self.begin_fast(integration, instance, &[a0, a1, a2])
    }

    pub fn begin4<T, A0, A1, A2, A3>(
        &self,
        integration: &IntegrationRef,
        instance: &T,
        a0: &A0,
        a1: &A1,
        a2: &A2,
        a3: &A3,
    ) -> StateEnvelope
    where
        T: Describe,
        A0: Describe,
        A1: Describe,
        A2: Describe,
        A3: Describe,
    {
        self.begin_fast(integration, instance, &[a0, a1, a2, a3])
    }

    #[allow(clippy::too_many_arguments)]
    pub fn begin5<T, A0, A1, A2, A3, A4>(
        &self,
        integration: &IntegrationRef,
        instance: &T,
        a0: &A0,
        a1: &A1,
        a2: &A2,
        a3: &A3,
        a4: &A4,
    ) -> StateEnvelope
    where
        T: Describe,
        A0: Describe,
        A1: Describe,
        A2: Describe,
        A3: Describe,
        A4: Describe,
    {
        self.begin_fast(integration, instance, &[a0, a1, a2, a3, a4])
    }

    #[allow(clippy::too_many_arguments)]
    pub fn begin6<T, A0, A1, A2, A3, A4, A5>(
        &self,
        integration: &IntegrationRef,
        instance: &T,
        a0: &A0,
        a1: &A1,
        a2: &A2,
        a3: &A3,
        a4: &A4,
        a5: &A5,
    ) -> StateEnvelope
    where
        T: Describe,
        A0: Describe,
        A1: Describe,
        A2: Describe,
        A3: Describe,
        A4: Describe,
        A5: Describe,
    {
        self.begin_fast(integration, instance, &[a0, a1, a2, a3, a4, a5])
    }

    /// Begin for any arity. Argument types are inspected per call, so this is
    /// slower than the fixed-arity entry points.
    #[instrument(level = "trace", skip_all, fields(integration = %integration.name(), argc = args.len()))]
    pub fn begin_args<T: Describe>(
        &self,
        integration: &IntegrationRef,
        instance: &T,
        args: &[&dyn Reflect],
    ) -> StateEnvelope {
        if !self.config.is_integration_enabled(integration.name()) {
            return StateEnvelope::inert();
        }
        let kind = HookKind::BeginSlow;
        let site = Site {
            integration: integration.name(),
            kind,
            target: instance,
        };
        let cell = self.dispatch.cell(DispatchKey::new(
            integration,
            kind,
            TypeId::of::<T>(),
            SmallVec::new(),
        ));
        let path = self.dispatch.ready(&cell, &site, || {
            self.compiler
                .compile_begin_slow(integration, &T::describe())
                .map(DispatchPath::BeginSlow)
        });
        let Some(path) = path.and_then(DispatchPath::as_begin_slow) else {
            return StateEnvelope::inert();
        };
        self.dispatch.record_slow();
        let outcome = guard(|| path.invoke(integration.name(), instance, args, &self.proxies));
        self.settle(&cell, &site, outcome).unwrap_or_default()
    }

    /// End hook for calls without a return value.
    pub fn end<T: Describe>(
        &self,
        integration: &IntegrationRef,
        instance: &T,
        exception: Option<Exception<'_>>,
        state: &StateEnvelope,
    ) -> ReturnEnvelope {
        if !self.config.is_integration_enabled(integration.name()) {
            return ReturnEnvelope::inert();
        }
        let kind = HookKind::End;
        let site = Site {
            integration: integration.name(),
            kind,
            target: instance,
        };
        let cell = self.dispatch.cell(DispatchKey::new(
            integration,
            kind,
            TypeId::of::<T>(),
            SmallVec::new(),
        ));
        let path = self.dispatch.ready(&cell, &site, || {
            self.compiler
                .compile_end(integration, &T::describe())
                .map(DispatchPath::End)
        });
        let Some(path) = path.and_then(DispatchPath::as_end) else {
            return ReturnEnvelope::inert();
        };
        self.dispatch.record_fast();
        let outcome = guard(|| {
            path.invoke(
                integration.name(),
                instance,
                exception,
                state,
                &self.proxies,
            )
        });
        self.settle(&cell, &site, outcome).unwrap_or_default()
    }

    /// End hook for calls returning `R`. The hook may override the value;
    /// on any failure the original value is returned unchanged.
    pub fn end_with_return<T: Describe, R: Describe>(
        &self,
        integration: &IntegrationRef,
        instance: &T,
        return_value: R,
        exception: Option<Exception<'_>>,
        state: &StateEnvelope,
    ) -> ReturnEnvelope<R> {
        self.end_returning(
            HookKind::EndReturn,
            integration,
            instance,
            return_value,
            exception,
            state,
        )
    }

    /// End hook for asynchronous calls, invoked once the awaited result is
    /// available.
    pub fn end_async<T: Describe, R: Describe>(
        &self,
        integration: &IntegrationRef,
        instance: &T,
        return_value: R,
        exception: Option<Exception<'_>>,
        state: &StateEnvelope,
    ) -> ReturnEnvelope<R> {
        self.end_returning(
            HookKind::AsyncEnd,
            integration,
            instance,
            return_value,
            exception,
            state,
        )
    }

    fn begin_fast(
        &self,
        integration: &IntegrationRef,
        instance: &dyn Reflect,
        args: &[&dyn Reflect],
    ) -> StateEnvelope {
        if !self.config.is_integration_enabled(integration.name()) {
            return StateEnvelope::inert();
        }
        let kind = HookKind::Begin;
        let site = Site {
            integration: integration.name(),
            kind,
            target: instance,
        };
        let arg_ids: SmallVec<[TypeId; 6]> = args.iter().map(|a| a.concrete_type_id()).collect();
        let cell = self.dispatch.cell(DispatchKey::new(
            integration,
            kind,
            instance.concrete_type_id(),
            arg_ids,
        ));
        let path = self.dispatch.ready(&cell, &site, || {
            let arg_types: SmallVec<[TypeRef; 6]> = args.iter().map(|a| a.type_descriptor()).collect();
            self.compiler
                .compile_begin(integration, &instance.type_descriptor(), &arg_types)
                .map(DispatchPath::Begin)
        });
        let Some(path) = path.and_then(DispatchPath::as_begin) else {
            return StateEnvelope::inert();
        };
        self.dispatch.record_fast();
        let outcome = guard(|| path.invoke(integration.name(), instance, args, &self.proxies));
        self.settle(&cell, &site, outcome).unwrap_or_default()
    }

    fn end_returning<R: Describe>(
        &self,
        kind: HookKind,
        integration: &IntegrationRef,
        instance: &dyn Reflect,
        value: R,
        exception: Option<Exception<'_>>,
        state: &StateEnvelope,
    ) -> ReturnEnvelope<R> {
        if !self.config.is_integration_enabled(integration.name()) {
            return ReturnEnvelope::new(value);
        }
        let site = Site {
            integration: integration.name(),
            kind,
            target: instance,
        };
        let cell = self.dispatch.cell(DispatchKey::new(
            integration,
            kind,
            instance.concrete_type_id(),
            smallvec![TypeId::of::<R>()],
        ));
        let path = self.dispatch.ready(&cell, &site, || {
            self.compiler
                .compile_end_return(integration, kind, &instance.type_descriptor(), &R::describe())
                .map(DispatchPath::EndReturn)
        });
        let Some(path) = path.and_then(DispatchPath::as_end_return) else {
            return ReturnEnvelope::new(value);
        };
        self.dispatch.record_fast();
        let outcome = guard(|| {
            path.invoke(
                integration.name(),
                instance,
                &value,
                exception,
                state,
                &self.proxies,
            )
        });

        match self.settle(&cell, &site, outcome) {
            Some(ReturnOutcome::Replaced(replacement)) => {
                match replacement.into_any().downcast::<R>() {
                    Ok(replacement) => ReturnEnvelope::new(*replacement),
                    Err(_) => {
                        warn!(
                            integration = %integration.name(),
                            %kind,
                            expected = %R::describe().name(),
                            "replacement return value has the wrong type, keeping the original"
                        );
                        ReturnEnvelope::new(value)
                    }
                }
            }
            Some(ReturnOutcome::Foreign(found)) => {
                warn!(
                    integration = %integration.name(),
                    %kind,
                    found = %found,
                    "hook returned a borrowed value other than the original, keeping the original"
                );
                ReturnEnvelope::new(value)
            }
            Some(ReturnOutcome::Unchanged) | None => ReturnEnvelope::new(value),
        }
    }

    /// Route a path outcome: adaptation failures trip the breaker, hook
    /// failures go to the policy.
    fn settle<T>(
        &self,
        cell: &DispatchCell,
        site: &Site<'_>,
        outcome: Result<Result<T, PathFailure>, String>,
    ) -> Option<T> {
        let failure = match outcome {
            Ok(Ok(value)) => return Some(value),
            Ok(Err(PathFailure::Adaptation(err))) => {
                self.dispatch.trip(cell, site, &err);
                return None;
            }
            Ok(Err(PathFailure::Hook(source))) => HookExecutionError::Failed {
                integration: site.integration.to_string(),
                kind: site.kind,
                source,
            },
            Err(message) => HookExecutionError::Panicked {
                integration: site.integration.to_string(),
                kind: site.kind,
                message,
            },
        };
        self.dispatch.record_hook_failure();
        self.policy.on_hook_error(&failure);
        None
    }
}

impl std::fmt::Debug for Invoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invoker")
            .field("config", &self.config)
            .field("dispatch", &self.dispatch)
            .finish_non_exhaustive()
    }
}

/// Run a hook, turning a panic into its message.
fn guard<T>(hook: impl FnOnce() -> Result<T, PathFailure>) -> Result<Result<T, PathFailure>, String> {
    panic::catch_unwind(AssertUnwindSafe(hook)).map_err(panic_message)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
