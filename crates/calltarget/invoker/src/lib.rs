//! Call-target invoker.
//!
//! Instrumented call sites call [`Invoker`] entry points at method entry and
//! exit. Each (integration, hook kind, target type, argument types) tuple gets
//! a dispatch path compiled once: argument binders that pass values through
//! or adapt them to the hook's contracts, plus the hook body. A tuple whose
//! adaptation fails is disabled for the rest of the process by its circuit
//! breaker; the instrumented call always proceeds.
//!
//! ```ignore
//! let integration = Integration::builder("http.client")
//!     .begin(
//!         HookSignature::new()
//!             .constrained("TTarget", &has_path)
//!             .param(HookParam::Generic(0)),
//!         |call| {
//!             let path = call.instance().map(|i| i.get("Path")).transpose()?;
//!             Ok(StateEnvelope::new(path.and_then(|p| p.as_str().map(str::to_owned))))
//!         },
//!     )
//!     .build();
//!
//! let invoker = Invoker::new(InvokerConfig::load(None)?);
//! let state = invoker.begin0(&integration, &request);
//! // ... the instrumented call ...
//! invoker.end(&integration, &request, None, &state);
//! ```

#![deny(unsafe_code)]

pub mod breaker;
pub mod cache;
mod compiler;
pub mod config;
pub mod envelope;
pub mod error;
pub mod hook;
pub mod invoker;
pub mod logging;
mod path;
pub mod slot;

pub use breaker::CircuitBreaker;
pub use cache::{DispatchCache, DispatchStats};
pub use config::{InvokerConfig, LoggingConfig};
pub use envelope::{ReturnEnvelope, StateEnvelope};
pub use error::{
    AdaptationError, DispatchBuildError, HookError, HookExecutionError, InvokerError,
};
pub use hook::{
    BeginCall, EndCall, EndReturnCall, Exception, GenericSlot, Hook, HookKind, HookParam,
    HookSignature, Integration, IntegrationBuilder, IntegrationRef,
};
pub use invoker::{HookErrorPolicy, Invoker, LogHookErrors};
pub use logging::init_logging;
pub use slot::Slot;

pub use calltarget_ducktype as ducktype;
