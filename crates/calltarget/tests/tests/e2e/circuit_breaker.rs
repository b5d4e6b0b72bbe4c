//! End-to-end test: adaptation failures disable a call site for good, while
//! hook failures and configuration switches leave dispatch state alone.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use calltarget_invoker::{
    HookError, HookParam, HookSignature, Integration, IntegrationRef, Invoker, InvokerConfig,
    StateEnvelope,
};
use calltarget_tests::{counting_cache, has_path, unsatisfiable, RecordingPolicy, Request, Response};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{Layer, Registry};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn path_reader(calls: Arc<AtomicUsize>) -> IntegrationRef {
    Integration::builder("http.server")
        .begin(
            HookSignature::new()
                .constrained("TTarget", &has_path())
                .param(HookParam::Generic(0)),
            move |call| {
                calls.fetch_add(1, Ordering::SeqCst);
                call.instance().expect("instance").get("Path")?;
                Ok(StateEnvelope::active())
            },
        )
        .build()
}

/// Collects every event's fields, including `message`.
#[derive(Clone, Default)]
struct CapturedEvents(Arc<Mutex<Vec<BTreeMap<String, String>>>>);

impl CapturedEvents {
    fn with_message(&self, message: &str) -> Vec<BTreeMap<String, String>> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|fields| fields.get("message").map(String::as_str) == Some(message))
            .cloned()
            .collect()
    }
}

struct FieldRecorder<'a>(&'a mut BTreeMap<String, String>);

impl Visit for FieldRecorder<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }
}

impl<S: Subscriber> Layer<S> for CapturedEvents {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = BTreeMap::new();
        fields.insert("level".to_string(), event.metadata().level().to_string());
        event.record(&mut FieldRecorder(&mut fields));
        self.0.lock().unwrap().push(fields);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn unsatisfiable_instance_contract_trips_once() {
    let (proxies, resolver) = counting_cache();
    let invoker = Invoker::with_proxies(InvokerConfig::default(), proxies);
    let calls = Arc::new(AtomicUsize::new(0));
    let integration = path_reader(Arc::clone(&calls));
    let response = Response::ok();

    let first = invoker.begin0(&integration, &response);
    let second = invoker.begin0(&integration, &response);

    assert!(!first.is_active());
    assert!(!second.is_active());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(resolver.resolutions(), 1);
    let stats = invoker.stats();
    assert_eq!(stats.disabled, 1);
    assert_eq!(stats.short_circuits, 1);
    assert_eq!(stats.compiled, 0);
}

#[test]
fn trip_logs_one_diagnostic_naming_the_member() {
    let captured = CapturedEvents::default();
    let subscriber = Registry::default().with(captured.clone());
    let invoker = Invoker::new(InvokerConfig::default());
    let integration = path_reader(Arc::new(AtomicUsize::new(0)));

    tracing::subscriber::with_default(subscriber, || {
        invoker.begin0(&integration, &Response::ok());
        invoker.begin0(&integration, &Response::ok());
    });

    let trips = captured.with_message("adaptation failed, call site disabled");
    assert_eq!(trips.len(), 1);
    let trip = &trips[0];
    assert_eq!(trip["level"], "WARN");
    assert_eq!(trip["member"], "Path");
    assert_eq!(trip["integration"], "http.server");
    assert_eq!(trip["target"], "Response");
}

#[test]
fn tripped_tuple_does_not_affect_other_target_types() {
    let invoker = Invoker::new(InvokerConfig::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let integration = path_reader(Arc::clone(&calls));

    assert!(!invoker.begin0(&integration, &Response::ok()).is_active());
    assert!(invoker.begin0(&integration, &Request::get("/ok")).is_active());

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(invoker.stats().entries, 2);
}

#[test]
fn failed_duck_cast_inside_hook_trips_the_breaker() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let integration = Integration::builder("grpc.client")
        .begin(
            HookSignature::new().generic("TTarget").param(HookParam::Generic(0)),
            move |call| {
                counter.fetch_add(1, Ordering::SeqCst);
                let target = call.instance().expect("instance").instance();
                call.duck_cast(&unsatisfiable(), target)?;
                Ok(StateEnvelope::active())
            },
        )
        .build();
    let invoker = Invoker::new(InvokerConfig::default());
    let request = Request::get("/svc");

    invoker.begin0(&integration, &request);
    invoker.begin0(&integration, &request);

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let stats = invoker.stats();
    assert_eq!(stats.disabled, 1);
    assert_eq!(stats.hook_failures, 0);
}

#[test]
fn hook_failures_are_reported_and_never_trip() {
    let policy = Arc::new(RecordingPolicy::default());
    let integration = Integration::builder("cache.get")
        .begin(
            HookSignature::new().generic("TTarget").param(HookParam::Generic(0)),
            |_| Err(HookError::failed("exporter unavailable")),
        )
        .build();
    let invoker = Invoker::new(InvokerConfig::default()).with_error_policy(policy.clone());
    let request = Request::get("/");

    for _ in 0..3 {
        assert!(!invoker.begin0(&integration, &request).is_active());
    }

    let stats = invoker.stats();
    assert_eq!(stats.hook_failures, 3);
    assert_eq!(stats.disabled, 0);
    assert_eq!(stats.fast_invocations, 3);
    let reports = policy.reports();
    assert_eq!(reports.len(), 3);
    assert!(reports[0].contains("cache.get"));
    assert!(reports[0].contains("exporter unavailable"));
}

#[test]
fn panicking_hook_is_reported_and_call_proceeds() {
    let policy = Arc::new(RecordingPolicy::default());
    let integration = Integration::builder("queue.publish")
        .begin(
            HookSignature::new().generic("TTarget").param(HookParam::Generic(0)),
            |_| panic!("serializer bug"),
        )
        .build();
    let invoker = Invoker::new(InvokerConfig::default()).with_error_policy(policy.clone());

    let state = invoker.begin0(&integration, &Request::get("/"));

    assert!(!state.is_active());
    assert!(policy.reports()[0].contains("panicked: serializer bug"));
    assert_eq!(invoker.stats().disabled, 0);
}

#[test]
fn disabled_integrations_are_skipped_without_compiling() {
    let config = InvokerConfig {
        disabled_integrations: vec!["http.server".to_string()],
        ..Default::default()
    };
    let invoker = Invoker::new(config);
    let calls = Arc::new(AtomicUsize::new(0));
    let integration = path_reader(Arc::clone(&calls));

    assert!(!invoker.begin0(&integration, &Request::get("/")).is_active());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(invoker.stats().entries, 0);
    assert!(invoker.proxies().is_empty());
}

#[test]
fn master_switch_turns_everything_off() {
    let config = InvokerConfig {
        enabled: false,
        ..Default::default()
    };
    let invoker = Invoker::new(config);
    let calls = Arc::new(AtomicUsize::new(0));
    let integration = path_reader(Arc::clone(&calls));

    let state = invoker.begin0(&integration, &Request::get("/"));
    let returned = invoker.end_with_return(&integration, &Request::get("/"), 5i64, None, &state);

    assert_eq!(*returned.return_value(), 5);
    assert_eq!(invoker.stats(), Default::default());
}
