//! End-to-end test: end hooks observing and overriding return values, for
//! synchronous and asynchronous calls.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use calltarget_invoker::{
    HookParam, HookSignature, Integration, IntegrationRef, Invoker, InvokerConfig, ReturnEnvelope,
    Slot, StateEnvelope,
};
use calltarget_tests::{has_status_code, RecordingPolicy, Request, Response};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn end_signature() -> HookSignature {
    HookSignature::new()
        .generic("TTarget")
        .param(HookParam::Generic(0))
        .param(HookParam::fixed::<i64>())
        .param(HookParam::Exception)
        .param(HookParam::State)
}

/// Doubles an `i64` result unless the call failed.
fn doubling() -> IntegrationRef {
    Integration::builder("math.double")
        .end_with_return(end_signature(), |call| {
            if call.exception.is_some() {
                return call.pass_through();
            }
            let value = call.return_value.downcast_ref::<i64>().copied().unwrap_or_default();
            Ok(ReturnEnvelope::new(Slot::replaced(value * 2)))
        })
        .build()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn pass_through_returns_the_original_value() {
    let seen = Arc::new(AtomicI64::new(0));
    let sink = Arc::clone(&seen);
    let integration = Integration::builder("math.observe")
        .end_with_return(end_signature(), move |call| {
            let value = call.return_value.downcast_ref::<i64>().copied().unwrap_or(-1);
            sink.store(value, Ordering::SeqCst);
            call.pass_through()
        })
        .build();
    let invoker = Invoker::new(InvokerConfig::default());
    let target = Request::get("/");

    let returned = invoker.end_with_return(&integration, &target, 41i64, None, &StateEnvelope::inert());

    assert_eq!(returned.into_return_value(), 41);
    assert_eq!(seen.load(Ordering::SeqCst), 41);
}

#[test]
fn hook_can_override_the_return_value() {
    let invoker = Invoker::new(InvokerConfig::default());
    let target = Request::get("/");

    let returned = invoker.end_with_return(&doubling(), &target, 21i64, None, &StateEnvelope::inert());

    assert_eq!(*returned.return_value(), 42);
}

#[test]
fn exception_is_visible_to_the_end_hook() {
    let invoker = Invoker::new(InvokerConfig::default());
    let target = Request::get("/");
    let failure = std::fmt::Error;

    let returned =
        invoker.end_with_return(&doubling(), &target, 21i64, Some(&failure), &StateEnvelope::inert());

    assert_eq!(*returned.return_value(), 21);
}

#[test]
fn replacement_of_the_wrong_type_keeps_the_original() {
    let integration = Integration::builder("math.broken")
        .end_with_return(end_signature(), |_| {
            Ok(ReturnEnvelope::new(Slot::replaced(String::from("oops"))))
        })
        .build();
    let invoker = Invoker::new(InvokerConfig::default());

    let returned =
        invoker.end_with_return(&integration, &Request::get("/"), 7i64, None, &StateEnvelope::inert());

    assert_eq!(*returned.return_value(), 7);
    assert_eq!(invoker.stats().disabled, 0);
}

#[test]
fn unassignable_return_type_disables_the_tuple() {
    let policy = Arc::new(RecordingPolicy::default());
    let invoker = Invoker::new(InvokerConfig::default()).with_error_policy(policy.clone());
    let target = Request::get("/");

    // The hook declares an i64 return; an i32 call site cannot bind to it.
    let returned = invoker.end_with_return(&doubling(), &target, 3i32, None, &StateEnvelope::inert());

    assert_eq!(*returned.return_value(), 3);
    assert_eq!(invoker.stats().disabled, 1);
    assert!(policy.reports().is_empty());
}

#[test]
fn constrained_return_slot_exposes_contract_members() {
    let integration = Integration::builder("http.client")
        .end_with_return(
            HookSignature::new()
                .generic("TTarget")
                .constrained("TResponse", &has_status_code())
                .param(HookParam::Generic(1))
                .param(HookParam::Exception)
                .param(HookParam::State),
            |call| {
                let status = call.return_value.get("StatusCode")?.as_int().unwrap_or_default();
                if status >= 500 {
                    let fallback = Response {
                        status_code: 503,
                        headers: Default::default(),
                    };
                    return Ok(ReturnEnvelope::new(Slot::replaced(fallback)));
                }
                call.pass_through()
            },
        )
        .build();
    let invoker = Invoker::new(InvokerConfig::default());
    let target = Request::get("/");
    let failing = Response {
        status_code: 502,
        headers: Default::default(),
    };

    let ok = invoker.end_with_return(&integration, &target, Response::ok(), None, &StateEnvelope::inert());
    let replaced = invoker.end_with_return(&integration, &target, failing, None, &StateEnvelope::inert());

    assert_eq!(ok.return_value().status_code, 200);
    assert_eq!(replaced.return_value().status_code, 503);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn async_end_runs_once_the_result_is_available() {
    let integration = Integration::builder("job.run")
        .async_end(end_signature(), |call| {
            let value = call.return_value.downcast_ref::<i64>().copied().unwrap_or_default();
            Ok(ReturnEnvelope::new(Slot::replaced(value + 1)))
        })
        .build();
    let invoker = Arc::new(Invoker::new(InvokerConfig::default()));

    let tasks: Vec<_> = (0..8i64)
        .map(|i| {
            let invoker = Arc::clone(&invoker);
            let integration = Arc::clone(&integration);
            tokio::spawn(async move {
                let target = Request::get("/job");
                let result = tokio::task::spawn_blocking(move || i * 10).await.unwrap();
                invoker
                    .end_async(&integration, &target, result, None, &StateEnvelope::inert())
                    .into_return_value()
            })
        })
        .collect();

    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await.unwrap());
    }

    assert_eq!(results, (0..8i64).map(|i| i * 10 + 1).collect::<Vec<_>>());
    assert_eq!(invoker.stats().compiled, 1);
}

#[test]
fn async_end_and_end_with_return_are_separate_hooks() {
    let invoker = Invoker::new(InvokerConfig::default());
    let target = Request::get("/");

    // `doubling` declares no async end hook.
    let returned = invoker.end_async(&doubling(), &target, 4i64, None, &StateEnvelope::inert());

    assert_eq!(*returned.return_value(), 4);
    assert_eq!(invoker.stats().disabled, 1);
}
