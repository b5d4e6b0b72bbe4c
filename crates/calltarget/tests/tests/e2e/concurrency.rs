//! End-to-end test: concurrent first use compiles each proxy and dispatch
//! path exactly once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use calltarget_ducktype::Describe;
use calltarget_invoker::{HookParam, HookSignature, Integration, Invoker, InvokerConfig, StateEnvelope};
use calltarget_tests::{counting_cache, has_path, has_status_code, Request, Response};

const CALLERS: usize = 16;

#[test]
fn concurrent_first_use_compiles_one_proxy() {
    let (cache, resolver) = counting_cache();
    let barrier = Barrier::new(CALLERS);
    let contract = has_status_code();

    let proxies = thread::scope(|scope| {
        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    cache.get_or_create(&contract, &Response::describe()).unwrap()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect::<Vec<_>>()
    });

    assert_eq!(proxies.len(), CALLERS);
    assert!(proxies.iter().all(|p| Arc::ptr_eq(p, &proxies[0])));
    assert_eq!(resolver.resolutions(), 1);
    assert_eq!(cache.stats().compiled, 1);
}

#[test]
fn concurrent_failures_are_cached_once() {
    let (cache, resolver) = counting_cache();
    let barrier = Barrier::new(CALLERS);
    let contract = has_path();

    let errors = thread::scope(|scope| {
        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    cache.get_or_create(&contract, &Response::describe()).unwrap_err()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect::<Vec<_>>()
    });

    assert!(errors.iter().all(|e| e == &errors[0]));
    assert_eq!(resolver.resolutions(), 1);
    assert_eq!(cache.stats().failed, 1);
}

#[test]
fn concurrent_dispatch_compiles_one_path() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&invocations);
    let integration = Integration::builder("http.server")
        .begin(
            HookSignature::new()
                .constrained("TTarget", &has_path())
                .param(HookParam::Generic(0)),
            move |call| {
                counter.fetch_add(1, Ordering::SeqCst);
                call.instance().expect("instance").get("Path")?;
                Ok(StateEnvelope::active())
            },
        )
        .build();
    let invoker = Invoker::new(InvokerConfig::default());
    let barrier = Barrier::new(CALLERS);

    let active = thread::scope(|scope| {
        let handles: Vec<_> = (0..CALLERS)
            .map(|i| {
                let invoker = &invoker;
                let integration = &integration;
                let barrier = &barrier;
                scope.spawn(move || {
                    let request = Request::get(&format!("/{i}"));
                    barrier.wait();
                    invoker.begin0(integration, &request).is_active()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|active| *active)
            .count()
    });

    assert_eq!(active, CALLERS);
    assert_eq!(invocations.load(Ordering::SeqCst), CALLERS);
    let stats = invoker.stats();
    assert_eq!(stats.compiled, 1);
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.fast_invocations, CALLERS as u64);
    assert_eq!(invoker.proxies().stats().compiled, 1);
}
