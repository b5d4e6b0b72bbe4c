//! Property tests: dispatch is compiled once per type tuple and hooks see the
//! values the call site passed, whatever they are.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use calltarget_invoker::{
    HookParam, HookSignature, Integration, Invoker, InvokerConfig, StateEnvelope,
};
use calltarget_tests::{has_path, has_status_code, Request, Response};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn arb_path() -> impl Strategy<Value = String> {
    "(/[a-z0-9]{1,8}){0,4}".prop_map(|p| if p.is_empty() { "/".to_string() } else { p })
}

fn arb_response() -> impl Strategy<Value = Response> {
    (100u16..600, prop::collection::hash_map("[a-z-]{1,12}", "[ -~]{0,16}", 0..6)).prop_map(
        |(status_code, headers): (u16, HashMap<String, String>)| Response {
            status_code,
            headers,
        },
    )
}

fn arb_integration_names() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z]{1,6}\\.[a-z]{1,6}", 0..5)
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// Every call observes its own request path; one path is compiled no
    /// matter how many calls are made.
    #[test]
    fn begin_hook_sees_every_path(paths in prop::collection::vec(arb_path(), 1..16)) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let integration = Integration::builder("http.server")
            .begin(
                HookSignature::new()
                    .generic("TTarget")
                    .constrained("TRequest", &has_path())
                    .param(HookParam::Generic(1)),
                move |call| {
                    let path = call.arg(0).expect("request").get("Path")?;
                    sink.lock().unwrap().push(path.as_str().unwrap_or_default().to_string());
                    Ok(StateEnvelope::active())
                },
            )
            .build();
        let invoker = Invoker::new(InvokerConfig::default());

        for path in &paths {
            let request = Request::get(path);
            prop_assert!(invoker.begin1(&integration, &(), &request).is_active());
        }

        prop_assert_eq!(&*seen.lock().unwrap(), &paths);
        prop_assert_eq!(invoker.stats().compiled, 1);
    }

    /// Status codes read through a contract equal the concrete field.
    #[test]
    fn status_code_round_trips_through_adapter(response in arb_response()) {
        let invoker = Invoker::new(InvokerConfig::default());
        let adapter = invoker.proxies().create(&has_status_code(), &response).unwrap();
        prop_assert_eq!(
            adapter.get("StatusCode").unwrap().as_int(),
            Some(i64::from(response.status_code))
        );
    }

    /// An integration is dispatched exactly when it is not listed as disabled.
    #[test]
    fn disable_list_is_exact(disabled in arb_integration_names(), queried in "[a-z]{1,6}\\.[a-z]{1,6}") {
        let config = InvokerConfig {
            disabled_integrations: disabled.clone(),
            ..Default::default()
        };
        prop_assert_eq!(config.is_integration_enabled(&queried), !disabled.contains(&queried));
        for name in &disabled {
            prop_assert!(!config.is_integration_enabled(name));
        }
    }
}
