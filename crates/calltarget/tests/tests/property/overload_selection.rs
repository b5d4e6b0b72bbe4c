//! Property tests: overload selection and value normalization through
//! adapters.

use std::sync::OnceLock;

use calltarget_ducktype::{Contract, ContractRef, Describe, ProxyCache, Shape, TypeDescriptor, TypeRef, Value};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Meter {
    level: i64,
}

impl Describe for Meter {
    fn describe() -> TypeRef {
        static DESCRIPTOR: OnceLock<TypeRef> = OnceLock::new();
        DESCRIPTOR
            .get_or_init(|| {
                TypeDescriptor::record::<Meter>("Meter")
                    .property("Level", i64::describe, |m| Value::from(m.level))
                    .method("Scale", &[i64::describe], i64::describe, |m, args| {
                        Ok(Value::from(m.level * args[0].as_int().unwrap_or_default()))
                    })
                    .method("Scale", &[f64::describe], f64::describe, |m, args| {
                        Ok(Value::from(m.level as f64 * args[0].as_float().unwrap_or_default()))
                    })
                    .build()
            })
            .clone()
    }
}

fn int_scale() -> ContractRef {
    static CONTRACT: OnceLock<ContractRef> = OnceLock::new();
    CONTRACT
        .get_or_init(|| {
            Contract::builder("IntScale")
                .method("Scale", vec![Shape::int()], Shape::int())
                .build()
        })
        .clone()
}

fn float_scale() -> ContractRef {
    static CONTRACT: OnceLock<ContractRef> = OnceLock::new();
    CONTRACT
        .get_or_init(|| {
            Contract::builder("FloatScale")
                .property("Level", Shape::float())
                .method("Scale", vec![Shape::float()], Shape::float())
                .build()
        })
        .clone()
}

fn both_scales() -> ContractRef {
    static CONTRACT: OnceLock<ContractRef> = OnceLock::new();
    CONTRACT
        .get_or_init(|| {
            Contract::builder("IScale")
                .method("Scale", vec![Shape::int()], Shape::int())
                .method("Scale", vec![Shape::float()], Shape::float())
                .build()
        })
        .clone()
}

fn cache() -> &'static ProxyCache {
    static CACHE: OnceLock<ProxyCache> = OnceLock::new();
    CACHE.get_or_init(ProxyCache::new)
}

fn arb_level() -> impl Strategy<Value = i64> {
    -10_000i64..10_000
}

fn arb_factor() -> impl Strategy<Value = f64> {
    (-1_000i32..1_000).prop_map(|n| f64::from(n) / 8.0)
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// An integer contract always binds the integer overload.
    #[test]
    fn int_contract_binds_int_overload(level in arb_level(), factor in -10_000i64..10_000) {
        let meter = Meter { level };
        let adapter = cache().create(&int_scale(), &meter).unwrap();
        let scaled = adapter.call("Scale", &[Value::Int(factor)]).unwrap();
        prop_assert_eq!(scaled.as_int(), Some(level * factor));
    }

    /// A float contract always binds the float overload, and widens integer
    /// members to floats on read.
    #[test]
    fn float_contract_binds_float_overload(level in arb_level(), factor in arb_factor()) {
        let meter = Meter { level };
        let adapter = cache().create(&float_scale(), &meter).unwrap();
        let scaled = adapter.call("Scale", &[Value::Float(factor)]).unwrap();
        prop_assert_eq!(scaled.as_float(), Some(level as f64 * factor));
        prop_assert_eq!(adapter.get("Level").unwrap().as_float(), Some(level as f64));
    }

    /// A contract declaring both overloads routes each call by the runtime
    /// argument.
    #[test]
    fn one_contract_routes_both_overloads(
        level in arb_level(),
        int_factor in -10_000i64..10_000,
        factor in arb_factor(),
    ) {
        let meter = Meter { level };
        let adapter = cache().create(&both_scales(), &meter).unwrap();

        let scaled = adapter.call("Scale", &[Value::Float(factor)]).unwrap();
        prop_assert_eq!(scaled.as_float(), Some(level as f64 * factor));
        prop_assert!(scaled.as_int().is_none());

        let scaled = adapter.call("Scale", &[Value::Int(int_factor)]).unwrap();
        prop_assert_eq!(scaled.as_int(), Some(level * int_factor));
    }

    /// Arity mismatches are reported, never panicked on.
    #[test]
    fn wrong_arity_is_an_error(level in arb_level(), extra in 0usize..4) {
        let meter = Meter { level };
        let adapter = cache().create(&int_scale(), &meter).unwrap();
        let args = vec![Value::Int(1); extra + 2];
        prop_assert!(adapter.call("Scale", &args).is_err());
        prop_assert!(adapter.call("Scale", &[]).is_err());
    }
}
