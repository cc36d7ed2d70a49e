//! Payload codec property tests
//!
//! Property-based tests for the reference-table encoding.

use proptest::prelude::*;
use reinhardt_payload::{ReducerRegistry, ReviverRegistry, Value, parse, stringify};

fn leaf() -> impl Strategy<Value = Value> {
	prop_oneof![
		Just(Value::Undefined),
		Just(Value::Null),
		any::<bool>().prop_map(Value::Bool),
		(-1_000_000i64..1_000_000).prop_map(|n| Value::Number(n as f64 / 4.0)),
		prop_oneof![Just(f64::NAN), Just(f64::INFINITY), Just(-0.0)].prop_map(Value::Number),
		any::<i64>().prop_map(|n| Value::BigInt(n as i128)),
		".{0,12}".prop_map(Value::String),
	]
}

fn graph() -> impl Strategy<Value = Value> {
	leaf().prop_recursive(4, 32, 6, |inner| {
		prop_oneof![
			prop::collection::vec(inner.clone(), 0..6).prop_map(Value::array),
			prop::collection::vec(inner.clone(), 0..6).prop_map(Value::set),
			prop::collection::vec(("[a-z_<]{1,6}", inner.clone()), 0..6).prop_map(Value::object),
			prop::collection::vec((inner.clone(), inner.clone()), 0..4).prop_map(Value::map),
			inner.clone().prop_map(Value::new_ref),
			inner.clone().prop_map(Value::shallow_ref),
			prop::collection::vec(inner, 0..4).prop_map(|items| Value::reactive(Value::array(items))),
		]
	})
}

proptest! {
	/// Test: stringify / parse roundtrip
	///
	/// Category: Property
	/// Verifies that any acyclic graph decodes to a structurally equal graph.
	#[test]
	fn prop_stringify_parse_roundtrip(value in graph()) {
		let text = stringify(&value, &ReducerRegistry::builtin()).unwrap();
		let decoded = parse(&text, &ReviverRegistry::builtin()).unwrap();
		prop_assert_eq!(decoded, value);
	}

	/// Test: output never closes a script element
	///
	/// Category: Property
	/// Verifies that no `<` survives escaping, whatever the strings contain.
	#[test]
	fn prop_output_has_no_raw_angle_bracket(value in graph()) {
		let text = stringify(&value, &ReducerRegistry::builtin()).unwrap();
		prop_assert!(!text.contains('<'));
	}
}
