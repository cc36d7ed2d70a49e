//! Payload codec integration tests
//!
//! Shared structure, cycles and custom tags through the public API.

use reinhardt_payload::{
	ErrorValue, Payload, PayloadCodec, PayloadError, PayloadFormat, ReducerRegistry, ReviverRegistry,
	Value, parse, stringify,
};
use rstest::*;
use std::sync::Arc;

#[rstest]
fn test_cyclic_graph_roundtrip() {
	let parent = Value::object([("name", Value::string("root"))]);
	let child = Value::object([("parent", parent.clone())]);
	if let Value::Object(map) = &parent {
		map.write().insert("children".into(), Value::array([child]));
	}

	let text = stringify(&parent, &ReducerRegistry::builtin()).unwrap();
	let decoded = parse(&text, &ReviverRegistry::builtin()).unwrap();

	assert_eq!(decoded, parent);
	let Value::Array(children) = decoded.get("children").unwrap() else {
		panic!("children must be an array");
	};
	let back = children.read()[0].get("parent").unwrap();
	let (Value::Object(a), Value::Object(b)) = (&back, &decoded) else {
		panic!("expected objects");
	};
	assert!(Arc::ptr_eq(a, b));
}

#[rstest]
fn test_reactive_state_roundtrip() {
	let todos = Value::reactive(Value::array([Value::object([
		("title", Value::string("write docs")),
		("done", Value::new_ref(Value::Bool(false))),
	])]));
	let text = stringify(&todos, &ReducerRegistry::builtin()).unwrap();
	assert_eq!(
		text,
		r#"[["Reactive",1],[2],{"title":3,"done":4},"write docs",["EmptyRef",5],"false"]"#
	);
	assert_eq!(parse(&text, &ReviverRegistry::builtin()).unwrap(), todos);
}

#[rstest]
fn test_custom_tag_roundtrip() {
	struct Money {
		cents: i64,
	}

	let mut reducers = ReducerRegistry::builtin();
	reducers.register("Money", |v: &Value| match v {
		Value::Custom(c) => c
			.downcast_ref::<Money>()
			.map(|m| Value::BigInt(m.cents as i128)),
		_ => None,
	});
	let mut revivers = ReviverRegistry::builtin();
	revivers.register("Money", |data: Value| match data {
		Value::BigInt(cents) => Value::custom(Money {
			cents: cents as i64,
		}),
		other => other,
	});

	let text = stringify(&Value::custom(Money { cents: 1250 }), &reducers).unwrap();
	assert_eq!(text, r#"[["Money",1],["BigInt","1250"]]"#);

	let Value::Custom(revived) = parse(&text, &revivers).unwrap() else {
		panic!("expected a custom value");
	};
	assert_eq!(revived.downcast_ref::<Money>().map(|m| m.cents), Some(1250));
}

#[rstest]
fn test_payload_decode_from_document_script() {
	let mut payload = Payload::server_rendered();
	payload.data_insert("user", Value::object([("id", Value::Number(7.0))]));
	payload.error = Some(ErrorValue::new(500, "boom"));

	let codec = PayloadCodec::new(PayloadFormat::Json);
	let script = codec.render_document_script(&payload, true, None).unwrap();
	let body = script
		.split_once('>')
		.and_then(|(_, rest)| rest.strip_suffix("</script>"))
		.unwrap();

	let decoded = codec.decode(body).unwrap();
	assert_eq!(decoded.data_get("user").and_then(|u| u.get("id")), Some(Value::Number(7.0)));
	assert_eq!(decoded.error.map(|e| e.message), Some("boom".to_string()));
}

#[rstest]
fn test_payload_root_must_be_object() {
	let codec = PayloadCodec::default();
	assert!(matches!(codec.decode("[1]"), Err(PayloadError::InvalidShape(_))));
}
