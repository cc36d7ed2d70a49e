//! Island fingerprints and keys.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Prop keys with this prefix are framework internals (scoped style ids)
/// and never part of a fingerprint.
pub const INTERNAL_PROP_PREFIX: &str = "data-v-";

/// Number of digest bytes kept in a fingerprint.
const FINGERPRINT_BYTES: usize = 10;

/// Drops internal props.
pub fn filter_props(props: &Map<String, Value>) -> Map<String, Value> {
	props
		.iter()
		.filter(|(key, _)| !key.starts_with(INTERNAL_PROP_PREFIX))
		.map(|(key, value)| (key.clone(), value.clone()))
		.collect()
}

/// Content hash identifying one `(name, props, context, source)` combination.
///
/// The inputs are hashed as canonical JSON (object keys sorted), so prop
/// order does not change the result.
///
/// ```
/// use reinhardt_islands::fingerprint;
/// use serde_json::json;
///
/// let a = json!({"x": 1, "y": 2});
/// let b = json!({"y": 2, "x": 1});
/// let (a, b) = (a.as_object().unwrap(), b.as_object().unwrap());
/// let empty = serde_json::Map::new();
/// assert_eq!(
/// 	fingerprint("Card", a, &empty, None),
/// 	fingerprint("Card", b, &empty, None),
/// );
/// assert_eq!(fingerprint("Card", a, &empty, None).len(), 20);
/// ```
pub fn fingerprint(
	name: &str,
	props: &Map<String, Value>,
	context: &Map<String, Value>,
	source: Option<&str>,
) -> String {
	let input = Value::Array(vec![
		Value::String(name.to_string()),
		canonical(&Value::Object(filter_props(props))),
		canonical(&Value::Object(context.clone())),
		source.map_or(Value::Null, |s| Value::String(s.to_string())),
	]);
	hex_prefix(&Sha256::digest(input.to_string().as_bytes()))
}

/// Short content hash of a string, used to key inline head entries.
pub fn content_hash(text: &str) -> String {
	hex_prefix(&Sha256::digest(text.as_bytes()))
}

fn hex_prefix(digest: &[u8]) -> String {
	digest[..FINGERPRINT_BYTES]
		.iter()
		.map(|byte| format!("{byte:02x}"))
		.collect()
}

fn canonical(value: &Value) -> Value {
	match value {
		Value::Object(map) => {
			let mut entries: Vec<_> = map.iter().collect();
			entries.sort_by(|a, b| a.0.cmp(b.0));
			Value::Object(
				entries
					.into_iter()
					.map(|(key, value)| (key.clone(), canonical(value)))
					.collect(),
			)
		}
		Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
		other => other.clone(),
	}
}

/// The cache and URL key of an island: `<name>_<fingerprint>`.
pub fn island_key(name: &str, fingerprint: &str) -> String {
	format!("{name}_{fingerprint}")
}

/// Splits an island key on its last `_` into name and fingerprint.
///
/// Component names may contain underscores; fingerprints never do.
pub fn parse_island_key(key: &str) -> Option<(&str, &str)> {
	let (name, fingerprint) = key.rsplit_once('_')?;
	(!name.is_empty()).then_some((name, fingerprint))
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use serde_json::json;

	fn object(value: Value) -> Map<String, Value> {
		match value {
			Value::Object(map) => map,
			_ => Map::new(),
		}
	}

	#[rstest]
	fn test_internal_props_do_not_change_fingerprint() {
		let plain = object(json!({"id": 1}));
		let scoped = object(json!({"id": 1, "data-v-1a2b": ""}));
		assert_eq!(
			fingerprint("Card", &plain, &Map::new(), None),
			fingerprint("Card", &scoped, &Map::new(), None)
		);
	}

	#[rstest]
	#[case("Other", json!({"id": 1}), json!({}), None)]
	#[case("Card", json!({"id": 2}), json!({}), None)]
	#[case("Card", json!({"id": 1}), json!({"lang": "fr"}), None)]
	#[case("Card", json!({"id": 1}), json!({}), Some("https://remote.example"))]
	fn test_every_input_changes_fingerprint(
		#[case] name: &str,
		#[case] props: Value,
		#[case] context: Value,
		#[case] source: Option<&str>,
	) {
		let base = fingerprint("Card", &object(json!({"id": 1})), &Map::new(), None);
		assert_ne!(fingerprint(name, &object(props), &object(context), source), base);
	}

	#[rstest]
	fn test_nested_key_order_is_ignored() {
		let a = object(json!({"filter": {"a": 1, "b": [ {"y": 1, "x": 2} ]}}));
		let b = object(json!({"filter": {"b": [ {"x": 2, "y": 1} ], "a": 1}}));
		assert_eq!(
			fingerprint("List", &a, &Map::new(), None),
			fingerprint("List", &b, &Map::new(), None)
		);
	}

	#[rstest]
	#[case("Card_abc123", Some(("Card", "abc123")))]
	#[case("My_Card_abc123", Some(("My_Card", "abc123")))]
	#[case("_abc", None)]
	#[case("nounderscore", None)]
	fn test_parse_island_key(#[case] key: &str, #[case] expected: Option<(&str, &str)>) {
		assert_eq!(parse_island_key(key), expected);
	}
}
