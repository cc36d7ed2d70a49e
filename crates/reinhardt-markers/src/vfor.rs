//! List-rendering source normalization.

use reinhardt_payload::Value;

/// Largest count a numeric `v-for` source may expand to.
pub const MAX_RANGE_COUNT: u64 = 1 << 20;

/// Normalizes a `v-for` source into an ordered list.
///
/// - arrays and sets yield their items
/// - maps yield `[key, value]` pairs
/// - strings yield one string per character
/// - objects yield their values in insertion order
/// - a number `n` yields `0..ceil(n)`; negative, NaN and infinite counts
///   yield nothing, as do counts above [`MAX_RANGE_COUNT`]
///
/// Refs and reactive proxies are looked through. Anything else yields an
/// empty list.
///
/// ```
/// use reinhardt_markers::vfor_to_array;
/// use reinhardt_payload::Value;
///
/// assert_eq!(
/// 	vfor_to_array(&Value::Number(3.0)),
/// 	vec![Value::Number(0.0), Value::Number(1.0), Value::Number(2.0)]
/// );
/// ```
pub fn vfor_to_array(source: &Value) -> Vec<Value> {
	match source {
		Value::Array(items) | Value::Set(items) => items.read().clone(),
		Value::Map(entries) => entries
			.read()
			.iter()
			.map(|(k, v)| Value::array([k.clone(), v.clone()]))
			.collect(),
		Value::String(s) => s.chars().map(|c| Value::String(c.to_string())).collect(),
		Value::Object(map) => map.read().values().cloned().collect(),
		Value::Number(n) => count_to_array(*n),
		Value::Ref(r) => vfor_to_array(&r.get()),
		Value::Reactive(r) => vfor_to_array(&r.raw),
		_ => Vec::new(),
	}
}

fn count_to_array(n: f64) -> Vec<Value> {
	if !n.is_finite() || n < 0.0 {
		return Vec::new();
	}
	if cfg!(debug_assertions) && n.fract() != 0.0 {
		tracing::warn!(count = n, "v-for range expects an integer count");
	}
	let count = n.ceil();
	if count > MAX_RANGE_COUNT as f64 {
		tracing::warn!(count = n, max = MAX_RANGE_COUNT, "v-for range count is too large");
		return Vec::new();
	}
	(0..count as u64).map(|i| Value::Number(i as f64)).collect()
}
