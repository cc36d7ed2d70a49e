//! Flat reference-table encoder.

use crate::error::{PayloadError, PayloadResult};
use crate::registry::ReducerRegistry;
use crate::value::{Identity, Value, json_number};
use chrono::SecondsFormat;
use std::collections::HashMap;

pub(crate) const UNDEFINED: i64 = -1;
pub(crate) const HOLE: i64 = -2;
pub(crate) const NAN: i64 = -3;
pub(crate) const POSITIVE_INFINITY: i64 = -4;
pub(crate) const NEGATIVE_INFINITY: i64 = -5;
pub(crate) const NEGATIVE_ZERO: i64 = -6;

/// Encodes a value graph into the flat reference-table form.
///
/// Slot 0 holds the root. Every shared handle (and every distinct primitive)
/// is written once and referenced by index from everywhere else, so cycles
/// and aliasing survive the trip. Values claimed by a reducer are written as
/// `["Tag", index]` where `index` points at the reducer's plain output.
///
/// A root that is itself a sentinel (`undefined`, NaN, the infinities, `-0`)
/// is written as the bare sentinel number.
///
/// # Errors
///
/// Returns [`PayloadError::Unserializable`] for reactive wrappers, errors and
/// custom values that no reducer claims.
pub fn stringify(value: &Value, reducers: &ReducerRegistry) -> PayloadResult<String> {
	let mut flattener = Flattener::new(reducers);
	let root = flattener.flatten(value)?;
	if root < 0 {
		return Ok(root.to_string());
	}
	Ok(format!("[{}]", flattener.slots.join(",")))
}

#[derive(PartialEq, Eq, Hash)]
enum SlotKey {
	Handle(Identity),
	Primitive(String),
}

struct Flattener<'a> {
	reducers: &'a ReducerRegistry,
	indexes: HashMap<SlotKey, usize>,
	slots: Vec<String>,
}

impl<'a> Flattener<'a> {
	fn new(reducers: &'a ReducerRegistry) -> Self {
		Self {
			reducers,
			indexes: HashMap::new(),
			slots: Vec::new(),
		}
	}

	fn flatten(&mut self, value: &Value) -> PayloadResult<i64> {
		if let Some(sentinel) = sentinel(value) {
			return Ok(sentinel);
		}

		let key = match value.identity() {
			Some(id) => SlotKey::Handle(id),
			None => SlotKey::Primitive(primitive_key(value)),
		};
		if let Some(&index) = self.indexes.get(&key) {
			return Ok(index as i64);
		}

		let index = self.slots.len();
		self.slots.push(String::new());
		self.indexes.insert(key, index);

		if let Some((tag, plain)) = self.reducers.reduce(value) {
			let tag = escape_string(tag);
			let inner = self.flatten(&plain)?;
			self.slots[index] = format!("[{tag},{inner}]");
			return Ok(index as i64);
		}

		let encoded = match value {
			Value::Null => "null".to_string(),
			Value::Bool(b) => b.to_string(),
			Value::Number(n) => format_number(*n),
			Value::String(s) => escape_string(s),
			Value::BigInt(n) => format!("[\"BigInt\",\"{n}\"]"),
			Value::Date(d) => format!(
				"[\"Date\",\"{}\"]",
				d.to_rfc3339_opts(SecondsFormat::Millis, true)
			),
			Value::RegExp { source, flags } if flags.is_empty() => {
				format!("[\"RegExp\",{}]", escape_string(source))
			}
			Value::RegExp { source, flags } => format!(
				"[\"RegExp\",{},{}]",
				escape_string(source),
				escape_string(flags)
			),
			Value::Array(items) => {
				let items = items.read().clone();
				let mut parts = Vec::with_capacity(items.len());
				for item in &items {
					parts.push(self.flatten(item)?.to_string());
				}
				format!("[{}]", parts.join(","))
			}
			Value::Set(items) => {
				let items = items.read().clone();
				let mut out = String::from("[\"Set\"");
				for item in &items {
					out.push(',');
					out.push_str(&self.flatten(item)?.to_string());
				}
				out.push(']');
				out
			}
			Value::Map(entries) => {
				let entries = entries.read().clone();
				let mut out = String::from("[\"Map\"");
				for (k, v) in &entries {
					out.push(',');
					out.push_str(&self.flatten(k)?.to_string());
					out.push(',');
					out.push_str(&self.flatten(v)?.to_string());
				}
				out.push(']');
				out
			}
			Value::Object(map) => {
				let map = map.read().clone();
				let mut parts = Vec::with_capacity(map.len());
				for (k, v) in &map {
					parts.push(format!("{}:{}", escape_string(k), self.flatten(v)?));
				}
				format!("{{{}}}", parts.join(","))
			}
			Value::Ref(_) => return Err(PayloadError::Unserializable("ref without a reducer".into())),
			Value::Reactive(_) => {
				return Err(PayloadError::Unserializable(
					"reactive proxy without a reducer".into(),
				));
			}
			Value::Error(e) => {
				return Err(PayloadError::Unserializable(format!(
					"error `{}` without a reducer",
					e.message
				)));
			}
			Value::Custom(c) => {
				return Err(PayloadError::Unserializable(format!(
					"custom value of type `{}`",
					c.type_name()
				)));
			}
			Value::Undefined => unreachable!("undefined is always a sentinel"),
		};
		self.slots[index] = encoded;
		Ok(index as i64)
	}
}

fn sentinel(value: &Value) -> Option<i64> {
	match value {
		Value::Undefined => Some(UNDEFINED),
		Value::Number(n) if n.is_nan() => Some(NAN),
		Value::Number(n) if *n == f64::INFINITY => Some(POSITIVE_INFINITY),
		Value::Number(n) if *n == f64::NEG_INFINITY => Some(NEGATIVE_INFINITY),
		Value::Number(n) if *n == 0.0 && n.is_sign_negative() => Some(NEGATIVE_ZERO),
		_ => None,
	}
}

fn primitive_key(value: &Value) -> String {
	match value {
		Value::Null => "null".into(),
		Value::Bool(b) => format!("b:{b}"),
		Value::Number(n) => format!("n:{}", n.to_bits()),
		Value::BigInt(n) => format!("i:{n}"),
		Value::String(s) => format!("s:{s}"),
		Value::Date(d) => format!("d:{}", d.timestamp_millis()),
		Value::RegExp { source, flags } => format!("r:{flags}/{source}"),
		_ => String::new(),
	}
}

/// Formats a finite number the way JSON writers expect: integral values
/// without a fractional part.
pub(crate) fn format_number(n: f64) -> String {
	json_number(n)
		.map(|json| json.to_string())
		.unwrap_or_else(|| "null".to_string())
}

/// JSON-quotes a string so it can sit inside an inline `<script>`.
///
/// Besides regular JSON escaping, `<` becomes `\u003C` (no `</script>` or
/// `<!--` can appear) and the line separators U+2028/U+2029 are escaped.
pub(crate) fn escape_string(s: &str) -> String {
	let quoted = serde_json::Value::String(s.to_string()).to_string();
	let mut out = String::with_capacity(quoted.len());
	for ch in quoted.chars() {
		match ch {
			'<' => out.push_str("\\u003C"),
			'\u{2028}' => out.push_str("\\u2028"),
			'\u{2029}' => out.push_str("\\u2029"),
			_ => out.push(ch),
		}
	}
	out
}
