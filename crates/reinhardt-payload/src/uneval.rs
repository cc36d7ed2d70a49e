//! JavaScript expression encoder.

use crate::error::{PayloadError, PayloadResult};
use crate::stringify::{escape_string, format_number};
use crate::value::{Identity, Value};
use std::collections::{HashMap, HashSet};

/// Encodes a value graph as a JavaScript expression.
///
/// The output is meant to be assigned directly (`window.__NUXT__=...`).
/// Reactive wrappers are transparent here: a ref or reactive proxy is written
/// as the value it wraps. Containers that are referenced more than once, or
/// that reach themselves, are hoisted into parameters of an immediately
/// invoked function and filled in by statements, so aliasing and cycles are
/// preserved.
///
/// ```
/// use reinhardt_payload::{Value, uneval};
///
/// let shared = Value::array([Value::Number(1.0)]);
/// let root = Value::object([("a", shared.clone()), ("b", shared)]);
/// assert_eq!(
/// 	uneval(&root).unwrap(),
/// 	"(function(a){a[0]=1;return {a:a,b:a}}([]))"
/// );
/// ```
///
/// # Errors
///
/// Returns [`PayloadError::Unserializable`] for custom values and for refs
/// that contain themselves.
pub fn uneval(value: &Value) -> PayloadResult<String> {
	let mut counter = Counter::default();
	counter.walk(value)?;

	let order: Vec<Identity> = counter
		.order
		.into_iter()
		.filter(|id| counter.counts.get(id).copied().unwrap_or(0) > 1)
		.collect();

	let mut writer = Writer {
		names: order
			.iter()
			.enumerate()
			.map(|(i, id)| (*id, param_name(i)))
			.collect(),
		statements: Vec::new(),
		filled: HashSet::new(),
	};
	let root = writer.expression(value)?;
	if order.is_empty() {
		return Ok(root);
	}

	let params: Vec<&str> = order.iter().map(|id| writer.names[id].as_str()).collect();
	let inits: Vec<&str> = order
		.iter()
		.map(|id| match id {
			Identity::Array(_) => "[]",
			Identity::Map(_) => "new Map",
			Identity::Set(_) => "new Set",
			_ => "{}",
		})
		.collect();
	Ok(format!(
		"(function({}){{{}return {}}}({}))",
		params.join(","),
		writer.statements.concat(),
		root,
		inits.join(",")
	))
}

/// Follows refs and reactive proxies down to the value they expose.
fn unwrap(value: &Value) -> PayloadResult<Value> {
	let mut current = value.clone();
	let mut seen = HashSet::new();
	loop {
		current = match &current {
			Value::Ref(r) => {
				if !seen.insert(std::sync::Arc::as_ptr(&r.cell) as usize) {
					return Err(PayloadError::Unserializable("ref that contains itself".into()));
				}
				r.get()
			}
			Value::Reactive(r) => (*r.raw).clone(),
			_ => return Ok(current),
		};
	}
}

#[derive(Default)]
struct Counter {
	counts: HashMap<Identity, usize>,
	order: Vec<Identity>,
}

impl Counter {
	fn walk(&mut self, value: &Value) -> PayloadResult<()> {
		let value = unwrap(value)?;
		let Some(id) = value.identity() else {
			return Ok(());
		};
		if matches!(value, Value::Error(_)) {
			return Ok(());
		}
		let count = self.counts.entry(id).or_insert(0);
		*count += 1;
		if *count > 1 {
			return Ok(());
		}
		self.order.push(id);
		match &value {
			Value::Array(items) | Value::Set(items) => {
				for item in items.read().clone().iter() {
					self.walk(item)?;
				}
			}
			Value::Object(map) => {
				for value in map.read().clone().values() {
					self.walk(value)?;
				}
			}
			Value::Map(entries) => {
				for (k, v) in entries.read().clone().iter() {
					self.walk(k)?;
					self.walk(v)?;
				}
			}
			Value::Custom(c) => {
				return Err(PayloadError::Unserializable(format!(
					"custom value of type `{}`",
					c.type_name()
				)));
			}
			_ => {}
		}
		Ok(())
	}
}

struct Writer {
	names: HashMap<Identity, String>,
	statements: Vec<String>,
	filled: HashSet<Identity>,
}

impl Writer {
	fn expression(&mut self, value: &Value) -> PayloadResult<String> {
		let value = unwrap(value)?;
		if let Some(id) = value.identity()
			&& let Some(name) = self.names.get(&id).cloned()
		{
			if self.filled.insert(id) {
				self.fill(&name, &value)?;
			}
			return Ok(name);
		}
		self.literal(&value)
	}

	fn fill(&mut self, name: &str, value: &Value) -> PayloadResult<()> {
		match value {
			Value::Array(items) => {
				for (i, item) in items.read().clone().iter().enumerate() {
					let expr = self.expression(item)?;
					self.statements.push(format!("{name}[{i}]={expr};"));
				}
			}
			Value::Set(items) => {
				for item in items.read().clone().iter() {
					let expr = self.expression(item)?;
					self.statements.push(format!("{name}.add({expr});"));
				}
			}
			Value::Map(entries) => {
				for (k, v) in entries.read().clone().iter() {
					let key = self.expression(k)?;
					let value = self.expression(v)?;
					self.statements.push(format!("{name}.set({key},{value});"));
				}
			}
			Value::Object(map) => {
				for (key, item) in map.read().clone().iter() {
					let expr = self.expression(item)?;
					let target = if is_identifier(key) {
						format!("{name}.{key}")
					} else {
						format!("{name}[{}]", escape_string(key))
					};
					self.statements.push(format!("{target}={expr};"));
				}
			}
			_ => {}
		}
		Ok(())
	}

	fn literal(&mut self, value: &Value) -> PayloadResult<String> {
		let out = match value {
			Value::Undefined => "void 0".to_string(),
			Value::Null => "null".to_string(),
			Value::Bool(b) => b.to_string(),
			Value::Number(n) if n.is_nan() => "NaN".to_string(),
			Value::Number(n) if *n == f64::INFINITY => "Infinity".to_string(),
			Value::Number(n) if *n == f64::NEG_INFINITY => "-Infinity".to_string(),
			Value::Number(n) if *n == 0.0 && n.is_sign_negative() => "-0".to_string(),
			Value::Number(n) => format_number(*n),
			Value::BigInt(n) => format!("{n}n"),
			Value::String(s) => escape_string(s),
			Value::Date(d) => format!("new Date({})", d.timestamp_millis()),
			Value::RegExp { source, flags } => {
				format!("new RegExp({},{})", escape_string(source), escape_string(flags))
			}
			Value::Array(items) => {
				let items = items.read().clone();
				let mut parts = Vec::with_capacity(items.len());
				for item in &items {
					parts.push(self.expression(item)?);
				}
				format!("[{}]", parts.join(","))
			}
			Value::Set(items) => {
				let items = items.read().clone();
				if items.is_empty() {
					return Ok("new Set".to_string());
				}
				let mut parts = Vec::with_capacity(items.len());
				for item in &items {
					parts.push(self.expression(item)?);
				}
				format!("new Set([{}])", parts.join(","))
			}
			Value::Map(entries) => {
				let entries = entries.read().clone();
				if entries.is_empty() {
					return Ok("new Map".to_string());
				}
				let mut parts = Vec::with_capacity(entries.len());
				for (k, v) in &entries {
					parts.push(format!("[{},{}]", self.expression(k)?, self.expression(v)?));
				}
				format!("new Map([{}])", parts.join(","))
			}
			Value::Object(map) => {
				let map = map.read().clone();
				let mut parts = Vec::with_capacity(map.len());
				for (key, item) in &map {
					let key = if is_identifier(key) {
						key.clone()
					} else {
						escape_string(key)
					};
					parts.push(format!("{key}:{}", self.expression(item)?));
				}
				format!("{{{}}}", parts.join(","))
			}
			Value::Error(e) => self.literal(&e.to_value())?,
			Value::Custom(c) => {
				return Err(PayloadError::Unserializable(format!(
					"custom value of type `{}`",
					c.type_name()
				)));
			}
			Value::Ref(_) | Value::Reactive(_) => self.expression(value)?,
		};
		Ok(out)
	}
}

fn is_identifier(key: &str) -> bool {
	let mut chars = key.chars();
	matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$')
		&& chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// `a`, `b`, ... `z`, `A` ... `Z`, then `a0`, `b0`, ...
fn param_name(index: usize) -> String {
	const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
	let base = CHARS.len();
	let head = CHARS[index % base] as char;
	match index / base {
		0 => head.to_string(),
		n => format!("{head}{}", n - 1),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::value::ErrorValue;
	use chrono::{TimeZone, Utc};
	use rstest::rstest;

	#[rstest]
	#[case(Value::Undefined, "void 0")]
	#[case(Value::Number(f64::NAN), "NaN")]
	#[case(Value::Number(-0.0), "-0")]
	#[case(Value::Number(3.0), "3")]
	#[case(Value::BigInt(12), "12n")]
	#[case(Value::string("</script>"), r#""\u003C/script>""#)]
	fn test_literals(#[case] value: Value, #[case] expected: &str) {
		assert_eq!(uneval(&value).unwrap(), expected);
	}

	#[rstest]
	fn test_plain_object() {
		let date = Utc.timestamp_millis_opt(1_000).unwrap();
		let value = Value::object([
			("when", Value::Date(date)),
			("odd-key", Value::set([Value::Null])),
			("m", Value::map([])),
		]);
		assert_eq!(
			uneval(&value).unwrap(),
			r#"{when:new Date(1000),"odd-key":new Set([null]),m:new Map}"#
		);
	}

	#[rstest]
	fn test_wrappers_are_transparent() {
		let value = Value::reactive(Value::object([("n", Value::new_ref(Value::Number(1.0)))]));
		assert_eq!(uneval(&value).unwrap(), "{n:1}");
	}

	#[rstest]
	fn test_cycle_is_hoisted() {
		let value = Value::object::<&str>([]);
		if let Value::Object(map) = &value {
			map.write().insert("self".into(), value.clone());
		}
		assert_eq!(uneval(&value).unwrap(), "(function(a){a.self=a;return a}({}))");
	}

	#[rstest]
	fn test_errors_use_object_form() {
		let value = Value::error(ErrorValue::new(404, "gone"));
		assert_eq!(
			uneval(&value).unwrap(),
			"{statusCode:404,message:\"gone\",fatal:false,unhandled:false}"
		);
	}

	#[rstest]
	fn test_custom_values_are_rejected() {
		assert!(matches!(
			uneval(&Value::custom(1u8)),
			Err(PayloadError::Unserializable(_))
		));
	}

	#[rstest]
	#[case(0, "a")]
	#[case(25, "z")]
	#[case(26, "A")]
	#[case(52, "a0")]
	fn test_param_names(#[case] index: usize, #[case] expected: &str) {
		assert_eq!(param_name(index), expected);
	}
}
