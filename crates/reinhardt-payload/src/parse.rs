//! Flat reference-table decoder.

use crate::error::{PayloadError, PayloadResult};
use crate::registry::ReviverRegistry;
use crate::stringify::{HOLE, NAN, NEGATIVE_INFINITY, NEGATIVE_ZERO, POSITIVE_INFINITY, UNDEFINED};
use crate::value::Value;
use chrono::{DateTime, Utc};
use serde_json::Value as Json;
use std::collections::HashSet;

/// Decodes the flat reference-table form back into a value graph.
///
/// Containers are registered before their children are decoded, so cyclic
/// and shared structure comes back as shared handles. Tagged entries are
/// looked up in `revivers` first, then in the built-in forms (`Date`,
/// `RegExp`, `BigInt`, `Set`, `Map`, `null`). An unknown tag surfaces its
/// inner value unchanged.
///
/// # Errors
///
/// - [`PayloadError::Json`] if `text` is not JSON
/// - [`PayloadError::InvalidFormat`] if the top level is neither a table nor
///   a sentinel
/// - [`PayloadError::DanglingReference`] for out-of-range indices
/// - [`PayloadError::InvalidTagged`] for malformed built-in tagged entries
/// - [`PayloadError::CyclicReviver`] when a revived slot reaches itself
pub fn parse(text: &str, revivers: &ReviverRegistry) -> PayloadResult<Value> {
	let json: Json = serde_json::from_str(text)?;
	match json {
		Json::Number(n) => {
			let index = n
				.as_i64()
				.ok_or_else(|| PayloadError::InvalidFormat(format!("bare number {n}")))?;
			if index >= 0 {
				return Err(PayloadError::InvalidFormat(format!(
					"bare non-sentinel number {index}"
				)));
			}
			Hydrator::new(&[], revivers).hydrate(index)
		}
		Json::Array(table) if !table.is_empty() => Hydrator::new(&table, revivers).hydrate(0),
		Json::Array(_) => Err(PayloadError::InvalidFormat("empty reference table".into())),
		_ => Err(PayloadError::InvalidFormat(
			"expected a reference table".into(),
		)),
	}
}

struct Hydrator<'a> {
	table: &'a [Json],
	revivers: &'a ReviverRegistry,
	hydrated: Vec<Option<Value>>,
	reviving: HashSet<usize>,
}

impl<'a> Hydrator<'a> {
	fn new(table: &'a [Json], revivers: &'a ReviverRegistry) -> Self {
		Self {
			table,
			revivers,
			hydrated: vec![None; table.len()],
			reviving: HashSet::new(),
		}
	}

	fn hydrate(&mut self, index: i64) -> PayloadResult<Value> {
		match index {
			UNDEFINED | HOLE => return Ok(Value::Undefined),
			NAN => return Ok(Value::Number(f64::NAN)),
			POSITIVE_INFINITY => return Ok(Value::Number(f64::INFINITY)),
			NEGATIVE_INFINITY => return Ok(Value::Number(f64::NEG_INFINITY)),
			NEGATIVE_ZERO => return Ok(Value::Number(-0.0)),
			_ => {}
		}
		let slot = usize::try_from(index)
			.ok()
			.filter(|i| *i < self.table.len())
			.ok_or(PayloadError::DanglingReference(index))?;

		if let Some(value) = &self.hydrated[slot] {
			return Ok(value.clone());
		}
		if self.reviving.contains(&slot) {
			return Err(PayloadError::CyclicReviver(slot));
		}

		let table = self.table;
		match &table[slot] {
			Json::Null => Ok(self.store(slot, Value::Null)),
			Json::Bool(b) => Ok(self.store(slot, Value::Bool(*b))),
			Json::Number(n) => Ok(self.store(slot, Value::Number(n.as_f64().unwrap_or(f64::NAN)))),
			Json::String(s) => Ok(self.store(slot, Value::String(s.clone()))),
			Json::Object(entries) => {
				let object = self.store(slot, Value::object::<String>([]));
				for (key, child) in entries {
					let child = self.hydrate(reference(child)?)?;
					if let Value::Object(map) = &object {
						map.write().insert(key.clone(), child);
					}
				}
				Ok(object)
			}
			Json::Array(items) => match items.first() {
				Some(Json::String(tag)) => self.hydrate_tagged(slot, tag, &items[1..]),
				_ => {
					let array = self.store(slot, Value::array([]));
					for child in items {
						let child = self.hydrate(reference(child)?)?;
						if let Value::Array(list) = &array {
							list.write().push(child);
						}
					}
					Ok(array)
				}
			},
		}
	}

	fn hydrate_tagged(&mut self, slot: usize, tag: &str, rest: &[Json]) -> PayloadResult<Value> {
		if let Some(reviver) = self.revivers.get(tag).cloned() {
			self.reviving.insert(slot);
			let inner = match rest.first() {
				Some(child) => self.hydrate(reference(child)?),
				None => Ok(Value::Undefined),
			};
			self.reviving.remove(&slot);
			let revived = reviver.revive(inner?);
			return Ok(self.store(slot, revived));
		}

		match tag {
			"Date" => {
				let text = tagged_str(tag, rest, 0)?;
				let date = DateTime::parse_from_rfc3339(text)
					.map_err(|e| invalid(tag, e.to_string()))?
					.with_timezone(&Utc);
				Ok(self.store(slot, Value::Date(date)))
			}
			"RegExp" => {
				let source = tagged_str(tag, rest, 0)?.to_string();
				let flags = match rest.get(1) {
					Some(_) => tagged_str(tag, rest, 1)?.to_string(),
					None => String::new(),
				};
				Ok(self.store(slot, Value::RegExp { source, flags }))
			}
			"BigInt" => {
				let digits = tagged_str(tag, rest, 0)?;
				let n = digits
					.parse::<i128>()
					.map_err(|e| invalid(tag, e.to_string()))?;
				Ok(self.store(slot, Value::BigInt(n)))
			}
			"Set" => {
				let set = self.store(slot, Value::set([]));
				for child in rest {
					let child = self.hydrate(reference(child)?)?;
					if let Value::Set(items) = &set {
						items.write().push(child);
					}
				}
				Ok(set)
			}
			"Map" => {
				if rest.len() % 2 != 0 {
					return Err(invalid(tag, "odd number of entries"));
				}
				let map = self.store(slot, Value::map([]));
				for pair in rest.chunks(2) {
					let key = self.hydrate(reference(&pair[0])?)?;
					let value = self.hydrate(reference(&pair[1])?)?;
					if let Value::Map(entries) = &map {
						entries.write().push((key, value));
					}
				}
				Ok(map)
			}
			"null" => {
				if rest.len() % 2 != 0 {
					return Err(invalid(tag, "odd number of entries"));
				}
				let object = self.store(slot, Value::object::<String>([]));
				for pair in rest.chunks(2) {
					let key = pair[0]
						.as_str()
						.ok_or_else(|| invalid(tag, "non-string key"))?
						.to_string();
					let value = self.hydrate(reference(&pair[1])?)?;
					if let Value::Object(map) = &object {
						map.write().insert(key, value);
					}
				}
				Ok(object)
			}
			_ => {
				tracing::warn!(tag, slot, "no reviver registered for payload tag");
				let inner = match rest.first() {
					Some(child) => self.hydrate(reference(child)?)?,
					None => Value::Undefined,
				};
				Ok(self.store(slot, inner))
			}
		}
	}

	fn store(&mut self, slot: usize, value: Value) -> Value {
		self.hydrated[slot] = Some(value.clone());
		value
	}
}

fn reference(json: &Json) -> PayloadResult<i64> {
	json.as_i64()
		.ok_or_else(|| PayloadError::InvalidFormat(format!("expected a slot index, found {json}")))
}

fn tagged_str<'j>(tag: &str, rest: &'j [Json], at: usize) -> PayloadResult<&'j str> {
	rest.get(at)
		.and_then(Json::as_str)
		.ok_or_else(|| invalid(tag, format!("missing string at position {}", at + 1)))
}

fn invalid(tag: &str, reason: impl Into<String>) -> PayloadError {
	PayloadError::InvalidTagged {
		tag: tag.to_string(),
		reason: reason.into(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	fn decode(text: &str) -> PayloadResult<Value> {
		parse(text, &ReviverRegistry::builtin())
	}

	#[rstest]
	#[case("-1", Value::Undefined)]
	#[case("-3", Value::Number(f64::NAN))]
	#[case("-6", Value::Number(-0.0))]
	#[case("[true]", Value::Bool(true))]
	#[case(r#"[["BigInt","-42"]]"#, Value::BigInt(-42))]
	fn test_scalars(#[case] text: &str, #[case] expected: Value) {
		assert_eq!(decode(text).unwrap(), expected);
	}

	#[rstest]
	fn test_shared_slots_become_shared_handles() {
		let value = decode(r#"[[1,1],{"x":2},1]"#).unwrap();
		let Value::Array(items) = &value else {
			panic!("expected array, got {value:?}");
		};
		let items = items.read();
		let (Value::Object(a), Value::Object(b)) = (&items[0], &items[1]) else {
			panic!("expected objects");
		};
		assert!(std::sync::Arc::ptr_eq(a, b));
	}

	#[rstest]
	fn test_cyclic_object_is_rebuilt() {
		let value = decode(r#"[{"self":0}]"#).unwrap();
		let inner = value.get("self").unwrap();
		assert_eq!(inner.identity(), value.identity());
	}

	#[rstest]
	fn test_refs_are_revived() {
		let value = decode(r#"[{"count":1},["Ref",2],1]"#).unwrap();
		match value.get("count") {
			Some(Value::Ref(r)) => {
				assert!(!r.shallow);
				assert_eq!(r.get(), Value::Number(1.0));
			}
			other => panic!("expected ref, got {other:?}"),
		}
	}

	#[rstest]
	fn test_empty_ref_literal_is_revived() {
		let value = decode(r#"[["EmptyShallowRef",1],"_"]"#).unwrap();
		assert_eq!(value, Value::shallow_ref(Value::Undefined));
	}

	#[rstest]
	fn test_unknown_tag_surfaces_inner_value() {
		assert_eq!(decode(r#"[["Mystery",1],"inner"]"#).unwrap(), Value::string("inner"));
		assert_eq!(decode(r#"[["Mystery"]]"#).unwrap(), Value::Undefined);
	}

	#[rstest]
	fn test_null_prototype_object() {
		let value = decode(r#"[["null","a",1],2]"#).unwrap();
		assert_eq!(value.get("a"), Some(Value::Number(2.0)));
	}

	#[rstest]
	#[case("{}", "reference table")]
	#[case("[]", "empty")]
	#[case("7", "non-sentinel")]
	fn test_invalid_format(#[case] text: &str, #[case] needle: &str) {
		match decode(text) {
			Err(PayloadError::InvalidFormat(msg)) => assert!(msg.contains(needle), "{msg}"),
			other => panic!("expected InvalidFormat, got {other:?}"),
		}
	}

	#[rstest]
	fn test_dangling_reference() {
		assert!(matches!(decode("[[5]]"), Err(PayloadError::DanglingReference(5))));
		assert!(matches!(decode("[[-9]]"), Err(PayloadError::DanglingReference(-9))));
	}

	#[rstest]
	fn test_malformed_builtin_tag() {
		assert!(matches!(
			decode(r#"[["Date","yesterday"]]"#),
			Err(PayloadError::InvalidTagged { .. })
		));
	}

	#[rstest]
	fn test_cycle_through_reviver_is_reported() {
		assert!(matches!(
			decode(r#"[["Ref",1],{"me":0}]"#),
			Err(PayloadError::CyclicReviver(0))
		));
	}

	#[rstest]
	fn test_not_json() {
		assert!(matches!(decode("[1,"), Err(PayloadError::Json(_))));
	}
}
