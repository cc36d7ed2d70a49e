//! Reducer and reviver registries.
//!
//! A reducer claims a value by returning its plain form; the first reducer in
//! registration order that claims a value wins. The built-in testers are
//! mutually exclusive, so their order only matters for custom additions.

use crate::value::{ErrorValue, Value};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Producing side of a tagged value.
pub trait Reducer: Send + Sync {
	/// Returns the plain form of `value` if this reducer handles it.
	fn reduce(&self, value: &Value) -> Option<Value>;
}

impl<F> Reducer for F
where
	F: Fn(&Value) -> Option<Value> + Send + Sync,
{
	fn reduce(&self, value: &Value) -> Option<Value> {
		self(value)
	}
}

/// Consuming side of a tagged value.
pub trait Reviver: Send + Sync {
	/// Rebuilds the live value from its plain form.
	fn revive(&self, data: Value) -> Value;
}

impl<F> Reviver for F
where
	F: Fn(Value) -> Value + Send + Sync,
{
	fn revive(&self, data: Value) -> Value {
		self(data)
	}
}

/// Ordered `(tag, reducer)` pairs.
#[derive(Clone)]
pub struct ReducerRegistry {
	entries: Vec<(String, Arc<dyn Reducer>)>,
}

impl ReducerRegistry {
	/// Creates a registry without any reducers.
	pub fn empty() -> Self {
		Self {
			entries: Vec::new(),
		}
	}

	/// Creates a registry with the built-in reducers.
	pub fn builtin() -> Self {
		let mut registry = Self::empty();
		registry.register("NuxtError", |v: &Value| match v {
			Value::Error(e) => Some(e.to_value()),
			_ => None,
		});
		registry.register("EmptyShallowRef", |v: &Value| match v {
			Value::Ref(r) if r.shallow => empty_ref_form(&r.get()),
			_ => None,
		});
		registry.register("EmptyRef", |v: &Value| match v {
			Value::Ref(r) if !r.shallow => empty_ref_form(&r.get()),
			_ => None,
		});
		registry.register("ShallowRef", |v: &Value| match v {
			Value::Ref(r) if r.shallow => Some(r.get()),
			_ => None,
		});
		registry.register("ShallowReactive", |v: &Value| match v {
			Value::Reactive(r) if r.shallow => Some((*r.raw).clone()),
			_ => None,
		});
		registry.register("Ref", |v: &Value| match v {
			Value::Ref(r) if !r.shallow => Some(r.get()),
			_ => None,
		});
		registry.register("Reactive", |v: &Value| match v {
			Value::Reactive(r) if !r.shallow => Some((*r.raw).clone()),
			_ => None,
		});
		registry
	}

	/// Registers a reducer under `tag`.
	///
	/// Tags are unique: registering an existing tag replaces its reducer in
	/// place, keeping the original position in the tester order.
	pub fn register(&mut self, tag: impl Into<String>, reducer: impl Reducer + 'static) -> &mut Self {
		let tag = tag.into();
		let reducer: Arc<dyn Reducer> = Arc::new(reducer);
		match self.entries.iter_mut().find(|(t, _)| *t == tag) {
			Some(entry) => entry.1 = reducer,
			None => self.entries.push((tag, reducer)),
		}
		self
	}

	/// Finds the first reducer that claims `value`.
	pub fn reduce(&self, value: &Value) -> Option<(&str, Value)> {
		self.entries
			.iter()
			.find_map(|(tag, reducer)| reducer.reduce(value).map(|plain| (tag.as_str(), plain)))
	}

	/// Returns the registered tags in tester order.
	pub fn tags(&self) -> impl Iterator<Item = &str> {
		self.entries.iter().map(|(t, _)| t.as_str())
	}
}

impl Default for ReducerRegistry {
	fn default() -> Self {
		Self::builtin()
	}
}

impl fmt::Debug for ReducerRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_list().entries(self.tags()).finish()
	}
}

/// `(tag, reviver)` pairs.
#[derive(Clone)]
pub struct ReviverRegistry {
	entries: IndexMap<String, Arc<dyn Reviver>>,
}

impl ReviverRegistry {
	/// Creates a registry without any revivers.
	pub fn empty() -> Self {
		Self {
			entries: IndexMap::new(),
		}
	}

	/// Creates a registry with the built-in revivers.
	pub fn builtin() -> Self {
		let mut registry = Self::empty();
		registry.register("NuxtError", |data: Value| match ErrorValue::from_value(&data) {
			Some(error) => Value::error(error),
			None => data,
		});
		registry.register("EmptyShallowRef", |data: Value| {
			Value::shallow_ref(revive_empty_ref(&data))
		});
		registry.register("EmptyRef", |data: Value| Value::new_ref(revive_empty_ref(&data)));
		registry.register("ShallowRef", Value::shallow_ref);
		registry.register("ShallowReactive", Value::shallow_reactive);
		registry.register("Ref", Value::new_ref);
		registry.register("Reactive", Value::reactive);
		registry
	}

	/// Registers a reviver under `tag`, replacing any existing one.
	pub fn register(&mut self, tag: impl Into<String>, reviver: impl Reviver + 'static) -> &mut Self {
		self.entries.insert(tag.into(), Arc::new(reviver));
		self
	}

	/// Looks up the reviver for `tag`.
	pub fn get(&self, tag: &str) -> Option<&Arc<dyn Reviver>> {
		self.entries.get(tag)
	}
}

impl Default for ReviverRegistry {
	fn default() -> Self {
		Self::builtin()
	}
}

impl fmt::Debug for ReviverRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_list().entries(self.entries.keys()).finish()
	}
}

/// The string form of a ref holding a falsy value.
///
/// A falsy inner value would otherwise be indistinguishable from "no reducer
/// matched", so these refs are written as a short literal instead.
fn empty_ref_form(inner: &Value) -> Option<Value> {
	if inner.is_truthy() {
		return None;
	}
	let literal = match inner {
		Value::Undefined => "_".to_string(),
		Value::BigInt(_) => "0n".to_string(),
		Value::Number(n) if n.is_nan() => "NaN".to_string(),
		Value::Number(n) if n.is_sign_negative() => "-0".to_string(),
		Value::Number(_) => "0".to_string(),
		Value::Null => "null".to_string(),
		Value::Bool(_) => "false".to_string(),
		Value::String(_) => "\"\"".to_string(),
		_ => return None,
	};
	Some(Value::String(literal))
}

fn revive_empty_ref(data: &Value) -> Value {
	match data.as_str() {
		Some("_") => Value::Undefined,
		Some("0n") => Value::BigInt(0),
		Some("NaN") => Value::Number(f64::NAN),
		Some("-0") => Value::Number(-0.0),
		Some("0") => Value::Number(0.0),
		Some("null") => Value::Null,
		Some("false") => Value::Bool(false),
		Some("\"\"") => Value::String(String::new()),
		_ => data.clone(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_builtin_tag_order() {
		let tags: Vec<_> = ReducerRegistry::builtin().tags().map(str::to_string).collect();
		assert_eq!(
			tags,
			[
				"NuxtError",
				"EmptyShallowRef",
				"EmptyRef",
				"ShallowRef",
				"ShallowReactive",
				"Ref",
				"Reactive"
			]
		);
	}

	#[rstest]
	#[case(Value::new_ref(Value::Number(0.0)), "EmptyRef")]
	#[case(Value::new_ref(Value::Number(3.0)), "Ref")]
	#[case(Value::shallow_ref(Value::Undefined), "EmptyShallowRef")]
	#[case(Value::shallow_ref(Value::string("x")), "ShallowRef")]
	#[case(Value::reactive(Value::array([])), "Reactive")]
	#[case(Value::shallow_reactive(Value::array([])), "ShallowReactive")]
	#[case(Value::error(ErrorValue::new(500, "boom")), "NuxtError")]
	fn test_capability_dispatch(#[case] value: Value, #[case] expected: &str) {
		let registry = ReducerRegistry::builtin();
		let (tag, _) = registry.reduce(&value).unwrap();
		assert_eq!(tag, expected);
	}

	#[rstest]
	fn test_plain_values_are_not_claimed() {
		let registry = ReducerRegistry::builtin();
		assert!(registry.reduce(&Value::Number(1.0)).is_none());
		assert!(registry.reduce(&Value::object([("a", Value::Null)])).is_none());
	}

	#[rstest]
	fn test_register_replaces_existing_tag_in_place() {
		let mut registry = ReducerRegistry::builtin();
		registry.register("Ref", |_: &Value| None);
		let tags: Vec<_> = registry.tags().collect();
		assert_eq!(tags.len(), 7);
		assert_eq!(tags[5], "Ref");
		assert_eq!(
			registry.reduce(&Value::new_ref(Value::Number(3.0))).map(|(t, _)| t),
			None
		);
	}

	#[rstest]
	#[case(Value::Undefined)]
	#[case(Value::BigInt(0))]
	#[case(Value::Null)]
	#[case(Value::Bool(false))]
	#[case(Value::Number(0.0))]
	#[case(Value::Number(-0.0))]
	#[case(Value::String(String::new()))]
	fn test_empty_ref_literals_revive(#[case] inner: Value) {
		let literal = empty_ref_form(&inner).unwrap();
		assert_eq!(revive_empty_ref(&literal), inner);
	}
}
