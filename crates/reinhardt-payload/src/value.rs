//! The state graph carried by a payload.
//!
//! Containers and reactive wrappers are [`Shared`] handles, so one value may be
//! referenced from several places (or from itself). Cloning a [`Value`] clones
//! the handle, not the contents.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// A shared, interiorly mutable handle.
pub type Shared<T> = Arc<RwLock<T>>;

fn shared<T>(value: T) -> Shared<T> {
	Arc::new(RwLock::new(value))
}

/// A node of the payload state graph.
#[derive(Clone)]
pub enum Value {
	/// JavaScript `undefined`.
	Undefined,
	/// `null`.
	Null,
	/// A boolean.
	Bool(bool),
	/// A double precision number, including NaN, the infinities and `-0`.
	Number(f64),
	/// An arbitrary precision integer (`123n`).
	BigInt(i128),
	/// A string.
	String(String),
	/// A point in time.
	Date(DateTime<Utc>),
	/// A regular expression literal.
	RegExp {
		/// Pattern source.
		source: String,
		/// Flags such as `gi`.
		flags: String,
	},
	/// An ordered list.
	Array(Shared<Vec<Value>>),
	/// A plain object with insertion-ordered keys.
	Object(Shared<IndexMap<String, Value>>),
	/// A `Map` keyed by arbitrary values.
	Map(Shared<Vec<(Value, Value)>>),
	/// A `Set`.
	Set(Shared<Vec<Value>>),
	/// A `ref()` / `shallowRef()` cell.
	Ref(RefValue),
	/// A `reactive()` / `shallowReactive()` proxy around a container.
	Reactive(ReactiveValue),
	/// An application error.
	Error(Arc<ErrorValue>),
	/// A host value only a registered reducer knows how to write.
	Custom(CustomValue),
}

/// A reactive cell holding a single value.
#[derive(Clone)]
pub struct RefValue {
	/// The cell contents.
	pub cell: Shared<Value>,
	/// Whether this is a shallow ref.
	pub shallow: bool,
}

impl RefValue {
	/// Returns a copy of the current cell contents.
	pub fn get(&self) -> Value {
		self.cell.read().clone()
	}

	/// Replaces the cell contents.
	pub fn set(&self, value: Value) {
		*self.cell.write() = value;
	}
}

/// A reactive proxy over a container value.
#[derive(Clone)]
pub struct ReactiveValue {
	/// The raw container behind the proxy.
	pub raw: Box<Value>,
	/// Whether this is a shallow reactive.
	pub shallow: bool,
}

/// An opaque host value.
#[derive(Clone)]
pub struct CustomValue {
	type_name: &'static str,
	inner: Arc<dyn Any + Send + Sync>,
}

impl CustomValue {
	/// Wraps a host value.
	pub fn new<T: Any + Send + Sync>(value: T) -> Self {
		Self {
			type_name: std::any::type_name::<T>(),
			inner: Arc::new(value),
		}
	}

	/// Returns the Rust type name of the wrapped value.
	pub fn type_name(&self) -> &'static str {
		self.type_name
	}

	/// Downcasts to the wrapped type.
	pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
		self.inner.downcast_ref::<T>()
	}

	fn ptr(&self) -> usize {
		Arc::as_ptr(&self.inner) as *const () as usize
	}
}

/// Application error data as it travels in a payload.
///
/// This is the plain form written under the `NuxtError` tag.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorValue {
	/// HTTP status code.
	#[serde(default = "default_status_code")]
	pub status_code: u16,
	/// HTTP status message.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status_message: Option<String>,
	/// Human readable message.
	#[serde(default)]
	pub message: String,
	/// Extra data attached to the error.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<serde_json::Value>,
	/// Whether the error is fatal (renders the full-screen error page).
	#[serde(default)]
	pub fatal: bool,
	/// Whether the error was thrown by application code without being handled.
	#[serde(default)]
	pub unhandled: bool,
	/// The URL that produced the error, for error-page renders.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
}

fn default_status_code() -> u16 {
	500
}

impl ErrorValue {
	/// Creates an error with a status code and message.
	pub fn new(status_code: u16, message: impl Into<String>) -> Self {
		Self {
			status_code,
			message: message.into(),
			..Self::default()
		}
	}

	/// Converts into its plain object form.
	pub fn to_value(&self) -> Value {
		serde_json::to_value(self)
			.map(|json| Value::from_json(&json))
			.unwrap_or(Value::Undefined)
	}

	/// Reads an error back from its plain object form.
	pub fn from_value(value: &Value) -> Option<Self> {
		value
			.to_json()
			.and_then(|json| serde_json::from_value(json).ok())
	}
}

/// Identity of a shared handle, used for deduplication during encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Identity {
	Array(usize),
	Object(usize),
	Map(usize),
	Set(usize),
	Ref(usize),
	Reactive(usize),
	Error(usize),
	Custom(usize),
}

fn ptr<T: ?Sized>(handle: &Arc<T>) -> usize {
	Arc::as_ptr(handle) as *const () as usize
}

impl Value {
	/// Creates an array value.
	pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
		Self::Array(shared(items.into_iter().collect()))
	}

	/// Creates an object value, keeping the given key order.
	pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
		Self::Object(shared(
			entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
		))
	}

	/// Creates a map value.
	pub fn map(entries: impl IntoIterator<Item = (Value, Value)>) -> Self {
		Self::Map(shared(entries.into_iter().collect()))
	}

	/// Creates a set value.
	pub fn set(items: impl IntoIterator<Item = Value>) -> Self {
		Self::Set(shared(items.into_iter().collect()))
	}

	/// Creates a string value.
	pub fn string(s: impl Into<String>) -> Self {
		Self::String(s.into())
	}

	/// Wraps a value in a `ref()` cell.
	pub fn new_ref(inner: Value) -> Self {
		Self::Ref(RefValue {
			cell: shared(inner),
			shallow: false,
		})
	}

	/// Wraps a value in a `shallowRef()` cell.
	pub fn shallow_ref(inner: Value) -> Self {
		Self::Ref(RefValue {
			cell: shared(inner),
			shallow: true,
		})
	}

	/// Wraps a container in a `reactive()` proxy.
	pub fn reactive(raw: Value) -> Self {
		Self::Reactive(ReactiveValue {
			raw: Box::new(raw),
			shallow: false,
		})
	}

	/// Wraps a container in a `shallowReactive()` proxy.
	pub fn shallow_reactive(raw: Value) -> Self {
		Self::Reactive(ReactiveValue {
			raw: Box::new(raw),
			shallow: true,
		})
	}

	/// Wraps an application error.
	pub fn error(error: ErrorValue) -> Self {
		Self::Error(Arc::new(error))
	}

	/// Wraps an opaque host value.
	pub fn custom<T: Any + Send + Sync>(value: T) -> Self {
		Self::Custom(CustomValue::new(value))
	}

	/// JavaScript truthiness.
	pub fn is_truthy(&self) -> bool {
		match self {
			Self::Undefined | Self::Null => false,
			Self::Bool(b) => *b,
			Self::Number(n) => *n != 0.0 && !n.is_nan(),
			Self::BigInt(n) => *n != 0,
			Self::String(s) => !s.is_empty(),
			_ => true,
		}
	}

	/// Returns the string contents if this is a string.
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::String(s) => Some(s),
			_ => None,
		}
	}

	/// Returns the number if this is a number.
	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Self::Number(n) => Some(*n),
			_ => None,
		}
	}

	/// Looks up a key on an object (or through a reactive proxy / ref).
	pub fn get(&self, key: &str) -> Option<Value> {
		match self {
			Self::Object(map) => map.read().get(key).cloned(),
			Self::Reactive(r) => r.raw.get(key),
			Self::Ref(r) => r.get().get(key),
			_ => None,
		}
	}

	pub(crate) fn identity(&self) -> Option<Identity> {
		match self {
			Self::Array(h) => Some(Identity::Array(ptr(h))),
			Self::Object(h) => Some(Identity::Object(ptr(h))),
			Self::Map(h) => Some(Identity::Map(ptr(h))),
			Self::Set(h) => Some(Identity::Set(ptr(h))),
			Self::Ref(r) => Some(Identity::Ref(ptr(&r.cell))),
			Self::Reactive(r) => r.raw.identity().map(|raw| match raw {
				Identity::Array(p)
				| Identity::Object(p)
				| Identity::Map(p)
				| Identity::Set(p)
				| Identity::Ref(p)
				| Identity::Reactive(p)
				| Identity::Error(p)
				| Identity::Custom(p) => Identity::Reactive(p),
			}),
			Self::Error(e) => Some(Identity::Error(ptr(e))),
			Self::Custom(c) => Some(Identity::Custom(c.ptr())),
			_ => None,
		}
	}

	/// Builds a value from plain JSON.
	pub fn from_json(json: &serde_json::Value) -> Self {
		match json {
			serde_json::Value::Null => Self::Null,
			serde_json::Value::Bool(b) => Self::Bool(*b),
			serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
			serde_json::Value::String(s) => Self::String(s.clone()),
			serde_json::Value::Array(items) => Self::array(items.iter().map(Self::from_json)),
			serde_json::Value::Object(map) => {
				Self::object(map.iter().map(|(k, v)| (k.clone(), Self::from_json(v))))
			}
		}
	}

	/// Lowers the value to plain JSON.
	///
	/// Reactive wrappers are unwrapped and errors become their object form.
	/// Returns `None` for values JSON cannot hold (`undefined` at the top,
	/// non-finite numbers, custom values) and for cyclic graphs.
	pub fn to_json(&self) -> Option<serde_json::Value> {
		self.to_json_inner(&mut HashSet::new())
	}

	fn to_json_inner(&self, stack: &mut HashSet<Identity>) -> Option<serde_json::Value> {
		let id = self.identity();
		if let Some(id) = id
			&& !stack.insert(id)
		{
			return None;
		}
		let json = self.lower_json(stack);
		if let Some(id) = id {
			stack.remove(&id);
		}
		json
	}

	fn lower_json(&self, stack: &mut HashSet<Identity>) -> Option<serde_json::Value> {
		use serde_json::Value as Json;

		let json = match self {
			Self::Undefined | Self::Custom(_) => return None,
			Self::Null => Json::Null,
			Self::Bool(b) => Json::Bool(*b),
			Self::Number(n) => json_number(*n)?,
			Self::BigInt(n) => Json::String(n.to_string()),
			Self::String(s) => Json::String(s.clone()),
			Self::Date(d) => Json::String(d.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
			Self::RegExp { source, .. } => Json::String(source.clone()),
			Self::Array(items) | Self::Set(items) => {
				let items = items.read().clone();
				let mut out = Vec::with_capacity(items.len());
				for item in &items {
					out.push(item.to_json_inner(stack).unwrap_or(Json::Null));
				}
				Json::Array(out)
			}
			Self::Object(map) => {
				let map = map.read().clone();
				let mut out = serde_json::Map::new();
				for (key, value) in &map {
					if let Some(json) = value.to_json_inner(stack) {
						out.insert(key.clone(), json);
					}
				}
				Json::Object(out)
			}
			Self::Map(entries) => {
				let entries = entries.read().clone();
				let mut out = Vec::with_capacity(entries.len());
				for (k, v) in &entries {
					out.push(Json::Array(vec![
						k.to_json_inner(stack).unwrap_or(Json::Null),
						v.to_json_inner(stack).unwrap_or(Json::Null),
					]));
				}
				Json::Array(out)
			}
			Self::Ref(r) => r.get().to_json_inner(stack)?,
			Self::Reactive(r) => r.raw.to_json_inner(stack)?,
			Self::Error(e) => serde_json::to_value(e.as_ref()).ok()?,
		};
		Some(json)
	}
}

impl From<serde_json::Value> for Value {
	fn from(json: serde_json::Value) -> Self {
		Self::from_json(&json)
	}
}

impl From<&str> for Value {
	fn from(s: &str) -> Self {
		Self::String(s.to_string())
	}
}

impl From<String> for Value {
	fn from(s: String) -> Self {
		Self::String(s)
	}
}

impl From<bool> for Value {
	fn from(b: bool) -> Self {
		Self::Bool(b)
	}
}

impl From<f64> for Value {
	fn from(n: f64) -> Self {
		Self::Number(n)
	}
}

impl From<i32> for Value {
	fn from(n: i32) -> Self {
		Self::Number(n as f64)
	}
}

/// Integral doubles become JSON integers so typed readers accept them.
pub(crate) fn json_number(n: f64) -> Option<serde_json::Value> {
	if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 && !(n == 0.0 && n.is_sign_negative()) {
		return Some(serde_json::Value::from(n as i64));
	}
	serde_json::Number::from_f64(n).map(serde_json::Value::Number)
}

fn numbers_equal(a: f64, b: f64) -> bool {
	(a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits()
}

/// Structural equality that terminates on cyclic graphs.
///
/// Pairs of handles already under comparison are assumed equal, which is
/// the coinductive reading of equality for cyclic structures.
fn structurally_equal(a: &Value, b: &Value, seen: &mut HashSet<(Identity, Identity)>) -> bool {
	if let (Some(ia), Some(ib)) = (a.identity(), b.identity())
		&& !seen.insert((ia, ib))
	{
		return true;
	}
	match (a, b) {
		(Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
		(Value::Bool(x), Value::Bool(y)) => x == y,
		(Value::Number(x), Value::Number(y)) => numbers_equal(*x, *y),
		(Value::BigInt(x), Value::BigInt(y)) => x == y,
		(Value::String(x), Value::String(y)) => x == y,
		(Value::Date(x), Value::Date(y)) => x.timestamp_millis() == y.timestamp_millis(),
		(
			Value::RegExp {
				source: s1,
				flags: f1,
			},
			Value::RegExp {
				source: s2,
				flags: f2,
			},
		) => s1 == s2 && f1 == f2,
		(Value::Array(x), Value::Array(y)) | (Value::Set(x), Value::Set(y)) => {
			let (x, y) = (x.read().clone(), y.read().clone());
			x.len() == y.len()
				&& x.iter()
					.zip(y.iter())
					.all(|(l, r)| structurally_equal(l, r, seen))
		}
		(Value::Object(x), Value::Object(y)) => {
			let (x, y) = (x.read().clone(), y.read().clone());
			x.len() == y.len()
				&& x.iter().zip(y.iter()).all(|((k1, v1), (k2, v2))| {
					k1 == k2 && structurally_equal(v1, v2, seen)
				})
		}
		(Value::Map(x), Value::Map(y)) => {
			let (x, y) = (x.read().clone(), y.read().clone());
			x.len() == y.len()
				&& x.iter().zip(y.iter()).all(|((k1, v1), (k2, v2))| {
					structurally_equal(k1, k2, seen) && structurally_equal(v1, v2, seen)
				})
		}
		(Value::Ref(x), Value::Ref(y)) => {
			x.shallow == y.shallow && structurally_equal(&x.get(), &y.get(), seen)
		}
		(Value::Reactive(x), Value::Reactive(y)) => {
			x.shallow == y.shallow && structurally_equal(&x.raw, &y.raw, seen)
		}
		(Value::Error(x), Value::Error(y)) => x == y,
		(Value::Custom(x), Value::Custom(y)) => x.ptr() == y.ptr(),
		_ => false,
	}
}

impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		structurally_equal(self, other, &mut HashSet::new())
	}
}

impl fmt::Debug for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fn write(value: &Value, f: &mut fmt::Formatter<'_>, stack: &mut HashSet<Identity>) -> fmt::Result {
			if let Some(id) = value.identity()
				&& !stack.insert(id)
			{
				return f.write_str("<cycle>");
			}
			match value {
				Value::Undefined => f.write_str("undefined")?,
				Value::Null => f.write_str("null")?,
				Value::Bool(b) => write!(f, "{b}")?,
				Value::Number(n) => write!(f, "{n}")?,
				Value::BigInt(n) => write!(f, "{n}n")?,
				Value::String(s) => write!(f, "{s:?}")?,
				Value::Date(d) => write!(f, "Date({d})")?,
				Value::RegExp { source, flags } => write!(f, "/{source}/{flags}")?,
				Value::Array(items) | Value::Set(items) => {
					if matches!(value, Value::Set(_)) {
						f.write_str("Set")?;
					}
					f.write_str("[")?;
					for (i, item) in items.read().clone().iter().enumerate() {
						if i > 0 {
							f.write_str(", ")?;
						}
						write(item, f, stack)?;
					}
					f.write_str("]")?;
				}
				Value::Object(map) => {
					f.write_str("{")?;
					for (i, (k, v)) in map.read().clone().iter().enumerate() {
						if i > 0 {
							f.write_str(", ")?;
						}
						write!(f, "{k:?}: ")?;
						write(v, f, stack)?;
					}
					f.write_str("}")?;
				}
				Value::Map(entries) => {
					f.write_str("Map{")?;
					for (i, (k, v)) in entries.read().clone().iter().enumerate() {
						if i > 0 {
							f.write_str(", ")?;
						}
						write(k, f, stack)?;
						f.write_str(" => ")?;
						write(v, f, stack)?;
					}
					f.write_str("}")?;
				}
				Value::Ref(r) => {
					f.write_str(if r.shallow { "ShallowRef(" } else { "Ref(" })?;
					write(&r.get(), f, stack)?;
					f.write_str(")")?;
				}
				Value::Reactive(r) => {
					f.write_str(if r.shallow { "ShallowReactive(" } else { "Reactive(" })?;
					write(&r.raw, f, stack)?;
					f.write_str(")")?;
				}
				Value::Error(e) => write!(f, "Error({}: {})", e.status_code, e.message)?,
				Value::Custom(c) => write!(f, "Custom({})", c.type_name())?,
			}
			if let Some(id) = value.identity() {
				stack.remove(&id);
			}
			Ok(())
		}
		write(self, f, &mut HashSet::new())
	}
}
