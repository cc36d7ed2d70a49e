//! The SSR payload and its document encodings.

use crate::error::{PayloadError, PayloadResult};
use crate::parse::parse;
use crate::registry::{ReducerRegistry, ReviverRegistry};
use crate::stringify::stringify;
use crate::uneval::uneval;
use crate::value::{ErrorValue, Shared, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Element id of the embedded JSON payload.
pub const PAYLOAD_ELEMENT_ID: &str = "__NUXT_DATA__";

/// Global the script-form payload is assigned to.
pub const PAYLOAD_GLOBAL: &str = "window.__NUXT__";

/// Serialized application state handed from the server render to the client.
///
/// The keyed sections are [`Shared`] maps, so cloning a payload shares them.
/// Whatever a component writes into [`Payload::data`] during a render is
/// visible to every holder of the payload.
#[derive(Debug, Clone, Default)]
pub struct Payload {
	/// Keyed async data (`useAsyncData`, island responses).
	pub data: Shared<IndexMap<String, Value>>,
	/// Keyed shared state (`useState`).
	pub state: Shared<IndexMap<String, Value>>,
	/// Keys of callOnce-style actions that already ran.
	pub once: Shared<Vec<Value>>,
	/// Keyed async data errors.
	pub errors: Shared<IndexMap<String, Value>>,
	/// Whether the document was produced by a server render.
	pub server_rendered: bool,
	/// Request path the payload belongs to.
	pub path: Option<String>,
	/// Prerender timestamp in milliseconds since the epoch.
	pub prerendered_at: Option<f64>,
	/// Public runtime config.
	pub config: Shared<IndexMap<String, Value>>,
	/// The captured application error, if any.
	pub error: Option<ErrorValue>,
	/// Any other top-level keys, kept in order.
	pub extra: IndexMap<String, Value>,
}

fn section_value(section: &Shared<IndexMap<String, Value>>) -> Value {
	Value::Object(section.clone())
}

impl Payload {
	/// Creates an empty payload with `server_rendered` set.
	pub fn server_rendered() -> Self {
		Self {
			server_rendered: true,
			..Self::default()
		}
	}

	/// Reads a `data` entry.
	pub fn data_get(&self, key: &str) -> Option<Value> {
		self.data.read().get(key).cloned()
	}

	/// Writes a `data` entry.
	pub fn data_insert(&self, key: impl Into<String>, value: Value) {
		self.data.write().insert(key.into(), value);
	}

	/// Reads a `state` entry.
	pub fn state_get(&self, key: &str) -> Option<Value> {
		self.state.read().get(key).cloned()
	}

	/// Writes a `state` entry.
	pub fn state_insert(&self, key: impl Into<String>, value: Value) {
		self.state.write().insert(key.into(), value);
	}

	/// Records a once key, returning `false` if it was already present.
	pub fn mark_once(&self, key: &str) -> bool {
		let mut once = self.once.write();
		if once.iter().any(|k| k.as_str() == Some(key)) {
			return false;
		}
		once.push(Value::string(key));
		true
	}

	/// Builds the plain value graph written to the wire.
	///
	/// Sections share their handles with `self`.
	pub fn to_value(&self) -> Value {
		let mut entries: Vec<(String, Value)> = vec![
			("data".into(), section_value(&self.data)),
			("state".into(), section_value(&self.state)),
			("once".into(), Value::Set(self.once.clone())),
			("_errors".into(), section_value(&self.errors)),
			("serverRendered".into(), Value::Bool(self.server_rendered)),
		];
		if let Some(path) = &self.path {
			entries.push(("path".into(), Value::string(path.clone())));
		}
		if let Some(at) = self.prerendered_at {
			entries.push(("prerenderedAt".into(), Value::Number(at)));
		}
		entries.push(("config".into(), section_value(&self.config)));
		if let Some(error) = &self.error {
			entries.push(("error".into(), Value::error(error.clone())));
		}
		entries.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
		Value::object(entries)
	}

	/// Reads a payload back from its value graph.
	///
	/// Missing sections stay empty.
	///
	/// # Errors
	///
	/// Returns [`PayloadError::InvalidShape`] if the root is not an object or
	/// a known key holds the wrong kind of value.
	pub fn from_value(value: &Value) -> PayloadResult<Self> {
		let Value::Object(root) = unwrap_reactive(value) else {
			return Err(PayloadError::InvalidShape("payload root is not an object".into()));
		};
		let mut payload = Self::default();
		for (key, value) in root.read().iter() {
			payload.apply(key, value, false)?;
		}
		Ok(payload)
	}

	/// Splits the payload for extraction into a separate resource.
	///
	/// Returns the part that stays inline in the document (everything except
	/// `data`) and the extracted part (`data` plus `prerenderedAt`).
	pub fn split(&self) -> (Payload, Value) {
		let initial = Payload {
			data: Shared::default(),
			..self.clone()
		};
		let mut extracted = vec![("data".to_string(), section_value(&self.data))];
		if let Some(at) = self.prerendered_at {
			extracted.push(("prerenderedAt".into(), Value::Number(at)));
		}
		(initial, Value::object(extracted))
	}

	/// Merges a partial payload into this one.
	///
	/// Keyed sections present in `partial` overwrite entry by entry; scalar
	/// fields present in `partial` replace the current value. Sections absent
	/// from `partial` are left untouched.
	///
	/// # Errors
	///
	/// Returns [`PayloadError::InvalidShape`] if `partial` is not an object or
	/// carries a malformed section.
	pub fn merge_value(&mut self, partial: &Value) -> PayloadResult<()> {
		let Value::Object(root) = unwrap_reactive(partial) else {
			return Err(PayloadError::InvalidShape("partial payload is not an object".into()));
		};
		let entries = root.read().clone();
		for (key, value) in &entries {
			self.apply(key, value, true)?;
		}
		Ok(())
	}

	fn apply(&mut self, key: &str, value: &Value, merge: bool) -> PayloadResult<()> {
		match key {
			"data" => merge_section(&mut self.data, key, value, merge),
			"state" => merge_section(&mut self.state, key, value, merge),
			"_errors" => merge_section(&mut self.errors, key, value, merge),
			"config" => merge_section(&mut self.config, key, value, merge),
			"once" => {
				let items = match unwrap_reactive(value) {
					Value::Set(items) | Value::Array(items) => items.read().clone(),
					_ => return Err(shape(key, "a set")),
				};
				for item in items {
					if let Some(k) = item.as_str() {
						self.mark_once(k);
					}
				}
				Ok(())
			}
			"serverRendered" => match value {
				Value::Bool(b) => {
					self.server_rendered = *b;
					Ok(())
				}
				_ => Err(shape(key, "a boolean")),
			},
			"path" => match value {
				Value::String(s) => {
					self.path = Some(s.clone());
					Ok(())
				}
				Value::Undefined | Value::Null => {
					self.path = None;
					Ok(())
				}
				_ => Err(shape(key, "a string")),
			},
			"prerenderedAt" => match value {
				Value::Number(n) => {
					self.prerendered_at = Some(*n);
					Ok(())
				}
				Value::Undefined | Value::Null => {
					self.prerendered_at = None;
					Ok(())
				}
				_ => Err(shape(key, "a number")),
			},
			"error" => {
				self.error = match value {
					Value::Error(e) => Some(e.as_ref().clone()),
					Value::Undefined | Value::Null => None,
					other => Some(ErrorValue::from_value(other).ok_or_else(|| shape(key, "an error"))?),
				};
				Ok(())
			}
			_ => {
				self.extra.insert(key.to_string(), value.clone());
				Ok(())
			}
		}
	}
}

fn unwrap_reactive(value: &Value) -> Value {
	match value {
		Value::Reactive(r) => (*r.raw).clone(),
		Value::Ref(r) => r.get(),
		other => other.clone(),
	}
}

fn merge_section(
	section: &mut Shared<IndexMap<String, Value>>,
	key: &str,
	value: &Value,
	merge: bool,
) -> PayloadResult<()> {
	let Value::Object(incoming) = unwrap_reactive(value) else {
		return Err(shape(key, "an object"));
	};
	if !merge {
		*section = incoming;
		return Ok(());
	}
	if std::sync::Arc::ptr_eq(section, &incoming) {
		return Ok(());
	}
	let entries = incoming.read().clone();
	let mut target = section.write();
	for (k, v) in entries {
		target.insert(k, v);
	}
	Ok(())
}

fn shape(key: &str, expected: &str) -> PayloadError {
	PayloadError::InvalidShape(format!("`{key}` must be {expected}"))
}

/// How the payload is embedded in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
	/// `<script type="application/json">` with the reference-table form.
	#[default]
	Json,
	/// An inline script assigning a JavaScript expression to a global.
	Script,
}

/// Encodes payloads into their document and resource forms.
#[derive(Debug, Clone, Default)]
pub struct PayloadCodec {
	reducers: ReducerRegistry,
	revivers: ReviverRegistry,
	format: PayloadFormat,
}

impl PayloadCodec {
	/// Creates a codec with the built-in registries.
	pub fn new(format: PayloadFormat) -> Self {
		Self {
			format,
			..Self::default()
		}
	}

	/// Replaces the reducer registry.
	pub fn with_reducers(mut self, reducers: ReducerRegistry) -> Self {
		self.reducers = reducers;
		self
	}

	/// Replaces the reviver registry.
	pub fn with_revivers(mut self, revivers: ReviverRegistry) -> Self {
		self.revivers = revivers;
		self
	}

	/// The embedding format.
	pub fn format(&self) -> PayloadFormat {
		self.format
	}

	/// The reducers used for the reference-table form.
	pub fn reducers(&self) -> &ReducerRegistry {
		&self.reducers
	}

	/// The revivers used when decoding.
	pub fn revivers(&self) -> &ReviverRegistry {
		&self.revivers
	}

	/// Encodes a value with this codec's reducers.
	pub fn stringify(&self, value: &Value) -> PayloadResult<String> {
		stringify(value, &self.reducers)
	}

	/// Decodes a value with this codec's revivers.
	pub fn parse(&self, text: &str) -> PayloadResult<Value> {
		parse(text, &self.revivers)
	}

	/// Decodes a full payload.
	pub fn decode(&self, text: &str) -> PayloadResult<Payload> {
		Payload::from_value(&self.parse(text)?)
	}

	/// Renders the `<script>` carrying `payload` inside the document.
	///
	/// `src` is the URL of the extracted payload resource, when extraction is
	/// enabled; the caller then passes the inline part of [`Payload::split`].
	/// The inline value then carries no `data` key, so it never shadows the
	/// extracted section on the client.
	pub fn render_document_script(
		&self,
		payload: &Payload,
		ssr: bool,
		src: Option<&str>,
	) -> PayloadResult<String> {
		let value = payload.to_value();
		if src.is_some()
			&& let Value::Object(root) = &value
		{
			root.write().shift_remove("data");
		}
		match self.format {
			PayloadFormat::Json => {
				let mut attrs = format!(
					"type=\"application/json\" id=\"{PAYLOAD_ELEMENT_ID}\" data-ssr=\"{ssr}\""
				);
				if let Some(src) = src {
					attrs.push_str(&format!(" data-src=\"{}\"", escape_attribute(src)));
				}
				Ok(format!("<script {attrs}>{}</script>", self.stringify(&value)?))
			}
			PayloadFormat::Script => {
				let expr = uneval(&value)?;
				Ok(match src {
					Some(src) => format!(
						"<script type=\"module\">import p from \"{}\";{PAYLOAD_GLOBAL}={{...p,...({expr})}}</script>",
						escape_attribute(src)
					),
					None => format!("<script>{PAYLOAD_GLOBAL}={expr}</script>"),
				})
			}
		}
	}

	/// Renders the body of an extracted payload resource.
	pub fn render_resource(&self, extracted: &Value) -> PayloadResult<String> {
		match self.format {
			PayloadFormat::Json => self.stringify(extracted),
			PayloadFormat::Script => Ok(format!("export default {}", uneval(extracted)?)),
		}
	}

	/// Content type of [`PayloadCodec::render_resource`] output.
	pub fn resource_content_type(&self) -> &'static str {
		match self.format {
			PayloadFormat::Json => "application/json;charset=utf-8",
			PayloadFormat::Script => "text/javascript;charset=utf-8",
		}
	}
}

fn escape_attribute(s: &str) -> String {
	s.replace('&', "&amp;").replace('"', "&quot;").replace('<', "&lt;")
}
