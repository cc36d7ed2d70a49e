//! Per-request render context.

use crate::error::AppError;
use crate::response::RenderResponse;
use http::{HeaderMap, Method};
use indexmap::{IndexMap, IndexSet};
use parking_lot::{Mutex, RwLock};
use reinhardt_payload::Payload;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A payload shared between the app instance and its render context.
pub type SharedPayload = Arc<RwLock<Payload>>;

/// Island sub-context for `/__nuxt_island/*` renders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IslandContext {
	/// Island instance id (`uid` from the request), echoed back as `id`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	/// Component name.
	pub name: String,
	/// Component props.
	#[serde(default)]
	pub props: serde_json::Map<String, serde_json::Value>,
	/// Extra request context (everything besides `props` and `uid`).
	#[serde(default)]
	pub context: serde_json::Map<String, serde_json::Value>,
	/// The island request URL.
	#[serde(default)]
	pub url: String,
}

/// A tag contributed to the document head during rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadTag {
	/// Tag name (`link`, `style`, `meta`, `script`, ...).
	pub tag: String,
	/// Attributes in order.
	pub attrs: IndexMap<String, String>,
	/// Raw inner HTML.
	pub inner_html: Option<String>,
	/// Where the tag goes.
	pub position: TagPosition,
}

/// Placement of a [`HeadTag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TagPosition {
	/// Inside `<head>`.
	#[default]
	Head,
	/// Right after `<body>`.
	BodyOpen,
	/// Right before `</body>`.
	BodyClose,
}

impl HeadTag {
	/// Creates a head tag.
	pub fn new(tag: impl Into<String>) -> Self {
		Self {
			tag: tag.into(),
			attrs: IndexMap::new(),
			inner_html: None,
			position: TagPosition::Head,
		}
	}

	/// Adds an attribute.
	pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.attrs.insert(name.into(), value.into());
		self
	}

	/// Sets the inner HTML.
	pub fn inner_html(mut self, html: impl Into<String>) -> Self {
		self.inner_html = Some(html.into());
		self
	}

	/// Sets the position.
	pub fn position(mut self, position: TagPosition) -> Self {
		self.position = position;
		self
	}
}

/// Head metadata accumulated while rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Head {
	/// Tags in insertion order.
	pub tags: Vec<HeadTag>,
	/// Attributes for `<html>`.
	pub html_attrs: IndexMap<String, String>,
	/// Attributes for `<body>`.
	pub body_attrs: IndexMap<String, String>,
}

impl Head {
	/// Adds a tag.
	pub fn push(&mut self, tag: HeadTag) {
		self.tags.push(tag);
	}
}

/// The teleport key a server-side slot insertion is recorded under.
pub fn teleport_key(uid: &str, slot: &str) -> String {
	format!("uid={uid};slot={slot}")
}

/// Everything a single server render reads and produces.
///
/// Created per request and shared with the app instance and components
/// through an `Arc`; the mutable parts are individually locked.
#[derive(Debug)]
pub struct SsrContext {
	/// Target URL (path and query).
	pub url: String,
	/// Request method.
	pub method: Method,
	/// Request headers.
	pub headers: HeaderMap,
	/// Runtime config snapshot (public part).
	pub runtime_config: serde_json::Map<String, serde_json::Value>,
	/// Island sub-context, for island renders.
	pub island: Option<IslandContext>,
	/// Whether the render is a SPA shell.
	pub no_ssr: bool,
	/// Whether this render is part of a prerender run.
	pub prerendering: bool,
	/// The payload built by the render.
	pub payload: SharedPayload,
	/// Head metadata.
	pub head: Mutex<Head>,
	teleports: Mutex<IndexMap<String, String>>,
	modules: Mutex<IndexSet<String>>,
	response: Mutex<Option<RenderResponse>>,
	error: AtomicBool,
}

impl SsrContext {
	/// Creates a context for `url`.
	pub fn new(url: impl Into<String>) -> Self {
		let url = url.into();
		let payload = Payload {
			path: Some(url.split('?').next().unwrap_or_default().to_string()),
			..Payload::server_rendered()
		};
		Self {
			url,
			method: Method::GET,
			headers: HeaderMap::new(),
			runtime_config: serde_json::Map::new(),
			island: None,
			no_ssr: false,
			prerendering: false,
			payload: Arc::new(RwLock::new(payload)),
			head: Mutex::new(Head::default()),
			teleports: Mutex::new(IndexMap::new()),
			modules: Mutex::new(IndexSet::new()),
			response: Mutex::new(None),
			error: AtomicBool::new(false),
		}
	}

	/// Sets the request method and headers.
	pub fn with_request(mut self, method: Method, headers: HeaderMap) -> Self {
		self.method = method;
		self.headers = headers;
		self
	}

	/// Sets the runtime config snapshot.
	pub fn with_runtime_config(mut self, config: serde_json::Map<String, serde_json::Value>) -> Self {
		self.runtime_config = config;
		self
	}

	/// Marks the render as an island render.
	pub fn with_island(mut self, island: IslandContext) -> Self {
		self.island = Some(island);
		self
	}

	/// Marks the render as a SPA shell.
	pub fn with_no_ssr(mut self, no_ssr: bool) -> Self {
		self.no_ssr = no_ssr;
		self.payload.write().server_rendered = !no_ssr;
		self
	}

	/// Marks the render as part of a prerender run.
	pub fn with_prerendering(mut self, prerendering: bool) -> Self {
		self.prerendering = prerendering;
		self
	}

	/// Whether this is an island render.
	pub fn is_island(&self) -> bool {
		self.island.is_some()
	}

	/// Records content for a server-side slot teleport.
	pub fn set_teleport(&self, uid: &str, slot: &str, html: impl Into<String>) {
		self.teleports.lock().insert(teleport_key(uid, slot), html.into());
	}

	/// The recorded teleports, keyed `uid=U;slot=S`.
	pub fn teleports(&self) -> IndexMap<String, String> {
		self.teleports.lock().clone()
	}

	/// Records a module id used by the render.
	pub fn use_module(&self, id: impl Into<String>) {
		self.modules.lock().insert(id.into());
	}

	/// Module ids used by the render, in first-use order.
	pub fn modules(&self) -> Vec<String> {
		self.modules.lock().iter().cloned().collect()
	}

	/// Attaches a response that replaces the rendered document.
	pub fn set_response(&self, response: RenderResponse) {
		*self.response.lock() = Some(response);
	}

	/// Takes the attached response, if any.
	pub fn take_response(&self) -> Option<RenderResponse> {
		self.response.lock().take()
	}

	/// Whether a custom response was attached.
	pub fn has_response(&self) -> bool {
		self.response.lock().is_some()
	}

	/// Records an error in the payload (first error wins) and flags the render.
	pub fn record_error(&self, error: &AppError) {
		self.error.store(true, Ordering::SeqCst);
		let mut payload = self.payload.write();
		if payload.error.is_none() {
			payload.error = Some(error.into());
		}
	}

	/// Whether an error was recorded during the render.
	pub fn has_error(&self) -> bool {
		self.error.load(Ordering::SeqCst)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_payload_path_drops_query() {
		let ctx = SsrContext::new("/blog?page=2");
		assert_eq!(ctx.payload.read().path.as_deref(), Some("/blog"));
		assert!(ctx.payload.read().server_rendered);
	}

	#[rstest]
	fn test_no_ssr_clears_server_rendered() {
		let ctx = SsrContext::new("/").with_no_ssr(true);
		assert!(!ctx.payload.read().server_rendered);
	}

	#[rstest]
	fn test_teleports_are_keyed_by_uid_and_slot() {
		let ctx = SsrContext::new("/");
		ctx.set_teleport("u1", "default", "<b>x</b>");
		assert_eq!(
			ctx.teleports().get("uid=u1;slot=default").map(String::as_str),
			Some("<b>x</b>")
		);
	}

	#[rstest]
	fn test_first_recorded_error_wins() {
		let ctx = SsrContext::new("/");
		ctx.record_error(&AppError::new(500, "first"));
		ctx.record_error(&AppError::new(404, "second"));
		assert!(ctx.has_error());
		assert_eq!(
			ctx.payload.read().error.as_ref().map(|e| e.message.as_str()),
			Some("first")
		);
	}
}
