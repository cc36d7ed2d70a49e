//! The island component.

use crate::coalesce::Coalescer;
use crate::error::{IslandError, IslandResult};
use crate::fetcher::{IslandFetcher, IslandRequest};
use crate::settings::IslandSettings;
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use reinhardt_app::{App, AppResult, HeadTag, Hooks, IslandHead, IslandResponse};
use reinhardt_markers::{get_slot_names, get_slot_props, get_uid, replace_uid, slot_selector};
use reinhardt_payload::Value;
use serde_json::{Map, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Payload `data` field marking an island entry.
pub const ISLAND_DATA_MARKER: &str = "__nuxt_island";

/// In-flight island fetches of one app, keyed by island key.
pub type IslandFetches = Coalescer<String, IslandResult<IslandResponse>>;

/// Where slot content for an island goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeleportTarget {
	/// Server: a teleport key recorded in the render context.
	Key(String),
	/// Client: a selector resolved against the live DOM.
	Selector(String),
}

/// Slot content to move into an island's markup.
#[derive(Debug, Clone, PartialEq)]
pub struct Teleport {
	/// Slot name.
	pub slot: String,
	/// Insertion target.
	pub target: TeleportTarget,
	/// Rendered slot content.
	pub html: String,
	/// Data the server attached to the slot marker.
	pub props: Option<serde_json::Value>,
}

/// Output of [`Island::render`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IslandRender {
	/// The island markup, or the fallback.
	pub html: String,
	/// Slot contents to place inside the markup.
	pub teleports: Vec<Teleport>,
}

/// Construction options of an [`Island`].
#[derive(Debug, Clone, Default)]
pub struct IslandOptions {
	/// Component name.
	pub name: String,
	/// Props.
	pub props: Map<String, serde_json::Value>,
	/// Extra render context.
	pub context: Map<String, serde_json::Value>,
	/// Remote origin serving the island.
	pub source: Option<String>,
	/// Slots the parent provides content for.
	pub slots: Vec<String>,
	/// Markup shown while nothing was fetched yet, or after a failed first
	/// fetch.
	pub fallback: Option<String>,
	/// Markup already on the page (hydration).
	pub initial_html: Option<String>,
	/// Timing settings.
	pub settings: IslandSettings,
}

impl IslandOptions {
	/// Options for island `name`.
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			..Self::default()
		}
	}
}

#[derive(Debug, Default)]
struct IslandState {
	uid: String,
	html: String,
	head: IslandHead,
	error: Option<IslandError>,
	props: Map<String, serde_json::Value>,
	key: Option<String>,
}

/// A server-rendered fragment embedded in the app.
///
/// The island fetches its markup by fingerprint, shares in-flight fetches
/// with other instances of the same app, and refetches on prop changes, hot
/// updates or explicit refresh. Fetch errors never propagate: the error is
/// kept for display and the last good markup stays.
pub struct Island {
	app: App,
	fetcher: Arc<dyn IslandFetcher>,
	name: String,
	context: Map<String, serde_json::Value>,
	source: Option<String>,
	slots: Vec<String>,
	fallback: Option<String>,
	debounce: Duration,
	generation: AtomicU64,
	state: Mutex<IslandState>,
}

impl std::fmt::Debug for Island {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Island")
			.field("name", &self.name)
			.field("state", &*self.state.lock())
			.finish_non_exhaustive()
	}
}

impl Island {
	/// Creates an island. Its uid comes from the initial markup when there
	/// is any, and is freshly generated otherwise.
	pub fn new(app: App, fetcher: Arc<dyn IslandFetcher>, options: IslandOptions) -> Self {
		let html = options.initial_html.unwrap_or_default();
		let uid = get_uid(&html).unwrap_or_else(new_uid);
		Self {
			app,
			fetcher,
			name: options.name,
			context: options.context,
			source: options.source,
			slots: options.slots,
			fallback: options.fallback,
			debounce: options.settings.debounce(),
			generation: AtomicU64::new(0),
			state: Mutex::new(IslandState {
				uid,
				html,
				props: options.props,
				..IslandState::default()
			}),
		}
	}

	/// Component name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Current instance uid.
	pub fn uid(&self) -> String {
		self.state.lock().uid.clone()
	}

	/// Current markup.
	pub fn html(&self) -> String {
		self.state.lock().html.clone()
	}

	/// Head entries of the last fetch.
	pub fn head(&self) -> IslandHead {
		self.state.lock().head.clone()
	}

	/// The error of the last fetch, if it failed.
	pub fn error(&self) -> Option<IslandError> {
		self.state.lock().error.clone()
	}

	/// Payload key of the last fetch.
	pub fn key(&self) -> Option<String> {
		self.state.lock().key.clone()
	}

	/// The request the current props describe.
	pub fn request(&self) -> IslandRequest {
		let state = self.state.lock();
		IslandRequest {
			name: self.name.clone(),
			props: state.props.clone(),
			context: self.context.clone(),
			source: self.source.clone(),
			uid: Some(state.uid.clone()),
		}
	}

	/// Loads the island markup.
	///
	/// Without `force`, a payload entry for the same key is reused, which is
	/// how a hydrating client picks up what the server rendered. Otherwise
	/// the fetch goes through the app's coalescer, so concurrent fetches of
	/// the same key issue one request.
	#[tracing::instrument(skip(self), fields(island = %self.name))]
	pub async fn fetch(&self, force: bool) {
		let request = self.request();
		let key = request.key();
		let cached = if force { None } else { self.cached(&key) };
		let result = match cached {
			Some(response) => {
				tracing::debug!(%key, "island served from payload");
				self.apply(&key, response, false)
			}
			None => match self.fetch_coalesced(&key, &request).await {
				Ok(response) => self.apply(&key, response, true),
				Err(error) => Err(error),
			},
		};
		if let Err(error) = result {
			tracing::warn!(%key, %error, "island fetch failed, keeping previous markup");
			self.state.lock().error = Some(error);
		}
	}

	fn cached(&self, key: &str) -> Option<IslandResponse> {
		let entry = self.app.payload().read().data_get(key)?;
		let json = entry.to_json()?;
		match serde_json::from_value(json) {
			Ok(response) => Some(response),
			Err(error) => {
				tracing::debug!(%key, %error, "ignoring malformed island payload entry");
				None
			}
		}
	}

	async fn fetch_coalesced(
		&self,
		key: &str,
		request: &IslandRequest,
	) -> IslandResult<IslandResponse> {
		let fetches = self.app.extension::<IslandFetches>();
		let fetcher = Arc::clone(&self.fetcher);
		let request = request.clone();
		fetches
			.run(key.to_string(), move || async move { fetcher.fetch(&request).await })
			.await
	}

	fn apply(&self, key: &str, response: IslandResponse, store: bool) -> IslandResult<()> {
		let uid = new_uid();
		let html = replace_uid(&response.html, &uid)?;
		let payload = self.app.payload().read().clone();

		if store {
			let mut entry = serde_json::to_value(&response)?;
			if let Some(fields) = entry.as_object_mut() {
				fields.insert(
					ISLAND_DATA_MARKER.into(),
					json!({
						"key": key,
						"params": {
							"props": self.state.lock().props.clone(),
							"context": self.context.clone(),
						},
					}),
				);
			}
			payload.data_insert(key, Value::from_json(&entry));
		}
		for (name, value) in &response.state {
			if payload.state_get(name).is_none() {
				payload.state_insert(name.clone(), Value::from_json(value));
			}
		}
		if let Some(ctx) = self.app.ssr_context() {
			let mut head = ctx.head.lock();
			for link in &response.head.link {
				let mut tag = HeadTag::new("link");
				tag.attrs = link.clone();
				head.push(tag);
			}
			for style in &response.head.style {
				let mut tag = HeadTag::new("style").inner_html(style.inner_html.clone());
				if let Some(key) = &style.key {
					tag = tag.attr("key", key.clone());
				}
				head.push(tag);
			}
		}

		let mut state = self.state.lock();
		state.uid = uid;
		state.html = html;
		state.head = response.head;
		state.error = None;
		state.key = Some(key.to_string());
		Ok(())
	}

	/// Renders the island.
	///
	/// `slot_contents` maps slot names to the markup the parent rendered for
	/// them. Only slots both declared and present in the island markup are
	/// teleported. On the server, each one is also recorded in the render
	/// context for [`crate::replace_island_teleports`].
	pub fn render(&self, slot_contents: &IndexMap<String, String>) -> IslandRender {
		let (uid, html) = {
			let state = self.state.lock();
			(state.uid.clone(), state.html.clone())
		};
		if html.is_empty() {
			return IslandRender {
				html: self.fallback.clone().unwrap_or_default(),
				teleports: Vec::new(),
			};
		}

		let mut slot_props = get_slot_props(&html);
		let ctx = self.app.ssr_context();
		let teleports = get_slot_names(&html)
			.into_iter()
			.filter(|slot| self.slots.contains(slot))
			.map(|slot| {
				let content = slot_contents.get(&slot).cloned().unwrap_or_default();
				let target = match ctx {
					Some(ctx) => {
						ctx.set_teleport(&uid, &slot, content.clone());
						TeleportTarget::Key(reinhardt_app::teleport_key(&uid, &slot))
					}
					None => TeleportTarget::Selector(slot_selector(&uid, &slot)),
				};
				Teleport {
					props: slot_props.shift_remove(&slot),
					slot,
					target,
					html: content,
				}
			})
			.collect();
		IslandRender { html, teleports }
	}

	/// Replaces the props and refetches once no newer update arrived within
	/// the debounce window.
	///
	/// Returns whether this call performed the fetch.
	pub async fn update_props(&self, props: Map<String, serde_json::Value>) -> bool {
		let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
		self.state.lock().props = props;
		tokio::time::sleep(self.debounce).await;
		if self.generation.load(Ordering::SeqCst) != generation {
			return false;
		}
		self.fetch(true).await;
		true
	}

	/// Refetches if `names` contains this island.
	pub async fn on_hot_update(&self, names: &[String]) {
		if names.iter().any(|name| name == &self.name) {
			tracing::info!(island = %self.name, "hot update");
			self.fetch(true).await;
		}
	}

	/// Refetches unconditionally.
	pub async fn refresh(&self) {
		self.fetch(true).await;
	}

	/// Registers a hook that refetches this island on hot updates for as long
	/// as the island is alive.
	pub fn watch_hot_updates(self: &Arc<Self>) {
		self.app.hooks().register(HotUpdate(Arc::downgrade(self)));
	}
}

struct HotUpdate(Weak<Island>);

#[async_trait]
impl Hooks for HotUpdate {
	async fn island_hot_update(&self, names: &[String]) -> AppResult<()> {
		if let Some(island) = self.0.upgrade() {
			island.on_hot_update(names).await;
		}
		Ok(())
	}
}

fn new_uid() -> String {
	uuid::Uuid::new_v4().to_string()
}
