//! Caches shared by the renders of one prerender run.

use reinhardt_app::{IslandResponse, RenderResponse};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Prerender caches.
///
/// Lookups and stores are independent, so two concurrent renders of the same
/// URL may both miss and both store; the later store wins.
#[derive(Debug, Default)]
pub struct PrerenderCaches {
	payloads: RwLock<HashMap<String, RenderResponse>>,
	islands: RwLock<HashMap<String, IslandResponse>>,
	island_props: RwLock<HashMap<String, String>>,
}

impl PrerenderCaches {
	/// Creates empty caches.
	pub fn new() -> Self {
		Self::default()
	}

	/// A cached payload resource for a page URL.
	pub async fn payload(&self, url: &str) -> Option<RenderResponse> {
		self.payloads.read().await.get(url).cloned()
	}

	/// Stores a payload resource for a page URL.
	pub async fn store_payload(&self, url: impl Into<String>, response: RenderResponse) {
		self.payloads.write().await.insert(url.into(), response);
	}

	/// A cached island response for an island URL.
	pub async fn island(&self, url: &str) -> Option<IslandResponse> {
		self.islands.read().await.get(url).cloned()
	}

	/// Stores an island response.
	pub async fn store_island(&self, url: impl Into<String>, response: IslandResponse) {
		self.islands.write().await.insert(url.into(), response);
	}

	/// The request URL an island was first rendered from, by canonical path.
	pub async fn island_props(&self, path: &str) -> Option<String> {
		self.island_props.read().await.get(path).cloned()
	}

	/// Records which request URL produced a canonical island path.
	pub async fn store_island_props(&self, path: impl Into<String>, url: impl Into<String>) {
		self.island_props.write().await.insert(path.into(), url.into());
	}

	/// Number of cached payloads and islands.
	pub async fn counts(&self) -> (usize, usize) {
		(self.payloads.read().await.len(), self.islands.read().await.len())
	}
}
