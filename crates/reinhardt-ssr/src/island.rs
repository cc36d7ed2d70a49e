//! Island rendering within the same server.

use crate::handler::{RenderHandler, RenderRequest};
use async_trait::async_trait;
use http::Uri;
use reinhardt_app::IslandResponse;
use reinhardt_islands::{IslandError, IslandFetcher, IslandRequest, IslandResult};
use std::sync::{Arc, Weak};

/// Renders islands by calling the local [`RenderHandler`] directly, without
/// going over the network.
///
/// Requests carrying a `source` belong to another server and are rejected.
#[derive(Debug, Clone)]
pub struct LocalIslandFetcher {
	handler: Weak<RenderHandler>,
}

impl LocalIslandFetcher {
	/// Creates a fetcher for `handler`.
	pub fn new(handler: &Arc<RenderHandler>) -> Self {
		Self::from_weak(Arc::downgrade(handler))
	}

	/// Creates a fetcher from a weak handle, for use while the handler is
	/// being built (`Arc::new_cyclic`).
	pub fn from_weak(handler: Weak<RenderHandler>) -> Self {
		Self { handler }
	}
}

#[async_trait]
impl IslandFetcher for LocalIslandFetcher {
	async fn fetch(&self, request: &IslandRequest) -> IslandResult<IslandResponse> {
		if let Some(source) = &request.source {
			return Err(IslandError::Url(format!("remote island source {source} needs an HTTP fetcher")));
		}
		let handler = self
			.handler
			.upgrade()
			.ok_or_else(|| IslandError::Transport("render handler was dropped".into()))?;

		let path = request.path();
		let query = serde_urlencoded::to_string(request.query())
			.map_err(|e| IslandError::Url(e.to_string()))?;
		let url = if query.is_empty() { path.clone() } else { format!("{path}?{query}") };
		let uri: Uri = url.parse().map_err(|e: http::uri::InvalidUri| IslandError::Url(e.to_string()))?;

		tracing::debug!(island = %request.name, %url, "rendering island locally");
		let response = handler
			.handle(RenderRequest::get(uri).internal())
			.await
			.map_err(|error| IslandError::Render(error.to_app_error()))?;
		if !response.status.is_success() {
			return Err(IslandError::Status {
				status: response.status.as_u16(),
				url: path,
			});
		}
		Ok(serde_json::from_slice(&response.body)?)
	}
}
