//! # Reinhardt Render
//!
//! Server-side rendering with client hydration and server-rendered islands.
//!
//! The pipeline is split across member crates, re-exported here:
//!
//! - [`payload`]: the reference-table codec that carries reactive state
//!   from the server render to the client.
//! - [`markers`]: marker scanning and fragment surgery over rendered markup.
//! - [`app`]: the app instance, hooks, plugins and the client boot.
//! - [`islands`]: island fetching, request coalescing and slot teleports.
//! - [`ssr`]: request handling, document assembly and the HTTP service.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use reinhardt_render::prelude::*;
//!
//! struct Home;
//!
//! #[async_trait]
//! impl ServerEntry for Home {
//!     async fn render(&self, app: &App) -> AppResult<String> {
//!         app.payload().read().data_insert("greeting", Value::string("hi"));
//!         Ok(r#"<div id="__nuxt"><p>hi</p></div>"#.into())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = RenderSettings::load(None)?;
//!     let ssr = LazyRenderer::ssr("dist/manifest.json", |manifest| SsrRenderer::new(Home, manifest));
//!     let spa = LazyRenderer::spa("dist/manifest.json", &settings);
//!     let handler = Arc::new(RenderHandler::new(settings, ssr, spa));
//!     serve("127.0.0.1:3000".parse()?, handler).await?;
//!     Ok(())
//! }
//! ```

pub use reinhardt_app as app;
pub use reinhardt_islands as islands;
pub use reinhardt_markers as markers;
pub use reinhardt_payload as payload;
pub use reinhardt_ssr as ssr;

/// Commonly used types.
pub mod prelude {
	pub use reinhardt_app::{
		App, AppError, AppResult, ClientEntry, DocumentPayload, HeadTag, HookBus, Hooks, MountMode,
		MountTarget, Plugin, SsrContext,
	};
	pub use reinhardt_islands::{Island, IslandFetcher, IslandOptions, IslandRequest};
	pub use reinhardt_payload::{Payload, PayloadCodec, PayloadFormat, Value};
	pub use reinhardt_ssr::{
		ClientManifest, LazyRenderer, LocalIslandFetcher, RenderHandler, RenderRequest,
		RenderSettings, ServerEntry, SpaRenderer, SsrRenderer, serve,
	};

	pub use async_trait::async_trait;
	pub use std::sync::Arc;
}
