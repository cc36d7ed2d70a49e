//! Reinhardt SSR - server render orchestration
//!
//! Turns requests into rendered documents, extracted payload resources, and
//! island envelopes:
//!
//! | Request | Response |
//! |---------|----------|
//! | any page | `<!DOCTYPE html>` document with the payload inline |
//! | `<page>/_payload.json` / `.js` | the page's extracted `data` |
//! | `/__nuxt_island/<name>_<fingerprint>.json` | `{id, head, html, state}` |
//! | `/__nuxt_error?statusCode=...` | the error page (internal requests only) |
//!
//! [`RenderHandler`] runs the per-request flow over a [`Renderer`]: either an
//! [`SsrRenderer`] driving the app's [`ServerEntry`], or a [`SpaRenderer`]
//! producing an empty shell. [`RenderService`] serves the handler over
//! hyper.
//!
//! ```no_run
//! use reinhardt_ssr::{LazyRenderer, RenderHandler, RenderSettings, serve};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = RenderSettings::load(None)?;
//! let spa = LazyRenderer::spa("dist/manifest.json", &settings);
//! # let ssr = LazyRenderer::spa("dist/manifest.json", &settings);
//! let handler = Arc::new(RenderHandler::new(settings, ssr, spa));
//! serve("127.0.0.1:3000".parse()?, handler).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod cache;
pub mod error;
pub mod error_page;
pub mod handler;
pub mod head;
pub mod island;
pub mod manifest;
pub mod renderer;
pub mod route;
pub mod service;
pub mod settings;

pub use cache::PrerenderCaches;
pub use error::{RenderError, RenderResult, SettingsError};
pub use error_page::ErrorPage;
pub use handler::{PRERENDER_HEADER, RenderHandler, RenderRequest};
pub use head::{DefaultHeadResolver, HeadResolver, ResolvedHead};
pub use island::LocalIslandFetcher;
pub use manifest::{ClientManifest, ManifestChunk, ResourceTags, Resources};
pub use renderer::{LazyRenderer, Rendered, Renderer, ServerEntry, SpaRenderer, SsrRenderer};
pub use route::{ERROR_ROUTE, RouteKind, RouteRule, RouteRules, StaticRouteRules};
pub use service::{DEFAULT_MAX_BODY_SIZE, RenderService, respond, serve, serve_with_shutdown};
pub use settings::{ENV_PREFIX, RenderSettings};
