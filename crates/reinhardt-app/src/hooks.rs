//! Lifecycle and render hooks.
//!
//! Every hook point is a method on [`Hooks`] with a no-op default, so an
//! implementation only overrides what it cares about. A [`HookBus`] holds the
//! registered implementations and calls them one after another in
//! registration order.
//!
//! ```
//! use async_trait::async_trait;
//! use reinhardt_app::{App, AppResult, HookBus, Hooks};
//!
//! struct Announce;
//!
//! #[async_trait]
//! impl Hooks for Announce {
//! 	async fn app_mounted(&self, _app: &App) -> AppResult<()> {
//! 		tracing::info!("mounted");
//! 		Ok(())
//! 	}
//! }
//!
//! let bus = HookBus::new();
//! bus.register(Announce);
//! assert_eq!(bus.len(), 1);
//! ```

use crate::app::App;
use crate::context::SsrContext;
use crate::error::{AppError, AppResult};
use crate::response::{HtmlContext, IslandResponse, RenderResponse};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Handlers for the named hook points.
///
/// | Method | Hook |
/// |--------|------|
/// | `app_created` | `app:created` |
/// | `app_before_mount` | `app:beforeMount` |
/// | `app_mounted` | `app:mounted` |
/// | `app_error` | `app:error` |
/// | `app_suspense_resolve` | `app:suspense:resolve` |
/// | `render_html` | `render:html` |
/// | `render_island` | `render:island` |
/// | `render_response` | `render:response` |
/// | `island_hot_update` | `islands:hotUpdate` |
#[async_trait]
pub trait Hooks: Send + Sync {
	/// The app instance was created, before plugins run.
	async fn app_created(&self, _app: &App) -> AppResult<()> {
		Ok(())
	}

	/// Plugins ran and the app is about to mount.
	async fn app_before_mount(&self, _app: &App) -> AppResult<()> {
		Ok(())
	}

	/// The app mounted.
	async fn app_mounted(&self, _app: &App) -> AppResult<()> {
		Ok(())
	}

	/// An error was captured. Failures of this hook are logged, not raised.
	async fn app_error(&self, _app: &App, _error: &AppError) -> AppResult<()> {
		Ok(())
	}

	/// Every deferred hydration boundary resolved.
	async fn app_suspense_resolve(&self, _app: &App) -> AppResult<()> {
		Ok(())
	}

	/// The document sections are assembled but not yet joined.
	async fn render_html(&self, _html: &mut HtmlContext, _ctx: &SsrContext) -> AppResult<()> {
		Ok(())
	}

	/// An island envelope is about to be returned.
	async fn render_island(&self, _island: &mut IslandResponse, _ctx: &SsrContext) -> AppResult<()> {
		Ok(())
	}

	/// A document or payload response is about to be returned.
	async fn render_response(
		&self,
		_response: &mut RenderResponse,
		_ctx: &SsrContext,
	) -> AppResult<()> {
		Ok(())
	}

	/// Island components with these names changed on disk.
	async fn island_hot_update(&self, _names: &[String]) -> AppResult<()> {
		Ok(())
	}
}

/// Registered [`Hooks`] implementations.
#[derive(Default)]
pub struct HookBus {
	hooks: RwLock<Vec<Arc<dyn Hooks>>>,
}

impl fmt::Debug for HookBus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("HookBus")
			.field("hooks", &self.len())
			.finish()
	}
}

impl HookBus {
	/// Creates an empty bus.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers an implementation. Registration may happen at any time,
	/// including from inside a plugin.
	pub fn register(&self, hooks: impl Hooks + 'static) {
		self.register_arc(Arc::new(hooks));
	}

	/// Registers a shared implementation.
	pub fn register_arc(&self, hooks: Arc<dyn Hooks>) {
		self.hooks.write().push(hooks);
	}

	/// Number of registered implementations.
	pub fn len(&self) -> usize {
		self.hooks.read().len()
	}

	/// Whether nothing is registered.
	pub fn is_empty(&self) -> bool {
		self.hooks.read().is_empty()
	}

	// Handlers are cloned out so no lock is held across an await.
	fn snapshot(&self) -> Vec<Arc<dyn Hooks>> {
		self.hooks.read().clone()
	}

	/// Calls `app:created`.
	pub async fn app_created(&self, app: &App) -> AppResult<()> {
		for hooks in self.snapshot() {
			hooks.app_created(app).await?;
		}
		Ok(())
	}

	/// Calls `app:beforeMount`.
	pub async fn app_before_mount(&self, app: &App) -> AppResult<()> {
		for hooks in self.snapshot() {
			hooks.app_before_mount(app).await?;
		}
		Ok(())
	}

	/// Calls `app:mounted`.
	pub async fn app_mounted(&self, app: &App) -> AppResult<()> {
		for hooks in self.snapshot() {
			hooks.app_mounted(app).await?;
		}
		Ok(())
	}

	/// Calls `app:error` on every handler, logging handler failures.
	pub async fn app_error(&self, app: &App, error: &AppError) {
		for hooks in self.snapshot() {
			if let Err(hook_error) = hooks.app_error(app, error).await {
				tracing::error!(%error, %hook_error, "app:error handler failed");
			}
		}
	}

	/// Calls `app:suspense:resolve`.
	pub async fn app_suspense_resolve(&self, app: &App) -> AppResult<()> {
		for hooks in self.snapshot() {
			hooks.app_suspense_resolve(app).await?;
		}
		Ok(())
	}

	/// Calls `render:html`.
	pub async fn render_html(&self, html: &mut HtmlContext, ctx: &SsrContext) -> AppResult<()> {
		for hooks in self.snapshot() {
			hooks.render_html(html, ctx).await?;
		}
		Ok(())
	}

	/// Calls `render:island`.
	pub async fn render_island(&self, island: &mut IslandResponse, ctx: &SsrContext) -> AppResult<()> {
		for hooks in self.snapshot() {
			hooks.render_island(island, ctx).await?;
		}
		Ok(())
	}

	/// Calls `render:response`.
	pub async fn render_response(
		&self,
		response: &mut RenderResponse,
		ctx: &SsrContext,
	) -> AppResult<()> {
		for hooks in self.snapshot() {
			hooks.render_response(response, ctx).await?;
		}
		Ok(())
	}

	/// Calls `islands:hotUpdate`.
	pub async fn island_hot_update(&self, names: &[String]) -> AppResult<()> {
		for hooks in self.snapshot() {
			hooks.island_hot_update(names).await?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use parking_lot::Mutex;
	use rstest::rstest;

	struct Push(&'static str, Arc<Mutex<Vec<&'static str>>>);

	#[async_trait]
	impl Hooks for Push {
		async fn render_html(&self, html: &mut HtmlContext, _ctx: &SsrContext) -> AppResult<()> {
			html.head.push(self.0.to_string());
			self.1.lock().push(self.0);
			Ok(())
		}
	}

	struct Fail;

	#[async_trait]
	impl Hooks for Fail {
		async fn render_html(&self, _html: &mut HtmlContext, _ctx: &SsrContext) -> AppResult<()> {
			Err(AppError::new(500, "hook failed"))
		}
	}

	#[rstest]
	#[tokio::test]
	async fn test_handlers_run_in_registration_order() {
		let log = Arc::new(Mutex::new(Vec::new()));
		let bus = HookBus::new();
		bus.register(Push("a", log.clone()));
		bus.register(Push("b", log.clone()));
		let mut html = HtmlContext::default();
		bus.render_html(&mut html, &SsrContext::new("/")).await.unwrap();
		assert_eq!(html.head, ["a", "b"]);
		assert_eq!(*log.lock(), ["a", "b"]);
	}

	#[rstest]
	#[tokio::test]
	async fn test_failing_handler_stops_the_chain() {
		let log = Arc::new(Mutex::new(Vec::new()));
		let bus = HookBus::new();
		bus.register(Fail);
		bus.register(Push("never", log.clone()));
		let result = bus
			.render_html(&mut HtmlContext::default(), &SsrContext::new("/"))
			.await;
		assert_eq!(result.unwrap_err().message, "hook failed");
		assert!(log.lock().is_empty());
	}
}
