//! Render backends.
//!
//! A [`Renderer`] turns a request's [`SsrContext`] into app markup. The
//! server-rendering backend drives a [`ServerEntry`] through the app
//! lifecycle; the SPA backend emits an empty mount point for the client to
//! fill. Both are built lazily, once per process, by [`LazyRenderer`].

use crate::error::{RenderError, RenderResult};
use crate::manifest::ClientManifest;
use crate::settings::RenderSettings;
use async_trait::async_trait;
use futures::future::BoxFuture;
use reinhardt_app::{App, AppError, AppResult, HookBus, Plugin, SsrContext, apply_plugins};
use reinhardt_payload::Value;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::OnceCell;

/// The markup produced by a renderer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendered {
	/// App markup, including the root wrapper element.
	pub html: String,
}

/// A render backend.
#[async_trait]
pub trait Renderer: Send + Sync {
	/// Renders the app for `ctx`.
	///
	/// # Errors
	///
	/// [`RenderError::SkippedRender`] when a custom response was attached
	/// before rendering started; any other error when the app failed.
	async fn render_to_string(&self, ctx: &Arc<SsrContext>) -> RenderResult<Rendered>;

	/// The client build manifest.
	fn manifest(&self) -> &ClientManifest;
}

/// The server build of the application.
#[async_trait]
pub trait ServerEntry: Send + Sync {
	/// Renders the component tree of `app` to markup.
	async fn render(&self, app: &App) -> AppResult<String>;
}

fn snapshot_config(ctx: &SsrContext) {
	let payload = ctx.payload.read();
	let mut config = payload.config.write();
	for (key, value) in &ctx.runtime_config {
		config.insert(key.clone(), Value::from_json(value));
	}
}

/// Server-side rendering through a [`ServerEntry`].
pub struct SsrRenderer {
	entry: Arc<dyn ServerEntry>,
	manifest: ClientManifest,
	plugins: Vec<Arc<dyn Plugin>>,
	hooks: Arc<HookBus>,
}

impl fmt::Debug for SsrRenderer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SsrRenderer")
			.field("plugins", &self.plugins.len())
			.field("hooks", &self.hooks)
			.finish_non_exhaustive()
	}
}

impl SsrRenderer {
	/// Creates a renderer for `entry`.
	pub fn new(entry: impl ServerEntry + 'static, manifest: ClientManifest) -> Self {
		Self {
			entry: Arc::new(entry),
			manifest,
			plugins: Vec::new(),
			hooks: Arc::new(HookBus::new()),
		}
	}

	/// Shares a hook bus with the rest of the server.
	pub fn with_hooks(mut self, hooks: Arc<HookBus>) -> Self {
		self.hooks = hooks;
		self
	}

	/// Adds a plugin run before each render.
	pub fn plugin(mut self, plugin: impl Plugin + 'static) -> Self {
		self.plugins.push(Arc::new(plugin));
		self
	}
}

#[async_trait]
impl Renderer for SsrRenderer {
	#[tracing::instrument(skip_all, fields(url = %ctx.url))]
	async fn render_to_string(&self, ctx: &Arc<SsrContext>) -> RenderResult<Rendered> {
		snapshot_config(ctx);
		let app = App::for_render(ctx.clone(), self.hooks.clone());
		let setup = async {
			app.hooks().app_created(&app).await?;
			apply_plugins(&app, &self.plugins).await
		};
		if let Err(error) = setup.await {
			app.capture_error(error).await?;
		}
		if ctx.has_response() {
			return Err(RenderError::SkippedRender);
		}

		match self.entry.render(&app).await {
			Ok(html) => Ok(Rendered { html }),
			Err(error) => {
				// An error captured during setup takes precedence.
				let error = app.error().unwrap_or(error);
				self.hooks.app_error(&app, &error).await;
				Err(error.into())
			}
		}
	}

	fn manifest(&self) -> &ClientManifest {
		&self.manifest
	}
}

/// Renders an empty mount point, leaving the app to the client.
#[derive(Debug, Clone)]
pub struct SpaRenderer {
	manifest: ClientManifest,
	root_tag: String,
	root_id: String,
	loading_template: String,
}

impl SpaRenderer {
	/// Creates a SPA renderer.
	pub fn new(manifest: ClientManifest, root_tag: impl Into<String>, root_id: impl Into<String>) -> Self {
		Self {
			manifest,
			root_tag: root_tag.into(),
			root_id: root_id.into(),
			loading_template: String::new(),
		}
	}

	/// Markup shown inside the mount point until the client takes over.
	pub fn with_loading_template(mut self, template: impl Into<String>) -> Self {
		self.loading_template = template.into();
		self
	}
}

#[async_trait]
impl Renderer for SpaRenderer {
	async fn render_to_string(&self, ctx: &Arc<SsrContext>) -> RenderResult<Rendered> {
		ctx.payload.write().server_rendered = false;
		snapshot_config(ctx);
		Ok(Rendered {
			html: format!(
				"<{tag} id=\"{id}\">{}</{tag}>",
				self.loading_template,
				tag = self.root_tag,
				id = self.root_id
			),
		})
	}

	fn manifest(&self) -> &ClientManifest {
		&self.manifest
	}
}

type RendererFactory = Box<dyn Fn() -> BoxFuture<'static, RenderResult<Arc<dyn Renderer>>> + Send + Sync>;

/// A renderer built on first use and shared afterwards.
///
/// If building fails the error is logged (once) and returned, and the next
/// call tries again.
pub struct LazyRenderer {
	cell: OnceCell<Arc<dyn Renderer>>,
	factory: RendererFactory,
	reported: AtomicBool,
}

impl fmt::Debug for LazyRenderer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LazyRenderer")
			.field("initialized", &self.cell.initialized())
			.finish_non_exhaustive()
	}
}

impl LazyRenderer {
	/// Creates a lazy renderer from an async factory.
	pub fn new<F, Fut>(factory: F) -> Self
	where
		F: Fn() -> Fut + Send + Sync + 'static,
		Fut: Future<Output = RenderResult<Arc<dyn Renderer>>> + Send + 'static,
	{
		Self {
			cell: OnceCell::new(),
			factory: Box::new(move || Box::pin(factory())),
			reported: AtomicBool::new(false),
		}
	}

	/// Wraps an already built renderer.
	pub fn ready(renderer: Arc<dyn Renderer>) -> Self {
		let lazy = Self::new(|| async { Err(RenderError::Manifest("renderer already built".into())) });
		// A fresh cell cannot be full.
		let _ = lazy.cell.set(renderer);
		lazy
	}

	/// A lazy [`SsrRenderer`] reading its client manifest from `path`.
	pub fn ssr<F>(manifest: impl Into<PathBuf>, build: F) -> Self
	where
		F: Fn(ClientManifest) -> SsrRenderer + Send + Sync + 'static,
	{
		let path = manifest.into();
		let build = Arc::new(build);
		Self::new(move || {
			let path = path.clone();
			let build = build.clone();
			async move {
				let manifest = ClientManifest::from_file(&path).await?;
				Ok(Arc::new(build(manifest)) as Arc<dyn Renderer>)
			}
		})
	}

	/// A lazy [`SpaRenderer`] reading its client manifest from `path`.
	pub fn spa(manifest: impl Into<PathBuf>, settings: &RenderSettings) -> Self {
		let path = manifest.into();
		let root_tag = settings.app_root_tag.clone();
		let root_id = settings.app_root_id.clone();
		let template = settings.spa_loading_template.clone().unwrap_or_default();
		Self::new(move || {
			let path = path.clone();
			let renderer = (root_tag.clone(), root_id.clone(), template.clone());
			async move {
				let manifest = ClientManifest::from_file(&path).await?;
				let (tag, id, template) = renderer;
				Ok(Arc::new(SpaRenderer::new(manifest, tag, id).with_loading_template(template)) as Arc<dyn Renderer>)
			}
		})
	}

	/// The renderer, building it if needed.
	pub async fn get(&self) -> RenderResult<Arc<dyn Renderer>> {
		match self.cell.get_or_try_init(|| (self.factory)()).await {
			Ok(renderer) => Ok(renderer.clone()),
			Err(error) => {
				if !self.reported.swap(true, Ordering::SeqCst) {
					tracing::error!(%error, "failed to build renderer");
				}
				Err(error)
			}
		}
	}

	/// Whether the renderer has been built.
	pub fn is_ready(&self) -> bool {
		self.cell.initialized()
	}
}

/// Maps a failed render to the error a handler should report.
pub(crate) fn prefer_payload_error(ctx: &SsrContext, error: RenderError) -> RenderError {
	match ctx.payload.read().error.clone() {
		Some(stashed) if !matches!(error, RenderError::SkippedRender) => {
			RenderError::App(AppError::from(stashed))
		}
		_ => error,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use reinhardt_app::{Hooks, RenderResponse};
	use rstest::rstest;
	use std::sync::atomic::AtomicUsize;

	struct Static(&'static str);

	#[async_trait]
	impl ServerEntry for Static {
		async fn render(&self, _app: &App) -> AppResult<String> {
			Ok(self.0.to_string())
		}
	}

	struct Failing;

	#[async_trait]
	impl ServerEntry for Failing {
		async fn render(&self, _app: &App) -> AppResult<String> {
			Err(AppError::unhandled("boom"))
		}
	}

	struct Redirect;

	#[async_trait]
	impl Plugin for Redirect {
		fn name(&self) -> &str {
			"redirect"
		}

		async fn setup(&self, app: &App) -> AppResult<()> {
			if let Some(ctx) = app.ssr_context() {
				ctx.set_response(RenderResponse::new(http::StatusCode::FOUND));
			}
			Ok(())
		}
	}

	#[derive(Default)]
	struct CountErrors(AtomicUsize);

	#[async_trait]
	impl Hooks for CountErrors {
		async fn app_error(&self, _app: &App, _error: &AppError) -> AppResult<()> {
			self.0.fetch_add(1, Ordering::SeqCst);
			Ok(())
		}
	}

	#[rstest]
	#[tokio::test]
	async fn test_ssr_renders_entry() {
		let renderer = SsrRenderer::new(Static("<div id=\"__nuxt\">hi</div>"), ClientManifest::default());
		let ctx = Arc::new(SsrContext::new("/"));
		let rendered = renderer.render_to_string(&ctx).await.unwrap();
		assert_eq!(rendered.html, "<div id=\"__nuxt\">hi</div>");
		assert!(ctx.payload.read().server_rendered);
	}

	#[rstest]
	#[tokio::test]
	async fn test_attached_response_skips_render() {
		let renderer = SsrRenderer::new(Static("unused"), ClientManifest::default()).plugin(Redirect);
		let ctx = Arc::new(SsrContext::new("/"));
		let error = renderer.render_to_string(&ctx).await.unwrap_err();
		assert!(matches!(error, RenderError::SkippedRender));
		assert!(ctx.has_response());
	}

	#[rstest]
	#[tokio::test]
	async fn test_failed_render_fires_app_error() {
		let hooks = Arc::new(HookBus::new());
		let counter = Arc::new(CountErrors::default());
		hooks.register_arc(counter.clone());
		let renderer = SsrRenderer::new(Failing, ClientManifest::default()).with_hooks(hooks);
		let ctx = Arc::new(SsrContext::new("/"));

		let error = renderer.render_to_string(&ctx).await.unwrap_err();
		assert_eq!(error.status_code().as_u16(), 500);
		assert_eq!(counter.0.load(Ordering::SeqCst), 1);
	}

	#[rstest]
	#[tokio::test]
	async fn test_spa_shell() {
		let renderer = SpaRenderer::new(ClientManifest::default(), "div", "__nuxt")
			.with_loading_template("<p>loading</p>");
		let mut config = serde_json::Map::new();
		config.insert("apiBase".into(), serde_json::json!("/api"));
		let ctx = Arc::new(SsrContext::new("/").with_runtime_config(config));

		let rendered = renderer.render_to_string(&ctx).await.unwrap();
		assert_eq!(rendered.html, "<div id=\"__nuxt\"><p>loading</p></div>");
		let payload = ctx.payload.read();
		assert!(!payload.server_rendered);
		assert!(payload.data.read().is_empty());
		assert_eq!(payload.config.read()["apiBase"], Value::string("/api"));
	}

	#[rstest]
	#[tokio::test]
	async fn test_lazy_renderer_retries_after_failure() {
		let attempts = Arc::new(AtomicUsize::new(0));
		let counter = attempts.clone();
		let lazy = LazyRenderer::new(move || {
			let attempt = counter.fetch_add(1, Ordering::SeqCst);
			async move {
				if attempt == 0 {
					Err(RenderError::Manifest("missing".into()))
				} else {
					Ok(Arc::new(SpaRenderer::new(ClientManifest::default(), "div", "app")) as Arc<dyn Renderer>)
				}
			}
		});

		assert!(lazy.get().await.is_err());
		assert!(!lazy.is_ready());
		let first = lazy.get().await.unwrap();
		let second = lazy.get().await.unwrap();
		assert!(Arc::ptr_eq(&first, &second));
		assert_eq!(attempts.load(Ordering::SeqCst), 2);
	}

	#[rstest]
	#[tokio::test]
	async fn test_lazy_ssr_reports_missing_manifest() {
		let lazy = LazyRenderer::ssr("/nonexistent/manifest.json", |manifest| {
			SsrRenderer::new(Static(""), manifest)
		});
		assert!(matches!(lazy.get().await, Err(RenderError::Manifest(_))));
	}

	#[rstest]
	fn test_payload_error_is_preferred() {
		let ctx = SsrContext::new("/");
		ctx.record_error(&AppError::new(404, "page not found"));
		let error = prefer_payload_error(&ctx, RenderError::App(AppError::unhandled("render failed")));
		assert_eq!(error.status_code().as_u16(), 404);
		assert!(matches!(
			prefer_payload_error(&ctx, RenderError::SkippedRender),
			RenderError::SkippedRender
		));
	}
}
