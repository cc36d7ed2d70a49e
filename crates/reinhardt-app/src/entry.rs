//! Client boot: revive the payload, apply plugins, mount.

use crate::app::{App, AppOptions};
use crate::error::{AppError, AppResult};
use crate::hooks::HookBus;
use crate::plugin::{Plugin, apply_plugins};
use async_trait::async_trait;
use reinhardt_markers::{Fragment, decode_entities};
use reinhardt_payload::payload::PAYLOAD_ELEMENT_ID;
use reinhardt_payload::{Payload, PayloadCodec};
use std::sync::Arc;

/// How the root component is attached to the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountMode {
	/// Adopt the server-rendered markup.
	Hydrate,
	/// Render from scratch into an empty container.
	Fresh,
}

/// The payload a server left in the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentPayload {
	/// Text of the embedded payload script.
	pub inline: Option<String>,
	/// URL of the extracted payload resource (`data-src`).
	pub data_src: Option<String>,
	/// The `data-ssr` attribute of the payload script.
	pub data_ssr: Option<bool>,
	/// The global `serverRendered` flag, when the host exposes one.
	pub server_rendered: Option<bool>,
}

impl DocumentPayload {
	/// Reads the embedded payload script out of a document.
	///
	/// Returns an empty value when the document carries no payload element.
	pub fn from_html(html: &str) -> Self {
		let fragment = Fragment::parse(html);
		let Some(script) = fragment.all().find(|id| {
			fragment
				.element(*id)
				.is_some_and(|e| e.name == "script" && e.attribute("id") == Some(PAYLOAD_ELEMENT_ID))
		}) else {
			return Self::default();
		};
		let Some(element) = fragment.element(script) else {
			return Self::default();
		};
		Self {
			inline: Some(fragment.inner_html(script).to_string()),
			data_src: element
				.attribute("data-src")
				.map(|src| decode_entities(src).into_owned()),
			data_ssr: element.attribute("data-ssr").map(|v| v == "true"),
			server_rendered: None,
		}
	}

	/// Sets the global `serverRendered` flag.
	pub fn with_server_rendered(mut self, server_rendered: bool) -> Self {
		self.server_rendered = Some(server_rendered);
		self
	}
}

/// Fetches the extracted payload resource.
#[async_trait]
pub trait PayloadLoader: Send + Sync {
	/// Returns the resource text at `src` in the reference-table form.
	async fn load(&self, src: &str) -> AppResult<String>;
}

/// The UI engine's mount primitive.
#[async_trait]
pub trait MountTarget: Send + Sync {
	/// Attaches the root component.
	async fn mount(&self, app: &App, mode: MountMode) -> AppResult<()>;
}

/// Boots the client side of an app.
#[derive(Default)]
pub struct ClientEntry {
	codec: PayloadCodec,
	hooks: Arc<HookBus>,
	plugins: Vec<Arc<dyn Plugin>>,
	loader: Option<Arc<dyn PayloadLoader>>,
}

impl ClientEntry {
	/// Creates an entry decoding with `codec`.
	pub fn new(codec: PayloadCodec) -> Self {
		Self {
			codec,
			..Self::default()
		}
	}

	/// Uses `hooks` as the app's hook bus.
	pub fn with_hooks(mut self, hooks: Arc<HookBus>) -> Self {
		self.hooks = hooks;
		self
	}

	/// Adds a plugin.
	pub fn plugin(mut self, plugin: impl Plugin + 'static) -> Self {
		self.plugins.push(Arc::new(plugin));
		self
	}

	/// Sets the loader for extracted payloads.
	pub fn with_loader(mut self, loader: impl PayloadLoader + 'static) -> Self {
		self.loader = Some(Arc::new(loader));
		self
	}

	/// Revives the document payload into a [`Payload`].
	///
	/// # Errors
	///
	/// Fails when the inline payload or the extracted resource cannot be
	/// decoded, or the resource cannot be loaded.
	pub async fn revive(&self, document: &DocumentPayload) -> AppResult<Payload> {
		let mut payload = match document.inline.as_deref().map(str::trim) {
			Some(text) if !text.is_empty() => self.codec.decode(text)?,
			_ => Payload::default(),
		};
		if let Some(src) = &document.data_src {
			match &self.loader {
				Some(loader) => {
					let text = loader.load(src).await?;
					payload.merge_value(&self.codec.parse(&text)?)?;
				}
				None => tracing::warn!(src = %src, "payload has data-src but no loader is configured"),
			}
		}
		Ok(payload)
	}

	/// Boots the app: revive, create, apply plugins, mount.
	///
	/// Errors from hooks, plugins and the mount call are captured into the
	/// payload instead of aborting, so the app can still show its error
	/// state.
	///
	/// # Errors
	///
	/// Only payload revival failures and failing `app:suspense:resolve`
	/// handlers are returned.
	#[tracing::instrument(skip_all)]
	pub async fn boot(&self, document: &DocumentPayload, target: &dyn MountTarget) -> AppResult<App> {
		let payload = self.revive(document).await?;
		let server_rendered = document
			.server_rendered
			.or(document.data_ssr)
			.unwrap_or(payload.server_rendered);
		let mode = if server_rendered {
			MountMode::Hydrate
		} else {
			MountMode::Fresh
		};
		tracing::debug!(?mode, "booting app");

		let app = App::new(AppOptions {
			is_server: false,
			hydrating: mode == MountMode::Hydrate,
			payload,
			ssr_context: None,
			hooks: Some(self.hooks.clone()),
		});

		if let Err(error) = self.hooks.app_created(&app).await {
			app.capture_error(error).await?;
		}
		if let Err(error) = apply_plugins(&app, &self.plugins).await {
			app.capture_error(error).await?;
		}

		let root = app.defer_hydration();
		if let Err(error) = self.hooks.app_before_mount(&app).await {
			app.capture_error(error).await?;
		}
		if let Err(error) = target.mount(&app, mode).await {
			app.capture_error(unhandled(error)).await?;
		}
		if let Err(error) = self.hooks.app_mounted(&app).await {
			app.capture_error(error).await?;
		}
		root.resolve().await?;
		Ok(app)
	}
}

fn unhandled(mut error: AppError) -> AppError {
	error.unhandled = true;
	error
}
