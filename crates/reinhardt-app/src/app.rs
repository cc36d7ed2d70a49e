//! The app instance.

use crate::context::{SharedPayload, SsrContext};
use crate::error::{AppError, AppResult};
use crate::hooks::HookBus;
use parking_lot::RwLock;
use reinhardt_payload::Payload;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

type Extensions = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

/// Options for [`App::new`].
#[derive(Debug, Default)]
pub struct AppOptions {
	/// Whether the app runs inside a server render.
	pub is_server: bool,
	/// Whether the app starts out hydrating server markup.
	pub hydrating: bool,
	/// The initial payload; ignored when `ssr_context` is set.
	pub payload: Payload,
	/// The render context, for server renders.
	pub ssr_context: Option<Arc<SsrContext>>,
	/// Hook handlers; a fresh bus when `None`.
	pub hooks: Option<Arc<HookBus>>,
}

struct AppInner {
	hooks: Arc<HookBus>,
	payload: SharedPayload,
	ssr_context: Option<Arc<SsrContext>>,
	is_server: bool,
	is_hydrating: AtomicBool,
	pending: AtomicUsize,
	extensions: RwLock<Extensions>,
}

/// A handle to one app instance.
///
/// Cloning is cheap; all clones refer to the same instance.
#[derive(Clone)]
pub struct App {
	inner: Arc<AppInner>,
}

impl fmt::Debug for App {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("App")
			.field("is_server", &self.inner.is_server)
			.field("is_hydrating", &self.is_hydrating())
			.field("pending", &self.inner.pending.load(Ordering::SeqCst))
			.finish_non_exhaustive()
	}
}

impl App {
	/// Creates an app instance.
	///
	/// A server app shares the payload of its render context, so whatever
	/// the render writes ends up in the response.
	pub fn new(options: AppOptions) -> Self {
		let payload = match &options.ssr_context {
			Some(ctx) => ctx.payload.clone(),
			None => Arc::new(RwLock::new(options.payload)),
		};
		Self {
			inner: Arc::new(AppInner {
				hooks: options.hooks.unwrap_or_default(),
				payload,
				ssr_context: options.ssr_context,
				is_server: options.is_server,
				is_hydrating: AtomicBool::new(options.hydrating && !options.is_server),
				pending: AtomicUsize::new(0),
				extensions: RwLock::new(HashMap::new()),
			}),
		}
	}

	/// Creates a server app bound to a render context.
	pub fn for_render(ctx: Arc<SsrContext>, hooks: Arc<HookBus>) -> Self {
		Self::new(AppOptions {
			is_server: true,
			ssr_context: Some(ctx),
			hooks: Some(hooks),
			..AppOptions::default()
		})
	}

	/// The hook bus.
	pub fn hooks(&self) -> &Arc<HookBus> {
		&self.inner.hooks
	}

	/// The payload.
	pub fn payload(&self) -> &SharedPayload {
		&self.inner.payload
	}

	/// The render context, on the server.
	pub fn ssr_context(&self) -> Option<&Arc<SsrContext>> {
		self.inner.ssr_context.as_ref()
	}

	/// Whether the app runs inside a server render.
	pub fn is_server(&self) -> bool {
		self.inner.is_server
	}

	/// Whether the app is still hydrating server markup.
	pub fn is_hydrating(&self) -> bool {
		self.inner.is_hydrating.load(Ordering::SeqCst)
	}

	/// Number of unresolved hydration deferrals.
	pub fn pending_hydration(&self) -> usize {
		self.inner.pending.load(Ordering::SeqCst)
	}

	/// Whether two handles refer to the same instance.
	pub fn ptr_eq(&self, other: &App) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}

	/// Returns the per-app value of type `T`, creating it on first use.
	pub fn extension<T: Default + Send + Sync + 'static>(&self) -> Arc<T> {
		let id = TypeId::of::<T>();
		if let Some(existing) = lookup::<T>(&self.inner.extensions.read()) {
			return existing;
		}
		let mut extensions = self.inner.extensions.write();
		if let Some(existing) = lookup::<T>(&extensions) {
			return existing;
		}
		let value = Arc::new(T::default());
		extensions.insert(id, value.clone());
		value
	}

	/// Replaces the per-app value of type `T`.
	pub fn set_extension<T: Send + Sync + 'static>(&self, value: T) {
		self.inner
			.extensions
			.write()
			.insert(TypeId::of::<T>(), Arc::new(value));
	}

	/// Holds back the hydration-complete signal until the returned resolver
	/// is resolved.
	///
	/// Outside hydration the resolver does nothing. A resolver that is dropped
	/// without being resolved keeps hydration pending.
	pub fn defer_hydration(&self) -> HydrationResolver {
		if !self.is_hydrating() {
			return HydrationResolver { app: None };
		}
		self.inner.pending.fetch_add(1, Ordering::SeqCst);
		HydrationResolver {
			app: Some(self.clone()),
		}
	}

	/// Captures an error raised by plugins, hooks or mounting.
	///
	/// Fires `app:error`, then stores the error in the payload unless one is
	/// already there.
	///
	/// # Errors
	///
	/// On the server without a render context there is nowhere to store the
	/// error, so it is returned to the caller.
	pub async fn capture_error(&self, error: AppError) -> AppResult<()> {
		tracing::warn!(%error, server = self.is_server(), "captured app error");
		self.hooks().app_error(self, &error).await;
		match self.ssr_context() {
			Some(ctx) => ctx.record_error(&error),
			None if self.is_server() => return Err(error),
			None => {
				let mut payload = self.payload().write();
				if payload.error.is_none() {
					payload.error = Some((&error).into());
				}
			}
		}
		Ok(())
	}

	/// The error stored in the payload, if any.
	pub fn error(&self) -> Option<AppError> {
		self.payload().read().error.clone().map(AppError::from)
	}
}

fn lookup<T: Send + Sync + 'static>(extensions: &Extensions) -> Option<Arc<T>> {
	extensions
		.get(&TypeId::of::<T>())
		.and_then(|value| value.clone().downcast::<T>().ok())
}

/// Resolves one [`App::defer_hydration`] call.
#[derive(Debug)]
#[must_use = "hydration stays pending until the resolver is resolved"]
pub struct HydrationResolver {
	app: Option<App>,
}

impl HydrationResolver {
	/// Releases this deferral. When it was the last one, hydration ends and
	/// `app:suspense:resolve` fires.
	pub async fn resolve(mut self) -> AppResult<()> {
		let Some(app) = self.app.take() else {
			return Ok(());
		};
		if app.inner.pending.fetch_sub(1, Ordering::SeqCst) != 1 {
			return Ok(());
		}
		if app.inner.is_hydrating.swap(false, Ordering::SeqCst) {
			tracing::debug!("hydration complete");
			app.hooks().app_suspense_resolve(&app).await?;
		}
		Ok(())
	}
}
