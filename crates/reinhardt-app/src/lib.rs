//! Reinhardt App - the app instance and its hydration lifecycle
//!
//! This crate holds the pieces shared by the server render and the client
//! boot:
//!
//! - [`App`]: one app instance with its payload, hooks and typed extensions.
//! - [`SsrContext`]: the per-request state of a server render.
//! - [`Hooks`] / [`HookBus`]: the named hook points.
//! - [`Plugin`] / [`apply_plugins`]: ordered, two-phase app setup.
//! - [`ClientEntry`]: payload revival, mount-mode choice and mounting.
//!
//! ## Deferred hydration
//!
//! Async boundaries that must settle before the page counts as hydrated take
//! a [`HydrationResolver`] from [`App::defer_hydration`] and resolve it when
//! done. `app:suspense:resolve` fires once, after the last one.

#![warn(missing_docs)]

pub mod app;
pub mod context;
pub mod entry;
pub mod error;
pub mod hooks;
pub mod plugin;
pub mod response;

pub use app::{App, AppOptions, HydrationResolver};
pub use context::{
	Head, HeadTag, IslandContext, SharedPayload, SsrContext, TagPosition, teleport_key,
};
pub use entry::{ClientEntry, DocumentPayload, MountMode, MountTarget, PayloadLoader};
pub use error::{AppError, AppResult};
pub use hooks::{HookBus, Hooks};
pub use plugin::{Enforce, Plugin, apply_plugins, plugin_order};
pub use response::{
	HTML_CONTENT_TYPE, HtmlContext, IslandHead, IslandResponse, IslandStyle, JSON_CONTENT_TYPE,
	RenderResponse,
};
