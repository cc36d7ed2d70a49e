//! Reinhardt Islands - independently server-rendered fragments
//!
//! An island is a component whose markup is rendered on the server, on its
//! own, and fetched by a content fingerprint. The client embeds the markup,
//! rewrites its uid marker so it never collides with a mounted instance, and
//! moves the parent's slot content into the slot markers of the fragment.
//!
//! ## Pieces
//!
//! - [`fingerprint`] / [`island_key`]: the `<name>_<fingerprint>` cache key.
//! - [`Coalescer`]: one in-flight future per key, dropped on settle.
//! - [`IslandFetcher`]: the transport; [`HttpIslandFetcher`] talks to an
//!   island endpoint.
//! - [`Island`]: fetch, render, and the refetch triggers.
//! - [`replace_island_teleports`]: the server-side slot splice.

#![warn(missing_docs)]

pub mod coalesce;
pub mod component;
pub mod error;
pub mod fetcher;
pub mod fingerprint;
pub mod settings;
pub mod teleport;

pub use coalesce::Coalescer;
pub use component::{
	ISLAND_DATA_MARKER, Island, IslandFetches, IslandOptions, IslandRender, Teleport,
	TeleportTarget,
};
pub use error::{IslandError, IslandResult};
pub use fetcher::{HttpIslandFetcher, ISLAND_PATH_PREFIX, IslandFetcher, IslandRequest};
pub use fingerprint::{
	INTERNAL_PROP_PREFIX, content_hash, filter_props, fingerprint, island_key, parse_island_key,
};
pub use settings::{DEFAULT_DEBOUNCE_MS, IslandSettings};
pub use teleport::{parse_teleport_key, replace_island_teleports};
