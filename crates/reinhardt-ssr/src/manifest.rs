//! Client build manifest and the resource tags derived from it.

use crate::error::{RenderError, RenderResult};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One chunk of the client build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManifestChunk {
	/// Output file, relative to the assets directory.
	pub file: String,
	/// Whether this is the app entry.
	pub is_entry: bool,
	/// Stylesheets the chunk needs.
	pub css: Vec<String>,
	/// Chunks imported statically.
	pub imports: Vec<String>,
	/// Chunks imported lazily.
	pub dynamic_imports: Vec<String>,
}

/// The client build manifest: module id to chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientManifest {
	chunks: IndexMap<String, ManifestChunk>,
}

/// Files a page needs, grouped by how they are referenced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resources {
	/// Entry scripts.
	pub scripts: Vec<String>,
	/// Stylesheets.
	pub styles: Vec<String>,
	/// Statically imported chunks, preloaded.
	pub preload: Vec<String>,
	/// Lazily imported chunks, prefetched.
	pub prefetch: Vec<String>,
}

impl ClientManifest {
	/// Parses a manifest.
	pub fn from_json(text: &str) -> RenderResult<Self> {
		serde_json::from_str(text).map_err(|e| RenderError::Manifest(e.to_string()))
	}

	/// Reads a manifest file.
	pub async fn from_file(path: impl AsRef<Path>) -> RenderResult<Self> {
		let path = path.as_ref();
		let text = tokio::fs::read_to_string(path)
			.await
			.map_err(|e| RenderError::Manifest(format!("{}: {e}", path.display())))?;
		Self::from_json(&text)
	}

	/// Adds a chunk.
	pub fn insert(&mut self, id: impl Into<String>, chunk: ManifestChunk) {
		self.chunks.insert(id.into(), chunk);
	}

	/// Looks up a chunk.
	pub fn get(&self, id: &str) -> Option<&ManifestChunk> {
		self.chunks.get(id)
	}

	/// The entry chunks, in manifest order.
	pub fn entries(&self) -> impl Iterator<Item = (&str, &ManifestChunk)> {
		self.chunks
			.iter()
			.filter(|(_, chunk)| chunk.is_entry)
			.map(|(id, chunk)| (id.as_str(), chunk))
	}

	/// CSS files of the entry chunks and their static imports.
	pub fn entry_css(&self) -> IndexSet<String> {
		let ids: Vec<String> = self.entries().map(|(id, _)| id.to_string()).collect();
		self.resources(&ids).styles.into_iter().collect()
	}

	/// Resolves the files needed by the entries plus the `modules` a render
	/// used.
	///
	/// Static imports are followed transitively; lazy imports of anything
	/// reached are prefetched unless they are already preloaded.
	pub fn resources(&self, modules: &[String]) -> Resources {
		let mut seen: IndexSet<&str> = IndexSet::new();
		let mut stack: Vec<&str> = self
			.entries()
			.map(|(id, _)| id)
			.chain(modules.iter().map(String::as_str))
			.collect();
		stack.reverse();
		while let Some(id) = stack.pop() {
			if !seen.insert(id) {
				continue;
			}
			if let Some(chunk) = self.chunks.get(id) {
				stack.extend(chunk.imports.iter().rev().map(String::as_str));
			}
		}

		let mut resources = Resources::default();
		let mut lazy: IndexSet<&str> = IndexSet::new();
		for id in &seen {
			let Some(chunk) = self.chunks.get(*id) else {
				continue;
			};
			push_unique(&mut resources.styles, chunk.css.iter().cloned());
			if chunk.is_entry {
				push_unique(&mut resources.scripts, [chunk.file.clone()]);
			} else {
				push_unique(&mut resources.preload, [chunk.file.clone()]);
			}
			lazy.extend(chunk.dynamic_imports.iter().map(String::as_str));
		}
		for id in lazy {
			if seen.contains(id) {
				continue;
			}
			if let Some(chunk) = self.chunks.get(id) {
				push_unique(&mut resources.prefetch, [chunk.file.clone()]);
			}
		}
		resources
	}
}

fn push_unique(list: &mut Vec<String>, items: impl IntoIterator<Item = String>) {
	for item in items {
		if !list.contains(&item) {
			list.push(item);
		}
	}
}

/// Renders resource tags with asset URLs under `assets_base`.
#[derive(Debug, Clone)]
pub struct ResourceTags<'a> {
	resources: &'a Resources,
	assets_base: String,
}

impl<'a> ResourceTags<'a> {
	/// Creates a renderer for `resources`.
	pub fn new(resources: &'a Resources, assets_base: impl Into<String>) -> Self {
		Self {
			resources,
			assets_base: assets_base.into(),
		}
	}

	fn url(&self, file: &str) -> String {
		join_url(&self.assets_base, file)
	}

	/// `<link rel="stylesheet">` tags.
	pub fn styles(&self) -> String {
		self.resources
			.styles
			.iter()
			.map(|file| format!(r#"<link rel="stylesheet" href="{}" crossorigin>"#, self.url(file)))
			.collect()
	}

	/// Preload and prefetch hints, entry scripts included.
	pub fn resource_hints(&self) -> String {
		let preload = self
			.resources
			.scripts
			.iter()
			.chain(&self.resources.preload)
			.map(|file| format!(r#"<link rel="modulepreload" as="script" crossorigin href="{}">"#, self.url(file)));
		let prefetch = self
			.resources
			.prefetch
			.iter()
			.map(|file| format!(r#"<link rel="prefetch" as="script" crossorigin href="{}">"#, self.url(file)));
		preload.chain(prefetch).collect()
	}

	/// Entry `<script type="module">` tags.
	pub fn scripts(&self) -> String {
		self.resources
			.scripts
			.iter()
			.map(|file| format!(r#"<script type="module" src="{}" crossorigin></script>"#, self.url(file)))
			.collect()
	}
}

/// Joins URL segments with exactly one `/` between them.
pub fn join_url(base: &str, path: &str) -> String {
	match (base.ends_with('/'), path.starts_with('/')) {
		(true, true) => format!("{base}{}", &path[1..]),
		(false, false) if !base.is_empty() && !path.is_empty() => format!("{base}/{path}"),
		_ => format!("{base}{path}"),
	}
}
