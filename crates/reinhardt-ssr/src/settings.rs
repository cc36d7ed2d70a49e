//! Render settings.
//!
//! Settings come from defaults, an optional TOML file, then environment
//! variables prefixed `REINHARDT_RENDER_`, in increasing priority:
//!
//! ```toml
//! base_url = "/"
//! build_id = "3f2a"
//! payload_format = "json"
//! payload_extraction = true
//!
//! [islands]
//! debounce_ms = 250
//! ```

use crate::error::SettingsError;
use reinhardt_islands::IslandSettings;
use reinhardt_payload::PayloadFormat;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "REINHARDT_RENDER_";

/// Routes rendered as SPA shells during prerendering.
pub const DEFAULT_SPA_FALLBACK_ROUTES: &[&str] = &["/index.html", "/200.html", "/404.html"];

/// Settings of the render orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
	/// Render every route as a SPA shell.
	pub no_ssr: bool,
	/// How the payload is embedded.
	pub payload_format: PayloadFormat,
	/// Serve `data` from a separate payload resource during prerendering.
	pub payload_extraction: bool,
	/// Whether this process is a prerender run.
	pub prerender: bool,
	/// Routes rendered as SPA shells while prerendering.
	pub spa_fallback_routes: Vec<String>,
	/// Public base URL of the app.
	pub base_url: String,
	/// CDN URL assets and payloads are served from, if any.
	pub cdn_url: Option<String>,
	/// Directory of built client assets, relative to the base URL.
	pub build_assets_dir: String,
	/// Build id appended to payload URLs.
	pub build_id: String,
	/// Tag of the app root element.
	pub app_root_tag: String,
	/// Id of the app root element.
	pub app_root_id: String,
	/// Id of the container for app-level teleports.
	pub app_teleport_id: String,
	/// Markup shown inside the root while a SPA shell loads.
	pub spa_loading_template: Option<String>,
	/// `lang` of the document.
	pub lang: Option<String>,
	/// Island settings.
	pub islands: IslandSettings,
}

impl Default for RenderSettings {
	fn default() -> Self {
		Self {
			no_ssr: false,
			payload_format: PayloadFormat::Json,
			payload_extraction: false,
			prerender: false,
			spa_fallback_routes: DEFAULT_SPA_FALLBACK_ROUTES
				.iter()
				.map(|route| route.to_string())
				.collect(),
			base_url: "/".into(),
			cdn_url: None,
			build_assets_dir: "/_nuxt/".into(),
			build_id: "dev".into(),
			app_root_tag: "div".into(),
			app_root_id: "__nuxt".into(),
			app_teleport_id: "teleports".into(),
			spa_loading_template: None,
			lang: None,
			islands: IslandSettings::default(),
		}
	}
}

impl RenderSettings {
	/// Parses settings from TOML text.
	pub fn from_toml_str(text: &str) -> Result<Self, SettingsError> {
		Ok(toml::from_str(text)?)
	}

	/// Reads settings from a TOML file.
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
		Self::from_toml_str(&std::fs::read_to_string(path)?)
	}

	/// Loads settings from an optional file, then applies the process
	/// environment.
	pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
		let settings = match path {
			Some(path) if path.exists() => Self::from_file(path)?,
			_ => Self::default(),
		};
		settings.with_env(std::env::vars())
	}

	/// Applies `REINHARDT_RENDER_*` overrides from `vars`.
	///
	/// Variables are matched case-insensitively after the prefix; unknown
	/// names are ignored. Lists are comma separated.
	pub fn with_env(
		mut self,
		vars: impl IntoIterator<Item = (String, String)>,
	) -> Result<Self, SettingsError> {
		for (key, value) in vars {
			let Some(name) = key.strip_prefix(ENV_PREFIX) else {
				continue;
			};
			let invalid = || SettingsError::InvalidValue {
				key: key.clone(),
				value: value.clone(),
			};
			match name.to_ascii_lowercase().as_str() {
				"no_ssr" => self.no_ssr = parse_bool(&value).ok_or_else(invalid)?,
				"payload_extraction" => {
					self.payload_extraction = parse_bool(&value).ok_or_else(invalid)?
				}
				"prerender" => self.prerender = parse_bool(&value).ok_or_else(invalid)?,
				"payload_format" => {
					self.payload_format = match value.trim().to_ascii_lowercase().as_str() {
						"json" => PayloadFormat::Json,
						"script" | "js" => PayloadFormat::Script,
						_ => return Err(invalid()),
					}
				}
				"spa_fallback_routes" => {
					self.spa_fallback_routes = value
						.split(',')
						.map(str::trim)
						.filter(|route| !route.is_empty())
						.map(str::to_string)
						.collect()
				}
				"base_url" => self.base_url = value,
				"cdn_url" => self.cdn_url = (!value.is_empty()).then_some(value),
				"build_assets_dir" => self.build_assets_dir = value,
				"build_id" => self.build_id = value,
				"app_root_tag" => self.app_root_tag = value,
				"app_root_id" => self.app_root_id = value,
				"lang" => self.lang = Some(value),
				"island_debounce_ms" => {
					self.islands.debounce_ms = value.trim().parse().map_err(|_| invalid())?
				}
				other => tracing::debug!(variable = other, "ignoring unknown render setting"),
			}
		}
		Ok(self)
	}

	/// The URL prefix assets and payload resources are served under.
	pub fn public_base(&self) -> &str {
		self.cdn_url.as_deref().unwrap_or(&self.base_url)
	}
}

fn parse_bool(value: &str) -> Option<bool> {
	match value.trim().to_ascii_lowercase().as_str() {
		"true" | "1" | "yes" | "on" => Some(true),
		"false" | "0" | "no" | "off" => Some(false),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
		pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect()
	}

	#[rstest]
	fn test_defaults() {
		let settings = RenderSettings::default();
		assert_eq!(settings.spa_fallback_routes, ["/index.html", "/200.html", "/404.html"]);
		assert_eq!(settings.islands.debounce_ms, 100);
		assert_eq!(settings.public_base(), "/");
	}

	#[rstest]
	fn test_toml_file_fills_missing_fields_with_defaults() {
		let settings = RenderSettings::from_toml_str(
			r#"
			payload_format = "script"
			cdn_url = "https://cdn.example/"

			[islands]
			debounce_ms = 250
			"#,
		)
		.unwrap();
		assert_eq!(settings.payload_format, PayloadFormat::Script);
		assert_eq!(settings.public_base(), "https://cdn.example/");
		assert_eq!(settings.islands.debounce_ms, 250);
		assert_eq!(settings.app_root_id, "__nuxt");
	}

	#[rstest]
	fn test_env_overrides() {
		let settings = RenderSettings::default()
			.with_env(vars(&[
				("REINHARDT_RENDER_PRERENDER", "yes"),
				("REINHARDT_RENDER_payload_extraction", "1"),
				("REINHARDT_RENDER_SPA_FALLBACK_ROUTES", "/a, /b,"),
				("REINHARDT_RENDER_ISLAND_DEBOUNCE_MS", "20"),
				("REINHARDT_RENDER_UNKNOWN", "x"),
				("PATH", "/usr/bin"),
			]))
			.unwrap();
		assert!(settings.prerender);
		assert!(settings.payload_extraction);
		assert_eq!(settings.spa_fallback_routes, ["/a", "/b"]);
		assert_eq!(settings.islands.debounce_ms, 20);
	}

	#[rstest]
	#[case("REINHARDT_RENDER_NO_SSR", "maybe")]
	#[case("REINHARDT_RENDER_PAYLOAD_FORMAT", "xml")]
	#[case("REINHARDT_RENDER_ISLAND_DEBOUNCE_MS", "-1")]
	fn test_invalid_env_values(#[case] key: &str, #[case] value: &str) {
		let result = RenderSettings::default().with_env(vars(&[(key, value)]));
		assert!(matches!(result, Err(SettingsError::InvalidValue { .. })));
	}

	#[rstest]
	#[serial_test::serial]
	fn test_load_reads_process_environment() {
		// SAFETY: Modifying environment variables is unsafe in multi-threaded programs.
		// This test uses #[serial] to ensure exclusive access to environment variables.
		unsafe {
			std::env::set_var("REINHARDT_RENDER_BUILD_ID", "from-env");
		}

		let settings = RenderSettings::load(Some(Path::new("/nonexistent/render.toml"))).unwrap();
		assert_eq!(settings.build_id, "from-env");

		// SAFETY: Removing environment variables is unsafe in multi-threaded programs.
		// This test uses #[serial] to ensure exclusive access to environment variables.
		unsafe {
			std::env::remove_var("REINHARDT_RENDER_BUILD_ID");
		}
	}
}
