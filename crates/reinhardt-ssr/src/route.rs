//! Request classification and route rules.

use regex::Regex;
use reinhardt_islands::ISLAND_PATH_PREFIX;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Path of the internal error page route.
pub const ERROR_ROUTE: &str = "/__nuxt_error";

static PAYLOAD_URL: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"^[^?]*/_payload(?:\.[a-zA-Z0-9]+)?\.(?:json|js)(?:\?.*)?$")
		.expect("payload route pattern is valid")
});

static ISLAND_SUFFIX: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"\.json(?:\?.*)?$").expect("island suffix pattern is valid"));

/// What kind of response a request asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteKind {
	/// A full HTML document.
	Document,
	/// The extracted payload of the document at `document_url`.
	Payload {
		/// The page the payload belongs to.
		document_url: String,
	},
	/// A server-rendered island.
	Island {
		/// Component name.
		name: String,
		/// Fingerprint or instance id from the path.
		id: String,
	},
	/// The internal error page.
	Error,
}

impl RouteKind {
	/// Classifies a request URL (path plus optional query).
	pub fn classify(url: &str) -> Self {
		let path = url.split('?').next().unwrap_or_default();
		if path == ERROR_ROUTE {
			return Self::Error;
		}
		if let Some(rest) = url.strip_prefix(ISLAND_PATH_PREFIX) {
			let key = ISLAND_SUFFIX.replace(rest, "");
			let key = key.split('?').next().unwrap_or_default();
			if let Some((name, id)) = key.rsplit_once('_')
				&& !name.is_empty()
			{
				return Self::Island {
					name: name.to_string(),
					id: id.to_string(),
				};
			}
			return Self::Document;
		}
		if PAYLOAD_URL.is_match(url) {
			return Self::Payload {
				document_url: document_url(path),
			};
		}
		Self::Document
	}

	/// Whether the request is an island render.
	pub fn is_island(&self) -> bool {
		matches!(self, Self::Island { .. })
	}
}

/// Strips the payload file name, leaving the page it belongs to.
fn document_url(path: &str) -> String {
	match path.rsplit_once('/') {
		Some(("", _)) | None => "/".to_string(),
		Some((dir, _)) => dir.to_string(),
	}
}

/// Per-route render options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouteRule {
	/// `Some(false)` renders the route as a SPA shell.
	pub ssr: Option<bool>,
	/// Omit payload and entry scripts from the document.
	pub no_scripts: bool,
}

/// Looks up the rule for a path.
pub trait RouteRules: Send + Sync {
	/// The rule matching `path`.
	fn rule(&self, path: &str) -> RouteRule;
}

/// Route rules from glob patterns, the first match winning.
///
/// `**` matches any number of segments and `*` matches within one segment.
#[derive(Debug, Clone, Default)]
pub struct StaticRouteRules {
	rules: Vec<(Regex, RouteRule)>,
}

impl StaticRouteRules {
	/// Creates an empty rule set.
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a rule for `pattern`.
	pub fn with_rule(mut self, pattern: &str, rule: RouteRule) -> Result<Self, regex::Error> {
		self.rules.push((glob_regex(pattern)?, rule));
		Ok(self)
	}
}

impl RouteRules for StaticRouteRules {
	fn rule(&self, path: &str) -> RouteRule {
		let path = path.split('?').next().unwrap_or_default();
		self.rules
			.iter()
			.find(|(pattern, _)| pattern.is_match(path))
			.map(|(_, rule)| *rule)
			.unwrap_or_default()
	}
}

fn glob_regex(pattern: &str) -> Result<Regex, regex::Error> {
	let mut out = String::from("^");
	let mut rest = pattern;
	while !rest.is_empty() {
		if let Some(tail) = rest.strip_prefix("**") {
			out.push_str(".*");
			rest = tail;
		} else if let Some(tail) = rest.strip_prefix('*') {
			out.push_str("[^/]*");
			rest = tail;
		} else {
			let next = rest.find('*').unwrap_or(rest.len());
			out.push_str(&regex::escape(&rest[..next]));
			rest = &rest[next..];
		}
	}
	out.push('$');
	Regex::new(&out)
}
