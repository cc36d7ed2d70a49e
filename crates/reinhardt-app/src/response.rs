//! Render outputs handed to hooks and the HTTP layer.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Content type of rendered documents.
pub const HTML_CONTENT_TYPE: &str = "text/html;charset=utf-8";

/// Content type of JSON responses.
pub const JSON_CONTENT_TYPE: &str = "application/json;charset=utf-8";

/// An HTTP response produced by a render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderResponse {
	/// Status code.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Response body.
	pub body: Bytes,
}

impl RenderResponse {
	/// Creates an empty response with `status`.
	pub fn new(status: StatusCode) -> Self {
		Self {
			status,
			headers: HeaderMap::new(),
			body: Bytes::new(),
		}
	}

	/// A `200 OK` response with a body and content type.
	pub fn with_body(content_type: &'static str, body: impl Into<Bytes>) -> Self {
		let mut response = Self::new(StatusCode::OK);
		response
			.headers
			.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
		response.body = body.into();
		response
	}

	/// A `200 OK` HTML response.
	pub fn html(body: impl Into<Bytes>) -> Self {
		Self::with_body(HTML_CONTENT_TYPE, body)
	}

	/// A `200 OK` JSON response.
	pub fn json<T: Serialize>(value: &T) -> serde_json::Result<Self> {
		Ok(Self::with_body(JSON_CONTENT_TYPE, serde_json::to_vec(value)?))
	}

	/// Sets the status code.
	pub fn with_status(mut self, status: StatusCode) -> Self {
		self.status = status;
		self
	}

	/// Adds a header.
	pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.insert(name, value);
		self
	}

	/// The body as UTF-8 text, lossily.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}
}

impl From<RenderResponse> for http::Response<Bytes> {
	fn from(response: RenderResponse) -> Self {
		let mut out = http::Response::new(response.body);
		*out.status_mut() = response.status;
		*out.headers_mut() = response.headers;
		out
	}
}

/// Document sections collected before the final HTML string is built.
///
/// `render:html` hooks receive this and may push or rewrite any chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HtmlContext {
	/// Whether this is an island render.
	pub island: bool,
	/// Attribute strings for `<html>`.
	pub html_attrs: Vec<String>,
	/// Chunks inside `<head>`.
	pub head: Vec<String>,
	/// Attribute strings for `<body>`.
	pub body_attrs: Vec<String>,
	/// Chunks right after `<body>`.
	pub body_prepend: Vec<String>,
	/// The rendered app markup.
	pub body: Vec<String>,
	/// Chunks right before `</body>`.
	pub body_append: Vec<String>,
}

impl HtmlContext {
	/// Joins the sections into a full HTML document.
	pub fn to_document(&self) -> String {
		format!(
			"<!DOCTYPE html><html{}><head>{}</head><body{}>{}</body></html>",
			join_attrs(&self.html_attrs),
			self.head.concat(),
			join_attrs(&self.body_attrs),
			[
				self.body_prepend.concat(),
				self.body.concat(),
				self.body_append.concat()
			]
			.concat()
		)
	}
}

fn join_attrs(attrs: &[String]) -> String {
	attrs
		.iter()
		.filter(|a| !a.is_empty())
		.map(|a| format!(" {a}"))
		.collect()
}

/// An inline style entry of an island response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IslandStyle {
	/// Stable key used to deduplicate the style on the client.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub key: Option<String>,
	/// The stylesheet text.
	#[serde(rename = "innerHTML")]
	pub inner_html: String,
}

/// Head entries an island needs on the page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IslandHead {
	/// Attribute maps of `<link>` tags.
	#[serde(default)]
	pub link: Vec<IndexMap<String, String>>,
	/// Inline styles.
	#[serde(default)]
	pub style: Vec<IslandStyle>,
}

/// The JSON envelope returned for an island render.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IslandResponse {
	/// The island instance id the request carried.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	/// Head entries.
	#[serde(default)]
	pub head: IslandHead,
	/// The rendered fragment.
	#[serde(default)]
	pub html: String,
	/// State the island render produced.
	#[serde(default)]
	pub state: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use serde_json::json;

	#[rstest]
	fn test_document_layout() {
		let html = HtmlContext {
			html_attrs: vec!["lang=\"en\"".into()],
			head: vec!["<title>t</title>".into()],
			body_attrs: vec![String::new()],
			body_prepend: vec!["<noscript></noscript>".into()],
			body: vec!["<div id=\"__nuxt\"></div>".into()],
			body_append: vec!["<script></script>".into()],
			..HtmlContext::default()
		};
		assert_eq!(
			html.to_document(),
			concat!(
				"<!DOCTYPE html><html lang=\"en\"><head><title>t</title></head>",
				"<body><noscript></noscript><div id=\"__nuxt\"></div><script></script></body></html>"
			)
		);
	}

	#[rstest]
	fn test_island_response_wire_shape() {
		let response = IslandResponse {
			id: Some("abc".into()),
			head: IslandHead {
				link: vec![IndexMap::from([("rel".to_string(), "stylesheet".to_string())])],
				style: vec![IslandStyle {
					key: Some("island-style-1".into()),
					inner_html: "p{}".into(),
				}],
			},
			html: "<p>x</p>".into(),
			state: serde_json::Map::new(),
		};
		assert_eq!(
			serde_json::to_value(&response).unwrap(),
			json!({
				"id": "abc",
				"head": {
					"link": [{"rel": "stylesheet"}],
					"style": [{"key": "island-style-1", "innerHTML": "p{}"}]
				},
				"html": "<p>x</p>",
				"state": {}
			})
		);
	}

	#[rstest]
	fn test_into_http_response() {
		let response: http::Response<Bytes> = RenderResponse::html("<p></p>")
			.with_status(StatusCode::NOT_FOUND)
			.into();
		assert_eq!(response.status(), StatusCode::NOT_FOUND);
		assert_eq!(response.headers()[CONTENT_TYPE], HTML_CONTENT_TYPE);
		assert_eq!(response.body().as_ref(), b"<p></p>");
	}
}
