//! Request handling: from a URL to a document, a payload resource or an
//! island envelope.

use crate::cache::PrerenderCaches;
use crate::error::{RenderError, RenderResult};
use crate::head::{DefaultHeadResolver, HeadResolver, escape_attr};
use crate::manifest::{ClientManifest, ResourceTags, join_url};
use crate::renderer::{LazyRenderer, Renderer, prefer_payload_error};
use crate::route::{RouteKind, RouteRule, RouteRules, StaticRouteRules};
use crate::settings::RenderSettings;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode, Uri};
use indexmap::IndexMap;
use reinhardt_app::{
	AppError, HookBus, HtmlContext, IslandContext, IslandHead, IslandResponse, IslandStyle,
	RenderResponse, SsrContext,
};
use reinhardt_islands::{ISLAND_PATH_PREFIX, content_hash, replace_island_teleports};
use reinhardt_markers::Fragment;
use reinhardt_payload::{PayloadCodec, PayloadFormat};
use serde::Deserialize;
use serde_json::{Map, Value as Json};
use std::fmt;
use std::sync::Arc;

/// Response header naming the extracted payload of a prerendered page.
pub const PRERENDER_HEADER: HeaderName = HeaderName::from_static("x-nitro-prerender");

/// An inbound render request.
#[derive(Debug, Clone)]
pub struct RenderRequest {
	/// Request method.
	pub method: Method,
	/// Request URI (path and query are used).
	pub uri: Uri,
	/// Request headers.
	pub headers: HeaderMap,
	/// Request body.
	pub body: Bytes,
	/// Whether the request comes from this server rather than a client.
	pub internal: bool,
}

impl RenderRequest {
	/// Creates a request without headers or body.
	pub fn new(method: Method, uri: Uri) -> Self {
		Self {
			method,
			uri,
			headers: HeaderMap::new(),
			body: Bytes::new(),
			internal: false,
		}
	}

	/// A `GET` request.
	pub fn get(uri: Uri) -> Self {
		Self::new(Method::GET, uri)
	}

	/// Marks the request as internal.
	pub fn internal(mut self) -> Self {
		self.internal = true;
		self
	}

	/// Adds a header.
	pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.insert(name, value);
		self
	}

	/// Sets the body.
	pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
		self.body = body.into();
		self
	}

	/// Path and query.
	pub fn url(&self) -> &str {
		self.uri.path_and_query().map_or("/", |pq| pq.as_str())
	}

	/// The raw query string.
	pub fn query(&self) -> &str {
		self.uri.query().unwrap_or_default()
	}
}

impl From<http::Request<Bytes>> for RenderRequest {
	fn from(request: http::Request<Bytes>) -> Self {
		let (parts, body) = request.into_parts();
		Self {
			method: parts.method,
			uri: parts.uri,
			headers: parts.headers,
			body,
			internal: false,
		}
	}
}

/// Renders documents, payload resources and islands.
pub struct RenderHandler {
	settings: RenderSettings,
	codec: PayloadCodec,
	ssr: LazyRenderer,
	spa: LazyRenderer,
	hooks: Arc<HookBus>,
	route_rules: Arc<dyn RouteRules>,
	head: Arc<dyn HeadResolver>,
	caches: PrerenderCaches,
	runtime_config: Map<String, Json>,
}

impl fmt::Debug for RenderHandler {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RenderHandler")
			.field("settings", &self.settings)
			.field("ssr", &self.ssr)
			.field("spa", &self.spa)
			.field("hooks", &self.hooks)
			.finish_non_exhaustive()
	}
}

impl RenderHandler {
	/// Creates a handler with a server renderer and a SPA renderer.
	pub fn new(settings: RenderSettings, ssr: LazyRenderer, spa: LazyRenderer) -> Self {
		Self {
			codec: PayloadCodec::new(settings.payload_format),
			settings,
			ssr,
			spa,
			hooks: Arc::new(HookBus::new()),
			route_rules: Arc::new(StaticRouteRules::new()),
			head: Arc::new(DefaultHeadResolver),
			caches: PrerenderCaches::new(),
			runtime_config: Map::new(),
		}
	}

	/// Replaces the payload codec (custom reducers).
	pub fn with_codec(mut self, codec: PayloadCodec) -> Self {
		self.codec = codec;
		self
	}

	/// Shares a hook bus.
	pub fn with_hooks(mut self, hooks: Arc<HookBus>) -> Self {
		self.hooks = hooks;
		self
	}

	/// Sets the route rules.
	pub fn with_route_rules(mut self, rules: impl RouteRules + 'static) -> Self {
		self.route_rules = Arc::new(rules);
		self
	}

	/// Sets the head resolver.
	pub fn with_head_resolver(mut self, head: impl HeadResolver + 'static) -> Self {
		self.head = Arc::new(head);
		self
	}

	/// Sets the public runtime config copied into every payload.
	pub fn with_runtime_config(mut self, config: Map<String, Json>) -> Self {
		self.runtime_config = config;
		self
	}

	/// The settings.
	pub fn settings(&self) -> &RenderSettings {
		&self.settings
	}

	/// The hook bus.
	pub fn hooks(&self) -> &Arc<HookBus> {
		&self.hooks
	}

	/// The prerender caches.
	pub fn caches(&self) -> &PrerenderCaches {
		&self.caches
	}

	/// Handles one request.
	///
	/// # Errors
	///
	/// Returns the render error for the HTTP layer to turn into an error
	/// page. A response attached by the app is returned as `Ok` even when the
	/// render stopped early.
	#[tracing::instrument(skip_all, fields(method = %request.method, url = %request.url()))]
	pub async fn handle(&self, request: RenderRequest) -> RenderResult<RenderResponse> {
		let url = request.url().to_string();
		let route = RouteKind::classify(&url);
		let prerender = self.settings.prerender;
		let mut target = url.clone();
		let mut ssr_error: Option<AppError> = None;
		let mut island = None;

		match &route {
			RouteKind::Error => {
				if !request.internal {
					return Err(RenderError::NotFound(path_of(&url).to_string()));
				}
				let (error, error_url) = parse_error_query(request.query())?;
				target = error_url;
				ssr_error = Some(error);
			}
			RouteKind::Island { name, id } => {
				if prerender && let Some(cached) = self.caches.island(&url).await {
					tracing::debug!("island served from prerender cache");
					return Ok(RenderResponse::json(&cached)?);
				}
				let context = island_context(&request, name, id)?;
				target = context.url.clone();
				island = Some(context);
			}
			RouteKind::Payload { document_url } => {
				if prerender && let Some(cached) = self.caches.payload(&cache_key(document_url)).await {
					tracing::debug!("payload served from prerender cache");
					return Ok(cached);
				}
				target = document_url.clone();
			}
			RouteKind::Document => {}
		}

		let is_island = island.is_some();
		let rule = self.route_rules.rule(&target);
		let no_ssr = self.settings.no_ssr
			|| (rule.ssr == Some(false) && !is_island)
			|| (prerender
				&& self
					.settings
					.spa_fallback_routes
					.iter()
					.any(|route| route == path_of(&target)));
		let extract = prerender && self.settings.payload_extraction && !no_ssr && !is_island;
		tracing::debug!(?route, target = %target, no_ssr, extract, "route resolved");

		let mut ctx = SsrContext::new(target)
			.with_request(request.method.clone(), request.headers.clone())
			.with_runtime_config(self.runtime_config.clone())
			.with_no_ssr(no_ssr)
			.with_prerendering(prerender);
		if let Some(island) = island {
			ctx = ctx.with_island(island);
		}
		{
			let mut payload = ctx.payload.write();
			if let Some(error) = &ssr_error {
				payload.error = Some(error.into());
			}
			if prerender {
				payload.prerendered_at = Some(chrono::Utc::now().timestamp_millis() as f64);
			}
		}
		let ctx = Arc::new(ctx);

		let renderer = if no_ssr {
			self.spa.get().await?
		} else {
			self.ssr.get().await?
		};
		let rendered = match renderer.render_to_string(&ctx).await {
			Ok(rendered) => rendered,
			Err(error) => {
				if matches!(error, RenderError::SkippedRender)
					&& let Some(response) = ctx.take_response()
				{
					return Ok(response);
				}
				let error = match ssr_error {
					Some(_) => error,
					None => prefer_payload_error(&ctx, error),
				};
				tracing::error!(%error, "render failed");
				return Err(error);
			}
		};
		if let Some(response) = ctx.take_response() {
			return Ok(response);
		}
		if ssr_error.is_none()
			&& let Some(error) = ctx.payload.read().error.clone()
		{
			return Err(RenderError::App(error.into()));
		}

		if let RouteKind::Payload { document_url } = &route {
			let response = self.payload_resource(&ctx)?;
			if prerender {
				self.caches
					.store_payload(cache_key(document_url), response.clone())
					.await;
			}
			return Ok(response);
		}

		let body = replace_island_teleports(&ctx, &rendered.html)?;

		if let (Some(island), RouteKind::Island { id, .. }) = (&ctx.island, &route) {
			let mut html = HtmlContext {
				island: true,
				body: vec![body],
				..HtmlContext::default()
			};
			self.hooks.render_html(&mut html, &ctx).await?;
			let canonical = format!("{ISLAND_PATH_PREFIX}{}_{id}.json", island.name);
			return self
				.island_response(&ctx, island, html.body.concat(), renderer.manifest(), &url, canonical)
				.await;
		}

		let mut headers = HeaderMap::new();
		let payload_url = if extract {
			let path = path_of(&ctx.url);
			let file = join_url(path, self.payload_file());
			match HeaderValue::from_str(&file) {
				Ok(value) => {
					headers.insert(PRERENDER_HEADER, value);
				}
				Err(error) => tracing::warn!(%error, file = %file, "payload path is not a valid header"),
			}
			self.caches
				.store_payload(cache_key(path), self.payload_resource(&ctx)?)
				.await;
			Some(format!(
				"{}?{}",
				join_url(self.settings.public_base(), &file),
				self.settings.build_id
			))
		} else {
			None
		};

		let mut html = self.assemble(&ctx, renderer.as_ref(), &rule, body, payload_url.as_deref())?;
		self.hooks.render_html(&mut html, &ctx).await?;

		let mut response = RenderResponse::html(html.to_document());
		response.headers.extend(headers);
		if let Some(error) = &ssr_error {
			response.status =
				StatusCode::from_u16(error.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		}
		self.hooks.render_response(&mut response, &ctx).await?;
		tracing::debug!(status = %response.status, "document rendered");
		Ok(response)
	}

	fn payload_file(&self) -> &'static str {
		match self.codec.format() {
			PayloadFormat::Json => "_payload.json",
			PayloadFormat::Script => "_payload.js",
		}
	}

	fn assets_base(&self) -> String {
		join_url(self.settings.public_base(), &self.settings.build_assets_dir)
	}

	fn payload_resource(&self, ctx: &SsrContext) -> RenderResult<RenderResponse> {
		let (_, extracted) = ctx.payload.read().split();
		let body = self.codec.render_resource(&extracted)?;
		Ok(RenderResponse::with_body(self.codec.resource_content_type(), body))
	}

	fn assemble(
		&self,
		ctx: &SsrContext,
		renderer: &dyn Renderer,
		rule: &RouteRule,
		body: String,
		payload_url: Option<&str>,
	) -> RenderResult<HtmlContext> {
		let resolved = self.head.resolve(&ctx.head.lock());
		let resources = renderer.manifest().resources(&ctx.modules());
		let tags = ResourceTags::new(&resources, self.assets_base());

		let mut head = Vec::new();
		if let Some(src) = payload_url {
			head.push(match self.codec.format() {
				PayloadFormat::Json => format!(
					r#"<link rel="preload" as="fetch" crossorigin="anonymous" href="{}">"#,
					escape_attr(src)
				),
				PayloadFormat::Script => format!(r#"<link rel="modulepreload" href="{}">"#, escape_attr(src)),
			});
		}
		head.push(resolved.head_tags);
		if !rule.no_scripts {
			head.push(tags.resource_hints());
		}
		head.push(tags.styles());
		head.push(resolved.styles);
		if !rule.no_scripts {
			let payload = ctx.payload.read().clone();
			let ssr = !ctx.no_ssr;
			let script = match payload_url {
				Some(src) => self
					.codec
					.render_document_script(&payload.split().0, ssr, Some(src))?,
				None => self.codec.render_document_script(&payload, ssr, None)?,
			};
			head.push(script);
			head.push(tags.scripts());
		}

		let mut html_attrs = vec![resolved.html_attrs];
		if let Some(lang) = &self.settings.lang
			&& !ctx.head.lock().html_attrs.contains_key("lang")
		{
			html_attrs.push(format!("lang=\"{}\"", escape_attr(lang)));
		}

		Ok(HtmlContext {
			island: false,
			html_attrs,
			head,
			body_attrs: vec![resolved.body_attrs],
			body_prepend: vec![resolved.body_prepend],
			body: vec![
				body,
				format!("<div id=\"{}\"></div>", escape_attr(&self.settings.app_teleport_id)),
			],
			body_append: vec![resolved.body_append],
		})
	}

	async fn island_response(
		&self,
		ctx: &SsrContext,
		island: &IslandContext,
		html: String,
		manifest: &ClientManifest,
		url: &str,
		canonical: String,
	) -> RenderResult<RenderResponse> {
		let assets_base = self.assets_base();
		let entry_css: Vec<String> = manifest
			.entry_css()
			.iter()
			.map(|file| join_url(&assets_base, file))
			.collect();

		// Stylesheets of the modules the island used come first, as on a page.
		let mut links: Vec<IndexMap<String, String>> = manifest
			.resources(&ctx.modules())
			.styles
			.iter()
			.map(|file| {
				IndexMap::from([
					("rel".to_string(), "stylesheet".to_string()),
					("href".to_string(), join_url(&assets_base, file)),
					("crossorigin".to_string(), String::new()),
				])
			})
			.collect();
		let resolved = self.head.resolve_tags(&ctx.head.lock());
		let mut styles = Vec::new();
		for tag in resolved {
			match tag.tag.as_str() {
				"link" => links.push(tag.attrs),
				"style" => styles.push(tag.inner_html.unwrap_or_default()),
				_ => {}
			}
		}

		let mut head = IslandHead::default();
		let mut seen_hrefs = Vec::new();
		for mut attrs in links {
			if let Some(href) = attrs.get("href") {
				if entry_css.contains(href) || seen_hrefs.contains(href) {
					continue;
				}
				seen_hrefs.push(href.clone());
			}
			if !attrs.contains_key("key") {
				let hash = content_hash(&serde_json::to_string(&attrs)?);
				attrs.insert("key".into(), format!("island-link-{hash}"));
			}
			head.link.push(attrs);
		}
		for inner_html in styles {
			head.style.push(IslandStyle {
				key: Some(format!("island-style-{}", content_hash(&inner_html))),
				inner_html,
			});
		}

		let state: Map<String, Json> = {
			let payload = ctx.payload.read();
			let state = payload.state.read();
			state
				.iter()
				.filter_map(|(key, value)| value.to_json().map(|json| (key.clone(), json)))
				.collect()
		};

		let mut envelope = IslandResponse {
			id: island.id.clone(),
			head,
			html: self.strip_app_root(&html),
			state,
		};
		self.hooks.render_island(&mut envelope, ctx).await?;
		if ctx.prerendering {
			self.caches.store_island(url, envelope.clone()).await;
			self.caches.store_island_props(canonical, url).await;
		}

		let mut response = RenderResponse::json(&envelope)?;
		self.hooks.render_response(&mut response, ctx).await?;
		tracing::debug!(island = %island.name, "island rendered");
		Ok(response)
	}

	/// Removes the app root element wrapping an island render.
	fn strip_app_root(&self, html: &str) -> String {
		let fragment = Fragment::parse(html);
		if let [root] = fragment.roots()
			&& let Some(element) = fragment.element(*root)
			&& element.name == self.settings.app_root_tag
			&& element.attribute("id") == Some(self.settings.app_root_id.as_str())
			&& element.end_tag.is_some()
		{
			return fragment.inner_html(*root).to_string();
		}
		html.to_string()
	}
}

fn path_of(url: &str) -> &str {
	url.split('?').next().unwrap_or(url)
}

/// Payload cache key: the page path without a trailing slash.
fn cache_key(path: &str) -> String {
	match path_of(path).trim_end_matches('/') {
		"" => "/".to_string(),
		trimmed => trimmed.to_string(),
	}
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorQuery {
	status_code: Option<u16>,
	status_message: Option<String>,
	message: Option<String>,
	url: Option<String>,
}

fn parse_error_query(query: &str) -> RenderResult<(AppError, String)> {
	let query: ErrorQuery = serde_urlencoded::from_str(query)
		.map_err(|e| RenderError::BadRequest(format!("error query: {e}")))?;
	let mut error = AppError::new(query.status_code.unwrap_or(500), query.message.unwrap_or_default());
	error.status_message = query.status_message;
	error.url = query.url.clone();
	Ok((error, query.url.unwrap_or_else(|| "/".to_string())))
}

fn island_context(request: &RenderRequest, name: &str, id: &str) -> RenderResult<IslandContext> {
	let bad = |what: &str, e: &dyn fmt::Display| RenderError::BadRequest(format!("island {what}: {e}"));
	let mut fields: Map<String, Json> = if request.method == Method::POST {
		let is_json = request
			.headers
			.get(CONTENT_TYPE)
			.and_then(|value| value.to_str().ok())
			.is_some_and(|value| value.contains("json"));
		if is_json {
			serde_json::from_slice(&request.body).map_err(|e| bad("body", &e))?
		} else {
			string_fields(serde_urlencoded::from_bytes(&request.body).map_err(|e| bad("body", &e))?)
		}
	} else {
		string_fields(serde_urlencoded::from_str(request.query()).map_err(|e| bad("query", &e))?)
	};

	let props = match fields.remove("props") {
		None => Map::new(),
		Some(Json::String(text)) if text.is_empty() => Map::new(),
		Some(Json::String(text)) => serde_json::from_str(&text).map_err(|e| bad("props", &e))?,
		Some(Json::Object(props)) => props,
		Some(other) => return Err(bad("props", &format!("expected an object, got {other}"))),
	};
	let uid = fields.remove("uid").map(|value| match value {
		Json::String(uid) => uid,
		other => other.to_string(),
	});
	let url = match fields.remove("url") {
		Some(Json::String(url)) if !url.is_empty() => url,
		_ => "/".to_string(),
	};

	Ok(IslandContext {
		id: Some(uid.unwrap_or_else(|| id.to_string())),
		name: name.to_string(),
		props,
		context: fields,
		url,
	})
}

fn string_fields(pairs: Vec<(String, String)>) -> Map<String, Json> {
	pairs
		.into_iter()
		.map(|(key, value)| (key, Json::String(value)))
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use serde_json::json;

	fn island_request(uri: &str) -> RenderRequest {
		RenderRequest::get(uri.parse().unwrap())
	}

	#[rstest]
	fn test_island_context_from_query() {
		let request = island_request(
			"/__nuxt_island/Card_abc.json?lang=en&props=%7B%22title%22%3A%22Hi%22%7D&uid=u-1&url=%2Fblog",
		);
		let ctx = island_context(&request, "Card", "abc").unwrap();
		assert_eq!(ctx.id.as_deref(), Some("u-1"));
		assert_eq!(ctx.props["title"], json!("Hi"));
		assert_eq!(ctx.context["lang"], json!("en"));
		assert_eq!(ctx.url, "/blog");
		assert!(!ctx.context.contains_key("url"));
	}

	#[rstest]
	fn test_island_context_defaults() {
		let ctx = island_context(&island_request("/__nuxt_island/Card_abc.json"), "Card", "abc").unwrap();
		assert_eq!(ctx.id.as_deref(), Some("abc"));
		assert!(ctx.props.is_empty());
		assert_eq!(ctx.url, "/");
	}

	#[rstest]
	fn test_island_context_from_json_body() {
		let request = RenderRequest::new(Method::POST, "/__nuxt_island/Card_abc.json".parse().unwrap())
			.with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
			.with_body(r#"{"props":"{\"n\":2}","theme":"dark"}"#);
		let ctx = island_context(&request, "Card", "abc").unwrap();
		assert_eq!(ctx.props["n"], json!(2));
		assert_eq!(ctx.context["theme"], json!("dark"));
	}

	#[rstest]
	fn test_island_context_from_form_body() {
		let request = RenderRequest::new(Method::POST, "/__nuxt_island/Card_abc.json".parse().unwrap())
			.with_body("props=%7B%7D&theme=light");
		let ctx = island_context(&request, "Card", "abc").unwrap();
		assert!(ctx.props.is_empty());
		assert_eq!(ctx.context["theme"], json!("light"));
	}

	#[rstest]
	#[case("/__nuxt_island/Card_abc.json?props=%7Boops")]
	#[case("/__nuxt_island/Card_abc.json?props=%5B1%5D")]
	fn test_malformed_props_are_rejected(#[case] uri: &str) {
		let error = island_context(&island_request(uri), "Card", "abc").unwrap_err();
		assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
	}

	#[rstest]
	fn test_error_query() {
		let (error, url) =
			parse_error_query("statusCode=404&statusMessage=Not%20Found&message=gone&url=%2Fold").unwrap();
		assert_eq!(error.status_code, 404);
		assert_eq!(error.status_message.as_deref(), Some("Not Found"));
		assert_eq!(error.message, "gone");
		assert_eq!(url, "/old");

		let (error, url) = parse_error_query("").unwrap();
		assert_eq!(error.status_code, 500);
		assert_eq!(url, "/");
	}

	#[rstest]
	#[case("/", "/")]
	#[case("/blog/", "/blog")]
	#[case("/blog?x=1", "/blog")]
	fn test_cache_key(#[case] path: &str, #[case] expected: &str) {
		assert_eq!(cache_key(path), expected);
	}

	#[rstest]
	fn test_request_url() {
		let request = island_request("/a/b?c=d");
		assert_eq!(request.url(), "/a/b?c=d");
		assert_eq!(request.query(), "c=d");
		assert!(!request.internal);
		assert!(request.internal().internal);
	}
}
