//! Island requests and transports.

use crate::error::{IslandError, IslandResult};
use crate::fingerprint::{fingerprint, island_key};
use async_trait::async_trait;
use reinhardt_app::IslandResponse;
use serde_json::{Map, Value};
use url::Url;

/// Path prefix of the island endpoint.
pub const ISLAND_PATH_PREFIX: &str = "/__nuxt_island/";

/// One island render request.
#[derive(Debug, Clone, PartialEq)]
pub struct IslandRequest {
	/// Component name.
	pub name: String,
	/// Component props.
	pub props: Map<String, Value>,
	/// Extra render context.
	pub context: Map<String, Value>,
	/// Remote origin serving the island, when it is not this app.
	pub source: Option<String>,
	/// Id of the requesting instance, echoed back in the response.
	pub uid: Option<String>,
}

impl IslandRequest {
	/// Creates a request without props or context.
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			props: Map::new(),
			context: Map::new(),
			source: None,
			uid: None,
		}
	}

	/// The request fingerprint.
	pub fn fingerprint(&self) -> String {
		fingerprint(&self.name, &self.props, &self.context, self.source.as_deref())
	}

	/// The cache key, `<name>_<fingerprint>`.
	pub fn key(&self) -> String {
		island_key(&self.name, &self.fingerprint())
	}

	/// The endpoint path, `/__nuxt_island/<key>.json`.
	pub fn path(&self) -> String {
		format!("{ISLAND_PATH_PREFIX}{}.json", self.key())
	}

	/// Query parameters: context fields, then `props` as a JSON string.
	///
	/// String context values are sent as is, anything else as JSON.
	pub fn query(&self) -> Vec<(String, String)> {
		let mut query: Vec<(String, String)> = self
			.context
			.iter()
			.map(|(key, value)| {
				let value = match value {
					Value::String(s) => s.clone(),
					other => other.to_string(),
				};
				(key.clone(), value)
			})
			.collect();
		if !self.props.is_empty() {
			query.push(("props".into(), Value::Object(self.props.clone()).to_string()));
		}
		if let Some(uid) = &self.uid {
			query.push(("uid".into(), uid.clone()));
		}
		query
	}
}

/// Fetches rendered islands.
#[async_trait]
pub trait IslandFetcher: Send + Sync {
	/// Renders or fetches one island.
	async fn fetch(&self, request: &IslandRequest) -> IslandResult<IslandResponse>;
}

/// Fetches islands from an island endpoint over HTTP.
#[derive(Debug, Clone)]
pub struct HttpIslandFetcher {
	client: reqwest::Client,
	base_url: Url,
}

impl HttpIslandFetcher {
	/// Creates a fetcher resolving island paths against `base_url`.
	///
	/// # Errors
	///
	/// Fails if `base_url` is not an absolute URL.
	pub fn new(base_url: &str) -> IslandResult<Self> {
		Ok(Self {
			client: reqwest::Client::new(),
			base_url: Url::parse(base_url)?,
		})
	}

	/// Uses a preconfigured client.
	pub fn with_client(mut self, client: reqwest::Client) -> Self {
		self.client = client;
		self
	}

	/// The URL a request is sent to. A request `source` overrides the base.
	pub fn url_for(&self, request: &IslandRequest) -> IslandResult<Url> {
		let base = match &request.source {
			Some(source) => Url::parse(source)?,
			None => self.base_url.clone(),
		};
		Ok(base.join(&request.path())?)
	}
}

#[async_trait]
impl IslandFetcher for HttpIslandFetcher {
	async fn fetch(&self, request: &IslandRequest) -> IslandResult<IslandResponse> {
		let url = self.url_for(request)?;
		tracing::debug!(island = %request.name, %url, "fetching island");
		let response = self.client.get(url.clone()).query(&request.query()).send().await?;
		let status = response.status();
		if !status.is_success() {
			return Err(IslandError::Status {
				status: status.as_u16(),
				url: url.to_string(),
			});
		}
		Ok(response.json::<IslandResponse>().await?)
	}
}
