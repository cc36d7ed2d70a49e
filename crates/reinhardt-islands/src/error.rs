//! Island errors.

use reinhardt_app::AppError;
use reinhardt_markers::MarkupError;
use thiserror::Error;

/// Result type for island operations.
pub type IslandResult<T> = Result<T, IslandError>;

/// Errors raised while fetching or splicing an island.
///
/// Errors are `Clone` because one coalesced fetch hands its result to every
/// waiter.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum IslandError {
	/// The request could not be sent or the response not read.
	#[error("island request failed: {0}")]
	Transport(String),

	/// The island endpoint answered with a non-success status.
	#[error("island endpoint {url} returned {status}")]
	Status {
		/// HTTP status code.
		status: u16,
		/// The requested URL.
		url: String,
	},

	/// The island URL could not be built.
	#[error("invalid island url: {0}")]
	Url(String),

	/// The response or a cached entry is not a valid island envelope.
	#[error("invalid island response: {0}")]
	Decode(String),

	/// The returned markup could not be rewritten.
	#[error("island markup: {0}")]
	Markup(String),

	/// The in-process island render failed.
	#[error("island render failed: {0}")]
	Render(AppError),
}

impl From<reqwest::Error> for IslandError {
	fn from(error: reqwest::Error) -> Self {
		Self::Transport(error.to_string())
	}
}

impl From<url::ParseError> for IslandError {
	fn from(error: url::ParseError) -> Self {
		Self::Url(error.to_string())
	}
}

impl From<serde_json::Error> for IslandError {
	fn from(error: serde_json::Error) -> Self {
		Self::Decode(error.to_string())
	}
}

impl From<MarkupError> for IslandError {
	fn from(error: MarkupError) -> Self {
		Self::Markup(error.to_string())
	}
}

impl From<AppError> for IslandError {
	fn from(error: AppError) -> Self {
		Self::Render(error)
	}
}
