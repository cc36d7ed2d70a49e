//! Render errors.

use http::StatusCode;
use reinhardt_app::AppError;
use reinhardt_islands::IslandError;
use reinhardt_markers::MarkupError;
use reinhardt_payload::PayloadError;
use thiserror::Error;

/// Result type for render operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Errors raised while loading settings.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SettingsError {
	/// The settings file could not be read.
	#[error("failed to read settings: {0}")]
	Io(#[from] std::io::Error),

	/// The settings file is not valid TOML for [`crate::RenderSettings`].
	#[error("invalid settings file: {0}")]
	Toml(#[from] toml::de::Error),

	/// An environment override could not be parsed.
	#[error("invalid value for {key}: {value:?}")]
	InvalidValue {
		/// The environment variable.
		key: String,
		/// Its value.
		value: String,
	},
}

/// Errors raised while handling a render request.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RenderError {
	/// The app failed to render, or captured an error during rendering.
	#[error(transparent)]
	App(#[from] AppError),

	/// The payload could not be encoded.
	#[error(transparent)]
	Payload(#[from] PayloadError),

	/// Rendered markup could not be rewritten.
	#[error(transparent)]
	Markup(#[from] MarkupError),

	/// An island could not be rendered.
	#[error(transparent)]
	Island(#[from] IslandError),

	/// The client manifest is missing or invalid.
	#[error("client manifest: {0}")]
	Manifest(String),

	/// The request is malformed.
	#[error("bad request: {0}")]
	BadRequest(String),

	/// The requested route does not exist.
	#[error("not found: {0}")]
	NotFound(String),

	/// A custom response was attached, so rendering stopped early.
	#[error("skipping render")]
	SkippedRender,

	/// JSON encoding failed.
	#[error("json: {0}")]
	Json(#[from] serde_json::Error),

	/// Settings could not be loaded.
	#[error(transparent)]
	Settings(#[from] SettingsError),
}

impl RenderError {
	/// HTTP status the error maps to.
	pub fn status_code(&self) -> StatusCode {
		match self {
			Self::App(error) => {
				StatusCode::from_u16(error.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
			}
			Self::Island(IslandError::Render(error)) => {
				StatusCode::from_u16(error.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
			}
			Self::BadRequest(_) => StatusCode::BAD_REQUEST,
			Self::NotFound(_) => StatusCode::NOT_FOUND,
			_ => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	/// The error as an application error, for error-page rendering.
	pub fn to_app_error(&self) -> AppError {
		match self {
			Self::App(error) | Self::Island(IslandError::Render(error)) => error.clone(),
			other => {
				let mut error = AppError::new(other.status_code().as_u16(), other.to_string());
				error.status_message = other.status_code().canonical_reason().map(str::to_string);
				error
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case(RenderError::NotFound("/x".into()), 404)]
	#[case(RenderError::BadRequest("props".into()), 400)]
	#[case(RenderError::App(AppError::new(418, "teapot")), 418)]
	#[case(RenderError::App(AppError::new(1000, "nonsense")), 500)]
	#[case(RenderError::Manifest("missing".into()), 500)]
	fn test_status_codes(#[case] error: RenderError, #[case] status: u16) {
		assert_eq!(error.status_code().as_u16(), status);
	}

	#[rstest]
	fn test_to_app_error() {
		let error = RenderError::NotFound("/missing".into()).to_app_error();
		assert_eq!(error.status_code, 404);
		assert_eq!(error.status_message.as_deref(), Some("Not Found"));
		assert_eq!(error.message, "not found: /missing");

		let app = AppError::new(503, "down").fatal();
		assert_eq!(RenderError::App(app.clone()).to_app_error(), app);
	}
}
