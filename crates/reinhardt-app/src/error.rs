//! Application errors.

use reinhardt_payload::{ErrorValue, PayloadError};
use thiserror::Error;

/// Result type for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// An error raised by application code, plugins, hooks or the mount step.
///
/// This is the runtime side of the `NuxtError` payload tag: it converts to
/// and from [`ErrorValue`] so a server-captured error survives hydration.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("[{status_code}] {message}")]
pub struct AppError {
	/// HTTP status code.
	pub status_code: u16,
	/// HTTP status message.
	pub status_message: Option<String>,
	/// Human readable message.
	pub message: String,
	/// Extra data.
	pub data: Option<serde_json::Value>,
	/// Whether the error replaces the whole page.
	pub fatal: bool,
	/// Whether the error escaped application code unhandled.
	pub unhandled: bool,
	/// The URL that produced the error.
	pub url: Option<String>,
}

impl AppError {
	/// Creates an error with a status code and message.
	pub fn new(status_code: u16, message: impl Into<String>) -> Self {
		Self {
			status_code,
			status_message: None,
			message: message.into(),
			data: None,
			fatal: false,
			unhandled: false,
			url: None,
		}
	}

	/// Wraps an arbitrary failure as an unhandled 500.
	pub fn unhandled(message: impl Into<String>) -> Self {
		Self {
			unhandled: true,
			..Self::new(500, message)
		}
	}

	/// Marks the error fatal.
	pub fn fatal(mut self) -> Self {
		self.fatal = true;
		self
	}

	/// Sets the status message.
	pub fn with_status_message(mut self, message: impl Into<String>) -> Self {
		self.status_message = Some(message.into());
		self
	}

	/// Attaches extra data.
	pub fn with_data(mut self, data: serde_json::Value) -> Self {
		self.data = Some(data);
		self
	}
}

impl From<ErrorValue> for AppError {
	fn from(value: ErrorValue) -> Self {
		Self {
			status_code: value.status_code,
			status_message: value.status_message,
			message: value.message,
			data: value.data,
			fatal: value.fatal,
			unhandled: value.unhandled,
			url: value.url,
		}
	}
}

impl From<&AppError> for ErrorValue {
	fn from(error: &AppError) -> Self {
		ErrorValue {
			status_code: error.status_code,
			status_message: error.status_message.clone(),
			message: error.message.clone(),
			data: error.data.clone(),
			fatal: error.fatal,
			unhandled: error.unhandled,
			url: error.url.clone(),
		}
	}
}

impl From<PayloadError> for AppError {
	fn from(error: PayloadError) -> Self {
		Self::unhandled(format!("payload: {error}"))
	}
}
