//! Error pages for failed renders.

use crate::handler::{RenderHandler, RenderRequest};
use crate::head::escape_attr;
use crate::route::ERROR_ROUTE;
use http::{StatusCode, Uri};
use reinhardt_app::{AppError, HTML_CONTENT_TYPE, RenderResponse};
use serde::Serialize;

/// Renders an error through the app's own error route, falling back to a
/// minimal page when that fails too.
#[derive(Debug, Clone)]
pub struct ErrorPage {
	error: AppError,
	url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorQuery<'a> {
	status_code: u16,
	#[serde(skip_serializing_if = "Option::is_none")]
	status_message: Option<&'a str>,
	message: &'a str,
	url: &'a str,
}

impl ErrorPage {
	/// An error page for `error`, raised while rendering `url`.
	pub fn new(error: AppError, url: impl Into<String>) -> Self {
		Self {
			error,
			url: url.into(),
		}
	}

	/// The status the page is served with.
	pub fn status(&self) -> StatusCode {
		StatusCode::from_u16(self.error.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
	}

	/// The internal error route URL carrying the error.
	pub fn route_url(&self) -> String {
		let query = ErrorQuery {
			status_code: self.error.status_code,
			status_message: self.error.status_message.as_deref(),
			message: &self.error.message,
			url: &self.url,
		};
		match serde_urlencoded::to_string(&query) {
			Ok(query) => format!("{ERROR_ROUTE}?{query}"),
			Err(_) => ERROR_ROUTE.to_string(),
		}
	}

	/// Renders the page through `handler`.
	pub async fn render(&self, handler: &RenderHandler) -> RenderResponse {
		let rendered = match self.route_url().parse::<Uri>() {
			Ok(uri) => handler.handle(RenderRequest::get(uri).internal()).await,
			Err(error) => {
				tracing::warn!(%error, "error route url is invalid");
				return self.fallback();
			}
		};
		match rendered {
			Ok(response) => response.with_status(self.status()),
			Err(error) => {
				tracing::error!(%error, original = %self.error, "error page failed to render");
				self.fallback()
			}
		}
	}

	/// A static error page.
	pub fn fallback(&self) -> RenderResponse {
		let status = self.status();
		let title = self
			.error
			.status_message
			.clone()
			.or_else(|| status.canonical_reason().map(str::to_string))
			.unwrap_or_default();
		let body = format!(
			"<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{code} - {title}</title></head>\
			<body><h1>{code}</h1><p>{message}</p></body></html>",
			code = status.as_u16(),
			title = escape_attr(&title),
			message = escape_attr(&self.error.message),
		);
		RenderResponse::with_body(HTML_CONTENT_TYPE, body).with_status(status)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_route_url() {
		let page = ErrorPage::new(AppError::new(404, "no such page").with_status_message("Not Found"), "/a?b=1");
		assert_eq!(
			page.route_url(),
			"/__nuxt_error?statusCode=404&statusMessage=Not+Found&message=no+such+page&url=%2Fa%3Fb%3D1"
		);
	}

	#[rstest]
	fn test_fallback_escapes_message() {
		let page = ErrorPage::new(AppError::new(500, "<script>x</script>"), "/");
		let response = page.fallback();
		assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
		let text = response.text();
		assert!(text.contains("<title>500 - Internal Server Error</title>"));
		assert!(text.contains("&lt;script&gt;x&lt;/script&gt;"));
	}
}
