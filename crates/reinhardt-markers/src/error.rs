//! Markup rewriting errors.

use thiserror::Error;

/// Result type for markup rewrites.
pub type MarkupResult<T> = Result<T, MarkupError>;

/// Errors raised while rewriting markup.
///
/// Scanning never fails; only the streaming rewrites can.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MarkupError {
	/// The rewriter rejected the input or a handler failed.
	#[error("markup rewrite failed: {0}")]
	Rewrite(#[from] lol_html::errors::RewritingError),

	/// A generated selector did not parse.
	#[error("invalid selector {0}")]
	Selector(String),
}
