//! Payload codec errors.

use thiserror::Error;

/// Result type for payload operations.
pub type PayloadResult<T> = Result<T, PayloadError>;

/// Errors raised while encoding or decoding a payload.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PayloadError {
	/// The input is not valid JSON.
	#[error("malformed payload JSON: {0}")]
	Json(#[from] serde_json::Error),

	/// The top-level value is neither a reference table nor a sentinel.
	#[error("invalid payload format: {0}")]
	InvalidFormat(String),

	/// A slot refers to an index outside the reference table.
	#[error("dangling payload reference: {0}")]
	DanglingReference(i64),

	/// A built-in tagged form carries the wrong shape.
	#[error("invalid `{tag}` entry: {reason}")]
	InvalidTagged {
		/// The tag of the malformed entry.
		tag: String,
		/// What was wrong with it.
		reason: String,
	},

	/// A reviver-tagged slot refers back to itself before it was revived.
	#[error("cyclic reference through revived slot {0}")]
	CyclicReviver(usize),

	/// The value cannot be written in the requested form.
	#[error("cannot serialize {0}")]
	Unserializable(String),

	/// The decoded value does not have the expected payload shape.
	#[error("invalid payload shape: {0}")]
	InvalidShape(String),
}
