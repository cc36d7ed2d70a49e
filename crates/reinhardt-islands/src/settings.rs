//! Island settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default debounce window for prop-change refetches.
pub const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// Island timing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IslandSettings {
	/// Quiet period after the last prop change before refetching.
	pub debounce_ms: u64,
}

impl Default for IslandSettings {
	fn default() -> Self {
		Self {
			debounce_ms: DEFAULT_DEBOUNCE_MS,
		}
	}
}

impl IslandSettings {
	/// The debounce window.
	pub fn debounce(&self) -> Duration {
		Duration::from_millis(self.debounce_ms)
	}
}
