//! App plugins and their two-phase application.

use crate::app::App;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use futures::future::{BoxFuture, Either, select};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;

/// Where a plugin runs relative to the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Enforce {
	/// Before default plugins.
	Pre,
	/// In registration order.
	#[default]
	Default,
	/// In the second phase, after every other plugin settled.
	Post,
}

impl Enforce {
	/// Sort rank used when a plugin has no explicit order.
	pub fn rank(self) -> i32 {
		match self {
			Self::Pre => -20,
			Self::Default => 0,
			Self::Post => 20,
		}
	}
}

/// A unit of app setup run before mount.
#[async_trait]
pub trait Plugin: Send + Sync {
	/// Name used in logs.
	fn name(&self) -> &str;

	/// Placement group.
	fn enforce(&self) -> Enforce {
		Enforce::Default
	}

	/// Explicit sort key, overriding the placement rank.
	fn order(&self) -> Option<i32> {
		None
	}

	/// Whether later plugins of the same phase may start before this one
	/// finishes.
	fn parallel(&self) -> bool {
		false
	}

	/// Runs the plugin.
	async fn setup(&self, app: &App) -> AppResult<()>;
}

/// Sort key of a plugin.
pub fn plugin_order(plugin: &dyn Plugin) -> i32 {
	plugin.order().unwrap_or_else(|| plugin.enforce().rank())
}

/// Applies `plugins` to `app`.
///
/// Plugins are stable-sorted by [`plugin_order`] and run in two phases:
/// everything not enforced `Post`, then the `Post` plugins. Within a phase,
/// sequential plugins are awaited one by one while parallel ones keep
/// running alongside; the phase ends only once every parallel plugin
/// settled.
///
/// # Errors
///
/// A failing sequential plugin aborts immediately. Failures of parallel
/// plugins are collected and the first one is returned at the phase barrier.
pub async fn apply_plugins(app: &App, plugins: &[Arc<dyn Plugin>]) -> AppResult<()> {
	let mut sorted: Vec<&Arc<dyn Plugin>> = plugins.iter().collect();
	sorted.sort_by_key(|p| plugin_order(p.as_ref()));
	let (post, default): (Vec<_>, Vec<_>) = sorted
		.into_iter()
		.partition(|p| p.enforce() == Enforce::Post);

	run_phase(app, &default).await?;
	run_phase(app, &post).await
}

async fn run_phase(app: &App, plugins: &[&Arc<dyn Plugin>]) -> AppResult<()> {
	let mut parallel: FuturesUnordered<BoxFuture<'_, AppResult<()>>> = FuturesUnordered::new();
	let mut failures: Vec<AppError> = Vec::new();

	for plugin in plugins {
		tracing::debug!(plugin = plugin.name(), parallel = plugin.parallel(), "applying plugin");
		let setup = plugin.setup(app);
		if plugin.parallel() {
			parallel.push(setup);
			continue;
		}

		let mut setup = setup;
		loop {
			if parallel.is_empty() {
				setup.await?;
				break;
			}
			// Parallel plugins are polled first so each gets to run up to its
			// first suspension before the next sequential plugin starts.
			match select(parallel.next(), setup.as_mut()).await {
				Either::Left((Some(Err(error)), _)) => failures.push(error),
				Either::Left(_) => {}
				Either::Right((result, _)) => {
					result?;
					break;
				}
			}
		}
	}

	while let Some(result) = parallel.next().await {
		if let Err(error) = result {
			failures.push(error);
		}
	}
	match failures.into_iter().next() {
		Some(error) => Err(error),
		None => Ok(()),
	}
}
