//! Server-side slot splicing.

use crate::error::IslandResult;
use reinhardt_app::SsrContext;
use reinhardt_markers::{SlotInsertion, insert_into_slots};

/// Splits a teleport key `uid=<U>;slot=<S>` into uid and slot.
pub fn parse_teleport_key(key: &str) -> Option<(&str, &str)> {
	let (uid, slot) = key.split_once(';')?;
	Some((uid.strip_prefix("uid=")?, slot.strip_prefix("slot=")?))
}

/// Inserts the slot contents recorded in `ctx` into the rendered `html`.
///
/// Each recorded teleport lands right after the start tag of the slot
/// element inside the island root carrying the matching uid. Island renders
/// are returned unchanged: their slots are filled by the page that embeds
/// them.
pub fn replace_island_teleports(ctx: &SsrContext, html: &str) -> IslandResult<String> {
	if ctx.is_island() {
		return Ok(html.to_string());
	}
	let insertions: Vec<SlotInsertion> = ctx
		.teleports()
		.into_iter()
		.filter_map(|(key, content)| {
			let Some((uid, slot)) = parse_teleport_key(&key) else {
				tracing::debug!(%key, "skipping teleport with a foreign key");
				return None;
			};
			Some(SlotInsertion {
				uid: uid.to_string(),
				slot: slot.to_string(),
				html: content,
			})
		})
		.collect();
	Ok(insert_into_slots(html, &insertions)?)
}
