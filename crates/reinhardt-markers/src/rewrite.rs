//! Rewrites of marker-tagged markup.

use crate::error::{MarkupError, MarkupResult};
use crate::fragment::{Element, Fragment, NodeId};
use crate::scan::decode_entities;
use crate::{SLOT_NAME_ATTR, UID_ATTR};
use lol_html::html_content::{ContentType, Element as HtmlElement};
use lol_html::{ElementContentHandlers, HandlerResult, RewriteStrSettings, Selector, rewrite_str};
use std::borrow::Cow;

/// Content to insert into one island slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInsertion {
	/// UID of the island root.
	pub uid: String,
	/// Slot name inside that island.
	pub slot: String,
	/// Markup to insert.
	pub html: String,
}

/// Rewrites every component UID marker in `html` to `uid`.
///
/// All instances are rewritten, so a refetched fragment never carries the
/// identifier of an instance that is still mounted.
pub fn replace_uid(html: &str, uid: &str) -> MarkupResult<String> {
	let selector = format!("[{UID_ATTR}]");
	rewrite(html, vec![handler(&selector, |el: &mut HtmlElement| {
		el.set_attribute(UID_ATTR, uid)?;
		Ok(())
	})?])
}

/// Empties every slot element in `html`.
pub fn clear_slots(html: &str) -> MarkupResult<String> {
	let selector = format!("[{SLOT_NAME_ATTR}]");
	rewrite(html, vec![handler(&selector, |el: &mut HtmlElement| {
		el.set_inner_content("", ContentType::Html);
		Ok(())
	})?])
}

/// The selector addressing a slot of a given island instance.
pub fn slot_selector(uid: &str, slot: &str) -> String {
	format!(
		"[{UID_ATTR}=\"{}\"] [{SLOT_NAME_ATTR}=\"{}\"]",
		escape_selector_value(uid),
		escape_selector_value(slot)
	)
}

/// Inserts each entry's markup immediately after the start tag of its slot
/// element.
///
/// The slot is the first element named `slot` owned by the island root
/// carrying `uid`. Slots of nested islands with another uid are not
/// searched. Entries whose slot cannot be found leave the markup untouched;
/// entries for the same slot keep their order.
pub fn insert_into_slots(html: &str, insertions: &[SlotInsertion]) -> MarkupResult<String> {
	if insertions.is_empty() {
		return Ok(html.to_string());
	}
	let fragment = Fragment::parse(html);
	let mut points: Vec<(usize, &str)> = Vec::with_capacity(insertions.len());
	for insertion in insertions {
		match slot_start(&fragment, &insertion.uid, &insertion.slot) {
			Some(at) => points.push((at, insertion.html.as_str())),
			None => {
				tracing::debug!(uid = %insertion.uid, slot = %insertion.slot, "slot not found");
			}
		}
	}
	points.sort_by_key(|(at, _)| *at);

	let extra: usize = points.iter().map(|(_, content)| content.len()).sum();
	let mut out = String::with_capacity(html.len() + extra);
	let mut at = 0;
	for (point, content) in points {
		out.push_str(&html[at..point]);
		out.push_str(content);
		at = point;
	}
	out.push_str(&html[at..]);
	Ok(out)
}

/// End of the start tag of island `uid`'s slot named `slot`.
fn slot_start(fragment: &Fragment, uid: &str, slot: &str) -> Option<usize> {
	let marker = |element: &Element, name: &str| {
		element.attribute(name).map(|value| decode_entities(value).into_owned())
	};
	let root = fragment.all().find(|id| {
		fragment
			.element(*id)
			.is_some_and(|e| marker(e, UID_ATTR).as_deref() == Some(uid))
	})?;

	let mut stack: Vec<NodeId> = fragment.children(root).iter().rev().copied().collect();
	while let Some(id) = stack.pop() {
		let Some(element) = fragment.element(id) else {
			continue;
		};
		if marker(element, UID_ATTR).is_some_and(|owner| owner != uid) {
			continue;
		}
		if marker(element, SLOT_NAME_ATTR).as_deref() == Some(slot) {
			return Some(element.start_tag.end);
		}
		stack.extend(fragment.children(id).iter().rev().copied());
	}
	None
}

type Handler<'h> = (Cow<'static, Selector>, ElementContentHandlers<'h>);

fn handler<'h>(
	selector: &str,
	f: impl FnMut(&mut HtmlElement) -> HandlerResult + 'h,
) -> MarkupResult<Handler<'h>> {
	let selector: Selector = selector
		.parse()
		.map_err(|e| MarkupError::Selector(format!("{selector}: {e}")))?;
	Ok((Cow::Owned(selector), ElementContentHandlers::default().element(f)))
}

fn rewrite(html: &str, handlers: Vec<Handler<'_>>) -> MarkupResult<String> {
	Ok(rewrite_str(
		html,
		RewriteStrSettings {
			element_content_handlers: handlers,
			..RewriteStrSettings::new()
		},
	)?)
}

fn escape_selector_value(value: &str) -> String {
	value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_replace_uid_rewrites_every_marker() {
		let html = r#"<div nuxt-ssr-component-uid="old"><p nuxt-ssr-component-uid="old">x</p></div>"#;
		let out = replace_uid(html, "new").unwrap();
		assert_eq!(
			out,
			r#"<div nuxt-ssr-component-uid="new"><p nuxt-ssr-component-uid="new">x</p></div>"#
		);
	}

	#[rstest]
	fn test_replace_uid_leaves_other_markup_alone() {
		let html = "<ul><li>a</li></ul>";
		assert_eq!(replace_uid(html, "x").unwrap(), html);
	}

	#[rstest]
	fn test_insert_after_slot_start_tag() {
		let html = concat!(
			r#"<div nuxt-ssr-component-uid="u1"><div nuxt-ssr-slot-name="default"><b>old</b></div></div>"#,
			r#"<div nuxt-ssr-component-uid="u2"><div nuxt-ssr-slot-name="default"></div></div>"#
		);
		let out = insert_into_slots(
			html,
			&[SlotInsertion {
				uid: "u1".into(),
				slot: "default".into(),
				html: "<i>new</i>".into(),
			}],
		)
		.unwrap();
		assert_eq!(
			out,
			concat!(
				r#"<div nuxt-ssr-component-uid="u1"><div nuxt-ssr-slot-name="default"><i>new</i><b>old</b></div></div>"#,
				r#"<div nuxt-ssr-component-uid="u2"><div nuxt-ssr-slot-name="default"></div></div>"#
			)
		);
	}

	#[rstest]
	fn test_insert_skips_nested_island_slots() {
		let html = concat!(
			r#"<div nuxt-ssr-component-uid="a"><div nuxt-ssr-component-uid="b">"#,
			r#"<div nuxt-ssr-slot-name="default"></div></div>"#,
			r#"<div nuxt-ssr-slot-name="default"></div>"#,
			r#"<div nuxt-ssr-slot-name="default"></div></div>"#
		);
		let out = insert_into_slots(
			html,
			&[SlotInsertion {
				uid: "a".into(),
				slot: "default".into(),
				html: "<p>X</p>".into(),
			}],
		)
		.unwrap();
		assert_eq!(out.matches("<p>X</p>").count(), 1);
		assert_eq!(
			out,
			concat!(
				r#"<div nuxt-ssr-component-uid="a"><div nuxt-ssr-component-uid="b">"#,
				r#"<div nuxt-ssr-slot-name="default"></div></div>"#,
				r#"<div nuxt-ssr-slot-name="default"><p>X</p></div>"#,
				r#"<div nuxt-ssr-slot-name="default"></div></div>"#
			)
		);
	}

	#[rstest]
	fn test_inserts_for_one_slot_keep_order() {
		let html = r#"<i nuxt-ssr-component-uid="u"><b nuxt-ssr-slot-name="s"></b></i>"#;
		let insertion = |content: &str| SlotInsertion {
			uid: "u".into(),
			slot: "s".into(),
			html: content.into(),
		};
		assert_eq!(
			insert_into_slots(html, &[insertion("1"), insertion("2")]).unwrap(),
			r#"<i nuxt-ssr-component-uid="u"><b nuxt-ssr-slot-name="s">12</b></i>"#
		);
	}

	#[rstest]
	fn test_clear_slots() {
		let html = r#"<div nuxt-ssr-slot-name="a">x</div><p>y</p>"#;
		assert_eq!(
			clear_slots(html).unwrap(),
			r#"<div nuxt-ssr-slot-name="a"></div><p>y</p>"#
		);
	}

	#[rstest]
	fn test_slot_selector_escapes_quotes() {
		assert_eq!(
			slot_selector("a\"b", "s"),
			r#"[nuxt-ssr-component-uid="a\"b"] [nuxt-ssr-slot-name="s"]"#
		);
	}
}
