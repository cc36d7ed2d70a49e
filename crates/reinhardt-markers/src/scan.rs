//! Marker extraction from rendered markup.
//!
//! Everything here is structural: script content is never evaluated and a
//! marker that does not follow the grammar exactly is treated as absent.

use crate::fragment::{Fragment, NodeId};
use crate::tokenizer::{Token, tokenize};
use crate::{FRAGMENT_END, FRAGMENT_START, SLOT_DATA_ATTR, SLOT_NAME_ATTR, UID_ATTR};
use indexmap::IndexMap;
use std::borrow::Cow;

/// Serializes the markup a node stands for.
///
/// For a fragment start comment (`<!--[-->`) this is the outer HTML of each
/// following sibling up to the matching end comment, nested fragments
/// included and the outer marker pair excluded. For any other node it is
/// the node's own outer HTML.
///
/// With `without_slots`, every descendant element carrying a slot-name
/// marker is written with empty content, so stale slot markup is not carried
/// into the next render.
///
/// Returns `None` if `node` does not belong to `fragment`.
pub fn get_fragment_html(fragment: &Fragment, node: NodeId, without_slots: bool) -> Option<Vec<String>> {
	fragment.node(node)?;
	let serialize = |id: NodeId| -> String {
		if without_slots {
			outer_html_without_slots(fragment, id)
		} else {
			fragment.outer_html(id).to_string()
		}
	};

	if !fragment.is_comment(node, FRAGMENT_START) {
		return Some(vec![serialize(node)]);
	}

	let mut blocks = Vec::new();
	let mut depth = 0usize;
	let mut cursor = fragment.next_sibling(node);
	while let Some(id) = cursor {
		if fragment.is_comment(id, FRAGMENT_START) {
			depth += 1;
		} else if fragment.is_comment(id, FRAGMENT_END) {
			if depth == 0 {
				break;
			}
			depth -= 1;
		}
		blocks.push(serialize(id));
		cursor = fragment.next_sibling(id);
	}
	Some(blocks)
}

fn outer_html_without_slots(fragment: &Fragment, id: NodeId) -> String {
	let Some(node) = fragment.node(id) else {
		return String::new();
	};
	let source = fragment.source();

	// Slot elements nested inside another slot are already covered by the
	// outer one's cleared range.
	let mut cleared = Vec::new();
	for descendant in fragment.descendants(id) {
		let is_slot = fragment
			.element(descendant)
			.is_some_and(|e| e.has_attribute(SLOT_NAME_ATTR));
		if !is_slot {
			continue;
		}
		if let Some(span) = fragment.inner_span(descendant)
			&& !cleared
				.iter()
				.any(|c: &std::ops::Range<usize>| c.start <= span.start && span.end <= c.end)
		{
			cleared.push(span);
		}
	}

	let mut out = String::with_capacity(node.span.len());
	let mut at = node.span.start;
	for span in cleared {
		out.push_str(&source[at..span.start]);
		at = span.end;
	}
	out.push_str(&source[at..node.span.end]);
	out
}

/// Reads the data attached to each slot marker.
///
/// Matches start tags where `nuxt-ssr-slot-name` is immediately followed by
/// `nuxt-ssr-slot-data`. The data is entity-decoded, then parsed as JSON;
/// tags whose data does not parse are skipped.
///
/// ```
/// use reinhardt_markers::get_slot_props;
///
/// let props = get_slot_props(
/// 	r#"<div nuxt-ssr-slot-name="x" nuxt-ssr-slot-data="{&quot;a&quot;:1}"></div>"#,
/// );
/// assert_eq!(props["x"], serde_json::json!({"a": 1}));
/// ```
pub fn get_slot_props(html: &str) -> IndexMap<String, serde_json::Value> {
	let mut props = IndexMap::new();
	for token in tokenize(html) {
		let Token::StartTag { attrs, .. } = token else {
			continue;
		};
		let Some(at) = attrs.iter().position(|a| a.name == SLOT_NAME_ATTR) else {
			continue;
		};
		let (Some(name), Some(data)) = (attrs[at].value.as_deref(), attrs.get(at + 1)) else {
			continue;
		};
		if data.name != SLOT_DATA_ATTR {
			continue;
		}
		let Some(raw) = data.value.as_deref() else {
			continue;
		};
		match serde_json::from_str(&decode_entities(raw)) {
			Ok(value) => {
				props.insert(name.to_string(), value);
			}
			Err(error) => {
				tracing::debug!(slot = name, %error, "skipping slot data that is not JSON");
			}
		}
	}
	props
}

/// Names of every slot marker in `html`, in document order, deduplicated.
pub fn get_slot_names(html: &str) -> Vec<String> {
	let mut names: Vec<String> = Vec::new();
	for token in tokenize(html) {
		if let Token::StartTag { attrs, .. } = token
			&& let Some(name) = attrs
				.iter()
				.find(|a| a.name == SLOT_NAME_ATTR)
				.and_then(|a| a.value.clone())
			&& !names.contains(&name)
		{
			names.push(name);
		}
	}
	names
}

/// The first component UID marker in `html`.
pub fn get_uid(html: &str) -> Option<String> {
	tokenize(html).into_iter().find_map(|token| match token {
		Token::StartTag { attrs, .. } => attrs
			.into_iter()
			.find(|a| a.name == UID_ATTR)
			.and_then(|a| a.value),
		_ => None,
	})
}

/// Decodes the five XML entities and numeric character references.
///
/// Anything else (named HTML entities, malformed references) is left as is.
pub fn decode_entities(text: &str) -> Cow<'_, str> {
	if !text.contains('&') {
		return Cow::Borrowed(text);
	}
	let mut out = String::with_capacity(text.len());
	let mut rest = text;
	while let Some(at) = rest.find('&') {
		out.push_str(&rest[..at]);
		rest = &rest[at..];
		match decode_one(rest) {
			Some((ch, len)) => {
				out.push(ch);
				rest = &rest[len..];
			}
			None => {
				out.push('&');
				rest = &rest[1..];
			}
		}
	}
	out.push_str(rest);
	Cow::Owned(out)
}

/// Decodes the reference at the start of `s`, returning it and its length.
fn decode_one(s: &str) -> Option<(char, usize)> {
	let end = s.find(';')?;
	let body = &s[1..end];
	let ch = match body {
		"amp" => '&',
		"lt" => '<',
		"gt" => '>',
		"quot" => '"',
		"apos" => '\'',
		_ => {
			let number = body.strip_prefix('#')?;
			let code = match number.strip_prefix(['x', 'X']) {
				Some(hex) => u32::from_str_radix(hex, 16).ok()?,
				None => number.parse::<u32>().ok()?,
			};
			char::from_u32(code)?
		}
	};
	Some((ch, end + 1))
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use serde_json::json;

	#[rstest]
	fn test_fragment_block_walk() {
		let html = "<!--[--><p>a</p> <b>b</b><!--]--><i>after</i>";
		let fragment = Fragment::parse(html);
		let start = fragment.roots()[0];
		assert_eq!(
			get_fragment_html(&fragment, start, false).unwrap(),
			["<p>a</p>", " ", "<b>b</b>"]
		);
	}

	#[rstest]
	fn test_nested_fragments_are_kept_whole() {
		let html = "<!--[--><!--[--><p>x</p><!--]--><p>y</p><!--]-->";
		let fragment = Fragment::parse(html);
		let blocks = get_fragment_html(&fragment, fragment.roots()[0], false).unwrap();
		assert_eq!(blocks.concat(), "<!--[--><p>x</p><!--]--><p>y</p>");
	}

	#[rstest]
	fn test_single_root_is_byte_identical() {
		let html = r#"<div nuxt-ssr-component-uid="3" class = 'x'><br/><!-- c --></div>"#;
		let fragment = Fragment::parse(html);
		assert_eq!(
			get_fragment_html(&fragment, fragment.roots()[0], false).unwrap(),
			[html]
		);
	}

	#[rstest]
	fn test_without_slots_clears_slot_content() {
		let html = concat!(
			r#"<div nuxt-ssr-component-uid="1">"#,
			r#"<div nuxt-ssr-slot-name="default"><span>stale</span></div>"#,
			r#"<p>kept</p></div>"#
		);
		let fragment = Fragment::parse(html);
		let blocks = get_fragment_html(&fragment, fragment.roots()[0], true).unwrap();
		assert_eq!(
			blocks,
			[concat!(
				r#"<div nuxt-ssr-component-uid="1">"#,
				r#"<div nuxt-ssr-slot-name="default"></div>"#,
				r#"<p>kept</p></div>"#
			)]
		);
	}

	#[rstest]
	fn test_slot_props_skip_malformed_entries() {
		let html = concat!(
			r#"<div nuxt-ssr-slot-name="ok" nuxt-ssr-slot-data="[1,&#50;]"></div>"#,
			r#"<div nuxt-ssr-slot-name="bad" nuxt-ssr-slot-data="{oops"></div>"#,
			r#"<div nuxt-ssr-slot-name="apart" class="x" nuxt-ssr-slot-data="1"></div>"#,
			r#"<div nuxt-ssr-slot-name="bare"></div>"#
		);
		let props = get_slot_props(html);
		assert_eq!(props.len(), 1);
		assert_eq!(props["ok"], json!([1, 2]));
	}

	#[rstest]
	fn test_slot_names() {
		let html = r#"<i nuxt-ssr-slot-name="a"></i><i nuxt-ssr-slot-name="b"></i><i nuxt-ssr-slot-name="a"></i>"#;
		assert_eq!(get_slot_names(html), ["a", "b"]);
	}

	#[rstest]
	#[case("a &amp; b", "a & b")]
	#[case("&lt;&gt;&quot;&apos;", "<>\"'")]
	#[case("&#65;&#x42;&#X43;", "ABC")]
	#[case("&nbsp;&#xZZ;& x", "&nbsp;&#xZZ;& x")]
	fn test_decode_entities(#[case] input: &str, #[case] expected: &str) {
		assert_eq!(decode_entities(input), expected);
	}

	#[rstest]
	fn test_uid_is_not_read_from_scripts() {
		let html = r#"<script>"<i nuxt-ssr-component-uid='no'>"</script><div nuxt-ssr-component-uid="yes"></div>"#;
		assert_eq!(get_uid(html).as_deref(), Some("yes"));
	}
}
