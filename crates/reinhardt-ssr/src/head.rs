//! Rendering of head metadata collected during a render.

use indexmap::IndexMap;
use reinhardt_app::{Head, HeadTag, TagPosition};

/// Head metadata rendered to document chunks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedHead {
	/// Tags for `<head>`, inline styles excepted.
	pub head_tags: String,
	/// Inline `<style>` tags, placed after linked stylesheets.
	pub styles: String,
	/// Attribute string for `<html>`.
	pub html_attrs: String,
	/// Attribute string for `<body>`.
	pub body_attrs: String,
	/// Tags right after `<body>`.
	pub body_prepend: String,
	/// Tags right before `</body>`.
	pub body_append: String,
}

/// Turns a render's [`Head`] into document chunks.
pub trait HeadResolver: Send + Sync {
	/// The tags of `head` that survive resolution, in output order.
	fn resolve_tags(&self, head: &Head) -> Vec<HeadTag>;

	/// Renders `head`.
	fn resolve(&self, head: &Head) -> ResolvedHead {
		let mut resolved = ResolvedHead {
			html_attrs: render_attrs(&head.html_attrs).trim_start().to_string(),
			body_attrs: render_attrs(&head.body_attrs).trim_start().to_string(),
			..ResolvedHead::default()
		};
		for tag in self.resolve_tags(head) {
			let html = render_tag(&tag);
			match tag.position {
				TagPosition::Head if tag.tag == "style" => resolved.styles.push_str(&html),
				TagPosition::Head => resolved.head_tags.push_str(&html),
				TagPosition::BodyOpen => resolved.body_prepend.push_str(&html),
				TagPosition::BodyClose => resolved.body_append.push_str(&html),
			}
		}
		resolved
	}
}

/// Keeps tags in insertion order, deduplicating by `key` attribute.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHeadResolver;

impl HeadResolver for DefaultHeadResolver {
	fn resolve_tags(&self, head: &Head) -> Vec<HeadTag> {
		// Later tags with the same key replace earlier ones in place.
		let mut tags: IndexMap<String, &HeadTag> = IndexMap::new();
		for (index, tag) in head.tags.iter().enumerate() {
			let key = tag
				.attrs
				.get("key")
				.map_or_else(|| format!("#{index}"), |key| format!("{}:{key}", tag.tag));
			tags.insert(key, tag);
		}
		tags.into_values().cloned().collect()
	}
}

const VOID_TAGS: &[&str] = &["base", "link", "meta"];

/// Renders one tag. The `key` attribute is internal and never written.
pub fn render_tag(tag: &HeadTag) -> String {
	let attrs: IndexMap<String, String> = tag
		.attrs
		.iter()
		.filter(|(name, _)| name.as_str() != "key")
		.map(|(name, value)| (name.clone(), value.clone()))
		.collect();
	let open = format!("<{}{}>", tag.tag, render_attrs(&attrs));
	if VOID_TAGS.contains(&tag.tag.as_str()) {
		return open;
	}
	format!("{open}{}</{}>", tag.inner_html.as_deref().unwrap_or_default(), tag.tag)
}

/// Renders attributes as ` name="value"` pairs; empty values render bare.
pub fn render_attrs(attrs: &IndexMap<String, String>) -> String {
	attrs
		.iter()
		.map(|(name, value)| {
			if value.is_empty() {
				format!(" {name}")
			} else {
				format!(" {name}=\"{}\"", escape_attr(value))
			}
		})
		.collect()
}

/// Escapes an attribute value.
pub fn escape_attr(value: &str) -> String {
	value
		.replace('&', "&amp;")
		.replace('"', "&quot;")
		.replace('<', "&lt;")
		.replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_positions_and_dedup() {
		let mut head = Head::default();
		head.push(HeadTag::new("title").inner_html("One"));
		head.push(HeadTag::new("style").inner_html(".a{}"));
		head.push(HeadTag::new("meta").attr("key", "desc").attr("name", "description").attr("content", "a"));
		head.push(HeadTag::new("script").attr("src", "/x.js").position(TagPosition::BodyClose));
		head.push(HeadTag::new("meta").attr("key", "desc").attr("name", "description").attr("content", "b"));
		head.html_attrs.insert("lang".into(), "en".into());

		let resolved = DefaultHeadResolver.resolve(&head);
		assert_eq!(
			resolved.head_tags,
			r#"<title>One</title><meta name="description" content="b">"#
		);
		assert_eq!(resolved.styles, "<style>.a{}</style>");
		assert_eq!(resolved.body_append, r#"<script src="/x.js"></script>"#);
		assert_eq!(resolved.html_attrs, r#"lang="en""#);
		assert!(resolved.body_prepend.is_empty());
	}

	#[rstest]
	fn test_resolved_tags_are_deduplicated() {
		let mut head = Head::default();
		head.push(HeadTag::new("style").attr("key", "theme").inner_html("a"));
		head.push(HeadTag::new("link").attr("href", "/x.css"));
		head.push(HeadTag::new("style").attr("key", "theme").inner_html("b"));

		let tags = DefaultHeadResolver.resolve_tags(&head);
		assert_eq!(tags.len(), 2);
		assert_eq!(tags[0].inner_html.as_deref(), Some("b"));
		assert_eq!(tags[1].tag, "link");
	}

	#[rstest]
	fn test_attribute_escaping() {
		let tag = HeadTag::new("meta").attr("content", r#"a "b" <c>"#).attr("async", "");
		assert_eq!(render_tag(&tag), r#"<meta content="a &quot;b&quot; &lt;c&gt;" async>"#);
	}
}
