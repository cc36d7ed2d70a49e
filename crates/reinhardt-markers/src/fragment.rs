//! Span-preserving HTML fragment tree.
//!
//! Nodes keep byte ranges into the source instead of a normalized form, so
//! serializing an untouched node returns exactly the text it was parsed from.

use crate::tokenizer::{Attribute, Token, VOID_ELEMENTS, tokenize};
use std::ops::Range;

/// Index of a node within its [`Fragment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Element data.
#[derive(Debug, Clone)]
pub struct Element {
	/// Tag name, lowercased.
	pub name: String,
	/// Attributes in source order.
	pub attrs: Vec<Attribute>,
	/// Byte range of the start tag.
	pub start_tag: Range<usize>,
	/// Byte range of the end tag, if the source has one.
	pub end_tag: Option<Range<usize>>,
}

impl Element {
	/// Returns the raw value of an attribute (`""` for a bare attribute).
	pub fn attribute(&self, name: &str) -> Option<&str> {
		self.attrs
			.iter()
			.find(|a| a.name.eq_ignore_ascii_case(name))
			.map(|a| a.value.as_deref().unwrap_or(""))
	}

	/// Whether the element carries `name`.
	pub fn has_attribute(&self, name: &str) -> bool {
		self.attrs.iter().any(|a| a.name.eq_ignore_ascii_case(name))
	}
}

/// The kind of a node.
#[derive(Debug, Clone)]
pub enum NodeData {
	/// An element with its children.
	Element(Element),
	/// Character data. Stray end tags are kept as text so no bytes are lost.
	Text,
	/// A comment.
	Comment(String),
	/// A doctype or other declaration.
	Declaration,
}

/// A node of a [`Fragment`].
#[derive(Debug, Clone)]
pub struct Node {
	/// The node kind.
	pub data: NodeData,
	/// Byte range of the whole node (outer HTML).
	pub span: Range<usize>,
	parent: Option<NodeId>,
	children: Vec<NodeId>,
}

/// A parsed HTML fragment.
#[derive(Debug, Clone)]
pub struct Fragment {
	source: String,
	nodes: Vec<Node>,
	roots: Vec<NodeId>,
}

impl Fragment {
	/// Parses `html` into a tree.
	///
	/// Parsing never fails. End tags close the nearest open element with the
	/// same name (implicitly closing anything opened after it); end tags with
	/// no open match are kept as text.
	pub fn parse(html: impl Into<String>) -> Self {
		let source = html.into();
		let mut fragment = Self {
			nodes: Vec::new(),
			roots: Vec::new(),
			source: String::new(),
		};
		let mut open: Vec<NodeId> = Vec::new();

		for token in tokenize(&source) {
			match token {
				Token::StartTag {
					name,
					attrs,
					self_closing,
					span,
				} => {
					let closed = self_closing || VOID_ELEMENTS.contains(&name.as_str());
					let id = fragment.push(
						open.last().copied(),
						NodeData::Element(Element {
							name,
							attrs,
							start_tag: span.clone(),
							end_tag: None,
						}),
						span,
					);
					if !closed {
						open.push(id);
					}
				}
				Token::EndTag { name, span } => {
					let matched = open
						.iter()
						.rposition(|id| fragment.element(*id).is_some_and(|e| e.name == name));
					match matched {
						Some(depth) => {
							for id in open.drain(depth + 1..) {
								fragment.nodes[id.0].span.end = span.start;
							}
							if let Some(id) = open.pop() {
								let node = &mut fragment.nodes[id.0];
								node.span.end = span.end;
								if let NodeData::Element(element) = &mut node.data {
									element.end_tag = Some(span);
								}
							}
						}
						None => {
							fragment.push(open.last().copied(), NodeData::Text, span);
						}
					}
				}
				Token::Comment { text, span } => {
					fragment.push(open.last().copied(), NodeData::Comment(text), span);
				}
				Token::Declaration { span } => {
					fragment.push(open.last().copied(), NodeData::Declaration, span);
				}
				Token::Text { span } => {
					fragment.push(open.last().copied(), NodeData::Text, span);
				}
			}
		}
		for id in open {
			fragment.nodes[id.0].span.end = source.len();
		}
		fragment.source = source;
		fragment
	}

	fn push(&mut self, parent: Option<NodeId>, data: NodeData, span: Range<usize>) -> NodeId {
		let id = NodeId(self.nodes.len());
		self.nodes.push(Node {
			data,
			span,
			parent,
			children: Vec::new(),
		});
		match parent {
			Some(parent) => self.nodes[parent.0].children.push(id),
			None => self.roots.push(id),
		}
		id
	}

	/// The source text.
	pub fn source(&self) -> &str {
		&self.source
	}

	/// Top-level nodes in order.
	pub fn roots(&self) -> &[NodeId] {
		&self.roots
	}

	/// Looks up a node.
	pub fn node(&self, id: NodeId) -> Option<&Node> {
		self.nodes.get(id.0)
	}

	/// Looks up a node as an element.
	pub fn element(&self, id: NodeId) -> Option<&Element> {
		match &self.node(id)?.data {
			NodeData::Element(element) => Some(element),
			_ => None,
		}
	}

	/// Children of a node in order.
	pub fn children(&self, id: NodeId) -> &[NodeId] {
		self.node(id).map_or(&[], |n| n.children.as_slice())
	}

	/// Parent of a node; `None` for roots.
	pub fn parent(&self, id: NodeId) -> Option<NodeId> {
		self.node(id)?.parent
	}

	/// The node after `id` under the same parent.
	pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
		let siblings = match self.parent(id) {
			Some(parent) => self.children(parent),
			None => self.roots(),
		};
		let at = siblings.iter().position(|s| *s == id)?;
		siblings.get(at + 1).copied()
	}

	/// Whether the node is a comment with exactly `text`.
	pub fn is_comment(&self, id: NodeId, text: &str) -> bool {
		matches!(self.node(id).map(|n| &n.data), Some(NodeData::Comment(t)) if t == text)
	}

	/// Outer HTML of a node, byte-identical to the source.
	pub fn outer_html(&self, id: NodeId) -> &str {
		self.node(id).map_or("", |n| &self.source[n.span.clone()])
	}

	/// Byte range of an element's content (between its tags).
	pub fn inner_span(&self, id: NodeId) -> Option<Range<usize>> {
		let node = self.node(id)?;
		let NodeData::Element(element) = &node.data else {
			return None;
		};
		let end = element.end_tag.as_ref().map_or(node.span.end, |t| t.start);
		Some(element.start_tag.end..end.max(element.start_tag.end))
	}

	/// Inner HTML of an element.
	pub fn inner_html(&self, id: NodeId) -> &str {
		self.inner_span(id).map_or("", |span| &self.source[span])
	}

	/// All nodes under `id` in document order, excluding `id`.
	pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
		let mut out = Vec::new();
		let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
		while let Some(next) = stack.pop() {
			out.push(next);
			stack.extend(self.children(next).iter().rev().copied());
		}
		out
	}

	/// Every node in document order.
	pub fn all(&self) -> impl Iterator<Item = NodeId> + '_ {
		// Nodes are pushed in token order, which is document order.
		(0..self.nodes.len()).map(NodeId)
	}

	/// First element carrying the attribute `name`.
	pub fn find_by_attribute(&self, name: &str) -> Option<NodeId> {
		self.all()
			.find(|id| self.element(*id).is_some_and(|e| e.has_attribute(name)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_tree_shape() {
		let fragment = Fragment::parse("<div><span>a</span><br>b</div><p>c</p>");
		let roots = fragment.roots();
		assert_eq!(roots.len(), 2);
		let div = roots[0];
		assert_eq!(fragment.children(div).len(), 3);
		assert_eq!(fragment.next_sibling(div), Some(roots[1]));
		assert_eq!(fragment.outer_html(div), "<div><span>a</span><br>b</div>");
		assert_eq!(fragment.inner_html(roots[1]), "c");
	}

	#[rstest]
	fn test_implicitly_closed_elements() {
		let fragment = Fragment::parse("<ul><li>one<li>two</ul>");
		let ul = fragment.roots()[0];
		assert_eq!(fragment.outer_html(ul), "<ul><li>one<li>two</ul>");
		let first = fragment.children(ul)[0];
		assert_eq!(fragment.outer_html(first), "<li>one<li>two");
	}

	#[rstest]
	fn test_stray_end_tag_is_kept() {
		let html = "a</b>c";
		let fragment = Fragment::parse(html);
		let joined: String = fragment.roots().iter().map(|id| fragment.outer_html(*id)).collect();
		assert_eq!(joined, html);
	}

	#[rstest]
	fn test_unclosed_element_runs_to_end() {
		let fragment = Fragment::parse("<div><p>text");
		let div = fragment.roots()[0];
		assert_eq!(fragment.outer_html(div), "<div><p>text");
		assert_eq!(fragment.inner_html(div), "<p>text");
	}

	#[rstest]
	fn test_find_by_attribute() {
		let fragment = Fragment::parse(r#"<div><i nuxt-ssr-component-uid="7"></i></div>"#);
		let found = fragment.find_by_attribute("nuxt-ssr-component-uid").unwrap();
		assert_eq!(fragment.element(found).unwrap().attribute("nuxt-ssr-component-uid"), Some("7"));
	}
}
