//! HTML fragment tokenizer.
//!
//! The tokenizer is deliberately lenient: it never fails, and every byte of
//! the input belongs to exactly one token span. Anything it cannot read as
//! markup is emitted as text.

use std::ops::Range;

/// Elements whose content is raw text up to the matching end tag.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// Elements that never have content or an end tag.
pub const VOID_ELEMENTS: &[&str] = &[
	"area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
	"track", "wbr",
];

/// An attribute as written in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
	/// Name, lowercased.
	pub name: String,
	/// Raw value without quotes; entities are not decoded.
	pub value: Option<String>,
	/// Byte range of the whole `name="value"` text.
	pub span: Range<usize>,
}

/// A lexical unit of an HTML fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
	/// `<name attr ...>` or `<name ... />`.
	StartTag {
		/// Tag name, lowercased.
		name: String,
		/// Attributes in source order.
		attrs: Vec<Attribute>,
		/// Whether the tag ends in `/>`.
		self_closing: bool,
		/// Byte range of the tag.
		span: Range<usize>,
	},
	/// `</name>`.
	EndTag {
		/// Tag name, lowercased.
		name: String,
		/// Byte range of the tag.
		span: Range<usize>,
	},
	/// `<!--text-->`.
	Comment {
		/// Text between the delimiters.
		text: String,
		/// Byte range of the comment.
		span: Range<usize>,
	},
	/// `<!DOCTYPE ...>` and other `<!`/`<?` declarations.
	Declaration {
		/// Byte range of the declaration.
		span: Range<usize>,
	},
	/// Character data, including raw element content.
	Text {
		/// Byte range of the text.
		span: Range<usize>,
	},
}

impl Token {
	/// Byte range of the token in the source.
	pub fn span(&self) -> Range<usize> {
		match self {
			Self::StartTag { span, .. }
			| Self::EndTag { span, .. }
			| Self::Comment { span, .. }
			| Self::Declaration { span }
			| Self::Text { span } => span.clone(),
		}
	}
}

/// Splits `html` into tokens covering the whole input.
pub fn tokenize(html: &str) -> Vec<Token> {
	Tokenizer {
		src: html,
		bytes: html.as_bytes(),
		pos: 0,
		tokens: Vec::new(),
	}
	.run()
}

struct Tokenizer<'a> {
	src: &'a str,
	bytes: &'a [u8],
	pos: usize,
	tokens: Vec<Token>,
}

impl Tokenizer<'_> {
	fn run(mut self) -> Vec<Token> {
		let mut text_start = self.pos;
		while self.pos < self.bytes.len() {
			if self.bytes[self.pos] != b'<' {
				self.pos += 1;
				continue;
			}
			let start = self.pos;
			let Some(token) = self.markup() else {
				self.pos = start + 1;
				continue;
			};
			self.flush_text(text_start, start);
			let raw_text = match &token {
				Token::StartTag {
					name, self_closing, ..
				} if !self_closing && RAW_TEXT_ELEMENTS.contains(&name.as_str()) => Some(name.clone()),
				_ => None,
			};
			self.tokens.push(token);
			if let Some(name) = raw_text {
				let end = self.find_raw_end(&name);
				self.flush_text(self.pos, end);
				self.pos = end;
			}
			text_start = self.pos;
		}
		self.flush_text(text_start, self.bytes.len());
		self.tokens
	}

	fn flush_text(&mut self, start: usize, end: usize) {
		if start < end {
			self.tokens.push(Token::Text { span: start..end });
		}
	}

	/// Reads markup at `self.pos` (which is `<`), advancing past it.
	fn markup(&mut self) -> Option<Token> {
		let start = self.pos;
		let rest = &self.src[start..];
		if rest.starts_with("<!--") {
			let body = start + 4;
			let (text_end, end) = match self.src[body..].find("-->") {
				Some(i) => (body + i, body + i + 3),
				None => (self.bytes.len(), self.bytes.len()),
			};
			self.pos = end;
			return Some(Token::Comment {
				text: self.src[body..text_end].to_string(),
				span: start..end,
			});
		}
		match self.bytes.get(start + 1) {
			Some(b'!') | Some(b'?') => {
				let end = self.src[start..].find('>').map_or(self.bytes.len(), |i| start + i + 1);
				self.pos = end;
				Some(Token::Declaration { span: start..end })
			}
			Some(b'/') if self.bytes.get(start + 2).is_some_and(u8::is_ascii_alphabetic) => {
				self.pos = start + 2;
				let name = self.tag_name();
				let close = self.src[self.pos..].find('>')?;
				self.pos += close + 1;
				Some(Token::EndTag {
					name,
					span: start..self.pos,
				})
			}
			Some(c) if c.is_ascii_alphabetic() => self.start_tag(start),
			_ => None,
		}
	}

	fn tag_name(&mut self) -> String {
		let start = self.pos;
		while self.pos < self.bytes.len()
			&& !matches!(self.bytes[self.pos], b'>' | b'/' | b' ' | b'\t' | b'\n' | b'\r' | b'\x0c')
		{
			self.pos += 1;
		}
		self.src[start..self.pos].to_ascii_lowercase()
	}

	fn skip_whitespace(&mut self) {
		while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
			self.pos += 1;
		}
	}

	fn start_tag(&mut self, start: usize) -> Option<Token> {
		self.pos = start + 1;
		let name = self.tag_name();
		let mut attrs = Vec::new();
		loop {
			self.skip_whitespace();
			match self.bytes.get(self.pos)? {
				b'>' => {
					self.pos += 1;
					return Some(Token::StartTag {
						name,
						attrs,
						self_closing: false,
						span: start..self.pos,
					});
				}
				b'/' if self.bytes.get(self.pos + 1) == Some(&b'>') => {
					self.pos += 2;
					return Some(Token::StartTag {
						name,
						attrs,
						self_closing: true,
						span: start..self.pos,
					});
				}
				b'/' => self.pos += 1,
				_ => attrs.push(self.attribute()?),
			}
		}
	}

	fn attribute(&mut self) -> Option<Attribute> {
		let start = self.pos;
		// The first character may be `=`, per the HTML attribute-name state.
		self.pos += 1;
		while self.pos < self.bytes.len()
			&& !matches!(self.bytes[self.pos], b'=' | b'>' | b'/')
			&& !self.bytes[self.pos].is_ascii_whitespace()
		{
			self.pos += 1;
		}
		let name = self.src[start..self.pos].to_ascii_lowercase();
		let name_end = self.pos;

		self.skip_whitespace();
		if self.bytes.get(self.pos) != Some(&b'=') {
			self.pos = name_end;
			return Some(Attribute {
				name,
				value: None,
				span: start..name_end,
			});
		}
		self.pos += 1;
		self.skip_whitespace();
		let value = match *self.bytes.get(self.pos)? {
			quote @ (b'"' | b'\'') => {
				let body = self.pos + 1;
				let close = self.src[body..].find(quote as char)?;
				self.pos = body + close + 1;
				self.src[body..body + close].to_string()
			}
			_ => {
				let body = self.pos;
				while self.pos < self.bytes.len()
					&& self.bytes[self.pos] != b'>'
					&& !self.bytes[self.pos].is_ascii_whitespace()
				{
					self.pos += 1;
				}
				self.src[body..self.pos].to_string()
			}
		};
		Some(Attribute {
			name,
			value: Some(value),
			span: start..self.pos,
		})
	}

	/// Finds where the raw content of `name` ends (the start of `</name`).
	fn find_raw_end(&self, name: &str) -> usize {
		let closing = format!("</{name}");
		let haystack = &self.bytes[self.pos..];
		haystack
			.windows(closing.len())
			.position(|w| w.eq_ignore_ascii_case(closing.as_bytes()))
			.map_or(self.bytes.len(), |i| self.pos + i)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	fn kinds(html: &str) -> Vec<String> {
		tokenize(html)
			.iter()
			.map(|t| match t {
				Token::StartTag { name, .. } => format!("<{name}>"),
				Token::EndTag { name, .. } => format!("</{name}>"),
				Token::Comment { text, .. } => format!("#{text}"),
				Token::Declaration { .. } => "!".to_string(),
				Token::Text { span } => format!("'{}'", &html[span.clone()]),
			})
			.collect()
	}

	#[rstest]
	fn test_basic_stream() {
		assert_eq!(
			kinds("<!--[--><div class=a>hi</div><!--]-->"),
			["#[", "<div>", "'hi'", "</div>", "#]"]
		);
	}

	#[rstest]
	fn test_raw_text_is_not_tokenized() {
		assert_eq!(
			kinds("<script>if (a<b) x('</div>')</SCRIPT>"),
			["<script>", "'if (a<b) x('</div>')'", "</script>"]
		);
	}

	#[rstest]
	#[case("a < b", &["'a < b'"])]
	#[case("<3", &["'<3'"])]
	#[case("<div", &["'<div'"])]
	fn test_stray_angle_brackets_are_text(#[case] html: &str, #[case] expected: &[&str]) {
		assert_eq!(kinds(html), expected);
	}

	#[rstest]
	fn test_attributes() {
		let tokens = tokenize(r#"<div nuxt-ssr-slot-name="x" data-a='1' hidden v=raw>"#);
		let Token::StartTag { attrs, .. } = &tokens[0] else {
			panic!("expected a start tag");
		};
		let pairs: Vec<_> = attrs
			.iter()
			.map(|a| (a.name.as_str(), a.value.as_deref()))
			.collect();
		assert_eq!(
			pairs,
			[
				("nuxt-ssr-slot-name", Some("x")),
				("data-a", Some("1")),
				("hidden", None),
				("v", Some("raw"))
			]
		);
	}

	#[rstest]
	fn test_spans_cover_input() {
		let html = "<!DOCTYPE html><p>a<br/>b</p>tail";
		let joined: String = tokenize(html).iter().map(|t| &html[t.span()]).collect();
		assert_eq!(joined, html);
	}
}
