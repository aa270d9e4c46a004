//! The virtual tree: a server-held snapshot of rendered client content.

use core::fmt::{self, Write};

/// An XML namespace a [`Tag`] is created in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct XmlNs {
	pub name: &'static str,
	pub uri: &'static str,
}

impl XmlNs {
	pub const HTML: Self = Self {
		name: "html",
		uri: "http://www.w3.org/1999/xhtml",
	};
	pub const SVG: Self = Self {
		name: "svg",
		uri: "http://www.w3.org/2000/svg",
	};
	pub const MATHML: Self = Self {
		name: "mathml",
		uri: "http://www.w3.org/1998/Math/MathML",
	};
	pub const XLINK: Self = Self {
		name: "xlink",
		uri: "http://www.w3.org/1999/xlink",
	};
}

impl Default for XmlNs {
	fn default() -> Self {
		Self::HTML
	}
}

/// An attribute, or with `is_property` a DOM property assigned on the client instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Attribute {
	pub name: String,
	pub value: String,
	pub is_property: bool,
}

impl Attribute {
	pub fn new(name: impl Into<String>, value: impl Into<String>, is_property: bool) -> Self {
		Self {
			name: name.into(),
			value: value.into(),
			is_property,
		}
	}
}

/// An inline style declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Style {
	pub name: String,
	pub value: String,
}

impl Style {
	pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			value: value.into(),
		}
	}
}

/// An element node.
///
/// Attributes and styles behave as insertion-ordered sets:
/// adding an exact duplicate is a no-op, but two entries with the same name and different values are both kept.
/// Equality ignores their order, as well as `self_closing` which only affects serialization.
#[derive(Debug, Clone)]
pub struct Tag {
	pub ns: XmlNs,
	pub name: String,
	pub self_closing: bool,
	attributes: Vec<Attribute>,
	styles: Vec<Style>,
	pub children: Vec<Node>,
}

impl Tag {
	pub fn new(ns: XmlNs, name: impl Into<String>, self_closing: bool) -> Self {
		Self {
			ns,
			name: name.into(),
			self_closing,
			attributes: Vec::new(),
			styles: Vec::new(),
			children: Vec::new(),
		}
	}

	/// Adds `attribute` unless an equal one is present.
	///
	/// Entries that share a name but differ in value are all kept,
	/// and removing that name in a diff later drops all of them. Give each name a single value.
	pub fn add_attribute(&mut self, attribute: Attribute) {
		if !self.attributes.contains(&attribute) {
			self.attributes.push(attribute);
		}
	}

	pub fn add_style(&mut self, style: Style) {
		if !self.styles.contains(&style) {
			self.styles.push(style);
		}
	}

	pub fn add_child(&mut self, child: Node) {
		self.children.push(child);
	}

	#[must_use]
	pub fn attributes(&self) -> &[Attribute] {
		&self.attributes
	}

	#[must_use]
	pub fn styles(&self) -> &[Style] {
		&self.styles
	}

	pub(crate) fn remove_attribute(&mut self, name: &str, is_property: bool) -> bool {
		let len = self.attributes.len();
		self.attributes.retain(|a| a.name != name || a.is_property != is_property);
		len != self.attributes.len()
	}

	pub(crate) fn set_attribute(&mut self, attribute: Attribute) {
		match self
			.attributes
			.iter_mut()
			.find(|a| a.name == attribute.name && a.is_property == attribute.is_property)
		{
			Some(existing) => *existing = attribute,
			None => self.attributes.push(attribute),
		}
	}

	pub(crate) fn remove_style(&mut self, name: &str) -> bool {
		let len = self.styles.len();
		self.styles.retain(|s| s.name != name);
		len != self.styles.len()
	}

	pub(crate) fn set_style(&mut self, style: Style) {
		match self.styles.iter_mut().find(|s| s.name == style.name) {
			Some(existing) => *existing = style,
			None => self.styles.push(style),
		}
	}
}

/// A text node. Its parts are concatenated for output, and compared as such.
#[derive(Debug, Clone, Default)]
pub struct Text {
	pub parts: Vec<String>,
}

impl Text {
	pub fn new(text: impl Into<String>) -> Self {
		Self { parts: vec![text.into()] }
	}

	#[must_use]
	pub fn text(&self) -> String {
		self.parts.concat()
	}
}

impl PartialEq for Tag {
	fn eq(&self, other: &Self) -> bool {
		fn same_set<T: PartialEq>(a: &[T], b: &[T]) -> bool {
			a.len() == b.len() && a.iter().all(|x| b.contains(x))
		}

		self.ns == other.ns
			&& self.name == other.name
			&& same_set(&self.attributes, &other.attributes)
			&& same_set(&self.styles, &other.styles)
			&& self.children == other.children
	}
}
impl Eq for Tag {}

impl PartialEq for Text {
	fn eq(&self, other: &Self) -> bool {
		self.parts.concat() == other.parts.concat()
	}
}
impl Eq for Text {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
	Tag(Tag),
	Text(Text),
}

impl Node {
	#[must_use]
	pub fn as_tag(&self) -> Option<&Tag> {
		match self {
			Node::Tag(tag) => Some(tag),
			Node::Text(_) => None,
		}
	}

	/// Serializes this node as HTML.
	#[must_use]
	pub fn html(&self) -> String {
		let mut html = String::new();
		// Writing into a `String` can't fail.
		let _ = write_html(&mut html, self);
		html
	}
}

impl From<Tag> for Node {
	fn from(tag: Tag) -> Self {
		Node::Tag(tag)
	}
}

impl From<Text> for Node {
	fn from(text: Text) -> Self {
		Node::Text(text)
	}
}

pub(crate) fn write_html(w: &mut impl Write, node: &Node) -> fmt::Result {
	match node {
		Node::Text(text) => {
			for part in &text.parts {
				write_escaped(w, part)?;
			}
			Ok(())
		}
		Node::Tag(tag) => {
			write!(w, "<{}", tag.name)?;
			for attribute in &tag.attributes {
				write!(w, " {}", attribute.name)?;
				if !attribute.value.is_empty() {
					w.write_str("=\"")?;
					write_escaped(w, &attribute.value)?;
					w.write_char('"')?;
				}
			}
			if !tag.styles.is_empty() {
				w.write_str(" style=\"")?;
				for style in &tag.styles {
					write_escaped(w, &style.name)?;
					w.write_char(':')?;
					write_escaped(w, &style.value)?;
					w.write_char(';')?;
				}
				w.write_char('"')?;
			}
			if tag.self_closing && tag.children.is_empty() {
				return w.write_str(" />");
			}
			w.write_char('>')?;
			for child in &tag.children {
				write_html(w, child)?;
			}
			write!(w, "</{}>", tag.name)
		}
	}
}

fn write_escaped(w: &mut impl Write, s: &str) -> fmt::Result {
	for c in s.chars() {
		match c {
			'&' => w.write_str("&amp;")?,
			'<' => w.write_str("&lt;")?,
			'>' => w.write_str("&gt;")?,
			'"' => w.write_str("&quot;")?,
			'\'' => w.write_str("&#x27;")?,
			c => w.write_char(c)?,
		}
	}
	Ok(())
}
