//! A mutable mirror of the client document.

use crate::{
	diff::DomChange,
	node::{write_html, Attribute, Node, Style, Tag, Text},
	path::TreePositionPath,
};
use tracing::{instrument, trace, warn};

/// The top-level node forest of a client document, addressed by [`TreePositionPath`]s of level 1 and up.
///
/// [`VirtualDocument::apply`] applies [`DomChange`]s the way the remote client does,
/// so after each update this holds exactly what the client displays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VirtualDocument {
	nodes: Vec<Node>,
}

impl VirtualDocument {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn from_nodes(nodes: Vec<Node>) -> Self {
		Self { nodes }
	}

	#[must_use]
	pub fn nodes(&self) -> &[Node] {
		&self.nodes
	}

	pub fn clear(&mut self) {
		self.nodes.clear();
	}

	/// Inserts or replaces the top-level nodes starting at `start`.
	pub fn insert_at(&mut self, start: &TreePositionPath, nodes: Vec<Node>) {
		let mut path = start.clone();
		for node in nodes {
			self.place(&path, node);
			if let Ok(next) = path.inc_sibling() {
				path = next;
			}
		}
	}

	#[must_use]
	pub fn get(&self, path: &TreePositionPath) -> Option<&Node> {
		let (&first, rest) = path.elements().split_first()?;
		let mut node = self.nodes.get(index(first)?)?;
		for &element in rest {
			node = match node {
				Node::Tag(tag) => tag.children.get(index(element)?)?,
				Node::Text(_) => return None,
			};
		}
		Some(node)
	}

	fn get_mut(&mut self, path: &TreePositionPath) -> Option<&mut Node> {
		let (&first, rest) = path.elements().split_first()?;
		let mut node = self.nodes.get_mut(index(first)?)?;
		for &element in rest {
			node = match node {
				Node::Tag(tag) => tag.children.get_mut(index(element)?)?,
				Node::Text(_) => return None,
			};
		}
		Some(node)
	}

	fn children_mut(&mut self, parent: &TreePositionPath) -> Option<&mut Vec<Node>> {
		if parent.is_empty() {
			return Some(&mut self.nodes);
		}
		match self.get_mut(parent)? {
			Node::Tag(tag) => Some(&mut tag.children),
			Node::Text(_) => None,
		}
	}

	fn tag_mut(&mut self, path: &TreePositionPath) -> Option<&mut Tag> {
		match self.get_mut(path) {
			Some(Node::Tag(tag)) => Some(tag),
			Some(Node::Text(_)) => {
				warn!("Expected an element but found a text node; Skipping.");
				None
			}
			None => {
				warn!("No node at path; Skipping.");
				None
			}
		}
	}

	/// Clones the nodes at `paths`, skipping any that don't exist.
	#[must_use]
	pub fn nodes_at<'a>(&self, paths: impl IntoIterator<Item = &'a TreePositionPath>) -> Vec<Node> {
		paths.into_iter().filter_map(|path| self.get(path)).cloned().collect()
	}

	#[must_use]
	pub fn html(&self) -> String {
		let mut html = String::new();
		for node in &self.nodes {
			// Writing into a `String` can't fail.
			let _ = write_html(&mut html, node);
		}
		html
	}

	/// Creating a node at an occupied position replaces it, otherwise the node is appended.
	fn place(&mut self, path: &TreePositionPath, node: Node) {
		let (parent, last) = match (path.parent(), path.last()) {
			(Ok(parent), Some(last)) => (parent, last),
			_ => return warn!("Can't create a node at the window path; Skipping."),
		};
		let children = match self.children_mut(&parent) {
			Some(children) => children,
			None => return warn!("Missing parent element for created node; Skipping."),
		};
		match index(last) {
			Some(i) if i < children.len() => children[i] = node,
			Some(i) => {
				if i > children.len() {
					warn!("Created node leaves a gap of {} position(s); Appending.", i - children.len());
				}
				children.push(node);
			}
			None => warn!("Invalid position 0; Skipping."),
		}
	}

	fn remove(&mut self, path: &TreePositionPath) {
		let (parent, last) = match (path.parent(), path.last().and_then(index)) {
			(Ok(parent), Some(last)) => (parent, last),
			_ => return warn!("Can't remove the window node; Skipping."),
		};
		match self.children_mut(&parent) {
			Some(children) if last < children.len() => {
				children.remove(last);
			}
			_ => warn!("Removed node doesn't exist; Skipping."),
		}
	}

	/// Applies one batch of changes.
	///
	/// A removal followed by a creation at the same path within the batch is a replacement.
	/// Other removals take effect after the batch, in descending path order, so that all changes of the batch address the pre-removal positions.
	#[instrument(skip(self, changes), fields(changes.len = changes.len()))]
	pub fn apply(&mut self, changes: &[DomChange]) {
		let mut removals = Vec::<TreePositionPath>::new();
		for change in changes {
			match change {
				DomChange::Create { path, ns, tag, .. } => {
					removals.retain(|removed| removed != path);
					self.place(path, Tag::new(*ns, tag.as_str(), false).into());
				}
				DomChange::CreateText { path, text, .. } => {
					removals.retain(|removed| removed != path);
					self.place(path, Text::new(text.as_str()).into());
				}
				DomChange::Remove { path, .. } => removals.push(path.clone()),
				DomChange::SetAttr {
					path,
					name,
					value,
					is_property,
					..
				} => {
					if let Some(tag) = self.tag_mut(path) {
						tag.set_attribute(Attribute::new(name.as_str(), value.as_str(), *is_property));
					}
				}
				DomChange::RemoveAttr { path, name, is_property, .. } => {
					if let Some(tag) = self.tag_mut(path) {
						if !tag.remove_attribute(name, *is_property) {
							warn!("Removed attribute {:?} wasn't present.", name);
						}
					}
				}
				DomChange::SetStyle { path, name, value } => {
					if let Some(tag) = self.tag_mut(path) {
						tag.set_style(Style::new(name.as_str(), value.as_str()));
					}
				}
				DomChange::RemoveStyle { path, name } => {
					if let Some(tag) = self.tag_mut(path) {
						if !tag.remove_style(name) {
							warn!("Removed style {:?} wasn't present.", name);
						}
					}
				}
			}
		}

		removals.sort_unstable_by(|a, b| b.cmp(a));
		removals.dedup();
		trace!("Applying {} deferred removal(s).", removals.len());
		for path in &removals {
			self.remove(path);
		}
	}
}

fn index(element: u32) -> Option<usize> {
	(element as usize).checked_sub(1)
}
