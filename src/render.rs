//! Tree construction during a render pass.

use crate::{
	component::{ComponentCompositeKey, QualifiedSessionId, Segment, UpdateQueue},
	event::{ComponentEventEntry, EventEntry},
	node::{Attribute, Node, Style, Tag, Text, XmlNs},
	path::TreePositionPath,
	reference::Ref,
};
use hashbrown::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{trace, warn};

/// The explicit context threaded through one render pass.
///
/// Builds a node forest whose first node sits at `start`, and assigns each node its path as it is opened.
pub struct RenderContext {
	session_id: QualifiedSessionId,
	queue: Arc<UpdateQueue>,
	previously_mounted: Arc<HashSet<ComponentCompositeKey>>,
	start: TreePositionPath,
	open: Vec<(TreePositionPath, Tag)>,
	roots: Vec<Node>,
	text_barrier: bool,
}

impl RenderContext {
	pub(crate) fn new(start: TreePositionPath, session_id: QualifiedSessionId, queue: Arc<UpdateQueue>, previously_mounted: Arc<HashSet<ComponentCompositeKey>>) -> Self {
		Self {
			session_id,
			queue,
			previously_mounted,
			start,
			open: Vec::new(),
			roots: Vec::new(),
			text_barrier: false,
		}
	}

	#[must_use]
	pub fn session_id(&self) -> &QualifiedSessionId {
		&self.session_id
	}

	pub(crate) fn queue(&self) -> &Arc<UpdateQueue> {
		&self.queue
	}

	/// Whether a component with this key was mounted before this pass began.
	#[must_use]
	pub fn was_mounted(&self, key: &ComponentCompositeKey) -> bool {
		self.previously_mounted.contains(key)
	}

	pub(crate) fn previously_mounted(&self) -> &HashSet<ComponentCompositeKey> {
		&self.previously_mounted
	}

	/// Marks the current position, so that what is rendered after it can be discarded with [`rollback`](`RenderContext::rollback`).
	pub(crate) fn checkpoint(&self) -> Checkpoint {
		let siblings = match self.open.last() {
			Some((_, tag)) => tag.children.len(),
			None => self.roots.len(),
		};
		Checkpoint { depth: self.open.len(), siblings }
	}

	pub(crate) fn rollback(&mut self, checkpoint: Checkpoint) {
		if self.open.len() > checkpoint.depth {
			trace!("Discarding {} open tag(s).", self.open.len() - checkpoint.depth);
			self.open.truncate(checkpoint.depth);
		}
		match self.open.last_mut() {
			Some((_, tag)) => tag.children.truncate(checkpoint.siblings),
			None => self.roots.truncate(checkpoint.siblings),
		}
		self.text_barrier = true;
	}

	/// The number of currently open tags.
	#[must_use]
	pub fn depth(&self) -> usize {
		self.open.len()
	}

	/// The path the next opened node or non-merged text node will get.
	#[must_use]
	pub fn next_path(&self) -> TreePositionPath {
		match self.open.last() {
			Some((path, tag)) => path.add_child(position(tag.children.len())),
			None => offset(&self.start, self.roots.len()),
		}
	}

	pub fn open_node(&mut self, ns: XmlNs, name: &str, self_closing: bool) -> TreePositionPath {
		let path = self.next_path();
		self.text_barrier = false;
		self.open.push((path.clone(), Tag::new(ns, name, self_closing)));
		path
	}

	pub fn close_node(&mut self) {
		match self.open.pop() {
			Some((_, tag)) => self.push(tag.into()),
			None => warn!("Closing a node while none is open; Ignoring."),
		}
	}

	pub fn set_attr(&mut self, attribute: Attribute) {
		match self.open.last_mut() {
			Some((_, tag)) => tag.add_attribute(attribute),
			None => warn!("Attribute {:?} outside of any tag; Ignoring.", attribute.name),
		}
	}

	pub fn set_style(&mut self, style: Style) {
		match self.open.last_mut() {
			Some((_, tag)) => tag.add_style(style),
			None => warn!("Style {:?} outside of any tag; Ignoring.", style.name),
		}
	}

	/// Adds text, merging it into a directly preceding text node of the same segment.
	///
	/// Returns the text node's path and whether it was merged.
	pub fn add_text(&mut self, text: String) -> (TreePositionPath, bool) {
		if !self.text_barrier {
			let (siblings, parent) = match self.open.last_mut() {
				Some((path, tag)) => (&mut tag.children, Some(&*path)),
				None => (&mut self.roots, None),
			};
			if let Some(Node::Text(previous)) = siblings.last_mut() {
				previous.parts.push(text);
				let last = siblings.len() - 1;
				let path = match parent {
					Some(parent) => parent.add_child(position(last)),
					None => offset(&self.start, last),
				};
				trace!("Merged adjacent text.");
				return (path, true);
			}
		}

		let path = self.next_path();
		self.text_barrier = false;
		self.push(Text::new(text).into());
		(path, false)
	}

	/// Prevents text on either side of a component boundary from merging.
	pub fn barrier(&mut self) {
		self.text_barrier = true;
	}

	fn push(&mut self, node: Node) {
		match self.open.last_mut() {
			Some((_, parent)) => parent.add_child(node),
			None => self.roots.push(node),
		}
	}

	/// Finishes the pass, returning the top-level nodes.
	#[must_use]
	pub fn into_roots(mut self) -> Vec<Node> {
		if !self.open.is_empty() {
			warn!("{} tag(s) left open at the end of a render pass; Closing.", self.open.len());
			while !self.open.is_empty() {
				self.close_node();
			}
		}
		self.roots
	}
}

pub(crate) struct Checkpoint {
	depth: usize,
	siblings: usize,
}

/// What one segment registered during its render pass.
pub struct SegmentRecord {
	pub(crate) component_path: TreePositionPath,
	pub(crate) depth: usize,
	pub(crate) roots: Vec<TreePositionPath>,
	pub(crate) events: Vec<EventEntry>,
	pub(crate) component_events: Vec<ComponentEventEntry>,
	pub(crate) refs: HashMap<Ref, TreePositionPath>,
	pub(crate) children: Vec<Box<dyn Segment>>,
}

impl SegmentRecord {
	pub(crate) fn new(ctx: &RenderContext, component_path: TreePositionPath) -> Self {
		Self {
			component_path,
			depth: ctx.depth(),
			roots: Vec::new(),
			events: Vec::new(),
			component_events: Vec::new(),
			refs: HashMap::new(),
			children: Vec::new(),
		}
	}

	/// Records `path` as a root node if it was created at this segment's own level.
	pub(crate) fn node_created(&mut self, path: &TreePositionPath, depth: usize) {
		if depth == self.depth {
			self.roots.push(path.clone());
		}
	}

	/// The component path of the next child segment.
	pub(crate) fn next_child_path(&self) -> TreePositionPath {
		self.component_path.add_child(position(self.children.len()))
	}
}

/// The 1-based position after `len` existing siblings.
fn position(len: usize) -> u32 {
	u32::try_from(len + 1).unwrap_or(u32::MAX)
}

fn offset(start: &TreePositionPath, by: usize) -> TreePositionPath {
	let mut elements = start.elements().to_vec();
	if let Some(last) = elements.last_mut() {
		*last = last.saturating_add(u32::try_from(by).unwrap_or(u32::MAX));
	}
	TreePositionPath::new(elements)
}
