//! Positional tree diffing.
//!
//! Children are matched by index only. There is no keyed reordering:
//! a node that moves is removed at its old position and recreated at its new one.

use crate::{
	error::DiffError,
	node::{Attribute, Node, Style, Tag, Text, XmlNs},
	path::TreePositionPath,
};
use hashbrown::HashSet;
use tracing::{instrument, trace, trace_span};

/// A destination for the mutations that turn an old tree into a new one.
pub trait DomChangesContext {
	fn remove_attr(&mut self, path: &TreePositionPath, ns: XmlNs, name: &str, is_property: bool);
	fn remove_style(&mut self, path: &TreePositionPath, name: &str);
	fn remove_node(&mut self, parent: &TreePositionPath, path: &TreePositionPath);
	fn set_attr(&mut self, path: &TreePositionPath, ns: XmlNs, name: &str, value: &str, is_property: bool);
	fn set_style(&mut self, path: &TreePositionPath, name: &str, value: &str);
	fn create_text(&mut self, parent: &TreePositionPath, path: &TreePositionPath, text: &str);
	fn create_tag(&mut self, parent: &TreePositionPath, path: &TreePositionPath, ns: XmlNs, name: &str);
}

/// One atomic client document mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomChange {
	RemoveAttr {
		path: TreePositionPath,
		ns: XmlNs,
		name: String,
		is_property: bool,
	},
	RemoveStyle {
		path: TreePositionPath,
		name: String,
	},
	Remove {
		parent: TreePositionPath,
		path: TreePositionPath,
	},
	SetAttr {
		path: TreePositionPath,
		ns: XmlNs,
		name: String,
		value: String,
		is_property: bool,
	},
	SetStyle {
		path: TreePositionPath,
		name: String,
		value: String,
	},
	CreateText {
		parent: TreePositionPath,
		path: TreePositionPath,
		text: String,
	},
	Create {
		parent: TreePositionPath,
		path: TreePositionPath,
		ns: XmlNs,
		tag: String,
	},
}

/// Collects [`DomChange`]s in order, along with the set of removed node paths.
#[derive(Debug, Default, Clone)]
pub struct DomChanges {
	changes: Vec<DomChange>,
	removed: HashSet<TreePositionPath>,
}

impl DomChanges {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn changes(&self) -> &[DomChange] {
		&self.changes
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.changes.is_empty()
	}

	/// Paths of nodes that were removed, including those recreated in place afterwards.
	#[must_use]
	pub fn removed(&self) -> &HashSet<TreePositionPath> {
		&self.removed
	}

	/// Whether `path` or one of its ancestors was removed.
	#[must_use]
	pub fn is_removed(&self, path: &TreePositionPath) -> bool {
		self.removed.iter().any(|removed| path.starts_with(removed))
	}

	#[must_use]
	pub fn into_parts(self) -> (Vec<DomChange>, HashSet<TreePositionPath>) {
		(self.changes, self.removed)
	}
}

impl DomChangesContext for DomChanges {
	fn remove_attr(&mut self, path: &TreePositionPath, ns: XmlNs, name: &str, is_property: bool) {
		self.changes.push(DomChange::RemoveAttr {
			path: path.clone(),
			ns,
			name: name.to_owned(),
			is_property,
		});
	}

	fn remove_style(&mut self, path: &TreePositionPath, name: &str) {
		self.changes.push(DomChange::RemoveStyle {
			path: path.clone(),
			name: name.to_owned(),
		});
	}

	fn remove_node(&mut self, parent: &TreePositionPath, path: &TreePositionPath) {
		self.removed.insert(path.clone());
		self.changes.push(DomChange::Remove {
			parent: parent.clone(),
			path: path.clone(),
		});
	}

	fn set_attr(&mut self, path: &TreePositionPath, ns: XmlNs, name: &str, value: &str, is_property: bool) {
		self.changes.push(DomChange::SetAttr {
			path: path.clone(),
			ns,
			name: name.to_owned(),
			value: value.to_owned(),
			is_property,
		});
	}

	fn set_style(&mut self, path: &TreePositionPath, name: &str, value: &str) {
		self.changes.push(DomChange::SetStyle {
			path: path.clone(),
			name: name.to_owned(),
			value: value.to_owned(),
		});
	}

	fn create_text(&mut self, parent: &TreePositionPath, path: &TreePositionPath, text: &str) {
		self.changes.push(DomChange::CreateText {
			parent: parent.clone(),
			path: path.clone(),
			text: text.to_owned(),
		});
	}

	fn create_tag(&mut self, parent: &TreePositionPath, path: &TreePositionPath, ns: XmlNs, name: &str) {
		self.changes.push(DomChange::Create {
			parent: parent.clone(),
			path: path.clone(),
			ns,
			tag: name.to_owned(),
		});
	}
}

/// Hides text content from log fields unless `dangerous-logging` is enabled.
fn loggable(text: &str) -> Option<&str> {
	cfg!(feature = "dangerous-logging").then(|| text)
}

/// Diffs two single-root trees at `path`.
///
/// Without an `old` tree, `new` is created from scratch.
///
/// # Errors
///
/// Iff `path` is the empty (window) path, which can't hold an element.
#[instrument(skip(old, new, sink), fields(path = %path))]
pub fn diff<C: DomChangesContext + ?Sized>(old: Option<&Tag>, new: &Tag, path: &TreePositionPath, sink: &mut C) -> Result<(), DiffError> {
	let old = match old {
		Some(old) => old,
		None => return create_tag(new, path, sink),
	};

	if old.name != new.name || old.ns != new.ns {
		let span = trace_span!("Replacing tag", old = old.name.as_str(), new = new.name.as_str());
		let _enter = span.enter();
		sink.remove_node(&path.parent()?, path);
		return create_tag(new, path, sink);
	}

	let span = trace_span!("Diffing tag", tag = new.name.as_str());
	let _enter = span.enter();
	diff_attributes(old.attributes(), new.attributes(), path, sink);
	diff_styles(old.styles(), new.styles(), path, sink);
	diff_children(&old.children, &new.children, &path.inc_level(), sink)
}

/// Diffs two ordered forests pairwise by position, starting at `start_path`.
///
/// The sibling index advances after every position, whether or not it produced a change.
///
/// # Errors
///
/// Iff `start_path` is the empty path and there is anything to diff.
#[instrument(skip(old, new, sink), fields(start_path = %start_path, old.len = old.len(), new.len = new.len()))]
pub fn diff_children<C: DomChangesContext + ?Sized>(old: &[Node], new: &[Node], start_path: &TreePositionPath, sink: &mut C) -> Result<(), DiffError> {
	let mut path = start_path.clone();
	for i in 0..old.len().max(new.len()) {
		match (old.get(i), new.get(i)) {
			(Some(Node::Tag(t_1)), Some(Node::Tag(t_2))) => diff(Some(t_1), t_2, &path, sink)?,
			(Some(Node::Text(t_1)), Some(Node::Text(t_2))) => {
				let (t_1, t_2) = (t_1.text(), t_2.text());
				let span = trace_span!("Diffing text node", t_1 = loggable(&t_1), t_2 = loggable(&t_2));
				let _enter = span.enter();
				if t_1 != t_2 {
					sink.create_text(&path.parent()?, &path, &t_2);
				}
			}
			(Some(_), Some(n_2)) => {
				let span = trace_span!("Replacing node of different kind");
				let _enter = span.enter();
				sink.remove_node(&path.parent()?, &path);
				create_node(n_2, &path, sink)?;
			}
			(None, Some(n_2)) => create_node(n_2, &path, sink)?,
			(Some(_), None) => {
				trace!("Removing surplus node");
				sink.remove_node(&path.parent()?, &path);
			}
			(None, None) => break,
		}

		if path.level() > 0 {
			path = path.inc_sibling()?;
		}
	}
	Ok(())
}

/// Emits the mutations that create `node` (and its whole subtree) at `path`.
///
/// # Errors
///
/// Iff `path` is the empty path.
pub fn create_node<C: DomChangesContext + ?Sized>(node: &Node, path: &TreePositionPath, sink: &mut C) -> Result<(), DiffError> {
	match node {
		Node::Tag(tag) => create_tag(tag, path, sink),
		Node::Text(text) => create_text(text, path, sink),
	}
}

fn create_text<C: DomChangesContext + ?Sized>(text: &Text, path: &TreePositionPath, sink: &mut C) -> Result<(), DiffError> {
	let text = text.text();
	let span = trace_span!("Creating text node", text = loggable(&text));
	let _enter = span.enter();
	sink.create_text(&path.parent()?, path, &text);
	Ok(())
}

fn create_tag<C: DomChangesContext + ?Sized>(tag: &Tag, path: &TreePositionPath, sink: &mut C) -> Result<(), DiffError> {
	let span = trace_span!("Creating tag", name = tag.name.as_str(), ns = tag.ns.name);
	let _enter = span.enter();

	sink.create_tag(&path.parent()?, path, tag.ns, &tag.name);
	for Attribute { name, value, is_property } in tag.attributes() {
		sink.set_attr(path, XmlNs::HTML, name, value, *is_property);
	}
	for Style { name, value } in tag.styles() {
		sink.set_style(path, name, value);
	}

	let mut child_path = path.inc_level();
	for child in &tag.children {
		create_node(child, &child_path, sink)?;
		child_path = child_path.inc_sibling()?;
	}
	Ok(())
}

fn diff_attributes<C: DomChangesContext + ?Sized>(a_1: &[Attribute], a_2: &[Attribute], path: &TreePositionPath, sink: &mut C) {
	for removed in a_1.iter().filter(|a| !a_2.contains(a)) {
		sink.remove_attr(path, XmlNs::HTML, &removed.name, removed.is_property);
	}
	for added in a_2.iter().filter(|a| !a_1.contains(a)) {
		sink.set_attr(path, XmlNs::HTML, &added.name, &added.value, added.is_property);
	}
}

fn diff_styles<C: DomChangesContext + ?Sized>(s_1: &[Style], s_2: &[Style], path: &TreePositionPath, sink: &mut C) {
	for removed in s_1.iter().filter(|s| !s_2.contains(s)) {
		sink.remove_style(path, &removed.name);
	}
	for added in s_2.iter().filter(|s| !s_1.contains(s)) {
		sink.set_style(path, &added.name, &added.value);
	}
}
