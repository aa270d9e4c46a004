use crate::path::TreePositionPath;

/// Runtime options of a [`LivePage`](`crate::page::LivePage`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageConfig {
	/// Where the root component's first node is placed. Defaults to `1`.
	pub start_dom_path: TreePositionPath,
	/// Prepended to [`LivePage::html`](`crate::page::LivePage::html`), for example `<!DOCTYPE html>`.
	pub doc_type: Option<String>,
	/// The root component's position in the component tree. Defaults to `1`.
	pub root_component_path: TreePositionPath,
	/// Whether mounting first sends `SetRenderNum(0)`. Off by default, for transports that reset the client's render number themselves.
	pub announce_render_number: bool,
}

impl Default for PageConfig {
	fn default() -> Self {
		Self {
			start_dom_path: TreePositionPath::new(vec![1]),
			doc_type: None,
			root_component_path: TreePositionPath::new(vec![1]),
			announce_render_number: false,
		}
	}
}

impl PageConfig {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with_start_dom_path(mut self, start_dom_path: TreePositionPath) -> Self {
		self.start_dom_path = start_dom_path;
		self
	}

	#[must_use]
	pub fn with_doc_type(mut self, doc_type: impl Into<String>) -> Self {
		self.doc_type = Some(doc_type.into());
		self
	}

	#[must_use]
	pub fn with_root_component_path(mut self, root_component_path: TreePositionPath) -> Self {
		self.root_component_path = root_component_path;
		self
	}

	#[must_use]
	pub fn with_render_number_announcement(mut self, announce: bool) -> Self {
		self.announce_render_number = announce;
		self
	}
}
