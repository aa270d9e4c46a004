//! Event subscriptions and their bubbling lookup.

use crate::{context::EventContext, path::TreePositionPath};
use core::{
	fmt::{self, Debug, Formatter},
	hash::{Hash, Hasher},
};
use std::sync::Arc;

/// A server-side event callback.
pub type EventHandler = Arc<dyn Fn(&mut EventContext<'_>) + Send + Sync>;

/// Rate limiting applied by the client before it reports an event.
///
/// The server only compares and serializes these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Modifier {
	#[default]
	None,
	Throttle {
		window_ms: u32,
	},
	Debounce {
		wait_ms: u32,
		immediate: bool,
	},
}

/// A DOM event subscription recorded during render.
///
/// Equality and hashing ignore the handler, so re-rendering the same subscription with a fresh closure is not a change.
#[derive(Clone)]
pub struct EventEntry {
	pub event_type: String,
	pub target: TreePositionPath,
	pub handler: EventHandler,
	pub prevent_default: bool,
	pub modifier: Modifier,
}

impl EventEntry {
	pub fn new(event_type: impl Into<String>, target: TreePositionPath, handler: EventHandler) -> Self {
		Self {
			event_type: event_type.into(),
			target,
			handler,
			prevent_default: false,
			modifier: Modifier::None,
		}
	}

	#[must_use]
	pub fn matches(&self, path: &TreePositionPath, event_type: &str) -> bool {
		self.target == *path && self.event_type == event_type
	}
}

impl PartialEq for EventEntry {
	fn eq(&self, other: &Self) -> bool {
		self.event_type == other.event_type && self.target == other.target && self.prevent_default == other.prevent_default && self.modifier == other.modifier
	}
}
impl Eq for EventEntry {}

impl Hash for EventEntry {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.event_type.hash(state);
		self.target.hash(state);
		self.prevent_default.hash(state);
		self.modifier.hash(state);
	}
}

impl Debug for EventEntry {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("EventEntry")
			.field("event_type", &self.event_type)
			.field("target", &format_args!("{}", self.target))
			.field("prevent_default", &self.prevent_default)
			.field("modifier", &self.modifier)
			.finish_non_exhaustive()
	}
}

/// A subscription to a server-side component event, raised through [`EventContext::emit`] or [`LivePage::notify_component_event`](`crate::page::LivePage::notify_component_event`).
#[derive(Clone)]
pub struct ComponentEventEntry {
	pub event_type: String,
	pub handler: EventHandler,
}

impl Debug for ComponentEventEntry {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("ComponentEventEntry").field("event_type", &self.event_type).finish_non_exhaustive()
	}
}

/// Finds the first subscription for `event_type` at `path` or, bubbling, at its closest ancestor.
///
/// The empty (window) path is the last one tried.
#[must_use]
pub fn find_event_handler<'a>(events: &'a [EventEntry], path: &TreePositionPath, event_type: &str) -> Option<&'a EventEntry> {
	let mut path = path.clone();
	loop {
		if let Some(entry) = events.iter().find(|entry| entry.matches(&path, event_type)) {
			return Some(entry);
		}
		path = path.parent().ok()?;
	}
}
