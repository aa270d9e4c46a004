//! The compact array-of-tokens encoding of [`RemoteCommand`]s.
//!
//! Every message is a JSON array: a numeric command tag followed by positional fields.
//! Paths are written in their `_`-joined string form.

use crate::{
	command::RemoteCommand,
	diff::DomChange,
	event::{EventEntry, Modifier},
	node::XmlNs,
	path::TreePositionPath,
};
use core::fmt::Write as _;

pub const SET_RENDER_NUM: u8 = 0;
pub const LISTEN_EVENT: u8 = 2;
pub const EXTRACT_PROPERTY: u8 = 3;
pub const MODIFY_DOM: u8 = 4;
pub const CHANGE_PAGE_URL: u8 = 6;
pub const EVAL_JS: u8 = 10;
pub const FORGET_EVENT: u8 = 15;

pub const CHANGE_PAGE_URL_HREF: u8 = 0;
pub const CHANGE_PAGE_URL_PUSH_STATE: u8 = 4;

pub const DOM_CREATE: u8 = 0;
pub const DOM_CREATE_TEXT: u8 = 1;
pub const DOM_REMOVE: u8 = 2;
pub const DOM_SET_ATTR: u8 = 3;
pub const DOM_REMOVE_ATTR: u8 = 4;
pub const DOM_SET_STYLE: u8 = 5;
pub const DOM_REMOVE_STYLE: u8 = 6;

/// Encodes `command`, or returns [`None`] for an empty [`ListenEvent`](`RemoteCommand::ListenEvent`) or [`ModifyDom`](`RemoteCommand::ModifyDom`).
#[must_use]
pub fn encode(command: &RemoteCommand) -> Option<String> {
	let mut tokens = Tokens::default();
	match command {
		RemoteCommand::SetRenderNum(render_number) => {
			tokens.raw(SET_RENDER_NUM).raw(render_number);
		}
		RemoteCommand::ListenEvent(events) => {
			if events.is_empty() {
				return None;
			}
			tokens.raw(LISTEN_EVENT);
			for event in events {
				listen_entry(&mut tokens, event);
			}
		}
		RemoteCommand::ForgetEvent { event_type, path } => {
			tokens.raw(FORGET_EVENT).string(event_type).path(path);
		}
		RemoteCommand::ExtractProperty { descriptor, path, name } => {
			tokens.raw(EXTRACT_PROPERTY).string(&descriptor.to_string()).path(path).string(name);
		}
		RemoteCommand::ModifyDom(changes) => {
			if changes.is_empty() {
				return None;
			}
			tokens.raw(MODIFY_DOM);
			for change in changes {
				dom_change(&mut tokens, change);
			}
		}
		RemoteCommand::PushHistory(path) => {
			tokens.raw(CHANGE_PAGE_URL).raw(CHANGE_PAGE_URL_PUSH_STATE).string(path);
		}
		RemoteCommand::SetHref(url) => {
			tokens.raw(CHANGE_PAGE_URL).raw(CHANGE_PAGE_URL_HREF).string(url);
		}
		RemoteCommand::EvalJs { descriptor, code } => {
			tokens.raw(EVAL_JS).raw(descriptor).string(code);
		}
	}
	Some(tokens.finish())
}

/// The client-side modifier notation: `0`, `1:window` or `2:wait:immediate`.
#[must_use]
pub fn modifier(modifier: Modifier) -> String {
	match modifier {
		Modifier::None => "0".to_owned(),
		Modifier::Throttle { window_ms } => format!("1:{}", window_ms),
		Modifier::Debounce { wait_ms, immediate } => format!("2:{}:{}", wait_ms, immediate),
	}
}

fn listen_entry(tokens: &mut Tokens, event: &EventEntry) {
	tokens
		.string(&event.event_type)
		.raw(event.prevent_default)
		.path(&event.target)
		.string(&modifier(event.modifier));
}

fn dom_change(tokens: &mut Tokens, change: &DomChange) {
	match change {
		DomChange::Create { parent, path, ns, tag } => {
			tokens.raw(DOM_CREATE).path(parent).path(path).ns(*ns).string(tag);
		}
		DomChange::CreateText { parent, path, text } => {
			tokens.raw(DOM_CREATE_TEXT).path(parent).path(path).string(text);
		}
		DomChange::Remove { parent, path } => {
			tokens.raw(DOM_REMOVE).path(parent).path(path);
		}
		DomChange::SetAttr {
			path,
			ns,
			name,
			value,
			is_property,
		} => {
			tokens.raw(DOM_SET_ATTR).path(path).ns(*ns).string(name).string(value).raw(is_property);
		}
		DomChange::RemoveAttr { path, ns, name, is_property } => {
			tokens.raw(DOM_REMOVE_ATTR).path(path).ns(*ns).string(name).raw(is_property);
		}
		DomChange::SetStyle { path, name, value } => {
			tokens.raw(DOM_SET_STYLE).path(path).string(name).string(value);
		}
		DomChange::RemoveStyle { path, name } => {
			tokens.raw(DOM_REMOVE_STYLE).path(path).string(name).raw(false);
		}
	}
}

#[derive(Default)]
struct Tokens {
	buffer: String,
}

impl Tokens {
	fn separator(&mut self) {
		self.buffer.push(if self.buffer.is_empty() { '[' } else { ',' });
	}

	fn raw(&mut self, value: impl core::fmt::Display) -> &mut Self {
		self.separator();
		// Writing into a `String` can't fail.
		let _ = write!(self.buffer, "{}", value);
		self
	}

	/// Quoted and escaped like a JSON string.
	fn string(&mut self, value: &str) -> &mut Self {
		self.separator();
		self.buffer.push_str(&serde_json::Value::from(value).to_string());
		self
	}

	fn path(&mut self, path: &TreePositionPath) -> &mut Self {
		self.string(&path.to_string())
	}

	fn ns(&mut self, ns: XmlNs) -> &mut Self {
		if ns == XmlNs::HTML {
			self.raw(0)
		} else {
			self.string(ns.uri)
		}
	}

	fn finish(mut self) -> String {
		if self.buffer.is_empty() {
			self.buffer.push('[');
		}
		self.buffer.push(']');
		self.buffer
	}
}
