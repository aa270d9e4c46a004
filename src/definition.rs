//! View definitions: what a view function returns, and a thin builder for them.

use crate::{
	component::{BoxFuture, ComponentContext, ComponentDefinition},
	context::EventContext,
	event::{ComponentEventEntry, EventEntry, EventHandler, Modifier},
	node::{Attribute, Style, XmlNs},
	path::TreePositionPath,
	reference::Ref,
	render::{RenderContext, SegmentRecord},
};
use core::fmt::{self, Debug, Formatter};
use std::sync::Arc;
use tracing::trace_span;

/// A declarative description of (part of) a rendered tree.
pub enum Definition {
	Tag(TagDefinition),
	Text(String),
	Fragment(Vec<Definition>),
	/// A nested, independently stateful component.
	Component(Box<dyn ComponentDefinition>),
	/// A subscription to an event on the window rather than on an element.
	WindowEvent(EventDefinition),
	/// A subscription to a server-side component event.
	ComponentEvent { event_type: String, handler: EventHandler },
}

#[derive(Clone)]
pub struct EventDefinition {
	pub event_type: String,
	pub handler: EventHandler,
	pub prevent_default: bool,
	pub modifier: Modifier,
}

impl EventDefinition {
	pub fn new(event_type: impl Into<String>, handler: impl Fn(&mut EventContext<'_>) + Send + Sync + 'static) -> Self {
		Self {
			event_type: event_type.into(),
			handler: Arc::new(handler),
			prevent_default: false,
			modifier: Modifier::None,
		}
	}

	#[must_use]
	pub fn prevent_default(mut self) -> Self {
		self.prevent_default = true;
		self
	}

	#[must_use]
	pub fn throttle(mut self, window_ms: u32) -> Self {
		self.modifier = Modifier::Throttle { window_ms };
		self
	}

	#[must_use]
	pub fn debounce(mut self, wait_ms: u32, immediate: bool) -> Self {
		self.modifier = Modifier::Debounce { wait_ms, immediate };
		self
	}

	fn at(self, target: TreePositionPath) -> EventEntry {
		EventEntry {
			event_type: self.event_type,
			target,
			handler: self.handler,
			prevent_default: self.prevent_default,
			modifier: self.modifier,
		}
	}
}

pub struct TagDefinition {
	pub ns: XmlNs,
	pub name: String,
	pub self_closing: bool,
	pub attributes: Vec<Attribute>,
	pub styles: Vec<Style>,
	pub events: Vec<EventDefinition>,
	pub refs: Vec<Ref>,
	pub children: Vec<Definition>,
}

/// An HTML element.
pub fn tag(name: impl Into<String>) -> TagDefinition {
	TagDefinition::new(XmlNs::HTML, name)
}

/// An SVG element.
pub fn svg(name: impl Into<String>) -> TagDefinition {
	TagDefinition::new(XmlNs::SVG, name)
}

pub fn text(text: impl ToString) -> Definition {
	Definition::Text(text.to_string())
}

pub fn fragment(definitions: impl IntoIterator<Item = Definition>) -> Definition {
	Definition::Fragment(definitions.into_iter().collect())
}

pub fn component(component: impl ComponentDefinition + 'static) -> Definition {
	Definition::Component(Box::new(component))
}

pub fn window_on(event_type: impl Into<String>, handler: impl Fn(&mut EventContext<'_>) + Send + Sync + 'static) -> Definition {
	Definition::WindowEvent(EventDefinition::new(event_type, handler))
}

pub fn on_component_event(event_type: impl Into<String>, handler: impl Fn(&mut EventContext<'_>) + Send + Sync + 'static) -> Definition {
	Definition::ComponentEvent {
		event_type: event_type.into(),
		handler: Arc::new(handler),
	}
}

impl TagDefinition {
	pub fn new(ns: XmlNs, name: impl Into<String>) -> Self {
		Self {
			ns,
			name: name.into(),
			self_closing: false,
			attributes: Vec::new(),
			styles: Vec::new(),
			events: Vec::new(),
			refs: Vec::new(),
			children: Vec::new(),
		}
	}

	#[must_use]
	pub fn self_closing(mut self) -> Self {
		self.self_closing = true;
		self
	}

	#[must_use]
	pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.attributes.push(Attribute::new(name, value, false));
		self
	}

	/// A DOM property, assigned by the client rather than written as an attribute.
	#[must_use]
	pub fn prop(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.attributes.push(Attribute::new(name, value, true));
		self
	}

	#[must_use]
	pub fn style(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.styles.push(Style::new(name, value));
		self
	}

	#[must_use]
	pub fn on(self, event_type: impl Into<String>, handler: impl Fn(&mut EventContext<'_>) + Send + Sync + 'static) -> Self {
		self.on_with(EventDefinition::new(event_type, handler))
	}

	#[must_use]
	pub fn on_with(mut self, event: EventDefinition) -> Self {
		self.events.push(event);
		self
	}

	#[must_use]
	pub fn with_ref(mut self, r: Ref) -> Self {
		self.refs.push(r);
		self
	}

	#[must_use]
	pub fn child(mut self, child: impl Into<Definition>) -> Self {
		self.children.push(child.into());
		self
	}

	#[must_use]
	pub fn children(mut self, children: impl IntoIterator<Item = Definition>) -> Self {
		self.children.extend(children);
		self
	}
}

impl From<TagDefinition> for Definition {
	fn from(tag: TagDefinition) -> Self {
		Definition::Tag(tag)
	}
}

impl From<&str> for Definition {
	fn from(text: &str) -> Self {
		Definition::Text(text.to_owned())
	}
}

impl From<String> for Definition {
	fn from(text: String) -> Self {
		Definition::Text(text)
	}
}

impl Debug for Definition {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Definition::Tag(tag) => f
				.debug_struct("Tag")
				.field("name", &tag.name)
				.field("attributes", &tag.attributes)
				.field("styles", &tag.styles)
				.field("children", &tag.children)
				.finish_non_exhaustive(),
			Definition::Text(text) => f.debug_tuple("Text").field(text).finish(),
			Definition::Fragment(definitions) => f.debug_tuple("Fragment").field(definitions).finish(),
			Definition::Component(_) => f.write_str("Component(..)"),
			Definition::WindowEvent(event) => f.debug_tuple("WindowEvent").field(&event.event_type).finish(),
			Definition::ComponentEvent { event_type, .. } => f.debug_tuple("ComponentEvent").field(event_type).finish(),
		}
	}
}

impl Definition {
	/// Renders this definition into `ctx`, registering what it declares with `record`.
	pub(crate) fn render<'a>(self, ctx: &'a mut RenderContext, record: &'a mut SegmentRecord, context: &'a ComponentContext) -> BoxFuture<'a, ()> {
		Box::pin(async move {
			match self {
				Definition::Tag(TagDefinition {
					ns,
					name,
					self_closing,
					attributes,
					styles,
					events,
					refs,
					children,
				}) => {
					let depth = ctx.depth();
					let path = ctx.open_node(ns, &name, self_closing);
					record.node_created(&path, depth);
					{
						let span = trace_span!("Rendering tag", name = name.as_str(), path = %path);
						let _enter = span.enter();
						for attribute in attributes {
							ctx.set_attr(attribute);
						}
						for style in styles {
							ctx.set_style(style);
						}
						for event in events {
							record.events.push(event.at(path.clone()));
						}
						for r in refs {
							record.refs.insert(r, path.clone());
						}
					}
					for child in children {
						child.render(ctx, record, context).await;
					}
					ctx.close_node();
				}
				Definition::Text(text) => {
					let depth = ctx.depth();
					let (path, merged) = ctx.add_text(text);
					if !merged {
						record.node_created(&path, depth);
					}
				}
				Definition::Fragment(definitions) => {
					for definition in definitions {
						definition.render(ctx, record, context).await;
					}
				}
				Definition::Component(definition) => {
					let component_path = record.next_child_path();
					ctx.barrier();
					let segment = definition.mount(ctx, context.clone(), component_path).await;
					ctx.barrier();
					record.children.push(segment);
				}
				Definition::WindowEvent(event) => record.events.push(event.at(TreePositionPath::empty())),
				Definition::ComponentEvent { event_type, handler } => record.component_events.push(ComponentEventEntry { event_type, handler }),
			}
		})
	}
}
