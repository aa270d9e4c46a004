#![doc(html_root_url = "https://docs.rs/livedom/0.0.1")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod command;
pub mod component;
pub mod config;
pub mod context;
pub mod definition;
pub mod diff;
pub mod error;
pub mod event;
pub mod mirror;
pub mod node;
pub mod page;
pub mod path;
pub mod reference;
pub mod render;
pub mod schedule;
pub mod wire;

pub use command::{RemoteCommand, RemoteOut};
pub use component::{Component, ComponentCompositeKey, ComponentContext, InitialState, QualifiedSessionId, StateHandle, StateStore};
pub use config::PageConfig;
pub use context::EventContext;
pub use definition::{component, fragment, svg, tag, text, Definition};
pub use page::{DomEventNotification, LivePage, PropertyResponse};
pub use path::TreePositionPath;
pub use reference::Ref;
