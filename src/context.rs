//! What event handlers get to work with.

use crate::{
	command::RemoteCommand,
	diff::DomChange,
	error::RemoteError,
	node::XmlNs,
	page::PageShared,
	path::TreePositionPath,
	reference::Ref,
	schedule::TimerRef,
};
use core::{
	future::Future,
	pin::Pin,
	task::{Context, Poll},
	time::Duration,
};
use hashbrown::HashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::warn;

/// The context of one dispatched event.
pub struct EventContext<'a> {
	page: &'a PageShared,
	path: TreePositionPath,
	payload: &'a Value,
	refs: &'a HashMap<Ref, TreePositionPath>,
	emitted: Vec<(String, Value)>,
}

impl<'a> EventContext<'a> {
	pub(crate) fn new(page: &'a PageShared, path: TreePositionPath, payload: &'a Value, refs: &'a HashMap<Ref, TreePositionPath>) -> Self {
		Self {
			page,
			path,
			payload,
			refs,
			emitted: Vec::new(),
		}
	}

	/// The raw event payload as reported by the client.
	#[must_use]
	pub fn event_object(&self) -> &Value {
		self.payload
	}

	/// The path the event was reported at, before bubbling.
	#[must_use]
	pub fn event_element_path(&self) -> &TreePositionPath {
		&self.path
	}

	/// Reads or writes client-side properties of the node `r` was attached to in the last render.
	#[must_use]
	pub fn properties_by_ref(&self, r: &Ref) -> PropertiesHandle<'a> {
		let path = if r.is_window() { Some(TreePositionPath::empty()) } else { self.refs.get(r).cloned() };
		PropertiesHandle { page: self.page, path }
	}

	/// Evaluates `code` on the client. The reply carries the result.
	pub fn eval_js(&self, code: impl Into<String>) -> Reply {
		let code = code.into();
		self.page.request(move |descriptor| RemoteCommand::EvalJs { descriptor, code })
	}

	/// Runs `task` once after `delay`, under the session lock.
	pub fn schedule(&self, timer: TimerRef, delay: Duration, task: impl FnOnce() + Send + 'static) {
		self.page.schedule(timer, delay, task);
	}

	/// Runs `task` after `initial_delay`, then every `period`, under the session lock.
	pub fn schedule_at_fixed_rate(&self, timer: TimerRef, initial_delay: Duration, period: Duration, task: impl Fn() + Send + Sync + 'static) {
		self.page.schedule_at_fixed_rate(timer, initial_delay, period, task);
	}

	/// Cancels a scheduled task. Unknown timers are ignored.
	pub fn cancel(&self, timer: &TimerRef) {
		self.page.cancel(timer);
	}

	pub fn set_href(&self, url: impl Into<String>) {
		self.page.out().accept(RemoteCommand::SetHref(url.into()));
	}

	pub fn push_history(&self, path: impl Into<String>) {
		self.page.out().accept(RemoteCommand::PushHistory(path.into()));
	}

	/// Raises a component event once this handler returns.
	pub fn emit(&mut self, event_type: impl Into<String>, payload: Value) {
		self.emitted.push((event_type.into(), payload));
	}

	pub(crate) fn into_emitted(self) -> Vec<(String, Value)> {
		self.emitted
	}
}

/// Client-side properties of one node.
pub struct PropertiesHandle<'a> {
	page: &'a PageShared,
	path: Option<TreePositionPath>,
}

impl PropertiesHandle<'_> {
	/// The node's path, if its ref was recorded.
	#[must_use]
	pub fn path(&self) -> Option<&TreePositionPath> {
		self.path.as_ref()
	}

	/// Requests the property `name`.
	///
	/// Fails with [`RemoteError::UnresolvedRef`] if the ref isn't attached to any rendered node.
	pub fn get(&self, name: impl Into<String>) -> Reply {
		match &self.path {
			Some(path) => {
				let (path, name) = (path.clone(), name.into());
				self.page.request(move |descriptor| RemoteCommand::ExtractProperty { descriptor, path, name })
			}
			None => Reply::failed(RemoteError::UnresolvedRef),
		}
	}

	/// Assigns the property `name` on the client.
	pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
		match &self.path {
			Some(path) => self.page.out().accept(RemoteCommand::ModifyDom(vec![DomChange::SetAttr {
				path: path.clone(),
				ns: XmlNs::HTML,
				name: name.into(),
				value: value.into(),
				is_property: true,
			}])),
			None => warn!("Can't set a property through an unresolved ref; Ignoring."),
		}
	}
}

/// The eventual answer of the client to a request.
///
/// Resolves to [`RemoteError::SessionClosed`] if the session ends first.
#[must_use]
pub struct Reply {
	inner: ReplyInner,
}

enum ReplyInner {
	Ready(Option<Result<Value, RemoteError>>),
	Waiting(oneshot::Receiver<Result<Value, RemoteError>>),
}

impl Reply {
	pub(crate) fn failed(error: RemoteError) -> Self {
		Self {
			inner: ReplyInner::Ready(Some(Err(error))),
		}
	}

	pub(crate) fn waiting(receiver: oneshot::Receiver<Result<Value, RemoteError>>) -> Self {
		Self {
			inner: ReplyInner::Waiting(receiver),
		}
	}
}

impl Future for Reply {
	type Output = Result<Value, RemoteError>;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match &mut self.get_mut().inner {
			ReplyInner::Ready(result) => Poll::Ready(result.take().unwrap_or(Err(RemoteError::SessionClosed))),
			ReplyInner::Waiting(receiver) => Pin::new(receiver).poll(cx).map(|result| result.unwrap_or(Err(RemoteError::SessionClosed))),
		}
	}
}
