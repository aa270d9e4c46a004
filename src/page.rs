//! A live page: one session's unit of serialized mutation.

use crate::{
	command::{RemoteCommand, RemoteOut},
	component::{panic_message, ComponentContext, ComponentDefinition, QualifiedSessionId, Segment, UpdateQueue, UpdateScope},
	config::PageConfig,
	context::{EventContext, Reply},
	error::{PageError, RemoteError},
	event::{find_event_handler, EventEntry, EventHandler},
	mirror::VirtualDocument,
	path::TreePositionPath,
	reference::Ref,
	render::RenderContext,
	schedule::{Schedules, TimerRef},
};
use core::time::Duration;
use hashbrown::HashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::{
	collections::VecDeque,
	panic::{catch_unwind, AssertUnwindSafe},
	sync::{Arc, Weak},
};
use tokio::{
	runtime::Handle,
	sync::{oneshot, Mutex as AsyncMutex},
	time::{interval_at, sleep, Instant},
};
use tracing::{debug, error, info, instrument, trace, warn};

/// An inbound DOM event report.
#[derive(Debug, Clone, PartialEq)]
pub struct DomEventNotification {
	pub render_number: u32,
	pub path: TreePositionPath,
	pub event_type: String,
	pub payload: Value,
}

/// The client's answer to a property request.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyResponse {
	Value(Value),
	NotFound,
}

/// A live page session.
///
/// All rendering, event dispatch, timer tasks and state updates of one page are serialized through one lock.
/// Different pages share nothing.
///
/// Events that arrive before [`mount`](`LivePage::mount`) completes are buffered and replayed in order afterwards.
#[derive(Clone)]
pub struct LivePage {
	inner: Arc<PageShared>,
}

pub(crate) struct PageShared {
	weak: Weak<PageShared>,
	session_id: QualifiedSessionId,
	config: PageConfig,
	out: Arc<dyn RemoteOut>,
	queue: Arc<UpdateQueue>,
	state: AsyncMutex<PageState>,
	inbox: Mutex<Inbox>,
	replies: Mutex<Replies>,
	schedules: Schedules,
}

#[derive(Default)]
struct PageState {
	document: VirtualDocument,
	root: Option<Box<dyn Segment>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
	Unmounted,
	Mounting,
	Mounted,
	ShutDown,
}

struct Inbox {
	phase: Phase,
	buffered: VecDeque<Inbound>,
}

enum Inbound {
	Dom(DomEventNotification),
	Component { event_type: String, payload: Value },
}

#[derive(Default)]
struct Replies {
	next_descriptor: u32,
	pending: HashMap<u32, oneshot::Sender<Result<Value, RemoteError>>>,
}

impl LivePage {
	#[must_use]
	pub fn new(session_id: QualifiedSessionId, config: PageConfig, out: Arc<dyn RemoteOut>) -> Self {
		let inner = Arc::new_cyclic(|weak: &Weak<PageShared>| {
			let queue = Arc::new(UpdateQueue::new());
			let page = weak.clone();
			queue.set_waker(move || match Handle::try_current() {
				Ok(runtime) => {
					let page = page.clone();
					runtime.spawn(async move {
						if let Some(inner) = page.upgrade() {
							LivePage { inner }.flush().await;
						}
					});
				}
				Err(_) => trace!("No runtime to flush on; Updates stay queued until the next flush."),
			});

			PageShared {
				weak: weak.clone(),
				session_id,
				config,
				out,
				queue,
				state: AsyncMutex::new(PageState::default()),
				inbox: Mutex::new(Inbox {
					phase: Phase::Unmounted,
					buffered: VecDeque::new(),
				}),
				replies: Mutex::new(Replies::default()),
				schedules: Schedules::new(),
			}
		});
		Self { inner }
	}

	#[must_use]
	pub fn session_id(&self) -> &QualifiedSessionId {
		&self.inner.session_id
	}

	#[must_use]
	pub fn config(&self) -> &PageConfig {
		&self.inner.config
	}

	/// Resolves and renders `root`, subscribes to its events and then replays buffered events.
	///
	/// # Errors
	///
	/// Iff the page was mounted or shut down before.
	#[instrument(skip(self, root), fields(session = %self.inner.session_id))]
	pub async fn mount(&self, root: impl ComponentDefinition + 'static) -> Result<(), PageError> {
		let shared = &*self.inner;
		{
			let mut inbox = shared.inbox.lock();
			match inbox.phase {
				Phase::Unmounted => inbox.phase = Phase::Mounting,
				Phase::Mounting | Phase::Mounted => return Err(PageError::AlreadyMounted),
				Phase::ShutDown => return Err(PageError::ShutDown),
			}
		}

		let mut state = shared.state.lock().await;
		{
			let _cycle = shared.queue.cycle();
			if shared.config.announce_render_number {
				shared.out.accept(RemoteCommand::SetRenderNum(0));
			}
			let start = shared.config.start_dom_path.clone();
			let mut ctx = RenderContext::new(start.clone(), shared.session_id.clone(), Arc::clone(&shared.queue), Arc::default());
			let segment = root.mount(&mut ctx, ComponentContext::new(), shared.config.root_component_path.clone()).await;
			state.document.insert_at(&start, ctx.into_roots());

			let events = segment.recursive_events();
			if !events.is_empty() {
				shared.out.accept(RemoteCommand::ListenEvent(events));
			}
			state.root = Some(segment);
		}
		info!("Mounted.");
		shared.drain_updates(&mut state).await;

		loop {
			let next = {
				let mut inbox = shared.inbox.lock();
				match inbox.buffered.pop_front() {
					Some(inbound) => Some(inbound),
					None => {
						if inbox.phase == Phase::Mounting {
							inbox.phase = Phase::Mounted;
						}
						None
					}
				}
			};
			match next {
				Some(inbound) => {
					trace!("Replaying a buffered event.");
					shared.handle_inbound(&mut state, inbound).await;
				}
				None => break,
			}
		}
		Ok(())
	}

	/// Dispatches a DOM event to the closest subscribed handler at or above its path.
	///
	/// Events nobody subscribed to are ignored.
	#[instrument(skip(self, notification), fields(path = %notification.path, event_type = notification.event_type.as_str()))]
	pub async fn dispatch_event(&self, notification: DomEventNotification) {
		if let Some(inbound) = self.inner.admit(Inbound::Dom(notification)) {
			let mut state = self.inner.state.lock().await;
			self.inner.handle_inbound(&mut state, inbound).await;
		}
	}

	/// Invokes every handler subscribed to the component event `event_type`, in tree order.
	#[instrument(skip(self, event_type, payload))]
	pub async fn notify_component_event(&self, event_type: impl Into<String>, payload: Value) {
		let inbound = Inbound::Component {
			event_type: event_type.into(),
			payload,
		};
		if let Some(inbound) = self.inner.admit(inbound) {
			let mut state = self.inner.state.lock().await;
			self.inner.handle_inbound(&mut state, inbound).await;
		}
	}

	pub fn handle_extract_property_response(&self, descriptor: u32, response: PropertyResponse) {
		let result = match response {
			PropertyResponse::Value(value) => Ok(value),
			PropertyResponse::NotFound => Err(RemoteError::PropertyNotFound { descriptor }),
		};
		self.inner.complete(descriptor, result);
	}

	pub fn handle_eval_js_response(&self, descriptor: u32, response: Result<Value, String>) {
		let result = response.map_err(|message| RemoteError::EvalFailed { descriptor, message });
		self.inner.complete(descriptor, result);
	}

	/// Applies all queued state updates.
	///
	/// This happens automatically when updates are queued from within a tokio runtime.
	pub async fn flush(&self) {
		if self.inner.is_shut_down() {
			return;
		}
		let mut state = self.inner.state.lock().await;
		self.inner.drain_updates(&mut state).await;
	}

	/// The current document as HTML, prefixed with the configured document type.
	pub async fn html(&self) -> String {
		let state = self.inner.state.lock().await;
		let mut html = self.inner.config.doc_type.clone().unwrap_or_default();
		html.push_str(&state.document.html());
		html
	}

	/// The HTML of the nodes the component at `component_path` is responsible for.
	///
	/// # Errors
	///
	/// Iff no such component is mounted.
	pub async fn component_html(&self, component_path: &TreePositionPath) -> Result<String, PageError> {
		let state = self.inner.state.lock().await;
		let segment = state
			.root
			.as_deref()
			.and_then(|root| find_segment(root, component_path))
			.ok_or_else(|| PageError::NotFound { path: component_path.clone() })?;
		Ok(state.document.nodes_at(&segment.aggregate_root_paths()).iter().map(crate::node::Node::html).collect())
	}

	/// A snapshot of the document as the client should currently display it.
	pub async fn document(&self) -> VirtualDocument {
		self.inner.state.lock().await.document.clone()
	}

	pub async fn recursive_events(&self) -> Vec<EventEntry> {
		let state = self.inner.state.lock().await;
		state.root.as_ref().map(|root| root.recursive_events()).unwrap_or_default()
	}

	pub async fn recursive_refs(&self) -> HashMap<Ref, TreePositionPath> {
		let state = self.inner.state.lock().await;
		state.root.as_ref().map(|root| root.recursive_refs()).unwrap_or_default()
	}

	pub fn schedule(&self, timer: TimerRef, delay: Duration, task: impl FnOnce() + Send + 'static) {
		self.inner.schedule(timer, delay, task);
	}

	pub fn schedule_at_fixed_rate(&self, timer: TimerRef, initial_delay: Duration, period: Duration, task: impl Fn() + Send + Sync + 'static) {
		self.inner.schedule_at_fixed_rate(timer, initial_delay, period, task);
	}

	/// Cancels a scheduled task. Unknown timers are ignored.
	pub fn cancel(&self, timer: &TimerRef) {
		self.inner.cancel(timer);
	}

	#[must_use]
	pub fn is_scheduled(&self, timer: &TimerRef) -> bool {
		self.inner.schedules.is_scheduled(timer)
	}

	/// Cancels all timers, fails pending replies and unmounts the component tree.
	///
	/// Inbound events are ignored from here on.
	#[instrument(skip(self), fields(session = %self.inner.session_id))]
	pub async fn shutdown(&self) {
		{
			let mut inbox = self.inner.inbox.lock();
			if inbox.phase == Phase::ShutDown {
				return;
			}
			inbox.phase = Phase::ShutDown;
			inbox.buffered.clear();
		}
		self.inner.schedules.cancel_all();
		self.inner.replies.lock().pending.clear();
		let _cycle = self.inner.queue.cycle();
		self.inner.queue.clear();

		let mut state = self.inner.state.lock().await;
		if let Some(mut root) = state.root.take() {
			root.unmount();
		}
		self.inner.queue.clear();
		info!("Shut down.");
	}
}

fn find_segment<'a>(segment: &'a dyn Segment, component_path: &TreePositionPath) -> Option<&'a dyn Segment> {
	if segment.key().component_path == *component_path {
		return Some(segment);
	}
	segment
		.children()
		.iter()
		.find(|child| component_path.starts_with(&child.key().component_path))
		.and_then(|child| find_segment(&**child, component_path))
}

impl PageShared {
	pub(crate) fn out(&self) -> &dyn RemoteOut {
		&*self.out
	}

	fn is_shut_down(&self) -> bool {
		self.inbox.lock().phase == Phase::ShutDown
	}

	/// Hands `inbound` back if it can be handled right away.
	fn admit(&self, inbound: Inbound) -> Option<Inbound> {
		let mut inbox = self.inbox.lock();
		match inbox.phase {
			Phase::Mounted => Some(inbound),
			Phase::Unmounted | Phase::Mounting => {
				trace!("Buffering an event until mounted.");
				inbox.buffered.push_back(inbound);
				None
			}
			Phase::ShutDown => {
				trace!("Ignoring an event after shutdown.");
				None
			}
		}
	}

	async fn handle_inbound(&self, state: &mut PageState, inbound: Inbound) {
		if let Some(root) = &state.root {
			let _cycle = self.queue.cycle();
			self.dispatch(&**root, inbound);
		}
		self.drain_updates(state).await;
	}

	fn dispatch(&self, root: &dyn Segment, inbound: Inbound) {
		let refs = root.recursive_refs();
		let mut emitted = match inbound {
			Inbound::Dom(notification) => {
				let events = root.recursive_events();
				let handler = match find_event_handler(&events, &notification.path, &notification.event_type) {
					Some(entry) => Arc::clone(&entry.handler),
					None => return trace!("No handler."),
				};
				trace!(render_number = notification.render_number, "Invoking handler.");
				self.run_handler(&handler, notification.path, &notification.payload, &refs)
			}
			Inbound::Component { event_type, payload } => VecDeque::from([(event_type, payload)]),
		};

		if emitted.is_empty() {
			return;
		}
		let component_events = root.recursive_component_events();
		while let Some((event_type, payload)) = emitted.pop_front() {
			let span = tracing::trace_span!("Component event", event_type = event_type.as_str());
			let _enter = span.enter();
			for entry in component_events.iter().filter(|entry| entry.event_type == event_type) {
				emitted.extend(self.run_handler(&entry.handler, TreePositionPath::empty(), &payload, &refs));
			}
		}
	}

	fn run_handler(&self, handler: &EventHandler, path: TreePositionPath, payload: &Value, refs: &HashMap<Ref, TreePositionPath>) -> VecDeque<(String, Value)> {
		let mut ctx = EventContext::new(self, path, payload, refs);
		if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(&mut ctx))) {
			error!("Event handler panicked: {}", panic_message(&*panic));
		}
		ctx.into_emitted().into()
	}

	/// Applies queued state updates until none are left.
	async fn drain_updates(&self, state: &mut PageState) {
		loop {
			let cycle = self.queue.cycle();
			while let Some(update) = self.queue.pop() {
				let PageState { document, root } = &mut *state;
				let root = match root {
					Some(root) => root,
					None => {
						debug!(target_component = %update.target, "Dropping an update without a mounted root.");
						continue;
					}
				};
				let mut scope = UpdateScope {
					document,
					out: &*self.out,
					session_id: &self.session_id,
					queue: &self.queue,
				};
				if let Err(update) = root.apply_update(update, &mut scope).await {
					debug!(target_component = %update.target, "Dropping an update for a component that is no longer mounted.");
				}
			}
			drop(cycle);
			if self.queue.is_empty() {
				break;
			}
		}
	}

	pub(crate) fn request(&self, command: impl FnOnce(u32) -> RemoteCommand) -> Reply {
		if self.is_shut_down() {
			return Reply::failed(RemoteError::SessionClosed);
		}
		let (sender, receiver) = oneshot::channel();
		let descriptor = {
			let mut replies = self.replies.lock();
			let descriptor = replies.next_descriptor;
			replies.next_descriptor = descriptor.wrapping_add(1);
			replies.pending.insert(descriptor, sender);
			descriptor
		};
		self.out.accept(command(descriptor));
		Reply::waiting(receiver)
	}

	fn complete(&self, descriptor: u32, result: Result<Value, RemoteError>) {
		match self.replies.lock().pending.remove(&descriptor) {
			Some(sender) => {
				if sender.send(result).is_err() {
					trace!(descriptor, "Nobody awaits this reply anymore.");
				}
			}
			None => warn!(descriptor, "Reply to an unknown request; Ignoring."),
		}
	}

	pub(crate) fn schedule(&self, timer: TimerRef, delay: Duration, task: impl FnOnce() + Send + 'static) {
		let runtime = match Handle::try_current() {
			Ok(runtime) => runtime,
			Err(error) => return error!(%timer, "Can't schedule without a runtime: {}", error),
		};
		let (page, id, key) = (self.weak.clone(), self.schedules.next_id(), timer.clone());
		let task = runtime.spawn(async move {
			sleep(delay).await;
			if let Some(page) = page.upgrade() {
				page.schedules.finished(&key, id);
				page.run_task(task).await;
			}
		});
		self.schedules.insert(timer, id, task);
	}

	pub(crate) fn schedule_at_fixed_rate(&self, timer: TimerRef, initial_delay: Duration, period: Duration, task: impl Fn() + Send + Sync + 'static) {
		if period.is_zero() {
			return error!(%timer, "Can't schedule at a zero period.");
		}
		let runtime = match Handle::try_current() {
			Ok(runtime) => runtime,
			Err(error) => return error!(%timer, "Can't schedule without a runtime: {}", error),
		};
		let (page, id) = (self.weak.clone(), self.schedules.next_id());
		let task = runtime.spawn(async move {
			let mut interval = interval_at(Instant::now() + initial_delay, period);
			loop {
				interval.tick().await;
				match page.upgrade() {
					Some(page) => page.run_task(|| task()).await,
					None => break,
				}
			}
		});
		self.schedules.insert(timer, id, task);
	}

	pub(crate) fn cancel(&self, timer: &TimerRef) {
		self.schedules.cancel(timer);
	}

	async fn run_task(&self, task: impl FnOnce() + Send) {
		if self.is_shut_down() {
			return;
		}
		let mut state = self.state.lock().await;
		if self.is_shut_down() {
			return;
		}
		{
			let _cycle = self.queue.cycle();
			if let Err(panic) = catch_unwind(AssertUnwindSafe(task)) {
				error!("Scheduled task panicked: {}", panic_message(&*panic));
			}
		}
		self.drain_updates(&mut state).await;
	}
}
