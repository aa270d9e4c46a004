//! Stateful component segments and their update cycle.

use crate::{
	command::{RemoteCommand, RemoteOut},
	definition::Definition,
	diff::{diff_children, DomChanges},
	event::{ComponentEventEntry, EventEntry},
	mirror::VirtualDocument,
	path::TreePositionPath,
	reference::Ref,
	render::{RenderContext, SegmentRecord},
};
use async_trait::async_trait;
use core::{
	any::Any,
	fmt::{self, Debug, Display, Formatter},
	future::Future,
	marker::PhantomData,
	pin::Pin,
	sync::atomic::{AtomicBool, AtomicU64, Ordering},
};
use futures::FutureExt as _;
use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use std::{
	collections::VecDeque,
	panic::{catch_unwind, AssertUnwindSafe},
	sync::Arc,
};
use tokio::runtime::Handle;
use tracing::{debug, error, instrument, trace, warn};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedSessionId {
	pub device_id: String,
	pub session_id: String,
}

impl QualifiedSessionId {
	pub fn new(device_id: impl Into<String>, session_id: impl Into<String>) -> Self {
		Self {
			device_id: device_id.into(),
			session_id: session_id.into(),
		}
	}
}

impl Display for QualifiedSessionId {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "{}-{}", self.device_id, self.session_id)
	}
}

/// Identifies one instantiated component within one session.
///
/// `component_path` addresses the component tree, which is distinct from the DOM tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentCompositeKey {
	pub session_id: QualifiedSessionId,
	pub component_type: Arc<str>,
	pub component_path: TreePositionPath,
}

impl Display for ComponentCompositeKey {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}@{}", self.session_id, self.component_type, self.component_path)
	}
}

/// Values a component passes down to all of its descendants.
///
/// Immutable. [`with`](`ComponentContext::with`) returns an overlay in which later entries override earlier ones.
#[derive(Clone, Default)]
pub struct ComponentContext {
	values: Arc<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl ComponentContext {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) -> Self {
		self.with_all([(key.into(), Arc::new(value) as Arc<dyn Any + Send + Sync>)])
	}

	#[must_use]
	pub fn with_all(&self, entries: impl IntoIterator<Item = (String, Arc<dyn Any + Send + Sync>)>) -> Self {
		let mut values = (*self.values).clone();
		values.extend(entries);
		Self { values: Arc::new(values) }
	}

	/// The value under `key`, if present and of type `T`.
	#[must_use]
	pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
		self.values.get(key)?.downcast_ref()
	}

	#[must_use]
	pub fn contains_key(&self, key: &str) -> bool {
		self.values.contains_key(key)
	}
}

impl Debug for ComponentContext {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_set().entries(self.values.keys()).finish()
	}
}

/// One state update, as queued through a [`StateHandle`].
pub enum StateUpdate<S> {
	Set(S),
	Transform(Box<dyn FnOnce(&S) -> S + Send>),
	/// A transform that may leave the state as is by returning [`None`].
	TransformIfPresent(Box<dyn FnOnce(&S) -> Option<S> + Send>),
	/// Sets the state once the future completes, unless another update is applied first.
	Await(BoxFuture<'static, S>),
	Completed { state: S, generation: u64 },
}

impl<S> Debug for StateUpdate<S> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			StateUpdate::Set(_) => "Set",
			StateUpdate::Transform(_) => "Transform",
			StateUpdate::TransformIfPresent(_) => "TransformIfPresent",
			StateUpdate::Await(_) => "Await",
			StateUpdate::Completed { .. } => "Completed",
		})
	}
}

/// A type-erased [`StateUpdate`] addressed to one segment.
pub struct PendingUpdate {
	pub target: ComponentCompositeKey,
	update: Box<dyn Any + Send>,
}

impl Debug for PendingUpdate {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("PendingUpdate").field("target", &format_args!("{}", self.target)).finish_non_exhaustive()
	}
}

/// The session's queue of state updates.
///
/// Updates are applied by the owning page under its lock.
/// Pushing outside of an update cycle wakes the page so that it flushes the queue.
#[derive(Default)]
pub struct UpdateQueue {
	pending: Mutex<VecDeque<PendingUpdate>>,
	in_cycle: AtomicBool,
	waker: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl UpdateQueue {
	pub(crate) fn new() -> Self {
		Self::default()
	}

	pub(crate) fn set_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
		*self.waker.lock() = Some(Box::new(waker));
	}

	pub(crate) fn push(&self, update: PendingUpdate) {
		self.pending.lock().push_back(update);
		if !self.in_cycle.load(Ordering::SeqCst) {
			if let Some(waker) = &*self.waker.lock() {
				waker();
			}
		}
	}

	pub(crate) fn pop(&self) -> Option<PendingUpdate> {
		self.pending.lock().pop_front()
	}

	pub(crate) fn is_empty(&self) -> bool {
		self.pending.lock().is_empty()
	}

	/// Starts an update cycle, during which pushes don't wake the page. The cycle ends when the guard drops.
	pub(crate) fn cycle(&self) -> Cycle<'_> {
		self.in_cycle.store(true, Ordering::SeqCst);
		Cycle(self)
	}

	pub(crate) fn clear(&self) {
		self.pending.lock().clear();
	}
}

pub(crate) struct Cycle<'a>(&'a UpdateQueue);

impl Drop for Cycle<'_> {
	fn drop(&mut self) {
		self.0.in_cycle.store(false, Ordering::SeqCst);
	}
}

/// The capability to update one component's state.
///
/// Updates are queued and applied in order under the session lock, never inline.
pub struct StateHandle<S> {
	key: ComponentCompositeKey,
	queue: Arc<UpdateQueue>,
	_state: PhantomData<fn() -> S>,
}

impl<S> Clone for StateHandle<S> {
	fn clone(&self) -> Self {
		Self {
			key: self.key.clone(),
			queue: Arc::clone(&self.queue),
			_state: PhantomData,
		}
	}
}

impl<S> Debug for StateHandle<S> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("StateHandle").field(&format_args!("{}", self.key)).finish()
	}
}

impl<S: Send + 'static> StateHandle<S> {
	pub(crate) fn new(key: ComponentCompositeKey, queue: Arc<UpdateQueue>) -> Self {
		Self {
			key,
			queue,
			_state: PhantomData,
		}
	}

	#[must_use]
	pub fn key(&self) -> &ComponentCompositeKey {
		&self.key
	}

	pub fn push(&self, update: StateUpdate<S>) {
		trace!(component = %self.key, ?update, "Queueing state update.");
		self.queue.push(PendingUpdate {
			target: self.key.clone(),
			update: Box::new(update),
		});
	}

	pub fn set_state(&self, state: S) {
		self.push(StateUpdate::Set(state));
	}

	pub fn apply_state_transformation(&self, transform: impl FnOnce(&S) -> S + Send + 'static) {
		self.push(StateUpdate::Transform(Box::new(transform)));
	}

	pub fn apply_state_transformation_if_present(&self, transform: impl FnOnce(&S) -> Option<S> + Send + 'static) {
		self.push(StateUpdate::TransformIfPresent(Box::new(transform)));
	}

	pub fn apply_when_complete(&self, state: impl Future<Output = S> + Send + 'static) {
		self.push(StateUpdate::Await(Box::pin(state)));
	}
}

/// A component's initial state, possibly still being resolved.
pub enum InitialState<S> {
	Ready(S),
	Pending(BoxFuture<'static, S>),
}

impl<S> InitialState<S> {
	pub fn pending(state: impl Future<Output = S> + Send + 'static) -> Self {
		Self::Pending(Box::pin(state))
	}
}

pub type StateResolver<S> = Arc<dyn Fn(&ComponentCompositeKey, &ComponentContext) -> InitialState<S> + Send + Sync>;
pub type View<S> = Arc<dyn Fn(&S, &StateHandle<S>) -> Definition + Send + Sync>;
pub type ContextResolver<S> = Arc<dyn Fn(&ComponentContext, &S) -> ComponentContext + Send + Sync>;
pub type MountedCallback<S> = Arc<dyn Fn(&ComponentCompositeKey, &S, &StateHandle<S>) + Send + Sync>;
pub type UpdatedCallback<S> = Arc<dyn Fn(&ComponentCompositeKey, &S, &S, &StateHandle<S>) + Send + Sync>;
pub type UnmountedCallback<S> = Arc<dyn Fn(&ComponentCompositeKey, &S) + Send + Sync>;

struct Callbacks<S> {
	mounted: Option<MountedCallback<S>>,
	updated: Option<UpdatedCallback<S>>,
	unmounted: Option<UnmountedCallback<S>>,
	persist: Option<UnmountedCallback<S>>,
}

impl<S> Clone for Callbacks<S> {
	fn clone(&self) -> Self {
		Self {
			mounted: self.mounted.clone(),
			updated: self.updated.clone(),
			unmounted: self.unmounted.clone(),
			persist: self.persist.clone(),
		}
	}
}

/// States of [`Component`]s created with [`Component::with_stored_state`], kept across remounts.
pub struct StateStore<S> {
	states: Arc<Mutex<HashMap<ComponentCompositeKey, S>>>,
}

impl<S> Clone for StateStore<S> {
	fn clone(&self) -> Self {
		Self { states: Arc::clone(&self.states) }
	}
}

impl<S> Default for StateStore<S> {
	fn default() -> Self {
		Self {
			states: Arc::new(Mutex::new(HashMap::new())),
		}
	}
}

impl<S: Clone> StateStore<S> {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn get(&self, key: &ComponentCompositeKey) -> Option<S> {
		self.states.lock().get(key).cloned()
	}

	pub fn insert(&self, key: ComponentCompositeKey, state: S) {
		self.states.lock().insert(key, state);
	}

	fn get_or_insert(&self, key: &ComponentCompositeKey, initial: &S) -> S {
		self.states.lock().entry(key.clone()).or_insert_with(|| initial.clone()).clone()
	}
}

/// Something that can be mounted into a render pass as a [`Segment`].
#[async_trait]
pub trait ComponentDefinition: Send + Sync {
	/// Resolves the initial state, renders into `ctx` and returns the mounted segment.
	async fn mount(&self, ctx: &mut RenderContext, context: ComponentContext, component_path: TreePositionPath) -> Box<dyn Segment>;
}

/// A stateful component definition.
pub struct Component<S> {
	component_type: Arc<str>,
	resolver: StateResolver<S>,
	view: View<S>,
	context_resolver: ContextResolver<S>,
	callbacks: Callbacks<S>,
}

impl<S> Clone for Component<S> {
	fn clone(&self) -> Self {
		Self {
			component_type: Arc::clone(&self.component_type),
			resolver: Arc::clone(&self.resolver),
			view: Arc::clone(&self.view),
			context_resolver: Arc::clone(&self.context_resolver),
			callbacks: self.callbacks.clone(),
		}
	}
}

impl<S: Send + Sync + 'static> Component<S> {
	pub fn new(
		component_type: impl Into<Arc<str>>,
		resolver: impl Fn(&ComponentCompositeKey, &ComponentContext) -> InitialState<S> + Send + Sync + 'static,
		view: impl Fn(&S, &StateHandle<S>) -> Definition + Send + Sync + 'static,
	) -> Self {
		Self {
			component_type: component_type.into(),
			resolver: Arc::new(resolver),
			view: Arc::new(view),
			context_resolver: Arc::new(|context: &ComponentContext, _: &S| context.clone()),
			callbacks: Callbacks {
				mounted: None,
				updated: None,
				unmounted: None,
				persist: None,
			},
		}
	}

	pub fn with_initial_state(component_type: impl Into<Arc<str>>, state: S, view: impl Fn(&S, &StateHandle<S>) -> Definition + Send + Sync + 'static) -> Self
	where
		S: Clone,
	{
		Self::new(component_type, move |_: &ComponentCompositeKey, _: &ComponentContext| InitialState::Ready(state.clone()), view)
	}

	/// A component whose state is read from and written back to `store`, so that it survives remounts.
	pub fn with_stored_state(component_type: impl Into<Arc<str>>, initial: S, store: StateStore<S>, view: impl Fn(&S, &StateHandle<S>) -> Definition + Send + Sync + 'static) -> Self
	where
		S: Clone,
	{
		let reader = store.clone();
		let mut component = Self::new(component_type, move |key: &ComponentCompositeKey, _: &ComponentContext| InitialState::Ready(reader.get_or_insert(key, &initial)), view);
		component.callbacks.persist = Some(Arc::new(move |key: &ComponentCompositeKey, state: &S| store.insert(key.clone(), state.clone())));
		component
	}

	/// Derives the context passed to descendants from the inherited one and this component's state.
	#[must_use]
	pub fn with_context(mut self, context_resolver: impl Fn(&ComponentContext, &S) -> ComponentContext + Send + Sync + 'static) -> Self {
		self.context_resolver = Arc::new(context_resolver);
		self
	}

	#[must_use]
	pub fn on_mounted(mut self, callback: impl Fn(&ComponentCompositeKey, &S, &StateHandle<S>) + Send + Sync + 'static) -> Self {
		self.callbacks.mounted = Some(Arc::new(callback));
		self
	}

	#[must_use]
	pub fn on_updated(mut self, callback: impl Fn(&ComponentCompositeKey, &S, &S, &StateHandle<S>) + Send + Sync + 'static) -> Self {
		self.callbacks.updated = Some(Arc::new(callback));
		self
	}

	#[must_use]
	pub fn on_unmounted(mut self, callback: impl Fn(&ComponentCompositeKey, &S) + Send + Sync + 'static) -> Self {
		self.callbacks.unmounted = Some(Arc::new(callback));
		self
	}
}

#[async_trait]
impl<S: Send + Sync + 'static> ComponentDefinition for Component<S> {
	#[instrument(skip(self, ctx, context), fields(component_type = %self.component_type, component_path = %component_path))]
	async fn mount(&self, ctx: &mut RenderContext, context: ComponentContext, component_path: TreePositionPath) -> Box<dyn Segment> {
		let key = ComponentCompositeKey {
			session_id: ctx.session_id().clone(),
			component_type: Arc::clone(&self.component_type),
			component_path,
		};
		let resolved = AssertUnwindSafe(async {
			match (self.resolver)(&key, &context) {
				InitialState::Ready(state) => state,
				InitialState::Pending(state) => {
					trace!("Awaiting initial state.");
					state.await
				}
			}
		})
		.catch_unwind()
		.await;
		let state = match resolved {
			Ok(state) => state,
			Err(panic) => {
				error!("Resolving the initial state failed: {}", panic_message(&*panic));
				let start = ctx.next_path();
				return Box::new(FailedSegment { key, start, refs: HashMap::new() });
			}
		};

		let handle = StateHandle::new(key.clone(), Arc::clone(ctx.queue()));
		let was_mounted = ctx.was_mounted(&key);
		let mut segment = ComponentSegment {
			start: ctx.next_path(),
			key,
			state,
			generation: next_generation(),
			view: Arc::clone(&self.view),
			context_resolver: Arc::clone(&self.context_resolver),
			callbacks: self.callbacks.clone(),
			context,
			handle,
			roots: Vec::new(),
			events: Vec::new(),
			component_events: Vec::new(),
			refs: HashMap::new(),
			children: Vec::new(),
		};

		if segment.render(ctx).await {
			if was_mounted {
				trace!("Re-created a still mounted component.");
			} else if let Some(mounted) = &segment.callbacks.mounted {
				run_callback(&segment.key, "Mounted", || mounted(&segment.key, &segment.state, &segment.handle));
			}
		}
		Box::new(segment)
	}
}

/// What an update cycle writes to.
pub struct UpdateScope<'a> {
	pub(crate) document: &'a mut VirtualDocument,
	pub(crate) out: &'a dyn RemoteOut,
	pub(crate) session_id: &'a QualifiedSessionId,
	pub(crate) queue: &'a Arc<UpdateQueue>,
}

/// A mounted node of the component tree, with its state type erased.
#[async_trait]
pub trait Segment: Send + Sync {
	fn key(&self) -> &ComponentCompositeKey;

	/// The DOM path of this segment's first node. Stable for the segment's lifetime.
	fn start_path(&self) -> &TreePositionPath;

	fn children(&self) -> &[Box<dyn Segment>];

	/// This segment's own top-level node paths.
	fn root_paths(&self) -> &[TreePositionPath];

	fn events(&self) -> &[EventEntry];

	fn component_events(&self) -> &[ComponentEventEntry];

	fn refs(&self) -> &HashMap<Ref, TreePositionPath>;

	/// Applies `update` if it targets this segment or one of its descendants, otherwise hands it back.
	///
	/// # Errors
	///
	/// Iff no segment in this subtree has the update's target key.
	async fn apply_update(&mut self, update: PendingUpdate, scope: &mut UpdateScope<'_>) -> Result<(), PendingUpdate>;

	/// Notifies unmounting of every segment in this subtree whose key isn't in `keep`, descendants first.
	fn unmount_except(&mut self, keep: &HashSet<ComponentCompositeKey>);

	fn unmount(&mut self) {
		self.unmount_except(&HashSet::new());
	}

	/// The top-level node paths this segment is visually responsible for, in order.
	///
	/// Descendants rendered directly at this segment's level contribute their own top-level nodes.
	/// Those nested inside one of this segment's elements are already covered by it.
	fn aggregate_root_paths(&self) -> Vec<TreePositionPath> {
		let mut paths = self.root_paths().to_vec();
		for child in self.children() {
			paths.extend(child.aggregate_root_paths());
		}
		paths.sort();
		paths.dedup();

		let mut top_level = Vec::<TreePositionPath>::with_capacity(paths.len());
		for path in paths {
			if !top_level.iter().any(|root| path.starts_with(root)) {
				top_level.push(path);
			}
		}
		top_level
	}

	fn recursive_events(&self) -> Vec<EventEntry> {
		let mut events = self.events().to_vec();
		for child in self.children() {
			events.extend(child.recursive_events());
		}
		events
	}

	fn recursive_component_events(&self) -> Vec<ComponentEventEntry> {
		let mut events = self.component_events().to_vec();
		for child in self.children() {
			events.extend(child.recursive_component_events());
		}
		events
	}

	fn recursive_refs(&self) -> HashMap<Ref, TreePositionPath> {
		let mut refs = self.refs().clone();
		for child in self.children() {
			refs.extend(child.recursive_refs());
		}
		refs
	}

	/// Keys of all descendants, not including this segment's own.
	fn recursive_child_keys(&self) -> HashSet<ComponentCompositeKey> {
		let mut keys = HashSet::new();
		for child in self.children() {
			keys.insert(child.key().clone());
			keys.extend(child.recursive_child_keys());
		}
		keys
	}
}

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Generations are unique across all segments, so a re-created segment never accepts a completion meant for its predecessor.
fn next_generation() -> u64 {
	NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// A mounted instance of a [`Component`].
pub struct ComponentSegment<S> {
	key: ComponentCompositeKey,
	start: TreePositionPath,
	state: S,
	generation: u64,
	view: View<S>,
	context_resolver: ContextResolver<S>,
	callbacks: Callbacks<S>,
	context: ComponentContext,
	handle: StateHandle<S>,
	roots: Vec<TreePositionPath>,
	events: Vec<EventEntry>,
	component_events: Vec<ComponentEventEntry>,
	refs: HashMap<Ref, TreePositionPath>,
	children: Vec<Box<dyn Segment>>,
}

impl<S: Send + Sync + 'static> ComponentSegment<S> {
	#[must_use]
	pub fn state(&self) -> &S {
		&self.state
	}

	/// Renders the view for the current state into `ctx`.
	///
	/// A panic in the view or during the pass is logged, discards what this pass added to `ctx`
	/// and leaves the segment's recorded content untouched. Returns whether rendering succeeded.
	async fn render(&mut self, ctx: &mut RenderContext) -> bool {
		let view = catch_unwind(AssertUnwindSafe(|| ((self.view)(&self.state, &self.handle), (self.context_resolver)(&self.context, &self.state))));
		let (definition, context) = match view {
			Ok(view) => view,
			Err(panic) => {
				error!(component = %self.key, "Rendering failed: {}", panic_message(&*panic));
				return false;
			}
		};

		let checkpoint = ctx.checkpoint();
		let mut record = SegmentRecord::new(ctx, self.key.component_path.clone());
		ctx.barrier();
		let rendered = AssertUnwindSafe(definition.render(ctx, &mut record, &context)).catch_unwind().await;
		if let Err(panic) = rendered {
			error!(component = %self.key, "Rendering failed: {}", panic_message(&*panic));
			ctx.rollback(checkpoint);
			for mut child in record.children {
				child.unmount_except(ctx.previously_mounted());
			}
			return false;
		}
		ctx.barrier();

		let SegmentRecord {
			roots,
			events,
			component_events,
			refs,
			children,
			..
		} = record;
		self.roots = roots;
		self.events = events;
		self.component_events = component_events;
		self.refs = refs;
		self.children = children;
		true
	}

	/// Computes the next state, or [`None`] if the update doesn't change it.
	fn next_state(&mut self, update: StateUpdate<S>) -> Option<S> {
		match update {
			StateUpdate::Set(state) => Some(state),
			StateUpdate::Transform(transform) => Some(transform(&self.state)),
			StateUpdate::TransformIfPresent(transform) => transform(&self.state),
			StateUpdate::Await(state) => {
				self.generation = next_generation();
				let generation = self.generation;
				let handle = self.handle.clone();
				match Handle::try_current() {
					Ok(runtime) => {
						runtime.spawn(async move {
							let state = state.await;
							handle.push(StateUpdate::Completed { state, generation });
						});
					}
					Err(error) => error!(component = %self.key, "Can't await a state update without a runtime: {}", error),
				}
				None
			}
			StateUpdate::Completed { state, generation } => {
				if generation == self.generation {
					Some(state)
				} else {
					debug!(component = %self.key, "Discarding a stale asynchronous state.");
					None
				}
			}
		}
	}

	#[instrument(skip(self, update, scope), fields(component = %self.key))]
	async fn update(&mut self, update: StateUpdate<S>, scope: &mut UpdateScope<'_>) {
		let new_state = match catch_unwind(AssertUnwindSafe(|| self.next_state(update))) {
			Ok(Some(state)) => state,
			Ok(None) => return trace!("No new state."),
			Err(panic) => return error!("State transformation failed: {}", panic_message(&*panic)),
		};
		self.generation = next_generation();

		let old_paths = self.aggregate_root_paths();
		let old_nodes = scope.document.nodes_at(&old_paths);
		let old_events = self.recursive_events();
		let old_keys = self.recursive_child_keys();
		let old_children = std::mem::take(&mut self.children);
		let old_state = std::mem::replace(&mut self.state, new_state);

		let mut ctx = RenderContext::new(self.start.clone(), scope.session_id.clone(), Arc::clone(scope.queue), Arc::new(old_keys));
		if !self.render(&mut ctx).await {
			self.state = old_state;
			self.children = old_children;
			return;
		}
		let new_nodes = ctx.into_roots();

		let mut changes = DomChanges::new();
		if let Err(error) = diff_children(&old_nodes, &new_nodes, &self.start, &mut changes) {
			error!("Diff failed: {}", error);
			return;
		}
		if !changes.is_empty() {
			scope.document.apply(changes.changes());
			scope.out.accept(RemoteCommand::ModifyDom(changes.changes().to_vec()));
		}

		let new_events = self.recursive_events();
		let old_set = old_events.iter().collect::<HashSet<_>>();
		let new_set = new_events.iter().collect::<HashSet<_>>();
		for forgotten in old_events.iter().filter(|event| !new_set.contains(event) && !changes.is_removed(&event.target)) {
			scope.out.accept(RemoteCommand::ForgetEvent {
				event_type: forgotten.event_type.clone(),
				path: forgotten.target.clone(),
			});
		}
		let listen = new_events
			.iter()
			.filter(|event| !old_set.contains(event) || changes.is_removed(&event.target))
			.cloned()
			.collect::<Vec<_>>();
		if !listen.is_empty() {
			scope.out.accept(RemoteCommand::ListenEvent(listen));
		}

		let keep = self.recursive_child_keys();
		for mut child in old_children {
			child.unmount_except(&keep);
		}

		if let Some(persist) = &self.callbacks.persist {
			run_callback(&self.key, "Persist", || persist(&self.key, &self.state));
		}
		if let Some(updated) = &self.callbacks.updated {
			run_callback(&self.key, "Updated", || updated(&self.key, &old_state, &self.state, &self.handle));
		}
	}
}

#[async_trait]
impl<S: Send + Sync + 'static> Segment for ComponentSegment<S> {
	fn key(&self) -> &ComponentCompositeKey {
		&self.key
	}

	fn start_path(&self) -> &TreePositionPath {
		&self.start
	}

	fn children(&self) -> &[Box<dyn Segment>] {
		&self.children
	}

	fn root_paths(&self) -> &[TreePositionPath] {
		&self.roots
	}

	fn events(&self) -> &[EventEntry] {
		&self.events
	}

	fn component_events(&self) -> &[ComponentEventEntry] {
		&self.component_events
	}

	fn refs(&self) -> &HashMap<Ref, TreePositionPath> {
		&self.refs
	}

	async fn apply_update(&mut self, update: PendingUpdate, scope: &mut UpdateScope<'_>) -> Result<(), PendingUpdate> {
		if update.target == self.key {
			match update.update.downcast::<StateUpdate<S>>() {
				Ok(update) => self.update(*update, scope).await,
				Err(_) => warn!(component = %self.key, "State update of mismatched type; Dropping."),
			}
			return Ok(());
		}

		let target = &update.target.component_path;
		match self.children.iter_mut().find(|child| target.starts_with(&child.key().component_path)) {
			Some(child) => child.apply_update(update, scope).await,
			None => Err(update),
		}
	}

	fn unmount_except(&mut self, keep: &HashSet<ComponentCompositeKey>) {
		for child in &mut self.children {
			child.unmount_except(keep);
		}
		if !keep.contains(&self.key) {
			trace!(component = %self.key, "Unmounted.");
			if let Some(unmounted) = &self.callbacks.unmounted {
				run_callback(&self.key, "Unmounted", || unmounted(&self.key, &self.state));
			}
		}
	}
}

/// Stands in for a component whose initial state couldn't be resolved. Renders nothing and ignores updates.
struct FailedSegment {
	key: ComponentCompositeKey,
	start: TreePositionPath,
	refs: HashMap<Ref, TreePositionPath>,
}

#[async_trait]
impl Segment for FailedSegment {
	fn key(&self) -> &ComponentCompositeKey {
		&self.key
	}

	fn start_path(&self) -> &TreePositionPath {
		&self.start
	}

	fn children(&self) -> &[Box<dyn Segment>] {
		&[]
	}

	fn root_paths(&self) -> &[TreePositionPath] {
		&[]
	}

	fn events(&self) -> &[EventEntry] {
		&[]
	}

	fn component_events(&self) -> &[ComponentEventEntry] {
		&[]
	}

	fn refs(&self) -> &HashMap<Ref, TreePositionPath> {
		&self.refs
	}

	async fn apply_update(&mut self, update: PendingUpdate, _: &mut UpdateScope<'_>) -> Result<(), PendingUpdate> {
		if update.target == self.key {
			debug!(component = %self.key, "Dropping an update for a component that failed to mount.");
			Ok(())
		} else {
			Err(update)
		}
	}

	fn unmount_except(&mut self, _: &HashSet<ComponentCompositeKey>) {}
}

fn run_callback(key: &ComponentCompositeKey, callback: &str, f: impl FnOnce()) {
	if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
		error!(component = %key, "{} callback panicked: {}", callback, panic_message(&*panic));
	}
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
	panic
		.downcast_ref::<&str>()
		.copied()
		.or_else(|| panic.downcast_ref::<String>().map(String::as_str))
		.unwrap_or("<non-string panic payload>")
}
