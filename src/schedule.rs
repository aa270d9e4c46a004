//! Per-session timers.

use core::{
	fmt::{self, Display, Formatter},
	sync::atomic::{AtomicU64, Ordering},
};
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::trace;

/// An opaque key for a scheduled task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimerRef(Arc<str>);

static NEXT_TIMER: AtomicU64 = AtomicU64::new(1);

impl TimerRef {
	pub fn named(name: impl Into<Arc<str>>) -> Self {
		Self(name.into())
	}

	/// A key distinct from all other generated ones.
	#[must_use]
	pub fn unique() -> Self {
		Self(format!("#{}", NEXT_TIMER.fetch_add(1, Ordering::Relaxed)).into())
	}
}

impl Display for TimerRef {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// The running timer tasks of one session.
#[derive(Debug, Default)]
pub struct Schedules {
	timers: Mutex<HashMap<TimerRef, (u64, JoinHandle<()>)>>,
	next_id: AtomicU64,
}

impl Schedules {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// An id to tag the next inserted task with, so that it can later remove only itself.
	pub fn next_id(&self) -> u64 {
		self.next_id.fetch_add(1, Ordering::Relaxed)
	}

	/// Tracks `task` under `timer`, aborting any task already scheduled under that key.
	pub fn insert(&self, timer: TimerRef, id: u64, task: JoinHandle<()>) {
		if let Some((_, replaced)) = self.timers.lock().insert(timer, (id, task)) {
			trace!("Replacing a scheduled task.");
			replaced.abort();
		}
	}

	/// Forgets a task that completed on its own, unless it was replaced in the meantime.
	pub fn finished(&self, timer: &TimerRef, id: u64) {
		let mut timers = self.timers.lock();
		if matches!(timers.get(timer), Some((current, _)) if *current == id) {
			timers.remove(timer);
		}
	}

	/// Aborts the task under `timer`. Unknown keys are ignored.
	pub fn cancel(&self, timer: &TimerRef) {
		match self.timers.lock().remove(timer) {
			Some((_, task)) => task.abort(),
			None => trace!(%timer, "Nothing to cancel."),
		}
	}

	pub fn cancel_all(&self) {
		let mut timers = self.timers.lock();
		trace!("Cancelling {} timer(s).", timers.len());
		for (_, (_, task)) in timers.drain() {
			task.abort();
		}
	}

	#[must_use]
	pub fn is_scheduled(&self, timer: &TimerRef) -> bool {
		self.timers.lock().contains_key(timer)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.timers.lock().len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.timers.lock().is_empty()
	}
}
