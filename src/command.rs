//! Outbound commands and the sinks that consume them.

use crate::{diff::DomChange, event::EventEntry, path::TreePositionPath, wire};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{instrument, trace};

/// The closed set of commands sent to the remote client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCommand {
	SetRenderNum(u32),
	ListenEvent(Vec<EventEntry>),
	ForgetEvent { event_type: String, path: TreePositionPath },
	ExtractProperty { descriptor: u32, path: TreePositionPath, name: String },
	ModifyDom(Vec<DomChange>),
	PushHistory(String),
	SetHref(String),
	EvalJs { descriptor: u32, code: String },
}

/// Consumes [`RemoteCommand`]s in emission order.
///
/// Delivery failures are the implementor's concern.
pub trait RemoteOut: Send + Sync {
	fn accept(&self, command: RemoteCommand);
}

impl<F: Fn(RemoteCommand) + Send + Sync> RemoteOut for F {
	fn accept(&self, command: RemoteCommand) {
		self(command);
	}
}

/// Buffers commands until the transport is known, then forwards them.
#[derive(Default)]
pub struct BufferedRemoteOut {
	state: Mutex<Buffered>,
}

enum Buffered {
	Buffering(Vec<RemoteCommand>),
	Redirected(Arc<dyn RemoteOut>),
}

impl Default for Buffered {
	fn default() -> Self {
		Self::Buffering(Vec::new())
	}
}

impl BufferedRemoteOut {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Flushes buffered commands into `sink`, in order, and forwards all later ones directly.
	///
	/// Redirecting again switches sinks.
	#[instrument(skip(self, sink))]
	pub fn redirect(&self, sink: Arc<dyn RemoteOut>) {
		let mut state = self.state.lock();
		if let Buffered::Buffering(buffered) = &mut *state {
			trace!("Flushing {} buffered command(s).", buffered.len());
			for command in buffered.drain(..) {
				sink.accept(command);
			}
		}
		*state = Buffered::Redirected(sink);
	}

	#[must_use]
	pub fn buffered_len(&self) -> usize {
		match &*self.state.lock() {
			Buffered::Buffering(buffered) => buffered.len(),
			Buffered::Redirected(_) => 0,
		}
	}
}

impl RemoteOut for BufferedRemoteOut {
	fn accept(&self, command: RemoteCommand) {
		match &mut *self.state.lock() {
			Buffered::Buffering(buffered) => buffered.push(command),
			Buffered::Redirected(sink) => sink.accept(command),
		}
	}
}

/// Encodes each command into its wire form and hands it to `send`.
///
/// Commands that encode to nothing are dropped.
pub struct WireRemoteOut<F> {
	send: F,
}

impl<F: Fn(String) + Send + Sync> WireRemoteOut<F> {
	pub fn new(send: F) -> Self {
		Self { send }
	}
}

impl<F: Fn(String) + Send + Sync> RemoteOut for WireRemoteOut<F> {
	fn accept(&self, command: RemoteCommand) {
		if let Some(message) = wire::encode(&command) {
			(self.send)(message);
		}
	}
}
