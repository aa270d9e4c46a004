use core::sync::atomic::{AtomicU64, Ordering};

/// An opaque handle a view attaches to a node, to address that node after render.
///
/// Refs are plain identities. Which node one points at is recorded anew on every render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ref(u64);

static NEXT_REF: AtomicU64 = AtomicU64::new(1);

impl Ref {
	/// Always resolves to the window (the empty path).
	pub const WINDOW: Self = Self(0);

	#[must_use]
	#[allow(clippy::new_without_default)]
	pub fn new() -> Self {
		Self(NEXT_REF.fetch_add(1, Ordering::Relaxed))
	}

	#[must_use]
	pub fn is_window(self) -> bool {
		self == Self::WINDOW
	}
}
