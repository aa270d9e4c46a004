use crate::path::TreePositionPath;
use thiserror::Error;

/// Navigation and parsing failures of [`TreePositionPath`].
///
/// Navigating away from the empty (window) path indicates a structural bug in a view or in the diff recursion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
	#[error("the empty path has no parent")]
	NoParent,
	#[error("the empty path has no siblings")]
	NoSibling,
	#[error("invalid path element {element:?}, expected a positive integer")]
	InvalidElement { element: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiffError {
	#[error("malformed path navigation while diffing: {0}")]
	Path(#[from] PathError),
}

/// Failures of requests answered by the remote client, reported through [`Reply`](`crate::context::Reply`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
	#[error("the ref is not attached to any rendered node")]
	UnresolvedRef,
	#[error("property request {descriptor} found no value")]
	PropertyNotFound { descriptor: u32 },
	#[error("script evaluation {descriptor} failed: {message}")]
	EvalFailed { descriptor: u32, message: String },
	#[error("the session closed before a reply arrived")]
	SessionClosed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageError {
	#[error("the page is already mounted")]
	AlreadyMounted,
	#[error("the page has been shut down")]
	ShutDown,
	#[error("no component segment at {path}")]
	NotFound { path: TreePositionPath },
}
