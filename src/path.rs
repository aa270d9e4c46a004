//! Positional node addresses.

use crate::error::PathError;
use core::{fmt, str::FromStr};

/// An immutable position of a node in a rendered tree.
///
/// Each element is the 1-based index of a sibling at the matching tree level,
/// so `1_2` is the second child of the first top-level node.
///
/// The empty path (level 0) addresses the virtual window node above the document.
/// It has neither a parent nor siblings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreePositionPath(Vec<u32>);

impl TreePositionPath {
	/// Separator of the string form.
	pub const SEPARATOR: char = '_';

	#[must_use]
	pub fn new(elements: Vec<u32>) -> Self {
		Self(elements)
	}

	/// The window path.
	#[must_use]
	pub fn empty() -> Self {
		Self(Vec::new())
	}

	/// Parses the separator-joined string form. The empty string is the empty path.
	///
	/// # Errors
	///
	/// Iff an element is not a positive integer.
	pub fn of(path: &str) -> Result<Self, PathError> {
		path.parse()
	}

	#[must_use]
	pub fn level(&self) -> usize {
		self.0.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	#[must_use]
	pub fn element_at(&self, i: usize) -> Option<u32> {
		self.0.get(i).copied()
	}

	#[must_use]
	pub fn last(&self) -> Option<u32> {
		self.0.last().copied()
	}

	#[must_use]
	pub fn elements(&self) -> &[u32] {
		&self.0
	}

	/// The first child position one level down.
	#[must_use]
	pub fn inc_level(&self) -> Self {
		self.add_child(1)
	}

	/// The next sibling's position.
	///
	/// # Errors
	///
	/// On the empty path.
	pub fn inc_sibling(&self) -> Result<Self, PathError> {
		let mut elements = self.0.clone();
		match elements.last_mut() {
			Some(last) => {
				*last += 1;
				Ok(Self(elements))
			}
			None => Err(PathError::NoSibling),
		}
	}

	/// # Errors
	///
	/// On the empty path.
	pub fn parent(&self) -> Result<Self, PathError> {
		match self.0.split_last() {
			Some((_, init)) => Ok(Self(init.to_vec())),
			None => Err(PathError::NoParent),
		}
	}

	/// The position of the `num`th child of this node.
	#[must_use]
	pub fn add_child(&self, num: u32) -> Self {
		let mut elements = Vec::with_capacity(self.0.len() + 1);
		elements.extend_from_slice(&self.0);
		elements.push(num);
		Self(elements)
	}

	/// Whether `self` is `ancestor` or lies below it.
	#[must_use]
	pub fn starts_with(&self, ancestor: &Self) -> bool {
		self.0.starts_with(&ancestor.0)
	}
}

impl fmt::Display for TreePositionPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (i, element) in self.0.iter().enumerate() {
			if i > 0 {
				write!(f, "{}", Self::SEPARATOR)?;
			}
			write!(f, "{}", element)?;
		}
		Ok(())
	}
}

impl FromStr for TreePositionPath {
	type Err = PathError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.is_empty() {
			return Ok(Self::empty());
		}
		s.split(Self::SEPARATOR)
			.map(|element| match element.parse::<u32>() {
				Ok(n) if n > 0 => Ok(n),
				_ => Err(PathError::InvalidElement { element: element.to_owned() }),
			})
			.collect::<Result<Vec<_>, _>>()
			.map(Self)
	}
}

impl From<Vec<u32>> for TreePositionPath {
	fn from(elements: Vec<u32>) -> Self {
		Self(elements)
	}
}

#[cfg(test)]
mod tests {
	use super::TreePositionPath;
	use crate::error::PathError;

	#[test]
	fn empty_path_has_no_parent_or_sibling() {
		let empty = TreePositionPath::empty();
		assert_eq!(empty.parent(), Err(PathError::NoParent));
		assert_eq!(empty.inc_sibling(), Err(PathError::NoSibling));
		assert_eq!(empty.to_string(), "");
	}

	#[test]
	fn rejects_zero_and_garbage() {
		assert!(TreePositionPath::of("1_0").is_err());
		assert!(TreePositionPath::of("1__2").is_err());
		assert!(TreePositionPath::of("a").is_err());
	}
}
