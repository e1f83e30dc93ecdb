//! The intermediate representation built from extracted document data.
//!
//! Nodes are immutable after construction. Every "update" goes through
//! [`set_at`], which rebuilds the spine from the root to the target and
//! shares every unchanged sibling by `Rc` reference, so multiple templates
//! can resolve against the same tree without interference.

use std::rc::Rc;

use serde_json::Value;

use crate::PathAddress;
use crate::PathSegment;
use crate::ProcessingError;

/// A node in the path-addressable IR tree.
///
/// Invariant: a child's path is its parent's path plus the child's own
/// segment. The tree is acyclic by construction — nodes are built bottom-up
/// and never rewired.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum IrNode {
	/// A leaf value: null, boolean, number, or string.
	Scalar { path: PathAddress, value: Value },
	/// A mapping with ordered entries.
	Object {
		path: PathAddress,
		entries: Vec<(String, Rc<IrNode>)>,
	},
	/// A sequence with ordered items, each tagged with its index segment.
	Array {
		path: PathAddress,
		items: Vec<Rc<IrNode>>,
	},
}

impl IrNode {
	pub fn path(&self) -> &PathAddress {
		match self {
			IrNode::Scalar { path, .. } | IrNode::Object { path, .. } | IrNode::Array { path, .. } => {
				path
			}
		}
	}

	pub fn is_scalar(&self) -> bool {
		matches!(self, IrNode::Scalar { .. })
	}

	pub fn is_array(&self) -> bool {
		matches!(self, IrNode::Array { .. })
	}
}

/// Builds IR trees from extracted document data.
pub struct IrBuilder;

impl IrBuilder {
	/// Total recursive mapping from any JSON-compatible value rooted at the
	/// empty path: mappings become Objects, sequences become Arrays, and
	/// everything else (including `null`) becomes a Scalar.
	pub fn from_data(value: &Value) -> Rc<IrNode> {
		Self::from_data_at(value, PathAddress::root())
	}

	/// Like [`IrBuilder::from_data`] but rooted at an explicit path.
	pub fn from_data_at(value: &Value, path: PathAddress) -> Rc<IrNode> {
		match value {
			Value::Object(map) => {
				let entries = map
					.iter()
					.map(|(name, child)| {
						let node = Self::from_data_at(child, path.child(name));
						(name.clone(), node)
					})
					.collect();
				Rc::new(IrNode::Object { path, entries })
			}
			Value::Array(values) => {
				let items = values
					.iter()
					.enumerate()
					.map(|(index, child)| Self::from_data_at(child, path.indexed(index)))
					.collect();
				Rc::new(IrNode::Array { path, items })
			}
			other => {
				Rc::new(IrNode::Scalar {
					path,
					value: other.clone(),
				})
			}
		}
	}
}

/// Serialize a node back into a JSON value. Inverse of
/// [`IrBuilder::from_data`].
pub fn to_value(node: &IrNode) -> Value {
	match node {
		IrNode::Scalar { value, .. } => value.clone(),
		IrNode::Object { entries, .. } => {
			Value::Object(
				entries
					.iter()
					.map(|(name, child)| (name.clone(), to_value(child)))
					.collect(),
			)
		}
		IrNode::Array { items, .. } => {
			Value::Array(items.iter().map(|item| to_value(item)).collect())
		}
	}
}

/// Resolve a path against a node.
///
/// A property segment looks up an object entry by name, an index segment
/// selects an array item, and a bare `[]` marker *broadcasts*: the remaining
/// segments resolve against every item and the successes are collected into
/// a synthetic array — `commands[].c1` is "c1 of every command".
pub fn resolve(node: &Rc<IrNode>, path: &PathAddress) -> Result<Rc<IrNode>, ProcessingError> {
	resolve_segments(node, path.segments(), path)
}

fn resolve_segments(
	node: &Rc<IrNode>,
	segments: &[PathSegment],
	full: &PathAddress,
) -> Result<Rc<IrNode>, ProcessingError> {
	let Some((segment, rest)) = segments.split_first() else {
		return Ok(Rc::clone(node));
	};

	match (segment, node.as_ref()) {
		(PathSegment::Property(name), IrNode::Object { entries, .. }) => {
			entries
				.iter()
				.find(|(entry_name, _)| entry_name == name)
				.map_or_else(
					|| Err(not_found(full)),
					|(_, child)| resolve_segments(child, rest, full),
				)
		}
		(PathSegment::Index(index), IrNode::Array { items, .. }) => {
			items
				.get(*index)
				.map_or_else(|| Err(not_found(full)), |child| resolve_segments(child, rest, full))
		}
		(PathSegment::ArrayMarker, IrNode::Array { items, .. }) => {
			let resolved = items
				.iter()
				.filter_map(|item| resolve_segments(item, rest, full).ok())
				.collect();
			Ok(Rc::new(IrNode::Array {
				path: full.clone(),
				items: resolved,
			}))
		}
		_ => Err(not_found(full)),
	}
}

/// Produce a new tree with `value` placed at `path`, sharing every untouched
/// sibling with the original. Missing object entries along the path are
/// created (upsert); missing array positions are not.
pub fn set_at(
	node: &Rc<IrNode>,
	path: &PathAddress,
	value: &Value,
) -> Result<Rc<IrNode>, ProcessingError> {
	set_segments(node, path.segments(), path, value)
}

fn set_segments(
	node: &Rc<IrNode>,
	segments: &[PathSegment],
	full: &PathAddress,
	value: &Value,
) -> Result<Rc<IrNode>, ProcessingError> {
	let Some((segment, rest)) = segments.split_first() else {
		return Ok(IrBuilder::from_data_at(value, node.path().clone()));
	};

	match (segment, node.as_ref()) {
		(PathSegment::Property(name), IrNode::Object { path, entries }) => {
			let mut entries = entries.clone();
			if let Some(slot) = entries.iter_mut().find(|(entry_name, _)| entry_name == name) {
				let updated = set_segments(&slot.1, rest, full, value)?;
				slot.1 = updated;
			} else {
				let child = build_spine(path.child(name), rest, full, value)?;
				entries.push((name.clone(), child));
			}
			Ok(Rc::new(IrNode::Object {
				path: path.clone(),
				entries,
			}))
		}
		(PathSegment::Index(index), IrNode::Array { path, items }) => {
			if *index >= items.len() {
				return Err(not_found(full));
			}
			let mut items = items.clone();
			let updated = set_segments(&items[*index], rest, full, value)?;
			items[*index] = updated;
			Ok(Rc::new(IrNode::Array {
				path: path.clone(),
				items,
			}))
		}
		(PathSegment::ArrayMarker, IrNode::Array { path, items }) => {
			let items = items
				.iter()
				.map(|item| set_segments(item, rest, full, value))
				.collect::<Result<Vec<_>, _>>()?;
			Ok(Rc::new(IrNode::Array {
				path: path.clone(),
				items,
			}))
		}
		_ => Err(not_found(full)),
	}
}

/// Build the chain of single-entry objects for the not-yet-existing part of
/// an upserted path.
fn build_spine(
	path: PathAddress,
	segments: &[PathSegment],
	full: &PathAddress,
	value: &Value,
) -> Result<Rc<IrNode>, ProcessingError> {
	match segments.split_first() {
		None => Ok(IrBuilder::from_data_at(value, path)),
		Some((PathSegment::Property(name), rest)) => {
			let child = build_spine(path.child(name), rest, full, value)?;
			Ok(Rc::new(IrNode::Object {
				path,
				entries: vec![(name.clone(), child)],
			}))
		}
		// An index or marker below a missing property has nothing to
		// address.
		Some(_) => Err(not_found(full)),
	}
}

/// Look up a dotted path directly in a JSON value. Used for reading
/// frontmatter data before any IR exists.
pub fn value_at<'v>(value: &'v Value, path: &PathAddress) -> Option<&'v Value> {
	let mut current = value;
	for segment in path.segments() {
		current = match (segment, current) {
			(PathSegment::Property(name), Value::Object(map)) => map.get(name)?,
			(PathSegment::Index(index), Value::Array(items)) => items.get(*index)?,
			_ => return None,
		};
	}
	Some(current)
}

fn not_found(path: &PathAddress) -> ProcessingError {
	ProcessingError::PathNotFound {
		path: path.to_string(),
	}
}
