use std::fmt::Display;
use std::str::FromStr;

use derive_more::Deref;

use crate::PathParseError;

/// A single step in a [`PathAddress`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PathSegment {
	/// A named property lookup, e.g. the `name` in `commands[].name`.
	Property(String),
	/// An explicit array index, e.g. `[0]`.
	Index(usize),
	/// `[]` — broadcasts over every item of an array.
	ArrayMarker,
}

/// An addressable property path such as `commands[].name` or `meta.tags[0]`.
///
/// The canonical string form round-trips: parsing a displayed path yields an
/// equal address. The empty path addresses the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deref)]
pub struct PathAddress(
	#[deref]
	Vec<PathSegment>,
);

impl PathAddress {
	/// The root (empty) path.
	pub fn root() -> Self {
		Self::default()
	}

	pub fn new(segments: Vec<PathSegment>) -> Self {
		Self(segments)
	}

	pub fn parse(path: impl AsRef<str>) -> Result<Self, PathParseError> {
		path.as_ref().parse()
	}

	pub fn is_root(&self) -> bool {
		self.0.is_empty()
	}

	pub fn segments(&self) -> &[PathSegment] {
		&self.0
	}

	/// Extend with a named property segment.
	pub fn child(&self, name: impl Into<String>) -> Self {
		let mut segments = self.0.clone();
		segments.push(PathSegment::Property(name.into()));
		Self(segments)
	}

	/// Extend with an explicit index segment.
	pub fn indexed(&self, index: usize) -> Self {
		let mut segments = self.0.clone();
		segments.push(PathSegment::Index(index));
		Self(segments)
	}

	/// Extend with a `[]` broadcast segment.
	pub fn marker(&self) -> Self {
		let mut segments = self.0.clone();
		segments.push(PathSegment::ArrayMarker);
		Self(segments)
	}

	pub fn join(&self, other: &PathAddress) -> Self {
		let mut segments = self.0.clone();
		segments.extend(other.0.iter().cloned());
		Self(segments)
	}

	pub fn starts_with(&self, prefix: &PathAddress) -> bool {
		self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
	}

	pub fn strip_prefix(&self, prefix: &PathAddress) -> Option<Self> {
		self.starts_with(prefix)
			.then(|| Self(self.0[prefix.0.len()..].to_vec()))
	}

	/// Relativize an absolute address to a single item of the collection
	/// array at `collection`. `commands[].tags` relative to `commands` is
	/// `tags`; paths not addressed through the collection's items yield
	/// `None`.
	pub fn item_relative(&self, collection: &PathAddress) -> Option<Self> {
		let rest = self.strip_prefix(collection)?;
		match rest.0.split_first() {
			Some((PathSegment::ArrayMarker, tail)) => Some(Self(tail.to_vec())),
			_ => None,
		}
	}
}

impl Display for PathAddress {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		for (index, segment) in self.0.iter().enumerate() {
			match segment {
				PathSegment::Property(name) => {
					if index > 0 {
						write!(f, ".")?;
					}
					write!(f, "{name}")?;
				}
				PathSegment::Index(i) => write!(f, "[{i}]")?,
				PathSegment::ArrayMarker => write!(f, "[]")?,
			}
		}
		Ok(())
	}
}

impl FromStr for PathAddress {
	type Err = PathParseError;

	fn from_str(path: &str) -> Result<Self, Self::Err> {
		let error = |reason: &str| PathParseError {
			path: path.to_string(),
			reason: reason.to_string(),
		};

		let mut segments = Vec::new();
		let mut rest = path;
		let mut first = true;

		while !rest.is_empty() {
			if let Some(bracketed) = rest.strip_prefix('[') {
				let Some(end) = bracketed.find(']') else {
					return Err(error("unclosed `[`"));
				};
				let inner = &bracketed[..end];
				if inner.is_empty() {
					segments.push(PathSegment::ArrayMarker);
				} else {
					let index = inner
						.parse::<usize>()
						.map_err(|_| error("array index must be a non-negative integer"))?;
					segments.push(PathSegment::Index(index));
				}
				rest = &bracketed[end + 1..];
				first = false;
				continue;
			}

			let name_start = if first {
				rest
			} else if let Some(stripped) = rest.strip_prefix('.') {
				stripped
			} else {
				return Err(error("expected `.` or `[` between segments"));
			};

			let end = name_start
				.find(['.', '['])
				.unwrap_or(name_start.len());
			let name = &name_start[..end];
			if name.is_empty() {
				return Err(error("empty property name"));
			}
			if !name
				.chars()
				.all(|c| c.is_alphanumeric() || c == '_' || c == '-')
			{
				return Err(error("property names may only contain alphanumerics, `_`, and `-`"));
			}

			segments.push(PathSegment::Property(name.to_string()));
			rest = &name_start[end..];
			first = false;
		}

		Ok(Self(segments))
	}
}
