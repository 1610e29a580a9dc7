use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Namespace assumed when a key is written without one.
pub const DEFAULT_NAMESPACE: &str = "core";

/// Errors produced while parsing or constructing a [`ResourceKey`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
	/// The input was empty, or one of its two halves was.
	#[error("empty key: {0:?}")]
	Empty(String),
	/// The namespace contains a character outside `[a-z0-9_.-]`.
	#[error("invalid namespace {namespace:?} in key {input:?}")]
	InvalidNamespace { input: String, namespace: String },
	/// The path contains a character outside `[a-z0-9_.-/]`.
	#[error("invalid path {path:?} in key {input:?}")]
	InvalidPath { input: String, path: String },
}

/// Immutable two-part identifier: `namespace:path`.
///
/// Storage is a single shared string, so clones are a reference-count bump.
/// Ordering compares the namespace first and the path second, which is the
/// order snapshots are encoded in.
#[derive(Clone)]
pub struct ResourceKey {
	repr: Arc<str>,
	split: usize,
}

impl ResourceKey {
	/// Builds a key from its two halves.
	pub fn new(namespace: &str, path: &str) -> Result<Self, KeyError> {
		let input = format!("{namespace}:{path}");
		validate(&input, namespace, path)?;
		Ok(Self {
			split: namespace.len(),
			repr: Arc::from(input),
		})
	}

	/// Parses `namespace:path`, or a bare `path` in [`DEFAULT_NAMESPACE`].
	pub fn parse(input: &str) -> Result<Self, KeyError> {
		match input.split_once(':') {
			Some((namespace, path)) => Self::new(namespace, path),
			None => Self::new(DEFAULT_NAMESPACE, input),
		}
	}

	/// Returns the namespace half.
	#[inline]
	pub fn namespace(&self) -> &str {
		&self.repr[..self.split]
	}

	/// Returns the path half.
	#[inline]
	pub fn path(&self) -> &str {
		&self.repr[self.split + 1..]
	}

	/// Returns the full `namespace:path` form.
	#[inline]
	pub fn as_str(&self) -> &str {
		&self.repr
	}

	/// Returns a key in the same namespace with a different path.
	pub fn with_path(&self, path: &str) -> Result<Self, KeyError> {
		Self::new(self.namespace(), path)
	}
}

fn validate(input: &str, namespace: &str, path: &str) -> Result<(), KeyError> {
	if namespace.is_empty() || path.is_empty() {
		return Err(KeyError::Empty(input.to_string()));
	}
	if !namespace.bytes().all(valid_namespace_byte) {
		return Err(KeyError::InvalidNamespace {
			input: input.to_string(),
			namespace: namespace.to_string(),
		});
	}
	if !path.bytes().all(|b| b == b'/' || valid_namespace_byte(b)) {
		return Err(KeyError::InvalidPath {
			input: input.to_string(),
			path: path.to_string(),
		});
	}
	Ok(())
}

#[inline]
fn valid_namespace_byte(b: u8) -> bool {
	matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' | b'.')
}

impl PartialEq for ResourceKey {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.repr, &other.repr) || self.repr == other.repr
	}
}

impl Eq for ResourceKey {}

impl Hash for ResourceKey {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.repr.hash(state);
	}
}

impl Ord for ResourceKey {
	fn cmp(&self, other: &Self) -> Ordering {
		self.namespace()
			.cmp(other.namespace())
			.then_with(|| self.path().cmp(other.path()))
	}
}

impl PartialOrd for ResourceKey {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl fmt::Display for ResourceKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.repr)
	}
}

impl fmt::Debug for ResourceKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("ResourceKey").field(&&*self.repr).finish()
	}
}

impl FromStr for ResourceKey {
	type Err = KeyError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

impl TryFrom<&str> for ResourceKey {
	type Error = KeyError;

	fn try_from(value: &str) -> Result<Self, Self::Error> {
		Self::parse(value)
	}
}

impl Serialize for ResourceKey {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.repr)
	}
}

impl<'de> Deserialize<'de> for ResourceKey {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let raw = String::deserialize(deserializer)?;
		Self::parse(&raw).map_err(serde::de::Error::custom)
	}
}
