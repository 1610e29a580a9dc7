use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::key::{KeyError, ResourceKey};

/// Name of a set of keys within one registry, written `#namespace:path`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagKey(ResourceKey);

impl TagKey {
	pub fn new(location: ResourceKey) -> Self {
		Self(location)
	}

	/// Parses a tag name, with or without the leading `#`.
	pub fn parse(input: &str) -> Result<Self, KeyError> {
		ResourceKey::parse(input.strip_prefix('#').unwrap_or(input)).map(Self)
	}

	pub fn location(&self) -> &ResourceKey {
		&self.0
	}
}

impl fmt::Display for TagKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

impl fmt::Debug for TagKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("TagKey").field(&self.0.as_str()).finish()
	}
}

/// A reference to either a whole tag or a single entry.
///
/// Data sources use this as the left-hand side of every directive: a leading
/// `#` selects the tag form, anything else names one entry.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TagOrKey {
	Tag(TagKey),
	Key(ResourceKey),
}

impl TagOrKey {
	pub fn parse(input: &str) -> Result<Self, KeyError> {
		match input.strip_prefix('#') {
			Some(tag) => ResourceKey::parse(tag).map(|k| Self::Tag(TagKey(k))),
			None => ResourceKey::parse(input).map(Self::Key),
		}
	}

	pub fn is_tag(&self) -> bool {
		matches!(self, Self::Tag(_))
	}

	/// Returns the referenced location without the tag marker.
	pub fn location(&self) -> &ResourceKey {
		match self {
			Self::Tag(tag) => tag.location(),
			Self::Key(key) => key,
		}
	}
}

impl From<ResourceKey> for TagOrKey {
	fn from(key: ResourceKey) -> Self {
		Self::Key(key)
	}
}

impl From<TagKey> for TagOrKey {
	fn from(tag: TagKey) -> Self {
		Self::Tag(tag)
	}
}

impl fmt::Display for TagOrKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Tag(tag) => tag.fmt(f),
			Self::Key(key) => key.fmt(f),
		}
	}
}

impl fmt::Debug for TagOrKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Tag(tag) => f.debug_tuple("Tag").field(&tag.location().as_str()).finish(),
			Self::Key(key) => f.debug_tuple("Key").field(&key.as_str()).finish(),
		}
	}
}

impl FromStr for TagOrKey {
	type Err = KeyError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

impl Serialize for TagOrKey {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

impl<'de> Deserialize<'de> for TagOrKey {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let raw = String::deserialize(deserializer)?;
		Self::parse(&raw).map_err(serde::de::Error::custom)
	}
}
