use std::fmt;
use std::sync::Arc;

use keystone_primitives::ResourceKey;
use serde::{Deserialize, Serialize};

/// Stability marker attached to each registered entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
	#[default]
	Stable,
	Experimental,
	Deprecated,
}

/// One registered value together with its key and numeric id.
///
/// Values are shared: cloning an entry, or looking it up twice, yields the
/// same `Arc<T>`.
pub struct Entry<T> {
	key: ResourceKey,
	id: u32,
	value: Arc<T>,
	lifecycle: Lifecycle,
}

impl<T> Entry<T> {
	pub(crate) fn new(key: ResourceKey, id: u32, value: Arc<T>, lifecycle: Lifecycle) -> Self {
		Self {
			key,
			id,
			value,
			lifecycle,
		}
	}

	#[inline]
	pub fn key(&self) -> &ResourceKey {
		&self.key
	}

	#[inline]
	pub fn id(&self) -> u32 {
		self.id
	}

	#[inline]
	pub fn value(&self) -> &Arc<T> {
		&self.value
	}

	#[inline]
	pub fn lifecycle(&self) -> Lifecycle {
		self.lifecycle
	}

	pub(crate) fn with_id(&self, id: u32) -> Self {
		Self {
			key: self.key.clone(),
			id,
			value: self.value.clone(),
			lifecycle: self.lifecycle,
		}
	}
}

impl<T> Clone for Entry<T> {
	fn clone(&self) -> Self {
		self.with_id(self.id)
	}
}

impl<T> fmt::Debug for Entry<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Entry")
			.field("key", &self.key)
			.field("id", &self.id)
			.field("lifecycle", &self.lifecycle)
			.finish_non_exhaustive()
	}
}

/// Entries compare by identity: same key, same id, same value allocation.
impl<T> PartialEq for Entry<T> {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id
			&& self.key == other.key
			&& self.lifecycle == other.lifecycle
			&& Arc::ptr_eq(&self.value, &other.value)
	}
}

impl<T> Eq for Entry<T> {}
