//! Late-bound references to registry entries.
//!
//! # Role
//!
//! A [`DeferredHolder`] names an entry by `(registry key, entry key)` and
//! binds lazily on first access. The bound entry is cached in an
//! `ArcSwapOption` slot together with the registry generation it was read
//! at; reads are lock-free until the registry is cleared or refrozen, after
//! which the next access rebinds.
//!
//! # Invariants
//!
//! - While the generation is unchanged, every successful [`DeferredHolder::get`]
//!   returns the same `Arc`.
//! - Binding is serialized by the context's bind lock, so concurrent first
//!   accesses resolve once.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use keystone_primitives::ResourceKey;

use crate::context::RegistryContext;
use crate::entry::Entry;
use crate::error::RegistryError;
use crate::registry::Registry;

struct Binding<T> {
	registry: Arc<Registry<T>>,
	entry: Entry<T>,
	generation: u64,
}

impl<T> Binding<T> {
	fn is_current(&self) -> bool {
		self.registry.generation() == self.generation
	}
}

struct HolderInner<T> {
	context: Arc<RegistryContext>,
	registry_key: ResourceKey,
	key: ResourceKey,
	slot: ArcSwapOption<Binding<T>>,
}

/// Lazily bound reference to one registry entry. Clones share the cache.
pub struct DeferredHolder<T>(Arc<HolderInner<T>>);

impl<T> Clone for DeferredHolder<T> {
	fn clone(&self) -> Self {
		Self(self.0.clone())
	}
}

impl<T: Send + Sync + 'static> DeferredHolder<T> {
	pub fn new(context: Arc<RegistryContext>, registry_key: ResourceKey, key: ResourceKey) -> Self {
		Self(Arc::new(HolderInner {
			context,
			registry_key,
			key,
			slot: ArcSwapOption::empty(),
		}))
	}

	pub fn key(&self) -> &ResourceKey {
		&self.0.key
	}

	pub fn registry_key(&self) -> &ResourceKey {
		&self.0.registry_key
	}

	/// The bound value, binding first if needed.
	pub fn get(&self) -> Result<Arc<T>, RegistryError> {
		self.binding().map(|b| b.entry.value().clone())
	}

	/// Like [`Self::get`], discarding the failure reason.
	pub fn try_get(&self) -> Option<Arc<T>> {
		self.get().ok()
	}

	/// The bound entry, including its current id.
	pub fn entry(&self) -> Result<Entry<T>, RegistryError> {
		self.binding().map(|b| b.entry.clone())
	}

	/// Current numeric id, when the entry can be bound.
	pub fn id(&self) -> Option<u32> {
		self.binding().ok().map(|b| b.entry.id())
	}

	/// Whether the entry can be bound right now. Never fails.
	pub fn is_present(&self) -> bool {
		self.binding().is_ok()
	}

	fn binding(&self) -> Result<Arc<Binding<T>>, RegistryError> {
		if let Some(binding) = self.0.slot.load_full()
			&& binding.is_current()
		{
			return Ok(binding);
		}
		self.bind()
	}

	fn bind(&self) -> Result<Arc<Binding<T>>, RegistryError> {
		let inner = &*self.0;
		let _guard = inner.context.bind_lock();
		if let Some(binding) = inner.slot.load_full()
			&& binding.is_current()
		{
			return Ok(binding);
		}

		let registry = inner
			.context
			.registry::<T>(&inner.registry_key)
			.map_err(|_| RegistryError::UnboundReference {
				registry: inner.registry_key.clone(),
				key: inner.key.clone(),
			})?;
		let generation = registry.generation();
		let Some(entry) = registry.get(&inner.key) else {
			inner.slot.store(None);
			return Err(RegistryError::MissingEntry {
				registry: inner.registry_key.clone(),
				key: inner.key.clone(),
			});
		};
		let binding = Arc::new(Binding {
			registry,
			entry,
			generation,
		});
		inner.slot.store(Some(binding.clone()));
		Ok(binding)
	}
}

impl<T> PartialEq for DeferredHolder<T> {
	fn eq(&self, other: &Self) -> bool {
		self.0.registry_key == other.0.registry_key && self.0.key == other.0.key
	}
}

impl<T> Eq for DeferredHolder<T> {}

impl<T> Hash for DeferredHolder<T> {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.0.registry_key.hash(state);
		self.0.key.hash(state);
	}
}

impl<T> fmt::Debug for DeferredHolder<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "DeferredHolder{{{}/{}}}", self.0.registry_key, self.0.key)
	}
}
