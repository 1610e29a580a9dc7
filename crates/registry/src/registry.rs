//! A single keyed registry.
//!
//! # Role
//!
//! [`Registry`] owns one entry store behind a `parking_lot` lock, plus the
//! freeze flag, the generation counter that deferred references validate
//! against, lifecycle callbacks, and the data-map side table.
//!
//! # Invariants
//!
//! - Ids are strictly increasing in registration order while the registry is
//!   open, and never exceed `max_id`.
//! - A frozen registry rejects registration. Only a holder of
//!   [`RegistryAdmin`] can unfreeze it.
//! - Every clear and every freeze bumps the generation, so cached lookups
//!   taken before the change are invalidated.
//! - Callbacks run outside the store lock, in subscription order.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use arc_swap::ArcSwap;
use keystone_primitives::{ResourceKey, TagKey};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::admin::RegistryAdmin;
use crate::alias::AliasInsert;
use crate::callback::{Callbacks, OnAdd, OnBake, OnClear, RegistryCallback};
use crate::config::RegistryConfig;
use crate::entry::{Entry, Lifecycle};
use crate::error::RegistryError;
use crate::store::EntryStore;

/// Largest id any registry may hand out; ids must stay representable as a
/// non-negative `i32` so that `-1` can mean "absent".
pub const DEFAULT_MAX_ID: u32 = i32::MAX as u32 - 1;

/// Type-erased data-map tables attached to a registry, keyed by data-map id.
pub type DataMapTable = FxHashMap<ResourceKey, Arc<dyn Any + Send + Sync>>;

/// How much state [`Registry::unfreeze`] discards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearScope {
	/// Drop aliases only; entries and ids survive.
	Aliases,
	/// Drop entries, ids, aliases, tags and data maps.
	Full,
}

/// Construction parameters for a [`Registry`].
#[derive(Debug, Clone)]
pub struct RegistryBuilder {
	key: ResourceKey,
	max_id: u32,
	sync: bool,
	default_key: Option<ResourceKey>,
}

impl RegistryBuilder {
	pub fn new(key: ResourceKey) -> Self {
		Self {
			key,
			max_id: DEFAULT_MAX_ID,
			sync: false,
			default_key: None,
		}
	}

	/// Starts from the configured defaults.
	pub fn with_config(key: ResourceKey, config: &RegistryConfig) -> Self {
		Self::new(key).max_id(config.default_max_id)
	}

	/// Caps the highest id. Values above [`DEFAULT_MAX_ID`] are clamped.
	pub fn max_id(mut self, max_id: u32) -> Self {
		self.max_id = max_id.min(DEFAULT_MAX_ID);
		self
	}

	/// Marks the registry's id table as part of the synchronization payload.
	pub fn sync(mut self, sync: bool) -> Self {
		self.sync = sync;
		self
	}

	/// Entry returned by [`Registry::get_or_default`] for unknown keys.
	pub fn default_key(mut self, key: ResourceKey) -> Self {
		self.default_key = Some(key);
		self
	}

	pub fn build<T>(self) -> Registry<T> {
		Registry {
			key: self.key,
			max_id: self.max_id,
			sync: self.sync,
			default_key: self.default_key,
			store: RwLock::new(EntryStore::default()),
			frozen: AtomicBool::new(false),
			generation: AtomicU64::new(0),
			callbacks: RwLock::new(Callbacks::default()),
			data_maps: ArcSwap::from_pointee(DataMapTable::default()),
		}
	}
}

/// Keyed, id-indexed store of shared values.
pub struct Registry<T> {
	key: ResourceKey,
	max_id: u32,
	sync: bool,
	default_key: Option<ResourceKey>,
	pub(crate) store: RwLock<EntryStore<T>>,
	frozen: AtomicBool,
	generation: AtomicU64,
	callbacks: RwLock<Callbacks<T>>,
	data_maps: ArcSwap<DataMapTable>,
}

impl<T> fmt::Debug for Registry<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Registry")
			.field("key", &self.key)
			.field("len", &self.store.read().len())
			.field("frozen", &self.is_frozen())
			.field("generation", &self.generation())
			.finish_non_exhaustive()
	}
}

impl<T> Registry<T> {
	#[inline]
	pub fn key(&self) -> &ResourceKey {
		&self.key
	}

	#[inline]
	pub fn max_id(&self) -> u32 {
		self.max_id
	}

	#[inline]
	pub fn does_sync(&self) -> bool {
		self.sync
	}

	pub fn default_key(&self) -> Option<&ResourceKey> {
		self.default_key.as_ref()
	}

	#[inline]
	pub fn is_frozen(&self) -> bool {
		self.frozen.load(Ordering::Acquire)
	}

	/// Counter bumped by every clear and every freeze.
	#[inline]
	pub fn generation(&self) -> u64 {
		self.generation.load(Ordering::Acquire)
	}

	pub fn len(&self) -> usize {
		self.store.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Follows aliases from `key` to the key it currently stands for.
	pub fn resolve(&self, key: &ResourceKey) -> ResourceKey {
		self.store.read().resolve(key)
	}

	/// Looks up an entry, following aliases.
	pub fn get(&self, key: &ResourceKey) -> Option<Entry<T>> {
		self.store.read().get(key).cloned()
	}

	pub fn get_value(&self, key: &ResourceKey) -> Option<Arc<T>> {
		self.store.read().get(key).map(|e| e.value().clone())
	}

	/// Like [`Self::get`], falling back to the registry's default entry.
	pub fn get_or_default(&self, key: &ResourceKey) -> Option<Entry<T>> {
		let store = self.store.read();
		store
			.get(key)
			.or_else(|| self.default_key.as_ref().and_then(|d| store.get_exact(d)))
			.cloned()
	}

	pub fn get_by_id(&self, id: u32) -> Option<Entry<T>> {
		self.store.read().get_by_id(id).cloned()
	}

	/// Numeric id of `key` after alias resolution, or `-1` when absent.
	pub fn get_id(&self, key: &ResourceKey) -> i32 {
		self.store.read().get(key).map_or(-1, |e| e.id() as i32)
	}

	/// Exact membership test; aliases are not followed.
	pub fn contains_key(&self, key: &ResourceKey) -> bool {
		self.store.read().contains_exact(key)
	}

	/// Membership test after alias resolution.
	pub fn contains(&self, key: &ResourceKey) -> bool {
		self.store.read().get(key).is_some()
	}

	/// Registered keys in ascending id order.
	pub fn keys(&self) -> Vec<ResourceKey> {
		self.store.read().entries().map(|e| e.key().clone()).collect()
	}

	/// Registered entries in ascending id order.
	pub fn entries(&self) -> Vec<Entry<T>> {
		self.store.read().entries().cloned().collect()
	}

	pub fn aliases(&self) -> Vec<(ResourceKey, ResourceKey)> {
		self.store
			.read()
			.aliases()
			.iter()
			.map(|(from, to)| (from.clone(), to.clone()))
			.collect()
	}

	/// Replaces all tag bindings. Tags are reloadable data, so this is
	/// allowed on a frozen registry.
	pub fn bind_tags(&self, tags: impl IntoIterator<Item = (TagKey, Vec<ResourceKey>)>) {
		let tags: FxHashMap<_, _> = tags.into_iter().collect();
		tracing::debug!(registry = %self.key, tags = tags.len(), "binding tags");
		self.store.write().set_tags(tags);
	}

	/// Members of `tag`, in declaration order. Unknown tags are empty.
	pub fn tag(&self, tag: &TagKey) -> Vec<ResourceKey> {
		self.store.read().tag(tag).map(<[_]>::to_vec).unwrap_or_default()
	}

	pub fn is_in_tag(&self, key: &ResourceKey, tag: &TagKey) -> bool {
		let store = self.store.read();
		let resolved = store.resolve(key);
		store.tag(tag).is_some_and(|members| members.contains(&resolved))
	}

	pub fn tag_keys(&self) -> Vec<TagKey> {
		let mut keys: Vec<_> = self.store.read().tags().map(|(k, _)| k.clone()).collect();
		keys.sort();
		keys
	}

	pub(crate) fn tag_bindings(&self) -> Vec<(TagKey, Vec<ResourceKey>)> {
		self.store
			.read()
			.tags()
			.map(|(k, v)| (k.clone(), v.clone()))
			.collect()
	}

	/// Attached data-map table for `id`, type-erased.
	pub fn data_map_raw(&self, id: &ResourceKey) -> Option<Arc<dyn Any + Send + Sync>> {
		self.data_maps.load().get(id).cloned()
	}

	/// Ids of every data map currently attached.
	pub fn data_map_ids(&self) -> Vec<ResourceKey> {
		let mut ids: Vec<_> = self.data_maps.load().keys().cloned().collect();
		ids.sort();
		ids
	}

	/// Atomically swaps in a complete set of data-map tables. Readers see
	/// either the previous set or this one.
	pub fn replace_data_maps(&self, tables: DataMapTable) {
		self.data_maps.store(Arc::new(tables));
	}

	fn bump_generation(&self) -> u64 {
		self.generation.fetch_add(1, Ordering::AcqRel) + 1
	}
}

impl<T: Send + Sync + 'static> Registry<T> {
	/// Registers `value` under `key` at `id`.
	pub fn register(&self, key: ResourceKey, id: u32, value: T) -> Result<Entry<T>, RegistryError> {
		self.insert(key, Some(id), Arc::new(value), Lifecycle::Stable)
	}

	pub fn register_with_lifecycle(
		&self,
		key: ResourceKey,
		id: u32,
		value: T,
		lifecycle: Lifecycle,
	) -> Result<Entry<T>, RegistryError> {
		self.insert(key, Some(id), Arc::new(value), lifecycle)
	}

	/// Registers `value` at the next free id.
	pub fn register_next(&self, key: ResourceKey, value: T) -> Result<Entry<T>, RegistryError> {
		self.insert(key, None, Arc::new(value), Lifecycle::Stable)
	}

	/// Builds the value from its key and registers it at the next free id.
	pub fn register_with(
		&self,
		key: ResourceKey,
		factory: impl FnOnce(&ResourceKey) -> T,
	) -> Result<Entry<T>, RegistryError> {
		let value = factory(&key);
		self.register_next(key, value)
	}

	/// Inserts a prebuilt value. `id` of `None` takes the next free id.
	pub(crate) fn insert(
		&self,
		key: ResourceKey,
		id: Option<u32>,
		value: Arc<T>,
		lifecycle: Lifecycle,
	) -> Result<Entry<T>, RegistryError> {
		let entry = {
			let mut store = self.store.write();
			if self.is_frozen() {
				return Err(RegistryError::RegistrationAfterFreeze {
					registry: self.key.clone(),
					key,
				});
			}
			let id = id.unwrap_or_else(|| store.next_id());
			store.insert(&self.key, self.max_id, key, id, value, lifecycle)?
		};
		let hooks = self.callbacks.read().add_hooks();
		for hook in hooks {
			hook.on_add(self, entry.id(), entry.key(), entry.value());
		}
		Ok(entry)
	}

	/// Redirects lookups of `from` to `to`. Self-aliases and exact repeats
	/// are ignored.
	pub fn add_alias(&self, from: ResourceKey, to: ResourceKey) -> Result<(), RegistryError> {
		let outcome = self.store.write().add_alias(&self.key, from.clone(), to.clone())?;
		if outcome == AliasInsert::Ignored {
			tracing::debug!(registry = %self.key, %from, %to, "ignoring redundant alias");
		}
		Ok(())
	}

	/// Seals the registry. Freezing a frozen registry is a no-op.
	pub fn freeze(&self) {
		{
			let _store = self.store.write();
			if self.frozen.swap(true, Ordering::AcqRel) {
				return;
			}
		}
		let generation = self.bump_generation();
		tracing::debug!(registry = %self.key, entries = self.len(), generation, "registry frozen");
		let hooks = self.callbacks.read().bake_hooks();
		for hook in hooks {
			hook.on_bake(self);
		}
	}

	/// Reopens the registry for mutation, discarding `scope`.
	pub fn unfreeze(&self, _admin: &RegistryAdmin, scope: ClearScope) {
		self.frozen.store(false, Ordering::Release);
		self.clear(scope);
	}

	fn clear(&self, scope: ClearScope) {
		let full = scope == ClearScope::Full;
		{
			let mut store = self.store.write();
			if full {
				store.clear_all();
			} else {
				store.clear_aliases();
			}
		}
		if full {
			self.data_maps.store(Arc::default());
		}
		let generation = self.bump_generation();
		tracing::debug!(registry = %self.key, full, generation, "registry cleared");
		let hooks = self.callbacks.read().clear_hooks();
		for hook in hooks {
			hook.on_clear(self, full);
		}
	}

	pub fn subscribe(&self, callback: Arc<dyn RegistryCallback<T>>) {
		self.callbacks.write().subscribe(callback);
	}

	pub fn on_add(&self, hook: impl Fn(&Registry<T>, u32, &ResourceKey, &Arc<T>) + Send + Sync + 'static) {
		self.subscribe(Arc::new(OnAdd(Box::new(hook))));
	}

	pub fn on_bake(&self, hook: impl Fn(&Registry<T>) + Send + Sync + 'static) {
		self.subscribe(Arc::new(OnBake(Box::new(hook))));
	}

	pub fn on_clear(&self, hook: impl Fn(&Registry<T>, bool) + Send + Sync + 'static) {
		self.subscribe(Arc::new(OnClear(Box::new(hook))));
	}
}
