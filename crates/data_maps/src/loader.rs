//! Loading data maps from packs.
//!
//! # Purpose
//!
//! Turns the files of a [`PackSet`] into committed [`DataMap`] tables on the
//! registries of a [`RegistryContext`].
//!
//! # Mental Model
//!
//! Loading is two steps with a hand-off between them:
//!
//! 1. [`DataMapLoader::collect`] lists, reads and decodes every source on a
//!    rayon pool. Files keep their pack order. The output is an immutable
//!    [`CollectedDataMaps`] value.
//! 2. [`DataMapLoader::apply`] runs on the thread that owns the registries.
//!    For every declared data map it resolves references against the
//!    registry, folds the files in order, fills defaults and commits all of
//!    the registry's tables in one swap.
//!
//! Dropping a [`CollectedDataMaps`] without applying it discards the load.
//!
//! # Failure policy
//!
//! A file that cannot be read or decoded is logged and skipped. Files for
//! undeclared data maps or for registries missing from the context are
//! warned about and skipped. References to unknown entries are warned about
//! and ignored.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use keystone_primitives::{DEFAULT_NAMESPACE, ResourceKey, TagOrKey};
use keystone_registry::{DataMapConfig, DataMapTable, Registry, RegistryContext};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tracing::{debug, error, warn};

use crate::condition::ConditionContext;
use crate::error::{DataMapError, FileError};
use crate::file::DataMapFile;
use crate::kind::{DataMapType, DataMapTypes, ErasedDataMapType};
use crate::map::DataMap;
use crate::pack::{Pack, PackSet};

/// Folder name of a registry's data maps: its path, prefixed by its
/// namespace unless that is the default one.
pub fn registry_folder(registry: &ResourceKey) -> String {
	if registry.namespace() == DEFAULT_NAMESPACE {
		registry.path().to_string()
	} else {
		format!("{}/{}", registry.namespace(), registry.path())
	}
}

/// Decoded sources waiting to be applied, grouped by registry and data map
/// in pack order.
#[derive(Default)]
pub struct CollectedDataMaps {
	files: FxHashMap<(ResourceKey, ResourceKey), Vec<Box<dyn Any + Send>>>,
}

impl CollectedDataMaps {
	/// Number of decoded files for `id` on `registry`.
	pub fn file_count(&self, registry: &ResourceKey, id: &ResourceKey) -> usize {
		self.files
			.get(&(registry.clone(), id.clone()))
			.map_or(0, Vec::len)
	}

	pub fn is_empty(&self) -> bool {
		self.files.is_empty()
	}

	fn push(&mut self, registry: ResourceKey, id: ResourceKey, file: Box<dyn Any + Send>) {
		self.files.entry((registry, id)).or_default().push(file);
	}

	fn take(&mut self, registry: &ResourceKey, id: &ResourceKey) -> Vec<Box<dyn Any + Send>> {
		self.files
			.remove(&(registry.clone(), id.clone()))
			.unwrap_or_default()
	}
}

struct Job {
	registry: ResourceKey,
	data_map: Arc<dyn ErasedDataMapType>,
	pack: Arc<dyn Pack>,
	location: ResourceKey,
}

impl Job {
	fn decode(&self, conditions: &ConditionContext) -> Result<Box<dyn Any + Send>, DataMapError> {
		let contents = self.pack.read(&self.location).map_err(|error| DataMapError::Read {
			location: self.describe(),
			error,
		})?;
		let malformed = |error: FileError| DataMapError::Malformed {
			location: self.describe(),
			error,
		};
		let json: serde_json::Value = serde_json::from_str(&contents).map_err(|e| malformed(e.into()))?;
		self.data_map.decode_file(json, conditions).map_err(malformed)
	}

	fn describe(&self) -> String {
		format!("{}/{}", self.pack.name(), self.location)
	}
}

pub struct DataMapLoader {
	types: Arc<DataMapTypes>,
	folder: String,
	threads: usize,
	conditions: ConditionContext,
}

impl DataMapLoader {
	pub fn new(types: Arc<DataMapTypes>, config: &DataMapConfig) -> Self {
		Self {
			types,
			folder: config.folder.clone(),
			threads: config.threads,
			conditions: ConditionContext::new(config.loaded_namespaces.iter().cloned()),
		}
	}

	pub fn types(&self) -> &Arc<DataMapTypes> {
		&self.types
	}

	/// Collects, then applies on the calling thread.
	pub fn load(&self, context: &RegistryContext, packs: &PackSet) -> Result<usize, DataMapError> {
		let collected = self.collect(context, packs)?;
		Ok(self.apply(context, collected))
	}

	/// Reads and decodes every data-map source in `packs`.
	///
	/// Only fails when the worker pool cannot be started.
	pub fn collect(&self, context: &RegistryContext, packs: &PackSet) -> Result<CollectedDataMaps, DataMapError> {
		let mut folders: Vec<(String, ResourceKey)> = context
			.registry_keys()
			.into_iter()
			.map(|key| (registry_folder(&key), key))
			.collect();
		// Longest first, so `mod/gem` wins over `mod` for nested registries.
		folders.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

		let mut jobs = Vec::new();
		for pack in packs.iter() {
			let locations = match pack.list(&self.folder) {
				Ok(locations) => locations,
				Err(error) => {
					error!(pack = pack.name(), %error, "failed to list data map sources");
					continue;
				}
			};
			for location in locations {
				let Some((registry, id)) = self.route(&folders, pack.name(), &location) else {
					continue;
				};
				let Some(data_map) = self.types.get(&registry, &id) else {
					warn!(pack = pack.name(), registry = %registry, data_map = %id, "data map is not declared; skipping");
					continue;
				};
				jobs.push(Job {
					registry,
					data_map: data_map.clone(),
					pack: pack.clone(),
					location,
				});
			}
		}

		let conditions = &self.conditions;
		let decode = move || {
			jobs.into_par_iter()
				.map(|job| {
					let result = job.decode(conditions);
					(job, result)
				})
				.collect::<Vec<_>>()
		};
		let decoded = if self.threads == 0 {
			decode()
		} else {
			rayon::ThreadPoolBuilder::new()
				.num_threads(self.threads)
				.thread_name(|i| format!("data-maps-{i}"))
				.build()?
				.install(decode)
		};

		let mut collected = CollectedDataMaps::default();
		for (job, result) in decoded {
			match result {
				Ok(file) => collected.push(job.registry, job.data_map.id().clone(), file),
				Err(error) => error!(%error, "skipping data map file"),
			}
		}
		debug!(files = collected.files.values().map(Vec::len).sum::<usize>(), "collected data map sources");
		Ok(collected)
	}

	/// Splits `<folder>/<registry folder>/<path>.json` into the registry and
	/// the data map id `<namespace>:<path>`.
	fn route(&self, folders: &[(String, ResourceKey)], pack: &str, location: &ResourceKey) -> Option<(ResourceKey, ResourceKey)> {
		let rest = location
			.path()
			.strip_prefix(self.folder.as_str())?
			.strip_prefix('/')?
			.strip_suffix(".json")?;
		let Some((folder, registry)) = folders.iter().find(|(folder, _)| {
			rest.strip_prefix(folder.as_str())
				.is_some_and(|tail| tail.len() > 1 && tail.starts_with('/'))
		}) else {
			warn!(pack, file = %location, "data map file targets an unknown registry; skipping");
			return None;
		};
		match location.with_path(&rest[folder.len() + 1..]) {
			Ok(id) => Some((registry.clone(), id)),
			Err(error) => {
				warn!(pack, file = %location, %error, "invalid data map id; skipping");
				None
			}
		}
	}

	/// Builds and commits every declared data map. Returns the number of
	/// tables committed.
	///
	/// Each registry's tables are swapped in together; data maps without any
	/// source still commit, holding only their defaults.
	pub fn apply(&self, context: &RegistryContext, mut collected: CollectedDataMaps) -> usize {
		for data_map in self.types.iter() {
			if context.registry_dyn(data_map.registry_key()).is_none() {
				warn!(registry = %data_map.registry_key(), data_map = %data_map.id(), "data map declared for an unknown registry");
			}
		}

		let mut committed = 0;
		for registry in context.ordered() {
			let mut tables = DataMapTable::default();
			for data_map in self.types.for_registry(registry.key()) {
				let files = collected.take(registry.key(), data_map.id());
				if let Some(table) = data_map.build(context, files) {
					tables.insert(data_map.id().clone(), table);
				}
			}
			if tables.is_empty() {
				continue;
			}
			debug!(registry = %registry.key(), count = tables.len(), "committing data maps");
			committed += tables.len();
			registry.replace_data_maps(tables);
		}
		committed
	}
}

/// Folds `files` in order into the final table for `data_map`.
pub(crate) fn build_data_map<R, A>(
	data_map: &DataMapType<R, A>,
	registry: &Registry<R>,
	files: impl IntoIterator<Item = DataMapFile<R, A>>,
) -> DataMap<A>
where
	R: Send + Sync + 'static,
	A: Clone,
{
	let mut values: BTreeMap<ResourceKey, (A, TagOrKey)> = BTreeMap::new();

	for file in files {
		if file.replace {
			values.clear();
		}

		for (source, entry) in file.values {
			let Some(entry) = entry else {
				continue;
			};
			for key in resolve_targets(registry, data_map.id(), &source) {
				let incoming = entry.value.clone();
				let value = match values.remove(&key) {
					Some((existing, existing_source)) if !entry.replace => {
						data_map
							.merger()
							.merge(registry, &existing_source, existing, &source, incoming)
					}
					_ => incoming,
				};
				values.insert(key, (value, source.clone()));
			}
		}

		for removal in file.removals {
			for key in resolve_targets(registry, data_map.id(), &removal.source) {
				let Some((existing, existing_source)) = values.remove(&key) else {
					continue;
				};
				let Some(remover) = &removal.remover else {
					continue;
				};
				let Some(entry) = registry.get_value(&key) else {
					values.insert(key, (existing, existing_source));
					continue;
				};
				if let Some(kept) = remover.remove(existing, registry, &existing_source, &entry) {
					values.insert(key, (kept, existing_source));
				}
			}
		}
	}

	if data_map.has_default() {
		for entry in registry.entries() {
			if values.contains_key(entry.key()) {
				continue;
			}
			if let Some(value) = data_map.default_for(entry.value()) {
				values.insert(entry.key().clone(), (value, TagOrKey::Key(entry.key().clone())));
			}
		}
	}

	DataMap::new(values.into_iter().map(|(key, (value, _))| (key, value)).collect())
}

/// Canonical keys a reference denotes. Tag members and keys go through
/// alias resolution; keys that match no entry are reported.
fn resolve_targets<R>(registry: &Registry<R>, data_map: &ResourceKey, source: &TagOrKey) -> Vec<ResourceKey> {
	match source {
		TagOrKey::Tag(tag) => {
			let mut members: Vec<_> = registry
				.tag(tag)
				.iter()
				.map(|member| registry.resolve(member))
				.filter(|member| registry.contains_key(member))
				.collect();
			members.sort();
			members.dedup();
			members
		}
		TagOrKey::Key(key) => {
			let resolved = registry.resolve(key);
			if registry.contains_key(&resolved) {
				vec![resolved]
			} else {
				warn!(registry = %registry.key(), data_map = %data_map, key = %key, "data map references an unknown entry");
				Vec::new()
			}
		}
	}
}

#[cfg(test)]
mod tests;
