use std::collections::BTreeMap;
use std::sync::Arc;

use keystone_primitives::ResourceKey;
use keystone_registry::Registry;

use crate::kind::DataMapType;

/// The committed values of one data map for one registry, keyed by the
/// canonical entry key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataMap<A> {
	values: BTreeMap<ResourceKey, A>,
}

impl<A> Default for DataMap<A> {
	fn default() -> Self {
		Self { values: BTreeMap::new() }
	}
}

impl<A> DataMap<A> {
	pub(crate) fn new(values: BTreeMap<ResourceKey, A>) -> Self {
		Self { values }
	}

	pub(crate) fn values(&self) -> &BTreeMap<ResourceKey, A> {
		&self.values
	}

	pub fn get(&self, key: &ResourceKey) -> Option<&A> {
		self.values.get(key)
	}

	pub fn contains(&self, key: &ResourceKey) -> bool {
		self.values.contains_key(key)
	}

	pub fn len(&self) -> usize {
		self.values.len()
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}

	/// Entries in key order.
	pub fn iter(&self) -> impl Iterator<Item = (&ResourceKey, &A)> {
		self.values.iter()
	}
}

/// Typed access to the data maps attached to a registry.
pub trait DataMapAccess<R> {
	/// The committed table for `data_map`, if one has been loaded or synced.
	fn data_map<A: Send + Sync + 'static>(&self, data_map: &DataMapType<R, A>) -> Option<Arc<DataMap<A>>>;

	/// The value `data_map` attaches to `key`, following aliases.
	fn data<A: Clone + Send + Sync + 'static>(&self, data_map: &DataMapType<R, A>, key: &ResourceKey) -> Option<A>;
}

impl<R: Send + Sync + 'static> DataMapAccess<R> for Registry<R> {
	fn data_map<A: Send + Sync + 'static>(&self, data_map: &DataMapType<R, A>) -> Option<Arc<DataMap<A>>> {
		self.data_map_raw(data_map.id())?.downcast::<DataMap<A>>().ok()
	}

	fn data<A: Clone + Send + Sync + 'static>(&self, data_map: &DataMapType<R, A>, key: &ResourceKey) -> Option<A> {
		self.data_map(data_map)?.get(&self.resolve(key)).cloned()
	}
}
