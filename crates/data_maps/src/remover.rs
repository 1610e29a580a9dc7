//! Partial removal of data-map values.
//!
//! A plain removal deletes whatever an entry has accumulated. A data map that
//! declares a remover lets sources pass parameters instead; the remover turns
//! the old value into a new one, or into nothing.

use std::collections::{BTreeMap, BTreeSet};

use keystone_primitives::TagOrKey;
use keystone_registry::Registry;
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Computes what is left of `value` after a removal directive.
///
/// `source` is the reference the current value was last written through.
/// Returning `None` drops the entry's value entirely.
pub trait DataMapValueRemover<R, A>: Send + Sync {
	fn remove(&self, value: A, registry: &Registry<R>, source: &TagOrKey, entry: &R) -> Option<A>;
}

pub(crate) type RemoverDecoder<R, A> = fn(serde_json::Value) -> Result<Box<dyn DataMapValueRemover<R, A>>, serde_json::Error>;

pub(crate) fn decode_remover<R, A, VR>(params: serde_json::Value) -> Result<Box<dyn DataMapValueRemover<R, A>>, serde_json::Error>
where
	VR: DataMapValueRemover<R, A> + DeserializeOwned + 'static,
{
	Ok(Box::new(serde_json::from_value::<VR>(params)?))
}

/// Removes the listed keys from a map value. Written as an array of keys.
///
/// An emptied map removes the value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct MapKeysRemover<K> {
	keys: Vec<K>,
}

impl<K> MapKeysRemover<K> {
	pub fn new(keys: Vec<K>) -> Self {
		Self { keys }
	}
}

impl<R, K, V> DataMapValueRemover<R, BTreeMap<K, V>> for MapKeysRemover<K>
where
	K: Ord + Send + Sync,
{
	fn remove(&self, mut value: BTreeMap<K, V>, _: &Registry<R>, _: &TagOrKey, _: &R) -> Option<BTreeMap<K, V>> {
		for key in &self.keys {
			value.remove(key);
		}
		(!value.is_empty()).then_some(value)
	}
}

/// Removes the listed elements from a list or set value. Written as an
/// array of elements.
///
/// An emptied collection removes the value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ValuesRemover<V> {
	values: Vec<V>,
}

impl<V> ValuesRemover<V> {
	pub fn new(values: Vec<V>) -> Self {
		Self { values }
	}
}

impl<R, V> DataMapValueRemover<R, Vec<V>> for ValuesRemover<V>
where
	V: PartialEq + Send + Sync,
{
	fn remove(&self, mut value: Vec<V>, _: &Registry<R>, _: &TagOrKey, _: &R) -> Option<Vec<V>> {
		value.retain(|element| !self.values.contains(element));
		(!value.is_empty()).then_some(value)
	}
}

impl<R, V> DataMapValueRemover<R, BTreeSet<V>> for ValuesRemover<V>
where
	V: Ord + Send + Sync,
{
	fn remove(&self, mut value: BTreeSet<V>, _: &Registry<R>, _: &TagOrKey, _: &R) -> Option<BTreeSet<V>> {
		for element in &self.values {
			value.remove(element);
		}
		(!value.is_empty()).then_some(value)
	}
}
