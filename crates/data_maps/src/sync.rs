//! Sending committed data maps to peers.
//!
//! Before sending anything, both sides exchange their [`KnownDataMaps`] and
//! [`negotiate`] the set to transfer. A connection fails when either side
//! declares a mandatory data map the other lacks.

use std::collections::BTreeMap;

use keystone_primitives::ResourceKey;
use keystone_registry::{DataMapTable, RegistryContext};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{DataMapError, NegotiationError};
use crate::kind::DataMapTypes;

/// Synced data maps per registry, with whether each is mandatory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownDataMaps {
	registries: BTreeMap<ResourceKey, BTreeMap<ResourceKey, bool>>,
}

impl KnownDataMaps {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&mut self, registry: ResourceKey, id: ResourceKey, mandatory: bool) {
		self.registries.entry(registry).or_default().insert(id, mandatory);
	}

	pub fn contains(&self, registry: &ResourceKey, id: &ResourceKey) -> bool {
		self.registries.get(registry).is_some_and(|ids| ids.contains_key(id))
	}

	pub fn is_mandatory(&self, registry: &ResourceKey, id: &ResourceKey) -> bool {
		self.registries
			.get(registry)
			.and_then(|ids| ids.get(id))
			.copied()
			.unwrap_or(false)
	}

	pub fn len(&self) -> usize {
		self.registries.values().map(BTreeMap::len).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// `(registry, id, mandatory)` in key order.
	pub fn iter(&self) -> impl Iterator<Item = (&ResourceKey, &ResourceKey, bool)> {
		self.registries
			.iter()
			.flat_map(|(registry, ids)| ids.iter().map(move |(id, mandatory)| (registry, id, *mandatory)))
	}

	pub fn encode(&self) -> Result<Vec<u8>, DataMapError> {
		Ok(postcard::to_stdvec(self)?)
	}

	pub fn decode(bytes: &[u8]) -> Result<Self, DataMapError> {
		Ok(postcard::from_bytes(bytes)?)
	}
}

/// Data maps both sides know. A data map is mandatory in the result when
/// either side marks it so.
pub fn negotiate(ours: &KnownDataMaps, theirs: &KnownDataMaps) -> Result<KnownDataMaps, NegotiationError> {
	let missing = |from: &KnownDataMaps, other: &KnownDataMaps| -> Vec<(ResourceKey, ResourceKey)> {
		from.iter()
			.filter(|(registry, id, mandatory)| *mandatory && !other.contains(registry, id))
			.map(|(registry, id, _)| (registry.clone(), id.clone()))
			.collect()
	};
	let missing_remote = missing(ours, theirs);
	let missing_local = missing(theirs, ours);
	if !missing_remote.is_empty() || !missing_local.is_empty() {
		return Err(NegotiationError {
			missing_remote,
			missing_local,
		});
	}

	let mut common = KnownDataMaps::new();
	for (registry, id, mandatory) in ours.iter() {
		if theirs.contains(registry, id) {
			common.insert(registry.clone(), id.clone(), mandatory || theirs.is_mandatory(registry, id));
		}
	}
	Ok(common)
}

/// Encoded tables of one registry's synced data maps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataMapSyncPayload {
	pub registry: ResourceKey,
	pub tables: BTreeMap<ResourceKey, Vec<u8>>,
}

impl DataMapSyncPayload {
	pub fn encode(&self) -> Result<Vec<u8>, DataMapError> {
		Ok(postcard::to_stdvec(self)?)
	}

	pub fn decode(bytes: &[u8]) -> Result<Self, DataMapError> {
		Ok(postcard::from_bytes(bytes)?)
	}
}

impl DataMapTypes {
	/// Synced data maps, as advertised to peers.
	pub fn known(&self) -> KnownDataMaps {
		let mut known = KnownDataMaps::new();
		for data_map in self.iter() {
			if let Some(mandatory) = data_map.sync_mode() {
				known.insert(data_map.registry_key().clone(), data_map.id().clone(), mandatory);
			}
		}
		known
	}

	/// One payload per registry holding committed tables of data maps in
	/// `accepted`. Registries with nothing to send are left out.
	pub fn sync_payloads(&self, context: &RegistryContext, accepted: &KnownDataMaps) -> Result<Vec<DataMapSyncPayload>, DataMapError> {
		let mut payloads = Vec::new();
		for registry in context.ordered() {
			let mut tables = BTreeMap::new();
			for data_map in self.for_registry(registry.key()) {
				if !accepted.contains(registry.key(), data_map.id()) {
					continue;
				}
				let Some(table) = registry.data_map_raw(data_map.id()) else {
					continue;
				};
				if let Some(bytes) = data_map.encode_table(table) {
					tables.insert(data_map.id().clone(), bytes?);
				}
			}
			if !tables.is_empty() {
				payloads.push(DataMapSyncPayload {
					registry: registry.key().clone(),
					tables,
				});
			}
		}
		Ok(payloads)
	}

	/// Installs received tables on the matching registry, keeping its other
	/// tables. Every table is decoded before the registry is touched.
	pub fn apply_sync_payload(&self, context: &RegistryContext, payload: &DataMapSyncPayload) -> Result<usize, DataMapError> {
		let registry = context
			.registry_dyn(&payload.registry)
			.ok_or_else(|| DataMapError::UnknownRegistry(payload.registry.clone()))?;

		let mut received = Vec::with_capacity(payload.tables.len());
		for (id, bytes) in &payload.tables {
			let Some(data_map) = self.get(&payload.registry, id) else {
				warn!(registry = %payload.registry, data_map = %id, "received an undeclared data map; skipping");
				continue;
			};
			let Some(table) = data_map.decode_table(bytes) else {
				warn!(registry = %payload.registry, data_map = %id, "received a data map that is not synced; skipping");
				continue;
			};
			received.push((id.clone(), table?));
		}

		let mut tables: DataMapTable = registry
			.data_map_ids()
			.into_iter()
			.filter_map(|id| registry.data_map_raw(&id).map(|table| (id, table)))
			.collect();
		let count = received.len();
		tables.extend(received);
		registry.replace_data_maps(tables);
		debug!(registry = %payload.registry, count, "applied synced data maps");
		Ok(count)
	}
}

#[cfg(test)]
mod tests;
