//! Data-map declarations.
//!
//! # Role
//!
//! A [`DataMapType`] names one kind of per-entry data for one registry and
//! carries everything needed to load it: how to decode values, how to merge
//! layered values, how removals work, what unlisted entries default to and
//! whether the result is sent to peers. Declarations are collected into
//! [`DataMapTypes`] before any source is read.
//!
//! # Invariants
//!
//! - A `(registry, id)` pair is declared at most once.
//! - Mandatory sync implies sync; the builder only offers both together.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use keystone_primitives::{ResourceKey, TagOrKey};
use keystone_registry::{Registry, RegistryContext};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::condition::ConditionContext;
use crate::error::{DataMapError, FileError};
use crate::file::DataMapFile;
use crate::loader::build_data_map;
use crate::map::DataMap;
use crate::merger::{DataMapValueMerger, FnMerger, LastWins};
use crate::remover::{DataMapValueRemover, RemoverDecoder, decode_remover};

type DefaultFn<R, A> = Box<dyn Fn(&R) -> Option<A> + Send + Sync>;

struct SyncCodec<A> {
	mandatory: bool,
	encode: fn(&DataMap<A>) -> Result<Vec<u8>, postcard::Error>,
	decode: fn(&[u8]) -> Result<DataMap<A>, postcard::Error>,
}

fn encode_table<A: Serialize>(table: &DataMap<A>) -> Result<Vec<u8>, postcard::Error> {
	postcard::to_stdvec(table.values())
}

fn decode_table<A: DeserializeOwned>(bytes: &[u8]) -> Result<DataMap<A>, postcard::Error> {
	postcard::from_bytes::<BTreeMap<ResourceKey, A>>(bytes).map(DataMap::new)
}

/// Declaration of a data map attaching values of type `A` to the entries of
/// a `Registry<R>`.
pub struct DataMapType<R, A> {
	id: ResourceKey,
	registry: ResourceKey,
	merger: Box<dyn DataMapValueMerger<R, A>>,
	remover: Option<RemoverDecoder<R, A>>,
	default: Option<DefaultFn<R, A>>,
	sync: Option<SyncCodec<A>>,
}

impl<R: 'static, A: 'static> DataMapType<R, A> {
	pub fn builder(id: ResourceKey, registry: ResourceKey) -> DataMapTypeBuilder<R, A> {
		DataMapTypeBuilder {
			id,
			registry,
			merger: Box::new(LastWins),
			remover: None,
			default: None,
			sync: None,
		}
	}
}

impl<R, A> DataMapType<R, A> {
	pub fn id(&self) -> &ResourceKey {
		&self.id
	}

	pub fn registry_key(&self) -> &ResourceKey {
		&self.registry
	}

	pub fn is_synced(&self) -> bool {
		self.sync.is_some()
	}

	pub fn is_mandatory(&self) -> bool {
		self.sync.as_ref().is_some_and(|s| s.mandatory)
	}

	pub fn has_remover(&self) -> bool {
		self.remover.is_some()
	}

	pub(crate) fn merger(&self) -> &dyn DataMapValueMerger<R, A> {
		self.merger.as_ref()
	}

	pub(crate) fn default_for(&self, entry: &R) -> Option<A> {
		self.default.as_ref().and_then(|default| default(entry))
	}

	pub(crate) fn has_default(&self) -> bool {
		self.default.is_some()
	}
}

impl<R, A> fmt::Debug for DataMapType<R, A> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DataMapType")
			.field("id", &self.id)
			.field("registry", &self.registry)
			.field("synced", &self.is_synced())
			.field("mandatory", &self.is_mandatory())
			.finish_non_exhaustive()
	}
}

pub struct DataMapTypeBuilder<R, A> {
	id: ResourceKey,
	registry: ResourceKey,
	merger: Box<dyn DataMapValueMerger<R, A>>,
	remover: Option<RemoverDecoder<R, A>>,
	default: Option<DefaultFn<R, A>>,
	sync: Option<SyncCodec<A>>,
}

impl<R: 'static, A: 'static> DataMapTypeBuilder<R, A> {
	/// Replaces the default [`LastWins`] merger.
	pub fn merger(mut self, merger: impl DataMapValueMerger<R, A> + 'static) -> Self {
		self.merger = Box::new(merger);
		self
	}

	pub fn merge_with(self, merge: impl Fn(&Registry<R>, &TagOrKey, A, &TagOrKey, A) -> A + Send + Sync + 'static) -> Self {
		self.merger(FnMerger::new(merge))
	}

	/// Lets sources pass removal parameters, decoded as `VR`.
	pub fn remover<VR>(mut self) -> Self
	where
		VR: DataMapValueRemover<R, A> + DeserializeOwned + 'static,
	{
		self.remover = Some(decode_remover::<R, A, VR>);
		self
	}

	/// Value for entries no source mentions, computed from the entry itself.
	pub fn default_value(mut self, default: impl Fn(&R) -> Option<A> + Send + Sync + 'static) -> Self {
		self.default = Some(Box::new(default));
		self
	}

	pub fn build(self) -> DataMapType<R, A> {
		DataMapType {
			id: self.id,
			registry: self.registry,
			merger: self.merger,
			remover: self.remover,
			default: self.default,
			sync: self.sync,
		}
	}
}

impl<R: 'static, A: Serialize + DeserializeOwned + 'static> DataMapTypeBuilder<R, A> {
	/// Sends committed tables to peers. A mandatory data map must be known
	/// by both sides of a connection.
	pub fn synced(mut self, mandatory: bool) -> Self {
		self.sync = Some(SyncCodec {
			mandatory,
			encode: encode_table::<A>,
			decode: decode_table::<A>,
		});
		self
	}
}

/// Type-erased view of a [`DataMapType`] used by the loader and sync.
pub(crate) trait ErasedDataMapType: Send + Sync {
	fn id(&self) -> &ResourceKey;
	fn registry_key(&self) -> &ResourceKey;
	/// `Some(mandatory)` for synced data maps.
	fn sync_mode(&self) -> Option<bool>;
	fn decode_file(&self, json: Value, conditions: &ConditionContext) -> Result<Box<dyn Any + Send>, FileError>;
	/// Folds decoded files into a table. `None` when the registry is missing
	/// or holds another value type.
	fn build(&self, context: &RegistryContext, files: Vec<Box<dyn Any + Send>>) -> Option<Arc<dyn Any + Send + Sync>>;
	fn encode_table(&self, table: Arc<dyn Any + Send + Sync>) -> Option<Result<Vec<u8>, postcard::Error>>;
	fn decode_table(&self, bytes: &[u8]) -> Option<Result<Arc<dyn Any + Send + Sync>, postcard::Error>>;
}

impl<R, A> ErasedDataMapType for DataMapType<R, A>
where
	R: Send + Sync + 'static,
	A: Clone + DeserializeOwned + Send + Sync + 'static,
{
	fn id(&self) -> &ResourceKey {
		&self.id
	}

	fn registry_key(&self) -> &ResourceKey {
		&self.registry
	}

	fn sync_mode(&self) -> Option<bool> {
		self.sync.as_ref().map(|s| s.mandatory)
	}

	fn decode_file(&self, json: Value, conditions: &ConditionContext) -> Result<Box<dyn Any + Send>, FileError> {
		let file = DataMapFile::<R, A>::decode(json, self.remover, conditions)?;
		Ok(Box::new(file))
	}

	fn build(&self, context: &RegistryContext, files: Vec<Box<dyn Any + Send>>) -> Option<Arc<dyn Any + Send + Sync>> {
		let registry = match context.registry::<R>(&self.registry) {
			Ok(registry) => registry,
			Err(error) => {
				warn!(registry = %self.registry, data_map = %self.id, %error, "cannot build data map");
				return None;
			}
		};
		let files = files
			.into_iter()
			.filter_map(|file| file.downcast::<DataMapFile<R, A>>().ok())
			.map(|file| *file);
		Some(Arc::new(build_data_map(self, &registry, files)))
	}

	fn encode_table(&self, table: Arc<dyn Any + Send + Sync>) -> Option<Result<Vec<u8>, postcard::Error>> {
		let sync = self.sync.as_ref()?;
		let table = table.downcast::<DataMap<A>>().ok()?;
		Some((sync.encode)(&table))
	}

	fn decode_table(&self, bytes: &[u8]) -> Option<Result<Arc<dyn Any + Send + Sync>, postcard::Error>> {
		let sync = self.sync.as_ref()?;
		Some((sync.decode)(bytes).map(|table| Arc::new(table) as Arc<dyn Any + Send + Sync>))
	}
}

/// Every declared data map, ordered by registry then id.
#[derive(Default)]
pub struct DataMapTypes {
	types: BTreeMap<(ResourceKey, ResourceKey), Arc<dyn ErasedDataMapType>>,
}

impl DataMapTypes {
	pub fn new() -> Self {
		Self::default()
	}

	/// Declares `data_map` and returns the handle used for typed lookups.
	pub fn register<R, A>(&mut self, data_map: DataMapType<R, A>) -> Result<Arc<DataMapType<R, A>>, DataMapError>
	where
		R: Send + Sync + 'static,
		A: Clone + DeserializeOwned + Send + Sync + 'static,
	{
		let slot = (data_map.registry.clone(), data_map.id.clone());
		if self.types.contains_key(&slot) {
			return Err(DataMapError::DuplicateType {
				registry: slot.0,
				id: slot.1,
			});
		}
		let data_map = Arc::new(data_map);
		self.types.insert(slot, data_map.clone());
		Ok(data_map)
	}

	pub fn contains(&self, registry: &ResourceKey, id: &ResourceKey) -> bool {
		self.types.contains_key(&(registry.clone(), id.clone()))
	}

	pub fn len(&self) -> usize {
		self.types.len()
	}

	pub fn is_empty(&self) -> bool {
		self.types.is_empty()
	}

	pub(crate) fn get(&self, registry: &ResourceKey, id: &ResourceKey) -> Option<&Arc<dyn ErasedDataMapType>> {
		self.types.get(&(registry.clone(), id.clone()))
	}

	pub(crate) fn for_registry<'a>(&'a self, registry: &'a ResourceKey) -> impl Iterator<Item = &'a Arc<dyn ErasedDataMapType>> {
		self.types
			.iter()
			.filter(move |((owner, _), _)| owner == registry)
			.map(|(_, data_map)| data_map)
	}

	pub(crate) fn iter(&self) -> impl Iterator<Item = &Arc<dyn ErasedDataMapType>> {
		self.types.values()
	}
}

impl fmt::Debug for DataMapTypes {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_list().entries(self.types.keys()).finish()
	}
}
