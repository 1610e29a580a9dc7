//! Data maps: per-entry values layered over frozen registries.
//!
//! # Role
//!
//! Registries give entries identity; data maps attach mutable, reloadable
//! data to them without touching the entries. Values come from JSON files in
//! layered packs, are merged in pack order and end up as one immutable
//! [`DataMap`] per registry and data map, swapped in atomically.
//!
//! # Key Types
//!
//! | Type | Role |
//! |---|---|
//! | [`DataMapType`] | Declares one data map: registry, merger, remover, default, sync |
//! | [`DataMapTypes`] | Every declared data map |
//! | [`DataMapLoader`] | Collects sources in parallel, applies them on the owner thread |
//! | [`PackSet`] | Ordered [`Pack`]s, on disk ([`DirectoryPack`]) or in memory ([`MemoryPack`]) |
//! | [`DataMapAccess`] | Typed reads on a [`Registry`](keystone_registry::Registry) |
//! | [`KnownDataMaps`] | Synced data maps advertised to peers, see [`negotiate`] |
//!
//! # Layout
//!
//! A data map `ns:path` for registry `rns:rpath` reads
//! `data/<ns>/data_maps/<rns>/<rpath>/<path>.json` from every pack, where the
//! `<rns>/` segment is omitted for the default namespace.

mod condition;
mod error;
mod file;
mod kind;
mod loader;
mod map;
mod merger;
mod pack;
mod remover;
mod sync;

pub use condition::{Condition, ConditionContext, all_hold};
pub use error::{DataMapError, FileError, NegotiationError};
pub use file::{DataMapEntry, DataMapFile, Removal};
pub use kind::{DataMapType, DataMapTypeBuilder, DataMapTypes};
pub use loader::{CollectedDataMaps, DataMapLoader, registry_folder};
pub use map::{DataMap, DataMapAccess};
pub use merger::{DataMapValueMerger, FnMerger, LastWins, ListMerger, MapMerger, SetMerger};
pub use pack::{DirectoryPack, MemoryPack, Pack, PackSet};
pub use remover::{DataMapValueRemover, MapKeysRemover, ValuesRemover};
pub use sync::{DataMapSyncPayload, KnownDataMaps, negotiate};

#[cfg(test)]
mod test_fixtures;
