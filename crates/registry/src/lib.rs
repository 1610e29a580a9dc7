//! Keyed registries with stable numeric ids.
//!
//! # Purpose
//!
//! A [`Registry`] maps [`ResourceKey`]s to shared values and assigns each a
//! numeric id that stays stable across save/load and network
//! synchronization. Registries are owned by an explicit [`RegistryContext`],
//! which drives the startup lifecycle and the checkpoints it rolls back to.
//!
//! # Mental Model
//!
//! 1. **Populate:** built-in entries are registered, then
//!    [`RegistryContext::finish_builtins`] checkpoints them.
//! 2. **Register:** [`RegistrationSource`]s (usually [`DeferredRegister`]s)
//!    run in [`RegistryContext::run_registration`]; every failure is collected
//!    and any failure rolls the whole set back.
//! 3. **Freeze:** registries are sealed and a frozen checkpoint is taken.
//! 4. **Remap:** snapshots from saves or peers rebind ids via
//!    [`Registry::apply_snapshot`] / [`RegistryContext::apply_snapshots`].
//!
//! Consumers hold [`DeferredHolder`]s, which bind lazily and rebind whenever
//! the registry's generation changes.
//!
//! # Key Types
//!
//! | Type | Role |
//! |------|------|
//! | [`Registry`] | Entry store, aliases, tags, callbacks, data-map side table. |
//! | [`RegistryContext`] | Owner of registries, lifecycle and checkpoints. |
//! | [`RegistrySnapshot`] | Id and alias tables, optionally with an entry backup. |
//! | [`DeferredHolder`] | Late-bound reference to one entry. |
//! | [`DeferredRegister`] | Queued registrations for one namespace. |
//! | [`RegistryAdmin`] | Capability required for destructive operations. |

mod admin;
mod alias;
mod callback;
mod config;
mod context;
mod deferred;
mod entry;
mod error;
mod registration;
mod registry;
mod remap;
mod snapshot;
mod store;

pub use admin::RegistryAdmin;
pub use callback::{CallbackHooks, RegistryCallback};
pub use config::{ConfigError, DataMapConfig, EngineConfig, RegistryConfig, SnapshotConfig};
pub use context::{ContextPhase, DynRegistry, RegistryContext, SnapshotSet};
pub use deferred::DeferredHolder;
pub use entry::{Entry, Lifecycle};
pub use error::{ContextError, RegistryError, SnapshotError};
pub use keystone_primitives::{ResourceKey, TagKey};
pub use registration::{DeferredRegister, DeferredRegisterError, RegistrationError, RegistrationReport, RegistrationSource};
pub use registry::{ClearScope, DEFAULT_MAX_ID, DataMapTable, Registry, RegistryBuilder};
pub use remap::MissingKeys;
pub use snapshot::{FrozenRegistryPayload, RegistrySnapshot, SnapshotMode, SnapshotOrigin};

#[cfg(test)]
mod test_fixtures;
