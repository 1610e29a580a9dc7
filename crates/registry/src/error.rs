use keystone_primitives::ResourceKey;

/// Structural and lookup failures raised by a single registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
	/// The key is already registered.
	#[error("duplicate key {key} in registry {registry}")]
	DuplicateKey { registry: ResourceKey, key: ResourceKey },

	/// The requested id is above the registry's ceiling.
	#[error("id {id} for {key} exceeds max id {max_id} of registry {registry}")]
	IdOutOfRange {
		registry: ResourceKey,
		key: ResourceKey,
		id: u32,
		max_id: u32,
	},

	/// Ids must be registered in strictly increasing order.
	#[error("id {id} for {key} is not above the last registered id {last} in registry {registry}")]
	NonMonotonicId {
		registry: ResourceKey,
		key: ResourceKey,
		id: u32,
		last: u32,
	},

	/// `from` already aliases a different target.
	#[error("duplicate alias {from} -> {requested} in registry {registry}, existing mapping -> {existing}")]
	DuplicateAlias {
		registry: ResourceKey,
		from: ResourceKey,
		existing: ResourceKey,
		requested: ResourceKey,
	},

	/// Adding the alias would close a loop.
	#[error("alias loop detected in registry {registry}: {from} -> {to}")]
	AliasCycle {
		registry: ResourceKey,
		from: ResourceKey,
		to: ResourceKey,
	},

	/// The registry is frozen.
	#[error("cannot register {key} into frozen registry {registry}")]
	RegistrationAfterFreeze { registry: ResourceKey, key: ResourceKey },

	/// The backing registry does not exist in the context.
	#[error("registry {registry} not present for {key}")]
	UnboundReference { registry: ResourceKey, key: ResourceKey },

	/// The registry exists but does not contain the key.
	#[error("no entry {key} in registry {registry}")]
	MissingEntry { registry: ResourceKey, key: ResourceKey },

	/// A snapshot referenced keys that are not registered locally.
	#[error("cannot apply snapshot to registry {registry}: {} missing entries ({})", missing.len(), join_keys(missing))]
	SnapshotApply {
		registry: ResourceKey,
		missing: Vec<ResourceKey>,
	},

	/// A full snapshot was taken from a registry of a different value type.
	#[error("full snapshot backup does not match the value type of registry {registry}")]
	BackupTypeMismatch { registry: ResourceKey },
}

impl RegistryError {
	/// Returns the registry the error was raised by.
	pub fn registry(&self) -> &ResourceKey {
		match self {
			Self::DuplicateKey { registry, .. }
			| Self::IdOutOfRange { registry, .. }
			| Self::NonMonotonicId { registry, .. }
			| Self::DuplicateAlias { registry, .. }
			| Self::AliasCycle { registry, .. }
			| Self::RegistrationAfterFreeze { registry, .. }
			| Self::UnboundReference { registry, .. }
			| Self::MissingEntry { registry, .. }
			| Self::SnapshotApply { registry, .. }
			| Self::BackupTypeMismatch { registry } => registry,
		}
	}

	/// Returns the entry key the error is about, when there is a single one.
	pub fn key(&self) -> Option<&ResourceKey> {
		match self {
			Self::DuplicateKey { key, .. }
			| Self::IdOutOfRange { key, .. }
			| Self::NonMonotonicId { key, .. }
			| Self::RegistrationAfterFreeze { key, .. }
			| Self::UnboundReference { key, .. }
			| Self::MissingEntry { key, .. } => Some(key),
			Self::DuplicateAlias { from, .. } | Self::AliasCycle { from, .. } => Some(from),
			Self::SnapshotApply { .. } | Self::BackupTypeMismatch { .. } => None,
		}
	}
}

/// Registry context lifecycle and lookup failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
	#[error("registry {0} already exists")]
	DuplicateRegistry(ResourceKey),

	#[error("registry {0} not found")]
	UnknownRegistry(ResourceKey),

	#[error("registry {0} holds a different value type")]
	TypeMismatch(ResourceKey),

	#[error("operation requires phase {expected:?}, context is {actual:?}")]
	WrongPhase {
		expected: crate::context::ContextPhase,
		actual: crate::context::ContextPhase,
	},

	#[error("no {0} checkpoint has been taken")]
	MissingCheckpoint(&'static str),

	#[error(transparent)]
	Registry(#[from] RegistryError),
}

/// Snapshot codec failures.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
	/// Full snapshots hold live values and never leave the process.
	#[error("full snapshots cannot be serialized")]
	FullBackup,

	/// Two keys in a decoded id table share one id.
	#[error("snapshot assigns id {id} to both {first} and {second}")]
	DuplicateId {
		id: u32,
		first: ResourceKey,
		second: ResourceKey,
	},

	/// A key appears twice in one decoded table.
	#[error("snapshot lists {0} more than once")]
	DuplicateKey(ResourceKey),

	#[error("snapshot codec error: {0}")]
	Codec(#[from] postcard::Error),
}

pub(crate) fn join_keys(keys: &[ResourceKey]) -> String {
	keys.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}
