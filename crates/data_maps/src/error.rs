use std::io;

use keystone_primitives::{KeyError, ResourceKey, TagOrKey};
use thiserror::Error;

/// Failures of the data-map pipeline that reach the caller.
///
/// Per-file problems found while collecting are logged and skipped instead;
/// they only appear here when a single file is decoded on request.
#[derive(Debug, Error)]
pub enum DataMapError {
	#[error("data map {id} is already declared for registry {registry}")]
	DuplicateType { registry: ResourceKey, id: ResourceKey },
	#[error("unknown registry: {0}")]
	UnknownRegistry(ResourceKey),
	#[error("failed to read {location}: {error}")]
	Read {
		location: String,
		#[source]
		error: io::Error,
	},
	#[error("malformed data map file {location}: {error}")]
	Malformed {
		location: String,
		#[source]
		error: FileError,
	},
	#[error("failed to start data map workers: {0}")]
	ThreadPool(#[from] rayon::ThreadPoolBuildError),
	#[error("data map codec error: {0}")]
	Codec(#[from] postcard::Error),
}

/// Why one data-map file could not be decoded.
#[derive(Debug, Error)]
pub enum FileError {
	#[error("invalid JSON: {0}")]
	Json(#[from] serde_json::Error),
	#[error("invalid reference: {0}")]
	Reference(#[from] KeyError),
	#[error("{0}")]
	Shape(&'static str),
	#[error("invalid value for {reference}: {error}")]
	Value {
		reference: TagOrKey,
		#[source]
		error: serde_json::Error,
	},
	#[error("invalid conditions for {reference}: {error}")]
	Conditions {
		reference: TagOrKey,
		#[source]
		error: serde_json::Error,
	},
	#[error("invalid remover for {reference}: {error}")]
	Remover {
		reference: TagOrKey,
		#[source]
		error: serde_json::Error,
	},
	#[error("data map has no remover, but {0} supplies one")]
	RemoverUnsupported(TagOrKey),
}

/// Mandatory synced data maps that one side of a connection lacks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
	"mandatory data maps are missing{}{}",
	missing_lines(missing_remote, "remote"),
	missing_lines(missing_local, "local")
)]
pub struct NegotiationError {
	/// Mandatory on our side, unknown to the peer.
	pub missing_remote: Vec<(ResourceKey, ResourceKey)>,
	/// Mandatory on the peer, unknown to us.
	pub missing_local: Vec<(ResourceKey, ResourceKey)>,
}

fn missing_lines(missing: &[(ResourceKey, ResourceKey)], side: &str) -> String {
	missing
		.iter()
		.map(|(registry, id)| format!("\n  - {id} ({registry}) on the {side} side"))
		.collect()
}
