//! Engine configuration loaded from TOML.
//!
//! Every field has a default, so an empty document is a valid config:
//!
//! ```toml
//! [registry]
//! default_max_id = 2147483646
//!
//! [snapshots]
//! allow_missing_local = true
//! allow_missing_remote = false
//!
//! [data_maps]
//! folder = "data_maps"
//! threads = 0
//! loaded_namespaces = ["core"]
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::registry::DEFAULT_MAX_ID;
use crate::snapshot::SnapshotOrigin;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("failed to read {}: {source}", path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("failed to parse engine config: {0}")]
	Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
	pub registry: RegistryConfig,
	pub snapshots: SnapshotConfig,
	pub data_maps: DataMapConfig,
}

impl EngineConfig {
	pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(input)?)
	}

	/// Reads and parses a config file.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		let config = Self::from_toml_str(&content)?;
		tracing::debug!(path = %path.display(), "loaded engine config");
		Ok(config)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
	/// Id ceiling for registries built without an explicit one.
	pub default_max_id: u32,
}

impl Default for RegistryConfig {
	fn default() -> Self {
		Self {
			default_max_id: DEFAULT_MAX_ID,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SnapshotConfig {
	/// Tolerate unknown keys in snapshots read from local saves.
	pub allow_missing_local: bool,
	/// Tolerate unknown keys in snapshots received from a peer.
	pub allow_missing_remote: bool,
}

impl Default for SnapshotConfig {
	fn default() -> Self {
		Self {
			allow_missing_local: true,
			allow_missing_remote: false,
		}
	}
}

impl SnapshotConfig {
	pub fn allow_missing(&self, origin: SnapshotOrigin) -> bool {
		match origin {
			SnapshotOrigin::Local => self.allow_missing_local,
			SnapshotOrigin::Remote => self.allow_missing_remote,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataMapConfig {
	/// Directory under `data/<namespace>/` holding data-map sources.
	pub folder: String,
	/// Worker threads for decoding sources; `0` uses one per core.
	pub threads: usize,
	/// Namespaces `namespace_loaded` conditions treat as present.
	pub loaded_namespaces: Vec<String>,
}

impl Default for DataMapConfig {
	fn default() -> Self {
		Self {
			folder: "data_maps".to_string(),
			threads: 0,
			loaded_namespaces: vec![keystone_primitives::DEFAULT_NAMESPACE.to_string()],
		}
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn empty_document_yields_defaults() {
		assert_eq!(EngineConfig::from_toml_str("").unwrap(), EngineConfig::default());
	}

	#[test]
	fn sections_override_defaults() {
		let config = EngineConfig::from_toml_str(
			r#"
			[registry]
			default_max_id = 4095

			[snapshots]
			allow_missing_remote = true

			[data_maps]
			threads = 2
			loaded_namespaces = ["core", "extras"]
			"#,
		)
		.unwrap();
		assert_eq!(config.registry.default_max_id, 4095);
		assert!(config.snapshots.allow_missing(SnapshotOrigin::Remote));
		assert!(config.snapshots.allow_missing(SnapshotOrigin::Local));
		assert_eq!(config.data_maps.folder, "data_maps");
		assert_eq!(config.data_maps.threads, 2);
		assert_eq!(config.data_maps.loaded_namespaces, ["core", "extras"]);
	}

	#[test]
	fn unknown_fields_are_rejected() {
		let err = EngineConfig::from_toml_str("[registry]\nmax = 3\n").unwrap_err();
		assert!(matches!(err, ConfigError::Parse(_)));
	}

	#[test]
	fn load_reads_file_and_reports_missing() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("engine.toml");
		std::fs::write(&path, "[snapshots]\nallow_missing_local = false\n").unwrap();
		let config = EngineConfig::load(&path).unwrap();
		assert!(!config.snapshots.allow_missing_local);

		let missing = EngineConfig::load(&dir.path().join("absent.toml")).unwrap_err();
		assert!(matches!(missing, ConfigError::Read { .. }));
	}
}
