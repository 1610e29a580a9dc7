//! Layered resource sources.
//!
//! A pack exposes files under `data/<namespace>/...`. Resources are named by
//! a [`ResourceKey`] whose path is the file path below the namespace
//! directory, so `data/core/data_maps/block/hardness.json` in a directory
//! pack is `core:data_maps/block/hardness.json`. Packs listed later in a
//! [`PackSet`] layer over earlier ones.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use keystone_primitives::ResourceKey;
use rustc_hash::FxHashMap;
use tracing::warn;
use walkdir::WalkDir;

pub trait Pack: Send + Sync {
	fn name(&self) -> &str;

	/// Every `.json` resource whose path starts with `folder/`, sorted.
	fn list(&self, folder: &str) -> io::Result<Vec<ResourceKey>>;

	fn read(&self, location: &ResourceKey) -> io::Result<String>;
}

/// A pack rooted at a directory containing `data/`.
#[derive(Debug, Clone)]
pub struct DirectoryPack {
	name: String,
	root: PathBuf,
}

impl DirectoryPack {
	pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
		Self {
			name: name.into(),
			root: root.into(),
		}
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	fn data_dir(&self) -> PathBuf {
		self.root.join("data")
	}
}

impl Pack for DirectoryPack {
	fn name(&self) -> &str {
		&self.name
	}

	fn list(&self, folder: &str) -> io::Result<Vec<ResourceKey>> {
		let data = self.data_dir();
		if !data.is_dir() {
			return Ok(Vec::new());
		}

		let mut found = Vec::new();
		for namespace_dir in fs::read_dir(&data)? {
			let namespace_dir = namespace_dir?;
			if !namespace_dir.file_type()?.is_dir() {
				continue;
			}
			let Some(namespace) = namespace_dir.file_name().to_str().map(str::to_owned) else {
				continue;
			};
			let base = namespace_dir.path();
			let start = base.join(folder);
			if !start.is_dir() {
				continue;
			}

			for entry in WalkDir::new(&start).into_iter().filter_map(Result::ok) {
				let path = entry.path();
				if !entry.file_type().is_file() || path.extension().is_none_or(|ext| ext != "json") {
					continue;
				}
				let Ok(relative) = path.strip_prefix(&base) else {
					continue;
				};
				let relative: Vec<_> = relative.components().map(|c| c.as_os_str().to_string_lossy()).collect();
				match ResourceKey::new(&namespace, &relative.join("/")) {
					Ok(location) => found.push(location),
					Err(error) => warn!(pack = %self.name, path = %path.display(), %error, "skipping resource with an invalid name"),
				}
			}
		}
		found.sort();
		Ok(found)
	}

	fn read(&self, location: &ResourceKey) -> io::Result<String> {
		let mut path = self.data_dir().join(location.namespace());
		path.extend(location.path().split('/'));
		fs::read_to_string(path)
	}
}

/// A pack held in memory, keyed by resource location.
#[derive(Debug, Clone, Default)]
pub struct MemoryPack {
	name: String,
	files: FxHashMap<ResourceKey, String>,
}

impl MemoryPack {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			files: FxHashMap::default(),
		}
	}

	pub fn with_file(mut self, location: ResourceKey, contents: impl Into<String>) -> Self {
		self.insert(location, contents);
		self
	}

	pub fn insert(&mut self, location: ResourceKey, contents: impl Into<String>) {
		self.files.insert(location, contents.into());
	}
}

impl Pack for MemoryPack {
	fn name(&self) -> &str {
		&self.name
	}

	fn list(&self, folder: &str) -> io::Result<Vec<ResourceKey>> {
		let mut found: Vec<_> = self
			.files
			.keys()
			.filter(|location| {
				location
					.path()
					.strip_prefix(folder)
					.is_some_and(|rest| rest.starts_with('/'))
					&& location.path().ends_with(".json")
			})
			.cloned()
			.collect();
		found.sort();
		Ok(found)
	}

	fn read(&self, location: &ResourceKey) -> io::Result<String> {
		self.files
			.get(location)
			.cloned()
			.ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, location.to_string()))
	}
}

/// Packs in layering order, lowest priority first.
#[derive(Clone, Default)]
pub struct PackSet {
	packs: Vec<Arc<dyn Pack>>,
}

impl PackSet {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&mut self, pack: impl Pack + 'static) {
		self.packs.push(Arc::new(pack));
	}

	pub fn with(mut self, pack: impl Pack + 'static) -> Self {
		self.push(pack);
		self
	}

	pub fn len(&self) -> usize {
		self.packs.len()
	}

	pub fn is_empty(&self) -> bool {
		self.packs.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Pack>> {
		self.packs.iter()
	}
}

impl fmt::Debug for PackSet {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_list().entries(self.packs.iter().map(|p| p.name())).finish()
	}
}
