//! The registration pass and its sources.
//!
//! A [`RegistrationSource`] contributes entries to one registry. The context
//! drives every source in processing order, collects every failure instead of
//! stopping at the first, and either freezes the result or rolls the whole
//! registry set back to its built-in checkpoint.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use keystone_primitives::{KeyError, ResourceKey};
use parking_lot::Mutex;

use crate::admin::RegistryAdmin;
use crate::context::{ContextPhase, RegistryContext};
use crate::deferred::DeferredHolder;
use crate::error::{ContextError, RegistryError};

/// Something that registers entries into one registry during the
/// registration pass.
pub trait RegistrationSource: Send + Sync {
	fn registry_key(&self) -> &ResourceKey;

	/// Registers everything this source holds, returning every failure.
	fn register_all(&self, context: &RegistryContext) -> Vec<RegistryError>;
}

/// Every failure of a registration pass.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} registration failure(s){}", failures.len(), bullet_list(failures))]
pub struct RegistrationReport {
	pub failures: Vec<RegistryError>,
}

fn bullet_list(failures: &[RegistryError]) -> String {
	failures.iter().map(|failure| format!("\n  - {failure}")).collect()
}

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
	#[error(transparent)]
	Context(#[from] ContextError),
	#[error("{0}")]
	Failed(RegistrationReport),
}

impl RegistryContext {
	/// Runs every source against its registry, in processing order.
	///
	/// Sources targeting a registry the context does not hold run last and
	/// report their own failures. Any failure rolls every registry back to
	/// the built-in checkpoint.
	pub fn run_registration(&self, admin: &RegistryAdmin, sources: &[&dyn RegistrationSource]) -> Result<(), RegistrationError> {
		self.expect_phase(ContextPhase::Populated)?;

		let order = self.registry_keys();
		let mut failures = Vec::new();
		for key in &order {
			for source in sources.iter().filter(|s| s.registry_key() == key) {
				failures.extend(source.register_all(self));
			}
		}
		for source in sources.iter().filter(|s| !order.contains(s.registry_key())) {
			failures.extend(source.register_all(self));
		}

		if !failures.is_empty() {
			let report = RegistrationReport { failures };
			tracing::error!(failures = report.failures.len(), %report, "registration failed, rolling back to built-in state");
			self.revert_to_builtin(admin)?;
			self.set_phase(ContextPhase::RolledBack);
			return Err(RegistrationError::Failed(report));
		}

		self.freeze_all();
		self.take_frozen_checkpoint();
		self.set_phase(ContextPhase::Available);
		Ok(())
	}
}

#[derive(Debug, thiserror::Error)]
pub enum DeferredRegisterError {
	#[error(transparent)]
	Key(#[from] KeyError),
	#[error(transparent)]
	Registry(#[from] RegistryError),
}

type Factory<T> = Box<dyn Fn(&ResourceKey) -> T + Send + Sync>;

struct Pending<T> {
	holder: DeferredHolder<T>,
	factory: Factory<T>,
}

/// Collects entries for one registry under one namespace ahead of the
/// registration pass, handing out [`DeferredHolder`]s for them.
pub struct DeferredRegister<T> {
	context: Arc<RegistryContext>,
	registry_key: ResourceKey,
	namespace: String,
	entries: Mutex<IndexMap<ResourceKey, Pending<T>>>,
	aliases: Mutex<Vec<(ResourceKey, ResourceKey)>>,
	ran: AtomicBool,
}

impl<T: Send + Sync + 'static> DeferredRegister<T> {
	pub fn new(context: Arc<RegistryContext>, registry_key: ResourceKey, namespace: &str) -> Result<Self, KeyError> {
		ResourceKey::new(namespace, "_")?;
		Ok(Self {
			context,
			registry_key,
			namespace: namespace.to_string(),
			entries: Mutex::new(IndexMap::new()),
			aliases: Mutex::new(Vec::new()),
			ran: AtomicBool::new(false),
		})
	}

	pub fn namespace(&self) -> &str {
		&self.namespace
	}

	/// Queues `name` for registration. The factory runs during the pass and
	/// should build a fresh value each time it is called.
	pub fn register(
		&self,
		name: &str,
		factory: impl Fn(&ResourceKey) -> T + Send + Sync + 'static,
	) -> Result<DeferredHolder<T>, DeferredRegisterError> {
		let key = ResourceKey::new(&self.namespace, name)?;
		if self.ran.load(Ordering::Acquire) {
			return Err(RegistryError::RegistrationAfterFreeze {
				registry: self.registry_key.clone(),
				key,
			}
			.into());
		}
		let mut entries = self.entries.lock();
		if entries.contains_key(&key) {
			return Err(RegistryError::DuplicateKey {
				registry: self.registry_key.clone(),
				key,
			}
			.into());
		}
		let holder = DeferredHolder::new(self.context.clone(), self.registry_key.clone(), key.clone());
		entries.insert(
			key,
			Pending {
				holder: holder.clone(),
				factory: Box::new(factory),
			},
		);
		Ok(holder)
	}

	/// Queues an alias, added after this register's entries.
	pub fn add_alias(&self, from: ResourceKey, to: ResourceKey) {
		self.aliases.lock().push((from, to));
	}

	/// Holders for every queued entry, in registration order.
	pub fn entries(&self) -> Vec<DeferredHolder<T>> {
		self.entries.lock().values().map(|p| p.holder.clone()).collect()
	}
}

impl<T: Send + Sync + 'static> RegistrationSource for DeferredRegister<T> {
	fn registry_key(&self) -> &ResourceKey {
		&self.registry_key
	}

	fn register_all(&self, context: &RegistryContext) -> Vec<RegistryError> {
		self.ran.store(true, Ordering::Release);
		let entries = self.entries.lock();
		let registry = match context.registry::<T>(&self.registry_key) {
			Ok(registry) => registry,
			Err(_) => {
				return entries
					.keys()
					.map(|key| RegistryError::UnboundReference {
						registry: self.registry_key.clone(),
						key: key.clone(),
					})
					.collect();
			}
		};

		let mut failures = Vec::new();
		for (key, pending) in entries.iter() {
			if let Err(err) = registry.register_next(key.clone(), (pending.factory)(key)) {
				failures.push(err);
			}
		}
		for (from, to) in self.aliases.lock().iter() {
			if let Err(err) = registry.add_alias(from.clone(), to.clone()) {
				failures.push(err);
			}
		}
		tracing::debug!(
			registry = %self.registry_key,
			namespace = %self.namespace,
			entries = entries.len(),
			failures = failures.len(),
			"deferred register ran"
		);
		failures
	}
}
