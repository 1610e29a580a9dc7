//! Registry lifecycle hooks.
//!
//! A callback declares which hooks it wants through [`RegistryCallback::hooks`];
//! the registry keeps one list per hook, each in subscription order. Hooks
//! always run after the entry store lock is released, so a callback may read
//! the registry it is attached to.

use std::sync::Arc;

use bitflags::bitflags;
use keystone_primitives::ResourceKey;

use crate::Registry;

bitflags! {
	/// Hooks a callback subscribes to.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
	pub struct CallbackHooks: u8 {
		const ADD = 1 << 0;
		const BAKE = 1 << 1;
		const CLEAR = 1 << 2;
	}
}

/// Observer of a single registry's lifecycle.
pub trait RegistryCallback<T>: Send + Sync {
	fn hooks(&self) -> CallbackHooks {
		CallbackHooks::all()
	}

	/// An entry was registered.
	fn on_add(&self, _registry: &Registry<T>, _id: u32, _key: &ResourceKey, _value: &Arc<T>) {}

	/// The registry was frozen.
	fn on_bake(&self, _registry: &Registry<T>) {}

	/// The registry was cleared; `full` is set when entries were dropped too.
	fn on_clear(&self, _registry: &Registry<T>, _full: bool) {}
}

type AddFn<T> = dyn Fn(&Registry<T>, u32, &ResourceKey, &Arc<T>) + Send + Sync;
type BakeFn<T> = dyn Fn(&Registry<T>) + Send + Sync;
type ClearFn<T> = dyn Fn(&Registry<T>, bool) + Send + Sync;

pub(crate) struct OnAdd<T>(pub(crate) Box<AddFn<T>>);
pub(crate) struct OnBake<T>(pub(crate) Box<BakeFn<T>>);
pub(crate) struct OnClear<T>(pub(crate) Box<ClearFn<T>>);

impl<T> RegistryCallback<T> for OnAdd<T> {
	fn hooks(&self) -> CallbackHooks {
		CallbackHooks::ADD
	}

	fn on_add(&self, registry: &Registry<T>, id: u32, key: &ResourceKey, value: &Arc<T>) {
		(self.0)(registry, id, key, value)
	}
}

impl<T> RegistryCallback<T> for OnBake<T> {
	fn hooks(&self) -> CallbackHooks {
		CallbackHooks::BAKE
	}

	fn on_bake(&self, registry: &Registry<T>) {
		(self.0)(registry)
	}
}

impl<T> RegistryCallback<T> for OnClear<T> {
	fn hooks(&self) -> CallbackHooks {
		CallbackHooks::CLEAR
	}

	fn on_clear(&self, registry: &Registry<T>, full: bool) {
		(self.0)(registry, full)
	}
}

/// Per-hook subscriber lists.
pub(crate) struct Callbacks<T> {
	add: Vec<Arc<dyn RegistryCallback<T>>>,
	bake: Vec<Arc<dyn RegistryCallback<T>>>,
	clear: Vec<Arc<dyn RegistryCallback<T>>>,
}

impl<T> Default for Callbacks<T> {
	fn default() -> Self {
		Self {
			add: Vec::new(),
			bake: Vec::new(),
			clear: Vec::new(),
		}
	}
}

impl<T> Callbacks<T> {
	pub(crate) fn subscribe(&mut self, callback: Arc<dyn RegistryCallback<T>>) {
		let hooks = callback.hooks();
		if hooks.contains(CallbackHooks::ADD) {
			self.add.push(callback.clone());
		}
		if hooks.contains(CallbackHooks::BAKE) {
			self.bake.push(callback.clone());
		}
		if hooks.contains(CallbackHooks::CLEAR) {
			self.clear.push(callback);
		}
	}

	pub(crate) fn add_hooks(&self) -> Vec<Arc<dyn RegistryCallback<T>>> {
		self.add.clone()
	}

	pub(crate) fn bake_hooks(&self) -> Vec<Arc<dyn RegistryCallback<T>>> {
		self.bake.clone()
	}

	pub(crate) fn clear_hooks(&self) -> Vec<Arc<dyn RegistryCallback<T>>> {
		self.clear.clone()
	}
}
