//! Merge strategies for values that several sources attach to one entry.
//!
//! A merger is only consulted when an entry already holds a value and the
//! incoming directive is not marked `replace`. Arguments arrive in layering
//! order: the accumulated value first, the incoming one second.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;

use keystone_primitives::TagOrKey;
use keystone_registry::Registry;

/// Combines an accumulated value with an incoming one.
pub trait DataMapValueMerger<R, A>: Send + Sync {
	fn merge(&self, registry: &Registry<R>, first_source: &TagOrKey, first: A, second_source: &TagOrKey, second: A) -> A;
}

/// The incoming value replaces the accumulated one.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastWins;

impl<R, A> DataMapValueMerger<R, A> for LastWins {
	fn merge(&self, _: &Registry<R>, _: &TagOrKey, _first: A, _: &TagOrKey, second: A) -> A {
		second
	}
}

/// Concatenates lists, accumulated elements first.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListMerger;

impl<R, V> DataMapValueMerger<R, Vec<V>> for ListMerger {
	fn merge(&self, _: &Registry<R>, _: &TagOrKey, mut first: Vec<V>, _: &TagOrKey, second: Vec<V>) -> Vec<V> {
		first.extend(second);
		first
	}
}

/// Extends maps; the incoming value wins for keys present in both.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapMerger;

impl<R, K: Ord, V> DataMapValueMerger<R, BTreeMap<K, V>> for MapMerger {
	fn merge(
		&self,
		_: &Registry<R>,
		_: &TagOrKey,
		mut first: BTreeMap<K, V>,
		_: &TagOrKey,
		second: BTreeMap<K, V>,
	) -> BTreeMap<K, V> {
		first.extend(second);
		first
	}
}

impl<R, K, V, S> DataMapValueMerger<R, HashMap<K, V, S>> for MapMerger
where
	K: Eq + Hash,
	S: BuildHasher,
{
	fn merge(
		&self,
		_: &Registry<R>,
		_: &TagOrKey,
		mut first: HashMap<K, V, S>,
		_: &TagOrKey,
		second: HashMap<K, V, S>,
	) -> HashMap<K, V, S> {
		first.extend(second);
		first
	}
}

/// Set union.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetMerger;

impl<R, V: Ord> DataMapValueMerger<R, BTreeSet<V>> for SetMerger {
	fn merge(&self, _: &Registry<R>, _: &TagOrKey, mut first: BTreeSet<V>, _: &TagOrKey, second: BTreeSet<V>) -> BTreeSet<V> {
		first.extend(second);
		first
	}
}

/// Adapts a closure into a [`DataMapValueMerger`].
pub struct FnMerger<F, R, A> {
	merge: F,
	_marker: PhantomData<fn(&R, A) -> A>,
}

impl<F, R, A> FnMerger<F, R, A>
where
	F: Fn(&Registry<R>, &TagOrKey, A, &TagOrKey, A) -> A + Send + Sync,
{
	pub fn new(merge: F) -> Self {
		Self {
			merge,
			_marker: PhantomData,
		}
	}
}

impl<F, R, A> DataMapValueMerger<R, A> for FnMerger<F, R, A>
where
	F: Fn(&Registry<R>, &TagOrKey, A, &TagOrKey, A) -> A + Send + Sync,
{
	fn merge(&self, registry: &Registry<R>, first_source: &TagOrKey, first: A, second_source: &TagOrKey, second: A) -> A {
		(self.merge)(registry, first_source, first, second_source, second)
	}
}
