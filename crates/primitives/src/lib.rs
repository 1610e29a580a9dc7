//! Namespaced identifiers shared by registries and data maps.
//!
//! A [`ResourceKey`] names one object inside one registry (`namespace:path`).
//! A [`TagKey`] names a set of objects in a registry (`#namespace:path`), and
//! [`TagOrKey`] is the reference grammar used by data sources that can target
//! either.

mod key;
mod tag;

pub use key::{DEFAULT_NAMESPACE, KeyError, ResourceKey};
pub use tag::{TagKey, TagOrKey};
