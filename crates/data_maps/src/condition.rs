//! Load conditions attached to individual data-map directives.

use rustc_hash::FxHashSet;
use serde::Deserialize;

/// What conditions are evaluated against.
#[derive(Debug, Clone, Default)]
pub struct ConditionContext {
	loaded_namespaces: FxHashSet<String>,
}

impl ConditionContext {
	pub fn new(loaded_namespaces: impl IntoIterator<Item = impl Into<String>>) -> Self {
		Self {
			loaded_namespaces: loaded_namespaces.into_iter().map(Into::into).collect(),
		}
	}

	pub fn is_namespace_loaded(&self, namespace: &str) -> bool {
		self.loaded_namespaces.contains(namespace)
	}
}

/// A boolean predicate written as `{"type": ..., ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
	True,
	False,
	Not { value: Box<Condition> },
	And { values: Vec<Condition> },
	Or { values: Vec<Condition> },
	NamespaceLoaded { namespace: String },
}

impl Condition {
	pub fn test(&self, context: &ConditionContext) -> bool {
		match self {
			Self::True => true,
			Self::False => false,
			Self::Not { value } => !value.test(context),
			Self::And { values } => values.iter().all(|c| c.test(context)),
			Self::Or { values } => values.iter().any(|c| c.test(context)),
			Self::NamespaceLoaded { namespace } => context.is_namespace_loaded(namespace),
		}
	}
}

/// True when every condition holds. An empty list always holds.
pub fn all_hold(conditions: &[Condition], context: &ConditionContext) -> bool {
	conditions.iter().all(|c| c.test(context))
}
