//! Decoded form of one data-map source file.
//!
//! # Format
//!
//! ```json
//! {
//!   "replace": false,
//!   "values": {
//!     "core:stone": { "value": 4, "replace": true, "conditions": [{ "type": "true" }] },
//!     "#core:ores": 2
//!   },
//!   "remove": ["core:dirt", { "key": "#core:soft", "remover": ["tool"] }]
//! }
//! ```
//!
//! `values` takes either the wrapped entry form or a bare value. `remove` is
//! an array of references or `{key, remover?, conditions?}` objects, or an
//! object mapping references to remover parameters (or to a conditions list
//! for a plain removal). Unknown top-level fields are ignored.

use keystone_primitives::TagOrKey;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::condition::{Condition, ConditionContext, all_hold};
use crate::error::FileError;
use crate::remover::{DataMapValueRemover, RemoverDecoder};

/// One value directive.
#[derive(Debug, Clone, PartialEq)]
pub struct DataMapEntry<A> {
	pub value: A,
	/// Overwrite instead of merging with what is already accumulated.
	pub replace: bool,
}

/// One removal directive. Without a remover the value is dropped outright.
pub struct Removal<R, A> {
	pub source: TagOrKey,
	pub remover: Option<Box<dyn DataMapValueRemover<R, A>>>,
}

/// The directives of one source file, in file order.
pub struct DataMapFile<R, A> {
	/// Discard everything accumulated by earlier files first.
	pub replace: bool,
	/// `None` marks a directive whose conditions failed.
	pub values: Vec<(TagOrKey, Option<DataMapEntry<A>>)>,
	pub removals: Vec<Removal<R, A>>,
}

impl<R, A> Default for DataMapFile<R, A> {
	fn default() -> Self {
		Self {
			replace: false,
			values: Vec::new(),
			removals: Vec::new(),
		}
	}
}

impl<R, A: DeserializeOwned> DataMapFile<R, A> {
	pub(crate) fn decode(
		json: Value,
		remover: Option<RemoverDecoder<R, A>>,
		conditions: &ConditionContext,
	) -> Result<Self, FileError> {
		let Value::Object(mut root) = json else {
			return Err(FileError::Shape("data map file must be a JSON object"));
		};
		let replace = match root.remove("replace") {
			None => false,
			Some(Value::Bool(replace)) => replace,
			Some(_) => return Err(FileError::Shape("`replace` must be a boolean")),
		};

		let values = match root.remove("values") {
			None => Vec::new(),
			Some(Value::Object(values)) => values
				.into_iter()
				.map(|(raw, value)| decode_value(&raw, value, conditions))
				.collect::<Result<_, _>>()?,
			Some(_) => return Err(FileError::Shape("`values` must be an object")),
		};

		let mut removals = Vec::new();
		match root.remove("remove") {
			None => {}
			Some(Value::Array(items)) => {
				for item in items {
					if let Some(removal) = decode_removal_item(item, remover, conditions)? {
						removals.push(removal);
					}
				}
			}
			Some(Value::Object(map)) => {
				for (raw, params) in map {
					let source = TagOrKey::parse(&raw)?;
					if let Some(removal) = decode_removal_params(source, params, remover, conditions)? {
						removals.push(removal);
					}
				}
			}
			Some(_) => return Err(FileError::Shape("`remove` must be an array or an object")),
		}

		Ok(Self {
			replace,
			values,
			removals,
		})
	}
}

fn decode_value<A: DeserializeOwned>(
	raw: &str,
	value: Value,
	conditions: &ConditionContext,
) -> Result<(TagOrKey, Option<DataMapEntry<A>>), FileError> {
	let reference = TagOrKey::parse(raw)?;
	match value {
		Value::Object(mut fields) if is_entry_object(&fields) => {
			if !all_hold(&take_conditions(&mut fields, &reference)?, conditions) {
				return Ok((reference, None));
			}
			let replace = match fields.remove("replace") {
				None => false,
				Some(Value::Bool(replace)) => replace,
				Some(_) => return Err(FileError::Shape("entry `replace` must be a boolean")),
			};
			let value = decode_payload(&reference, fields.remove("value").unwrap_or_default())?;
			Ok((reference, Some(DataMapEntry { value, replace })))
		}
		bare => {
			let value = decode_payload(&reference, bare)?;
			Ok((reference, Some(DataMapEntry { value, replace: false })))
		}
	}
}

fn decode_payload<A: DeserializeOwned>(reference: &TagOrKey, value: Value) -> Result<A, FileError> {
	serde_json::from_value(value).map_err(|error| FileError::Value {
		reference: reference.clone(),
		error,
	})
}

/// An object is the wrapped entry form when it has `value` and nothing
/// besides the wrapper fields. Anything else is a bare value.
fn is_entry_object(fields: &Map<String, Value>) -> bool {
	fields.contains_key("value") && fields.keys().all(|k| matches!(k.as_str(), "value" | "replace" | "conditions"))
}

fn take_conditions(fields: &mut Map<String, Value>, reference: &TagOrKey) -> Result<Vec<Condition>, FileError> {
	match fields.remove("conditions") {
		None => Ok(Vec::new()),
		Some(raw) => parse_conditions(reference, raw),
	}
}

fn parse_conditions(reference: &TagOrKey, raw: Value) -> Result<Vec<Condition>, FileError> {
	serde_json::from_value(raw).map_err(|error| FileError::Conditions {
		reference: reference.clone(),
		error,
	})
}

fn decode_removal_item<R, A>(
	item: Value,
	remover: Option<RemoverDecoder<R, A>>,
	conditions: &ConditionContext,
) -> Result<Option<Removal<R, A>>, FileError> {
	match item {
		Value::String(raw) => Ok(Some(Removal {
			source: TagOrKey::parse(&raw)?,
			remover: None,
		})),
		Value::Object(mut fields) => {
			let Some(Value::String(raw)) = fields.remove("key") else {
				return Err(FileError::Shape("removal objects need a string `key`"));
			};
			let source = TagOrKey::parse(&raw)?;
			if !all_hold(&take_conditions(&mut fields, &source)?, conditions) {
				return Ok(None);
			}
			let remover = match fields.remove("remover") {
				None => None,
				Some(params) => Some(decode_with(remover, &source, params)?),
			};
			Ok(Some(Removal { source, remover }))
		}
		_ => Err(FileError::Shape("removal entries must be strings or objects")),
	}
}

/// Object-form removal: remover parameters take precedence; an array that
/// is not valid remover input is read as a conditions list guarding a plain
/// removal.
fn decode_removal_params<R, A>(
	source: TagOrKey,
	params: Value,
	remover: Option<RemoverDecoder<R, A>>,
	conditions: &ConditionContext,
) -> Result<Option<Removal<R, A>>, FileError> {
	if let Some(decode) = remover {
		match decode(params.clone()) {
			Ok(remover) => {
				return Ok(Some(Removal {
					source,
					remover: Some(remover),
				}));
			}
			Err(error) if !params.is_array() => {
				return Err(FileError::Remover {
					reference: source,
					error,
				});
			}
			Err(_) => {}
		}
	}
	if !params.is_array() {
		return Err(FileError::RemoverUnsupported(source));
	}
	let guard = parse_conditions(&source, params)?;
	Ok(all_hold(&guard, conditions).then_some(Removal { source, remover: None }))
}

fn decode_with<R, A>(
	remover: Option<RemoverDecoder<R, A>>,
	reference: &TagOrKey,
	params: Value,
) -> Result<Box<dyn DataMapValueRemover<R, A>>, FileError> {
	let decode = remover.ok_or_else(|| FileError::RemoverUnsupported(reference.clone()))?;
	decode(params).map_err(|error| FileError::Remover {
		reference: reference.clone(),
		error,
	})
}
