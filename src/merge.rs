//! Deep merging of configuration mappings.
//!
//! Later mappings win. Nested mappings are merged key by key; sequences and
//! scalars are replaced as a whole, never concatenated.

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// A configuration mapping as loaded from YAML/JSON.
pub type Mapping = Map<String, Value>;

/// Merges `update` into `base` in place.
pub fn deep_merge(base: &mut Mapping, update: &Mapping) {
    for (key, value) in update {
        if let (Some(Value::Object(existing)), Value::Object(incoming)) =
            (base.get_mut(key), value)
        {
            deep_merge(existing, incoming);
            continue;
        }
        base.insert(key.clone(), value.clone());
    }
}

/// Merges an ordered chain of mappings, least specific first.
pub fn merge<'a, I>(chain: I) -> Mapping
where
    I: IntoIterator<Item = &'a Mapping>,
{
    let mut merged = Mapping::new();
    for unit in chain {
        deep_merge(&mut merged, unit);
    }
    merged
}

/// Merges a chain of untyped values.
///
/// `null` counts as an empty unit. Any other non-mapping value is rejected.
pub fn merge_values(chain: &[Value]) -> Result<Mapping> {
    let mut merged = Mapping::new();
    for (position, value) in chain.iter().enumerate() {
        match value {
            Value::Object(unit) => deep_merge(&mut merged, unit),
            Value::Null => {}
            other => {
                return Err(Error::ConfigError(format!(
                    "configuration unit #{} must be a mapping, got {}",
                    position + 1,
                    type_name(other)
                )))
            }
        }
    }
    Ok(merged)
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}
