use serde_json::{Map, Value};

use crate::error::ValidationError;

pub(crate) fn as_object<'a>(
    value: &'a Value,
    path: &str,
) -> Result<&'a Map<String, Value>, ValidationError> {
    value
        .as_object()
        .ok_or_else(|| ValidationError::wrong_type(path, "an object"))
}

pub(crate) fn as_array<'a>(value: &'a Value, path: &str) -> Result<&'a [Value], ValidationError> {
    value
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| ValidationError::wrong_type(path, "an array"))
}

pub(crate) fn field<'a>(
    object: &'a Map<String, Value>,
    name: &str,
    path: &str,
) -> Result<&'a Value, ValidationError> {
    object
        .get(name)
        .ok_or_else(|| ValidationError::missing(join(path, name)))
}

/// A JSON number and whether it was written as an integer.
pub(crate) fn number(value: &Value, path: &str) -> Result<(f64, bool), ValidationError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .map(|v| (v, n.is_i64() || n.is_u64()))
            .ok_or_else(|| ValidationError::wrong_type(path, "a number")),
        _ => Err(ValidationError::wrong_type(path, "a number")),
    }
}

/// The `_value` of every `{ "_value": <number> }` entry of `batch`.
pub(crate) fn batch_values(batch: &Value, path: &str) -> Result<Vec<f64>, ValidationError> {
    as_array(batch, path)?
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let entry_path = format!("{path}[{i}]");
            let entry = as_object(entry, &entry_path)?;
            let value = field(entry, "_value", &entry_path)?;
            number(value, &join(&entry_path, "_value")).map(|(v, _)| v)
        })
        .collect()
}

pub(crate) fn ensure_finite(value: f64, field: &'static str) -> Result<f64, ValidationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ValidationError::NonFinite { field })
    }
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}.{name}")
    }
}
