use serde_json::Value;

use crate::error::FetchError;
use crate::json_ext::Object;

/// Marker key resolving from the GraphQL call arguments.
pub const ARG_MARKER: &str = "$arg";
/// Marker key resolving from the parent result document.
pub const FK_MARKER: &str = "$fk";

/// Resolve a query template against the call arguments and the parent
/// document.
///
/// At each object level a `$arg` or `$fk` marker short-circuits resolution of
/// that subtree: the marker's binding replaces the whole subtree and sibling
/// keys are ignored. Without a marker, resolution recurses into object values
/// only; scalars and arrays pass through verbatim.
///
/// Pure and deterministic: calling twice with identical inputs yields
/// identical output.
pub fn interpolate(
    template: &Value,
    args: &Object,
    parent: Option<&Value>,
) -> Result<Value, FetchError> {
    let map = match template {
        Value::Object(map) => map,
        other => return Ok(other.clone()),
    };

    if let Some(name) = marker_name(map, ARG_MARKER)? {
        let value = args
            .get(&name)
            .filter(|value| !value.is_null())
            .ok_or_else(|| FetchError::VariableNotBound { name: name.clone() })?;
        return Ok(value.clone());
    }
    if let Some(name) = marker_name(map, FK_MARKER)? {
        let value = parent
            .and_then(|parent| parent.get(&name))
            .filter(|value| !value.is_null())
            .ok_or_else(|| FetchError::FieldNotBound { name: name.clone() })?;
        return Ok(value.clone());
    }

    let mut resolved = Object::new();
    for (key, value) in map {
        match value {
            Value::Object(_) => {
                resolved.insert(key.clone(), interpolate(value, args, parent)?);
            }
            other => {
                resolved.insert(key.clone(), other.clone());
            }
        }
    }
    Ok(Value::Object(resolved))
}

fn marker_name(map: &Object, marker: &'static str) -> Result<Option<String>, FetchError> {
    match map.get(marker) {
        None => Ok(None),
        Some(Value::String(name)) => Ok(Some(name.clone())),
        Some(_) => Err(FetchError::InvalidMarker { marker }),
    }
}

/// Unwrap the single-key wrapper convention used by the `sort`, `skip`,
/// `limit` and `first` template slots: the resolved document must hold
/// exactly one key, whose value is the effective one. The wrapper key name
/// itself is free-form.
pub(crate) fn unwrap_slot(slot: &'static str, resolved: Value) -> Result<Value, FetchError> {
    match resolved {
        Value::Object(map) => {
            let mut entries = map.into_iter();
            match (entries.next(), entries.next()) {
                (Some((_, value)), None) => Ok(value),
                _ => Err(FetchError::MalformedTemplate {
                    slot,
                    reason: "expected exactly one wrapper key".to_string(),
                }),
            }
        }
        _ => Err(FetchError::MalformedTemplate {
            slot,
            reason: "expected a wrapper document".to_string(),
        }),
    }
}
