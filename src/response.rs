use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::json_ext::Object;

/// A GraphQL response, per the standard response shape.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// The response data.
    #[serde(default)]
    pub data: Value,

    /// The GraphQL errors encountered, if any.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<Error>,
}

impl Response {
    /// Convert an engine execution result into the boundary shape.
    ///
    /// The engine drops errored fields from `data` entirely; clients expect a
    /// field error to leave the field present and null, so every error path
    /// is written back into `data` as an explicit null.
    pub(crate) fn from_execution(response: async_graphql::Response) -> Self {
        let errors: Vec<Error> = response.errors.iter().map(Error::from_server_error).collect();
        let mut data = response.data.into_json().unwrap_or(Value::Null);
        for error in &errors {
            if let Some(Value::Array(path)) = &error.path {
                materialize_null(&mut data, path);
            }
        }
        Self { data, errors }
    }
}

/// Ensure `data` holds an explicit null at `path`, creating intermediate
/// objects on the way down. Paths through list positions that no longer exist
/// are left alone; request-level errors carry no path and never reach here.
fn materialize_null(data: &mut Value, path: &[Value]) {
    let (segment, rest) = match path.split_first() {
        Some(split) => split,
        None => return,
    };
    if let Some(items) = data.as_array_mut() {
        let index = match segment {
            Value::Number(index) => index.as_u64().map(|index| index as usize),
            Value::String(index) => index.parse().ok(),
            _ => None,
        };
        if let Some(slot) = index.and_then(|index| items.get_mut(index)) {
            materialize_null(slot, rest);
        }
        return;
    }
    let name = match segment {
        Value::String(name) => name,
        _ => return,
    };
    if data.is_null() {
        *data = Value::Object(Object::new());
    }
    let map = match data.as_object_mut() {
        Some(map) => map,
        None => return,
    };
    let slot = map.entry(name.clone()).or_insert(Value::Null);
    if !rest.is_empty() {
        materialize_null(slot, rest);
    }
}

/// A GraphQL error as found in the `errors` field of a [`Response`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Error {
    /// The error message.
    pub message: String,

    /// The locations of the error in the originating request.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub locations: Vec<Location>,

    /// If this is a field error, the path to that field in [`Response::data`].
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub path: Option<Value>,

    /// The optional GraphQL extensions for this error.
    #[serde(skip_serializing_if = "Object::is_empty", default)]
    pub extensions: Object,
}

/// The line/column position of an error in the request document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl Error {
    fn from_server_error(error: &async_graphql::ServerError) -> Self {
        let locations = error
            .locations
            .iter()
            .map(|pos| Location {
                line: pos.line,
                column: pos.column,
            })
            .collect();
        let mut path = if error.path.is_empty() {
            None
        } else {
            let segments = error
                .path
                .iter()
                .map(|segment| match segment {
                    async_graphql::PathSegment::Field(name) => Value::String(name.clone()),
                    async_graphql::PathSegment::Index(index) => Value::from(*index),
                })
                .collect();
            Some(Value::Array(segments))
        };
        let mut extensions = error
            .extensions
            .as_ref()
            .and_then(|values| serde_json::to_value(values).ok())
            .and_then(|value| match value {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .unwrap_or_default();
        // resolvers record the field path in extensions because the engine
        // does not fill in `ServerError::path` for dynamic fields; promote it
        // to the standard error position
        if path.is_none() {
            match extensions.remove("path") {
                Some(recorded @ Value::Array(_)) => path = Some(recorded),
                Some(other) => {
                    extensions.insert("path".to_string(), other);
                }
                None => {}
            }
        }
        Self {
            message: error.message.clone(),
            locations,
            path,
            extensions,
        }
    }
}
