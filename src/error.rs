use std::sync::Arc;

use displaydoc::Display;
use serde::Serialize;
use thiserror::Error;

/// Errors raised while validating a stored application definition.
///
/// Any of these is fatal to loading that one application and does not affect
/// other cached applications.
#[derive(Debug, Error, Display)]
pub enum DefinitionError {
    /// definition is missing required key '{key}' (expected {expected})
    MissingKey {
        /// The absent key.
        key: &'static str,
        /// The type the key was expected to hold.
        expected: &'static str,
    },

    /// definition key '{key}' has the wrong type (expected {expected})
    WrongType {
        key: &'static str,
        expected: &'static str,
    },

    /// mappings for type '{type_name}' must be a document
    InvalidTypeMappings { type_name: String },

    /// mapping for field '{field}' of type '{type_name}' is invalid: {reason}
    InvalidMapping {
        type_name: String,
        field: String,
        reason: String,
    },

    /// schema failed to parse: {reason}
    SchemaParse { reason: String },

    /// schema failed to compile: {reason}
    SchemaBuild { reason: String },

    /// type '{type_name}' uses an unsupported definition kind ({kind})
    UnsupportedType {
        type_name: String,
        kind: &'static str,
    },
}

/// Errors raised while resolving one GraphQL field.
///
/// These are not returned to the client as-is but converted to entries of the
/// response's `errors` list; the field itself resolves to null.
#[derive(Clone, Debug, Error, Display, Serialize)]
#[serde(tag = "type")]
pub enum FetchError {
    /// query requires variable '{name}', but it was not provided
    VariableNotBound {
        /// Name of the unbound `$arg` reference.
        name: String,
    },

    /// query requires parent field '{name}', but it was not present
    FieldNotBound {
        /// Name of the unbound `$fk` reference.
        name: String,
    },

    /// no query mapping found for field '{field}' of type '{type_name}'
    MappingNotFound { type_name: String, field: String },

    /// substitution marker '{marker}' must name a string
    InvalidMarker { marker: &'static str },

    /// template for '{slot}' is malformed: {reason}
    MalformedTemplate {
        slot: &'static str,
        reason: String,
    },

    /// document store request failed: {reason}
    StoreError { reason: String },
}

impl FetchError {
    /// Convert the fetch error to a GraphQL execution error carrying the
    /// structured form of the error in its extensions.
    pub fn to_graphql_error(&self) -> async_graphql::Error {
        use async_graphql::ErrorExtensions;

        let error = async_graphql::Error::new(self.to_string());
        let details = serde_json::to_value(self)
            .ok()
            .and_then(|value| async_graphql::Value::from_json(value).ok());
        match details {
            Some(async_graphql::Value::Object(map)) => error.extend_with(|_, extensions| {
                for (key, value) in map {
                    extensions.set(key.as_str(), value);
                }
            }),
            _ => error,
        }
    }
}

impl From<crate::store::StoreError> for FetchError {
    fn from(err: crate::store::StoreError) -> Self {
        FetchError::StoreError {
            reason: err.to_string(),
        }
    }
}

/// Errors raised while loading and compiling an application definition.
///
/// Shared across all concurrent waiters of a single in-flight load, hence the
/// `Arc`-wrapped payloads.
#[derive(Clone, Debug, Error, Display)]
pub enum CacheLoadError {
    /// definition document could not be retrieved: {reason}
    Retrieval { reason: String },

    /// invalid application definition: {0}
    Invalid(Arc<DefinitionError>),

    /// in-flight definition load was abandoned
    Abandoned(#[from] crate::cache::Abandoned),
}

/// Request-boundary classification of a failed application lookup.
#[derive(Debug, Error, Display)]
pub enum RouterError {
    /// no application registered for uri '{uri}'
    ApplicationNotFound { uri: String },

    /// application failed to load: {0}
    Load(#[from] CacheLoadError),
}
