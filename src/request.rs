use serde::Deserialize;
use serde::Serialize;

use crate::json_ext::Object;

/// A GraphQL request as received from the HTTP boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// The GraphQL query text.
    pub query: String,

    /// The optional operation name.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub operation_name: Option<String>,

    /// The optional variables in the form of a JSON object.
    #[serde(
        skip_serializing_if = "Object::is_empty",
        default,
        deserialize_with = "deserialize_null_default"
    )]
    pub variables: Object,
}

impl Request {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            operation_name: None,
            variables: Object::new(),
        }
    }

    pub fn with_variables(query: impl Into<String>, variables: Object) -> Self {
        Self {
            query: query.into(),
            operation_name: None,
            variables,
        }
    }
}

impl From<Request> for async_graphql::Request {
    fn from(request: Request) -> Self {
        let mut inner = async_graphql::Request::new(request.query).variables(
            async_graphql::Variables::from_json(serde_json::Value::Object(request.variables)),
        );
        if let Some(operation_name) = request.operation_name {
            inner = inner.operation_name(operation_name);
        }
        inner
    }
}

// transforms `null` variables to an empty object
fn deserialize_null_default<'de, D, T: Default + Deserialize<'de>>(
    deserializer: D,
) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
{
    <Option<T>>::deserialize(deserializer).map(|x| x.unwrap_or_default())
}
