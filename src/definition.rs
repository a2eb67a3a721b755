use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::DefinitionError;
use crate::json_ext::Object;
use crate::request::Request;
use crate::response::Response;
use crate::schema::StoreHandle;
use crate::store::DocumentStore;

/// Identity and routing metadata of one application.
#[derive(Clone, Debug, PartialEq)]
pub struct AppDescriptor {
    pub name: String,
    /// Cache key and request-path segment; defaults to `name`.
    pub uri: String,
    pub description: String,
    pub enabled: bool,
}

/// A parameterized query against a target collection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryMapping {
    pub db: String,
    pub collection: String,
    /// Whether the field yields a list of documents or a single one.
    pub multiple: bool,
    pub find: Option<Value>,
    pub sort: Option<Value>,
    pub skip: Option<Value>,
    pub limit: Option<Value>,
    pub first: Option<Value>,
}

/// Template slot names of a query mapping, in resolution order.
pub const TEMPLATE_SLOTS: [&str; 5] = ["find", "sort", "skip", "limit", "first"];

/// A declarative rule binding a GraphQL type/field to either a document-path
/// rename or a parameterized document-store query.
#[derive(Clone, Debug, PartialEq)]
pub enum Mapping {
    /// A dotted path into the parent document, used verbatim as a lookup
    /// path. No query execution.
    FieldRenaming { alias_path: Vec<String> },

    /// A query against the collection named by the mapping.
    Query(QueryMapping),
}

/// Two-level mapping table: GraphQL type name, then field name.
pub type MappingTable = IndexMap<String, IndexMap<String, Mapping>>;

/// A compiled application: descriptor, SDL text, mapping table and the
/// executable schema derived from them.
///
/// Immutable after construction. The application cache replaces whole
/// instances on reload; a published instance is never patched, so concurrent
/// requests never observe a half-built mapping table.
pub struct AppDefinition {
    pub descriptor: AppDescriptor,
    pub schema_sdl: String,
    pub mappings: Arc<MappingTable>,
    executable: async_graphql::dynamic::Schema,
}

impl AppDefinition {
    /// Parse a stored definition document and compile its executable schema.
    ///
    /// A single malformed field mapping fails the whole definition: an
    /// application never runs with a partially-specified schema.
    pub fn from_document(document: &Value) -> Result<Self, DefinitionError> {
        let root = document
            .as_object()
            .ok_or(DefinitionError::WrongType {
                key: "definition",
                expected: "document",
            })?;

        let descriptor = parse_descriptor(require_object(root, "descriptor")?)?;
        let schema_sdl = require_string(root, "schema")?.to_string();
        let mappings = Arc::new(parse_mappings(require_object(root, "mappings")?)?);

        let executable = crate::schema::compile(&schema_sdl, Arc::clone(&mappings))?;
        Ok(Self {
            descriptor,
            schema_sdl,
            mappings,
            executable,
        })
    }

    /// Execute a GraphQL request against this application.
    ///
    /// The store handle travels with the request, not with the schema, so
    /// several applications can run concurrently over distinct stores.
    pub async fn execute(&self, store: Arc<dyn DocumentStore>, request: Request) -> Response {
        let request = async_graphql::Request::from(request).data(StoreHandle(store));
        Response::from_execution(self.executable.execute(request).await)
    }
}

impl fmt::Debug for AppDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppDefinition")
            .field("descriptor", &self.descriptor)
            .field("mappings", &self.mappings)
            .finish_non_exhaustive()
    }
}

fn require_object<'a>(doc: &'a Object, key: &'static str) -> Result<&'a Object, DefinitionError> {
    match doc.get(key) {
        None => Err(DefinitionError::MissingKey {
            key,
            expected: "document",
        }),
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(DefinitionError::WrongType {
            key,
            expected: "document",
        }),
    }
}

fn require_string<'a>(doc: &'a Object, key: &'static str) -> Result<&'a str, DefinitionError> {
    match doc.get(key) {
        None => Err(DefinitionError::MissingKey {
            key,
            expected: "string",
        }),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(DefinitionError::WrongType {
            key,
            expected: "string",
        }),
    }
}

fn parse_descriptor(descriptor: &Object) -> Result<AppDescriptor, DefinitionError> {
    let name = require_string(descriptor, "name")?.to_string();
    let description = require_string(descriptor, "description")?.to_string();
    let uri = match descriptor.get("uri") {
        None => name.clone(),
        Some(Value::String(uri)) => uri.clone(),
        Some(_) => {
            return Err(DefinitionError::WrongType {
                key: "uri",
                expected: "string",
            })
        }
    };
    let enabled = match descriptor.get("enabled") {
        None => true,
        Some(Value::Bool(enabled)) => *enabled,
        Some(_) => {
            return Err(DefinitionError::WrongType {
                key: "enabled",
                expected: "bool",
            })
        }
    };
    Ok(AppDescriptor {
        name,
        uri,
        description,
        enabled,
    })
}

fn parse_mappings(mappings: &Object) -> Result<MappingTable, DefinitionError> {
    let mut table = MappingTable::new();
    for (type_name, fields) in mappings {
        let fields = fields
            .as_object()
            .ok_or_else(|| DefinitionError::InvalidTypeMappings {
                type_name: type_name.clone(),
            })?;
        let mut field_table = IndexMap::new();
        for (field, value) in fields {
            let mapping = match value {
                Value::String(alias) => Mapping::FieldRenaming {
                    alias_path: alias.split('.').map(str::to_string).collect(),
                },
                Value::Object(map) => parse_query_mapping(type_name, field, map)?,
                _ => {
                    return Err(DefinitionError::InvalidMapping {
                        type_name: type_name.clone(),
                        field: field.clone(),
                        reason: "expected an alias path string or a query document".to_string(),
                    })
                }
            };
            field_table.insert(field.clone(), mapping);
        }
        table.insert(type_name.clone(), field_table);
    }
    Ok(table)
}

fn parse_query_mapping(
    type_name: &str,
    field: &str,
    map: &Object,
) -> Result<Mapping, DefinitionError> {
    let invalid = |reason: String| DefinitionError::InvalidMapping {
        type_name: type_name.to_string(),
        field: field.to_string(),
        reason,
    };

    let db = query_mapping_string(map, "db").map_err(&invalid)?;
    let collection = query_mapping_string(map, "collection").map_err(&invalid)?;

    let multiple = match map.get("multiple") {
        None => false,
        Some(Value::Bool(multiple)) => *multiple,
        Some(_) => return Err(invalid("'multiple' must be a bool".to_string())),
    };

    let mut mapping = QueryMapping {
        db,
        collection,
        multiple,
        ..Default::default()
    };
    for slot in TEMPLATE_SLOTS {
        let template = match map.get(slot) {
            None => continue,
            Some(template @ Value::Object(_)) => Some(template.clone()),
            Some(_) => {
                return Err(invalid(format!("template for '{slot}' must be a document")))
            }
        };
        match slot {
            "find" => mapping.find = template,
            "sort" => mapping.sort = template,
            "skip" => mapping.skip = template,
            "limit" => mapping.limit = template,
            "first" => mapping.first = template,
            _ => unreachable!("TEMPLATE_SLOTS is exhaustive"),
        }
    }
    Ok(Mapping::Query(mapping))
}

fn query_mapping_string(map: &Object, key: &'static str) -> Result<String, String> {
    match map.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::String(_)) => Err(format!("'{key}' must not be empty")),
        Some(_) => Err(format!("'{key}' must be a string")),
        None => Err(format!("missing required key '{key}'")),
    }
}

impl QueryMapping {
    /// Look up a template slot by name; the slot list is fixed and
    /// enumerable, see [`TEMPLATE_SLOTS`].
    pub fn slot(&self, name: &str) -> Option<&Value> {
        match name {
            "find" => self.find.as_ref(),
            "sort" => self.sort.as_ref(),
            "skip" => self.skip.as_ref(),
            "limit" => self.limit.as_ref(),
            "first" => self.first.as_ref(),
            _ => None,
        }
    }
}
