//! Compiles an SDL schema text and a mapping table into an executable schema.
//!
//! SDL parsing and query execution are delegated to the GraphQL engine; this
//! module walks the parsed type definitions and wires every object field to
//! the resolver its mapping calls for: the multiple or single data fetcher
//! for query mappings, a dotted-path lookup for field renamings, and a plain
//! same-named-key projection of the parent document for everything else.

use std::collections::HashSet;
use std::sync::Arc;

use async_graphql::dynamic;
use async_graphql::dynamic::FieldFuture;
use async_graphql::dynamic::FieldValue;
use async_graphql::parser::types as ast;
use serde_json::Value;

use crate::definition::Mapping;
use crate::definition::MappingTable;
use crate::error::DefinitionError;
use crate::error::FetchError;
use crate::fetcher::fetch_multiple;
use crate::fetcher::fetch_single;
use crate::fetcher::projection_for;
use crate::json_ext::Object;
use crate::json_ext::ValueExt;
use crate::store::DocumentStore;

/// Per-request handle to the document store, attached as execution data so
/// fetchers never rely on ambient globals.
pub(crate) struct StoreHandle(pub(crate) Arc<dyn DocumentStore>);

/// Compile `sdl` + `mappings` into an executable schema. Compilation happens
/// exactly once per loaded definition; the result is immutable and shared by
/// every request that references it.
pub(crate) fn compile(
    sdl: &str,
    mappings: Arc<MappingTable>,
) -> Result<dynamic::Schema, DefinitionError> {
    let document =
        async_graphql::parser::parse_schema(sdl).map_err(|err| DefinitionError::SchemaParse {
            reason: err.to_string(),
        })?;

    // First pass: classify type names so resolvers know whether a field
    // yields documents or leaf values, and find the operation roots.
    let mut object_types = HashSet::new();
    let mut query_root: Option<String> = None;
    let mut mutation_root: Option<String> = None;
    for definition in &document.definitions {
        match definition {
            ast::TypeSystemDefinition::Schema(schema_def) => {
                if let Some(name) = &schema_def.node.query {
                    query_root = Some(name.node.to_string());
                }
                if let Some(name) = &schema_def.node.mutation {
                    mutation_root = Some(name.node.to_string());
                }
            }
            ast::TypeSystemDefinition::Type(ty) => {
                if let ast::TypeKind::Object(_) = &ty.node.kind {
                    object_types.insert(ty.node.name.node.to_string());
                }
            }
            ast::TypeSystemDefinition::Directive(_) => {}
        }
    }
    let query_root = query_root.unwrap_or_else(|| "Query".to_string());
    let mutation_root = mutation_root
        .or_else(|| object_types.contains("Mutation").then(|| "Mutation".to_string()));

    let mut builder = dynamic::Schema::build(query_root.as_str(), mutation_root.as_deref(), None);
    for definition in &document.definitions {
        let ty = match definition {
            ast::TypeSystemDefinition::Type(ty) => &ty.node,
            _ => continue,
        };
        let name = ty.name.node.to_string();
        match &ty.kind {
            ast::TypeKind::Object(object) => {
                let mut output = dynamic::Object::new(name.clone());
                for field in &object.fields {
                    output = output.field(make_field(&name, &field.node, &mappings, &object_types));
                }
                builder = builder.register(output);
            }
            ast::TypeKind::InputObject(input) => {
                let mut output = dynamic::InputObject::new(name.clone());
                for field in &input.fields {
                    output = output.field(input_value(&field.node));
                }
                builder = builder.register(output);
            }
            ast::TypeKind::Enum(enumeration) => {
                let mut output = dynamic::Enum::new(name.clone());
                for value in &enumeration.values {
                    output = output.item(value.node.value.node.as_str());
                }
                builder = builder.register(output);
            }
            ast::TypeKind::Scalar => {
                builder = builder.register(dynamic::Scalar::new(name.clone()));
            }
            ast::TypeKind::Interface(_) => {
                return Err(DefinitionError::UnsupportedType {
                    type_name: name,
                    kind: "interface",
                })
            }
            ast::TypeKind::Union(_) => {
                return Err(DefinitionError::UnsupportedType {
                    type_name: name,
                    kind: "union",
                })
            }
        }
    }
    builder
        .finish()
        .map_err(|err| DefinitionError::SchemaBuild {
            reason: err.to_string(),
        })
}

/// Resolver flavor of one field, fixed at compile time.
#[derive(Clone)]
enum Wiring {
    Single,
    Multiple,
    Rename(Vec<String>),
    Default,
}

fn make_field(
    type_name: &str,
    field: &ast::FieldDefinition,
    mappings: &Arc<MappingTable>,
    object_types: &HashSet<String>,
) -> dynamic::Field {
    let field_name = field.name.node.to_string();
    let base_type = base_type_name(&field.ty.node).to_string();
    let object_output = object_types.contains(&base_type);
    let wiring = match mappings
        .get(type_name)
        .and_then(|fields| fields.get(&field_name))
    {
        Some(Mapping::Query(mapping)) if mapping.multiple => Wiring::Multiple,
        Some(Mapping::Query(_)) => Wiring::Single,
        Some(Mapping::FieldRenaming { alias_path }) => Wiring::Rename(alias_path.clone()),
        None => Wiring::Default,
    };

    let mappings = Arc::clone(mappings);
    let type_name = type_name.to_string();
    let resolver_field_name = field_name.clone();
    let mut output = dynamic::Field::new(field_name, type_ref(&field.ty.node), move |ctx| {
        let mappings = Arc::clone(&mappings);
        let type_name = type_name.clone();
        let field_name = resolver_field_name.clone();
        let base_type = base_type.clone();
        let wiring = wiring.clone();
        FieldFuture::new(async move {
            match wiring {
                Wiring::Single | Wiring::Multiple => {
                    resolve_query_field(
                        &ctx,
                        &mappings,
                        &type_name,
                        &field_name,
                        &base_type,
                        object_output,
                    )
                    .await
                }
                Wiring::Rename(alias_path) => {
                    let value = ctx
                        .parent_value
                        .downcast_ref::<Value>()
                        .and_then(|parent| parent.get_path(&alias_path))
                        .cloned()
                        .unwrap_or(Value::Null);
                    to_field_value(value, object_output)
                }
                Wiring::Default => {
                    let value = ctx
                        .parent_value
                        .downcast_ref::<Value>()
                        .and_then(|parent| parent.get(&field_name))
                        .cloned()
                        .unwrap_or(Value::Null);
                    to_field_value(value, object_output)
                }
            }
        })
    });
    for argument in &field.arguments {
        output = output.argument(input_value(&argument.node));
    }
    output
}

async fn resolve_query_field<'a>(
    ctx: &dynamic::ResolverContext<'_>,
    mappings: &MappingTable,
    type_name: &str,
    field_name: &str,
    base_type: &str,
    object_output: bool,
) -> async_graphql::Result<Option<FieldValue<'a>>> {
    let mapping = match mappings
        .get(type_name)
        .and_then(|fields| fields.get(field_name))
    {
        Some(Mapping::Query(mapping)) => mapping,
        _ => {
            // schema and mappings are co-compiled, so a miss here means the
            // definition drifted; the field yields null instead of aborting
            // the whole query
            let err = FetchError::MappingNotFound {
                type_name: type_name.to_string(),
                field: field_name.to_string(),
            };
            tracing::warn!("{err}");
            return Ok(None);
        }
    };

    let store = ctx.ctx.data::<StoreHandle>()?;
    let args = arguments_to_json(ctx)?;
    let parent = ctx.parent_value.downcast_ref::<Value>();
    let projection = projection_for(mappings, base_type, &selected_fields(ctx));

    if mapping.multiple {
        let documents = fetch_multiple(store.0.as_ref(), mapping, &args, parent, projection)
            .await
            .map_err(|err| field_error(ctx, err))?;
        if object_output {
            Ok(Some(FieldValue::list(
                documents.into_iter().map(FieldValue::owned_any),
            )))
        } else {
            let list = documents
                .into_iter()
                .map(async_graphql::Value::from_json)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Some(FieldValue::value(async_graphql::Value::List(list))))
        }
    } else {
        let document = fetch_single(store.0.as_ref(), mapping, &args, parent, projection)
            .await
            .map_err(|err| field_error(ctx, err))?;
        match document {
            None => Ok(None),
            Some(document) => to_field_value(document, object_output),
        }
    }
}

/// Convert a fetch failure into a GraphQL error tagged with the field's
/// response path. The engine leaves `ServerError::path` empty for dynamic
/// resolvers, so the path rides in the extensions until the response boundary
/// promotes it.
fn field_error(ctx: &dynamic::ResolverContext<'_>, err: FetchError) -> async_graphql::Error {
    use async_graphql::ErrorExtensions;

    let error = err.to_graphql_error();
    match &ctx.ctx.path_node {
        Some(node) => {
            let path = node.to_string_vec();
            error.extend_with(|_, extensions| extensions.set("path", path))
        }
        None => error,
    }
}

fn arguments_to_json(ctx: &dynamic::ResolverContext<'_>) -> async_graphql::Result<Object> {
    let mut args = Object::new();
    for (name, value) in ctx.args.as_index_map() {
        args.insert(name.to_string(), value.clone().into_json()?);
    }
    Ok(args)
}

fn selected_fields(ctx: &dynamic::ResolverContext<'_>) -> Vec<String> {
    ctx.ctx
        .field()
        .selection_set()
        .map(|field| field.name().to_string())
        .collect()
}

fn to_field_value<'a>(
    value: Value,
    object_output: bool,
) -> async_graphql::Result<Option<FieldValue<'a>>> {
    if value.is_null() {
        return Ok(None);
    }
    if object_output {
        match value {
            Value::Array(items) => Ok(Some(FieldValue::list(
                items.into_iter().map(FieldValue::owned_any),
            ))),
            document => Ok(Some(FieldValue::owned_any(document))),
        }
    } else {
        Ok(Some(FieldValue::value(async_graphql::Value::from_json(
            value,
        )?)))
    }
}

fn input_value(definition: &ast::InputValueDefinition) -> dynamic::InputValue {
    let mut input =
        dynamic::InputValue::new(definition.name.node.to_string(), type_ref(&definition.ty.node));
    if let Some(default) = &definition.default_value {
        input = input.default_value(default.node.clone());
    }
    input
}

fn type_ref(ty: &ast::Type) -> dynamic::TypeRef {
    let base = match &ty.base {
        ast::BaseType::Named(name) => dynamic::TypeRef::Named(name.to_string().into()),
        ast::BaseType::List(inner) => dynamic::TypeRef::List(Box::new(type_ref(inner))),
    };
    if ty.nullable {
        base
    } else {
        dynamic::TypeRef::NonNull(Box::new(base))
    }
}

fn base_type_name(ty: &ast::Type) -> &str {
    match &ty.base {
        ast::BaseType::Named(name) => name.as_str(),
        ast::BaseType::List(inner) => base_type_name(inner),
    }
}
