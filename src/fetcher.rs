use serde_json::Value;

use crate::definition::Mapping;
use crate::definition::MappingTable;
use crate::definition::QueryMapping;
use crate::definition::TEMPLATE_SLOTS;
use crate::error::FetchError;
use crate::interpolate::interpolate;
use crate::interpolate::unwrap_slot;
use crate::interpolate::FK_MARKER;
use crate::json_ext::Object;
use crate::store::DocumentStore;
use crate::store::StoreQuery;

/// Build the fully-resolved store query for one field invocation.
///
/// All template slots interpolate against the same arguments and parent
/// document. `sort`, `skip`, `limit` and `first` follow the single-key
/// wrapper convention; `first` folds into the effective limit, taking the
/// smaller of the two when both are given.
pub fn resolve_query(
    mapping: &QueryMapping,
    args: &Object,
    parent: Option<&Value>,
    projection: Vec<String>,
) -> Result<StoreQuery, FetchError> {
    let filter = mapping
        .find
        .as_ref()
        .map(|template| interpolate(template, args, parent))
        .transpose()?;
    let sort = resolve_slot("sort", mapping.sort.as_ref(), args, parent)?;
    let skip = resolve_count_slot("skip", mapping.skip.as_ref(), args, parent)?;
    let limit = resolve_count_slot("limit", mapping.limit.as_ref(), args, parent)?;
    let first = resolve_count_slot("first", mapping.first.as_ref(), args, parent)?;

    let limit = match (limit, first) {
        (Some(limit), Some(first)) => Some(limit.min(first)),
        (limit, first) => limit.or(first),
    };

    Ok(StoreQuery {
        db: mapping.db.clone(),
        collection: mapping.collection.clone(),
        filter,
        sort,
        skip,
        limit,
        projection,
    })
}

/// Execute a single-result field: find-one with the resolved filter.
pub async fn fetch_single(
    store: &dyn DocumentStore,
    mapping: &QueryMapping,
    args: &Object,
    parent: Option<&Value>,
    projection: Vec<String>,
) -> Result<Option<Value>, FetchError> {
    let query = resolve_query(mapping, args, parent, projection)?;
    Ok(store.find_one(&query).await?)
}

/// Execute a multi-result field: find-many with the resolved filter, sort,
/// skip and limit. An empty list is a valid result.
pub async fn fetch_multiple(
    store: &dyn DocumentStore,
    mapping: &QueryMapping,
    args: &Object,
    parent: Option<&Value>,
    projection: Vec<String>,
) -> Result<Vec<Value>, FetchError> {
    let query = resolve_query(mapping, args, parent, projection)?;
    Ok(store.find_many(&query).await?)
}

/// Translate a GraphQL selection set into the document fields the result
/// documents must carry: a plain field reads its own key, a renamed field
/// reads the first segment of its alias path, and a query-mapped child field
/// reads the parent fields its `$fk` references name. An empty selection
/// yields an empty projection, i.e. whole documents.
pub fn projection_for(
    mappings: &MappingTable,
    type_name: &str,
    selected: &[String],
) -> Vec<String> {
    let fields = mappings.get(type_name);
    let mut projection = Vec::new();
    for name in selected {
        match fields.and_then(|fields| fields.get(name)) {
            None => projection.push(name.clone()),
            Some(Mapping::FieldRenaming { alias_path }) => {
                if let Some(first) = alias_path.first() {
                    projection.push(first.clone());
                }
            }
            Some(Mapping::Query(mapping)) => {
                for slot in TEMPLATE_SLOTS {
                    if let Some(template) = mapping.slot(slot) {
                        collect_fk_references(template, &mut projection);
                    }
                }
            }
        }
    }
    projection.sort();
    projection.dedup();
    projection
}

fn collect_fk_references(template: &Value, out: &mut Vec<String>) {
    if let Value::Object(map) = template {
        if let Some(Value::String(name)) = map.get(FK_MARKER) {
            out.push(name.clone());
            return;
        }
        for value in map.values() {
            collect_fk_references(value, out);
        }
    }
}

fn resolve_slot(
    slot: &'static str,
    template: Option<&Value>,
    args: &Object,
    parent: Option<&Value>,
) -> Result<Option<Value>, FetchError> {
    template
        .map(|template| interpolate(template, args, parent).and_then(|v| unwrap_slot(slot, v)))
        .transpose()
}

fn resolve_count_slot(
    slot: &'static str,
    template: Option<&Value>,
    args: &Object,
    parent: Option<&Value>,
) -> Result<Option<u64>, FetchError> {
    match resolve_slot(slot, template, args, parent)? {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .map(Some)
            .ok_or_else(|| FetchError::MalformedTemplate {
                slot,
                reason: "expected an unsigned integer".to_string(),
            }),
    }
}
