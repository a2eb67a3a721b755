//! End-to-end scenarios: stored definition documents compiled and executed
//! over the in-memory document store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use serde_json::Value;

use docql::AppRouter;
use docql::CacheConfig;
use docql::DefinitionSource;
use docql::MemoryStore;
use docql::Request;
use docql::RouterError;
use docql::StoreError;

/// A definition source over a fixed set of stored documents.
struct FixedSource {
    definitions: Vec<Value>,
}

#[async_trait]
impl DefinitionSource for FixedSource {
    async fn fetch(&self, uri: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .definitions
            .iter()
            .find(|doc| doc["descriptor"]["uri"] == json!(uri) || doc["descriptor"]["name"] == json!(uri))
            .cloned())
    }
}

fn library_definition() -> Value {
    json!({
        "descriptor": { "name": "library", "description": "books over GraphQL" },
        "schema": "\
            type Query { books(id: String): [Book] book(title: String): Book }\n\
            type Book { title: String year: Int author: Author displayName: String }\n\
            type Author { name: String }",
        "mappings": {
            "Query": {
                "books": {
                    "db": "d",
                    "collection": "books",
                    "find": { "authorId": { "$arg": "id" } },
                    "sort": { "by": { "year": 1 } },
                    "multiple": true,
                },
                "book": {
                    "db": "d",
                    "collection": "books",
                    "find": { "title": { "$arg": "title" } },
                },
            },
            "Book": {
                "author": {
                    "db": "d",
                    "collection": "authors",
                    "find": { "_id": { "$fk": "authorId" } },
                },
                "displayName": "meta.displayName",
            },
        },
    })
}

fn library_store() -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    store.insert_collection(
        "d",
        "books",
        vec![
            json!({"title": "Second", "authorId": "42", "year": 2001,
                   "meta": {"displayName": "Second Edition"}}),
            json!({"title": "First", "authorId": "42", "year": 1999,
                   "meta": {"displayName": "First Edition"}}),
            json!({"title": "Other", "authorId": "7", "year": 2010}),
        ],
    );
    store.insert_collection("d", "authors", vec![json!({"_id": "42", "name": "Ada"})]);
    Arc::new(store)
}

fn router(definitions: Vec<Value>) -> AppRouter {
    AppRouter::new(
        Arc::new(FixedSource { definitions }),
        library_store(),
        CacheConfig::default(),
    )
}

#[tokio::test]
async fn multiple_fetcher_resolves_a_root_list_field() {
    let router = router(vec![library_definition()]);
    let mut variables = serde_json::Map::new();
    variables.insert("id".to_string(), json!("42"));
    let response = router
        .handle(
            "library",
            Request::with_variables("query($id: String) { books(id: $id) { title } }", variables),
        )
        .await
        .unwrap();

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(
        response.data,
        json!({"books": [{"title": "First"}, {"title": "Second"}]}),
    );
}

#[tokio::test]
async fn nested_field_resolves_through_the_parent_document() {
    let router = router(vec![library_definition()]);
    let response = router
        .handle(
            "library",
            Request::new(r#"{ book(title: "First") { title author { name } } }"#),
        )
        .await
        .unwrap();

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(
        response.data,
        json!({"book": {"title": "First", "author": {"name": "Ada"}}}),
    );
}

#[tokio::test]
async fn field_renaming_navigates_a_dotted_path() {
    let router = router(vec![library_definition()]);
    let response = router
        .handle(
            "library",
            Request::new(r#"{ book(title: "First") { displayName } }"#),
        )
        .await
        .unwrap();

    assert_eq!(response.data, json!({"book": {"displayName": "First Edition"}}));

    // a document without the aliased path resolves the field to null
    let response = router
        .handle(
            "library",
            Request::new(r#"{ book(title: "Other") { displayName } }"#),
        )
        .await
        .unwrap();
    assert_eq!(response.data, json!({"book": {"displayName": null}}));
}

#[tokio::test]
async fn unbound_variable_is_a_field_error_not_a_crash() {
    let router = router(vec![library_definition()]);
    let response = router
        .handle("library", Request::new("{ books { title } }"))
        .await
        .unwrap();

    assert_eq!(response.data, json!({"books": null}));
    assert_eq!(response.errors.len(), 1);
    assert!(response.errors[0].message.contains("'id'"));
    assert_eq!(response.errors[0].path, Some(json!(["books"])));
}

#[tokio::test]
async fn sibling_fields_still_resolve_next_to_a_failing_one() {
    let router = router(vec![library_definition()]);
    let response = router
        .handle(
            "library",
            Request::new(r#"{ books { title } book(title: "First") { title } }"#),
        )
        .await
        .unwrap();

    let data = response.data.as_object().expect("data must be an object");
    assert_eq!(data["book"], json!({"title": "First"}));
    // the failing field stays in the response as an explicit null
    assert!(data.contains_key("books"));
    assert_eq!(data["books"], json!(null));
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].path, Some(json!(["books"])));
}

#[tokio::test]
async fn malformed_definition_is_a_load_error() {
    let mut broken = library_definition();
    broken.as_object_mut().unwrap().remove("schema");
    let router = router(vec![broken]);

    let err = router
        .handle("library", Request::new("{ books { title } }"))
        .await
        .unwrap_err();
    match err {
        RouterError::Load(load) => assert!(load.to_string().contains("schema")),
        other => panic!("expected a load error, got {other}"),
    }
}

#[tokio::test]
async fn unknown_application_is_not_found() {
    let router = router(vec![library_definition()]);
    let err = router
        .handle("nonexistent", Request::new("{ books { title } }"))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::ApplicationNotFound { .. }));
}

#[tokio::test]
async fn disabled_application_is_not_served() {
    let mut definition = library_definition();
    definition["descriptor"]["enabled"] = json!(false);
    let router = router(vec![definition]);

    let err = router
        .handle("library", Request::new("{ books { title } }"))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::ApplicationNotFound { .. }));
}

#[tokio::test]
async fn reload_after_ttl_serves_the_latest_definition() {
    let store = library_store();
    let updating = Arc::new(UpdatingSource::new(library_definition()));
    let router = AppRouter::new(
        Arc::clone(&updating) as Arc<dyn DefinitionSource>,
        store,
        CacheConfig {
            capacity: 8,
            ttl: Duration::from_millis(50),
        },
    );

    let response = router
        .handle("library", Request::new(r#"{ book(title: "First") { title } }"#))
        .await
        .unwrap();
    assert!(response.errors.is_empty());

    // swap in a definition whose book mapping filters on year instead
    let mut updated = library_definition();
    updated["mappings"]["Query"]["book"]["find"] = json!({"year": {"$arg": "title"}});
    updating.set(updated);
    tokio::time::sleep(Duration::from_millis(120)).await;

    let response = router
        .handle("library", Request::new(r#"{ book(title: "First") { title } }"#))
        .await
        .unwrap();
    assert_eq!(response.data, json!({"book": null}));
}

struct UpdatingSource {
    definition: std::sync::Mutex<Value>,
}

impl UpdatingSource {
    fn new(definition: Value) -> Self {
        Self {
            definition: std::sync::Mutex::new(definition),
        }
    }

    fn set(&self, definition: Value) {
        *self.definition.lock().unwrap() = definition;
    }
}

#[async_trait]
impl DefinitionSource for UpdatingSource {
    async fn fetch(&self, _uri: &str) -> Result<Option<Value>, StoreError> {
        Ok(Some(self.definition.lock().unwrap().clone()))
    }
}
