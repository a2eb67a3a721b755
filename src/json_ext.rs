use serde_json::Value;

/// A JSON object (key order preserved).
pub type Object = serde_json::Map<String, Value>;

/// Extension trait for navigating JSON documents.
pub trait ValueExt {
    /// Walk a dotted alias path into the document.
    ///
    /// Returns `None` if any path segment is missing or crosses a non-object
    /// value; arrays are not traversed.
    fn get_path(&self, path: &[String]) -> Option<&Value>;
}

impl ValueExt for Value {
    fn get_path(&self, path: &[String]) -> Option<&Value> {
        path.iter()
            .try_fold(self, |doc, segment| doc.as_object()?.get(segment))
    }
}
