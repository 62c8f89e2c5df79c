//! In-memory search index tools.
//!
//! Three tools share one [`SearchIndexStore`]: `index_create` makes a named
//! index, `index_upload` appends documents, `index_search` ranks documents
//! by keyword overlap with the query. Good enough for the agent to stash
//! intermediate findings and retrieve them later in a run.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use loopwright_core::error::ToolError;
use loopwright_core::tool::Tool;

const DEFAULT_TOP: usize = 5;

/// Shared document store backing the index tools.
#[derive(Clone, Default)]
pub struct SearchIndexStore {
    indexes: Arc<Mutex<HashMap<String, Vec<serde_json::Value>>>>,
}

impl SearchIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn create(&self, name: &str) -> Result<bool, ToolError> {
        let mut indexes = self.lock()?;
        Ok(indexes.entry(name.to_string()).or_default().is_empty())
    }

    fn upload(&self, name: &str, documents: Vec<serde_json::Value>) -> Result<usize, ToolError> {
        let mut indexes = self.lock()?;
        let index = indexes
            .get_mut(name)
            .ok_or_else(|| ToolError::ExecutionFailed {
                tool_name: "index_upload".into(),
                reason: format!("Index '{name}' does not exist; create it first"),
            })?;
        index.extend(documents);
        Ok(index.len())
    }

    fn search(
        &self,
        name: &str,
        query: &str,
        top: usize,
    ) -> Result<Vec<serde_json::Value>, ToolError> {
        let indexes = self.lock()?;
        let index = indexes
            .get(name)
            .ok_or_else(|| ToolError::ExecutionFailed {
                tool_name: "index_search".into(),
                reason: format!("Index '{name}' does not exist"),
            })?;

        let terms: Vec<String> = tokenize(query);
        let mut scored: Vec<(usize, &serde_json::Value)> = index
            .iter()
            .map(|doc| (score(doc, &terms), doc))
            .filter(|(s, _)| *s > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(top)
            .map(|(score, doc)| {
                serde_json::json!({
                    "score": score,
                    "document": doc,
                })
            })
            .collect())
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<serde_json::Value>>>, ToolError>
    {
        self.indexes
            .lock()
            .map_err(|_| ToolError::ExecutionFailed {
                tool_name: "index".into(),
                reason: "Index store lock poisoned".into(),
            })
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Term-overlap score: how many query terms appear anywhere in the
/// document's string values.
fn score(doc: &serde_json::Value, terms: &[String]) -> usize {
    let mut text = String::new();
    collect_strings(doc, &mut text);
    let doc_terms = tokenize(&text);
    terms
        .iter()
        .filter(|t| doc_terms.iter().any(|d| d == *t))
        .count()
}

fn collect_strings(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::String(s) => {
            out.push_str(s);
            out.push(' ');
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_strings(item, out);
            }
        }
        serde_json::Value::Object(map) => {
            for (key, item) in map {
                out.push_str(key);
                out.push(' ');
                collect_strings(item, out);
            }
        }
        serde_json::Value::Number(n) => {
            out.push_str(&n.to_string());
            out.push(' ');
        }
        _ => {}
    }
}

// ── Tools ──

pub struct IndexCreateTool {
    store: SearchIndexStore,
}

impl IndexCreateTool {
    pub fn new(store: SearchIndexStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for IndexCreateTool {
    fn name(&self) -> &str {
        "index_create"
    }

    fn description(&self) -> &str {
        "Create a named search index for storing and retrieving documents."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "index": {
                    "type": "string",
                    "description": "Name of the index to create"
                }
            },
            "required": ["index"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let name = arguments["index"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'index' argument".into()))?;

        let created = self.store.create(name)?;
        Ok(serde_json::json!({
            "index": name,
            "created": created,
        }))
    }
}

pub struct IndexUploadTool {
    store: SearchIndexStore,
}

impl IndexUploadTool {
    pub fn new(store: SearchIndexStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for IndexUploadTool {
    fn name(&self) -> &str {
        "index_upload"
    }

    fn description(&self) -> &str {
        "Upload documents to an existing search index."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "index": {
                    "type": "string",
                    "description": "Name of the index to upload to"
                },
                "documents": {
                    "type": "array",
                    "description": "Documents to add to the index"
                }
            },
            "required": ["index", "documents"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let name = arguments["index"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'index' argument".into()))?;
        let documents = arguments["documents"]
            .as_array()
            .cloned()
            .ok_or_else(|| {
                ToolError::InvalidArguments("'documents' must be an array".into())
            })?;

        let uploaded = documents.len();
        let total = self.store.upload(name, documents)?;
        Ok(serde_json::json!({
            "index": name,
            "uploaded": uploaded,
            "total_documents": total,
        }))
    }
}

pub struct IndexSearchTool {
    store: SearchIndexStore,
}

impl IndexSearchTool {
    pub fn new(store: SearchIndexStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for IndexSearchTool {
    fn name(&self) -> &str {
        "index_search"
    }

    fn description(&self) -> &str {
        "Search an index by keyword and return the best-matching documents."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "index": {
                    "type": "string",
                    "description": "Name of the index to search"
                },
                "query": {
                    "type": "string",
                    "description": "Keyword query"
                },
                "top": {
                    "type": "integer",
                    "description": "Maximum number of results (default 5)"
                }
            },
            "required": ["index", "query"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let name = arguments["index"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'index' argument".into()))?;
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;
        let top = arguments["top"].as_u64().unwrap_or(DEFAULT_TOP as u64) as usize;

        let results = self.store.search(name, query, top)?;
        Ok(serde_json::json!({
            "index": name,
            "count": results.len(),
            "results": results,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trio() -> (IndexCreateTool, IndexUploadTool, IndexSearchTool) {
        let store = SearchIndexStore::new();
        (
            IndexCreateTool::new(store.clone()),
            IndexUploadTool::new(store.clone()),
            IndexSearchTool::new(store),
        )
    }

    #[tokio::test]
    async fn create_upload_search_flow() {
        let (create, upload, search) = trio();

        create
            .invoke(serde_json::json!({"index": "facts"}))
            .await
            .unwrap();

        let result = upload
            .invoke(serde_json::json!({
                "index": "facts",
                "documents": [
                    {"id": "1", "text": "The capital of France is Paris"},
                    {"id": "2", "text": "Rust has a borrow checker"},
                ]
            }))
            .await
            .unwrap();
        assert_eq!(result["uploaded"], 2);

        let hits = search
            .invoke(serde_json::json!({"index": "facts", "query": "borrow checker"}))
            .await
            .unwrap();
        assert_eq!(hits["count"], 1);
        assert_eq!(hits["results"][0]["document"]["id"], "2");
    }

    #[tokio::test]
    async fn best_match_ranks_first() {
        let (create, upload, search) = trio();
        create
            .invoke(serde_json::json!({"index": "i"}))
            .await
            .unwrap();
        upload
            .invoke(serde_json::json!({
                "index": "i",
                "documents": [
                    {"text": "paris weather"},
                    {"text": "paris weather forecast today"},
                ]
            }))
            .await
            .unwrap();

        let hits = search
            .invoke(serde_json::json!({
                "index": "i",
                "query": "paris weather forecast",
                "top": 1
            }))
            .await
            .unwrap();
        assert_eq!(
            hits["results"][0]["document"]["text"],
            "paris weather forecast today"
        );
    }

    #[tokio::test]
    async fn upload_to_missing_index_fails() {
        let (_, upload, _) = trio();
        let result = upload
            .invoke(serde_json::json!({"index": "nope", "documents": []}))
            .await;
        assert!(matches!(result, Err(ToolError::ExecutionFailed { .. })));
    }

    #[tokio::test]
    async fn search_missing_index_fails() {
        let (_, _, search) = trio();
        let result = search
            .invoke(serde_json::json!({"index": "nope", "query": "x"}))
            .await;
        assert!(matches!(result, Err(ToolError::ExecutionFailed { .. })));
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let (create, upload, _) = trio();
        create.invoke(serde_json::json!({"index": "i"})).await.unwrap();
        upload
            .invoke(serde_json::json!({"index": "i", "documents": [{"a": "b"}]}))
            .await
            .unwrap();

        let again = create
            .invoke(serde_json::json!({"index": "i"}))
            .await
            .unwrap();
        assert_eq!(again["created"], false);
    }
}
