//! Canned UQL query responses.
//!
//! Responses are keyed by exact query text but looked up by substring: any
//! stored query that appears inside an incoming query fires.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Query seeded at startup returning the known agent ids.
pub const AGENT_ID_QUERY: &str = "FETCH attributes('agent.id') FROM entities";

/// Query seeded at startup returning two attribute tables.
pub const ATTRIBUTES_QUERY: &str = "FETCH attributes FROM entities";

/// Kind of a response record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    Model,
    Data,
}

/// One record of a UQL response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "type")]
    pub kind: ResponseKind,

    #[serde(default)]
    pub model: Model,

    #[serde(default)]
    pub metadata: Metadata,

    #[serde(default)]
    pub dataset: String,

    /// Rows of heterogeneous scalars
    #[serde(default)]
    pub data: Vec<Vec<Value>>,
}

impl Response {
    fn model_record(dataset: &str) -> Self {
        Self {
            kind: ResponseKind::Model,
            model: Model::default(),
            metadata: Metadata::default(),
            dataset: dataset.to_string(),
            data: Vec::new(),
        }
    }

    fn data_record(dataset: &str, rows: &[&[&str]]) -> Self {
        Self {
            kind: ResponseKind::Data,
            model: Model::default(),
            metadata: Metadata::default(),
            dataset: dataset.to_string(),
            data: rows
                .iter()
                .map(|row| row.iter().map(|cell| Value::from(*cell)).collect())
                .collect(),
        }
    }
}

/// Shape of the records in a dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub fields: Vec<Field>,

    #[serde(default, rename = "$jsonPath")]
    pub json_path: String,

    #[serde(default, rename = "$model")]
    pub model: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Field {
    #[serde(default)]
    pub alias: String,

    #[serde(default, rename = "type")]
    pub field_type: String,

    #[serde(default)]
    pub hints: Hints,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<String>,

    /// Nested model for complex fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<Box<Model>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hints {
    #[serde(default)]
    pub kind: String,

    #[serde(default)]
    pub field: String,

    #[serde(default, rename = "type")]
    pub hint_type: String,
}

/// Seconds from the Unix epoch back to `0001-01-01T00:00:00Z`.
const ZERO_TIME_SECS: i64 = -62_135_596_800;

/// Timestamp reported for an unset time bound.
pub fn zero_time() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(ZERO_TIME_SECS, 0).unwrap_or_default()
}

/// Time range a response covers. Unset bounds encode as the zero time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default = "zero_time")]
    pub since: DateTime<Utc>,

    #[serde(default = "zero_time")]
    pub until: DateTime<Utc>,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            since: zero_time(),
            until: zero_time(),
        }
    }
}

/// Body of a UQL registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UqlRegistration {
    pub query: String,

    #[serde(default)]
    pub response: Vec<Response>,
}

/// A stored query that fired for an incoming query text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UqlMatch {
    pub query: String,
    pub responses: Vec<Response>,
}

/// Thread-safe map from query text to canned responses.
///
/// Iteration follows the lexicographic order of the query keys, so
/// lookups with several hits always report them in the same order.
pub struct UqlRegistry {
    entries: RwLock<BTreeMap<String, Vec<Response>>>,
}

impl UqlRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Creates a registry holding the built-in default entries.
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        for (query, responses) in default_entries() {
            registry.put(query, responses);
        }
        registry
    }

    /// Insert or overwrite the responses for `query`.
    pub fn put(&self, query: impl Into<String>, responses: Vec<Response>) {
        let query = query.into();
        info!(query = %query, records = responses.len(), "UQL response updated");
        self.entries.write().insert(query, responses);
    }

    /// Snapshot of every entry.
    pub fn list(&self) -> BTreeMap<String, Vec<Response>> {
        self.entries.read().clone()
    }

    /// Every stored query contained in `raw`, in key order.
    pub fn lookup_by_substring(&self, raw: &str) -> Vec<UqlMatch> {
        let matches: Vec<UqlMatch> = self
            .entries
            .read()
            .iter()
            .filter(|(query, _)| raw.contains(query.as_str()))
            .map(|(query, responses)| UqlMatch {
                query: query.clone(),
                responses: responses.clone(),
            })
            .collect();

        debug!(hits = matches.len(), "UQL lookup");
        matches
    }

    /// Remove every entry, defaults included.
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        let removed = entries.len();
        entries.clear();
        info!(removed, "UQL responses cleared");
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for UqlRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn default_entries() -> Vec<(&'static str, Vec<Response>)> {
    vec![
        (
            AGENT_ID_QUERY,
            vec![
                Response::model_record("d:main"),
                Response::data_record(
                    "d:main",
                    &[
                        &["01GWM6D42R6CT30S1P64T3EB9H"],
                        &["01GWMH72CRC9GKECB560V32B9P"],
                    ],
                ),
            ],
        ),
        (
            ATTRIBUTES_QUERY,
            vec![
                Response::model_record("d:main"),
                Response::data_record(
                    "d:attributes-1",
                    &[
                        &["k8s.namespace.name", "cosmos_unit"],
                        &["platform", "k8s_2"],
                        &["agent.id", "01GWM6D42R6CT30S1P64T3EB9H"],
                        &["agent.version", "2.0"],
                    ],
                ),
                Response::data_record(
                    "d:attributes-2",
                    &[
                        &["k8s.namespace.name", "cosmos_3"],
                        &["platform", "k8s_3"],
                        &["agent.id", "01GWMH72CRC9GKECB560V32B9P"],
                        &["agent.version", "2.0"],
                    ],
                ),
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_seeded() {
        let registry = UqlRegistry::with_defaults();
        let entries = registry.list();
        assert_eq!(entries.len(), 2);

        let agent = &entries[AGENT_ID_QUERY];
        assert_eq!(agent.len(), 2);
        assert_eq!(agent[0].kind, ResponseKind::Model);
        assert!(agent[0].data.is_empty());
        assert_eq!(agent[1].kind, ResponseKind::Data);
        assert_eq!(agent[1].data.len(), 2);
        assert_eq!(agent[1].data[0], vec![json!("01GWM6D42R6CT30S1P64T3EB9H")]);

        let attributes = &entries[ATTRIBUTES_QUERY];
        assert_eq!(attributes.len(), 3);
        assert_eq!(attributes[1].dataset, "d:attributes-1");
        assert_eq!(attributes[2].dataset, "d:attributes-2");
        assert!(attributes[1..].iter().all(|r| r.data.len() == 4));
    }

    #[test]
    fn test_lookup_by_substring() {
        let registry = UqlRegistry::with_defaults();
        let hits =
            registry.lookup_by_substring("FETCH attributes('agent.id') FROM entities LIMIT 1");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].query, AGENT_ID_QUERY);
        assert_eq!(hits[0].responses.len(), 2);

        let hits = registry.lookup_by_substring("FETCH id FROM entities");
        assert!(hits.is_empty());
    }

    #[test]
    fn test_lookup_multiple_hits_in_key_order() {
        let registry = UqlRegistry::new();
        registry.put("FETCH b", vec![Response::model_record("b")]);
        registry.put("FETCH a", vec![Response::model_record("a")]);
        registry.put("FETCH c", vec![Response::model_record("c")]);

        let hits = registry.lookup_by_substring("FETCH a; FETCH b");
        let queries: Vec<_> = hits.iter().map(|h| h.query.as_str()).collect();
        assert_eq!(queries, vec!["FETCH a", "FETCH b"]);
    }

    #[test]
    fn test_put_overwrites() {
        let registry = UqlRegistry::with_defaults();
        registry.put(AGENT_ID_QUERY, vec![]);
        assert_eq!(registry.len(), 2);
        assert!(registry.list()[AGENT_ID_QUERY].is_empty());
    }

    #[test]
    fn test_clear_removes_defaults() {
        let registry = UqlRegistry::with_defaults();
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.list().is_empty());
        assert!(registry.lookup_by_substring(ATTRIBUTES_QUERY).is_empty());
    }

    #[test]
    fn test_registration_wire_format() {
        let registration: UqlRegistration = serde_json::from_value(json!({
            "query": "FETCH x",
            "response": [{
                "type": "model",
                "model": {
                    "name": "m",
                    "fields": [{
                        "alias": "id",
                        "type": "string",
                        "hints": {"kind": "attribute", "field": "id", "type": "string"}
                    }],
                    "$jsonPath": "$",
                    "$model": "entity"
                },
                "metadata": {"since": "2023-03-01T00:00:00Z", "until": "2023-03-02T00:00:00Z"},
                "dataset": "d:main",
                "data": [["a", 1, true, null]]
            }]
        }))
        .unwrap();

        let record = &registration.response[0];
        assert_eq!(record.kind, ResponseKind::Model);
        assert_eq!(record.model.json_path, "$");
        assert_eq!(record.model.fields[0].hints.hint_type, "string");
        assert!(record.metadata.since < record.metadata.until);
        assert_eq!(record.data[0].len(), 4);

        let encoded = serde_json::to_value(record).unwrap();
        assert_eq!(encoded["type"], "model");
        assert_eq!(encoded["model"]["$model"], "entity");
        assert!(encoded["model"]["fields"][0].get("form").is_none());
    }

    #[test]
    fn test_unset_metadata_encodes_zero_time() {
        let registry = UqlRegistry::with_defaults();
        let entries = registry.list();
        let record = &entries[AGENT_ID_QUERY][0];
        let encoded = serde_json::to_value(record).unwrap();
        assert_eq!(encoded["metadata"]["since"], "0001-01-01T00:00:00Z");
        assert_eq!(encoded["metadata"]["until"], "0001-01-01T00:00:00Z");

        let decoded: Response = serde_json::from_value(json!({"type": "data"})).unwrap();
        assert_eq!(decoded.metadata, Metadata::default());
        assert_eq!(decoded.metadata.since, zero_time());
    }

    #[test]
    fn test_unknown_response_kind_rejected() {
        let result = serde_json::from_value::<Response>(json!({"type": "table"}));
        assert!(result.is_err());
    }
}
