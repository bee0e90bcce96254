// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! JSON bodies of the transaction endpoint

use crate::error::Failure;
use crate::exec::{QueryResult, QueryStatistics};
use crate::storage::{PropertyMap, Value};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionRequest {
    #[serde(default)]
    pub statements: Vec<StatementRequest>,
}

impl TransactionRequest {
    /// An empty body is a request without statements
    pub fn from_body(body: &[u8]) -> Result<Self, serde_json::Error> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatementRequest {
    pub statement: String,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
    #[serde(default, rename = "includeStats")]
    pub include_stats: bool,
}

impl StatementRequest {
    pub fn parameter_map(&self) -> PropertyMap {
        self.parameters
            .iter()
            .map(|(k, v)| (k.clone(), Value::from_json(v)))
            .collect()
    }
}

#[derive(Debug, Default, Serialize)]
pub struct TransactionResponse {
    pub results: Vec<StatementResult>,
    pub errors: Vec<Failure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<TransactionInfo>,
    #[serde(rename = "lastBookmarks", skip_serializing_if = "Vec::is_empty")]
    pub last_bookmarks: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TransactionInfo {
    /// RFC 1123 timestamp
    pub expires: String,
}

#[derive(Debug, Serialize)]
pub struct StatementResult {
    pub columns: Vec<String>,
    pub data: Vec<ResultRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<QueryStatistics>,
}

impl StatementResult {
    pub fn from_result(result: QueryResult, include_stats: bool) -> Self {
        let data = result
            .rows
            .iter()
            .map(|row| ResultRow {
                row: row.iter().map(Value::to_json).collect(),
                meta: row.iter().map(row_meta).collect(),
            })
            .collect();
        Self {
            columns: result.columns,
            data,
            stats: include_stats.then_some(result.stats),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ResultRow {
    pub row: Vec<serde_json::Value>,
    pub meta: Vec<serde_json::Value>,
}

fn row_meta(value: &Value) -> serde_json::Value {
    let (id, kind) = match value {
        Value::Node(node) => (node.id, "node"),
        Value::Relationship(rel) => (rel.id, "relationship"),
        _ => return serde_json::Value::Null,
    };
    serde_json::json!({
        "id": id.wire_id(),
        "elementId": id.element_id(),
        "type": kind,
        "deleted": false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{EntityRef, NodeValue};

    #[test]
    fn test_request_parsing() {
        assert!(TransactionRequest::from_body(b"").unwrap().statements.is_empty());
        let request = TransactionRequest::from_body(
            br#"{"statements":[{"statement":"RETURN $x","parameters":{"x":[1,"a"]}}]}"#,
        )
        .unwrap();
        let params = request.statements[0].parameter_map();
        assert_eq!(
            params.get("x"),
            Some(&Value::List(vec![Value::Integer(1), Value::from("a")]))
        );
        assert!(TransactionRequest::from_body(b"{not json").is_err());
    }

    #[test]
    fn test_row_meta_for_nodes() {
        let node = Value::Node(NodeValue {
            id: EntityRef::Permanent(7),
            labels: vec!["Person".to_string()],
            properties: [("name".to_string(), Value::from("Ann"))].into_iter().collect(),
        });
        let result = QueryResult::new(vec!["n".to_string(), "x".to_string()], vec![vec![node, Value::Integer(1)]]);
        let json = serde_json::to_value(StatementResult::from_result(result, false)).unwrap();
        assert_eq!(json["data"][0]["row"][0]["name"], "Ann");
        assert_eq!(json["data"][0]["meta"][0]["id"], 7);
        assert_eq!(json["data"][0]["meta"][0]["type"], "node");
        assert!(json["data"][0]["meta"][1].is_null());
        assert!(json.get("stats").is_none());
    }
}
