// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Statement execution results

use crate::storage::Value;
use crate::txn::IdMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of statement as reported in the final PULL metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum QueryType {
    #[default]
    Read,
    Write,
    ReadWrite,
    Schema,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Read => "r",
            QueryType::Write => "w",
            QueryType::ReadWrite => "rw",
            QueryType::Schema => "s",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Update counters for one statement
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryStatistics {
    pub nodes_created: usize,
    pub nodes_deleted: usize,
    pub relationships_created: usize,
    pub relationships_deleted: usize,
    pub properties_set: usize,
    pub labels_added: usize,
    pub labels_removed: usize,
    pub constraints_added: usize,
    pub constraints_removed: usize,
}

impl QueryStatistics {
    pub fn contains_updates(&self) -> bool {
        self.nodes_created > 0
            || self.nodes_deleted > 0
            || self.relationships_created > 0
            || self.relationships_deleted > 0
            || self.properties_set > 0
            || self.labels_added > 0
            || self.labels_removed > 0
    }

    pub fn contains_system_updates(&self) -> bool {
        self.constraints_added > 0 || self.constraints_removed > 0
    }

    pub fn merge(&mut self, other: &QueryStatistics) {
        self.nodes_created += other.nodes_created;
        self.nodes_deleted += other.nodes_deleted;
        self.relationships_created += other.relationships_created;
        self.relationships_deleted += other.relationships_deleted;
        self.properties_set += other.properties_set;
        self.labels_added += other.labels_added;
        self.labels_removed += other.labels_removed;
        self.constraints_added += other.constraints_added;
        self.constraints_removed += other.constraints_removed;
    }

    /// Non-zero counters keyed by their Neo4j names
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        let counters = [
            ("nodes-created", self.nodes_created),
            ("nodes-deleted", self.nodes_deleted),
            ("relationships-created", self.relationships_created),
            ("relationships-deleted", self.relationships_deleted),
            ("properties-set", self.properties_set),
            ("labels-added", self.labels_added),
            ("labels-removed", self.labels_removed),
            ("constraints-added", self.constraints_added),
            ("constraints-removed", self.constraints_removed),
        ];
        let mut map: BTreeMap<String, Value> = counters
            .iter()
            .filter(|(_, count)| *count > 0)
            .map(|(name, count)| (name.to_string(), Value::Integer(*count as i64)))
            .collect();
        if self.contains_updates() {
            map.insert("contains-updates".to_string(), Value::Boolean(true));
        }
        if self.contains_system_updates() {
            map.insert("contains-system-updates".to_string(), Value::Boolean(true));
        }
        map
    }
}

/// Statement execution result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names in projection order
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub stats: QueryStatistics,
    pub query_type: QueryType,
    pub execution_time_ms: u64,
    /// Set when the statement committed its own transaction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmark: Option<String>,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows,
            ..Default::default()
        }
    }

    /// One row with a single `status` column
    pub fn status(message: &str) -> Self {
        Self::new(
            vec!["status".to_string()],
            vec![vec![Value::String(message.to_string())]],
        )
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value of `column` in row `row`
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(index)
    }

    /// Every value of one column
    pub fn column(&self, column: &str) -> Vec<Value> {
        match self.columns.iter().position(|c| c == column) {
            Some(index) => self
                .rows
                .iter()
                .filter_map(|r| r.get(index).cloned())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Swap temporary identities for the ids assigned at commit
    pub fn rewrite_ids(&mut self, id_map: &IdMap) {
        for row in &mut self.rows {
            for value in row.iter_mut() {
                id_map.rewrite(value);
            }
        }
    }
}
