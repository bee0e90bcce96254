// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Value type system for graph properties and query results
//!
//! Property values are limited to scalars and homogeneous lists of scalars.
//! Query results additionally carry maps, nodes, relationships and paths.

use crate::storage::types::{Edge, EntityRef, Node};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Property key to value mapping, ordered for stable encoding
pub type PropertyMap = BTreeMap<String, Value>;

/// Node as it appears in a result row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeValue {
    pub id: EntityRef,
    pub labels: Vec<String>,
    pub properties: PropertyMap,
}

/// Relationship as it appears in a result row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipValue {
    pub id: EntityRef,
    pub rel_type: String,
    pub start: EntityRef,
    pub end: EntityRef,
    pub properties: PropertyMap,
}

/// Alternating sequence of nodes and relationships
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathValue {
    pub nodes: Vec<NodeValue>,
    pub relationships: Vec<RelationshipValue>,
}

impl PathValue {
    /// Number of relationships in the path
    pub fn length(&self) -> usize {
        self.relationships.len()
    }
}

impl From<&Node> for NodeValue {
    fn from(node: &Node) -> Self {
        NodeValue {
            id: node.id.into(),
            labels: node.labels.clone(),
            properties: node.properties.clone(),
        }
    }
}

impl From<&Edge> for RelationshipValue {
    fn from(edge: &Edge) -> Self {
        RelationshipValue {
            id: edge.id.into(),
            rel_type: edge.rel_type.clone(),
            start: edge.start.into(),
            end: edge.end.into(),
            properties: edge.properties.clone(),
        }
    }
}

/// Value types for properties, parameters and result cells
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Node(NodeValue),
    Relationship(RelationshipValue),
    Path(PathValue),
}

impl Value {
    /// Check if value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&NodeValue> {
        match self {
            Value::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_relationship(&self) -> Option<&RelationshipValue> {
        match self {
            Value::Relationship(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Boolean(_) => "BOOLEAN",
            Value::Integer(_) => "INTEGER",
            Value::Float(_) => "FLOAT",
            Value::String(_) => "STRING",
            Value::List(_) => "LIST",
            Value::Map(_) => "MAP",
            Value::Node(_) => "NODE",
            Value::Relationship(_) => "RELATIONSHIP",
            Value::Path(_) => "PATH",
        }
    }

    /// Whether this value may be stored as a property: a scalar, or a list
    /// whose elements are all scalars of one type.
    pub fn check_storable(&self) -> Result<(), String> {
        match self {
            Value::Boolean(_) | Value::Integer(_) | Value::Float(_) | Value::String(_) => Ok(()),
            Value::Null => Err("null cannot be stored, setting null removes the property".into()),
            Value::List(items) => {
                let mut kind: Option<&'static str> = None;
                for item in items {
                    match item {
                        Value::Boolean(_) | Value::Integer(_) | Value::Float(_) | Value::String(_) => {
                            let name = item.type_name();
                            match kind {
                                None => kind = Some(name),
                                Some(k) if k == name => {}
                                Some(k) => {
                                    return Err(format!(
                                        "lists must be homogeneous, found {} and {}",
                                        k, name
                                    ))
                                }
                            }
                        }
                        other => {
                            return Err(format!(
                                "lists may only contain scalars, found {}",
                                other.type_name()
                            ))
                        }
                    }
                }
                Ok(())
            }
            other => Err(format!("{} values cannot be stored", other.type_name())),
        }
    }

    /// Ternary equality: `None` when either side is null
    pub fn cypher_eq(&self, other: &Value) -> Option<bool> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (a, b) if a.is_number() && b.is_number() => {
                Some(a.as_float() == b.as_float() || numbers_equal_exact(a, b))
            }
            (Value::List(a), Value::List(b)) => {
                if a.len() != b.len() {
                    return Some(false);
                }
                let mut saw_null = false;
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.cypher_eq(y) {
                        Some(false) => return Some(false),
                        None => saw_null = true,
                        Some(true) => {}
                    }
                }
                if saw_null {
                    None
                } else {
                    Some(true)
                }
            }
            (Value::Map(a), Value::Map(b)) => {
                if a.len() != b.len() || a.keys().ne(b.keys()) {
                    return Some(false);
                }
                let mut saw_null = false;
                for (x, y) in a.values().zip(b.values()) {
                    match x.cypher_eq(y) {
                        Some(false) => return Some(false),
                        None => saw_null = true,
                        Some(true) => {}
                    }
                }
                if saw_null {
                    None
                } else {
                    Some(true)
                }
            }
            (Value::Node(a), Value::Node(b)) => Some(a.id == b.id),
            (Value::Relationship(a), Value::Relationship(b)) => Some(a.id == b.id),
            (a, b) => Some(a == b),
        }
    }

    /// Equality used by constraints and grouping: numbers compare by value
    /// and nulls are equal to each other.
    pub fn same_as(&self, other: &Value) -> bool {
        self.canonical_key() == other.canonical_key()
    }

    /// Comparison for `<`-style operators; `None` when the types are not comparable
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (a, b) if a.is_number() && b.is_number() => a.as_float()?.partial_cmp(&b.as_float()?),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y)? {
                        Ordering::Equal => continue,
                        ord => return Some(ord),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => None,
        }
    }

    /// Total order used by ORDER BY: values of different types order by
    /// type rank, and null sorts last.
    pub fn order_cmp(&self, other: &Value) -> Ordering {
        let rank = |v: &Value| match v {
            Value::Map(_) => 0,
            Value::Node(_) => 1,
            Value::Relationship(_) => 2,
            Value::List(_) => 3,
            Value::Path(_) => 4,
            Value::String(_) => 5,
            Value::Boolean(_) => 6,
            Value::Integer(_) | Value::Float(_) => 7,
            Value::Null => 8,
        };
        match rank(self).cmp(&rank(other)) {
            Ordering::Equal => {}
            ord => return ord,
        }
        match (self, other) {
            (Value::Node(a), Value::Node(b)) => a.id.cmp(&b.id),
            (Value::Relationship(a), Value::Relationship(b)) => a.id.cmp(&b.id),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.order_cmp(y) {
                        Ordering::Equal => continue,
                        ord => return ord,
                    }
                }
                a.len().cmp(&b.len())
            }
            (a, b) => a
                .compare(b)
                .unwrap_or_else(|| a.canonical_key().cmp(&b.canonical_key())),
        }
    }

    /// Canonical text form where values that compare equal produce equal keys.
    /// Integral floats collapse onto the integer encoding.
    pub fn canonical_key(&self) -> String {
        match self {
            Value::Null => "z".to_string(),
            Value::Boolean(b) => format!("b:{}", b),
            Value::Integer(i) => format!("i:{}", i),
            Value::Float(f) => {
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                    format!("i:{}", *f as i64)
                } else {
                    format!("f:{}", f)
                }
            }
            Value::String(s) => format!("s:{:?}", s),
            Value::List(items) => {
                let inner: Vec<String> = items.iter().map(|v| v.canonical_key()).collect();
                format!("l:[{}]", inner.join(","))
            }
            Value::Map(map) => {
                let inner: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{:?}={}", k, v.canonical_key()))
                    .collect();
                format!("m:{{{}}}", inner.join(","))
            }
            Value::Node(n) => format!("n:{}", n.id),
            Value::Relationship(r) => format!("r:{}", r.id),
            Value::Path(p) => {
                let nodes: Vec<String> = p.nodes.iter().map(|n| n.id.to_string()).collect();
                let rels: Vec<String> = p.relationships.iter().map(|r| r.id.to_string()).collect();
                format!("p:{}|{}", nodes.join(","), rels.join(","))
            }
        }
    }

    /// Convert to JSON for the HTTP endpoint and CLI output
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null => Json::Null,
            Value::Boolean(b) => Json::Bool(*b),
            Value::Integer(i) => Json::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.clone()),
            Value::List(items) => Json::Array(items.iter().map(|v| v.to_json()).collect()),
            Value::Map(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Node(node) => properties_to_json(&node.properties),
            Value::Relationship(rel) => properties_to_json(&rel.properties),
            Value::Path(path) => {
                let mut items = Vec::with_capacity(path.nodes.len() + path.relationships.len());
                for (i, node) in path.nodes.iter().enumerate() {
                    items.push(properties_to_json(&node.properties));
                    if let Some(rel) = path.relationships.get(i) {
                        items.push(properties_to_json(&rel.properties));
                    }
                }
                Json::Array(items)
            }
        }
    }

    /// Convert a JSON value, e.g. HTTP statement parameters
    pub fn from_json(json: &serde_json::Value) -> Value {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Boolean(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            Json::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

fn numbers_equal_exact(a: &Value, b: &Value) -> bool {
    matches!((a, b), (Value::Integer(x), Value::Integer(y)) if x == y)
}

fn properties_to_json(properties: &PropertyMap) -> serde_json::Value {
    serde_json::Value::Object(
        properties
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{:.1}", n)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(map) => write_map(f, map),
            Value::Node(node) => {
                write!(f, "(")?;
                for label in &node.labels {
                    write!(f, ":{}", label)?;
                }
                if !node.properties.is_empty() {
                    if !node.labels.is_empty() {
                        write!(f, " ")?;
                    }
                    write_map(f, &node.properties)?;
                }
                write!(f, ")")
            }
            Value::Relationship(rel) => {
                write!(f, "[:{}", rel.rel_type)?;
                if !rel.properties.is_empty() {
                    write!(f, " ")?;
                    write_map(f, &rel.properties)?;
                }
                write!(f, "]")
            }
            Value::Path(path) => {
                for (i, node) in path.nodes.iter().enumerate() {
                    write!(f, "{}", Value::Node(node.clone()))?;
                    if let Some(rel) = path.relationships.get(i) {
                        let forward = rel.start == node.id;
                        let arrow = Value::Relationship(rel.clone());
                        if forward {
                            write!(f, "-{}->", arrow)?;
                        } else {
                            write!(f, "<-{}-", arrow)?;
                        }
                    }
                }
                Ok(())
            }
        }
    }
}

fn write_map(f: &mut fmt::Formatter<'_>, map: &BTreeMap<String, Value>) -> fmt::Result {
    write!(f, "{{")?;
    for (i, (key, value)) in map.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}: {}", key, value)?;
    }
    write!(f, "}}")
}

/// Convert from Rust primitive types to Value
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(n as i64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(vec: Vec<T>) -> Self {
        Value::List(vec.into_iter().map(Into::into).collect())
    }
}

impl From<NodeValue> for Value {
    fn from(node: NodeValue) -> Self {
        Value::Node(node)
    }
}

impl From<RelationshipValue> for Value {
    fn from(rel: RelationshipValue) -> Self {
        Value::Relationship(rel)
    }
}

impl From<PathValue> for Value {
    fn from(path: PathValue) -> Self {
        Value::Path(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_equality_across_types() {
        assert_eq!(Value::Integer(1).cypher_eq(&Value::Float(1.0)), Some(true));
        assert!(Value::Integer(3).same_as(&Value::Float(3.0)));
        assert!(!Value::Integer(3).same_as(&Value::Float(3.5)));
        assert_eq!(Value::Null.cypher_eq(&Value::Integer(1)), None);
    }

    #[test]
    fn test_storable_values() {
        assert!(Value::from("x").check_storable().is_ok());
        assert!(Value::from(vec![1i64, 2, 3]).check_storable().is_ok());
        assert!(Value::List(vec![]).check_storable().is_ok());
        assert!(Value::List(vec![Value::Integer(1), Value::from("a")])
            .check_storable()
            .is_err());
        assert!(Value::Map(BTreeMap::new()).check_storable().is_err());
        assert!(Value::Null.check_storable().is_err());
    }

    #[test]
    fn test_order_puts_null_last() {
        let mut values = vec![
            Value::Null,
            Value::Integer(2),
            Value::from("a"),
            Value::Float(1.5),
        ];
        values.sort_by(|a, b| a.order_cmp(b));
        assert_eq!(
            values,
            vec![
                Value::from("a"),
                Value::Float(1.5),
                Value::Integer(2),
                Value::Null
            ]
        );
    }

    #[test]
    fn test_json_conversion() {
        let json = serde_json::json!({"a": 1, "b": [true, null], "c": 2.5});
        let value = Value::from_json(&json);
        assert_eq!(value.to_json(), json);
    }
}
