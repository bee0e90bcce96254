// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Key-naming conventions for graph state in the key-value store
//!
//! All graph state lives in one ordered tree. Ids are encoded big-endian so
//! prefix scans return entities in id order.
//!
//! | prefix | key                         | value                  |
//! |--------|-----------------------------|------------------------|
//! | `n/`   | node id                     | bincode [`Node`]       |
//! | `e/`   | edge id                     | bincode [`Edge`]       |
//! | `l/`   | label `\0` node id          | empty                  |
//! | `o/`   | start id, edge id           | end node id            |
//! | `i/`   | end id, edge id             | start node id          |
//! | `d/`   | node id                     | incident edge counter  |
//! | `c/`   | constraint name             | bincode constraint     |
//! | `g/`   | label, or `\0schema`        | guard counter          |
//!
//! [`Node`]: crate::storage::Node
//! [`Edge`]: crate::storage::Edge

pub const NODE_PREFIX: &[u8] = b"n/";
pub const EDGE_PREFIX: &[u8] = b"e/";
pub const LABEL_PREFIX: &[u8] = b"l/";
pub const OUTGOING_PREFIX: &[u8] = b"o/";
pub const INCOMING_PREFIX: &[u8] = b"i/";
pub const DEGREE_PREFIX: &[u8] = b"d/";
pub const CONSTRAINT_PREFIX: &[u8] = b"c/";
pub const GUARD_PREFIX: &[u8] = b"g/";

fn with_prefix(prefix: &[u8], extra: usize) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + extra);
    key.extend_from_slice(prefix);
    key
}

pub fn node_key(id: u64) -> Vec<u8> {
    let mut key = with_prefix(NODE_PREFIX, 8);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

pub fn edge_key(id: u64) -> Vec<u8> {
    let mut key = with_prefix(EDGE_PREFIX, 8);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

/// Prefix covering every node carrying `label`
pub fn label_prefix(label: &str) -> Vec<u8> {
    let mut key = with_prefix(LABEL_PREFIX, label.len() + 1);
    key.extend_from_slice(label.as_bytes());
    key.push(0);
    key
}

pub fn label_index_key(label: &str, node: u64) -> Vec<u8> {
    let mut key = label_prefix(label);
    key.extend_from_slice(&node.to_be_bytes());
    key
}

pub fn outgoing_prefix(start: u64) -> Vec<u8> {
    let mut key = with_prefix(OUTGOING_PREFIX, 16);
    key.extend_from_slice(&start.to_be_bytes());
    key
}

pub fn outgoing_key(start: u64, edge: u64) -> Vec<u8> {
    let mut key = outgoing_prefix(start);
    key.extend_from_slice(&edge.to_be_bytes());
    key
}

pub fn incoming_prefix(end: u64) -> Vec<u8> {
    let mut key = with_prefix(INCOMING_PREFIX, 16);
    key.extend_from_slice(&end.to_be_bytes());
    key
}

pub fn incoming_key(end: u64, edge: u64) -> Vec<u8> {
    let mut key = incoming_prefix(end);
    key.extend_from_slice(&edge.to_be_bytes());
    key
}

pub fn degree_key(node: u64) -> Vec<u8> {
    let mut key = with_prefix(DEGREE_PREFIX, 8);
    key.extend_from_slice(&node.to_be_bytes());
    key
}

pub fn constraint_key(name: &str) -> Vec<u8> {
    let mut key = with_prefix(CONSTRAINT_PREFIX, name.len());
    key.extend_from_slice(name.as_bytes());
    key
}

pub fn label_guard_key(label: &str) -> Vec<u8> {
    let mut key = with_prefix(GUARD_PREFIX, label.len());
    key.extend_from_slice(label.as_bytes());
    key
}

/// Guard bumped whenever the constraint set changes. Labels cannot start
/// with a NUL byte, so this never collides with a label guard.
pub fn schema_epoch_key() -> Vec<u8> {
    let mut key = with_prefix(GUARD_PREFIX, 7);
    key.extend_from_slice(b"\0schema");
    key
}

/// Read the trailing big-endian u64 of a key
pub fn trailing_id(key: &[u8]) -> Option<u64> {
    if key.len() < 8 {
        return None;
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&key[key.len() - 8..]);
    Some(u64::from_be_bytes(buf))
}

/// Decode an id stored as a value
pub fn decode_id(value: &[u8]) -> Option<u64> {
    if value.len() != 8 {
        return None;
    }
    trailing_id(value)
}

/// Label portion of a label index key
pub fn label_from_index_key(key: &[u8]) -> Option<String> {
    let body = key.strip_prefix(LABEL_PREFIX)?;
    let nul = body.iter().position(|b| *b == 0)?;
    String::from_utf8(body[..nul].to_vec()).ok()
}
