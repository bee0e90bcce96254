// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Graph store over a key-value driver
//!
//! `GraphStore` maps nodes, relationships, label indexes and adjacency lists
//! onto a single ordered tree (see [`crate::storage::keys`]). Every mutating
//! call is applied through one atomic `transact`, so the store never exposes
//! a half-written entity. Constraint checks belong to the transaction layer;
//! the store only guards structural integrity.
//!
//! The `stage_*` helpers describe the key changes for one entity and are
//! shared with transaction commit, which folds many of them into one batch.

use crate::storage::keys;
use crate::storage::persistent::{
    create_storage_driver, decode_counter, BoxedDriver, Precondition, StorageTree,
    StorageType, WriteBatch,
};
use crate::storage::traversal::{self, RawPath, Traversable};
use crate::storage::types::{
    Direction, Edge, EdgeId, Node, NodeId, Path, StorageError, StorageResult,
};
use crate::storage::value::{PropertyMap, Value};
use log::{debug, info};
use std::collections::{BTreeSet, HashSet};
use std::path::Path as FsPath;

/// Name of the tree holding all graph state
pub const GRAPH_TREE: &str = "graph";

/// Node or relationship with the committed bytes it was decoded from
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub record: T,
    pub bytes: Vec<u8>,
}

/// Persistent graph storage
pub struct GraphStore {
    driver: BoxedDriver,
    tree: Box<dyn StorageTree>,
    sync_commits: bool,
}

impl GraphStore {
    /// Open (or create) a store with the given backend
    pub fn open<P: AsRef<FsPath>>(
        storage_type: StorageType,
        path: P,
        sync_commits: bool,
    ) -> StorageResult<Self> {
        info!(
            "Opening graph store with {} at path: {:?}",
            storage_type,
            path.as_ref()
        );
        let driver = create_storage_driver(storage_type, path.as_ref())?;
        let tree = driver.open_tree(GRAPH_TREE)?;
        Ok(Self {
            driver,
            tree,
            sync_commits,
        })
    }

    /// Ephemeral in-memory store
    pub fn memory() -> StorageResult<Self> {
        Self::open(StorageType::Memory, "memory", false)
    }

    pub fn storage_type(&self) -> StorageType {
        self.driver.storage_type()
    }

    /// Raw tree access for components that keep their own keys (constraints)
    pub fn tree(&self) -> &dyn StorageTree {
        self.tree.as_ref()
    }

    /// Allocate a fresh entity identity. Nodes and relationships share one sequence.
    pub fn generate_id(&self) -> StorageResult<u64> {
        Ok(self.driver.generate_id()?)
    }

    /// Check every precondition and apply the batch atomically
    pub fn commit(&self, preconditions: &[Precondition], batch: &WriteBatch) -> StorageResult<()> {
        if batch.is_empty() && preconditions.is_empty() {
            return Ok(());
        }
        debug!(
            "Applying batch of {} writes with {} preconditions",
            batch.len(),
            preconditions.len()
        );
        self.tree.transact(preconditions, batch)?;
        if self.sync_commits {
            self.tree.flush()?;
        }
        Ok(())
    }

    pub fn flush(&self) -> StorageResult<()> {
        self.driver.flush()?;
        Ok(())
    }

    pub fn shutdown(&mut self) -> StorageResult<()> {
        info!("Shutting down graph store");
        self.driver.shutdown()?;
        Ok(())
    }

    // ----- reads -----

    pub fn read_raw(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.tree.get(key)?)
    }

    /// Node with the bytes it was stored as, or None
    pub fn load_node(&self, id: NodeId) -> StorageResult<Option<Versioned<Node>>> {
        match self.tree.get(&keys::node_key(id.0))? {
            Some(bytes) => {
                let record: Node = bincode::deserialize(&bytes)?;
                Ok(Some(Versioned { record, bytes }))
            }
            None => Ok(None),
        }
    }

    /// Relationship with the bytes it was stored as, or None
    pub fn load_edge(&self, id: EdgeId) -> StorageResult<Option<Versioned<Edge>>> {
        match self.tree.get(&keys::edge_key(id.0))? {
            Some(bytes) => {
                let record: Edge = bincode::deserialize(&bytes)?;
                Ok(Some(Versioned { record, bytes }))
            }
            None => Ok(None),
        }
    }

    pub fn find_node(&self, id: NodeId) -> StorageResult<Option<Node>> {
        Ok(self.load_node(id)?.map(|v| v.record))
    }

    pub fn find_edge(&self, id: EdgeId) -> StorageResult<Option<Edge>> {
        Ok(self.load_edge(id)?.map(|v| v.record))
    }

    pub fn get_node(&self, id: NodeId) -> StorageResult<Node> {
        self.find_node(id)?
            .ok_or_else(|| StorageError::NodeNotFound(id.to_string()))
    }

    pub fn get_edge(&self, id: EdgeId) -> StorageResult<Edge> {
        self.find_edge(id)?
            .ok_or_else(|| StorageError::EdgeNotFound(id.to_string()))
    }

    pub fn node_exists(&self, id: NodeId) -> StorageResult<bool> {
        Ok(self.tree.contains_key(&keys::node_key(id.0))?)
    }

    /// Committed incident-edge counter of a node
    pub fn degree_counter(&self, id: NodeId) -> StorageResult<i64> {
        let raw = self.tree.get(&keys::degree_key(id.0))?;
        Ok(decode_counter(raw.as_deref()))
    }

    /// Incident edge ids with the opposite endpoint, deduplicating self-loops
    pub fn incident_edge_ids(
        &self,
        id: NodeId,
        direction: Direction,
    ) -> StorageResult<Vec<(EdgeId, NodeId)>> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        if matches!(direction, Direction::Outgoing | Direction::Both) {
            for item in self.tree.scan_prefix(&keys::outgoing_prefix(id.0))? {
                let (key, value) = item?;
                if let (Some(edge), Some(other)) = (keys::trailing_id(&key), keys::decode_id(&value))
                {
                    if seen.insert(edge) {
                        out.push((EdgeId(edge), NodeId(other)));
                    }
                }
            }
        }
        if matches!(direction, Direction::Incoming | Direction::Both) {
            for item in self.tree.scan_prefix(&keys::incoming_prefix(id.0))? {
                let (key, value) = item?;
                if let (Some(edge), Some(other)) = (keys::trailing_id(&key), keys::decode_id(&value))
                {
                    if seen.insert(edge) {
                        out.push((EdgeId(edge), NodeId(other)));
                    }
                }
            }
        }
        Ok(out)
    }

    /// Relationships of a node filtered by type and direction
    pub fn get_node_relationships(
        &self,
        id: NodeId,
        types: &[String],
        direction: Direction,
    ) -> StorageResult<Vec<Edge>> {
        self.get_node(id)?;
        let mut edges = Vec::new();
        for (edge_id, _) in self.incident_edge_ids(id, direction)? {
            let edge = self.get_edge(edge_id)?;
            if types.is_empty() || types.contains(&edge.rel_type) {
                edges.push(edge);
            }
        }
        Ok(edges)
    }

    /// Distinct nodes adjacent to `id`
    pub fn get_node_neighbors(
        &self,
        id: NodeId,
        types: &[String],
        direction: Direction,
    ) -> StorageResult<Vec<Node>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for edge in self.get_node_relationships(id, types, direction)? {
            let other = edge.other_node(id);
            if seen.insert(other) {
                out.push(self.get_node(other)?);
            }
        }
        Ok(out)
    }

    pub fn get_node_degree(
        &self,
        id: NodeId,
        types: &[String],
        direction: Direction,
    ) -> StorageResult<usize> {
        Ok(self.get_node_relationships(id, types, direction)?.len())
    }

    pub fn find_shortest_path(
        &self,
        start: NodeId,
        end: NodeId,
        types: &[String],
        direction: Direction,
        max_hops: usize,
    ) -> StorageResult<Option<Path>> {
        self.get_node(start)?;
        self.get_node(end)?;
        match traversal::shortest_path(self, start, end, direction, types, max_hops)? {
            Some(raw) => Ok(Some(self.materialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn find_all_paths(
        &self,
        start: NodeId,
        end: NodeId,
        types: &[String],
        direction: Direction,
        max_hops: usize,
    ) -> StorageResult<Vec<Path>> {
        self.get_node(start)?;
        self.get_node(end)?;
        traversal::all_paths(self, start, end, direction, types, max_hops)?
            .iter()
            .map(|raw| self.materialize(raw))
            .collect()
    }

    fn materialize(&self, raw: &RawPath<NodeId, EdgeId>) -> StorageResult<Path> {
        let nodes = raw
            .nodes
            .iter()
            .map(|id| self.get_node(*id))
            .collect::<StorageResult<Vec<_>>>()?;
        let edges = raw
            .edges
            .iter()
            .map(|id| self.get_edge(*id))
            .collect::<StorageResult<Vec<_>>>()?;
        Ok(Path { nodes, edges })
    }

    /// Ids of nodes carrying `label`, in id order
    pub fn node_ids_by_label(&self, label: &str) -> StorageResult<Vec<NodeId>> {
        let mut ids = Vec::new();
        for item in self.tree.scan_prefix(&keys::label_prefix(label))? {
            let (key, _) = item?;
            if let Some(id) = keys::trailing_id(&key) {
                ids.push(NodeId(id));
            }
        }
        Ok(ids)
    }

    pub fn nodes_by_label(&self, label: &str) -> StorageResult<Vec<Node>> {
        self.node_ids_by_label(label)?
            .into_iter()
            .map(|id| self.get_node(id))
            .collect()
    }

    /// Every committed node with its stored bytes, in id order
    pub fn node_versions(&self) -> StorageResult<Vec<Versioned<Node>>> {
        let mut nodes = Vec::new();
        for item in self.tree.scan_prefix(keys::NODE_PREFIX)? {
            let (_, bytes) = item?;
            let record = bincode::deserialize(&bytes)?;
            nodes.push(Versioned { record, bytes });
        }
        Ok(nodes)
    }

    /// Every committed relationship with its stored bytes, in id order
    pub fn edge_versions(&self) -> StorageResult<Vec<Versioned<Edge>>> {
        let mut edges = Vec::new();
        for item in self.tree.scan_prefix(keys::EDGE_PREFIX)? {
            let (_, bytes) = item?;
            let record = bincode::deserialize(&bytes)?;
            edges.push(Versioned { record, bytes });
        }
        Ok(edges)
    }

    pub fn all_nodes(&self) -> StorageResult<Vec<Node>> {
        Ok(self.node_versions()?.into_iter().map(|v| v.record).collect())
    }

    pub fn all_edges(&self) -> StorageResult<Vec<Edge>> {
        Ok(self.edge_versions()?.into_iter().map(|v| v.record).collect())
    }

    /// Labels in use, sorted
    pub fn labels(&self) -> StorageResult<Vec<String>> {
        let mut labels = BTreeSet::new();
        for item in self.tree.scan_prefix(keys::LABEL_PREFIX)? {
            let (key, _) = item?;
            if let Some(label) = keys::label_from_index_key(&key) {
                labels.insert(label);
            }
        }
        Ok(labels.into_iter().collect())
    }

    /// Relationship types in use, sorted
    pub fn relationship_types(&self) -> StorageResult<Vec<String>> {
        Ok(self
            .all_edges()?
            .into_iter()
            .map(|e| e.rel_type)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect())
    }

    pub fn node_count(&self) -> StorageResult<usize> {
        let mut count = 0;
        for item in self.tree.scan_prefix(keys::NODE_PREFIX)? {
            item?;
            count += 1;
        }
        Ok(count)
    }

    pub fn edge_count(&self) -> StorageResult<usize> {
        let mut count = 0;
        for item in self.tree.scan_prefix(keys::EDGE_PREFIX)? {
            item?;
            count += 1;
        }
        Ok(count)
    }

    // ----- direct mutations -----

    pub fn create_node(&self, labels: Vec<String>, properties: PropertyMap) -> StorageResult<Node> {
        validate_labels(&labels)?;
        let mut props = PropertyMap::new();
        merge_properties(&mut props, &properties)?;
        let node = Node::new(NodeId(self.generate_id()?), labels, props);

        let mut batch = WriteBatch::new();
        stage_node(&mut batch, &node, None)?;
        self.commit(&[Precondition::Absent(keys::node_key(node.id.0))], &batch)?;
        debug!("Created node {}", node.id);
        Ok(node)
    }

    /// Merge `properties` into a node; null values remove keys
    pub fn update_node(&self, id: NodeId, properties: &PropertyMap) -> StorageResult<Node> {
        self.rewrite_node(id, |node| merge_properties(&mut node.properties, properties).map(|_| ()))
    }

    pub fn add_labels(&self, id: NodeId, labels: &[String]) -> StorageResult<Node> {
        validate_labels(labels)?;
        self.rewrite_node(id, |node| {
            for label in labels {
                node.add_label(label.clone());
            }
            Ok(())
        })
    }

    pub fn remove_labels(&self, id: NodeId, labels: &[String]) -> StorageResult<Node> {
        self.rewrite_node(id, |node| {
            for label in labels {
                node.remove_label(label);
            }
            Ok(())
        })
    }

    fn rewrite_node<F>(&self, id: NodeId, change: F) -> StorageResult<Node>
    where
        F: FnOnce(&mut Node) -> StorageResult<()>,
    {
        let current = self
            .load_node(id)?
            .ok_or_else(|| StorageError::NodeNotFound(id.to_string()))?;
        let mut node = current.record.clone();
        change(&mut node)?;

        let mut batch = WriteBatch::new();
        stage_node(&mut batch, &node, Some(&current.record))?;
        let guard = Precondition::Equals(keys::node_key(id.0), current.bytes);
        self.commit(&[guard], &batch)?;
        Ok(node)
    }

    /// Delete a node that has no relationships
    pub fn delete_node(&self, id: NodeId) -> StorageResult<()> {
        let current = self
            .load_node(id)?
            .ok_or_else(|| StorageError::NodeNotFound(id.to_string()))?;
        if self.degree_counter(id)? != 0 {
            return Err(StorageError::NodeHasRelationships(id.to_string()));
        }
        let mut batch = WriteBatch::new();
        unstage_node(&mut batch, &current.record);
        let guards = [
            Precondition::Equals(keys::node_key(id.0), current.bytes),
            Precondition::Absent(keys::degree_key(id.0)),
        ];
        self.commit(&guards, &batch)?;
        debug!("Deleted node {}", id);
        Ok(())
    }

    /// Delete a node together with every incident relationship.
    /// Returns the number of relationships removed.
    pub fn detach_delete_node(&self, id: NodeId) -> StorageResult<usize> {
        let current = self
            .load_node(id)?
            .ok_or_else(|| StorageError::NodeNotFound(id.to_string()))?;
        let degree = self.degree_counter(id)?;

        let mut batch = WriteBatch::new();
        let mut removed = 0;
        for (edge_id, _) in self.incident_edge_ids(id, Direction::Both)? {
            let edge = self.get_edge(edge_id)?;
            unstage_edge(&mut batch, &edge);
            removed += 1;
        }
        unstage_node(&mut batch, &current.record);

        let mut guards = vec![Precondition::Equals(keys::node_key(id.0), current.bytes)];
        guards.push(Precondition::counter(keys::degree_key(id.0), degree));
        self.commit(&guards, &batch)?;
        debug!("Detach-deleted node {} with {} relationships", id, removed);
        Ok(removed)
    }

    pub fn create_edge(
        &self,
        start: NodeId,
        end: NodeId,
        rel_type: &str,
        properties: PropertyMap,
    ) -> StorageResult<Edge> {
        validate_name(rel_type, "relationship type")?;
        self.get_node(start)?;
        self.get_node(end)?;
        let mut props = PropertyMap::new();
        merge_properties(&mut props, &properties)?;
        let edge = Edge {
            id: EdgeId(self.generate_id()?),
            rel_type: rel_type.to_string(),
            start,
            end,
            properties: props,
        };

        let mut batch = WriteBatch::new();
        stage_edge(&mut batch, &edge, None)?;
        let guards = [
            Precondition::Present(keys::node_key(start.0)),
            Precondition::Present(keys::node_key(end.0)),
        ];
        self.commit(&guards, &batch)?;
        debug!("Created relationship {} ({})-[:{}]->({})", edge.id, start, rel_type, end);
        Ok(edge)
    }

    pub fn update_edge(&self, id: EdgeId, properties: &PropertyMap) -> StorageResult<Edge> {
        let current = self
            .load_edge(id)?
            .ok_or_else(|| StorageError::EdgeNotFound(id.to_string()))?;
        let mut edge = current.record.clone();
        merge_properties(&mut edge.properties, properties)?;

        let mut batch = WriteBatch::new();
        stage_edge(&mut batch, &edge, Some(&current.record))?;
        self.commit(
            &[Precondition::Equals(keys::edge_key(id.0), current.bytes)],
            &batch,
        )?;
        Ok(edge)
    }

    pub fn delete_edge(&self, id: EdgeId) -> StorageResult<()> {
        let current = self
            .load_edge(id)?
            .ok_or_else(|| StorageError::EdgeNotFound(id.to_string()))?;
        let mut batch = WriteBatch::new();
        unstage_edge(&mut batch, &current.record);
        self.commit(
            &[Precondition::Equals(keys::edge_key(id.0), current.bytes)],
            &batch,
        )?;
        Ok(())
    }
}

impl Traversable for GraphStore {
    type Node = NodeId;
    type Edge = EdgeId;
    type Error = StorageError;

    fn expand(
        &self,
        node: NodeId,
        direction: Direction,
        types: &[String],
    ) -> StorageResult<Vec<(EdgeId, NodeId)>> {
        let incident = self.incident_edge_ids(node, direction)?;
        if types.is_empty() {
            return Ok(incident);
        }
        let mut out = Vec::with_capacity(incident.len());
        for (edge_id, other) in incident {
            if types.contains(&self.get_edge(edge_id)?.rel_type) {
                out.push((edge_id, other));
            }
        }
        Ok(out)
    }
}

// ----- batch staging -----

/// Stage the writes for a created (`previous == None`) or rewritten node
pub fn stage_node(batch: &mut WriteBatch, node: &Node, previous: Option<&Node>) -> StorageResult<()> {
    batch.put(keys::node_key(node.id.0), bincode::serialize(node)?);
    bump_label_guards(batch, node);
    if let Some(previous) = previous {
        for label in &previous.labels {
            if !node.has_label(label) {
                batch.add(keys::label_guard_key(label), 1);
            }
        }
    }
    for label in &node.labels {
        if previous.map_or(true, |p| !p.has_label(label)) {
            batch.put(keys::label_index_key(label, node.id.0), Vec::new());
        }
    }
    if let Some(previous) = previous {
        for label in &previous.labels {
            if !node.has_label(label) {
                batch.delete(keys::label_index_key(label, node.id.0));
            }
        }
    }
    Ok(())
}

/// Stage the removal of a node record and its label index entries
pub fn unstage_node(batch: &mut WriteBatch, node: &Node) {
    batch.delete(keys::node_key(node.id.0));
    bump_label_guards(batch, node);
    for label in &node.labels {
        batch.delete(keys::label_index_key(label, node.id.0));
    }
}

/// Every write touching a labelled node moves that label's guard, so a
/// commit that validated the label against older data fails its precondition.
fn bump_label_guards(batch: &mut WriteBatch, node: &Node) {
    for label in &node.labels {
        batch.add(keys::label_guard_key(label), 1);
    }
}

/// Stage the writes for a created or rewritten relationship. Only creation
/// touches adjacency and degree counters since endpoints never change.
pub fn stage_edge(batch: &mut WriteBatch, edge: &Edge, previous: Option<&Edge>) -> StorageResult<()> {
    batch.put(keys::edge_key(edge.id.0), bincode::serialize(edge)?);
    if previous.is_none() {
        batch.put(
            keys::outgoing_key(edge.start.0, edge.id.0),
            edge.end.0.to_be_bytes().to_vec(),
        );
        batch.put(
            keys::incoming_key(edge.end.0, edge.id.0),
            edge.start.0.to_be_bytes().to_vec(),
        );
        batch.add(keys::degree_key(edge.start.0), 1);
        batch.add(keys::degree_key(edge.end.0), 1);
    }
    Ok(())
}

pub fn unstage_edge(batch: &mut WriteBatch, edge: &Edge) {
    batch.delete(keys::edge_key(edge.id.0));
    batch.delete(keys::outgoing_key(edge.start.0, edge.id.0));
    batch.delete(keys::incoming_key(edge.end.0, edge.id.0));
    batch.add(keys::degree_key(edge.start.0), -1);
    batch.add(keys::degree_key(edge.end.0), -1);
}

/// Apply property changes in place: null removes a key, anything else must be
/// storable. Returns the number of keys set or removed.
pub fn merge_properties(target: &mut PropertyMap, changes: &PropertyMap) -> StorageResult<usize> {
    for (key, value) in changes {
        if !value.is_null() {
            value
                .check_storable()
                .map_err(|reason| StorageError::InvalidProperty {
                    key: key.clone(),
                    reason,
                })?;
        }
    }
    let mut touched = 0;
    for (key, value) in changes {
        if value.is_null() {
            if target.remove(key).is_some() {
                touched += 1;
            }
        } else {
            target.insert(key.clone(), value.clone());
            touched += 1;
        }
    }
    Ok(touched)
}

/// Replace every property of `target`; nulls in `replacement` are dropped
pub fn replace_properties(target: &mut PropertyMap, replacement: &PropertyMap) -> StorageResult<usize> {
    let mut fresh = PropertyMap::new();
    let touched = merge_properties(&mut fresh, replacement)?;
    let removed = target.keys().filter(|k| !fresh.contains_key(*k)).count();
    *target = fresh;
    Ok(touched + removed)
}

pub fn validate_labels(labels: &[String]) -> StorageResult<()> {
    labels.iter().try_for_each(|l| validate_name(l, "label"))
}

pub(crate) fn validate_name(name: &str, what: &str) -> StorageResult<()> {
    if name.is_empty() || name.contains('\0') {
        return Err(StorageError::InvalidProperty {
            key: name.to_string(),
            reason: format!("invalid {} name", what),
        });
    }
    Ok(())
}

/// Property value of a stored record, treating absent keys as null
pub fn property_or_null<'a>(properties: &'a PropertyMap, key: &str) -> &'a Value {
    const NULL: &Value = &Value::Null;
    properties.get(key).unwrap_or(NULL)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, Value)]) -> PropertyMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn store() -> GraphStore {
        GraphStore::memory().unwrap()
    }

    #[test]
    fn test_create_and_get_node() {
        let store = store();
        let node = store
            .create_node(vec!["Person".into()], props(&[("name", "Alice".into())]))
            .unwrap();
        let fetched = store.get_node(node.id).unwrap();
        assert_eq!(fetched, node);
        assert_eq!(store.nodes_by_label("Person").unwrap().len(), 1);
        assert!(matches!(
            store.get_node(NodeId(9999)),
            Err(StorageError::NodeNotFound(_))
        ));
    }

    #[test]
    fn test_update_merges_and_null_removes() {
        let store = store();
        let node = store
            .create_node(vec![], props(&[("a", 1.into()), ("b", 2.into())]))
            .unwrap();
        let updated = store
            .update_node(node.id, &props(&[("a", Value::Null), ("c", 3.into())]))
            .unwrap();
        assert!(updated.get_property("a").is_none());
        assert_eq!(updated.get_property("b"), Some(&Value::Integer(2)));
        assert_eq!(updated.get_property("c"), Some(&Value::Integer(3)));
    }

    #[test]
    fn test_non_storable_property_rejected() {
        let store = store();
        let nested = Value::List(vec![Value::Integer(1), Value::String("x".into())]);
        let err = store.create_node(vec![], props(&[("bad", nested)])).unwrap_err();
        assert!(matches!(err, StorageError::InvalidProperty { .. }));
        assert_eq!(store.node_count().unwrap(), 0);
    }

    #[test]
    fn test_labels_index_follows_changes() {
        let store = store();
        let node = store.create_node(vec!["A".into()], PropertyMap::new()).unwrap();
        store.add_labels(node.id, &["B".into()]).unwrap();
        store.remove_labels(node.id, &["A".into()]).unwrap();
        assert!(store.nodes_by_label("A").unwrap().is_empty());
        assert_eq!(store.nodes_by_label("B").unwrap().len(), 1);
        assert_eq!(store.labels().unwrap(), vec!["B".to_string()]);
    }

    #[test]
    fn test_delete_node_with_relationships_fails() {
        let store = store();
        let a = store.create_node(vec![], PropertyMap::new()).unwrap();
        let b = store.create_node(vec![], PropertyMap::new()).unwrap();
        store.create_edge(a.id, b.id, "KNOWS", PropertyMap::new()).unwrap();

        assert!(matches!(
            store.delete_node(a.id),
            Err(StorageError::NodeHasRelationships(_))
        ));
        assert_eq!(store.detach_delete_node(a.id).unwrap(), 1);
        assert_eq!(store.edge_count().unwrap(), 0);
        assert_eq!(store.degree_counter(b.id).unwrap(), 0);
        store.delete_node(b.id).unwrap();
        assert_eq!(store.node_count().unwrap(), 0);
    }

    #[test]
    fn test_edge_requires_endpoints() {
        let store = store();
        let a = store.create_node(vec![], PropertyMap::new()).unwrap();
        let err = store
            .create_edge(a.id, NodeId(4242), "KNOWS", PropertyMap::new())
            .unwrap_err();
        assert!(matches!(err, StorageError::NodeNotFound(_)));
    }

    #[test]
    fn test_relationship_queries() {
        let store = store();
        let a = store.create_node(vec![], PropertyMap::new()).unwrap();
        let b = store.create_node(vec![], PropertyMap::new()).unwrap();
        let c = store.create_node(vec![], PropertyMap::new()).unwrap();
        store.create_edge(a.id, b.id, "KNOWS", PropertyMap::new()).unwrap();
        store.create_edge(c.id, a.id, "LIKES", PropertyMap::new()).unwrap();
        store.create_edge(a.id, a.id, "SELF", PropertyMap::new()).unwrap();

        assert_eq!(store.get_node_degree(a.id, &[], Direction::Both).unwrap(), 3);
        assert_eq!(store.get_node_degree(a.id, &[], Direction::Outgoing).unwrap(), 2);
        assert_eq!(
            store
                .get_node_degree(a.id, &["LIKES".into()], Direction::Incoming)
                .unwrap(),
            1
        );
        let neighbors = store.get_node_neighbors(a.id, &[], Direction::Both).unwrap();
        assert_eq!(neighbors.len(), 3);
        assert_eq!(
            store.relationship_types().unwrap(),
            vec!["KNOWS".to_string(), "LIKES".to_string(), "SELF".to_string()]
        );
    }

    #[test]
    fn test_paths() {
        let store = store();
        let ids: Vec<_> = (0..4)
            .map(|_| store.create_node(vec![], PropertyMap::new()).unwrap().id)
            .collect();
        store.create_edge(ids[0], ids[1], "R", PropertyMap::new()).unwrap();
        store.create_edge(ids[1], ids[3], "R", PropertyMap::new()).unwrap();
        store.create_edge(ids[0], ids[2], "R", PropertyMap::new()).unwrap();
        store.create_edge(ids[2], ids[3], "S", PropertyMap::new()).unwrap();

        let path = store
            .find_shortest_path(ids[0], ids[3], &[], Direction::Outgoing, 5)
            .unwrap()
            .unwrap();
        assert_eq!(path.len(), 2);

        let only_r = store
            .find_all_paths(ids[0], ids[3], &["R".into()], Direction::Outgoing, 5)
            .unwrap();
        assert_eq!(only_r.len(), 1);
        let all = store
            .find_all_paths(ids[0], ids[3], &[], Direction::Both, 5)
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_stale_update_conflicts() {
        let store = store();
        let node = store.create_node(vec![], props(&[("v", 1.into())])).unwrap();
        let stale = store.load_node(node.id).unwrap().unwrap();
        store.update_node(node.id, &props(&[("v", 2.into())])).unwrap();

        let mut batch = WriteBatch::new();
        stage_node(&mut batch, &stale.record, Some(&stale.record)).unwrap();
        let err = store
            .commit(
                &[Precondition::Equals(keys::node_key(node.id.0), stale.bytes)],
                &batch,
            )
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }
}
