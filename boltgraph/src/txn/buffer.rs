// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Pending writes of one transaction and the read-your-writes view over them
//!
//! The buffer holds created entities under temporary indexes, the final state
//! of touched committed entities, and deletions. [`Overlay`] answers reads by
//! consulting the buffer first and committed state second, noting the bytes
//! of every committed record it decodes so the transaction can remember its
//! observed version.

use crate::constraints::LabelScan;
use crate::storage::traversal::Traversable;
use crate::storage::{
    Direction, EdgeId, EntityRef, GraphStore, Node, NodeId, NodeValue, RelationshipValue,
    StorageError, StorageResult, Versioned,
};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Committed bytes seen during a read
#[derive(Debug)]
pub(crate) enum Observation {
    Node(u64, Vec<u8>),
    Edge(u64, Vec<u8>),
}

#[derive(Debug, Default)]
pub(crate) struct WriteBuffer {
    pub created_nodes: Vec<Option<NodeValue>>,
    pub created_edges: Vec<Option<RelationshipValue>>,
    pub updated_nodes: BTreeMap<u64, NodeValue>,
    pub deleted_nodes: BTreeSet<u64>,
    pub updated_edges: BTreeMap<u64, RelationshipValue>,
    pub deleted_edges: BTreeSet<u64>,
    pub observed_nodes: HashMap<u64, Vec<u8>>,
    pub observed_edges: HashMap<u64, Vec<u8>>,
}

impl WriteBuffer {
    /// Whether commit has anything to apply
    pub fn has_writes(&self) -> bool {
        self.created_nodes.iter().any(Option::is_some)
            || self.created_edges.iter().any(Option::is_some)
            || !self.updated_nodes.is_empty()
            || !self.deleted_nodes.is_empty()
            || !self.updated_edges.is_empty()
            || !self.deleted_edges.is_empty()
    }

    /// Keep the first committed version seen for each entity
    pub fn absorb(&mut self, observations: Vec<Observation>) {
        for observation in observations {
            match observation {
                Observation::Node(id, bytes) => {
                    self.observed_nodes.entry(id).or_insert(bytes);
                }
                Observation::Edge(id, bytes) => {
                    self.observed_edges.entry(id).or_insert(bytes);
                }
            }
        }
    }

    pub fn next_node_index(&self) -> u32 {
        self.created_nodes.len() as u32
    }

    pub fn next_edge_index(&self) -> u32 {
        self.created_edges.len() as u32
    }

    /// Store the new state of a visible node
    pub fn put_node(&mut self, node: NodeValue) {
        match node.id {
            EntityRef::Temporary(index) => {
                if let Some(slot) = self.created_nodes.get_mut(index as usize) {
                    *slot = Some(node);
                }
            }
            EntityRef::Permanent(id) => {
                self.updated_nodes.insert(id, node);
            }
        }
    }

    pub fn put_edge(&mut self, edge: RelationshipValue) {
        match edge.id {
            EntityRef::Temporary(index) => {
                if let Some(slot) = self.created_edges.get_mut(index as usize) {
                    *slot = Some(edge);
                }
            }
            EntityRef::Permanent(id) => {
                self.updated_edges.insert(id, edge);
            }
        }
    }

    pub fn remove_node(&mut self, node: EntityRef) {
        match node {
            EntityRef::Temporary(index) => {
                if let Some(slot) = self.created_nodes.get_mut(index as usize) {
                    *slot = None;
                }
            }
            EntityRef::Permanent(id) => {
                self.updated_nodes.remove(&id);
                self.deleted_nodes.insert(id);
            }
        }
    }

    pub fn remove_edge(&mut self, edge: EntityRef) {
        match edge {
            EntityRef::Temporary(index) => {
                if let Some(slot) = self.created_edges.get_mut(index as usize) {
                    *slot = None;
                }
            }
            EntityRef::Permanent(id) => {
                self.updated_edges.remove(&id);
                self.deleted_edges.insert(id);
            }
        }
    }

    /// Committed record a node was first read as
    pub fn observed_node(&self, id: u64) -> StorageResult<Node> {
        let bytes = self.observed_nodes.get(&id).ok_or_else(|| {
            StorageError::Fault(format!("node {} changed without being read", id))
        })?;
        Ok(bincode::deserialize(bytes)?)
    }

    pub fn observed_edge(&self, id: u64) -> StorageResult<crate::storage::Edge> {
        let bytes = self.observed_edges.get(&id).ok_or_else(|| {
            StorageError::Fault(format!("relationship {} changed without being read", id))
        })?;
        Ok(bincode::deserialize(bytes)?)
    }

    /// Labels whose members may have changed: labels of created and updated
    /// nodes, including labels an update removed
    pub fn touched_labels(&self) -> StorageResult<BTreeSet<String>> {
        let mut labels = BTreeSet::new();
        for node in self.created_nodes.iter().flatten() {
            labels.extend(node.labels.iter().cloned());
        }
        for (id, node) in &self.updated_nodes {
            labels.extend(node.labels.iter().cloned());
            labels.extend(self.observed_node(*id)?.labels);
        }
        Ok(labels)
    }
}

/// Read-your-writes view: buffer first, committed state second
pub(crate) struct Overlay<'a> {
    store: &'a GraphStore,
    buffer: &'a WriteBuffer,
    seen: RefCell<Vec<Observation>>,
}

impl<'a> Overlay<'a> {
    pub fn new(store: &'a GraphStore, buffer: &'a WriteBuffer) -> Self {
        Self {
            store,
            buffer,
            seen: RefCell::new(Vec::new()),
        }
    }

    /// Committed versions decoded while this view was alive
    pub fn into_observations(self) -> Vec<Observation> {
        self.seen.into_inner()
    }

    fn observe_node(&self, version: &Versioned<Node>) {
        let id = version.record.id.0;
        if !self.buffer.observed_nodes.contains_key(&id) {
            self.seen
                .borrow_mut()
                .push(Observation::Node(id, version.bytes.clone()));
        }
    }

    fn observe_edge(&self, version: &Versioned<crate::storage::Edge>) {
        let id = version.record.id.0;
        if !self.buffer.observed_edges.contains_key(&id) {
            self.seen
                .borrow_mut()
                .push(Observation::Edge(id, version.bytes.clone()));
        }
    }

    pub fn node(&self, node: EntityRef) -> StorageResult<Option<NodeValue>> {
        match node {
            EntityRef::Temporary(index) => Ok(self
                .buffer
                .created_nodes
                .get(index as usize)
                .cloned()
                .flatten()),
            EntityRef::Permanent(id) => {
                if self.buffer.deleted_nodes.contains(&id) {
                    return Ok(None);
                }
                if let Some(updated) = self.buffer.updated_nodes.get(&id) {
                    return Ok(Some(updated.clone()));
                }
                match self.store.load_node(NodeId(id))? {
                    Some(version) => {
                        self.observe_node(&version);
                        Ok(Some(NodeValue::from(&version.record)))
                    }
                    None => Ok(None),
                }
            }
        }
    }

    pub fn edge(&self, edge: EntityRef) -> StorageResult<Option<RelationshipValue>> {
        match edge {
            EntityRef::Temporary(index) => Ok(self
                .buffer
                .created_edges
                .get(index as usize)
                .cloned()
                .flatten()),
            EntityRef::Permanent(id) => {
                if self.buffer.deleted_edges.contains(&id) {
                    return Ok(None);
                }
                if let Some(updated) = self.buffer.updated_edges.get(&id) {
                    return Ok(Some(updated.clone()));
                }
                match self.store.load_edge(EdgeId(id))? {
                    Some(version) => {
                        self.observe_edge(&version);
                        Ok(Some(RelationshipValue::from(&version.record)))
                    }
                    None => Ok(None),
                }
            }
        }
    }

    pub fn require_node(&self, node: EntityRef) -> StorageResult<NodeValue> {
        self.node(node)?
            .ok_or_else(|| StorageError::NodeNotFound(node.wire_id().to_string()))
    }

    pub fn require_edge(&self, edge: EntityRef) -> StorageResult<RelationshipValue> {
        self.edge(edge)?
            .ok_or_else(|| StorageError::EdgeNotFound(edge.wire_id().to_string()))
    }

    pub fn nodes_by_label(&self, label: &str) -> StorageResult<Vec<NodeValue>> {
        let mut out = Vec::new();
        let committed: HashSet<u64> = self
            .store
            .node_ids_by_label(label)?
            .into_iter()
            .map(|id| id.0)
            .collect();
        let mut ordered: Vec<u64> = committed.iter().copied().collect();
        ordered.sort_unstable();
        for id in ordered {
            if let Some(node) = self.node(EntityRef::Permanent(id))? {
                if node.labels.iter().any(|l| l == label) {
                    out.push(node);
                }
            }
        }
        // committed nodes that gained the label in this transaction
        for (id, node) in &self.buffer.updated_nodes {
            if !committed.contains(id) && node.labels.iter().any(|l| l == label) {
                out.push(node.clone());
            }
        }
        for node in self.buffer.created_nodes.iter().flatten() {
            if node.labels.iter().any(|l| l == label) {
                out.push(node.clone());
            }
        }
        Ok(out)
    }

    pub fn all_nodes(&self) -> StorageResult<Vec<NodeValue>> {
        let mut out = Vec::new();
        for version in self.store.node_versions()? {
            let id = version.record.id.0;
            if self.buffer.deleted_nodes.contains(&id) {
                continue;
            }
            if let Some(updated) = self.buffer.updated_nodes.get(&id) {
                out.push(updated.clone());
                continue;
            }
            self.observe_node(&version);
            out.push(NodeValue::from(&version.record));
        }
        out.extend(self.buffer.created_nodes.iter().flatten().cloned());
        Ok(out)
    }

    pub fn all_edges(&self) -> StorageResult<Vec<RelationshipValue>> {
        let mut out = Vec::new();
        for version in self.store.edge_versions()? {
            let id = version.record.id.0;
            if self.buffer.deleted_edges.contains(&id) {
                continue;
            }
            if let Some(updated) = self.buffer.updated_edges.get(&id) {
                out.push(updated.clone());
                continue;
            }
            self.observe_edge(&version);
            out.push(RelationshipValue::from(&version.record));
        }
        out.extend(self.buffer.created_edges.iter().flatten().cloned());
        Ok(out)
    }

    /// Visible relationships incident to a visible node
    pub fn node_relationships(
        &self,
        node: EntityRef,
        direction: Direction,
        types: &[String],
    ) -> StorageResult<Vec<RelationshipValue>> {
        self.require_node(node)?;
        let wanted = |rel: &RelationshipValue| types.is_empty() || types.contains(&rel.rel_type);
        let mut out = Vec::new();

        if let EntityRef::Permanent(id) = node {
            for (edge_id, _) in self.store.incident_edge_ids(NodeId(id), direction)? {
                if let Some(rel) = self.edge(EntityRef::Permanent(edge_id.0))? {
                    if wanted(&rel) {
                        out.push(rel);
                    }
                }
            }
        }
        for rel in self.buffer.created_edges.iter().flatten() {
            let incident = match direction {
                Direction::Outgoing => rel.start == node,
                Direction::Incoming => rel.end == node,
                Direction::Both => rel.start == node || rel.end == node,
            };
            if incident && wanted(rel) {
                out.push(rel.clone());
            }
        }
        Ok(out)
    }

    /// Distinct labels across visible nodes
    pub fn labels(&self) -> StorageResult<BTreeSet<String>> {
        Ok(self
            .all_nodes()?
            .into_iter()
            .flat_map(|n| n.labels)
            .collect())
    }

    pub fn relationship_types(&self) -> StorageResult<BTreeSet<String>> {
        Ok(self
            .all_edges()?
            .into_iter()
            .map(|r| r.rel_type)
            .collect())
    }
}

impl LabelScan for Overlay<'_> {
    fn nodes_with_label(&self, label: &str) -> Result<Vec<NodeValue>, StorageError> {
        self.nodes_by_label(label)
    }
}

impl Traversable for Overlay<'_> {
    type Node = EntityRef;
    type Edge = EntityRef;
    type Error = StorageError;

    fn expand(
        &self,
        node: EntityRef,
        direction: Direction,
        types: &[String],
    ) -> StorageResult<Vec<(EntityRef, EntityRef)>> {
        Ok(self
            .node_relationships(node, direction, types)?
            .into_iter()
            .map(|rel| {
                let other = if rel.start == node { rel.end } else { rel.start };
                (rel.id, other)
            })
            .collect())
    }
}
