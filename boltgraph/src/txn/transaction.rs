// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! A single ACID transaction
//!
//! Mutations are buffered and never touch the store before commit. Commit
//! validates constraints against the final state, resolves temporary
//! identities, and applies one batch guarded by preconditions so that a
//! concurrent commit on the same data fails with a conflict.

use super::buffer::{Overlay, WriteBuffer};
use super::cancel::CancellationToken;
use super::error::{TransactionError, TransactionResult};
use super::metadata::TransactionMetadata;
use super::state::{OperationLog, OperationType, TransactionId, TransactionStatus};
use crate::constraints::{check_node, validate, ConstraintRegistry};
use crate::storage::graph_store::{
    merge_properties, replace_properties, stage_edge, stage_node, unstage_edge, unstage_node,
    validate_labels, validate_name,
};
use crate::storage::keys;
use crate::storage::persistent::decode_counter;
use crate::storage::traversal::{self, RawPath};
use crate::storage::{
    Direction, Edge, EdgeId, EntityRef, GraphStore, Node, NodeId, NodeValue, PathValue,
    Precondition, PropertyMap, RelationshipValue, StorageError, StorageResult, Value, WriteBatch,
};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::SystemTime;

/// Temporary index to permanent id, for nodes and relationships separately
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdMap {
    pub nodes: HashMap<u32, u64>,
    pub edges: HashMap<u32, u64>,
}

impl IdMap {
    pub fn resolve_node(&self, node: EntityRef) -> EntityRef {
        match node {
            EntityRef::Temporary(index) => self
                .nodes
                .get(&index)
                .map_or(node, |id| EntityRef::Permanent(*id)),
            permanent => permanent,
        }
    }

    pub fn resolve_edge(&self, edge: EntityRef) -> EntityRef {
        match edge {
            EntityRef::Temporary(index) => self
                .edges
                .get(&index)
                .map_or(edge, |id| EntityRef::Permanent(*id)),
            permanent => permanent,
        }
    }

    /// Replace temporary identities inside a result value
    pub fn rewrite(&self, value: &mut Value) {
        match value {
            Value::Node(node) => node.id = self.resolve_node(node.id),
            Value::Relationship(rel) => self.rewrite_relationship(rel),
            Value::Path(path) => {
                for node in &mut path.nodes {
                    node.id = self.resolve_node(node.id);
                }
                for rel in &mut path.relationships {
                    self.rewrite_relationship(rel);
                }
            }
            Value::List(items) => items.iter_mut().for_each(|v| self.rewrite(v)),
            Value::Map(map) => map.values_mut().for_each(|v| self.rewrite(v)),
            _ => {}
        }
    }

    fn rewrite_relationship(&self, rel: &mut RelationshipValue) {
        rel.id = self.resolve_edge(rel.id);
        rel.start = self.resolve_node(rel.start);
        rel.end = self.resolve_node(rel.end);
    }

    fn permanent_node(&self, node: EntityRef) -> StorageResult<u64> {
        self.resolve_node(node)
            .permanent()
            .ok_or_else(|| StorageError::NodeNotFound(node.to_string()))
    }
}

/// Outcome of a successful commit
#[derive(Debug, Clone)]
pub struct CommitSummary {
    pub transaction: TransactionId,
    pub id_map: IdMap,
    pub bookmark: String,
}

struct TxnInner {
    status: TransactionStatus,
    metadata: TransactionMetadata,
    buffer: WriteBuffer,
    log: OperationLog,
}

/// Buffered transaction over the shared store
pub struct Transaction {
    id: TransactionId,
    store: Arc<GraphStore>,
    registry: Arc<ConstraintRegistry>,
    cancel: CancellationToken,
    started_at: SystemTime,
    inner: Mutex<TxnInner>,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish()
    }
}

impl Transaction {
    pub(crate) fn new(
        id: TransactionId,
        store: Arc<GraphStore>,
        registry: Arc<ConstraintRegistry>,
        metadata: TransactionMetadata,
    ) -> Self {
        Self {
            id,
            store,
            registry,
            cancel: CancellationToken::new(),
            started_at: SystemTime::now(),
            inner: Mutex::new(TxnInner {
                status: TransactionStatus::Active,
                metadata,
                buffer: WriteBuffer::default(),
                log: OperationLog::default(),
            }),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn status(&self) -> TransactionStatus {
        self.inner.lock().status
    }

    pub fn is_active(&self) -> bool {
        self.status() == TransactionStatus::Active
    }

    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Token that cancels this transaction when triggered
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn operation_count(&self) -> usize {
        self.inner.lock().log.len()
    }

    pub fn get_metadata(&self) -> TransactionMetadata {
        self.inner.lock().metadata.clone()
    }

    /// Replace the metadata, subject to the size limit
    pub fn set_metadata(&self, entries: BTreeMap<String, Value>) -> TransactionResult<()> {
        let metadata = TransactionMetadata::from_map(entries)?;
        self.with_active(|inner| {
            inner.metadata = metadata;
            Ok(())
        })
    }

    fn with_active<R>(
        &self,
        f: impl FnOnce(&mut TxnInner) -> TransactionResult<R>,
    ) -> TransactionResult<R> {
        let mut inner = self.inner.lock();
        if inner.status != TransactionStatus::Active {
            return Err(TransactionError::Closed(self.id));
        }
        if self.cancel.is_cancelled() {
            return Err(TransactionError::Terminated(self.id));
        }
        f(&mut inner)
    }

    /// Run a read against the overlay and remember any committed versions it saw
    fn view<R>(
        &self,
        inner: &mut TxnInner,
        f: impl FnOnce(&Overlay<'_>) -> StorageResult<R>,
    ) -> TransactionResult<R> {
        let overlay = Overlay::new(&self.store, &inner.buffer);
        let result = f(&overlay);
        let seen = overlay.into_observations();
        inner.buffer.absorb(seen);
        Ok(result?)
    }

    fn read<R>(&self, f: impl FnOnce(&Overlay<'_>) -> StorageResult<R>) -> TransactionResult<R> {
        self.with_active(|inner| self.view(inner, f))
    }

    /// Advisory uniqueness probe for a node about to be buffered
    fn precheck(&self, inner: &mut TxnInner, node: &NodeValue) -> TransactionResult<()> {
        let constraints = self.registry.for_labels(&node.labels);
        if constraints.is_empty() {
            return Ok(());
        }
        let overlay = Overlay::new(&self.store, &inner.buffer);
        let result = check_node(node, &constraints, &overlay);
        let seen = overlay.into_observations();
        inner.buffer.absorb(seen);
        result.map_err(TransactionError::from)
    }

    // ----- reads -----

    pub fn get_node(&self, node: EntityRef) -> TransactionResult<Option<NodeValue>> {
        self.read(|view| view.node(node))
    }

    pub fn get_edge(&self, edge: EntityRef) -> TransactionResult<Option<RelationshipValue>> {
        self.read(|view| view.edge(edge))
    }

    pub fn nodes_by_label(&self, label: &str) -> TransactionResult<Vec<NodeValue>> {
        self.read(|view| view.nodes_by_label(label))
    }

    pub fn all_nodes(&self) -> TransactionResult<Vec<NodeValue>> {
        self.read(|view| view.all_nodes())
    }

    pub fn all_edges(&self) -> TransactionResult<Vec<RelationshipValue>> {
        self.read(|view| view.all_edges())
    }

    pub fn node_relationships(
        &self,
        node: EntityRef,
        direction: Direction,
        types: &[String],
    ) -> TransactionResult<Vec<RelationshipValue>> {
        self.read(|view| view.node_relationships(node, direction, types))
    }

    pub fn labels(&self) -> TransactionResult<Vec<String>> {
        self.read(|view| Ok(view.labels()?.into_iter().collect()))
    }

    pub fn relationship_types(&self) -> TransactionResult<Vec<String>> {
        self.read(|view| Ok(view.relationship_types()?.into_iter().collect()))
    }

    pub fn find_shortest_path(
        &self,
        start: EntityRef,
        end: EntityRef,
        types: &[String],
        direction: Direction,
        max_hops: usize,
    ) -> TransactionResult<Option<PathValue>> {
        self.read(|view| {
            view.require_node(start)?;
            view.require_node(end)?;
            match traversal::shortest_path(view, start, end, direction, types, max_hops)? {
                Some(raw) => Ok(Some(materialize(view, &raw)?)),
                None => Ok(None),
            }
        })
    }

    pub fn find_all_shortest_paths(
        &self,
        start: EntityRef,
        end: EntityRef,
        types: &[String],
        direction: Direction,
        max_hops: usize,
    ) -> TransactionResult<Vec<PathValue>> {
        self.read(|view| {
            view.require_node(start)?;
            view.require_node(end)?;
            traversal::all_shortest_paths(view, start, end, direction, types, max_hops)?
                .iter()
                .map(|raw| materialize(view, raw))
                .collect()
        })
    }

    pub fn find_all_paths(
        &self,
        start: EntityRef,
        end: EntityRef,
        types: &[String],
        direction: Direction,
        max_hops: usize,
    ) -> TransactionResult<Vec<PathValue>> {
        self.read(|view| {
            view.require_node(start)?;
            view.require_node(end)?;
            traversal::all_paths(view, start, end, direction, types, max_hops)?
                .iter()
                .map(|raw| materialize(view, raw))
                .collect()
        })
    }

    /// Paths leaving `start` with a length in `min_hops..=max_hops`
    pub fn expand_paths(
        &self,
        start: EntityRef,
        types: &[String],
        direction: Direction,
        min_hops: usize,
        max_hops: usize,
    ) -> TransactionResult<Vec<PathValue>> {
        self.read(|view| {
            view.require_node(start)?;
            traversal::expand_variable_length(view, start, direction, types, min_hops, max_hops)?
                .iter()
                .map(|raw| materialize(view, raw))
                .collect()
        })
    }

    // ----- node mutations -----

    pub fn create_node(
        &self,
        labels: Vec<String>,
        properties: PropertyMap,
    ) -> TransactionResult<NodeValue> {
        self.with_active(|inner| {
            validate_labels(&labels)?;
            let mut props = PropertyMap::new();
            merge_properties(&mut props, &properties)?;
            let mut unique_labels: Vec<String> = Vec::with_capacity(labels.len());
            for label in labels {
                if !unique_labels.contains(&label) {
                    unique_labels.push(label);
                }
            }
            let node = NodeValue {
                id: EntityRef::Temporary(inner.buffer.next_node_index()),
                labels: unique_labels,
                properties: props,
            };
            self.precheck(inner, &node)?;

            inner.buffer.created_nodes.push(Some(node.clone()));
            inner
                .log
                .record(OperationType::CreateNode, format!("create node {}", node.id));
            Ok(node)
        })
    }

    fn modify_node<F>(
        &self,
        node: EntityRef,
        operation: OperationType,
        change: F,
    ) -> TransactionResult<NodeValue>
    where
        F: FnOnce(&mut NodeValue) -> StorageResult<()>,
    {
        self.with_active(|inner| {
            let current = self.view(inner, |view| view.require_node(node))?;
            let mut next = current.clone();
            change(&mut next)?;
            if next == current {
                return Ok(next);
            }
            self.precheck(inner, &next)?;

            inner.buffer.put_node(next.clone());
            inner
                .log
                .record(operation, format!("{:?} node {}", operation, node));
            Ok(next)
        })
    }

    /// Merge properties into a node; null values remove keys
    pub fn update_node(&self, node: EntityRef, changes: &PropertyMap) -> TransactionResult<NodeValue> {
        self.modify_node(node, OperationType::UpdateNode, |n| {
            merge_properties(&mut n.properties, changes).map(|_| ())
        })
    }

    /// Replace every property of a node
    pub fn replace_node_properties(
        &self,
        node: EntityRef,
        properties: &PropertyMap,
    ) -> TransactionResult<NodeValue> {
        self.modify_node(node, OperationType::UpdateNode, |n| {
            replace_properties(&mut n.properties, properties).map(|_| ())
        })
    }

    pub fn remove_node_properties(
        &self,
        node: EntityRef,
        keys: &[String],
    ) -> TransactionResult<NodeValue> {
        self.modify_node(node, OperationType::UpdateNode, |n| {
            for key in keys {
                n.properties.remove(key);
            }
            Ok(())
        })
    }

    pub fn add_labels(&self, node: EntityRef, labels: &[String]) -> TransactionResult<NodeValue> {
        validate_labels(labels)?;
        self.modify_node(node, OperationType::SetLabels, |n| {
            for label in labels {
                if !n.labels.contains(label) {
                    n.labels.push(label.clone());
                }
            }
            Ok(())
        })
    }

    pub fn remove_labels(&self, node: EntityRef, labels: &[String]) -> TransactionResult<NodeValue> {
        self.modify_node(node, OperationType::SetLabels, |n| {
            n.labels.retain(|l| !labels.contains(l));
            Ok(())
        })
    }

    /// Delete a node that has no visible relationships
    pub fn delete_node(&self, node: EntityRef) -> TransactionResult<()> {
        self.with_active(|inner| {
            let remaining = self.view(inner, |view| {
                view.require_node(node)?;
                view.node_relationships(node, Direction::Both, &[])
            })?;
            if !remaining.is_empty() {
                return Err(StorageError::NodeHasRelationships(node.wire_id().to_string()).into());
            }
            inner.buffer.remove_node(node);
            inner
                .log
                .record(OperationType::DeleteNode, format!("delete node {}", node));
            Ok(())
        })
    }

    /// Delete a node and all of its relationships. Returns the number of
    /// relationships removed.
    pub fn detach_delete_node(&self, node: EntityRef) -> TransactionResult<usize> {
        self.with_active(|inner| {
            let remaining = self.view(inner, |view| {
                view.require_node(node)?;
                view.node_relationships(node, Direction::Both, &[])
            })?;
            let mut removed = 0;
            for rel in &remaining {
                // self-loops show up once; ids are unique
                inner.buffer.remove_edge(rel.id);
                removed += 1;
            }
            inner.buffer.remove_node(node);
            inner.log.record(
                OperationType::DeleteNode,
                format!("detach delete node {} ({} relationships)", node, removed),
            );
            Ok(removed)
        })
    }

    // ----- relationship mutations -----

    pub fn create_edge(
        &self,
        start: EntityRef,
        end: EntityRef,
        rel_type: &str,
        properties: PropertyMap,
    ) -> TransactionResult<RelationshipValue> {
        self.with_active(|inner| {
            validate_name(rel_type, "relationship type")?;
            let mut props = PropertyMap::new();
            merge_properties(&mut props, &properties)?;
            self.view(inner, |view| {
                view.require_node(start)?;
                view.require_node(end)
            })?;

            let rel = RelationshipValue {
                id: EntityRef::Temporary(inner.buffer.next_edge_index()),
                rel_type: rel_type.to_string(),
                start,
                end,
                properties: props,
            };
            inner.buffer.created_edges.push(Some(rel.clone()));
            inner.log.record(
                OperationType::CreateRelationship,
                format!("create relationship ({})-[:{}]->({})", start, rel_type, end),
            );
            Ok(rel)
        })
    }

    fn modify_edge<F>(&self, edge: EntityRef, change: F) -> TransactionResult<RelationshipValue>
    where
        F: FnOnce(&mut RelationshipValue) -> StorageResult<()>,
    {
        self.with_active(|inner| {
            let current = self.view(inner, |view| view.require_edge(edge))?;
            let mut next = current.clone();
            change(&mut next)?;
            if next != current {
                inner.buffer.put_edge(next.clone());
                inner.log.record(
                    OperationType::UpdateRelationship,
                    format!("update relationship {}", edge),
                );
            }
            Ok(next)
        })
    }

    pub fn update_edge(
        &self,
        edge: EntityRef,
        changes: &PropertyMap,
    ) -> TransactionResult<RelationshipValue> {
        self.modify_edge(edge, |r| merge_properties(&mut r.properties, changes).map(|_| ()))
    }

    pub fn replace_edge_properties(
        &self,
        edge: EntityRef,
        properties: &PropertyMap,
    ) -> TransactionResult<RelationshipValue> {
        self.modify_edge(edge, |r| {
            replace_properties(&mut r.properties, properties).map(|_| ())
        })
    }

    pub fn remove_edge_properties(
        &self,
        edge: EntityRef,
        keys: &[String],
    ) -> TransactionResult<RelationshipValue> {
        self.modify_edge(edge, |r| {
            for key in keys {
                r.properties.remove(key);
            }
            Ok(())
        })
    }

    pub fn delete_edge(&self, edge: EntityRef) -> TransactionResult<()> {
        self.with_active(|inner| {
            self.view(inner, |view| view.require_edge(edge))?;
            inner.buffer.remove_edge(edge);
            inner.log.record(
                OperationType::DeleteRelationship,
                format!("delete relationship {}", edge),
            );
            Ok(())
        })
    }

    // ----- termination -----

    /// Validate and apply the buffer. Any failure rolls the transaction back.
    pub fn commit(&self) -> TransactionResult<CommitSummary> {
        let mut inner = self.inner.lock();
        if inner.status != TransactionStatus::Active {
            return Err(TransactionError::Closed(self.id));
        }
        inner.status = TransactionStatus::Committing;
        let buffer = std::mem::take(&mut inner.buffer);
        let operations = inner.log.len();
        inner.log.clear();

        match self.apply(&buffer) {
            Ok(summary) => {
                inner.status = TransactionStatus::Committed;
                if inner.metadata.is_empty() {
                    info!("Committed {} ({} operations)", self.id, operations);
                } else {
                    info!(
                        "Committed {} ({} operations) metadata={}",
                        self.id,
                        operations,
                        inner.metadata.to_json()
                    );
                }
                Ok(summary)
            }
            Err(e) => {
                inner.status = TransactionStatus::RolledBack;
                warn!("Commit of {} failed, rolled back: {}", self.id, e);
                Err(e)
            }
        }
    }

    fn apply(&self, buffer: &WriteBuffer) -> TransactionResult<CommitSummary> {
        if self.cancel.is_cancelled() {
            return Err(TransactionError::Terminated(self.id));
        }
        let bookmark = format!("bg:{}", self.id.id());
        if !buffer.has_writes() {
            return Ok(CommitSummary {
                transaction: self.id,
                id_map: IdMap::default(),
                bookmark,
            });
        }

        // Epoch and guards are read before validation scans the data
        let epoch = decode_counter(self.store.read_raw(&keys::schema_epoch_key())?.as_deref());
        let constraints = self.registry.for_labels(&buffer.touched_labels()?);
        let mut guards: BTreeMap<String, i64> = BTreeMap::new();
        for constraint in &constraints {
            if !guards.contains_key(&constraint.label) {
                let raw = self
                    .store
                    .read_raw(&keys::label_guard_key(&constraint.label))?;
                guards.insert(constraint.label.clone(), decode_counter(raw.as_deref()));
            }
        }
        if !constraints.is_empty() {
            let overlay = Overlay::new(&self.store, buffer);
            validate(&constraints, &overlay)?;
        }

        let mut id_map = IdMap::default();
        for (index, node) in buffer.created_nodes.iter().enumerate() {
            if node.is_some() {
                id_map.nodes.insert(index as u32, self.store.generate_id()?);
            }
        }
        for (index, edge) in buffer.created_edges.iter().enumerate() {
            if edge.is_some() {
                id_map.edges.insert(index as u32, self.store.generate_id()?);
            }
        }

        let mut batch = WriteBatch::new();
        let mut preconditions = Vec::new();

        for (index, node) in buffer.created_nodes.iter().enumerate() {
            if let Some(node) = node {
                let id = id_map.permanent_node(EntityRef::Temporary(index as u32))?;
                let record = Node::new(NodeId(id), node.labels.clone(), node.properties.clone());
                stage_node(&mut batch, &record, None)?;
                preconditions.push(Precondition::Absent(keys::node_key(id)));
            }
        }
        for (id, node) in &buffer.updated_nodes {
            let previous = buffer.observed_node(*id)?;
            let record = Node::new(NodeId(*id), node.labels.clone(), node.properties.clone());
            stage_node(&mut batch, &record, Some(&previous))?;
            preconditions.push(observed_precondition(
                keys::node_key(*id),
                &buffer.observed_nodes,
                *id,
            ));
        }

        let mut removed_degree: HashMap<u64, i64> = HashMap::new();
        for id in &buffer.deleted_edges {
            let previous = buffer.observed_edge(*id)?;
            unstage_edge(&mut batch, &previous);
            *removed_degree.entry(previous.start.0).or_default() += 1;
            *removed_degree.entry(previous.end.0).or_default() += 1;
            preconditions.push(observed_precondition(
                keys::edge_key(*id),
                &buffer.observed_edges,
                *id,
            ));
        }
        for id in &buffer.deleted_nodes {
            let previous = buffer.observed_node(*id)?;
            unstage_node(&mut batch, &previous);
            preconditions.push(observed_precondition(
                keys::node_key(*id),
                &buffer.observed_nodes,
                *id,
            ));
            // Any relationship attached concurrently changes the counter
            let expected = removed_degree.get(id).copied().unwrap_or(0);
            preconditions.push(Precondition::counter(keys::degree_key(*id), expected));
        }

        for (index, rel) in buffer.created_edges.iter().enumerate() {
            if let Some(rel) = rel {
                let start = id_map.permanent_node(rel.start)?;
                let end = id_map.permanent_node(rel.end)?;
                for (endpoint, original) in [(start, rel.start), (end, rel.end)] {
                    if !original.is_temporary() && !buffer.updated_nodes.contains_key(&endpoint) {
                        preconditions.push(Precondition::Present(keys::node_key(endpoint)));
                    }
                }
                let id = id_map.edges.get(&(index as u32)).copied().ok_or_else(|| {
                    StorageError::Fault(format!("relationship tmp:{} has no identity", index))
                })?;
                let record = Edge {
                    id: EdgeId(id),
                    rel_type: rel.rel_type.clone(),
                    start: NodeId(start),
                    end: NodeId(end),
                    properties: rel.properties.clone(),
                };
                stage_edge(&mut batch, &record, None)?;
            }
        }
        for (id, rel) in &buffer.updated_edges {
            let previous = buffer.observed_edge(*id)?;
            let record = Edge {
                properties: rel.properties.clone(),
                ..previous.clone()
            };
            stage_edge(&mut batch, &record, Some(&previous))?;
            preconditions.push(observed_precondition(
                keys::edge_key(*id),
                &buffer.observed_edges,
                *id,
            ));
        }

        for (label, observed) in guards {
            preconditions.push(Precondition::counter(keys::label_guard_key(&label), observed));
        }
        preconditions.push(Precondition::counter(keys::schema_epoch_key(), epoch));

        if self.cancel.is_cancelled() {
            return Err(TransactionError::Terminated(self.id));
        }
        debug!(
            "{}: applying {} writes under {} preconditions",
            self.id,
            batch.len(),
            preconditions.len()
        );
        self.store.commit(&preconditions, &batch)?;

        Ok(CommitSummary {
            transaction: self.id,
            id_map,
            bookmark,
        })
    }

    /// Discard the buffer. Fails on a transaction that already terminated.
    pub fn rollback(&self) -> TransactionResult<()> {
        let mut inner = self.inner.lock();
        if inner.status != TransactionStatus::Active {
            return Err(TransactionError::Closed(self.id));
        }
        inner.buffer = WriteBuffer::default();
        inner.log.clear();
        inner.status = TransactionStatus::RolledBack;
        if inner.metadata.is_empty() {
            info!("Rolled back {}", self.id);
        } else {
            info!(
                "Rolled back {} metadata={}",
                self.id,
                inner.metadata.to_json()
            );
        }
        Ok(())
    }
}

fn observed_precondition(key: Vec<u8>, observed: &HashMap<u64, Vec<u8>>, id: u64) -> Precondition {
    match observed.get(&id) {
        Some(bytes) => Precondition::Equals(key, bytes.clone()),
        None => Precondition::Present(key),
    }
}

fn materialize(view: &Overlay<'_>, raw: &RawPath<EntityRef, EntityRef>) -> StorageResult<PathValue> {
    let nodes = raw
        .nodes
        .iter()
        .map(|id| view.require_node(*id))
        .collect::<StorageResult<Vec<_>>>()?;
    let relationships = raw
        .edges
        .iter()
        .map(|id| view.require_edge(*id))
        .collect::<StorageResult<Vec<_>>>()?;
    Ok(PathValue {
        nodes,
        relationships,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{Constraint, ConstraintKind};
    use crate::txn::state::TransactionIdGenerator;

    struct Harness {
        store: Arc<GraphStore>,
        registry: Arc<ConstraintRegistry>,
        ids: TransactionIdGenerator,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                store: Arc::new(GraphStore::memory().unwrap()),
                registry: Arc::new(ConstraintRegistry::new()),
                ids: TransactionIdGenerator::new(),
            }
        }

        fn begin(&self) -> Transaction {
            Transaction::new(
                self.ids.next_id(),
                self.store.clone(),
                self.registry.clone(),
                TransactionMetadata::new(),
            )
        }
    }

    fn props(pairs: &[(&str, Value)]) -> PropertyMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_read_your_writes_and_isolation() {
        let h = Harness::new();
        let t1 = h.begin();
        let node = t1
            .create_node(vec!["Person".into()], props(&[("name", "Ann".into())]))
            .unwrap();
        assert!(node.id.is_temporary());
        assert_eq!(t1.nodes_by_label("Person").unwrap().len(), 1);

        let t2 = h.begin();
        assert!(t2.nodes_by_label("Person").unwrap().is_empty());

        let summary = t1.commit().unwrap();
        let permanent = summary.id_map.resolve_node(node.id);
        assert!(!permanent.is_temporary());
        assert_eq!(h.store.node_count().unwrap(), 1);
        assert_eq!(t2.nodes_by_label("Person").unwrap().len(), 1);
    }

    #[test]
    fn test_rollback_is_terminal() {
        let h = Harness::new();
        let t = h.begin();
        t.create_node(vec![], PropertyMap::new()).unwrap();
        t.rollback().unwrap();
        assert!(matches!(t.rollback(), Err(TransactionError::Closed(_))));
        assert!(matches!(
            t.create_node(vec![], PropertyMap::new()),
            Err(TransactionError::Closed(_))
        ));
        assert_eq!(h.store.node_count().unwrap(), 0);
    }

    #[test]
    fn test_unique_precheck_leaves_buffer_untouched() {
        let h = Harness::new();
        let c = Constraint::new(None, ConstraintKind::Unique, "User", vec!["email".into()]).unwrap();
        h.registry.create(&h.store, c, false).unwrap();

        let t = h.begin();
        t.create_node(vec!["User".into()], props(&[("email", "a@x.com".into())]))
            .unwrap();
        let err = t
            .create_node(vec!["User".into()], props(&[("email", "a@x.com".into())]))
            .unwrap_err();
        assert!(matches!(err, TransactionError::Constraint(_)));
        assert!(t.is_active());
        assert_eq!(t.nodes_by_label("User").unwrap().len(), 1);
        t.commit().unwrap();
        assert_eq!(h.store.nodes_by_label("User").unwrap().len(), 1);
    }

    #[test]
    fn test_exists_checked_at_commit() {
        let h = Harness::new();
        let c = Constraint::new(None, ConstraintKind::Exists, "Person", vec!["name".into()]).unwrap();
        h.registry.create(&h.store, c, false).unwrap();

        let t = h.begin();
        let node = t
            .create_node(vec!["Person".into()], props(&[("age", 30.into())]))
            .unwrap();
        let err = t.commit().unwrap_err();
        assert!(matches!(err, TransactionError::Constraint(_)));
        assert_eq!(t.status(), TransactionStatus::RolledBack);
        assert_eq!(h.store.node_count().unwrap(), 0);

        // setting the property later in the same transaction satisfies it
        let t = h.begin();
        let node2 = t
            .create_node(vec!["Person".into()], props(&[("age", 30.into())]))
            .unwrap();
        t.update_node(node2.id, &props(&[("name", "Bo".into())]))
            .unwrap();
        t.commit().unwrap();
        assert!(node.id.is_temporary());
    }

    #[test]
    fn test_delete_with_relationships_requires_detach() {
        let h = Harness::new();
        let t = h.begin();
        let a = t.create_node(vec![], PropertyMap::new()).unwrap();
        let b = t.create_node(vec![], PropertyMap::new()).unwrap();
        t.create_edge(a.id, b.id, "KNOWS", PropertyMap::new()).unwrap();
        let summary = t.commit().unwrap();
        let a = summary.id_map.resolve_node(a.id);

        let t = h.begin();
        assert!(matches!(
            t.delete_node(a),
            Err(TransactionError::Storage(StorageError::NodeHasRelationships(_)))
        ));
        assert_eq!(t.detach_delete_node(a).unwrap(), 1);
        t.commit().unwrap();
        assert_eq!(h.store.edge_count().unwrap(), 0);
        assert_eq!(h.store.node_count().unwrap(), 1);
    }

    #[test]
    fn test_lost_update_conflicts() {
        let h = Harness::new();
        let node = h
            .store
            .create_node(vec![], props(&[("v", 1.into())]))
            .unwrap();
        let r = EntityRef::Permanent(node.id.0);

        let t1 = h.begin();
        let t2 = h.begin();
        t1.get_node(r).unwrap();
        t2.get_node(r).unwrap();
        t1.update_node(r, &props(&[("v", 2.into())])).unwrap();
        t2.update_node(r, &props(&[("v", 3.into())])).unwrap();
        t1.commit().unwrap();
        assert!(matches!(t2.commit(), Err(TransactionError::Conflict(_))));
        assert_eq!(
            h.store.get_node(node.id).unwrap().get_property("v"),
            Some(&Value::Integer(2))
        );
    }

    #[test]
    fn test_concurrent_unique_inserts_conflict() {
        let h = Harness::new();
        let c = Constraint::new(None, ConstraintKind::Unique, "User", vec!["email".into()]).unwrap();
        h.registry.create(&h.store, c, false).unwrap();

        let t1 = h.begin();
        let t2 = h.begin();
        t1.create_node(vec!["User".into()], props(&[("email", "a@x.com".into())]))
            .unwrap();
        t2.create_node(vec!["User".into()], props(&[("email", "a@x.com".into())]))
            .unwrap();
        t1.commit().unwrap();
        assert!(t2.commit().is_err());
        assert_eq!(h.store.nodes_by_label("User").unwrap().len(), 1);
    }

    #[test]
    fn test_cancelled_transaction_is_terminated() {
        let h = Harness::new();
        let t = h.begin();
        t.cancellation_token().cancel();
        assert!(matches!(
            t.create_node(vec![], PropertyMap::new()),
            Err(TransactionError::Terminated(_))
        ));
        t.rollback().unwrap();
    }

    #[test]
    fn test_id_map_rewrites_nested_values() {
        let mut map = IdMap::default();
        map.nodes.insert(0, 10);
        map.edges.insert(0, 11);
        let mut value = Value::List(vec![Value::Relationship(RelationshipValue {
            id: EntityRef::Temporary(0),
            rel_type: "R".into(),
            start: EntityRef::Temporary(0),
            end: EntityRef::Permanent(3),
            properties: PropertyMap::new(),
        })]);
        map.rewrite(&mut value);
        let rel = value.as_list().unwrap()[0].as_relationship().unwrap().clone();
        assert_eq!(rel.id, EntityRef::Permanent(11));
        assert_eq!(rel.start, EntityRef::Permanent(10));
    }
}
