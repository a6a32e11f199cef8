//! In-memory node store
//!
//! Nodes are owned by the store's arena and reached by id, so the tree
//! engine treats memory and disk the same way.

use super::{NodeStore, StoreResult};
use crate::error::StoreError;
use crate::index::{Node, NodeId};
use std::collections::HashMap;

/// Arena of directly owned nodes
#[derive(Debug, Clone)]
pub struct MemoryStore<K> {
    nodes: HashMap<NodeId, Node<K>>,
    next_id: NodeId,
}

impl<K> MemoryStore<K> {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            next_id: NodeId::FIRST,
        }
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Borrow a node without cloning it.
    pub fn get(&self, id: NodeId) -> Option<&Node<K>> {
        self.nodes.get(&id)
    }
}

impl<K> Default for MemoryStore<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone> NodeStore<K> for MemoryStore<K> {
    fn fetch(&self, id: NodeId) -> StoreResult<Node<K>> {
        self.nodes
            .get(&id)
            .cloned()
            .ok_or(StoreError::MissingRecord(id))
    }

    fn allocate(&mut self) -> StoreResult<NodeId> {
        let id = self.next_id;
        self.next_id = id.next();
        Ok(id)
    }

    fn persist(&mut self, node: &Node<K>) -> StoreResult<()> {
        self.nodes.insert(node.id, node.clone());
        Ok(())
    }

    fn discard(&mut self, id: NodeId) -> StoreResult<()> {
        self.nodes
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::MissingRecord(id))
    }

    fn contains(&self, id: NodeId) -> StoreResult<bool> {
        Ok(self.nodes.contains_key(&id))
    }

    fn record_ids(&self) -> StoreResult<Vec<NodeId>> {
        let mut ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        ids.sort_unstable();
        Ok(ids)
    }
}
