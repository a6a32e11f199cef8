//! Test doubles for node stores

use super::{MemoryStore, NodeStore, StoreResult};
use crate::error::StoreError;
use crate::index::{Node, NodeId};
use std::cell::Cell;

/// Wraps a [`MemoryStore`], counting operations and failing the n-th write.
///
/// Writes are `persist` and `discard` calls; `allocate` is not counted.
pub(crate) struct FaultyStore<K> {
    pub inner: MemoryStore<K>,
    pub fail_on_write: Option<usize>,
    pub writes: usize,
    pub reads: Cell<usize>,
}

impl<K> FaultyStore<K> {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_on_write: None,
            writes: 0,
            reads: Cell::new(0),
        }
    }

    /// Fail the write `n` writes from now (1 = the next one).
    pub fn fail_after(&mut self, n: usize) {
        self.fail_on_write = Some(self.writes + n);
    }

    fn tick_write(&mut self) -> StoreResult<()> {
        self.writes += 1;
        if self.fail_on_write == Some(self.writes) {
            return Err(StoreError::Injected(format!("write #{}", self.writes)));
        }
        Ok(())
    }
}

impl<K: Clone> NodeStore<K> for FaultyStore<K> {
    fn fetch(&self, id: NodeId) -> StoreResult<Node<K>> {
        self.reads.set(self.reads.get() + 1);
        self.inner.fetch(id)
    }

    fn allocate(&mut self) -> StoreResult<NodeId> {
        self.inner.allocate()
    }

    fn persist(&mut self, node: &Node<K>) -> StoreResult<()> {
        self.tick_write()?;
        self.inner.persist(node)
    }

    fn discard(&mut self, id: NodeId) -> StoreResult<()> {
        self.tick_write()?;
        self.inner.discard(id)
    }

    fn contains(&self, id: NodeId) -> StoreResult<bool> {
        self.inner.contains(id)
    }

    fn record_ids(&self) -> StoreResult<Vec<NodeId>> {
        self.inner.record_ids()
    }
}
