//! Node storage layer
//!
//! The tree engine reaches its nodes only through [`NodeStore`], so the same
//! algorithm runs over an in-memory arena or a durable record store.

pub mod checksum;
pub mod dir_store;
pub mod memory;

#[cfg(test)]
pub(crate) mod testing;

pub use checksum::{decode_frame, encode_frame, ChecksumType};
pub use dir_store::{DirStore, SuperBlock};
pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::index::{Node, NodeId};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Node access capability
///
/// A store maps [`NodeId`]s to nodes. Records are upserted under the node's
/// own id and ids come from a monotonic generator that never hands out the
/// same id twice (including after a reopen).
///
/// No method is atomic with respect to any other; a caller that needs
/// several writes to land together gets no help here.
pub trait NodeStore<K> {
    /// Read a node. A missing record is [`StoreError::MissingRecord`].
    fn fetch(&self, id: NodeId) -> StoreResult<Node<K>>;

    /// Reserve a fresh id. Never returns [`NodeId::ROOT`].
    fn allocate(&mut self) -> StoreResult<NodeId>;

    /// Durably create or replace the record for `node.id`.
    fn persist(&mut self, node: &Node<K>) -> StoreResult<()>;

    /// Remove a record. Removing an absent record is an error.
    fn discard(&mut self, id: NodeId) -> StoreResult<()>;

    fn contains(&self, id: NodeId) -> StoreResult<bool>;

    /// Ids of every stored record, in ascending order.
    fn record_ids(&self) -> StoreResult<Vec<NodeId>>;

    /// Minimum degree the stored tree was built with, if the store
    /// records one.
    fn recorded_degree(&self) -> Option<usize> {
        None
    }

    /// Allocate an id for `node`, stamp it and persist it.
    fn create(&mut self, mut node: Node<K>) -> StoreResult<NodeId> {
        let id = self.allocate()?;
        node.id = id;
        self.persist(&node)?;
        Ok(id)
    }
}
