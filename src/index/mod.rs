//! Index layer
//!
//! The B-tree engine and the node representation it operates on.

pub mod btree;
pub mod node;

#[cfg(test)]
mod proptests;

pub use btree::{BTree, TreeStats};
pub use node::{Node, NodeId};
