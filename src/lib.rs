//! Minimum-degree B-tree with pluggable node storage
//!
//! ## Features
//! - Set semantics over any `Ord` key: search, exists, insert, delete
//! - Top-down insert (preemptive split) and top-down delete (borrow/merge),
//!   so no operation walks back up the tree
//! - Nodes addressed by opaque [`NodeId`]s; the root is always
//!   [`NodeId::ROOT`]
//!
//! ## Architecture
//! - Index layer: [`BTree`] engine and [`Node`] representation
//! - Storage layer: [`NodeStore`] capability with an in-memory arena
//!   ([`MemoryStore`]) and a one-file-per-node directory store ([`DirStore`])
//!
//! ```
//! use duobtree::BTree;
//!
//! let mut tree = BTree::in_memory(3)?;
//! for key in ["A", "B", "D", "E", "F", "C"] {
//!     tree.insert(key.to_string())?;
//! }
//! tree.delete(&"D".to_string())?;
//! assert!(!tree.exists(&"D".to_string())?);
//! # Ok::<(), duobtree::BTreeError>(())
//! ```

pub mod config;
pub mod index;
pub mod storage;

mod error;

pub use config::{DuplicatePolicy, DurabilityLevel, StoreConfig, TreeConfig};
pub use error::{BTreeError, Result, StoreError};
pub use index::{BTree, Node, NodeId, TreeStats};
pub use storage::{DirStore, MemoryStore, NodeStore};
