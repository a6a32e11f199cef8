//! B-tree node and per-node ordering utilities
//!
//! A node never checks the degree bounds itself; the tree engine only calls
//! these helpers when the bound is known to hold.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque node reference.
///
/// `NodeId::ROOT` is the fixed reference of the root. Every other id is
/// handed out by the store's generator and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u64);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    /// First id handed out by a fresh generator.
    pub const FIRST: NodeId = NodeId(1);

    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A B-tree node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node<K> {
    /// Own reference (the record key in a node store)
    pub id: NodeId,

    /// Ascending keys, at most `2t - 1`
    pub keys: Vec<K>,

    /// Child references, `keys.len() + 1` of them when internal
    pub children: Vec<NodeId>,

    /// True iff `children` is empty
    pub leaf: bool,
}

impl<K> Node<K> {
    pub fn new_leaf(id: NodeId) -> Self {
        Self {
            id,
            keys: Vec::new(),
            children: Vec::new(),
            leaf: true,
        }
    }

    pub fn new_internal(id: NodeId) -> Self {
        Self {
            id,
            keys: Vec::new(),
            children: Vec::new(),
            leaf: false,
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Holds `2t - 1` keys and must be split before descending into it.
    pub fn is_full(&self, t: usize) -> bool {
        self.keys.len() >= 2 * t - 1
    }

    /// Holds at least `t` keys, so one can be removed without underflow.
    pub fn has_spare(&self, t: usize) -> bool {
        self.keys.len() >= t
    }

    /// Insert `key` at `i`, shifting later keys right.
    pub fn insert_key(&mut self, i: usize, key: K) {
        self.keys.insert(i, key);
    }

    /// Insert a child reference at `i`, shifting later children right.
    pub fn insert_child(&mut self, i: usize, child: NodeId) {
        self.children.insert(i, child);
        self.leaf = false;
    }

    pub fn remove_key(&mut self, i: usize) -> K {
        self.keys.remove(i)
    }

    pub fn remove_child(&mut self, i: usize) -> NodeId {
        let child = self.children.remove(i);
        self.leaf = self.children.is_empty();
        child
    }

    /// Remove and return the largest key.
    pub fn pop_max_key(&mut self) -> Option<K> {
        self.keys.pop()
    }

    /// Remove and return the smallest key.
    pub fn pop_min_key(&mut self) -> Option<K> {
        if self.keys.is_empty() {
            None
        } else {
            Some(self.keys.remove(0))
        }
    }

    pub fn pop_last_child(&mut self) -> Option<NodeId> {
        let child = self.children.pop();
        self.leaf = self.children.is_empty();
        child
    }

    pub fn pop_first_child(&mut self) -> Option<NodeId> {
        if self.children.is_empty() {
            None
        } else {
            Some(self.remove_child(0))
        }
    }

    pub fn first_child(&self) -> Option<NodeId> {
        self.children.first().copied()
    }

    pub fn last_child(&self) -> Option<NodeId> {
        self.children.last().copied()
    }

    /// Split a full node (`2t - 1` keys) around its middle key.
    ///
    /// `self` keeps keys `0..t-1` and children `0..t`; the returned sibling
    /// (stamped with `sibling_id`) gets keys `t..2t-1` and children `t..2t`.
    /// The middle key is returned for promotion into the parent.
    pub fn split_upper(&mut self, t: usize, sibling_id: NodeId) -> (K, Node<K>) {
        let upper_keys = self.keys.split_off(t);
        let middle = self.keys.remove(t - 1);

        let upper_children = if self.leaf {
            Vec::new()
        } else {
            self.children.split_off(t)
        };

        let sibling = Node {
            id: sibling_id,
            keys: upper_keys,
            children: upper_children,
            leaf: self.leaf,
        };
        (middle, sibling)
    }

    /// Merge: append `separator` and all of `right` into `self`.
    pub fn absorb(&mut self, separator: K, right: Node<K>) {
        self.keys.push(separator);
        self.keys.extend(right.keys);
        self.children.extend(right.children);
        self.leaf = self.children.is_empty();
    }

    /// Take over another node's content, keeping `self.id`.
    pub fn replace_content(&mut self, other: Node<K>) {
        self.keys = other.keys;
        self.children = other.children;
        self.leaf = other.leaf;
    }
}

impl<K: Ord> Node<K> {
    /// `Ok(i)` when `keys[i] == key`, otherwise `Err(i)` with `i` the index
    /// of the first key greater than `key`.
    ///
    /// Either way `i` is the insertion point and the child routing index.
    pub fn locate(&self, key: &K) -> Result<usize, usize> {
        self.keys.binary_search(key)
    }

    /// Index of the first key `>= key`.
    pub fn routing_index(&self, key: &K) -> usize {
        match self.locate(key) {
            Ok(i) | Err(i) => i,
        }
    }
}
