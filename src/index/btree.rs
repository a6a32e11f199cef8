//! Minimum-degree B-tree over a pluggable node store
//!
//! ## Design Principles
//! - **One algorithm**: search, insert and delete are written once against
//!   [`NodeStore`]; [`MemoryStore`] and [`DirStore`] are two instances of it
//! - **Single pass**: insert splits full nodes and delete tops up minimal
//!   nodes on the way down, so no operation ever walks back up
//! - **Stable root**: the root always lives at [`NodeId::ROOT`]; growing and
//!   collapsing move content in and out of that record
//! - **No caching**: every operation re-reads the nodes it visits
//!
//! ## Write ordering
//! ```text
//! split:  new sibling -> shrunk child -> parent
//! merge:  merged child -> parent -> discard absorbed sibling
//! borrow: donor sibling -> receiving child -> parent
//! ```
//! Children are always written before the parent that references them, so
//! an interrupted operation can leave unreachable records behind but never a
//! parent pointing at a record that does not exist. There is no rollback:
//! writes committed before a failure stay committed.

use crate::config::{DuplicatePolicy, StoreConfig, TreeConfig};
use crate::index::node::{Node, NodeId};
use crate::storage::{DirStore, MemoryStore, NodeStore};
use crate::{BTreeError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt::Debug;
use std::marker::PhantomData;
use tracing::{debug, trace};

/// Shape of a tree, as measured by [`BTree::validate`]
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct TreeStats {
    /// Number of levels (1 for a lone root leaf)
    pub height: usize,

    /// Reachable nodes, root included
    pub nodes: usize,

    pub leaves: usize,

    /// Keys stored across all reachable nodes
    pub keys: usize,
}

/// B-tree with set semantics
///
/// Mutating operations take `&mut self`; a tree assumes exclusive access to
/// its store for the duration of every call.
pub struct BTree<K, S = MemoryStore<K>> {
    config: TreeConfig,
    store: S,
    _marker: PhantomData<K>,
}

impl<K> BTree<K, MemoryStore<K>>
where
    K: Ord + Clone + Debug,
{
    /// Create an empty tree whose nodes live in memory.
    pub fn in_memory(min_degree: usize) -> Result<Self> {
        Self::new(TreeConfig::with_degree(min_degree), MemoryStore::new())
    }
}

impl<K> BTree<K, DirStore<K>>
where
    K: Ord + Clone + Debug + Serialize + DeserializeOwned,
{
    /// Create or reopen a tree stored as one file per node in a directory.
    pub fn open_dir(config: TreeConfig, store_config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let store = DirStore::open(store_config, config.min_degree)?;
        Self::new(config, store)
    }
}

impl<K, S> BTree<K, S>
where
    K: Ord + Clone + Debug,
    S: NodeStore<K>,
{
    /// Create a tree on top of `store`.
    ///
    /// An empty store gets an empty leaf root. A store that already holds a
    /// root is reopened as-is. A store that records the degree it was built
    /// with must agree with `config`.
    pub fn new(config: TreeConfig, mut store: S) -> Result<Self> {
        config.validate()?;

        if let Some(recorded) = store.recorded_degree() {
            if recorded != config.min_degree {
                return Err(BTreeError::Config(format!(
                    "store holds a tree of minimum degree {}, opened with {}",
                    recorded, config.min_degree
                )));
            }
        }

        if !store.contains(NodeId::ROOT)? {
            store.persist(&Node::new_leaf(NodeId::ROOT))?;
            debug!("initialized empty root (t={})", config.min_degree);
        }

        Ok(Self {
            config,
            store,
            _marker: PhantomData,
        })
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Minimum degree `t`
    pub fn degree(&self) -> usize {
        self.config.min_degree
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Check whether `key` is in the tree.
    pub fn exists(&self, key: &K) -> Result<bool> {
        Ok(self.search(key)?.is_some())
    }

    /// Find the node holding `key` and the key's index in it.
    pub fn search(&self, key: &K) -> Result<Option<(Node<K>, usize)>> {
        let mut node = self.store.fetch(NodeId::ROOT)?;
        loop {
            match node.locate(key) {
                Ok(i) => return Ok(Some((node, i))),
                Err(_) if node.leaf => return Ok(None),
                Err(i) => {
                    let child = node.children[i];
                    node = self.store.fetch(child)?;
                }
            }
        }
    }

    /// Insert `key`.
    ///
    /// Returns `Ok(true)` if the key was added. An existing key is handled by
    /// the configured [`DuplicatePolicy`]; in either case nothing is written.
    pub fn insert(&mut self, key: K) -> Result<bool> {
        if self.exists(&key)? {
            return match self.config.duplicate_policy {
                DuplicatePolicy::Ignore => {
                    trace!("insert {:?}: already present", key);
                    Ok(false)
                }
                DuplicatePolicy::Reject => Err(BTreeError::DuplicateKey(format!("{:?}", key))),
            };
        }

        let mut root = self.store.fetch(NodeId::ROOT)?;
        if root.is_full(self.degree()) {
            root = self.grow_root(root)?;
        }
        self.insert_non_full(root, key)
    }

    /// Height +1: move the full root's content into a fresh record, hang it
    /// under an empty root and split it.
    fn grow_root(&mut self, mut old_root: Node<K>) -> Result<Node<K>> {
        let relocated = self.store.allocate()?;
        old_root.id = relocated;

        let mut root = Node::new_internal(NodeId::ROOT);
        root.children.push(relocated);
        self.split_child(&mut root, 0, old_root)?;

        debug!("root grew, old root content moved to {}", relocated);
        Ok(root)
    }

    /// Split the full `child` sitting at `parent.children[i]`.
    ///
    /// Returns the two halves, left then right.
    fn split_child(
        &mut self,
        parent: &mut Node<K>,
        i: usize,
        mut child: Node<K>,
    ) -> Result<(Node<K>, Node<K>)> {
        let t = self.degree();
        let sibling_id = self.store.allocate()?;
        let (middle, sibling) = child.split_upper(t, sibling_id);

        parent.insert_key(i, middle);
        parent.insert_child(i + 1, sibling_id);

        self.store.persist(&sibling)?;
        self.store.persist(&child)?;
        self.store.persist(parent)?;

        debug!(
            "split {} under {} at slot {}: new sibling {}",
            child.id, parent.id, i, sibling_id
        );
        Ok((child, sibling))
    }

    fn insert_non_full(&mut self, mut node: Node<K>, key: K) -> Result<bool> {
        let t = self.degree();
        loop {
            let i = match node.locate(&key) {
                Ok(_) => return Ok(false),
                Err(i) => i,
            };

            if node.leaf {
                node.insert_key(i, key);
                self.store.persist(&node)?;
                return Ok(true);
            }

            let child = self.store.fetch(node.children[i])?;
            node = if child.is_full(t) {
                let (left, right) = self.split_child(&mut node, i, child)?;
                if key > node.keys[i] {
                    right
                } else {
                    left
                }
            } else {
                child
            };
        }
    }

    /// Delete `key`.
    ///
    /// An absent key is [`BTreeError::NotFound`] and leaves the tree
    /// untouched. Otherwise the key is removed in one downward pass: every
    /// node the pass enters (other than the root) holds at least `t` keys,
    /// so removing one never underflows it.
    pub fn delete(&mut self, key: &K) -> Result<()> {
        if self.search(key)?.is_none() {
            return Err(BTreeError::NotFound(format!("{:?}", key)));
        }

        let t = self.degree();
        let mut target = key.clone();
        let mut node = self.store.fetch(NodeId::ROOT)?;

        loop {
            match node.locate(&target) {
                Ok(i) if node.leaf => {
                    node.remove_key(i);
                    self.store.persist(&node)?;
                    return Ok(());
                }
                Ok(i) => {
                    let left = self.store.fetch(node.children[i])?;
                    if left.has_spare(t) {
                        let predecessor = self.subtree_max(&left)?;
                        node.keys[i] = predecessor.clone();
                        self.store.persist(&node)?;
                        target = predecessor;
                        node = left;
                        continue;
                    }

                    let right = self.store.fetch(node.children[i + 1])?;
                    if right.has_spare(t) {
                        let successor = self.subtree_min(&right)?;
                        node.keys[i] = successor.clone();
                        self.store.persist(&node)?;
                        target = successor;
                        node = right;
                        continue;
                    }

                    // Both neighbours minimal: the key sinks into the merged
                    // node and its position there is looked up again.
                    node = self.merge_children(node, i, left, right)?;
                }
                Err(_) if node.leaf => {
                    return Err(BTreeError::Corruption(format!(
                        "{:?} vanished during delete",
                        target
                    )));
                }
                Err(i) => {
                    let child = self.store.fetch(node.children[i])?;
                    node = if child.has_spare(t) {
                        child
                    } else {
                        self.fill_child(node, i, child)?
                    };
                }
            }
        }
    }

    /// Largest key in the subtree rooted at `node`.
    fn subtree_max(&self, node: &Node<K>) -> Result<K> {
        let mut current = node.clone();
        while let Some(child) = current.last_child() {
            current = self.store.fetch(child)?;
        }
        current.keys.last().cloned().ok_or_else(|| {
            BTreeError::Corruption(format!("empty leaf {} under {}", current.id, node.id))
        })
    }

    /// Smallest key in the subtree rooted at `node`.
    fn subtree_min(&self, node: &Node<K>) -> Result<K> {
        let mut current = node.clone();
        while let Some(child) = current.first_child() {
            current = self.store.fetch(child)?;
        }
        current.keys.first().cloned().ok_or_else(|| {
            BTreeError::Corruption(format!("empty leaf {} under {}", current.id, node.id))
        })
    }

    /// Give the minimal child at `parent.children[i]` a spare key before
    /// descending into it. Returns the node to continue in.
    fn fill_child(&mut self, parent: Node<K>, i: usize, child: Node<K>) -> Result<Node<K>> {
        let t = self.degree();

        if i > 0 {
            let left = self.store.fetch(parent.children[i - 1])?;
            if left.has_spare(t) {
                return self.borrow_from_left(parent, i, left, child);
            }
            if i + 1 == parent.children.len() {
                return self.merge_children(parent, i - 1, left, child);
            }
        }

        let right = self.store.fetch(parent.children[i + 1])?;
        if right.has_spare(t) {
            return self.borrow_from_right(parent, i, child, right);
        }
        self.merge_children(parent, i, child, right)
    }

    /// Rotate the left sibling's largest key through the parent into
    /// `child`.
    fn borrow_from_left(
        &mut self,
        mut parent: Node<K>,
        i: usize,
        mut left: Node<K>,
        mut child: Node<K>,
    ) -> Result<Node<K>> {
        let donated = left.pop_max_key().ok_or_else(|| {
            BTreeError::Corruption(format!("donor {} has no keys", left.id))
        })?;
        let separator = std::mem::replace(&mut parent.keys[i - 1], donated);
        child.insert_key(0, separator);

        if !left.leaf {
            let moved = left.pop_last_child().ok_or_else(|| {
                BTreeError::Corruption(format!("internal donor {} has no children", left.id))
            })?;
            child.insert_child(0, moved);
        }

        self.store.persist(&left)?;
        self.store.persist(&child)?;
        self.store.persist(&parent)?;

        debug!("{} borrowed from left sibling {}", child.id, left.id);
        Ok(child)
    }

    /// Rotate the right sibling's smallest key through the parent into
    /// `child`.
    fn borrow_from_right(
        &mut self,
        mut parent: Node<K>,
        i: usize,
        mut child: Node<K>,
        mut right: Node<K>,
    ) -> Result<Node<K>> {
        let donated = right.pop_min_key().ok_or_else(|| {
            BTreeError::Corruption(format!("donor {} has no keys", right.id))
        })?;
        let separator = std::mem::replace(&mut parent.keys[i], donated);
        child.keys.push(separator);

        if !right.leaf {
            let moved = right.pop_first_child().ok_or_else(|| {
                BTreeError::Corruption(format!("internal donor {} has no children", right.id))
            })?;
            let end = child.children.len();
            child.insert_child(end, moved);
        }

        self.store.persist(&right)?;
        self.store.persist(&child)?;
        self.store.persist(&parent)?;

        debug!("{} borrowed from right sibling {}", child.id, right.id);
        Ok(child)
    }

    /// Merge `parent.children[i + 1]` and the separator `parent.keys[i]`
    /// into `parent.children[i]`.
    ///
    /// If the parent is left without keys (only the root can be) the merged
    /// content moves into the root record and the tree loses a level.
    fn merge_children(
        &mut self,
        mut parent: Node<K>,
        i: usize,
        mut left: Node<K>,
        right: Node<K>,
    ) -> Result<Node<K>> {
        let separator = parent.remove_key(i);
        parent.remove_child(i + 1);
        let right_id = right.id;
        left.absorb(separator, right);

        if parent.is_empty() {
            let merged_id = left.id;
            parent.replace_content(left);
            self.store.persist(&parent)?;
            self.store.discard(right_id)?;
            self.store.discard(merged_id)?;

            debug!(
                "root collapsed into merge of {} and {}",
                merged_id, right_id
            );
            return Ok(parent);
        }

        self.store.persist(&left)?;
        self.store.persist(&parent)?;
        self.store.discard(right_id)?;

        debug!("merged {} into {} under {}", right_id, left.id, parent.id);
        Ok(left)
    }

    /// Walk every reachable node and check the B-tree invariants.
    ///
    /// Checks key-count bounds, child counts, equal leaf depth, strict
    /// ordering (which makes the in-order sequence strictly increasing) and
    /// that every record carries the id it was fetched under.
    pub fn validate(&self) -> Result<TreeStats> {
        let t = self.degree();
        let max_keys = self.config.max_keys();
        let min_keys = self.config.min_keys();

        let mut stats = TreeStats::default();
        let mut leaf_depth: Option<usize> = None;
        let mut seen = HashSet::new();

        // (id, depth, exclusive lower bound, exclusive upper bound)
        let mut stack: Vec<(NodeId, usize, Option<K>, Option<K>)> =
            vec![(NodeId::ROOT, 1, None, None)];

        while let Some((id, depth, lower, upper)) = stack.pop() {
            if !seen.insert(id) {
                return Err(BTreeError::Corruption(format!("{} reachable twice", id)));
            }

            let node = self.store.fetch(id)?;
            if node.id != id {
                return Err(BTreeError::Corruption(format!(
                    "record {} holds node {}",
                    id, node.id
                )));
            }

            let n = node.keys.len();
            if n > max_keys || (!id.is_root() && n < min_keys) {
                return Err(BTreeError::Corruption(format!(
                    "{} holds {} keys, allowed {}..={} (t={})",
                    id,
                    n,
                    if id.is_root() { 0 } else { min_keys },
                    max_keys,
                    t
                )));
            }

            if node.keys.windows(2).any(|w| w[0] >= w[1]) {
                return Err(BTreeError::Corruption(format!("{} keys out of order", id)));
            }
            if let (Some(lo), Some(first)) = (&lower, node.keys.first()) {
                if first <= lo {
                    return Err(BTreeError::Corruption(format!(
                        "{} key {:?} not above separator {:?}",
                        id, first, lo
                    )));
                }
            }
            if let (Some(hi), Some(last)) = (&upper, node.keys.last()) {
                if last >= hi {
                    return Err(BTreeError::Corruption(format!(
                        "{} key {:?} not below separator {:?}",
                        id, last, hi
                    )));
                }
            }

            stats.nodes += 1;
            stats.keys += n;
            stats.height = stats.height.max(depth);

            if node.leaf != node.children.is_empty() {
                return Err(BTreeError::Corruption(format!(
                    "{} leaf flag {} with {} children",
                    id,
                    node.leaf,
                    node.children.len()
                )));
            }

            if node.leaf {
                stats.leaves += 1;
                match leaf_depth {
                    None => leaf_depth = Some(depth),
                    Some(d) if d != depth => {
                        return Err(BTreeError::Corruption(format!(
                            "leaf {} at depth {}, expected {}",
                            id, depth, d
                        )));
                    }
                    Some(_) => {}
                }
                continue;
            }

            if node.children.len() != n + 1 {
                return Err(BTreeError::Corruption(format!(
                    "{} has {} keys but {} children",
                    id,
                    n,
                    node.children.len()
                )));
            }

            for (c, &child) in node.children.iter().enumerate() {
                let lo = if c == 0 {
                    lower.clone()
                } else {
                    Some(node.keys[c - 1].clone())
                };
                let hi = if c == n {
                    upper.clone()
                } else {
                    Some(node.keys[c].clone())
                };
                stack.push((child, depth + 1, lo, hi));
            }
        }

        Ok(stats)
    }

    /// Store records that no path from the root reaches.
    ///
    /// After completed operations this is empty; an interrupted split or
    /// merge can leave entries behind.
    pub fn orphaned_records(&self) -> Result<Vec<NodeId>> {
        let mut reachable = HashSet::new();
        let mut stack = vec![NodeId::ROOT];
        while let Some(id) = stack.pop() {
            if !reachable.insert(id) {
                continue;
            }
            let node = self.store.fetch(id)?;
            stack.extend(node.children.iter().copied());
        }

        Ok(self
            .store
            .record_ids()?
            .into_iter()
            .filter(|id| !reachable.contains(id))
            .collect())
    }
}
