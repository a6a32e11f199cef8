//! Directory-backed durable node store
//!
//! ## Layout
//! ```text
//! <dir>/superblock.json   magic, version, min degree, id generator high-water mark
//! <dir>/<id>.node         [len:u32][bincode Node<K>][crc32:u32]
//! ```
//!
//! Every record write goes to a temporary file that is renamed into place,
//! so a single record is either the old or the new version. Nothing makes
//! several records change together: a crash between the writes of a split
//! or merge leaves whichever records were already renamed.

use super::checksum::{decode_frame, encode_frame, ChecksumType};
use super::{NodeStore, StoreResult};
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::index::{Node, NodeId};
use crate::{BTreeError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

const SUPERBLOCK_FILE: &str = "superblock.json";

const RECORD_EXT: &str = "node";

const TEMP_EXT: &str = "tmp";

/// Magic number for store directories (ASCII "BTRD")
const STORE_MAGIC: u32 = 0x4254_5244;

/// Current store format version
const STORE_VERSION: u32 = 1;

/// Store metadata, rewritten whenever the id generator advances
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SuperBlock {
    pub magic: u32,

    pub version: u32,

    /// Minimum degree of the tree stored here
    pub min_degree: usize,

    /// Whether records carry a CRC32 trailer
    pub checksum: bool,

    /// Next id the generator hands out
    pub next_id: u64,
}

impl SuperBlock {
    fn fresh(min_degree: usize, checksum: bool) -> Self {
        Self {
            magic: STORE_MAGIC,
            version: STORE_VERSION,
            min_degree,
            checksum,
            next_id: NodeId::FIRST.as_u64(),
        }
    }
}

/// One file per node in a directory
pub struct DirStore<K> {
    config: StoreConfig,
    checksum: ChecksumType,
    superblock: SuperBlock,
    _marker: PhantomData<fn() -> K>,
}

impl<K> DirStore<K> {
    /// Open the store in `config.path`, creating it if needed.
    ///
    /// Reopening with a different `min_degree` or checksum setting than the
    /// ones recorded in the superblock is a configuration error.
    pub fn open(config: StoreConfig, min_degree: usize) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.path)?;

        let checksum = ChecksumType::from_enabled(config.checksum);
        let superblock_path = config.path.join(SUPERBLOCK_FILE);

        let superblock = if superblock_path.try_exists()? {
            let superblock = Self::read_superblock(&superblock_path)?;

            if superblock.magic != STORE_MAGIC {
                return Err(StoreError::Corruption(format!(
                    "invalid store magic: expected 0x{:08X}, got 0x{:08X}",
                    STORE_MAGIC, superblock.magic
                ))
                .into());
            }
            if superblock.version != STORE_VERSION {
                return Err(StoreError::Corruption(format!(
                    "unsupported store version: {}",
                    superblock.version
                ))
                .into());
            }
            if superblock.min_degree != min_degree {
                return Err(BTreeError::Config(format!(
                    "store at {} was built with minimum degree {}, opened with {}",
                    config.path.display(),
                    superblock.min_degree,
                    min_degree
                )));
            }
            if superblock.checksum != config.checksum {
                return Err(BTreeError::Config(format!(
                    "store at {} was built with checksums {}, opened with checksums {}",
                    config.path.display(),
                    on_off(superblock.checksum),
                    on_off(config.checksum)
                )));
            }
            superblock
        } else {
            SuperBlock::fresh(min_degree, config.checksum)
        };

        let mut store = Self {
            config,
            checksum,
            superblock,
            _marker: PhantomData,
        };

        // The generator must stay ahead of every record on disk, even if
        // the superblock write after an allocation was lost.
        let highest = store.list_records()?.last().copied();
        if let Some(highest) = highest {
            if highest.as_u64() >= store.superblock.next_id {
                warn!(
                    "store {}: generator at {} behind record {}, advancing",
                    store.config.path.display(),
                    store.superblock.next_id,
                    highest
                );
                store.superblock.next_id = highest.as_u64() + 1;
            }
        }
        store.write_superblock()?;

        debug!(
            "opened node store at {} (t={}, next_id={}, durability={})",
            store.config.path.display(),
            store.superblock.min_degree,
            store.superblock.next_id,
            store.config.durability.description()
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn superblock(&self) -> &SuperBlock {
        &self.superblock
    }

    fn record_path(&self, id: NodeId) -> PathBuf {
        self.config
            .path
            .join(format!("{}.{}", id.as_u64(), RECORD_EXT))
    }

    fn read_superblock(path: &Path) -> StoreResult<SuperBlock> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| StoreError::Corruption(format!("failed to parse superblock: {}", e)))
    }

    fn write_superblock(&self) -> StoreResult<()> {
        let data = serde_json::to_vec_pretty(&self.superblock)?;
        self.write_atomic(&self.config.path.join(SUPERBLOCK_FILE), &data)
    }

    /// Write through a temp file and rename into place.
    fn write_atomic(&self, path: &Path, data: &[u8]) -> StoreResult<()> {
        let sync = self.config.durability.requires_sync();
        let tmp = path.with_extension(TEMP_EXT);
        {
            let mut file = File::create(&tmp)?;
            file.write_all(data)?;
            if sync {
                file.sync_all()?;
            }
        }
        fs::rename(&tmp, path)?;
        if sync {
            self.sync_dir()?;
        }
        Ok(())
    }

    #[cfg(unix)]
    fn sync_dir(&self) -> StoreResult<()> {
        File::open(&self.config.path)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_dir(&self) -> StoreResult<()> {
        Ok(())
    }

    fn list_records(&self) -> StoreResult<Vec<NodeId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.config.path)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(stem) = name.strip_suffix(RECORD_EXT).and_then(|s| s.strip_suffix('.')) else {
                continue;
            };
            if let Ok(raw) = stem.parse::<u64>() {
                ids.push(NodeId::new(raw));
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

impl<K> NodeStore<K> for DirStore<K>
where
    K: Serialize + DeserializeOwned,
{
    fn fetch(&self, id: NodeId) -> StoreResult<Node<K>> {
        let bytes = match fs::read(self.record_path(id)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::MissingRecord(id));
            }
            Err(e) => return Err(e.into()),
        };

        let payload = decode_frame(self.checksum, &bytes).map_err(|e| match e {
            StoreError::Corruption(msg) => StoreError::Corruption(format!("record {}: {}", id, msg)),
            other => other,
        })?;
        let node: Node<K> = bincode::deserialize(payload)?;

        if node.id != id {
            return Err(StoreError::Corruption(format!(
                "record {} holds node {}",
                id, node.id
            )));
        }

        trace!("read {} ({} keys, {} bytes)", id, node.keys.len(), bytes.len());
        Ok(node)
    }

    fn allocate(&mut self) -> StoreResult<NodeId> {
        let id = NodeId::new(self.superblock.next_id);
        self.superblock.next_id += 1;
        self.write_superblock()?;
        Ok(id)
    }

    fn persist(&mut self, node: &Node<K>) -> StoreResult<()> {
        let payload = bincode::serialize(node)?;
        let framed = encode_frame(self.checksum, &payload);
        self.write_atomic(&self.record_path(node.id), &framed)?;
        trace!("wrote {} ({} keys, {} bytes)", node.id, node.keys.len(), framed.len());
        Ok(())
    }

    fn discard(&mut self, id: NodeId) -> StoreResult<()> {
        match fs::remove_file(self.record_path(id)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::MissingRecord(id));
            }
            Err(e) => return Err(e.into()),
        }
        if self.config.durability.requires_sync() {
            self.sync_dir()?;
        }
        trace!("removed {}", id);
        Ok(())
    }

    fn contains(&self, id: NodeId) -> StoreResult<bool> {
        Ok(self.record_path(id).try_exists()?)
    }

    fn record_ids(&self) -> StoreResult<Vec<NodeId>> {
        self.list_records()
    }

    fn recorded_degree(&self) -> Option<usize> {
        Some(self.superblock.min_degree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store(t: usize) -> (DirStore<String>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig::for_testing(temp_dir.path().join("tree"));
        let store = DirStore::open(config, t).unwrap();
        (store, temp_dir)
    }

    fn sample_node(id: NodeId) -> Node<String> {
        let mut node = Node::new_leaf(id);
        node.keys = vec!["A".to_string(), "B".to_string()];
        node
    }

    #[test]
    fn test_persist_and_fetch() {
        let (mut store, _temp) = create_test_store(3);

        let node = sample_node(NodeId::ROOT);
        store.persist(&node).unwrap();

        assert!(store.contains(NodeId::ROOT).unwrap());
        assert_eq!(store.fetch(NodeId::ROOT).unwrap(), node);
        assert_eq!(store.record_ids().unwrap(), vec![NodeId::ROOT]);
    }

    #[test]
    fn test_missing_record() {
        let (mut store, _temp) = create_test_store(3);

        assert!(matches!(
            store.fetch(NodeId::new(9)),
            Err(StoreError::MissingRecord(id)) if id == NodeId::new(9)
        ));
        assert!(matches!(
            store.discard(NodeId::new(9)),
            Err(StoreError::MissingRecord(_))
        ));
    }

    #[test]
    fn test_discard() {
        let (mut store, _temp) = create_test_store(3);

        let id = store.create(sample_node(NodeId::ROOT)).unwrap();
        assert!(store.contains(id).unwrap());
        store.discard(id).unwrap();
        assert!(!store.contains(id).unwrap());
        assert!(store.record_ids().unwrap().is_empty());
    }

    #[test]
    fn test_generator_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig::for_testing(temp_dir.path().join("tree"));

        let last = {
            let mut store: DirStore<String> = DirStore::open(config.clone(), 3).unwrap();
            store.allocate().unwrap();
            store.allocate().unwrap()
        };

        let mut store: DirStore<String> = DirStore::open(config, 3).unwrap();
        let next = store.allocate().unwrap();
        assert!(next > last, "ids must never be reused ({} <= {})", next, last);
    }

    #[test]
    fn test_generator_catches_up_with_records() {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig::for_testing(temp_dir.path().join("tree"));

        {
            let mut store: DirStore<String> = DirStore::open(config.clone(), 3).unwrap();
            // Record written without the generator knowing about it
            store.persist(&sample_node(NodeId::new(40))).unwrap();
        }

        let mut store: DirStore<String> = DirStore::open(config, 3).unwrap();
        assert_eq!(store.superblock().next_id, 41);
        assert_eq!(store.allocate().unwrap(), NodeId::new(41));
    }

    #[test]
    fn test_degree_mismatch_on_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig::for_testing(temp_dir.path().join("tree"));

        DirStore::<String>::open(config.clone(), 3).unwrap();
        let result = DirStore::<String>::open(config, 4);
        assert!(matches!(result, Err(BTreeError::Config(_))));
    }

    #[test]
    fn test_checksum_setting_recorded() {
        let temp_dir = TempDir::new().unwrap();
        let mut plain = StoreConfig::for_testing(temp_dir.path().join("tree"));
        plain.checksum = false;

        {
            let mut store: DirStore<String> = DirStore::open(plain.clone(), 3).unwrap();
            assert!(!store.superblock().checksum);
            store.persist(&sample_node(NodeId::ROOT)).unwrap();
        }

        let checked = StoreConfig::for_testing(temp_dir.path().join("tree"));
        let result = DirStore::<String>::open(checked, 3);
        assert!(matches!(result, Err(BTreeError::Config(msg)) if msg.contains("checksums off")));

        let store: DirStore<String> = DirStore::open(plain, 3).unwrap();
        assert_eq!(store.fetch(NodeId::ROOT).unwrap(), sample_node(NodeId::ROOT));
    }

    #[test]
    fn test_corrupted_record_detected() {
        let (mut store, _temp) = create_test_store(3);
        store.persist(&sample_node(NodeId::ROOT)).unwrap();

        let path = store.record_path(NodeId::ROOT);
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 6;
        bytes[last] ^= 0xFF;
        fs::write(&path, bytes).unwrap();

        match store.fetch(NodeId::ROOT) {
            Err(err @ StoreError::Corruption(_)) => {
                let msg = err.to_string();
                assert!(msg.starts_with("Data corruption: record #0: checksum mismatch"), "{}", msg);
                assert_eq!(msg.matches("corruption").count(), 1, "{}", msg);
            }
            other => panic!("expected corruption, got {:?}", other),
        }
    }

    #[test]
    fn test_contains_surfaces_io_errors() {
        let (store, temp) = create_test_store(3);

        // Replace the store directory with a plain file: lookups below it
        // now fail with ENOTDIR instead of reporting an absent record.
        let dir = temp.path().join("tree");
        fs::remove_dir_all(&dir).unwrap();
        fs::write(&dir, b"x").unwrap();

        assert!(matches!(
            store.contains(NodeId::ROOT),
            Err(StoreError::Io(_))
        ));
    }

    #[test]
    fn test_misplaced_record_detected() {
        let (mut store, _temp) = create_test_store(3);
        store.persist(&sample_node(NodeId::new(2))).unwrap();
        fs::rename(store.record_path(NodeId::new(2)), store.record_path(NodeId::new(3))).unwrap();

        assert!(matches!(
            store.fetch(NodeId::new(3)),
            Err(StoreError::Corruption(_))
        ));
    }

    #[test]
    fn test_bad_superblock() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("tree");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(SUPERBLOCK_FILE), b"not json").unwrap();

        let result = DirStore::<String>::open(StoreConfig::for_testing(&dir), 3);
        assert!(matches!(result, Err(BTreeError::Store(StoreError::Corruption(_)))));
    }

    #[test]
    fn test_path_is_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("plain");
        fs::write(&file, b"x").unwrap();

        let result = DirStore::<String>::open(StoreConfig::for_testing(&file), 3);
        assert!(matches!(result, Err(BTreeError::Config(_))));
    }

    #[test]
    fn test_synchronous_writes() {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig::new(temp_dir.path().join("tree"));
        let mut store: DirStore<u64> = DirStore::open(config, 2).unwrap();

        let mut node = Node::new_leaf(NodeId::ROOT);
        node.keys = vec![1, 2, 3];
        store.persist(&node).unwrap();
        assert_eq!(store.fetch(NodeId::ROOT).unwrap().keys, vec![1, 2, 3]);
        store.discard(NodeId::ROOT).unwrap();
    }
}
