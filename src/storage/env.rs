//! Transactional tree environment
//!
//! The committed state is a persistent snapshot behind an `Arc`. Read
//! transactions clone the `Arc`; write transactions take the single writer
//! lock, mutate a private working set, and publish a new snapshot on
//! commit. On-disk state is rebuilt by replaying the commit journal.

use super::journal::{self, JournalOp, JournalWriter};
use super::tx::{ReadTx, WriteTx};
use super::StoreConfig;
use crate::error::{Result, TickError};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Snapshot of every named tree
#[derive(Debug, Clone, Default)]
pub(crate) struct EnvState {
    pub trees: BTreeMap<String, Arc<TreeState>>,
}

/// One named tree: plain entries plus child fixed trees
#[derive(Debug, Clone, Default)]
pub(crate) struct TreeState {
    pub entries: BTreeMap<Vec<u8>, Vec<u8>>,
    pub fixed: BTreeMap<Vec<u8>, Arc<FixedTreeState>>,
}

/// An ordered map from i64 keys to fixed-width payloads
#[derive(Debug, Clone)]
pub(crate) struct FixedTreeState {
    pub value_width: usize,
    pub entries: BTreeMap<i64, Bytes>,
}

/// The transactional substrate
pub(crate) struct Environment {
    state: RwLock<Arc<EnvState>>,
    write_lock: Arc<Mutex<()>>,
    journal: Option<Mutex<JournalWriter>>,
}

impl Environment {
    /// Open the environment, replaying the journal unless running in memory
    pub fn open(config: &StoreConfig) -> Result<Arc<Self>> {
        if config.run_in_memory {
            debug!("opening in-memory environment");
            return Ok(Arc::new(Self {
                state: RwLock::new(Arc::new(EnvState::default())),
                write_lock: Arc::new(Mutex::new(())),
                journal: None,
            }));
        }

        std::fs::create_dir_all(&config.data_directory)?;
        let journal_path = config.journal_file();

        let batches = journal::replay(&journal_path)?;
        let mut state = EnvState::default();
        for batch in &batches {
            for op in batch {
                apply_op(&mut state, op)?;
            }
        }
        if !batches.is_empty() {
            info!(
                "recovered {} committed batches from {:?}",
                batches.len(),
                journal_path
            );
        }

        let writer = JournalWriter::open(&journal_path, config.sync_policy)?;
        Ok(Arc::new(Self {
            state: RwLock::new(Arc::new(state)),
            write_lock: Arc::new(Mutex::new(())),
            journal: Some(Mutex::new(writer)),
        }))
    }

    /// Begin a read transaction over the current snapshot
    pub fn begin_read(&self) -> ReadTx {
        ReadTx::new(self.state.read().clone())
    }

    /// Begin a write transaction, blocking until the prior writer finishes
    pub fn begin_write(self: &Arc<Self>) -> WriteTx {
        let guard = self.write_lock.lock_arc();
        let base = self.state.read().clone();
        WriteTx::new(self.clone(), guard, base)
    }

    /// Journal a committed batch and publish its snapshot
    pub(crate) fn publish(&self, ops: &[JournalOp], new_state: Arc<EnvState>) -> Result<()> {
        if let Some(journal) = &self.journal {
            journal.lock().append(ops)?;
        }
        *self.state.write() = new_state;
        Ok(())
    }

    /// Number of named trees in the current snapshot
    pub fn tree_count(&self) -> usize {
        self.state.read().trees.len()
    }
}

/// Apply one journaled mutation to a state under reconstruction
fn apply_op(state: &mut EnvState, op: &JournalOp) -> Result<()> {
    match op {
        JournalOp::CreateTree { tree } => {
            state.trees.entry(tree.clone()).or_default();
        }
        JournalOp::Put { tree, key, value } => {
            tree_mut(state, tree)?.entries.insert(key.clone(), value.clone());
        }
        JournalOp::Delete { tree, key } => {
            tree_mut(state, tree)?.entries.remove(key);
        }
        JournalOp::FixedAdd {
            tree,
            child,
            width,
            key,
            value,
        } => {
            let tree = tree_mut(state, tree)?;
            let fixed = tree.fixed.entry(child.clone()).or_insert_with(|| {
                Arc::new(FixedTreeState {
                    value_width: *width as usize,
                    entries: BTreeMap::new(),
                })
            });
            let fixed = Arc::make_mut(fixed);
            if fixed.value_width != *width as usize {
                return Err(TickError::Storage(format!(
                    "journal width {} conflicts with fixed tree width {}",
                    width, fixed.value_width
                )));
            }
            fixed.entries.insert(*key, Bytes::copy_from_slice(value));
        }
        JournalOp::FixedDelete { tree, child, key } => {
            if let Some(fixed) = tree_mut(state, tree)?.fixed.get_mut(child) {
                Arc::make_mut(fixed).entries.remove(key);
            }
        }
    }
    Ok(())
}

fn tree_mut<'a>(state: &'a mut EnvState, name: &str) -> Result<&'a mut TreeState> {
    state
        .trees
        .get_mut(name)
        .map(Arc::make_mut)
        .ok_or_else(|| TickError::Storage(format!("journal references unknown tree: {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_committed_writes_are_visible_to_new_readers() {
        let env = Environment::open(&StoreConfig::in_memory()).unwrap();

        let tx = env.begin_write();
        let tree = tx.create_tree("metrics");
        tree.put(b"answer", b"42");
        tx.commit().unwrap();

        let read = env.begin_read();
        let tree = read.tree("metrics").unwrap();
        assert_eq!(tree.get(b"answer"), Some(b"42".to_vec()));
    }

    #[test]
    fn test_open_readers_keep_their_snapshot() {
        let env = Environment::open(&StoreConfig::in_memory()).unwrap();

        let tx = env.begin_write();
        tx.create_tree("metrics").put(b"k", b"old");
        tx.commit().unwrap();

        let before = env.begin_read();

        let tx = env.begin_write();
        tx.create_tree("metrics").put(b"k", b"new");
        tx.commit().unwrap();

        assert_eq!(before.tree("metrics").unwrap().get(b"k"), Some(b"old".to_vec()));
        assert_eq!(
            env.begin_read().tree("metrics").unwrap().get(b"k"),
            Some(b"new".to_vec())
        );
    }

    #[test]
    fn test_dropped_transaction_discards_changes() {
        let env = Environment::open(&StoreConfig::in_memory()).unwrap();

        {
            let tx = env.begin_write();
            tx.create_tree("metrics").put(b"k", b"v");
            // dropped without commit
        }

        assert!(env.begin_read().tree("metrics").is_none());
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::at(dir.path());

        {
            let env = Environment::open(&config).unwrap();
            let tx = env.begin_write();
            let tree = tx.create_tree("series-1");
            let fixed = tree.fixed(b"aapl", 8);
            fixed.add(1000, &100.0f64.to_be_bytes()).unwrap();
            fixed.add(2000, &110.0f64.to_be_bytes()).unwrap();
            tx.commit().unwrap();
        }

        let env = Environment::open(&config).unwrap();
        let read = env.begin_read();
        let tree = read.tree("series-1").unwrap();
        let fixed = tree.fixed(b"aapl").unwrap();
        let mut iter = fixed.iter();
        assert!(iter.seek(0));
        assert_eq!(iter.current().map(|(k, _)| k), Some(1000));
        assert!(iter.move_next());
        assert_eq!(iter.current().map(|(k, _)| k), Some(2000));
        assert!(!iter.move_next());
    }

    #[test]
    fn test_deletes_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::at(dir.path());

        {
            let env = Environment::open(&config).unwrap();
            let tx = env.begin_write();
            let fixed = tx.create_tree("series-1").fixed(b"aapl", 8);
            fixed.add(1000, &1.0f64.to_be_bytes()).unwrap();
            tx.commit().unwrap();

            let tx = env.begin_write();
            let fixed = tx.create_tree("series-1").fixed(b"aapl", 8);
            fixed.delete(1000);
            tx.commit().unwrap();
        }

        let env = Environment::open(&config).unwrap();
        let read = env.begin_read();
        let fixed = read.tree("series-1").unwrap().fixed(b"aapl").unwrap();
        let mut iter = fixed.iter();
        assert!(!iter.seek(0));
    }
}
