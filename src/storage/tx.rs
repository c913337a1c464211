//! Transactions, tree handles, and iterators

use super::env::{EnvState, Environment, FixedTreeState, TreeState};
use super::journal::JournalOp;
use crate::error::{Result, TickError};
use bytes::Bytes;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A snapshot read transaction
pub(crate) struct ReadTx {
    state: Arc<EnvState>,
}

impl ReadTx {
    pub(crate) fn new(state: Arc<EnvState>) -> Self {
        Self { state }
    }

    /// Look up a named tree in the snapshot
    pub fn tree(&self, name: &str) -> Option<ReadTree> {
        self.state
            .trees
            .get(name)
            .map(|tree| ReadTree { state: tree.clone() })
    }
}

/// Read handle to one named tree
pub(crate) struct ReadTree {
    state: Arc<TreeState>,
}

impl ReadTree {
    /// Read a plain entry
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.state.entries.get(key).cloned()
    }

    /// Look up a child fixed tree
    pub fn fixed(&self, child: &[u8]) -> Option<ReadFixed> {
        self.state
            .fixed
            .get(child)
            .map(|fixed| ReadFixed { state: fixed.clone() })
    }

    /// Names of child fixed trees sharing the given prefix
    pub fn fixed_names(&self, prefix: &[u8]) -> Vec<Vec<u8>> {
        self.state
            .fixed
            .range(prefix.to_vec()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Read handle to one child fixed tree
pub(crate) struct ReadFixed {
    state: Arc<FixedTreeState>,
}

impl ReadFixed {
    /// Iterate the tree in ascending key order
    pub fn iter(&self) -> FixedIter {
        FixedIter::from_entries(&self.state.entries)
    }
}

/// Working set of an open write transaction
struct TxInner {
    base: Arc<EnvState>,
    trees: BTreeMap<String, TxTree>,
    ops: Vec<JournalOp>,
}

#[derive(Default)]
struct TxTree {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
    fixed: BTreeMap<Vec<u8>, TxFixed>,
}

impl TxTree {
    fn from_state(state: &TreeState) -> Self {
        Self {
            entries: state.entries.clone(),
            fixed: state
                .fixed
                .iter()
                .map(|(name, fixed)| (name.clone(), TxFixed::Clean(fixed.clone())))
                .collect(),
        }
    }

    fn to_state(&self) -> TreeState {
        TreeState {
            entries: self.entries.clone(),
            fixed: self
                .fixed
                .iter()
                .map(|(name, fixed)| {
                    let state = match fixed {
                        TxFixed::Clean(arc) => arc.clone(),
                        TxFixed::Dirty(state) => Arc::new(state.clone()),
                    };
                    (name.clone(), state)
                })
                .collect(),
        }
    }
}

/// A child fixed tree inside the working set: untouched trees keep sharing
/// the committed snapshot, touched trees get a private copy
enum TxFixed {
    Clean(Arc<FixedTreeState>),
    Dirty(FixedTreeState),
}

impl TxFixed {
    fn width(&self) -> usize {
        match self {
            TxFixed::Clean(state) => state.value_width,
            TxFixed::Dirty(state) => state.value_width,
        }
    }

    fn make_dirty(&mut self) -> &mut FixedTreeState {
        if let TxFixed::Clean(arc) = self {
            *self = TxFixed::Dirty((**arc).clone());
        }
        match self {
            TxFixed::Dirty(state) => state,
            TxFixed::Clean(_) => unreachable!(),
        }
    }
}

impl TxInner {
    fn tree_exists(&self, name: &str) -> bool {
        self.trees.contains_key(name) || self.base.trees.contains_key(name)
    }

    fn materialize(&mut self, name: &str) -> &mut TxTree {
        let base = self.base.clone();
        self.trees.entry(name.to_string()).or_insert_with(|| {
            base.trees
                .get(name)
                .map(|state| TxTree::from_state(state))
                .unwrap_or_default()
        })
    }
}

/// The single open write transaction
///
/// Dropping an uncommitted transaction releases the writer lock and
/// discards the working set.
pub(crate) struct WriteTx {
    env: Arc<Environment>,
    inner: Arc<Mutex<TxInner>>,
    _guard: ArcMutexGuard<RawMutex, ()>,
}

impl WriteTx {
    pub(crate) fn new(
        env: Arc<Environment>,
        guard: ArcMutexGuard<RawMutex, ()>,
        base: Arc<EnvState>,
    ) -> Self {
        Self {
            env,
            inner: Arc::new(Mutex::new(TxInner {
                base,
                trees: BTreeMap::new(),
                ops: Vec::new(),
            })),
            _guard: guard,
        }
    }

    /// Look up a named tree, observing trees created inside this transaction
    pub fn tree(&self, name: &str) -> Option<WriteTree> {
        let exists = self.inner.lock().tree_exists(name);
        exists.then(|| WriteTree {
            inner: self.inner.clone(),
            name: name.to_string(),
        })
    }

    /// Create a named tree; a no-op when it already exists
    pub fn create_tree(&self, name: &str) -> WriteTree {
        {
            let mut inner = self.inner.lock();
            if !inner.tree_exists(name) {
                inner.ops.push(JournalOp::CreateTree {
                    tree: name.to_string(),
                });
            }
            inner.materialize(name);
        }
        WriteTree {
            inner: self.inner.clone(),
            name: name.to_string(),
        }
    }

    /// Journal the batch and publish the new snapshot
    pub fn commit(self) -> Result<()> {
        let (ops, new_state) = {
            let mut inner = self.inner.lock();
            let ops = std::mem::take(&mut inner.ops);
            if ops.is_empty() {
                return Ok(());
            }
            let mut trees = inner.base.trees.clone();
            for (name, tx_tree) in &inner.trees {
                trees.insert(name.clone(), Arc::new(tx_tree.to_state()));
            }
            (ops, Arc::new(EnvState { trees }))
        };
        self.env.publish(&ops, new_state)
    }
}

/// Write handle to one named tree
pub(crate) struct WriteTree {
    inner: Arc<Mutex<TxInner>>,
    name: String,
}

impl WriteTree {
    /// Read a plain entry, observing uncommitted writes
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock();
        inner.materialize(&self.name).entries.get(key).cloned()
    }

    /// Put a plain entry
    pub fn put(&self, key: &[u8], value: &[u8]) {
        let mut inner = self.inner.lock();
        inner
            .materialize(&self.name)
            .entries
            .insert(key.to_vec(), value.to_vec());
        inner.ops.push(JournalOp::Put {
            tree: self.name.clone(),
            key: key.to_vec(),
            value: value.to_vec(),
        });
    }

    /// Delete a plain entry
    pub fn delete(&self, key: &[u8]) {
        let mut inner = self.inner.lock();
        inner.materialize(&self.name).entries.remove(key);
        inner.ops.push(JournalOp::Delete {
            tree: self.name.clone(),
            key: key.to_vec(),
        });
    }

    /// Handle to the child fixed tree of the given name and payload width
    ///
    /// The tree itself is created lazily on the first `add`.
    pub fn fixed(&self, child: &[u8], value_width: usize) -> WriteFixed {
        WriteFixed {
            inner: self.inner.clone(),
            tree: self.name.clone(),
            child: child.to_vec(),
            width: value_width,
        }
    }

    /// Names of child fixed trees sharing the given prefix, observing
    /// uncommitted creations
    pub fn fixed_names(&self, prefix: &[u8]) -> Vec<Vec<u8>> {
        let mut inner = self.inner.lock();
        inner
            .materialize(&self.name)
            .fixed
            .range(prefix.to_vec()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Write handle to one child fixed tree
pub(crate) struct WriteFixed {
    inner: Arc<Mutex<TxInner>>,
    tree: String,
    child: Vec<u8>,
    width: usize,
}

impl WriteFixed {
    /// Add or replace an entry; creates the tree on first use
    pub fn add(&self, key: i64, value: &[u8]) -> Result<()> {
        if value.len() != self.width {
            return Err(TickError::Storage(format!(
                "payload of {} bytes does not match fixed tree width {}",
                value.len(),
                self.width
            )));
        }
        let mut inner = self.inner.lock();
        {
            let tree = inner.materialize(&self.tree);
            let fixed = tree.fixed.entry(self.child.clone()).or_insert_with(|| {
                TxFixed::Dirty(FixedTreeState {
                    value_width: self.width,
                    entries: BTreeMap::new(),
                })
            });
            if fixed.width() != self.width {
                return Err(TickError::Storage(format!(
                    "fixed tree has width {}, caller expected {}",
                    fixed.width(),
                    self.width
                )));
            }
            fixed.make_dirty().entries.insert(key, Bytes::copy_from_slice(value));
        }
        inner.ops.push(JournalOp::FixedAdd {
            tree: self.tree.clone(),
            child: self.child.clone(),
            width: self.width as u32,
            key,
            value: value.to_vec(),
        });
        Ok(())
    }

    /// Delete an entry; a no-op when absent
    pub fn delete(&self, key: i64) {
        let mut inner = self.inner.lock();
        {
            let tree = inner.materialize(&self.tree);
            if let Some(fixed) = tree.fixed.get_mut(&self.child) {
                fixed.make_dirty().entries.remove(&key);
            }
        }
        inner.ops.push(JournalOp::FixedDelete {
            tree: self.tree.clone(),
            child: self.child.clone(),
            key,
        });
    }

    /// Iterate the tree in ascending key order, observing uncommitted writes
    /// made before this call
    pub fn iter(&self) -> FixedIter {
        let mut inner = self.inner.lock();
        let tree = inner.materialize(&self.tree);
        match tree.fixed.get(&self.child) {
            Some(TxFixed::Clean(state)) => FixedIter::from_entries(&state.entries),
            Some(TxFixed::Dirty(state)) => FixedIter::from_entries(&state.entries),
            None => FixedIter::empty(),
        }
    }
}

/// Cursor over one fixed tree, captured at creation
pub(crate) struct FixedIter {
    entries: Vec<(i64, Bytes)>,
    pos: usize,
}

impl FixedIter {
    fn from_entries(entries: &BTreeMap<i64, Bytes>) -> Self {
        Self {
            entries: entries.iter().map(|(k, v)| (*k, v.clone())).collect(),
            pos: 0,
        }
    }

    fn empty() -> Self {
        Self {
            entries: Vec::new(),
            pos: 0,
        }
    }

    /// Position on the first entry with key >= `key`; false when exhausted
    pub fn seek(&mut self, key: i64) -> bool {
        self.pos = self.entries.partition_point(|(k, _)| *k < key);
        self.pos < self.entries.len()
    }

    /// The entry under the cursor
    pub fn current(&self) -> Option<(i64, Bytes)> {
        self.entries.get(self.pos).map(|(k, v)| (*k, v.clone()))
    }

    /// Advance the cursor; false when exhausted
    pub fn move_next(&mut self) -> bool {
        if self.pos < self.entries.len() {
            self.pos += 1;
        }
        self.pos < self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoreConfig;

    fn env() -> Arc<Environment> {
        Environment::open(&StoreConfig::in_memory()).unwrap()
    }

    #[test]
    fn test_fixed_iter_seek_semantics() {
        let env = env();
        let tx = env.begin_write();
        let fixed = tx.create_tree("t").fixed(b"k", 8);
        for key in [10i64, 20, 30] {
            fixed.add(key, &(key as f64).to_be_bytes()).unwrap();
        }

        let mut iter = fixed.iter();
        assert!(iter.seek(15));
        assert_eq!(iter.current().map(|(k, _)| k), Some(20));
        assert!(iter.move_next());
        assert_eq!(iter.current().map(|(k, _)| k), Some(30));
        assert!(!iter.move_next());
        assert_eq!(iter.current(), None);

        assert!(iter.seek(10));
        assert_eq!(iter.current().map(|(k, _)| k), Some(10));
        assert!(!iter.seek(31));
    }

    #[test]
    fn test_write_tx_observes_own_writes() {
        let env = env();
        let tx = env.begin_write();
        let tree = tx.create_tree("t");
        tree.put(b"k", b"v");
        assert_eq!(tree.get(b"k"), Some(b"v".to_vec()));

        let fixed = tree.fixed(b"series", 8);
        fixed.add(5, &1.0f64.to_be_bytes()).unwrap();
        let mut iter = fixed.iter();
        assert!(iter.seek(0));
        assert_eq!(iter.current().map(|(k, _)| k), Some(5));
    }

    #[test]
    fn test_width_mismatch_is_rejected() {
        let env = env();
        let tx = env.begin_write();
        let tree = tx.create_tree("t");
        tree.fixed(b"k", 8).add(1, &1.0f64.to_be_bytes()).unwrap();

        let wrong = tree.fixed(b"k", 16);
        let err = wrong.add(2, &[0u8; 16]).unwrap_err();
        assert!(matches!(err, TickError::Storage(_)));

        let short = tree.fixed(b"k", 8);
        assert!(short.add(3, &[0u8; 4]).is_err());
    }

    #[test]
    fn test_fixed_names_prefix_bound() {
        let env = env();
        let tx = env.begin_write();
        let tree = tx.create_tree("t");
        tree.fixed(b"aapl|a", 8).add(1, &[0u8; 8]).unwrap();
        tree.fixed(b"aapl|b", 8).add(1, &[0u8; 8]).unwrap();
        tree.fixed(b"goog|a", 8).add(1, &[0u8; 8]).unwrap();

        let names = tree.fixed_names(b"aapl|");
        assert_eq!(names, vec![b"aapl|a".to_vec(), b"aapl|b".to_vec()]);
        assert!(tree.fixed_names(b"msft|").is_empty());
    }

    #[test]
    fn test_create_tree_is_idempotent() {
        let env = env();
        let tx = env.begin_write();
        tx.create_tree("t").put(b"k", b"v");
        tx.create_tree("t");
        tx.commit().unwrap();

        let read = env.begin_read();
        assert_eq!(read.tree("t").unwrap().get(b"k"), Some(b"v".to_vec()));
    }

    #[test]
    fn test_empty_commit_is_a_no_op() {
        let env = env();
        let tx = env.begin_write();
        tx.commit().unwrap();
        assert!(env.begin_read().tree("t").is_none());
    }
}
