//! Transactional storage substrate
//!
//! Named trees holding plain key/value entries plus fixed trees: ordered
//! maps from `i64` tick keys to fixed-width payloads. Committed state is an
//! immutable snapshot; read transactions clone it and never block, write
//! transactions serialize on a single lock and publish a new snapshot on
//! commit. Every committed batch is journaled for durability.

mod env;
mod journal;
mod tx;

pub(crate) use env::Environment;
pub use journal::SyncPolicy;
pub(crate) use tx::{FixedIter, ReadFixed, ReadTree, ReadTx, WriteFixed, WriteTree, WriteTx};

use crate::error::{Result, TickError};
use std::collections::HashMap;
use std::path::PathBuf;

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Keep everything in memory, bypassing the journal
    pub run_in_memory: bool,
    /// Data directory
    pub data_directory: PathBuf,
    /// Scratch space for the substrate
    pub temp_path: Option<PathBuf>,
    /// Directory for the commit journal; defaults to the data directory
    pub journal_path: Option<PathBuf>,
    /// Whether journal files may be snapshotted incrementally
    pub allow_incremental_backups: bool,
    /// Fsync policy applied after each journal append
    pub sync_policy: SyncPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            run_in_memory: false,
            data_directory: PathBuf::from("data"),
            temp_path: None,
            journal_path: None,
            allow_incremental_backups: false,
            sync_policy: SyncPolicy::default(),
        }
    }
}

impl StoreConfig {
    /// Configuration for a store rooted at the given directory
    pub fn at(data_directory: impl Into<PathBuf>) -> Self {
        Self {
            data_directory: data_directory.into(),
            ..Self::default()
        }
    }

    /// Configuration for a purely in-memory store
    pub fn in_memory() -> Self {
        Self {
            run_in_memory: true,
            ..Self::default()
        }
    }

    /// Build a configuration from externally supplied string options
    ///
    /// Recognized keys: `RunInMemory`, `DataDirectory`, `TempPath`,
    /// `JournalPath`, `AllowIncrementalBackups`.
    pub fn from_options(options: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::default();
        for (key, value) in options {
            match key.as_str() {
                "RunInMemory" => config.run_in_memory = parse_bool(key, value)?,
                "DataDirectory" => config.data_directory = PathBuf::from(value),
                "TempPath" => config.temp_path = Some(PathBuf::from(value)),
                "JournalPath" => config.journal_path = Some(PathBuf::from(value)),
                "AllowIncrementalBackups" => {
                    config.allow_incremental_backups = parse_bool(key, value)?
                }
                other => {
                    return Err(TickError::Config(format!("unknown option: {other}")));
                }
            }
        }
        Ok(config)
    }

    /// Path of the commit journal file
    pub(crate) fn journal_file(&self) -> PathBuf {
        self.journal_path
            .clone()
            .unwrap_or_else(|| self.data_directory.clone())
            .join("tickstore.journal")
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    value
        .to_ascii_lowercase()
        .parse::<bool>()
        .map_err(|_| TickError::Config(format!("could not understand {key} setting: {value}")))
}
