//! Commit journal
//!
//! Durability for the substrate: every committed write batch is appended to
//! a single journal file, framed with a length prefix and a CRC32 checksum,
//! and replayed on open. A torn or corrupt tail truncates recovery at the
//! last intact batch.

use crate::error::{Result, TickError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::warn;

/// One mutation inside a committed batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum JournalOp {
    /// Create a named tree
    CreateTree { tree: String },
    /// Put a plain key/value entry
    Put {
        tree: String,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    /// Delete a plain key/value entry
    Delete { tree: String, key: Vec<u8> },
    /// Add an entry to a child fixed tree, creating it at `width` if absent
    FixedAdd {
        tree: String,
        child: Vec<u8>,
        width: u32,
        key: i64,
        value: Vec<u8>,
    },
    /// Delete an entry from a child fixed tree
    FixedDelete {
        tree: String,
        child: Vec<u8>,
        key: i64,
    },
}

/// Fsync policy applied after each journal append
#[derive(Debug, Clone, Copy)]
pub enum SyncPolicy {
    /// Sync after every commit (safest, slowest)
    Immediate,
    /// Sync after N commits
    EveryN(usize),
    /// Never sync (OS decides, fastest, least safe)
    Never,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        SyncPolicy::Immediate
    }
}

/// Appends committed batches to the journal file
pub(crate) struct JournalWriter {
    file: BufWriter<File>,
    policy: SyncPolicy,
    writes_since_sync: usize,
}

impl JournalWriter {
    /// Open the journal for appending, creating it if absent
    pub fn open(path: &Path, policy: SyncPolicy) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: BufWriter::new(file),
            policy,
            writes_since_sync: 0,
        })
    }

    /// Append one committed batch
    pub fn append(&mut self, ops: &[JournalOp]) -> Result<()> {
        let frame = encode_batch(ops)?;
        self.file.write_all(&frame)?;
        self.file.flush()?;
        self.writes_since_sync += 1;

        let should_sync = match self.policy {
            SyncPolicy::Immediate => true,
            SyncPolicy::EveryN(n) => self.writes_since_sync >= n,
            SyncPolicy::Never => false,
        };
        if should_sync {
            self.file.get_ref().sync_all()?;
            self.writes_since_sync = 0;
        }
        Ok(())
    }
}

/// Serialize a batch with length prefix and CRC32 checksum
///
/// Format:
/// - 4 bytes: frame length (excluding this field)
/// - N bytes: bincode-encoded ops
/// - 4 bytes: CRC32 of the ops bytes
fn encode_batch(ops: &[JournalOp]) -> Result<Bytes> {
    let payload = bincode::serialize(ops).map_err(|e| TickError::Storage(e.to_string()))?;
    let mut buf = BytesMut::with_capacity(payload.len() + 8);
    buf.put_u32_le((payload.len() + 4) as u32);
    buf.put_slice(&payload);
    buf.put_u32_le(crc32fast::hash(&payload));
    Ok(buf.freeze())
}

/// Decode one batch, returning `None` for an incomplete tail
fn decode_batch(data: &[u8]) -> Result<Option<(Vec<JournalOp>, usize)>> {
    if data.len() < 4 {
        return Ok(None);
    }
    let len = (&data[..4]).get_u32_le() as usize;
    if len < 4 {
        return Err(TickError::Storage("invalid journal frame length".into()));
    }
    if data.len() < 4 + len {
        return Ok(None);
    }

    let body = &data[4..4 + len];
    let (payload, crc) = body.split_at(len - 4);
    let expected = (&crc[..]).get_u32_le();
    let actual = crc32fast::hash(payload);
    if expected != actual {
        return Err(TickError::ChecksumMismatch { expected, actual });
    }

    let ops = bincode::deserialize(payload).map_err(|e| TickError::Storage(e.to_string()))?;
    Ok(Some((ops, 4 + len)))
}

/// Replay every intact batch from the journal file
pub(crate) fn replay(path: &Path) -> Result<Vec<Vec<JournalOp>>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let data = std::fs::read(path)?;

    let mut batches = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        match decode_batch(&data[offset..]) {
            Ok(Some((ops, consumed))) => {
                batches.push(ops);
                offset += consumed;
            }
            Ok(None) => {
                warn!("incomplete batch at offset {} in {:?}, truncating", offset, path);
                break;
            }
            Err(TickError::ChecksumMismatch { .. }) => {
                warn!("checksum mismatch at offset {} in {:?}, truncating", offset, path);
                break;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(batches)
}
