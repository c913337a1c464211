//! Write path: appends, touched-span tracking, and rollup invalidation

use crate::codec;
use crate::error::{Result, TickError};
use crate::layout;
use crate::store::{RequestGuard, StoreShared};
use crate::storage::{Environment, WriteTx};
use crate::types::to_ticks;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// The min/max instants appended for one key within this writer
#[derive(Debug, Clone, Copy)]
struct TouchedSpan {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TouchedSpan {
    fn at(at: DateTime<Utc>) -> Self {
        Self { start: at, end: at }
    }

    fn extend(&mut self, at: DateTime<Utc>) {
        if at < self.start {
            self.start = at;
        }
        if at > self.end {
            self.end = at;
        }
    }
}

/// Write access to the series of one arity
///
/// A writer holds the write transaction for its whole lifetime: appends
/// become durable only on `commit`, and dropping an uncommitted writer
/// discards them. Writers are not meant to be shared across threads.
pub struct Writer {
    arity: u8,
    tx: WriteTx,
    shared: Arc<StoreShared>,
    val_buf: Vec<u8>,
    touched: HashMap<String, TouchedSpan>,
    _guard: RequestGuard,
}

impl Writer {
    pub(crate) fn new(
        arity: u8,
        env: &Arc<Environment>,
        shared: Arc<StoreShared>,
        guard: RequestGuard,
    ) -> Self {
        let tx = env.begin_write();
        Self {
            arity,
            tx,
            shared,
            val_buf: vec![0u8; codec::raw_width(arity as usize)],
            touched: HashMap::new(),
            _guard: guard,
        }
    }

    /// The series arity this writer was opened for
    pub fn arity(&self) -> u8 {
        self.arity
    }

    /// Append one sample for `key`, one value per axis
    pub fn append(&mut self, key: &str, at: DateTime<Utc>, values: &[f64]) -> Result<()> {
        if values.len() != self.arity as usize {
            return Err(TickError::InvalidArgument(format!(
                "expected {} values per point, got {}",
                self.arity,
                values.len()
            )));
        }

        codec::encode_values(values, &mut self.val_buf);
        let tree = self.tx.create_tree(&layout::series_tree(self.arity));
        tree.fixed(key.as_bytes(), codec::raw_width(self.arity as usize))
            .add(to_ticks(at), &self.val_buf)?;

        self.touched
            .entry(key.to_string())
            .and_modify(|span| span.extend(at))
            .or_insert_with(|| TouchedSpan::at(at));
        Ok(())
    }

    /// Raw point deletion is reserved
    pub fn delete(&mut self, _key: &str) -> Result<()> {
        Err(TickError::NotImplemented("delete"))
    }

    /// Range deletion is reserved
    pub fn delete_range(
        &mut self,
        _key: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<()> {
        Err(TickError::NotImplemented("delete_range"))
    }

    /// Invalidate every cached rollup bucket overlapping the touched spans,
    /// then commit the transaction
    pub fn commit(self) -> Result<()> {
        invalidate_rollups(&self.tx, self.arity, &self.touched)?;
        self.tx.commit()?;
        self.shared.record_write();
        Ok(())
    }
}

/// Delete the cached buckets of every period granularity whose window range
/// intersects a touched span
fn invalidate_rollups(
    tx: &WriteTx,
    arity: u8,
    touched: &HashMap<String, TouchedSpan>,
) -> Result<()> {
    if touched.is_empty() {
        return Ok(());
    }
    let Some(periods) = tx.tree(&layout::periods_tree(arity)) else {
        return Ok(());
    };

    let width = codec::bucket_width(arity as usize);
    for (key, span) in touched {
        for child in periods.fixed_names(&layout::rollup_prefix(key)) {
            let duration = layout::parse_rollup_child(&child).ok_or_else(|| {
                TickError::Storage(format!("unrecognized rollup tree name under key {key}"))
            })?;

            let lo = to_ticks(duration.start_of_range(span.start)?);
            let hi = to_ticks(duration.start_of_range(span.end)?);

            let fixed = periods.fixed(&child, width);
            let mut stale = Vec::new();
            let mut iter = fixed.iter();
            if iter.seek(lo) {
                while let Some((tick, _)) = iter.current() {
                    if tick > hi {
                        break;
                    }
                    stale.push(tick);
                    if !iter.move_next() {
                        break;
                    }
                }
            }

            // deleting after the scan keeps the cursor coherent
            let count = stale.len();
            for tick in stale {
                fixed.delete(tick);
            }
            if count > 0 {
                debug!("invalidated {} cached buckets under {}", count, key);
            }
        }
    }
    Ok(())
}
