//! Read path: raw point iteration and rollup queries with on-demand fill

use crate::codec;
use crate::error::{Result, TickError};
use crate::layout;
use crate::period::PeriodDuration;
use crate::store::RequestGuard;
use crate::storage::{Environment, FixedIter, ReadTx, WriteFixed, WriteTx};
use crate::types::{
    from_ticks, to_ticks, CancelToken, Point, Range, TimeSeriesQuery, TimeSeriesRollupQuery,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Read access to the series of one arity
///
/// A reader holds a snapshot read transaction for its whole lifetime;
/// dropping the reader releases it.
pub struct Reader {
    arity: u8,
    tx: ReadTx,
    env: Arc<Environment>,
    _guard: RequestGuard,
}

impl Reader {
    pub(crate) fn new(arity: u8, env: Arc<Environment>, guard: RequestGuard) -> Self {
        let tx = env.begin_read();
        Self {
            arity,
            tx,
            env,
            _guard: guard,
        }
    }

    /// The series arity this reader was opened for
    pub fn arity(&self) -> u8 {
        self.arity
    }

    /// Stream the raw points of `key` with `start <= at <= end`
    ///
    /// The sequence is lazy, finite, and single-pass. An absent series
    /// yields nothing.
    pub fn query_raw(&self, query: TimeSeriesQuery, cancel: CancelToken) -> RawQuery {
        let start_ticks = to_ticks(query.start);
        let iter = self
            .tx
            .tree(&layout::series_tree(self.arity))
            .and_then(|tree| tree.fixed(query.key.as_bytes()))
            .map(|fixed| fixed.iter())
            .and_then(|mut iter| iter.seek(start_ticks).then_some(iter));

        RawQuery {
            iter,
            end_ticks: to_ticks(query.end),
            arity: self.arity as usize,
            cancel,
            done: false,
        }
    }

    /// Stream rollup buckets of `key` over `[start, end)` at the requested
    /// granularity
    ///
    /// Cached buckets are served from the rollup tree; missing buckets are
    /// computed from the raw samples, written back, and then served. The
    /// write-back transaction commits when the sequence completes and is
    /// discarded when the sequence is dropped early.
    pub fn query_rollup(
        &self,
        query: TimeSeriesRollupQuery,
        cancel: CancelToken,
    ) -> Result<RollupQuery> {
        query.duration.validate_aligned(query.start, query.end)?;

        let Some(raw_tree) = self.tx.tree(&layout::series_tree(self.arity)) else {
            return Ok(RollupQuery::exhausted(query, self.arity as usize, cancel));
        };
        let raw = raw_tree.fixed(query.key.as_bytes()).map(|fixed| fixed.iter());

        let tx = self.env.begin_write();
        let periods = tx.create_tree(&layout::periods_tree(self.arity));
        let cache = periods.fixed(
            &layout::rollup_child(&query.key, &query.duration),
            codec::bucket_width(self.arity as usize),
        );
        let cache_iter = cache.iter();

        Ok(RollupQuery {
            tx: Some(tx),
            cache: Some(cache),
            cache_iter: Some(cache_iter),
            raw,
            arity: self.arity as usize,
            duration: query.duration,
            end: query.end,
            current: query.start,
            cancel,
            done: false,
        })
    }
}

/// Lazy sequence of raw points
pub struct RawQuery {
    iter: Option<FixedIter>,
    end_ticks: i64,
    arity: usize,
    cancel: CancelToken,
    done: bool,
}

impl Iterator for RawQuery {
    type Item = Result<Point>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.cancel.is_cancelled() {
            self.done = true;
            return Some(Err(TickError::Cancelled));
        }

        let iter = self.iter.as_mut()?;
        let Some((key, value)) = iter.current() else {
            self.done = true;
            return None;
        };
        if key > self.end_ticks {
            self.done = true;
            return None;
        }

        let Some(at) = from_ticks(key) else {
            self.done = true;
            return Some(Err(TickError::Storage(format!(
                "tick {key} is outside the calendar range"
            ))));
        };
        let point = Point::new(at, codec::decode_values(&value, self.arity));
        iter.move_next();
        Some(Ok(point))
    }
}

/// Lazy sequence of rollup buckets
pub struct RollupQuery {
    tx: Option<WriteTx>,
    cache: Option<WriteFixed>,
    cache_iter: Option<FixedIter>,
    raw: Option<FixedIter>,
    arity: usize,
    duration: PeriodDuration,
    end: DateTime<Utc>,
    current: DateTime<Utc>,
    cancel: CancelToken,
    done: bool,
}

impl RollupQuery {
    /// A query over an absent series: yields nothing, writes nothing
    fn exhausted(query: TimeSeriesRollupQuery, arity: usize, cancel: CancelToken) -> Self {
        Self {
            tx: None,
            cache: None,
            cache_iter: None,
            raw: None,
            arity,
            duration: query.duration,
            end: query.end,
            current: query.start,
            cancel,
            done: true,
        }
    }

    fn next_window(&mut self) -> Result<Range> {
        let start = self.current;
        let next = self.duration.add(start)?;
        let start_ticks = to_ticks(start);

        // cached bucket, if the cursor lands exactly on the window start
        if let Some(iter) = self.cache_iter.as_mut() {
            if iter.seek(start_ticks) {
                if let Some((key, value)) = iter.current() {
                    if key == start_ticks {
                        let mut range = Range::new(start, self.duration, self.arity);
                        range.values = codec::decode_bucket(&value, self.arity);
                        self.current = next;
                        return Ok(range);
                    }
                }
            }
        }

        // aggregate the raw samples of the window
        let mut range = Range::new(start, self.duration, self.arity);
        let end_ticks = to_ticks(next);
        if let Some(raw) = self.raw.as_mut() {
            if raw.seek(start_ticks) {
                while let Some((key, value)) = raw.current() {
                    if key >= end_ticks {
                        break;
                    }
                    for axis in 0..self.arity {
                        range.values[axis].observe(codec::get_f64_at(&value, axis));
                    }
                    if !raw.move_next() {
                        break;
                    }
                }
            }
        }

        // write back, empty windows included
        if let Some(cache) = self.cache.as_ref() {
            let mut buf = vec![0u8; codec::bucket_width(self.arity)];
            codec::encode_bucket(&range.values, &mut buf);
            cache.add(start_ticks, &buf)?;
        }

        self.current = next;
        Ok(range)
    }
}

impl Iterator for RollupQuery {
    type Item = Result<Range>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.cancel.is_cancelled() {
            self.done = true;
            return Some(Err(TickError::Cancelled));
        }

        if self.current == self.end {
            self.done = true;
            if let Some(tx) = self.tx.take() {
                if let Err(e) = tx.commit() {
                    return Some(Err(e));
                }
            }
            return None;
        }
        if self.current > self.end {
            self.done = true;
            return Some(Err(TickError::MisalignedRange(format!(
                "window starting at {} oversteps the query end {}",
                self.current, self.end
            ))));
        }

        let result = self.next_window();
        if result.is_err() {
            self.done = true;
        }
        Some(result)
    }
}
