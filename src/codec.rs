//! Fixed-slot binary codecs
//!
//! Every persisted payload is a row of 8-byte big-endian IEEE-754 doubles.
//! Raw samples store one slot per axis; rollup buckets store six slots per
//! axis in the order Volume, High, Low, Open, Close, Sum. The byte order is
//! fixed so data files are portable across platforms.

use crate::types::RangeValue;
use bytes::{Buf, BufMut};

/// Width of one encoded double
pub const SLOT_WIDTH: usize = 8;

/// Slots per axis in a rollup bucket
pub const BUCKET_SLOTS: usize = 6;

/// Payload width of one raw sample for the given arity
pub fn raw_width(arity: usize) -> usize {
    arity * SLOT_WIDTH
}

/// Payload width of one rollup bucket for the given arity
pub fn bucket_width(arity: usize) -> usize {
    arity * BUCKET_SLOTS * SLOT_WIDTH
}

/// Write a double into the slot at `index`
pub fn put_f64_at(buf: &mut [u8], index: usize, value: f64) {
    let offset = index * SLOT_WIDTH;
    (&mut buf[offset..offset + SLOT_WIDTH]).put_f64(value);
}

/// Read the double in the slot at `index`
pub fn get_f64_at(buf: &[u8], index: usize) -> f64 {
    let offset = index * SLOT_WIDTH;
    (&buf[offset..offset + SLOT_WIDTH]).get_f64()
}

/// Encode raw sample values into a caller-supplied buffer of `raw_width` bytes
pub fn encode_values(values: &[f64], buf: &mut [u8]) {
    for (i, value) in values.iter().enumerate() {
        put_f64_at(buf, i, *value);
    }
}

/// Decode raw sample values for the given arity
pub fn decode_values(buf: &[u8], arity: usize) -> Vec<f64> {
    (0..arity).map(|i| get_f64_at(buf, i)).collect()
}

/// Encode rollup aggregates into a caller-supplied buffer of `bucket_width` bytes
pub fn encode_bucket(values: &[RangeValue], buf: &mut [u8]) {
    for (axis, rv) in values.iter().enumerate() {
        let base = axis * BUCKET_SLOTS;
        put_f64_at(buf, base, rv.volume);
        put_f64_at(buf, base + 1, rv.high);
        put_f64_at(buf, base + 2, rv.low);
        put_f64_at(buf, base + 3, rv.open);
        put_f64_at(buf, base + 4, rv.close);
        put_f64_at(buf, base + 5, rv.sum);
    }
}

/// Decode rollup aggregates for the given arity
///
/// An axis with zero volume decodes to all-zero aggregates without touching
/// the remaining slots.
pub fn decode_bucket(buf: &[u8], arity: usize) -> Vec<RangeValue> {
    (0..arity)
        .map(|axis| {
            let base = axis * BUCKET_SLOTS;
            let mut rv = RangeValue {
                volume: get_f64_at(buf, base),
                ..RangeValue::default()
            };
            if rv.volume != 0.0 {
                rv.high = get_f64_at(buf, base + 1);
                rv.low = get_f64_at(buf, base + 2);
                rv.open = get_f64_at(buf, base + 3);
                rv.close = get_f64_at(buf, base + 4);
                rv.sum = get_f64_at(buf, base + 5);
            }
            rv
        })
        .collect()
}
