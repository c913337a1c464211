//! On-disk tree layout
//!
//! One raw tree and one rollup tree per arity, plus the metadata tree and
//! the reserved bootstrap tree. Within the rollup tree, child fixed trees
//! are filed under `<key><SEP><PeriodType>-<duration>`.

use crate::error::{Result, TickError};
use crate::period::PeriodDuration;

/// Reserved bootstrap tree, created on open and never read by the engine
pub const DATA_TREE: &str = "data";

/// Metadata tree: server id and prefix configurations
pub const METADATA_TREE: &str = "$metadata";

/// Metadata key of the 16-byte server identifier
pub const SERVER_ID_KEY: &[u8] = b"id";

/// Separator between a series key and the period suffix in rollup tree
/// names. A private-use code point, guaranteed never to appear in caller
/// keys.
pub const KEY_SEPARATOR: char = '\u{f8ff}';

/// Name of the raw data tree for the given arity
pub fn series_tree(arity: u8) -> String {
    format!("series-{arity}")
}

/// Name of the rollup data tree for the given arity
pub fn periods_tree(arity: u8) -> String {
    format!("periods-{arity}")
}

/// Child tree name for the rollup cache of (key, period)
pub fn rollup_child(key: &str, period: &PeriodDuration) -> Vec<u8> {
    format!("{key}{KEY_SEPARATOR}{}", period.suffix()).into_bytes()
}

/// Child-name prefix shared by every rollup cache of the given key
pub fn rollup_prefix(key: &str) -> Vec<u8> {
    format!("{key}{KEY_SEPARATOR}").into_bytes()
}

/// Recover the period from a rollup child tree name: the suffix after the
/// last separator
pub fn parse_rollup_child(name: &[u8]) -> Option<PeriodDuration> {
    let name = std::str::from_utf8(name).ok()?;
    let sep = name.rfind(KEY_SEPARATOR)?;
    PeriodDuration::from_suffix(&name[sep + KEY_SEPARATOR.len_utf8()..])
}

/// Metadata key of a registered prefix configuration
pub fn prefix_config_key(prefix: &str) -> Vec<u8> {
    format!("prefixes-{prefix}").into_bytes()
}

/// Reject arities outside the supported 1..=255 domain
pub fn check_arity(arity: u8) -> Result<()> {
    if arity == 0 {
        return Err(TickError::InvalidArgument(
            "series arity must be between 1 and 255".into(),
        ));
    }
    Ok(())
}
