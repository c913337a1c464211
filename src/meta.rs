//! Server metadata: identifier and prefix configurations

use crate::error::{Result, TickError};
use crate::layout;
use crate::storage::{Environment, WriteTx};
use rand::Rng;
use std::sync::Arc;
use tracing::info;

/// Read the 16-byte server identifier, generating and persisting one on
/// first open. Once written it never changes for the life of the store.
pub(crate) fn ensure_server_id(tx: &WriteTx) -> Result<[u8; 16]> {
    let tree = tx.create_tree(layout::METADATA_TREE);
    if let Some(existing) = tree.get(layout::SERVER_ID_KEY) {
        return existing
            .as_slice()
            .try_into()
            .map_err(|_| TickError::Storage("malformed server id entry".into()));
    }

    let id: [u8; 16] = rand::thread_rng().gen();
    tree.put(layout::SERVER_ID_KEY, &id);
    info!("assigned new server id");
    Ok(id)
}

/// Register a prefix at the given arity
pub(crate) fn create_prefix_configuration(
    env: &Arc<Environment>,
    prefix: &str,
    arity: u8,
) -> Result<()> {
    layout::check_arity(arity)?;

    let tx = env.begin_write();
    let tree = tx.create_tree(layout::METADATA_TREE);
    let key = layout::prefix_config_key(prefix);
    if tree.get(&key).is_some() {
        return Err(TickError::AlreadyExists(format!(
            "prefix configuration: {prefix}"
        )));
    }
    tree.put(&key, &[arity]);
    tx.commit()?;

    info!("registered prefix {} at arity {}", prefix, arity);
    Ok(())
}

/// Remove a registered prefix, refusing while raw data exists under it
pub(crate) fn delete_prefix_configuration(env: &Arc<Environment>, prefix: &str) -> Result<()> {
    let tx = env.begin_write();
    let tree = tx.create_tree(layout::METADATA_TREE);
    let key = layout::prefix_config_key(prefix);

    let value = tree.get(&key).ok_or_else(|| {
        TickError::NotFound(format!("prefix configuration: {prefix}"))
    })?;
    let arity = value
        .first()
        .copied()
        .ok_or_else(|| TickError::Storage("malformed prefix configuration entry".into()))?;

    if let Some(series) = tx.tree(&layout::series_tree(arity)) {
        if !series.fixed_names(prefix.as_bytes()).is_empty() {
            return Err(TickError::HasData(format!("prefix {prefix}")));
        }
    }

    tree.delete(&key);
    tx.commit()?;

    info!("removed prefix {}", prefix);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoreConfig;

    fn env() -> Arc<Environment> {
        Environment::open(&StoreConfig::in_memory()).unwrap()
    }

    #[test]
    fn test_server_id_is_stable() {
        let env = env();

        let tx = env.begin_write();
        let first = ensure_server_id(&tx).unwrap();
        tx.commit().unwrap();

        let tx = env.begin_write();
        let second = ensure_server_id(&tx).unwrap();
        tx.commit().unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_duplicate_prefix_is_rejected() {
        let env = env();
        create_prefix_configuration(&env, "trades", 3).unwrap();

        let err = create_prefix_configuration(&env, "trades", 3).unwrap_err();
        assert!(matches!(err, TickError::AlreadyExists(_)));
    }

    #[test]
    fn test_delete_missing_prefix() {
        let env = env();
        let err = delete_prefix_configuration(&env, "ghost").unwrap_err();
        assert!(matches!(err, TickError::NotFound(_)));
    }

    #[test]
    fn test_delete_prefix_with_data_is_refused() {
        let env = env();
        create_prefix_configuration(&env, "trades", 1).unwrap();

        let tx = env.begin_write();
        let series = tx.create_tree(&layout::series_tree(1));
        series
            .fixed(b"trades/aapl", 8)
            .add(1000, &100.0f64.to_be_bytes())
            .unwrap();
        tx.commit().unwrap();

        let err = delete_prefix_configuration(&env, "trades").unwrap_err();
        assert!(matches!(err, TickError::HasData(_)));
    }

    #[test]
    fn test_delete_empty_prefix_succeeds() {
        let env = env();
        create_prefix_configuration(&env, "trades", 1).unwrap();
        delete_prefix_configuration(&env, "trades").unwrap();
        create_prefix_configuration(&env, "trades", 2).unwrap();
    }

    #[test]
    fn test_zero_arity_is_rejected() {
        let env = env();
        let err = create_prefix_configuration(&env, "trades", 0).unwrap_err();
        assert!(matches!(err, TickError::InvalidArgument(_)));
    }
}
