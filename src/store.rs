//! Store lifecycle: open, reader/writer factories, drain, close

use crate::error::{Result, TickError};
use crate::layout;
use crate::meta;
use crate::reader::Reader;
use crate::storage::{Environment, StoreConfig};
use crate::types::{Clock, SystemClock};
use crate::writer::Writer;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// State shared between the store and its live readers and writers
pub(crate) struct StoreShared {
    concurrent_requests: AtomicUsize,
    closed: AtomicBool,
    clock: Arc<dyn Clock>,
    last_write: RwLock<Option<DateTime<Utc>>>,
}

impl StoreShared {
    pub(crate) fn record_write(&self) {
        *self.last_write.write() = Some(self.clock.now());
    }
}

/// Keeps the in-flight request count honest for the drain on close
pub(crate) struct RequestGuard {
    shared: Arc<StoreShared>,
}

impl RequestGuard {
    fn acquire(shared: &Arc<StoreShared>) -> Result<Self> {
        if shared.closed.load(Ordering::SeqCst) {
            return Err(TickError::Lifecycle("the store has been closed".into()));
        }
        shared.concurrent_requests.fetch_add(1, Ordering::SeqCst);
        Ok(Self {
            shared: shared.clone(),
        })
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.shared.concurrent_requests.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A durable, transactional time-series store with cached rollups
pub struct TickStore {
    env: Arc<Environment>,
    shared: Arc<StoreShared>,
    server_id: [u8; 16],
}

impl TickStore {
    /// Open the store, bootstrapping metadata on first use
    pub fn open(config: StoreConfig) -> Result<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    /// Open with an injected clock so tests can pin the last-write instant
    pub fn open_with_clock(config: StoreConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let env = Environment::open(&config)?;

        let tx = env.begin_write();
        tx.create_tree(layout::DATA_TREE);
        let server_id = meta::ensure_server_id(&tx)?;
        tx.commit()?;

        info!("opened time-series store with {} trees", env.tree_count());
        Ok(Self {
            env,
            shared: Arc::new(StoreShared {
                concurrent_requests: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                clock,
                last_write: RwLock::new(None),
            }),
            server_id,
        })
    }

    /// The identifier assigned to this store on first open
    pub fn server_id(&self) -> [u8; 16] {
        self.server_id
    }

    /// Instant of the most recent committed write, if any
    pub fn last_write(&self) -> Option<DateTime<Utc>> {
        *self.shared.last_write.read()
    }

    /// Open a reader over the series of the given arity
    pub fn reader(&self, arity: u8) -> Result<Reader> {
        layout::check_arity(arity)?;
        let guard = RequestGuard::acquire(&self.shared)?;
        Ok(Reader::new(arity, self.env.clone(), guard))
    }

    /// Open a writer for the series of the given arity
    ///
    /// Blocks until the prior writer commits or is dropped.
    pub fn writer(&self, arity: u8) -> Result<Writer> {
        layout::check_arity(arity)?;
        let guard = RequestGuard::acquire(&self.shared)?;
        Ok(Writer::new(arity, &self.env, self.shared.clone(), guard))
    }

    /// Register a prefix at the given arity
    pub fn create_prefix_configuration(&self, prefix: &str, arity: u8) -> Result<()> {
        let _guard = RequestGuard::acquire(&self.shared)?;
        meta::create_prefix_configuration(&self.env, prefix, arity)
    }

    /// Remove a registered prefix; fails while raw data exists under it
    pub fn delete_prefix_configuration(&self, prefix: &str) -> Result<()> {
        let _guard = RequestGuard::acquire(&self.shared)?;
        meta::delete_prefix_configuration(&self.env, prefix)
    }

    /// Reading a prefix configuration back is reserved
    pub fn prefix_configuration(&self, _prefix: &str) -> Result<u8> {
        Err(TickError::NotImplemented("prefix_configuration"))
    }

    /// Counting stored series is reserved
    pub fn time_series_count(&self) -> Result<u64> {
        Err(TickError::NotImplemented("time_series_count"))
    }

    /// A snapshot of store-level counters
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            server_id: self.server_id,
            last_write: self.last_write(),
            concurrent_requests: self.shared.concurrent_requests.load(Ordering::SeqCst),
            trees: self.env.tree_count(),
        }
    }

    /// Drain in-flight requests, then release the store
    ///
    /// Polls the request count every 100 ms for up to 3 seconds; a second
    /// call is a no-op.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let deadline = Instant::now() + Duration::from_millis(crate::config::DRAIN_TIMEOUT_MS);
        loop {
            let in_flight = self.shared.concurrent_requests.load(Ordering::SeqCst);
            if in_flight == 0 {
                break;
            }
            if Instant::now() >= deadline {
                warn!("closing with {} requests still in flight", in_flight);
                break;
            }
            std::thread::sleep(Duration::from_millis(crate::config::DRAIN_POLL_INTERVAL_MS));
        }
        info!("time-series store closed");
    }
}

impl Drop for TickStore {
    fn drop(&mut self) {
        self.close();
    }
}

/// Store-level counters
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub server_id: [u8; 16],
    pub last_write: Option<DateTime<Utc>>,
    pub concurrent_requests: usize,
    pub trees: usize,
}
