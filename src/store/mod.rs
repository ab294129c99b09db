//! Storage capability interface.
//!
//! Every backend implements [`Store`]. The basic operations (get, put, delete,
//! exists, list, delete_tree) are mandatory; the optional ones (atomic
//! operations, watches, locks) default to [`StoreError::NotSupported`] so a
//! backend only overrides what it can actually do.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::time::Duration;

use crate::error::{Result, StoreError};

pub mod memory;
pub mod registry;
pub mod relay;

pub use memory::MemoryStore;
pub use registry::BackendRegistry;
pub use relay::RelayStore;

/// One storage handle, owned by the task that opened it
pub type BoxedStore = Box<dyn Store>;

/// Stream of values produced by [`Store::watch`]
pub type WatchStream = BoxStream<'static, KvPair>;

/// Stream of listings produced by [`Store::watch_tree`]
pub type WatchTreeStream = BoxStream<'static, Vec<KvPair>>;

/// A key with its value and modification index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvPair {
    pub key: String,
    pub value: Bytes,
    /// Index of the last modification, used for compare-and-swap
    pub last_index: u64,
}

/// Options applied to a write
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Expire the key after this duration
    pub ttl: Option<Duration>,
}

/// Options for [`Store::new_lock`]
#[derive(Debug, Clone, Default)]
pub struct LockOptions {
    /// Value stored at the lock key while held
    pub value: Bytes,
    pub ttl: Option<Duration>,
}

/// Options passed to backend constructors
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub connection_timeout: Duration,
    pub persist_connection: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            persist_connection: true,
        }
    }
}

/// Mutual exclusion handle returned by [`Store::new_lock`]
#[async_trait]
pub trait Locker: Send {
    /// Wait until the lock is held
    async fn lock(&mut self) -> Result<()>;

    /// Release a held lock
    async fn unlock(&mut self) -> Result<()>;
}

/// Key-value storage contract consumed by the load generator
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch a key, failing with [`StoreError::NotFound`] when absent
    async fn get(&self, key: &str) -> Result<KvPair>;

    /// Insert or overwrite a key
    async fn put(&self, key: &str, value: &[u8], options: Option<&WriteOptions>) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// All pairs whose key starts with `directory`
    async fn list(&self, directory: &str) -> Result<Vec<KvPair>>;

    async fn delete_tree(&self, directory: &str) -> Result<()>;

    /// Compare-and-swap write.
    ///
    /// With `previous == None` the key must not exist yet. Otherwise the
    /// stored `last_index` must match `previous.last_index`.
    async fn atomic_put(
        &self,
        _key: &str,
        _value: &[u8],
        _previous: Option<&KvPair>,
        _options: Option<&WriteOptions>,
    ) -> Result<KvPair> {
        Err(StoreError::NotSupported("atomic_put"))
    }

    /// Compare-and-swap delete on `previous.last_index`
    async fn atomic_delete(&self, _key: &str, _previous: &KvPair) -> Result<()> {
        Err(StoreError::NotSupported("atomic_delete"))
    }

    /// Current value of `key` followed by every later change. Dropping the
    /// stream ends the watch.
    async fn watch(&self, _key: &str) -> Result<WatchStream> {
        Err(StoreError::NotSupported("watch"))
    }

    /// Current listing of `directory` followed by the listing after each change
    async fn watch_tree(&self, _directory: &str) -> Result<WatchTreeStream> {
        Err(StoreError::NotSupported("watch_tree"))
    }

    async fn new_lock(&self, _key: &str, _options: Option<LockOptions>) -> Result<Box<dyn Locker>> {
        Err(StoreError::NotSupported("new_lock"))
    }

    async fn close(&self) {}
}
