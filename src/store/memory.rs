//! In-process backend.
//!
//! Every handle cloned from one [`MemoryStore`] shares the same key space, so
//! the registry can hand one handle to each benchmark task while seeding and
//! traffic all land in the same map. Implements the full capability set.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard};

use super::{KvPair, LockOptions, Locker, Store, WatchStream, WatchTreeStream, WriteOptions};
use crate::error::{Result, StoreError};

/// Capacity of the change feed backing watches
const CHANGE_FEED_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,
    last_index: u64,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    fn to_pair(&self, key: &str) -> KvPair {
        KvPair {
            key: key.to_string(),
            value: self.value.clone(),
            last_index: self.last_index,
        }
    }
}

struct Shared {
    entries: DashMap<String, Entry>,
    index: AtomicU64,
    /// Keys that changed, for watchers
    changes: broadcast::Sender<String>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Shared in-memory key-value store
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Shared>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            inner: Arc::new(Shared {
                entries: DashMap::new(),
                index: AtomicU64::new(0),
                changes,
                locks: DashMap::new(),
            }),
        }
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .entries
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn next_index(&self) -> u64 {
        self.inner.index.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn notify(&self, key: &str) {
        // No receivers simply means nobody is watching
        let _ = self.inner.changes.send(key.to_string());
    }

    fn make_entry(&self, value: &[u8], options: Option<&WriteOptions>) -> Entry {
        Entry {
            value: Bytes::copy_from_slice(value),
            last_index: self.next_index(),
            // A deadline past what Instant can represent never expires
            expires_at: options
                .and_then(|opts| opts.ttl)
                .and_then(|ttl| Instant::now().checked_add(ttl)),
        }
    }

    fn lookup(&self, key: &str) -> Result<KvPair> {
        let now = Instant::now();
        let expired = match self.inner.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Ok(entry.to_pair(key)),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.inner
                .entries
                .remove_if(key, |_, entry| entry.is_expired(now));
        }
        Err(StoreError::NotFound)
    }

    fn snapshot(&self, directory: &str) -> Vec<KvPair> {
        let now = Instant::now();
        let mut pairs: Vec<KvPair> = self
            .inner
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(directory) && !entry.value().is_expired(now))
            .map(|entry| entry.value().to_pair(entry.key()))
            .collect();
        pairs.sort_by(|a, b| a.key.cmp(&b.key));
        pairs
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("keys", &self.inner.entries.len())
            .finish()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<KvPair> {
        self.lookup(key)
    }

    async fn put(&self, key: &str, value: &[u8], options: Option<&WriteOptions>) -> Result<()> {
        let entry = self.make_entry(value, options);
        self.inner.entries.insert(key.to_string(), entry);
        self.notify(key);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let now = Instant::now();
        match self.inner.entries.remove(key) {
            Some((_, entry)) if !entry.is_expired(now) => {
                self.notify(key);
                Ok(())
            }
            _ => Err(StoreError::NotFound),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match self.lookup(key) {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list(&self, directory: &str) -> Result<Vec<KvPair>> {
        let pairs = self.snapshot(directory);
        if pairs.is_empty() {
            return Err(StoreError::NotFound);
        }
        Ok(pairs)
    }

    async fn delete_tree(&self, directory: &str) -> Result<()> {
        let keys: Vec<String> = self
            .inner
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(directory))
            .map(|entry| entry.key().clone())
            .collect();
        for key in keys {
            if self.inner.entries.remove(&key).is_some() {
                self.notify(&key);
            }
        }
        Ok(())
    }

    async fn atomic_put(
        &self,
        key: &str,
        value: &[u8],
        previous: Option<&KvPair>,
        options: Option<&WriteOptions>,
    ) -> Result<KvPair> {
        let now = Instant::now();
        let entry = self.make_entry(value, options);
        let pair = entry.to_pair(key);

        match (self.inner.entries.entry(key.to_string()), previous) {
            (MapEntry::Occupied(mut occupied), None) => {
                if !occupied.get().is_expired(now) {
                    return Err(StoreError::KeyExists);
                }
                occupied.insert(entry);
            }
            (MapEntry::Occupied(mut occupied), Some(prev)) => {
                let current = occupied.get();
                if current.is_expired(now) || current.last_index != prev.last_index {
                    return Err(StoreError::KeyModified);
                }
                occupied.insert(entry);
            }
            (MapEntry::Vacant(vacant), None) => {
                vacant.insert(entry);
            }
            (MapEntry::Vacant(_), Some(_)) => return Err(StoreError::NotFound),
        }

        self.notify(key);
        Ok(pair)
    }

    async fn atomic_delete(&self, key: &str, previous: &KvPair) -> Result<()> {
        let now = Instant::now();
        match self.inner.entries.entry(key.to_string()) {
            MapEntry::Occupied(occupied) if occupied.get().is_expired(now) => {
                occupied.remove();
                Err(StoreError::NotFound)
            }
            MapEntry::Occupied(occupied) => {
                if occupied.get().last_index != previous.last_index {
                    return Err(StoreError::KeyModified);
                }
                occupied.remove();
                self.notify(key);
                Ok(())
            }
            MapEntry::Vacant(_) => Err(StoreError::NotFound),
        }
    }

    async fn watch(&self, key: &str) -> Result<WatchStream> {
        // Subscribe before reading so no change slips between the two
        let mut changes = self.inner.changes.subscribe();
        let initial = self.lookup(key).ok();
        let store = self.clone();
        let key = key.to_string();

        let stream = async_stream::stream! {
            if let Some(pair) = initial {
                yield pair;
            }
            loop {
                match changes.recv().await {
                    Ok(changed) if changed != key => continue,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        if let Ok(pair) = store.lookup(&key) {
                            yield pair;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };
        Ok(stream.boxed())
    }

    async fn watch_tree(&self, directory: &str) -> Result<WatchTreeStream> {
        let mut changes = self.inner.changes.subscribe();
        let initial = self.snapshot(directory);
        let store = self.clone();
        let directory = directory.to_string();

        let stream = async_stream::stream! {
            yield initial;
            loop {
                match changes.recv().await {
                    Ok(changed) if !changed.starts_with(&directory) => continue,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        yield store.snapshot(&directory);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };
        Ok(stream.boxed())
    }

    async fn new_lock(&self, key: &str, options: Option<LockOptions>) -> Result<Box<dyn Locker>> {
        Ok(Box::new(MemoryLock {
            store: self.clone(),
            key: key.to_string(),
            options: options.unwrap_or_default(),
            guard: None,
        }))
    }
}

/// Per-key lock handed out by [`MemoryStore::new_lock`].
///
/// The mutex for a key lives in the store only while someone holds or waits
/// on it. The lock TTL applies to the value stored at the key, not to the
/// exclusion: a holder keeps the lock until it calls `unlock`.
struct MemoryLock {
    store: MemoryStore,
    key: String,
    options: LockOptions,
    guard: Option<OwnedMutexGuard<()>>,
}

#[async_trait]
impl Locker for MemoryLock {
    async fn lock(&mut self) -> Result<()> {
        if self.guard.is_some() {
            return Ok(());
        }
        // Cloned under the shard lock, so pruning in unlock cannot race it
        let mutex = self
            .store
            .inner
            .locks
            .entry(self.key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        let write = WriteOptions {
            ttl: self.options.ttl,
        };
        self.store
            .put(&self.key, &self.options.value, Some(&write))
            .await?;
        self.guard = Some(guard);
        Ok(())
    }

    async fn unlock(&mut self) -> Result<()> {
        let guard = self
            .guard
            .take()
            .ok_or_else(|| StoreError::Backend(format!("lock {} is not held", self.key)))?;
        if self.store.inner.entries.remove(&self.key).is_some() {
            self.store.notify(&self.key);
        }
        drop(guard);

        // Nobody else holds or waits on this mutex once only the map refers to it
        self.store
            .inner
            .locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
        Ok(())
    }
}
