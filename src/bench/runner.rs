//! Load generator: seeds the key space and runs reader/writer tasks.

use anyhow::Context;
use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::config::{key_for, Settings};
use super::metrics::OpCounters;
use crate::error::StoreError;
use crate::store::{BackendRegistry, BoxedStore, Store, StoreConfig};

/// Running set of benchmark workers
pub struct LoadGenerator {
    counters: Arc<OpCounters>,
    workers: Vec<JoinHandle<()>>,
}

impl LoadGenerator {
    /// Open one handle per task, seed the key space, then spawn the workers.
    ///
    /// Failing to open a handle or to seed aborts before any worker starts.
    pub async fn start(
        settings: Arc<Settings>,
        registry: &BackendRegistry,
    ) -> anyhow::Result<Self> {
        if settings.tasks() > 0 && settings.keys == 0 {
            anyhow::bail!("at least one key is required to run readers or writers");
        }

        let mut handles = open_handles(registry, &settings)?;
        seed(handles[0].as_ref(), settings.keys, settings.payload)
            .await
            .context("storage initialization failed")?;
        tracing::info!(
            keys = settings.keys,
            payload = settings.payload,
            "Seeded key space"
        );

        let counters = Arc::new(OpCounters::new());
        let mut workers = Vec::with_capacity(settings.tasks());

        // The handle list is ordered readers first, then writers
        let writer_handles = handles.split_off(settings.readers.min(handles.len()));
        for (id, store) in handles.into_iter().take(settings.readers).enumerate() {
            workers.push(tokio::spawn(run_reader(
                id,
                store,
                settings.keys,
                counters.clone(),
            )));
        }
        for (id, store) in writer_handles.into_iter().take(settings.writers).enumerate() {
            workers.push(tokio::spawn(run_writer(
                id,
                store,
                settings.keys,
                settings.filler(),
                counters.clone(),
            )));
        }

        tracing::info!(
            readers = settings.readers,
            writers = settings.writers,
            "Workers started"
        );

        Ok(Self { counters, workers })
    }

    /// Counters shared with the workers
    pub fn counters(&self) -> Arc<OpCounters> {
        self.counters.clone()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

/// One handle per worker task, plus one for seeding when there are no workers
fn open_handles(
    registry: &BackendRegistry,
    settings: &Settings,
) -> anyhow::Result<Vec<BoxedStore>> {
    let config = StoreConfig::default();
    (0..settings.tasks().max(1))
        .map(|_| {
            registry
                .open(&settings.backend, &settings.addresses, &config)
                .with_context(|| format!("failed to open {} backend", settings.backend))
        })
        .collect()
}

/// Write `keys` entries `bench/0..keys`, each `payload` filler bytes
pub async fn seed(store: &dyn Store, keys: usize, payload: usize) -> Result<(), StoreError> {
    let value = super::config::filler(payload);
    for index in 0..keys {
        store.put(&key_for(index), &value, None).await?;
    }
    Ok(())
}

async fn run_reader(id: usize, store: BoxedStore, keys: usize, counters: Arc<OpCounters>) {
    let mut rng = StdRng::from_entropy();
    loop {
        let key = key_for(rng.gen_range(0..keys));
        let result = store.get(&key).await;
        if let Err(e) = &result {
            tracing::warn!(reader = id, key = %key, "Get error: {}", e);
        }
        counters.record_read(result.is_ok());
        // In-process backends never suspend
        tokio::task::yield_now().await;
    }
}

async fn run_writer(
    id: usize,
    store: BoxedStore,
    keys: usize,
    value: Bytes,
    counters: Arc<OpCounters>,
) {
    let mut rng = StdRng::from_entropy();
    loop {
        let key = key_for(rng.gen_range(0..keys));
        let result = store.put(&key, &value, None).await;
        if let Err(e) = &result {
            tracing::warn!(writer = id, key = %key, "Put error: {}", e);
        }
        counters.record_write(result.is_ok());
        tokio::task::yield_now().await;
    }
}
