//! Run settings for a benchmark client.

use bytes::Bytes;
use std::fmt;
use std::time::Duration;

/// Prefix of every key the benchmark touches
pub const KEY_PREFIX: &str = "bench/";

/// Filler byte used for every seeded and written value
pub const FILLER: u8 = b'x';

/// Default reporting interval
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Immutable configuration of one benchmark client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Registered backend name
    pub backend: String,
    /// Addresses handed to the backend constructor
    pub addresses: Vec<String>,
    /// Aggregation server to publish samples to
    pub publish: Option<String>,
    /// Number of reader tasks
    pub readers: usize,
    /// Number of writer tasks
    pub writers: usize,
    /// Size of the key space
    pub keys: usize,
    /// Size of each value in bytes
    pub payload: usize,
    /// Reporting interval
    pub interval: Duration,
    /// Identity used on the reporting wire
    pub client_id: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            addresses: Vec::new(),
            publish: None,
            readers: 1,
            writers: 0,
            keys: 10,
            payload: 10,
            interval: DEFAULT_INTERVAL,
            client_id: "localhost".to_string(),
        }
    }
}

impl Settings {
    /// Total number of worker tasks
    pub fn tasks(&self) -> usize {
        self.readers + self.writers
    }

    /// Value written by the seeder and by writer tasks
    pub fn filler(&self) -> Bytes {
        filler(self.payload)
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "backend={} addresses={:?} publish={} readers={} writers={} keys={} payload={} interval={}s client={}",
            self.backend,
            self.addresses,
            self.publish.as_deref().unwrap_or("-"),
            self.readers,
            self.writers,
            self.keys,
            self.payload,
            self.interval.as_secs(),
            self.client_id
        )
    }
}

/// Key name for an index in the key space
pub fn key_for(index: usize) -> String {
    format!("{}{}", KEY_PREFIX, index)
}

/// `size` filler bytes
pub fn filler(size: usize) -> Bytes {
    Bytes::from(vec![FILLER; size])
}
