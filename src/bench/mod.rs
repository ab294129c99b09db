//! Benchmark core for key-value stores.
//!
//! This module provides:
//! - Load generator seeding the key space and running reader/writer tasks
//! - Lossy shared operation counters
//! - Local reporter printing and publishing per-interval throughput
//! - Line-oriented reporting protocol
//! - Aggregation server combining samples from many clients into epochs

pub mod aggregator;
pub mod config;
pub mod metrics;
pub mod protocol;
pub mod report;
pub mod runner;

pub use aggregator::{Aggregate, AggregationServer, Aggregator, ClientState};
pub use config::Settings;
pub use metrics::{CounterSnapshot, OpCounters};
pub use protocol::Sample;
pub use report::{Publisher, Reporter};
pub use runner::LoadGenerator;
