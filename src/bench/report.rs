//! Local reporter: prints per-interval throughput and publishes samples.

use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::config::Settings;
use super::metrics::OpCounters;
use super::protocol::Sample;

/// Persistent connection to the aggregation server.
///
/// Connected once; a failed connect or write is never retried and the
/// client continues local-only.
#[derive(Debug)]
pub struct Publisher {
    endpoint: String,
    stream: Option<TcpStream>,
}

impl Publisher {
    /// Connect to `endpoint`, logging instead of failing on error
    pub async fn connect(endpoint: &str) -> Self {
        let stream = match TcpStream::connect(endpoint).await {
            Ok(stream) => {
                tracing::info!(endpoint = %endpoint, "Publishing samples to aggregation server");
                Some(stream)
            }
            Err(e) => {
                tracing::warn!(
                    endpoint = %endpoint,
                    "Cannot reach aggregation server, reporting locally only: {}",
                    e
                );
                None
            }
        };
        Self {
            endpoint: endpoint.to_string(),
            stream,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Send one sample; returns whether it was written
    pub async fn publish(&mut self, sample: &Sample) -> bool {
        let Some(stream) = self.stream.as_mut() else {
            return false;
        };
        match stream.write_all(sample.encode().as_bytes()).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    endpoint = %self.endpoint,
                    "Lost aggregation server, reporting locally only: {}",
                    e
                );
                self.stream = None;
                false
            }
        }
    }
}

/// Periodic reporter for one benchmark client
#[derive(Debug)]
pub struct Reporter {
    counters: Arc<OpCounters>,
    interval: Duration,
    client_id: String,
    publisher: Option<Publisher>,
}

impl Reporter {
    /// Build a reporter, connecting to the publish endpoint if one is set
    pub async fn connect(settings: &Settings, counters: Arc<OpCounters>) -> Self {
        let publisher = match &settings.publish {
            Some(endpoint) => Some(Publisher::connect(endpoint).await),
            None => None,
        };
        Self {
            counters,
            interval: settings.interval,
            client_id: settings.client_id.clone(),
            publisher,
        }
    }

    pub fn publisher(&self) -> Option<&Publisher> {
        self.publisher.as_ref()
    }

    /// Snapshot and reset the counters, print the local rate and publish it
    pub async fn report_once(&mut self) -> Sample {
        let snapshot = self.counters.take();
        let (reads, writes) = snapshot.per_second(self.interval);
        let sample = Sample::new(self.client_id.clone(), reads, writes);

        if let Some(publisher) = self.publisher.as_mut() {
            publisher.publish(&sample).await;
        }
        println!("{} rps  {} wps", reads, writes);

        if snapshot.errors() > 0 {
            tracing::warn!(
                read_errors = snapshot.read_errors,
                write_errors = snapshot.write_errors,
                "Operations failed during the last interval"
            );
        }

        sample
    }

    /// Report every interval, forever
    pub async fn run(mut self) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.report_once().await;
        }
    }
}
