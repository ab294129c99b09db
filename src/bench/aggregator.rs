//! Aggregation server.
//!
//! Each accepted connection gets a task that only decodes samples and sends
//! them to a single coordinator over a channel. The coordinator owns the
//! per-client state outright, so no locking is involved.
//!
//! An epoch closes once every known client has reached the sequence number
//! just assigned. Clients are never evicted: a client that stops reporting
//! holds every later epoch open, and the server goes silent until it returns.

use anyhow::Context;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use super::protocol::Sample;

/// Buffered samples between connection tasks and the coordinator
pub const SAMPLE_CHANNEL_CAPACITY: usize = 1024;

/// Last sample and sample count for one client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientState {
    pub reads: u64,
    pub writes: u64,
    /// Number of samples received from this client
    pub sequence: u64,
}

/// Cluster-wide totals for one completed epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aggregate {
    pub reads: u64,
    pub writes: u64,
    pub clients: usize,
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rps  {} wps from {} clients",
            self.reads, self.writes, self.clients
        )
    }
}

/// Per-client sequence tracking and epoch reconciliation
#[derive(Debug, Default)]
pub struct Aggregator {
    clients: HashMap<String, ClientState>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sample; returns the totals if it completed an epoch
    pub fn record(&mut self, sample: Sample) -> Option<Aggregate> {
        let previous = self.clients.get(&sample.client).map(|state| state.sequence);
        let sequence = previous.map_or(1, |seq| seq + 1);

        self.clients.insert(
            sample.client,
            ClientState {
                reads: sample.reads,
                writes: sample.writes,
                sequence,
            },
        );

        // A first sample cannot be behind anyone
        previous?;
        self.reconcile(sequence)
    }

    fn reconcile(&self, epoch: u64) -> Option<Aggregate> {
        let mut total = Aggregate {
            reads: 0,
            writes: 0,
            clients: self.clients.len(),
        };
        for state in self.clients.values() {
            if state.sequence < epoch {
                return None;
            }
            total.reads = total.reads.saturating_add(state.reads);
            total.writes = total.writes.saturating_add(state.writes);
        }
        Some(total)
    }

    pub fn client(&self, id: &str) -> Option<&ClientState> {
        self.clients.get(id)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}

/// TCP front end feeding the coordinator
#[derive(Debug)]
pub struct AggregationServer {
    listener: TcpListener,
}

impl AggregationServer {
    /// Listen on `endpoint`
    pub async fn bind(endpoint: &str) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(endpoint)
            .await
            .with_context(|| format!("failed to listen on {}", endpoint))?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept clients and run the coordinator, calling `on_epoch` for every
    /// completed epoch. Runs until the process exits.
    pub async fn run<F>(self, mut on_epoch: F)
    where
        F: FnMut(Aggregate),
    {
        let (tx, mut rx) = mpsc::channel(SAMPLE_CHANNEL_CAPACITY);
        tokio::spawn(accept_clients(self.listener, tx));

        let mut aggregator = Aggregator::new();
        while let Some(sample) = rx.recv().await {
            tracing::debug!(
                client = %sample.client,
                reads = sample.reads,
                writes = sample.writes,
                "Sample received"
            );
            if let Some(aggregate) = aggregator.record(sample) {
                on_epoch(aggregate);
            }
        }
    }
}

async fn accept_clients(listener: TcpListener, samples: mpsc::Sender<Sample>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tracing::info!(peer = %peer, "Client connected");
                let samples = samples.clone();
                tokio::spawn(async move {
                    match read_samples(stream, samples).await {
                        Ok(()) => tracing::info!(peer = %peer, "Client disconnected"),
                        Err(e) => tracing::warn!(peer = %peer, "Lost client: {:#}", e),
                    }
                });
            }
            Err(e) => tracing::warn!("Accept failed: {}", e),
        }
    }
}

/// Forward every decoded line until EOF, a read error or a malformed line
async fn read_samples<R>(reader: R, samples: mpsc::Sender<Sample>) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await.context("read failed")? {
        let sample = Sample::parse(&line).with_context(|| format!("malformed sample {:?}", line))?;
        if samples.send(sample).await.is_err() {
            // Coordinator is gone
            return Ok(());
        }
    }
    Ok(())
}
