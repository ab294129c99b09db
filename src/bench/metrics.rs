//! Shared operation counters.
//!
//! Workers increment with relaxed atomics. [`OpCounters::take`] reads and
//! then zeroes each counter as two separate steps, so increments that land
//! between the read and the reset are dropped. Throughput figures are
//! therefore a slight undercount under contention; this is an accepted
//! accuracy bound of the measurement, not something the reporter corrects.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters shared by every worker of one benchmark client
#[derive(Debug, Default)]
pub struct OpCounters {
    reads: AtomicU64,
    writes: AtomicU64,
    read_errors: AtomicU64,
    write_errors: AtomicU64,
}

impl OpCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one completed read, successful or not
    pub fn record_read(&self, ok: bool) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.read_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Count one completed write, successful or not
    pub fn record_write(&self, ok: bool) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.write_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Current values without resetting
    pub fn peek(&self) -> CounterSnapshot {
        CounterSnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
        }
    }

    /// Read and zero every counter (lossy, see module docs)
    pub fn take(&self) -> CounterSnapshot {
        CounterSnapshot {
            reads: read_and_zero(&self.reads),
            writes: read_and_zero(&self.writes),
            read_errors: read_and_zero(&self.read_errors),
            write_errors: read_and_zero(&self.write_errors),
        }
    }
}

fn read_and_zero(counter: &AtomicU64) -> u64 {
    let value = counter.load(Ordering::Relaxed);
    counter.store(0, Ordering::Relaxed);
    value
}

/// Counter values for one reporting interval
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub reads: u64,
    pub writes: u64,
    pub read_errors: u64,
    pub write_errors: u64,
}

impl CounterSnapshot {
    /// Whole operations per second over `interval`.
    ///
    /// Sub-second intervals count as one second.
    pub fn per_second(&self, interval: Duration) -> (u64, u64) {
        let secs = interval.as_secs().max(1);
        (self.reads / secs, self.writes / secs)
    }

    pub fn errors(&self) -> u64 {
        self.read_errors + self.write_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_take() {
        let counters = OpCounters::new();
        counters.record_read(true);
        counters.record_read(false);
        counters.record_write(true);

        let snapshot = counters.take();
        assert_eq!(snapshot.reads, 2);
        assert_eq!(snapshot.writes, 1);
        assert_eq!(snapshot.read_errors, 1);
        assert_eq!(snapshot.write_errors, 0);
        assert_eq!(snapshot.errors(), 1);

        // take() resets
        assert_eq!(counters.peek(), CounterSnapshot::default());
    }

    #[test]
    fn test_failed_operations_still_count() {
        let counters = OpCounters::new();
        for _ in 0..5 {
            counters.record_write(false);
        }
        assert_eq!(counters.peek().writes, 5);
        assert_eq!(counters.peek().write_errors, 5);
    }

    #[test]
    fn test_per_second_uses_integer_division() {
        let snapshot = CounterSnapshot {
            reads: 1005,
            writes: 19,
            ..Default::default()
        };
        assert_eq!(snapshot.per_second(Duration::from_secs(10)), (100, 1));
        assert_eq!(snapshot.per_second(Duration::from_millis(200)), (1005, 19));
    }

    #[test]
    fn test_concurrent_increments() {
        let counters = std::sync::Arc::new(OpCounters::new());
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let counters = counters.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        counters.record_read(true);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(counters.peek().reads, 4000);
    }
}
