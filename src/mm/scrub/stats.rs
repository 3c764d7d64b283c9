//! # Scrub Stats
//!
//! Contadores por instância, atualizados dentro do lock e lidos fora dele
//! via `snapshot()`.

use core::sync::atomic::{AtomicU64, Ordering};

/// Contadores por instância do scrubber (legíveis sem o lock)
#[derive(Debug, Default)]
pub struct ScrubStats {
    pub runs_submitted: AtomicU64,
    pub bytes_submitted: AtomicU64,
    pub records_drained: AtomicU64,
    pub backpressure_cycles: AtomicU64,
    pub blocking_waits: AtomicU64,
}

/// Cópia pontual de `ScrubStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrubStatsSnapshot {
    pub runs_submitted: u64,
    pub bytes_submitted: u64,
    pub records_drained: u64,
    pub backpressure_cycles: u64,
    pub blocking_waits: u64,
}

impl ScrubStats {
    pub const fn new() -> Self {
        Self {
            runs_submitted: AtomicU64::new(0),
            bytes_submitted: AtomicU64::new(0),
            records_drained: AtomicU64::new(0),
            backpressure_cycles: AtomicU64::new(0),
            blocking_waits: AtomicU64::new(0),
        }
    }

    pub fn inc_submit(&self, bytes: u64) {
        self.runs_submitted.fetch_add(1, Ordering::Relaxed);
        self.bytes_submitted.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_drained(&self, count: usize) {
        self.records_drained.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn inc_backpressure(&self) {
        self.backpressure_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_wait(&self) {
        self.blocking_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ScrubStatsSnapshot {
        ScrubStatsSnapshot {
            runs_submitted: self.runs_submitted.load(Ordering::Relaxed),
            bytes_submitted: self.bytes_submitted.load(Ordering::Relaxed),
            records_drained: self.records_drained.load(Ordering::Relaxed),
            backpressure_cycles: self.backpressure_cycles.load(Ordering::Relaxed),
            blocking_waits: self.blocking_waits.load(Ordering::Relaxed),
        }
    }
}
