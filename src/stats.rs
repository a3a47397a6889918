//! Report timing statistics.
//!
//! The polling thread is the only writer; any thread may read. Each field is an
//! independent atomic, so a reader can see e.g. a new `max` next to an old
//! `count`. That is fine for monitoring and is not meant to be transactional.
//!
//! Only intervals between two consecutive *active* reports are counted. Lifting
//! a finger and putting it down again is a new touch, not a slow report.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// `f64` stored as bits.
#[derive(Debug)]
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn new(v: f64) -> Self {
        Self(AtomicU64::new(v.to_bits()))
    }

    #[inline]
    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    fn store(&self, v: f64) {
        self.0.store(v.to_bits(), Ordering::Relaxed)
    }
}

/// Point-in-time copy of the timing statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportStats {
    pub last_interval_ms: f64,
    /// `0.0` until the first interval is recorded.
    pub min_interval_ms: f64,
    pub max_interval_ms: f64,
    pub avg_interval_ms: f64,
    pub report_rate_hz: f64,
    pub sample_count: u32,
}

#[derive(Debug)]
pub struct TimingTracker {
    ticks_per_second: u64,

    last_interval_ms: AtomicF64,
    min_interval_ms: AtomicF64,
    max_interval_ms: AtomicF64,
    avg_interval_ms: AtomicF64,
    sum_ms: AtomicF64,
    count: AtomicU32,

    // Tick of the previous report, valid only while `chain_active` is set.
    last_tick: AtomicU64,
    chain_active: AtomicBool,
}

impl TimingTracker {
    pub fn new(ticks_per_second: u64) -> Self {
        Self {
            ticks_per_second: ticks_per_second.max(1),
            last_interval_ms: AtomicF64::new(0.0),
            min_interval_ms: AtomicF64::new(f64::INFINITY),
            max_interval_ms: AtomicF64::new(0.0),
            avg_interval_ms: AtomicF64::new(0.0),
            sum_ms: AtomicF64::new(0.0),
            count: AtomicU32::new(0),
            last_tick: AtomicU64::new(0),
            chain_active: AtomicBool::new(false),
        }
    }

    pub fn ticks_per_second(&self) -> u64 {
        self.ticks_per_second
    }

    /// Feed one decoded report.
    ///
    /// Records an interval when this report and the previous one were both
    /// active; an inactive report breaks the chain.
    pub fn on_report(&self, active: bool, now_ticks: u64) {
        if !active {
            self.chain_active.store(false, Ordering::Relaxed);
            return;
        }
        if self.chain_active.load(Ordering::Relaxed) {
            let last = self.last_tick.load(Ordering::Relaxed);
            let elapsed = now_ticks.saturating_sub(last);
            let interval_ms = elapsed as f64 * 1000.0 / self.ticks_per_second as f64;
            self.record_interval_ms(interval_ms);
        }
        self.last_tick.store(now_ticks, Ordering::Relaxed);
        self.chain_active.store(true, Ordering::Relaxed);
    }

    /// Fold one interval into the running statistics.
    pub fn record_interval_ms(&self, interval_ms: f64) {
        self.last_interval_ms.store(interval_ms);
        if interval_ms < self.min_interval_ms.load() {
            self.min_interval_ms.store(interval_ms);
        }
        if interval_ms > self.max_interval_ms.load() {
            self.max_interval_ms.store(interval_ms);
        }
        let sum = self.sum_ms.load() + interval_ms;
        self.sum_ms.store(sum);
        let count = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        self.avg_interval_ms.store(sum / count as f64);
    }

    /// Back to the initial sentinels (min = +inf, max = 0, count = 0).
    pub fn reset(&self) {
        self.last_interval_ms.store(0.0);
        self.min_interval_ms.store(f64::INFINITY);
        self.max_interval_ms.store(0.0);
        self.avg_interval_ms.store(0.0);
        self.sum_ms.store(0.0);
        self.count.store(0, Ordering::Relaxed);
        self.last_tick.store(0, Ordering::Relaxed);
        self.chain_active.store(false, Ordering::Relaxed);
    }

    pub fn stats(&self) -> ReportStats {
        let avg = self.avg_interval_ms.load();
        let min = self.min_interval_ms.load();
        ReportStats {
            last_interval_ms: self.last_interval_ms.load(),
            min_interval_ms: if min.is_finite() { min } else { 0.0 },
            max_interval_ms: self.max_interval_ms.load(),
            avg_interval_ms: avg,
            report_rate_hz: if avg > 0.0 { 1000.0 / avg } else { 0.0 },
            sample_count: self.count.load(Ordering::Relaxed),
        }
    }
}
