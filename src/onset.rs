//! Touch-down detection for audio-rate consumers.
//!
//! Some controllers never send a release report; the finger simply stops
//! producing reports and the published sample stays `active`. [`OnsetDetector`]
//! therefore infers release on the consumer side: once per audio block the host
//! hands [`OnsetDetector::poll`] the latest published sample, and if no *new*
//! active report has shown up for `release_timeout`, the touch counts as lifted.
//!
//! Freshness is judged by the whole packed sample changing, never by comparing
//! the sample's truncated timestamp against the caller's clock. `now_ms` may be
//! any monotonic millisecond clock; it is only compared with itself.
//!
//! `poll` is meant for a single consumer thread. `is_touching` may be read from
//! anywhere. Everything is plain atomics, so neither call blocks.

use crate::touch::{pack, TouchSample};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug)]
pub struct OnsetDetector {
    release_timeout_ms: u64,
    touching: AtomicBool,
    // Consumer clock at the last fresh active report.
    last_touch_ms: AtomicU64,
    // Packed form of the last sample handed to `poll`.
    last_seen: AtomicU64,
}

impl OnsetDetector {
    pub fn new(release_timeout: Duration) -> Self {
        Self {
            release_timeout_ms: release_timeout.as_millis() as u64,
            touching: AtomicBool::new(false),
            last_touch_ms: AtomicU64::new(0),
            last_seen: AtomicU64::new(0),
        }
    }

    pub fn release_timeout(&self) -> Duration {
        Duration::from_millis(self.release_timeout_ms)
    }

    /// Call once per render block with the latest published sample.
    ///
    /// Returns `true` exactly once per touch-down: the first fresh active sample
    /// after an explicit release or an inferred one.
    pub fn poll(&self, now_ms: u64, latest: &TouchSample) -> bool {
        let word = pack(latest);
        let fresh = self.last_seen.swap(word, Ordering::AcqRel) != word;

        if !latest.active {
            self.touching.store(false, Ordering::Release);
            return false;
        }

        if fresh {
            self.last_touch_ms.store(now_ms, Ordering::Release);
            return !self.touching.swap(true, Ordering::AcqRel);
        }

        // Same report as last block: the device has gone quiet.
        if self.touching.load(Ordering::Acquire) {
            let last = self.last_touch_ms.load(Ordering::Acquire);
            if now_ms.saturating_sub(last) > self.release_timeout_ms {
                self.touching.store(false, Ordering::Release);
            }
        }
        false
    }

    /// Inferred contact state as of the last `poll`.
    pub fn is_touching(&self) -> bool {
        self.touching.load(Ordering::Acquire)
    }

    /// Forget everything, e.g. after reconnecting.
    pub fn reset(&self) {
        self.touching.store(false, Ordering::Release);
        self.last_touch_ms.store(0, Ordering::Release);
        self.last_seen.store(0, Ordering::Release);
    }
}
