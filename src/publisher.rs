//! Latest-touch state shared between the polling thread and its consumers.
//!
//! There are two read paths:
//! - **single touch**: one packed `u64` stored with `Release` and loaded with
//!   `Acquire`. Reads are wait-free and safe from an audio render callback.
//! - **multi touch**: a `Vec` behind a mutex. The lock is only ever held for a
//!   copy, never across I/O or decoding.
//!
//! Either way a reader sees the previous complete state or the new one.
//!
//! The polling thread is the only writer. Publishing a single-touch sample whose
//! `active` flag differs from the last published one notifies the
//! [`ListenerSet`].

use crate::eventbus::ListenerSet;
use crate::touch::{pack, unpack, TouchSample};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default)]
pub struct TouchPublisher {
    packed: AtomicU64,
    touches: Mutex<Vec<TouchSample>>,
    listeners: ListenerSet,
}

impl TouchPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    fn touches(&self) -> MutexGuard<'_, Vec<TouchSample>> {
        self.touches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `sample` as the latest single touch.
    ///
    /// Fires listeners on an active/inactive edge. Returns `true` if it did.
    pub fn publish_single(&self, sample: TouchSample) -> bool {
        let previous = self.packed.swap(pack(&sample), Ordering::AcqRel);
        let edge = unpack(previous).active != sample.active;
        if edge {
            self.listeners.notify(&sample);
        }
        edge
    }

    /// Latest single touch. Wait-free.
    #[inline]
    pub fn read_latest(&self) -> TouchSample {
        unpack(self.packed.load(Ordering::Acquire))
    }

    /// Replaces the multi-touch list.
    pub fn publish_multi(&self, samples: &[TouchSample]) {
        let mut touches = self.touches();
        touches.clear();
        touches.extend_from_slice(samples);
    }

    /// Copy of the current multi-touch list.
    pub fn read_all(&self) -> Vec<TouchSample> {
        self.touches().clone()
    }

    /// Publishes one decoded report: the full list first, then the primary sample.
    pub fn publish_report(&self, primary: TouchSample, all: &[TouchSample]) -> bool {
        self.publish_multi(all);
        self.publish_single(primary)
    }

    /// Back to "no touch" without notifying anyone.
    pub fn reset(&self) {
        self.touches().clear();
        self.packed.store(0, Ordering::Release);
    }

    pub fn listeners(&self) -> &ListenerSet {
        &self.listeners
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventbus::EdgeFilter;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn single_round_trip() {
        let p = TouchPublisher::new();
        assert!(!p.read_latest().active);
        let s = TouchSample::new(16, 32, true, 1, 99);
        p.publish_single(s);
        assert_eq!(p.read_latest(), s);
    }

    #[test]
    fn notifies_on_edges_only() {
        let p = TouchPublisher::new();
        let edges = Arc::new(AtomicUsize::new(0));
        let e = edges.clone();
        p.listeners()
            .add(
                Arc::new(move |_: &TouchSample| {
                    e.fetch_add(1, Ordering::SeqCst);
                }),
                EdgeFilter::Both,
            )
            .unwrap();

        assert!(p.publish_single(TouchSample::new(10, 10, true, 0, 0)));
        assert!(!p.publish_single(TouchSample::new(11, 10, true, 0, 1)));
        assert!(!p.publish_single(TouchSample::new(12, 10, true, 0, 2)));
        assert!(p.publish_single(TouchSample::released(12, 10, 3)));
        assert!(!p.publish_single(TouchSample::released(0, 0, 4)));

        assert_eq!(edges.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn multi_is_replaced_wholesale() {
        let p = TouchPublisher::new();
        let a = TouchSample::new(1, 1, true, 0, 0);
        let b = TouchSample::new(2, 2, true, 1, 0);
        p.publish_multi(&[a, b]);
        assert_eq!(p.read_all(), vec![a, b]);
        p.publish_multi(&[b]);
        assert_eq!(p.read_all(), vec![b]);
        p.reset();
        assert!(p.read_all().is_empty());
        assert_eq!(p.read_latest(), TouchSample::default());
    }

    #[test]
    fn concurrent_reader_never_sees_a_torn_word() {
        let p = Arc::new(TouchPublisher::new());
        let writer = {
            let p = p.clone();
            thread::spawn(move || {
                for i in 0..20_000u32 {
                    let v = (i % 1000) as u16;
                    // Every published sample has x == y and contact_id == x % 32.
                    p.publish_single(TouchSample::new(v, v, i % 2 == 0, (v % 32) as u8, i as u64));
                }
            })
        };
        for _ in 0..20_000 {
            let s = p.read_latest();
            assert_eq!(s.x, s.y);
            assert_eq!(s.contact_id, (s.x % 32) as u8);
        }
        writer.join().unwrap();
    }
}
