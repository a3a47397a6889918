//! Touch edge fan-out.
//!
//! [`ListenerSet`] holds up to [`MAX_LISTENERS`] listeners in a fixed table, so
//! notifying from the polling thread never allocates and never has to worry
//! about the list being resized underneath it.
//!
//! Listeners are invoked synchronously on the polling thread, once per
//! active/inactive edge. They must not block: an audio click trigger is the
//! typical consumer.

use crate::error::{Error, Result};
use crate::touch::TouchSample;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Capacity of a [`ListenerSet`].
pub const MAX_LISTENERS: usize = 8;

/// Receives touch-down and release edges.
pub trait TouchListener: Send + Sync {
    fn on_touch(&self, sample: &TouchSample);
}

impl<F> TouchListener for F
where
    F: Fn(&TouchSample) + Send + Sync,
{
    fn on_touch(&self, sample: &TouchSample) {
        self(sample)
    }
}

/// Which edges a listener wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeFilter {
    Both,
    TouchDown,
    Release,
    Custom(fn(&TouchSample) -> bool),
}

impl EdgeFilter {
    fn accepts(&self, sample: &TouchSample) -> bool {
        match self {
            EdgeFilter::Both => true,
            EdgeFilter::TouchDown => sample.active,
            EdgeFilter::Release => !sample.active,
            EdgeFilter::Custom(f) => f(sample),
        }
    }
}

/// Handle returned by [`ListenerSet::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct ListenerEntry {
    id: ListenerId,
    listener: Arc<dyn TouchListener>,
    enabled: bool,
    filter: EdgeFilter,
}

struct Slots {
    next_id: u64,
    entries: [Option<ListenerEntry>; MAX_LISTENERS],
}

pub struct ListenerSet {
    slots: Mutex<Slots>,
}

impl Default for ListenerSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerSet {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Slots {
                next_id: 0,
                entries: std::array::from_fn(|_| None),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a shared listener. Fails once all slots are taken.
    pub fn add(&self, listener: Arc<dyn TouchListener>, filter: EdgeFilter) -> Result<ListenerId> {
        let mut slots = self.lock();
        let id = ListenerId(slots.next_id);
        let free = slots
            .entries
            .iter_mut()
            .find(|e| e.is_none())
            .ok_or(Error::ListenerCapacity)?;
        *free = Some(ListenerEntry {
            id,
            listener,
            enabled: true,
            filter,
        });
        slots.next_id += 1;
        Ok(id)
    }

    /// Registers an owned listener for both edges.
    pub fn add_listener(&self, listener: impl TouchListener + 'static) -> Result<ListenerId> {
        self.add(Arc::new(listener), EdgeFilter::Both)
    }

    /// Unregisters a listener. Returns `false` if the id was unknown.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut slots = self.lock();
        let pos = slots
            .entries
            .iter()
            .position(|e| matches!(e, Some(entry) if entry.id == id));
        match pos {
            Some(i) => {
                slots.entries[i] = None;
                true
            }
            None => false,
        }
    }

    /// Re-enables a muted listener.
    pub fn enable(&self, id: ListenerId) {
        self.set_enabled(id, true);
    }

    /// Mutes a listener without removing it.
    pub fn disable(&self, id: ListenerId) {
        self.set_enabled(id, false);
    }

    fn set_enabled(&self, id: ListenerId, enabled: bool) {
        let mut slots = self.lock();
        if let Some(entry) = slots.entries.iter_mut().flatten().find(|e| e.id == id) {
            entry.enabled = enabled;
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers `sample` to every enabled listener whose filter accepts it.
    ///
    /// The table lock is released before any callback runs, so a listener may
    /// remove itself.
    pub fn notify(&self, sample: &TouchSample) {
        let targets: [Option<Arc<dyn TouchListener>>; MAX_LISTENERS] = {
            let slots = self.lock();
            std::array::from_fn(|i| match &slots.entries[i] {
                Some(e) if e.enabled && e.filter.accepts(sample) => Some(Arc::clone(&e.listener)),
                _ => None,
            })
        };
        for listener in targets.iter().flatten() {
            listener.on_touch(sample);
        }
    }
}
