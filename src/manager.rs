//! Device connection and the polling loop.
//!
//! [`TouchDeviceManager`] owns at most one connected touchscreen. Connecting
//! opens the device through the [`HidBackend`], switches it to non-blocking
//! reads and starts a dedicated polling thread:
//!
//! ```text
//! loop every ~1 ms:
//!     read up to 256 bytes
//!       n > 0  -> decode, publish, update timing stats
//!       n == 0 -> nothing available
//!       error  -> mark Disconnected, close handle, exit thread
//! ```
//!
//! The polling thread is the only writer of the published touch state and the
//! timing statistics; everything on the manager's read side (`latest_touch`,
//! `all_touches`, `report_stats`, `snapshot`) may be called from any thread.
//!
//! Connect and disconnect are serialized by one lock. Disconnect signals the
//! thread, waits a bounded time for it to finish and then joins; a thread that
//! does not stop in time is detached (leaking its handle) rather than killed.
//!
//! Every connection gets a generation number. A polling thread only publishes,
//! or marks the manager disconnected, while its generation is still current, so
//! a detached thread whose read finally returns cannot disturb a newer
//! connection.
//!
//! The polling thread asks for maximum scheduling priority when it starts and
//! keeps running at normal priority if the OS refuses.

use crate::backends::default_backend;
use crate::config::TouchConfig;
use crate::decoder::ReportDecoder;
use crate::device::{DeviceFamily, DeviceIdentity, HidBackend, HidHandle};
use crate::error::{Error, Result};
use crate::eventbus::{EdgeFilter, ListenerId, ListenerSet, TouchListener};
use crate::publisher::TouchPublisher;
use crate::snapshot::DiagnosticsSnapshot;
use crate::stats::{ReportStats, TimingTracker};
use crate::touch::{now_ms, TouchSample};
use crate::worker::StoppableThread;
use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::{Duration, Instant};
use thread_priority::{set_current_thread_priority, ThreadPriority};

const POLL_THREAD_NAME: &str = "touchup-poll";
const RECONNECT_THREAD_NAME: &str = "touchup-reconnect";

// Polling thread ticks are nanoseconds since the loop started.
const TICKS_PER_SECOND: u64 = 1_000_000_000;

// Granularity at which the reconnect supervisor checks its stop flag.
const SUPERVISOR_SLICE: Duration = Duration::from_millis(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared with the polling thread.
struct Shared {
    publisher: TouchPublisher,
    tracker: TimingTracker,
    state: AtomicU8,
    // Bumped (under the `device` lock) whenever a connection starts or ends.
    generation: AtomicU64,
    device: Mutex<Option<DeviceIdentity>>,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    /// Makes `device` the live connection and returns its generation.
    fn begin(&self, device: &DeviceIdentity) -> u64 {
        let mut slot = lock(&self.device);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        *slot = Some(device.clone());
        self.set_state(ConnectionState::Connected);
        generation
    }

    /// Ends whatever connection is live; any running poller becomes stale.
    fn retire(&self) {
        let mut slot = lock(&self.device);
        self.generation.fetch_add(1, Ordering::AcqRel);
        *slot = None;
        self.set_state(ConnectionState::Disconnected);
    }

    /// Ends the connection only if `generation` is still the live one.
    fn retire_if_current(&self, generation: u64) -> bool {
        let mut slot = lock(&self.device);
        if !self.is_current(generation) {
            return false;
        }
        self.generation.fetch_add(1, Ordering::AcqRel);
        *slot = None;
        self.set_state(ConnectionState::Disconnected);
        true
    }

    /// Publishes a release if a touch is still showing, so listeners and
    /// readers do not keep seeing a finger on a gone device.
    fn release_touch(&self) {
        let last = self.publisher.read_latest();
        if last.active || !self.publisher.read_all().is_empty() {
            self.publisher
                .publish_report(TouchSample::released(last.x, last.y, now_ms()), &[]);
        }
        self.tracker.on_report(false, 0);
    }
}

pub struct TouchDeviceManager {
    backend: Arc<dyn HidBackend>,
    config: Mutex<TouchConfig>,
    shared: Arc<Shared>,
    // Also the connection lock: connect/disconnect hold it for their duration.
    poller: Mutex<Option<StoppableThread>>,
    reconnect: Mutex<Option<StoppableThread>>,
}

impl Default for TouchDeviceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TouchDeviceManager {
    /// Manager over the platform backend with default settings.
    pub fn new() -> Self {
        Self::with_backend(default_backend(), TouchConfig::default())
    }

    pub fn with_config(config: TouchConfig) -> Self {
        Self::with_backend(default_backend(), config)
    }

    pub fn with_backend(backend: Arc<dyn HidBackend>, config: TouchConfig) -> Self {
        Self {
            backend,
            config: Mutex::new(config),
            shared: Arc::new(Shared {
                publisher: TouchPublisher::new(),
                tracker: TimingTracker::new(TICKS_PER_SECOND),
                state: AtomicU8::new(ConnectionState::Disconnected as u8),
                generation: AtomicU64::new(0),
                device: Mutex::new(None),
            }),
            poller: Mutex::new(None),
            reconnect: Mutex::new(None),
        }
    }

    pub fn config(&self) -> TouchConfig {
        lock(&self.config).clone()
    }

    /// Digitizer points parsed per report. Applies from the next `connect`.
    pub fn set_max_touch_points(&self, max_points: usize) {
        lock(&self.config).max_touch_points = max_points;
    }

    pub fn max_touch_points(&self) -> usize {
        lock(&self.config).max_touch_points
    }

    /// Every HID device the backend can see.
    pub fn available_devices(&self) -> Result<Vec<DeviceIdentity>> {
        self.backend.enumerate()
    }

    /// Connects to `device`, replacing any current connection.
    ///
    /// On failure the manager is left `Disconnected`.
    pub fn connect(&self, device: &DeviceIdentity) -> Result<()> {
        let mut poller = lock(&self.poller);
        self.stop_poller(&mut poller);

        self.shared.set_state(ConnectionState::Connecting);
        let mut handle = match self.backend.open(device) {
            Ok(h) => h,
            Err(e) => {
                warn!("failed to open {device}: {e}");
                self.shared.retire();
                return Err(e);
            }
        };
        // A blocking read would pin the polling thread past any disconnect timeout.
        if let Err(e) = handle.set_nonblocking() {
            warn!("could not set non-blocking mode on {device}: {e}");
            drop(handle);
            self.shared.retire();
            return Err(e);
        }

        let family = device.family();
        if !family.is_supported() {
            warn!("no decode path for {device}; its reports will be ignored");
        }

        let config = self.config();
        self.shared.tracker.reset();
        self.shared.publisher.reset();
        let generation = self.shared.begin(device);

        let shared = self.shared.clone();
        let poll = PollLoop {
            decoder: config.decoder(),
            family,
            buf: vec![0u8; config.read_buffer_len.max(1)],
            interval: config.poll_interval(),
            elevate_priority: config.elevate_priority,
            generation,
        };
        match StoppableThread::spawn(POLL_THREAD_NAME, move |stop| poll.run(&shared, handle, stop)) {
            Ok(t) => {
                info!("connected to {device} ({family:?})");
                *poller = Some(t);
                Ok(())
            }
            Err(e) => {
                self.shared.retire();
                Err(Error::Io(e))
            }
        }
    }

    /// Stops polling and closes the device. Safe to call repeatedly.
    pub fn disconnect(&self) {
        let mut poller = lock(&self.poller);
        self.stop_poller(&mut poller);
    }

    fn stop_poller(&self, poller: &mut Option<StoppableThread>) {
        let was_connected = self.shared.state() != ConnectionState::Disconnected;
        self.shared.retire();
        if let Some(t) = poller.take() {
            let timeout = self.config().disconnect_timeout();
            if t.stop(timeout) {
                debug!("polling thread stopped");
                // Joined, so this thread is the only writer now.
                self.shared.release_touch();
            }
            if was_connected {
                info!("disconnected");
            }
        }
    }

    pub fn is_device_connected(&self) -> bool {
        self.shared.state() == ConnectionState::Connected
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn connected_device(&self) -> Option<DeviceIdentity> {
        lock(&self.shared.device).clone()
    }

    // Listeners

    pub fn listeners(&self) -> &ListenerSet {
        self.shared.publisher.listeners()
    }

    /// Registers a listener for touch-down and release edges.
    pub fn add_listener(&self, listener: Arc<dyn TouchListener>) -> Result<ListenerId> {
        self.listeners().add(listener, EdgeFilter::Both)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners().remove(id)
    }

    // Diagnostics

    /// Latest primary touch. Wait-free; safe from an audio callback.
    pub fn latest_touch(&self) -> TouchSample {
        self.shared.publisher.read_latest()
    }

    /// All contacts from the latest report.
    pub fn all_touches(&self) -> Vec<TouchSample> {
        self.shared.publisher.read_all()
    }

    pub fn report_stats(&self) -> ReportStats {
        self.shared.tracker.stats()
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            state: self.connection_state(),
            device: self.connected_device(),
            latest: self.latest_touch(),
            touches: self.all_touches(),
            stats: self.report_stats(),
        }
    }

    // Auto-reconnect

    /// Every `interval`, while disconnected, connect to the first enumerated
    /// device whose `(vendor_id, product_id)` is in `known`.
    pub fn enable_auto_reconnect(
        self: &Arc<Self>,
        known: Vec<(u16, u16)>,
        interval: Duration,
    ) -> Result<()> {
        self.disable_auto_reconnect();

        let weak: Weak<Self> = Arc::downgrade(self);
        let t = StoppableThread::spawn(RECONNECT_THREAD_NAME, move |stop| {
            while !stop.load(Ordering::Acquire) {
                let Some(mgr) = weak.upgrade() else {
                    break;
                };
                if !mgr.is_device_connected() {
                    mgr.try_reconnect(&known);
                }
                drop(mgr);
                sleep_unless_stopped(stop, interval);
            }
        })?;
        *lock(&self.reconnect) = Some(t);
        Ok(())
    }

    pub fn disable_auto_reconnect(&self) {
        let t = lock(&self.reconnect).take();
        if let Some(t) = t {
            t.stop(self.config().disconnect_timeout());
        }
    }

    fn try_reconnect(&self, known: &[(u16, u16)]) {
        let devices = match self.available_devices() {
            Ok(d) => d,
            Err(e) => {
                debug!("reconnect: enumeration failed: {e}");
                return;
            }
        };
        if let Some(device) = devices.iter().find(|d| known.contains(&d.vid_pid())) {
            match self.connect(device) {
                Ok(()) => info!("reconnect: connected to {device}"),
                Err(e) => debug!("reconnect: {e}"),
            }
        }
    }
}

impl Drop for TouchDeviceManager {
    fn drop(&mut self) {
        self.disable_auto_reconnect();
        self.disconnect();
    }
}

fn sleep_unless_stopped(stop: &AtomicBool, total: Duration) {
    let deadline = Instant::now() + total;
    while !stop.load(Ordering::Acquire) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(SUPERVISOR_SLICE.min(deadline - now));
    }
}

/// Everything the polling thread owns besides the handle.
struct PollLoop {
    decoder: ReportDecoder,
    family: DeviceFamily,
    buf: Vec<u8>,
    interval: Duration,
    elevate_priority: bool,
    generation: u64,
}

impl PollLoop {
    fn run(mut self, shared: &Shared, mut handle: Box<dyn HidHandle>, stop: &AtomicBool) {
        if self.elevate_priority {
            match set_current_thread_priority(ThreadPriority::Max) {
                Ok(()) => debug!("polling thread running at maximum priority"),
                Err(e) => {
                    warn!("could not raise polling thread priority ({e:?}); using normal priority")
                }
            }
        }

        let origin = Instant::now();
        let mut last = TouchSample::default();

        while !stop.load(Ordering::Acquire) && shared.is_current(self.generation) {
            match handle.read(&mut self.buf) {
                Ok(0) => {}
                Ok(n) => {
                    if !shared.is_current(self.generation) {
                        break;
                    }
                    let ticks = origin.elapsed().as_nanos() as u64;
                    last = self.process(shared, n, ticks, last);
                }
                Err(e) => {
                    if shared.retire_if_current(self.generation) {
                        warn!("read failed: {e}; disconnecting");
                        shared.release_touch();
                    } else {
                        debug!("stale polling thread: read failed: {e}");
                    }
                    break;
                }
            }
            thread::sleep(self.interval);
        }
        // Dropping the handle closes the device.
        drop(handle);
    }

    /// Decode and publish one report of `len` bytes. Returns the published primary.
    fn process(&self, shared: &Shared, len: usize, ticks: u64, last: TouchSample) -> TouchSample {
        let report = &self.buf[..len];
        if !self.decoder.recognizes(self.family, report) {
            trace!("ignoring {len}-byte report (id {})", report[0]);
            return last;
        }

        let timestamp = now_ms();
        let samples = self.decoder.decode(self.family, report, timestamp);
        let active: Vec<TouchSample> = samples.iter().filter(|s| s.active).copied().collect();

        let primary = active
            .first()
            .or_else(|| samples.first())
            .copied()
            .unwrap_or_else(|| TouchSample::released(last.x, last.y, timestamp));

        shared.publisher.publish_report(primary, &active);
        shared.tracker.on_report(primary.active, ticks);
        primary
    }
}
