//! In-memory transport.
//!
//! [`VirtualBackend`] stands in for a real HID stack: register devices, then
//! push raw reports (or failures) through the returned [`VirtualDevice`] and
//! the polling loop reads them exactly as it would from hardware. Used by the
//! test suite and for replaying captured reports.

use crate::device::{DeviceIdentity, HidBackend, HidHandle};
use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

enum Step {
    Report(Vec<u8>),
    Fail(String),
    // Block the reading thread, then fail: a wedged blocking read.
    Stall(Duration),
}

struct DeviceState {
    identity: DeviceIdentity,
    queue: Mutex<VecDeque<Step>>,
    present: AtomicBool,
    refuse_nonblocking: AtomicBool,
    open_handles: AtomicUsize,
}

impl DeviceState {
    fn queue(&self) -> MutexGuard<'_, VecDeque<Step>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Feeder side of a virtual device.
#[derive(Clone)]
pub struct VirtualDevice {
    state: Arc<DeviceState>,
}

impl VirtualDevice {
    pub fn identity(&self) -> &DeviceIdentity {
        &self.state.identity
    }

    /// Queue a raw report (report id in byte 0).
    pub fn feed(&self, report: impl Into<Vec<u8>>) {
        self.state.queue().push_back(Step::Report(report.into()));
    }

    /// Make a future read fail, after any reports already queued.
    pub fn fail_read(&self, reason: &str) {
        self.state.queue().push_back(Step::Fail(reason.to_string()));
    }

    /// Simulate unplugging: the next read fails and the device disappears from
    /// enumeration until [`plug_in`](Self::plug_in).
    /// Make the next read block for `duration` and then fail.
    pub fn stall_read(&self, duration: Duration) {
        self.state.queue().push_back(Step::Stall(duration));
    }

    /// Make handles refuse to switch to non-blocking mode.
    pub fn refuse_nonblocking(&self, refuse: bool) {
        self.state.refuse_nonblocking.store(refuse, Ordering::SeqCst);
    }

    pub fn unplug(&self) {
        self.state.present.store(false, Ordering::SeqCst);
        let mut q = self.state.queue();
        q.clear();
        q.push_back(Step::Fail("device unplugged".into()));
    }

    pub fn plug_in(&self) {
        self.state.queue().clear();
        self.state.present.store(true, Ordering::SeqCst);
    }

    /// Reports not yet read.
    pub fn pending(&self) -> usize {
        self.state.queue().len()
    }

    /// Handles currently open on this device.
    pub fn open_handles(&self) -> usize {
        self.state.open_handles.load(Ordering::SeqCst)
    }
}

struct VirtualHandle {
    state: Arc<DeviceState>,
}

impl HidHandle for VirtualHandle {
    fn set_nonblocking(&mut self) -> Result<()> {
        if self.state.refuse_nonblocking.load(Ordering::SeqCst) {
            return Err(Error::Read("non-blocking mode not supported".into()));
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        // Pop first so the queue lock is not held across a stall.
        let step = self.state.queue().pop_front();
        match step {
            None => Ok(0),
            Some(Step::Report(r)) => {
                let n = r.len().min(buf.len());
                buf[..n].copy_from_slice(&r[..n]);
                Ok(n)
            }
            Some(Step::Fail(reason)) => Err(Error::Read(reason)),
            Some(Step::Stall(duration)) => {
                thread::sleep(duration);
                Err(Error::Read("stalled read gave up".into()))
            }
        }
    }
}

impl Drop for VirtualHandle {
    fn drop(&mut self) {
        self.state.open_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct VirtualBackend {
    devices: Mutex<Vec<Arc<DeviceState>>>,
}

impl VirtualBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn devices(&self) -> MutexGuard<'_, Vec<Arc<DeviceState>>> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a plugged-in device.
    pub fn add_device(&self, identity: DeviceIdentity) -> VirtualDevice {
        let state = Arc::new(DeviceState {
            identity,
            queue: Mutex::new(VecDeque::new()),
            present: AtomicBool::new(true),
            refuse_nonblocking: AtomicBool::new(false),
            open_handles: AtomicUsize::new(0),
        });
        self.devices().push(state.clone());
        VirtualDevice { state }
    }
}

impl HidBackend for VirtualBackend {
    fn enumerate(&self) -> Result<Vec<DeviceIdentity>> {
        Ok(self
            .devices()
            .iter()
            .filter(|d| d.present.load(Ordering::SeqCst))
            .map(|d| d.identity.clone())
            .collect())
    }

    fn open(&self, device: &DeviceIdentity) -> Result<Box<dyn HidHandle>> {
        let state = self
            .devices()
            .iter()
            .find(|d| d.identity.path == device.path && d.present.load(Ordering::SeqCst))
            .cloned()
            .ok_or_else(|| Error::DeviceOpen {
                path: device.path.clone(),
                reason: "no such device".into(),
            })?;
        state.open_handles.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(VirtualHandle { state }))
    }
}
