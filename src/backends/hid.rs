//! `hidapi` transport.
//!
//! hidapi's library init/exit is process-global and not safe to interleave with
//! concurrent opens and closes. All access goes through one process-wide
//! [`HidContext`]: a reference-counted lease on a shared `HidApi`, created on
//! the first `acquire` and torn down when the last lease is dropped. Every open
//! [`HidApiHandle`] holds a lease for its lifetime; enumeration holds one for
//! its duration.

use crate::device::{DeviceIdentity, HidBackend, HidHandle};
use crate::error::{Error, Result};
use hidapi::{DeviceInfo, HidApi, HidDevice};
use log::{debug, trace};
use std::ffi::CString;
use std::sync::{Mutex, MutexGuard, PoisonError};

struct SharedApi {
    api: HidApi,
    leases: usize,
}

static HID: Mutex<Option<SharedApi>> = Mutex::new(None);

fn shared() -> MutexGuard<'static, Option<SharedApi>> {
    HID.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Lease on the process-wide HID subsystem.
pub struct HidContext {
    _private: (),
}

impl HidContext {
    /// Initializes the HID subsystem on first use and takes a lease on it.
    pub fn acquire() -> Result<Self> {
        let mut guard = shared();
        match guard.as_mut() {
            Some(shared) => shared.leases += 1,
            None => {
                debug!("initializing HID subsystem");
                *guard = Some(SharedApi {
                    api: HidApi::new()?,
                    leases: 1,
                });
            }
        }
        Ok(Self { _private: () })
    }

    /// Runs `f` with exclusive access to the shared `HidApi`.
    pub fn with_api<R>(&self, f: impl FnOnce(&mut HidApi) -> Result<R>) -> Result<R> {
        let mut guard = shared();
        match guard.as_mut() {
            Some(shared) => f(&mut shared.api),
            // A live lease keeps the slot populated.
            None => Err(Error::NotConnected),
        }
    }

    /// Number of live leases (diagnostics).
    pub fn lease_count() -> usize {
        shared().as_ref().map_or(0, |s| s.leases)
    }
}

impl Drop for HidContext {
    fn drop(&mut self) {
        let mut guard = shared();
        if let Some(shared) = guard.as_mut() {
            shared.leases -= 1;
            if shared.leases == 0 {
                debug!("releasing HID subsystem");
                *guard = None;
            }
        }
    }
}

fn identity_from_info(info: &DeviceInfo) -> DeviceIdentity {
    DeviceIdentity {
        vendor_id: info.vendor_id(),
        product_id: info.product_id(),
        path: info.path().to_string_lossy().into_owned(),
        manufacturer: info.manufacturer_string().unwrap_or("Unknown").to_string(),
        product: info.product_string().unwrap_or("Unknown Product").to_string(),
        serial_number: info.serial_number().unwrap_or("No Serial").to_string(),
        usage_page: Some(info.usage_page()),
        usage: Some(info.usage()),
        interface_number: Some(info.interface_number()),
    }
}

/// Open hidapi device. Dropping it closes the device, then releases its lease.
pub struct HidApiHandle {
    // Field order matters: the device must close before the context lease goes.
    device: HidDevice,
    _ctx: HidContext,
}

impl HidHandle for HidApiHandle {
    fn set_nonblocking(&mut self) -> Result<()> {
        self.device.set_blocking_mode(false)?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.device.read(buf).map_err(|e| Error::Read(e.to_string()))
    }
}

/// [`HidBackend`] over the system HID stack.
#[derive(Debug, Default, Clone, Copy)]
pub struct HidApiBackend;

impl HidApiBackend {
    pub fn new() -> Self {
        HidApiBackend
    }
}

impl HidBackend for HidApiBackend {
    fn enumerate(&self) -> Result<Vec<DeviceIdentity>> {
        let ctx = HidContext::acquire()?;
        ctx.with_api(|api| {
            api.refresh_devices()?;
            let devices: Vec<DeviceIdentity> = api.device_list().map(identity_from_info).collect();
            for d in &devices {
                trace!(
                    "[HID/ENUM] {d} usage_page={:?} usage={:?}",
                    d.usage_page,
                    d.usage
                );
            }
            Ok(devices)
        })
    }

    fn open(&self, device: &DeviceIdentity) -> Result<Box<dyn HidHandle>> {
        let open_err = |reason: String| Error::DeviceOpen {
            path: device.path.clone(),
            reason,
        };
        let path = CString::new(device.path.as_str()).map_err(|e| open_err(e.to_string()))?;
        let ctx = HidContext::acquire().map_err(|e| open_err(e.to_string()))?;
        let raw = ctx.with_api(|api| api.open_path(&path).map_err(|e| open_err(e.to_string())))?;
        debug!("[HID/OPEN] {device}");
        Ok(Box::new(HidApiHandle {
            device: raw,
            _ctx: ctx,
        }))
    }
}
