//! Device identity, family resolution and the transport seam.
//!
//! [`DeviceIdentity`] is a cloneable description of one HID endpoint as reported
//! by enumeration. Backends populate what they know; HID-specific diagnostic
//! fields stay `None` when the platform does not report them.
//!
//! ## Persistence notes
//! - `vendor_id`/`product_id` and `serial_number` are generally stable and are what
//!   auto-reconnect matches on.
//! - `path` is platform-specific and may change across ports and reconnects; it is
//!   what `open` uses, nothing more.
//!
//! The transport itself is abstracted by [`HidBackend`] (enumerate/open) and
//! [`HidHandle`] (one open device). Dropping a handle closes it.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Atmel maXTouch controller shipped in ELO touch monitors.
pub const ELO_TOUCH_VID_PID: (u16, u16) = (0x03EB, 0x8A6E);

/// Generic HID multi-touch digitizer panel.
pub const STANDARD_DIGITIZER_VID_PID: (u16, u16) = (0x2575, 0x7317);

/// Every `(vid, pid)` pair with a hand-written decode path.
pub const KNOWN_TOUCH_DEVICES: [(u16, u16); 2] = [ELO_TOUCH_VID_PID, STANDARD_DIGITIZER_VID_PID];

/// Description of a single HID endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,

    /// OS path handed back to `open`. Opaque.
    pub path: String,

    pub manufacturer: String,
    pub product: String,
    pub serial_number: String,

    /// HID Usage Page, if known (`0x0D` for digitizers).
    pub usage_page: Option<u16>,
    /// HID Usage within the page, if known (`0x04` touch screen).
    pub usage: Option<u16>,
    /// Interface index. Some stacks use `-1` for "not applicable".
    pub interface_number: Option<i32>,
}

impl DeviceIdentity {
    pub fn new(vendor_id: u16, product_id: u16, path: impl Into<String>) -> Self {
        Self {
            vendor_id,
            product_id,
            path: path.into(),
            ..Self::default()
        }
    }

    #[inline]
    pub fn vid_pid(&self) -> (u16, u16) {
        (self.vendor_id, self.product_id)
    }

    /// The decode layout for this device.
    #[inline]
    pub fn family(&self) -> DeviceFamily {
        DeviceFamily::from_ids(self.vendor_id, self.product_id)
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:04x} {} ({})",
            self.vendor_id, self.product_id, self.product, self.path
        )
    }
}

/// Byte layout a device speaks. Resolved once at connect time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceFamily {
    /// ELO-style single-touch report (id 1, >= 59 bytes).
    EloTouch,
    /// Standard HID multi-touch digitizer (id 1, >= 44 bytes, 5-byte points).
    StandardDigitizer,
    /// No decode path; reports produce no samples.
    Unknown,
}

impl DeviceFamily {
    pub fn from_ids(vendor_id: u16, product_id: u16) -> Self {
        match (vendor_id, product_id) {
            ELO_TOUCH_VID_PID => DeviceFamily::EloTouch,
            STANDARD_DIGITIZER_VID_PID => DeviceFamily::StandardDigitizer,
            _ => DeviceFamily::Unknown,
        }
    }

    pub fn is_supported(self) -> bool {
        self != DeviceFamily::Unknown
    }
}

/// One open device.
///
/// Implementations must be `Send`: the handle moves into the polling thread and
/// is dropped (closed) there.
pub trait HidHandle: Send {
    /// Switch the handle to non-blocking reads.
    fn set_nonblocking(&mut self) -> Result<()>;

    /// Read one report into `buf`.
    ///
    /// `Ok(0)` means no data is available right now. `Err` is fatal for the
    /// connection.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/// Enumeration and open. Shared between the caller and the reconnect supervisor.
pub trait HidBackend: Send + Sync {
    fn enumerate(&self) -> Result<Vec<DeviceIdentity>>;

    fn open(&self, device: &DeviceIdentity) -> Result<Box<dyn HidHandle>>;
}
