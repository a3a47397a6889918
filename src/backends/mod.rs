//! Transport backends.
//!
//! Implementations of [`HidBackend`](crate::device::HidBackend):
//!
//! # Feature flags
//! - **`hid`** (default): [`hid::HidApiBackend`], the system HID stack via `hidapi`.
//!
//! [`virtual_input::VirtualBackend`] is always available; it feeds scripted
//! reports and is what the tests run against.

use crate::device::HidBackend;
use std::sync::Arc;

#[cfg(feature = "hid")]
#[cfg_attr(docsrs, doc(cfg(feature = "hid")))]
pub mod hid;

pub mod virtual_input;

/// The platform backend when `hid` is enabled, otherwise an empty virtual one.
pub fn default_backend() -> Arc<dyn HidBackend> {
    #[cfg(feature = "hid")]
    {
        Arc::new(hid::HidApiBackend::new())
    }
    #[cfg(not(feature = "hid"))]
    {
        Arc::new(virtual_input::VirtualBackend::new())
    }
}
