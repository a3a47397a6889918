//! Crate error type.
//!
//! Everything that can fail outside the real-time path returns [`Result`]. The
//! polling loop itself never surfaces errors to callers: read failures turn into
//! an automatic disconnect (see [`TouchDeviceManager`](crate::manager::TouchDeviceManager)).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The transport could not open the device (busy, permissions, unplugged).
    #[error("failed to open device {path}: {reason}")]
    DeviceOpen { path: String, reason: String },

    /// A read on an open handle failed.
    #[error("device read failed: {0}")]
    Read(String),

    #[cfg(feature = "hid")]
    #[cfg_attr(docsrs, doc(cfg(feature = "hid")))]
    #[error("HID API error: {0}")]
    Hid(#[from] hidapi::HidError),

    #[error("no device connected")]
    NotConnected,

    /// The fixed-size listener table is full.
    #[error("listener table is full")]
    ListenerCapacity,

    /// Calibration input was rejected; previous bounds are still in effect.
    #[error("calibration rejected: {0}")]
    Calibration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
