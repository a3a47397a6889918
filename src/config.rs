//! Tunables, loadable from TOML.
//!
//! Every field has a default, so a config file only needs the keys it changes:
//!
//! ```toml
//! max_touch_points = 2
//! release_timeout_ms = 80
//! known_devices = [[0x03EB, 0x8A6E]]
//!
//! [digitizer_range]
//! min = 0
//! max = 32767
//! ```

use crate::decoder::{ReportDecoder, DEFAULT_MAX_TOUCH_POINTS};
use crate::device::KNOWN_TOUCH_DEVICES;
use crate::error::Result;
use crate::validator::CoordinateRange;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Largest report the polling loop reads in one call.
pub const DEFAULT_READ_BUFFER_LEN: usize = 256;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TouchConfig {
    /// Digitizer points parsed per report.
    pub max_touch_points: usize,
    pub poll_interval_ms: u64,
    /// Ask the OS for maximum scheduling priority on the polling thread. Falls
    /// back to normal priority when refused.
    pub elevate_priority: bool,
    /// Upper bound on waiting for the polling thread during disconnect.
    pub disconnect_timeout_ms: u64,
    pub read_buffer_len: usize,
    /// Consumer-side release inference (see [`OnsetDetector`](crate::onset::OnsetDetector)).
    pub release_timeout_ms: u64,
    pub reconnect_interval_ms: u64,
    /// `(vendor_id, product_id)` pairs auto-reconnect looks for.
    pub known_devices: Vec<(u16, u16)>,
    /// Calibration file. `None` uses [`CalibrationStore::default_path`](crate::calibration::CalibrationStore::default_path).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibration_file: Option<PathBuf>,

    // Tables last so the serialized file stays valid TOML.
    /// Plausible raw range for digitizer points.
    pub digitizer_range: CoordinateRange,
    /// Range a sample must fall in to be accepted as a calibration point.
    pub calibration_range: CoordinateRange,
}

impl Default for TouchConfig {
    fn default() -> Self {
        Self {
            max_touch_points: DEFAULT_MAX_TOUCH_POINTS,
            poll_interval_ms: 1,
            elevate_priority: true,
            disconnect_timeout_ms: 2000,
            read_buffer_len: DEFAULT_READ_BUFFER_LEN,
            release_timeout_ms: 50,
            reconnect_interval_ms: 2000,
            known_devices: KNOWN_TOUCH_DEVICES.to_vec(),
            calibration_file: None,
            digitizer_range: CoordinateRange::DIGITIZER,
            calibration_range: CoordinateRange::SAMPLE,
        }
    }
}

impl TouchConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn decoder(&self) -> ReportDecoder {
        ReportDecoder::new(self.digitizer_range, self.max_touch_points)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.disconnect_timeout_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn release_timeout(&self) -> Duration {
        Duration::from_millis(self.release_timeout_ms)
    }
}
