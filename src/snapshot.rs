//! Diagnostics snapshot.
//!
//! [`DiagnosticsSnapshot`] is an owned, read-only view of a manager at one
//! point in time: connection state, device, latest touch, all touches and
//! timing statistics. It is meant for a monitoring consumer polling at UI rate
//! (around 60 Hz). Producing one never blocks the polling thread beyond the
//! short multi-touch copy.
//!
//! ```no_run
//! use touchup::TouchDeviceManager;
//!
//! let mgr = TouchDeviceManager::new();
//! let snap = mgr.snapshot();
//! println!("{}", snap.to_json().unwrap());
//! ```

use crate::device::DeviceIdentity;
use crate::error::Result;
use crate::manager::ConnectionState;
use crate::stats::ReportStats;
use crate::touch::TouchSample;
use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct DiagnosticsSnapshot {
    pub state: ConnectionState,
    pub device: Option<DeviceIdentity>,
    pub latest: TouchSample,
    pub touches: Vec<TouchSample>,
    pub stats: ReportStats,
}

impl DiagnosticsSnapshot {
    /// Number of contacts currently on the surface.
    #[inline]
    pub fn active_touches(&self) -> usize {
        self.touches.iter().filter(|t| t.active).count()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
