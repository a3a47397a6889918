//! touchup: touchscreen HID decoding and real-time touch state publishing.
//!
//! Reads raw reports from a USB touchscreen on a dedicated polling thread,
//! decodes them with a per-vendor byte layout, and publishes the latest touch
//! state to any number of consumer threads: a wait-free single-touch word for
//! audio callbacks, a short-lock multi-touch list for UIs, edge listeners for
//! low-latency triggers, and running report-timing statistics.
//!
//! ```no_run
//! use std::sync::Arc;
//! use touchup::{LogListener, TouchDeviceManager, KNOWN_TOUCH_DEVICES};
//!
//! let mgr = TouchDeviceManager::new();
//! mgr.add_listener(Arc::new(LogListener::new())).unwrap();
//!
//! let devices = mgr.available_devices().unwrap();
//! if let Some(dev) = devices.iter().find(|d| KNOWN_TOUCH_DEVICES.contains(&d.vid_pid())) {
//!     mgr.connect(dev).unwrap();
//! }
//! let touch = mgr.latest_touch();
//! println!("{touch:?} {:?}", mgr.report_stats());
//! ```

pub mod backends;
pub mod calibration;
pub mod config;
pub mod decoder;
pub mod device;
pub mod error;
pub mod eventbus;
pub mod filtered_listener;
pub mod logger;
pub mod manager;
pub mod onset;
pub mod publisher;
pub mod snapshot;
pub mod stats;
pub mod touch;
pub mod validator;
pub mod worker;

pub use calibration::{CalibrationBounds, CalibrationMapper, CalibrationStore};
pub use config::TouchConfig;
pub use decoder::ReportDecoder;
pub use device::*;
pub use error::{Error, Result};
pub use eventbus::*;
pub use filtered_listener::FilteredListener;
pub use logger::LogListener;
pub use manager::*;
pub use onset::OnsetDetector;
pub use publisher::TouchPublisher;
pub use snapshot::DiagnosticsSnapshot;
pub use stats::{ReportStats, TimingTracker};
pub use touch::TouchSample;
pub use validator::CoordinateRange;
