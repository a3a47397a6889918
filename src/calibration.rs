//! Two-point touchscreen calibration.
//!
//! [`CalibrationMapper`] turns raw sensor coordinates into normalized `[0, 1]`
//! screen space with a per-axis linear map. Bounds come from a two-point
//! procedure (touch the top-left, then the bottom-right corner) and are persisted
//! through a [`CalibrationStore`] as a small TOML document.
//!
//! Calibrations that are implausible (a point outside the accepted range, or
//! either axis spanning less than [`MIN_CALIBRATION_SPAN`]) are rejected and the
//! previous bounds stay in effect.

use crate::error::{Error, Result};
use crate::touch::TouchSample;
use crate::validator::CoordinateRange;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

/// Minimum raw distance between the two calibration points on each axis.
pub const MIN_CALIBRATION_SPAN: f32 = 20000.0;

/// Full-scale divisor used before any calibration exists.
pub const UNCALIBRATED_FULL_SCALE: f32 = 32768.0;

const FILE_VERSION: &str = "1.0";

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBounds {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
    pub is_calibrated: bool,
}

impl Default for CalibrationBounds {
    /// Factory bounds measured on the reference panel.
    fn default() -> Self {
        Self {
            min_x: 101.0,
            max_x: 29947.0,
            min_y: 133.0,
            max_y: 29986.0,
            is_calibrated: false,
        }
    }
}

impl CalibrationBounds {
    /// Bounds spanned by two points, in either order.
    pub fn from_points(a: &TouchSample, b: &TouchSample) -> Self {
        let (ax, ay, bx, by) = (a.x as f32, a.y as f32, b.x as f32, b.y as f32);
        Self {
            min_x: ax.min(bx),
            max_x: ax.max(bx),
            min_y: ay.min(by),
            max_y: ay.max(by),
            is_calibrated: true,
        }
    }

    pub fn span_x(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn span_y(&self) -> f32 {
        self.max_y - self.min_y
    }

    /// Both axes are ordered (`min < max`).
    pub fn is_ordered(&self) -> bool {
        self.min_x < self.max_x && self.min_y < self.max_y
    }

    /// Both axes span at least [`MIN_CALIBRATION_SPAN`].
    pub fn has_min_span(&self) -> bool {
        self.span_x() >= MIN_CALIBRATION_SPAN && self.span_y() >= MIN_CALIBRATION_SPAN
    }
}

// On-disk layout.

#[derive(Debug, Default, Serialize, Deserialize)]
struct CalibrationFile {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    bounds: Option<BoundsSection>,
    #[serde(default)]
    metadata: Option<MetadataSection>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct BoundsSection {
    min_x: Option<f32>,
    max_x: Option<f32>,
    min_y: Option<f32>,
    max_y: Option<f32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MetadataSection {
    /// Unix seconds.
    calibrated_at: Option<u64>,
    is_calibrated: Option<bool>,
}

/// TOML file holding calibration bounds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CalibrationStore {
    path: PathBuf,
}

impl CalibrationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/touchup/touch_screen.toml`, where the config dir is
    /// `$XDG_CONFIG_HOME`, `%APPDATA%` or `$HOME/.config`, falling back to the
    /// working directory.
    pub fn default_path() -> PathBuf {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("APPDATA").map(PathBuf::from))
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("touchup").join("touch_screen.toml")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads calibrated bounds.
    ///
    /// `Ok(None)` when the file is missing, malformed or incomplete: the caller
    /// keeps its defaults. Only unexpected I/O errors are returned.
    pub fn load(&self) -> Result<Option<CalibrationBounds>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no calibration file at {}, using defaults", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let file: CalibrationFile = match toml::from_str(&text) {
            Ok(f) => f,
            Err(e) => {
                warn!("failed to parse {}: {e}; using defaults", self.path.display());
                return Ok(None);
            }
        };

        let Some(b) = file.bounds else {
            warn!("{} has no [bounds]; using defaults", self.path.display());
            return Ok(None);
        };
        let (Some(min_x), Some(max_x), Some(min_y), Some(max_y)) = (b.min_x, b.max_x, b.min_y, b.max_y)
        else {
            warn!("{} has incomplete bounds; using defaults", self.path.display());
            return Ok(None);
        };

        let bounds = CalibrationBounds {
            min_x,
            max_x,
            min_y,
            max_y,
            is_calibrated: true,
        };
        if !bounds.is_ordered() {
            warn!("{} has inverted bounds; using defaults", self.path.display());
            return Ok(None);
        }
        if !bounds.has_min_span() {
            warn!(
                "{} spans {} x {}, below {MIN_CALIBRATION_SPAN}; using defaults",
                self.path.display(),
                bounds.span_x(),
                bounds.span_y()
            );
            return Ok(None);
        }
        Ok(Some(bounds))
    }

    /// Writes `bounds`, creating parent directories as needed.
    pub fn save(&self, bounds: &CalibrationBounds) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let calibrated_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let file = CalibrationFile {
            version: Some(FILE_VERSION.to_string()),
            bounds: Some(BoundsSection {
                min_x: Some(bounds.min_x),
                max_x: Some(bounds.max_x),
                min_y: Some(bounds.min_y),
                max_y: Some(bounds.max_y),
            }),
            metadata: Some(MetadataSection {
                calibrated_at: Some(calibrated_at),
                is_calibrated: Some(bounds.is_calibrated),
            }),
        };
        std::fs::write(&self.path, toml::to_string_pretty(&file)?)?;
        Ok(())
    }
}

/// Thread-safe holder of the current calibration.
#[derive(Debug)]
pub struct CalibrationMapper {
    valid_range: CoordinateRange,
    bounds: Mutex<CalibrationBounds>,
    store: Option<CalibrationStore>,
}

impl Default for CalibrationMapper {
    fn default() -> Self {
        Self::new(CoordinateRange::SAMPLE)
    }
}

impl CalibrationMapper {
    /// In-memory mapper; calibration points must fall in `valid_range`.
    pub fn new(valid_range: CoordinateRange) -> Self {
        Self {
            valid_range,
            bounds: Mutex::new(CalibrationBounds::default()),
            store: None,
        }
    }

    /// Persist successful calibrations to `store`.
    pub fn with_store(mut self, store: CalibrationStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn store(&self) -> Option<&CalibrationStore> {
        self.store.as_ref()
    }

    fn lock(&self) -> MutexGuard<'_, CalibrationBounds> {
        self.bounds.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn bounds(&self) -> CalibrationBounds {
        *self.lock()
    }

    pub fn reset_to_defaults(&self) {
        *self.lock() = CalibrationBounds::default();
    }

    /// Loads bounds from the store. Returns `true` if calibrated bounds were found.
    ///
    /// Any problem with the file leaves factory defaults in place.
    pub fn load(&self) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        match store.load() {
            Ok(Some(bounds)) => {
                info!(
                    "loaded calibration: x {}..{} y {}..{}",
                    bounds.min_x, bounds.max_x, bounds.min_y, bounds.max_y
                );
                *self.lock() = bounds;
                true
            }
            Ok(None) => {
                self.reset_to_defaults();
                false
            }
            Err(e) => {
                warn!("failed to read calibration: {e}; using defaults");
                self.reset_to_defaults();
                false
            }
        }
    }

    /// Writes the current bounds to the store, if one is attached.
    pub fn save(&self) -> Result<()> {
        match &self.store {
            Some(store) => store.save(&self.bounds()),
            None => Ok(()),
        }
    }

    /// Calibrate from two opposite corners, in either order.
    ///
    /// On success the new bounds are applied and persisted. A persist failure is
    /// logged but does not undo the calibration.
    pub fn set_calibration_points(
        &self,
        top_left: &TouchSample,
        bottom_right: &TouchSample,
    ) -> Result<CalibrationBounds> {
        if !top_left.is_valid_in(&self.valid_range) || !bottom_right.is_valid_in(&self.valid_range) {
            return Err(Error::Calibration(format!(
                "points ({}, {}) / ({}, {}) outside {}..={}",
                top_left.x,
                top_left.y,
                bottom_right.x,
                bottom_right.y,
                self.valid_range.min,
                self.valid_range.max
            )));
        }

        let candidate = CalibrationBounds::from_points(top_left, bottom_right);
        if !candidate.has_min_span() {
            return Err(Error::Calibration(format!(
                "points too close together (span {} x {}, need {MIN_CALIBRATION_SPAN})",
                candidate.span_x(),
                candidate.span_y()
            )));
        }

        *self.lock() = candidate;
        info!(
            "calibration set: x {}..{} y {}..{}",
            candidate.min_x, candidate.max_x, candidate.min_y, candidate.max_y
        );

        if let Err(e) = self.save() {
            warn!("failed to persist calibration: {e}");
        }
        Ok(candidate)
    }

    /// Raw coordinates to `[0, 1]` screen space.
    ///
    /// Before calibration this assumes a `0..32768` panel, which is only an
    /// approximation.
    pub fn convert_to_normalized(&self, sample: &TouchSample) -> (f32, f32) {
        let b = self.bounds();
        let (x, y) = (sample.x as f32, sample.y as f32);
        let (nx, ny) = if b.is_calibrated {
            ((x - b.min_x) / b.span_x(), (y - b.min_y) / b.span_y())
        } else {
            (x / UNCALIBRATED_FULL_SCALE, y / UNCALIBRATED_FULL_SCALE)
        };
        (nx.clamp(0.0, 1.0), ny.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(x: u16, y: u16) -> TouchSample {
        TouchSample::new(x, y, true, 0, 0)
    }

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("touchup-cal-{}-{tag}", std::process::id()))
            .join("touch_screen.toml")
    }

    #[test]
    fn zero_separation_is_rejected_and_prior_bounds_kept() {
        let m = CalibrationMapper::default();
        let before = m.bounds();
        let err = m.set_calibration_points(&pt(100, 100), &pt(100, 100));
        assert!(matches!(err, Err(Error::Calibration(_))));
        assert_eq!(m.bounds(), before);
        assert!(!m.bounds().is_calibrated);
    }

    #[test]
    fn wide_points_are_accepted() {
        let m = CalibrationMapper::default();
        let b = m.set_calibration_points(&pt(100, 100), &pt(25000, 25000)).unwrap();
        assert!(b.is_calibrated);
        assert_eq!((b.min_x, b.max_x, b.min_y, b.max_y), (100.0, 25000.0, 100.0, 25000.0));
        assert_eq!(m.bounds(), b);
    }

    #[test]
    fn point_order_does_not_matter() {
        let m = CalibrationMapper::default();
        let b = m.set_calibration_points(&pt(25000, 100), &pt(100, 25000)).unwrap();
        assert_eq!((b.min_x, b.max_x, b.min_y, b.max_y), (100.0, 25000.0, 100.0, 25000.0));
    }

    #[test]
    fn rejection_keeps_a_previous_calibration() {
        let m = CalibrationMapper::default();
        let good = m.set_calibration_points(&pt(100, 100), &pt(25000, 25000)).unwrap();
        assert!(m.set_calibration_points(&pt(100, 100), &pt(15000, 25000)).is_err());
        assert_eq!(m.bounds(), good);
    }

    #[test]
    fn points_outside_the_valid_range_are_rejected() {
        let m = CalibrationMapper::default();
        assert!(m.set_calibration_points(&pt(50, 100), &pt(25000, 25000)).is_err());
        assert!(m.set_calibration_points(&pt(100, 100), &pt(25000, 31000)).is_err());
    }

    #[test]
    fn normalization() {
        let m = CalibrationMapper::default();
        let (nx, ny) = m.convert_to_normalized(&pt(16384, 0));
        assert!((nx - 0.5).abs() < 1e-6);
        assert_eq!(ny, 0.0);

        m.set_calibration_points(&pt(1000, 1000), &pt(21000, 21000)).unwrap();
        let (nx, ny) = m.convert_to_normalized(&pt(11000, 1000));
        assert!((nx - 0.5).abs() < 1e-6);
        assert_eq!(ny, 0.0);
        assert_eq!(m.convert_to_normalized(&pt(60000, 0)), (1.0, 0.0));
    }

    #[test]
    fn store_round_trip() {
        let path = temp_path("roundtrip");
        let store = CalibrationStore::new(&path);
        let m = CalibrationMapper::default().with_store(store.clone());
        let b = m.set_calibration_points(&pt(200, 300), &pt(29000, 28000)).unwrap();

        let fresh = CalibrationMapper::default().with_store(store);
        assert!(fresh.load());
        assert_eq!(fresh.bounds(), b);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn missing_file_keeps_defaults() {
        let m = CalibrationMapper::default().with_store(CalibrationStore::new(temp_path("missing")));
        assert!(!m.load());
        assert_eq!(m.bounds(), CalibrationBounds::default());
    }

    #[test]
    fn malformed_or_incomplete_files_keep_defaults() {
        for (tag, body) in [
            ("garbage", "this is = = not toml"),
            ("nobounds", "version = \"1.0\"\n"),
            ("partial", "[bounds]\nmin_x = 1.0\nmax_x = 2.0\n"),
            ("inverted", "[bounds]\nmin_x = 900.0\nmax_x = 2.0\nmin_y = 1.0\nmax_y = 2.0\n"),
            ("narrow", "[bounds]\nmin_x = 1.0\nmax_x = 2.0\nmin_y = 1.0\nmax_y = 25000.0\n"),
        ] {
            let path = temp_path(tag);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, body).unwrap();

            let m = CalibrationMapper::default().with_store(CalibrationStore::new(&path));
            assert!(!m.load(), "{tag}");
            assert_eq!(m.bounds(), CalibrationBounds::default(), "{tag}");

            let _ = std::fs::remove_dir_all(path.parent().unwrap());
        }
    }
}
