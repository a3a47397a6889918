//! Report decoding.
//!
//! Every supported touchscreen has a hand-written byte layout; there is no
//! descriptor-driven decode. Dispatch is a `match` on [`DeviceFamily`], which is
//! resolved once from the device identity.
//!
//! Decoding is pure: no I/O, no shared state, no allocation beyond the returned
//! `Vec`. Anything that does not look exactly like a known report (wrong report
//! id, too short) produces zero samples instead of a partial parse.

use crate::device::{DeviceFamily, DeviceIdentity};
use crate::touch::TouchSample;
use crate::validator::CoordinateRange;
use log::trace;

/// Report id both families use for touch input.
pub const TOUCH_REPORT_ID: u8 = 1;

/// Minimum length of an ELO touch report, report id included.
pub const ELO_MIN_REPORT_LEN: usize = 59;

/// Minimum length of a standard digitizer report, report id included.
pub const DIGITIZER_MIN_REPORT_LEN: usize = 44;

/// Bytes per digitizer touch point: flags, X lo/hi, Y lo/hi.
pub const DIGITIZER_POINT_STRIDE: usize = 5;

/// Default cap on digitizer points parsed per report.
pub const DEFAULT_MAX_TOUCH_POINTS: usize = 10;

// ELO coordinates are "active" strictly inside (0, 32000).
const ELO_ACTIVE_LIMIT: u16 = 32000;
const ELO_X_OFFSET: usize = 2;
const ELO_Y_OFFSET: usize = 6;
const ELO_FLAG_OFFSET: usize = 58;

const TIP_SWITCH: u8 = 0x01;
const CONTACT_ID_SHIFT: u8 = 3;
const CONTACT_ID_MASK: u8 = 0x1F;

/// Contact-state byte carried at offset 58 of ELO reports.
///
/// Diagnostic only; the coordinate test decides activity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EloContactFlag {
    Released,
    Touching,
    Other(u8),
}

impl From<u8> for EloContactFlag {
    fn from(v: u8) -> Self {
        match v {
            0x01 => EloContactFlag::Released,
            0x02 => EloContactFlag::Touching,
            other => EloContactFlag::Other(other),
        }
    }
}

/// Stateless decoder configured for one connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReportDecoder {
    /// Range digitizer points must fall in to be reported.
    pub digitizer_range: CoordinateRange,
    /// Upper bound on digitizer points parsed per report. Lower values shave a
    /// little latency but miss later fingers.
    pub max_touch_points: usize,
}

impl Default for ReportDecoder {
    fn default() -> Self {
        Self {
            digitizer_range: CoordinateRange::DIGITIZER,
            max_touch_points: DEFAULT_MAX_TOUCH_POINTS,
        }
    }
}

impl ReportDecoder {
    pub fn new(digitizer_range: CoordinateRange, max_touch_points: usize) -> Self {
        Self {
            digitizer_range,
            max_touch_points,
        }
    }

    /// Decode `report` (report id in byte 0) for `device`.
    pub fn decode_for(
        &self,
        device: &DeviceIdentity,
        report: &[u8],
        timestamp_ms: u64,
    ) -> Vec<TouchSample> {
        self.decode(device.family(), report, timestamp_ms)
    }

    /// `true` if `report` has the report id and minimum length `family` expects.
    ///
    /// Anything else is noise and should not touch published state.
    pub fn recognizes(&self, family: DeviceFamily, report: &[u8]) -> bool {
        let min_len = match family {
            DeviceFamily::EloTouch => ELO_MIN_REPORT_LEN,
            DeviceFamily::StandardDigitizer => DIGITIZER_MIN_REPORT_LEN,
            DeviceFamily::Unknown => return false,
        };
        report.len() >= min_len && report[0] == TOUCH_REPORT_ID
    }

    /// Decode `report` (report id in byte 0) using `family`'s layout.
    pub fn decode(&self, family: DeviceFamily, report: &[u8], timestamp_ms: u64) -> Vec<TouchSample> {
        match family {
            DeviceFamily::EloTouch => decode_elo(report, timestamp_ms).into_iter().collect(),
            DeviceFamily::StandardDigitizer => self.decode_digitizer(report, timestamp_ms),
            DeviceFamily::Unknown => Vec::new(),
        }
    }

    /// Active, in-range points of a standard multi-touch digitizer report.
    ///
    /// Layout after the report id, per point:
    /// - byte 0: bit 0 tip switch, bits 3..=7 contact id
    /// - bytes 1..=2: X, little-endian
    /// - bytes 3..=4: Y, little-endian
    ///
    /// The final report byte is the contact count and is never read as point data.
    pub fn decode_digitizer(&self, report: &[u8], timestamp_ms: u64) -> Vec<TouchSample> {
        let mut touches = Vec::new();
        if report.len() < DIGITIZER_MIN_REPORT_LEN || report[0] != TOUCH_REPORT_ID {
            return touches;
        }

        trace!(
            "digitizer report len={} contact_count={}",
            report.len(),
            report[report.len() - 1]
        );

        for i in 0..self.max_touch_points {
            let offset = 1 + i * DIGITIZER_POINT_STRIDE;
            if offset + DIGITIZER_POINT_STRIDE >= report.len() {
                break;
            }
            let point = &report[offset..offset + DIGITIZER_POINT_STRIDE];

            if point[0] & TIP_SWITCH == 0 {
                continue;
            }
            let contact_id = (point[0] >> CONTACT_ID_SHIFT) & CONTACT_ID_MASK;
            let x = u16::from_le_bytes([point[1], point[2]]);
            let y = u16::from_le_bytes([point[3], point[4]]);

            if self.digitizer_range.contains(x, y) {
                touches.push(TouchSample::new(x, y, true, contact_id, timestamp_ms));
            } else {
                trace!("point {i} id={contact_id} out of range x={x} y={y}");
            }
        }
        touches
    }
}

/// Primary touch of an ELO report. `None` for short or foreign reports.
///
/// Always a single sample with contact id 0; `active` is the coordinate test.
pub fn decode_elo(report: &[u8], timestamp_ms: u64) -> Option<TouchSample> {
    if report.len() < ELO_MIN_REPORT_LEN || report[0] != TOUCH_REPORT_ID {
        return None;
    }

    let x = u16::from_le_bytes([report[ELO_X_OFFSET], report[ELO_X_OFFSET + 1]]);
    let y = u16::from_le_bytes([report[ELO_Y_OFFSET], report[ELO_Y_OFFSET + 1]]);
    let active = elo_is_active(x) && elo_is_active(y);

    trace!(
        "elo report x={x} y={y} active={active} flag={:?}",
        EloContactFlag::from(report[ELO_FLAG_OFFSET])
    );

    Some(TouchSample::new(x, y, active, 0, timestamp_ms))
}

/// Contact-state flag of an ELO report, if the report is long enough.
pub fn elo_contact_flag(report: &[u8]) -> Option<EloContactFlag> {
    report.get(ELO_FLAG_OFFSET).copied().map(EloContactFlag::from)
}

#[inline]
fn elo_is_active(v: u16) -> bool {
    v > 0 && v < ELO_ACTIVE_LIMIT
}
