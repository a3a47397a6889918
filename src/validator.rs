//! Coordinate validation.
//!
//! Touchscreen controllers report wildly different raw ranges, so the plausible
//! range is always an explicit value passed to whoever needs it rather than a
//! global constant.

use serde::{Deserialize, Serialize};

/// Inclusive `[min, max]` range applied to both axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinateRange {
    pub min: u16,
    pub max: u16,
}

impl CoordinateRange {
    /// Range used to filter noise from multi-touch digitizer reports.
    pub const DIGITIZER: CoordinateRange = CoordinateRange::new(0, 60000);

    /// Range a sample must fall in to be accepted as a calibration point.
    pub const SAMPLE: CoordinateRange = CoordinateRange::new(100, 30000);

    pub const fn new(min: u16, max: u16) -> Self {
        Self { min, max }
    }

    /// `true` if both coordinates lie in the range (bounds inclusive).
    #[inline]
    pub fn contains(&self, x: u16, y: u16) -> bool {
        self.contains_axis(x) && self.contains_axis(y)
    }

    #[inline]
    pub fn contains_axis(&self, v: u16) -> bool {
        v >= self.min && v <= self.max
    }
}

impl Default for CoordinateRange {
    fn default() -> Self {
        Self::DIGITIZER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_are_inclusive() {
        let r = CoordinateRange::new(100, 30000);
        assert!(r.contains(100, 100));
        assert!(r.contains(30000, 30000));
        assert!(r.contains(100, 30000));
        assert!(!r.contains(99, 500));
        assert!(!r.contains(500, 30001));
    }

    #[test]
    fn membership_is_monotone() {
        let r = CoordinateRange::new(100, 30000);
        let mut prev_inside = false;
        let mut transitions = 0;
        for v in (0..=u16::MAX).step_by(7) {
            let inside = r.contains_axis(v);
            assert_eq!(inside, (100..=30000).contains(&v));
            if inside != prev_inside {
                transitions += 1;
            }
            prev_inside = inside;
        }
        // outside -> inside -> outside
        assert_eq!(transitions, 2);
    }

    #[test]
    fn full_width_range_accepts_everything() {
        let r = CoordinateRange::new(0, u16::MAX);
        assert!(r.contains(0, u16::MAX));
    }
}
