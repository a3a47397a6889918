//! Touch samples and their packed single-word form.
//!
//! A [`TouchSample`] is one decoded contact point. It is a small `Copy` value
//! created fresh for every decoded report and handed across threads by value.
//!
//! ## Packed layout
//! The single-touch publish path stores a sample in one `u64` so a reader can
//! never observe a torn mix of old and new fields. Bits, LSB first:
//!
//! | bits    | field                              |
//! |---------|------------------------------------|
//! | 0..=15  | `x`                                |
//! | 16..=31 | `y`                                |
//! | 32      | `active`                           |
//! | 33..=40 | `contact_id` (8 bits)              |
//! | 41..=63 | `timestamp_ms`, truncated to 23 bits |
//!
//! 23 bits of milliseconds wrap after roughly 2h20m. The packed timestamp is
//! only good for ordering and short deltas.

use crate::validator::CoordinateRange;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Instant;

const X_SHIFT: u32 = 0;
const Y_SHIFT: u32 = 16;
const ACTIVE_SHIFT: u32 = 32;
const CONTACT_SHIFT: u32 = 33;
const TIMESTAMP_SHIFT: u32 = 41;

const COORD_MASK: u64 = 0xFFFF;
const CONTACT_MASK: u64 = 0xFF;

/// Mask applied to `timestamp_ms` when packing.
pub const TIMESTAMP_MASK: u64 = (1 << 23) - 1;

/// Highest contact id a digitizer can encode (5 bits).
pub const MAX_CONTACT_ID: u8 = 31;

/// One decoded contact point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TouchSample {
    /// Raw sensor X.
    pub x: u16,
    /// Raw sensor Y.
    pub y: u16,
    /// A finger or stylus is currently on the surface.
    pub active: bool,
    /// Per-report contact index (0..=31) in the device's own numbering.
    pub contact_id: u8,
    /// Monotonic milliseconds at decode time (see [`now_ms`]).
    pub timestamp_ms: u64,
}

impl TouchSample {
    pub fn new(x: u16, y: u16, active: bool, contact_id: u8, timestamp_ms: u64) -> Self {
        Self {
            x,
            y,
            active,
            contact_id,
            timestamp_ms,
        }
    }

    /// An inactive sample at the given position.
    pub fn released(x: u16, y: u16, timestamp_ms: u64) -> Self {
        Self::new(x, y, false, 0, timestamp_ms)
    }

    /// `true` if both coordinates fall inside `range`.
    #[inline]
    pub fn is_valid_in(&self, range: &CoordinateRange) -> bool {
        range.contains(self.x, self.y)
    }

    /// Validity against [`CoordinateRange::SAMPLE`].
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.is_valid_in(&CoordinateRange::SAMPLE)
    }
}

/// Pack a sample into the single-word layout described in the module docs.
#[inline]
pub fn pack(sample: &TouchSample) -> u64 {
    ((sample.x as u64) << X_SHIFT)
        | ((sample.y as u64) << Y_SHIFT)
        | ((sample.active as u64) << ACTIVE_SHIFT)
        | ((sample.contact_id as u64 & CONTACT_MASK) << CONTACT_SHIFT)
        | ((sample.timestamp_ms & TIMESTAMP_MASK) << TIMESTAMP_SHIFT)
}

/// Inverse of [`pack`]. `timestamp_ms` comes back truncated to 23 bits.
#[inline]
pub fn unpack(word: u64) -> TouchSample {
    TouchSample {
        x: ((word >> X_SHIFT) & COORD_MASK) as u16,
        y: ((word >> Y_SHIFT) & COORD_MASK) as u16,
        active: (word >> ACTIVE_SHIFT) & 1 != 0,
        contact_id: ((word >> CONTACT_SHIFT) & CONTACT_MASK) as u8,
        timestamp_ms: (word >> TIMESTAMP_SHIFT) & TIMESTAMP_MASK,
    }
}

fn epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

/// Monotonic milliseconds since the first call in this process.
pub fn now_ms() -> u64 {
    epoch().elapsed().as_millis() as u64
}
