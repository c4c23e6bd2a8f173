//! Volume snapshots.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Output volume in percent, always within `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub struct VolumeLevel(u8);

impl VolumeLevel {
    pub const MIN: VolumeLevel = VolumeLevel(0);
    pub const MAX: VolumeLevel = VolumeLevel(100);

    /// Clamps any requested level into range.
    pub fn new(percent: i32) -> Self {
        VolumeLevel(percent.clamp(0, 100) as u8)
    }

    pub fn percent(&self) -> u8 {
        self.0
    }

    /// Level after applying a signed delta, clamped.
    pub fn adjusted(&self, delta: i32) -> Self {
        VolumeLevel::new(i32::from(self.0).saturating_add(delta))
    }
}

impl From<i32> for VolumeLevel {
    fn from(percent: i32) -> Self {
        VolumeLevel::new(percent)
    }
}

impl From<VolumeLevel> for i32 {
    fn from(level: VolumeLevel) -> Self {
        i32::from(level.0)
    }
}

impl fmt::Display for VolumeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Body of `GET /api/volume`.
///
/// A best-effort snapshot: other applications and hardware keys change the
/// volume out of band, and a read issued sooner than `repoll_after_ms` after
/// a mutation may not reflect it yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeResponse {
    pub volume: VolumeLevel,
    pub repoll_after_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clamps() {
        assert_eq!(VolumeLevel::new(101).percent(), 100);
        assert_eq!(VolumeLevel::new(-3).percent(), 0);
        assert_eq!(VolumeLevel::new(42).percent(), 42);
    }

    #[test]
    fn test_adjusted_saturates_at_bounds() {
        assert_eq!(VolumeLevel::new(99).adjusted(2), VolumeLevel::MAX);
        assert_eq!(VolumeLevel::new(1).adjusted(-2), VolumeLevel::MIN);
        assert_eq!(VolumeLevel::new(50).adjusted(i32::MAX), VolumeLevel::MAX);
    }

    #[test]
    fn test_deserialize_out_of_range_is_clamped() {
        let level: VolumeLevel = serde_json::from_str("150").unwrap();
        assert_eq!(level, VolumeLevel::MAX);
        assert_eq!(serde_json::to_string(&VolumeLevel::new(7)).unwrap(), "7");
    }
}
