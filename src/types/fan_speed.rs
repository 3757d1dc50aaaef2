// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fan speed type.
//!
//! The bridge speaks in rotation-speed percentages (0-100) while the
//! backend expects an ordinal speed level (0-4). [`FanSpeedLevel`] converts
//! between the two.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValueError;

/// Ordinal fan speed level (0 = stopped, 4 = fastest).
///
/// # Examples
///
/// ```
/// use kasa_sync::types::FanSpeedLevel;
///
/// let level = FanSpeedLevel::from_percentage(60).unwrap();
/// assert_eq!(level.value(), 3);
/// assert_eq!(level.to_percentage(), 75);
///
/// assert_eq!(FanSpeedLevel::from_percentage(0).unwrap(), FanSpeedLevel::OFF);
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FanSpeedLevel(u8);

impl FanSpeedLevel {
    /// Highest speed level.
    pub const MAX_LEVEL: u8 = 4;

    /// Percentage covered by each speed step.
    const STEP: i64 = 25;

    /// Fan stopped.
    pub const OFF: Self = Self(0);

    /// Fastest speed.
    pub const FULL: Self = Self(Self::MAX_LEVEL);

    /// Creates a speed level.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::OutOfRange` if value is outside [0, 4].
    pub fn new(value: u8) -> Result<Self, ValueError> {
        if value > Self::MAX_LEVEL {
            return Err(ValueError::OutOfRange {
                min: 0,
                max: i64::from(Self::MAX_LEVEL),
                actual: i64::from(value),
            });
        }
        Ok(Self(value))
    }

    /// Maps a rotation-speed percentage onto a speed level.
    ///
    /// 0 maps to 0; 1-25 to 1; 26-50 to 2; 51-75 to 3; 76-100 to 4.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::OutOfRange` if the percentage is outside [0, 100].
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_percentage(percentage: i64) -> Result<Self, ValueError> {
        if !(0..=100).contains(&percentage) {
            return Err(ValueError::OutOfRange {
                min: 0,
                max: 100,
                actual: percentage,
            });
        }
        // ceil(percentage / 25), bounded above by MAX_LEVEL
        let level = (percentage + Self::STEP - 1) / Self::STEP;
        Ok(Self(level as u8))
    }

    /// Returns the speed level.
    #[must_use]
    pub const fn value(&self) -> u8 {
        self.0
    }

    /// Returns the percentage reported to the bridge for this level: the
    /// upper bound of the level's bucket.
    #[must_use]
    pub fn to_percentage(&self) -> u8 {
        self.0 * 25
    }

    /// Returns `true` when the fan is running.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for FanSpeedLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "level {}", self.0)
    }
}

impl TryFrom<u8> for FanSpeedLevel {
    type Error = ValueError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(percentage: i64) -> u8 {
        FanSpeedLevel::from_percentage(percentage).unwrap().value()
    }

    #[test]
    fn percentage_buckets() {
        assert_eq!(level(0), 0);
        assert_eq!(level(1), 1);
        assert_eq!(level(13), 1);
        assert_eq!(level(25), 1);
        assert_eq!(level(26), 2);
        assert_eq!(level(50), 2);
        assert_eq!(level(51), 3);
        assert_eq!(level(75), 3);
        assert_eq!(level(76), 4);
        assert_eq!(level(100), 4);
    }

    #[test]
    fn every_percentage_stays_in_level_range() {
        for p in 0..=100 {
            assert!(level(p) <= FanSpeedLevel::MAX_LEVEL);
        }
    }

    #[test]
    fn percentage_out_of_range() {
        assert!(FanSpeedLevel::from_percentage(-1).is_err());
        assert!(FanSpeedLevel::from_percentage(101).is_err());
    }

    #[test]
    fn level_reports_bucket_upper_bound() {
        assert_eq!(FanSpeedLevel::OFF.to_percentage(), 0);
        assert_eq!(FanSpeedLevel::new(2).unwrap().to_percentage(), 50);
        assert_eq!(FanSpeedLevel::FULL.to_percentage(), 100);
    }

    #[test]
    fn written_percentage_lands_in_same_bucket_on_read() {
        for p in 0..=100 {
            let read_back = i64::from(FanSpeedLevel::from_percentage(p).unwrap().to_percentage());
            assert_eq!(level(read_back), level(p));
        }
    }

    #[test]
    fn invalid_level() {
        assert!(FanSpeedLevel::new(5).is_err());
        assert!(!FanSpeedLevel::OFF.is_running());
    }
}
