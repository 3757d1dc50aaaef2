// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Color types for light control.
//!
//! This module provides types for color temperature and hue/saturation
//! control on color-capable bulbs and light strips.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValueError;

/// Color temperature in Kelvin (2500-9000).
///
/// # Examples
///
/// ```
/// use kasa_sync::types::ColorTemperature;
///
/// let ct = ColorTemperature::new(4000).unwrap();
/// assert_eq!(ct.kelvin(), 4000);
///
/// assert!(ColorTemperature::new(2000).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColorTemperature(u16);

impl ColorTemperature {
    /// Warmest supported temperature.
    pub const MIN: u16 = 2500;

    /// Coolest supported temperature.
    pub const MAX: u16 = 9000;

    /// Warm white (~2700K).
    pub const WARM: Self = Self(2700);

    /// Neutral white (~4000K).
    pub const NEUTRAL: Self = Self(4000);

    /// Daylight (~6500K).
    pub const DAYLIGHT: Self = Self(6500);

    /// Creates a new color temperature value.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::OutOfRange` if value is outside [2500, 9000].
    pub fn new(kelvin: u16) -> Result<Self, ValueError> {
        Self::from_i64(i64::from(kelvin))
    }

    /// Creates a color temperature from a wide integer.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::OutOfRange` if value is outside [2500, 9000].
    pub fn from_i64(kelvin: i64) -> Result<Self, ValueError> {
        u16::try_from(kelvin)
            .ok()
            .filter(|k| (Self::MIN..=Self::MAX).contains(k))
            .map(Self)
            .ok_or(ValueError::OutOfRange {
                min: i64::from(Self::MIN),
                max: i64::from(Self::MAX),
                actual: kelvin,
            })
    }

    /// Creates a color temperature, clamping to the valid range.
    ///
    /// Devices report 0 while in color mode; that clamps to [`Self::MIN`].
    #[must_use]
    pub const fn clamped(kelvin: u16) -> Self {
        if kelvin < Self::MIN {
            Self(Self::MIN)
        } else if kelvin > Self::MAX {
            Self(Self::MAX)
        } else {
            Self(kelvin)
        }
    }

    /// Returns the color temperature in Kelvin.
    #[must_use]
    pub const fn kelvin(&self) -> u16 {
        self.0
    }
}

impl Default for ColorTemperature {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

impl fmt::Display for ColorTemperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}K", self.0)
    }
}

/// Hue and saturation of a color light.
///
/// Brightness is tracked separately as [`Brightness`](super::Brightness).
///
/// ```
/// use kasa_sync::types::Hsv;
///
/// let red = Hsv::new(0, 100).unwrap();
/// let teal = red.with_hue(180).unwrap();
/// assert_eq!(teal.hue(), 180);
/// assert_eq!(teal.saturation(), 100);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Hsv {
    hue: u16,
    saturation: u8,
}

impl Hsv {
    /// Maximum hue in degrees.
    pub const MAX_HUE: u16 = 360;

    /// Maximum saturation percentage.
    pub const MAX_SATURATION: u8 = 100;

    /// Creates a hue/saturation pair.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::OutOfRange` if hue exceeds 360 or saturation
    /// exceeds 100.
    pub fn new(hue: u16, saturation: u8) -> Result<Self, ValueError> {
        Ok(Self {
            hue: Self::check_hue(i64::from(hue))?,
            saturation: Self::check_saturation(i64::from(saturation))?,
        })
    }

    /// Returns the hue in degrees.
    #[must_use]
    pub const fn hue(&self) -> u16 {
        self.hue
    }

    /// Returns the saturation percentage.
    #[must_use]
    pub const fn saturation(&self) -> u8 {
        self.saturation
    }

    /// Returns a copy with a different hue.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::OutOfRange` if hue exceeds 360.
    pub fn with_hue(&self, hue: u16) -> Result<Self, ValueError> {
        Self::new(hue, self.saturation)
    }

    /// Returns a copy with a different saturation.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::OutOfRange` if saturation exceeds 100.
    pub fn with_saturation(&self, saturation: u8) -> Result<Self, ValueError> {
        Self::new(self.hue, saturation)
    }

    pub(crate) fn check_hue(hue: i64) -> Result<u16, ValueError> {
        u16::try_from(hue)
            .ok()
            .filter(|h| *h <= Self::MAX_HUE)
            .ok_or(ValueError::OutOfRange {
                min: 0,
                max: i64::from(Self::MAX_HUE),
                actual: hue,
            })
    }

    pub(crate) fn check_saturation(saturation: i64) -> Result<u8, ValueError> {
        u8::try_from(saturation)
            .ok()
            .filter(|s| *s <= Self::MAX_SATURATION)
            .ok_or(ValueError::OutOfRange {
                min: 0,
                max: i64::from(Self::MAX_SATURATION),
                actual: saturation,
            })
    }
}

impl fmt::Display for Hsv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°/{}%", self.hue, self.saturation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_temperature_range() {
        assert!(ColorTemperature::new(2500).is_ok());
        assert!(ColorTemperature::new(9000).is_ok());
        assert!(ColorTemperature::new(2499).is_err());
        assert!(ColorTemperature::from_i64(-5).is_err());
        assert!(ColorTemperature::from_i64(100_000).is_err());
    }

    #[test]
    fn color_temperature_clamped() {
        assert_eq!(ColorTemperature::clamped(0).kelvin(), 2500);
        assert_eq!(ColorTemperature::clamped(12_000).kelvin(), 9000);
        assert_eq!(ColorTemperature::clamped(5000).kelvin(), 5000);
    }

    #[test]
    fn color_temperature_display() {
        assert_eq!(ColorTemperature::WARM.to_string(), "2700K");
    }

    #[test]
    fn hsv_validation() {
        assert!(Hsv::new(360, 100).is_ok());
        assert_eq!(
            Hsv::new(361, 0),
            Err(ValueError::OutOfRange {
                min: 0,
                max: 360,
                actual: 361
            })
        );
        assert!(Hsv::new(0, 101).is_err());
    }

    #[test]
    fn hsv_with_components() {
        let base = Hsv::new(120, 50).unwrap();
        assert_eq!(base.with_saturation(80).unwrap(), Hsv::new(120, 80).unwrap());
        assert!(base.with_hue(400).is_err());
    }

    #[test]
    fn hsv_deserializes_from_backend_shape() {
        let hsv: Hsv = serde_json::from_str(r#"{"hue": 30, "saturation": 75}"#).unwrap();
        assert_eq!(hsv.hue(), 30);
        assert_eq!(hsv.saturation(), 75);
    }
}
