// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Capability names and values exchanged with the bridge.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Brightness, ColorTemperature, FanSpeedLevel, Hsv};
use crate::error::ValueError;

/// A single observable or controllable property of a device endpoint.
///
/// The string form matches the characteristic names used by the bridge.
///
/// # Examples
///
/// ```
/// use kasa_sync::types::{Capability, CapabilityValue};
///
/// let cap: Capability = "RotationSpeed".parse().unwrap();
/// assert_eq!(cap, Capability::RotationSpeed);
/// assert_eq!(cap.default_value(), CapabilityValue::Int(0));
/// assert!(Capability::OutletInUse.is_read_only());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Capability {
    /// Power state.
    On,
    /// Whether the outlet is drawing power; mirrors `On`.
    OutletInUse,
    /// Light brightness percentage.
    Brightness,
    /// Light color temperature in Kelvin.
    ColorTemperature,
    /// Light hue in degrees.
    Hue,
    /// Light saturation percentage.
    Saturation,
    /// Fan running state (0 or 1).
    Active,
    /// Fan rotation speed percentage.
    RotationSpeed,
}

impl Capability {
    /// All capabilities in diff order.
    pub const ALL: [Self; 8] = [
        Self::On,
        Self::OutletInUse,
        Self::Brightness,
        Self::ColorTemperature,
        Self::Hue,
        Self::Saturation,
        Self::Active,
        Self::RotationSpeed,
    ];

    /// Returns the bridge-facing name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::On => "On",
            Self::OutletInUse => "OutletInUse",
            Self::Brightness => "Brightness",
            Self::ColorTemperature => "ColorTemperature",
            Self::Hue => "Hue",
            Self::Saturation => "Saturation",
            Self::Active => "Active",
            Self::RotationSpeed => "RotationSpeed",
        }
    }

    /// Returns `true` if the capability cannot be written.
    #[must_use]
    pub const fn is_read_only(self) -> bool {
        matches!(self, Self::OutletInUse)
    }

    /// Returns the value reported when the device is offline or the
    /// platform is shutting down.
    #[must_use]
    pub const fn default_value(self) -> CapabilityValue {
        match self {
            Self::On | Self::OutletInUse => CapabilityValue::Bool(false),
            _ => CapabilityValue::Int(0),
        }
    }

    /// Checks that `value` is acceptable for this capability and returns
    /// it in canonical form.
    ///
    /// `Active` accepts a boolean and normalizes it to 0/1.
    ///
    /// # Errors
    ///
    /// - [`ValueError::ReadOnly`] for read-only capabilities
    /// - [`ValueError::InvalidType`] when the value has the wrong type
    /// - [`ValueError::OutOfRange`] when a number is outside the domain
    pub fn validate(self, value: CapabilityValue) -> Result<CapabilityValue, ValueError> {
        if self.is_read_only() {
            return Err(ValueError::ReadOnly(self));
        }

        match (self, value) {
            (Self::On, CapabilityValue::Bool(_)) => Ok(value),
            (Self::On, other) => Err(self.invalid_type("a boolean", other)),
            (Self::Active, CapabilityValue::Bool(b)) => Ok(CapabilityValue::Int(i64::from(b))),
            (Self::Active, CapabilityValue::Int(v)) => {
                if v == 0 || v == 1 {
                    Ok(value)
                } else {
                    Err(ValueError::OutOfRange {
                        min: 0,
                        max: 1,
                        actual: v,
                    })
                }
            }
            (_, CapabilityValue::Bool(_)) => Err(self.invalid_type("an integer", value)),
            (_, CapabilityValue::Int(v)) => {
                match self {
                    Self::Brightness => {
                        Brightness::from_i64(v)?;
                    }
                    Self::ColorTemperature => {
                        ColorTemperature::from_i64(v)?;
                    }
                    Self::Hue => {
                        Hsv::check_hue(v)?;
                    }
                    Self::Saturation => {
                        Hsv::check_saturation(v)?;
                    }
                    Self::RotationSpeed => {
                        FanSpeedLevel::from_percentage(v)?;
                    }
                    Self::On | Self::OutletInUse | Self::Active => {}
                }
                Ok(value)
            }
        }
    }

    fn invalid_type(self, expected: &'static str, actual: CapabilityValue) -> ValueError {
        ValueError::InvalidType {
            capability: self,
            expected,
            actual: actual.to_string(),
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown capability name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCapability(pub String);

impl fmt::Display for UnknownCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown capability: {}", self.0)
    }
}

impl std::error::Error for UnknownCapability {}

impl FromStr for Capability {
    type Err = UnknownCapability;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|cap| cap.name() == s)
            .ok_or_else(|| UnknownCapability(s.to_string()))
    }
}

/// A capability value as seen by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CapabilityValue {
    /// Boolean value (`On`, `OutletInUse`).
    Bool(bool),
    /// Integer value (percentages, Kelvin, degrees, 0/1 flags).
    Int(i64),
}

impl CapabilityValue {
    /// Returns the boolean, if this is a boolean value.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(_) => None,
        }
    }

    /// Returns the integer, if this is an integer value.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Bool(_) => None,
        }
    }
}

impl fmt::Display for CapabilityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for CapabilityValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for CapabilityValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for CapabilityValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u8> for CapabilityValue {
    fn from(value: u8) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u16> for CapabilityValue {
    fn from(value: u16) -> Self {
        Self::Int(i64::from(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_from_str() {
        for cap in Capability::ALL {
            assert_eq!(cap.name().parse::<Capability>().unwrap(), cap);
        }
        assert!("Volume".parse::<Capability>().is_err());
    }

    #[test]
    fn defaults() {
        assert_eq!(Capability::On.default_value(), CapabilityValue::Bool(false));
        assert_eq!(
            Capability::OutletInUse.default_value(),
            CapabilityValue::Bool(false)
        );
        assert_eq!(
            Capability::RotationSpeed.default_value(),
            CapabilityValue::Int(0)
        );
        assert_eq!(Capability::Hue.default_value(), CapabilityValue::Int(0));
    }

    #[test]
    fn on_requires_boolean() {
        assert!(Capability::On.validate(true.into()).is_ok());

        let err = Capability::On.validate(CapabilityValue::Int(1)).unwrap_err();
        assert_eq!(
            err,
            ValueError::InvalidType {
                capability: Capability::On,
                expected: "a boolean",
                actual: "1".to_string(),
            }
        );
    }

    #[test]
    fn numeric_capabilities_reject_booleans() {
        assert!(matches!(
            Capability::Brightness.validate(true.into()),
            Err(ValueError::InvalidType { .. })
        ));
    }

    #[test]
    fn ranges_are_enforced() {
        assert!(Capability::Brightness.validate(100.into()).is_ok());
        assert!(Capability::Brightness.validate(101.into()).is_err());
        assert!(Capability::ColorTemperature.validate(2000.into()).is_err());
        assert!(Capability::ColorTemperature.validate(6500.into()).is_ok());
        assert!(Capability::Hue.validate(360.into()).is_ok());
        assert!(Capability::Hue.validate(361.into()).is_err());
        assert!(Capability::Saturation.validate((-1).into()).is_err());
        assert!(Capability::RotationSpeed.validate(100.into()).is_ok());
        assert!(Capability::RotationSpeed.validate(101.into()).is_err());
    }

    #[test]
    fn active_accepts_flag_or_boolean() {
        assert_eq!(
            Capability::Active.validate(true.into()).unwrap(),
            CapabilityValue::Int(1)
        );
        assert_eq!(
            Capability::Active.validate(0.into()).unwrap(),
            CapabilityValue::Int(0)
        );
        assert!(Capability::Active.validate(2.into()).is_err());
    }

    #[test]
    fn outlet_in_use_is_read_only() {
        assert_eq!(
            Capability::OutletInUse.validate(true.into()),
            Err(ValueError::ReadOnly(Capability::OutletInUse))
        );
    }

    #[test]
    fn value_serializes_untagged() {
        assert_eq!(
            serde_json::to_string(&CapabilityValue::Bool(true)).unwrap(),
            "true"
        );
        let v: CapabilityValue = serde_json::from_str("42").unwrap();
        assert_eq!(v, CapabilityValue::Int(42));
    }
}
