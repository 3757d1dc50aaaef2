// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device-control backend interface.
//!
//! The synchronization core never talks to devices itself. It calls a
//! [`DeviceBackend`], which fetches state snapshots, applies control
//! commands and enumerates devices.
//!
//! # Backends
//!
//! - [`HttpBackend`]: JSON API of the local Kasa sidecar service (feature `http`)
//!
//! Capability writes are translated into the backend's vocabulary by
//! [`ControlCommand::for_capability`].

#[cfg(feature = "http")]
mod http;
#[cfg(test)]
pub(crate) mod mock;
#[cfg(feature = "http")]
mod wire;

#[cfg(feature = "http")]
pub use http::{HttpBackend, HttpBackendConfig};

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::{BackendError, ValueError};
use crate::event::DeviceId;
use crate::state::DeviceState;
use crate::types::{Capability, CapabilityValue, FanSpeedLevel};

/// Connection parameters of one device, opaque to the core.
///
/// Handed back to the backend verbatim on every call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionParams(serde_json::Value);

impl ConnectionParams {
    /// Wraps a JSON document.
    #[must_use]
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Returns the `host` field, if present.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.0.get("host").and_then(serde_json::Value::as_str)
    }

    /// Returns the underlying JSON document.
    #[must_use]
    pub fn as_json(&self) -> &serde_json::Value {
        &self.0
    }
}

impl From<serde_json::Value> for ConnectionParams {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// Field names of the backend's control vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlField {
    /// Power state.
    State,
    /// Brightness percentage.
    Brightness,
    /// Color temperature in Kelvin.
    ColorTemp,
    /// Hue in degrees.
    Hue,
    /// Saturation percentage.
    Saturation,
    /// Ordinal fan speed.
    FanSpeedLevel,
}

impl ControlField {
    /// Returns the wire name of the field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::State => "state",
            Self::Brightness => "brightness",
            Self::ColorTemp => "color_temp",
            Self::Hue => "hue",
            Self::Saturation => "saturation",
            Self::FanSpeedLevel => "fan_speed_level",
        }
    }
}

impl fmt::Display for ControlField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value carried by a [`ControlCommand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlValue {
    /// Power state.
    Bool(bool),
    /// Numeric setting.
    Int(i64),
}

impl fmt::Display for ControlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(v) => write!(f, "{v}"),
        }
    }
}

/// A single write in backend terms.
///
/// # Examples
///
/// ```
/// use kasa_sync::backend::{ControlCommand, ControlField, ControlValue};
/// use kasa_sync::types::{Capability, CapabilityValue};
///
/// let cmd = ControlCommand::for_capability(
///     Capability::RotationSpeed,
///     CapabilityValue::Int(40),
///     None,
/// )
/// .unwrap();
/// assert_eq!(cmd.field, ControlField::FanSpeedLevel);
/// assert_eq!(cmd.value, ControlValue::Int(2));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlCommand {
    /// The field to change.
    pub field: ControlField,
    /// The new value.
    pub value: ControlValue,
    /// Position of the addressed child, `None` for the device itself.
    pub child_index: Option<usize>,
}

impl ControlCommand {
    /// Translates a capability write into the backend vocabulary.
    ///
    /// `On` and `Active` map to `state`; `RotationSpeed` maps to
    /// `fan_speed_level` after bucketing the percentage into 0-4.
    ///
    /// # Errors
    ///
    /// Returns a [`ValueError`] if `value` is not acceptable for
    /// `capability`, including writes to read-only capabilities.
    pub fn for_capability(
        capability: Capability,
        value: CapabilityValue,
        child_index: Option<usize>,
    ) -> Result<Self, ValueError> {
        let value = capability.validate(value)?;

        let (field, value) = match (capability, value) {
            (Capability::On, CapabilityValue::Bool(on)) => {
                (ControlField::State, ControlValue::Bool(on))
            }
            (Capability::Active, CapabilityValue::Int(flag)) => {
                (ControlField::State, ControlValue::Bool(flag != 0))
            }
            (Capability::Brightness, CapabilityValue::Int(v)) => {
                (ControlField::Brightness, ControlValue::Int(v))
            }
            (Capability::ColorTemperature, CapabilityValue::Int(v)) => {
                (ControlField::ColorTemp, ControlValue::Int(v))
            }
            (Capability::Hue, CapabilityValue::Int(v)) => (ControlField::Hue, ControlValue::Int(v)),
            (Capability::Saturation, CapabilityValue::Int(v)) => {
                (ControlField::Saturation, ControlValue::Int(v))
            }
            (Capability::RotationSpeed, CapabilityValue::Int(v)) => {
                let level = FanSpeedLevel::from_percentage(v)?;
                (
                    ControlField::FanSpeedLevel,
                    ControlValue::Int(i64::from(level.value())),
                )
            }
            (capability, value) => {
                return Err(ValueError::InvalidType {
                    capability,
                    expected: "a writable value",
                    actual: value.to_string(),
                });
            }
        };

        Ok(Self {
            field,
            value,
            child_index,
        })
    }
}

/// A device reported by a discovery sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredDevice {
    /// Stable device identifier.
    pub id: DeviceId,
    /// User-visible name.
    pub alias: String,
    /// Hardware address, used by the include/exclude filters.
    pub mac: Option<String>,
    /// Model name, if reported.
    pub model: Option<String>,
    /// Connection parameters for subsequent calls.
    pub connection: ConnectionParams,
    /// State at discovery time.
    pub state: DeviceState,
}

/// The device-control collaborator.
///
/// Implementations perform the actual network I/O. Every future they return
/// must be `Send`, since the coordinator drives them from spawned tasks.
pub trait DeviceBackend: Send + Sync + 'static {
    /// Fetches a fresh state snapshot.
    fn fetch_state(
        &self,
        connection: &ConnectionParams,
    ) -> impl Future<Output = Result<DeviceState, BackendError>> + Send;

    /// Applies one control command.
    fn apply_command(
        &self,
        connection: &ConnectionParams,
        command: &ControlCommand,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Enumerates the devices currently reachable.
    fn discover(&self) -> impl Future<Output = Result<Vec<DiscoveredDevice>, BackendError>> + Send;
}
