// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types for device capabilities.
//!
//! Each type ensures values are within their valid ranges at construction
//! time, so validation happens before any device lock is taken.
//!
//! # Types
//!
//! - [`Capability`] - Bridge-facing capability names
//! - [`CapabilityValue`] - Boolean or integer capability value
//! - [`Brightness`] - Brightness level (0-100%)
//! - [`ColorTemperature`] - Color temperature in Kelvin (2500-9000)
//! - [`Hsv`] - Hue (0-360) and saturation (0-100)
//! - [`FanSpeedLevel`] - Ordinal fan speed (0-4) with percentage mapping

mod brightness;
mod capability;
mod color;
mod fan_speed;

pub use brightness::Brightness;
pub use capability::{Capability, CapabilityValue, UnknownCapability};
pub use color::{ColorTemperature, Hsv};
pub use fan_speed::FanSpeedLevel;
