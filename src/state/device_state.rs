// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device state snapshots.

use std::fmt;

use crate::event::ChildId;
use crate::types::{
    Brightness, Capability, CapabilityValue, ColorTemperature, FanSpeedLevel, Hsv,
};

/// Addresses one switchable channel of a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// The device itself (plugs, bulbs, switches, fans).
    Main,
    /// A child outlet or switch of a multi-channel device.
    Child(ChildId),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => f.write_str("main"),
            Self::Child(id) => write!(f, "child {id}"),
        }
    }
}

impl From<ChildId> for Endpoint {
    fn from(id: ChildId) -> Self {
        Self::Child(id)
    }
}

/// Capability values of a single switchable channel.
///
/// The optional fields determine which capabilities the channel exposes:
/// a fan speed makes it a fan, any light field makes it a light, and a
/// channel with none of them is an outlet.
///
/// # Examples
///
/// ```
/// use kasa_sync::state::ChannelState;
/// use kasa_sync::types::{Brightness, Capability, CapabilityValue};
///
/// let bulb = ChannelState::new(true).with_brightness(Brightness::new(40).unwrap());
/// assert!(bulb.is_light());
/// assert_eq!(bulb.get(Capability::Brightness), Some(CapabilityValue::Int(40)));
/// assert_eq!(bulb.get(Capability::RotationSpeed), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelState {
    /// Power state.
    pub on: bool,
    /// Brightness, for dimmable lights.
    pub brightness: Option<Brightness>,
    /// Color temperature, for tunable-white lights.
    pub color_temperature: Option<ColorTemperature>,
    /// Hue and saturation, for color lights.
    pub hsv: Option<Hsv>,
    /// Speed level, for fans.
    pub fan_speed: Option<FanSpeedLevel>,
}

impl ChannelState {
    /// Creates an outlet channel with the given power state.
    #[must_use]
    pub fn new(on: bool) -> Self {
        Self {
            on,
            ..Self::default()
        }
    }

    /// Sets the brightness.
    #[must_use]
    pub fn with_brightness(mut self, brightness: Brightness) -> Self {
        self.brightness = Some(brightness);
        self
    }

    /// Sets the color temperature.
    #[must_use]
    pub fn with_color_temperature(mut self, ct: ColorTemperature) -> Self {
        self.color_temperature = Some(ct);
        self
    }

    /// Sets hue and saturation.
    #[must_use]
    pub fn with_hsv(mut self, hsv: Hsv) -> Self {
        self.hsv = Some(hsv);
        self
    }

    /// Sets the fan speed level.
    #[must_use]
    pub fn with_fan_speed(mut self, level: FanSpeedLevel) -> Self {
        self.fan_speed = Some(level);
        self
    }

    /// Returns `true` if the channel drives a fan.
    #[must_use]
    pub fn is_fan(&self) -> bool {
        self.fan_speed.is_some()
    }

    /// Returns `true` if the channel drives a light.
    #[must_use]
    pub fn is_light(&self) -> bool {
        !self.is_fan()
            && (self.brightness.is_some()
                || self.color_temperature.is_some()
                || self.hsv.is_some())
    }

    /// Returns the capabilities exposed by this channel, in diff order.
    #[must_use]
    pub fn capabilities(&self) -> Vec<Capability> {
        if self.is_fan() {
            return vec![Capability::Active, Capability::RotationSpeed];
        }
        if !self.is_light() {
            return vec![Capability::On, Capability::OutletInUse];
        }

        let mut caps = vec![Capability::On];
        if self.brightness.is_some() {
            caps.push(Capability::Brightness);
        }
        if self.color_temperature.is_some() {
            caps.push(Capability::ColorTemperature);
        }
        if self.hsv.is_some() {
            caps.push(Capability::Hue);
            caps.push(Capability::Saturation);
        }
        caps
    }

    /// Returns `true` if the channel exposes `capability`.
    #[must_use]
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Reads a capability value, or `None` if the channel does not expose it.
    #[must_use]
    pub fn get(&self, capability: Capability) -> Option<CapabilityValue> {
        if !self.supports(capability) {
            return None;
        }
        let value = match capability {
            Capability::On | Capability::OutletInUse => CapabilityValue::Bool(self.on),
            Capability::Active => CapabilityValue::Int(i64::from(self.on)),
            Capability::Brightness => self.brightness?.value().into(),
            Capability::ColorTemperature => self.color_temperature?.kelvin().into(),
            Capability::Hue => self.hsv?.hue().into(),
            Capability::Saturation => self.hsv?.saturation().into(),
            Capability::RotationSpeed => self.fan_speed?.to_percentage().into(),
        };
        Some(value)
    }

    /// Patches the channel with an already validated value.
    ///
    /// A brightness of 0 also switches the channel off, and a fan speed of
    /// 0 stops the fan. Values of the wrong shape are ignored.
    pub fn apply(&mut self, capability: Capability, value: CapabilityValue) {
        match (capability, value) {
            (Capability::On, CapabilityValue::Bool(on)) => self.on = on,
            (Capability::Active, CapabilityValue::Int(flag)) => self.on = flag != 0,
            (Capability::Brightness, CapabilityValue::Int(v)) => {
                if let Ok(level) = Brightness::from_i64(v) {
                    self.brightness = Some(level);
                    if level.is_off() {
                        self.on = false;
                    }
                }
            }
            (Capability::ColorTemperature, CapabilityValue::Int(v)) => {
                if let Ok(ct) = ColorTemperature::from_i64(v) {
                    self.color_temperature = Some(ct);
                }
            }
            (Capability::Hue, CapabilityValue::Int(v)) => {
                let current = self.hsv.unwrap_or_default();
                if let Ok(hsv) = Hsv::check_hue(v).and_then(|h| current.with_hue(h)) {
                    self.hsv = Some(hsv);
                }
            }
            (Capability::Saturation, CapabilityValue::Int(v)) => {
                let current = self.hsv.unwrap_or_default();
                if let Ok(hsv) = Hsv::check_saturation(v).and_then(|s| current.with_saturation(s))
                {
                    self.hsv = Some(hsv);
                }
            }
            (Capability::RotationSpeed, CapabilityValue::Int(v)) => {
                if let Ok(level) = FanSpeedLevel::from_percentage(v) {
                    self.fan_speed = Some(level);
                    self.on = level.is_running();
                }
            }
            _ => {}
        }
    }
}

/// One child channel of a multi-outlet device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildState {
    /// Identifier, unique within the parent.
    pub id: ChildId,
    /// User-visible name.
    pub alias: String,
    /// Capability values.
    pub channel: ChannelState,
}

impl ChildState {
    /// Creates a child record.
    #[must_use]
    pub fn new(id: impl Into<ChildId>, alias: impl Into<String>, channel: ChannelState) -> Self {
        Self {
            id: id.into(),
            alias: alias.into(),
            channel,
        }
    }
}

/// Full snapshot of a device's capability values.
///
/// A device either has a single channel or a fixed ordered list of
/// children; the main endpoint of a device with children exposes nothing.
///
/// # Examples
///
/// ```
/// use kasa_sync::event::ChildId;
/// use kasa_sync::state::{ChannelState, ChildState, DeviceState, Endpoint};
/// use kasa_sync::types::{Capability, CapabilityValue};
///
/// let strip = DeviceState::WithChildren(vec![
///     ChildState::new("00", "Lamp", ChannelState::new(true)),
///     ChildState::new("01", "Heater", ChannelState::new(false)),
/// ]);
///
/// let heater = Endpoint::Child(ChildId::new("01"));
/// assert_eq!(strip.child_index(&ChildId::new("01")), Some(1));
/// assert_eq!(strip.get(&heater, Capability::On), Some(CapabilityValue::Bool(false)));
/// assert_eq!(strip.get(&Endpoint::Main, Capability::On), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceState {
    /// A device with one channel.
    Single(ChannelState),
    /// A device whose channels are its children.
    WithChildren(Vec<ChildState>),
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::Single(ChannelState::default())
    }
}

impl DeviceState {
    /// Returns the children, empty for single-channel devices.
    #[must_use]
    pub fn children(&self) -> &[ChildState] {
        match self {
            Self::Single(_) => &[],
            Self::WithChildren(children) => children,
        }
    }

    /// Returns the position of a child, which is the backend's child index.
    #[must_use]
    pub fn child_index(&self, id: &ChildId) -> Option<usize> {
        self.children().iter().position(|child| &child.id == id)
    }

    /// Returns every addressable endpoint, in diff order.
    #[must_use]
    pub fn endpoints(&self) -> Vec<Endpoint> {
        match self {
            Self::Single(_) => vec![Endpoint::Main],
            Self::WithChildren(children) => children
                .iter()
                .map(|child| Endpoint::Child(child.id.clone()))
                .collect(),
        }
    }

    /// Returns the channel behind an endpoint.
    #[must_use]
    pub fn channel(&self, endpoint: &Endpoint) -> Option<&ChannelState> {
        match (self, endpoint) {
            (Self::Single(channel), Endpoint::Main) => Some(channel),
            (Self::WithChildren(children), Endpoint::Child(id)) => children
                .iter()
                .find(|child| &child.id == id)
                .map(|child| &child.channel),
            _ => None,
        }
    }

    /// Returns the channel behind an endpoint for patching.
    pub fn channel_mut(&mut self, endpoint: &Endpoint) -> Option<&mut ChannelState> {
        match (self, endpoint) {
            (Self::Single(channel), Endpoint::Main) => Some(channel),
            (Self::WithChildren(children), Endpoint::Child(id)) => children
                .iter_mut()
                .find(|child| &child.id == id)
                .map(|child| &mut child.channel),
            _ => None,
        }
    }

    /// Reads one capability of one endpoint.
    #[must_use]
    pub fn get(&self, endpoint: &Endpoint, capability: Capability) -> Option<CapabilityValue> {
        self.channel(endpoint)?.get(capability)
    }
}
