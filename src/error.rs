// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `kasa_sync` library.
//!
//! The hierarchy mirrors the failure classes of the synchronization core:
//!
//! - [`ValueError`]: a capability value outside its accepted domain. Rejected
//!   synchronously to the caller; device state is never touched.
//! - [`BackendError`]: a network/timeout failure reported by the device-control
//!   backend. The coordinator converts these into the device's `offline` flag.
//! - [`ConfigError`]: invalid platform or backend configuration.
//!
//! All of them are `Clone` because a single coalesced failure is fanned out
//! to every waiting caller.

use std::time::Duration;

use thiserror::Error;

use crate::event::{ChildId, DeviceId};
use crate::types::Capability;

/// The main error type for this library.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// A capability value was rejected.
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// The device-control backend failed.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Configuration is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Device was not found in the manager.
    #[error("device {0} not found")]
    DeviceNotFound(DeviceId),

    /// The device has been quarantined after a communication failure.
    #[error("device {0} is offline")]
    DeviceOffline(DeviceId),

    /// A child id does not exist on the device.
    #[error("device {device_id} has no child {child_id}")]
    ChildNotFound {
        /// The parent device.
        device_id: DeviceId,
        /// The requested child.
        child_id: ChildId,
    },

    /// The capability is not exposed on the addressed endpoint.
    #[error("device {device_id} does not expose {capability}")]
    UnsupportedCapability {
        /// The device that was addressed.
        device_id: DeviceId,
        /// The requested capability.
        capability: Capability,
    },

    /// The platform is shutting down.
    #[error("platform is shutting down")]
    ShuttingDown,

    /// A rediscovery sweep is already running.
    #[error("a device rediscovery is already in progress")]
    DiscoveryInProgress,

    /// An internal channel closed before delivering a result.
    #[error("channel closed: {0}")]
    ChannelClosed(String),
}

impl From<tokio::sync::oneshot::error::RecvError> for Error {
    fn from(err: tokio::sync::oneshot::error::RecvError) -> Self {
        Self::ChannelClosed(err.to_string())
    }
}

/// Errors related to capability value validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// A numeric value is outside the allowed range.
    #[error("value {actual} is out of range [{min}, {max}]")]
    OutOfRange {
        /// Minimum allowed value.
        min: i64,
        /// Maximum allowed value.
        max: i64,
        /// The actual value that was provided.
        actual: i64,
    },

    /// The value has the wrong type for the capability.
    #[error("{capability} expects {expected}, got {actual}")]
    InvalidType {
        /// The capability being written.
        capability: Capability,
        /// Description of the accepted type.
        expected: &'static str,
        /// The value that was provided.
        actual: String,
    },

    /// The capability can only be read.
    #[error("{0} is read-only")]
    ReadOnly(Capability),
}

/// Errors reported by the device-control backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The request could not be delivered.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The backend did not answer in time.
    #[error("request timed out after {} ms", .0.as_millis())]
    Timeout(Duration),

    /// The backend answered with a non-success status.
    #[error("HTTP {code}: {message}")]
    Status {
        /// HTTP status code.
        code: u16,
        /// Reason phrase or error body.
        message: String,
    },

    /// The backend refused to apply a command.
    #[error("command rejected: {0}")]
    Rejected(String),

    /// The backend answered with something that could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

/// Errors related to configuration parsing and validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The configuration document could not be parsed.
    #[error("invalid configuration document: {0}")]
    Parse(String),

    /// A field has an invalid value.
    #[error("invalid value for `{field}`: {message}")]
    InvalidField {
        /// The offending field, using its configuration key.
        field: &'static str,
        /// Description of the problem.
        message: String,
    },
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_error_display() {
        let err = ValueError::OutOfRange {
            min: 0,
            max: 100,
            actual: 150,
        };
        assert_eq!(err.to_string(), "value 150 is out of range [0, 100]");
    }

    #[test]
    fn invalid_type_names_capability() {
        let err = ValueError::InvalidType {
            capability: Capability::On,
            expected: "a boolean",
            actual: "7".to_string(),
        };
        assert_eq!(err.to_string(), "On expects a boolean, got 7");
    }

    #[test]
    fn error_from_value_error() {
        let err: Error = ValueError::ReadOnly(Capability::OutletInUse).into();
        assert!(matches!(
            err,
            Error::Value(ValueError::ReadOnly(Capability::OutletInUse))
        ));
    }

    #[test]
    fn timeout_display_uses_millis() {
        let err = BackendError::Timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "request timed out after 1500 ms");
    }

    #[test]
    fn offline_display() {
        let err = Error::DeviceOffline(DeviceId::new("80061A2B"));
        assert_eq!(err.to_string(), "device 80061A2B is offline");
    }

    #[test]
    fn json_error_becomes_invalid_response() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: BackendError = json_err.into();
        assert!(matches!(err, BackendError::InvalidResponse(_)));
    }
}
