// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Platform configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::event::EventBus;

/// Timing and filtering options of a [`DeviceManager`](super::DeviceManager).
///
/// Deserializes from the bridge's JSON platform block. Durations use the
/// units of that block: seconds for `pollingInterval`, `timeout` and
/// `discoveryInterval`, milliseconds for `waitTimeUpdate` and
/// `discoverySettleDelay`.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use kasa_sync::manager::PlatformConfig;
///
/// let config = PlatformConfig::from_json(r#"{
///     "pollingInterval": 30,
///     "waitTimeUpdate": 250,
///     "excludeMacAddresses": ["AA:BB:CC:*"]
/// }"#).unwrap();
///
/// assert_eq!(config.polling_interval(), Duration::from_secs(30));
/// assert_eq!(config.coalescing_window(), Duration::from_millis(250));
/// assert_eq!(config.timeout(), Duration::from_secs(15));
/// assert!(!config.accepts_mac(Some("aa-bb-cc-01-02-03")));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlatformConfig {
    /// Seconds between background refreshes of each device.
    pub polling_interval: u64,
    /// Coalescing window for state refreshes, in milliseconds.
    pub wait_time_update: u64,
    /// Bound on every backend call, in seconds.
    pub timeout: u64,
    /// Seconds between periodic rediscoveries; `None` disables them.
    pub discovery_interval: Option<u64>,
    /// Milliseconds an update waits after a rediscovery finished; defaults
    /// to one polling interval.
    pub discovery_settle_delay: Option<u64>,
    /// Only devices matching one of these patterns are added.
    #[serde(alias = "includeMacAddress")]
    pub include_mac_addresses: Option<Vec<String>>,
    /// Devices matching one of these patterns are ignored.
    pub exclude_mac_addresses: Option<Vec<String>>,
    /// Buffer size of the event channel.
    pub event_capacity: usize,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            polling_interval: Self::DEFAULT_POLLING_INTERVAL_SECS,
            wait_time_update: Self::DEFAULT_WAIT_TIME_UPDATE_MS,
            timeout: Self::DEFAULT_TIMEOUT_SECS,
            discovery_interval: None,
            discovery_settle_delay: None,
            include_mac_addresses: None,
            exclude_mac_addresses: None,
            event_capacity: EventBus::DEFAULT_CAPACITY,
        }
    }
}

impl PlatformConfig {
    /// Default background refresh period.
    pub const DEFAULT_POLLING_INTERVAL_SECS: u64 = 10;
    /// Default coalescing window.
    pub const DEFAULT_WAIT_TIME_UPDATE_MS: u64 = 100;
    /// Default backend call bound.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

    /// Parses and validates a JSON platform block.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON and
    /// [`ConfigError::InvalidField`] for values rejected by
    /// [`validate`](Self::validate).
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks intervals and MAC patterns.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_zero("pollingInterval", self.polling_interval)?;
        non_zero("waitTimeUpdate", self.wait_time_update)?;
        non_zero("timeout", self.timeout)?;
        if let Some(interval) = self.discovery_interval {
            non_zero("discoveryInterval", interval)?;
        }
        if self.event_capacity == 0 {
            return Err(invalid("eventCapacity", "must be greater than zero"));
        }

        for (field, patterns) in [
            ("includeMacAddresses", &self.include_mac_addresses),
            ("excludeMacAddresses", &self.exclude_mac_addresses),
        ] {
            for pattern in patterns.iter().flatten() {
                check_mac_pattern(field, pattern)?;
            }
        }
        Ok(())
    }

    /// Sets the polling interval.
    #[must_use]
    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval.as_secs();
        self
    }

    /// Sets the coalescing window.
    #[must_use]
    pub fn with_coalescing_window(mut self, window: Duration) -> Self {
        self.wait_time_update = duration_millis(window);
        self
    }

    /// Sets the backend call bound.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.as_secs();
        self
    }

    /// Enables periodic rediscovery.
    #[must_use]
    pub fn with_discovery_interval(mut self, interval: Duration) -> Self {
        self.discovery_interval = Some(interval.as_secs());
        self
    }

    /// Sets how long updates wait after a rediscovery finished.
    #[must_use]
    pub fn with_discovery_settle_delay(mut self, delay: Duration) -> Self {
        self.discovery_settle_delay = Some(duration_millis(delay));
        self
    }

    /// Restricts discovery to matching MAC addresses.
    #[must_use]
    pub fn with_include_macs<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_mac_addresses = Some(patterns.into_iter().map(Into::into).collect());
        self
    }

    /// Ignores matching MAC addresses during discovery.
    #[must_use]
    pub fn with_exclude_macs<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_mac_addresses = Some(patterns.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the event channel buffer size.
    #[must_use]
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Returns the polling interval.
    #[must_use]
    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval)
    }

    /// Returns the coalescing window.
    #[must_use]
    pub fn coalescing_window(&self) -> Duration {
        Duration::from_millis(self.wait_time_update)
    }

    /// Returns the backend call bound.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Returns the rediscovery period, if enabled.
    #[must_use]
    pub fn discovery_interval(&self) -> Option<Duration> {
        self.discovery_interval.map(Duration::from_secs)
    }

    /// Returns the post-rediscovery settle delay.
    #[must_use]
    pub fn discovery_settle_delay(&self) -> Duration {
        self.discovery_settle_delay
            .map_or_else(|| self.polling_interval(), Duration::from_millis)
    }

    /// Applies the include and exclude filters to a MAC address.
    ///
    /// Addresses and patterns are compared after removing separators and
    /// upper-casing. Patterns may use `*` and `?` wildcards. A device without
    /// a MAC passes only when no include list is configured.
    #[must_use]
    pub fn accepts_mac(&self, mac: Option<&str>) -> bool {
        let Some(mac) = mac.map(normalize_mac) else {
            return self.include_mac_addresses.is_none();
        };

        let matches_any = |patterns: &Option<Vec<String>>| {
            patterns
                .iter()
                .flatten()
                .any(|pattern| glob_match(&normalize_mac(pattern), &mac))
        };

        if self.include_mac_addresses.is_some() && !matches_any(&self.include_mac_addresses) {
            return false;
        }
        !matches_any(&self.exclude_mac_addresses)
    }
}

fn non_zero(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        Err(invalid(field, "must be greater than zero"))
    } else {
        Ok(())
    }
}

fn invalid(field: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidField {
        field,
        message: message.into(),
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn check_mac_pattern(field: &'static str, pattern: &str) -> Result<(), ConfigError> {
    let normalized = normalize_mac(pattern);
    let valid_chars = normalized
        .chars()
        .all(|c| c.is_ascii_hexdigit() || c == '*' || c == '?');
    let literal_len = normalized.chars().filter(|c| *c != '*').count();

    if normalized.is_empty() || !valid_chars || literal_len > 12 {
        return Err(invalid(field, format!("malformed MAC pattern `{pattern}`")));
    }
    if !normalized.contains('*') && normalized.len() != 12 {
        return Err(invalid(field, format!("malformed MAC address `{pattern}`")));
    }
    Ok(())
}

fn normalize_mac(mac: &str) -> String {
    mac.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '*' || *c == '?')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Matches `text` against a pattern with `*` (any run) and `?` (any one).
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}
