// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP backend talking to the local Kasa sidecar service.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::wire::{
    ControlRequest, ControlResponse, DiscoverRequest, ErrorResponse, SysInfoRequest,
    SysInfoResponse, parse_discovery,
};
use super::{ConnectionParams, ControlCommand, DeviceBackend, DiscoveredDevice};
use crate::error::BackendError;
use crate::state::DeviceState;

// ============================================================================
// HttpBackendConfig
// ============================================================================

/// Configuration for an [`HttpBackend`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use kasa_sync::backend::HttpBackendConfig;
///
/// let config = HttpBackendConfig::new("http://127.0.0.1:38889")
///     .with_credentials("user@example.com", "secret")
///     .with_additional_broadcasts(["192.168.2.255"])
///     .with_manual_devices(["10.0.0.42"])
///     .with_timeout(Duration::from_secs(5));
///
/// assert_eq!(config.base_url(), "http://127.0.0.1:38889");
/// assert_eq!(config.manual_devices(), ["10.0.0.42"]);
/// ```
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    base_url: String,
    credentials: Option<(String, String)>,
    additional_broadcasts: Vec<String>,
    manual_devices: Vec<String>,
    timeout: Duration,
}

impl HttpBackendConfig {
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

    /// Creates a configuration for the sidecar at `base_url`.
    ///
    /// A missing scheme defaults to `http://`; trailing slashes are dropped.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let base_url = if base_url.starts_with("http://") || base_url.starts_with("https://") {
            base_url
        } else {
            format!("http://{base_url}")
        };

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials: None,
            additional_broadcasts: Vec::new(),
            manual_devices: Vec::new(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Sets the cloud credentials used for discovery.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Adds broadcast addresses probed during discovery.
    #[must_use]
    pub fn with_additional_broadcasts<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.additional_broadcasts
            .extend(addresses.into_iter().map(Into::into));
        self
    }

    /// Adds hosts queried directly during discovery.
    #[must_use]
    pub fn with_manual_devices<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.manual_devices.extend(hosts.into_iter().map(Into::into));
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the sidecar base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the credentials if set.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        self.credentials
            .as_ref()
            .map(|(u, p)| (u.as_str(), p.as_str()))
    }

    /// Returns the additional broadcast addresses.
    #[must_use]
    pub fn additional_broadcasts(&self) -> &[String] {
        &self.additional_broadcasts
    }

    /// Returns the manually configured hosts.
    #[must_use]
    pub fn manual_devices(&self) -> &[String] {
        &self.manual_devices
    }

    /// Returns the request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Creates an [`HttpBackend`] from this configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn into_backend(self) -> Result<HttpBackend, BackendError> {
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        Ok(HttpBackend {
            client,
            config: self,
        })
    }
}

// ============================================================================
// HttpBackend
// ============================================================================

/// [`DeviceBackend`] over the sidecar's JSON API.
///
/// ```no_run
/// use kasa_sync::backend::{DeviceBackend, HttpBackendConfig};
///
/// # async fn example() -> Result<(), kasa_sync::error::BackendError> {
/// let backend = HttpBackendConfig::new("127.0.0.1:38889").into_backend()?;
/// backend.health().await?;
///
/// for device in backend.discover().await? {
///     println!("{} ({})", device.alias, device.id);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    config: HttpBackendConfig,
}

impl HttpBackend {
    /// Returns the configuration this backend was built from.
    #[must_use]
    pub fn config(&self) -> &HttpBackendConfig {
        &self.config
    }

    /// Checks that the sidecar is up.
    ///
    /// # Errors
    ///
    /// Returns error if the sidecar is unreachable or reports itself unhealthy.
    pub async fn health(&self) -> Result<(), BackendError> {
        let request = self.client.get(self.url("/health"));
        let body: serde_json::Value = self.send(request).await?;

        match body.get("status").and_then(serde_json::Value::as_str) {
            Some("healthy") => Ok(()),
            other => Err(BackendError::InvalidResponse(format!(
                "unexpected health status: {}",
                other.unwrap_or("<missing>")
            ))),
        }
    }

    /// Polls [`health`](Self::health) every `interval` until it succeeds or
    /// `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns the last probe error, or [`BackendError::Timeout`] if no probe
    /// completed in time.
    pub async fn wait_until_ready(
        &self,
        timeout: Duration,
        interval: Duration,
    ) -> Result<(), BackendError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut last_error = BackendError::Timeout(timeout);

        loop {
            match tokio::time::timeout_at(deadline, self.health()).await {
                Ok(Ok(())) => {
                    tracing::debug!(base_url = %self.config.base_url, "Sidecar is ready");
                    return Ok(());
                }
                Ok(Err(e)) => {
                    tracing::debug!(error = %e, "Sidecar not ready yet");
                    last_error = e;
                }
                Err(_) => return Err(last_error),
            }

            if tokio::time::Instant::now() + interval >= deadline {
                return Err(last_error);
            }
            tokio::time::sleep(interval).await;
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, BackendError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        tracing::debug!(path, "Sending sidecar request");
        self.send(self.client.post(self.url(path)).json(body)).await
    }

    async fn send<R: DeserializeOwned>(&self, request: RequestBuilder) -> Result<R, BackendError> {
        let response = request.send().await.map_err(|e| self.map_error(&e))?;
        let response = check_status(response).await?;

        let body = response.text().await.map_err(|e| self.map_error(&e))?;
        tracing::trace!(body = %body, "Received sidecar response");

        Ok(serde_json::from_str(&body)?)
    }

    fn map_error(&self, err: &reqwest::Error) -> BackendError {
        if err.is_timeout() {
            BackendError::Timeout(self.config.timeout)
        } else {
            BackendError::Transport(err.to_string())
        }
    }
}

/// Turns a non-2xx answer into [`BackendError::Status`], preferring the
/// sidecar's `error` field over the reason phrase.
async fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let reason = status.canonical_reason().unwrap_or("Unknown").to_string();
    let message = match response.text().await {
        Ok(body) => serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.error)
            .unwrap_or(reason),
        Err(_) => reason,
    };

    Err(BackendError::Status {
        code: status.as_u16(),
        message,
    })
}

impl DeviceBackend for HttpBackend {
    async fn fetch_state(
        &self,
        connection: &ConnectionParams,
    ) -> Result<DeviceState, BackendError> {
        let response: SysInfoResponse = self
            .post(
                "/getSysInfo",
                &SysInfoRequest {
                    device_config: connection,
                },
            )
            .await?;

        response
            .sys_info
            .ok_or_else(|| BackendError::InvalidResponse("missing sys_info".to_string()))?
            .into_state()
    }

    async fn apply_command(
        &self,
        connection: &ConnectionParams,
        command: &ControlCommand,
    ) -> Result<(), BackendError> {
        tracing::debug!(
            host = connection.host().unwrap_or("?"),
            field = %command.field,
            value = %command.value,
            child = ?command.child_index,
            "Applying control command"
        );

        let response: ControlResponse = self
            .post("/controlDevice", &ControlRequest::new(connection, command))
            .await?;

        match response.status.as_deref() {
            Some("success") => Ok(()),
            Some("error") => Err(BackendError::Rejected(
                response
                    .message
                    .unwrap_or_else(|| "unspecified error".to_string()),
            )),
            other => Err(BackendError::InvalidResponse(format!(
                "unexpected control status: {}",
                other.unwrap_or("<missing>")
            ))),
        }
    }

    async fn discover(&self) -> Result<Vec<DiscoveredDevice>, BackendError> {
        let body = DiscoverRequest {
            additional_broadcasts: &self.config.additional_broadcasts,
            manual_devices: &self.config.manual_devices,
        };

        let mut request = self.client.post(self.url("/discover")).json(&body);
        if let Some((username, password)) = self.config.credentials() {
            request = request.basic_auth(username, Some(password));
        }

        let entries: BTreeMap<String, serde_json::Value> = self.send(request).await?;
        let devices = parse_discovery(entries);
        tracing::debug!(count = devices.len(), "Discovery returned devices");
        Ok(devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gets_scheme() {
        let config = HttpBackendConfig::new("127.0.0.1:38889");
        assert_eq!(config.base_url(), "http://127.0.0.1:38889");
    }

    #[test]
    fn base_url_drops_trailing_slash() {
        let config = HttpBackendConfig::new("https://sidecar.local/");
        assert_eq!(config.base_url(), "https://sidecar.local");
    }

    #[test]
    fn defaults() {
        let config = HttpBackendConfig::new("localhost");
        assert_eq!(config.timeout(), HttpBackendConfig::DEFAULT_TIMEOUT);
        assert!(config.credentials().is_none());
        assert!(config.additional_broadcasts().is_empty());
    }

    #[test]
    fn builder_accumulates_lists() {
        let config = HttpBackendConfig::new("localhost")
            .with_manual_devices(["10.0.0.1"])
            .with_manual_devices(vec!["10.0.0.2".to_string()])
            .with_credentials("me", "pw");

        assert_eq!(config.manual_devices(), ["10.0.0.1", "10.0.0.2"]);
        assert_eq!(config.credentials(), Some(("me", "pw")));
    }

    #[test]
    fn url_joins_path() {
        let backend = HttpBackendConfig::new("localhost:1234").into_backend().unwrap();
        assert_eq!(backend.url("/health"), "http://localhost:1234/health");
    }
}
