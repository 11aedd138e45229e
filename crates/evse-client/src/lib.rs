#![allow(dead_code)]

use std::time::Duration;

use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};
use url::Url;

use telemetry::{ParseError, TelemetrySnapshot};
use types::{AckStyle, ApiProfile, CurrentUnit, DeviceEndpoint, SwitchStyle};

mod outcome;

pub use outcome::{classify_prefixed_ack, CommandOutcome};

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Transport options shared by every request a client makes.
#[cfg_attr(feature = "config", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-request timeout in milliseconds. The firmware is slow to answer
    /// while charging starts up, hence the generous default.
    pub timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection to {endpoint} failed: {detail}")]
    ConnectionFailed { endpoint: String, detail: String },
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("device returned http status {0}")]
    HttpStatus(u16),
    #[error("unexpected transport failure: {0}")]
    Unexpected(String),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("requested current {requested}A is outside the allowed range {min}A to {max}A")]
    CurrentOutOfBounds { requested: f64, min: f64, max: f64 },
}

#[derive(Debug, Error)]
pub enum EvseError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// HTTP client for one charging station.
///
/// Holds the endpoint, the wire-convention profile, and a reused
/// [`reqwest::Client`]; nothing else is retained between calls. Every
/// operation is a single request/response exchange with no retries.
/// Concurrent use against independent endpoints is fine; writes to one
/// endpoint should be serialized by the caller.
#[derive(Debug)]
pub struct EvseClient {
    endpoint: DeviceEndpoint,
    profile: ApiProfile,
    timeout_ms: u64,
    http: reqwest::Client,
}

impl EvseClient {
    pub fn new(
        endpoint: DeviceEndpoint,
        profile: ApiProfile,
        config: ClientConfig,
    ) -> Result<Self, EvseError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| TransportError::Unexpected(err.to_string()))?;

        Ok(Self {
            endpoint,
            profile,
            timeout_ms: config.timeout_ms,
            http,
        })
    }

    pub fn endpoint(&self) -> &DeviceEndpoint {
        &self.endpoint
    }

    pub fn profile(&self) -> &ApiProfile {
        &self.profile
    }

    /// Fetch the current parameter set from `/getParameters`.
    pub async fn fetch_snapshot(&self) -> Result<TelemetrySnapshot, EvseError> {
        let body = self.fetch("getParameters", &[]).await?;
        let snapshot = TelemetrySnapshot::parse(&body)?;
        debug!(endpoint = %self.endpoint, fields = snapshot.len(), "snapshot fetched");
        Ok(snapshot)
    }

    /// Request a new charging current. Out-of-bounds values fail locally
    /// with [`ValidationError::CurrentOutOfBounds`] before any network call.
    pub async fn set_current(&self, amps: f64) -> Result<CommandOutcome, EvseError> {
        let bounds = self.profile.bounds;
        if !amps.is_finite() || !bounds.contains(amps) {
            return Err(ValidationError::CurrentOutOfBounds {
                requested: amps,
                min: bounds.min,
                max: bounds.max,
            }
            .into());
        }

        let wire = match self.profile.unit {
            CurrentUnit::Milliamps => (amps * 100.0).round() as i64,
            CurrentUnit::Amps => amps.round() as i64,
        };
        self.dispatch("setCurrent", &[("current", wire.to_string())])
            .await
    }

    /// Switch charging on or off via the command path the configured
    /// generation uses.
    pub async fn set_active(&self, active: bool) -> Result<CommandOutcome, EvseError> {
        match self.profile.switch_style {
            SwitchStyle::StatusQuery => {
                self.dispatch("setStatus", &[("active", active.to_string())])
                    .await
            }
            SwitchStyle::BarePaths => {
                let path = if active { "activate" } else { "deactivate" };
                self.dispatch(path, &[]).await
            }
        }
    }

    async fn dispatch(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<CommandOutcome, EvseError> {
        match self.profile.ack_style {
            AckStyle::Prefixed => {
                let body = self.fetch(path, query).await?;
                let outcome = classify_prefixed_ack(&body);
                if let CommandOutcome::UnrecognizedResponse(raw) = &outcome {
                    warn!(endpoint = %self.endpoint, path, raw, "unrecognized command response");
                }
                Ok(outcome)
            }
            // Pre-prefix firmware: the status line is the whole protocol. A
            // non-200 is the device refusing; connection failures and
            // timeouts never reached it and stay transport errors.
            AckStyle::StatusOnly => match self.fetch(path, query).await {
                Ok(_) => Ok(CommandOutcome::Success),
                Err(TransportError::HttpStatus(status)) => {
                    warn!(endpoint = %self.endpoint, path, status, "command rejected by status");
                    Ok(CommandOutcome::InternalError)
                }
                Err(err) => Err(err.into()),
            },
        }
    }

    /// One GET against the device, bounded by the configured deadline for
    /// the whole exchange. Returns the raw body on HTTP 200; the firmware
    /// never signals success with any other status.
    async fn fetch(&self, path: &str, query: &[(&str, String)]) -> Result<String, TransportError> {
        let url = self.url_for(path, query)?;

        let exchange = async {
            let response = self
                .http
                .get(url)
                .send()
                .await
                .map_err(|err| self.map_request_error(err))?;

            let status = response.status().as_u16();
            if status != 200 {
                warn!(endpoint = %self.endpoint, path, status, "device returned non-200");
                return Err(TransportError::HttpStatus(status));
            }

            response
                .text()
                .await
                .map_err(|err| self.map_request_error(err))
        };

        // Dropping the exchange future on expiry cancels the in-flight call.
        let body = match timeout(Duration::from_millis(self.timeout_ms), exchange).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(endpoint = %self.endpoint, path, timeout_ms = self.timeout_ms, "request timed out");
                return Err(TransportError::Timeout {
                    timeout_ms: self.timeout_ms,
                });
            }
        };
        debug!(endpoint = %self.endpoint, path, bytes = body.len(), "request ok");
        Ok(body)
    }

    fn url_for(&self, path: &str, query: &[(&str, String)]) -> Result<Url, TransportError> {
        let base = format!("http://{}:{}/{}", self.endpoint.host, self.endpoint.port, path);
        let mut url = Url::parse(&base)
            .map_err(|err| TransportError::Unexpected(format!("invalid url {base}: {err}")))?;
        for (key, value) in query {
            url.query_pairs_mut().append_pair(key, value);
        }
        Ok(url)
    }

    fn map_request_error(&self, err: reqwest::Error) -> TransportError {
        if err.is_connect() {
            TransportError::ConnectionFailed {
                endpoint: self.endpoint.to_string(),
                detail: err.to_string(),
            }
        } else {
            TransportError::Unexpected(err.to_string())
        }
    }
}
