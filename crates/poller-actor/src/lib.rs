#![allow(dead_code)]

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use metrics::counter;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{info, warn};

use evse_client::{ClientConfig, EvseClient, EvseError, TransportError};
use telemetry::TelemetrySnapshot;
use types::{ApiProfile, DeviceEndpoint};

#[derive(Debug, Clone)]
pub struct ActorConfig {
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub jitter_ms: u64,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            jitter_ms: 0,
        }
    }
}

#[derive(Debug, Error)]
pub enum PollerError {
    #[error("failed to build evse client: {0}")]
    Client(#[from] EvseError),
}

/// One successful poll of one station.
#[derive(Debug, Clone, Serialize)]
pub struct PollSample {
    pub device: String,
    pub endpoint: DeviceEndpoint,
    pub snapshot: TelemetrySnapshot,
    pub collected_at_ms: u64,
}

/// A lightweight polling task responsible for one station.
///
/// Failed polls emit no sample; downstream consumers keep whatever sample
/// they already hold.
pub struct PollerActor {
    device: String,
    endpoint: DeviceEndpoint,
    profile: ApiProfile,
    client_config: ClientConfig,
    sender: mpsc::Sender<PollSample>,
    shutdown: watch::Receiver<bool>,
    config: ActorConfig,
}

impl PollerActor {
    pub fn new(
        device: impl Into<String>,
        endpoint: DeviceEndpoint,
        profile: ApiProfile,
        client_config: ClientConfig,
        sender: mpsc::Sender<PollSample>,
        shutdown: watch::Receiver<bool>,
        config: ActorConfig,
    ) -> Self {
        Self {
            device: device.into(),
            endpoint,
            profile,
            client_config,
            sender,
            shutdown,
            config,
        }
    }

    pub async fn run(mut self) -> Result<(), PollerError> {
        let mut client_config = self.client_config.clone();
        client_config.timeout_ms = self.config.request_timeout.as_millis() as u64;
        let client = EvseClient::new(self.endpoint.clone(), self.profile, client_config)?;
        let mut iteration = 0u64;

        loop {
            if *self.shutdown.borrow() {
                info!(device = %self.device, "poller shutdown requested");
                break;
            }

            let cycle_start = Instant::now();
            match client.fetch_snapshot().await {
                Ok(snapshot) => {
                    counter!("evse_polls_total", "device" => self.device.clone()).increment(1);
                    let sample = PollSample {
                        device: self.device.clone(),
                        endpoint: self.endpoint.clone(),
                        snapshot,
                        collected_at_ms: unix_ms(),
                    };
                    if let Err(err) = self.sender.send(sample).await {
                        warn!(
                            device = %self.device,
                            endpoint = %self.endpoint,
                            error = %err,
                            "telemetry channel send failed"
                        );
                    }
                }
                Err(err) => {
                    counter!("evse_poll_failures_total", "device" => self.device.clone())
                        .increment(1);
                    let timed_out = matches!(
                        err,
                        EvseError::Transport(TransportError::Timeout { .. })
                    );
                    warn!(
                        device = %self.device,
                        endpoint = %self.endpoint,
                        timed_out,
                        error = %err,
                        "poll failed"
                    );
                }
            }

            iteration = iteration.wrapping_add(1);
            let elapsed = cycle_start.elapsed();
            let delay = jittered_delay(self.config.poll_interval, self.config.jitter_ms, iteration);
            info!(
                device = %self.device,
                elapsed_ms = elapsed.as_millis(),
                delay_ms = delay.as_millis(),
                "poll cycle complete"
            );

            tokio::select! {
                _ = sleep(delay) => {},
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        info!(device = %self.device, "poller shutdown requested");
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

fn jittered_delay(base: Duration, jitter_ms: u64, iteration: u64) -> Duration {
    if jitter_ms == 0 {
        return base;
    }

    let jitter_window = jitter_ms.max(1);
    let seed = unix_ms().wrapping_add(iteration.wrapping_mul(1_664_525));
    let offset = seed % jitter_window;
    base + Duration::from_millis(offset)
}

fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
