use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use evse_client::{ClientConfig, CommandOutcome, EvseClient, EvseError};
use poller_actor::PollSample;
use telemetry::TelemetrySnapshot;
use types::{ApiGeneration, ApiProfile, DeviceEndpoint, VehicleState};

/// Latest knowledge about one station, shaped for the local API.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    pub device: String,
    pub endpoint: String,
    pub generation: ApiGeneration,
    pub vehicle_state: VehicleState,
    pub evse_active: Option<bool>,
    pub always_active: Option<bool>,
    pub actual_current_a: Option<f64>,
    pub max_current_a: Option<f64>,
    pub actual_power_kw: Option<f64>,
    pub energy_kwh: Option<f64>,
    pub collected_at_ms: u64,
    pub raw: TelemetrySnapshot,
}

pub fn status_from_sample(sample: &PollSample, profile: &ApiProfile) -> DeviceStatus {
    let snapshot = &sample.snapshot;
    DeviceStatus {
        device: sample.device.clone(),
        endpoint: sample.endpoint.to_string(),
        generation: profile.generation,
        vehicle_state: snapshot.vehicle_state(),
        evse_active: snapshot.evse_active().as_bool(),
        always_active: snapshot.always_active().as_bool(),
        actual_current_a: snapshot.actual_current(profile.unit),
        max_current_a: snapshot.max_current(profile.unit),
        actual_power_kw: snapshot.actual_power_kw(),
        energy_kwh: snapshot.energy_kwh(),
        collected_at_ms: sample.collected_at_ms,
        raw: snapshot.clone(),
    }
}

/// Command access to one station. Writes hold the gate for the whole
/// exchange, so a pending `set_current` and a concurrent `set_active`
/// cannot interleave on the same endpoint.
pub struct DeviceHandle {
    pub name: String,
    pub profile: ApiProfile,
    client: EvseClient,
    write_gate: Mutex<()>,
}

impl DeviceHandle {
    pub fn new(
        name: impl Into<String>,
        endpoint: DeviceEndpoint,
        profile: ApiProfile,
        client_config: ClientConfig,
    ) -> Result<Self, EvseError> {
        let client = EvseClient::new(endpoint, profile, client_config)?;
        Ok(Self {
            name: name.into(),
            profile,
            client,
            write_gate: Mutex::new(()),
        })
    }

    pub async fn set_current(&self, amps: f64) -> Result<CommandOutcome, EvseError> {
        let _gate = self.write_gate.lock().await;
        self.client.set_current(amps).await
    }

    pub async fn set_active(&self, active: bool) -> Result<CommandOutcome, EvseError> {
        let _gate = self.write_gate.lock().await;
        self.client.set_active(active).await
    }
}

/// Most recent status per device. Only successful polls are applied, so a
/// failed refresh leaves the previous entry untouched.
#[derive(Clone, Default)]
pub struct StatusBoard {
    inner: Arc<RwLock<HashMap<String, DeviceStatus>>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn apply(&self, status: DeviceStatus) {
        let mut board = self.inner.write().await;
        board.insert(status.device.clone(), status);
    }

    pub async fn get(&self, device: &str) -> Option<DeviceStatus> {
        let board = self.inner.read().await;
        board.get(device).cloned()
    }

    pub async fn all(&self) -> Vec<DeviceStatus> {
        let board = self.inner.read().await;
        let mut statuses: Vec<DeviceStatus> = board.values().cloned().collect();
        statuses.sort_by(|a, b| a.device.cmp(&b.device));
        statuses
    }
}
