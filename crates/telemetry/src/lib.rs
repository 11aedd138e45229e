#![allow(dead_code)]

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use types::{CurrentUnit, TriState, VehicleState};

/// Attribute names the station firmware reports. The snapshot itself accepts
/// arbitrary keys; these are the ones with known meaning.
pub mod fields {
    pub const ACTUAL_CURRENT: &str = "actualCurrent";
    pub const ACTUAL_CURRENT_MA: &str = "actualCurrentMA";
    pub const ACTUAL_POWER: &str = "actualPower";
    pub const ALWAYS_ACTIVE: &str = "alwaysActive";
    pub const DURATION: &str = "duration";
    pub const ENERGY: &str = "energy";
    pub const EVSE_STATE: &str = "evseState";
    pub const LAST_ACTION_UID: &str = "lastActionUID";
    pub const LAST_ACTION_USER: &str = "lastActionUser";
    pub const MAX_CURRENT: &str = "maxCurrent";
    pub const METER_READING: &str = "meterReading";
    pub const MILEAGE: &str = "mileage";
    pub const RFID_UID: &str = "RFIDUID";
    pub const USE_METER: &str = "useMeter";
    pub const VEHICLE_STATE: &str = "vehicleState";
    pub const CURRENT_P1: &str = "currentP1";
    pub const CURRENT_P2: &str = "currentP2";
    pub const CURRENT_P3: &str = "currentP3";
    pub const VOLTAGE_P1: &str = "voltageP1";
    pub const VOLTAGE_P2: &str = "voltageP2";
    pub const VOLTAGE_P3: &str = "voltageP3";
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("json parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("parameter list missing, empty, or not an object")]
    UnexpectedShape,
}

/// One complete set of device-reported parameters from a single poll.
///
/// Values are kept exactly as the firmware sent them (string, number, or
/// bool); typed accessors and the free functions below do the normalizing.
/// A snapshot is superseded wholesale by the next successful poll, never
/// merged.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct TelemetrySnapshot {
    values: HashMap<String, Value>,
}

impl TelemetrySnapshot {
    /// Parse a `/getParameters` response body. The firmware wraps parameter
    /// sets in `{"list": [...]}`; only element 0 is meaningful.
    pub fn parse(body: &str) -> Result<Self, ParseError> {
        let root: Value = serde_json::from_str(body)?;
        let list = root
            .get("list")
            .and_then(Value::as_array)
            .ok_or(ParseError::UnexpectedShape)?;
        if list.len() > 1 {
            warn!(sets = list.len(), "multiple parameter sets in response, using the first");
        }
        let object = list
            .first()
            .and_then(Value::as_object)
            .ok_or(ParseError::UnexpectedShape)?;

        Ok(Self {
            values: object.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        })
    }

    pub fn from_values(values: HashMap<String, Value>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw value for an attribute; `None` for unknown names, which callers
    /// decide how to treat.
    pub fn raw(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Numeric view of a field. The firmware sometimes quotes numbers, so
    /// numeric strings parse too.
    pub fn number(&self, field: &str) -> Option<f64> {
        match self.values.get(field)? {
            Value::Number(num) => num.as_f64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn integer(&self, field: &str) -> Option<i64> {
        self.number(field).map(|value| value as i64)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        match self.values.get(field)? {
            Value::String(text) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn tri_state(&self, field: &str) -> TriState {
        coerce_bool(self.raw(field))
    }

    pub fn vehicle_state(&self) -> VehicleState {
        self.integer(fields::VEHICLE_STATE)
            .map(VehicleState::from_code)
            .unwrap_or(VehicleState::Unknown)
    }

    pub fn evse_active(&self) -> TriState {
        self.tri_state(fields::EVSE_STATE)
    }

    pub fn always_active(&self) -> TriState {
        self.tri_state(fields::ALWAYS_ACTIVE)
    }

    pub fn use_meter(&self) -> TriState {
        self.tri_state(fields::USE_METER)
    }

    /// Charging current in amps, corrected for the generation's wire unit.
    pub fn actual_current(&self, unit: CurrentUnit) -> Option<f64> {
        self.number(fields::ACTUAL_CURRENT)
            .map(|raw| normalize_current(raw, unit))
    }

    /// Configured current limit in amps, corrected like [`Self::actual_current`].
    pub fn max_current(&self, unit: CurrentUnit) -> Option<f64> {
        self.number(fields::MAX_CURRENT)
            .map(|raw| normalize_current(raw, unit))
    }

    pub fn actual_power_kw(&self) -> Option<f64> {
        self.number(fields::ACTUAL_POWER)
    }

    pub fn energy_kwh(&self) -> Option<f64> {
        self.number(fields::ENERGY)
    }

    pub fn meter_reading_kwh(&self) -> Option<f64> {
        self.number(fields::METER_READING)
    }

    pub fn mileage_km(&self) -> Option<f64> {
        self.number(fields::MILEAGE)
    }

    pub fn duration_minutes(&self) -> Option<f64> {
        self.number(fields::DURATION)
    }

    /// Per-phase current, phases 1 to 3. Reported in plain amps on every
    /// generation; no unit correction applies.
    pub fn phase_current(&self, phase: u8) -> Option<f64> {
        let field = match phase {
            1 => fields::CURRENT_P1,
            2 => fields::CURRENT_P2,
            3 => fields::CURRENT_P3,
            _ => return None,
        };
        self.number(field)
    }

    /// Per-phase voltage, phases 1 to 3.
    pub fn phase_voltage(&self, phase: u8) -> Option<f64> {
        let field = match phase {
            1 => fields::VOLTAGE_P1,
            2 => fields::VOLTAGE_P2,
            3 => fields::VOLTAGE_P3,
            _ => return None,
        };
        self.number(field)
    }

    pub fn last_action_user(&self) -> Option<&str> {
        self.text(fields::LAST_ACTION_USER)
    }

    pub fn last_action_uid(&self) -> Option<&str> {
        self.text(fields::LAST_ACTION_UID)
    }

    pub fn rfid_uid(&self) -> Option<&str> {
        self.text(fields::RFID_UID)
    }
}

/// Scale a wire current value into amps for the given unit convention.
/// Milliamp generations transmit amps multiplied by 100.
pub fn normalize_current(raw: f64, unit: CurrentUnit) -> f64 {
    match unit {
        CurrentUnit::Amps => raw,
        CurrentUnit::Milliamps => raw / 100.0,
    }
}

/// Coerce the firmware's boolean spellings into a tri-state. Accepted forms
/// are JSON bools, `"true"`/`"false"` (case-insensitive), `"1"`/`"0"`, and
/// the numbers 1 and 0. Absent and unrecognized values are `Unknown`, never
/// `False`.
pub fn coerce_bool(value: Option<&Value>) -> TriState {
    match value {
        None | Some(Value::Null) => TriState::Unknown,
        Some(Value::Bool(flag)) => (*flag).into(),
        Some(Value::String(text)) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => TriState::True,
            "false" | "0" => TriState::False,
            _ => TriState::Unknown,
        },
        Some(Value::Number(num)) => match num.as_f64() {
            Some(value) if value == 1.0 => TriState::True,
            Some(value) if value == 0.0 => TriState::False,
            _ => TriState::Unknown,
        },
        Some(_) => TriState::Unknown,
    }
}
