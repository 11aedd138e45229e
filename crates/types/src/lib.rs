#![allow(dead_code)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Network address of one charging station.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceEndpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for DeviceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Vehicle connection state as reported by the station firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleState {
    Ready,
    Connected,
    Charging,
    Error,
    Unknown,
}

impl VehicleState {
    /// Decode the raw `vehicleState` code. Total: every input maps to a variant.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => VehicleState::Ready,
            2 => VehicleState::Connected,
            3 => VehicleState::Charging,
            5 => VehicleState::Error,
            _ => VehicleState::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VehicleState::Ready => "ready",
            VehicleState::Connected => "connected",
            VehicleState::Charging => "charging",
            VehicleState::Error => "error",
            VehicleState::Unknown => "unknown",
        }
    }
}

/// Boolean-ish fields the firmware reports as `true`, `"true"`, or `"1"`
/// depending on generation; absence is distinct from false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriState {
    True,
    False,
    Unknown,
}

impl TriState {
    pub fn as_bool(self) -> Option<bool> {
        match self {
            TriState::True => Some(true),
            TriState::False => Some(false),
            TriState::Unknown => None,
        }
    }
}

impl From<bool> for TriState {
    fn from(value: bool) -> Self {
        if value {
            TriState::True
        } else {
            TriState::False
        }
    }
}

/// Firmware generation; selects the wire conventions in [`ApiProfile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiGeneration {
    V1,
    V2,
    V3,
}

impl FromStr for ApiGeneration {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "v1" | "1" => Ok(ApiGeneration::V1),
            "v2" | "2" => Ok(ApiGeneration::V2),
            "v3" | "3" => Ok(ApiGeneration::V3),
            other => Err(format!("unknown api generation '{other}'")),
        }
    }
}

impl fmt::Display for ApiGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ApiGeneration::V1 => "v1",
            ApiGeneration::V2 => "v2",
            ApiGeneration::V3 => "v3",
        };
        f.write_str(text)
    }
}

/// Unit convention for current values on the wire and in telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurrentUnit {
    /// Values are plain amps.
    Amps,
    /// Values are amps scaled by 100, the firmware calls them milliamps.
    Milliamps,
}

/// Which command path flips charging on and off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchStyle {
    /// `setStatus?active=<bool>`
    StatusQuery,
    /// Bare `activate` / `deactivate` paths.
    BarePaths,
}

/// How command acknowledgements are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStyle {
    /// Text body with an `S0_`/`E0_`..`E3_` prefix code.
    Prefixed,
    /// No body convention; the HTTP status line is the only signal.
    StatusOnly,
}

/// Allowed charging current range, in amps. `step` is the granularity the
/// firmware UI advertises; writes validate against `min`/`max` only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurrentBounds {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl CurrentBounds {
    pub fn contains(&self, amps: f64) -> bool {
        amps >= self.min && amps <= self.max
    }
}

/// Complete wire-convention profile for one firmware generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ApiProfile {
    pub generation: ApiGeneration,
    pub bounds: CurrentBounds,
    pub unit: CurrentUnit,
    pub switch_style: SwitchStyle,
    pub ack_style: AckStyle,
}

impl ApiProfile {
    pub fn for_generation(generation: ApiGeneration) -> Self {
        match generation {
            ApiGeneration::V1 => ApiProfile {
                generation,
                bounds: CurrentBounds {
                    min: 0.0,
                    max: 32.0,
                    step: 0.5,
                },
                unit: CurrentUnit::Milliamps,
                switch_style: SwitchStyle::BarePaths,
                ack_style: AckStyle::StatusOnly,
            },
            ApiGeneration::V2 => ApiProfile {
                generation,
                bounds: CurrentBounds {
                    min: 0.0,
                    max: 32.0,
                    step: 0.5,
                },
                unit: CurrentUnit::Milliamps,
                switch_style: SwitchStyle::StatusQuery,
                ack_style: AckStyle::Prefixed,
            },
            ApiGeneration::V3 => ApiProfile {
                generation,
                bounds: CurrentBounds {
                    min: 6.0,
                    max: 32.0,
                    step: 1.0,
                },
                unit: CurrentUnit::Amps,
                switch_style: SwitchStyle::StatusQuery,
                ack_style: AckStyle::Prefixed,
            },
        }
    }
}

impl From<ApiGeneration> for ApiProfile {
    fn from(generation: ApiGeneration) -> Self {
        ApiProfile::for_generation(generation)
    }
}
