use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use evse_client::ClientConfig;
use poller_actor::ActorConfig;
use types::{ApiGeneration, DeviceEndpoint};

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_DEVICE_PORT: u16 = 80;
const DEFAULT_GENERATION: ApiGeneration = ApiGeneration::V2;
const DEFAULT_CHANNEL_CAPACITY: usize = 256;
const DEFAULT_RESPAWN_DELAY_MS: u64 = 1_000;

/// One configured charging station.
#[derive(Clone, Debug)]
pub struct DeviceConfig {
    pub name: String,
    pub endpoint: DeviceEndpoint,
    pub generation: ApiGeneration,
}

#[derive(Clone, Debug)]
pub struct CollectorConfig {
    pub devices: Vec<DeviceConfig>,
    pub http: ClientConfig,
    pub poller: ActorConfig,
    pub listen_addr: String,
    pub channel_capacity: usize,
    pub respawn_delay_ms: u64,
}

impl CollectorConfig {
    pub fn load() -> Result<Self> {
        Self::load_with_path(None)
    }

    pub fn load_with_path(config_path: Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(file_config) = load_file_config(config_path.as_deref())? {
            apply_file_config(&mut config, file_config);
        }

        apply_env_overrides(&mut config);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for device in &self.devices {
            if device.name.trim().is_empty() {
                anyhow::bail!("device name must be non-empty");
            }
            if device.endpoint.host.trim().is_empty() {
                anyhow::bail!("device '{}' host must be non-empty", device.name);
            }
            if device.endpoint.port == 0 {
                anyhow::bail!("device '{}' port must be between 1 and 65535", device.name);
            }
            if !seen.insert(device.name.clone()) {
                anyhow::bail!("duplicate device name '{}'", device.name);
            }
        }
        if self.http.timeout_ms == 0 {
            anyhow::bail!("http.timeout_ms must be >= 1");
        }
        if self.poller.poll_interval.as_millis() == 0 {
            anyhow::bail!("poller.poll_interval_ms must be >= 1");
        }
        if self.poller.request_timeout.as_millis() == 0 {
            anyhow::bail!("poller.request_timeout_ms must be >= 1");
        }
        if self.channel_capacity == 0 {
            anyhow::bail!("channel_capacity must be >= 1");
        }
        if self.respawn_delay_ms == 0 {
            anyhow::bail!("respawn_delay_ms must be >= 1");
        }
        self.listen_addr
            .parse::<SocketAddr>()
            .map_err(|_| anyhow::anyhow!("listen_addr must be a socket address, e.g. 127.0.0.1:8080"))?;

        Ok(())
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            http: ClientConfig::default(),
            poller: ActorConfig::default(),
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            respawn_delay_ms: DEFAULT_RESPAWN_DELAY_MS,
        }
    }
}

fn apply_env_overrides(config: &mut CollectorConfig) {
    if let Ok(value) = env::var("EVSE_DEVICES") {
        config.devices = parse_devices(&value);
    }

    if let Ok(value) = env::var("EVSE_LISTEN_ADDR") {
        config.listen_addr = value;
    }

    if let Some(timeout_ms) = parse_env_u64("EVSE_HTTP_TIMEOUT_MS") {
        config.http.timeout_ms = timeout_ms;
    }

    if let Some(interval_ms) = parse_env_u64("EVSE_POLL_INTERVAL_MS") {
        config.poller.poll_interval = Duration::from_millis(interval_ms);
    }

    if let Some(timeout_ms) = parse_env_u64("EVSE_REQUEST_TIMEOUT_MS") {
        config.poller.request_timeout = Duration::from_millis(timeout_ms);
    }

    if let Some(jitter_ms) = parse_env_u64("EVSE_JITTER_MS") {
        config.poller.jitter_ms = jitter_ms;
    }

    config.channel_capacity =
        parse_env_usize("EVSE_CHANNEL_CAPACITY").unwrap_or(config.channel_capacity);
    config.respawn_delay_ms =
        parse_env_u64("EVSE_RESPAWN_DELAY_MS").unwrap_or(config.respawn_delay_ms);
}

#[derive(Debug, Deserialize)]
struct FileConfig {
    listen_addr: Option<String>,
    channel_capacity: Option<usize>,
    respawn_delay_ms: Option<u64>,
    devices: Option<Vec<FileDeviceConfig>>,
    http: Option<FileHttpConfig>,
    poller: Option<FilePollerConfig>,
}

#[derive(Debug, Deserialize)]
struct FileDeviceConfig {
    name: String,
    host: String,
    port: Option<u16>,
    generation: Option<ApiGeneration>,
}

#[derive(Debug, Deserialize)]
struct FileHttpConfig {
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FilePollerConfig {
    poll_interval_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    jitter_ms: Option<u64>,
}

fn load_file_config(config_path: Option<&str>) -> Result<Option<FileConfig>> {
    let path = match config_path {
        Some(path) => path.to_string(),
        None => match env::var("EVSE_CONFIG") {
            Ok(value) => value,
            Err(_) => return Ok(None),
        },
    };

    let content = fs::read_to_string(&path)
        .with_context(|| format!("read config file {path}"))?;
    let ext = Path::new(&path).extension().and_then(|value| value.to_str());

    let config = match ext {
        Some("json") => serde_json::from_str(&content).context("parse json config")?,
        _ => toml::from_str(&content).context("parse toml config")?,
    };

    Ok(Some(config))
}

fn apply_file_config(config: &mut CollectorConfig, file: FileConfig) {
    if let Some(listen_addr) = file.listen_addr {
        config.listen_addr = listen_addr;
    }
    if let Some(capacity) = file.channel_capacity {
        config.channel_capacity = capacity;
    }
    if let Some(delay) = file.respawn_delay_ms {
        config.respawn_delay_ms = delay;
    }

    if let Some(devices) = file.devices {
        config.devices = devices
            .into_iter()
            .map(|device| DeviceConfig {
                name: device.name,
                endpoint: DeviceEndpoint {
                    host: device.host,
                    port: device.port.unwrap_or(DEFAULT_DEVICE_PORT),
                },
                generation: device.generation.unwrap_or(DEFAULT_GENERATION),
            })
            .collect();
    }

    if let Some(http) = file.http {
        if let Some(timeout_ms) = http.timeout_ms {
            config.http.timeout_ms = timeout_ms;
        }
    }

    if let Some(poller) = file.poller {
        if let Some(interval_ms) = poller.poll_interval_ms {
            config.poller.poll_interval = Duration::from_millis(interval_ms);
        }
        if let Some(timeout_ms) = poller.request_timeout_ms {
            config.poller.request_timeout = Duration::from_millis(timeout_ms);
        }
        if let Some(jitter_ms) = poller.jitter_ms {
            config.poller.jitter_ms = jitter_ms;
        }
    }
}

fn parse_env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn parse_env_usize(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

/// `host[:port[:generation]]`, comma separated. The device name is the host.
fn parse_devices(value: &str) -> Vec<DeviceConfig> {
    value
        .split(',')
        .filter_map(|entry| {
            let trimmed = entry.trim();
            if trimmed.is_empty() {
                return None;
            }
            let mut parts = trimmed.split(':');
            let host = parts.next()?.to_string();
            let port = parts
                .next()
                .and_then(|part| part.parse::<u16>().ok())
                .unwrap_or(DEFAULT_DEVICE_PORT);
            let generation = parts
                .next()
                .and_then(|part| part.parse::<ApiGeneration>().ok())
                .unwrap_or(DEFAULT_GENERATION);
            Some(DeviceConfig {
                name: host.clone(),
                endpoint: DeviceEndpoint { host, port },
                generation,
            })
        })
        .collect()
}
