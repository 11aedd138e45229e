use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{info, warn};

use collector_app::api::{self, ApiState};
use collector_app::board::{status_from_sample, DeviceHandle, StatusBoard};
use collector_app::{CollectorConfig, DeviceConfig};
use evse_client::ClientConfig;
use poller_actor::{ActorConfig, PollSample, PollerActor, PollerError};
use types::ApiProfile;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config_path = parse_config_arg();
    let config = CollectorConfig::load_with_path(config_path).context("load config failed")?;
    config.validate().context("config validation failed")?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if config.devices.is_empty() {
        warn!("no devices configured");
    }

    let recorder = PrometheusBuilder::new()
        .install_recorder()
        .context("metrics recorder init failed")?;
    metrics::gauge!("evse_configured_devices").set(config.devices.len() as f64);

    let board = StatusBoard::new();
    let mut handles = HashMap::new();
    for device in &config.devices {
        let handle = DeviceHandle::new(
            device.name.clone(),
            device.endpoint.clone(),
            ApiProfile::for_generation(device.generation),
            config.http.clone(),
        )
        .with_context(|| format!("client init failed for device '{}'", device.name))?;
        handles.insert(device.name.clone(), Arc::new(handle));
    }
    let handles = Arc::new(handles);

    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let board_handle = tokio::spawn(board_task(
        rx,
        board.clone(),
        handles.clone(),
        shutdown_rx.clone(),
    ));

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("bind {}", config.listen_addr))?;
    info!(listen_addr = %config.listen_addr, "local api listening");
    let api_handle = tokio::spawn(serve_api(
        listener,
        ApiState {
            board: board.clone(),
            devices: handles.clone(),
            metrics: Some(recorder),
        },
        shutdown_rx.clone(),
    ));

    let specs = build_poller_specs(&config, tx.clone(), shutdown_rx.clone());
    let mut join_set = JoinSet::new();
    for spec in specs.values() {
        spawn_poller(spec.clone(), &mut join_set, Duration::from_millis(0));
    }

    notify_ready();
    let watchdog_handle = start_watchdog(shutdown_rx.clone());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("shutdown signal received");
                let _ = shutdown_tx.send(true);
                break;
            }
            maybe_result = join_set.join_next(), if !join_set.is_empty() => {
                if let Some(result) = maybe_result {
                    match result {
                        Ok((device, outcome)) => {
                            if let Err(err) = outcome {
                                warn!(device = %device, error = %err, "poller exited with error");
                            } else {
                                info!(device = %device, "poller exited cleanly");
                            }
                            if !*shutdown_rx.borrow() {
                                if let Some(spec) = specs.get(&device) {
                                    spawn_poller(
                                        spec.clone(),
                                        &mut join_set,
                                        Duration::from_millis(config.respawn_delay_ms),
                                    );
                                }
                            }
                        }
                        Err(err) => {
                            warn!(error = %err, "poller task failed");
                        }
                    }
                }
            }
        }
    }

    join_set.abort_all();
    while let Some(result) = join_set.join_next().await {
        if let Err(err) = result {
            if !err.is_cancelled() {
                warn!(error = %err, "poller task join failed");
            }
        }
    }

    let _ = board_handle.await;
    let _ = api_handle.await;
    if let Some(handle) = watchdog_handle {
        let _ = handle.await;
    }
    Ok(())
}

#[derive(Clone)]
struct PollerSpec {
    device: DeviceConfig,
    client_config: ClientConfig,
    poller_config: ActorConfig,
    sender: mpsc::Sender<PollSample>,
    shutdown: watch::Receiver<bool>,
}

fn build_poller_specs(
    config: &CollectorConfig,
    sender: mpsc::Sender<PollSample>,
    shutdown: watch::Receiver<bool>,
) -> HashMap<String, PollerSpec> {
    let mut specs = HashMap::new();

    for device in &config.devices {
        let spec = PollerSpec {
            device: device.clone(),
            client_config: config.http.clone(),
            poller_config: config.poller.clone(),
            sender: sender.clone(),
            shutdown: shutdown.clone(),
        };
        specs.insert(device.name.clone(), spec);
    }

    specs
}

fn spawn_poller(
    spec: PollerSpec,
    join_set: &mut JoinSet<(String, Result<(), PollerError>)>,
    delay: Duration,
) {
    let device = spec.device.name.clone();
    join_set.spawn(async move {
        if delay > Duration::from_millis(0) {
            sleep(delay).await;
        }
        let actor = PollerActor::new(
            spec.device.name.clone(),
            spec.device.endpoint.clone(),
            ApiProfile::for_generation(spec.device.generation),
            spec.client_config,
            spec.sender,
            spec.shutdown,
            spec.poller_config,
        );
        (device, actor.run().await)
    });
}

async fn board_task(
    mut rx: mpsc::Receiver<PollSample>,
    board: StatusBoard,
    handles: Arc<HashMap<String, Arc<DeviceHandle>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            maybe_sample = rx.recv() => {
                match maybe_sample {
                    Some(sample) => {
                        let Some(handle) = handles.get(&sample.device) else {
                            warn!(device = %sample.device, "sample for unconfigured device dropped");
                            continue;
                        };
                        let status = status_from_sample(&sample, &handle.profile);
                        board.apply(status).await;
                    }
                    None => break,
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("status board shutdown requested");
                    break;
                }
            }
        }
    }
}

async fn serve_api(listener: TcpListener, state: ApiState, mut shutdown: watch::Receiver<bool>) {
    let wait_for_shutdown = async move {
        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }
    };

    if let Err(err) = axum::serve(listener, api::router(state))
        .with_graceful_shutdown(wait_for_shutdown)
        .await
    {
        warn!(error = %err, "local api server failed");
    }
}

fn parse_config_arg() -> Option<String> {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(path.to_string());
        }
    }
    None
}

#[cfg(target_os = "linux")]
fn notify_ready() {
    if let Err(err) = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]) {
        warn!(error = %err, "systemd ready notify failed");
    }
}

#[cfg(not(target_os = "linux"))]
fn notify_ready() {}

#[cfg(target_os = "linux")]
fn start_watchdog(
    mut shutdown: watch::Receiver<bool>,
) -> Option<tokio::task::JoinHandle<()>> {
    let interval = watchdog_interval()?;
    Some(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sleep(interval) => {
                    if let Err(err) = sd_notify::notify(false, &[sd_notify::NotifyState::Watchdog]) {
                        warn!(error = %err, "systemd watchdog notify failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }))
}

#[cfg(not(target_os = "linux"))]
fn start_watchdog(_shutdown: watch::Receiver<bool>) -> Option<tokio::task::JoinHandle<()>> {
    None
}

#[cfg(target_os = "linux")]
fn watchdog_interval() -> Option<Duration> {
    let watchdog_usec = env::var("WATCHDOG_USEC").ok()?.parse::<u64>().ok()?;
    if let Some(pid) = env::var("WATCHDOG_PID")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
    {
        if pid != std::process::id() {
            return None;
        }
    }

    let interval = watchdog_usec.saturating_div(2).max(100_000);
    Some(Duration::from_micros(interval))
}
