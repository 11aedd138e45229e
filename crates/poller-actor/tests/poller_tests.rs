use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

use evse_client::ClientConfig;
use poller_actor::{ActorConfig, PollerActor};
use types::{ApiGeneration, ApiProfile, CurrentUnit, DeviceEndpoint};

const PARAMETERS_BODY: &str = r#"{"list":[{"vehicleState":2,"actualCurrent":1600}]}"#;

/// Stub station that answers every `/getParameters` with the same body.
async fn spawn_stub() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
    let addr = listener.local_addr().expect("stub addr");

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                PARAMETERS_BODY.len(),
                PARAMETERS_BODY
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    addr
}

#[tokio::test]
async fn actor_emits_samples_and_stops_on_shutdown() {
    let addr = spawn_stub().await;
    let endpoint = DeviceEndpoint {
        host: addr.ip().to_string(),
        port: addr.port(),
    };

    let (tx, mut rx) = mpsc::channel(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let actor = PollerActor::new(
        "garage",
        endpoint.clone(),
        ApiProfile::for_generation(ApiGeneration::V2),
        ClientConfig::default(),
        tx,
        shutdown_rx,
        ActorConfig {
            poll_interval: Duration::from_millis(50),
            request_timeout: Duration::from_millis(500),
            jitter_ms: 0,
        },
    );
    let handle = tokio::spawn(actor.run());

    for _ in 0..2 {
        let sample = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("sample in time")
            .expect("channel open");
        assert_eq!(sample.device, "garage");
        assert_eq!(sample.endpoint, endpoint);
        assert_eq!(
            sample.snapshot.actual_current(CurrentUnit::Milliamps),
            Some(16.0)
        );
        assert!(sample.collected_at_ms > 0);
    }

    shutdown_tx.send(true).expect("signal shutdown");
    let result = timeout(Duration::from_secs(5), handle)
        .await
        .expect("actor exits")
        .expect("task join");
    assert!(result.is_ok());
}

#[tokio::test]
async fn unreachable_station_emits_no_samples() {
    // Bind and drop to get a dead port.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let (tx, mut rx) = mpsc::channel(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let actor = PollerActor::new(
        "offline",
        DeviceEndpoint {
            host: addr.ip().to_string(),
            port: addr.port(),
        },
        ApiProfile::for_generation(ApiGeneration::V2),
        ClientConfig::default(),
        tx,
        shutdown_rx,
        ActorConfig {
            poll_interval: Duration::from_millis(20),
            request_timeout: Duration::from_millis(200),
            jitter_ms: 0,
        },
    );
    let handle = tokio::spawn(actor.run());

    // A few failed cycles go by; the channel stays empty.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(rx.try_recv().is_err());

    shutdown_tx.send(true).expect("signal shutdown");
    let result = timeout(Duration::from_secs(5), handle)
        .await
        .expect("actor exits")
        .expect("task join");
    assert!(result.is_ok());
}
