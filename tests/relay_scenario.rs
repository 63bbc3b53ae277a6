//! End-to-end relay tests against a live server on an ephemeral port.

use futures_util::{SinkExt, StreamExt};
use relayhub::api::{build_router, AppState};
use relayhub::sink::{SnapshotWriter, SqliteSink};
use relayhub::websocket::{HubStatus, RelayHub};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const DISCONNECT_NOTICE: &str = r#"{"type":"ESP32_DISCONNECTED"}"#;

struct TestServer {
    addr: SocketAddr,
    hub: Arc<RelayHub>,
    sink: Arc<SqliteSink>,
    _dir: TempDir,
}

impl TestServer {
    async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(SqliteSink::open(dir.path().join("states.db")).unwrap());
        let (writer, _worker) = SnapshotWriter::spawn(sink.clone(), 64);
        let hub = Arc::new(RelayHub::new(writer));

        let router = build_router(AppState::with_snapshots(Arc::clone(&hub), sink.clone()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            addr,
            hub,
            sink,
            _dir: dir,
        }
    }

    async fn connect(&self) -> Ws {
        let (ws, _) = connect_async(format!("ws://{}/", self.addr)).await.unwrap();
        ws
    }

    /// Poll until the hub reports the expected view
    async fn wait_for_status(&self, device_connected: bool, clients: usize) {
        let expected = HubStatus {
            device_connected,
            clients,
        };
        for _ in 0..200 {
            if self.hub.status().await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "hub never reached {:?}, last {:?}",
            expected,
            self.hub.status().await
        );
    }

    async fn wait_for_snapshots(&self, count: u64) {
        for _ in 0..200 {
            if self.sink.count().await.unwrap() == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} persisted snapshots", count);
    }
}

async fn send(ws: &mut Ws, text: &str) {
    ws.send(Message::Text(text.to_string())).await.unwrap();
}

async fn recv_text(ws: &mut Ws) -> String {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        match msg {
            Message::Text(text) => return text,
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}

async fn assert_silent(ws: &mut Ws) {
    match tokio::time::timeout(Duration::from_millis(200), ws.next()).await {
        Err(_) => {}
        Ok(Some(Ok(Message::Text(text)))) => panic!("unexpected frame: {}", text),
        Ok(other) => panic!("unexpected stream event: {:?}", other),
    }
}

#[tokio::test]
async fn test_full_relay_scenario() {
    let server = TestServer::start().await;

    let mut device = server.connect().await;
    server.wait_for_status(false, 1).await;
    send(&mut device, "ESP32").await;
    server.wait_for_status(true, 0).await;

    let mut browser = server.connect().await;
    server.wait_for_status(true, 1).await;

    let update = r#"{"servoPos":90,"potValue":512}"#;
    send(&mut device, update).await;
    assert_eq!(recv_text(&mut browser).await, update);

    server.wait_for_snapshots(1).await;
    let stored = server.sink.recent(1).await.unwrap();
    assert_eq!(stored[0].servo_pos, Some(90.0));
    assert_eq!(stored[0].pot_value, Some(512.0));

    let command = r#"{"cmd":"reset"}"#;
    send(&mut browser, command).await;
    assert_eq!(recv_text(&mut device).await, command);

    device.close(None).await.unwrap();
    assert_eq!(recv_text(&mut browser).await, DISCONNECT_NOTICE);
    server.wait_for_status(false, 1).await;
}

#[tokio::test]
async fn test_handshake_gets_no_reply() {
    let server = TestServer::start().await;

    let mut device = server.connect().await;
    send(&mut device, "ESP32").await;
    server.wait_for_status(true, 0).await;

    assert_silent(&mut device).await;
}

#[tokio::test]
async fn test_broadcast_reaches_every_client_but_not_device() {
    let server = TestServer::start().await;

    let mut device = server.connect().await;
    send(&mut device, "ESP32").await;
    server.wait_for_status(true, 0).await;

    let mut c1 = server.connect().await;
    let mut c2 = server.connect().await;
    let mut c3 = server.connect().await;
    server.wait_for_status(true, 3).await;

    let update = r#"{"potValue":300,"systemEnabled":true}"#;
    send(&mut device, update).await;

    assert_eq!(recv_text(&mut c1).await, update);
    assert_eq!(recv_text(&mut c2).await, update);
    assert_eq!(recv_text(&mut c3).await, update);
    assert_silent(&mut device).await;

    // no servoPos, nothing persisted
    assert_eq!(server.hub.snapshot_stats().submitted, 0);
    assert_eq!(server.sink.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_command_goes_to_device_only() {
    let server = TestServer::start().await;

    let mut device = server.connect().await;
    send(&mut device, "ESP32").await;
    server.wait_for_status(true, 0).await;

    let mut sender = server.connect().await;
    let mut bystander = server.connect().await;
    server.wait_for_status(true, 2).await;

    let command = r#"{"servo":180,"potControl":false}"#;
    send(&mut sender, command).await;

    assert_eq!(recv_text(&mut device).await, command);
    assert_silent(&mut bystander).await;
    assert_silent(&mut sender).await;
}

#[tokio::test]
async fn test_reidentify_switches_device_silently() {
    let server = TestServer::start().await;

    let mut first = server.connect().await;
    send(&mut first, "ESP32").await;
    server.wait_for_status(true, 0).await;

    let mut second = server.connect().await;
    server.wait_for_status(true, 1).await;
    send(&mut second, "ESP32").await;
    server.wait_for_status(true, 0).await;

    let mut browser = server.connect().await;
    server.wait_for_status(true, 1).await;

    let command = r#"{"cmd":"center"}"#;
    send(&mut browser, command).await;
    assert_eq!(recv_text(&mut second).await, command);
    assert_silent(&mut first).await;

    // the orphaned connection closing does not look like a device disconnect
    first.close(None).await.unwrap();
    assert_silent(&mut browser).await;
    server.wait_for_status(true, 1).await;
}

#[tokio::test]
async fn test_no_device_discards_traffic() {
    let server = TestServer::start().await;

    let mut c1 = server.connect().await;
    let mut c2 = server.connect().await;
    server.wait_for_status(false, 2).await;

    send(&mut c1, r#"{"servoPos":10}"#).await;
    assert_silent(&mut c2).await;
    assert_silent(&mut c1).await;
    assert_eq!(server.hub.snapshot_stats().submitted, 0);
}

#[tokio::test]
async fn test_malformed_frames_do_not_close_connections() {
    let server = TestServer::start().await;

    let mut device = server.connect().await;
    send(&mut device, "ESP32").await;
    server.wait_for_status(true, 0).await;

    let mut browser = server.connect().await;
    server.wait_for_status(true, 1).await;

    send(&mut browser, "{not json").await;
    send(&mut device, "hello").await;
    assert_silent(&mut device).await;
    assert_silent(&mut browser).await;

    // both connections keep working afterwards
    send(&mut browser, r#"{"cmd":"ping"}"#).await;
    assert_eq!(recv_text(&mut device).await, r#"{"cmd":"ping"}"#);

    send(&mut device, r#"{"servoPos":0}"#).await;
    assert_eq!(recv_text(&mut browser).await, r#"{"servoPos":0}"#);
    server.wait_for_snapshots(1).await;
}

#[tokio::test]
async fn test_device_disconnect_then_new_device() {
    let server = TestServer::start().await;

    let mut device = server.connect().await;
    send(&mut device, "ESP32").await;
    server.wait_for_status(true, 0).await;

    let mut browser = server.connect().await;
    server.wait_for_status(true, 1).await;

    drop(device);
    assert_eq!(recv_text(&mut browser).await, DISCONNECT_NOTICE);
    server.wait_for_status(false, 1).await;

    send(&mut browser, r#"{"cmd":"reset"}"#).await;
    assert_silent(&mut browser).await;

    let mut replacement = server.connect().await;
    send(&mut replacement, "ESP32").await;
    server.wait_for_status(true, 1).await;

    send(&mut browser, r#"{"cmd":"reset"}"#).await;
    assert_eq!(recv_text(&mut replacement).await, r#"{"cmd":"reset"}"#);
}
