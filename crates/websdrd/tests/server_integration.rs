//! Integration tests for the WebSocket server.
//!
//! These tests start a real `SdrServer` on an ephemeral port, backed by the
//! loopback registry, and drive it with `tokio-tungstenite` clients.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.
//! We test the panic-free behavior of production code through assertions.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use websdrd::config::{AuthConfig, Config, SourceConfig};
use websdrd::graph::GraphState;
use websdrd::registry::{spawn_registry, RegistryHandle, RegistryOptions};
use websdrd::server::{SdrServer, ServerError, MAX_MESSAGE_SIZE};

// ============================================================================
// Test Helpers
// ============================================================================

const RECV_TIMEOUT: Duration = Duration::from_secs(2);
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

fn test_config(max_clients: usize) -> Config {
    Config {
        max_clients,
        auth: Some(AuthConfig {
            username: "admin".to_string(),
            password: "pw".to_string(),
        }),
        sources: vec![
            SourceConfig {
                label: "hf".to_string(),
                description: "HF dipole".to_string(),
                center_freq: 7_000_000,
                sample_rate: 1_024_000,
                ..SourceConfig::default()
            },
            SourceConfig {
                label: "vhf".to_string(),
                description: "2 m vertical".to_string(),
                converter_offset: -100_000_000,
                default_offset: 25_000,
                center_freq: 145_000_000,
                ..SourceConfig::default()
            },
        ],
        ..Config::default()
    }
}

/// A running server plus the handles needed to observe and stop it.
struct TestServer {
    addr: SocketAddr,
    registry: RegistryHandle,
    cancel_token: CancellationToken,
    task: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(test_config(16)).await
    }

    async fn start_with(config: Config) -> Self {
        let options = RegistryOptions {
            heartbeat: None,
            ..config.registry_options()
        };
        let registry = spawn_registry(config.loopback_backend(), options).expect("spawn registry");
        let cancel_token = CancellationToken::new();

        let server = SdrServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            registry.clone(),
            cancel_token.clone(),
        )
        .await
        .expect("bind server");
        let addr = server.local_addr().expect("local addr");
        let task = tokio::spawn(async move { server.run().await });

        Self {
            addr,
            registry,
            cancel_token,
            task,
        }
    }

    async fn connect(&self) -> TestClient {
        let (ws, _) = connect_async(format!("ws://{}", self.addr))
            .await
            .expect("websocket connect");
        TestClient { ws }
    }

    async fn shutdown(self) {
        self.cancel_token.cancel();
        timeout(SHUTDOWN_GRACE_PERIOD, self.task)
            .await
            .expect("server should stop in time")
            .expect("server task panicked")
            .expect("server run failed");
    }
}

struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    async fn send(&mut self, value: Value) {
        self.ws
            .send(Message::Text(value.to_string().into()))
            .await
            .expect("send");
    }

    async fn send_raw(&mut self, text: &str) {
        self.ws
            .send(Message::Text(text.to_string().into()))
            .await
            .expect("send");
    }

    /// Next JSON text frame from the server.
    async fn recv(&mut self) -> Value {
        loop {
            let frame = timeout(RECV_TIMEOUT, self.ws.next())
                .await
                .expect("timed out waiting for update")
                .expect("connection closed")
                .expect("websocket error");
            if let Message::Text(text) = frame {
                return serde_json::from_str(text.as_str()).expect("update is JSON");
            }
        }
    }

    /// Reads updates until one satisfies `pred`.
    async fn recv_until(&mut self, pred: impl Fn(&Value) -> bool) -> Value {
        timeout(RECV_TIMEOUT * 2, async {
            loop {
                let update = self.recv().await;
                if pred(&update) {
                    return update;
                }
            }
        })
        .await
        .expect("expected update never arrived")
    }

    /// True once the server closes the connection.
    async fn closed_by_server(&mut self) -> bool {
        let result = timeout(RECV_TIMEOUT, async {
            loop {
                match self.ws.next().await {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
                    Some(Ok(_)) => continue,
                }
            }
        })
        .await;
        result.is_ok()
    }

    async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

// ============================================================================
// Connection Tests
// ============================================================================

#[tokio::test]
async fn test_connect_receives_init_bundle() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;

    let update = client.recv().await;
    assert_eq!(update["stream_name"], "0000.ogg");
    assert_eq!(update["sources"], json!(["hf", "vhf"]));
    assert_eq!(update["supported_demods"], json!(["FM", "WFM", "AM", "USB", "LSB"]));
    assert_eq!(update["privileged"], false);
    assert_eq!(update["demod"], "FM");
    assert_eq!(update["current_source"]["source_ix"], 0);
    assert_eq!(update["current_source"]["description"], "HF dipole");
    assert_eq!(update["current_source"]["hw_freq"], 7_000_000);
    assert_eq!(update["num_clients"], 1);

    client.close().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_each_client_gets_own_stream() {
    let server = TestServer::start().await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;

    let first = a.recv_until(|u| u.get("stream_name").is_some()).await;
    let second = b.recv_until(|u| u.get("stream_name").is_some()).await;
    assert_ne!(first["stream_name"], second["stream_name"]);

    a.close().await;
    b.close().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_num_clients_broadcast() {
    let server = TestServer::start().await;
    let mut a = server.connect().await;
    a.recv().await;

    let b = server.connect().await;
    a.recv_until(|u| u["num_clients"] == 2).await;

    b.close().await;
    a.recv_until(|u| u["num_clients"] == 1).await;

    a.close().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_registry_full_closes_connection() {
    let server = TestServer::start_with(test_config(1)).await;
    let mut a = server.connect().await;
    a.recv().await;

    let mut b = server.connect().await;
    assert!(b.closed_by_server().await);

    let stats = server.registry.stats().await.unwrap();
    assert_eq!(stats.num_clients, 1);

    a.close().await;
    server.shutdown().await;
}

// ============================================================================
// Command Tests
// ============================================================================

#[tokio::test]
async fn test_demod_change_is_reported() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;
    client.recv().await;

    client.send(json!({"demod": "USB"})).await;
    let update = client.recv_until(|u| u.get("demod").is_some()).await;
    assert_eq!(update["demod"], "USB");

    client.close().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_freq_offset_is_reported() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;
    client.recv().await;

    client.send(json!({"freq_offset": 100})).await;
    let update = client.recv_until(|u| u.get("freq_offset").is_some()).await;
    assert_eq!(update["freq_offset"], 100);

    client.close().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_source_switch_resets_offset() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;
    client.recv().await;

    client.send(json!({"source": 1})).await;
    let update = client.recv_until(|u| u.get("current_source").is_some()).await;
    assert_eq!(update["current_source"]["source_ix"], 1);
    assert_eq!(update["current_source"]["converter_offset"], -100_000_000);
    assert_eq!(update["freq_offset"], 25_000);

    client.close().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_login_then_hardware_change_reaches_everyone() {
    let server = TestServer::start().await;
    let mut admin = server.connect().await;
    let mut listener = server.connect().await;
    admin.recv().await;
    listener.recv().await;

    admin
        .send(json!({"login": {"user": "admin", "pass": "pw"}}))
        .await;
    let update = admin.recv_until(|u| u.get("privileged").is_some()).await;
    assert_eq!(update["privileged"], true);

    admin.send(json!({"hw_freq": 7_150_000})).await;
    let update = listener.recv_until(|u| u["hw_freq"] == 7_150_000).await;
    assert!(update.get("privileged").is_none());

    admin.close().await;
    listener.close().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_hw_freq_requires_login() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;
    client.recv().await;

    client.send(json!({"hw_freq": 7_150_000})).await;
    client.send(json!({"demod": "AM"})).await;
    let update = client.recv_until(|u| u.get("demod").is_some()).await;
    assert_ne!(update["hw_freq"], 7_150_000);

    client.close().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_bad_login_is_reported_unprivileged() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;
    client.recv().await;

    client
        .send(json!({"login": {"user": "admin", "pass": "wrong"}}))
        .await;
    let update = client.recv_until(|u| u.get("privileged").is_some()).await;
    assert_eq!(update["privileged"], false);

    client.close().await;
    server.shutdown().await;
}

// ============================================================================
// Robustness Tests
// ============================================================================

#[tokio::test]
async fn test_malformed_message_keeps_connection() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;
    client.recv().await;

    client.send_raw("not json at all").await;
    client.send_raw("[1, 2, 3]").await;
    client.send(json!({"demod": "AM"})).await;

    let update = client.recv_until(|u| u.get("demod").is_some()).await;
    assert_eq!(update["demod"], "AM");

    client.close().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_oversized_message_is_discarded() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;
    client.recv().await;

    let padding = "x".repeat(MAX_MESSAGE_SIZE);
    client
        .send(json!({"demod": "LSB", "padding": padding}))
        .await;
    client.send(json!({"demod": "AM"})).await;

    let update = client.recv_until(|u| u.get("demod").is_some()).await;
    assert_eq!(update["demod"], "AM");

    client.close().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_binary_frames_are_accepted() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;
    client.recv().await;

    client
        .ws
        .send(Message::Binary(br#"{"demod":"WFM"}"#.to_vec().into()))
        .await
        .unwrap();
    let update = client.recv_until(|u| u.get("demod").is_some()).await;
    assert_eq!(update["demod"], "WFM");

    client.close().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_abrupt_disconnect_frees_session() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;
    client.recv().await;

    drop(client);

    let registry = server.registry.clone();
    timeout(RECV_TIMEOUT, async {
        loop {
            let stats = registry.stats().await.unwrap();
            if stats.num_clients == 0 {
                assert_eq!(stats.graph_state, GraphState::Stopped);
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session should be destroyed after disconnect");

    server.shutdown().await;
}

// ============================================================================
// Shutdown Tests
// ============================================================================

#[tokio::test]
async fn test_graceful_shutdown_closes_clients() {
    let server = TestServer::start().await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;
    a.recv().await;
    b.recv().await;

    let registry = server.registry.clone();
    server.shutdown().await;

    assert!(a.closed_by_server().await);
    assert!(b.closed_by_server().await);

    let stats = registry.stats().await.unwrap();
    assert_eq!(stats.num_clients, 0);
    assert_eq!(stats.running_receivers, 0);
}

#[tokio::test]
async fn test_shutdown_does_not_wait_for_stalled_handshake() {
    let server = TestServer::start().await;
    let _stalled = TcpStream::connect(server.addr).await.expect("tcp connect");
    tokio::time::sleep(Duration::from_millis(100)).await;

    server.cancel_token.cancel();
    timeout(Duration::from_secs(2), server.task)
        .await
        .expect("server should not wait out the handshake timeout")
        .expect("server task panicked")
        .expect("server run failed");
}
