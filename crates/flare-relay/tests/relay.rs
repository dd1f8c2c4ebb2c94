//! End-to-end tests against a relay bound to an ephemeral port.

use std::net::SocketAddr;
use std::time::Duration;

use flare_config::RelayConfig;
use flare_relay::{ConnectionRegistry, RelayServer};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestRelay {
    addr: SocketAddr,
    registry: ConnectionRegistry,
    shutdown: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestRelay {
    async fn start(origins: &[&str]) -> Self {
        let config = RelayConfig {
            bind_address: "127.0.0.1".into(),
            port: 0,
            allowed_origins: origins.iter().map(|s| s.to_string()).collect(),
            ..RelayConfig::default()
        };
        let bound = RelayServer::new(config).bind().await.unwrap();
        let addr = bound.local_addr();
        let registry = bound.registry();
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            bound
                .serve_with_shutdown(async move {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });
        Self {
            addr,
            registry,
            shutdown: Some(tx),
            handle,
        }
    }

    fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn connect(&self) -> Client {
        let (ws, _) = connect_async(self.ws_url()).await.unwrap();
        ws
    }

    /// Wait until the server has registered exactly `n` members.
    async fn wait_for_members(&self, n: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.registry.count().await != n {
            assert!(
                tokio::time::Instant::now() < deadline,
                "expected {n} members, have {}",
                self.registry.count().await
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Next text frame, skipping control frames.
async fn next_text(ws: &mut Client) -> String {
    loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("ws error");
        match msg {
            Message::Text(t) => return t.to_string(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected text frame, got {other:?}"),
        }
    }
}

async fn assert_silent(ws: &mut Client) {
    let res = timeout(Duration::from_millis(200), ws.next()).await;
    assert!(res.is_err(), "expected no frame, got {res:?}");
}

#[tokio::test]
async fn message_reaches_every_other_member() {
    let relay = TestRelay::start(&["*"]).await;
    let mut a = relay.connect().await;
    let mut b = relay.connect().await;
    let mut c = relay.connect().await;
    relay.wait_for_members(3).await;

    let payload = r#"{"type":"offer","offer":{"type":"offer","sdp":"v=0"}}"#;
    a.send(Message::Text(payload.into())).await.unwrap();

    assert_eq!(next_text(&mut b).await, payload);
    assert_eq!(next_text(&mut c).await, payload);
    assert_silent(&mut a).await;
}

#[tokio::test]
async fn relay_does_not_parse_payloads() {
    let relay = TestRelay::start(&["*"]).await;
    let mut a = relay.connect().await;
    let mut b = relay.connect().await;
    relay.wait_for_members(2).await;

    a.send(Message::Text("not json at all {".into())).await.unwrap();
    assert_eq!(next_text(&mut b).await, "not json at all {");
}

#[tokio::test]
async fn binary_frames_are_forwarded() {
    let relay = TestRelay::start(&["*"]).await;
    let mut a = relay.connect().await;
    let mut b = relay.connect().await;
    relay.wait_for_members(2).await;

    a.send(Message::Binary(vec![1u8, 2, 3].into())).await.unwrap();

    let msg = timeout(Duration::from_secs(5), b.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match msg {
        Message::Binary(data) => assert_eq!(data.to_vec(), vec![1u8, 2, 3]),
        other => panic!("expected binary frame, got {other:?}"),
    }
}

#[tokio::test]
async fn frames_from_one_sender_keep_their_order() {
    let relay = TestRelay::start(&["*"]).await;
    let mut a = relay.connect().await;
    let mut b = relay.connect().await;
    relay.wait_for_members(2).await;

    for i in 0..20 {
        a.send(Message::Text(format!("m{i}").into())).await.unwrap();
    }
    for i in 0..20 {
        assert_eq!(next_text(&mut b).await, format!("m{i}"));
    }
}

#[tokio::test]
async fn lone_member_hears_nothing() {
    let relay = TestRelay::start(&["*"]).await;
    let mut a = relay.connect().await;
    relay.wait_for_members(1).await;

    a.send(Message::Text("anyone?".into())).await.unwrap();
    assert_silent(&mut a).await;
}

#[tokio::test]
async fn closed_member_is_removed_and_health_reports_it() {
    let relay = TestRelay::start(&["*"]).await;
    let mut a = relay.connect().await;
    let mut b = relay.connect().await;
    let mut c = relay.connect().await;
    relay.wait_for_members(3).await;

    c.close(None).await.unwrap();
    relay.wait_for_members(2).await;

    let body: serde_json::Value = reqwest::get(relay.http_url("/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["clients"], 2);
    assert!(body["timestamp"].as_str().unwrap().contains('T'));

    // The survivors still talk to each other.
    a.send(Message::Text("still here".into())).await.unwrap();
    assert_eq!(next_text(&mut b).await, "still here");
}

#[tokio::test]
async fn health_with_no_members() {
    let relay = TestRelay::start(&["*"]).await;
    let resp = reqwest::get(relay.http_url("/health")).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["clients"], 0);
}

#[tokio::test]
async fn options_preflight_returns_no_content() {
    let relay = TestRelay::start(&["*"]).await;
    let resp = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, relay.http_url("/anything"))
        .header("Origin", "https://exam.example")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), reqwest::StatusCode::NO_CONTENT);
    let headers = resp.headers();
    assert_eq!(
        headers["access-control-allow-origin"],
        "https://exam.example"
    );
    assert_eq!(headers["access-control-allow-methods"], "GET, POST, OPTIONS");
    assert_eq!(
        headers["access-control-allow-headers"],
        "Content-Type, Authorization"
    );
    assert_eq!(headers["access-control-allow-credentials"], "true");
}

#[tokio::test]
async fn unlisted_origin_gets_no_allow_origin_but_keeps_the_rest() {
    let relay = TestRelay::start(&["https://exam.example"]).await;
    let resp = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, relay.http_url("/anything"))
        .header("Origin", "https://elsewhere.example")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), reqwest::StatusCode::NO_CONTENT);
    let headers = resp.headers();
    assert!(headers.get("access-control-allow-origin").is_none());
    assert_eq!(headers["access-control-allow-credentials"], "true");
    assert_eq!(headers["access-control-allow-methods"], "GET, POST, OPTIONS");
}

#[tokio::test]
async fn health_carries_cors_headers() {
    let relay = TestRelay::start(&["*"]).await;
    let resp = reqwest::get(relay.http_url("/health")).await.unwrap();

    let headers = resp.headers();
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(headers["access-control-allow-credentials"], "true");
}

#[tokio::test]
async fn other_paths_serve_the_banner() {
    let relay = TestRelay::start(&["*"]).await;
    let resp = reqwest::get(relay.http_url("/")).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(
        resp.text().await.unwrap(),
        "WebSocket Signaling Server Running\n"
    );

    let resp = reqwest::get(relay.http_url("/some/page")).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
}

#[tokio::test]
async fn disallowed_origin_is_refused() {
    let relay = TestRelay::start(&["https://exam.example"]).await;

    let mut request = relay.ws_url().into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", HeaderValue::from_static("https://evil.example"));

    match connect_async(request).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(resp)) => {
            assert_eq!(resp.status(), 403);
        }
        Err(other) => panic!("expected HTTP 403, got {other}"),
        Ok(_) => panic!("upgrade should have been refused"),
    }
    assert_eq!(relay.registry.count().await, 0);
}

#[tokio::test]
async fn allowed_origin_connects() {
    let relay = TestRelay::start(&["https://exam.example"]).await;

    let mut request = relay.ws_url().into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", HeaderValue::from_static("https://exam.example"));

    let (_ws, _) = connect_async(request).await.unwrap();
    relay.wait_for_members(1).await;
}

#[tokio::test]
async fn shutdown_closes_members() {
    let mut relay = TestRelay::start(&["*"]).await;
    let mut a = relay.connect().await;
    relay.wait_for_members(1).await;

    relay.shutdown.take().unwrap().send(()).unwrap();

    let ended = timeout(Duration::from_secs(5), async {
        loop {
            match a.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "member was not closed on shutdown");
    assert_eq!(relay.registry.count().await, 0);

    timeout(Duration::from_secs(5), relay.handle)
        .await
        .expect("server did not stop")
        .unwrap();
}
