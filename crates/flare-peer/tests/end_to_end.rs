//! Two endpoints negotiating through a real relay on an ephemeral port,
//! paired by an in-memory transport.

use std::sync::Arc;
use std::time::Duration;

use flare_common::{Category, Envelope, Urgency};
use flare_config::{PeerConfig, RelayConfig};
use flare_peer::{
    ConnectionStatus, MemoryNetwork, NegotiationState, PeerClient, PeerEvent, RejectReason,
    SendOutcome,
};
use flare_relay::{ConnectionRegistry, RelayServer};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(10);

async fn start_relay() -> (String, ConnectionRegistry) {
    let config = RelayConfig {
        bind_address: "127.0.0.1".into(),
        port: 0,
        ..RelayConfig::default()
    };
    let bound = RelayServer::new(config).bind().await.unwrap();
    let url = format!("ws://{}", bound.local_addr());
    let registry = bound.registry();
    tokio::spawn(async move {
        let _ = bound.serve().await;
    });
    (url, registry)
}

fn peer_config(url: &str, auto_negotiate: bool) -> PeerConfig {
    PeerConfig {
        relay_url: url.to_string(),
        auto_negotiate,
        ..PeerConfig::default()
    }
}

async fn wait_for_members(registry: &ConnectionRegistry, n: usize) {
    timeout(WAIT, async {
        while registry.count().await != n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("relay never reached {n} members"));
}

/// Consume events until one matches, returning everything seen.
async fn wait_for<F>(events: &mut mpsc::Receiver<PeerEvent>, mut pred: F) -> Vec<PeerEvent>
where
    F: FnMut(&PeerEvent) -> bool,
{
    let mut seen = Vec::new();
    timeout(WAIT, async {
        while let Some(event) = events.recv().await {
            let done = pred(&event);
            seen.push(event);
            if done {
                return;
            }
        }
        panic!("event stream ended");
    })
    .await
    .unwrap_or_else(|_| panic!("timed out; saw {seen:?}"));
    seen
}

/// Collect whatever arrives within `window`.
async fn drain_for(events: &mut mpsc::Receiver<PeerEvent>, window: Duration) -> Vec<PeerEvent> {
    let mut seen = Vec::new();
    while let Ok(Some(event)) = timeout(window, events.recv()).await {
        seen.push(event);
    }
    seen
}

fn is_connected(event: &PeerEvent) -> bool {
    matches!(event, PeerEvent::StatusChanged(ConnectionStatus::Connected))
}

fn is_connecting(event: &PeerEvent) -> bool {
    matches!(event, PeerEvent::StatusChanged(ConnectionStatus::Connecting))
}

fn connected_transitions(events: &[PeerEvent]) -> usize {
    events
        .iter()
        .filter(|e| {
            matches!(
                e,
                PeerEvent::StateChanged {
                    to: NegotiationState::Connected,
                    ..
                }
            )
        })
        .count()
}

struct Pair {
    a: PeerClient,
    a_events: mpsc::Receiver<PeerEvent>,
    a_seen: Vec<PeerEvent>,
    b: PeerClient,
    b_events: mpsc::Receiver<PeerEvent>,
    b_seen: Vec<PeerEvent>,
}

/// `others` counts relay members that are not part of the pair.
async fn connected_pair(url: &str, registry: &ConnectionRegistry, others: usize) -> Pair {
    let network = MemoryNetwork::new();
    let (a, mut a_events) = PeerClient::connect(peer_config(url, false), Arc::new(network.clone()));
    let (b, mut b_events) = PeerClient::connect(peer_config(url, false), Arc::new(network));

    let mut a_seen = wait_for(&mut a_events, is_connecting).await;
    let mut b_seen = wait_for(&mut b_events, is_connecting).await;
    wait_for_members(registry, others + 2).await;

    a.negotiate().await;
    a_seen.extend(wait_for(&mut a_events, is_connected).await);
    b_seen.extend(wait_for(&mut b_events, is_connected).await);

    Pair {
        a,
        a_events,
        a_seen,
        b,
        b_events,
        b_seen,
    }
}

#[tokio::test]
async fn endpoints_connect_exactly_once() {
    let (url, registry) = start_relay().await;
    let mut pair = connected_pair(&url, &registry, 0).await;

    pair.a_seen
        .extend(drain_for(&mut pair.a_events, Duration::from_millis(300)).await);
    pair.b_seen
        .extend(drain_for(&mut pair.b_events, Duration::from_millis(300)).await);

    assert_eq!(connected_transitions(&pair.a_seen), 1);
    assert_eq!(connected_transitions(&pair.b_seen), 1);
    assert_eq!(pair.a.state().await, NegotiationState::Connected);
    assert_eq!(pair.b.state().await, NegotiationState::Connected);
    assert_eq!(pair.a.status().await, ConnectionStatus::Connected);
}

#[tokio::test]
async fn help_round_trip_preserves_signal() {
    let (url, registry) = start_relay().await;
    let mut pair = connected_pair(&url, &registry, 0).await;

    let outcome = pair.a.send_signal("Help", Category::Status).await;
    let SendOutcome::Sent(sent) = outcome else {
        panic!("send should succeed once connected, got {outcome:?}");
    };
    assert_eq!(pair.a.last_sent().await, Some(sent.clone()));

    let seen = wait_for(&mut pair.b_events, |e| {
        matches!(e, PeerEvent::SignalReceived { .. })
    })
    .await;
    let Some(PeerEvent::SignalReceived { signal, feedback }) = seen.last() else {
        unreachable!();
    };
    assert_eq!(signal.message, "Help");
    assert_eq!(signal.category, Category::Status);
    assert_eq!(signal.timestamp, sent.timestamp);
    assert_eq!(feedback.urgency, Urgency::Critical);
    assert_eq!(feedback.vibration, &[100, 50, 100, 50, 100]);
}

#[tokio::test]
async fn unknown_code_gets_default_feedback() {
    let (url, registry) = start_relay().await;
    let mut pair = connected_pair(&url, &registry, 0).await;

    assert!(pair.b.send_signal("Zebra", Category::Answer).await.is_sent());

    let seen = wait_for(&mut pair.a_events, |e| {
        matches!(e, PeerEvent::SignalReceived { .. })
    })
    .await;
    let Some(PeerEvent::SignalReceived { signal, feedback }) = seen.last() else {
        unreachable!();
    };
    assert_eq!(signal.message, "Zebra");
    assert!(!feedback.recognized);
    assert_eq!(feedback.color, "#4a9eff");
}

#[tokio::test]
async fn send_before_connected_is_rejected_silently() {
    let (url, registry) = start_relay().await;
    let (mut observer, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();

    let (a, mut a_events) =
        PeerClient::connect(peer_config(&url, false), Arc::new(MemoryNetwork::new()));
    wait_for(&mut a_events, is_connecting).await;
    wait_for_members(&registry, 2).await;

    let outcome = a.send_signal("A", Category::Answer).await;
    assert_eq!(outcome, SendOutcome::Rejected(RejectReason::NotConnected));
    assert_eq!(a.last_sent().await, None);

    let heard = timeout(Duration::from_millis(300), observer.next()).await;
    assert!(heard.is_err(), "rejected send must not reach the relay: {heard:?}");
}

#[tokio::test]
async fn relay_members_see_browser_shaped_envelopes() {
    let (url, registry) = start_relay().await;
    let (mut observer, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    wait_for_members(&registry, 1).await;

    let _pair = connected_pair(&url, &registry, 1).await;

    let mut kinds = Vec::new();
    while let Ok(Some(Ok(msg))) = timeout(Duration::from_millis(300), observer.next()).await {
        if let Message::Text(text) = msg {
            let envelope = Envelope::decode(text.as_str()).expect("relay traffic is envelopes");
            kinds.push(envelope.kind());
        }
    }

    assert_eq!(kinds.iter().filter(|k| **k == "offer").count(), 1);
    assert_eq!(kinds.iter().filter(|k| **k == "answer").count(), 1);
    assert!(kinds.contains(&"candidate"));
}

#[tokio::test]
async fn late_joiner_offer_wins_over_unheard_offer() {
    let (url, registry) = start_relay().await;
    let network = MemoryNetwork::new();

    // a offers into an empty relay.
    let (a, mut a_events) = PeerClient::connect(peer_config(&url, true), Arc::new(network.clone()));
    wait_for(&mut a_events, |e| {
        matches!(
            e,
            PeerEvent::StateChanged {
                to: NegotiationState::AwaitingRemoteDescription,
                ..
            }
        )
    })
    .await;

    // b arrives and offers; a yields and answers.
    let (b, mut b_events) = PeerClient::connect(peer_config(&url, true), Arc::new(network));
    wait_for(&mut a_events, is_connected).await;
    wait_for(&mut b_events, is_connected).await;

    assert_eq!(a.state().await, NegotiationState::Connected);
    assert_eq!(b.state().await, NegotiationState::Connected);
    assert_eq!(registry.count().await, 2);
}

#[tokio::test]
async fn peer_shutdown_disconnects_the_other_side() {
    let (url, registry) = start_relay().await;
    let mut pair = connected_pair(&url, &registry, 0).await;

    pair.b.shutdown().await;

    wait_for(&mut pair.a_events, |e| {
        matches!(e, PeerEvent::StatusChanged(ConnectionStatus::Disconnected))
    })
    .await;
    assert_eq!(pair.a.state().await, NegotiationState::Disconnected);
    assert!(!pair.a.send_signal("A", Category::Answer).await.is_sent());

    // No automatic retry.
    let later = drain_for(&mut pair.a_events, Duration::from_millis(300)).await;
    assert_eq!(connected_transitions(&later), 0);
    assert!(pair.b_seen.iter().any(is_connected));
}
