//! Loopback tests for a running hub agent
//!
//! Peripherals are real WebSocket clients on 127.0.0.1, and the cloud is a
//! bare `accept_async` server on an ephemeral port.
//!
//! Run: `cargo test -p homehub-relay --test loopback`

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, connect_async, MaybeTlsStream, WebSocketStream};

use homehub_relay::{HubAgent, HubAgentHandle, HubConfig, SessionState};

type Peer = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Cloud = WebSocketStream<TcpStream>;

const WAIT: Duration = Duration::from_secs(5);

// ── Helpers ──────────────────────────────────────────────────────────

fn loopback_config(upstream: Option<String>) -> HubConfig {
    let mut config = HubConfig::default();
    config.hub.id = "hub-loop".to_string();
    config.local.bind_addr = "127.0.0.1".to_string();
    config.local.port = 0;
    config.upstream.url = upstream;
    config.upstream.username = "owner".to_string();
    config.upstream.password = "secret".to_string();
    config.upstream.reconnect_interval_secs = 1;
    config.upstream.connect_timeout_secs = 2;
    config.registry.inventory_log_interval_secs = 0;
    config
}

async fn connect_peer(hub: &HubAgentHandle) -> Peer {
    let url = format!("ws://{}/ws", hub.local_addr());
    let (ws, _) = timeout(WAIT, connect_async(url.as_str()))
        .await
        .expect("peer connect timed out")
        .expect("peer connect failed");
    ws
}

async fn send_json<S>(ws: &mut WebSocketStream<S>, value: Value)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("send failed");
}

/// Reads the next text frame as JSON, skipping control frames.
async fn next_json<S>(ws: &mut WebSocketStream<S>) -> Value
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    loop {
        let frame = timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).expect("invalid JSON");
        }
    }
}

async fn wait_for_state(hub: &HubAgentHandle, want: SessionState) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while hub.session_state().await.unwrap() != want {
        assert!(tokio::time::Instant::now() < deadline, "never reached {want}");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn wait_for_status(hub: &HubAgentHandle, device_id: &str, want: &str) {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let devices = hub.devices().await.unwrap();
        if devices.iter().any(|d| d.id == device_id && d.status == want) {
            return;
        }
        assert!(tokio::time::Instant::now() < deadline, "{device_id} never reported {want}");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

// ── Local side ───────────────────────────────────────────────────────

#[tokio::test]
async fn peripheral_registration_is_confirmed() {
    let hub = HubAgent::new(loopback_config(None)).start().await.unwrap();
    let mut peer = connect_peer(&hub).await;

    send_json(
        &mut peer,
        json!({"type": "registration", "deviceId": "sw-1", "deviceType": "smart_switch"}),
    )
    .await;

    assert_eq!(
        next_json(&mut peer).await,
        json!({"type": "registration_confirm", "deviceId": "sw-1", "success": true})
    );

    send_json(&mut peer, json!({"type": "status", "deviceId": "sw-1", "status": "ON"})).await;
    wait_for_status(&hub, "sw-1", "ON").await;
    assert_eq!(hub.devices().await.unwrap().len(), 1);

    hub.shutdown().await.unwrap();
}

#[tokio::test]
async fn closing_the_peer_detaches_its_device() {
    let hub = HubAgent::new(loopback_config(None)).start().await.unwrap();
    let mut peer = connect_peer(&hub).await;

    send_json(
        &mut peer,
        json!({"type": "registration", "deviceId": "blind-1", "deviceType": "window_blind"}),
    )
    .await;
    next_json(&mut peer).await;

    peer.close(None).await.unwrap();

    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let devices = hub.devices().await.unwrap();
        assert_eq!(devices.len(), 1);
        if devices[0].endpoint.is_none() {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "endpoint never detached");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    hub.shutdown().await.unwrap();
}

#[tokio::test]
async fn broadcast_reaches_every_peer() {
    let hub = HubAgent::new(loopback_config(None)).start().await.unwrap();
    let mut first = connect_peer(&hub).await;
    let mut second = connect_peer(&hub).await;

    // Register both so the listener has reported them to the loop.
    send_json(
        &mut first,
        json!({"type": "registration", "deviceId": "a", "deviceType": "smart_bulb"}),
    )
    .await;
    next_json(&mut first).await;
    send_json(
        &mut second,
        json!({"type": "registration", "deviceId": "b", "deviceType": "smart_bulb"}),
    )
    .await;
    next_json(&mut second).await;

    let delivered = hub
        .broadcast(homehub_relay::HubToDevice::command("off"))
        .await
        .unwrap();
    assert_eq!(delivered, 2);

    let expected = json!({"type": "command", "command": "off"});
    assert_eq!(next_json(&mut first).await, expected);
    assert_eq!(next_json(&mut second).await, expected);

    hub.shutdown().await.unwrap();
}

// ── Cloud side ───────────────────────────────────────────────────────

async fn accept_cloud(listener: &TcpListener) -> Cloud {
    let (stream, _) = timeout(WAIT, listener.accept())
        .await
        .expect("hub never dialed the cloud")
        .unwrap();
    accept_async(stream).await.unwrap()
}

#[tokio::test]
async fn cloud_session_authenticates_and_routes_control() {
    let cloud_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let cloud_url = format!("ws://{}", cloud_listener.local_addr().unwrap());

    let hub = HubAgent::new(loopback_config(Some(cloud_url)))
        .start()
        .await
        .unwrap();

    // A device registers before the cloud is reachable.
    let mut peer = connect_peer(&hub).await;
    send_json(
        &mut peer,
        json!({"type": "registration", "deviceId": "A", "deviceType": "smart_switch"}),
    )
    .await;
    next_json(&mut peer).await;
    send_json(&mut peer, json!({"type": "status", "deviceId": "A", "status": "ON"})).await;
    wait_for_status(&hub, "A", "ON").await;

    hub.connect_upstream().await.unwrap();
    let mut cloud = accept_cloud(&cloud_listener).await;

    let auth = next_json(&mut cloud).await;
    assert_eq!(
        auth,
        json!({"type": "auth", "hubId": "hub-loop", "username": "owner", "password": "secret"})
    );

    send_json(&mut cloud, json!({"type": "auth_response", "success": true})).await;

    let status = next_json(&mut cloud).await;
    assert_eq!(status["type"], "hub_status");
    assert_eq!(status["hubId"], "hub-loop");
    assert_eq!(
        status["devices"],
        json!([{"id": "A", "type": "smart_switch", "status": "ON"}])
    );
    wait_for_state(&hub, SessionState::Authenticated).await;

    // Cloud control reaches the device.
    send_json(&mut cloud, json!({"type": "control", "deviceId": "A", "command": "toggle"})).await;
    assert_eq!(
        next_json(&mut peer).await,
        json!({"type": "command", "command": "toggle"})
    );

    // Device events are relayed now that the session is authenticated.
    send_json(&mut peer, json!({"type": "status", "deviceId": "A", "status": "OFF"})).await;
    assert_eq!(
        next_json(&mut cloud).await,
        json!({"type": "device_status", "hubId": "hub-loop", "deviceId": "A", "status": "OFF"})
    );

    hub.shutdown().await.unwrap();
}

#[tokio::test]
async fn hub_reauthenticates_after_cloud_drops() {
    let cloud_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let cloud_url = format!("ws://{}", cloud_listener.local_addr().unwrap());

    let hub = HubAgent::new(loopback_config(Some(cloud_url)))
        .start()
        .await
        .unwrap();
    hub.connect_upstream().await.unwrap();

    let mut cloud = accept_cloud(&cloud_listener).await;
    assert_eq!(next_json(&mut cloud).await["type"], "auth");
    send_json(&mut cloud, json!({"type": "auth_response", "success": true})).await;
    assert_eq!(next_json(&mut cloud).await["type"], "hub_status");

    drop(cloud);

    // Fixed one-second retry; the new link must authenticate from scratch.
    let mut cloud = accept_cloud(&cloud_listener).await;
    assert_eq!(next_json(&mut cloud).await["type"], "auth");
    assert_ne!(hub.session_state().await.unwrap(), SessionState::Authenticated);

    send_json(&mut cloud, json!({"type": "auth_response", "success": true})).await;
    assert_eq!(next_json(&mut cloud).await["type"], "hub_status");

    hub.shutdown().await.unwrap();
}
