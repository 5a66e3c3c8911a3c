mod common;

use color_eyre::Result;
use common::*;
use futures::{SinkExt, StreamExt};
use grbl_bridge::{config::Config, state::RuntimeState};
use pretty_assertions::assert_eq;
use tungstenite::Message;

#[tokio::test]
async fn status_is_json() -> Result<()> {
    let bridge = start_bridge(Config::default()).await;

    let (status, body) = http(bridge.bridge.api(), "GET", "/status").await?;
    let state: RuntimeState = serde_json::from_str(&body)?;

    assert_eq!(status, 200);
    assert_eq!(state, RuntimeState::new(DEVICE, false));

    Ok(())
}

#[tokio::test]
async fn status_follows_the_relay() -> Result<()> {
    let bridge = start_bridge(air_forced()).await;
    let mut observer = bridge.observe().await;

    let _client = bridge.connect().await?;
    wait_for(&mut observer, |s| s.client_connected).await?;

    let (_, body) = http(bridge.bridge.api(), "GET", "/status").await?;
    let state: RuntimeState = serde_json::from_str(&body)?;

    assert!(state.client_connected);
    assert!(state.air_override_force);

    Ok(())
}

#[tokio::test]
async fn version_names_the_bridge() -> Result<()> {
    let bridge = start_bridge(Config::default()).await;

    let (status, body) = http(bridge.bridge.api(), "GET", "/version").await?;

    assert_eq!(status, 200);
    assert!(body.starts_with("GRBL Bridge v"));

    Ok(())
}

#[tokio::test]
async fn config_is_served() -> Result<()> {
    let bridge = start_bridge(air_enabled()).await;

    let (status, body) = http(bridge.bridge.api(), "GET", "/config").await?;

    assert_eq!(status, 200);
    assert_eq!(&Config::deserialize(&body)?, bridge.bridge.config());
    assert!(bridge.bridge.config().air.enable);

    Ok(())
}

#[tokio::test]
async fn restart_needs_post() -> Result<()> {
    let bridge = start_bridge(Config::default()).await;

    let (status, _) = http(bridge.bridge.api(), "GET", "/restart").await?;

    assert_eq!(status, 405);

    Ok(())
}

#[tokio::test]
async fn unknown_path_is_not_found() -> Result<()> {
    let bridge = start_bridge(Config::default()).await;

    let (status, _) = http(bridge.bridge.api(), "GET", "/nope").await?;

    assert_eq!(status, 404);

    Ok(())
}

#[tokio::test]
async fn websocket_starts_with_current_state() -> Result<()> {
    let bridge = start_bridge(Config::default()).await;
    let port = bridge.start_api().await;
    bridge
        .bridge
        .store()
        .update(|state| state.streaming = true)
        .await;

    let mut ws = connect_ws(port).await?;

    let initial = receive_ws(&mut ws).await?;
    assert!(initial.streaming);
    assert!(!initial.client_connected);

    Ok(())
}

#[tokio::test]
async fn websocket_gets_every_change() -> Result<()> {
    let mut bridge = start_bridge(air_enabled()).await;
    let port = bridge.start_api().await;

    let mut ws = connect_ws(port).await?;
    let _initial = receive_ws(&mut ws).await?;

    let mut client = bridge.connect().await?;
    assert!(receive_ws(&mut ws).await?.client_connected);

    client.say("G1 X10").await?;
    bridge.controller.expect_line().await?;
    assert!(receive_ws(&mut ws).await?.streaming);
    // Air off at the start of the job.
    assert!(!receive_ws(&mut ws).await?.air_state);

    bridge.controller.say("M8").await?;
    client.expect_line().await?;
    assert!(receive_ws(&mut ws).await?.air_state);

    Ok(())
}

#[tokio::test]
async fn websocket_messages_are_ignored() -> Result<()> {
    let bridge = start_bridge(Config::default()).await;
    let port = bridge.start_api().await;

    let mut ws = connect_ws(port).await?;
    let _initial = receive_ws(&mut ws).await?;

    ws.send(Message::Text("M8".into())).await?;
    ws.send(Message::Binary(vec![1, 2, 3])).await?;

    bridge
        .bridge
        .store()
        .update(|state| state.client_connected = true)
        .await;

    let next = receive_ws(&mut ws).await?;
    assert!(next.client_connected);
    assert!(!next.air_state);

    Ok(())
}

#[tokio::test]
async fn many_websockets_see_the_same_changes() -> Result<()> {
    let bridge = start_bridge(Config::default()).await;
    let port = bridge.start_api().await;

    let mut first = connect_ws(port).await?;
    let mut second = connect_ws(port).await?;
    let _ = receive_ws(&mut first).await?;
    let _ = receive_ws(&mut second).await?;

    bridge
        .bridge
        .store()
        .update(|state| state.streaming = true)
        .await;

    assert_eq!(receive_ws(&mut first).await?, receive_ws(&mut second).await?);

    Ok(())
}

#[tokio::test]
async fn closed_websocket_leaves_the_hub() -> Result<()> {
    let bridge = start_bridge(Config::default()).await;
    let port = bridge.start_api().await;
    let store = bridge.bridge.store();

    let mut ws = connect_ws(port).await?;
    let _initial = receive_ws(&mut ws).await?;
    assert_eq!(store.hub().len().await, 1);

    ws.close(None).await?;
    // Drain until the server's side of the close arrives.
    while let Some(Ok(_)) = ws.next().await {}
    tokio::time::sleep(QUIET).await;

    store.update(|state| state.streaming = true).await;

    assert_eq!(store.hub().len().await, 0);

    Ok(())
}
