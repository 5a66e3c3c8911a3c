#![allow(dead_code)]

use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use axum::{
    body::{Body, HttpBody},
    http::Request,
    Router,
};
use futures::{SinkExt, StreamExt};
use grbl_bridge::{
    air::mock::MockPin,
    bridge::Bridge,
    config::{AirConfig, Config},
    hub::Observer,
    relay,
    serial::{codecs::lines::StringCodec, serial_port::SerialPortHandle, SerialMessage},
    server,
    state::RuntimeState,
};
use tokio::{io::DuplexStream, net::TcpStream, sync::oneshot, time::timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::codec::Framed;
use tower::ServiceExt;
use tracing::info;

pub const DEVICE: &str = "/dev/ttyMock";

const WAIT: Duration = Duration::from_secs(5);

/// Long enough that something which was going to happen would have.
pub const QUIET: Duration = Duration::from_millis(300);

pub fn air_enabled() -> Config {
    Config {
        air: AirConfig {
            enable: true,
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn air_forced() -> Config {
    Config {
        air: AirConfig {
            enable: true,
            override_force: true,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Lines as a [`Framed`] byte stream, for both the relay client and the fake controller.
pub struct LineEnd<T> {
    framed: Framed<T, StringCodec>,
}

impl<T> LineEnd<T>
where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    fn new(io: T) -> Self {
        Self {
            framed: Framed::new(io, StringCodec::default()),
        }
    }

    pub async fn say(&mut self, line: &str) -> Result<()> {
        self.framed.send(SerialMessage::from(line)).await?;
        Ok(())
    }

    pub async fn expect_line(&mut self) -> Result<SerialMessage> {
        let line = timeout(WAIT, self.framed.next())
            .await?
            .ok_or_else(|| eyre!("Stream closed"))??;

        Ok(line)
    }

    /// Nothing arrives for a while.
    pub async fn expect_silence(&mut self) -> Result<()> {
        match timeout(QUIET, self.framed.next()).await {
            Err(_elapsed) => Ok(()),
            Ok(other) => Err(eyre!("Expected silence, got {other:?}")),
        }
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.framed.get_mut()
    }
}

/// The relay's TCP client.
pub type Client = LineEnd<TcpStream>;

/// The motion controller's side of the serial line.
pub type Controller = LineEnd<DuplexStream>;

pub struct TestBridge {
    pub bridge: Bridge,
    pub controller: Controller,
    pub pin: MockPin,
    pub relay_port: u16,
}

/// A bridge on a fake serial device with a mock pin, relay running on any port.
pub async fn start_bridge(config: Config) -> TestBridge {
    let (port, device) = tokio::io::duplex(4096);
    let serial = SerialPortHandle::new(port, DEVICE, StringCodec::default());

    let pin = MockPin::new();
    let bridge = Bridge::with_parts(config, serial, Some(Box::new(pin.clone()))).await;

    let (port_tx, port_rx) = oneshot::channel();
    let relay = bridge.relay();
    tokio::spawn(async move { relay::run_any_port(relay, port_tx).await });
    let relay_port = port_rx
        .await
        .expect("Relay should reply with allocated port");

    TestBridge {
        bridge,
        controller: LineEnd::new(device),
        pin,
        relay_port,
    }
}

pub async fn connect_relay(port: u16) -> Result<Client> {
    info!("Connecting to relay on port {port}");
    let stream = TcpStream::connect(("127.0.0.1", port)).await?;

    Ok(LineEnd::new(stream))
}

impl TestBridge {
    pub async fn connect(&self) -> Result<Client> {
        connect_relay(self.relay_port).await
    }

    pub async fn observe(&self) -> Observer {
        self.bridge.store().subscribe().await
    }

    /// Start the status API, returning its port.
    pub async fn start_api(&self) -> u16 {
        let (port_tx, port_rx) = oneshot::channel();
        let app = self.bridge.api();

        tokio::spawn(async move { server::run_any_port(app, port_tx).await });
        port_rx
            .await
            .expect("Server should reply with allocated port")
    }
}

pub async fn next_state(observer: &mut Observer) -> Result<RuntimeState> {
    timeout(WAIT, observer.recv())
        .await?
        .ok_or_else(|| eyre!("Observer was dropped"))
}

/// Skip states until one matches.
pub async fn wait_for<F>(observer: &mut Observer, wanted: F) -> Result<RuntimeState>
where
    F: Fn(&RuntimeState) -> bool,
{
    loop {
        let state = next_state(observer).await?;
        if wanted(&state) {
            return Ok(state);
        }
    }
}

pub async fn connect_ws(port: u16) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>> {
    info!("Connecting to API on port {port}");
    let (stream, http_response) =
        tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{port}/ws")).await?;

    assert_eq!(http_response.status().as_u16(), 101);

    Ok(stream)
}

pub async fn receive_ws(
    client: &mut WebSocketStream<MaybeTlsStream<TcpStream>>,
) -> Result<RuntimeState> {
    let response = timeout(WAIT, client.next())
        .await?
        .ok_or_else(|| eyre!("Stream closed"))??;

    let response = response.to_text()?;
    let response = serde_json::from_str(response)?;

    Ok(response)
}

/// Run one request through the API, returning the status code and body.
pub async fn http(app: Router, method: &str, path: &str) -> Result<(u16, String)> {
    let request = Request::builder()
        .method(method)
        .uri(path)
        .body(Body::empty())?;

    let response = app.oneshot(request).await?;
    let status = response.status().as_u16();

    let mut body = response.into_body();
    let mut bytes = Vec::new();
    while let Some(chunk) = body.data().await {
        bytes.extend_from_slice(&chunk?);
    }

    Ok((status, String::from_utf8(bytes)?))
}
