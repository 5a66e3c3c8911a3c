//! The TCP side of the bridge.
//!
//! One client at a time is relayed to the serial device.
//! Connections are accepted one after another: a second client waits in the
//! listen backlog until the first one is done.
//!
//! Per client there are two directions:
//! - client to serial runs in the accepting task,
//!   which also watches for the start of a job,
//! - serial to client runs in a spawned task,
//!   which also lets the [`Sniffer`] see every line.
//!
//! The spawned task is cancelled when the client stops sending, even if it is
//! stuck writing to a client which no longer reads.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt};
use tokio::{
    net::{tcp::OwnedWriteHalf, TcpListener, TcpStream},
    sync::oneshot,
};
use tokio_util::{
    codec::{FramedRead, FramedWrite},
    sync::CancellationToken,
};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    air::AirAssist,
    error::Error,
    serial::{codecs::lines::StringCodec, serial_port::SerialPortHandle},
    sniffer::Sniffer,
    state::StateStore,
    streaming::StreamTracker,
};

/// The default port to accept relay clients on.
pub const DEFAULT_PORT: u16 = 3333;

/// How long a serial read may wait before checking in again.
pub const SERIAL_POLL: Duration = Duration::from_millis(100);

/// Pause after a failed accept, so a persistent failure doesn't spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Relays TCP clients to the serial device.
#[derive(Debug, Clone)]
pub struct Relay {
    serial: Arc<SerialPortHandle>,
    store: StateStore,
    stream: StreamTracker,
    sniffer: Sniffer,
}

impl Relay {
    /// Relay to `serial`, reporting to `store` and driving `air`.
    pub fn new(serial: Arc<SerialPortHandle>, store: StateStore, air: AirAssist) -> Self {
        Self {
            serial,
            stream: StreamTracker::new(store.clone(), air.clone()),
            sniffer: Sniffer::new(air),
            store,
        }
    }

    /// Accept and serve clients, one at a time, forever.
    pub async fn serve(self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((socket, peer)) => {
                    let span = info_span!("Session", %peer);
                    self.session(socket, peer).instrument(span).await;
                }
                Err(e) => {
                    warn!(?e, "Accept error");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }

    async fn session(&self, socket: TcpStream, peer: SocketAddr) {
        let (read_half, write_half) = socket.into_split();
        let done = CancellationToken::new();

        self.store
            .update(|state| state.client_connected = true)
            .await;
        info!("Client {} connected", peer.ip());

        let reader = tokio::spawn(
            self.clone()
                .serial_to_client(
                    FramedWrite::new(write_half, StringCodec::default()),
                    done.clone(),
                )
                .instrument(info_span!("Serial reader")),
        );

        let mut lines = FramedRead::new(read_half, StringCodec::default());

        while let Some(frame) = lines.next().await {
            let line = match frame {
                Ok(line) => line.trimmed(),
                Err(e) => {
                    warn!(?e, "Client error");
                    break;
                }
            };

            if line.is_blank() {
                continue;
            }

            self.stream.observe_client_line(line.as_str()).await;

            if let Err(e) = self.serial.write_line(line) {
                error!(?e, "Could not write to serial");
            }
        }

        // The reader owns the write half, so once it is gone the connection is closed.
        done.cancel();
        match reader.await {
            Ok(()) => debug!("Serial reader joined"),
            Err(e) => warn!("Serial reader join error: {e:?}"),
        }

        self.store
            .update(|state| state.client_connected = false)
            .await;
        self.stream.end().await;

        info!("Client disconnected");
    }

    async fn serial_to_client(
        self,
        mut client: FramedWrite<OwnedWriteHalf, StringCodec>,
        done: CancellationToken,
    ) {
        loop {
            // Waiting on the serial channel is cancel safe: no line is taken unless returned.
            let read = tokio::select! {
                _ = done.cancelled() => break,
                read = self.serial.read_line(SERIAL_POLL) => read,
            };

            let line = match read {
                Ok(Some(line)) => line.trimmed(),
                Ok(None) => continue,
                Err(e) => {
                    error!(?e, "Serial RX error");
                    break;
                }
            };

            if line.is_blank() {
                continue;
            }

            // Not cancellable, so the valve and the published state stay in step.
            self.sniffer.inspect(&line).await;

            tokio::select! {
                _ = done.cancelled() => {
                    debug!("Client left before a line could be sent");
                    break;
                }
                sent = client.send(line) => {
                    if let Err(e) = sent {
                        debug!(?e, "Client went away");
                        break;
                    }
                }
            }
        }
    }
}

async fn run(
    relay: Relay,
    port: Option<u16>,
    allocated_port: Option<oneshot::Sender<u16>>,
) -> Result<(), Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port.unwrap_or(0)));
    let listener = TcpListener::bind(addr).await?;
    let addr = listener.local_addr()?;

    if let Some(port_reply) = allocated_port {
        if port_reply.send(addr.port()).is_err() {
            warn!("Nobody wanted to know the allocated relay port");
        }
    }

    info!("Bridge listening on {}", addr);

    relay.serve(listener).await;

    Ok(())
}

/// Start the relay on an arbitrary available port.
/// The port allocated will be sent on the provided channel.
///
/// Only returns if the port could not be bound.
pub async fn run_any_port(relay: Relay, allocated_port: oneshot::Sender<u16>) -> Result<(), Error> {
    run(relay, None, Some(allocated_port)).await
}

/// Start the relay on the given port.
///
/// Only returns if the port could not be bound.
pub async fn run_on_port(relay: Relay, port: u16) -> Result<(), Error> {
    run(relay, Some(port), None).await
}
