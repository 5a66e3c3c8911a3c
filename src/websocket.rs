use std::net::SocketAddr;

use futures::{sink::Sink, stream::Stream, SinkExt, StreamExt};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, WebSocketUpgrade,
    },
    response::IntoResponse,
    Extension, TypedHeader,
};
use tracing::{debug, error, info, info_span, trace, Instrument};

use crate::{hub::Observer, state::StateStore};

pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    user_agent: Option<TypedHeader<headers::UserAgent>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Extension(store): Extension<StateStore>,
) -> impl IntoResponse {
    if let Some(TypedHeader(user_agent)) = user_agent {
        info!("`{}`@`{addr}` connected", user_agent.as_str());
    }

    ws.on_upgrade(move |socket| {
        let span = info_span!("Observer", %addr);

        handle_websocket(socket, store).instrument(span)
    })
}

/// Observers only listen. Anything they say just keeps the connection alive.
pub(crate) async fn read<S>(mut receiver: S)
where
    S: Unpin,
    S: Stream<Item = Result<Message, axum::Error>>,
{
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Close(_) => {
                debug!("client disconnected");
                break;
            }
            other => {
                trace!(?other, "ignoring observer message");
            }
        }
    }
}

pub(crate) async fn write(mut sender: impl Sink<Message> + Unpin, mut observer: Observer) {
    while let Some(snapshot) = observer.recv().await {
        let snapshot = match serde_json::to_string(&snapshot) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(?e, "Could not serialize state");
                continue;
            }
        };

        if sender.send(Message::Text(snapshot)).await.is_err() {
            debug!("client disconnected");
            return;
        }
        trace!("Snapshot flushed");
    }

    debug!("hub dropped this observer");
}

pub(crate) async fn handle_websocket(websocket: WebSocket, store: StateStore) {
    let observer = store.subscribe().await;
    let id = observer.id();
    debug!(%id, "Observing");

    let (stream_sender, stream_receiver) = websocket.split();

    let mut read_handle = tokio::spawn(read(stream_receiver).instrument(info_span!("Read")));
    let mut write_handle =
        tokio::spawn(write(stream_sender, observer).instrument(info_span!("Write")));

    tokio::select! {
        _ = &mut read_handle => debug!("Read task joined"),
        _ = &mut write_handle => debug!("Write task joined"),
    }

    // Dropping the observer (with the write task) takes it out of the hub
    // at the next publish, and closes the socket.
    read_handle.abort();
    write_handle.abort();

    debug!(%id, "No longer observing");
}
