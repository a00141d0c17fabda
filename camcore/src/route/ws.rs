use api::message::{DeviceMessage, ViewerMessage};
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use http::HeaderMap;
use tracing::{debug, info_span, Instrument};

use crate::connection::{
    CloseReason, Connection, ConnectionRx, Outbound, CLOSE_INVALID_CREDENTIAL,
};
use crate::metrics;
use crate::protocol::{classify_binary, classify_text, Handshake, Inbound};
use crate::router::Peer;
use crate::AppState;

/// Outbound depth for a device connection; it only carries commands.
const DEVICE_QUEUE: usize = 16;

pub fn route() -> Router<AppState> {
    Router::new().route(api::path::WS, get(upgrade))
}

async fn upgrade(
    State(state): State<AppState>,
    Query(query): Query<api::request::Connect>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let handshake = Handshake::new(&headers, query);
    let peer = state.router.accept(&handshake).await;
    ws.on_upgrade(move |socket| async move {
        match peer {
            Ok(Peer::Device(device_id)) => {
                let span = info_span!("device", device = %device_id);
                device_session(socket, state, device_id).instrument(span).await
            }
            Ok(Peer::Viewer) => viewer_session(socket, state).await,
            Err(reason) => reject(socket, reason).await,
        }
    })
}

async fn reject(mut socket: WebSocket, reason: CloseReason) {
    let _ = socket.send(close_message(reason)).await;
}

async fn device_session(socket: WebSocket, state: AppState, device_id: String) {
    let (connection, rx) = Connection::new(DEVICE_QUEUE);
    let connection_id = connection.id();
    if !state.router.open_device(&device_id, connection).await {
        // forgotten between handshake and bind
        reject(
            socket,
            CloseReason::new(CLOSE_INVALID_CREDENTIAL, "unknown device"),
        )
        .await;
        return;
    }

    let mut session = Session::new(socket, rx);
    while let Some(received) = session.next().await {
        let inbound: Inbound<DeviceMessage> = received.classify();
        state.router.on_device_message(&device_id, inbound).await;
    }
    state.router.close_device(&device_id, connection_id).await;
}

async fn viewer_session(socket: WebSocket, state: AppState) {
    let (connection, rx) = Connection::new(state.config.viewer.queue);
    let span = info_span!("viewer", viewer = connection.id());
    async {
        metrics::VIEWER.inc();
        debug!("viewer connected");
        let mut session = Session::new(socket, rx);
        while let Some(received) = session.next().await {
            let inbound: Inbound<ViewerMessage> = received.classify();
            state.router.on_viewer_message(&connection, inbound).await;
        }
        state.router.close_viewer(connection.id()).await;
        metrics::VIEWER.dec();
        debug!("viewer disconnected");
    }
    .instrument(span)
    .await
}

enum Received {
    Text(String),
    Binary(Bytes),
}

impl Received {
    fn classify<T: serde::de::DeserializeOwned>(self) -> Inbound<T> {
        match self {
            Received::Text(text) => classify_text(&text),
            Received::Binary(data) => classify_binary(data),
        }
    }
}

/// One WebSocket plus the queue and close signal other components use to
/// reach it.
struct Session {
    sink: SplitSink<WebSocket, Message>,
    stream: SplitStream<WebSocket>,
    rx: ConnectionRx,
}

impl Session {
    fn new(socket: WebSocket, rx: ConnectionRx) -> Self {
        let (sink, stream) = socket.split();
        Self { sink, stream, rx }
    }

    /// Next inbound payload. Outbound messages and close requests are
    /// handled while waiting. None once the connection is done.
    async fn next(&mut self) -> Option<Received> {
        loop {
            tokio::select! {
                msg = self.stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => return Some(Received::Text(text)),
                    Some(Ok(Message::Binary(data))) => return Some(Received::Binary(Bytes::from(data))),
                    Some(Ok(Message::Close(_))) | None => return None,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("websocket error: {}", e);
                        return None;
                    }
                },
                out = self.rx.outbound.recv() => {
                    let Some(out) = out else { return None };
                    let msg = match out {
                        Outbound::Text(text) => Message::Text(text),
                        Outbound::Binary(data) => Message::Binary(data.to_vec()),
                    };
                    if let Err(e) = self.sink.send(msg).await {
                        debug!("websocket send failed: {}", e);
                        return None;
                    }
                }
                changed = self.rx.close.changed() => {
                    let reason = self.rx.close.borrow().clone();
                    if let (Ok(()), Some(reason)) = (changed, reason) {
                        debug!(code = reason.code, "closing websocket: {}", reason.reason);
                        let _ = self.sink.send(close_message(reason)).await;
                    }
                    return None;
                }
            }
        }
    }
}

fn close_message(reason: CloseReason) -> Message {
    Message::Close(Some(CloseFrame {
        code: reason.code,
        reason: reason.reason.into(),
    }))
}
