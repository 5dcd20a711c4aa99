// Copyright 2026 The Wicket Project
// SPDX-License-Identifier: Apache-2.0

// WebSocket entry point and per-pair wiring.
//
// Responsibilities:
// - Accept the client upgrade (any path, per the wire protocol)
// - Fetch a credential and dial upstream, once per accepted client
// - Pump both sockets into the pair's event channel and drain the
//   pair's outbound channels back into the sockets
// - Heartbeat endpoint
//
// Exactly one set of handlers exists per pair: each socket half is
// owned by exactly one task, and all decisions happen in the pair's
// event loop (relay.rs).

use crate::auth::{Credential, CredentialProvider};
use crate::config::Config;
use crate::relay::{ConnectionPair, Frame, LegEvent, PairEvent};
use crate::tools::ToolRegistry;
use crate::upstream::{UpstreamConnection, UpstreamConnector};
use axum::extract::ws::{Message as ClientMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Per-frame channel depth for one pair. A slow peer applies
/// backpressure to its own pair's pumps, never to other pairs.
const CHANNEL_DEPTH: usize = 64;

/// Shared state injected into axum handlers. Read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub connector: Arc<dyn UpstreamConnector>,
    pub tools: Arc<ToolRegistry>,
}

/// Build the axum router: heartbeat plus a catch-all upgrade route.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/heartbeat", get(heartbeat))
        .fallback(accept)
        .with_state(state)
}

async fn heartbeat() -> StatusCode {
    StatusCode::OK
}

/// Accept a client connection and hand it a dedicated pair.
async fn accept(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_pair(state, socket))
}

/// Wire one client socket to one upstream connection and drive the
/// pair until either side goes down.
pub async fn run_pair(state: AppState, client: WebSocket) {
    let (events_tx, events_rx) = mpsc::channel::<PairEvent>(CHANNEL_DEPTH);
    let (client_tx, client_rx) = mpsc::channel::<Frame>(CHANNEL_DEPTH);
    let (upstream_tx, upstream_rx) = mpsc::channel::<Frame>(CHANNEL_DEPTH);

    let pair = ConnectionPair::new(
        state.config.clone(),
        state.tools.clone(),
        client_tx,
        upstream_tx,
    );
    let pair_id = pair.id();
    tracing::info!(%pair_id, "client connected");

    let (client_sink, client_stream) = client.split();
    tokio::spawn(client_writer(client_rx, client_sink));
    tokio::spawn(client_reader(client_stream, events_tx.clone()));
    tokio::spawn(open_upstream(state, pair_id, upstream_rx, events_tx));

    pair.run(events_rx).await;
    tracing::info!(%pair_id, "pair released");
}

// ---------------------------------------------------------------------------
// Client leg
// ---------------------------------------------------------------------------

async fn client_writer(mut frames: mpsc::Receiver<Frame>, mut sink: SplitSink<WebSocket, ClientMessage>) {
    while let Some(frame) = frames.recv().await {
        let closing = frame == Frame::Close;
        if sink.send(frame_to_client(frame)).await.is_err() {
            return;
        }
        if closing {
            break;
        }
    }
    let _ = sink.close().await;
}

async fn client_reader(mut stream: SplitStream<WebSocket>, events: mpsc::Sender<PairEvent>) {
    while let Some(item) = stream.next().await {
        let event = match item {
            Ok(ClientMessage::Text(text)) => LegEvent::Message(Frame::Text(text.to_string())),
            Ok(ClientMessage::Binary(data)) => LegEvent::Message(Frame::Binary(data.to_vec())),
            Ok(ClientMessage::Close(_)) => {
                let _ = events.send(PairEvent::Client(LegEvent::Closed)).await;
                return;
            }
            // Ping/pong are answered by the transport.
            Ok(_) => continue,
            Err(e) => {
                let _ = events
                    .send(PairEvent::Client(LegEvent::Errored(e.to_string())))
                    .await;
                return;
            }
        };
        if events.send(PairEvent::Client(event)).await.is_err() {
            return;
        }
    }
    let _ = events.send(PairEvent::Client(LegEvent::Closed)).await;
}

fn frame_to_client(frame: Frame) -> ClientMessage {
    match frame {
        Frame::Text(raw) => ClientMessage::Text(raw.into()),
        Frame::Binary(data) => ClientMessage::Binary(data.into()),
        Frame::Close => ClientMessage::Close(None),
    }
}

// ---------------------------------------------------------------------------
// Upstream leg
// ---------------------------------------------------------------------------

/// Establish the upstream connection for one pair: credential first
/// (managed mode only), then the dial. Failure at either step reports
/// `UpstreamFailed` and leaves no half-open upstream behind.
async fn open_upstream(
    state: AppState,
    pair_id: Uuid,
    frames: mpsc::Receiver<Frame>,
    events: mpsc::Sender<PairEvent>,
) {
    let credential = if state.config.needs_credential() {
        match state.credentials.fetch().await {
            Ok(credential) => credential,
            Err(e) => {
                tracing::warn!(%pair_id, error = %e, "credential fetch failed");
                let _ = events.send(PairEvent::UpstreamFailed(e.to_string())).await;
                return;
            }
        }
    } else {
        Credential::NoAuth
    };

    let connection = match state
        .connector
        .connect(&state.config.upstream_url, &credential)
        .await
    {
        Ok(connection) => connection,
        Err(e) => {
            tracing::warn!(%pair_id, target = %state.config.target_host, error = %e, "upstream dial failed");
            let _ = events.send(PairEvent::UpstreamFailed(e.to_string())).await;
            return;
        }
    };

    tracing::info!(%pair_id, target = %state.config.target_host, "upstream connection established");
    if events.send(PairEvent::UpstreamOpen).await.is_err() {
        return;
    }

    let UpstreamConnection { sink, stream } = connection;
    tokio::spawn(upstream_writer(frames, sink));
    upstream_reader(stream, events).await;
}

async fn upstream_writer(
    mut frames: mpsc::Receiver<Frame>,
    mut sink: std::pin::Pin<Box<dyn futures_util::Sink<Frame, Error = crate::upstream::UpstreamError> + Send>>,
) {
    while let Some(frame) = frames.recv().await {
        let closing = frame == Frame::Close;
        if sink.send(frame).await.is_err() {
            return;
        }
        if closing {
            break;
        }
    }
    let _ = sink.close().await;
}

async fn upstream_reader(
    mut stream: std::pin::Pin<
        Box<dyn futures_util::Stream<Item = Result<Frame, crate::upstream::UpstreamError>> + Send>,
    >,
    events: mpsc::Sender<PairEvent>,
) {
    while let Some(item) = stream.next().await {
        let event = match item {
            Ok(Frame::Close) => {
                let _ = events.send(PairEvent::Upstream(LegEvent::Closed)).await;
                return;
            }
            Ok(frame) => LegEvent::Message(frame),
            Err(e) => {
                let _ = events
                    .send(PairEvent::Upstream(LegEvent::Errored(e.to_string())))
                    .await;
                return;
            }
        };
        if events.send(PairEvent::Upstream(event)).await.is_err() {
            return;
        }
    }
    let _ = events.send(PairEvent::Upstream(LegEvent::Closed)).await;
}
