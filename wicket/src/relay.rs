// Copyright 2026 The Wicket Project
// SPDX-License-Identifier: Apache-2.0

// Connection pair lifecycle.
//
// One client connection is bound 1:1 to one upstream connection. A
// single task per pair consumes typed events from both legs over one
// channel, which serializes every state transition and preserves
// arrival order within each direction. Transport I/O lives in the pump
// and writer tasks (see server.rs); this module only decides what each
// event means.

use crate::config::Config;
use crate::intercept::ToolCallInterceptor;
use crate::message::{self, ClientPayload};
use crate::rewrite;
use crate::tools::ToolRegistry;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// A transport frame, decoupled from both WebSocket implementations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    /// Opaque binary payload (audio lanes); relayed verbatim.
    Binary(Vec<u8>),
    /// Instructs a writer to close its transport.
    Close,
}

/// Something that happened on one leg of a pair.
#[derive(Debug)]
pub enum LegEvent {
    Message(Frame),
    Closed,
    Errored(String),
}

/// Everything that can drive a pair's state machine.
#[derive(Debug)]
pub enum PairEvent {
    /// The upstream handshake succeeded; the outbound queue may drain.
    UpstreamOpen,
    /// Credential fetch or upstream dial failed; the pair never
    /// reaches Active.
    UpstreamFailed(String),
    Client(LegEvent),
    Upstream(LegEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairState {
    /// Client accepted; credential fetch and upstream dial in flight.
    Connecting,
    /// Upstream open, queue drained; messages flow both ways.
    Active,
    /// One leg went down; the other is being closed.
    Closing,
    /// Terminal. A closed pair never forwards again.
    Closed,
}

/// The unit of relay state: one client leg, one upstream leg, and the
/// buffering/rewrite bookkeeping between them.
pub struct ConnectionPair {
    id: Uuid,
    config: Arc<Config>,
    interceptor: ToolCallInterceptor,
    client_tx: mpsc::Sender<Frame>,
    upstream_tx: mpsc::Sender<Frame>,
    state: PairState,
    queue: VecDeque<Frame>,
    setup_seen: bool,
}

impl ConnectionPair {
    pub fn new(
        config: Arc<Config>,
        tools: Arc<ToolRegistry>,
        client_tx: mpsc::Sender<Frame>,
        upstream_tx: mpsc::Sender<Frame>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            interceptor: ToolCallInterceptor::new(tools),
            client_tx,
            upstream_tx,
            state: PairState::Connecting,
            queue: VecDeque::new(),
            setup_seen: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Drive the pair until both legs are done. Consumes the event
    /// receiver; dropping it on return discards any late events from
    /// the pumps, so a closed pair never sees another message.
    pub async fn run(mut self, mut events: mpsc::Receiver<PairEvent>) {
        while let Some(event) = events.recv().await {
            self.on_event(event).await;
            if self.state == PairState::Closed {
                break;
            }
        }
    }

    async fn on_event(&mut self, event: PairEvent) {
        match event {
            PairEvent::UpstreamOpen => self.on_upstream_open().await,
            PairEvent::UpstreamFailed(reason) => {
                tracing::warn!(pair_id = %self.id, reason = %reason, "upstream connection failed");
                self.teardown().await;
            }
            PairEvent::Client(LegEvent::Message(frame)) => self.on_client_frame(frame).await,
            PairEvent::Client(LegEvent::Closed) => {
                tracing::info!(pair_id = %self.id, "client disconnected");
                self.teardown().await;
            }
            PairEvent::Client(LegEvent::Errored(reason)) => {
                tracing::warn!(pair_id = %self.id, reason = %reason, "client transport error");
                self.teardown().await;
            }
            PairEvent::Upstream(LegEvent::Message(frame)) => self.on_upstream_frame(frame).await,
            PairEvent::Upstream(LegEvent::Closed) => {
                tracing::info!(pair_id = %self.id, "upstream closed");
                self.teardown().await;
            }
            PairEvent::Upstream(LegEvent::Errored(reason)) => {
                tracing::warn!(pair_id = %self.id, reason = %reason, "upstream transport error");
                self.teardown().await;
            }
        }
    }

    async fn on_upstream_open(&mut self) {
        if self.state != PairState::Connecting {
            return;
        }
        self.state = PairState::Active;
        let queued = std::mem::take(&mut self.queue);
        tracing::info!(pair_id = %self.id, queued = queued.len(), "upstream open; draining outbound queue");
        for frame in queued {
            if self.state != PairState::Active {
                break;
            }
            self.forward_client_frame(frame).await;
        }
    }

    async fn on_client_frame(&mut self, frame: Frame) {
        match self.state {
            PairState::Connecting => self.queue.push_back(frame),
            PairState::Active => self.forward_client_frame(frame).await,
            // Late frames after close are dropped, never queued.
            PairState::Closing | PairState::Closed => {}
        }
    }

    /// Forward one client frame upstream, applying the setup rewrite to
    /// the first setup-shaped text message of the pair.
    async fn forward_client_frame(&mut self, frame: Frame) {
        let raw = match frame {
            Frame::Text(raw) => raw,
            other => {
                self.send_upstream(other).await;
                return;
            }
        };

        match message::classify_client(&raw) {
            Err(e) => {
                // Fail closed on the message, not on the pair.
                tracing::warn!(pair_id = %self.id, error = %e, "dropping malformed client message");
            }
            Ok(ClientPayload::Setup(_)) if !self.setup_seen => {
                self.setup_seen = true;
                match rewrite::rewrite_setup(&raw, &self.config.mode) {
                    Ok(rewritten) => {
                        self.send_upstream(Frame::Text(rewritten.into_owned())).await;
                    }
                    Err(e) => {
                        tracing::warn!(pair_id = %self.id, error = %e, "setup rewrite failed; dropping message");
                    }
                }
            }
            // Later setup-shaped messages are never re-rewritten.
            Ok(_) => self.send_upstream(Frame::Text(raw)).await,
        }
    }

    async fn on_upstream_frame(&mut self, frame: Frame) {
        if self.state != PairState::Active {
            return;
        }
        let raw = match frame {
            Frame::Text(raw) => raw,
            other => {
                self.send_client(other).await;
                return;
            }
        };

        let interception = self.interceptor.handle(&raw);
        if let Some(msg) = interception.to_client {
            self.send_client(Frame::Text(msg)).await;
        }
        if let Some(msg) = interception.to_upstream {
            self.send_upstream(Frame::Text(msg)).await;
        }
    }

    async fn send_upstream(&mut self, frame: Frame) {
        if self.upstream_tx.send(frame).await.is_err() {
            tracing::warn!(pair_id = %self.id, "upstream writer gone");
            self.teardown().await;
        }
    }

    async fn send_client(&mut self, frame: Frame) {
        if self.client_tx.send(frame).await.is_err() {
            tracing::warn!(pair_id = %self.id, "client writer gone");
            self.teardown().await;
        }
    }

    /// Tear both legs down exactly once. Closing an already-closing
    /// pair has no additional effect.
    async fn teardown(&mut self) {
        if matches!(self.state, PairState::Closing | PairState::Closed) {
            return;
        }
        self.state = PairState::Closing;
        // A writer that already hung up has dropped its receiver; the
        // failed send is the close signal in that case.
        let _ = self.upstream_tx.send(Frame::Close).await;
        let _ = self.client_tx.send(Frame::Close).await;
        self.queue.clear();
        self.state = PairState::Closed;
        tracing::info!(pair_id = %self.id, "pair closed");
    }
}
