// Upstream WebSocket connector.
//
// Opens one outbound connection per pair, attaching the bearer header
// when the credential requires it. The connector is a trait so the
// server wiring never touches a concrete socket type; tests substitute
// their own endpoint or connector.

use crate::auth::Credential;
use crate::relay::Frame;
use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::pin::Pin;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as WsMessage;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("invalid upstream request: {0}")]
    InvalidRequest(String),

    #[error("upstream handshake failed: {0}")]
    Handshake(String),

    #[error("upstream transport error: {0}")]
    Transport(String),
}

/// An established upstream connection as a framed sink/stream pair.
pub struct UpstreamConnection {
    pub sink: Pin<Box<dyn Sink<Frame, Error = UpstreamError> + Send>>,
    pub stream: Pin<Box<dyn Stream<Item = Result<Frame, UpstreamError>> + Send>>,
}

/// Dials the remote service for one pair.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    async fn connect(
        &self,
        url: &str,
        credential: &Credential,
    ) -> Result<UpstreamConnection, UpstreamError>;
}

/// Production connector over tokio-tungstenite.
pub struct WsConnector;

#[async_trait]
impl UpstreamConnector for WsConnector {
    async fn connect(
        &self,
        url: &str,
        credential: &Credential,
    ) -> Result<UpstreamConnection, UpstreamError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| UpstreamError::InvalidRequest(e.to_string()))?;

        if let Some(value) = credential.authorization_header() {
            let header = value
                .parse()
                .map_err(|_| UpstreamError::InvalidRequest("authorization header not representable".to_string()))?;
            request.headers_mut().insert("Authorization", header);
        }

        let (socket, _response) = connect_async(request)
            .await
            .map_err(|e| UpstreamError::Handshake(e.to_string()))?;

        let (sink, stream) = socket.split();

        let sink = sink
            .sink_map_err(|e| UpstreamError::Transport(e.to_string()))
            .with(|frame: Frame| {
                futures_util::future::ready(Ok::<WsMessage, UpstreamError>(frame_to_ws(frame)))
            });

        let stream = stream.filter_map(|item| {
            futures_util::future::ready(match item {
                Ok(msg) => ws_to_frame(msg).map(Ok),
                Err(e) => Some(Err(UpstreamError::Transport(e.to_string()))),
            })
        });

        Ok(UpstreamConnection {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

fn frame_to_ws(frame: Frame) -> WsMessage {
    match frame {
        Frame::Text(raw) => WsMessage::Text(raw.into()),
        Frame::Binary(data) => WsMessage::Binary(data.into()),
        Frame::Close => WsMessage::Close(None),
    }
}

/// Map a wire message to a frame; control frames the transport already
/// handles (ping/pong) carry nothing for the relay.
fn ws_to_frame(msg: WsMessage) -> Option<Frame> {
    match msg {
        WsMessage::Text(text) => Some(Frame::Text(text.to_string())),
        WsMessage::Binary(data) => Some(Frame::Binary(data.to_vec())),
        WsMessage::Close(_) => Some(Frame::Close),
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => None,
    }
}
