//! WebSocket transport adapter.
//!
//! Owns one `tokio-tungstenite` connection per session. The adapter is
//! deliberately thin: connect with a bound, framed send/receive, bounded
//! poll, pong, close. All utterance/state decisions live in the session
//! state machine; any wire error surfaces immediately and unmodified.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};
use url::Url;

use super::messages::ConnectRequest;
use super::{SpeechTransport, TransportFrame};
use crate::errors::{AsrError, AsrResult};

/// Bound on the connection handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket connection to the transcription backend.
pub struct WsTransport {
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
}

impl WsTransport {
    /// Open a connection to the destination named by the negotiation
    /// payload, failing if the handshake does not complete within
    /// `connect_timeout`.
    pub async fn connect(request: &ConnectRequest, connect_timeout: Duration) -> AsrResult<Self> {
        let url = Url::parse(&request.url).map_err(|e| {
            AsrError::Configuration(format!("invalid backend url {}: {e}", request.url))
        })?;
        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(AsrError::Configuration(format!(
                    "unsupported backend url scheme {other} (expected ws or wss)"
                )));
            }
        }

        debug!(request = %request.to_json(), "connecting to transcription backend");

        let (ws, _response) = timeout(connect_timeout, connect_async(request.url.as_str()))
            .await
            .map_err(|_| {
                AsrError::ConnectionFailed(format!(
                    "handshake with {} did not complete within {}s",
                    request.url,
                    connect_timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                AsrError::ConnectionFailed(format!("websocket connect to {} failed: {e}", request.url))
            })?;

        info!(url = %request.url, "connected to transcription backend");

        let (sink, stream) = ws.split();
        Ok(Self { sink, stream })
    }
}

#[async_trait]
impl SpeechTransport for WsTransport {
    async fn send_binary(&mut self, payload: Bytes) -> AsrResult<()> {
        self.sink
            .send(Message::Binary(payload))
            .await
            .map_err(|e| map_ws_error(e, "binary send"))
    }

    async fn send_text(&mut self, payload: String) -> AsrResult<()> {
        self.sink
            .send(Message::Text(payload.into()))
            .await
            .map_err(|e| map_ws_error(e, "text send"))
    }

    async fn poll_frame(&mut self, wait: Duration) -> AsrResult<Option<TransportFrame>> {
        let next = match timeout(wait, self.stream.next()).await {
            // clean timeout: nothing readable within the bound
            Err(_) => return Ok(None),
            Ok(next) => next,
        };

        match next {
            None => Err(AsrError::ConnectionClosed),
            Some(Err(e)) => Err(map_ws_error(e, "receive")),
            Some(Ok(message)) => match message {
                Message::Text(text) => Ok(Some(TransportFrame::Text(text.as_str().to_owned()))),
                Message::Binary(data) => Ok(Some(TransportFrame::Binary(data))),
                Message::Ping(payload) => Ok(Some(TransportFrame::Ping(payload))),
                Message::Pong(payload) => Ok(Some(TransportFrame::Pong(payload))),
                Message::Close(frame) => {
                    debug!("backend closed the connection: {frame:?}");
                    Err(AsrError::ConnectionClosed)
                }
                Message::Frame(_) => Err(AsrError::Protocol(
                    "unexpected raw frame from backend".to_string(),
                )),
            },
        }
    }

    async fn send_pong(&mut self, payload: Bytes) -> AsrResult<()> {
        self.sink
            .send(Message::Pong(payload))
            .await
            .map_err(|e| map_ws_error(e, "pong send"))
    }

    async fn close(&mut self) -> AsrResult<()> {
        // best effort: the session is going away either way
        if let Err(e) = self.sink.send(Message::Close(None)).await {
            debug!("close frame send failed: {e}");
        }
        if let Err(e) = self.sink.close().await {
            debug!("socket close failed: {e}");
        }
        Ok(())
    }
}

fn map_ws_error(error: WsError, context: &str) -> AsrError {
    match error {
        WsError::ConnectionClosed | WsError::AlreadyClosed => AsrError::ConnectionClosed,
        other => AsrError::Transport(format!("websocket {context} failed: {other}")),
    }
}
