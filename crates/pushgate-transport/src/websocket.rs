//! WebSocket client transport.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use pushgate_core::{CloseFrame, Connection, Connector, FrameSink, FrameStream, TransportError, WireMessage};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        self, Message,
        protocol::{CloseFrame as WsCloseFrame, frame::coding::CloseCode},
    },
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connector that dials the gateway over `ws://` or `wss://`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Create a new connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Connection, TransportError> {
        tracing::debug!(url, "Dialing gateway");
        let (socket, _response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let (sink, stream) = socket.split();
        Ok(Connection::new(
            Box::new(WsSink { inner: sink }),
            Box::new(WsFrames { inner: stream }),
        ))
    }
}

struct WsSink {
    inner: SplitSink<Socket, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, message: WireMessage) -> Result<(), TransportError> {
        let message = match message {
            WireMessage::Text(text) => Message::Text(text.into()),
            WireMessage::Binary(data) => Message::Binary(Bytes::from(data)),
            WireMessage::Close(frame) => Message::Close(frame.map(|f| WsCloseFrame {
                code: CloseCode::from(f.code),
                reason: f.reason.into(),
            })),
        };
        self.inner.send(message).await.map_err(send_error)
    }

    async fn close(&mut self, code: u16) -> Result<(), TransportError> {
        let frame = WsCloseFrame {
            code: CloseCode::from(code),
            reason: String::new().into(),
        };
        match self.inner.send(Message::Close(Some(frame))).await {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {}
            Err(e) => return Err(send_error(e)),
        }
        self.inner.close().await.or_else(|e| match e {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => Ok(()),
            other => Err(send_error(other)),
        })
    }
}

fn send_error(e: tungstenite::Error) -> TransportError {
    match e {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::Closed
        }
        other => TransportError::Send(other.to_string()),
    }
}

struct WsFrames {
    inner: SplitStream<Socket>,
}

#[async_trait]
impl FrameStream for WsFrames {
    async fn next_message(&mut self) -> Option<Result<WireMessage, TransportError>> {
        loop {
            let message = match self.inner.next().await? {
                Ok(message) => message,
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return None;
                }
                Err(e) => return Some(Err(TransportError::Receive(e.to_string()))),
            };

            return Some(Ok(match message {
                Message::Text(text) => WireMessage::Text(text.as_str().to_owned()),
                Message::Binary(data) => WireMessage::Binary(data.to_vec()),
                Message::Close(frame) => WireMessage::Close(
                    frame.map(|f| CloseFrame::new(u16::from(f.code), f.reason.as_str())),
                ),
                // tungstenite answers pings itself
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }));
        }
    }
}
