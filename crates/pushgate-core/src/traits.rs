//! Collaborator traits for transport, endpoint discovery and event delivery.

use async_trait::async_trait;
use thiserror::Error;

/// A message as it travels over the duplex transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame (compressed payloads). Not supported by the codec.
    Binary(Vec<u8>),
    /// Close frame, with the peer's close code if it sent one.
    Close(Option<CloseFrame>),
}

/// Close code and reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

impl CloseFrame {
    /// Create a close frame.
    #[must_use]
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// Transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    Connect(String),
    #[error("Send failed: {0}")]
    Send(String),
    #[error("Receive failed: {0}")]
    Receive(String),
    #[error("Connection closed")]
    Closed,
}

/// Write half of a transport connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Send one frame.
    async fn send(&mut self, message: WireMessage) -> Result<(), TransportError>;

    /// Send a close frame with `code` and release the write half.
    async fn close(&mut self, code: u16) -> Result<(), TransportError>;
}

/// Read half of a transport connection.
#[async_trait]
pub trait FrameStream: Send {
    /// Receive the next frame. `None` means the peer went away without a close frame.
    async fn next_message(&mut self) -> Option<Result<WireMessage, TransportError>>;
}

/// An established transport, already split into its two halves.
pub struct Connection {
    pub sink: Box<dyn FrameSink>,
    pub stream: Box<dyn FrameStream>,
}

impl Connection {
    /// Bundle two halves.
    #[must_use]
    pub fn new(sink: Box<dyn FrameSink>, stream: Box<dyn FrameStream>) -> Self {
        Self { sink, stream }
    }
}

/// Trait for establishing transport connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `url`.
    async fn connect(&self, url: &str) -> Result<Connection, TransportError>;
}

/// Endpoint discovery error.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("The provided token is invalid")]
    Unauthorized,
    #[error("Endpoint discovery failed: {0}")]
    Failed(String),
}

/// Trait for resolving the gateway endpoint when none is cached.
#[async_trait]
pub trait GatewayResolver: Send + Sync {
    /// Fetch the base gateway URL.
    async fn gateway_url(&self) -> Result<String, DiscoveryError>;
}

/// Ordered delivery of events to application handlers.
///
/// Implementations must not block: queue internally or drop under their
/// own backpressure policy.
pub trait EventSink<E>: Send + Sync {
    /// Deliver one event.
    fn emit(&self, event: E);
}

impl<E: Send> EventSink<E> for tokio::sync::mpsc::UnboundedSender<E> {
    fn emit(&self, event: E) {
        if self.send(event).is_err() {
            tracing::trace!("Event receiver dropped");
        }
    }
}

impl<E, S: EventSink<E> + ?Sized> EventSink<E> for std::sync::Arc<S> {
    fn emit(&self, event: E) {
        (**self).emit(event);
    }
}
