//! Session error type.

use pushgate_core::DiscoveryError;
use pushgate_transport::{CodecError, OpCode};

/// Gateway session error.
///
/// Transport failures never surface here; they end the connection and the
/// session reconnects.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Authentication failed")]
    AuthenticationFailed,
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("Endpoint discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
    #[error("No gateway endpoint configured and no resolver available")]
    NoEndpoint,
    #[error("Connection closed by remote ({code}): {reason}")]
    ClosedByRemote { code: u16, reason: String },
    #[error("Gave up after {0} reconnect attempts")]
    RetriesExhausted(u32),
    #[error("Gateway is not connected")]
    NotConnected,
    #[error("Gateway is already open")]
    AlreadyOpen,
    #[error("Gateway is closed")]
    Closed,
    #[error("{0:?} is managed by the session and cannot be sent directly")]
    ReservedCommand(OpCode),
}
