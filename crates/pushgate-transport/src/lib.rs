//! Transport layer for the gateway connection.
//!
//! Provides:
//! - Frame codec and outbound commands (`protocol`)
//! - WebSocket connector (feature: websocket)
//! - REST client for endpoint discovery (feature: rest)

pub mod protocol;

#[cfg(feature = "websocket")]
pub mod websocket;

#[cfg(feature = "rest")]
pub mod rest;

pub use protocol::{
    API_VERSION, CLOSE_AUTHENTICATION_FAILED, CLOSE_NORMAL, CLOSE_RESUMABLE, CloseDisposition,
    CodecError, Command, ConnectionProperties, Inbound, InboundFrame, Intents, OpCode,
    classify_close, connect_url, decode, decode_text,
};

#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnector;

#[cfg(feature = "rest")]
pub use rest::{RestClient, RestError, Route};
