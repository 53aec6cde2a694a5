//! Core vocabulary for the pushgate gateway client.
//!
//! This crate provides the pieces every other crate agrees on:
//! - `Id` - Snowflake identifiers as sent by the remote API
//! - `Dispatch` - A decoded, sequenced application event
//! - `EventBus` - Broadcast + bounded history event sink
//! - Collaborator traits for the transport, endpoint discovery and event delivery

pub mod dispatch;
pub mod event_bus;
pub mod snowflake;
pub mod traits;

pub use dispatch::Dispatch;
pub use event_bus::EventBus;
pub use snowflake::Id;
pub use traits::{
    CloseFrame, Connection, Connector, DiscoveryError, EventSink, FrameSink, FrameStream,
    GatewayResolver, TransportError, WireMessage,
};
