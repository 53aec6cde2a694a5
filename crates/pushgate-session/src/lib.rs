//! Gateway session state machine.
//!
//! Provides:
//! - `Gateway` - Handshake, heartbeat, resume and reconnect over any `Connector`
//! - `GatewayConfig` / `ReconnectPolicy` - Session configuration
//! - `SessionEvent` - Lifecycle notifications for the application

pub mod backoff;
pub mod config;
pub mod error;
pub mod gateway;
mod heartbeat;
pub mod state;
mod writer;

pub use backoff::ReconnectPolicy;
pub use config::GatewayConfig;
pub use error::GatewayError;
pub use gateway::Gateway;
pub use state::{ConnectionStatus, SessionEvent};
