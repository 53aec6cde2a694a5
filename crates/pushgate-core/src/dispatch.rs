//! Decoded application events handed from the gateway to synthesis.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A dispatch frame after decoding.
///
/// Dispatches leave the session state machine in the order they were
/// received from the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispatch {
    /// Event name, e.g. `GUILD_EMOJIS_UPDATE`.
    pub event: String,
    /// Sequence number, if the frame carried one.
    pub sequence: Option<u64>,
    /// Raw event payload.
    pub data: Value,
}

impl Dispatch {
    /// Create a new dispatch.
    #[must_use]
    pub fn new(event: impl Into<String>, sequence: Option<u64>, data: Value) -> Self {
        Self {
            event: event.into(),
            sequence,
            data,
        }
    }

    /// Decode the payload into a typed value.
    ///
    /// # Errors
    /// Returns error if the payload does not match `T`.
    pub fn parse<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}
