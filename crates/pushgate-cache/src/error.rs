//! Synthesis error type.

/// A dispatch the engine could not use. The pass is skipped, the
/// connection is unaffected.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Malformed {event} payload: {source}")]
    Payload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{event} payload has no guild scope")]
    MissingScope { event: String },
}
