//! Gateway session configuration.

use std::{fmt, time::Duration};

use pushgate_transport::{ConnectionProperties, Intents};
use serde::Deserialize;

use crate::backoff::ReconnectPolicy;

/// Default member count above which a guild is considered large.
pub const DEFAULT_LARGE_THRESHOLD: u16 = 50;

/// Default time to wait for Hello after the transport is up.
pub const DEFAULT_HELLO_TIMEOUT_MS: u64 = 30_000;

/// Default number of lifecycle events kept for late subscribers.
pub const DEFAULT_EVENT_HISTORY: usize = 64;

/// Configuration for one gateway session.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Bot token, sent in Identify and Resume.
    pub token: String,
    /// Capability bitmask sent in Identify.
    pub intents: Intents,
    /// Client metadata sent in Identify.
    pub properties: ConnectionProperties,
    /// Member count above which the remote omits offline members.
    pub large_threshold: u16,
    /// Gateway endpoint. Resolved through discovery when absent.
    pub gateway_url: Option<String>,
    /// Time to wait for Hello, in milliseconds.
    pub hello_timeout_ms: u64,
    /// Reconnect backoff.
    pub reconnect: ReconnectPolicy,
    /// Lifecycle events retained for late subscribers.
    pub event_history: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            intents: Intents::GUILDS,
            properties: ConnectionProperties::default(),
            large_threshold: DEFAULT_LARGE_THRESHOLD,
            gateway_url: None,
            hello_timeout_ms: DEFAULT_HELLO_TIMEOUT_MS,
            reconnect: ReconnectPolicy::default(),
            event_history: DEFAULT_EVENT_HISTORY,
        }
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("token", &"<redacted>")
            .field("intents", &self.intents)
            .field("properties", &self.properties)
            .field("large_threshold", &self.large_threshold)
            .field("gateway_url", &self.gateway_url)
            .field("hello_timeout_ms", &self.hello_timeout_ms)
            .field("reconnect", &self.reconnect)
            .field("event_history", &self.event_history)
            .finish()
    }
}

impl GatewayConfig {
    /// Create a config with `token` and defaults for everything else.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_intents(mut self, intents: Intents) -> Self {
        self.intents = intents;
        self
    }

    #[must_use]
    pub fn with_properties(mut self, properties: ConnectionProperties) -> Self {
        self.properties = properties;
        self
    }

    #[must_use]
    pub const fn with_large_threshold(mut self, threshold: u16) -> Self {
        self.large_threshold = threshold;
        self
    }

    /// Skip discovery and connect to `url`.
    #[must_use]
    pub fn with_gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_hello_timeout(mut self, timeout: Duration) -> Self {
        self.hello_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Hello wait as a duration.
    #[must_use]
    pub const fn hello_timeout(&self) -> Duration {
        Duration::from_millis(self.hello_timeout_ms)
    }
}
