//! Connection status and per-session state.

use std::{fmt, time::Duration};

use tokio::time::Instant;

/// Connection status. Mutated only by the session task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    WaitingForHandshake,
    Identifying,
    Resuming,
    WaitingForReady,
    Connected,
    Reconnecting,
    Closed,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::WaitingForHandshake => "waiting_for_handshake",
            Self::Identifying => "identifying",
            Self::Resuming => "resuming",
            Self::WaitingForReady => "waiting_for_ready",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Session lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A fresh session was established.
    Ready { session_id: String },
    /// A prior session was resumed.
    Resumed { session_id: String },
    /// The remote discarded the session; the next connection identifies again.
    SessionReset,
    /// The connection dropped.
    Disconnected { code: Option<u16>, resumable: bool },
    /// A reconnect is scheduled.
    Reconnecting { attempt: u32, delay: Duration },
    /// The session gave up.
    Fatal { message: String },
    /// `close()` completed.
    Closed,
}

/// State shared by the receive loop, heartbeat loop and public accessors.
#[derive(Debug)]
pub struct SessionState {
    pub status: ConnectionStatus,
    pub session_id: Option<String>,
    pub last_sequence: Option<u64>,
    pub resume_url: Option<String>,
    pub heartbeat_interval: Option<Duration>,
    pub last_heartbeat_sent: Option<Instant>,
    pub last_heartbeat_ack: Option<Instant>,
    /// A timed heartbeat went out and no ack has come back yet.
    pub ack_pending: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            session_id: None,
            last_sequence: None,
            resume_url: None,
            heartbeat_interval: None,
            last_heartbeat_sent: None,
            last_heartbeat_ack: None,
            ack_pending: false,
        }
    }
}

impl SessionState {
    /// Whether a Resume can be attempted.
    #[must_use]
    pub const fn can_resume(&self) -> bool {
        self.session_id.is_some() && self.last_sequence.is_some()
    }

    /// Record a dispatch sequence number. Never moves backwards.
    pub fn observe_sequence(&mut self, sequence: Option<u64>) {
        if let Some(seq) = sequence.filter(|&seq| self.last_sequence.is_none_or(|last| seq > last)) {
            self.last_sequence = Some(seq);
        }
    }

    /// Forget the session. Returns whether there was one.
    pub fn reset_session(&mut self) -> bool {
        let had_session = self.session_id.is_some() || self.last_sequence.is_some();
        self.session_id = None;
        self.last_sequence = None;
        self.resume_url = None;
        had_session
    }

    /// Reset per-connection heartbeat bookkeeping.
    pub fn reset_heartbeat(&mut self, interval: Duration) {
        self.heartbeat_interval = Some(interval);
        self.last_heartbeat_sent = None;
        self.last_heartbeat_ack = None;
        self.ack_pending = false;
    }

    pub fn record_heartbeat_sent(&mut self) {
        self.last_heartbeat_sent = Some(Instant::now());
        self.ack_pending = true;
    }

    /// An ack with no timed heartbeat outstanding answers a requested one and
    /// leaves latency alone.
    pub fn record_ack(&mut self) {
        if self.ack_pending {
            self.last_heartbeat_ack = Some(Instant::now());
            self.ack_pending = false;
        }
    }

    /// Round trip of the last acknowledged heartbeat.
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        let sent = self.last_heartbeat_sent?;
        let ack = self.last_heartbeat_ack?;
        (ack >= sent).then(|| ack - sent)
    }

    /// Move to `status`. Once closed, stays closed.
    pub fn set_status(&mut self, status: ConnectionStatus) {
        if self.status == ConnectionStatus::Closed || self.status == status {
            return;
        }
        tracing::debug!(from = %self.status, to = %status, "Connection status changed");
        self.status = status;
    }
}
