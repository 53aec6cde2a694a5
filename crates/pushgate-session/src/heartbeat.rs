//! Heartbeat loop with zombie detection.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::{
    sync::mpsc,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{state::SessionState, writer::Outbound};

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeartbeatResult {
    /// The previous heartbeat was never acknowledged.
    Zombie,
    /// The loop was cancelled externally.
    Cancelled,
    /// The send path is gone.
    SendFailed,
}

/// Send a heartbeat every `interval`, starting one interval from now.
///
/// Each tick first checks that the previous timed heartbeat was acknowledged.
/// If not, the connection is considered a zombie and the loop returns so the
/// caller can tear it down. Heartbeats answering a remote request do not take
/// part in the check.
pub(crate) async fn run_heartbeat(
    state: Arc<Mutex<SessionState>>,
    outbound: mpsc::UnboundedSender<Outbound>,
    interval: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => return HeartbeatResult::Cancelled,
            _ = ticker.tick() => {
                let (ack_pending, sequence) = {
                    let state = state.lock();
                    (state.ack_pending, state.last_sequence)
                };
                if ack_pending {
                    tracing::warn!(interval_ms = interval.as_millis(), "Heartbeat not acknowledged");
                    return HeartbeatResult::Zombie;
                }
                if outbound.send(Outbound::Heartbeat(sequence)).is_err() {
                    return HeartbeatResult::SendFailed;
                }
            }
        }
    }
}
