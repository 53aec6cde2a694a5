//! The single send path for one connection.

use std::sync::Arc;

use parking_lot::Mutex;
use pushgate_core::{FrameSink, WireMessage};
use pushgate_transport::Command;
use tokio::sync::mpsc;

use crate::state::SessionState;

/// Work item for the writer task.
#[derive(Debug)]
pub(crate) enum Outbound {
    Command(Command),
    /// A timed heartbeat. Only these arm the unacknowledged-heartbeat check.
    Heartbeat(Option<u64>),
    /// Send a close frame with this code and stop.
    Close(u16),
}

/// Drain `rx` into `sink` until a close is requested, the channel closes or a send fails.
pub(crate) async fn run_writer(
    mut sink: Box<dyn FrameSink>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    state: Arc<Mutex<SessionState>>,
) {
    while let Some(outbound) = rx.recv().await {
        let command = match outbound {
            Outbound::Command(command) => command,
            Outbound::Heartbeat(sequence) => {
                // before the send so a fast ack cannot be overwritten
                state.lock().record_heartbeat_sent();
                Command::Heartbeat(sequence)
            }
            Outbound::Close(code) => {
                if let Err(e) = sink.close(code).await {
                    tracing::debug!(close_code = code, error = %e, "Close frame not delivered");
                }
                return;
            }
        };

        let text = match command.encode() {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(op = ?command.opcode(), error = %e, "Dropping unencodable command");
                continue;
            }
        };
        tracing::trace!(op = ?command.opcode(), "Sending command");
        if let Err(e) = sink.send(WireMessage::Text(text)).await {
            tracing::debug!(error = %e, "Writer stopped");
            return;
        }
    }
}
