//! Gateway session: handshake, heartbeat, resume and reconnect.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use pushgate_core::{
    CloseFrame, Connection, Connector, Dispatch, DiscoveryError, EventBus, EventSink, FrameSink,
    FrameStream, GatewayResolver, TransportError, WireMessage,
};
use pushgate_transport::{
    CLOSE_AUTHENTICATION_FAILED, CLOSE_NORMAL, CLOSE_RESUMABLE, CloseDisposition, Command,
    Inbound, InboundFrame, classify_close, connect_url, decode,
    protocol::{Identify, Ready, Resume},
};
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
    time,
};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::{
    config::GatewayConfig,
    error::GatewayError,
    heartbeat::{HeartbeatResult, run_heartbeat},
    state::{ConnectionStatus, SessionEvent, SessionState},
    writer::{Outbound, run_writer},
};

/// How long `close()` waits for the session task before aborting it.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long teardown waits for the writer to flush the close frame.
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Broadcast buffer for lifecycle events.
const EVENT_CAPACITY: usize = 256;

type ReadySender = oneshot::Sender<Result<(), GatewayError>>;

/// What the run loop does after one connection ends.
#[derive(Debug)]
enum Outcome {
    Shutdown,
    Fatal(GatewayError),
    Reconnect {
        /// Keep the session for a Resume attempt.
        keep_session: bool,
        /// The connection reached `Connected` before it ended.
        connected: bool,
    },
}

/// Which handshake this connection performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handshake {
    Identify,
    Resume,
}

/// Per-connection bookkeeping for the receive loop.
struct Attempt {
    handshake: Handshake,
    connected: bool,
    outbound: mpsc::UnboundedSender<Outbound>,
}

/// Why the receive loop stopped, before it is turned into an [`Outcome`].
enum Exit {
    Shutdown,
    Fatal(GatewayError),
    Reconnect { keep_session: bool },
}

struct Shared {
    config: GatewayConfig,
    connector: Arc<dyn Connector>,
    resolver: Option<Arc<dyn GatewayResolver>>,
    state: Arc<Mutex<SessionState>>,
    /// Endpoint used for fresh identifies, configured or discovered.
    endpoint: Mutex<Option<String>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Outbound>>>,
    dispatch_tx: mpsc::UnboundedSender<Dispatch>,
    events: EventBus<SessionEvent>,
    shutdown: CancellationToken,
    runner: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

/// Handle to one gateway session.
///
/// Clones share the session. Dropping the last clone shuts the session down.
#[derive(Clone)]
pub struct Gateway {
    shared: Arc<Shared>,
    _guard: Arc<DropGuard>,
}

impl Gateway {
    /// Create a session. Dispatches arrive on the returned receiver in wire order.
    #[must_use]
    pub fn new(
        config: GatewayConfig,
        connector: Arc<dyn Connector>,
        resolver: Option<Arc<dyn GatewayResolver>>,
    ) -> (Self, mpsc::UnboundedReceiver<Dispatch>) {
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let events = EventBus::with_limits(EVENT_CAPACITY, config.event_history);
        let endpoint = config.gateway_url.clone();
        let shared = Arc::new(Shared {
            config,
            connector,
            resolver,
            state: Arc::new(Mutex::new(SessionState::default())),
            endpoint: Mutex::new(endpoint),
            outbound: Mutex::new(None),
            dispatch_tx,
            events,
            shutdown: shutdown.clone(),
            runner: tokio::sync::Mutex::new(None),
        });
        let gateway = Self {
            shared,
            _guard: Arc::new(shutdown.drop_guard()),
        };
        (gateway, dispatch_rx)
    }

    /// Connect and wait for the first session to become ready.
    ///
    /// The session keeps reconnecting in the background after this returns.
    ///
    /// # Errors
    /// Returns error on authentication failure, a handshake violation, a fatal
    /// close code, exhausted retries, or if the gateway was closed meanwhile.
    pub async fn open(&self) -> Result<(), GatewayError> {
        if self.shared.shutdown.is_cancelled() {
            return Err(GatewayError::Closed);
        }
        let mut runner = self.shared.runner.lock().await;
        if runner.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(GatewayError::AlreadyOpen);
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let shared = Arc::clone(&self.shared);
        *runner = Some(tokio::spawn(async move { shared.run(ready_tx).await }));
        drop(runner);

        ready_rx.await.unwrap_or(Err(GatewayError::Closed))
    }

    /// Stop the session and release the transport. Safe to call repeatedly.
    pub async fn close(&self) {
        self.shared.shutdown.cancel();

        let handle = self.shared.runner.lock().await.take();
        if let Some(handle) = handle {
            let abort = handle.abort_handle();
            if time::timeout(CLOSE_TIMEOUT, handle).await.is_err() {
                tracing::warn!("Session task did not stop in time, aborting");
                abort.abort();
            }
        }

        let newly_closed = {
            let mut state = self.shared.state.lock();
            let newly_closed = state.status != ConnectionStatus::Closed;
            state.set_status(ConnectionStatus::Closed);
            newly_closed
        };
        if newly_closed {
            tracing::info!("Gateway closed");
            self.shared.events.push(SessionEvent::Closed);
        }
    }

    /// Queue an application command on the connection's send path.
    ///
    /// # Errors
    /// Returns error for commands the session sends itself, or when not connected.
    pub fn send_command(&self, command: Command) -> Result<(), GatewayError> {
        if matches!(
            command,
            Command::Heartbeat(_) | Command::Identify(_) | Command::Resume(_)
        ) {
            return Err(GatewayError::ReservedCommand(command.opcode()));
        }
        if self.status() != ConnectionStatus::Connected {
            return Err(GatewayError::NotConnected);
        }
        let outbound = self
            .shared
            .outbound
            .lock()
            .clone()
            .ok_or(GatewayError::NotConnected)?;
        outbound
            .send(Outbound::Command(command))
            .map_err(|_| GatewayError::NotConnected)
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.shared.state.lock().status
    }

    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.shared.state.lock().session_id.clone()
    }

    #[must_use]
    pub fn last_sequence(&self) -> Option<u64> {
        self.shared.state.lock().last_sequence
    }

    /// Round trip of the last acknowledged heartbeat.
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        self.shared.state.lock().latency()
    }

    /// Live lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Recent lifecycle events.
    #[must_use]
    pub fn history(&self) -> Vec<SessionEvent> {
        self.shared.events.history()
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Gateway")
            .field("status", &state.status)
            .field("session_id", &state.session_id)
            .field("last_sequence", &state.last_sequence)
            .finish_non_exhaustive()
    }
}

impl Shared {
    async fn run(self: Arc<Self>, ready: ReadySender) {
        let mut ready = Some(ready);
        let mut attempt: u32 = 0;

        loop {
            let outcome = self.connect_once(&mut ready).await;
            *self.outbound.lock() = None;

            match outcome {
                Outcome::Shutdown => break,
                Outcome::Fatal(err) => {
                    self.fail(err, &mut ready);
                    break;
                }
                Outcome::Reconnect {
                    keep_session,
                    connected,
                } => {
                    if connected {
                        attempt = 0;
                    }
                    if !keep_session {
                        let had_session = self.state.lock().reset_session();
                        if had_session {
                            self.events.push(SessionEvent::SessionReset);
                        }
                    }

                    attempt = attempt.saturating_add(1);
                    if self.config.reconnect.is_exhausted(attempt) {
                        self.fail(GatewayError::RetriesExhausted(attempt - 1), &mut ready);
                        break;
                    }

                    let delay = self.config.reconnect.delay_for_attempt(attempt);
                    self.state.lock().set_status(ConnectionStatus::Reconnecting);
                    tracing::info!(attempt, delay_ms = delay.as_millis(), keep_session, "Reconnecting");
                    self.events.push(SessionEvent::Reconnecting { attempt, delay });

                    tokio::select! {
                        () = self.shutdown.cancelled() => break,
                        () = time::sleep(delay) => {}
                    }
                }
            }
        }
        tracing::debug!("Session task finished");
    }

    fn fail(&self, err: GatewayError, ready: &mut Option<ReadySender>) {
        tracing::error!(error = %err, "Gateway session failed");
        self.state.lock().set_status(ConnectionStatus::Disconnected);
        self.events.push(SessionEvent::Fatal {
            message: err.to_string(),
        });
        if let Some(tx) = ready.take() {
            let _ = tx.send(Err(err));
        }
    }

    /// Endpoint for the next connection: the resume URL when resuming,
    /// otherwise the configured or discovered one.
    async fn endpoint(&self, resuming: bool) -> Result<String, GatewayError> {
        if resuming {
            let resume_url = self.state.lock().resume_url.clone();
            if let Some(url) = resume_url {
                return Ok(url);
            }
        }
        let cached = self.endpoint.lock().clone();
        if let Some(url) = cached {
            return Ok(url);
        }

        let resolver = self.resolver.as_ref().ok_or(GatewayError::NoEndpoint)?;
        let url = resolver.gateway_url().await.map_err(|e| match e {
            DiscoveryError::Unauthorized => GatewayError::AuthenticationFailed,
            other => GatewayError::Discovery(other),
        })?;
        *self.endpoint.lock() = Some(url.clone());
        Ok(url)
    }

    async fn connect_once(&self, ready: &mut Option<ReadySender>) -> Outcome {
        let resuming = {
            let mut state = self.state.lock();
            state.set_status(ConnectionStatus::Connecting);
            state.can_resume()
        };

        let base = tokio::select! {
            () = self.shutdown.cancelled() => return Outcome::Shutdown,
            result = self.endpoint(resuming) => match result {
                Ok(base) => base,
                Err(err) => return Outcome::Fatal(err),
            },
        };
        let url = connect_url(&base);

        tracing::info!(%url, resuming, "Connecting to gateway");
        let connection = tokio::select! {
            () = self.shutdown.cancelled() => return Outcome::Shutdown,
            result = self.connector.connect(&url) => result,
        };
        let Connection { mut sink, mut stream } = match connection {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!(error = %e, "Gateway connect failed");
                return self.dropped(None, false);
            }
        };

        self.state.lock().set_status(ConnectionStatus::WaitingForHandshake);
        let first = tokio::select! {
            () = self.shutdown.cancelled() => {
                let _ = sink.close(CLOSE_NORMAL).await;
                return Outcome::Shutdown;
            }
            result = time::timeout(self.config.hello_timeout(), stream.next_message()) => result,
        };

        let hello = match first {
            Err(_) => {
                tracing::warn!(timeout_ms = self.config.hello_timeout_ms, "No Hello from gateway");
                let _ = sink.close(CLOSE_RESUMABLE).await;
                return self.dropped(None, false);
            }
            Ok(None) => return self.dropped(None, false),
            Ok(Some(Err(e))) => {
                tracing::warn!(error = %e, "Transport failed during handshake");
                return self.dropped(None, false);
            }
            Ok(Some(Ok(message))) => match decode(message) {
                Ok(Inbound::Frame(InboundFrame::Hello(hello))) => hello,
                Ok(Inbound::Close(frame)) => return self.remote_closed(frame, false),
                Ok(Inbound::Frame(other)) => {
                    let err = GatewayError::ProtocolViolation(format!(
                        "expected Hello as the first frame, got {other:?}"
                    ));
                    return self.handshake_failed(&mut *sink, ready.is_some(), err).await;
                }
                Err(e) => {
                    return self
                        .handshake_failed(&mut *sink, ready.is_some(), GatewayError::Codec(e))
                        .await;
                }
            },
        };

        let interval = Duration::from_millis(hello.heartbeat_interval.max(1));
        tracing::debug!(heartbeat_interval_ms = hello.heartbeat_interval, "Received Hello");

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(run_writer(sink, out_rx, Arc::clone(&self.state)));
        *self.outbound.lock() = Some(out_tx.clone());

        let (handshake, command) = self.handshake_command(interval);
        tracing::info!(?handshake, "Sending handshake");
        let handshake_sent = out_tx.send(Outbound::Command(command)).is_ok();
        self.state.lock().set_status(ConnectionStatus::WaitingForReady);

        let heartbeat_cancel = self.shutdown.child_token();
        let mut heartbeat = tokio::spawn(run_heartbeat(
            Arc::clone(&self.state),
            out_tx.clone(),
            interval,
            heartbeat_cancel.clone(),
        ));

        let mut attempt = Attempt {
            handshake,
            connected: false,
            outbound: out_tx,
        };
        let exit = if handshake_sent {
            self.receive_loop(&mut *stream, &mut heartbeat, &mut attempt, ready)
                .await
        } else {
            Exit::Reconnect { keep_session: true }
        };

        heartbeat_cancel.cancel();
        heartbeat.abort();
        *self.outbound.lock() = None;

        let close_code = match exit {
            Exit::Reconnect { .. } => CLOSE_RESUMABLE,
            Exit::Shutdown | Exit::Fatal(_) => CLOSE_NORMAL,
        };
        let _ = attempt.outbound.send(Outbound::Close(close_code));
        drop(attempt.outbound);
        let abort = writer.abort_handle();
        if time::timeout(WRITER_FLUSH_TIMEOUT, writer).await.is_err() {
            tracing::debug!("Writer did not flush in time");
            abort.abort();
        }

        match exit {
            Exit::Shutdown => Outcome::Shutdown,
            Exit::Fatal(err) => Outcome::Fatal(err),
            Exit::Reconnect { keep_session } => Outcome::Reconnect {
                keep_session,
                connected: attempt.connected,
            },
        }
    }

    /// Pick Identify or Resume and reset heartbeat bookkeeping.
    fn handshake_command(&self, interval: Duration) -> (Handshake, Command) {
        let mut state = self.state.lock();
        state.reset_heartbeat(interval);

        if let Some((session_id, seq)) = state.session_id.clone().zip(state.last_sequence) {
            state.set_status(ConnectionStatus::Resuming);
            tracing::debug!(%session_id, sequence = seq, "Resuming session");
            let command = Command::Resume(Resume {
                token: self.config.token.clone(),
                session_id,
                seq,
            });
            return (Handshake::Resume, command);
        }

        // a fresh identify starts a new sequence
        state.reset_session();
        state.set_status(ConnectionStatus::Identifying);
        let command = Command::Identify(Identify {
            token: self.config.token.clone(),
            properties: self.config.properties.clone(),
            compress: false,
            large_threshold: self.config.large_threshold,
            intents: self.config.intents,
        });
        (Handshake::Identify, command)
    }

    async fn receive_loop(
        &self,
        stream: &mut dyn FrameStream,
        heartbeat: &mut JoinHandle<HeartbeatResult>,
        attempt: &mut Attempt,
        ready: &mut Option<ReadySender>,
    ) -> Exit {
        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => return Exit::Shutdown,
                result = &mut *heartbeat => {
                    if matches!(result, Ok(HeartbeatResult::Cancelled)) {
                        return Exit::Shutdown;
                    }
                    tracing::warn!("Connection is unresponsive, reconnecting");
                    return self.transport_dropped(None);
                }
                message = stream.next_message() => {
                    if let Some(exit) = self.handle_message(message, attempt, ready) {
                        return exit;
                    }
                }
            }
        }
    }

    fn handle_message(
        &self,
        message: Option<Result<WireMessage, TransportError>>,
        attempt: &mut Attempt,
        ready: &mut Option<ReadySender>,
    ) -> Option<Exit> {
        let message = match message {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Transport receive failed");
                return Some(self.transport_dropped(None));
            }
            None => {
                tracing::warn!("Transport closed without a close frame");
                return Some(self.transport_dropped(None));
            }
        };

        match decode(message) {
            Ok(Inbound::Frame(frame)) => self.handle_frame(frame, attempt, ready),
            Ok(Inbound::Close(frame)) => Some(match self.remote_closed(frame, attempt.connected) {
                Outcome::Fatal(err) => Exit::Fatal(err),
                Outcome::Shutdown => Exit::Shutdown,
                Outcome::Reconnect { keep_session, .. } => Exit::Reconnect { keep_session },
            }),
            Err(e) if e.is_skippable() => {
                tracing::warn!(error = %e, "Skipping malformed frame");
                None
            }
            Err(e) => Some(self.violation(&e.to_string())),
        }
    }

    fn handle_frame(
        &self,
        frame: InboundFrame,
        attempt: &mut Attempt,
        ready: &mut Option<ReadySender>,
    ) -> Option<Exit> {
        match frame {
            InboundFrame::Dispatch(dispatch) => self.handle_dispatch(dispatch, attempt, ready),
            InboundFrame::HeartbeatRequest => {
                let sequence = self.state.lock().last_sequence;
                tracing::debug!(?sequence, "Heartbeat requested by remote");
                if attempt
                    .outbound
                    .send(Outbound::Command(Command::Heartbeat(sequence)))
                    .is_err()
                {
                    return Some(self.transport_dropped(None));
                }
                None
            }
            InboundFrame::HeartbeatAck => {
                let latency = {
                    let mut state = self.state.lock();
                    state.record_ack();
                    state.latency()
                };
                tracing::trace!(?latency, "Heartbeat acknowledged");
                None
            }
            InboundFrame::Reconnect => {
                tracing::info!("Remote requested a reconnect");
                Some(self.transport_dropped(None))
            }
            InboundFrame::InvalidSession { resumable } => {
                // always start over, whatever the flag says
                tracing::warn!(resumable, "Session invalidated by remote");
                self.events.push(SessionEvent::Disconnected {
                    code: None,
                    resumable: false,
                });
                Some(Exit::Reconnect {
                    keep_session: false,
                })
            }
            InboundFrame::Hello(_) => Some(self.violation("Hello received after handshake")),
        }
    }

    fn handle_dispatch(
        &self,
        dispatch: Dispatch,
        attempt: &mut Attempt,
        ready: &mut Option<ReadySender>,
    ) -> Option<Exit> {
        if !attempt.connected {
            match (attempt.handshake, dispatch.event.as_str()) {
                (Handshake::Identify, "READY") => {
                    let ready_payload: Ready = match dispatch.parse() {
                        Ok(payload) => payload,
                        Err(e) => return Some(self.violation(&format!("malformed READY: {e}"))),
                    };
                    {
                        let mut state = self.state.lock();
                        state.session_id = Some(ready_payload.session_id.clone());
                        state.resume_url = ready_payload.resume_gateway_url;
                        state.observe_sequence(dispatch.sequence);
                        state.set_status(ConnectionStatus::Connected);
                    }
                    tracing::info!(session_id = %ready_payload.session_id, "Session ready");
                    self.connected(attempt, ready, SessionEvent::Ready {
                        session_id: ready_payload.session_id,
                    });
                }
                (Handshake::Resume, "RESUMED") => {
                    let session_id = {
                        let mut state = self.state.lock();
                        state.observe_sequence(dispatch.sequence);
                        state.set_status(ConnectionStatus::Connected);
                        state.session_id.clone().unwrap_or_default()
                    };
                    tracing::info!(%session_id, "Session resumed");
                    self.connected(attempt, ready, SessionEvent::Resumed { session_id });
                }
                (Handshake::Resume, _) => {
                    // replayed events missed while disconnected
                    self.state.lock().observe_sequence(dispatch.sequence);
                }
                (Handshake::Identify, event) => {
                    return Some(self.violation(&format!("{event} dispatched before READY")));
                }
            }
        } else {
            self.state.lock().observe_sequence(dispatch.sequence);
        }

        tracing::trace!(event = %dispatch.event, sequence = ?dispatch.sequence, "Dispatch");
        self.dispatch_tx.emit(dispatch);
        None
    }

    fn connected(&self, attempt: &mut Attempt, ready: &mut Option<ReadySender>, event: SessionEvent) {
        attempt.connected = true;
        self.events.push(event);
        if let Some(tx) = ready.take() {
            let _ = tx.send(Ok(()));
        }
    }

    /// A bad first frame fails `open()` while it is waiting. Later it only
    /// costs the session.
    async fn handshake_failed(
        &self,
        sink: &mut dyn FrameSink,
        opening: bool,
        err: GatewayError,
    ) -> Outcome {
        if opening {
            let _ = sink.close(CLOSE_NORMAL).await;
            return Outcome::Fatal(err);
        }
        let _ = sink.close(CLOSE_RESUMABLE).await;
        self.session_lost(&err.to_string());
        Outcome::Reconnect {
            keep_session: false,
            connected: false,
        }
    }

    fn violation(&self, detail: &str) -> Exit {
        self.session_lost(detail);
        Exit::Reconnect {
            keep_session: false,
        }
    }

    fn session_lost(&self, detail: &str) {
        tracing::warn!(detail, "Protocol violation, starting a fresh session");
        self.events.push(SessionEvent::Disconnected {
            code: None,
            resumable: false,
        });
    }

    fn disconnected(&self, code: Option<u16>) {
        let resumable = self.state.lock().can_resume();
        self.events.push(SessionEvent::Disconnected { code, resumable });
    }

    fn transport_dropped(&self, code: Option<u16>) -> Exit {
        self.disconnected(code);
        Exit::Reconnect { keep_session: true }
    }

    fn dropped(&self, code: Option<u16>, connected: bool) -> Outcome {
        self.disconnected(code);
        Outcome::Reconnect {
            keep_session: true,
            connected,
        }
    }

    fn remote_closed(&self, frame: Option<CloseFrame>, connected: bool) -> Outcome {
        let Some(CloseFrame { code, reason }) = frame else {
            tracing::warn!("Remote closed the connection without a code");
            return self.dropped(None, connected);
        };

        match classify_close(code) {
            CloseDisposition::Fatal => {
                tracing::error!(close_code = code, %reason, "Remote closed the connection");
                if code == CLOSE_AUTHENTICATION_FAILED {
                    Outcome::Fatal(GatewayError::AuthenticationFailed)
                } else {
                    Outcome::Fatal(GatewayError::ClosedByRemote { code, reason })
                }
            }
            CloseDisposition::Reidentify => {
                tracing::warn!(close_code = code, %reason, "Remote closed the connection, session lost");
                self.events.push(SessionEvent::Disconnected {
                    code: Some(code),
                    resumable: false,
                });
                Outcome::Reconnect {
                    keep_session: false,
                    connected,
                }
            }
            CloseDisposition::Resume => {
                tracing::warn!(close_code = code, %reason, "Remote closed the connection");
                self.dropped(Some(code), connected)
            }
        }
    }
}
