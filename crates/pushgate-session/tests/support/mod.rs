//! In-memory gateway peer for driving the session state machine.

#![allow(dead_code)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use pushgate_core::{
    CloseFrame, Connection, Connector, DiscoveryError, FrameSink, FrameStream, GatewayResolver,
    TransportError, WireMessage,
};
use serde_json::{Value, json};
use tokio::sync::mpsc;

/// What the client wrote to the connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    Frame(Value),
    Close(u16),
}

/// Connector whose connections are handed to the test as [`RemotePeer`]s.
pub struct ScriptedConnector {
    peers: mpsc::UnboundedSender<RemotePeer>,
    failures: AtomicU32,
    urls: Mutex<Vec<String>>,
}

impl ScriptedConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<RemotePeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            peers,
            failures: AtomicU32::new(0),
            urls: Mutex::new(Vec::new()),
        });
        (connector, rx)
    }

    /// Refuse the next `count` connection attempts.
    pub fn fail_next(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Every URL dialed so far.
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, url: &str) -> Result<Connection, TransportError> {
        self.urls.lock().push(url.to_string());
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(TransportError::Connect("connection refused".into()));
        }

        let (server_tx, client_rx) = mpsc::unbounded_channel();
        let (client_tx, server_rx) = mpsc::unbounded_channel();
        let peer = RemotePeer {
            url: url.to_string(),
            tx: server_tx,
            rx: server_rx,
        };
        self.peers
            .send(peer)
            .map_err(|_| TransportError::Connect("nobody is listening".into()))?;

        Ok(Connection::new(
            Box::new(ChannelSink { tx: Some(client_tx) }),
            Box::new(ChannelStream { rx: client_rx }),
        ))
    }
}

struct ChannelSink {
    tx: Option<mpsc::UnboundedSender<ClientFrame>>,
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send(&mut self, message: WireMessage) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        let frame = match message {
            WireMessage::Text(text) => ClientFrame::Frame(
                serde_json::from_str(&text).map_err(|e| TransportError::Send(e.to_string()))?,
            ),
            WireMessage::Close(frame) => ClientFrame::Close(frame.map_or(1005, |f| f.code)),
            WireMessage::Binary(_) => return Err(TransportError::Send("binary".into())),
        };
        tx.send(frame).map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self, code: u16) -> Result<(), TransportError> {
        let tx = self.tx.take().ok_or(TransportError::Closed)?;
        tx.send(ClientFrame::Close(code))
            .map_err(|_| TransportError::Closed)
    }
}

struct ChannelStream {
    rx: mpsc::UnboundedReceiver<WireMessage>,
}

#[async_trait]
impl FrameStream for ChannelStream {
    async fn next_message(&mut self) -> Option<Result<WireMessage, TransportError>> {
        self.rx.recv().await.map(Ok)
    }
}

/// The remote end of one scripted connection. Dropping it drops the transport.
pub struct RemotePeer {
    pub url: String,
    tx: mpsc::UnboundedSender<WireMessage>,
    rx: mpsc::UnboundedReceiver<ClientFrame>,
}

impl RemotePeer {
    pub fn send(&self, message: WireMessage) {
        let _ = self.tx.send(message);
    }

    pub fn send_json(&self, value: &Value) {
        self.send(WireMessage::Text(value.to_string()));
    }

    pub fn hello(&self, heartbeat_interval_ms: u64) {
        self.send_json(&json!({"op": 10, "d": {"heartbeat_interval": heartbeat_interval_ms}}));
    }

    pub fn dispatch(&self, event: &str, seq: u64, data: Value) {
        self.send_json(&json!({"op": 0, "s": seq, "t": event, "d": data}));
    }

    pub fn ready(&self, session_id: &str, seq: u64, resume_url: Option<&str>) {
        self.dispatch(
            "READY",
            seq,
            json!({
                "v": 10,
                "session_id": session_id,
                "resume_gateway_url": resume_url,
                "guilds": [],
            }),
        );
    }

    pub fn resumed(&self, seq: u64) {
        self.dispatch("RESUMED", seq, Value::Null);
    }

    pub fn ack(&self) {
        self.send_json(&json!({"op": 11}));
    }

    pub fn close(&self, code: u16) {
        self.send(WireMessage::Close(Some(CloseFrame::new(code, "scripted"))));
    }

    /// Next frame from the client. Panics if nothing arrives.
    pub async fn recv(&mut self) -> ClientFrame {
        tokio::time::timeout(Duration::from_secs(300), self.rx.recv())
            .await
            .expect("client went quiet")
            .expect("client dropped the connection")
    }

    /// Next frame with opcode `op`, skipping heartbeats unless asked for one.
    pub async fn expect_op(&mut self, op: u64) -> Value {
        loop {
            match self.recv().await {
                ClientFrame::Frame(frame) if frame["op"] == op => return frame,
                ClientFrame::Frame(frame) if frame["op"] == 1 => {}
                other => panic!("expected op {op}, got {other:?}"),
            }
        }
    }

    /// Next close code, skipping heartbeats.
    pub async fn expect_close(&mut self) -> u16 {
        loop {
            match self.recv().await {
                ClientFrame::Close(code) => return code,
                ClientFrame::Frame(frame) if frame["op"] == 1 => {}
                other => panic!("expected close, got {other:?}"),
            }
        }
    }

    /// Hello, Identify, Ready.
    pub async fn handshake(&mut self, session_id: &str, seq: u64) -> Value {
        self.hello(45_000);
        let identify = self.expect_op(2).await;
        self.ready(session_id, seq, None);
        identify
    }
}

/// Resolver returning a fixed answer.
pub struct FixedResolver(pub Result<String, ()>);

#[async_trait]
impl GatewayResolver for FixedResolver {
    async fn gateway_url(&self) -> Result<String, DiscoveryError> {
        self.0.clone().map_err(|()| DiscoveryError::Unauthorized)
    }
}

/// Let other tasks run until `condition` holds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never became true");
}
