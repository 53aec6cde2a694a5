//! Tail the gateway and log cache events.
//!
//! Run with: PUSHGATE_TOKEN=... cargo run -p gateway-tail
//!
//! Optional: `PUSHGATE_INTENTS` (integer bit set), `PUSHGATE_GATEWAY_URL`
//! (skip discovery), `PUSHGATE_API_BASE` (REST base URL), `RUST_LOG`.

use std::{env, sync::Arc};

use anyhow::Context;
use futures::{Stream, StreamExt};
use pushgate_cache::{CacheConfig, CacheEvent, CacheStore, Synthesizer};
use pushgate_core::{EventBus, EventSink};
use pushgate_session::{Gateway, GatewayConfig, SessionEvent};
use pushgate_transport::{Intents, RestClient, WebSocketConnector};
use tokio::sync::broadcast::{Receiver, error::RecvError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let token = env::var("PUSHGATE_TOKEN").context("PUSHGATE_TOKEN is not set")?;
    let intents = match env::var("PUSHGATE_INTENTS") {
        Ok(raw) => Intents(
            raw.parse()
                .context("PUSHGATE_INTENTS must be an integer bit set")?,
        ),
        Err(_) => {
            Intents::GUILDS
                | Intents::GUILD_EXPRESSIONS
                | Intents::GUILD_WEBHOOKS
                | Intents::GUILD_VOICE_STATES
                | Intents::GUILD_PRESENCES
        }
    };

    let mut config = GatewayConfig::new(token.clone()).with_intents(intents);
    if let Ok(url) = env::var("PUSHGATE_GATEWAY_URL") {
        config = config.with_gateway_url(url);
    }
    let mut rest = RestClient::new(token);
    if let Ok(base) = env::var("PUSHGATE_API_BASE") {
        rest = rest.with_base_url(base);
    }

    let (gateway, dispatches) = Gateway::new(
        config,
        Arc::new(WebSocketConnector::new()),
        Some(Arc::new(rest)),
    );

    let events = Arc::new(EventBus::<CacheEvent>::new());
    let store = Arc::new(CacheStore::new(&CacheConfig::default()));
    let sink: Arc<dyn EventSink<CacheEvent>> = events.clone();
    let synthesizer = Arc::new(Synthesizer::new(store, sink));

    tokio::spawn(log_cache_events(events.history_plus_stream()));
    tokio::spawn(log_events(gateway.subscribe(), |event: SessionEvent| {
        tracing::info!(?event, "Session event");
    }));
    let dispatcher = synthesizer.spawn_dispatcher(dispatches);

    gateway.open().await.context("Gateway failed to connect")?;
    tracing::info!(
        session_id = gateway.session_id().as_deref().unwrap_or_default(),
        "Connected, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    gateway.close().await;
    drop(gateway);
    dispatcher.await?;
    Ok(())
}

async fn log_cache_events(mut stream: impl Stream<Item = CacheEvent> + Unpin) {
    while let Some(event) = stream.next().await {
        tracing::info!(
            kind = event.kind.name(),
            sequence = ?event.sequence,
            detail = ?event.kind,
            "Cache event"
        );
    }
}

async fn log_events<E: Clone>(mut rx: Receiver<E>, log: impl Fn(E)) {
    loop {
        match rx.recv().await {
            Ok(event) => log(event),
            Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "Event log lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}
