//! Main application.
//!
//! Owns the single connection manager, subscribes the watchlist, turns
//! ticker frames into board updates and lifecycle events into metrics.

use crate::config::AppConfig;
use crate::error::AppResult;
use rust_decimal::prelude::ToPrimitive;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, trace, warn};
use tradedesk_feed::{
    combined_stream_url, combined_subscription_key, route_symbol, subscription_key,
    symbols_for_key, ticker_stream_url, DataSource, TickerBoard,
};
use tradedesk_llm::{ChatClient, ChatClientConfig, ChatMessage, Provider};
use tradedesk_store::{JsonFileStore, KeyValueStore, KeyValueStoreExt};
use tradedesk_telemetry::Metrics;
use tradedesk_ws::{ConnectionEvent, ConnectionManager, DynConnector, TungsteniteConnector};

/// Store key holding the user's watchlist (a JSON array of symbols).
pub const WATCHLIST_KEY: &str = "watchlist";

/// How long shutdown waits for transports to finish closing.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

const ASSISTANT_PROMPT: &str =
    "You are a concise market-data assistant. Answer in plain language.";

/// What `start_feeds` subscribed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedPlan {
    /// Subscription keys opened on the connection manager.
    pub keys: Vec<String>,
    /// Symbols served by polling, with no socket.
    pub polled: Vec<String>,
}

/// Main application state.
pub struct Application {
    config: AppConfig,
    manager: Arc<ConnectionManager>,
    board: Arc<TickerBoard>,
    store: Arc<dyn KeyValueStore>,
}

impl Application {
    /// Create the application with the on-disk store and the tungstenite connector.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let store = Arc::new(JsonFileStore::open(&config.store.path)?);
        Self::with_parts(
            config,
            store,
            Arc::new(TungsteniteConnector::default()),
        )
    }

    /// Create the application with an explicit store and connector.
    ///
    /// Rejects configurations that fail [`AppConfig::validate`].
    pub fn with_parts(
        config: AppConfig,
        store: Arc<dyn KeyValueStore>,
        connector: DynConnector,
    ) -> AppResult<Self> {
        config.validate()?;
        let manager = Arc::new(ConnectionManager::new(
            config.websocket.clone().into(),
            connector,
        ));
        Ok(Self {
            config,
            manager,
            board: Arc::new(TickerBoard::new()),
            store,
        })
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    pub fn board(&self) -> &Arc<TickerBoard> {
        &self.board
    }

    /// Symbols to watch: the stored watchlist if set, else the configured list.
    pub fn watchlist(&self) -> Vec<String> {
        match self.store.get_as::<Vec<String>>(WATCHLIST_KEY) {
            Ok(Some(list)) if !list.is_empty() => list,
            Ok(_) => self.config.symbols.clone(),
            Err(e) => {
                warn!(error = %e, "Stored watchlist unreadable, using configured symbols");
                self.config.symbols.clone()
            }
        }
    }

    /// Route every watched symbol and subscribe the streaming ones.
    pub fn start_feeds(&self) -> AppResult<FeedPlan> {
        let (streamed, polled): (Vec<String>, Vec<String>) = self
            .watchlist()
            .into_iter()
            .partition(|symbol| route_symbol(symbol).is_streaming());

        for symbol in &polled {
            info!(symbol = %symbol, source = %DataSource::Yahoo, "Polled symbol, no stream opened");
        }

        let mut plan = FeedPlan {
            keys: Vec::new(),
            polled,
        };

        if streamed.is_empty() {
            warn!("No streaming symbols in watchlist");
            return Ok(plan);
        }

        let base = &self.config.binance_ws_url;
        if self.config.combined {
            let url = combined_stream_url(base, &streamed)?;
            let key = combined_subscription_key(&streamed);
            self.subscribe_ticker(&key, url);
            plan.keys.push(key);
        } else {
            for symbol in &streamed {
                let key = subscription_key(symbol);
                self.subscribe_ticker(&key, ticker_stream_url(base, symbol));
                plan.keys.push(key);
            }
        }

        info!(keys = ?plan.keys, polled = plan.polled.len(), "Feeds started");
        Ok(plan)
    }

    fn subscribe_ticker(&self, key: &str, url: String) {
        let board = self.board.clone();
        let log_key = key.to_string();
        self.manager.subscribe(key, url, move |frame| match board.apply(&frame) {
            Ok(update) => {
                if let Some(price) = update.last_price.to_f64() {
                    Metrics::ticker_price(&update.symbol, price);
                }
                trace!(
                    symbol = %update.symbol,
                    price = %update.last_price,
                    change_pct = %update.price_change_percent,
                    "Ticker"
                );
            }
            Err(e) => debug!(key = %log_key, error = %e, "Non-ticker frame ignored"),
        });
    }

    /// Log and export current health and performance.
    pub fn report(&self) {
        let health = self.manager.health_snapshot();
        let perf = self.manager.performance_snapshot();
        Metrics::connections(health.total_connections, health.healthy_connections);
        Metrics::traffic(
            perf.messages_received,
            perf.bytes_received,
            perf.parse_errors,
            perf.callback_failures,
            perf.uptime_ms,
        );

        if health.is_healthy() {
            info!(
                connections = health.total_connections,
                "All feeds healthy"
            );
        } else {
            warn!(
                healthy = health.healthy_connections,
                total = health.total_connections,
                issues = ?health.issues,
                "Feed health degraded"
            );
        }
        info!(
            messages = perf.messages_received,
            bytes = perf.bytes_received,
            msg_per_sec = %format!("{:.2}", perf.messages_per_sec()),
            reconnects = perf.reconnect_attempts,
            parse_errors = perf.parse_errors,
            tickers = self.board.len(),
            "Feed performance"
        );
    }

    /// Ask the assistant one question.
    pub async fn ask(&self, provider: Provider, question: &str) -> AppResult<String> {
        let client = ChatClient::new(self.store.clone(), ChatClientConfig::default())?;
        let reply = client
            .complete(
                provider,
                &[
                    ChatMessage::system(ASSISTANT_PROMPT),
                    ChatMessage::user(question),
                ],
            )
            .await?;
        Ok(reply)
    }

    /// Run until Ctrl-C.
    pub async fn run(&self) -> AppResult<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(?e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
        })
        .await
    }

    /// Run the main loop until `shutdown` resolves, then close every feed.
    pub async fn run_until<F>(&self, shutdown: F) -> AppResult<()>
    where
        F: Future<Output = ()>,
    {
        info!(symbols = ?self.watchlist(), combined = self.config.combined, "Starting application");

        let mut events = self.manager.events();
        self.start_feeds()?;

        let mut report_interval =
            tokio::time::interval(Duration::from_secs(self.config.telemetry.report_interval_secs));
        // First tick completes immediately
        report_interval.tick().await;

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => {
                        handle_event(&event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Lifecycle events dropped, receiver lagging");
                    }
                    Err(RecvError::Closed) => break,
                },

                _ = report_interval.tick() => self.report(),

                () = &mut shutdown => break,
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Close every feed and wait briefly for transports to finish closing.
    pub async fn shutdown(&self) {
        info!("Shutting down feeds");
        self.manager.shutdown();

        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while !self.manager.is_idle() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        if drained.is_err() {
            warn!("Some transports did not close within the grace period");
        }

        self.report();
        info!("Shutdown complete");
    }
}

/// Export one lifecycle event and notify on terminal failures.
///
/// Returns the symbols whose live data was abandoned by this event.
fn handle_event(event: &ConnectionEvent) -> Vec<String> {
    Metrics::event(event.kind());
    match event {
        ConnectionEvent::Opened { key } => Metrics::connection_opened(key),
        ConnectionEvent::Closed { key, .. } => Metrics::connection_closed(key),
        ConnectionEvent::ReconnectScheduled { key, .. } => Metrics::reconnect_scheduled(key),
        ConnectionEvent::TerminalFailure { key, attempts } => {
            Metrics::terminal_failure(key);
            Metrics::connection_closed(key);
            let symbols = symbols_for_key(key);
            error!(
                key = %key,
                ?symbols,
                attempts,
                "Live data unavailable: feed abandoned after repeated failures"
            );
            return symbols;
        }
        ConnectionEvent::Error { key, message } => {
            debug!(key = %key, %message, "Connection error");
        }
    }
    Vec::new()
}
