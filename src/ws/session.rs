//! WebSocket session
//!
//! One [`BitfinexWsClient`] owns one streaming session: a background engine
//! task that dials the endpoint, performs the one-time `conf` exchange,
//! pumps inbound frames into the dispatcher and serializes outbound sends
//! through a command channel. Transport failures are retried with
//! exponential backoff until the reconnect budget runs out, after which the
//! session is fatal and must be recreated.
//!
//! Subscription state survives reconnects in the [`ChannelRegistry`] and is
//! cleared only on explicit disconnect.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::config::WsSettings;
use crate::connector::StreamingConnector;
use crate::error::{ConnectorError, ConnectorResult};
use crate::events::EventBus;
use crate::model::{SubscriptionKey, Timeframe};
use crate::ws::dispatch::MessageDispatcher;
use crate::ws::registry::ChannelRegistry;
use crate::ws::wire::{
    ConfRequest, SubscribeCandlesRequest, SubscribeTradesRequest, UnsubscribeRequest,
};

/// Outbound command queue depth. Sends block briefly when the socket writer
/// falls behind rather than buffering without bound.
const CMD_QUEUE_DEPTH: usize = 32;

/// Observable lifecycle of a streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Open,
    Reconnecting,
    /// Terminal. The reconnect budget is spent; the client must be
    /// recreated or reconnected explicitly.
    Fatal,
}

/// Public streaming client for the Bitfinex v2 channel protocol.
pub struct BitfinexWsClient {
    settings: WsSettings,
    registry: Arc<ChannelRegistry>,
    bus: Arc<EventBus>,
    state_tx: watch::Sender<SessionState>,
    state_rx: watch::Receiver<SessionState>,
    cmd_tx: Mutex<Option<mpsc::Sender<String>>>,
    shutdown_tx: Mutex<Option<broadcast::Sender<()>>>,
    engine: Mutex<Option<JoinHandle<ConnectorResult<()>>>>,
    fatal: Arc<Mutex<Option<ConnectorError>>>,
}

impl BitfinexWsClient {
    pub fn new(settings: WsSettings, bus: Arc<EventBus>) -> Self {
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);
        Self {
            settings,
            registry: Arc::new(ChannelRegistry::new()),
            bus,
            state_tx,
            state_rx,
            cmd_tx: Mutex::new(None),
            shutdown_tx: Mutex::new(None),
            engine: Mutex::new(None),
            fatal: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the session engine and wait until the socket is open.
    ///
    /// A no-op when the engine is already running. Returns the fatal error
    /// when the initial connection attempts exhaust the reconnect budget,
    /// or `NotConnected` when a concurrent `disconnect` cancels the
    /// attempt.
    pub async fn connect(&self) -> ConnectorResult<()> {
        {
            let mut slot = self.engine.lock();
            if slot.as_ref().map_or(false, |handle| !handle.is_finished()) {
                debug!("session engine already running");
                return Ok(());
            }

            *self.fatal.lock() = None;
            // The receiver is handed to the engine before the spawn so a
            // shutdown broadcast can never be lost to an unpolled task.
            let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
            let (cmd_tx, cmd_rx) = mpsc::channel(CMD_QUEUE_DEPTH);
            *self.shutdown_tx.lock() = Some(shutdown_tx);
            *self.cmd_tx.lock() = Some(cmd_tx);
            let _ = self.state_tx.send(SessionState::Connecting);

            let engine = SessionEngine {
                settings: self.settings.clone(),
                dispatcher: MessageDispatcher::new(
                    Arc::clone(&self.registry),
                    Arc::clone(&self.bus),
                ),
                state_tx: self.state_tx.clone(),
                cmd_rx,
                fatal: Arc::clone(&self.fatal),
            };
            *slot = Some(tokio::spawn(engine.run(shutdown_rx)));
        }

        let mut state = self.state_rx.clone();
        loop {
            match *state.borrow_and_update() {
                SessionState::Open => return Ok(()),
                SessionState::Fatal => {
                    return Err(self
                        .fatal_error()
                        .unwrap_or(ConnectorError::ChannelClosed))
                }
                // The engine only publishes Disconnected when it exits
                // cleanly, so a disconnect raced this attempt.
                SessionState::Disconnected => return Err(ConnectorError::NotConnected),
                _ => {}
            }
            state
                .changed()
                .await
                .map_err(|_| ConnectorError::ChannelClosed)?;
        }
    }

    /// Stop the engine, wait for it to wind down and clear all
    /// subscription state. Returns the engine's exit result.
    pub async fn disconnect(&self) -> ConnectorResult<()> {
        let handle = self.engine.lock().take();
        let Some(handle) = handle else {
            return Ok(());
        };

        if let Some(tx) = self.shutdown_tx.lock().as_ref() {
            let _ = tx.send(());
        }
        let result = handle
            .await
            .map_err(|e| ConnectorError::Protocol(format!("session engine panicked: {e}")));

        *self.cmd_tx.lock() = None;
        *self.shutdown_tx.lock() = None;
        self.registry.clear();

        result?
    }

    pub async fn subscribe_trades(&self, pair: &str) -> ConnectorResult<()> {
        let key = SubscriptionKey::trades(pair);
        if self.is_known(&key) {
            debug!(%key, "already subscribed");
            return Ok(());
        }
        self.send(&SubscribeTradesRequest::new(pair)).await?;
        self.registry.mark_pending(key);
        Ok(())
    }

    pub async fn unsubscribe_trades(&self, pair: &str) -> ConnectorResult<()> {
        self.unsubscribe(SubscriptionKey::trades(pair)).await
    }

    /// Subscribe to candles. `period_secs` is validated against the
    /// supported timeframes before anything is sent.
    pub async fn subscribe_candles(&self, pair: &str, period_secs: u32) -> ConnectorResult<()> {
        let timeframe = Timeframe::from_period_secs(period_secs)?;
        let key = SubscriptionKey::candles(pair, timeframe);
        if self.is_known(&key) {
            debug!(%key, "already subscribed");
            return Ok(());
        }
        self.send(&SubscribeCandlesRequest::new(pair, timeframe.token()))
            .await?;
        self.registry.mark_pending(key);
        Ok(())
    }

    pub async fn unsubscribe_candles(&self, pair: &str, period_secs: u32) -> ConnectorResult<()> {
        let timeframe = Timeframe::from_period_secs(period_secs)?;
        self.unsubscribe(SubscriptionKey::candles(pair, timeframe))
            .await
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Watch handle for state transitions.
    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Block until the session reaches `target`.
    pub async fn wait_for_state(&self, target: SessionState) -> ConnectorResult<()> {
        let mut state = self.state_rx.clone();
        loop {
            if *state.borrow_and_update() == target {
                return Ok(());
            }
            state
                .changed()
                .await
                .map_err(|_| ConnectorError::ChannelClosed)?;
        }
    }

    /// The error that turned the session fatal, if any.
    pub fn fatal_error(&self) -> Option<ConnectorError> {
        self.fatal.lock().clone()
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    fn is_known(&self, key: &SubscriptionKey) -> bool {
        self.registry.channel_for(key).is_some() || self.registry.is_pending(key)
    }

    async fn unsubscribe(&self, key: SubscriptionKey) -> ConnectorResult<()> {
        match self.registry.channel_for(&key) {
            Some(chan_id) => {
                self.send(&UnsubscribeRequest::new(chan_id)).await?;
                self.registry.remove(&key);
                Ok(())
            }
            None => {
                // Unknown or still pending: drop any pending mark, send
                // nothing.
                debug!(%key, "unsubscribe for inactive subscription");
                self.registry.remove(&key);
                Ok(())
            }
        }
    }

    async fn send<T: Serialize>(&self, request: &T) -> ConnectorResult<()> {
        let payload =
            serde_json::to_string(request).map_err(|e| ConnectorError::Parse(e.to_string()))?;
        self.send_raw(payload).await
    }

    /// Queue one outbound text frame. Only valid while the session is open.
    pub async fn send_raw(&self, payload: String) -> ConnectorResult<()> {
        if self.state() != SessionState::Open {
            return Err(ConnectorError::NotConnected);
        }
        let tx = self
            .cmd_tx
            .lock()
            .clone()
            .ok_or(ConnectorError::NotConnected)?;
        tx.send(payload)
            .await
            .map_err(|_| ConnectorError::ChannelClosed)
    }
}

#[async_trait]
impl StreamingConnector for BitfinexWsClient {
    async fn connect(&self) -> ConnectorResult<()> {
        BitfinexWsClient::connect(self).await
    }

    async fn disconnect(&self) -> ConnectorResult<()> {
        BitfinexWsClient::disconnect(self).await
    }

    async fn subscribe_trades(&self, pair: &str) -> ConnectorResult<()> {
        BitfinexWsClient::subscribe_trades(self, pair).await
    }

    async fn unsubscribe_trades(&self, pair: &str) -> ConnectorResult<()> {
        BitfinexWsClient::unsubscribe_trades(self, pair).await
    }

    async fn subscribe_candles(&self, pair: &str, period_secs: u32) -> ConnectorResult<()> {
        BitfinexWsClient::subscribe_candles(self, pair, period_secs).await
    }

    async fn unsubscribe_candles(&self, pair: &str, period_secs: u32) -> ConnectorResult<()> {
        BitfinexWsClient::unsubscribe_candles(self, pair, period_secs).await
    }
}

/// Background task owning the socket for the lifetime of one session.
struct SessionEngine {
    settings: WsSettings,
    dispatcher: MessageDispatcher,
    state_tx: watch::Sender<SessionState>,
    cmd_rx: mpsc::Receiver<String>,
    fatal: Arc<Mutex<Option<ConnectorError>>>,
}

impl SessionEngine {
    /// `shutdown` must come from the same broadcast channel the client
    /// holds; it is created before the engine is spawned.
    async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> ConnectorResult<()> {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let router = self.dispatcher.clone().spawn(frame_rx);

        let result = self.supervise(&frame_tx, &mut shutdown).await;

        drop(frame_tx);
        let _ = router.await;

        match &result {
            Ok(()) => {
                info!("websocket session closed");
                let _ = self.state_tx.send(SessionState::Disconnected);
            }
            Err(e) => {
                error!(error = %e, "websocket session is fatal");
                *self.fatal.lock() = Some(e.clone());
                let _ = self.state_tx.send(SessionState::Fatal);
            }
        }
        result
    }

    async fn supervise(
        &mut self,
        frame_tx: &mpsc::UnboundedSender<String>,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> ConnectorResult<()> {
        let mut attempt: u32 = 0;
        loop {
            match self.run_connection(frame_tx, shutdown, &mut attempt).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() => {
                    if attempt >= self.settings.max_reconnect_attempts {
                        return Err(ConnectorError::ReconnectExhausted { attempts: attempt });
                    }
                    attempt += 1;
                    let delay = backoff_delay(self.settings.backoff_base(), attempt);
                    warn!(error = %e, attempt, ?delay, "connection lost, backing off");
                    let _ = self.state_tx.send(SessionState::Reconnecting);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.recv() => return Ok(()),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Dial, configure and pump one connection until it fails or the
    /// session is asked to stop. `Ok` means a deliberate stop.
    async fn run_connection(
        &mut self,
        frame_tx: &mpsc::UnboundedSender<String>,
        shutdown: &mut broadcast::Receiver<()>,
        attempt: &mut u32,
    ) -> ConnectorResult<()> {
        let (stream, _) = tokio::select! {
            dialed = connect_async(self.settings.url.as_str()) => {
                dialed.map_err(|e| ConnectorError::Network(e.to_string()))?
            }
            _ = shutdown.recv() => return Ok(()),
        };
        let (mut write, mut read) = stream.split();

        let conf = serde_json::to_string(&ConfRequest::new(self.settings.conf_flags))
            .map_err(|e| ConnectorError::Parse(e.to_string()))?;
        write
            .send(Message::Text(conf))
            .await
            .map_err(|e| ConnectorError::Network(e.to_string()))?;

        info!(url = %self.settings.url, "websocket session open");
        *attempt = 0;
        let _ = self.state_tx.send(SessionState::Open);

        loop {
            tokio::select! {
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        // Never block the socket on handlers.
                        let _ = frame_tx.send(text);
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        write
                            .send(Message::Pong(payload))
                            .await
                            .map_err(|e| ConnectorError::Network(e.to_string()))?;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        return Err(ConnectorError::Network(
                            "server closed the connection".into(),
                        ));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(ConnectorError::Network(e.to_string())),
                },
                command = self.cmd_rx.recv() => match command {
                    Some(payload) => {
                        debug!(%payload, "sending");
                        write
                            .send(Message::Text(payload))
                            .await
                            .map_err(|e| ConnectorError::Network(e.to_string()))?;
                    }
                    // All senders gone: the client was dropped mid-session.
                    None => return Ok(()),
                },
                _ = shutdown.recv() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
            }
        }
    }
}

/// Wait before reconnect attempt `attempt` (1-based): `base * 2^attempt`.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * 2u32.saturating_pow(attempt.min(16))
}
