//! Inbound message dispatch
//!
//! Classifies raw frames coming off the socket and turns data frames into
//! typed events. The dispatcher runs as a router task fed through an
//! unbounded queue so socket reads never wait on handlers; array frames are
//! forwarded to a per-channel worker task, which keeps same-channel
//! delivery ordered while different channels proceed concurrently.
//!
//! Malformed elements are dropped individually with a log — one bad trade
//! or candle never takes the stream down.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::events::EventBus;
use crate::model::{Candle, SubscriptionKey, Timeframe, Trade, TradeSide};
use crate::ws::registry::ChannelRegistry;
use crate::ws::wire::SubscribedEvent;

/// Keep-alive marker payload; carries no data.
const HEARTBEAT: &str = "hb";
/// Trade-update tag.
const TRADE_UPDATE: &str = "tu";

/// Classifies inbound frames and emits typed events.
#[derive(Clone)]
pub struct MessageDispatcher {
    registry: Arc<ChannelRegistry>,
    bus: Arc<EventBus>,
}

impl MessageDispatcher {
    pub fn new(registry: Arc<ChannelRegistry>, bus: Arc<EventBus>) -> Self {
        Self { registry, bus }
    }

    /// Start the router task consuming raw frames from `rx`.
    pub fn spawn(self, rx: mpsc::UnboundedReceiver<String>) -> JoinHandle<()> {
        tokio::spawn(self.run(rx))
    }

    async fn run(self, mut rx: mpsc::UnboundedReceiver<String>) {
        let mut workers: HashMap<u64, mpsc::UnboundedSender<Value>> = HashMap::new();

        while let Some(text) = rx.recv().await {
            let value = match serde_json::from_str::<Value>(&text) {
                Ok(value) => value,
                Err(e) => {
                    debug!(error = %e, "dropping undecodable frame");
                    continue;
                }
            };

            match &value {
                Value::Object(_) => self.handle_event(&value),
                Value::Array(_) => {
                    let Some(chan_id) = value.get(0).and_then(Value::as_u64) else {
                        debug!("dropping array frame without a numeric channel id");
                        continue;
                    };
                    if self.registry.resolve(chan_id).is_none() {
                        // Unconfirmed or unsubscribed channel: drop the
                        // frame here and retire any idle worker instead of
                        // keeping one task per stale id alive.
                        if workers.remove(&chan_id).is_some() {
                            trace!(chan_id, "retired worker for removed channel");
                        }
                        debug!(chan_id, "dropping data frame for unknown channel");
                        continue;
                    }
                    let tx = workers.entry(chan_id).or_insert_with(|| {
                        let (tx, worker_rx) = mpsc::unbounded_channel();
                        let dispatcher = self.clone();
                        tokio::spawn(dispatcher.run_channel_worker(chan_id, worker_rx));
                        tx
                    });
                    // A worker only stops when its sender is dropped, so a
                    // failed send means the runtime is shutting down.
                    let _ = tx.send(value);
                }
                _ => debug!("dropping frame with unexpected top-level shape"),
            }
        }
        // Dropping the worker senders lets every per-channel task drain and
        // exit.
    }

    async fn run_channel_worker(self, chan_id: u64, mut rx: mpsc::UnboundedReceiver<Value>) {
        while let Some(frame) = rx.recv().await {
            self.process_data_frame(chan_id, &frame);
        }
        trace!(chan_id, "channel worker finished");
    }

    /// Handle an object-shaped control event.
    pub fn handle_event(&self, value: &Value) {
        let event = value.get("event").and_then(Value::as_str).unwrap_or("");
        if event != "subscribed" {
            debug!(event, "ignoring control event");
            return;
        }

        let confirmed: SubscribedEvent = match serde_json::from_value(value.clone()) {
            Ok(ev) => ev,
            Err(e) => {
                warn!(error = %e, "dropping malformed subscription confirmation");
                return;
            }
        };
        match subscription_from_confirmation(&confirmed) {
            Some(key) => {
                info!(chan_id = confirmed.chan_id, %key, "subscription confirmed");
                self.registry.confirm(confirmed.chan_id, key);
            }
            None => warn!(
                chan_id = confirmed.chan_id,
                channel = %confirmed.channel,
                "could not derive subscription from confirmation"
            ),
        }
    }

    /// Handle one array-shaped data frame for a channel.
    pub fn process_data_frame(&self, chan_id: u64, frame: &Value) {
        let Some(parts) = frame.as_array() else { return };
        let Some(payload) = parts.get(1) else { return };

        if payload.as_str() == Some(HEARTBEAT) {
            trace!(chan_id, "heartbeat");
            return;
        }

        let Some(key) = self.registry.resolve(chan_id) else {
            debug!(chan_id, "dropping data frame for unknown channel");
            return;
        };

        match payload {
            Value::String(tag) if tag == TRADE_UPDATE => {
                match parts.get(2).and_then(|raw| parse_trade(&key.pair, raw)) {
                    Some(trade) => self.bus.trades.emit(&trade),
                    None => warn!(chan_id, pair = %key.pair, "dropping malformed trade update"),
                }
            }
            Value::String(tag) => debug!(chan_id, tag = %tag, "ignoring unhandled frame tag"),
            Value::Array(rows) if rows.first().map_or(false, Value::is_array) => {
                // Snapshot: one candle per inner row, emitted in wire order.
                for row in rows {
                    match parse_candle(&key.pair, row) {
                        Some(candle) => self.bus.candles.emit(&candle),
                        None => {
                            warn!(chan_id, pair = %key.pair, "dropping malformed snapshot candle")
                        }
                    }
                }
            }
            Value::Array(_) => match parse_candle(&key.pair, payload) {
                Some(candle) => self.bus.candles.emit(&candle),
                None => warn!(chan_id, pair = %key.pair, "dropping malformed candle update"),
            },
            _ => debug!(chan_id, "dropping data frame with unexpected payload shape"),
        }
    }
}

/// Derive the registry key from a confirmation event: trades carry the
/// prefixed symbol, candles a "trade:{tf}:t{PAIR}" composite key whose
/// trailing token holds the pair.
fn subscription_from_confirmation(event: &SubscribedEvent) -> Option<SubscriptionKey> {
    match event.channel.as_str() {
        "trades" => {
            let symbol = event.symbol.as_deref()?;
            Some(SubscriptionKey::trades(strip_symbol_prefix(symbol)))
        }
        "candles" => {
            let key = event.key.as_deref()?;
            let mut tokens = key.split(':');
            tokens.next()?; // "trade"
            let timeframe = Timeframe::from_token(tokens.next()?)?;
            let pair = strip_symbol_prefix(tokens.last()?);
            Some(SubscriptionKey::candles(pair, timeframe))
        }
        _ => None,
    }
}

fn strip_symbol_prefix(symbol: &str) -> &str {
    symbol.strip_prefix('t').unwrap_or(symbol)
}

/// Decode `[id, mts, signedAmount, price]` into a [`Trade`].
fn parse_trade(pair: &str, raw: &Value) -> Option<Trade> {
    let fields = raw.as_array()?;
    if fields.len() < 4 {
        return None;
    }

    let id = trade_id(&fields[0])?;
    let time = millis_field(&fields[1])?;
    let signed_amount = decimal_field(&fields[2])?;
    let price = decimal_field(&fields[3])?;

    Some(Trade {
        id,
        pair: pair.to_string(),
        price,
        amount: signed_amount.abs(),
        side: TradeSide::from_signed_amount(signed_amount),
        time,
    })
}

/// Decode `[mts, open, high, low, close, volume, (total)]` into a
/// [`Candle`].
fn parse_candle(pair: &str, raw: &Value) -> Option<Candle> {
    let fields = raw.as_array()?;
    if fields.len() < 6 {
        return None;
    }

    Some(Candle {
        pair: pair.to_string(),
        open_time: millis_field(&fields[0])?,
        open: decimal_field(&fields[1])?,
        high: decimal_field(&fields[2])?,
        low: decimal_field(&fields[3])?,
        close: decimal_field(&fields[4])?,
        volume: decimal_field(&fields[5])?,
        total_price: fields.get(6).and_then(decimal_field),
    })
}

fn trade_id(value: &Value) -> Option<String> {
    if let Some(id) = value.as_i64() {
        return Some(id.to_string());
    }
    decimal_field(value).map(|d| d.normalize().to_string())
}

fn millis_field(value: &Value) -> Option<DateTime<Utc>> {
    let ms = value.as_i64()?;
    Utc.timestamp_millis_opt(ms).single()
}

fn decimal_field(value: &Value) -> Option<Decimal> {
    if let Some(i) = value.as_i64() {
        return Some(Decimal::from(i));
    }
    if let Some(f) = value.as_f64() {
        return Decimal::try_from(f).ok();
    }
    value.as_str().and_then(|s| Decimal::from_str(s).ok())
}
