//! WebSocket wire messages
//!
//! Typed request and event shapes for the Bitfinex v2 channel protocol.
//! Data frames are positional JSON arrays and are decoded directly from
//! `serde_json::Value` in the dispatcher; only the object-shaped messages
//! get structs here.

use serde::{Deserialize, Serialize};

/// One-time post-connect configuration exchange.
#[derive(Debug, Serialize)]
pub struct ConfRequest {
    event: &'static str,
    flags: u32,
}

impl ConfRequest {
    pub fn new(flags: u32) -> Self {
        Self {
            event: "conf",
            flags,
        }
    }
}

/// Subscribe to the public trades channel of a pair.
#[derive(Debug, Serialize)]
pub struct SubscribeTradesRequest {
    event: &'static str,
    channel: &'static str,
    symbol: String,
}

impl SubscribeTradesRequest {
    pub fn new(pair: &str) -> Self {
        Self {
            event: "subscribe",
            channel: "trades",
            symbol: format!("t{pair}"),
        }
    }
}

/// Subscribe to the candles channel of a pair and timeframe.
#[derive(Debug, Serialize)]
pub struct SubscribeCandlesRequest {
    event: &'static str,
    channel: &'static str,
    key: String,
}

impl SubscribeCandlesRequest {
    pub fn new(pair: &str, timeframe_token: &str) -> Self {
        Self {
            event: "subscribe",
            channel: "candles",
            key: format!("trade:{timeframe_token}:t{pair}"),
        }
    }
}

/// Unsubscribe from an active channel by its exchange-assigned id.
#[derive(Debug, Serialize)]
pub struct UnsubscribeRequest {
    event: &'static str,
    #[serde(rename = "chanId")]
    chan_id: u64,
}

impl UnsubscribeRequest {
    pub fn new(chan_id: u64) -> Self {
        Self {
            event: "unsubscribe",
            chan_id,
        }
    }
}

/// Asynchronous subscription confirmation from the exchange.
///
/// Trades confirmations carry `symbol` ("tBTCUSD"), candle confirmations a
/// composite `key` ("trade:1m:tBTCUSD").
#[derive(Debug, Clone, Deserialize)]
pub struct SubscribedEvent {
    pub channel: String,
    #[serde(rename = "chanId")]
    pub chan_id: u64,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_requests_serialize_to_exchange_shape() {
        let trades = serde_json::to_value(SubscribeTradesRequest::new("BTCUSD")).unwrap();
        assert_eq!(
            trades,
            serde_json::json!({"event": "subscribe", "channel": "trades", "symbol": "tBTCUSD"})
        );

        let candles = serde_json::to_value(SubscribeCandlesRequest::new("ETHUSD", "5m")).unwrap();
        assert_eq!(
            candles,
            serde_json::json!({"event": "subscribe", "channel": "candles", "key": "trade:5m:tETHUSD"})
        );

        let unsub = serde_json::to_value(UnsubscribeRequest::new(42)).unwrap();
        assert_eq!(unsub, serde_json::json!({"event": "unsubscribe", "chanId": 42}));

        let conf = serde_json::to_value(ConfRequest::new(32768)).unwrap();
        assert_eq!(conf, serde_json::json!({"event": "conf", "flags": 32768}));
    }

    #[test]
    fn subscribed_event_accepts_symbol_or_key() {
        let trades: SubscribedEvent = serde_json::from_str(
            r#"{"event":"subscribed","channel":"trades","chanId":17,"symbol":"tBTCUSD"}"#,
        )
        .unwrap();
        assert_eq!(trades.chan_id, 17);
        assert_eq!(trades.symbol.as_deref(), Some("tBTCUSD"));
        assert_eq!(trades.key, None);

        let candles: SubscribedEvent = serde_json::from_str(
            r#"{"event":"subscribed","channel":"candles","chanId":5,"key":"trade:1m:tBTCUSD"}"#,
        )
        .unwrap();
        assert_eq!(candles.key.as_deref(), Some("trade:1m:tBTCUSD"));
    }
}
