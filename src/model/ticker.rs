//! Ticker model

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Point-in-time market snapshot for one pair.
///
/// Fields map positionally from the exchange payload:
/// `[bid, bidSize, ask, askSize, dailyChange, dailyChangeRelative,
///   lastPrice, volume, high, low]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub bid: Decimal,
    pub bid_size: Decimal,
    pub ask: Decimal,
    pub ask_size: Decimal,
    /// Absolute price change over the last 24h.
    pub daily_change: Decimal,
    /// Relative price change over the last 24h.
    pub daily_change_relative: Decimal,
    pub last_price: Decimal,
    /// Traded volume over the last 24h.
    pub volume: Decimal,
    /// 24h high.
    pub high: Decimal,
    /// 24h low.
    pub low: Decimal,
}
