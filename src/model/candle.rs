//! Candle model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One OHLCV candle. Immutable once constructed.
///
/// Fields map positionally from the exchange payload:
/// `[mts, open, high, low, close, volume, (total)]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Trading pair, e.g. "BTCUSD".
    pub pair: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// Cumulative traded volume over the candle period.
    pub volume: Decimal,
    /// Opening instant of the candle period.
    pub open_time: DateTime<Utc>,
    /// Cumulative notional, when the exchange includes it.
    pub total_price: Option<Decimal>,
}
