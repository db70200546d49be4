//! Trade model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a trade, derived from the sign of the raw signed amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    /// `amount > 0` is a buy, everything else a sell.
    pub fn from_signed_amount(amount: Decimal) -> Self {
        if amount > Decimal::ZERO {
            TradeSide::Buy
        } else {
            TradeSide::Sell
        }
    }
}

/// A single executed trade. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Exchange-assigned identifier, treated as opaque.
    pub id: String,
    /// Trading pair, e.g. "BTCUSD".
    pub pair: String,
    pub price: Decimal,
    /// Magnitude of the trade; always non-negative.
    pub amount: Decimal,
    pub side: TradeSide,
    /// Execution instant, millisecond precision.
    pub time: DateTime<Utc>,
}
