//! Subscription identity
//!
//! A logical streaming subscription is identified by its pair and data kind.
//! The exchange assigns a numeric channel id when it confirms the
//! subscription; the [`ChannelRegistry`](crate::ws::ChannelRegistry) keeps
//! the two sides mapped.

use std::fmt;

use crate::model::Timeframe;

/// Kind of streamed market data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    Trades,
    Candles(Timeframe),
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataKind::Trades => f.write_str("trades"),
            DataKind::Candles(tf) => write!(f, "candles:{tf}"),
        }
    }
}

/// Registry key for one logical subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub pair: String,
    pub kind: DataKind,
}

impl SubscriptionKey {
    pub fn trades(pair: impl Into<String>) -> Self {
        Self {
            pair: pair.into(),
            kind: DataKind::Trades,
        }
    }

    pub fn candles(pair: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            pair: pair.into(),
            kind: DataKind::Candles(timeframe),
        }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.pair, self.kind)
    }
}
