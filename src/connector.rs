//! Capability traits
//!
//! The REST and streaming surfaces are capability interfaces implemented
//! once per exchange. Shared retry and reconnect logic lives in composed
//! helpers inside the implementations, not in a base type.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ConnectorResult;
use crate::model::{Candle, Ticker, Trade};

/// Read access to exchange history and snapshots.
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    /// Fetch recent trades for a pair, most-recent-first as the exchange
    /// returns them.
    async fn get_trades(&self, pair: &str, max_count: u32) -> ConnectorResult<Vec<Trade>>;

    /// Fetch a candle series. `period_secs` must be one of the supported
    /// timeframes; `from`/`to` are inclusive bounds and `limit` caps the
    /// result count, each forwarded only when present.
    async fn get_candle_series(
        &self,
        pair: &str,
        period_secs: u32,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> ConnectorResult<Vec<Candle>>;

    /// Fetch the current ticker snapshot for a pair.
    async fn get_ticker(&self, pair: &str) -> ConnectorResult<Ticker>;
}

/// Lifecycle and subscription control for one streaming session.
#[async_trait]
pub trait StreamingConnector: Send + Sync {
    async fn connect(&self) -> ConnectorResult<()>;
    async fn disconnect(&self) -> ConnectorResult<()>;

    async fn subscribe_trades(&self, pair: &str) -> ConnectorResult<()>;
    async fn unsubscribe_trades(&self, pair: &str) -> ConnectorResult<()>;

    async fn subscribe_candles(&self, pair: &str, period_secs: u32) -> ConnectorResult<()>;
    async fn unsubscribe_candles(&self, pair: &str, period_secs: u32) -> ConnectorResult<()>;
}
