//! Public market-data connector for the Bitfinex v2 API.
//!
//! Two independent surfaces share one domain model:
//!
//! - [`BitfinexRestClient`] answers history and snapshot queries
//!   (trades, candles, tickers) over HTTP with fixed-delay retries on
//!   transport failures.
//! - [`BitfinexWsClient`] maintains one resilient streaming session over
//!   the channel-based WebSocket protocol, reconnecting with exponential
//!   backoff and multicasting typed [`Trade`] and [`Candle`] events
//!   through an [`EventBus`].
//!
//! ```no_run
//! use bitfinex_connector::{BitfinexWsClient, EventBus, Settings};
//!
//! # async fn run() -> bitfinex_connector::ConnectorResult<()> {
//! let settings = Settings::default();
//! let bus = EventBus::new();
//! bus.trades.subscribe(|trade| println!("{trade:?}"));
//!
//! let client = BitfinexWsClient::new(settings.ws, bus);
//! client.connect().await?;
//! client.subscribe_trades("BTCUSD").await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connector;
pub mod error;
pub mod events;
pub mod logging;
pub mod model;
pub mod rest;
pub mod ws;

pub use config::{RestSettings, Settings, WsSettings};
pub use connector::{HistoryProvider, StreamingConnector};
pub use error::{ConnectorError, ConnectorResult};
pub use events::{EventBus, HandlerId};
pub use logging::init_logging;
pub use model::{Candle, DataKind, SubscriptionKey, Ticker, Timeframe, Trade, TradeSide};
pub use rest::BitfinexRestClient;
pub use ws::{BitfinexWsClient, SessionState};
