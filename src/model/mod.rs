//! Domain model: normalized market-data types shared by the REST and
//! streaming paths.

mod candle;
mod subscription;
mod ticker;
mod timeframe;
mod trade;

pub use candle::Candle;
pub use subscription::{DataKind, SubscriptionKey};
pub use ticker::Ticker;
pub use timeframe::Timeframe;
pub use trade::{Trade, TradeSide};
