//! Streaming side of the connector: wire shapes, subscription registry,
//! inbound dispatch and the session engine.

pub mod dispatch;
pub mod registry;
pub mod session;
pub mod wire;

pub use dispatch::MessageDispatcher;
pub use registry::ChannelRegistry;
pub use session::{BitfinexWsClient, SessionState};
