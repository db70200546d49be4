//! REST side of the connector: history and snapshot queries over the
//! public HTTP API.

pub mod client;

pub use client::BitfinexRestClient;
