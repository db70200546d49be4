//! Connector error types
//!
//! Every failure is classified by kind so that retry decisions are made by
//! inspecting the variant, never by blanket matching. The REST adapter
//! retries only transient kinds; the streaming path swallows per-message
//! parse failures to keep the connection alive.

use thiserror::Error;

/// Connector error kinds
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum ConnectorError {
    /// Transient transport failure (connection refused, timeout, reset, DNS).
    #[error("network error: {0}")]
    Network(String),

    /// HTTP error status from the exchange. Never retried.
    #[error("http status {0}")]
    Status(u16),

    /// Malformed or schema-short response.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Single-message decode failure on the streaming path.
    #[error("parse error: {0}")]
    Parse(String),

    /// Caller supplied an unsupported parameter. Fails before any I/O.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Send attempted while the session is not open.
    #[error("websocket session is not connected")]
    NotConnected,

    /// Terminal: the session gave up after the maximum reconnect attempts
    /// and must be recreated.
    #[error("reconnect budget exhausted after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    /// Internal engine channel closed (session engine stopped).
    #[error("internal channel closed")]
    ChannelClosed,
}

impl ConnectorError {
    /// Whether this failure is worth retrying verbatim.
    pub fn is_transient(&self) -> bool {
        matches!(self, ConnectorError::Network(_))
    }
}

pub type ConnectorResult<T> = Result<T, ConnectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_errors_are_transient() {
        assert!(ConnectorError::Network("refused".into()).is_transient());
        assert!(!ConnectorError::Status(500).is_transient());
        assert!(!ConnectorError::Protocol("short".into()).is_transient());
        assert!(!ConnectorError::Configuration("bad period".into()).is_transient());
        assert!(!ConnectorError::NotConnected.is_transient());
        assert!(!ConnectorError::ReconnectExhausted { attempts: 5 }.is_transient());
    }
}
