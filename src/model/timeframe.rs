//! Candle aggregation timeframes
//!
//! Bitfinex encodes the aggregation period as a token ("1m", "1D") in both
//! the REST candle path and the WebSocket candle subscription key. Only the
//! periods in the fixed table below are supported; anything else fails with
//! a configuration error before any network call.

use std::fmt;

use crate::error::{ConnectorError, ConnectorResult};

/// Supported candle timeframes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H2,
    H4,
    D1,
}

impl Timeframe {
    /// Map a period in seconds to its timeframe.
    pub fn from_period_secs(period_secs: u32) -> ConnectorResult<Self> {
        match period_secs {
            60 => Ok(Timeframe::M1),
            300 => Ok(Timeframe::M5),
            900 => Ok(Timeframe::M15),
            1800 => Ok(Timeframe::M30),
            3600 => Ok(Timeframe::H1),
            7200 => Ok(Timeframe::H2),
            14400 => Ok(Timeframe::H4),
            86400 => Ok(Timeframe::D1),
            other => Err(ConnectorError::Configuration(format!(
                "unsupported candle period: {other}s"
            ))),
        }
    }

    /// Parse an exchange timeframe token, e.g. from a subscription key.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "1m" => Some(Timeframe::M1),
            "5m" => Some(Timeframe::M5),
            "15m" => Some(Timeframe::M15),
            "30m" => Some(Timeframe::M30),
            "1h" => Some(Timeframe::H1),
            "2h" => Some(Timeframe::H2),
            "4h" => Some(Timeframe::H4),
            "1D" => Some(Timeframe::D1),
            _ => None,
        }
    }

    /// Exchange token for this timeframe.
    pub fn token(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H2 => "2h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1D",
        }
    }

    /// Period covered by one candle, in seconds.
    pub fn period_secs(&self) -> u32 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::M30 => 1800,
            Timeframe::H1 => 3600,
            Timeframe::H2 => 7200,
            Timeframe::H4 => 14400,
            Timeframe::D1 => 86400,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_every_supported_period() {
        let table = [
            (60, "1m"),
            (300, "5m"),
            (900, "15m"),
            (1800, "30m"),
            (3600, "1h"),
            (7200, "2h"),
            (14400, "4h"),
            (86400, "1D"),
        ];
        for (secs, token) in table {
            let tf = Timeframe::from_period_secs(secs).unwrap();
            assert_eq!(tf.token(), token);
            assert_eq!(tf.period_secs(), secs);
            assert_eq!(Timeframe::from_token(token), Some(tf));
        }
    }

    #[test]
    fn rejects_unmapped_period() {
        let err = Timeframe::from_period_secs(61).unwrap_err();
        assert!(matches!(err, ConnectorError::Configuration(_)));
    }

    #[test]
    fn rejects_unknown_token() {
        assert_eq!(Timeframe::from_token("3m"), None);
        assert_eq!(Timeframe::from_token("1d"), None);
    }
}
