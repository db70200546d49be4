//! REST client
//!
//! Thin adapter over the public v2 HTTP API. Responses are positional JSON
//! arrays; rows that fail to decode are skipped with a log so one bad row
//! never poisons a whole page. Transport failures are retried a fixed
//! number of times with a fixed delay; HTTP error statuses are returned to
//! the caller immediately.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::RestSettings;
use crate::connector::HistoryProvider;
use crate::error::{ConnectorError, ConnectorResult};
use crate::model::{Candle, Ticker, Timeframe, Trade, TradeSide};

/// Public REST client for the Bitfinex v2 API.
pub struct BitfinexRestClient {
    http: reqwest::Client,
    settings: RestSettings,
}

impl BitfinexRestClient {
    pub fn new(settings: RestSettings) -> ConnectorResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| ConnectorError::Configuration(e.to_string()))?;
        Ok(Self { http, settings })
    }

    /// Recent trades for a pair, in the order the exchange returns them
    /// (most recent first).
    pub async fn get_trades(&self, pair: &str, max_count: u32) -> ConnectorResult<Vec<Trade>> {
        let body = self
            .fetch(&format!("/trades/t{pair}/hist?limit={max_count}"))
            .await?;
        let rows = decode_rows(&body)?;

        let mut trades = Vec::with_capacity(rows.len());
        for row in &rows {
            match trade_from_row(pair, row) {
                Some(trade) => trades.push(trade),
                None => warn!(pair, "skipping malformed trade row"),
            }
        }
        Ok(trades)
    }

    /// Candle history for a pair. `period_secs` must map to a supported
    /// timeframe; bounds and limit are forwarded only when present.
    pub async fn get_candle_series(
        &self,
        pair: &str,
        period_secs: u32,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> ConnectorResult<Vec<Candle>> {
        let timeframe = Timeframe::from_period_secs(period_secs)?;

        let mut path = format!("/candles/trade:{}:t{pair}/hist", timeframe.token());
        let mut query = Vec::new();
        if let Some(limit) = limit {
            query.push(format!("limit={limit}"));
        }
        if let Some(from) = from {
            query.push(format!("start={}", from.timestamp_millis()));
        }
        if let Some(to) = to {
            query.push(format!("end={}", to.timestamp_millis()));
        }
        if !query.is_empty() {
            path.push('?');
            path.push_str(&query.join("&"));
        }

        let body = self.fetch(&path).await?;
        let rows = decode_rows(&body)?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in &rows {
            match candle_from_row(pair, row) {
                Some(candle) => candles.push(candle),
                None => warn!(pair, timeframe = %timeframe, "skipping malformed candle row"),
            }
        }
        Ok(candles)
    }

    /// Current ticker snapshot for a pair.
    pub async fn get_ticker(&self, pair: &str) -> ConnectorResult<Ticker> {
        let body = self.fetch(&format!("/ticker/t{pair}")).await?;
        let fields: Vec<Decimal> = serde_json::from_str(&body)
            .map_err(|e| ConnectorError::Protocol(format!("undecodable ticker payload: {e}")))?;
        if fields.len() < 10 {
            return Err(ConnectorError::Protocol(format!(
                "ticker payload too short: {} fields",
                fields.len()
            )));
        }
        Ok(Ticker {
            bid: fields[0],
            bid_size: fields[1],
            ask: fields[2],
            ask_size: fields[3],
            daily_change: fields[4],
            daily_change_relative: fields[5],
            last_price: fields[6],
            volume: fields[7],
            high: fields[8],
            low: fields[9],
        })
    }

    /// Last traded price for several pairs in one round trip, keyed by the
    /// prefixed symbol as the exchange returns it ("tBTCUSD"). Rows that
    /// fail to decode are skipped.
    pub async fn get_last_prices(&self, pairs: &[&str]) -> ConnectorResult<HashMap<String, Decimal>> {
        if pairs.is_empty() {
            return Ok(HashMap::new());
        }
        let symbols = pairs
            .iter()
            .map(|pair| format!("t{pair}"))
            .collect::<Vec<_>>()
            .join(",");
        let body = self.fetch(&format!("/tickers?symbols={symbols}")).await?;
        let rows: Vec<Vec<Value>> = serde_json::from_str(&body)
            .map_err(|e| ConnectorError::Protocol(format!("undecodable tickers payload: {e}")))?;

        let mut prices = HashMap::with_capacity(rows.len());
        for row in &rows {
            let Some(symbol) = row.first().and_then(Value::as_str) else {
                warn!("skipping tickers row without a symbol");
                continue;
            };
            // Symbol, then bid/bidSize/ask/askSize/dailyChange/dailyChangeRel,
            // then last price.
            let Some(last_price) = row.get(7).and_then(decimal_value) else {
                warn!(symbol, "skipping tickers row without a last price");
                continue;
            };
            prices.insert(symbol.to_string(), last_price);
        }
        Ok(prices)
    }

    /// GET with fixed-delay retries on transient transport failures. HTTP
    /// error statuses are never retried.
    async fn fetch(&self, path_and_query: &str) -> ConnectorResult<String> {
        let url = format!(
            "{}{path_and_query}",
            self.settings.base_url.trim_end_matches('/')
        );
        let mut attempt = 1;
        loop {
            match self.try_fetch(&url).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_transient() && attempt < self.settings.retry_attempts => {
                    warn!(%url, attempt, error = %e, "request failed, retrying");
                    tokio::time::sleep(self.settings.retry_delay()).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_fetch(&self, url: &str) -> ConnectorResult<String> {
        debug!(%url, "GET");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ConnectorError::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ConnectorError::Status(status.as_u16()));
        }
        response
            .text()
            .await
            .map_err(|e| ConnectorError::Network(e.to_string()))
    }
}

#[async_trait]
impl HistoryProvider for BitfinexRestClient {
    async fn get_trades(&self, pair: &str, max_count: u32) -> ConnectorResult<Vec<Trade>> {
        BitfinexRestClient::get_trades(self, pair, max_count).await
    }

    async fn get_candle_series(
        &self,
        pair: &str,
        period_secs: u32,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> ConnectorResult<Vec<Candle>> {
        BitfinexRestClient::get_candle_series(self, pair, period_secs, from, to, limit).await
    }

    async fn get_ticker(&self, pair: &str) -> ConnectorResult<Ticker> {
        BitfinexRestClient::get_ticker(self, pair).await
    }
}

/// Decode a row-list body. A blank body or JSON `null` is an empty result,
/// not an error.
fn decode_rows(body: &str) -> ConnectorResult<Vec<Vec<Decimal>>> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    let rows: Option<Vec<Vec<Decimal>>> = serde_json::from_str(body)
        .map_err(|e| ConnectorError::Protocol(format!("undecodable history payload: {e}")))?;
    Ok(rows.unwrap_or_default())
}

/// `[id, mts, signedAmount, price]`
fn trade_from_row(pair: &str, row: &[Decimal]) -> Option<Trade> {
    if row.len() < 4 {
        return None;
    }
    let time = Utc.timestamp_millis_opt(row[1].to_i64()?).single()?;
    let signed_amount = row[2];
    Some(Trade {
        id: row[0].normalize().to_string(),
        pair: pair.to_string(),
        price: row[3],
        amount: signed_amount.abs(),
        side: TradeSide::from_signed_amount(signed_amount),
        time,
    })
}

/// `[mts, open, high, low, close, volume, (total)]`
fn candle_from_row(pair: &str, row: &[Decimal]) -> Option<Candle> {
    if row.len() < 6 {
        return None;
    }
    Some(Candle {
        pair: pair.to_string(),
        open_time: Utc.timestamp_millis_opt(row[0].to_i64()?).single()?,
        open: row[1],
        high: row[2],
        low: row[3],
        close: row[4],
        volume: row[5],
        total_price: row.get(6).copied(),
    })
}

fn decimal_value(value: &Value) -> Option<Decimal> {
    serde_json::from_value(value.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn client_for(server: &mockito::ServerGuard) -> BitfinexRestClient {
        BitfinexRestClient::new(RestSettings {
            base_url: server.url(),
            timeout_secs: 5,
            retry_attempts: 3,
            retry_delay_ms: 10,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn trades_decode_sides_and_magnitudes() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/trades/tBTCUSD/hist?limit=2")
            .with_body(
                r#"[[123456789,1612137600000,0.005,50000],
                    [123456790,1612137601000,-0.01,49999.5]]"#,
            )
            .create_async()
            .await;

        let trades = client_for(&server).get_trades("BTCUSD", 2).await.unwrap();
        mock.assert_async().await;

        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].id, "123456789");
        assert_eq!(trades[0].pair, "BTCUSD");
        assert_eq!(trades[0].side, TradeSide::Buy);
        assert_eq!(trades[0].amount, Decimal::try_from(0.005f64).unwrap());
        assert_eq!(trades[0].price, dec!(50000));
        assert_eq!(trades[0].time.timestamp_millis(), 1612137600000);

        assert_eq!(trades[1].side, TradeSide::Sell);
        assert_eq!(trades[1].amount, Decimal::try_from(0.01f64).unwrap());
        assert_eq!(trades[1].price, Decimal::try_from(49999.5f64).unwrap());
    }

    #[tokio::test]
    async fn malformed_trade_rows_are_skipped() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/trades/tBTCUSD/hist?limit=3")
            .with_body(r#"[[1,1612137600000,1,2],[2,1612137601000],[3,1612137602000,-1,3]]"#)
            .create_async()
            .await;

        let trades = client_for(&server).get_trades("BTCUSD", 3).await.unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].id, "1");
        assert_eq!(trades[1].id, "3");
    }

    #[tokio::test]
    async fn candle_path_carries_the_timeframe_token() {
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
        let mut server = mockito::Server::new_async().await;
        let client = client_for(&server);
        for (secs, token) in table {
            let mock = server
                .mock("GET", format!("/candles/trade:{token}:tBTCUSD/hist?limit=1").as_str())
                .with_body("[]")
                .create_async()
                .await;
            let candles = client
                .get_candle_series("BTCUSD", secs, None, None, Some(1))
                .await
                .unwrap();
            mock.assert_async().await;
            assert!(candles.is_empty());
        }
    }

    #[tokio::test]
    async fn candle_rows_decode_positionally() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/candles/trade:1h:tBTCUSD/hist")
            .with_body(
                r#"[[1612137600000,50000,51000,49000,50500,100,5050000],
                    [1612141200000,50500,52000,50000,51500,80]]"#,
            )
            .create_async()
            .await;

        let candles = client_for(&server)
            .get_candle_series("BTCUSD", 3600, None, None, None)
            .await
            .unwrap();

        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].open, dec!(50000));
        assert_eq!(candles[0].high, dec!(51000));
        assert_eq!(candles[0].low, dec!(49000));
        assert_eq!(candles[0].close, dec!(50500));
        assert_eq!(candles[0].volume, dec!(100));
        assert_eq!(candles[0].total_price, Some(dec!(5050000)));
        assert_eq!(candles[0].open_time.timestamp_millis(), 1612137600000);
        assert_eq!(candles[1].total_price, None);
    }

    #[tokio::test]
    async fn candle_bounds_become_start_and_end_millis() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock(
                "GET",
                "/candles/trade:1m:tETHUSD/hist?limit=5&start=1612137600000&end=1612141200000",
            )
            .with_body("[]")
            .create_async()
            .await;

        let from = Utc.timestamp_millis_opt(1612137600000).unwrap();
        let to = Utc.timestamp_millis_opt(1612141200000).unwrap();
        client_for(&server)
            .get_candle_series("ETHUSD", 60, Some(from), Some(to), Some(5))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unsupported_period_fails_before_any_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let err = client_for(&server)
            .get_candle_series("BTCUSD", 42, None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::Configuration(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn ticker_decodes_all_ten_fields() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/ticker/tBTCUSD")
            .with_body("[96067.0,5.24,96068.0,4.94,-69.0,-0.00072,96067.0,420.34,97366.0,95748.0]")
            .create_async()
            .await;

        let ticker = client_for(&server).get_ticker("BTCUSD").await.unwrap();
        assert_eq!(ticker.bid, dec!(96067));
        assert_eq!(ticker.bid_size, Decimal::try_from(5.24f64).unwrap());
        assert_eq!(ticker.ask, dec!(96068));
        assert_eq!(ticker.ask_size, Decimal::try_from(4.94f64).unwrap());
        assert_eq!(ticker.daily_change, dec!(-69));
        assert_eq!(
            ticker.daily_change_relative,
            Decimal::try_from(-0.00072f64).unwrap()
        );
        assert_eq!(ticker.last_price, dec!(96067));
        assert_eq!(ticker.volume, Decimal::try_from(420.34f64).unwrap());
        assert_eq!(ticker.high, dec!(97366));
        assert_eq!(ticker.low, dec!(95748));
    }

    #[tokio::test]
    async fn short_ticker_payload_is_a_protocol_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/ticker/tBTCUSD")
            .with_body("[5.24,100,5.25]")
            .create_async()
            .await;

        let err = client_for(&server).get_ticker("BTCUSD").await.unwrap_err();
        assert!(matches!(err, ConnectorError::Protocol(_)));
    }

    #[tokio::test]
    async fn last_prices_key_by_prefixed_symbol() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/tickers?symbols=tBTCUSD,tETHUSD")
            .with_body(
                r#"[["tBTCUSD",5.24,100,5.25,80,0.1,0.0194,50000,1000,5.30,5.10],
                    ["tETHUSD",1.0,1,1.1,1,0.0,0.0,3000,10,1.2,0.9]]"#,
            )
            .create_async()
            .await;

        let prices = client_for(&server)
            .get_last_prices(&["BTCUSD", "ETHUSD"])
            .await
            .unwrap();
        mock.assert_async().await;

        assert_eq!(prices.len(), 2);
        assert_eq!(prices["tBTCUSD"], dec!(50000));
        assert_eq!(prices["tETHUSD"], dec!(3000));
    }

    #[tokio::test]
    async fn http_error_status_is_returned_without_retry() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/ticker/tBTCUSD")
            .with_status(500)
            .expect(1)
            .create_async()
            .await;

        let err = client_for(&server).get_ticker("BTCUSD").await.unwrap_err();
        assert!(matches!(err, ConnectorError::Status(500)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn null_body_is_an_empty_result() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/trades/tBTCUSD/hist?limit=5")
            .with_body("null")
            .create_async()
            .await;

        let trades = client_for(&server).get_trades("BTCUSD", 5).await.unwrap();
        assert!(trades.is_empty());
    }

    #[tokio::test]
    async fn transport_failures_use_the_whole_retry_budget() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        // A listener that drops every connection without answering, so each
        // attempt fails at the transport layer.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepts);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                drop(stream);
            }
        });

        let client = BitfinexRestClient::new(RestSettings {
            base_url: format!("http://{addr}"),
            timeout_secs: 5,
            retry_attempts: 3,
            retry_delay_ms: 10,
        })
        .unwrap();

        let err = client.get_ticker("BTCUSD").await.unwrap_err();
        assert!(matches!(err, ConnectorError::Network(_)));
        assert_eq!(accepts.load(Ordering::SeqCst), 3);
    }
}
