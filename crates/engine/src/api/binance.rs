//! Binance public API client for market data (no authentication required)

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use tracing::{debug, info};

use super::MarketDataSource;
use crate::error::EngineError;
use crate::types::Candle;

pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";
const MAX_KLINES_PER_REQUEST: u32 = 1000;

/// Binance interval strings accepted as-is
const INTERVALS: [&str; 15] = [
    "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w", "1M",
];

/// Binance public market data client
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
}

/// Raw kline data from Binance API (array of arrays)
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct RawKline(
    i64,    // 0: Open time
    String, // 1: Open
    String, // 2: High
    String, // 3: Low
    String, // 4: Close
    String, // 5: Volume
    i64,    // 6: Close time
    String, // 7: Quote asset volume
    u64,    // 8: Number of trades
    String, // 9: Taker buy base
    String, // 10: Taker buy quote
    String, // 11: Ignore
);

impl RawKline {
    /// Candle stamped with the open time in seconds
    fn into_candle(self) -> Option<Candle> {
        Some(Candle::new(
            self.0 / 1000,
            Decimal::from_str(&self.1).ok()?,
            Decimal::from_str(&self.2).ok()?,
            Decimal::from_str(&self.3).ok()?,
            Decimal::from_str(&self.4).ok()?,
            Decimal::from_str(&self.5).ok()?,
        ))
    }
}

/// Binance ticker price response
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct TickerPrice {
    symbol: String,
    price: String,
}

/// Map a resolution to a Binance interval. Accepts chart-style codes
/// (`1`, `30`, `60`, `D`, `W`, `M`) and Binance interval strings.
pub fn binance_interval(resolution: &str) -> Result<&'static str> {
    let interval = match resolution {
        "1" => "1m",
        "3" => "3m",
        "5" => "5m",
        "15" => "15m",
        "30" => "30m",
        "60" => "1h",
        "120" => "2h",
        "240" => "4h",
        "360" => "6h",
        "720" => "12h",
        "D" | "1D" => "1d",
        "W" | "1W" => "1w",
        "M" | "1M" => "1M",
        other => match INTERVALS.iter().find(|&&i| i == other) {
            Some(interval) => *interval,
            None => anyhow::bail!("Unsupported resolution: {}", other),
        },
    };
    Ok(interval)
}

impl Default for BinanceClient {
    fn default() -> Self {
        Self::new()
    }
}

impl BinanceClient {
    /// Create a new Binance client with default base URL
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Fetch klines for a symbol; times in milliseconds
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        start_time: Option<i64>,
        end_time: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<Candle>> {
        let mut url = format!(
            "{}/api/v3/klines?symbol={}&interval={}",
            self.base_url, symbol, interval
        );

        if let Some(start) = start_time {
            url.push_str(&format!("&startTime={}", start));
        }
        if let Some(end) = end_time {
            url.push_str(&format!("&endTime={}", end));
        }

        let limit = limit.unwrap_or(500).min(MAX_KLINES_PER_REQUEST);
        url.push_str(&format!("&limit={}", limit));

        debug!(symbol, interval, "Fetching klines from Binance");

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Binance API error {}: {}", status, body);
        }

        let raw_klines: Vec<RawKline> = response.json().await?;
        let candles = parse_klines(raw_klines);

        debug!(count = candles.len(), "Fetched klines");
        Ok(candles)
    }

    /// Fetch klines with automatic pagination for ranges > 1000 bars; times in
    /// milliseconds
    pub async fn get_klines_paginated(
        &self,
        symbol: &str,
        interval: &str,
        start_time: i64,
        end_time: i64,
    ) -> Result<Vec<Candle>> {
        let mut all_candles: Vec<Candle> = Vec::new();
        let mut current_start = start_time;

        info!(symbol, interval, "Fetching paginated klines from Binance");

        while current_start < end_time {
            let candles = self
                .get_klines(
                    symbol,
                    interval,
                    Some(current_start),
                    Some(end_time),
                    Some(MAX_KLINES_PER_REQUEST),
                )
                .await?;

            let Some(last) = candles.last() else {
                break;
            };

            // Move start to just after the last candle's open
            current_start = last.timestamp * 1000 + 1;
            all_candles.extend(candles);

            // Small delay to respect rate limits
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }

        info!(total = all_candles.len(), "Paginated kline fetch complete");
        Ok(all_candles)
    }

    /// Get current price for a symbol
    pub async fn get_price(&self, symbol: &str) -> Result<Decimal> {
        let url = format!("{}/api/v3/ticker/price?symbol={}", self.base_url, symbol);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Binance API error {}: {}", status, body);
        }

        let ticker: TickerPrice = response.json().await?;
        let price = Decimal::from_str(&ticker.price)?;
        Ok(price)
    }
}

#[async_trait]
impl MarketDataSource for BinanceClient {
    async fn fetch_history(
        &self,
        symbol: &str,
        resolution: &str,
        from: i64,
        to: i64,
    ) -> crate::error::Result<Vec<Candle>> {
        let unavailable = |e: anyhow::Error| EngineError::SourceUnavailable(e.to_string());

        let interval = binance_interval(resolution).map_err(unavailable)?;
        let mut candles = self
            .get_klines_paginated(symbol, interval, from * 1000, to * 1000)
            .await
            .map_err(unavailable)?;

        candles.retain(|c| c.timestamp >= from && c.timestamp < to);
        Ok(candles)
    }
}

/// Convert raw klines, dropping rows with unparseable numbers
fn parse_klines(raw: Vec<RawKline>) -> Vec<Candle> {
    raw.into_iter().filter_map(RawKline::into_candle).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_resolution_mapping() {
        assert_eq!(binance_interval("D").unwrap(), "1d");
        assert_eq!(binance_interval("30").unwrap(), "30m");
        assert_eq!(binance_interval("60").unwrap(), "1h");
        assert_eq!(binance_interval("4h").unwrap(), "4h");
        assert!(binance_interval("7").is_err());
    }

    #[test]
    fn test_klines_converted_to_second_candles() {
        let body = r#"[
            [1609459200000, "28923.63", "29600.00", "28624.57", "29331.69", "54182.92",
             1609545599999, "1582526272.0", 1314910, "27455.0", "803658424.0", "0"],
            [1609545600000, "29331.70", "bad", "28946.53", "32178.33", "129993.87",
             1609631999999, "4034893386.0", 2245922, "65950.0", "2058590115.0", "0"]
        ]"#;
        let raw: Vec<RawKline> = serde_json::from_str(body).unwrap();

        let candles = parse_klines(raw);

        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].timestamp, 1_609_459_200);
        assert_eq!(candles[0].open, dec!(28923.63));
        assert_eq!(candles[0].high, dec!(29600.00));
        assert_eq!(candles[0].close, dec!(29331.69));
    }

    #[tokio::test]
    async fn test_unsupported_resolution_is_source_unavailable() {
        let client = BinanceClient::with_base_url("http://127.0.0.1:9");
        let err = client
            .fetch_history("BTCUSDT", "bogus", 0, 86_400)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::SourceUnavailable(_)));
    }
}
