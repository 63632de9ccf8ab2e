//! Market data boundary: historical candles and live trade ticks

pub mod binance;
pub mod stream;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Candle;

pub use binance::BinanceClient;
pub use stream::{PriceStream, PriceTick};

/// Source of historical candles
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Candles with `from <= timestamp < to` (Unix seconds), ascending.
    /// Failures surface as `EngineError::SourceUnavailable`.
    async fn fetch_history(
        &self,
        symbol: &str,
        resolution: &str,
        from: i64,
        to: i64,
    ) -> Result<Vec<Candle>>;
}
