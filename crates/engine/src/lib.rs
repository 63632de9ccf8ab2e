//! Area Trader Engine — support/resistance areas and breakout trading
//!
//! Provides:
//! - Area detection over a 3-candle sliding window and key-level building
//! - Binary search for the area containing a price
//! - Position state machine with stop loss / take profit management
//! - Daily aggregation of live ticks with level rebuilds
//! - Backtesting engine over intraday observations
//! - Binance public API client and trade stream for market data

pub mod aggregator;
pub mod api;
pub mod bot;
pub mod collection;
pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod levels;
pub mod locator;
pub mod position;
pub mod series;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-exports for convenience
pub use aggregator::DailyAggregator;
pub use api::{BinanceClient, MarketDataSource, PriceStream, PriceTick};
pub use bot::{BotStatus, TradingBot};
pub use collection::Collection;
pub use config::{AreaConfig, EngineConfig, TradingConfig};
pub use detector::AreaDetector;
pub use engine::BacktestEngine;
pub use error::{EngineError, Result};
pub use levels::{KeyLevelBuilder, LevelMap};
pub use locator::AreaLocator;
pub use position::PositionEngine;
pub use series::PriceSeries;
pub use types::*;
