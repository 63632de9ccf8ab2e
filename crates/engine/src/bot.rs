//! Single-symbol trading bot: history, levels, daily aggregation and positions

use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::aggregator::DailyAggregator;
use crate::collection::Collection;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::position::PositionEngine;
use crate::types::{Candle, Position, PriceBand, TradeAction, TradeRecord};

/// Owns all analysis and position state for one symbol. Observations are
/// processed one at a time.
#[derive(Debug, Clone)]
pub struct TradingBot {
    config: EngineConfig,
    collection: Collection,
    engine: PositionEngine,
    aggregator: DailyAggregator,
    last_price: Option<Decimal>,
}

impl TradingBot {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            collection: Collection::new(config.areas.clone()),
            engine: PositionEngine::new(config.initial_balance, config.trading.clone())?,
            aggregator: DailyAggregator::new(),
            last_price: None,
            config,
        })
    }

    /// Seed the history and build areas and key levels
    pub fn load_history(&mut self, candles: Vec<Candle>) -> Result<usize> {
        self.collection.load_history(candles)
    }

    /// Live tick: roll it into the running day, then trade it
    pub fn on_price(&mut self, value: Decimal, observed_at: i64) -> Result<Vec<TradeAction>> {
        if value <= Decimal::ZERO {
            warn!(price = %value, time = observed_at, "Rejected tick");
            return Err(EngineError::InvalidPrice(value));
        }

        let tick = Candle::from_price(value, observed_at);
        self.aggregator.on_tick(&tick, &mut self.collection);
        self.predict(&tick)
    }

    /// Trade one observation against the current levels, without aggregation
    pub fn predict(&mut self, candle: &Candle) -> Result<Vec<TradeAction>> {
        let actions = self.engine.predict(candle, self.collection.levels())?;
        self.last_price = Some(candle.close);
        Ok(actions)
    }

    /// Close whatever is open at `price`
    pub fn close_open_position(&mut self, price: Decimal, time: i64) -> Option<TradeRecord> {
        self.engine.close_at(price, time)
    }

    pub fn describe(&self) -> BotStatus {
        let levels = self.collection.levels();
        BotStatus {
            balance: self.engine.balance(),
            position: *self.engine.position(),
            unrealized_pnl: self
                .last_price
                .map(|price| self.engine.unrealized_pnl(price))
                .unwrap_or_default(),
            last_price: self.last_price,
            tracked_area: self.engine.tracked_area().copied(),
            current_day: self.aggregator.current().copied(),
            history_len: self.collection.series().len(),
            interest_areas: levels.interest_areas.len(),
            key_levels: levels.key_levels.len(),
            closed_trades: self.engine.trades().len(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub fn engine(&self) -> &PositionEngine {
        &self.engine
    }

    pub fn log_status(&self) {
        let status = self.describe();
        info!(
            balance = %status.balance,
            unrealized = %status.unrealized_pnl,
            areas = status.interest_areas,
            trades = status.closed_trades,
            "{}",
            status
        );
    }
}

/// Read-only snapshot of a [`TradingBot`]
#[derive(Debug, Clone, Serialize)]
pub struct BotStatus {
    pub balance: Decimal,
    pub position: Position,
    pub unrealized_pnl: Decimal,
    pub last_price: Option<Decimal>,
    pub tracked_area: Option<PriceBand>,
    pub current_day: Option<Candle>,
    pub history_len: usize,
    pub interest_areas: usize,
    pub key_levels: usize,
    pub closed_trades: usize,
}

impl fmt::Display for BotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "balance {}", self.balance.round_dp(2))?;

        match (self.position.direction(), self.position.details()) {
            (Some(direction), Some(p)) => write!(
                f,
                " | {} {} @ {} (SL {}, TP {}, PnL {})",
                direction,
                p.units.round_dp(6),
                p.entry_price,
                p.stop_loss.round_dp(2),
                p.take_profit.round_dp(2),
                self.unrealized_pnl.round_dp(2)
            )?,
            _ => write!(f, " | NEUTRAL")?,
        }

        match &self.tracked_area {
            Some(area) => write!(f, " | area {}-{}", area.lower, area.upper)?,
            None => write!(f, " | no area")?,
        }

        if let Some(day) = &self.current_day {
            write!(
                f,
                " | day O {} H {} L {} C {}",
                day.open, day.high, day.low, day.close
            )?;
        }

        write!(
            f,
            " | {} candles, {} areas, {} key levels, {} trades",
            self.history_len, self.interest_areas, self.key_levels, self.closed_trades
        )
    }
}
