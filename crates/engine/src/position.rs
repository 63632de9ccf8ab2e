//! Position state machine trading breakouts from tracked interest areas
//!
//! Per observation, in order:
//! 1. Close an open position whose stop loss or take profit was reached.
//! 2. Acquire an area containing the price if none is tracked.
//! 3. While neutral, open a short (long) when price has left the tracked area
//!    downward (upward) by at least `min_difference`, targeting the next key
//!    level beyond price.

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::config::TradingConfig;
use crate::error::{EngineError, Result};
use crate::levels::LevelMap;
use crate::locator::AreaLocator;
use crate::types::{
    Candle, Direction, ExitReason, OpenPosition, Position, PriceBand, TradeAction, TradeRecord,
};

/// Stop and target for a prospective entry
#[derive(Debug, Clone, Copy, PartialEq)]
struct EntryPlan {
    stop_loss: Decimal,
    take_profit: Decimal,
}

#[derive(Debug, Clone)]
pub struct PositionEngine {
    config: TradingConfig,
    balance: Decimal,
    position: Position,
    tracked_area: Option<PriceBand>,
    trades: Vec<TradeRecord>,
}

impl PositionEngine {
    pub fn new(initial_balance: Decimal, config: TradingConfig) -> Result<Self> {
        if initial_balance <= Decimal::ZERO {
            return Err(EngineError::InvalidConfiguration(
                "initial balance must be positive".into(),
            ));
        }
        config.validate()?;

        Ok(Self {
            config,
            balance: initial_balance,
            position: Position::Neutral,
            tracked_area: None,
            trades: Vec::new(),
        })
    }

    /// Feed one price observation through the state machine
    pub fn predict(&mut self, candle: &Candle, levels: &LevelMap) -> Result<Vec<TradeAction>> {
        let price = candle.close;
        if price <= Decimal::ZERO {
            warn!(price = %price, time = candle.timestamp, "Rejected observation");
            return Err(EngineError::InvalidPrice(price));
        }

        let mut actions = Vec::new();

        if let Some(record) = self.check_exit(price, candle.timestamp) {
            actions.push(TradeAction::Closed(record));
        }

        if self.tracked_area.is_none() {
            match AreaLocator::locate(&levels.interest_areas, price) {
                Ok(area) => {
                    debug!(
                        price = %price,
                        upper = %area.upper,
                        lower = %area.lower,
                        "Price inside interest area"
                    );
                    self.tracked_area = Some(*area);
                }
                Err(e) => debug!(reason = %e, "Area not yet discovered"),
            }
        }

        if self.position.is_neutral() {
            if let Some(area) = self.tracked_area {
                if let Some(opened) =
                    self.evaluate_entry(price, candle.timestamp, area, &levels.key_levels)
                {
                    actions.push(opened);
                }
            }
        }

        Ok(actions)
    }

    /// Close the open position when price has reached its stop or target.
    /// The fill is at the level that was hit.
    pub fn check_exit(&mut self, price: Decimal, time: i64) -> Option<TradeRecord> {
        let (direction, details) = match self.position {
            Position::Neutral => return None,
            Position::Long(details) => (Direction::Long, details),
            Position::Short(details) => (Direction::Short, details),
        };

        let (exit_price, reason) = match direction {
            Direction::Long if price <= details.stop_loss => {
                (details.stop_loss, ExitReason::StopLoss)
            }
            Direction::Long if price >= details.take_profit => {
                (details.take_profit, ExitReason::TakeProfit)
            }
            Direction::Short if price >= details.stop_loss => {
                (details.stop_loss, ExitReason::StopLoss)
            }
            Direction::Short if price <= details.take_profit => {
                (details.take_profit, ExitReason::TakeProfit)
            }
            _ => return None,
        };

        self.close_position(exit_price, time, reason)
    }

    /// Close any open position at `price`, e.g. when the data runs out
    pub fn close_at(&mut self, price: Decimal, time: i64) -> Option<TradeRecord> {
        self.close_position(price, time, ExitReason::EndOfData)
    }

    fn close_position(
        &mut self,
        exit_price: Decimal,
        time: i64,
        reason: ExitReason,
    ) -> Option<TradeRecord> {
        let direction = self.position.direction()?;
        let details = *self.position.details()?;

        let pnl = direction.sign() * (exit_price - details.entry_price) * details.units;
        self.balance += pnl;
        self.position = Position::Neutral;

        info!(
            direction = %direction,
            entry = %details.entry_price,
            exit = %exit_price,
            pnl = %pnl,
            balance = %self.balance,
            reason = ?reason,
            "Closed position"
        );

        let record = TradeRecord {
            direction,
            entry_time: details.opened_at,
            exit_time: time,
            entry_price: details.entry_price,
            exit_price,
            units: details.units,
            pnl,
            exit_reason: reason,
        };
        self.trades.push(record.clone());
        Some(record)
    }

    fn evaluate_entry(
        &mut self,
        price: Decimal,
        time: i64,
        area: PriceBand,
        key_levels: &[Decimal],
    ) -> Option<TradeAction> {
        let min_difference = self.config.min_difference;
        let (low, high) = (area.lower.min(area.upper), area.lower.max(area.upper));

        let direction = if price < low && low - price >= min_difference {
            Direction::Short
        } else if price > high && price - high >= min_difference {
            Direction::Long
        } else {
            return None;
        };

        // A breakout releases the area whether or not the entry is taken
        self.tracked_area = None;

        let plan = match self.plan_entry(price, direction, key_levels) {
            Ok(plan) => plan,
            Err(e) => {
                debug!(price = %price, reason = %e, "Entry skipped");
                return None;
            }
        };

        let units = self.balance / price;
        self.position = Position::open(
            direction,
            OpenPosition {
                entry_price: price,
                stop_loss: plan.stop_loss,
                take_profit: plan.take_profit,
                units,
                opened_at: time,
            },
        );

        info!(
            direction = %direction,
            price = %price,
            stop_loss = %plan.stop_loss,
            take_profit = %plan.take_profit,
            units = %units,
            "Opened position"
        );

        Some(TradeAction::Opened {
            direction,
            entry_price: price,
            stop_loss: plan.stop_loss,
            take_profit: plan.take_profit,
            units,
        })
    }

    fn plan_entry(
        &self,
        price: Decimal,
        direction: Direction,
        key_levels: &[Decimal],
    ) -> Result<EntryPlan> {
        if self.balance <= Decimal::ZERO {
            return Err(EngineError::InsufficientBalance(self.balance));
        }

        let level = self
            .find_next_interesting_level(price, direction, key_levels)
            .ok_or(EngineError::NoTargetLevel { price, direction })?;

        let target_buffer = self.config.min_difference * self.config.target_buffer_ratio;
        let stop_distance = self.config.min_difference * self.config.stop_buffer_multiple;

        let plan = match direction {
            Direction::Short => EntryPlan {
                stop_loss: price + stop_distance,
                take_profit: level - target_buffer,
            },
            Direction::Long => EntryPlan {
                stop_loss: price - stop_distance,
                take_profit: level + target_buffer,
            },
        };

        if plan.take_profit <= Decimal::ZERO {
            return Err(EngineError::NoTargetLevel { price, direction });
        }

        let reward = (price - plan.take_profit).abs();
        let risk = (price - plan.stop_loss).abs();
        if reward < risk * (Decimal::ONE - self.config.max_reward_shortfall) {
            return Err(EngineError::RiskRewardRejected { reward, risk });
        }

        Ok(plan)
    }

    /// Next key level beyond `price` in the trade direction, clearing it by
    /// more than `level_delta`. `key_levels` must be sorted ascending.
    pub fn find_next_interesting_level(
        &self,
        price: Decimal,
        direction: Direction,
        key_levels: &[Decimal],
    ) -> Option<Decimal> {
        let delta = self.config.level_delta;
        let level = match direction {
            Direction::Short => key_levels.iter().rev().find(|&&level| level + delta < price),
            Direction::Long => key_levels.iter().find(|&&level| level > price + delta),
        };
        level.copied()
    }

    /// Open P/L at `price`, zero when neutral
    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        match (self.position.direction(), self.position.details()) {
            (Some(direction), Some(details)) => {
                direction.sign() * (price - details.entry_price) * details.units
            }
            _ => Decimal::ZERO,
        }
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn tracked_area(&self) -> Option<&PriceBand> {
        self.tracked_area.as_ref()
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AreaKind;
    use rust_decimal_macros::dec;

    fn engine() -> PositionEngine {
        PositionEngine::new(dec!(10000), TradingConfig::default()).unwrap()
    }

    fn tick(price: Decimal, ts: i64) -> Candle {
        Candle::from_price(price, ts)
    }

    fn levels() -> LevelMap {
        LevelMap {
            interest_areas: vec![
                PriceBand::new(dec!(18500), dec!(18000), 0, AreaKind::Support),
                PriceBand::new(dec!(20500), dec!(20000), 0, AreaKind::Merged),
                PriceBand::new(dec!(24000), dec!(23500), 0, AreaKind::Resistance),
            ],
            key_levels: vec![dec!(18250), dec!(19000), dec!(20250), dec!(23750), dec!(25000)],
        }
    }

    fn with_long(entry: Decimal, units: Decimal, stop: Decimal, target: Decimal) -> PositionEngine {
        let mut engine = engine();
        engine.position = Position::Long(OpenPosition {
            entry_price: entry,
            stop_loss: stop,
            take_profit: target,
            units,
            opened_at: 0,
        });
        engine
    }

    #[test]
    fn test_non_positive_balance_rejected() {
        let err = PositionEngine::new(Decimal::ZERO, TradingConfig::default()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_long_take_profit_fills_at_target() {
        let mut engine = with_long(dec!(40000), dec!(0.25), dec!(39000), dec!(42000));

        let actions = engine.predict(&tick(dec!(42500), 60), &LevelMap::default()).unwrap();

        assert_eq!(actions.len(), 1);
        let TradeAction::Closed(record) = &actions[0] else {
            panic!("expected a close, got {:?}", actions[0]);
        };
        assert_eq!(record.exit_price, dec!(42000));
        assert_eq!(record.pnl, dec!(500));
        assert_eq!(record.exit_reason, ExitReason::TakeProfit);
        assert_eq!(engine.balance(), dec!(10500));
        assert!(engine.position().is_neutral());
    }

    #[test]
    fn test_long_stop_loss_fills_at_stop() {
        let mut engine = with_long(dec!(40000), dec!(0.25), dec!(39000), dec!(42000));
        let record = engine.check_exit(dec!(38900), 60).unwrap();
        assert_eq!(record.exit_price, dec!(39000));
        assert_eq!(record.pnl, dec!(-250));
        assert_eq!(record.exit_reason, ExitReason::StopLoss);
        assert_eq!(engine.balance(), dec!(9750));
    }

    #[test]
    fn test_long_exit_exactly_at_stop() {
        let mut engine = with_long(dec!(40000), dec!(0.25), dec!(39000), dec!(42000));
        let record = engine.check_exit(dec!(39000), 60).unwrap();
        assert_eq!(record.exit_reason, ExitReason::StopLoss);
        assert_eq!(record.pnl, dec!(-250));
        assert!(engine.position().is_neutral());
    }

    #[test]
    fn test_no_exit_between_stop_and_target() {
        let mut engine = with_long(dec!(40000), dec!(0.25), dec!(39000), dec!(42000));
        assert!(engine.check_exit(dec!(41000), 60).is_none());
        assert_eq!(engine.position().direction(), Some(Direction::Long));
    }

    #[test]
    fn test_short_round_trip_pnl() {
        let mut engine = engine();
        engine.position = Position::Short(OpenPosition {
            entry_price: dec!(30000),
            stop_loss: dec!(30500),
            take_profit: dec!(29000),
            units: dec!(0.3),
            opened_at: 0,
        });

        let record = engine.check_exit(dec!(28950), 10).unwrap();
        // (P - P') * U = (30000 - 29000) * 0.3
        assert_eq!(record.pnl, dec!(300));
        assert_eq!(engine.balance(), dec!(10300));
    }

    #[test]
    fn test_exit_is_idempotent() {
        let mut engine = with_long(dec!(40000), dec!(0.25), dec!(39000), dec!(42000));
        engine.check_exit(dec!(42000), 1).unwrap();
        let balance = engine.balance();

        assert!(engine.check_exit(dec!(10), 2).is_none());
        assert!(engine.close_at(dec!(10), 3).is_none());
        assert_eq!(engine.balance(), balance);
        assert_eq!(*engine.position(), Position::Neutral);
        assert_eq!(engine.unrealized_pnl(dec!(50000)), Decimal::ZERO);
        assert_eq!(engine.trades().len(), 1);
    }

    #[test]
    fn test_acquires_area_containing_price() {
        let mut engine = engine();
        let actions = engine.predict(&tick(dec!(20200), 0), &levels()).unwrap();
        assert!(actions.is_empty());
        assert_eq!(engine.tracked_area().unwrap().lower, dec!(20000));
    }

    #[test]
    fn test_stays_untracked_outside_areas() {
        let mut engine = engine();
        engine.predict(&tick(dec!(22000), 0), &levels()).unwrap();
        assert!(engine.tracked_area().is_none());
        assert!(engine.position().is_neutral());
    }

    #[test]
    fn test_opens_short_below_area() {
        let mut engine = engine();
        let levels = levels();
        engine.predict(&tick(dec!(20200), 0), &levels).unwrap();

        let actions = engine.predict(&tick(dec!(19700), 60), &levels).unwrap();

        assert_eq!(
            actions,
            vec![TradeAction::Opened {
                direction: Direction::Short,
                entry_price: dec!(19700),
                stop_loss: dec!(19872),
                take_profit: dec!(18982.8),
                units: dec!(10000) / dec!(19700),
            }]
        );
        assert_eq!(engine.position().direction(), Some(Direction::Short));
        assert!(engine.tracked_area().is_none());
    }

    #[test]
    fn test_opens_long_above_area() {
        let mut engine = engine();
        let levels = levels();
        engine.predict(&tick(dec!(20200), 0), &levels).unwrap();

        let actions = engine.predict(&tick(dec!(20800), 60), &levels).unwrap();

        let TradeAction::Opened {
            direction,
            stop_loss,
            take_profit,
            ..
        } = &actions[0]
        else {
            panic!("expected an entry");
        };
        assert_eq!(*direction, Direction::Long);
        assert_eq!(*stop_loss, dec!(20628));
        assert_eq!(*take_profit, dec!(23767.2));
    }

    #[test]
    fn test_entry_at_exact_min_difference() {
        let mut engine = engine();
        let levels = levels();
        engine.predict(&tick(dec!(20200), 0), &levels).unwrap();

        // 20000 - 19828 == min_difference
        let actions = engine.predict(&tick(dec!(19828), 60), &levels).unwrap();

        assert_eq!(actions.len(), 1);
        assert_eq!(engine.position().direction(), Some(Direction::Short));
        let details = engine.position().details().unwrap();
        assert_eq!(details.stop_loss, dec!(20000));
        assert_eq!(details.take_profit, dec!(18982.8));
    }

    #[test]
    fn test_just_inside_min_difference_stays_neutral() {
        let mut engine = engine();
        let levels = levels();
        engine.predict(&tick(dec!(20200), 0), &levels).unwrap();

        let actions = engine.predict(&tick(dec!(19828.01), 60), &levels).unwrap();
        assert!(actions.is_empty());
        assert!(engine.tracked_area().is_some());
    }

    #[test]
    fn test_small_move_keeps_area_and_stays_neutral() {
        let mut engine = engine();
        let levels = levels();
        engine.predict(&tick(dec!(20200), 0), &levels).unwrap();

        let actions = engine.predict(&tick(dec!(19900), 60), &levels).unwrap();
        assert!(actions.is_empty());
        assert!(engine.position().is_neutral());
        assert_eq!(engine.tracked_area().unwrap().upper, dec!(20500));
    }

    #[test]
    fn test_no_target_level_skips_entry() {
        let mut engine = engine();
        let levels = LevelMap {
            interest_areas: vec![PriceBand::new(dec!(20500), dec!(20000), 0, AreaKind::Merged)],
            key_levels: vec![dec!(20250), dec!(22000)],
        };
        engine.predict(&tick(dec!(20200), 0), &levels).unwrap();

        let actions = engine.predict(&tick(dec!(19700), 60), &levels).unwrap();
        assert!(actions.is_empty());
        assert!(engine.position().is_neutral());
        assert!(engine.tracked_area().is_none());
    }

    #[test]
    fn test_risk_filter_rejects_far_stop() {
        let config = TradingConfig {
            stop_buffer_multiple: dec!(10),
            ..Default::default()
        };
        let mut engine = PositionEngine::new(dec!(10000), config).unwrap();
        let levels = levels();
        engine.predict(&tick(dec!(20200), 0), &levels).unwrap();

        // reward 717.2 against risk 1720
        let actions = engine.predict(&tick(dec!(19700), 60), &levels).unwrap();
        assert!(actions.is_empty());
        assert!(engine.position().is_neutral());
    }

    #[test]
    fn test_invalid_price_rejected_without_state_change() {
        let mut engine = engine();
        let levels = levels();
        engine.predict(&tick(dec!(20200), 0), &levels).unwrap();

        let err = engine.predict(&tick(Decimal::ZERO, 60), &levels).unwrap_err();
        assert_eq!(err, EngineError::InvalidPrice(Decimal::ZERO));
        assert!(engine.tracked_area().is_some());
        assert_eq!(engine.balance(), dec!(10000));
    }

    #[test]
    fn test_find_next_interesting_level() {
        let engine = engine();
        let levels = [dec!(100), dec!(200), dec!(300)];

        assert_eq!(
            engine.find_next_interesting_level(dec!(260), Direction::Short, &levels),
            Some(dec!(200))
        );
        // 200 + 50 is not strictly below 250
        assert_eq!(
            engine.find_next_interesting_level(dec!(250), Direction::Short, &levels),
            Some(dec!(100))
        );
        assert_eq!(
            engine.find_next_interesting_level(dec!(140), Direction::Long, &levels),
            Some(dec!(200))
        );
        assert_eq!(
            engine.find_next_interesting_level(dec!(250), Direction::Long, &levels),
            None
        );
        assert_eq!(
            engine.find_next_interesting_level(dec!(120), Direction::Short, &levels),
            None
        );
    }

    #[test]
    fn test_full_cycle_short_then_target() {
        let mut engine = engine();
        let levels = levels();
        engine.predict(&tick(dec!(20200), 0), &levels).unwrap();
        engine.predict(&tick(dec!(19700), 60), &levels).unwrap();

        let actions = engine.predict(&tick(dec!(18900), 120), &levels).unwrap();
        let TradeAction::Closed(record) = &actions[0] else {
            panic!("expected a close");
        };
        assert_eq!(record.exit_price, dec!(18982.8));
        assert_eq!(
            record.pnl,
            (dec!(19700) - dec!(18982.8)) * (dec!(10000) / dec!(19700))
        );
        assert_eq!(engine.balance(), dec!(10000) + record.pnl);
        // Exit happened outside every area, so nothing is tracked yet
        assert!(engine.tracked_area().is_none());
    }
}
