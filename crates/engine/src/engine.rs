//! Observation-by-observation backtesting engine

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info};

use crate::bot::TradingBot;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::types::*;

/// Replays intraday observations against levels built from daily history
pub struct BacktestEngine;

impl BacktestEngine {
    /// Seed a bot with `history`, then feed every observation straight to the
    /// position engine. Levels are built once and not re-aggregated.
    pub fn run(
        config: &EngineConfig,
        history: Vec<Candle>,
        observations: &[Candle],
    ) -> Result<BacktestResult> {
        let mut bot = TradingBot::new(config.clone())?;
        bot.load_history(history)?;

        let initial_balance = config.initial_balance;
        let mut peak_equity = initial_balance;
        let mut max_drawdown = Decimal::ZERO;
        let mut max_drawdown_pct = Decimal::ZERO;
        let mut equity_curve: Vec<EquityPoint> = Vec::with_capacity(observations.len());

        let hundred = dec!(100);

        info!(
            history = bot.collection().series().len(),
            observations = observations.len(),
            areas = bot.collection().levels().interest_areas.len(),
            balance = %initial_balance,
            "Starting backtest"
        );

        for candle in observations {
            if let Err(e) = bot.predict(candle) {
                debug!(time = candle.timestamp, error = %e, "Skipped observation");
                continue;
            }

            let current_equity =
                bot.engine().balance() + bot.engine().unrealized_pnl(candle.close);

            equity_curve.push(EquityPoint {
                time: candle.timestamp,
                equity: current_equity,
            });

            if current_equity > peak_equity {
                peak_equity = current_equity;
            }
            let drawdown = peak_equity - current_equity;
            if drawdown > max_drawdown {
                max_drawdown = drawdown;
                if peak_equity > Decimal::ZERO {
                    max_drawdown_pct = drawdown / peak_equity * hundred;
                }
            }
        }

        // Close any remaining open position at the last observation
        if let Some(last) = observations.last() {
            bot.close_open_position(last.close, last.timestamp);
        }

        let trades = bot.engine().trades().to_vec();
        let final_balance = bot.engine().balance();

        let total_trades = trades.len() as u32;
        let winning_trades = trades.iter().filter(|t| t.pnl > Decimal::ZERO).count() as u32;
        let losing_trades = total_trades - winning_trades;

        let win_rate = if total_trades > 0 {
            Decimal::from(winning_trades) / Decimal::from(total_trades) * hundred
        } else {
            Decimal::ZERO
        };

        let total_pnl = final_balance - initial_balance;
        let total_pnl_pct = total_pnl / initial_balance * hundred;
        let profit_factor = Self::profit_factor(&trades);

        let start_time = observations.first().map(|c| c.timestamp).unwrap_or(0);
        let end_time = observations.last().map(|c| c.timestamp).unwrap_or(0);

        info!(
            total_trades,
            winning_trades,
            win_rate = %win_rate,
            total_pnl = %total_pnl,
            max_drawdown = %max_drawdown,
            "Backtest complete"
        );

        let levels = bot.collection().levels();
        Ok(BacktestResult {
            start_time,
            end_time,
            initial_balance,
            final_balance,
            total_pnl,
            total_pnl_pct,
            total_trades,
            winning_trades,
            losing_trades,
            win_rate,
            max_drawdown,
            max_drawdown_pct,
            profit_factor,
            interest_areas: levels.interest_areas.len(),
            key_levels: levels.key_levels.len(),
            trades,
            equity_curve,
        })
    }

    /// Gross profits over gross losses, capped when nothing was lost
    fn profit_factor(trades: &[TradeRecord]) -> Decimal {
        let gross_profits: Decimal = trades
            .iter()
            .filter(|t| t.pnl > Decimal::ZERO)
            .map(|t| t.pnl)
            .sum();
        let gross_losses: Decimal = trades
            .iter()
            .filter(|t| t.pnl < Decimal::ZERO)
            .map(|t| t.pnl.abs())
            .sum();

        if gross_losses > Decimal::ZERO {
            gross_profits / gross_losses
        } else if gross_profits > Decimal::ZERO {
            dec!(999.99)
        } else {
            Decimal::ZERO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    /// Two blocks of identical wicked candles, around 20000 and 22000
    fn two_block_history() -> Vec<Candle> {
        let block = |start: i64, base: Decimal| {
            (0..5).map(move |i| {
                Candle::new(
                    start + i,
                    base,
                    base + dec!(200),
                    base - dec!(200),
                    base + dec!(10),
                    dec!(1),
                )
            })
        };
        block(1, dec!(20000)).chain(block(6, dec!(22000))).collect()
    }

    fn observe(prices: &[Decimal]) -> Vec<Candle> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &p)| Candle::from_price(p, 1_000 + i as i64 * 60))
            .collect()
    }

    #[test]
    fn test_no_observations() {
        let config = EngineConfig::default();
        let result = BacktestEngine::run(&config, two_block_history(), &[]).unwrap();
        assert_eq!(result.total_trades, 0);
        assert_eq!(result.total_pnl, Decimal::ZERO);
        assert_eq!(result.final_balance, dec!(10000));
        assert_eq!(result.interest_areas, 6);
        assert!(result.equity_curve.is_empty());
    }

    #[test]
    fn test_invalid_config() {
        let config = EngineConfig {
            initial_balance: Decimal::ZERO,
            ..Default::default()
        };
        let err = BacktestEngine::run(&config, Vec::new(), &[]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_take_profit_then_stop_loss() {
        let config = EngineConfig::default();
        let observations = observe(&[
            dec!(19900), // inside the lower areas
            dec!(20300), // long breakout, target 20559.6
            dec!(20600), // take profit
            dec!(21900), // inside the upper areas
            dec!(21500), // short breakout, stop 21672
            dec!(21700), // stop loss
        ]);

        let result = BacktestEngine::run(&config, two_block_history(), &observations).unwrap();

        assert_eq!(result.total_trades, 2);
        assert_eq!(result.winning_trades, 1);
        assert_eq!(result.losing_trades, 1);
        assert_eq!(result.win_rate, dec!(50));

        let (win, loss) = (&result.trades[0], &result.trades[1]);
        assert_eq!(win.direction, Direction::Long);
        assert_eq!(win.exit_reason, ExitReason::TakeProfit);
        assert_eq!(win.exit_price, dec!(20559.6));
        assert_eq!(loss.direction, Direction::Short);
        assert_eq!(loss.exit_reason, ExitReason::StopLoss);
        assert_eq!(loss.exit_price, dec!(21672));
        assert!(loss.pnl < Decimal::ZERO);

        assert_eq!(result.total_pnl, result.final_balance - dec!(10000));
        assert!(result.profit_factor > Decimal::ZERO);
        assert!(result.max_drawdown > Decimal::ZERO);
        assert_eq!(result.equity_curve.len(), 6);
        assert_eq!(result.start_time, 1_000);
        assert_eq!(result.end_time, 1_300);
    }

    #[test]
    fn test_open_position_closed_at_end() {
        let config = EngineConfig::default();
        let observations = observe(&[dec!(19900), dec!(20300), dec!(20400)]);

        let result = BacktestEngine::run(&config, two_block_history(), &observations).unwrap();

        assert_eq!(result.total_trades, 1);
        let trade = &result.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::EndOfData);
        assert_eq!(trade.exit_price, dec!(20400));
        assert!(trade.pnl > Decimal::ZERO);
        assert_eq!(result.profit_factor, dec!(999.99));
    }

    #[test]
    fn test_invalid_observation_skipped() {
        let config = EngineConfig::default();
        let mut observations = observe(&[dec!(19900), dec!(20000)]);
        observations[1].close = Decimal::ZERO;

        let result = BacktestEngine::run(&config, two_block_history(), &observations).unwrap();
        assert_eq!(result.equity_curve.len(), 1);
        assert_eq!(result.total_trades, 0);
    }
}
