//! Tunable parameters for area detection and trading

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Parameters for area detection and merging
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AreaConfig {
    /// A provisional band at least this tall is an area on its own
    pub min_range: Decimal,
    /// Neighbours further apart than this are never merged
    pub max_range: Decimal,
}

impl Default for AreaConfig {
    fn default() -> Self {
        Self {
            min_range: dec!(50),
            max_range: dec!(1500),
        }
    }
}

/// Parameters for entries, stops and targets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    /// Minimum distance from the tracked area before a breakout is traded
    pub min_difference: Decimal,
    /// Margin a key level must clear to become a target
    pub level_delta: Decimal,
    /// Target is pulled back toward price by this fraction of `min_difference`
    pub target_buffer_ratio: Decimal,
    /// Stop sits this many `min_difference`s away from price
    pub stop_buffer_multiple: Decimal,
    /// Largest fraction by which the reward distance may fall short of the stop distance
    pub max_reward_shortfall: Decimal,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            min_difference: dec!(172),
            level_delta: dec!(50),
            target_buffer_ratio: dec!(0.1),
            stop_buffer_multiple: dec!(1.0),
            max_reward_shortfall: dec!(0.5),
        }
    }
}

/// Full engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub initial_balance: Decimal,
    pub areas: AreaConfig,
    pub trading: TradingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_balance: dec!(10000),
            areas: AreaConfig::default(),
            trading: TradingConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.initial_balance <= Decimal::ZERO {
            return Err(EngineError::InvalidConfiguration(
                "initial balance must be positive".into(),
            ));
        }
        self.areas.validate()?;
        self.trading.validate()
    }
}

impl AreaConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_range <= Decimal::ZERO {
            return Err(EngineError::InvalidConfiguration(
                "min_range must be positive".into(),
            ));
        }
        if self.max_range <= self.min_range {
            return Err(EngineError::InvalidConfiguration(format!(
                "max_range ({}) must exceed min_range ({})",
                self.max_range, self.min_range
            )));
        }
        Ok(())
    }
}

impl TradingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_difference <= Decimal::ZERO {
            return Err(EngineError::InvalidConfiguration(
                "min_difference must be positive".into(),
            ));
        }
        let non_negative = [
            ("level_delta", self.level_delta),
            ("target_buffer_ratio", self.target_buffer_ratio),
            ("stop_buffer_multiple", self.stop_buffer_multiple),
            ("max_reward_shortfall", self.max_reward_shortfall),
        ];
        for (name, value) in non_negative {
            if value < Decimal::ZERO {
                return Err(EngineError::InvalidConfiguration(format!(
                    "{} must not be negative",
                    name
                )));
            }
        }
        if self.stop_buffer_multiple.is_zero() {
            return Err(EngineError::InvalidConfiguration(
                "stop_buffer_multiple must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_non_positive_balance_rejected() {
        let config = EngineConfig {
            initial_balance: Decimal::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EngineError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_max_range_must_exceed_min_range() {
        let config = EngineConfig {
            areas: AreaConfig {
                max_range: dec!(40),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_positive_min_range_rejected() {
        let areas = AreaConfig {
            min_range: Decimal::ZERO,
            ..Default::default()
        };
        assert!(areas.validate().is_err());
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"trading": {"min_difference": "300"}}"#).unwrap();
        assert_eq!(config.trading.min_difference, dec!(300));
        assert_eq!(config.trading.level_delta, dec!(50));
        assert_eq!(config.initial_balance, dec!(10000));
        assert_eq!(config.areas.max_range, dec!(1500));
    }
}
