//! Error type for the area engine

use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::Direction;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("No interest area contains price {price}")]
    AreaNotFound { price: Decimal },

    #[error("No {direction} target level beyond price {price}")]
    NoTargetLevel { price: Decimal, direction: Direction },

    #[error("Invalid price {0}: must be positive")]
    InvalidPrice(Decimal),

    #[error("Reward {reward} too small for risk {risk}")]
    RiskRewardRejected { reward: Decimal, risk: Decimal },

    #[error("Insufficient balance: {0}")]
    InsufficientBalance(Decimal),

    #[error("Candle timestamp {got} does not follow last history timestamp {last}")]
    NonMonotonicTimestamp { last: i64, got: i64 },

    #[error("Market data source unavailable: {0}")]
    SourceUnavailable(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
