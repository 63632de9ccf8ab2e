//! Types shared across the area engine

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single candlestick (OHLCV), timestamp in Unix seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    pub fn new(
        timestamp: i64,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Zero-volume candle wrapping a single observed price
    pub fn from_price(price: Decimal, timestamp: i64) -> Self {
        Self::new(timestamp, price, price, price, price, Decimal::ZERO)
    }

    /// Body with sign: positive for a green candle, negative for a red one
    pub fn signed_body(&self) -> Decimal {
        self.close - self.open
    }

    /// Top of the body
    pub fn body_high(&self) -> Decimal {
        self.open.max(self.close)
    }

    /// Bottom of the body
    pub fn body_low(&self) -> Decimal {
        self.open.min(self.close)
    }
}

/// How a price band was discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AreaKind {
    Resistance,
    Support,
    Cluster,
    Merged,
}

/// A price range acting as support or resistance.
///
/// Bounds are normalized on construction so `upper >= lower` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBand {
    pub upper: Decimal,
    pub lower: Decimal,
    pub timestamp: i64,
    pub kind: AreaKind,
}

impl PriceBand {
    pub fn new(a: Decimal, b: Decimal, timestamp: i64, kind: AreaKind) -> Self {
        Self {
            upper: a.max(b),
            lower: a.min(b),
            timestamp,
            kind,
        }
    }

    /// True when `price` lies strictly inside the band
    pub fn contains(&self, price: Decimal) -> bool {
        self.lower < price && price < self.upper
    }

    pub fn height(&self) -> Decimal {
        self.upper - self.lower
    }

    pub fn mid(&self) -> Decimal {
        ((self.upper + self.lower) / Decimal::TWO).abs()
    }
}

/// Side of a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for long, -1 for short
    pub fn sign(&self) -> Decimal {
        match self {
            Direction::Long => Decimal::ONE,
            Direction::Short => Decimal::NEGATIVE_ONE,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Financial fields of an open position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub units: Decimal,
    pub opened_at: i64,
}

/// Position state of the trading state machine
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum Position {
    #[default]
    Neutral,
    Long(OpenPosition),
    Short(OpenPosition),
}

impl Position {
    pub fn open(direction: Direction, details: OpenPosition) -> Self {
        match direction {
            Direction::Long => Position::Long(details),
            Direction::Short => Position::Short(details),
        }
    }

    pub fn is_neutral(&self) -> bool {
        matches!(self, Position::Neutral)
    }

    pub fn direction(&self) -> Option<Direction> {
        match self {
            Position::Neutral => None,
            Position::Long(_) => Some(Direction::Long),
            Position::Short(_) => Some(Direction::Short),
        }
    }

    pub fn details(&self) -> Option<&OpenPosition> {
        match self {
            Position::Neutral => None,
            Position::Long(details) | Position::Short(details) => Some(details),
        }
    }
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    EndOfData,
}

/// A closed position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub direction: Direction,
    pub entry_time: i64,
    pub exit_time: i64,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub units: Decimal,
    pub pnl: Decimal,
    pub exit_reason: ExitReason,
}

/// What the position engine did with an observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum TradeAction {
    Opened {
        direction: Direction,
        entry_price: Decimal,
        stop_loss: Decimal,
        take_profit: Decimal,
        units: Decimal,
    },
    Closed(TradeRecord),
}

/// A point on the equity curve
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityPoint {
    pub time: i64,
    pub equity: Decimal,
}

/// Result of a backtest run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub start_time: i64,
    pub end_time: i64,
    pub initial_balance: Decimal,
    pub final_balance: Decimal,
    pub total_pnl: Decimal,
    pub total_pnl_pct: Decimal,
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub win_rate: Decimal,
    pub max_drawdown: Decimal,
    pub max_drawdown_pct: Decimal,
    pub profit_factor: Decimal,
    pub interest_areas: usize,
    pub key_levels: usize,
    pub trades: Vec<TradeRecord>,
    pub equity_curve: Vec<EquityPoint>,
}
