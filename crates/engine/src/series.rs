//! Append-only candle history with running extremes

use serde::Serialize;

use crate::error::{EngineError, Result};
use crate::types::Candle;

/// Ordered candle store tracking the global max-high and min-low candles
#[derive(Debug, Clone, Default, Serialize)]
pub struct PriceSeries {
    history: Vec<Candle>,
    top: Option<Candle>,
    bottom: Option<Candle>,
}

impl PriceSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a candle; timestamps must be strictly increasing
    pub fn push(&mut self, candle: Candle) -> Result<()> {
        if let Some(last) = self.history.last() {
            if candle.timestamp <= last.timestamp {
                return Err(EngineError::NonMonotonicTimestamp {
                    last: last.timestamp,
                    got: candle.timestamp,
                });
            }
        }

        if self.top.map_or(true, |top| candle.high > top.high) {
            self.top = Some(candle);
        }
        if self.bottom.map_or(true, |bottom| candle.low < bottom.low) {
            self.bottom = Some(candle);
        }

        self.history.push(candle);
        Ok(())
    }

    /// Append a batch; stops at the first out-of-order candle, keeping what was
    /// appended before it
    pub fn extend<I>(&mut self, candles: I) -> Result<usize>
    where
        I: IntoIterator<Item = Candle>,
    {
        let mut added = 0;
        for candle in candles {
            self.push(candle)?;
            added += 1;
        }
        Ok(added)
    }

    pub fn history(&self) -> &[Candle] {
        &self.history
    }

    pub fn top(&self) -> Option<&Candle> {
        self.top.as_ref()
    }

    pub fn bottom(&self) -> Option<&Candle> {
        self.bottom.as_ref()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.history.last()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(ts: i64, high: i64, low: i64) -> Candle {
        Candle::new(ts, dec!(100), high.into(), low.into(), dec!(100), dec!(1))
    }

    #[test]
    fn test_tracks_extremes() {
        let mut series = PriceSeries::new();
        series.push(candle(1, 120, 90)).unwrap();
        series.push(candle(2, 150, 95)).unwrap();
        series.push(candle(3, 130, 80)).unwrap();

        assert_eq!(series.len(), 3);
        assert_eq!(series.top().unwrap().timestamp, 2);
        assert_eq!(series.bottom().unwrap().timestamp, 3);
    }

    #[test]
    fn test_equal_extreme_keeps_first() {
        let mut series = PriceSeries::new();
        series.push(candle(1, 120, 90)).unwrap();
        series.push(candle(2, 120, 90)).unwrap();
        assert_eq!(series.top().unwrap().timestamp, 1);
        assert_eq!(series.bottom().unwrap().timestamp, 1);
    }

    #[test]
    fn test_rejects_non_increasing_timestamp() {
        let mut series = PriceSeries::new();
        series.push(candle(10, 120, 90)).unwrap();
        let err = series.push(candle(10, 130, 80)).unwrap_err();
        assert_eq!(err, EngineError::NonMonotonicTimestamp { last: 10, got: 10 });
        assert_eq!(series.len(), 1);
        assert_eq!(series.top().unwrap().high, dec!(120));
    }

    #[test]
    fn test_extend_stops_at_first_bad_candle() {
        let mut series = PriceSeries::new();
        let result = series.extend(vec![candle(1, 1, 1), candle(2, 1, 1), candle(2, 1, 1)]);
        assert!(result.is_err());
        assert_eq!(series.len(), 2);
        assert!(series.last().is_some());
        assert!(!series.is_empty());
    }
}
