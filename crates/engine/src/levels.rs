//! Interest areas and key levels built from provisional candidates
//!
//! The scan walks the candidates with a variable step. A tall enough candidate
//! is an area on its own; a short one is merged with whichever neighbour is
//! closer, provided the gap is plausible (`min_range < gap <= max_range`).
//! Fibonacci retracements between the global extremes complete the key levels.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use tracing::debug;

use crate::config::AreaConfig;
use crate::types::{AreaKind, Candle, PriceBand};

/// Retracement ratios: 23.6%, 38.2%, 50%, 61.8%, 78.6%
pub const FIBONACCI_RATIOS: [Decimal; 5] = [
    dec!(0.236),
    dec!(0.382),
    dec!(0.500),
    dec!(0.618),
    dec!(0.786),
];

/// Final areas and key levels, both sorted ascending
#[derive(Debug, Clone, Default, Serialize)]
pub struct LevelMap {
    /// Sorted by upper bound
    pub interest_areas: Vec<PriceBand>,
    pub key_levels: Vec<Decimal>,
}

impl LevelMap {
    pub fn is_empty(&self) -> bool {
        self.interest_areas.is_empty() && self.key_levels.is_empty()
    }
}

/// Outcome of examining one candidate during the scan
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MergeStep {
    /// Candidate is tall enough to stand alone
    Accept(PriceBand),
    /// Candidate merged with the previous one
    MergePrevious(PriceBand),
    /// Candidate merged with the next one
    MergeNext(PriceBand),
    /// Candidate unusable
    Skip,
}

impl MergeStep {
    /// How far the scan index moves after this step
    pub fn advance(&self) -> usize {
        match self {
            MergeStep::Accept(_) | MergeStep::MergePrevious(_) => 2,
            MergeStep::MergeNext(_) => 3,
            MergeStep::Skip => 1,
        }
    }

    pub fn area(&self) -> Option<PriceBand> {
        match self {
            MergeStep::Accept(band)
            | MergeStep::MergePrevious(band)
            | MergeStep::MergeNext(band) => Some(*band),
            MergeStep::Skip => None,
        }
    }
}

pub struct KeyLevelBuilder {
    config: AreaConfig,
}

impl KeyLevelBuilder {
    pub fn new(config: AreaConfig) -> Self {
        Self { config }
    }

    /// Build a fresh level map from the provisional candidates and the global
    /// extreme candles
    pub fn build(
        &self,
        candidates: &[PriceBand],
        top: Option<&Candle>,
        bottom: Option<&Candle>,
    ) -> LevelMap {
        let mut map = LevelMap::default();

        let mut i = 1;
        while i + 1 < candidates.len() {
            let step = self.merge_step(candidates, i);
            if let Some(area) = step.area() {
                map.key_levels.push(candidates[i].mid());
                map.interest_areas.push(area);
            }
            i += step.advance();
        }

        if let (Some(top), Some(bottom)) = (top, bottom) {
            map.key_levels.extend(fibonacci_levels(top, bottom));
        }

        map.key_levels.sort();
        map.interest_areas.sort_by(|a, b| a.upper.cmp(&b.upper));

        debug!(
            candidates = candidates.len(),
            areas = map.interest_areas.len(),
            key_levels = map.key_levels.len(),
            "Built key levels"
        );

        map
    }

    /// Decide what to do with `candidates[i]`; requires `0 < i < len - 1`
    pub(crate) fn merge_step(&self, candidates: &[PriceBand], i: usize) -> MergeStep {
        let candle = candidates[i];
        let prev = candidates[i - 1];
        let next = candidates[i + 1];

        if candle.height() >= self.config.min_range {
            return MergeStep::Accept(candle);
        }

        let mid = candle.mid();
        let diff_prev = (mid - prev.upper).abs();
        let diff_next = (mid - next.lower).abs();

        if diff_prev < diff_next && self.mergeable(diff_prev) {
            return MergeStep::MergePrevious(PriceBand::new(
                candle.lower,
                prev.upper,
                candle.timestamp,
                AreaKind::Merged,
            ));
        }

        if self.mergeable(diff_next) {
            return MergeStep::MergeNext(PriceBand::new(
                candle.upper,
                next.lower,
                candle.timestamp,
                AreaKind::Merged,
            ));
        }

        MergeStep::Skip
    }

    fn mergeable(&self, gap: Decimal) -> bool {
        gap > self.config.min_range && gap <= self.config.max_range
    }
}

/// Five retracement levels anchored at the top candle's low and spanning to
/// the bottom candle's high
pub fn fibonacci_levels(top: &Candle, bottom: &Candle) -> [Decimal; 5] {
    let distance = bottom.high - top.low;
    FIBONACCI_RATIOS.map(|ratio| top.low + distance * ratio)
}
