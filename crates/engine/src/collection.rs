//! Candle history together with the areas and key levels derived from it

use serde::Serialize;
use tracing::info;

use crate::config::AreaConfig;
use crate::detector::AreaDetector;
use crate::error::Result;
use crate::levels::{KeyLevelBuilder, LevelMap};
use crate::series::PriceSeries;
use crate::types::Candle;

/// History plus its derived interest areas and key levels.
///
/// Levels are rebuilt from scratch on every [`Collection::rebuild`], never
/// appended to.
#[derive(Debug, Clone, Serialize)]
pub struct Collection {
    series: PriceSeries,
    levels: LevelMap,
    #[serde(skip)]
    config: AreaConfig,
}

impl Collection {
    pub fn new(config: AreaConfig) -> Self {
        Self {
            series: PriceSeries::new(),
            levels: LevelMap::default(),
            config,
        }
    }

    /// Append a batch of historical candles and rebuild the levels
    pub fn load_history(&mut self, candles: Vec<Candle>) -> Result<usize> {
        let outcome = self.series.extend(candles);
        self.rebuild();
        let added = outcome?;
        info!(added, total = self.series.len(), "Loaded history");
        Ok(added)
    }

    /// Append a single candle without rebuilding
    pub fn push(&mut self, candle: Candle) -> Result<()> {
        self.series.push(candle)
    }

    /// Replace the interest areas and key levels with a fresh build
    pub fn rebuild(&mut self) {
        let candidates = AreaDetector::scan(self.series.history());
        let builder = KeyLevelBuilder::new(self.config.clone());
        self.levels = builder.build(&candidates, self.series.top(), self.series.bottom());

        info!(
            history = self.series.len(),
            candidates = candidates.len(),
            areas = self.levels.interest_areas.len(),
            key_levels = self.levels.key_levels.len(),
            "Rebuilt interest areas and key levels"
        );
    }

    pub fn series(&self) -> &PriceSeries {
        &self.series
    }

    pub fn levels(&self) -> &LevelMap {
        &self.levels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::test_support::wicked_history;

    #[test]
    fn test_load_history_builds_levels() {
        let mut collection = Collection::new(AreaConfig::default());
        let added = collection.load_history(wicked_history(30)).unwrap();

        assert_eq!(added, 30);
        assert_eq!(collection.series().len(), 30);
        assert!(!collection.levels().interest_areas.is_empty());
        // One mid level per area plus five retracements
        assert_eq!(
            collection.levels().key_levels.len(),
            collection.levels().interest_areas.len() + 5
        );
    }

    #[test]
    fn test_rebuild_replaces_instead_of_accumulating() {
        let mut collection = Collection::new(AreaConfig::default());
        collection.load_history(wicked_history(30)).unwrap();
        let first = collection.levels().clone();

        collection.rebuild();
        collection.rebuild();

        assert_eq!(first.interest_areas, collection.levels().interest_areas);
        assert_eq!(first.key_levels, collection.levels().key_levels);
    }

    #[test]
    fn test_load_history_keeps_prefix_on_bad_candle() {
        let mut collection = Collection::new(AreaConfig::default());
        let mut history = wicked_history(10);
        history.push(history[3]);

        let err = collection.load_history(history).unwrap_err();
        assert!(matches!(err, EngineError::NonMonotonicTimestamp { .. }));
        assert_eq!(collection.series().len(), 10);
        assert!(!collection.levels().is_empty());
    }
}
