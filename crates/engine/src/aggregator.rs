//! Rolls intraday ticks into a running daily candle
//!
//! When a tick arrives a full day after the running candle started, the
//! finished candle is appended to the history and the levels are rebuilt. The
//! first candle only covers part of its day and is discarded.

use serde::Serialize;
use tracing::{info, warn};

use crate::collection::Collection;
use crate::types::Candle;

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Start of the UTC day containing `timestamp`
pub fn day_start(timestamp: i64) -> i64 {
    timestamp - timestamp.rem_euclid(SECONDS_PER_DAY)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DailyAggregator {
    current: Option<Candle>,
    /// The running candle is the partial first day
    partial: bool,
}

impl DailyAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one tick into the running day. Returns true when a finished day
    /// was appended and the collection rebuilt.
    pub fn on_tick(&mut self, tick: &Candle, collection: &mut Collection) -> bool {
        let Some(mut running) = self.current else {
            self.current = Some(Self::open_day(tick));
            self.partial = true;
            return false;
        };

        if tick.timestamp - running.timestamp < SECONDS_PER_DAY {
            running.high = running.high.max(tick.high);
            running.low = running.low.min(tick.low);
            running.close = tick.close;
            running.volume += tick.volume;
            self.current = Some(running);
            return false;
        }

        let skip = self.partial;
        self.current = Some(Self::open_day(tick));
        self.partial = false;

        if skip {
            info!(day = running.timestamp, "Discarded partial first day");
            return false;
        }

        if let Err(e) = collection.push(running) {
            warn!(day = running.timestamp, error = %e, "Daily candle not appended");
            return false;
        }

        info!(
            day = running.timestamp,
            open = %running.open,
            high = %running.high,
            low = %running.low,
            close = %running.close,
            "Daily rollover"
        );
        collection.rebuild();
        true
    }

    /// The day currently being built
    pub fn current(&self) -> Option<&Candle> {
        self.current.as_ref()
    }

    fn open_day(tick: &Candle) -> Candle {
        Candle::new(
            day_start(tick.timestamp),
            tick.open,
            tick.high,
            tick.low,
            tick.close,
            tick.volume,
        )
    }
}
