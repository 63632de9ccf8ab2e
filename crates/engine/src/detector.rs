//! Provisional area detection over a sliding window of candles
//!
//! Each window of three consecutive candles is tested, in order:
//! 1. Cluster: outer candles share a direction, the middle one opposes them
//!    with the smallest body. The middle candle's range becomes a candidate.
//! 2. Resistance/support (only without a cluster): the window's top shadows
//!    overlap above every body, and/or its bottom shadows overlap below every
//!    body. Both may fire for the same window.

use std::collections::VecDeque;

use rust_decimal::Decimal;

use crate::types::{AreaKind, Candle, PriceBand};

pub const WINDOW: usize = 3;

/// FIFO of the last three candles emitting provisional bands per window
#[derive(Debug, Clone, Default)]
pub struct AreaDetector {
    window: VecDeque<Candle>,
}

impl AreaDetector {
    pub fn new() -> Self {
        Self {
            window: VecDeque::with_capacity(WINDOW),
        }
    }

    /// Run the detector over a whole history
    pub fn scan(history: &[Candle]) -> Vec<PriceBand> {
        let mut detector = Self::new();
        history
            .iter()
            .flat_map(|candle| detector.push(*candle))
            .collect()
    }

    /// Slide the window by one candle and test the new window once it is full
    pub fn push(&mut self, candle: Candle) -> Vec<PriceBand> {
        if self.window.len() == WINDOW {
            self.window.pop_front();
        }
        self.window.push_back(candle);

        if self.window.len() < WINDOW {
            return Vec::new();
        }

        let buffer = [self.window[0], self.window[1], self.window[2]];
        match find_cluster(&buffer) {
            Some(cluster) => vec![cluster],
            None => find_resistance_and_support(&buffer),
        }
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }
}

fn find_cluster(buffer: &[Candle; WINDOW]) -> Option<PriceBand> {
    let bodies = buffer.map(|c| c.signed_body());

    let same_direction = bodies[0] * bodies[2] > Decimal::ZERO;
    let middle_opposes = bodies[0] * bodies[1] < Decimal::ZERO;
    let middle_smallest =
        bodies[1].abs() < bodies[0].abs() && bodies[1].abs() < bodies[2].abs();

    if same_direction && middle_opposes && middle_smallest {
        let middle = buffer[1];
        Some(PriceBand::new(
            middle.high,
            middle.low,
            middle.timestamp,
            AreaKind::Cluster,
        ))
    } else {
        None
    }
}

fn find_resistance_and_support(buffer: &[Candle; WINDOW]) -> Vec<PriceBand> {
    let timestamp = buffer[WINDOW - 1].timestamp;
    let mut found = Vec::new();

    let min_top_shadow = min_of(buffer, |c| c.high);
    let max_body = max_of(buffer, |c| c.body_high());
    if min_top_shadow > max_body {
        found.push(PriceBand::new(
            min_top_shadow,
            max_body,
            timestamp,
            AreaKind::Resistance,
        ));
    }

    let min_bottom_shadow = min_of(buffer, |c| c.low);
    let min_body = min_of(buffer, |c| c.body_low());
    if min_bottom_shadow < min_body {
        found.push(PriceBand::new(
            min_body,
            min_bottom_shadow,
            timestamp,
            AreaKind::Support,
        ));
    }

    found
}

fn min_of(buffer: &[Candle; WINDOW], f: impl Fn(&Candle) -> Decimal) -> Decimal {
    buffer.iter().map(f).min().unwrap_or_default()
}

fn max_of(buffer: &[Candle; WINDOW], f: impl Fn(&Candle) -> Decimal) -> Decimal {
    buffer.iter().map(f).max().unwrap_or_default()
}
