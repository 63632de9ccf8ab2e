//! Fixtures shared by unit tests

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::types::Candle;

/// Daily candles stepping between 20000 and 20400 with 400-point wicks on
/// both sides, so most windows yield a resistance and a support band
pub(crate) fn wicked_history(days: i64) -> Vec<Candle> {
    (0..days)
        .map(|day| {
            let base = Decimal::from(20000 + (day % 5) * 100);
            Candle::new(
                day * 86_400,
                base,
                base + dec!(400),
                base - dec!(400),
                base + dec!(40),
                dec!(10),
            )
        })
        .collect()
}
