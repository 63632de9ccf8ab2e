//! Binary search for the interest area containing a price

use rust_decimal::Decimal;

use crate::error::{EngineError, Result};
use crate::types::PriceBand;

pub struct AreaLocator;

impl AreaLocator {
    /// Find the area strictly containing `price`. `areas` must be sorted
    /// ascending by upper bound.
    pub fn locate(areas: &[PriceBand], price: Decimal) -> Result<&PriceBand> {
        Self::locate_index(areas, price)
            .map(|index| &areas[index])
            .ok_or(EngineError::AreaNotFound { price })
    }

    /// Index of the containing area, searching a half-open `[lo, hi)` range
    pub fn locate_index(areas: &[PriceBand], price: Decimal) -> Option<usize> {
        let mut lo = 0;
        let mut hi = areas.len();

        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let band = &areas[mid];

            if band.contains(price) {
                return Some(mid);
            }
            if band.upper < price {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }

        None
    }
}
