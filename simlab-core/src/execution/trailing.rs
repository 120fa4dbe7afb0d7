//! Trailing stop ratchet: stops may tighten, never loosen.
//!
//! A sell trailing stop (protecting a long) follows the highest high; a buy
//! trailing stop (protecting a short) follows the lowest low.

use crate::domain::{Bar, OrderType, Side};

/// Advance a trailing stop's extreme from `bar` and ratchet its stop level.
///
/// Returns `true` if the stop moved. Non-trailing order types are untouched.
pub fn ratchet(order_type: &mut OrderType, side: Side, bar: &Bar) -> bool {
    let OrderType::TrailingStop {
        trail,
        extreme_price,
        stop_price,
    } = order_type
    else {
        return false;
    };

    let new_extreme = match side {
        Side::Sell => extreme_price.max(bar.high),
        Side::Buy => extreme_price.min(bar.low),
    };
    *extreme_price = new_extreme;

    let proposed = trail.stop_from(new_extreme, side);
    let tightened = match side {
        Side::Sell => proposed.max(*stop_price),
        Side::Buy => proposed.min(*stop_price),
    };
    let moved = tightened != *stop_price;
    *stop_price = tightened;
    moved
}
