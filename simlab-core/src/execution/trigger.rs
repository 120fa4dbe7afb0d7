//! Trigger checking: does a bar trigger a given order?
//!
//! Evaluates an order's trigger condition against the bar's OHLC range and
//! returns the reference price the fill is computed from. Slippage,
//! commission and liquidity are applied by the simulator afterwards.

use crate::domain::{Bar, Order, OrderStatus, OrderType, Side};

/// Result of checking whether an order triggers on a bar.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerResult {
    NoTrigger,
    /// Fill fully under market rules from `reference_price`.
    Market {
        reference_price: f64,
        gap_through: bool,
    },
    /// Fill at exactly `price`, subject to the liquidity cap.
    Limit { price: f64 },
}

/// Check whether an order triggers on a given bar.
///
/// Does NOT check eligibility; the caller skips orders that are not yet
/// eligible on this step.
pub fn check_trigger(order: &Order, bar: &Bar) -> TriggerResult {
    if bar.is_void() {
        return TriggerResult::NoTrigger;
    }
    // A stop that already converted fills at the close like any market order.
    if order.status == OrderStatus::Triggered {
        return TriggerResult::Market {
            reference_price: bar.close,
            gap_through: false,
        };
    }

    match &order.order_type {
        OrderType::Market => TriggerResult::Market {
            reference_price: bar.close,
            gap_through: false,
        },
        OrderType::Limit { limit_price } => check_limit(order.side, *limit_price, bar),
        OrderType::Stop { stop_price } | OrderType::TrailingStop { stop_price, .. } => {
            check_stop(order.side, *stop_price, bar)
        }
    }
}

/// Sell stop: triggers if `low <= stop`; gap-through if `open <= stop`.
/// Buy stop: triggers if `high >= stop`; gap-through if `open >= stop`.
/// A gapped stop references the open, otherwise the stop itself.
fn check_stop(side: Side, stop: f64, bar: &Bar) -> TriggerResult {
    let (triggered, gap_through) = match side {
        Side::Sell => (bar.low <= stop, bar.open <= stop),
        Side::Buy => (bar.high >= stop, bar.open >= stop),
    };
    if !triggered {
        return TriggerResult::NoTrigger;
    }
    TriggerResult::Market {
        reference_price: if gap_through { bar.open } else { stop },
        gap_through,
    }
}

/// Buy limit fills when `low <= limit`; sell limit when `high >= limit`.
/// The price is exactly the limit, even if the bar opened through it.
fn check_limit(side: Side, limit: f64, bar: &Bar) -> TriggerResult {
    let crossed = match side {
        Side::Buy => bar.low <= limit,
        Side::Sell => bar.high >= limit,
    };
    if crossed {
        TriggerResult::Limit { price: limit }
    } else {
        TriggerResult::NoTrigger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderId, OrderRole, TimeInForce};
    use chrono::{TimeZone, Utc};

    fn bar(open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            symbol: "SPY".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            open,
            high,
            low,
            close,
            volume: 1_000_000.0,
        }
    }

    fn order(side: Side, order_type: OrderType) -> Order {
        Order {
            id: OrderId(1),
            symbol: "SPY".into(),
            side,
            order_type,
            role: OrderRole::Standalone,
            quantity: 100.0,
            filled_quantity: 0.0,
            avg_fill_price: 0.0,
            time_in_force: TimeInForce::Gtc,
            status: OrderStatus::Pending,
            created_step: 0,
            eligible_step: 0,
            expires_after: None,
            parent_id: None,
            group_id: None,
        }
    }

    // ── Market ──

    #[test]
    fn market_references_close() {
        let result = check_trigger(&order(Side::Buy, OrderType::Market), &bar(100.0, 105.0, 95.0, 102.0));
        assert_eq!(
            result,
            TriggerResult::Market {
                reference_price: 102.0,
                gap_through: false
            }
        );
    }

    // ── Stops ──

    #[test]
    fn sell_stop_triggers_inside_range() {
        let o = order(Side::Sell, OrderType::Stop { stop_price: 98.0 });
        let result = check_trigger(&o, &bar(100.0, 101.0, 97.0, 99.0));
        assert_eq!(
            result,
            TriggerResult::Market {
                reference_price: 98.0,
                gap_through: false
            }
        );
    }

    #[test]
    fn sell_stop_gap_down_references_open() {
        let o = order(Side::Sell, OrderType::Stop { stop_price: 98.0 });
        let result = check_trigger(&o, &bar(95.0, 96.0, 94.0, 95.5));
        assert_eq!(
            result,
            TriggerResult::Market {
                reference_price: 95.0,
                gap_through: true
            }
        );
    }

    #[test]
    fn buy_stop_gap_up_references_open() {
        let o = order(Side::Buy, OrderType::Stop { stop_price: 102.0 });
        let result = check_trigger(&o, &bar(104.0, 106.0, 103.0, 105.0));
        assert_eq!(
            result,
            TriggerResult::Market {
                reference_price: 104.0,
                gap_through: true
            }
        );
    }

    #[test]
    fn stop_not_reached() {
        let o = order(Side::Buy, OrderType::Stop { stop_price: 110.0 });
        assert_eq!(check_trigger(&o, &bar(100.0, 105.0, 95.0, 102.0)), TriggerResult::NoTrigger);
    }

    // ── Limits ──

    #[test]
    fn buy_limit_fills_at_limit_when_crossed() {
        let o = order(Side::Buy, OrderType::Limit { limit_price: 95.0 });
        assert_eq!(
            check_trigger(&o, &bar(93.0, 94.0, 90.0, 92.0)),
            TriggerResult::Limit { price: 95.0 }
        );
    }

    #[test]
    fn buy_limit_untouched_above() {
        let o = order(Side::Buy, OrderType::Limit { limit_price: 95.0 });
        assert_eq!(check_trigger(&o, &bar(97.0, 98.0, 96.0, 97.0)), TriggerResult::NoTrigger);
    }

    #[test]
    fn sell_limit_fills_when_high_reaches() {
        let o = order(Side::Sell, OrderType::Limit { limit_price: 104.0 });
        assert_eq!(
            check_trigger(&o, &bar(100.0, 105.0, 99.0, 101.0)),
            TriggerResult::Limit { price: 104.0 }
        );
    }

    #[test]
    fn void_bar_never_triggers() {
        let o = order(Side::Buy, OrderType::Market);
        assert_eq!(check_trigger(&o, &bar(f64::NAN, 1.0, 1.0, 1.0)), TriggerResult::NoTrigger);
    }
}
