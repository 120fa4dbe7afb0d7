//! Order book state machine: order lifecycle, OCO groups, brackets and algo
//! parent/child links.
//!
//! The order book is the registry for every order the simulator ever saw.
//! It manages:
//! - Order storage and lookup (terminal orders are kept for audit)
//! - State transitions (Pending → Triggered → Filled / Cancelled / Expired)
//! - OCO enforcement (a fill on one member cancels its siblings)
//! - Bracket activation (children activate only after the entry fills)
//! - Algo parents (aggregate child fills, cancel children with the parent)
//! - Audit trail for every state transition
//!
//! Linked orders never hold references to each other; the book keeps the
//! group → members and parent → children indexes.
//!
//! The order book does NOT compute fill prices; that is the simulator's job.

use crate::domain::{GroupId, Order, OrderAuditEntry, OrderId, OrderRole, OrderStatus, OrderType};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors from order book operations.
#[derive(Debug, Error, PartialEq)]
pub enum OrderBookError {
    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("order {0} is not active (status: {1})")]
    OrderNotActive(OrderId, String),

    #[error("invalid transition for order {0}: {1} → {2}")]
    InvalidTransition(OrderId, String, String),
}

#[derive(Debug, Default)]
pub struct OrderBook {
    orders: BTreeMap<OrderId, Order>,

    /// Bracket children waiting for their entry to fill, keyed by entry id.
    dormant: BTreeMap<OrderId, Vec<Order>>,

    /// OCO groups: group id → member ids.
    groups: BTreeMap<GroupId, Vec<OrderId>>,

    /// Algo parents: parent id → child ids in creation order.
    children: BTreeMap<OrderId, Vec<OrderId>>,

    audit_trail: Vec<OrderAuditEntry>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Submission ─────────────────────────────────────────────────────

    /// Place an accepted order. It must have status Pending.
    pub fn submit(&mut self, order: Order, step: usize) {
        debug_assert!(order.status == OrderStatus::Pending, "submitted order must be Pending");
        self.record_audit(order.id, None, OrderStatus::Pending, step, "accepted");
        if let Some(group_id) = order.group_id {
            self.groups.entry(group_id).or_default().push(order.id);
        }
        if order.role == OrderRole::AlgoChild {
            if let Some(parent_id) = order.parent_id {
                self.children.entry(parent_id).or_default().push(order.id);
            }
        }
        self.orders.insert(order.id, order);
    }

    /// Register an order that was refused before reaching the market.
    pub fn reject(&mut self, mut order: Order, step: usize, reason: &str) {
        let status = OrderStatus::Rejected {
            reason: reason.to_string(),
        };
        order.status = status.clone();
        self.record_audit(order.id, None, status, step, reason);
        self.orders.insert(order.id, order);
    }

    /// Submit two OCO legs sharing `group_id`.
    pub fn submit_oco(&mut self, mut first: Order, mut second: Order, group_id: GroupId, step: usize) {
        first.group_id = Some(group_id);
        second.group_id = Some(group_id);
        self.submit(first, step);
        self.submit(second, step);
    }

    /// Submit a bracket: the entry is placed now, the protective children are
    /// held dormant until the entry is completely filled.
    pub fn submit_bracket(
        &mut self,
        entry: Order,
        take_profit: Order,
        stop_loss: Order,
        step: usize,
    ) {
        let entry_id = entry.id;
        self.submit(entry, step);
        self.dormant.insert(entry_id, vec![take_profit, stop_loss]);
    }

    // ── Transitions ────────────────────────────────────────────────────

    /// Record a fill on an order, updating filled quantity and average price
    /// and transitioning to Filled once complete.
    ///
    /// Any fill on an OCO member cancels its siblings. A completed bracket
    /// entry activates its children; a fill on an algo child rolls up into the
    /// parent's filled quantity.
    ///
    /// Returns `Ok(true)` if the order is now completely filled.
    pub fn record_fill(
        &mut self,
        order_id: OrderId,
        fill_qty: f64,
        fill_price: f64,
        step: usize,
    ) -> Result<bool, OrderBookError> {
        let order = self.active_mut(order_id)?;

        let prev_notional = order.avg_fill_price * order.filled_quantity;
        order.filled_quantity += fill_qty;
        order.avg_fill_price = (prev_notional + fill_price * fill_qty) / order.filled_quantity;

        let fully_filled = order.filled_quantity >= order.quantity - 1e-9;
        let role = order.role;
        let parent_id = order.parent_id;
        if fully_filled {
            let from = order.status.clone();
            order.status = OrderStatus::Filled;
            self.record_audit(order_id, Some(from), OrderStatus::Filled, step, "filled");
        } else {
            self.record_audit(
                order_id,
                Some(OrderStatus::Pending),
                OrderStatus::Pending,
                step,
                "partially filled",
            );
        }

        self.cancel_oco_siblings(order_id, step);

        if fully_filled {
            self.activate_bracket_children(order_id, step);
        }

        if role == OrderRole::AlgoChild {
            if let Some(parent) = parent_id.and_then(|id| self.orders.get_mut(&id)) {
                let prev = parent.avg_fill_price * parent.filled_quantity;
                parent.filled_quantity += fill_qty;
                parent.avg_fill_price = (prev + fill_price * fill_qty) / parent.filled_quantity;
            }
        }

        Ok(fully_filled)
    }

    /// Trigger a stop-type order: Pending → Triggered.
    pub fn trigger(&mut self, order_id: OrderId, step: usize) -> Result<(), OrderBookError> {
        let order = self
            .orders
            .get_mut(&order_id)
            .ok_or(OrderBookError::OrderNotFound(order_id))?;

        if order.status != OrderStatus::Pending {
            return Err(OrderBookError::InvalidTransition(
                order_id,
                format!("{:?}", order.status),
                "Triggered".into(),
            ));
        }
        debug_assert!(
            order.order_type.stop_price().is_some(),
            "only stop-type orders can be triggered"
        );

        order.status = OrderStatus::Triggered;
        self.record_audit(
            order_id,
            Some(OrderStatus::Pending),
            OrderStatus::Triggered,
            step,
            "triggered",
        );
        Ok(())
    }

    /// Cancel an order with a reason.
    ///
    /// Cancelling a bracket entry also cancels its dormant children;
    /// cancelling an algo parent cancels all of its unfilled children.
    pub fn cancel(&mut self, order_id: OrderId, step: usize, reason: &str) -> Result<(), OrderBookError> {
        let order = self.active_mut(order_id)?;
        let from = order.status.clone();
        let status = OrderStatus::Cancelled {
            reason: reason.to_string(),
        };
        order.status = status.clone();
        self.record_audit(order_id, Some(from), status, step, reason);

        self.cancel_dormant_children(order_id, step, "bracket entry cancelled");

        let active_children: Vec<OrderId> = self
            .children_of(order_id)
            .iter()
            .copied()
            .filter(|id| self.orders.get(id).is_some_and(Order::is_active))
            .collect();
        for child_id in active_children {
            self.cancel(child_id, step, "parent cancelled")?;
        }

        Ok(())
    }

    /// Expire an order whose time-in-force ran out. An expiring bracket entry
    /// takes its dormant children with it.
    pub fn expire(&mut self, order_id: OrderId, step: usize) -> Result<(), OrderBookError> {
        let order = self.active_mut(order_id)?;
        let from = order.status.clone();
        order.status = OrderStatus::Expired;
        self.record_audit(order_id, Some(from), OrderStatus::Expired, step, "expired");
        self.cancel_dormant_children(order_id, step, "bracket entry expired");
        Ok(())
    }

    /// Close out an algo parent: Filled if its children delivered the full
    /// quantity, Expired otherwise.
    pub fn settle_parent(&mut self, parent_id: OrderId, step: usize) -> Result<OrderStatus, OrderBookError> {
        let order = self.active_mut(parent_id)?;
        let from = order.status.clone();
        let (status, reason) = if order.filled_quantity >= order.quantity - 1e-9 {
            (OrderStatus::Filled, "children filled")
        } else {
            (OrderStatus::Expired, "schedule exhausted")
        };
        order.status = status.clone();
        self.record_audit(parent_id, Some(from), status.clone(), step, reason);
        Ok(status)
    }

    /// Replace the order type of an active order (trailing stop ratchet).
    pub fn order_type_mut(&mut self, order_id: OrderId) -> Option<&mut OrderType> {
        self.orders
            .get_mut(&order_id)
            .filter(|o| o.is_active())
            .map(|o| &mut o.order_type)
    }

    // ── Queries ────────────────────────────────────────────────────────

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    /// All placed orders in id order (dormant bracket children excluded).
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    /// Active orders (Pending or Triggered) in id order.
    pub fn active_orders(&self) -> Vec<&Order> {
        self.orders.values().filter(|o| o.is_active()).collect()
    }

    pub fn active_orders_for_symbol(&self, symbol: &str) -> Vec<&Order> {
        self.orders
            .values()
            .filter(|o| o.is_active() && o.symbol == symbol)
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.orders.values().filter(|o| o.is_active()).count()
    }

    pub fn group_members(&self, group_id: GroupId) -> &[OrderId] {
        self.groups.get(&group_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn children_of(&self, parent_id: OrderId) -> &[OrderId] {
        self.children.get(&parent_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether a given order is a bracket child waiting for its entry.
    pub fn is_dormant(&self, order_id: OrderId) -> bool {
        self.dormant
            .values()
            .any(|children| children.iter().any(|c| c.id == order_id))
    }

    pub fn audit_trail(&self) -> &[OrderAuditEntry] {
        &self.audit_trail
    }

    // ── Internal helpers ───────────────────────────────────────────────

    fn active_mut(&mut self, order_id: OrderId) -> Result<&mut Order, OrderBookError> {
        let order = self
            .orders
            .get_mut(&order_id)
            .ok_or(OrderBookError::OrderNotFound(order_id))?;
        if !order.is_active() {
            return Err(OrderBookError::OrderNotActive(order_id, format!("{:?}", order.status)));
        }
        Ok(order)
    }

    fn cancel_oco_siblings(&mut self, filled_id: OrderId, step: usize) {
        let Some(group_id) = self.orders.get(&filled_id).and_then(|o| o.group_id) else {
            return;
        };
        let siblings: Vec<OrderId> = self
            .group_members(group_id)
            .iter()
            .copied()
            .filter(|&id| id != filled_id)
            .collect();

        for sibling_id in siblings {
            if let Some(sibling) = self.orders.get_mut(&sibling_id) {
                if sibling.is_active() {
                    let from = sibling.status.clone();
                    let status = OrderStatus::Cancelled {
                        reason: "OCO sibling filled".to_string(),
                    };
                    sibling.status = status.clone();
                    self.record_audit(sibling_id, Some(from), status, step, "OCO sibling filled");
                }
            }
        }
    }

    /// Move the dormant children of `entry_id` into the book as Cancelled.
    fn cancel_dormant_children(&mut self, entry_id: OrderId, step: usize, reason: &str) {
        let Some(children) = self.dormant.remove(&entry_id) else {
            return;
        };
        for mut child in children {
            let status = OrderStatus::Cancelled {
                reason: reason.to_string(),
            };
            child.status = status.clone();
            self.record_audit(child.id, Some(OrderStatus::Pending), status, step, reason);
            self.orders.insert(child.id, child);
        }
    }

    /// Move dormant children into the book. They become eligible on the
    /// step after the entry filled and form an OCO group of their own.
    fn activate_bracket_children(&mut self, entry_id: OrderId, step: usize) {
        let Some(children) = self.dormant.remove(&entry_id) else {
            return;
        };
        for mut child in children {
            child.eligible_step = step + 1;
            child.expires_after = child.time_in_force.expiry_step(step + 1);
            let child_id = child.id;
            if let Some(group_id) = child.group_id {
                self.groups.entry(group_id).or_default().push(child_id);
            }
            self.orders.insert(child_id, child);
            self.record_audit(
                child_id,
                Some(OrderStatus::Pending),
                OrderStatus::Pending,
                step,
                "bracket entry filled, child activated",
            );
        }
    }

    fn record_audit(
        &mut self,
        order_id: OrderId,
        from_status: Option<OrderStatus>,
        to_status: OrderStatus,
        step: usize,
        reason: &str,
    ) {
        self.audit_trail.push(OrderAuditEntry {
            order_id,
            step,
            from_status,
            to_status,
            reason: reason.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AlgoStrategy, Side, TimeInForce};

    // ── Test helpers ───────────────────────────────────────────────────

    fn make_order(id: u64, side: Side, order_type: OrderType, qty: f64) -> Order {
        Order {
            id: OrderId(id),
            symbol: "SPY".into(),
            side,
            order_type,
            role: OrderRole::Standalone,
            quantity: qty,
            filled_quantity: 0.0,
            avg_fill_price: 0.0,
            time_in_force: TimeInForce::Gtc,
            status: OrderStatus::Pending,
            created_step: 0,
            eligible_step: 1,
            expires_after: None,
            parent_id: None,
            group_id: None,
        }
    }

    fn limit_sell(id: u64, limit: f64, qty: f64) -> Order {
        make_order(id, Side::Sell, OrderType::Limit { limit_price: limit }, qty)
    }

    fn stop_sell(id: u64, stop: f64, qty: f64) -> Order {
        make_order(id, Side::Sell, OrderType::Stop { stop_price: stop }, qty)
    }

    fn bracket(book: &mut OrderBook) {
        let entry = make_order(1, Side::Buy, OrderType::Market, 100.0).role(OrderRole::BracketEntry);
        let mut tp = limit_sell(2, 110.0, 100.0);
        tp.role = OrderRole::TakeProfit;
        tp.parent_id = Some(OrderId(1));
        tp.group_id = Some(GroupId(1));
        let mut sl = stop_sell(3, 95.0, 100.0);
        sl.role = OrderRole::StopLoss;
        sl.parent_id = Some(OrderId(1));
        sl.group_id = Some(GroupId(1));
        book.submit_bracket(entry, tp, sl, 0);
    }

    trait WithRole {
        fn role(self, role: OrderRole) -> Self;
    }

    impl WithRole for Order {
        fn role(mut self, role: OrderRole) -> Self {
            self.role = role;
            self
        }
    }

    // ── Submit and retrieve ────────────────────────────────────────────

    #[test]
    fn submit_and_get() {
        let mut book = OrderBook::new();
        book.submit(make_order(1, Side::Buy, OrderType::Market, 100.0), 0);

        let retrieved = book.get(OrderId(1)).unwrap();
        assert_eq!(retrieved.quantity, 100.0);
        assert_eq!(retrieved.status, OrderStatus::Pending);
        assert_eq!(book.audit_trail().len(), 1);
        assert_eq!(book.audit_trail()[0].from_status, None);
    }

    #[test]
    fn rejected_orders_are_kept_for_audit() {
        let mut book = OrderBook::new();
        book.reject(make_order(1, Side::Buy, OrderType::Market, 100.0), 0, "position limit");

        let order = book.get(OrderId(1)).unwrap();
        assert!(matches!(order.status, OrderStatus::Rejected { .. }));
        assert_eq!(book.active_count(), 0);
    }

    // ── Fills ──────────────────────────────────────────────────────────

    #[test]
    fn partial_then_full_fill_tracks_average_price() {
        let mut book = OrderBook::new();
        book.submit(make_order(1, Side::Buy, OrderType::Limit { limit_price: 100.0 }, 100.0), 0);

        assert!(!book.record_fill(OrderId(1), 40.0, 100.0, 1).unwrap());
        assert_eq!(book.get(OrderId(1)).unwrap().status, OrderStatus::Pending);

        assert!(book.record_fill(OrderId(1), 60.0, 95.0, 2).unwrap());
        let order = book.get(OrderId(1)).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert!((order.avg_fill_price - 97.0).abs() < 1e-10);
    }

    #[test]
    fn fill_cancelled_order_fails() {
        let mut book = OrderBook::new();
        book.submit(make_order(1, Side::Buy, OrderType::Market, 100.0), 0);
        book.cancel(OrderId(1), 0, "user").unwrap();
        assert!(matches!(
            book.record_fill(OrderId(1), 100.0, 100.0, 1),
            Err(OrderBookError::OrderNotActive(..))
        ));
    }

    #[test]
    fn fill_nonexistent_order_fails() {
        let mut book = OrderBook::new();
        assert_eq!(
            book.record_fill(OrderId(9), 1.0, 1.0, 0),
            Err(OrderBookError::OrderNotFound(OrderId(9)))
        );
    }

    // ── Stop trigger ───────────────────────────────────────────────────

    #[test]
    fn stop_trigger_then_fill_audits_both() {
        let mut book = OrderBook::new();
        book.submit(stop_sell(1, 95.0, 100.0), 0);
        book.trigger(OrderId(1), 3).unwrap();
        assert_eq!(book.get(OrderId(1)).unwrap().status, OrderStatus::Triggered);
        book.record_fill(OrderId(1), 100.0, 94.9, 3).unwrap();

        let statuses: Vec<_> = book.audit_trail().iter().map(|e| e.to_status.clone()).collect();
        assert_eq!(
            statuses,
            vec![OrderStatus::Pending, OrderStatus::Triggered, OrderStatus::Filled]
        );
    }

    #[test]
    fn trigger_non_pending_fails() {
        let mut book = OrderBook::new();
        book.submit(stop_sell(1, 95.0, 100.0), 0);
        book.trigger(OrderId(1), 1).unwrap();
        assert!(matches!(
            book.trigger(OrderId(1), 1),
            Err(OrderBookError::InvalidTransition(..))
        ));
    }

    // ── Cancel / expire ────────────────────────────────────────────────

    #[test]
    fn cancel_filled_order_fails() {
        let mut book = OrderBook::new();
        book.submit(make_order(1, Side::Buy, OrderType::Market, 10.0), 0);
        book.record_fill(OrderId(1), 10.0, 100.0, 0).unwrap();
        assert!(book.cancel(OrderId(1), 1, "late").is_err());
    }

    #[test]
    fn expire_pending_order() {
        let mut book = OrderBook::new();
        book.submit(limit_sell(1, 110.0, 10.0), 0);
        book.expire(OrderId(1), 1).unwrap();
        assert_eq!(book.get(OrderId(1)).unwrap().status, OrderStatus::Expired);
        assert!(book.expire(OrderId(1), 2).is_err());
    }

    // ── OCO ────────────────────────────────────────────────────────────

    #[test]
    fn oco_one_fill_cancels_sibling() {
        let mut book = OrderBook::new();
        book.submit_oco(limit_sell(1, 110.0, 100.0), stop_sell(2, 95.0, 100.0), GroupId(1), 0);
        assert_eq!(book.group_members(GroupId(1)), &[OrderId(1), OrderId(2)]);

        book.record_fill(OrderId(2), 100.0, 95.0, 2).unwrap();
        assert_eq!(book.get(OrderId(2)).unwrap().status, OrderStatus::Filled);
        assert_eq!(
            book.get(OrderId(1)).unwrap().status,
            OrderStatus::Cancelled {
                reason: "OCO sibling filled".into()
            }
        );
    }

    #[test]
    fn oco_partial_fill_cancels_sibling() {
        let mut book = OrderBook::new();
        book.submit_oco(limit_sell(1, 110.0, 100.0), stop_sell(2, 95.0, 100.0), GroupId(1), 0);

        book.record_fill(OrderId(1), 30.0, 110.0, 2).unwrap();
        assert!(book.get(OrderId(1)).unwrap().is_active());
        assert!(!book.get(OrderId(2)).unwrap().is_active());
    }

    // ── Brackets ───────────────────────────────────────────────────────

    #[test]
    fn bracket_children_dormant_before_entry_fill() {
        let mut book = OrderBook::new();
        bracket(&mut book);

        assert!(book.is_dormant(OrderId(2)));
        assert!(book.is_dormant(OrderId(3)));
        assert!(book.get(OrderId(2)).is_none());
        assert_eq!(book.active_count(), 1);
    }

    #[test]
    fn bracket_children_activate_on_entry_fill() {
        let mut book = OrderBook::new();
        bracket(&mut book);
        book.record_fill(OrderId(1), 100.0, 100.0, 4).unwrap();

        assert!(!book.is_dormant(OrderId(2)));
        let tp = book.get(OrderId(2)).unwrap();
        assert!(tp.is_active());
        assert_eq!(tp.eligible_step, 5);
        assert_eq!(book.group_members(GroupId(1)), &[OrderId(2), OrderId(3)]);
    }

    #[test]
    fn bracket_children_behave_as_oco_after_activation() {
        let mut book = OrderBook::new();
        bracket(&mut book);
        book.record_fill(OrderId(1), 100.0, 100.0, 0).unwrap();
        book.record_fill(OrderId(2), 100.0, 110.0, 3).unwrap();

        assert_eq!(book.get(OrderId(2)).unwrap().status, OrderStatus::Filled);
        assert!(matches!(
            book.get(OrderId(3)).unwrap().status,
            OrderStatus::Cancelled { .. }
        ));
    }

    #[test]
    fn bracket_entry_cancel_cleans_up_dormant_children() {
        let mut book = OrderBook::new();
        bracket(&mut book);
        book.cancel(OrderId(1), 1, "strategy exit").unwrap();

        assert!(!book.is_dormant(OrderId(2)));
        for id in [2, 3] {
            assert_eq!(
                book.get(OrderId(id)).unwrap().status,
                OrderStatus::Cancelled {
                    reason: "bracket entry cancelled".into()
                }
            );
        }
    }

    // ── Algo parents ───────────────────────────────────────────────────

    fn algo_family(book: &mut OrderBook) {
        let parent = make_order(1, Side::Buy, OrderType::Market, 40.0)
            .role(OrderRole::AlgoParent(AlgoStrategy::Twap { horizon: 2 }));
        book.submit(parent, 0);
        for id in [2, 3] {
            let mut child = make_order(id, Side::Buy, OrderType::Market, 20.0).role(OrderRole::AlgoChild);
            child.parent_id = Some(OrderId(1));
            book.submit(child, 0);
        }
    }

    #[test]
    fn child_fills_roll_up_into_parent() {
        let mut book = OrderBook::new();
        algo_family(&mut book);
        book.record_fill(OrderId(2), 20.0, 100.0, 1).unwrap();
        book.record_fill(OrderId(3), 20.0, 102.0, 2).unwrap();

        let parent = book.get(OrderId(1)).unwrap();
        assert_eq!(parent.filled_quantity, 40.0);
        assert!((parent.avg_fill_price - 101.0).abs() < 1e-10);
        assert_eq!(book.settle_parent(OrderId(1), 2).unwrap(), OrderStatus::Filled);
    }

    #[test]
    fn cancelling_parent_cancels_children() {
        let mut book = OrderBook::new();
        algo_family(&mut book);
        book.record_fill(OrderId(2), 20.0, 100.0, 1).unwrap();
        book.cancel(OrderId(1), 1, "strategy cancel").unwrap();

        assert_eq!(book.get(OrderId(2)).unwrap().status, OrderStatus::Filled);
        assert_eq!(
            book.get(OrderId(3)).unwrap().status,
            OrderStatus::Cancelled {
                reason: "parent cancelled".into()
            }
        );
    }

    #[test]
    fn short_parent_settles_expired() {
        let mut book = OrderBook::new();
        algo_family(&mut book);
        book.record_fill(OrderId(2), 20.0, 100.0, 1).unwrap();
        book.cancel(OrderId(3), 2, "insufficient cash").unwrap();
        assert_eq!(book.settle_parent(OrderId(1), 2).unwrap(), OrderStatus::Expired);
    }
}
