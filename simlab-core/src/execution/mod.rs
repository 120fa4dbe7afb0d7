//! Execution simulator: turns accepted orders into fills bar by bar.
//!
//! The simulator owns the order book and the algo schedules. It borrows bar
//! data, produces `Fill` records and leaves balances to the ledger; the only
//! portfolio input it needs is the cash headroom above the floor, which gates
//! every fill.
//!
//! Evaluation order on a bar is fixed: release algo slices, stop-type orders
//! by id, limit orders by id, market orders by id, ratchet trailing stops,
//! expire orders, settle algo parents.

pub mod algo;
pub mod cost_model;
pub mod liquidity;
pub mod order_book;
pub mod trailing;
pub mod trigger;

pub use algo::{AlgoConfig, AlgoSchedule};
pub use cost_model::CostModel;
pub use liquidity::LiquidityPolicy;
pub use order_book::{OrderBook, OrderBookError};

use crate::domain::{
    AlgoStrategy, Bar, Fill, GroupId, IdGen, LegType, Order, OrderId, OrderRequest, OrderRole, OrderStatus,
    OrderTicket, OrderType, Side, TimeInForce, TrailDistance,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

use self::trigger::{check_trigger, TriggerResult};

#[derive(Debug, Error, PartialEq)]
pub enum OrderError {
    /// The order was refused before any market interaction.
    #[error("invalid order parameters: {0}")]
    InvalidOrderParameters(String),

    #[error(transparent)]
    Book(#[from] OrderBookError),
}

fn invalid<T>(msg: impl Into<String>) -> Result<T, OrderError> {
    Err(OrderError::InvalidOrderParameters(msg.into()))
}

/// Configuration for the execution simulator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub cost_model: CostModel,
    pub liquidity: LiquidityPolicy,
    pub algo: AlgoConfig,
}

impl ExecutionConfig {
    pub fn frictionless() -> Self {
        Self {
            cost_model: CostModel::frictionless(),
            ..Self::default()
        }
    }
}

/// An order that could not fill because its cash outflow exceeded the headroom.
#[derive(Debug, Clone, PartialEq)]
pub struct CashRejection {
    pub order_id: OrderId,
    pub symbol: String,
    pub required: f64,
    pub available: f64,
}

/// Everything that happened to the book while processing one bar (or one
/// submission).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BarExecution {
    pub fills: Vec<Fill>,
    pub cash_rejections: Vec<CashRejection>,
}

/// Result of an accepted submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    /// Every order created for the request; the primary order comes first.
    pub order_ids: Vec<OrderId>,
    /// Immediate fills (MARKET requests fill on the submission bar).
    pub execution: BarExecution,
}

impl Submission {
    pub fn primary_id(&self) -> Option<OrderId> {
        self.order_ids.first().copied()
    }
}

/// Per-fill parameters shared by the market and limit paths.
struct FillTerms {
    quantity: f64,
    price: f64,
    slippage: f64,
    reference_price: f64,
    fee: f64,
    liquidity_limited: bool,
}

pub struct ExecutionSimulator {
    config: ExecutionConfig,
    book: OrderBook,
    ids: IdGen,
    schedules: BTreeMap<OrderId, AlgoSchedule>,
    /// Per-symbol volume history for VWAP profiles.
    volumes: BTreeMap<String, Vec<f64>>,
}

impl ExecutionSimulator {
    pub fn new(config: ExecutionConfig) -> Self {
        Self {
            config,
            book: OrderBook::new(),
            ids: IdGen::default(),
            schedules: BTreeMap::new(),
            volumes: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn active_schedules(&self) -> usize {
        self.schedules.len()
    }

    // ── Validation ─────────────────────────────────────────────────────

    /// Check a ticket's parameters without touching the market.
    pub fn validate(ticket: &OrderTicket) -> Result<(), OrderError> {
        if ticket.symbol.is_empty() {
            return invalid("empty symbol");
        }
        if !(ticket.quantity.is_finite() && ticket.quantity > 0.0) {
            return invalid(format!("quantity must be positive, got {}", ticket.quantity));
        }
        if ticket.time_in_force == TimeInForce::Bars(0) {
            return invalid("time-in-force of zero bars");
        }

        match &ticket.request {
            OrderRequest::Single(leg) => validate_leg(leg),
            OrderRequest::Oco { first, second } => {
                validate_leg(first)?;
                validate_leg(second)
            }
            OrderRequest::Bracket {
                entry,
                take_profit,
                stop_loss,
            } => {
                validate_leg(entry)?;
                positive_price("take-profit", *take_profit)?;
                positive_price("stop-loss", *stop_loss)?;
                let (below, above) = match ticket.side {
                    Side::Buy => (*stop_loss, *take_profit),
                    Side::Sell => (*take_profit, *stop_loss),
                };
                if below >= above {
                    return invalid(format!(
                        "{} bracket needs stop-loss {} on the losing side of take-profit {}",
                        ticket.side, stop_loss, take_profit
                    ));
                }
                let entry_price = match entry {
                    LegType::Limit { limit_price } => Some(*limit_price),
                    LegType::Stop { stop_price } => Some(*stop_price),
                    LegType::Market | LegType::TrailingStop { .. } => None,
                };
                if let Some(p) = entry_price {
                    if !(below < p && p < above) {
                        return invalid(format!(
                            "bracket entry {p} must lie between {below} and {above}"
                        ));
                    }
                }
                Ok(())
            }
            OrderRequest::Algo { algo, limit_price } => {
                if algo.horizon() == 0 {
                    return invalid("algo horizon must be at least one bar");
                }
                if let AlgoStrategy::Participate { rate: Some(rate), .. } = algo {
                    if !(rate.is_finite() && *rate > 0.0 && *rate <= 1.0) {
                        return invalid(format!("participation rate {rate} outside (0, 1]"));
                    }
                }
                if let Some(limit) = limit_price {
                    positive_price("limit", *limit)?;
                }
                Ok(())
            }
        }
    }

    // ── Submission ─────────────────────────────────────────────────────

    /// Accept a ticket on `bar` at `step`.
    ///
    /// MARKET requests (and MARKET bracket entries / OCO legs) fill
    /// immediately at the bar's close. Resting orders become eligible on the
    /// next step; algo slices start on the next step.
    pub fn submit(
        &mut self,
        ticket: &OrderTicket,
        bar: &Bar,
        step: usize,
        cash_headroom: f64,
    ) -> Result<Submission, OrderError> {
        Self::validate(ticket)?;
        if ticket.symbol != bar.symbol {
            return invalid(format!(
                "ticket for {} submitted against a {} bar",
                ticket.symbol, bar.symbol
            ));
        }

        let base_role = if ticket.forced {
            OrderRole::ForcedReduction
        } else {
            OrderRole::Standalone
        };

        let order_ids = match &ticket.request {
            OrderRequest::Single(leg) => {
                let order = self.leg_order(ticket, *leg, base_role, bar.close, step);
                let id = order.id;
                self.book.submit(order, step);
                vec![id]
            }
            OrderRequest::Oco { first, second } => {
                let first = self.leg_order(ticket, *first, OrderRole::OcoLeg, bar.close, step);
                let second = self.leg_order(ticket, *second, OrderRole::OcoLeg, bar.close, step);
                let ids = vec![first.id, second.id];
                let group_id = self.ids.next_group_id();
                self.book.submit_oco(first, second, group_id, step);
                ids
            }
            OrderRequest::Bracket {
                entry,
                take_profit,
                stop_loss,
            } => {
                let entry = self.leg_order(ticket, *entry, OrderRole::BracketEntry, bar.close, step);
                let group_id = self.ids.next_group_id();
                let tp = self.bracket_child(
                    ticket,
                    (entry.id, group_id),
                    OrderRole::TakeProfit,
                    OrderType::Limit {
                        limit_price: *take_profit,
                    },
                    step,
                );
                let sl = self.bracket_child(
                    ticket,
                    (entry.id, group_id),
                    OrderRole::StopLoss,
                    OrderType::Stop {
                        stop_price: *stop_loss,
                    },
                    step,
                );
                let ids = vec![entry.id, tp.id, sl.id];
                self.book.submit_bracket(entry, tp, sl, step);
                ids
            }
            OrderRequest::Algo { algo, limit_price } => {
                self.submit_algo(ticket, *algo, *limit_price, step)
            }
        };

        let mut execution = BarExecution::default();
        let mut headroom = cash_headroom;
        for id in &order_ids {
            let immediate = self
                .book
                .get(*id)
                .is_some_and(|o| o.is_eligible(step) && o.order_type == OrderType::Market);
            if immediate {
                self.fill_market(*id, bar, bar.close, step, &mut headroom, &mut execution)?;
            }
        }

        Ok(Submission {
            order_ids,
            execution,
        })
    }

    fn submit_algo(
        &mut self,
        ticket: &OrderTicket,
        algo: AlgoStrategy,
        limit_price: Option<f64>,
        step: usize,
    ) -> Vec<OrderId> {
        let order_type = limit_price.map_or(OrderType::Market, |limit_price| OrderType::Limit { limit_price });
        let parent = self.new_order(
            &ticket.symbol,
            ticket.side,
            order_type,
            OrderRole::AlgoParent(algo),
            ticket.quantity,
            TimeInForce::Gtc,
            step,
            step + 1,
        );
        let parent_id = parent.id;
        self.book.submit(parent, step);

        let schedule = AlgoSchedule::new(
            parent_id,
            ticket.symbol.clone(),
            ticket.side,
            algo,
            limit_price,
            ticket.quantity,
            step,
            &self.config.algo,
        );
        let volumes = self.volumes.get(&ticket.symbol).map(Vec::as_slice).unwrap_or(&[]);
        let slices = schedule.planned_slices(volumes);

        let mut ids = vec![parent_id];
        for (i, qty) in slices.into_iter().enumerate() {
            if qty > 0.0 {
                ids.push(self.spawn_child(&schedule, qty, step, schedule.start_step + i));
            }
        }
        debug!(parent = %parent_id, symbol = %ticket.symbol, ?algo, children = ids.len() - 1, "algo order accepted");
        self.schedules.insert(parent_id, schedule);
        ids
    }

    /// Register a ticket that never reached the market (risk or parameter
    /// rejection). Returns the id of the rejected order record.
    pub fn record_rejection(&mut self, ticket: &OrderTicket, step: usize, reason: &str) -> OrderId {
        let (order_type, role) = match &ticket.request {
            OrderRequest::Single(leg) => (leg.to_order_type(ticket.side, 0.0), OrderRole::Standalone),
            OrderRequest::Oco { first, .. } => (first.to_order_type(ticket.side, 0.0), OrderRole::OcoLeg),
            OrderRequest::Bracket { entry, .. } => {
                (entry.to_order_type(ticket.side, 0.0), OrderRole::BracketEntry)
            }
            OrderRequest::Algo { algo, limit_price } => (
                limit_price.map_or(OrderType::Market, |limit_price| OrderType::Limit { limit_price }),
                OrderRole::AlgoParent(*algo),
            ),
        };
        let role = if ticket.forced { OrderRole::ForcedReduction } else { role };
        let order = self.new_order(
            &ticket.symbol,
            ticket.side,
            order_type,
            role,
            ticket.quantity,
            ticket.time_in_force,
            step,
            step,
        );
        let id = order.id;
        self.book.reject(order, step, reason);
        id
    }

    /// Cancel an active order. Cancelling an algo parent drops its schedule
    /// and cancels all unfilled children.
    pub fn cancel(&mut self, order_id: OrderId, step: usize, reason: &str) -> Result<(), OrderError> {
        self.book.cancel(order_id, step, reason)?;
        self.schedules.remove(&order_id);
        Ok(())
    }

    // ── Bar processing ─────────────────────────────────────────────────

    /// Process all resting orders for `bar.symbol` against `bar`.
    pub fn process_bar(
        &mut self,
        bar: &Bar,
        step: usize,
        cash_headroom: f64,
    ) -> Result<BarExecution, OrderError> {
        let mut execution = BarExecution::default();
        let mut headroom = cash_headroom;
        self.volumes
            .entry(bar.symbol.clone())
            .or_default()
            .push(bar.volume);

        self.release_participate_slices(bar, step);

        // Stop-type orders first so an OCO pair can never fill both legs.
        let stops = self.eligible_ids(&bar.symbol, step, |o| {
            o.status == OrderStatus::Pending && o.order_type.stop_price().is_some()
        });
        for id in stops {
            let Some(order) = self.book.get(id).filter(|o| o.is_eligible(step)) else {
                continue;
            };
            if let TriggerResult::Market {
                reference_price,
                gap_through,
            } = check_trigger(order, bar)
            {
                debug!(order = %id, reference_price, gap_through, "stop triggered");
                self.book.trigger(id, step)?;
                self.fill_market(id, bar, reference_price, step, &mut headroom, &mut execution)?;
            }
        }

        let limits = self.eligible_ids(&bar.symbol, step, |o| {
            matches!(o.order_type, OrderType::Limit { .. })
        });
        for id in limits {
            let Some(order) = self.book.get(id).filter(|o| o.is_eligible(step)) else {
                continue;
            };
            if let TriggerResult::Limit { price } = check_trigger(order, bar) {
                let side = order.side;
                let (qty, remainder) = self
                    .config
                    .liquidity
                    .constrain(order.remaining_quantity(), bar.volume);
                if qty <= 0.0 {
                    continue;
                }
                if remainder > 0.0 {
                    debug!(order = %id, filled = qty, remainder, "limit fill capped by liquidity");
                }
                let terms = FillTerms {
                    quantity: qty,
                    price,
                    slippage: 0.0,
                    reference_price: price,
                    fee: self.config.cost_model.commission(price, qty),
                    liquidity_limited: remainder > 0.0,
                };
                self.execute(id, side, terms, bar, step, &mut headroom, &mut execution)?;
            }
        }

        let markets = self.eligible_ids(&bar.symbol, step, |o| {
            o.order_type == OrderType::Market || o.status == OrderStatus::Triggered
        });
        for id in markets {
            if self.book.get(id).is_some_and(|o| o.is_eligible(step)) {
                self.fill_market(id, bar, bar.close, step, &mut headroom, &mut execution)?;
            }
        }

        let trailing_ids = self.eligible_ids(&bar.symbol, step, |o| {
            matches!(o.order_type, OrderType::TrailingStop { .. })
        });
        for id in trailing_ids {
            let Some(side) = self.book.get(id).map(|o| o.side) else {
                continue;
            };
            if let Some(order_type) = self.book.order_type_mut(id) {
                if trailing::ratchet(order_type, side, bar) {
                    debug!(order = %id, stop = ?order_type.stop_price(), "trailing stop ratcheted");
                }
            }
        }

        let expiring: Vec<OrderId> = self
            .book
            .active_orders_for_symbol(&bar.symbol)
            .into_iter()
            .filter(|o| !o.is_algo_parent() && o.expires_after.is_some_and(|last| step >= last))
            .map(|o| o.id)
            .collect();
        for id in expiring {
            self.book.expire(id, step)?;
        }

        self.settle_parents(&bar.symbol, step)?;

        Ok(execution)
    }

    // ── Internals ──────────────────────────────────────────────────────

    fn eligible_ids(&self, symbol: &str, step: usize, pred: impl Fn(&Order) -> bool) -> Vec<OrderId> {
        self.book
            .active_orders_for_symbol(symbol)
            .into_iter()
            .filter(|o| o.is_eligible(step) && pred(o))
            .map(|o| o.id)
            .collect()
    }

    /// Fill the remainder of an order under market rules from `reference_price`.
    fn fill_market(
        &mut self,
        id: OrderId,
        bar: &Bar,
        reference_price: f64,
        step: usize,
        headroom: &mut f64,
        execution: &mut BarExecution,
    ) -> Result<(), OrderError> {
        let Some(order) = self.book.get(id) else {
            return Err(OrderBookError::OrderNotFound(id).into());
        };
        let side = order.side;
        let qty = order.remaining_quantity();
        let cost = &self.config.cost_model;
        let (price, slippage) = cost.apply_slippage(reference_price, side, qty, bar.volume);
        let terms = FillTerms {
            quantity: qty,
            price,
            slippage,
            reference_price,
            fee: cost.commission(price, qty),
            liquidity_limited: false,
        };
        self.execute(id, side, terms, bar, step, headroom, execution)
    }

    /// Apply the cash gate, then record the fill.
    #[allow(clippy::too_many_arguments)]
    fn execute(
        &mut self,
        id: OrderId,
        side: Side,
        terms: FillTerms,
        bar: &Bar,
        step: usize,
        headroom: &mut f64,
        execution: &mut BarExecution,
    ) -> Result<(), OrderError> {
        let signed_qty = side.sign() * terms.quantity;
        let outflow = signed_qty * terms.price + terms.fee;
        if outflow > *headroom + 1e-9 {
            warn!(order = %id, symbol = %bar.symbol, required = outflow, available = *headroom, "insufficient cash, order cancelled");
            self.book.cancel(id, step, "insufficient cash")?;
            execution.cash_rejections.push(CashRejection {
                order_id: id,
                symbol: bar.symbol.clone(),
                required: outflow,
                available: *headroom,
            });
            return Ok(());
        }
        *headroom -= outflow;

        self.book.record_fill(id, terms.quantity, terms.price, step)?;
        execution.fills.push(Fill {
            id: self.ids.next_fill_id(),
            order_id: id,
            symbol: bar.symbol.clone(),
            quantity: signed_qty,
            price: terms.price,
            fee: terms.fee,
            slippage: terms.slippage,
            reference_price: terms.reference_price,
            timestamp: bar.timestamp,
            step,
            liquidity_limited: terms.liquidity_limited,
        });
        Ok(())
    }

    fn release_participate_slices(&mut self, bar: &Bar, step: usize) {
        let due: Vec<(OrderId, f64)> = self
            .schedules
            .values()
            .filter(|s| s.symbol == bar.symbol && matches!(s.strategy, AlgoStrategy::Participate { .. }))
            .filter_map(|s| {
                let filled = self.book.get(s.parent_id).map_or(0.0, |p| p.filled_quantity);
                let resting: f64 = self
                    .book
                    .children_of(s.parent_id)
                    .iter()
                    .filter_map(|id| self.book.get(*id))
                    .filter(|c| c.is_active())
                    .map(Order::remaining_quantity)
                    .sum();
                s.participate_slice(step, bar.volume, filled + resting)
                    .map(|qty| (s.parent_id, qty))
            })
            .collect();

        for (parent_id, qty) in due {
            if let Some(schedule) = self.schedules.get(&parent_id).cloned() {
                self.spawn_child(&schedule, qty, step, step);
            }
        }
    }

    fn settle_parents(&mut self, symbol: &str, step: usize) -> Result<(), OrderError> {
        let parents: Vec<OrderId> = self
            .schedules
            .values()
            .filter(|s| s.symbol == symbol)
            .map(|s| s.parent_id)
            .collect();

        for parent_id in parents {
            let Some(parent) = self.book.get(parent_id) else {
                continue;
            };
            if !parent.is_active() {
                self.schedules.remove(&parent_id);
                continue;
            }
            let done = parent.filled_quantity >= parent.quantity - 1e-9;
            let any_live_child = self
                .book
                .children_of(parent_id)
                .iter()
                .any(|id| self.book.get(*id).is_some_and(Order::is_active));
            // TWAP/VWAP children all exist from acceptance; PARTICIPATE may
            // still release slices until its window closes.
            let exhausted = self.schedules.get(&parent_id).map_or(true, |s| match s.strategy {
                AlgoStrategy::Participate { .. } => s.is_exhausted(step),
                AlgoStrategy::Twap { .. } | AlgoStrategy::Vwap { .. } => true,
            });
            if done || (!any_live_child && exhausted) {
                let status = self.book.settle_parent(parent_id, step)?;
                debug!(parent = %parent_id, ?status, "algo parent settled");
                self.schedules.remove(&parent_id);
            }
        }
        Ok(())
    }

    fn spawn_child(&mut self, schedule: &AlgoSchedule, qty: f64, created_step: usize, eligible_step: usize) -> OrderId {
        let (order_type, tif) = match schedule.limit_price {
            Some(limit_price) => (OrderType::Limit { limit_price }, TimeInForce::Day),
            None => (OrderType::Market, TimeInForce::Gtc),
        };
        let mut child = self.new_order(
            &schedule.symbol,
            schedule.side,
            order_type,
            OrderRole::AlgoChild,
            qty,
            tif,
            created_step,
            eligible_step,
        );
        child.parent_id = Some(schedule.parent_id);
        let id = child.id;
        self.book.submit(child, created_step);
        id
    }

    /// Dormant protective child of a bracket entry, on the opposite side.
    fn bracket_child(
        &mut self,
        ticket: &OrderTicket,
        (entry_id, group_id): (OrderId, GroupId),
        role: OrderRole,
        order_type: OrderType,
        step: usize,
    ) -> Order {
        let mut child = self.new_order(
            &ticket.symbol,
            ticket.side.opposite(),
            order_type,
            role,
            ticket.quantity,
            TimeInForce::Gtc,
            step,
            step + 1,
        );
        child.parent_id = Some(entry_id);
        child.group_id = Some(group_id);
        child
    }

    /// Build an order for one requested leg. MARKET legs are eligible at once.
    fn leg_order(&mut self, ticket: &OrderTicket, leg: LegType, role: OrderRole, close: f64, step: usize) -> Order {
        let eligible_step = if leg == LegType::Market { step } else { step + 1 };
        self.new_order(
            &ticket.symbol,
            ticket.side,
            leg.to_order_type(ticket.side, close),
            role,
            ticket.quantity,
            ticket.time_in_force,
            step,
            eligible_step,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn new_order(
        &mut self,
        symbol: &str,
        side: Side,
        order_type: OrderType,
        role: OrderRole,
        quantity: f64,
        time_in_force: TimeInForce,
        created_step: usize,
        eligible_step: usize,
    ) -> Order {
        Order {
            id: self.ids.next_order_id(),
            symbol: symbol.to_string(),
            side,
            order_type,
            role,
            quantity,
            filled_quantity: 0.0,
            avg_fill_price: 0.0,
            time_in_force,
            status: OrderStatus::Pending,
            created_step,
            eligible_step,
            expires_after: time_in_force.expiry_step(eligible_step),
            parent_id: None,
            group_id: None,
        }
    }
}

fn positive_price(name: &str, price: f64) -> Result<(), OrderError> {
    if price.is_finite() && price > 0.0 {
        Ok(())
    } else {
        invalid(format!("{name} price must be positive, got {price}"))
    }
}

fn validate_leg(leg: &LegType) -> Result<(), OrderError> {
    match leg {
        LegType::Market => Ok(()),
        LegType::Limit { limit_price } => positive_price("limit", *limit_price),
        LegType::Stop { stop_price } => positive_price("stop", *stop_price),
        LegType::TrailingStop { trail } => {
            let d = trail.value();
            if !(d.is_finite() && d > 0.0) {
                return invalid(format!("trail distance must be positive, got {d}"));
            }
            if matches!(trail, TrailDistance::Percent(p) if *p >= 1.0) {
                return invalid(format!("trail percent {d} must be below 1"));
            }
            Ok(())
        }
    }
}
