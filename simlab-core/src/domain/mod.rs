//! Domain types shared by the simulator, risk manager, ledger and orchestrator.

pub mod bar;
pub mod equity;
pub mod fill;
pub mod ids;
pub mod order;
pub mod position;
pub mod signal;
pub mod trade;

pub use bar::Bar;
pub use equity::EquityPoint;
pub use fill::Fill;
pub use ids::{FillId, GroupId, IdGen, OrderId};
pub use order::{
    AlgoStrategy, LegType, Order, OrderAuditEntry, OrderKind, OrderRequest, OrderRole,
    OrderStatus, OrderTicket, OrderType, Side, TimeInForce, TrailDistance,
};
pub use position::Position;
pub use signal::{Signal, SignalSize};
pub use trade::TradeRecord;

/// Symbol type alias
pub type Symbol = String;
