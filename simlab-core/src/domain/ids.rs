use serde::{Deserialize, Serialize};
use std::fmt;

/// Order ID. Sequential within a run, so ordering by id is submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "O{}", self.0)
    }
}

/// Fill ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FillId(pub u64);

impl fmt::Display for FillId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F{}", self.0)
    }
}

/// Linked-order group ID (OCO legs, bracket protective pair).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupId(pub u64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G{}", self.0)
    }
}

/// Monotonic ID generator. One per run; never shared across runs.
#[derive(Debug, Clone, Default)]
pub struct IdGen {
    next_order: u64,
    next_fill: u64,
    next_group: u64,
}

impl IdGen {
    pub fn next_order_id(&mut self) -> OrderId {
        self.next_order += 1;
        OrderId(self.next_order)
    }

    pub fn next_fill_id(&mut self) -> FillId {
        self.next_fill += 1;
        FillId(self.next_fill)
    }

    pub fn next_group_id(&mut self) -> GroupId {
        self.next_group += 1;
        GroupId(self.next_group)
    }
}
