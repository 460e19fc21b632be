//! Order: the coordinator-side record of one in-flight buy (§3 "Order").

use std::collections::{HashMap, HashSet};

use crate::catalogue::Legs;

/// A leg's reply state. Using an explicit enum instead of the original
/// source's `None`/`-1` sentinels resolves the "Abort-path bug" redesign
/// flag (§9): the abort predicate is "leg value is a valid reservation
/// number", which `LegState::Reservation(_)` makes exact by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegState {
    Pending,
    Reservation(i64),
    Failed,
}

pub struct Order {
    pub order_number: u64,
    pub fund_name: String,
    pub requested_qty: u32,
    pub legs: HashMap<String, LegState>,
    pub stocks_by_exchange: Legs,
}

impl Order {
    #[must_use]
    pub fn new(order_number: u64, fund_name: String, requested_qty: u32, stocks_by_exchange: Legs) -> Self {
        let legs = stocks_by_exchange
            .keys()
            .map(|exchange| (exchange.clone(), LegState::Pending))
            .collect();
        Self {
            order_number,
            fund_name,
            requested_qty,
            legs,
            stocks_by_exchange,
        }
    }

    /// Terminal-ready for phase 2: every leg holds a valid reservation
    /// number (none `Pending`, none `Failed`) — §4.F step on `ReserveAck`.
    #[must_use]
    pub fn all_legs_reserved(&self) -> bool {
        self.legs
            .values()
            .all(|s| matches!(s, LegState::Reservation(_)))
    }

    #[must_use]
    pub fn has_failed_leg(&self) -> bool {
        self.legs.values().any(|s| matches!(s, LegState::Failed))
    }

    /// Every leg currently holding a valid reservation number, for
    /// sending `PreCommit`/`Commit`/`Cancel` (§4.F).
    #[must_use]
    pub fn valid_legs(&self) -> Vec<(String, i64)> {
        self.legs
            .iter()
            .filter_map(|(exchange, state)| match state {
                LegState::Reservation(r) => Some((exchange.clone(), *r)),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn leg_count(&self) -> usize {
        self.legs.len()
    }
}

/// `order_number -> set of exchanges for which a `PreCommitAck` arrived`
/// (§3 "Pre-commit acks set").
#[derive(Default)]
pub struct PrecommitAckTracker {
    acks: HashMap<u64, HashSet<String>>,
}

impl PrecommitAckTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one ack; returns `true` once every leg of `order_number` has
    /// acked (`expected_legs`).
    pub fn record(&mut self, order_number: u64, exchange: String, expected_legs: usize) -> bool {
        let set = self.acks.entry(order_number).or_default();
        set.insert(exchange);
        set.len() >= expected_legs
    }

    pub fn clear(&mut self, order_number: u64) {
        self.acks.remove(&order_number);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_legs_reserved_false_while_any_pending() {
        let mut order = Order::new(1, "FUND1".into(), 1, Legs::from([("ExA".into(), Default::default())]));
        assert!(!order.all_legs_reserved());
        order.legs.insert("ExA".into(), LegState::Reservation(0));
        assert!(order.all_legs_reserved());
    }

    #[test]
    fn precommit_ack_tracker_fires_only_once_all_legs_in() {
        let mut tracker = PrecommitAckTracker::new();
        assert!(!tracker.record(1, "ExA".into(), 2));
        assert!(tracker.record(1, "ExB".into(), 2));
    }
}
