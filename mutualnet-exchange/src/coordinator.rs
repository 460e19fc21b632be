//! 3PC coordinator (§4.F), a behavior bundle over the orders log — kept
//! as plain state transitions, like `participant.rs`, so the owning
//! `Node` drives all networking and timer side effects.

use std::collections::HashMap;

use tracing::info;

use crate::catalogue::Legs;
use crate::order::{LegState, Order, PrecommitAckTracker};

/// What the `Node` should do after recording a `ReserveAck`.
#[derive(Debug, PartialEq, Eq)]
pub enum ReserveAckOutcome {
    /// The ack carried `-1`: the order must abort now (§4.F).
    Invalid,
    /// Recorded; other legs are still pending.
    Pending,
    /// Every leg now holds a valid reservation number: proceed to
    /// `PreCommit`.
    AllReserved,
}

pub struct Coordinator {
    next_order_number: u64,
    orders: HashMap<u64, Order>,
    precommit_acks: PrecommitAckTracker,
}

impl Coordinator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_order_number: 0,
            orders: HashMap::new(),
            precommit_acks: PrecommitAckTracker::new(),
        }
    }

    /// Allocate the next order slot (§4.F step 2) and stash the
    /// per-exchange stock quantities the fund expansion produced.
    pub fn create_order(&mut self, fund_name: String, requested_qty: u32, legs: Legs) -> u64 {
        let order_number = self.next_order_number;
        self.next_order_number += 1;
        let order = Order::new(order_number, fund_name, requested_qty, legs);
        self.orders.insert(order_number, order);
        info!(order_number, "order created");
        order_number
    }

    #[must_use]
    pub fn order(&self, order_number: u64) -> Option<&Order> {
        self.orders.get(&order_number)
    }

    pub fn record_reserve_ack(
        &mut self,
        order_number: u64,
        exchange: &str,
        reservation_number: i64,
    ) -> ReserveAckOutcome {
        let Some(order) = self.orders.get_mut(&order_number) else {
            return ReserveAckOutcome::Pending;
        };
        let state = if reservation_number < 0 {
            LegState::Failed
        } else {
            LegState::Reservation(reservation_number)
        };
        order.legs.insert(exchange.to_string(), state);

        if reservation_number < 0 {
            return ReserveAckOutcome::Invalid;
        }
        if order.all_legs_reserved() {
            ReserveAckOutcome::AllReserved
        } else {
            ReserveAckOutcome::Pending
        }
    }

    /// Record a `PreCommitAck`; returns `true` once every leg has acked
    /// (§4.F: "size equals `|legs|`").
    pub fn record_precommit_ack(&mut self, order_number: u64, exchange: String) -> bool {
        let Some(order) = self.orders.get(&order_number) else {
            return false;
        };
        let expected = order.leg_count();
        let all_in = self.precommit_acks.record(order_number, exchange, expected);
        if all_in {
            self.precommit_acks.clear(order_number);
        }
        all_in
    }

    /// `abort_valid_reservations` (§4.F): every leg holding a valid
    /// reservation number is marked `Failed` and returned so the caller
    /// can send `CancelReservation` to it. Idempotent: a second call
    /// observes no valid legs left and returns an empty vector — this is
    /// what makes a duplicate abort (timeout racing an invalid-ack abort)
    /// safe (§9 "Duplicate abort on invalid reserve").
    pub fn abort_valid_reservations(&mut self, order_number: u64) -> Vec<(String, i64)> {
        let Some(order) = self.orders.get_mut(&order_number) else {
            return Vec::new();
        };
        let valid = order.valid_legs();
        for (exchange, _) in &valid {
            order.legs.insert(exchange.clone(), LegState::Failed);
        }
        self.precommit_acks.clear(order_number);
        if !valid.is_empty() {
            info!(order_number, legs = valid.len(), "aborting order");
        }
        valid
    }

    pub fn remove(&mut self, order_number: u64) -> Option<Order> {
        self.precommit_acks.clear(order_number);
        self.orders.remove(&order_number)
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_numbers_are_sequential() {
        let mut c = Coordinator::new();
        let a = c.create_order("FUND1".into(), 1, Legs::new());
        let b = c.create_order("FUND1".into(), 1, Legs::new());
        assert_eq!(a, 0);
        assert_eq!(b, 1);
    }

    #[test]
    fn invalid_ack_triggers_abort_outcome() {
        let mut c = Coordinator::new();
        let legs = Legs::from([("ExA".into(), Default::default())]);
        let order_number = c.create_order("FUND1".into(), 1, legs);
        let outcome = c.record_reserve_ack(order_number, "ExA", -1);
        assert_eq!(outcome, ReserveAckOutcome::Invalid);
    }

    #[test]
    fn all_reserved_fires_once_every_leg_is_non_pending() {
        let mut c = Coordinator::new();
        let legs = Legs::from([("ExA".into(), Default::default()), ("ExB".into(), Default::default())]);
        let order_number = c.create_order("FUND1".into(), 1, legs);
        assert_eq!(
            c.record_reserve_ack(order_number, "ExA", 0),
            ReserveAckOutcome::Pending
        );
        assert_eq!(
            c.record_reserve_ack(order_number, "ExB", 3),
            ReserveAckOutcome::AllReserved
        );
    }

    #[test]
    fn abort_is_idempotent_on_repeat_call() {
        let mut c = Coordinator::new();
        let legs = Legs::from([("ExA".into(), Default::default())]);
        let order_number = c.create_order("FUND1".into(), 1, legs);
        c.record_reserve_ack(order_number, "ExA", 5);
        let first = c.abort_valid_reservations(order_number);
        assert_eq!(first, vec![("ExA".to_string(), 5)]);
        let second = c.abort_valid_reservations(order_number);
        assert!(second.is_empty());
    }
}
