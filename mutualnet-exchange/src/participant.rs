//! 3PC participant (Exchange role), §4.E.
//!
//! A behavior bundle operating on the node's inventory and reservation
//! log; kept free of any network or timer type so it can be tested
//! synchronously (§9 "keep roles as separate behavior bundles operating
//! on disjoint state within one owner object"). The owning `Node` is
//! responsible for arming the per-reservation timer after a successful
//! `reserve_stocks`/`precommit_reservation` and for routing a fired timer
//! back into `on_timeout`.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::inventory::InventoryStore;
use crate::precommit_log::PrecommitLog;
use crate::reservation::{Reservation, ReservationLog, ReservationStatus};

/// Sentinel for "insufficient stock or unknown symbol" (§4.E, wire
/// constant `FAILED_RESERVATION`).
pub const RESERVE_FAILED: i64 = -1;

pub struct Participant {
    pub reservations: ReservationLog,
    inventory: Box<dyn InventoryStore>,
    precommit_log: Box<dyn PrecommitLog>,
}

impl Participant {
    pub fn new(inventory: Box<dyn InventoryStore>, precommit_log: Box<dyn PrecommitLog>) -> Self {
        Self {
            reservations: ReservationLog::new(),
            inventory,
            precommit_log,
        }
    }

    pub fn inventory_mut(&mut self) -> &mut dyn InventoryStore {
        self.inventory.as_mut()
    }

    /// Atomically attempt to decrement inventory for every symbol in
    /// `stocks`. On any shortfall or unknown symbol, every prior
    /// decrement in this call is undone and `RESERVE_FAILED` is returned
    /// (§4.E). On success, appends a new `Reserved` reservation and
    /// returns its id.
    pub fn reserve_stocks(&mut self, stocks: HashMap<String, u32>) -> i64 {
        let mut decremented: Vec<(String, u32)> = Vec::new();
        for (symbol, qty) in &stocks {
            if self.inventory.reserve(symbol, *qty) {
                decremented.push((symbol.clone(), *qty));
            } else {
                for (symbol, qty) in decremented {
                    self.inventory.release(&symbol, qty);
                }
                warn!(?stocks, "reserve_stocks failed: insufficient stock or unknown symbol");
                return RESERVE_FAILED;
            }
        }
        let id = self.reservations.push(Reservation::new(stocks));
        info!(id, "reservation created");
        id as i64
    }

    /// Legal only in `Reserved`. Transitions to `Precommit` and appends
    /// the serialized reservation to the durable log. `0` on success, `2`
    /// on wrong state, `1` on unknown id or log-write failure (§4.E).
    pub fn precommit_reservation(&mut self, id: usize) -> u8 {
        let Some(reservation) = self.reservations.get(id) else {
            return 1;
        };
        if reservation.status != ReservationStatus::Reserved {
            return 2;
        }
        if self.precommit_log.append(id, reservation).is_err() {
            return 1;
        }
        let _ = self.reservations.set_status(id, ReservationStatus::Precommit);
        info!(id, "reservation precommitted");
        0
    }

    /// Legal only in `Precommit`. Inventory is not touched here — the
    /// decrement already happened at reserve time (§4.E).
    pub fn execute_reservation(&mut self, id: usize) -> u8 {
        let Some(reservation) = self.reservations.get(id) else {
            return 1;
        };
        if reservation.status != ReservationStatus::Precommit {
            return 2;
        }
        let _ = self.reservations.set_status(id, ReservationStatus::Committed);
        info!(id, "reservation committed");
        0
    }

    /// Legal in `Reserved` or `Precommit`. Returns reserved quantities to
    /// inventory (§4.E, P3: no release once `Committed`).
    pub fn cancel_reservation(&mut self, id: usize) -> u8 {
        let Some(reservation) = self.reservations.get(id) else {
            return 1;
        };
        match reservation.status {
            ReservationStatus::Reserved | ReservationStatus::Precommit => {
                for (symbol, qty) in reservation.stocks.clone() {
                    self.inventory.release(&symbol, qty);
                }
                let _ = self.reservations.set_status(id, ReservationStatus::Cancelled);
                info!(id, "reservation cancelled");
                0
            }
            ReservationStatus::Committed | ReservationStatus::Cancelled => 2,
        }
    }

    /// The 3PC safety rule (§4.E): `Reserved` times out to cancel,
    /// `Precommit` times out to commit. Any other state is a stale timer
    /// fire and is a no-op. Returns the resulting status if one of the
    /// two transitions fired.
    pub fn on_timeout(&mut self, id: usize) -> Option<ReservationStatus> {
        match self.reservations.status(id)? {
            ReservationStatus::Reserved => {
                self.cancel_reservation(id);
                Some(ReservationStatus::Cancelled)
            }
            ReservationStatus::Precommit => {
                self.execute_reservation(id);
                Some(ReservationStatus::Committed)
            }
            ReservationStatus::Committed | ReservationStatus::Cancelled => None,
        }
    }

    /// Read the durable pre-commit log in full and rebuild a `Precommit`
    /// reservation for every record found — these represent reservations
    /// that were precommitted when the process died (§9 Open Question
    /// resolved). Stocks are not re-decremented since they were already
    /// decremented before the original `precommit_reservation` call.
    /// Returns the ids that need a fresh `RESERVATION_TIMEOUT` armed so
    /// the timeout-executes-on-precommit rule still applies.
    pub fn recover(&mut self) -> std::io::Result<Vec<usize>> {
        let records = self.precommit_log.recover()?;
        let mut recovered_ids = Vec::new();
        for (id, mut reservation) in records {
            reservation.status = ReservationStatus::Precommit;
            self.reservations.restore_at(id, reservation);
            recovered_ids.push(id);
        }
        if !recovered_ids.is_empty() {
            info!(count = recovered_ids.len(), "recovered precommitted reservations from durable log");
        }
        Ok(recovered_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::JsonFileInventory;
    use crate::precommit_log::JsonLinesLog;

    fn participant() -> (Participant, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonLinesLog::open(dir.path().join("pc.jsonl")).unwrap();
        let inventory = JsonFileInventory::empty().seed("AAPL", 50).seed("MSFT", 75);
        (Participant::new(Box::new(inventory), Box::new(log)), dir)
    }

    #[test]
    fn reserve_stocks_rolls_back_partial_decrements_on_shortfall() {
        let (mut p, _dir) = participant();
        let id = p.reserve_stocks(HashMap::from([
            ("AAPL".to_string(), 10),
            ("MSFT".to_string(), 1000),
        ]));
        assert_eq!(id, RESERVE_FAILED);
        assert_eq!(p.inventory_mut().available("AAPL"), Some(50));
        assert_eq!(p.inventory_mut().available("MSFT"), Some(75));
    }

    #[test]
    fn full_lifecycle_commit_does_not_touch_inventory_again() {
        let (mut p, _dir) = participant();
        let id = p.reserve_stocks(HashMap::from([("AAPL".to_string(), 10)]));
        assert!(id >= 0);
        let id = id as usize;
        assert_eq!(p.inventory_mut().available("AAPL"), Some(40));
        assert_eq!(p.precommit_reservation(id), 0);
        assert_eq!(p.execute_reservation(id), 0);
        assert_eq!(p.inventory_mut().available("AAPL"), Some(40));
        assert_eq!(p.reservations.status(id), Some(ReservationStatus::Committed));
    }

    #[test]
    fn cancel_after_commit_does_not_release_inventory() {
        let (mut p, _dir) = participant();
        let id = p.reserve_stocks(HashMap::from([("AAPL".to_string(), 10)])) as usize;
        p.precommit_reservation(id);
        p.execute_reservation(id);
        let code = p.cancel_reservation(id);
        assert_eq!(code, 2);
        assert_eq!(p.inventory_mut().available("AAPL"), Some(40));
    }

    #[test]
    fn timeout_while_reserved_cancels() {
        let (mut p, _dir) = participant();
        let id = p.reserve_stocks(HashMap::from([("AAPL".to_string(), 10)])) as usize;
        let result = p.on_timeout(id);
        assert_eq!(result, Some(ReservationStatus::Cancelled));
        assert_eq!(p.inventory_mut().available("AAPL"), Some(50));
    }

    #[test]
    fn timeout_while_precommit_commits() {
        let (mut p, _dir) = participant();
        let id = p.reserve_stocks(HashMap::from([("AAPL".to_string(), 10)])) as usize;
        p.precommit_reservation(id);
        let result = p.on_timeout(id);
        assert_eq!(result, Some(ReservationStatus::Committed));
    }

    #[test]
    fn timeout_on_terminal_state_is_a_no_op() {
        let (mut p, _dir) = participant();
        let id = p.reserve_stocks(HashMap::from([("AAPL".to_string(), 10)])) as usize;
        p.cancel_reservation(id);
        assert_eq!(p.on_timeout(id), None);
    }

    #[test]
    fn recover_rebuilds_precommit_reservations_from_durable_log() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("pc.jsonl");
        {
            let log = JsonLinesLog::open(&log_path).unwrap();
            let inventory = JsonFileInventory::empty().seed("AAPL", 50);
            let mut p = Participant::new(Box::new(inventory), Box::new(log));
            let id = p.reserve_stocks(HashMap::from([("AAPL".to_string(), 10)])) as usize;
            p.precommit_reservation(id);
            // process "dies" here, log has one precommit record.
        }

        let log = JsonLinesLog::open(&log_path).unwrap();
        let inventory = JsonFileInventory::empty(); // fresh process, no decrement redone
        let mut p = Participant::new(Box::new(inventory), Box::new(log));
        let recovered = p.recover().unwrap();
        assert_eq!(recovered, vec![0]);
        assert_eq!(p.reservations.status(0), Some(ReservationStatus::Precommit));
    }
}
