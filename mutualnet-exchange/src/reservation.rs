//! Reservation state machine (§3 "Reservation", §4.E).
//!
//! ```text
//!           reserve_stocks OK
//!   ∅  ──────────────────────►  Reserved
//!                                 │  precommit_reservation
//!                                 ▼
//!                              Precommit ─── execute ──► Committed (terminal)
//!           cancel_reservation   │
//!   Reserved ─────────────────►  Cancelled (terminal)
//!           cancel or abort
//!   Precommit ────────────────►  Cancelled (terminal)
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    Reserved,
    Precommit,
    Committed,
    Cancelled,
}

/// A single reservation record. Its id is its 0-based position in the
/// participant's append-only reservation log (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub status: ReservationStatus,
    pub stocks: HashMap<String, u32>,
}

impl Reservation {
    #[must_use]
    pub const fn new(stocks: HashMap<String, u32>) -> Self {
        Self {
            status: ReservationStatus::Reserved,
            stocks,
        }
    }
}

/// Error codes returned by the 3PC participant's state transitions,
/// distinct per failure mode so the coordinator can tell them apart
/// (§7 "Wrong-state transition").
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("unknown reservation id")]
    UnknownId,
    #[error("reservation is not in the expected state")]
    WrongState,
    #[error("durable log write failed")]
    LogWriteFailed,
}

/// Append-only log of reservations owned by one participant. The id of a
/// reservation is its index (§3).
#[derive(Debug, Default)]
pub struct ReservationLog {
    entries: Vec<Reservation>,
}

impl ReservationLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, reservation: Reservation) -> usize {
        self.entries.push(reservation);
        self.entries.len() - 1
    }

    /// Re-insert a recovered reservation at a specific id (used when
    /// rebuilding state from the durable pre-commit log on startup, §9
    /// Open Question). Pads with already-`Cancelled` placeholders if the
    /// log has gaps, which should not normally happen.
    pub fn restore_at(&mut self, id: usize, reservation: Reservation) {
        while self.entries.len() <= id {
            self.entries.push(Reservation {
                status: ReservationStatus::Cancelled,
                stocks: HashMap::new(),
            });
        }
        self.entries[id] = reservation;
    }

    #[must_use]
    pub fn get(&self, id: usize) -> Option<&Reservation> {
        self.entries.get(id)
    }

    #[must_use]
    pub fn status(&self, id: usize) -> Option<ReservationStatus> {
        self.entries.get(id).map(|r| r.status)
    }

    pub fn set_status(&mut self, id: usize, status: ReservationStatus) -> Result<(), TransitionError> {
        let entry = self.entries.get_mut(id).ok_or(TransitionError::UnknownId)?;
        entry.status = status;
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_assigns_sequential_ids() {
        let mut log = ReservationLog::new();
        let a = log.push(Reservation::new(HashMap::new()));
        let b = log.push(Reservation::new(HashMap::new()));
        assert_eq!(a, 0);
        assert_eq!(b, 1);
    }

    #[test]
    fn set_status_on_unknown_id_errors() {
        let mut log = ReservationLog::new();
        assert_eq!(
            log.set_status(0, ReservationStatus::Committed),
            Err(TransitionError::UnknownId)
        );
    }
}
