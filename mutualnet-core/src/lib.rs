//! Mutualnet Core
//!
//! Runtime-agnostic building blocks shared by the registration directory
//! and exchange node binaries:
//! - Wire format / message catalogue (`message`)
//! - Framed one-shot transport with retry-with-backoff (`transport`)
//! - Exponential backoff state machine (`backoff`)
//! - Dedup table for the overlay's `check_message` (`dedup`)
//! - Timer service that feeds synthetic events back into a node's single
//!   processor FIFO rather than mutating state off-thread (`timer`)
//! - Error types (`error`)

pub mod backoff;
pub mod dedup;
pub mod error;
pub mod message;
pub mod timer;
pub mod transport;

pub mod prelude {
    pub use crate::backoff::BackoffState;
    pub use crate::dedup::DedupTable;
    pub use crate::error::{MutualNetError, Result};
    pub use crate::message::{LogicalDate, Message, PeerInfo, SuperPeerEntry, TradeResult};
    pub use crate::timer::{TimerService, PAXOS_PHASE_TIMEOUT, RESERVATION_TIMEOUT};
    pub use crate::transport::{self, Inbound, ReplySender};
}
