//! Wire format: every message is a single JSON object tagged by an `action`
//! field (SPEC_FULL.md §6). This module defines the full action catalogue
//! as one internally-tagged enum plus the small value types it carries.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// `(year, month, day)` as broadcast by the registration directory's
/// logical clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalDate {
    pub year: i32,
    pub month: u8,
    pub day: u8,
}

impl LogicalDate {
    #[must_use]
    pub const fn new(year: i32, month: u8, day: u8) -> Self {
        Self { year, month, day }
    }
}

/// An entry in a super-peer's peer list: `name -> {port, peer_num}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub port: u16,
    pub peer_num: u32,
}

/// An entry describing one region's active super-peer, as carried by
/// `QueryAck`, `Election`, and `SuperpeerListUpdate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperPeerEntry {
    pub group: u8,
    pub name: String,
    #[serde(rename = "portNum")]
    pub port_num: u16,
    #[serde(rename = "elecNum")]
    pub elec_num: u64,
}

/// Outcome reported to the client in `TradeMFAck`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeResult {
    #[serde(rename = "OK")]
    Ok,
    Timeout,
    Fail,
}

/// Sentinel used on the wire for "no reservation" / "failed leg".
pub const FAILED_RESERVATION: i64 = -1;

/// The full wire action catalogue. Tagged internally by `action` so that
/// `{"action": "Register", ...}` round-trips directly to/from
/// `Message::Register { .. }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum Message {
    Register {
        group: u8,
        name: String,
        #[serde(rename = "portNum")]
        port_num: u16,
    },
    #[serde(rename = "RegisterOK")]
    RegisterOk {
        #[serde(rename = "portNum")]
        port_num: u16,
        #[serde(rename = "peerNum")]
        peer_num: u32,
        #[serde(rename = "elecNum")]
        elec_num: u64,
    },
    #[serde(rename = "RegisterURSuper")]
    RegisterUrSuper {
        #[serde(rename = "elecNum")]
        elec_num: u64,
    },
    /// Announces (or requests) a new elected super-peer for a region.
    /// Sent by a Paxos winner to the directory, and echoed back by the
    /// directory as a diagnostic on rejection (see `Message::ElectionRejected`).
    Election {
        group: u8,
        name: String,
        #[serde(rename = "portNum")]
        port_num: u16,
        #[serde(rename = "elecNum")]
        elec_num: u64,
    },
    /// Diagnostic reply from the directory when an `Election` claim is
    /// stale or fails the liveness probe.
    ElectionRejected {
        reason: String,
    },
    Query {
        group: u8,
    },
    QueryAck {
        #[serde(rename = "superPeers")]
        super_peers: Vec<SuperPeerEntry>,
    },
    TimeUpdate {
        #[serde(rename = "serverDate")]
        server_date: LogicalDate,
        #[serde(rename = "serverTime")]
        server_time: u8,
    },
    PeerListUpdate {
        peer_list: HashMap<String, PeerInfo>,
    },
    SuperpeerListUpdate {
        superpeer_list: HashMap<String, SuperPeerEntry>,
    },
    Prepare {
        group: u8,
        name: String,
        #[serde(rename = "portNum")]
        port_num: u16,
        seq: u64,
        #[serde(rename = "elecNum")]
        elec_num: u64,
    },
    Promise {
        group: u8,
        name: String,
        #[serde(rename = "portNum")]
        port_num: u16,
        seq: u64,
        #[serde(rename = "elecNum")]
        elec_num: u64,
        accepted: Option<u64>,
        /// Candidate name tied to `accepted`'s seq, if any. Not in the
        /// distilled wire table (which only echoes a bare seq), but
        /// needed for the proposer's phase-2 tie-break rule (§4.D) to be
        /// well-defined rather than re-deriving a name from
        /// `seq % 100 == peer_num` via a possibly-stale peer list.
        accepted_name: Option<String>,
    },
    Accept {
        group: u8,
        name: String,
        #[serde(rename = "portNum")]
        port_num: u16,
        seq: u64,
        #[serde(rename = "elecNum")]
        elec_num: u64,
    },
    Accepted {
        group: u8,
        name: String,
        #[serde(rename = "portNum")]
        port_num: u16,
        seq: u64,
        #[serde(rename = "elecNum")]
        elec_num: u64,
        accepted: Option<u64>,
        accepted_name: Option<String>,
    },
    /// A routed envelope. `path` accumulates the names of hops already
    /// traversed (for super-peer flood dedup); `msg_num` is absent for
    /// client-originated envelopes (always accepted, §4.C).
    Route {
        orig: String,
        dest: String,
        path: Vec<String>,
        #[serde(rename = "msgNum")]
        msg_num: Option<u64>,
        #[serde(rename = "sendTime")]
        send_time: u64,
        payload: Box<Message>,
    },
    #[serde(rename = "TradeMF")]
    TradeMf {
        data: String,
        qty: u32,
    },
    #[serde(rename = "TradeMFAck")]
    TradeMfAck {
        result: TradeResult,
        order_number: u64,
    },
    #[serde(rename = "reserve")]
    Reserve {
        stocks: HashMap<String, u32>,
        order_number: u64,
    },
    #[serde(rename = "reserve_ack")]
    ReserveAck {
        reservation_number: i64,
        order_number: u64,
    },
    #[serde(rename = "precommit")]
    Precommit {
        reservation_number: i64,
        order_number: u64,
    },
    #[serde(rename = "precommit_ack")]
    PrecommitAck {
        reservation_number: i64,
        order_number: u64,
    },
    #[serde(rename = "commit")]
    Commit {
        reservation_number: i64,
    },
    #[serde(rename = "cancel_reservation")]
    CancelReservation {
        reservation_number: i64,
    },
    #[serde(rename = "cancel_precommit")]
    CancelPrecommit {
        reservation_number: i64,
    },
}

impl Message {
    /// The `action` discriminant as sent on the wire, for log correlation.
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            Self::Register { .. } => "Register",
            Self::RegisterOk { .. } => "RegisterOK",
            Self::RegisterUrSuper { .. } => "RegisterURSuper",
            Self::Election { .. } => "Election",
            Self::ElectionRejected { .. } => "ElectionRejected",
            Self::Query { .. } => "Query",
            Self::QueryAck { .. } => "QueryAck",
            Self::TimeUpdate { .. } => "TimeUpdate",
            Self::PeerListUpdate { .. } => "PeerListUpdate",
            Self::SuperpeerListUpdate { .. } => "SuperpeerListUpdate",
            Self::Prepare { .. } => "Prepare",
            Self::Promise { .. } => "Promise",
            Self::Accept { .. } => "Accept",
            Self::Accepted { .. } => "Accepted",
            Self::Route { .. } => "Route",
            Self::TradeMf { .. } => "TradeMF",
            Self::TradeMfAck { .. } => "TradeMFAck",
            Self::Reserve { .. } => "reserve",
            Self::ReserveAck { .. } => "reserve_ack",
            Self::Precommit { .. } => "precommit",
            Self::PrecommitAck { .. } => "precommit_ack",
            Self::Commit { .. } => "commit",
            Self::CancelReservation { .. } => "cancel_reservation",
            Self::CancelPrecommit { .. } => "cancel_precommit",
        }
    }
}
