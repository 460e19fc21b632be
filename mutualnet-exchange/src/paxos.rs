//! Single-decree Paxos election core (§4.D, component D).
//!
//! Runs across the peers of one region to pick a new super-peer when the
//! current one is unreachable. The acceptor half (`Acceptor`) is a pure
//! state machine so it can be unit-tested without networking; the
//! proposer half (`run_election`) drives the actual two-phase broadcast
//! and is necessarily async (it fans out `Prepare`/`Accept` over the
//! transport and collects replies within a fixed window).
//!
//! Wire-table note: the distilled spec's `Promise`/`Accepted` carry only
//! a bare `accepted: Option<seq>`, which is not enough for the proposer's
//! phase-2 tie-break rule ("the one whose promise carried the highest
//! non-null accepted") to recover *which candidate* that seq belonged to.
//! This implementation adds `accepted_name` alongside it (see
//! `mutualnet_core::message::Message::Promise`) and, symmetrically, reads
//! `Accept`'s `name`/`port_num` fields as the *candidate* being proposed
//! (the value), not the sender's own identity — the sender's identity is
//! not needed in-band since replies travel back over the same one-shot
//! connection. Recorded as a resolved ambiguity in DESIGN.md.

use std::collections::HashMap;
use std::time::Duration;

use mutualnet_core::message::{Message, PeerInfo};
use mutualnet_core::timer::PAXOS_PHASE_TIMEOUT;
use tracing::{debug, info};

/// Acceptor-side state for one region's Paxos instance. A node running as
/// a peer participates as an acceptor regardless of whether it is also
/// acting as a proposer this round.
#[derive(Debug, Default)]
pub struct Acceptor {
    local_promise: Option<u64>,
    accepted: Option<(u64, String, u16)>,
}

impl Acceptor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `seq > local_promise` (§4.D Phase 1); on acceptance, sets
    /// `local_promise := seq` and echoes whatever was previously
    /// accepted.
    pub fn on_prepare(&mut self, seq: u64) -> Option<(Option<u64>, Option<String>, Option<u16>)> {
        if self.local_promise.is_some_and(|lp| seq <= lp) {
            return None;
        }
        self.local_promise = Some(seq);
        Some(match &self.accepted {
            Some((s, n, p)) => (Some(*s), Some(n.clone()), Some(*p)),
            None => (None, None, None),
        })
    }

    /// `local_promise == seq` (§4.D Phase 2).
    pub fn on_accept(&mut self, seq: u64, candidate_name: String, candidate_port: u16) -> bool {
        if self.local_promise != Some(seq) {
            return false;
        }
        self.accepted = Some((seq, candidate_name, candidate_port));
        true
    }
}

/// Outcome of a completed election attempt from the proposer's point of
/// view (§4.D Phase 3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionOutcome {
    pub winner_name: String,
    pub winner_port: u16,
    pub is_self: bool,
}

/// `count` is a majority of `total` using strict-majority semantics
/// (`> total / 2`), fixing the source's `>= total / 2` off-by-one that
/// admits split brain on even-sized regions (REDESIGN FLAG, §9).
#[must_use]
pub fn is_majority(count: usize, total: usize) -> bool {
    count * 2 > total
}

/// Proposal number: `election_num * 100 + peer_num`, guaranteeing
/// uniqueness and giving higher `election_num`/`peer_num` precedence
/// (§4.D).
#[must_use]
pub const fn proposal_seq(elec_num: u64, peer_num: u32) -> u64 {
    elec_num * 100 + peer_num as u64
}

/// Drives one full election attempt as proposer. `peers` is this node's
/// known peer list (received via `PeerListUpdate`, §4.C), NOT including
/// self. Returns `None` if no majority was reached in either phase — a
/// failed attempt simply leaves the region leaderless until a new
/// trigger occurs (§4.D).
pub async fn run_election(
    self_name: &str,
    self_port: u16,
    self_region: u8,
    elec_num: u64,
    peer_num: u32,
    peers: &HashMap<String, PeerInfo>,
    peer_host: &str,
) -> Option<ElectionOutcome> {
    let seq = proposal_seq(elec_num, peer_num);
    info!(self_name, seq, peers = peers.len(), "starting Paxos election");

    let prepare = Message::Prepare {
        group: self_region,
        name: self_name.to_string(),
        port_num: self_port,
        seq,
        elec_num,
    };
    let promises = broadcast_and_collect(peers, peer_host, &prepare).await;
    if !is_majority(promises.len(), peers.len()) {
        debug!(self_name, got = promises.len(), total = peers.len(), "no Prepare majority");
        return None;
    }

    let mut best: Option<(u64, String, u16)> = None;
    for reply in &promises {
        if let Message::Promise {
            accepted: Some(accepted_seq),
            accepted_name: Some(name),
            port_num,
            ..
        } = reply
        {
            if best.as_ref().map_or(true, |(best_seq, ..)| accepted_seq > best_seq) {
                best = Some((*accepted_seq, name.clone(), *port_num));
            }
        }
    }
    let (candidate_name, candidate_port) = match best {
        Some((_, name, port)) => (name, port),
        None => (self_name.to_string(), self_port),
    };

    let accept = Message::Accept {
        group: self_region,
        name: candidate_name.clone(),
        port_num: candidate_port,
        seq,
        elec_num,
    };
    let accepteds = broadcast_and_collect(peers, peer_host, &accept).await;
    if !is_majority(accepteds.len(), peers.len()) {
        debug!(self_name, got = accepteds.len(), total = peers.len(), "no Accept majority");
        return None;
    }

    info!(self_name, winner = %candidate_name, "Paxos election settled");
    Some(ElectionOutcome {
        is_self: candidate_name == self_name,
        winner_name: candidate_name,
        winner_port: candidate_port,
    })
}

/// Fan a message out to every peer and collect replies for up to
/// `PAXOS_PHASE_TIMEOUT` (§4.D "each phase uses a fixed 5-second
/// window"). Ends early once every peer has replied or failed.
async fn broadcast_and_collect(
    peers: &HashMap<String, PeerInfo>,
    host: &str,
    msg: &Message,
) -> Vec<Message> {
    let (tx, rx) = flume::unbounded();
    for info in peers.values() {
        let tx = tx.clone();
        let msg = msg.clone();
        let host = host.to_string();
        let port = info.port;
        compio::runtime::spawn(async move {
            if let Ok(Some(reply)) =
                mutualnet_core::transport::send(&host, port, &msg, true, Duration::from_secs(1), 0).await
            {
                let _ = tx.send_async(reply).await;
            }
        })
        .detach();
    }
    drop(tx);

    let mut out = Vec::new();
    let _ = compio::time::timeout(PAXOS_PHASE_TIMEOUT, async {
        while let Ok(msg) = rx.recv_async().await {
            out.push(msg);
        }
    })
    .await;
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_majority_rejects_exact_half() {
        assert!(!is_majority(2, 4));
        assert!(is_majority(3, 4));
        assert!(is_majority(2, 3));
    }

    #[test]
    fn acceptor_promises_only_increasing_seq() {
        let mut a = Acceptor::new();
        assert!(a.on_prepare(100).is_some());
        assert!(a.on_prepare(50).is_none());
        assert!(a.on_prepare(150).is_some());
    }

    #[test]
    fn acceptor_accepts_only_matching_promised_seq() {
        let mut a = Acceptor::new();
        a.on_prepare(100);
        assert!(!a.on_accept(99, "ExA".into(), 9000));
        assert!(a.on_accept(100, "ExA".into(), 9000));
    }

    #[test]
    fn promise_then_accept_round_trip_echoes_accepted_value() {
        let mut a = Acceptor::new();
        a.on_prepare(100);
        a.on_accept(100, "ExA".into(), 9000);
        let (seq, name, port) = a.on_prepare(200).unwrap();
        assert_eq!(seq, Some(100));
        assert_eq!(name, Some("ExA".to_string()));
        assert_eq!(port, Some(9000));
    }
}
