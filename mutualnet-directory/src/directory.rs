//! The registration directory (§4.B, component B).
//!
//! A singleton server maintaining one `SuperPeer` slot per region and the
//! shared logical clock. Serialized per-slot by a `parking_lot::Mutex`
//! rather than the node's single-FIFO-processor discipline (§5 "Shared
//! resources": "a simple mutex is acceptable" for the directory's table).

use mutualnet_core::message::{LogicalDate, Message, SuperPeerEntry};
use parking_lot::Mutex;
use tracing::info;

use crate::clock::ClockState;
use crate::liveness::LivenessProbe;

pub const NUM_REGIONS: usize = 6;

#[derive(Debug, Clone, Default)]
struct SuperPeerSlot {
    name: Option<String>,
    port: Option<u16>,
    election_count: u64,
}

impl SuperPeerSlot {
    const fn is_vacant(&self) -> bool {
        self.port.is_none()
    }
}

pub struct Directory<P: LivenessProbe> {
    slots: Mutex<[SuperPeerSlot; NUM_REGIONS]>,
    clock: Mutex<ClockState>,
    probe: P,
    probe_host: String,
}

impl<P: LivenessProbe> Directory<P> {
    pub fn new(probe: P, probe_host: impl Into<String>, initial_clock: ClockState) -> Self {
        Self {
            slots: Mutex::new(std::array::from_fn(|_| SuperPeerSlot::default())),
            clock: Mutex::new(initial_clock),
            probe,
            probe_host: probe_host.into(),
        }
    }

    fn valid_region(group: u8) -> bool {
        (group as usize) < NUM_REGIONS
    }

    /// `Register{region, name, port}` (§4.B).
    pub async fn register(&self, group: u8, name: &str, port: u16) -> Message {
        if !Self::valid_region(group) {
            return Message::ElectionRejected {
                reason: format!("unknown region {group}"),
            };
        }

        let snapshot = {
            let slots = self.slots.lock();
            slots[group as usize].clone()
        };

        if snapshot.port == Some(port) && snapshot.name.as_deref() == Some(name) {
            // Reclaim: the same node registering again (e.g. after a
            // transient directory restart).
            return Message::RegisterUrSuper {
                elec_num: snapshot.election_count,
            };
        }

        if snapshot.is_vacant() {
            let mut slots = self.slots.lock();
            let slot = &mut slots[group as usize];
            if slot.is_vacant() {
                slot.name = Some(name.to_string());
                slot.port = Some(port);
                slot.election_count = 0;
                info!(group, name, port, "claimed vacant super-peer slot");
                return Message::RegisterUrSuper { elec_num: 0 };
            }
            // Lost the race to another claimant between the snapshot and
            // the lock; fall through to the normal RegisterOK reply below
            // against whoever won.
            return Message::RegisterOk {
                port_num: slot.port.unwrap_or(port),
                peer_num: 0,
                elec_num: slot.election_count,
            };
        }

        let current_port = snapshot.port.unwrap();
        let alive = self.probe.probe(&self.probe_host, current_port).await;
        if !alive {
            let mut slots = self.slots.lock();
            let slot = &mut slots[group as usize];
            // Re-check: only steal the slot if it still matches what we
            // probed (optimistic concurrency; §5 accepts this simple
            // discipline for the directory).
            if slot.port == Some(current_port) {
                slot.name = Some(name.to_string());
                slot.port = Some(port);
                slot.election_count += 1;
                info!(group, name, port, elec_num = slot.election_count, "reclaimed dead super-peer slot");
                return Message::RegisterUrSuper {
                    elec_num: slot.election_count,
                };
            }
        }

        Message::RegisterOk {
            port_num: current_port,
            peer_num: 0,
            elec_num: snapshot.election_count,
        }
    }

    /// `Election{region, name, port, elec_num}` (§4.B): a Paxos winner
    /// announcing itself.
    pub async fn election(&self, group: u8, name: &str, port: u16, elec_num: u64) -> Message {
        if !Self::valid_region(group) {
            return Message::ElectionRejected {
                reason: format!("unknown region {group}"),
            };
        }
        let stored = {
            let slots = self.slots.lock();
            slots[group as usize].election_count
        };
        if elec_num <= stored {
            return Message::ElectionRejected {
                reason: format!("stale elec_num {elec_num} <= stored {stored}"),
            };
        }
        if !self.probe.probe(&self.probe_host, port).await {
            return Message::ElectionRejected {
                reason: "candidate failed liveness probe".to_string(),
            };
        }
        let mut slots = self.slots.lock();
        let slot = &mut slots[group as usize];
        slot.name = Some(name.to_string());
        slot.port = Some(port);
        slot.election_count = elec_num;
        info!(group, name, port, elec_num, "recorded elected super-peer");
        Message::Election {
            group,
            name: name.to_string(),
            port_num: port,
            elec_num,
        }
    }

    /// `Query{region}` (§4.B) — region is accepted but ignored; the reply
    /// always lists every region's current occupant, matching the wire
    /// contract `QueryAck{superPeers:[...]}`.
    pub fn query(&self, _group: u8) -> Message {
        let slots = self.slots.lock();
        let super_peers = slots
            .iter()
            .enumerate()
            .filter_map(|(region, slot)| {
                Some(SuperPeerEntry {
                    group: region as u8,
                    name: slot.name.clone()?,
                    port_num: slot.port?,
                    elec_num: slot.election_count,
                })
            })
            .collect();
        Message::QueryAck { super_peers }
    }

    /// Advance the logical clock by one tick (§4.B), returning the new
    /// `(date, hour)` to broadcast as `TimeUpdate`.
    pub fn advance_tick(&self) -> (LogicalDate, u8) {
        let mut clock = self.clock.lock();
        clock.advance();
        (clock.date, clock.hour)
    }

    /// Snapshot of every currently-occupied region, for broadcasting
    /// `TimeUpdate` to each live super-peer.
    pub fn active_super_peer_ports(&self) -> Vec<u16> {
        self.slots.lock().iter().filter_map(|s| s.port).collect()
    }
}
