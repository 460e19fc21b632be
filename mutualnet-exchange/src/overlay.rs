//! Overlay node (§4.C, component C): peer/super-peer role, peer and
//! super-peer lists, and the `Route` forwarding decision. Kept as a pure
//! state/decision bundle — `Node` performs the actual sends the decisions
//! call for.

use std::collections::HashMap;

use mutualnet_core::dedup::DedupTable;
use mutualnet_core::message::{PeerInfo, SuperPeerEntry};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Peer,
    SuperPeer,
}

/// What the owning `Node` should do with a `Route` envelope whose `dest`
/// isn't resolved to "deliver locally" (§4.C).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteAction {
    DeliverLocal,
    /// Self is super-peer and `dest` is one of its peers.
    ForwardToPeer { port: u16 },
    /// Self is super-peer; flood to every super-peer not already in the
    /// envelope's `path` (loop-free flooding across the backbone).
    FloodToSuperPeers { targets: Vec<(String, u16)> },
    /// Self is a peer with a known, presumed-live super-peer.
    ForwardToSuperPeer { port: u16 },
    /// Self is a peer whose super-peer is unknown/unreachable: trigger
    /// Paxos election (§4.D) before retrying.
    TriggerElection,
}

pub struct OverlayNode {
    pub name: String,
    pub region: u8,
    pub listen_port: u16,
    pub role: Role,
    pub peer_num: Option<u32>,
    pub elec_num: u64,
    /// `(name, port)` of this peer's current super-peer, once known.
    pub super_peer: Option<(String, u16)>,
    msg_seq: u64,
    next_peer_num: u32,
    peer_list: HashMap<String, PeerInfo>,
    superpeer_list: HashMap<String, SuperPeerEntry>,
    dedup: DedupTable,
}

impl OverlayNode {
    #[must_use]
    pub fn new(name: impl Into<String>, region: u8, listen_port: u16) -> Self {
        Self {
            name: name.into(),
            region,
            listen_port,
            role: Role::Peer,
            peer_num: None,
            elec_num: 0,
            super_peer: None,
            msg_seq: 0,
            next_peer_num: 0,
            peer_list: HashMap::new(),
            superpeer_list: HashMap::new(),
            dedup: DedupTable::new(),
        }
    }

    pub fn next_msg_seq(&mut self) -> u64 {
        self.msg_seq += 1;
        self.msg_seq
    }

    /// `check_message` (§4.C): drop if `(orig, msg_num)` was already seen.
    pub fn check_message(&mut self, orig: &str, msg_num: Option<u64>) -> bool {
        self.dedup.check_and_record(orig, msg_num)
    }

    /// `RegisterURSuper` handling (§4.C): promote self, starting with an
    /// empty peer set.
    pub fn promote_to_super(&mut self, elec_num: u64) {
        self.role = Role::SuperPeer;
        self.elec_num = elec_num;
        self.peer_list.clear();
        self.next_peer_num = 0;
        info!(name = %self.name, region = self.region, elec_num, "promoted to super-peer");
    }

    /// `RegisterOK` handling for a peer (§4.C).
    pub fn apply_register_ok(&mut self, super_name: String, super_port: u16, peer_num: u32, elec_num: u64) {
        self.super_peer = Some((super_name, super_port));
        self.peer_num = Some(peer_num);
        self.elec_num = elec_num;
    }

    /// Super-peer servicing an inbound `Register` (§4.C): assigns the
    /// next `peer_num` and records the peer.
    pub fn register_peer(&mut self, name: String, port: u16) -> u32 {
        let peer_num = self.next_peer_num;
        self.next_peer_num += 1;
        self.peer_list.insert(name, PeerInfo { port, peer_num });
        peer_num
    }

    /// Network-failure path (§7): strip an unreachable peer so the
    /// updated list can be rebroadcast.
    pub fn remove_peer(&mut self, name: &str) {
        self.peer_list.remove(name);
    }

    pub fn remove_superpeer(&mut self, name: &str) {
        self.superpeer_list.remove(name);
    }

    #[must_use]
    pub fn peer_list(&self) -> &HashMap<String, PeerInfo> {
        &self.peer_list
    }

    #[must_use]
    pub fn superpeer_list(&self) -> &HashMap<String, SuperPeerEntry> {
        &self.superpeer_list
    }

    pub fn apply_superpeer_list(&mut self, list: HashMap<String, SuperPeerEntry>) {
        self.superpeer_list = list;
    }

    pub fn apply_peer_list(&mut self, list: HashMap<String, PeerInfo>) {
        self.peer_list = list;
    }

    pub fn upsert_superpeer(&mut self, entry: SuperPeerEntry) {
        self.superpeer_list.insert(entry.name.clone(), entry);
    }

    /// The routing decision for a `Route` envelope whose `dest` isn't
    /// `self.name` (§4.C).
    #[must_use]
    pub fn route(&self, dest: &str, path: &[String]) -> RouteAction {
        if dest == self.name {
            return RouteAction::DeliverLocal;
        }
        match self.role {
            Role::SuperPeer => {
                if let Some(info) = self.peer_list.get(dest) {
                    return RouteAction::ForwardToPeer { port: info.port };
                }
                let targets = self
                    .superpeer_list
                    .values()
                    .filter(|sp| sp.name != self.name && !path.contains(&sp.name))
                    .map(|sp| (sp.name.clone(), sp.port_num))
                    .collect();
                RouteAction::FloodToSuperPeers { targets }
            }
            Role::Peer => match &self.super_peer {
                Some((_, port)) => RouteAction::ForwardToSuperPeer { port: *port },
                None => RouteAction::TriggerElection,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn super_peer_forwards_to_known_local_peer() {
        let mut node = OverlayNode::new("SuperA", 0, 9000);
        node.role = Role::SuperPeer;
        node.register_peer("ExA".into(), 9100);
        match node.route("ExA", &[]) {
            RouteAction::ForwardToPeer { port } => assert_eq!(port, 9100),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn super_peer_floods_unknown_dest_excluding_visited_path() {
        let mut node = OverlayNode::new("SuperA", 0, 9000);
        node.role = Role::SuperPeer;
        node.upsert_superpeer(SuperPeerEntry {
            group: 1,
            name: "SuperB".into(),
            port_num: 9001,
            elec_num: 0,
        });
        node.upsert_superpeer(SuperPeerEntry {
            group: 2,
            name: "SuperC".into(),
            port_num: 9002,
            elec_num: 0,
        });
        match node.route("ExZ", &["SuperB".to_string()]) {
            RouteAction::FloodToSuperPeers { targets } => {
                assert_eq!(targets, vec![("SuperC".to_string(), 9002)]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn peer_without_known_superpeer_triggers_election() {
        let node = OverlayNode::new("ExA", 0, 9100);
        assert_eq!(node.route("ExB", &[]), RouteAction::TriggerElection);
    }

    #[test]
    fn peer_with_superpeer_forwards_up() {
        let mut node = OverlayNode::new("ExA", 0, 9100);
        node.super_peer = Some(("SuperA".to_string(), 9000));
        assert_eq!(
            node.route("ExB", &[]),
            RouteAction::ForwardToSuperPeer { port: 9000 }
        );
    }

    #[test]
    fn dedup_drops_repeat_orig_seq() {
        let mut node = OverlayNode::new("ExA", 0, 9100);
        assert!(!node.check_message("ExB", Some(1)));
        assert!(node.check_message("ExB", Some(1)));
    }
}
