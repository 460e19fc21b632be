//! The exchange node actor: wires `OverlayNode`, `paxos::Acceptor`,
//! `Coordinator`, and `Participant` behind one single-consumer FIFO (§5),
//! the way `monocoque`'s socket actors own their state behind one mailbox
//! rather than sharing it across tasks.
//!
//! Every event — an inbound connection, a fired reservation timer, a
//! fired order timer — funnels through [`NodeEvent`] and is handled by
//! exactly one `Node::handle_event` call at a time, giving the mutual
//! exclusion over reservation state, inventory, peer lists, and the
//! orders log that §5 calls for without any lock on those structures.

use std::collections::HashMap;
use std::time::Duration;

use mutualnet_core::message::Message;
use mutualnet_core::timer::{TimerService, RESERVATION_TIMEOUT};
use mutualnet_core::transport::{self, Inbound, ReplySender};
use tracing::{info, warn};

use crate::catalogue::FundCatalogue;
use crate::coordinator::{Coordinator, ReserveAckOutcome};
use crate::overlay::{OverlayNode, RouteAction};
use crate::paxos::{self, Acceptor};
use crate::participant::Participant;

/// Sentinel order number reported to a client whose `TradeMF` named an
/// unknown fund: the coordinator rejects synchronously without ever
/// allocating an order (§4.F step 1).
pub const UNKNOWN_FUND_ORDER: u64 = u64::MAX;

/// Everything that can land on a node's single processor FIFO: a decoded
/// inbound connection, or a timer firing back in from
/// `mutualnet_core::timer::TimerService` (§5, §9).
pub enum NodeEvent {
    Network(Inbound),
    ReservationTimeout(usize),
    OrderTimeout(u64),
}

pub struct Node {
    pub overlay: OverlayNode,
    paxos: Acceptor,
    coordinator: Coordinator,
    participant: Participant,
    catalogue: FundCatalogue,
    directory_host: String,
    directory_port: u16,
    peer_host: String,
    timers: TimerService<NodeEvent>,
    pending_trade_replies: HashMap<u64, ReplySender>,
    election_attempt: u64,
}

impl Node {
    #[must_use]
    pub fn new(
        overlay: OverlayNode,
        participant: Participant,
        catalogue: FundCatalogue,
        directory_host: String,
        directory_port: u16,
        peer_host: String,
        timers: TimerService<NodeEvent>,
    ) -> Self {
        Self {
            overlay,
            paxos: Acceptor::new(),
            coordinator: Coordinator::new(),
            participant,
            catalogue,
            directory_host,
            directory_port,
            peer_host,
            timers,
            pending_trade_replies: HashMap::new(),
            election_attempt: 0,
        }
    }

    /// Read the durable pre-commit log and arm a fresh timeout for every
    /// reservation it recovers (§9 Open Question resolved).
    pub fn recover(&mut self) -> std::io::Result<()> {
        for id in self.participant.recover()? {
            self.timers.arm(RESERVATION_TIMEOUT, NodeEvent::ReservationTimeout(id));
        }
        Ok(())
    }

    /// Register with the directory at startup (§4.C). Either learns the
    /// current super-peer and registers with it directly to obtain a
    /// `peer_num`, or is told to promote itself and gossips the
    /// super-peer list it then queries for.
    pub async fn bootstrap(&mut self) {
        let reply = transport::send(
            &self.directory_host,
            self.directory_port,
            &Message::Register {
                group: self.overlay.region,
                name: self.overlay.name.clone(),
                port_num: self.overlay.listen_port,
            },
            true,
            Duration::from_secs(2),
            2,
        )
        .await;

        match reply {
            Ok(Some(Message::RegisterUrSuper { elec_num })) => {
                self.overlay.promote_to_super(elec_num);
                self.query_and_gossip_superpeers().await;
            }
            Ok(Some(Message::RegisterOk { port_num, .. })) => {
                self.join_super_peer(port_num).await;
            }
            Ok(other) => warn!(?other, "unexpected directory reply during bootstrap"),
            Err(e) => warn!(error = %e, "failed to register with directory"),
        }
    }

    async fn join_super_peer(&mut self, super_port: u16) {
        let reply = transport::send(
            &self.peer_host,
            super_port,
            &Message::Register {
                group: self.overlay.region,
                name: self.overlay.name.clone(),
                port_num: self.overlay.listen_port,
            },
            true,
            Duration::from_secs(2),
            2,
        )
        .await;
        match reply {
            Ok(Some(Message::RegisterOk { peer_num, elec_num, .. })) => {
                self.overlay
                    .apply_register_ok(format!("super@{super_port}"), super_port, peer_num, elec_num);
                info!(super_port, peer_num, elec_num, "joined super-peer");
            }
            Ok(other) => warn!(?other, "unexpected super-peer reply"),
            Err(e) => warn!(error = %e, super_port, "failed to register with super-peer"),
        }
    }

    async fn query_and_gossip_superpeers(&mut self) {
        let reply = transport::send(
            &self.directory_host,
            self.directory_port,
            &Message::Query { group: self.overlay.region },
            true,
            Duration::from_secs(2),
            1,
        )
        .await;
        let Ok(Some(Message::QueryAck { super_peers })) = reply else {
            warn!("failed to query directory for super-peer list after promotion");
            return;
        };
        let map = super_peers.into_iter().map(|e| (e.name.clone(), e)).collect::<HashMap<_, _>>();
        self.overlay.apply_superpeer_list(map);
        let gossip = Message::SuperpeerListUpdate {
            superpeer_list: self.overlay.superpeer_list().clone(),
        };
        for entry in self.overlay.superpeer_list().values() {
            if entry.name == self.overlay.name {
                continue;
            }
            self.fire_and_forget(entry.port_num, gossip.clone());
        }
    }

    fn fire_and_forget(&self, port: u16, msg: Message) {
        let host = self.peer_host.clone();
        compio::runtime::spawn(async move {
            let _ = transport::send(&host, port, &msg, false, Duration::from_secs(2), 1).await;
        })
        .detach();
    }

    fn broadcast_peer_list(&self) {
        let update = Message::PeerListUpdate {
            peer_list: self.overlay.peer_list().clone(),
        };
        for info in self.overlay.peer_list().values() {
            self.fire_and_forget(info.port, update.clone());
        }
    }

    /// Deliver `payload` to `dest`: directly if `dest` is self, otherwise
    /// wrapped in a `Route` envelope and forwarded per the overlay's
    /// routing decision (§4.C).
    async fn deliver(&mut self, dest: &str, payload: Message) {
        if dest == self.overlay.name {
            self.handle_local_payload(self.overlay.name.clone(), payload, None).await;
            return;
        }
        let msg_num = self.overlay.next_msg_seq();
        let envelope = Message::Route {
            orig: self.overlay.name.clone(),
            dest: dest.to_string(),
            path: vec![self.overlay.name.clone()],
            msg_num: Some(msg_num),
            send_time: 0,
            payload: Box::new(payload),
        };
        self.forward(dest, envelope).await;
    }

    async fn forward(&mut self, dest: &str, envelope: Message) {
        let path: Vec<String> = match &envelope {
            Message::Route { path, .. } => path.clone(),
            _ => Vec::new(),
        };
        let action = self.overlay.route(dest, &path);
        match action {
            RouteAction::DeliverLocal => {
                if let Message::Route { orig, payload, .. } = envelope {
                    self.handle_local_payload(orig, *payload, None).await;
                }
            }
            RouteAction::ForwardToPeer { port } => {
                if transport::send(&self.peer_host, port, &envelope, false, Duration::from_secs(2), 1)
                    .await
                    .is_err()
                {
                    warn!(dest, port, "peer unreachable, dropping from peer list");
                    self.overlay.remove_peer(dest);
                    self.broadcast_peer_list();
                }
            }
            RouteAction::ForwardToSuperPeer { port } => {
                if transport::send(&self.peer_host, port, &envelope, false, Duration::from_secs(2), 1)
                    .await
                    .is_err()
                {
                    self.trigger_election_and_retry(dest, envelope).await;
                }
            }
            RouteAction::FloodToSuperPeers { targets } => {
                for (_, port) in targets {
                    self.fire_and_forget(port, envelope.clone());
                }
            }
            RouteAction::TriggerElection => {
                self.trigger_election_and_retry(dest, envelope).await;
            }
        }
    }

    /// §4.D Phase 3 plus §4.C's "trigger election and retry once after
    /// election settles".
    async fn trigger_election_and_retry(&mut self, dest: &str, envelope: Message) {
        self.election_attempt = self.overlay.elec_num + 1;
        let outcome = paxos::run_election(
            &self.overlay.name,
            self.overlay.listen_port,
            self.overlay.region,
            self.election_attempt,
            self.overlay.peer_num.unwrap_or(0),
            self.overlay.peer_list(),
            &self.peer_host,
        )
        .await;

        match outcome {
            Some(outcome) if outcome.is_self => {
                let reply = transport::send(
                    &self.directory_host,
                    self.directory_port,
                    &Message::Election {
                        group: self.overlay.region,
                        name: outcome.winner_name.clone(),
                        port_num: outcome.winner_port,
                        elec_num: self.election_attempt,
                    },
                    true,
                    Duration::from_secs(2),
                    1,
                )
                .await;
                match reply {
                    Ok(Some(Message::Election { elec_num, .. })) => {
                        self.overlay.promote_to_super(elec_num);
                    }
                    other => warn!(?other, "election announcement rejected"),
                }
                self.forward(dest, envelope).await;
            }
            Some(_) => {
                // Another peer won; wait for it to announce itself to the
                // directory (§4.D Phase 3). The retry below will find no
                // super-peer yet and may trigger a fresh attempt.
                self.forward(dest, envelope).await;
            }
            None => {
                warn!(region = self.overlay.region, "Paxos election failed to reach a majority");
            }
        }
    }

    /// The processor loop: drains `rx` and handles one event at a time.
    pub async fn run(mut self, rx: flume::Receiver<NodeEvent>) {
        while let Ok(event) = rx.recv_async().await {
            self.handle_event(event).await;
        }
    }

    pub async fn handle_event(&mut self, event: NodeEvent) {
        match event {
            NodeEvent::Network(inbound) => self.handle_inbound(inbound).await,
            NodeEvent::ReservationTimeout(id) => {
                self.participant.on_timeout(id);
            }
            NodeEvent::OrderTimeout(order_number) => self.handle_order_timeout(order_number).await,
        }
    }

    async fn handle_inbound(&mut self, inbound: Inbound) {
        let Inbound { message, reply } = inbound;
        match message {
            Message::Route {
                orig,
                dest,
                path,
                msg_num,
                send_time,
                payload,
            } => {
                if self.overlay.check_message(&orig, msg_num) {
                    return;
                }
                let action = self.overlay.route(&dest, &path);
                if matches!(action, RouteAction::DeliverLocal) {
                    self.handle_local_payload(orig, *payload, None).await;
                } else {
                    // §4.C: a super-peer forwarding into its own peer list
                    // annotates the hop with "(Super)"; every other
                    // re-forward (flooding to other super-peers, or a peer
                    // forwarding up to its own super-peer) records the bare
                    // name, matching what the flood loop-check compares
                    // super-peer names against.
                    let mut path = path;
                    if matches!(action, RouteAction::ForwardToPeer { .. }) {
                        path.push(format!("{} (Super)", self.overlay.name));
                    } else {
                        path.push(self.overlay.name.clone());
                    }
                    let envelope = Message::Route {
                        orig,
                        dest: dest.clone(),
                        path,
                        msg_num,
                        send_time,
                        payload,
                    };
                    self.forward(&dest, envelope).await;
                }
            }
            other => self.handle_local_payload("client".to_string(), other, reply).await,
        }
    }

    async fn handle_local_payload(&mut self, orig: String, payload: Message, reply: Option<ReplySender>) {
        match payload {
            Message::TradeMf { data, qty } => self.handle_trade_mf(data, qty, reply).await,
            Message::Register { name, port_num, .. } => {
                let peer_num = self.overlay.register_peer(name, port_num);
                if let Some(reply) = reply {
                    reply.send(Message::RegisterOk {
                        port_num: self.overlay.listen_port,
                        peer_num,
                        elec_num: self.overlay.elec_num,
                    });
                }
                self.broadcast_peer_list();
            }
            Message::Reserve { stocks, order_number } => {
                let reservation_number = self.participant.reserve_stocks(stocks);
                if reservation_number >= 0 {
                    self.timers.arm(
                        RESERVATION_TIMEOUT,
                        NodeEvent::ReservationTimeout(reservation_number as usize),
                    );
                }
                self.deliver(
                    &orig,
                    Message::ReserveAck {
                        reservation_number,
                        order_number,
                    },
                )
                .await;
            }
            Message::ReserveAck {
                reservation_number,
                order_number,
            } => self.handle_reserve_ack(order_number, orig, reservation_number).await,
            Message::Precommit {
                reservation_number,
                order_number,
            } => {
                let code = self.participant.precommit_reservation(reservation_number as usize);
                if code != 0 {
                    warn!(reservation_number, code, "precommit_reservation returned an error code");
                }
                self.deliver(
                    &orig,
                    Message::PrecommitAck {
                        reservation_number,
                        order_number,
                    },
                )
                .await;
            }
            Message::PrecommitAck { order_number, .. } => self.handle_precommit_ack(order_number, orig).await,
            Message::Commit { reservation_number } => {
                self.participant.execute_reservation(reservation_number as usize);
            }
            Message::CancelReservation { reservation_number } | Message::CancelPrecommit { reservation_number } => {
                self.participant.cancel_reservation(reservation_number as usize);
            }
            Message::TimeUpdate { server_date, server_time } => {
                let applied = self.participant.inventory_mut().apply_scheduled(server_date, server_time);
                if !applied.is_empty() {
                    info!(?applied, "scheduled issuance applied");
                }
                if self.overlay.role == crate::overlay::Role::SuperPeer {
                    let update = Message::TimeUpdate { server_date, server_time };
                    for info in self.overlay.peer_list().values() {
                        self.fire_and_forget(info.port, update.clone());
                    }
                }
            }
            Message::PeerListUpdate { peer_list } => self.overlay.apply_peer_list(peer_list),
            Message::SuperpeerListUpdate { superpeer_list } => self.overlay.apply_superpeer_list(superpeer_list),
            Message::Prepare { seq, elec_num, .. } => {
                if let Some((accepted, accepted_name, _)) = self.paxos.on_prepare(seq) {
                    if let Some(reply) = reply {
                        reply.send(Message::Promise {
                            group: self.overlay.region,
                            name: self.overlay.name.clone(),
                            port_num: self.overlay.listen_port,
                            seq,
                            elec_num,
                            accepted,
                            accepted_name,
                        });
                    }
                }
            }
            Message::Accept {
                group,
                name,
                port_num,
                seq,
                elec_num,
            } => {
                if self.paxos.on_accept(seq, name.clone(), port_num) {
                    if let Some(reply) = reply {
                        reply.send(Message::Accepted {
                            group,
                            name: name.clone(),
                            port_num,
                            seq,
                            elec_num,
                            accepted: Some(seq),
                            accepted_name: Some(name),
                        });
                    }
                }
            }
            other => warn!(action = other.action(), "node received an unexpected top-level action"),
        }
    }

    async fn handle_trade_mf(&mut self, fund: String, qty: u32, reply: Option<ReplySender>) {
        let Some(legs) = self.catalogue.expand(&fund, qty) else {
            if let Some(reply) = reply {
                reply.send(Message::TradeMfAck {
                    result: mutualnet_core::message::TradeResult::Fail,
                    order_number: UNKNOWN_FUND_ORDER,
                });
            }
            return;
        };
        let order_number = self.coordinator.create_order(fund, qty, legs.clone());
        if let Some(reply) = reply {
            self.pending_trade_replies.insert(order_number, reply);
        }
        self.timers.arm(RESERVATION_TIMEOUT, NodeEvent::OrderTimeout(order_number));

        for (exchange, stocks) in legs {
            if exchange == self.overlay.name {
                let reservation_number = self.participant.reserve_stocks(stocks);
                if reservation_number >= 0 {
                    self.timers.arm(
                        RESERVATION_TIMEOUT,
                        NodeEvent::ReservationTimeout(reservation_number as usize),
                    );
                }
                self.handle_reserve_ack(order_number, self.overlay.name.clone(), reservation_number)
                    .await;
            } else {
                self.deliver(&exchange, Message::Reserve { stocks, order_number }).await;
            }
        }
    }

    async fn handle_reserve_ack(&mut self, order_number: u64, exchange: String, reservation_number: i64) {
        match self.coordinator.record_reserve_ack(order_number, &exchange, reservation_number) {
            // §4.F: reuse the abort path's Timeout reply even though the
            // cause here is an invalid reservation ack, not an elapsed timer.
            ReserveAckOutcome::Invalid => self.abort_order(order_number, mutualnet_core::message::TradeResult::Timeout).await,
            ReserveAckOutcome::Pending => {}
            ReserveAckOutcome::AllReserved => {
                self.timers.arm(RESERVATION_TIMEOUT, NodeEvent::OrderTimeout(order_number));
                let Some(order) = self.coordinator.order(order_number) else { return };
                let legs = order.valid_legs();
                for (exchange, reservation_number) in legs {
                    if exchange == self.overlay.name {
                        let code = self.participant.precommit_reservation(reservation_number as usize);
                        if code != 0 {
                            warn!(order_number, code, "local precommit returned an error code");
                        }
                        self.handle_precommit_ack(order_number, self.overlay.name.clone()).await;
                    } else {
                        self.deliver(
                            &exchange,
                            Message::Precommit {
                                reservation_number,
                                order_number,
                            },
                        )
                        .await;
                    }
                }
            }
        }
    }

    async fn handle_precommit_ack(&mut self, order_number: u64, exchange: String) {
        if !self.coordinator.record_precommit_ack(order_number, exchange) {
            return;
        }
        let Some(order) = self.coordinator.order(order_number) else { return };
        for (exchange, reservation_number) in order.valid_legs() {
            if exchange == self.overlay.name {
                self.participant.execute_reservation(reservation_number as usize);
            } else {
                self.deliver(&exchange, Message::Commit { reservation_number }).await;
            }
        }
        if let Some(reply) = self.pending_trade_replies.remove(&order_number) {
            reply.send(Message::TradeMfAck {
                result: mutualnet_core::message::TradeResult::Ok,
                order_number,
            });
        }
        self.coordinator.remove(order_number);
        info!(order_number, "order committed");
    }

    /// Shared by an invalid `ReserveAck` and by either order-level timeout
    /// firing (§7 "Order timeout", §9 "idempotent"): cancel every leg
    /// still holding a valid reservation and reply to the client once.
    async fn abort_order(&mut self, order_number: u64, result: mutualnet_core::message::TradeResult) {
        let legs = self.coordinator.abort_valid_reservations(order_number);
        for (exchange, reservation_number) in legs {
            if exchange == self.overlay.name {
                self.participant.cancel_reservation(reservation_number as usize);
            } else {
                self.deliver(&exchange, Message::CancelReservation { reservation_number }).await;
            }
        }
        if let Some(reply) = self.pending_trade_replies.remove(&order_number) {
            reply.send(Message::TradeMfAck { result, order_number });
        }
        self.coordinator.remove(order_number);
    }

    async fn handle_order_timeout(&mut self, order_number: u64) {
        if self.coordinator.order(order_number).is_none() {
            return; // already completed or already aborted (idempotent, §9).
        }
        warn!(order_number, "order timed out, aborting");
        self.abort_order(order_number, mutualnet_core::message::TradeResult::Timeout).await;
    }
}
