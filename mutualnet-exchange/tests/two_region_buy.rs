//! Two-region buy over real TCP between two exchange nodes acting as
//! their own regions' super-peers (SPEC_FULL.md §8 scenario 3), wired
//! directly to each other's super-peer entry rather than through the
//! registration directory — this test exercises `overlay::route`'s
//! `FloodToSuperPeers` path and the full coordinator/participant 3PC
//! handshake across two processes' worth of state, in the style of
//! `monocoque/tests/interop_router.rs` driving two real sockets.

use std::time::Duration;

use mutualnet_core::message::{Message, SuperPeerEntry, TradeResult};
use mutualnet_core::timer::TimerService;
use mutualnet_core::transport::{self, Inbound};
use mutualnet_exchange::node::NodeEvent;
use mutualnet_exchange::precommit_log::JsonLinesLog;
use mutualnet_exchange::{FundCatalogue, JsonFileInventory, Node, OverlayNode, Participant};

/// Spawn one exchange node already promoted to super-peer for `region`,
/// with `peer.0`/`peer.1` preloaded as the other region's super-peer
/// entry so `route()` floods straight to it without needing a live
/// registration directory.
fn spawn_super_peer(
    name: &str,
    region: u8,
    port: u16,
    peer: (&str, u8, u16),
    catalogue_json: &str,
    inventory: JsonFileInventory,
) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let catalogue: FundCatalogue = serde_json::from_str(catalogue_json).unwrap();
    let precommit_log = JsonLinesLog::open(dir.path().join("precommit.jsonl")).unwrap();
    let participant = Participant::new(Box::new(inventory), Box::new(precommit_log));
    let mut overlay = OverlayNode::new(name, region, port);
    overlay.promote_to_super(0);
    overlay.upsert_superpeer(SuperPeerEntry {
        group: peer.1,
        name: peer.0.to_string(),
        port_num: peer.2,
        elec_num: 0,
    });

    let (event_tx, event_rx) = flume::unbounded::<NodeEvent>();
    let timers = TimerService::new(event_tx.clone());
    let node = Node::new(
        overlay,
        participant,
        catalogue,
        "127.0.0.1".to_string(),
        1,
        "127.0.0.1".to_string(),
        timers,
    );

    let (net_tx, net_rx) = flume::unbounded::<Inbound>();
    let listen_addr = "127.0.0.1".to_string();
    compio::runtime::spawn(async move {
        let _ = transport::serve(&listen_addr, port, net_tx).await;
    })
    .detach();
    compio::runtime::spawn(async move {
        while let Ok(inbound) = net_rx.recv_async().await {
            if event_tx.send_async(NodeEvent::Network(inbound)).await.is_err() {
                break;
            }
        }
    })
    .detach();
    compio::runtime::spawn(node.run(event_rx)).detach();
    dir
}

#[compio::test]
async fn two_region_buy_commits_both_legs() {
    let port_a = portpicker::pick_unused_port().unwrap();
    let port_b = portpicker::pick_unused_port().unwrap();
    let catalogue = r#"{"FUND2": {"ExA": {"AAPL": 10}, "ExB": {"SAP": 20}}}"#;

    let _dir_a = spawn_super_peer(
        "ExA",
        0,
        port_a,
        ("ExB", 1, port_b),
        catalogue,
        JsonFileInventory::empty().seed("AAPL", 50),
    );
    let _dir_b = spawn_super_peer(
        "ExB",
        1,
        port_b,
        ("ExA", 0, port_a),
        catalogue,
        JsonFileInventory::empty().seed("SAP", 100),
    );
    compio::time::sleep(Duration::from_millis(50)).await;

    let reply = transport::send(
        "127.0.0.1",
        port_a,
        &Message::TradeMf {
            data: "FUND2".to_string(),
            qty: 1,
        },
        true,
        Duration::from_secs(5),
        2,
    )
    .await
    .unwrap()
    .expect("ExA replied");

    match reply {
        Message::TradeMfAck { result, .. } => assert_eq!(result, TradeResult::Ok),
        other => panic!("unexpected reply: {other:?}"),
    }
}

#[compio::test]
async fn remote_leg_failure_cancels_local_reservation_and_replies_timeout() {
    let port_a = portpicker::pick_unused_port().unwrap();
    let port_b = portpicker::pick_unused_port().unwrap();
    // ExB has no SAP at all, so its `reserve_stocks` returns -1.
    let catalogue = r#"{"FUND2": {"ExA": {"AAPL": 10}, "ExB": {"SAP": 20}}}"#;

    let _dir_a = spawn_super_peer(
        "ExA",
        0,
        port_a,
        ("ExB", 1, port_b),
        catalogue,
        JsonFileInventory::empty().seed("AAPL", 50),
    );
    let _dir_b = spawn_super_peer(
        "ExB",
        1,
        port_b,
        ("ExA", 0, port_a),
        catalogue,
        JsonFileInventory::empty(), // no SAP seeded: reservation always fails.
    );
    compio::time::sleep(Duration::from_millis(50)).await;

    let reply = transport::send(
        "127.0.0.1",
        port_a,
        &Message::TradeMf {
            data: "FUND2".to_string(),
            qty: 1,
        },
        true,
        Duration::from_secs(5),
        2,
    )
    .await
    .unwrap()
    .expect("ExA replied");

    match reply {
        Message::TradeMfAck { result, .. } => assert_eq!(result, TradeResult::Timeout),
        other => panic!("unexpected reply: {other:?}"),
    }
}
