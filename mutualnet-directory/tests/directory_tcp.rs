//! End-to-end directory registration over a real TCP connection
//! (SPEC_FULL.md §8 scenario 6's setup half: a node registering and the
//! directory answering over the wire), in the style of
//! `monocoque/tests/interop_router.rs` exercising a real socket rather
//! than calling `Directory` methods in-process.

use std::time::Duration;

use mutualnet_core::message::{LogicalDate, Message};
use mutualnet_core::transport::{self, Inbound};
use mutualnet_directory::clock::ClockState;
use mutualnet_directory::liveness::LivenessProbe;
use mutualnet_directory::{Directory, TcpLivenessProbe};

/// Mirrors `mutualnet-directory`'s `main.rs` `dispatch`: decode the
/// action, call the matching `Directory` method, reply if one was
/// requested. Kept local to the test so the binary's `main.rs` doesn't
/// need a library-visible copy just for this harness.
async fn serve_directory<P: LivenessProbe + 'static>(directory: std::sync::Arc<Directory<P>>, rx: flume::Receiver<Inbound>) {
    while let Ok(inbound) = rx.recv_async().await {
        let directory = directory.clone();
        compio::runtime::spawn(async move {
            let reply = match inbound.message {
                Message::Register { group, name, port_num } => Some(directory.register(group, &name, port_num).await),
                Message::Election {
                    group,
                    name,
                    port_num,
                    elec_num,
                } => Some(directory.election(group, &name, port_num, elec_num).await),
                Message::Query { group } => Some(directory.query(group)),
                _ => None,
            };
            if let (Some(reply), Some(sender)) = (reply, inbound.reply) {
                sender.send(reply);
            }
        })
        .detach();
    }
}

#[compio::test]
async fn register_then_query_round_trips_over_tcp() {
    let port = portpicker::pick_unused_port().unwrap();
    let directory = std::sync::Arc::new(Directory::new(
        TcpLivenessProbe { host: "127.0.0.1".to_string() },
        "127.0.0.1",
        ClockState::monday_open(LogicalDate::new(2026, 7, 27)),
    ));

    let (tx, rx) = flume::unbounded::<Inbound>();
    compio::runtime::spawn(async move {
        let _ = transport::serve("127.0.0.1", port, tx).await;
    })
    .detach();
    compio::runtime::spawn(serve_directory(directory, rx)).detach();
    compio::time::sleep(Duration::from_millis(50)).await;

    let reply = transport::send(
        "127.0.0.1",
        port,
        &Message::Register {
            group: 0,
            name: "ExA".to_string(),
            port_num: 9100,
        },
        true,
        Duration::from_secs(2),
        1,
    )
    .await
    .unwrap()
    .unwrap();
    assert!(matches!(reply, Message::RegisterUrSuper { elec_num: 0 }));

    let reply = transport::send("127.0.0.1", port, &Message::Query { group: 0 }, true, Duration::from_secs(2), 1)
        .await
        .unwrap()
        .unwrap();
    match reply {
        Message::QueryAck { super_peers } => {
            assert_eq!(super_peers.len(), 1);
            assert_eq!(super_peers[0].name, "ExA");
            assert_eq!(super_peers[0].port_num, 9100);
        }
        other => panic!("unexpected reply: {other:?}"),
    }
}

#[compio::test]
async fn second_claimant_to_a_live_slot_gets_register_ok() {
    let port = portpicker::pick_unused_port().unwrap();
    let directory = std::sync::Arc::new(Directory::new(
        TcpLivenessProbe { host: "127.0.0.1".to_string() },
        "127.0.0.1",
        ClockState::monday_open(LogicalDate::new(2026, 7, 27)),
    ));

    let (tx, rx) = flume::unbounded::<Inbound>();
    compio::runtime::spawn(async move {
        let _ = transport::serve("127.0.0.1", port, tx).await;
    })
    .detach();
    compio::runtime::spawn(serve_directory(directory, rx)).detach();
    compio::time::sleep(Duration::from_millis(50)).await;

    // ExA registers with the directory's own listening port as its
    // claimed super-peer port, so the liveness probe against it
    // deterministically succeeds (something real is actually listening
    // there) rather than depending on an unbound port's probe timing.
    transport::send(
        "127.0.0.1",
        port,
        &Message::Register {
            group: 0,
            name: "ExA".to_string(),
            port_num: port,
        },
        true,
        Duration::from_secs(2),
        1,
    )
    .await
    .unwrap();

    let reply = transport::send(
        "127.0.0.1",
        port,
        &Message::Register {
            group: 0,
            name: "ExB".to_string(),
            port_num: 9200,
        },
        true,
        Duration::from_secs(2),
        1,
    )
    .await
    .unwrap()
    .unwrap();
    assert!(matches!(reply, Message::RegisterOk { port_num, .. } if port_num == port));
}
