//! Message transport (SPEC_FULL.md §4.A).
//!
//! Framed send/receive over one-shot TCP streams carrying a single JSON
//! object per connection. Sending opens a connection, writes the payload,
//! optionally reads one bounded reply, then closes; there is no
//! multiplexing. Retries use [`crate::backoff::BackoffState`].

use std::time::Duration;

use compio::buf::IoBuf;
use compio::io::{AsyncReadExt, AsyncWriteExt};
use compio::net::{TcpListener, TcpStream};
use compio::time::timeout;
use tracing::{debug, trace, warn};

use crate::backoff::BackoffState;
use crate::error::{MutualNetError, Result};
use crate::message::Message;

/// Reply reads are bounded to 1 KiB (§4.A).
pub const MAX_REPLY_BYTES: usize = 1024;

/// One inbound, already-decoded message handed to the node's single
/// processor FIFO (§5). `reply` is `Some` iff the sender requested a
/// synchronous reply on the same connection.
pub struct Inbound {
    pub message: Message,
    pub reply: Option<ReplySender>,
}

/// The other half of an in-flight inbound connection's reply path.
pub struct ReplySender(flume::Sender<Message>);

impl ReplySender {
    /// Hand a reply to the connection handler task, which writes it back
    /// and closes the connection. Dropping a `ReplySender` without calling
    /// this simply closes the connection with no reply (the peer's
    /// `need_reply` recv then times out, which is a valid failure mode).
    pub fn send(self, msg: Message) {
        let _ = self.0.send(msg);
    }
}

/// Send `msg` to `addr:port`, retrying with exponential backoff up to
/// `retries` additional attempts after the first. Returns `Ok(None)` when
/// `need_reply` is false and the write succeeded; `Ok(Some(reply))` when a
/// reply was requested and received; `Err` once the retry budget is
/// exhausted (the caller decides the recovery policy: super-peer
/// peer-list pruning, or triggering an election — §7).
pub async fn send(
    addr: &str,
    port: u16,
    msg: &Message,
    need_reply: bool,
    per_attempt_timeout: Duration,
    retries: u32,
) -> Result<Option<Message>> {
    let payload = serde_json::to_vec(msg)?;
    let mut backoff = BackoffState::default_policy();
    let mut last_err: Option<MutualNetError> = None;

    for attempt in 0..=retries {
        match timeout(per_attempt_timeout, try_send_once(addr, port, &payload, need_reply)).await {
            Ok(Ok(reply)) => {
                trace!(action = msg.action(), %addr, port, attempt, "send succeeded");
                return Ok(reply);
            }
            Ok(Err(e)) => {
                warn!(action = msg.action(), %addr, port, attempt, error = %e, "send attempt failed");
                last_err = Some(e);
            }
            Err(_elapsed) => {
                warn!(action = msg.action(), %addr, port, attempt, "send attempt timed out");
                last_err = Some(MutualNetError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "send timed out",
                )));
            }
        }
        if attempt < retries {
            compio::time::sleep(backoff.next_delay()).await;
        }
    }

    debug!(action = msg.action(), %addr, port, attempts = retries + 1, "send exhausted retries");
    let _ = last_err;
    Err(MutualNetError::SendExhausted {
        addr: addr.to_string(),
        port,
        attempts: retries + 1,
    })
}

async fn try_send_once(
    addr: &str,
    port: u16,
    payload: &[u8],
    need_reply: bool,
) -> Result<Option<Message>> {
    let mut stream = TcpStream::connect((addr, port)).await?;
    let (res, _buf) = stream.write_all(payload.to_vec()).await.into_parts();
    res?;

    if !need_reply {
        return Ok(None);
    }

    // Half-close the write side so the server's read-to-EOF loop can
    // decode the request without waiting on a FIN that would otherwise
    // only arrive once we're done reading the reply.
    stream.shutdown().await?;

    let buf = vec![0u8; MAX_REPLY_BYTES];
    let (res, buf) = stream.read(buf).await.into_parts();
    let n = res?;
    if n == 0 {
        return Err(MutualNetError::protocol("connection closed without reply"));
    }
    if n == MAX_REPLY_BYTES {
        return Err(MutualNetError::ReplyTooLarge(MAX_REPLY_BYTES));
    }
    let reply: Message = serde_json::from_slice(&buf.slice(0..n))?;
    Ok(Some(reply))
}

/// Accept loop: binds `addr:port` and spawns one handler task per inbound
/// connection (§5 "an accept loop that spawns one handler per inbound
/// connection"). Each decoded message (with its reply path, if any) is
/// pushed onto `sink`, the node's single-consumer processor FIFO.
pub async fn serve(addr: &str, port: u16, sink: flume::Sender<Inbound>) -> Result<()> {
    let listener = TcpListener::bind((addr, port)).await?;
    debug!(%addr, port, "transport listening");
    loop {
        let (stream, peer) = listener.accept().await?;
        trace!(?peer, "accepted connection");
        let sink = sink.clone();
        compio::runtime::spawn(async move {
            if let Err(e) = handle_connection(stream, sink).await {
                warn!(error = %e, "connection handler failed");
            }
        })
        .detach();
    }
}

async fn handle_connection(mut stream: TcpStream, sink: flume::Sender<Inbound>) -> Result<()> {
    let mut all = Vec::new();
    let mut buf = vec![0u8; MAX_REPLY_BYTES];
    loop {
        let (res, filled) = stream.read(buf).await.into_parts();
        let n = res?;
        if n == 0 {
            break;
        }
        all.extend_from_slice(&filled[..n]);
        buf = filled;
        if all.len() > 8 * MAX_REPLY_BYTES {
            return Err(MutualNetError::protocol("inbound message too large"));
        }
    }
    if all.is_empty() {
        return Ok(());
    }
    let message: Message = serde_json::from_slice(&all)?;

    let (reply_tx, reply_rx) = flume::bounded(1);
    let inbound = Inbound {
        message,
        reply: Some(ReplySender(reply_tx)),
    };
    sink.send_async(inbound)
        .await
        .map_err(|_| MutualNetError::ChannelClosed)?;

    if let Ok(reply) = reply_rx.recv_async().await {
        let payload = serde_json::to_vec(&reply)?;
        let (res, _) = stream.write_all(payload).await.into_parts();
        res?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[compio::test]
    async fn round_trip_request_reply() {
        let (tx, rx) = flume::unbounded();
        compio::runtime::spawn(async move {
            let _ = serve("127.0.0.1", 58201, tx).await;
        })
        .detach();
        compio::time::sleep(Duration::from_millis(50)).await;

        compio::runtime::spawn(async move {
            let inbound = rx.recv_async().await.unwrap();
            assert_eq!(inbound.message.action(), "Query");
            inbound.reply.unwrap().send(Message::QueryAck { super_peers: vec![] });
        })
        .detach();

        let reply = send(
            "127.0.0.1",
            58201,
            &Message::Query { group: 0 },
            true,
            Duration::from_millis(500),
            1,
        )
        .await
        .unwrap();
        assert!(matches!(reply, Some(Message::QueryAck { .. })));
    }

    #[compio::test]
    async fn exhausts_retries_against_closed_port() {
        let err = send(
            "127.0.0.1",
            1, // unlikely to be listening, and privileged
            &Message::Query { group: 0 },
            false,
            Duration::from_millis(100),
            1,
        )
        .await
        .unwrap_err();
        assert!(err.is_connection_error());
    }
}
