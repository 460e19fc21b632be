//! Liveness probing for the registration directory's `Register`/`Election`
//! acceptance rules (§4.B). Pluggable so tests can inject a fake probe
//! without binding real sockets (§9 "expose them through a single
//! actor/service so tests can inject a fake clock and a fake liveness
//! probe").

use std::time::Duration;

use futures::future::BoxFuture;

const PROBE_ATTEMPTS: u32 = 3;
const PROBE_COOLDOWN: Duration = Duration::from_millis(150);
const PROBE_TIMEOUT: Duration = Duration::from_millis(300);

pub trait LivenessProbe: Send + Sync {
    /// One probe attempt; `true` means the peer answered.
    fn probe_once<'a>(&'a self, addr: &'a str, port: u16) -> BoxFuture<'a, bool>;

    /// Three probes with cooldown (§4.B): the slot is considered dead only
    /// if every attempt fails.
    fn probe<'a>(&'a self, addr: &'a str, port: u16) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            for attempt in 0..PROBE_ATTEMPTS {
                if self.probe_once(addr, port).await {
                    return true;
                }
                if attempt + 1 < PROBE_ATTEMPTS {
                    compio::time::sleep(PROBE_COOLDOWN).await;
                }
            }
            false
        })
    }
}

/// Default probe: attempt a raw TCP connect to the recorded port. The
/// multi-process demo setup runs every node on the same host
/// (`DirectoryConfig::peer_host`), so no address discovery is needed.
pub struct TcpLivenessProbe {
    pub host: String,
}

impl LivenessProbe for TcpLivenessProbe {
    fn probe_once<'a>(&'a self, addr: &'a str, port: u16) -> BoxFuture<'a, bool> {
        let _ = addr;
        let host = self.host.clone();
        Box::pin(async move {
            matches!(
                compio::time::timeout(PROBE_TIMEOUT, compio::net::TcpStream::connect((host.as_str(), port))).await,
                Ok(Ok(_))
            )
        })
    }
}

#[cfg(test)]
pub struct FakeProbe {
    pub alive: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl LivenessProbe for FakeProbe {
    fn probe_once<'a>(&'a self, _addr: &'a str, _port: u16) -> BoxFuture<'a, bool> {
        let alive = self.alive.load(std::sync::atomic::Ordering::SeqCst);
        Box::pin(async move { alive })
    }
}
