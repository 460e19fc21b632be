//! Timer service (§5, §9).
//!
//! Timer fibers run on independent tasks, but must never mutate node state
//! directly — doing so would race the single-consumer processor FIFO. A
//! `TimerService` therefore only ever owns a `flume::Sender<T>` back into
//! that FIFO; when a timer fires it sends a synthetic event and the
//! processor handles it exactly like a network-induced message. The
//! handler is expected to re-check current state and no-op if the timer
//! fired against a reservation/order that has already moved on (§4.E).

use std::time::Duration;

#[derive(Clone)]
pub struct TimerService<T> {
    sink: flume::Sender<T>,
}

impl<T> TimerService<T>
where
    T: Send + 'static,
{
    #[must_use]
    pub const fn new(sink: flume::Sender<T>) -> Self {
        Self { sink }
    }

    /// Arm a one-shot timer. After `after` elapses, `event` is pushed onto
    /// the processor FIFO. Dropping the returned handle does not cancel
    /// the timer (there is no cancellation token in this design, §5); the
    /// handler is responsible for recognizing stale fires.
    pub fn arm(&self, after: Duration, event: T) {
        let sink = self.sink.clone();
        compio::runtime::spawn(async move {
            compio::time::sleep(after).await;
            let _ = sink.send_async(event).await;
        })
        .detach();
    }
}

/// The universal per-reservation and per-order deadline (§4.E, §4.F).
pub const RESERVATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Each Paxos phase collects responses for a fixed window before the
/// proposer counts what it has (§4.D).
pub const PAXOS_PHASE_TIMEOUT: Duration = Duration::from_secs(5);

#[cfg(test)]
mod tests {
    use super::*;

    #[compio::test]
    async fn arm_delivers_event_after_delay() {
        let (tx, rx) = flume::unbounded::<&'static str>();
        let timers = TimerService::new(tx);
        timers.arm(Duration::from_millis(20), "fired");
        let got = rx.recv_async().await.unwrap();
        assert_eq!(got, "fired");
    }
}
