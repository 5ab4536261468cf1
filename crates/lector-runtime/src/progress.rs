//! Bounded, ordered progress stream from the orchestrator to the
//! interactive surface.
//!
//! Single producer, single consumer. Delivery policy:
//!
//! - `UnitCompleted` and `Warning` are rate-limited and sent with
//!   `try_send`; when the consumer falls behind they are dropped. The
//!   producer never blocks on them.
//! - `Started` goes into the freshly created (empty) per-job channel, so it
//!   always fits.
//! - The terminal event (`Completed`/`Paused`/`Failed`/`Cancelled`) is sent
//!   through a permit reserved at channel creation: it can neither be
//!   dropped under backpressure nor block the producer.
//!
//! Events are never reordered; the channel is FIFO.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use lector_core::events::ProgressEvent;

/// Default bound for the per-job event channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Minimum interval between `UnitCompleted` emissions.
const UNIT_EMIT_INTERVAL: Duration = Duration::from_millis(100);

/// Create a per-job progress channel.
///
/// `capacity` is clamped to at least 2 so the reserved terminal slot and
/// the `Started` event always fit.
pub fn progress_channel(capacity: usize) -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(2));

    // Reserve the terminal slot up front; the channel is empty, so this
    // cannot fail.
    let terminal_permit = tx
        .clone()
        .try_reserve_owned()
        .expect("freshly created channel has capacity");

    (
        ProgressSender {
            tx,
            terminal_permit: Mutex::new(Some(terminal_permit)),
            throttle: Mutex::new(ProgressThrottle::new(UNIT_EMIT_INTERVAL)),
        },
        ProgressReceiver { rx },
    )
}

/// Producer half, owned by the orchestrator's job task.
pub struct ProgressSender {
    tx: mpsc::Sender<ProgressEvent>,
    terminal_permit: Mutex<Option<mpsc::OwnedPermit<ProgressEvent>>>,
    throttle: Mutex<ProgressThrottle>,
}

impl ProgressSender {
    /// Emit an event according to the delivery policy. Never blocks.
    pub fn emit(&self, event: ProgressEvent) {
        if event.is_terminal() {
            self.emit_terminal(event);
            return;
        }

        if matches!(event, ProgressEvent::UnitCompleted { .. })
            && !self.throttle.lock().expect("throttle lock").should_emit()
        {
            // Coalesced: a later unit report will cover this one
            return;
        }

        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                debug!(?event, "Consumer behind, dropping intermediate event");
            }
            Err(TrySendError::Closed(_)) => {
                // Consumer went away; terminal emission will be a no-op too
            }
        }
    }

    fn emit_terminal(&self, event: ProgressEvent) {
        let permit = self.terminal_permit.lock().expect("permit lock").take();
        match permit {
            Some(permit) => {
                // Reserved slot: cannot fail, cannot block, cannot be dropped
                permit.send(event);
            }
            None => {
                warn!(?event, "Terminal event emitted twice, delivering best-effort");
                let _ = self.tx.try_send(event);
            }
        }
    }
}

/// Consumer half, handed to the interactive surface.
#[derive(Debug)]
pub struct ProgressReceiver {
    rx: mpsc::Receiver<ProgressEvent>,
}

impl ProgressReceiver {
    /// Await the next event; `None` once the stream closed after its
    /// terminal event.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }

    /// Non-blocking poll, for frame-driven UIs.
    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        self.rx.try_recv().ok()
    }

    /// Drain the stream until (and including) the terminal event.
    pub async fn collect_to_end(&mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.rx.recv().await {
            let done = event.is_terminal();
            events.push(event);
            if done {
                break;
            }
        }
        events
    }
}

/// Rate-limiter for progress updates.
///
/// Ensures intermediate events are not emitted more frequently than the
/// configured interval.
pub struct ProgressThrottle {
    last_emit: Option<Instant>,
    min_interval: Duration,
}

impl ProgressThrottle {
    /// Create a new throttle with the specified minimum interval.
    pub const fn new(min_interval: Duration) -> Self {
        Self {
            last_emit: None,
            min_interval,
        }
    }

    /// Check if enough time has passed to emit another progress update.
    pub fn should_emit(&mut self) -> bool {
        let now = Instant::now();
        match self.last_emit {
            Some(last) if now.duration_since(last) < self.min_interval => false,
            _ => {
                self.last_emit = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn unit_event(index: u32) -> ProgressEvent {
        ProgressEvent::UnitCompleted {
            index,
            total_units: 100,
            elapsed_ms: 10,
            chars_processed: 512,
        }
    }

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (tx, mut rx) = progress_channel(8);
        tx.emit(ProgressEvent::Started {
            total_units: 2,
            first_unit: 1,
        });
        tx.emit(ProgressEvent::Completed {
            output_path: PathBuf::from("/tmp/out.mp3"),
        });

        let events = rx.collect_to_end().await;
        assert!(matches!(events[0], ProgressEvent::Started { .. }));
        assert!(matches!(events[1], ProgressEvent::Completed { .. }));
    }

    #[tokio::test]
    async fn test_terminal_survives_full_channel() {
        // Tiny channel, consumer never polls while we flood it
        let (tx, mut rx) = progress_channel(2);
        tx.emit(ProgressEvent::Started {
            total_units: 1000,
            first_unit: 1,
        });
        for i in 1..=1000 {
            // Bypass throttling by emitting warnings, which share the
            // droppable path without the rate limiter
            tx.emit(ProgressEvent::Warning {
                message: format!("w{i}"),
            });
        }
        tx.emit(ProgressEvent::Cancelled);

        let events = rx.collect_to_end().await;
        assert!(matches!(events.first(), Some(ProgressEvent::Started { .. })));
        assert!(
            matches!(events.last(), Some(ProgressEvent::Cancelled)),
            "terminal event must never be dropped"
        );
        // Flooded intermediates were dropped, not queued
        assert!(events.len() < 100);
    }

    #[tokio::test]
    async fn test_unit_events_are_throttled() {
        let (tx, mut rx) = progress_channel(64);
        for i in 1..=50 {
            tx.emit(unit_event(i));
        }
        tx.emit(ProgressEvent::Cancelled);

        let events = rx.collect_to_end().await;
        let units = events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::UnitCompleted { .. }))
            .count();
        // Burst within one throttle window collapses to the first report
        assert_eq!(units, 1);
    }

    #[tokio::test]
    async fn test_emit_after_receiver_dropped_does_not_panic() {
        let (tx, rx) = progress_channel(4);
        drop(rx);
        tx.emit(unit_event(1));
        tx.emit(ProgressEvent::Cancelled);
    }

    #[test]
    fn test_throttle_respects_interval() {
        let mut throttle = ProgressThrottle::new(Duration::from_millis(50));
        assert!(throttle.should_emit());
        assert!(!throttle.should_emit()); // Too soon

        std::thread::sleep(Duration::from_millis(60));
        assert!(throttle.should_emit()); // Enough time passed
    }
}
