//! One-shot start latch shared by the playback channels.
//!
//! Each channel registered with [`StartTrigger::party`] reports ready as it
//! begins waiting, so the trigger can hold the release until slow setup on
//! any channel (decoding, opening a device) has finished.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::time::{Duration, Instant};

/// Releases every [`StartSignal`] waiter at once when fired or dropped.
#[derive(Debug)]
pub struct StartTrigger {
    _tx: Sender<()>,
    rx: Receiver<()>,
    ready: Vec<Receiver<()>>,
}

impl StartTrigger {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            _tx: tx,
            rx,
            ready: Vec::new(),
        }
    }

    /// A signal whose readiness [`fire_when_ready`](Self::fire_when_ready) waits for.
    ///
    /// A party that drops its signal without waiting counts as ready.
    pub fn party(&mut self) -> StartSignal {
        let (ready_tx, ready_rx) = bounded(1);
        self.ready.push(ready_rx);
        StartSignal {
            rx: self.rx.clone(),
            ready: Some(ready_tx),
        }
    }

    pub fn fire(self) {}

    /// Fire once every party is ready or `limit` has passed.
    ///
    /// Returns false when the limit cut the wait short.
    pub fn fire_when_ready(self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        let all_ready = self.ready.iter().all(|ready| {
            !matches!(
                ready.recv_deadline(deadline),
                Err(RecvTimeoutError::Timeout)
            )
        });
        self.fire();
        all_ready
    }
}

impl Default for StartTrigger {
    fn default() -> Self {
        Self::new()
    }
}

/// Blocks until the paired [`StartTrigger`] fires.
///
/// Nothing is ever sent on the start channel; waiters wake when the sender
/// disconnects, which reaches all clones simultaneously.
#[derive(Debug, Clone)]
pub struct StartSignal {
    rx: Receiver<()>,
    ready: Option<Sender<()>>,
}

impl StartSignal {
    /// A trigger and one signal the trigger does not wait for.
    pub fn pair() -> (StartTrigger, StartSignal) {
        let trigger = StartTrigger::new();
        let signal = StartSignal {
            rx: trigger.rx.clone(),
            ready: None,
        };
        (trigger, signal)
    }

    /// A signal that is already released.
    pub fn released() -> StartSignal {
        let (trigger, signal) = Self::pair();
        trigger.fire();
        signal
    }

    /// Report ready, then block until released.
    pub fn wait(&self) {
        if let Some(ready) = &self.ready {
            ready.try_send(()).ok();
        }
        self.rx.recv().ok();
    }
}
