//! One-shot follow-up timer. At most one is ever armed.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

struct Armed {
    generation: u64,
    task: JoinHandle<()>,
}

/// Owns the single pending follow-up. Fires are delivered as the arming's
/// generation number on the receiver returned by [`FollowUpScheduler::new`].
pub struct FollowUpScheduler {
    delay: Duration,
    fire_tx: mpsc::UnboundedSender<u64>,
    armed: Option<Armed>,
    next_generation: u64,
}

impl FollowUpScheduler {
    pub fn new(delay: Duration) -> (Self, mpsc::UnboundedReceiver<u64>) {
        let (fire_tx, fire_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            delay,
            fire_tx,
            armed: None,
            next_generation: 0,
        };
        (scheduler, fire_rx)
    }

    /// Arm a new timer, aborting any armed one first. Returns its generation.
    pub fn arm(&mut self) -> u64 {
        self.cancel();

        self.next_generation += 1;
        let generation = self.next_generation;
        let delay = self.delay;
        let fire_tx = self.fire_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = fire_tx.send(generation);
        });

        debug!("follow-up {} armed for {:?}", generation, delay);
        self.armed = Some(Armed { generation, task });
        generation
    }

    /// Abort the armed timer, if any.
    pub fn cancel(&mut self) {
        if let Some(armed) = self.armed.take() {
            armed.task.abort();
            debug!("follow-up {} cancelled", armed.generation);
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Accept a fire notification. Only the currently armed generation counts;
    /// it is disarmed by being accepted.
    pub fn take_fired(&mut self, generation: u64) -> bool {
        match &self.armed {
            Some(armed) if armed.generation == generation => {
                self.armed = None;
                true
            }
            _ => false,
        }
    }
}

impl Drop for FollowUpScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
