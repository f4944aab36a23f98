//! Background sweep of idle client entries.

use std::{sync::Arc, time::Duration};

use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use super::ClientRegistry;

/// Entries idle for this many cleanup intervals are dropped.
const IDLE_INTERVALS: u32 = 3;

/// Longest sweep interval the reaper will wait between cycles.
pub const MAX_CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Owns the running reaper task.
pub struct ReaperHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Stops the reaper and waits for it to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(err) = self.task.await {
            tracing::error!("reaper task failed: {err}");
        }
    }
}

/// Sweeps `registry` every `interval`, dropping entries idle for longer than
/// three intervals. The first sweep happens one interval after start.
///
/// `interval` is clamped to [`MAX_CLEANUP_INTERVAL`].
pub fn spawn_reaper(registry: Arc<ClientRegistry>, interval: Duration) -> ReaperHandle {
    let cancel = CancellationToken::new();
    let interval = interval.min(MAX_CLEANUP_INTERVAL);
    let idle = interval.saturating_mul(IDLE_INTERVALS);
    let stop = cancel.clone();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let removed = registry.reap(idle, Instant::now());
            if removed > 0 {
                tracing::debug!(removed, remaining = registry.len(), "reaped idle clients");
            }
        }

        tracing::debug!("reaper stopped");
    });

    ReaperHandle { cancel, task }
}
