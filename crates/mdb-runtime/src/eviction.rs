//! Background reaper for idle pooled instances.

use crate::container::MdbContainer;
use crate::listener::MessageListener;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Handle to a running reaper task.
pub struct EvictionTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl EvictionTask {
    /// Stops the reaper and waits for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

impl<L: MessageListener> MdbContainer<L> {
    /// Spawns the idle-instance reaper. Returns `None` when idle eviction is disabled.
    ///
    /// The task holds only a weak reference and exits on its own once the container
    /// is dropped.
    pub fn start_eviction(self: &Arc<Self>) -> Option<EvictionTask> {
        let timeout = self.config().idle_timeout()?;
        let period = self.config().eviction_interval();
        if period.is_zero() {
            return None;
        }

        let container = Arc::downgrade(self);
        let container_id = self.container_id().to_string();
        let (shutdown, mut stopped) = watch::channel(false);

        let handle = tokio::spawn(async move {
            info!(container_id = %container_id, ?timeout, ?period, "idle instance reaper started");
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(container) = container.upgrade() else {
                            break;
                        };
                        let evicted = container.evict_idle().await;
                        if evicted > 0 {
                            debug!(container_id = %container_id, evicted, "evicted idle instances");
                        }
                    }
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                }
            }
            info!(container_id = %container_id, "idle instance reaper stopped");
        });

        Some(EvictionTask { shutdown, handle })
    }
}
