//! Cancellable periodic background task

use cache_core::{CacheError, Result};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

/// A tick function run on a Tokio interval until stopped.
///
/// The first tick fires one full interval after spawning. A tick that
/// panics is logged and the loop carries on with the next one.
pub struct PeriodicTask {
    name: String,
    /// Sender to signal shutdown to the loop
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawn `tick` every `interval` on the current Tokio runtime
    pub fn spawn<F>(name: impl Into<String>, interval: Duration, mut tick: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let name = name.into();
        if interval.is_zero() {
            return Err(CacheError::InvalidConfig(format!(
                "interval for '{}' must be greater than zero",
                name
            )));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            CacheError::Runtime(format!("'{}' must be started inside a Tokio runtime", name))
        })?;

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task_name = name.clone();

        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Skip the first immediate tick - we want to wait for the interval first
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if catch_unwind(AssertUnwindSafe(&mut tick)).is_err() {
                            error!("Periodic task '{}' tick panicked; retrying next tick", task_name);
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("Periodic task '{}' exited", task_name);
        });

        debug!("Periodic task '{}' started every {:?}", name, interval);
        Ok(Self {
            name,
            shutdown_tx,
            handle,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Signal the loop to exit and wait for it to finish
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                error!("Periodic task '{}' panicked: {}", self.name, e);
            }
        }
    }
}

impl std::fmt::Debug for PeriodicTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicTask")
            .field("name", &self.name)
            .field("finished", &self.handle.is_finished())
            .finish()
    }
}
