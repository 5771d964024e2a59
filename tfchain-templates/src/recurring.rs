use std::{future::Future, time::Duration};

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::debug;

/// A task run every `period` until this handle is dropped or cancelled.
///
/// The first run happens one full period after spawning. A run that takes longer than the period delays the
/// next one instead of bunching them up.
pub struct RecurringAction {
    name: String,
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RecurringAction {
    pub fn spawn<F, Fut>(name: impl Into<String>, period: Duration, mut action: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let (cancel, mut cancelled) = watch::channel(false);
        let task_name = name.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => action().await,
                    _ = cancelled.changed() => break,
                }
            }
            debug!(action = %task_name, "recurring action stopped");
        });
        Self { name, cancel, handle }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stops the task once its current run, if any, has completed.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }
}

impl Drop for RecurringAction {
    fn drop(&mut self) {
        self.cancel();
        self.handle.abort();
    }
}
