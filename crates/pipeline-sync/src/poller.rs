use crate::error::TransportError;
use crate::events::SyncEvent;
use crate::transport::ControlApi;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, Notify},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, warn};

/// Fixed-interval snapshot poller. Failed or timed-out ticks are logged and
/// leave the current snapshot in place.
pub struct SnapshotPoller {
    api: Arc<dyn ControlApi>,
    request_timeout: Duration,
    events: mpsc::Sender<SyncEvent>,
    refresh: Arc<Notify>,
    epoch: u64,
    task: Option<JoinHandle<()>>,
}

impl SnapshotPoller {
    pub fn new(
        api: Arc<dyn ControlApi>,
        request_timeout: Duration,
        events: mpsc::Sender<SyncEvent>,
    ) -> Self {
        Self {
            api,
            request_timeout,
            events,
            refresh: Arc::new(Notify::new()),
            epoch: 0,
            task: None,
        }
    }

    /// Polls immediately, then every `interval`. Restarts the schedule if
    /// already running.
    pub fn start(&mut self, interval: Duration) {
        self.stop();
        self.epoch += 1;
        let epoch = self.epoch;
        let api = self.api.clone();
        let events = self.events.clone();
        let refresh = self.refresh.clone();
        let request_timeout = self.request_timeout;
        self.task = Some(tokio::spawn(async move {
            poll_loop(api, events, refresh, epoch, interval, request_timeout).await;
        }));
    }

    pub fn stop(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                task.abort();
                self.epoch += 1;
                true
            }
            None => false,
        }
    }

    /// Requests an out-of-schedule poll. Requests made while a poll is in
    /// flight collapse into one.
    pub fn request_refresh(&self) {
        if self.task.is_some() {
            self.refresh.notify_one();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.task.is_some() && epoch == self.epoch
    }
}

impl Drop for SnapshotPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_loop(
    api: Arc<dyn ControlApi>,
    events: mpsc::Sender<SyncEvent>,
    refresh: Arc<Notify>,
    epoch: u64,
    interval: Duration,
    request_timeout: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = refresh.notified() => {
                debug!(event = "poll_refresh_requested");
            }
        }

        let outcome = match tokio::time::timeout(request_timeout, api.fetch_snapshot()).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(request_timeout)),
        };
        match outcome {
            Ok(snapshot) => {
                debug!(
                    event = "poll_ok",
                    projects = snapshot.projects.len(),
                    workers = snapshot.workers.len()
                );
                if events
                    .send(SyncEvent::Snapshot { epoch, snapshot })
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Err(err) => {
                warn!(event = "poll_failed", category = %err.category(), "poll_error: {err}");
            }
        }
    }
}
