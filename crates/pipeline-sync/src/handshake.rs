use crate::error::TransportError;
use crate::events::{HandshakeEvent, SyncEvent};
use crate::settings::{millis, RetryPolicy};
use crate::transport::ControlApi;
use std::{sync::Arc, time::Duration};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct HandshakeSettings {
    pub request_timeout: Duration,
    /// Delay between handshakes while connected; each one doubles as a
    /// liveness check of the control connection.
    pub interval: Duration,
    pub retry: RetryPolicy,
}

/// Drives the configuration handshake against the control API and keeps
/// repeating it, reporting `Connected` on every success and `Disconnected`
/// on the first failure after a success.
pub struct HandshakeClient {
    api: Arc<dyn ControlApi>,
    settings: HandshakeSettings,
    events: mpsc::Sender<SyncEvent>,
    epoch: u64,
    task: Option<JoinHandle<()>>,
}

impl HandshakeClient {
    pub fn new(
        api: Arc<dyn ControlApi>,
        settings: HandshakeSettings,
        events: mpsc::Sender<SyncEvent>,
    ) -> Self {
        Self {
            api,
            settings,
            events,
            epoch: 0,
            task: None,
        }
    }

    pub fn start(&mut self) {
        self.kill();
        self.epoch += 1;
        let epoch = self.epoch;
        let api = self.api.clone();
        let settings = self.settings;
        let events = self.events.clone();
        self.task = Some(tokio::spawn(async move {
            handshake_loop(api, settings, events, epoch).await;
        }));
    }

    /// Cancels any in-flight handshake and stops retrying. Returns whether a
    /// running loop was torn down.
    pub fn kill(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                task.abort();
                self.epoch += 1;
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Whether an event stamped with `epoch` came from the current `start`.
    pub fn is_current(&self, epoch: u64) -> bool {
        self.task.is_some() && epoch == self.epoch
    }
}

impl Drop for HandshakeClient {
    fn drop(&mut self) {
        self.kill();
    }
}

async fn handshake_loop(
    api: Arc<dyn ControlApi>,
    settings: HandshakeSettings,
    events: mpsc::Sender<SyncEvent>,
    epoch: u64,
) {
    let mut backoff = settings.retry.initial;
    let mut connected = false;

    loop {
        let outcome = match tokio::time::timeout(settings.request_timeout, api.fetch_configuration())
            .await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(settings.request_timeout)),
        };

        match outcome {
            Ok(config) => {
                debug!(event = "handshake_response", build_version = config.build_version);
                connected = true;
                backoff = settings.retry.initial;
                let event = SyncEvent::Handshake {
                    epoch,
                    event: HandshakeEvent::Connected(config),
                };
                if events.send(event).await.is_err() {
                    return;
                }
                tokio::time::sleep(settings.interval).await;
            }
            Err(err) => {
                warn!(
                    category = %err.category(),
                    retry_in_ms = millis(backoff),
                    "handshake_error: {err}"
                );
                if connected {
                    connected = false;
                    let event = SyncEvent::Handshake {
                        epoch,
                        event: HandshakeEvent::Disconnected,
                    };
                    if events.send(event).await.is_err() {
                        return;
                    }
                }
                tokio::time::sleep(backoff).await;
                backoff = settings.retry.next_backoff(backoff);
            }
        }
    }
}
