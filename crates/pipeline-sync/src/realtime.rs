use crate::error::TransportError;
use crate::events::{CloseReason, RealtimeEvent, SyncEvent};
use crate::settings::{millis, RetryPolicy, SyncSettings};
use crate::transport::RealtimeConnector;
use chrono::Utc;
use futures_util::StreamExt;
use pipeline_core::decode_push_frame;
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

/// Push channel to the backend instance selected by a port offset.
///
/// Reconnects with backoff after unexpected closure; an explicit
/// [`RealtimeChannel::close`] stops it for good until the next `connect`.
/// Dropping the channel closes it.
pub struct RealtimeChannel {
    connector: Arc<dyn RealtimeConnector>,
    settings: Arc<SyncSettings>,
    events: mpsc::Sender<SyncEvent>,
    epoch: u64,
    last_offset: Option<i64>,
    task: Option<JoinHandle<()>>,
}

impl RealtimeChannel {
    pub fn new(
        connector: Arc<dyn RealtimeConnector>,
        settings: Arc<SyncSettings>,
        events: mpsc::Sender<SyncEvent>,
    ) -> Self {
        Self {
            connector,
            settings,
            events,
            epoch: 0,
            last_offset: None,
            task: None,
        }
    }

    /// Opens the channel at `realtime_base_port + offset`, closing any
    /// channel that is already open.
    pub fn connect(&mut self, offset: i64) {
        self.close();
        self.epoch += 1;
        self.last_offset = Some(offset);
        let epoch = self.epoch;
        let connector = self.connector.clone();
        let settings = self.settings.clone();
        let events = self.events.clone();
        self.task = Some(tokio::spawn(async move {
            realtime_loop(connector, settings, events, epoch, offset).await;
        }));
    }

    /// Tears down the channel. Calling it again before the next `connect` is
    /// a no-op and returns `false`.
    pub fn close(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                task.abort();
                self.epoch += 1;
                info!(event = "realtime_close", offset = ?self.last_offset);
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.is_some()
    }

    pub fn last_offset(&self) -> Option<i64> {
        self.last_offset
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.task.is_some() && epoch == self.epoch
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        self.close();
    }
}

async fn realtime_loop(
    connector: Arc<dyn RealtimeConnector>,
    settings: Arc<SyncSettings>,
    events: mpsc::Sender<SyncEvent>,
    epoch: u64,
    offset: i64,
) {
    let retry: RetryPolicy = settings.retry;
    let mut backoff = retry.initial;

    let endpoint = match settings.realtime_endpoint(offset) {
        Ok(endpoint) => endpoint,
        Err(err) => {
            // No valid port for this offset; the next handshake decides.
            warn!("realtime_endpoint_error: {err}");
            return;
        }
    };

    loop {
        let opened = match tokio::time::timeout(
            settings.request_timeout,
            connector.open(&endpoint),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(settings.request_timeout)),
        };

        let mut frames = match opened {
            Ok(frames) => frames,
            Err(err) => {
                warn!(
                    category = %err.category(),
                    port = endpoint.port,
                    retry_in_ms = millis(backoff),
                    "realtime_connect_error: {err}"
                );
                tokio::time::sleep(backoff).await;
                backoff = retry.next_backoff(backoff);
                continue;
            }
        };

        backoff = retry.initial;
        info!(event = "realtime_open", host = %endpoint.host, port = endpoint.port, offset);
        if send(&events, epoch, RealtimeEvent::Opened).await.is_err() {
            return;
        }

        let mut sequence = 0u64;
        let reason = loop {
            match frames.next().await {
                Some(Ok(text)) => {
                    sequence += 1;
                    let push = decode_push_frame(&text, sequence, Utc::now());
                    debug!(event = "realtime_push", kind = %push.kind, sequence);
                    if send(&events, epoch, RealtimeEvent::Push(push)).await.is_err() {
                        return;
                    }
                }
                Some(Err(err)) => break CloseReason::Error(err.to_string()),
                None => break CloseReason::EndOfStream,
            }
        };
        drop(frames);

        warn!(event = "realtime_closed", reason = %reason, retry_in_ms = millis(backoff));
        if send(&events, epoch, RealtimeEvent::Closed(reason)).await.is_err() {
            return;
        }
        tokio::time::sleep(backoff).await;
        backoff = retry.next_backoff(backoff);
    }
}

async fn send(
    events: &mpsc::Sender<SyncEvent>,
    epoch: u64,
    event: RealtimeEvent,
) -> Result<(), mpsc::error::SendError<SyncEvent>> {
    events.send(SyncEvent::Realtime { epoch, event }).await
}
