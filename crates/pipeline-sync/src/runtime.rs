use crate::error::TransportError;
use crate::events::{
    ConnectionHealth, HandshakeEvent, RealtimeEvent, SyncEvent, SyncNotification, SyncStatus,
    VersionAdvisory,
};
use crate::handshake::{HandshakeClient, HandshakeSettings};
use crate::machine::{ConnectionStateMachine, Effect, MachineInput};
use crate::poller::SnapshotPoller;
use crate::realtime::RealtimeChannel;
use crate::settings::{millis, SyncSettings};
use crate::transport::{ControlApi, HttpControlApi, RealtimeConnector, WsConnector};
use pipeline_core::{ServerConfiguration, Snapshot};
use std::sync::Arc;
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, info};

const EVENT_QUEUE_CAPACITY: usize = 256;
const NOTIFICATION_CAPACITY: usize = 256;

pub struct SyncRuntime;

impl SyncRuntime {
    /// Starts the sync layer against the HTTP control API and WebSocket
    /// real-time endpoint described by `settings`.
    pub fn connect(settings: SyncSettings) -> Result<SyncHandle, TransportError> {
        let api = Arc::new(HttpControlApi::new(&settings)?);
        Ok(Self::spawn(settings, api, Arc::new(WsConnector)))
    }

    /// Starts the handshake and the poller and returns a handle to the
    /// published state. Subscribe before yielding to the executor to see
    /// every notification.
    pub fn spawn(
        settings: SyncSettings,
        api: Arc<dyn ControlApi>,
        connector: Arc<dyn RealtimeConnector>,
    ) -> SyncHandle {
        let settings = Arc::new(settings);
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (status_tx, status_rx) = watch::channel(SyncStatus::default());
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(Snapshot::default()));
        let (notify_tx, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handshake = HandshakeClient::new(
            api.clone(),
            HandshakeSettings {
                request_timeout: settings.request_timeout,
                interval: settings.handshake_interval,
                retry: settings.retry,
            },
            event_tx.clone(),
        );
        let realtime = RealtimeChannel::new(connector, settings.clone(), event_tx.clone());
        let poller = SnapshotPoller::new(api, settings.request_timeout, event_tx);

        let runtime = Runtime {
            settings,
            machine: ConnectionStateMachine::new(),
            handshake,
            realtime,
            poller,
            status_tx,
            snapshot_tx,
            notify_tx: notify_tx.clone(),
        };
        let task = tokio::spawn(runtime.run(event_rx, shutdown_rx));

        SyncHandle {
            status: status_rx,
            snapshot: snapshot_rx,
            notify_tx,
            shutdown_tx,
            task: Some(task),
        }
    }
}

/// Read-only access to the synchronized state. Dropping the handle tears the
/// sync layer down.
pub struct SyncHandle {
    status: watch::Receiver<SyncStatus>,
    snapshot: watch::Receiver<Arc<Snapshot>>,
    notify_tx: broadcast::Sender<SyncNotification>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SyncHandle {
    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub fn health(&self) -> ConnectionHealth {
        self.status.borrow().health
    }

    pub fn configuration(&self) -> Option<Arc<ServerConfiguration>> {
        self.status.borrow().configuration.clone()
    }

    pub fn loaded_build_version(&self) -> Option<i64> {
        self.status.borrow().loaded_build_version
    }

    pub fn advisory(&self) -> Option<VersionAdvisory> {
        self.status.borrow().advisory
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.borrow().clone()
    }

    /// Notifications in application order. Unsubscribe by dropping the
    /// receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncNotification> {
        self.notify_tx.subscribe()
    }

    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshot.clone()
    }

    /// Stops all three channels and waits for the runtime to finish.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

struct Runtime {
    settings: Arc<SyncSettings>,
    machine: ConnectionStateMachine,
    handshake: HandshakeClient,
    realtime: RealtimeChannel,
    poller: SnapshotPoller,
    status_tx: watch::Sender<SyncStatus>,
    snapshot_tx: watch::Sender<Arc<Snapshot>>,
    notify_tx: broadcast::Sender<SyncNotification>,
}

impl Runtime {
    async fn run(
        mut self,
        mut events: mpsc::Receiver<SyncEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            event = "sync_start",
            host = %self.settings.control_host,
            port = self.settings.control_port,
            poll_interval_ms = millis(self.settings.poll_interval)
        );
        self.handshake.start();
        self.poller.start(self.settings.poll_interval);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                Some(event) = events.recv() => {
                    self.handle_event(event);
                }
            }
        }

        self.handshake.kill();
        self.realtime.close();
        self.poller.stop();
        info!(event = "sync_shutdown");
    }

    fn handle_event(&mut self, event: SyncEvent) {
        let Some(input) = self.accept(event) else {
            return;
        };
        let effects = self.machine.apply(input);
        self.publish_state();
        for effect in effects {
            match effect {
                Effect::ConnectRealtime { offset } => self.realtime.connect(offset),
                Effect::CloseRealtime => {
                    self.realtime.close();
                }
                Effect::RestartPoller => {
                    self.poller.start(self.settings.poll_interval);
                }
                Effect::RefreshSnapshot => {
                    if self.settings.refresh_on_push {
                        self.poller.request_refresh();
                    }
                }
                Effect::Notify(notification) => {
                    let _ = self.notify_tx.send(notification);
                }
            }
        }
    }

    /// Maps an adapter event to a machine input, discarding events from
    /// adapters that were torn down or restarted since.
    fn accept(&self, event: SyncEvent) -> Option<MachineInput> {
        match event {
            SyncEvent::Handshake { epoch, event } => {
                if !self.handshake.is_current(epoch) {
                    debug!(event = "stale_handshake_event", epoch);
                    return None;
                }
                Some(match event {
                    HandshakeEvent::Connected(config) => MachineInput::HandshakeSucceeded(config),
                    HandshakeEvent::Disconnected => MachineInput::HandshakeLost,
                })
            }
            SyncEvent::Realtime { epoch, event } => {
                if !self.realtime.is_current(epoch) {
                    debug!(event = "stale_realtime_event", epoch);
                    return None;
                }
                Some(match event {
                    RealtimeEvent::Opened => MachineInput::RealtimeOpened,
                    RealtimeEvent::Closed(reason) => MachineInput::RealtimeClosed(reason),
                    RealtimeEvent::Push(push) => MachineInput::Push(push),
                })
            }
            SyncEvent::Snapshot { epoch, snapshot } => {
                if !self.poller.is_current(epoch) {
                    debug!(event = "stale_snapshot_event", epoch);
                    return None;
                }
                Some(MachineInput::SnapshotFetched(snapshot))
            }
        }
    }

    /// Publishes watch state before any notification goes out, so a
    /// subscriber reacting to a notification reads the matching state.
    fn publish_state(&self) {
        let status = self.machine.status();
        self.status_tx.send_if_modified(|current| {
            if *current != status {
                *current = status;
                true
            } else {
                false
            }
        });
        let snapshot = self.machine.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if !Arc::ptr_eq(current, &snapshot) {
                *current = snapshot;
                true
            } else {
                false
            }
        });
    }
}
