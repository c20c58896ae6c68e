#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::StreamExt;
use pipeline_core::{Project, ServerConfiguration, Snapshot};
use pipeline_sync::{
    ConnectionHealth, ControlApi, PushFrames, RealtimeConnector, RealtimeEndpoint, RetryPolicy,
    SyncHandle, SyncNotification, SyncSettings, TransportError,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

pub const WAIT: Duration = Duration::from_secs(5);
pub const REALTIME_BASE_PORT: u16 = 7100;

pub fn test_settings() -> SyncSettings {
    SyncSettings {
        control_host: "pipeline-api.test".to_string(),
        control_port: 7000,
        realtime_base_port: REALTIME_BASE_PORT,
        poll_interval: Duration::from_secs(60),
        request_timeout: Duration::from_millis(100),
        handshake_interval: Duration::from_millis(20),
        refresh_on_push: false,
        retry: RetryPolicy {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(40),
        },
        ..SyncSettings::default()
    }
}

pub fn config(build_version: i64, offset: i64) -> ServerConfiguration {
    ServerConfiguration {
        build_version,
        process_id: 4242,
        thumbs_hostname: String::new(),
        thumbs_port: 80,
        thumbs_path: "/thumbnail".to_string(),
        is_active_pipeline: true,
        realtime_channel_offset: offset,
    }
}

pub fn snapshot_with(projects: usize) -> Snapshot {
    Snapshot {
        projects: (0..projects)
            .map(|i| Project {
                id: format!("project-{i}"),
                name: format!("Project {i}"),
                ..Project::default()
            })
            .collect(),
        ..Snapshot::default()
    }
}

#[derive(Debug, Clone)]
pub enum HandshakeReply {
    Config(ServerConfiguration),
    Refuse,
    Hang,
}

#[derive(Debug, Clone)]
pub enum SnapshotReply {
    Snapshot(Snapshot),
    Fail,
    Hang,
}

/// Scripted control API. Scripted replies are served first, then the
/// fallback reply forever.
pub struct FakeControlApi {
    handshake_script: Mutex<VecDeque<HandshakeReply>>,
    handshake_fallback: Mutex<HandshakeReply>,
    snapshot_script: Mutex<VecDeque<SnapshotReply>>,
    snapshot_fallback: Mutex<SnapshotReply>,
    handshake_calls: AtomicUsize,
    handshake_successes: AtomicUsize,
    snapshot_calls: AtomicUsize,
}

impl FakeControlApi {
    pub fn new(handshake: HandshakeReply, snapshot: SnapshotReply) -> Arc<Self> {
        Arc::new(Self {
            handshake_script: Mutex::new(VecDeque::new()),
            handshake_fallback: Mutex::new(handshake),
            snapshot_script: Mutex::new(VecDeque::new()),
            snapshot_fallback: Mutex::new(snapshot),
            handshake_calls: AtomicUsize::new(0),
            handshake_successes: AtomicUsize::new(0),
            snapshot_calls: AtomicUsize::new(0),
        })
    }

    pub fn script_handshake(&self, replies: impl IntoIterator<Item = HandshakeReply>) {
        self.handshake_script
            .lock()
            .expect("lock")
            .extend(replies);
    }

    pub fn script_snapshot(&self, replies: impl IntoIterator<Item = SnapshotReply>) {
        self.snapshot_script.lock().expect("lock").extend(replies);
    }

    pub fn set_handshake(&self, reply: HandshakeReply) {
        *self.handshake_fallback.lock().expect("lock") = reply;
    }

    pub fn set_snapshot(&self, reply: SnapshotReply) {
        *self.snapshot_fallback.lock().expect("lock") = reply;
    }

    pub fn handshake_calls(&self) -> usize {
        self.handshake_calls.load(Ordering::SeqCst)
    }

    pub fn handshake_successes(&self) -> usize {
        self.handshake_successes.load(Ordering::SeqCst)
    }

    pub fn snapshot_calls(&self) -> usize {
        self.snapshot_calls.load(Ordering::SeqCst)
    }

    fn next_handshake(&self) -> HandshakeReply {
        if let Some(reply) = self.handshake_script.lock().expect("lock").pop_front() {
            return reply;
        }
        self.handshake_fallback.lock().expect("lock").clone()
    }

    fn next_snapshot(&self) -> SnapshotReply {
        if let Some(reply) = self.snapshot_script.lock().expect("lock").pop_front() {
            return reply;
        }
        self.snapshot_fallback.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ControlApi for FakeControlApi {
    async fn fetch_configuration(&self) -> Result<ServerConfiguration, TransportError> {
        self.handshake_calls.fetch_add(1, Ordering::SeqCst);
        match self.next_handshake() {
            HandshakeReply::Config(config) => {
                self.handshake_successes.fetch_add(1, Ordering::SeqCst);
                Ok(config)
            }
            HandshakeReply::Refuse => Err(TransportError::Refused("connection refused".into())),
            HandshakeReply::Hang => std::future::pending().await,
        }
    }

    async fn fetch_snapshot(&self) -> Result<Snapshot, TransportError> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        match self.next_snapshot() {
            SnapshotReply::Snapshot(snapshot) => Ok(snapshot),
            SnapshotReply::Fail => Err(TransportError::UnexpectedStatus {
                status: 502,
                body: "bad gateway".to_string(),
            }),
            SnapshotReply::Hang => std::future::pending().await,
        }
    }
}

struct FakeConnection {
    port: u16,
    handshake_successes_at_open: usize,
    frames: Option<mpsc::UnboundedSender<Result<String, TransportError>>>,
}

/// In-memory real-time connector. Each `open` creates a connection the test
/// can push frames into or end.
pub struct FakeConnector {
    api: Option<Arc<FakeControlApi>>,
    refuse: AtomicBool,
    attempts: AtomicUsize,
    connections: Mutex<Vec<FakeConnection>>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Self::build(None)
    }

    /// Records how many handshakes had succeeded when each connection opened.
    pub fn observing(api: Arc<FakeControlApi>) -> Arc<Self> {
        Self::build(Some(api))
    }

    fn build(api: Option<Arc<FakeControlApi>>) -> Arc<Self> {
        Arc::new(Self {
            api,
            refuse: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
            connections: Mutex::new(Vec::new()),
        })
    }

    pub fn set_refusing(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn open_count(&self) -> usize {
        self.connections.lock().expect("lock").len()
    }

    pub fn ports(&self) -> Vec<u16> {
        self.connections
            .lock()
            .expect("lock")
            .iter()
            .map(|conn| conn.port)
            .collect()
    }

    pub fn handshake_successes_at_open(&self) -> Vec<usize> {
        self.connections
            .lock()
            .expect("lock")
            .iter()
            .map(|conn| conn.handshake_successes_at_open)
            .collect()
    }

    pub fn push(&self, index: usize, text: &str) {
        let connections = self.connections.lock().expect("lock");
        let sender = connections[index].frames.as_ref().expect("connection open");
        sender.send(Ok(text.to_string())).expect("receiver alive");
    }

    /// Ends the stream as if the server closed the connection.
    pub fn end(&self, index: usize) {
        self.connections.lock().expect("lock")[index].frames = None;
    }

    /// Whether the client side of the connection has been dropped.
    pub fn is_closed(&self, index: usize) -> bool {
        match &self.connections.lock().expect("lock")[index].frames {
            Some(sender) => sender.is_closed(),
            None => true,
        }
    }
}

#[async_trait]
impl RealtimeConnector for FakeConnector {
    async fn open(&self, endpoint: &RealtimeEndpoint) -> Result<PushFrames, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Refused("connection refused".into()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.lock().expect("lock").push(FakeConnection {
            port: endpoint.port,
            handshake_successes_at_open: self
                .api
                .as_ref()
                .map(|api| api.handshake_successes())
                .unwrap_or_default(),
            frames: Some(tx),
        });
        let frames = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(frames.boxed())
    }
}

pub async fn wait_for_health(handle: &SyncHandle, target: ConnectionHealth) {
    let mut status = handle.watch_status();
    tokio::time::timeout(WAIT, async {
        loop {
            if status.borrow_and_update().health == target {
                return;
            }
            status.changed().await.expect("runtime alive");
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for health {target}"));
}

pub async fn wait_until<F>(what: &str, condition: F)
where
    F: Fn() -> bool,
{
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

/// Receives notifications until `pick` returns a value.
pub async fn next_matching<T, F>(
    notifications: &mut broadcast::Receiver<SyncNotification>,
    mut pick: F,
) -> T
where
    F: FnMut(SyncNotification) -> Option<T>,
{
    tokio::time::timeout(WAIT, async {
        loop {
            let notification = notifications.recv().await.expect("notification stream");
            if let Some(value) = pick(notification) {
                return value;
            }
        }
    })
    .await
    .expect("timed out waiting for notification")
}

pub async fn next_health_change(
    notifications: &mut broadcast::Receiver<SyncNotification>,
) -> (ConnectionHealth, ConnectionHealth) {
    next_matching(notifications, |notification| match notification {
        SyncNotification::HealthChanged { from, to } => Some((from, to)),
        _ => None,
    })
    .await
}
