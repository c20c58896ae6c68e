use pipeline_core::{PushEvent, ServerConfiguration, Snapshot};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionHealth {
    #[default]
    Disconnected,
    HandshakeOnly,
    FullyConnected,
}

impl ConnectionHealth {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionHealth::Disconnected => "disconnected",
            ConnectionHealth::HandshakeOnly => "handshake-only",
            ConnectionHealth::FullyConnected => "fully-connected",
        }
    }

    pub fn has_control(self) -> bool {
        !matches!(self, ConnectionHealth::Disconnected)
    }
}

impl fmt::Display for ConnectionHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Requested through `RealtimeChannel::close`; never retried.
    Explicit,
    /// The server ended the stream.
    EndOfStream,
    /// The transport failed mid-stream.
    Error(String),
}

impl CloseReason {
    pub fn is_unexpected(&self) -> bool {
        !matches!(self, CloseReason::Explicit)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Explicit => f.write_str("explicit"),
            CloseReason::EndOfStream => f.write_str("end-of-stream"),
            CloseReason::Error(err) => write!(f, "error: {err}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HandshakeEvent {
    Connected(ServerConfiguration),
    Disconnected,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    Opened,
    Closed(CloseReason),
    Push(PushEvent),
}

/// Events posted by the channel adapters to the runtime. `epoch` identifies
/// the start/connect call that produced them; stale epochs are discarded.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    Handshake { epoch: u64, event: HandshakeEvent },
    Realtime { epoch: u64, event: RealtimeEvent },
    Snapshot { epoch: u64, snapshot: Snapshot },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionAdvisory {
    pub loaded_build_version: i64,
    pub reported_build_version: i64,
}

impl fmt::Display for VersionAdvisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "server restarted with build {} (loaded build {})",
            self.reported_build_version, self.loaded_build_version
        )
    }
}

/// Discrete notifications published to consumers, in the order the runtime
/// applied them.
#[derive(Debug, Clone)]
pub enum SyncNotification {
    HealthChanged {
        from: ConnectionHealth,
        to: ConnectionHealth,
    },
    ConfigurationChanged(Arc<ServerConfiguration>),
    VersionAdvisory(VersionAdvisory),
    SnapshotReplaced(Arc<Snapshot>),
    Push(PushEvent),
}

/// Read-only view of connection state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStatus {
    pub health: ConnectionHealth,
    pub configuration: Option<Arc<ServerConfiguration>>,
    pub loaded_build_version: Option<i64>,
    pub advisory: Option<VersionAdvisory>,
}
