//! Connection and state-sync layer for the pipeline monitor.
//!
//! Three channels feed one [`ConnectionStateMachine`]: the configuration
//! handshake, the real-time push channel and the snapshot poller. The
//! [`SyncRuntime`] owns all of them and publishes the resulting health,
//! configuration and snapshot through a [`SyncHandle`].

pub mod error;
pub mod events;
pub mod handshake;
pub mod machine;
pub mod poller;
pub mod realtime;
pub mod runtime;
pub mod settings;
pub mod transport;

pub use error::{FailureCategory, TransportError};
pub use events::{
    CloseReason, ConnectionHealth, HandshakeEvent, RealtimeEvent, SyncEvent, SyncNotification,
    SyncStatus, VersionAdvisory,
};
pub use handshake::{HandshakeClient, HandshakeSettings};
pub use machine::{ConnectionStateMachine, Effect, MachineInput};
pub use poller::SnapshotPoller;
pub use realtime::RealtimeChannel;
pub use runtime::{SyncHandle, SyncRuntime};
pub use settings::{parse_bool_flag, RealtimeEndpoint, RetryPolicy, SettingsError, SyncSettings};
pub use transport::{ControlApi, HttpControlApi, PushFrames, RealtimeConnector, WsConnector};
