//! Connection state machine. Pure: it consumes adapter events and returns the
//! effects the runtime must carry out, so every transition is testable
//! without I/O.

use crate::events::{
    CloseReason, ConnectionHealth, SyncNotification, SyncStatus, VersionAdvisory,
};
use pipeline_core::{PushEvent, ServerConfiguration, Snapshot};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum MachineInput {
    HandshakeSucceeded(ServerConfiguration),
    HandshakeLost,
    RealtimeOpened,
    RealtimeClosed(CloseReason),
    Push(PushEvent),
    SnapshotFetched(Snapshot),
}

#[derive(Debug, Clone)]
pub enum Effect {
    /// Open (or re-open) the real-time channel. Only ever produced from a
    /// stored handshake result.
    ConnectRealtime { offset: i64 },
    CloseRealtime,
    RefreshSnapshot,
    /// Restart the poll schedule so fetches issued before a control loss are
    /// discarded instead of refilling the cleared snapshot.
    RestartPoller,
    Notify(SyncNotification),
}

#[derive(Debug, Default)]
pub struct ConnectionStateMachine {
    health: ConnectionHealth,
    configuration: Option<Arc<ServerConfiguration>>,
    loaded_build_version: Option<i64>,
    advisory: Option<VersionAdvisory>,
    snapshot: Arc<Snapshot>,
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn health(&self) -> ConnectionHealth {
        self.health
    }

    pub fn configuration(&self) -> Option<Arc<ServerConfiguration>> {
        self.configuration.clone()
    }

    pub fn loaded_build_version(&self) -> Option<i64> {
        self.loaded_build_version
    }

    pub fn advisory(&self) -> Option<VersionAdvisory> {
        self.advisory
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.clone()
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            health: self.health,
            configuration: self.configuration.clone(),
            loaded_build_version: self.loaded_build_version,
            advisory: self.advisory,
        }
    }

    pub fn apply(&mut self, input: MachineInput) -> Vec<Effect> {
        let mut effects = Vec::new();
        match input {
            MachineInput::HandshakeSucceeded(config) => {
                self.on_handshake(config, &mut effects);
            }
            MachineInput::HandshakeLost => {
                if self.health.has_control() {
                    self.set_health(ConnectionHealth::Disconnected, &mut effects);
                    effects.push(Effect::CloseRealtime);
                    effects.push(Effect::RestartPoller);
                    self.snapshot = Arc::new(Snapshot::default());
                    effects.push(Effect::Notify(SyncNotification::SnapshotReplaced(
                        self.snapshot.clone(),
                    )));
                }
            }
            MachineInput::RealtimeOpened => {
                if self.health == ConnectionHealth::HandshakeOnly {
                    self.set_health(ConnectionHealth::FullyConnected, &mut effects);
                }
            }
            MachineInput::RealtimeClosed(reason) => {
                if self.health == ConnectionHealth::FullyConnected && reason.is_unexpected() {
                    warn!(event = "realtime_lost", reason = %reason);
                    self.set_health(ConnectionHealth::HandshakeOnly, &mut effects);
                }
            }
            MachineInput::Push(event) => {
                if self.health.has_control() {
                    effects.push(Effect::Notify(SyncNotification::Push(event)));
                    effects.push(Effect::RefreshSnapshot);
                }
            }
            MachineInput::SnapshotFetched(snapshot) => {
                self.snapshot = Arc::new(snapshot);
                effects.push(Effect::Notify(SyncNotification::SnapshotReplaced(
                    self.snapshot.clone(),
                )));
            }
        }
        effects
    }

    fn on_handshake(&mut self, config: ServerConfiguration, effects: &mut Vec<Effect>) {
        let config = Arc::new(config);
        let previous = self.configuration.replace(config.clone());

        match self.loaded_build_version {
            None => {
                self.loaded_build_version = Some(config.build_version);
            }
            Some(loaded) if loaded != config.build_version => {
                let advisory = VersionAdvisory {
                    loaded_build_version: loaded,
                    reported_build_version: config.build_version,
                };
                if self.advisory != Some(advisory) {
                    warn!(
                        event = "build_version_changed",
                        loaded_build_version = loaded,
                        reported_build_version = config.build_version
                    );
                    self.advisory = Some(advisory);
                    effects.push(Effect::Notify(SyncNotification::VersionAdvisory(advisory)));
                }
            }
            Some(_) => {
                self.advisory = None;
            }
        }

        if previous.as_deref() != Some(config.as_ref()) {
            effects.push(Effect::Notify(SyncNotification::ConfigurationChanged(
                config.clone(),
            )));
        }

        let offset = config.realtime_channel_offset;
        match self.health {
            ConnectionHealth::Disconnected => {
                info!(
                    event = "handshake_ok",
                    build_version = config.build_version,
                    process_id = config.process_id,
                    offset
                );
                self.set_health(ConnectionHealth::HandshakeOnly, effects);
                effects.push(Effect::ConnectRealtime { offset });
            }
            ConnectionHealth::HandshakeOnly | ConnectionHealth::FullyConnected => {
                let previous_offset = previous.map(|prev| prev.realtime_channel_offset);
                if previous_offset != Some(offset) {
                    info!(event = "realtime_offset_changed", ?previous_offset, offset);
                    self.set_health(ConnectionHealth::HandshakeOnly, effects);
                    effects.push(Effect::ConnectRealtime { offset });
                }
            }
        }
    }

    fn set_health(&mut self, to: ConnectionHealth, effects: &mut Vec<Effect>) {
        let from = self.health;
        if from == to {
            return;
        }
        self.health = to;
        info!(event = "health_changed", from = %from, to = %to);
        effects.push(Effect::Notify(SyncNotification::HealthChanged { from, to }));
    }
}
