use pipeline_core::{SchedulerHealth, Snapshot};
use pipeline_sync::{ConnectionHealth, SyncStatus, VersionAdvisory};

/// What the monitor shows for a given connection state and snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewState {
    NotResponding,
    Connecting,
    Loading,
    Dashboard(DashboardSummary),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSummary {
    pub build_version: Option<i64>,
    pub process_id: Option<i64>,
    pub projects: usize,
    pub processing_projects: usize,
    pub workers: usize,
    pub stages: usize,
    pub scheduler: SchedulerState,
    pub thumbs_url: Option<String>,
    pub advisory: Option<VersionAdvisory>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerState {
    Unknown,
    Healthy,
    Unhealthy(Option<String>),
}

impl SchedulerState {
    fn from_health(health: Option<&SchedulerHealth>) -> Self {
        match health {
            None => SchedulerState::Unknown,
            Some(health) if health.is_healthy() => SchedulerState::Healthy,
            Some(health) => SchedulerState::Unhealthy(health.comment.clone()),
        }
    }
}

impl ViewState {
    /// The dashboard only renders once the real-time channel is up and a
    /// snapshot has been fetched since the last control loss.
    pub fn derive(status: &SyncStatus, snapshot: &Snapshot) -> Self {
        match status.health {
            ConnectionHealth::Disconnected => ViewState::NotResponding,
            ConnectionHealth::HandshakeOnly => ViewState::Connecting,
            ConnectionHealth::FullyConnected if snapshot.fetched_at.is_none() => {
                ViewState::Loading
            }
            ConnectionHealth::FullyConnected => {
                let configuration = status.configuration.as_deref();
                ViewState::Dashboard(DashboardSummary {
                    build_version: configuration.map(|config| config.build_version),
                    process_id: configuration.map(|config| config.process_id),
                    projects: snapshot.projects.len(),
                    processing_projects: snapshot.processing_project_count(),
                    workers: snapshot.workers.len(),
                    stages: snapshot.stages.len(),
                    scheduler: SchedulerState::from_health(snapshot.scheduler_health.as_ref()),
                    thumbs_url: configuration.and_then(|config| config.thumbs_url()),
                    advisory: status.advisory,
                })
            }
        }
    }

    pub fn status_line(&self) -> String {
        match self {
            ViewState::NotResponding => {
                "pipeline server is not responding; will continue to retry".to_string()
            }
            ViewState::Connecting => "establishing connection...".to_string(),
            ViewState::Loading => "loading pipeline state...".to_string(),
            ViewState::Dashboard(summary) => summary.status_line(),
        }
    }
}

impl DashboardSummary {
    fn status_line(&self) -> String {
        let mut parts = Vec::new();
        match (self.build_version, self.process_id) {
            (Some(build), Some(pid)) => parts.push(format!("build {build} pid {pid}")),
            (Some(build), None) => parts.push(format!("build {build}")),
            _ => {}
        }
        parts.push(format!(
            "projects {} ({} processing)",
            self.projects, self.processing_projects
        ));
        parts.push(format!("workers {}", self.workers));
        parts.push(format!("stages {}", self.stages));
        parts.push(match &self.scheduler {
            SchedulerState::Unknown => "scheduler unknown".to_string(),
            SchedulerState::Healthy => "scheduler ok".to_string(),
            SchedulerState::Unhealthy(Some(comment)) => format!("scheduler degraded: {comment}"),
            SchedulerState::Unhealthy(None) => "scheduler degraded".to_string(),
        });
        if let Some(url) = &self.thumbs_url {
            parts.push(format!("thumbs {url}"));
        }
        if let Some(advisory) = &self.advisory {
            parts.push(format!("{advisory}; reload to pick up the new build"));
        }
        parts.join(" | ")
    }
}
