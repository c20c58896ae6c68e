use crate::model::{
    PipelineStage, PipelineWorker, Project, SchedulerHealth, TaskDefinition, TaskRepository,
};
use crate::DecodeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Consolidated query issued on every poll tick.
pub const SNAPSHOT_QUERY: &str = r#"query {
  projects {
    id name description root_path log_root_path sample_number
    sample_x_min sample_x_max sample_y_min sample_y_max sample_z_min sample_z_max
    region_x_min region_x_max region_y_min region_y_max region_z_min region_z_max
    is_processing user_parameters input_source_state
  }
  pipelineStages {
    id name description project_id task_id previous_stage_id dst_path
    is_processing function_type depth
  }
  pipelineWorkers { id name description machine_id last_seen status }
  taskDefinitions {
    id name description script interpreter work_units args script_status
    task_repository { id name location }
    pipeline_stages { id name }
  }
  taskRepositories {
    id name description location
    task_definitions { id name }
  }
  pipelineVolume
  schedulerHealth { status comment }
}"#;

/// Full read model of the backend.
///
/// A snapshot is only ever replaced as a whole; fields are never carried
/// over from an earlier poll.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub projects: Vec<Project>,
    #[serde(default, rename = "pipelineWorkers", deserialize_with = "crate::null_as_default")]
    pub workers: Vec<PipelineWorker>,
    #[serde(default, rename = "pipelineStages", deserialize_with = "crate::null_as_default")]
    pub stages: Vec<PipelineStage>,
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub task_definitions: Vec<TaskDefinition>,
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub task_repositories: Vec<TaskRepository>,
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub pipeline_volume: String,
    #[serde(default)]
    pub scheduler_health: Option<SchedulerHealth>,
    #[serde(skip)]
    pub fetched_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.fetched_at.is_none()
            && self.projects.is_empty()
            && self.workers.is_empty()
            && self.stages.is_empty()
            && self.task_definitions.is_empty()
            && self.task_repositories.is_empty()
    }

    pub fn worker_map(&self) -> HashMap<&str, &PipelineWorker> {
        self.workers
            .iter()
            .map(|worker| (worker.id.as_str(), worker))
            .collect()
    }

    pub fn stages_for_project<'a>(
        &'a self,
        project_id: &'a str,
    ) -> impl Iterator<Item = &'a PipelineStage> + 'a {
        self.stages
            .iter()
            .filter(move |stage| stage.project_id == project_id)
    }

    pub fn processing_project_count(&self) -> usize {
        self.projects
            .iter()
            .filter(|project| project.is_processing)
            .count()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphqlResponse<T> {
    pub data: Option<T>,
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub errors: Vec<GraphqlError>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GraphqlError {
    pub message: String,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

/// Decodes a GraphQL response body into a snapshot stamped with `fetched_at`.
///
/// Partial data alongside errors is accepted; errors without data are not.
pub fn decode_snapshot_response(
    bytes: &[u8],
    fetched_at: DateTime<Utc>,
) -> Result<Snapshot, DecodeError> {
    let response: GraphqlResponse<Snapshot> =
        serde_json::from_slice(bytes).map_err(|err| DecodeError::Json(err.to_string()))?;
    match response.data {
        Some(mut snapshot) => {
            snapshot.fetched_at = Some(fetched_at);
            Ok(snapshot)
        }
        None if !response.errors.is_empty() => Err(DecodeError::Graphql(
            response
                .errors
                .iter()
                .map(|error| error.message.as_str())
                .collect::<Vec<_>>()
                .join("; "),
        )),
        None => Err(DecodeError::MissingData),
    }
}
