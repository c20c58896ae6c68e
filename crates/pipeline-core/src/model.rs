use crate::deserialize_opt_int;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Project {
    pub id: String,
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub root_path: String,
    #[serde(default)]
    pub log_root_path: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_int")]
    pub sample_number: Option<i64>,
    #[serde(default)]
    pub sample_x_min: Option<f64>,
    #[serde(default)]
    pub sample_x_max: Option<f64>,
    #[serde(default)]
    pub sample_y_min: Option<f64>,
    #[serde(default)]
    pub sample_y_max: Option<f64>,
    #[serde(default)]
    pub sample_z_min: Option<f64>,
    #[serde(default)]
    pub sample_z_max: Option<f64>,
    #[serde(default)]
    pub region_x_min: Option<f64>,
    #[serde(default)]
    pub region_x_max: Option<f64>,
    #[serde(default)]
    pub region_y_min: Option<f64>,
    #[serde(default)]
    pub region_y_max: Option<f64>,
    #[serde(default)]
    pub region_z_min: Option<f64>,
    #[serde(default)]
    pub region_z_max: Option<f64>,
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub is_processing: bool,
    #[serde(default)]
    pub user_parameters: Option<String>,
    #[serde(default)]
    pub input_source_state: ProjectInputSourceState,
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub stages: Vec<PipelineStage>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

/// Where a project's input data was last found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProjectInputSourceState {
    #[default]
    Unknown,
    BadLocation,
    Missing,
    Dashboard,
    Pipeline,
    Disappeared,
}

impl ProjectInputSourceState {
    pub fn code(self) -> i64 {
        match self {
            ProjectInputSourceState::Unknown => 0,
            ProjectInputSourceState::BadLocation => 1,
            ProjectInputSourceState::Missing => 2,
            ProjectInputSourceState::Dashboard => 3,
            ProjectInputSourceState::Pipeline => 4,
            ProjectInputSourceState::Disappeared => 5,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            1 => ProjectInputSourceState::BadLocation,
            2 => ProjectInputSourceState::Missing,
            3 => ProjectInputSourceState::Dashboard,
            4 => ProjectInputSourceState::Pipeline,
            5 => ProjectInputSourceState::Disappeared,
            _ => ProjectInputSourceState::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProjectInputSourceState::Unknown => "unknown",
            ProjectInputSourceState::BadLocation => "bad-location",
            ProjectInputSourceState::Missing => "missing",
            ProjectInputSourceState::Dashboard => "dashboard",
            ProjectInputSourceState::Pipeline => "pipeline",
            ProjectInputSourceState::Disappeared => "disappeared",
        }
    }

    pub fn is_available(self) -> bool {
        matches!(
            self,
            ProjectInputSourceState::Dashboard | ProjectInputSourceState::Pipeline
        )
    }
}

impl fmt::Display for ProjectInputSourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectInputSourceState {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase();
        if let Ok(code) = normalized.parse::<i64>() {
            return Ok(Self::from_code(code));
        }
        match normalized.as_str() {
            "unknown" => Ok(ProjectInputSourceState::Unknown),
            "bad-location" | "bad_location" | "badlocation" => {
                Ok(ProjectInputSourceState::BadLocation)
            }
            "missing" => Ok(ProjectInputSourceState::Missing),
            "dashboard" => Ok(ProjectInputSourceState::Dashboard),
            "pipeline" => Ok(ProjectInputSourceState::Pipeline),
            "disappeared" => Ok(ProjectInputSourceState::Disappeared),
            other => Err(format!("Unknown input source state: {other}")),
        }
    }
}

impl Serialize for ProjectInputSourceState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(self.code())
    }
}

impl<'de> Deserialize<'de> for ProjectInputSourceState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct StateVisitor;

        impl<'de> Visitor<'de> for StateVisitor {
            type Value = ProjectInputSourceState;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("an input source state as integer or name")
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(ProjectInputSourceState::from_code(value))
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(ProjectInputSourceState::from_code(
                    i64::try_from(value).unwrap_or(-1),
                ))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value.parse().map_err(E::custom)
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(ProjectInputSourceState::Unknown)
            }
        }

        deserializer.deserialize_any(StateVisitor)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PipelineStage {
    pub id: String,
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub project_id: String,
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub task_id: String,
    #[serde(default)]
    pub previous_stage_id: Option<String>,
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub dst_path: String,
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub is_processing: bool,
    #[serde(default, deserialize_with = "deserialize_opt_int")]
    pub function_type: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_opt_int")]
    pub depth: Option<i64>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PipelineWorker {
    pub id: String,
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub machine_id: String,
    #[serde(default)]
    pub last_seen: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_int")]
    pub status: Option<i64>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TaskDefinition {
    pub id: String,
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub script: String,
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub interpreter: String,
    #[serde(default)]
    pub work_units: Option<f64>,
    #[serde(default)]
    pub args: Option<String>,
    #[serde(default)]
    pub script_status: Option<bool>,
    #[serde(default)]
    pub task_repository: Option<TaskRepositoryRef>,
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub pipeline_stages: Vec<StageRef>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TaskRepository {
    pub id: String,
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub location: String,
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub task_definitions: Vec<TaskDefinitionRef>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TaskRepositoryRef {
    pub id: String,
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub location: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TaskDefinitionRef {
    pub id: String,
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StageRef {
    pub id: String,
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SchedulerHealth {
    #[serde(default, deserialize_with = "deserialize_opt_int")]
    pub status: Option<i64>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

impl SchedulerHealth {
    /// The scheduler reports `0` when it is running normally.
    pub fn is_healthy(&self) -> bool {
        self.status == Some(0)
    }
}
