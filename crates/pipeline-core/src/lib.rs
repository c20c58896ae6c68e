pub mod config;
pub mod model;
pub mod push;
pub mod snapshot;

pub use config::{decode_server_configuration, ServerConfiguration};
pub use model::{
    PipelineStage, PipelineWorker, Project, ProjectInputSourceState, SchedulerHealth,
    TaskDefinition, TaskRepository,
};
pub use push::{decode_push_frame, PushEvent};
pub use snapshot::{decode_snapshot_response, GraphqlError, GraphqlResponse, Snapshot, SNAPSHOT_QUERY};

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("payload decode failed: {0}")]
    Json(String),
    #[error("graphql errors: {0}")]
    Graphql(String),
    #[error("response carried no data")]
    MissingData,
}

struct LenientIntVisitor;

impl<'de> Visitor<'de> for LenientIntVisitor {
    type Value = i64;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("an integer as number or numeric string")
    }

    fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(value)
    }

    fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        i64::try_from(value).map_err(|_| E::custom(format!("integer out of range: {value}")))
    }

    fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        if value.fract() != 0.0 || !value.is_finite() {
            return Err(E::custom(format!("expected whole number, got {value}")));
        }
        Ok(value as i64)
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        value
            .trim()
            .parse::<i64>()
            .map_err(|err| E::custom(format!("invalid integer '{value}': {err}")))
    }

    fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        self.visit_str(&value)
    }
}

/// Accepts `7`, `7.0` or `"7"`.
pub(crate) fn deserialize_int<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(LenientIntVisitor)
}

pub(crate) fn deserialize_opt_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    struct OptVisitor;

    impl<'de> Visitor<'de> for OptVisitor {
        type Value = Option<i64>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("an optional integer")
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
        where
            D: Deserializer<'de>,
        {
            deserialize_int(deserializer).map(Some)
        }
    }

    deserializer.deserialize_option(OptVisitor)
}

/// Reads an explicit `null` the same as a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}
