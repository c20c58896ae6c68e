use crate::{deserialize_int, deserialize_opt_int, DecodeError};
use serde::{Deserialize, Deserializer, Serialize};

/// Server-side configuration returned by the handshake endpoint.
///
/// Replaced wholesale on every successful handshake; never merged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfiguration {
    #[serde(deserialize_with = "deserialize_int")]
    pub build_version: i64,
    #[serde(deserialize_with = "deserialize_int")]
    pub process_id: i64,
    #[serde(default, deserialize_with = "crate::null_as_default")]
    pub thumbs_hostname: String,
    #[serde(default = "default_thumbs_port", deserialize_with = "thumbs_port_or_default")]
    pub thumbs_port: i64,
    #[serde(default = "default_thumbs_path", deserialize_with = "thumbs_path_or_default")]
    pub thumbs_path: String,
    #[serde(
        default = "default_is_active_pipeline",
        deserialize_with = "is_active_pipeline_or_default"
    )]
    pub is_active_pipeline: bool,
    #[serde(
        default,
        alias = "socketIoPortOffset",
        deserialize_with = "offset_or_default"
    )]
    pub realtime_channel_offset: i64,
}

fn default_thumbs_port() -> i64 {
    80
}

fn default_thumbs_path() -> String {
    "/thumbnail".to_string()
}

fn default_is_active_pipeline() -> bool {
    true
}

// An explicit `null` takes the same default as a missing key.

fn thumbs_port_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    deserialize_opt_int(deserializer).map(|port| port.unwrap_or_else(default_thumbs_port))
}

fn thumbs_path_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Option::<String>::deserialize(deserializer).map(|path| path.unwrap_or_else(default_thumbs_path))
}

fn is_active_pipeline_or_default<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<bool, D::Error> {
    Option::<bool>::deserialize(deserializer)
        .map(|active| active.unwrap_or_else(default_is_active_pipeline))
}

fn offset_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    deserialize_opt_int(deserializer).map(Option::unwrap_or_default)
}

impl ServerConfiguration {
    /// Base URL of the thumbnail service, or `None` when the server did not
    /// advertise a host.
    pub fn thumbs_url(&self) -> Option<String> {
        let host = self.thumbs_hostname.trim();
        if host.is_empty() {
            return None;
        }
        let path = if self.thumbs_path.starts_with('/') {
            self.thumbs_path.clone()
        } else {
            format!("/{}", self.thumbs_path)
        };
        Some(format!("http://{host}:{}{path}", self.thumbs_port))
    }
}

pub fn decode_server_configuration(bytes: &[u8]) -> Result<ServerConfiguration, DecodeError> {
    serde_json::from_slice(bytes).map_err(|err| DecodeError::Json(err.to_string()))
}
