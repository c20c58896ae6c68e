use std::{env, time::Duration};
use thiserror::Error;
use url::Url;

pub const DEFAULT_CONTROL_HOST: &str = "pipeline-api";
pub const DEFAULT_CONTROL_PORT: u16 = 6001;
pub const DEFAULT_GRAPHQL_PATH: &str = "/graphql";
pub const DEFAULT_INTERNAL_API_BASE: &str = "/api/v1/internal/";
pub const HANDSHAKE_RESOURCE: &str = "serverConfiguration";
pub const DEFAULT_REALTIME_PATH: &str = "/realtime";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 15_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_HANDSHAKE_INTERVAL_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
    #[error("real-time port out of range: base {base} + offset {offset}")]
    PortOutOfRange { base: u16, offset: i64 },
    #[error("invalid url: {0}")]
    Url(String),
}

/// Backoff between reconnect attempts: doubles from `initial` up to `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn next_backoff(&self, current: Duration) -> Duration {
        let next = current + current;
        if next > self.max {
            self.max
        } else {
            next
        }
    }
}

/// Address of one real-time channel instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeEndpoint {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl RealtimeEndpoint {
    pub fn url(&self) -> Result<Url, SettingsError> {
        Url::parse(&format!("ws://{}:{}{}", self.host, self.port, self.path))
            .map_err(|err| SettingsError::Url(err.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    pub control_host: String,
    pub control_port: u16,
    pub graphql_path: String,
    pub internal_api_base: String,
    pub realtime_base_port: u16,
    pub realtime_path: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub handshake_interval: Duration,
    pub refresh_on_push: bool,
    pub retry: RetryPolicy,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            control_host: DEFAULT_CONTROL_HOST.to_string(),
            control_port: DEFAULT_CONTROL_PORT,
            graphql_path: DEFAULT_GRAPHQL_PATH.to_string(),
            internal_api_base: DEFAULT_INTERNAL_API_BASE.to_string(),
            realtime_base_port: DEFAULT_CONTROL_PORT,
            realtime_path: DEFAULT_REALTIME_PATH.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            handshake_interval: Duration::from_millis(DEFAULT_HANDSHAKE_INTERVAL_MS),
            refresh_on_push: true,
            retry: RetryPolicy::default(),
        }
    }
}

impl SyncSettings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolves settings from `PIPELINE_*` keys; blank values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let control_host = get("PIPELINE_API_HOST").unwrap_or(defaults.control_host);
        let control_port = match get("PIPELINE_API_PORT") {
            Some(value) => parse_port("PIPELINE_API_PORT", &value)?,
            None => defaults.control_port,
        };
        let realtime_base_port = match get("PIPELINE_REALTIME_BASE_PORT") {
            Some(value) => parse_port("PIPELINE_REALTIME_BASE_PORT", &value)?,
            None => control_port,
        };
        let poll_interval = match get("PIPELINE_POLL_INTERVAL_MS") {
            Some(value) => parse_millis("PIPELINE_POLL_INTERVAL_MS", &value)?,
            None => defaults.poll_interval,
        };
        let request_timeout = match get("PIPELINE_REQUEST_TIMEOUT_MS") {
            Some(value) => parse_millis("PIPELINE_REQUEST_TIMEOUT_MS", &value)?,
            None => defaults.request_timeout,
        };
        let handshake_interval = match get("PIPELINE_HANDSHAKE_INTERVAL_MS") {
            Some(value) => parse_millis("PIPELINE_HANDSHAKE_INTERVAL_MS", &value)?,
            None => defaults.handshake_interval,
        };
        let refresh_on_push = match get("PIPELINE_REFRESH_ON_PUSH") {
            Some(value) => parse_bool_flag(&value).ok_or(SettingsError::InvalidValue {
                key: "PIPELINE_REFRESH_ON_PUSH",
                value,
            })?,
            None => defaults.refresh_on_push,
        };

        Ok(Self {
            control_host,
            control_port,
            graphql_path: get("PIPELINE_GRAPHQL_PATH").unwrap_or(defaults.graphql_path),
            internal_api_base: get("PIPELINE_INTERNAL_API_BASE")
                .unwrap_or(defaults.internal_api_base),
            realtime_base_port,
            realtime_path: get("PIPELINE_REALTIME_PATH").unwrap_or(defaults.realtime_path),
            poll_interval,
            request_timeout,
            handshake_interval,
            refresh_on_push,
            retry: defaults.retry,
        })
    }

    pub fn control_base_url(&self) -> Result<Url, SettingsError> {
        Url::parse(&format!("http://{}:{}/", self.control_host, self.control_port))
            .map_err(|err| SettingsError::Url(err.to_string()))
    }

    pub fn handshake_url(&self) -> Result<Url, SettingsError> {
        let base = self.control_base_url()?;
        let mut api_base = self.internal_api_base.trim_start_matches('/').to_string();
        if !api_base.is_empty() && !api_base.ends_with('/') {
            api_base.push('/');
        }
        base.join(&api_base)
            .and_then(|api| api.join(HANDSHAKE_RESOURCE))
            .map_err(|err| SettingsError::Url(err.to_string()))
    }

    pub fn graphql_url(&self) -> Result<Url, SettingsError> {
        self.control_base_url()?
            .join(self.graphql_path.trim_start_matches('/'))
            .map_err(|err| SettingsError::Url(err.to_string()))
    }

    /// Real-time address for `offset`: control host, `realtime_base_port + offset`.
    pub fn realtime_endpoint(&self, offset: i64) -> Result<RealtimeEndpoint, SettingsError> {
        let port = i64::from(self.realtime_base_port)
            .checked_add(offset)
            .and_then(|port| u16::try_from(port).ok())
            .filter(|port| *port != 0)
            .ok_or(SettingsError::PortOutOfRange {
                base: self.realtime_base_port,
                offset,
            })?;
        let path = if self.realtime_path.starts_with('/') {
            self.realtime_path.clone()
        } else {
            format!("/{}", self.realtime_path)
        };
        Ok(RealtimeEndpoint {
            host: self.control_host.clone(),
            port,
            path,
        })
    }
}

pub fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_port(key: &'static str, value: &str) -> Result<u16, SettingsError> {
    value
        .parse::<u16>()
        .ok()
        .filter(|port| *port != 0)
        .ok_or_else(|| SettingsError::InvalidValue {
            key,
            value: value.to_string(),
        })
}

fn parse_millis(key: &'static str, value: &str) -> Result<Duration, SettingsError> {
    value
        .parse::<u64>()
        .ok()
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .ok_or_else(|| SettingsError::InvalidValue {
            key,
            value: value.to_string(),
        })
}

/// Whole milliseconds for log fields, saturating at `u64::MAX`.
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
