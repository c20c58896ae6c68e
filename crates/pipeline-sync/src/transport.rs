//! Network seams: the pull-based control API and the push-based real-time
//! connector, with their HTTP and WebSocket implementations.

use crate::error::TransportError;
use crate::settings::{RealtimeEndpoint, SyncSettings};
use async_trait::async_trait;
use chrono::Utc;
use futures_util::{future, stream::BoxStream, StreamExt};
use pipeline_core::{
    decode_server_configuration, decode_snapshot_response, ServerConfiguration, Snapshot,
    SNAPSHOT_QUERY,
};
use reqwest::Client;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;
use url::Url;

/// Inbound text frames of one open real-time connection. The stream ends
/// when the server closes the connection.
pub type PushFrames = BoxStream<'static, Result<String, TransportError>>;

/// Request/response access to the backend: the handshake and the snapshot
/// query share this transport.
#[async_trait]
pub trait ControlApi: Send + Sync {
    async fn fetch_configuration(&self) -> Result<ServerConfiguration, TransportError>;

    async fn fetch_snapshot(&self) -> Result<Snapshot, TransportError>;
}

#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    async fn open(&self, endpoint: &RealtimeEndpoint) -> Result<PushFrames, TransportError>;
}

#[derive(Clone)]
pub struct HttpControlApi {
    http: Client,
    handshake_url: Url,
    graphql_url: Url,
}

impl HttpControlApi {
    pub fn new(settings: &SyncSettings) -> Result<Self, TransportError> {
        let handshake_url = settings
            .handshake_url()
            .map_err(|err| TransportError::Endpoint(err.to_string()))?;
        let graphql_url = settings
            .graphql_url()
            .map_err(|err| TransportError::Endpoint(err.to_string()))?;
        let http = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(TransportError::Http)?;
        Ok(Self {
            http,
            handshake_url,
            graphql_url,
        })
    }

    pub fn handshake_url(&self) -> &Url {
        &self.handshake_url
    }

    pub fn graphql_url(&self) -> &Url {
        &self.graphql_url
    }

    async fn read_success_body(res: reqwest::Response) -> Result<Vec<u8>, TransportError> {
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(TransportError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(res.bytes().await?.to_vec())
    }
}

#[async_trait]
impl ControlApi for HttpControlApi {
    async fn fetch_configuration(&self) -> Result<ServerConfiguration, TransportError> {
        let res = self.http.get(self.handshake_url.clone()).send().await?;
        let body = Self::read_success_body(res).await?;
        Ok(decode_server_configuration(&body)?)
    }

    async fn fetch_snapshot(&self) -> Result<Snapshot, TransportError> {
        let res = self
            .http
            .post(self.graphql_url.clone())
            .json(&serde_json::json!({ "query": SNAPSHOT_QUERY }))
            .send()
            .await?;
        let body = Self::read_success_body(res).await?;
        Ok(decode_snapshot_response(&body, Utc::now())?)
    }
}

/// WebSocket-backed real-time connector. Only inbound frames are consumed.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsConnector;

#[async_trait]
impl RealtimeConnector for WsConnector {
    async fn open(&self, endpoint: &RealtimeEndpoint) -> Result<PushFrames, TransportError> {
        let url = endpoint
            .url()
            .map_err(|err| TransportError::Endpoint(err.to_string()))?;
        let (ws, _) = connect_async(url).await?;
        let frames = ws.filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => Some(Ok(text)),
                    Err(err) => {
                        debug!("realtime_binary_frame_dropped: {err}");
                        None
                    }
                },
                Ok(_) => None,
                Err(err) => Some(Err(TransportError::from(err))),
            })
        });
        Ok(frames.boxed())
    }
}
