use reqwest::{Client as HttpClient, Response, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::retry::{RetryConfig, with_retry};
use crate::types::*;
use observer_core::{Config, Error, Result, TransportConfig, TransportError};

/// Request/response access to the chat backend
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send a user message and wait for the assistant's reply
    async fn send_message(&self, text: &str) -> Result<SendReply>;

    /// Fetch `limit` messages starting `offset` messages back from the newest
    async fn fetch_history(&self, offset: usize, limit: usize) -> Result<HistoryPage>;

    /// Delete the whole conversation on the server
    async fn clear_history(&self) -> Result<()>;
}

/// REST binding for the Observer server (`/api/v1/chat`)
pub struct HttpTransport {
    client: HttpClient,
    base_url: String,
    session_id: String,
    timeout_ms: u64,
    retry: RetryConfig,
}

impl HttpTransport {
    pub fn new(transport: &TransportConfig, session_id: impl Into<String>) -> Result<Self> {
        let client = HttpClient::builder()
            .timeout(Duration::from_millis(transport.timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: transport.base_url.trim_end_matches('/').to_string(),
            session_id: session_id.into(),
            timeout_ms: transport.timeout_ms,
            retry: RetryConfig::from_transport(transport),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.transport, config.chat.session_id.clone())
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn chat_url(&self) -> String {
        format!("{}/api/v1/chat", self.base_url)
    }

    fn history_url(&self, extra: &[(&str, String)]) -> Result<Url> {
        let mut params = vec![("session_id", self.session_id.clone())];
        params.extend(extra.iter().map(|(k, v)| (*k, v.clone())));

        Url::parse_with_params(&format!("{}/history", self.chat_url()), &params)
            .map_err(|e| Error::Config(format!("invalid base URL {}: {}", self.base_url, e)))
    }

    fn map_request_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            TransportError::Timeout(self.timeout_ms).into()
        } else if err.is_decode() {
            TransportError::Decode(err.to_string()).into()
        } else {
            TransportError::Network(err.to_string()).into()
        }
    }

    async fn check_status(&self, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(TransportError::status(status.as_u16(), body).into())
    }

    async fn decode<T: DeserializeOwned>(&self, response: Response) -> Result<T> {
        let response = self.check_status(response).await?;
        let body = response.text().await.map_err(|e| self.map_request_error(e))?;
        serde_json::from_str(&body).map_err(|e| TransportError::Decode(e.to_string()).into())
    }

    async fn fetch_history_once(&self, offset: usize, limit: usize) -> Result<HistoryPage> {
        let url = self.history_url(&[("offset", offset.to_string()), ("limit", limit.to_string())])?;
        let response = self.client.get(url).send().await.map_err(|e| self.map_request_error(e))?;
        self.decode(response).await
    }

    async fn clear_history_once(&self) -> Result<()> {
        let url = self.history_url(&[])?;
        let response = self.client.delete(url).send().await.map_err(|e| self.map_request_error(e))?;
        self.check_status(response).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send_message(&self, text: &str) -> Result<SendReply> {
        let request = SendRequest { message: text, context: SendContext { session_id: &self.session_id } };

        tracing::debug!(session_id = %self.session_id, chars = text.chars().count(), "sending chat message");
        let response =
            self.client.post(self.chat_url()).json(&request).send().await.map_err(|e| self.map_request_error(e))?;
        self.decode(response).await
    }

    async fn fetch_history(&self, offset: usize, limit: usize) -> Result<HistoryPage> {
        tracing::debug!(session_id = %self.session_id, offset, limit, "fetching chat history");
        with_retry(&self.retry, "fetch_history", || self.fetch_history_once(offset, limit)).await
    }

    async fn clear_history(&self) -> Result<()> {
        tracing::info!(session_id = %self.session_id, "clearing chat history");
        with_retry(&self.retry, "clear_history", || self.clear_history_once()).await
    }
}
