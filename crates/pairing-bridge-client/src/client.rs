//! Bridge HTTP client.

use crate::error::BridgeError;
use crate::types::*;
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use urlencoding::encode;

/// REST client for the session provider bridge.
#[derive(Clone)]
pub struct BridgeClient {
    client: Client,
    base_url: String,
}

impl BridgeClient {
    /// Create a new bridge client.
    pub fn new(base_url: impl Into<String>) -> Result<Self, BridgeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let base_url: String = base_url.into();
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Get the configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if the bridge is healthy.
    pub async fn health_check(&self) -> bool {
        self.client
            .get(format!("{}/v1/health", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    /// Initialize provider state in `workdir` and open a connection for it.
    #[instrument(skip(self))]
    pub async fn open_session(
        &self,
        session_id: &str,
        workdir: &str,
        browser: &str,
    ) -> Result<OpenSessionResponse, BridgeError> {
        let request = OpenSessionRequest {
            id: session_id.to_string(),
            workdir: workdir.to_string(),
            browser: browser.to_string(),
        };

        let response = self
            .client
            .post(format!("{}/v1/sessions", self.base_url))
            .json(&request)
            .send()
            .await?;

        let response = check(response, session_id).await?;
        let opened: OpenSessionResponse = response.json().await?;
        debug!(registered = opened.registered, "Session opened");
        Ok(opened)
    }

    /// Ask the provider for a pairing code for `number` (digits only).
    #[instrument(skip(self))]
    pub async fn request_pairing_code(
        &self,
        session_id: &str,
        number: &str,
    ) -> Result<String, BridgeError> {
        let request = PairingCodeRequest {
            number: number.to_string(),
        };

        let response = self
            .client
            .post(format!(
                "{}/v1/sessions/{}/pairing-code",
                self.base_url,
                encode(session_id)
            ))
            .json(&request)
            .send()
            .await?;

        let response = check(response, session_id).await?;
        let body: PairingCodeResponse = response.json().await?;
        Ok(body.code)
    }

    /// Fetch connection events queued since the last poll.
    #[instrument(skip(self))]
    pub async fn poll_events(&self, session_id: &str) -> Result<Vec<BridgeEvent>, BridgeError> {
        let response = self
            .client
            .get(format!(
                "{}/v1/sessions/{}/events",
                self.base_url,
                encode(session_id)
            ))
            .send()
            .await?;

        let response = check(response, session_id).await?;
        let events: Vec<BridgeEvent> = response.json().await?;
        if !events.is_empty() {
            debug!("Received {} events", events.len());
        }
        Ok(events)
    }

    /// Send a text message through the session's connection.
    #[instrument(skip(self, text))]
    pub async fn send_message(
        &self,
        session_id: &str,
        to: &str,
        text: &str,
        quoted: Option<&str>,
    ) -> Result<String, BridgeError> {
        let request = SendMessageRequest {
            to: to.to_string(),
            text: text.to_string(),
            quoted: quoted.map(str::to_string),
        };

        let response = self
            .client
            .post(format!(
                "{}/v1/sessions/{}/messages",
                self.base_url,
                encode(session_id)
            ))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let msg = response.text().await.unwrap_or_default();
            warn!("Send failed: {}", msg);
            return Err(BridgeError::SendFailed(msg));
        }

        let body: SendMessageResponse = response.json().await?;
        debug!("Sent message to {}", to);
        Ok(body.message_id)
    }

    /// Close the session's connection. Closing an unknown session is not an error.
    #[instrument(skip(self))]
    pub async fn close_session(&self, session_id: &str) -> Result<(), BridgeError> {
        let response = self
            .client
            .delete(format!(
                "{}/v1/sessions/{}",
                self.base_url,
                encode(session_id)
            ))
            .send()
            .await?;

        match check(response, session_id).await {
            Ok(_) | Err(BridgeError::SessionNotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

async fn check(response: Response, session_id: &str) -> Result<Response, BridgeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(BridgeError::SessionNotFound(session_id.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    warn!(status = %status, body = %body, "Bridge request failed");
    Err(BridgeError::Api {
        status: status.as_u16(),
        body,
    })
}
