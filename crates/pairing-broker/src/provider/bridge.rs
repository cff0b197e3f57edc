//! Session provider backed by the bridge sidecar.

use super::{
    Connection, ConnectionEvent, MessageId, ProviderError, ProviderHandle, SessionContext,
    SessionProvider,
};
use async_trait::async_trait;
use pairing_bridge_client::{BridgeClient, BridgeEvent, EventReceiver};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{debug, instrument};

/// Buffered events per connection before the poller waits on the controller.
const EVENT_BUFFER: usize = 16;

/// [`SessionProvider`] that drives the bridge's REST API.
#[derive(Clone)]
pub struct BridgeProvider {
    client: BridgeClient,
    poll_interval: Duration,
    browser: String,
}

impl BridgeProvider {
    pub fn new(client: BridgeClient, poll_interval: Duration, browser: impl Into<String>) -> Self {
        Self {
            client,
            poll_interval,
            browser: browser.into(),
        }
    }

    pub async fn health_check(&self) -> bool {
        self.client.health_check().await
    }
}

#[async_trait]
impl SessionProvider for BridgeProvider {
    #[instrument(skip(self, ctx), fields(session_id = %ctx.id))]
    async fn connect(&self, ctx: &SessionContext) -> Result<Connection, ProviderError> {
        let session_id = ctx.id.to_string();
        let workdir = ctx.workdir.to_string_lossy();

        let opened = self
            .client
            .open_session(&session_id, &workdir, &self.browser)
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let receiver = EventReceiver::new(self.client.clone(), session_id.clone(), self.poll_interval);
        let poller_id = session_id.clone();

        tokio::spawn(async move {
            let mut stream = Box::pin(receiver.stream());
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    next = stream.next() => {
                        let Some(event) = next else { break };
                        let closing = event.is_close();
                        if tx.send(event.into()).await.is_err() || closing {
                            break;
                        }
                    }
                }
            }
            debug!(session_id = %poller_id, "Event poller stopped");
        });

        Ok(Connection {
            handle: Arc::new(BridgeHandle {
                client: self.client.clone(),
                session_id,
                registered: opened.registered,
            }),
            events: rx,
        })
    }
}

impl From<BridgeEvent> for ConnectionEvent {
    fn from(event: BridgeEvent) -> Self {
        match event {
            BridgeEvent::Open { user_id } => ConnectionEvent::Opened { user_id },
            BridgeEvent::Close { status_code } => ConnectionEvent::Closed { status_code },
        }
    }
}

struct BridgeHandle {
    client: BridgeClient,
    session_id: String,
    registered: bool,
}

#[async_trait]
impl ProviderHandle for BridgeHandle {
    fn is_registered(&self) -> bool {
        self.registered
    }

    async fn request_pairing_code(&self, number: &str) -> Result<String, ProviderError> {
        self.client
            .request_pairing_code(&self.session_id, number)
            .await
            .map_err(|e| ProviderError::Rejected(e.to_string()))
    }

    async fn send_message(
        &self,
        to: &str,
        text: &str,
        quoted: Option<&MessageId>,
    ) -> Result<MessageId, ProviderError> {
        self.client
            .send_message(&self.session_id, to, text, quoted.map(|q| q.0.as_str()))
            .await
            .map(MessageId)
            .map_err(|e| ProviderError::SendFailed(e.to_string()))
    }

    async fn close(&self) -> Result<(), ProviderError> {
        Ok(self.client.close_session(&self.session_id).await?)
    }
}
