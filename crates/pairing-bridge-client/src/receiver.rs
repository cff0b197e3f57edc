//! Connection event receiver with polling.

use crate::client::BridgeClient;
use crate::error::BridgeError;
use crate::types::BridgeEvent;
use std::time::Duration;
use tokio::time::sleep;
use tokio_stream::Stream;
use tracing::{debug, error};

/// Receiver that polls the bridge for a session's connection events.
pub struct EventReceiver {
    client: BridgeClient,
    session_id: String,
    poll_interval: Duration,
}

impl EventReceiver {
    /// Create a new event receiver.
    pub fn new(client: BridgeClient, session_id: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            client,
            session_id: session_id.into(),
            poll_interval,
        }
    }

    /// Start receiving events as an async stream.
    ///
    /// The stream ends once the bridge forgets the session.
    pub fn stream(self) -> impl Stream<Item = BridgeEvent> {
        async_stream::stream! {
            loop {
                match self.client.poll_events(&self.session_id).await {
                    Ok(events) => {
                        for event in events {
                            debug!(session_id = %self.session_id, ?event, "Connection event");
                            yield event;
                        }
                    }
                    Err(BridgeError::SessionNotFound(_)) => {
                        debug!(session_id = %self.session_id, "Session gone, stopping receiver");
                        break;
                    }
                    Err(e) => {
                        error!(session_id = %self.session_id, "Poll error: {}", e);
                        // Back off on error
                        sleep(Duration::from_secs(5)).await;
                        continue;
                    }
                }

                sleep(self.poll_interval).await;
            }
        }
    }
}
