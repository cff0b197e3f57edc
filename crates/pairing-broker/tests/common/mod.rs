//! Shared test fixtures: a scripted session provider and controller setup.

#![allow(dead_code)]

use async_trait::async_trait;
use pairing_broker::config::DeliveryConfig;
use pairing_broker::provider::{
    Connection, ConnectionEvent, MessageId, ProviderError, ProviderHandle, SessionContext,
    SessionProvider,
};
use pairing_broker::session::CREDENTIAL_FILE;
use pairing_broker::{
    DeliveryFormatter, DisconnectPolicy, LifecycleTimings, SessionController, SessionRegistry,
    SessionStore,
};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// How one `connect` call behaves.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub fail_connect: bool,
    pub registered: bool,
    pub pairing_code: Result<String, String>,
    pub fail_send: bool,
    /// How long `connect` takes to return
    pub connect_delay: Duration,
}

impl Default for Attempt {
    fn default() -> Self {
        Self {
            fail_connect: false,
            registered: false,
            pairing_code: Ok("ABCD-EFGH".into()),
            fail_send: false,
            connect_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub to: String,
    pub text: String,
    pub quoted: Option<String>,
}

#[derive(Default)]
struct Recorded {
    attempts: VecDeque<Attempt>,
    contexts: Vec<SessionContext>,
    senders: Vec<mpsc::Sender<ConnectionEvent>>,
    pairing_requests: Vec<String>,
    sent: Vec<SentMessage>,
    closes: usize,
}

/// Provider whose connections are driven by the test.
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    recorded: Arc<Mutex<Recorded>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the behavior of the next `connect`. Unscripted connects use
    /// [`Attempt::default`].
    pub fn script(&self, attempt: Attempt) -> &Self {
        self.recorded.lock().unwrap().attempts.push_back(attempt);
        self
    }

    pub fn connects(&self) -> Vec<SessionContext> {
        self.recorded.lock().unwrap().contexts.clone()
    }

    pub fn pairing_requests(&self) -> Vec<String> {
        self.recorded.lock().unwrap().pairing_requests.clone()
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.recorded.lock().unwrap().sent.clone()
    }

    pub fn closes(&self) -> usize {
        self.recorded.lock().unwrap().closes
    }

    /// Working directory of the most recent connection.
    pub fn last_workdir(&self) -> PathBuf {
        self.connects()
            .last()
            .expect("no connection yet")
            .workdir
            .clone()
    }

    /// Emit an event on the most recent connection. Returns false when the
    /// broker no longer listens.
    pub async fn emit(&self, event: ConnectionEvent) -> bool {
        let sender = self
            .recorded
            .lock()
            .unwrap()
            .senders
            .last()
            .cloned()
            .expect("no connection yet");
        sender.send(event).await.is_ok()
    }

    /// Write the credential artifact the way the real provider would.
    pub fn write_credentials(&self, contents: &[u8]) {
        std::fs::write(self.last_workdir().join(CREDENTIAL_FILE), contents).unwrap();
    }
}

#[async_trait]
impl SessionProvider for ScriptedProvider {
    async fn connect(&self, ctx: &SessionContext) -> Result<Connection, ProviderError> {
        let attempt = {
            let mut recorded = self.recorded.lock().unwrap();
            recorded.contexts.push(ctx.clone());
            recorded.attempts.pop_front().unwrap_or_default()
        };

        if !attempt.connect_delay.is_zero() {
            tokio::time::sleep(attempt.connect_delay).await;
        }

        if attempt.fail_connect {
            return Err(ProviderError::Unavailable("scripted connect failure".into()));
        }

        let (tx, rx) = mpsc::channel(8);
        self.recorded.lock().unwrap().senders.push(tx);

        Ok(Connection {
            handle: Arc::new(ScriptedHandle {
                attempt,
                recorded: self.recorded.clone(),
            }),
            events: rx,
        })
    }
}

struct ScriptedHandle {
    attempt: Attempt,
    recorded: Arc<Mutex<Recorded>>,
}

#[async_trait]
impl ProviderHandle for ScriptedHandle {
    fn is_registered(&self) -> bool {
        self.attempt.registered
    }

    async fn request_pairing_code(&self, number: &str) -> Result<String, ProviderError> {
        self.recorded
            .lock()
            .unwrap()
            .pairing_requests
            .push(number.to_string());
        self.attempt
            .pairing_code
            .clone()
            .map_err(ProviderError::Rejected)
    }

    async fn send_message(
        &self,
        to: &str,
        text: &str,
        quoted: Option<&MessageId>,
    ) -> Result<MessageId, ProviderError> {
        if self.attempt.fail_send {
            return Err(ProviderError::SendFailed("scripted send failure".into()));
        }

        let mut recorded = self.recorded.lock().unwrap();
        recorded.sent.push(SentMessage {
            to: to.to_string(),
            text: text.to_string(),
            quoted: quoted.map(|q| q.0.clone()),
        });
        Ok(MessageId(format!("MSG-{}", recorded.sent.len())))
    }

    async fn close(&self) -> Result<(), ProviderError> {
        self.recorded.lock().unwrap().closes += 1;
        Ok(())
    }
}

/// Timings short enough for tests.
pub fn fast_timings() -> LifecycleTimings {
    LifecycleTimings {
        code_request_delay: Duration::ZERO,
        settle_delay: Duration::from_millis(20),
        retry_backoff: Duration::from_millis(30),
        cleanup_grace: Duration::from_millis(10),
        pairing_timeout: Duration::from_secs(5),
    }
}

pub struct Harness {
    pub _dir: tempfile::TempDir,
    pub provider: ScriptedProvider,
    pub store: SessionStore,
    pub registry: SessionRegistry,
    pub controller: SessionController,
}

pub fn harness() -> Harness {
    harness_with(fast_timings(), 5)
}

pub fn harness_with(timings: LifecycleTimings, max_retries: u32) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new();
    let store = SessionStore::new(dir.path().join("sessions"));
    let registry = SessionRegistry::new();
    let controller = SessionController::new(
        Arc::new(provider.clone()),
        store.clone(),
        registry.clone(),
        DeliveryFormatter::new(DeliveryConfig::default()),
        DisconnectPolicy::new(max_retries),
        timings,
    );

    Harness {
        _dir: dir,
        provider,
        store,
        registry,
        controller,
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
