//! Session lifecycle: issue a pairing code, wait for authentication, deliver
//! the credential once, clean up.

mod policy;

pub use policy::{
    DisconnectAction, DisconnectPolicy, LifecycleTimings, STATUS_CONNECTION_REPLACED,
    STATUS_FORBIDDEN, STATUS_LOGGED_OUT, STATUS_MULTIDEVICE_MISMATCH, STATUS_RESTART_REQUIRED,
};

use crate::delivery::{DeliveryContext, DeliveryFormatter};
use crate::error::BrokerError;
use crate::phone::normalize_phone_number;
use crate::provider::{Connection, ConnectionEvent, ProviderHandle, SessionContext, SessionProvider};
use crate::session::{
    LifecycleState, Session, SessionId, SessionRegistry, SessionStore, StateCounts,
    CREDENTIAL_FILE,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, error, info, instrument, warn};

/// Pairing code handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PairingCode(String);

impl PairingCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// How a session driver stopped.
enum Outcome {
    Delivered,
    Failed(BrokerError),
    Shutdown,
}

/// Orchestrates sessions from pairing request to cleanup.
///
/// Each accepted request gets its own driver task; drivers share nothing but
/// the registry, store and provider.
#[derive(Clone)]
pub struct SessionController {
    provider: Arc<dyn SessionProvider>,
    store: SessionStore,
    registry: SessionRegistry,
    formatter: Arc<DeliveryFormatter>,
    policy: DisconnectPolicy,
    timings: LifecycleTimings,
    shutdown: Arc<watch::Sender<bool>>,
}

impl SessionController {
    pub fn new(
        provider: Arc<dyn SessionProvider>,
        store: SessionStore,
        registry: SessionRegistry,
        formatter: DeliveryFormatter,
        policy: DisconnectPolicy,
        timings: LifecycleTimings,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            provider,
            store,
            registry,
            formatter: Arc::new(formatter),
            policy,
            timings,
            shutdown: Arc::new(shutdown),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Sessions that currently hold an open provider connection.
    pub async fn active_sessions(&self) -> usize {
        self.registry.active_count().await
    }

    /// Live sessions per lifecycle state.
    pub async fn session_states(&self) -> StateCounts {
        self.registry.state_counts().await
    }

    /// Start a session for `raw_number` and return its pairing code.
    ///
    /// Validation failures create nothing. Once the code is returned the
    /// session continues in the background and its outcome is only logged.
    #[instrument(skip_all)]
    pub async fn request_pairing(&self, raw_number: &str) -> Result<PairingCode, BrokerError> {
        let phone_number = normalize_phone_number(raw_number)?;
        let id = SessionId::generate();
        let workdir = self.store.create(&id).await?;
        let session = Session::new(id, phone_number, workdir);

        info!(
            session_id = %session.id,
            phone_number = %session.phone_number,
            "Pairing requested"
        );

        let connection = match self.provider.connect(&context(&session)).await {
            Ok(connection) => connection,
            Err(e) => {
                error!(session_id = %session.id, "Provider initialization failed: {}", e);
                self.discard(&session.id).await;
                return Err(BrokerError::ProviderInit(e.to_string()));
            }
        };

        let code = match self.issue_code(&session, connection.handle.as_ref()).await {
            Ok(code) => code,
            Err(e) => {
                error!(session_id = %session.id, "Pairing code request failed: {}", e);
                close(&session.id, connection.handle.as_ref()).await;
                self.discard(&session.id).await;
                return Err(e);
            }
        };

        self.registry
            .register(&session.id, connection.handle.clone())
            .await;
        self.registry.set_state(&session.id, session.state).await;

        info!(session_id = %session.id, "Pairing code issued");

        let controller = self.clone();
        tokio::spawn(async move { controller.drive(session, connection).await });

        Ok(PairingCode(code))
    }

    async fn issue_code(
        &self,
        session: &Session,
        handle: &dyn ProviderHandle,
    ) -> Result<String, BrokerError> {
        if handle.is_registered() {
            return Err(BrokerError::ProviderInit(
                "new session reported as already registered".into(),
            ));
        }

        sleep(self.timings.code_request_delay).await;

        handle
            .request_pairing_code(session.phone_number.digits())
            .await
            .map_err(|e| BrokerError::PairingRequest(e.to_string()))
    }

    /// Follow one session's events until it reaches a terminal state.
    async fn drive(self, mut session: Session, mut connection: Connection) {
        let deadline = Instant::now() + self.timings.pairing_timeout;
        let mut shutdown = self.shutdown.subscribe();

        let outcome = loop {
            if *shutdown.borrow() {
                break Outcome::Shutdown;
            }

            let event = tokio::select! {
                _ = shutdown.changed() => break Outcome::Shutdown,
                received = timeout_at(deadline, connection.events.recv()) => match received {
                    Ok(Some(event)) => event,
                    // Channel dropped by the provider without a close status
                    Ok(None) => ConnectionEvent::Closed { status_code: None },
                    Err(_) => break Outcome::Failed(BrokerError::PairingTimeout),
                },
            };

            match event {
                ConnectionEvent::Opened { user_id } => {
                    if self.registry.is_complete(&session.id).await {
                        debug!(session_id = %session.id, "Ignoring open after completion");
                        continue;
                    }

                    self.transition(&mut session, LifecycleState::Open).await;
                    info!(
                        session_id = %session.id,
                        "Connection opened, waiting for credentials to settle"
                    );

                    break match self
                        .deliver(&session, connection.handle.as_ref(), &user_id)
                        .await
                    {
                        Ok(()) => Outcome::Delivered,
                        Err(e) => Outcome::Failed(e),
                    };
                }
                ConnectionEvent::Closed { status_code } => {
                    match self.policy.classify(status_code, session.retries) {
                        DisconnectAction::Retry => {}
                        DisconnectAction::Terminal => {
                            break Outcome::Failed(BrokerError::TerminalDisconnect(status_code));
                        }
                        DisconnectAction::Exhausted => {
                            warn!(
                                session_id = %session.id,
                                retries = session.retries,
                                "Retry limit reached"
                            );
                            break Outcome::Failed(BrokerError::RetryableDisconnect(status_code));
                        }
                    }

                    self.transition(&mut session, LifecycleState::Closed).await;
                    session.retries += 1;
                    warn!(
                        session_id = %session.id,
                        ?status_code,
                        attempt = session.retries,
                        "Connection closed, reconnecting after backoff"
                    );

                    tokio::select! {
                        _ = shutdown.changed() => break Outcome::Shutdown,
                        _ = sleep(self.timings.retry_backoff) => {}
                    }

                    match self.provider.connect(&context(&session)).await {
                        Ok(next) => {
                            self.registry.register(&session.id, next.handle.clone()).await;
                            connection = next;
                            self.transition(&mut session, LifecycleState::Pending).await;
                        }
                        Err(e) => break Outcome::Failed(BrokerError::ProviderInit(e.to_string())),
                    }
                }
            }
        };

        self.finish(session, connection, outcome).await;
    }

    async fn transition(&self, session: &mut Session, next: LifecycleState) {
        let previous = session.state;
        session.transition(next);
        self.registry.set_state(&session.id, session.state).await;
        debug!(
            session_id = %session.id,
            from = ?previous,
            to = ?session.state,
            "Session state changed"
        );
    }

    /// Send the credential and instructions to the session's own account.
    ///
    /// The session is marked complete before the first send, so a second
    /// delivery can never start even if this one fails halfway.
    async fn deliver(
        &self,
        session: &Session,
        handle: &dyn ProviderHandle,
        destination: &str,
    ) -> Result<(), BrokerError> {
        sleep(self.timings.settle_delay).await;

        if !self.registry.mark_complete(&session.id).await {
            return Err(BrokerError::Delivery("session already completed".into()));
        }

        let credential = self
            .store
            .read_artifact(&session.id, CREDENTIAL_FILE)
            .await
            .map_err(|e| BrokerError::Delivery(e.to_string()))?
            .ok_or_else(|| BrokerError::Delivery("credential artifact missing".into()))?;

        let payload = self.formatter.render(
            &credential,
            &DeliveryContext {
                destination,
                phone_number: &session.phone_number,
            },
        );

        let marker = handle
            .send_message(destination, &payload.marker, None)
            .await
            .map_err(|e| BrokerError::Delivery(e.to_string()))?;

        handle
            .send_message(destination, &payload.instructions, Some(&marker))
            .await
            .map_err(|e| BrokerError::Delivery(e.to_string()))?;

        Ok(())
    }

    async fn finish(&self, mut session: Session, connection: Connection, outcome: Outcome) {
        let Connection { handle, events } = connection;
        // Later events for this session are discarded by the provider
        drop(events);
        // None when shutdown already took the handle
        let registered = self.registry.unregister(&session.id).await;

        match outcome {
            Outcome::Delivered => {
                self.transition(&mut session, LifecycleState::Delivered).await;
                close(&session.id, handle.as_ref()).await;
                info!(
                    session_id = %session.id,
                    phone_number = %session.phone_number,
                    retries = session.retries,
                    elapsed_secs = (Utc::now() - session.created_at).num_seconds(),
                    "Credential delivered"
                );
                self.registry.forget(&session.id).await;
                // Let the provider finish its own teardown first
                sleep(self.timings.cleanup_grace).await;
                self.discard(&session.id).await;
            }
            Outcome::Failed(e) => {
                self.transition(&mut session, LifecycleState::Failed).await;
                warn!(
                    session_id = %session.id,
                    state = ?session.state,
                    error = %e,
                    "Session failed"
                );
                close(&session.id, handle.as_ref()).await;
                self.registry.forget(&session.id).await;
                self.discard(&session.id).await;
            }
            Outcome::Shutdown => {
                self.registry.forget(&session.id).await;
                // A reconnect that finished after shutdown drained the registry
                if registered.is_some() {
                    close(&session.id, handle.as_ref()).await;
                    self.discard(&session.id).await;
                }
                debug!(
                    session_id = %session.id,
                    state = ?session.state,
                    "Session driver stopped for shutdown"
                );
            }
        }
    }

    /// Close every open connection and remove every working directory.
    pub async fn shutdown(&self) {
        // Take the handles before drivers wake up and unregister them
        let handles = self.registry.drain_handles().await;
        self.shutdown.send_replace(true);

        info!("Closing {} open connections", handles.len());
        for (id, handle) in handles {
            close(&id, handle.as_ref()).await;
        }

        match self.store.remove_all().await {
            Ok(count) => info!("Removed {} session directories", count),
            Err(e) => error!("Failed to remove session directories: {}", e),
        }
    }

    async fn discard(&self, id: &SessionId) {
        if let Err(e) = self.store.remove(id).await {
            error!(session_id = %id, "Failed to remove working directory: {}", e);
        }
    }
}

fn context(session: &Session) -> SessionContext {
    SessionContext {
        id: session.id.clone(),
        workdir: session.workdir.clone(),
    }
}

async fn close(id: &SessionId, handle: &dyn ProviderHandle) {
    if let Err(e) = handle.close().await {
        warn!(session_id = %id, "Failed to close connection: {}", e);
    }
}
