//! Session lifecycle tests against a scripted provider.

mod common;

use common::{eventually, fast_timings, harness, harness_with, Attempt};
use pairing_broker::lifecycle::STATUS_RESTART_REQUIRED;
use pairing_broker::provider::ConnectionEvent;
use pairing_broker::session::{Clock, LifecycleState, SessionSweeper};
use pairing_broker::{BrokerError, LifecycleTimings};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

const USER_ID: &str = "12015550123:3@s.whatsapp.net";

fn opened() -> ConnectionEvent {
    ConnectionEvent::Opened {
        user_id: USER_ID.into(),
    }
}

#[tokio::test]
async fn test_valid_number_returns_code_and_one_workdir() {
    let h = harness();

    let code = h.controller.request_pairing("+1 201 555 0123").await.unwrap();

    assert_eq!(code.as_str(), "ABCD-EFGH");
    assert_eq!(h.provider.pairing_requests(), vec!["12015550123".to_string()]);

    let connects = h.provider.connects();
    assert_eq!(connects.len(), 1);
    let entries = h.store.entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, connects[0].id.to_string());
    assert_eq!(h.registry.active_count().await, 1);
}

#[tokio::test]
async fn test_invalid_numbers_create_nothing() {
    let h = harness();

    for raw in ["abc", "", "123", "1234567890123456", "0044 20 7946 0000", "999 1234567"] {
        let result = h.controller.request_pairing(raw).await;
        assert!(
            matches!(result, Err(BrokerError::InvalidPhoneNumber(_))),
            "{raw:?} should be rejected"
        );
    }

    assert!(h.store.entries().await.unwrap().is_empty());
    assert!(h.provider.connects().is_empty());
}

#[tokio::test]
async fn test_delivers_credential_then_instructions() {
    let h = harness();
    h.controller.request_pairing("12015550123").await.unwrap();
    let workdir = h.provider.last_workdir();

    h.provider.write_credentials(br#"{"noiseKey":"x"}"#);
    assert!(h.provider.emit(opened()).await);

    assert!(eventually(|| !workdir.exists()).await);

    let sent = h.provider.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].to, USER_ID);
    assert!(sent[0].text.starts_with("SESSION~"));
    assert_eq!(sent[0].quoted, None);
    assert_eq!(sent[1].to, USER_ID);
    assert!(sent[1].text.contains("SETUP INSTRUCTIONS"));
    assert_eq!(sent[1].quoted.as_deref(), Some("MSG-1"));

    assert_eq!(h.provider.closes(), 1);
    assert_eq!(h.registry.active_count().await, 0);
}

#[tokio::test]
async fn test_repeated_open_delivers_once() {
    let h = harness();
    h.controller.request_pairing("12015550123").await.unwrap();
    let workdir = h.provider.last_workdir();
    let session_id = h.provider.connects()[0].id.clone();

    h.provider.write_credentials(b"{}");
    h.provider.emit(opened()).await;
    h.provider.emit(opened()).await;

    assert!(eventually(|| !workdir.exists()).await);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(h.provider.sent().len(), 2);
    assert!(!h.registry.is_complete(&session_id).await);
    assert_eq!(h.registry.tracked_count().await, 0);
}

#[tokio::test]
async fn test_events_after_cleanup_are_dropped() {
    let h = harness();
    h.controller.request_pairing("12015550123").await.unwrap();
    let workdir = h.provider.last_workdir();

    h.provider.write_credentials(b"{}");
    h.provider.emit(opened()).await;
    assert!(eventually(|| !workdir.exists()).await);

    assert!(!h.provider.emit(opened()).await);
    assert_eq!(h.provider.sent().len(), 2);
}

#[tokio::test]
async fn test_retryable_close_reconnects_same_session() {
    let h = harness();
    h.controller.request_pairing("12015550123").await.unwrap();
    let workdir = h.provider.last_workdir();

    h.provider
        .emit(ConnectionEvent::Closed {
            status_code: Some(STATUS_RESTART_REQUIRED),
        })
        .await;

    assert!(eventually(|| h.provider.connects().len() == 2).await);

    let connects = h.provider.connects();
    assert_eq!(connects[0].id, connects[1].id);
    assert_eq!(connects[0].workdir, connects[1].workdir);
    assert!(workdir.exists());
    // The caller already has the code; no new one is requested
    assert_eq!(h.provider.pairing_requests().len(), 1);

    h.provider.write_credentials(b"{}");
    h.provider.emit(opened()).await;

    assert!(eventually(|| !workdir.exists()).await);
    assert_eq!(h.provider.sent().len(), 2);
}

#[tokio::test]
async fn test_close_without_status_is_retried() {
    let h = harness();
    h.controller.request_pairing("12015550123").await.unwrap();

    h.provider
        .emit(ConnectionEvent::Closed { status_code: None })
        .await;

    assert!(eventually(|| h.provider.connects().len() == 2).await);
}

#[tokio::test]
async fn test_terminal_close_cleans_up_without_retry() {
    let h = harness();
    h.controller.request_pairing("12015550123").await.unwrap();
    let workdir = h.provider.last_workdir();

    h.provider
        .emit(ConnectionEvent::Closed {
            status_code: Some(401),
        })
        .await;

    assert!(eventually(|| !workdir.exists()).await);
    tokio::time::sleep(fast_timings().retry_backoff * 3).await;

    assert_eq!(h.provider.connects().len(), 1);
    assert!(h.provider.sent().is_empty());
    assert_eq!(h.registry.active_count().await, 0);
}

#[tokio::test]
async fn test_finished_sessions_leave_no_registry_entries() {
    let h = harness();
    let mut workdirs = Vec::new();

    for _ in 0..3 {
        h.controller.request_pairing("12015550123").await.unwrap();
        workdirs.push(h.provider.last_workdir());
        h.provider
            .emit(ConnectionEvent::Closed {
                status_code: Some(401),
            })
            .await;
    }

    for workdir in &workdirs {
        assert!(eventually(|| !workdir.exists()).await);
    }

    assert_eq!(h.registry.tracked_count().await, 0);
    for ctx in h.provider.connects() {
        assert!(!h.registry.is_complete(&ctx.id).await);
    }
}

#[tokio::test]
async fn test_states_are_tracked_while_session_lives() {
    let h = harness_with(
        LifecycleTimings {
            settle_delay: Duration::from_millis(200),
            ..fast_timings()
        },
        5,
    );
    h.controller.request_pairing("12015550123").await.unwrap();
    let session_id = h.provider.connects()[0].id.clone();

    assert_eq!(h.registry.state(&session_id).await, Some(LifecycleState::Pending));
    assert_eq!(h.controller.session_states().await.pending, 1);

    h.provider
        .emit(ConnectionEvent::Closed {
            status_code: Some(STATUS_RESTART_REQUIRED),
        })
        .await;
    assert!(eventually(|| h.provider.connects().len() == 2).await);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.registry.state(&session_id).await, Some(LifecycleState::Pending));

    h.provider.emit(opened()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.registry.state(&session_id).await, Some(LifecycleState::Open));
    assert_eq!(h.controller.session_states().await.open, 1);
}

#[tokio::test]
async fn test_retry_ceiling_gives_up() {
    let h = harness_with(fast_timings(), 1);
    h.controller.request_pairing("12015550123").await.unwrap();
    let workdir = h.provider.last_workdir();

    h.provider
        .emit(ConnectionEvent::Closed {
            status_code: Some(408),
        })
        .await;
    assert!(eventually(|| h.provider.connects().len() == 2).await);

    h.provider
        .emit(ConnectionEvent::Closed {
            status_code: Some(408),
        })
        .await;

    assert!(eventually(|| !workdir.exists()).await);
    tokio::time::sleep(fast_timings().retry_backoff * 3).await;
    assert_eq!(h.provider.connects().len(), 2);
}

#[tokio::test]
async fn test_reconnect_failure_cleans_up() {
    let h = harness();
    h.provider.script(Attempt::default()).script(Attempt {
        fail_connect: true,
        ..Attempt::default()
    });
    h.controller.request_pairing("12015550123").await.unwrap();
    let workdir = h.provider.last_workdir();

    h.provider
        .emit(ConnectionEvent::Closed {
            status_code: Some(428),
        })
        .await;

    assert!(eventually(|| !workdir.exists()).await);
    assert_eq!(h.provider.connects().len(), 2);
}

#[tokio::test]
async fn test_missing_artifact_fails_without_sending() {
    let h = harness();
    h.controller.request_pairing("12015550123").await.unwrap();
    let workdir = h.provider.last_workdir();
    let session_id = h.provider.connects()[0].id.clone();

    h.provider.emit(opened()).await;

    assert!(eventually(|| !workdir.exists()).await);
    assert!(h.provider.sent().is_empty());
    assert_eq!(h.registry.state(&session_id).await, None);
    assert_eq!(h.provider.closes(), 1);
}

#[tokio::test]
async fn test_send_failure_is_not_retried() {
    let h = harness();
    h.provider.script(Attempt {
        fail_send: true,
        ..Attempt::default()
    });
    h.controller.request_pairing("12015550123").await.unwrap();
    let workdir = h.provider.last_workdir();

    h.provider.write_credentials(b"{}");
    h.provider.emit(opened()).await;

    assert!(eventually(|| !workdir.exists()).await);
    assert!(!h.provider.emit(opened()).await);
    assert_eq!(h.provider.connects().len(), 1);
}

#[tokio::test]
async fn test_rejected_pairing_request_tears_down() {
    let h = harness();
    h.provider.script(Attempt {
        pairing_code: Err("rate-overlimit".into()),
        ..Attempt::default()
    });

    let result = h.controller.request_pairing("12015550123").await;

    assert!(matches!(result, Err(BrokerError::PairingRequest(_))));
    assert!(!h.provider.last_workdir().exists());
    assert_eq!(h.provider.closes(), 1);
    assert_eq!(h.registry.active_count().await, 0);
}

#[tokio::test]
async fn test_connect_failure_is_provider_init_error() {
    let h = harness();
    h.provider.script(Attempt {
        fail_connect: true,
        ..Attempt::default()
    });

    let result = h.controller.request_pairing("12015550123").await;

    assert!(matches!(result, Err(BrokerError::ProviderInit(_))));
    assert!(h.store.entries().await.unwrap().is_empty());
    assert!(h.provider.pairing_requests().is_empty());
}

#[tokio::test]
async fn test_already_registered_session_is_rejected() {
    let h = harness();
    h.provider.script(Attempt {
        registered: true,
        ..Attempt::default()
    });

    let result = h.controller.request_pairing("12015550123").await;

    assert!(matches!(result, Err(BrokerError::ProviderInit(_))));
    assert!(h.provider.pairing_requests().is_empty());
    assert!(h.store.entries().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_pairing_window_expires() {
    let timings = fast_timings().with_pairing_timeout(Duration::from_millis(100));
    let h = harness_with(timings, 5);
    h.controller.request_pairing("12015550123").await.unwrap();
    let workdir = h.provider.last_workdir();

    assert!(eventually(|| !workdir.exists()).await);
    assert_eq!(h.provider.closes(), 1);
    assert_eq!(h.registry.active_count().await, 0);
}

#[tokio::test]
async fn test_sessions_are_independent() {
    let h = harness();
    h.controller.request_pairing("12015550123").await.unwrap();
    let first = h.provider.last_workdir();
    h.controller.request_pairing("2348012345678").await.unwrap();
    let second = h.provider.last_workdir();
    assert_ne!(first, second);

    // Fails the second session only
    h.provider
        .emit(ConnectionEvent::Closed {
            status_code: Some(401),
        })
        .await;

    assert!(eventually(|| !second.exists()).await);
    assert!(first.exists());
    assert_eq!(h.registry.active_count().await, 1);
}

#[tokio::test]
async fn test_shutdown_closes_connections_and_removes_directories() {
    let h = harness();
    h.controller.request_pairing("12015550123").await.unwrap();
    h.controller.request_pairing("2348012345678").await.unwrap();

    h.controller.shutdown().await;

    assert_eq!(h.provider.closes(), 2);
    assert_eq!(h.registry.active_count().await, 0);
    assert!(h.store.entries().await.unwrap().is_empty());

    // Drivers stopping afterwards do not close the drained handles again
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.provider.closes(), 2);
}

#[tokio::test]
async fn test_shutdown_closes_connection_opened_by_pending_reconnect() {
    let h = harness();
    h.provider.script(Attempt::default()).script(Attempt {
        connect_delay: Duration::from_millis(200),
        ..Attempt::default()
    });
    h.controller.request_pairing("12015550123").await.unwrap();

    h.provider
        .emit(ConnectionEvent::Closed {
            status_code: Some(STATUS_RESTART_REQUIRED),
        })
        .await;
    // Second connect has started and is still in flight
    assert!(eventually(|| h.provider.connects().len() == 2).await);

    h.controller.shutdown().await;
    assert_eq!(h.provider.closes(), 1);

    assert!(eventually(|| h.provider.closes() == 2).await);
    assert_eq!(h.registry.active_count().await, 0);
    assert_eq!(h.registry.tracked_count().await, 0);
    assert!(h.store.entries().await.unwrap().is_empty());
}

struct FutureClock(Duration);

impl Clock for FutureClock {
    fn now(&self) -> SystemTime {
        SystemTime::now() + self.0
    }
}

#[tokio::test]
async fn test_sweeper_removes_abandoned_session() {
    let h = harness();
    h.controller.request_pairing("12015550123").await.unwrap();
    let workdir = h.provider.last_workdir();

    let sweeper = SessionSweeper::with_clock(
        h.store.clone(),
        Duration::from_secs(60),
        Duration::from_secs(600),
        Arc::new(FutureClock(Duration::from_secs(3600))),
    );

    let removed = sweeper.sweep_once().await;

    assert_eq!(removed.len(), 1);
    assert!(!workdir.exists());
}
