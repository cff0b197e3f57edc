//! Pairing Broker - single-use device pairing service.
//!
//! For each request the broker:
//! - Validates the phone number and allocates a session working directory
//! - Asks the session provider for a pairing code and returns it
//! - Waits for the linked session to authenticate
//! - Delivers the session credential to the account exactly once
//! - Removes every trace of the session

pub mod api;
pub mod config;
pub mod delivery;
pub mod error;
pub mod lifecycle;
pub mod phone;
pub mod provider;
pub mod session;

pub use config::Config;
pub use delivery::DeliveryFormatter;
pub use error::BrokerError;
pub use lifecycle::{DisconnectPolicy, LifecycleTimings, PairingCode, SessionController};
pub use phone::{normalize_phone_number, PhoneNumber};
pub use provider::{BridgeProvider, SessionProvider};
pub use session::{SessionId, SessionRegistry, SessionStore, SessionSweeper};
