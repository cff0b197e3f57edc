//! REST client for the session provider bridge.
//!
//! The bridge is a sidecar process hosting the device-pairing library. It
//! writes each session's credential artifact into a working directory shared
//! with the broker and exposes connection state changes as pollable events.

mod client;
mod error;
mod receiver;
mod types;

pub use client::BridgeClient;
pub use error::BridgeError;
pub use receiver::EventReceiver;
pub use types::*;
