//! BLE control link.
//!
//! Provides the protocol and transport layer between the operator UI
//! and the Omni Robot.
//!
//! ## Modules
//!
//! - [`protocol`] - channel UUIDs, wire encodings and the command grammar
//! - [`connection`] - device selection, channel binding and the
//!   connection lifecycle state machine
//! - [`config_sync`] - read/notify/field-write/persist semantics for the
//!   robot config document
//! - [`session`] - the façade the surrounding UI drives
//! - [`winrt`] - Windows GATT transport backend

pub mod config_sync;
pub mod connection;
pub mod protocol;
pub mod session;
#[cfg(windows)]
pub mod winrt;

// Re-export the façade for convenience
pub use session::RobotSession;
