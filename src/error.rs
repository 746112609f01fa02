//! Failure taxonomy for the control link.
//!
//! `TransportError` carries the transport-level cause of a failed
//! operation; `LinkError` is what the crate surfaces to the embedding
//! application. Connection-attempt failures map onto the named classes
//! at the state-machine seam, steady-state transport failures are
//! wrapped as [`LinkError::Transport`] and absorbed by the callers that
//! can tolerate them.

use thiserror::Error;

/// Transport-level failure reported by a [`Transport`](crate::Transport)
/// implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no matching device was found or selection was cancelled")]
    NoDevice,
    #[error("link-level connect failed: {0}")]
    ConnectFailed(String),
    #[error("service {0} not found on device")]
    ServiceMissing(String),
    #[error("characteristic {0} not found in service")]
    ChannelMissing(String),
    #[error("transport operation failed: {0}")]
    Operation(String),
}

/// Failure surfaced by the control link.
#[derive(Debug, Error)]
pub enum LinkError {
    /// No robot matching the advertised-name filter was selected.
    #[error("no matching robot was found or selection was cancelled")]
    DeviceNotFound,

    /// The link-level connect step failed.
    #[error("failed to connect to the robot: {0}")]
    TransportConnectFailure(String),

    /// The primary service or one of the five channels did not resolve.
    /// Partial resolution is a hard failure, never a degraded mode.
    #[error("channel '{channel}' is unavailable on the connected robot")]
    ChannelUnavailable { channel: &'static str },

    /// A grammar value was outside its representable range. Codec inputs
    /// are saturating-clamped instead; this only fires for command
    /// constructors (positions and motor indexes).
    #[error("value out of range for {context}")]
    EncodeRange { context: &'static str },

    /// The config channel carried a payload that does not decode as a
    /// config document. The cached document is left unchanged.
    #[error("failed to decode config document: {0}")]
    Decode(String),

    /// An operation was attempted outside the `Connected` state.
    #[error("not connected to a robot")]
    NotConnected,

    /// A steady-state transport operation failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
