use serde::{Deserialize, Serialize};

/// Lifecycle of the control session.
///
/// Exactly one device handle and one channel set exist at a time; both
/// are torn down together when the session leaves `Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    BindingChannels,
    Connected,
}

/// Motor configuration document, JSON-mapped exactly as the robot
/// firmware emits it on the config channel.
///
/// `mapping[i]` is the physical motor driven by logical position `i`,
/// `invert[i]` flags polarity reversal. The authoritative copy lives on
/// the robot; the local copy is a cache replaced wholesale on read or
/// notification, never patched in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDocument {
    pub mapping: [u8; 4],
    pub invert: [bool; 4],
}

impl Default for ConfigDocument {
    fn default() -> Self {
        // Firmware defaults: direct motor mapping, no inversion
        Self {
            mapping: [1, 2, 3, 4],
            invert: [false; 4],
        }
    }
}

/// Normalized stick deflection, each axis in `[-255, 255]`, `(0, 0)` at
/// rest. Derived per pointer event, never accumulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StickVector {
    pub x: i16,
    pub y: i16,
}

/// Events the session surfaces to the embedding application.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Connected,
    Disconnected,
    ConfigReceived(ConfigDocument),
    Status(StatusMessage),
}

/// Operator-facing progress or diagnostic line.
#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}
