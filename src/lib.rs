//! Control link for the Omni Robot omni-drive platform.
//!
//! The crate owns the protocol and transport layer between an operator
//! input surface and the robot: the connection lifecycle state machine,
//! the five-channel command/telemetry encoding, the config-sync
//! protocol and the joystick geometry engine. The embedding UI
//! constructs a [`RobotSession`] over a [`Transport`] backend (on
//! Windows, `infrastructure::ble::winrt::WinRtTransport`), drives it
//! from its input events and consumes [`SessionEvent`]s; rendering and
//! widget wiring stay outside.
//!
//! ```no_run
//! use omni_robot_link::{LinkConfig, LinkError, MotionCommand, RobotSession, Transport};
//!
//! async fn drive(transport: impl Transport) -> Result<(), LinkError> {
//!     let (events, _rx) = tokio::sync::mpsc::unbounded_channel();
//!     let mut session = RobotSession::new(transport, LinkConfig::default(), events);
//!     session.connect().await?;
//!     session.send_command(MotionCommand::Forward).await;
//!     session.set_speed(200).await;
//!     Ok(())
//! }
//! ```

pub mod domain;
pub mod error;
pub mod infrastructure;

pub use domain::joystick::{compute_vector, JoystickPad};
pub use domain::models::{
    ConfigDocument, ConnectionState, MessageSeverity, SessionEvent, StatusMessage, StickVector,
};
pub use error::{LinkError, TransportError};
pub use infrastructure::ble::config_sync::ConfigSync;
pub use infrastructure::ble::connection::LinkConfig;
pub use infrastructure::ble::protocol::{
    ChannelKind, ConfigCommand, MotionCommand, TestCommand, TestDirection,
};
pub use infrastructure::ble::session::RobotSession;
pub use infrastructure::logging::{init_logger, LogSettings, LoggingGuard};
pub use infrastructure::transport::Transport;
