//! Config synchronization protocol.
//!
//! The robot owns the authoritative config document. This module keeps
//! the local cache in sync: reads and notifications replace the cache
//! wholesale and surface the full document to the application; field
//! writes go out as one text command each over the command channel and
//! never update the cache optimistically; the cache changes only when
//! the robot reports back.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::models::{ConfigDocument, MessageSeverity, SessionEvent, StatusMessage};
use crate::error::{LinkError, TransportError};
use crate::infrastructure::ble::protocol::{self, ConfigCommand};
use crate::infrastructure::transport::{NotificationHandler, Transport};

pub struct ConfigSync<T: Transport> {
    transport: Arc<T>,
    command_channel: T::Channel,
    config_channel: T::Channel,
    cache: Arc<Mutex<Option<ConfigDocument>>>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl<T: Transport> ConfigSync<T> {
    pub(crate) fn new(
        transport: Arc<T>,
        command_channel: T::Channel,
        config_channel: T::Channel,
        cache: Arc<Mutex<Option<ConfigDocument>>>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            transport,
            command_channel,
            config_channel,
            cache,
            events,
        }
    }

    /// Arm notification delivery. Each notification decodes
    /// independently and delivers the full new document; a malformed
    /// payload is reported and the cached document stays as it was.
    pub(crate) async fn subscribe(&self) -> Result<(), TransportError> {
        let cache = Arc::clone(&self.cache);
        let events = self.events.clone();

        let handler: NotificationHandler = Box::new(move |payload| {
            match protocol::decode_config(&payload) {
                Ok(document) => {
                    debug!(?document, "config notification");
                    *cache.lock().unwrap() = Some(document.clone());
                    let _ = events.send(SessionEvent::ConfigReceived(document));
                }
                Err(err) => {
                    warn!("ignoring malformed config notification: {err}");
                    let _ = events.send(SessionEvent::Status(StatusMessage {
                        message: format!("Ignored malformed config update: {err}"),
                        severity: MessageSeverity::Error,
                    }));
                }
            }
        });

        self.transport.subscribe(&self.config_channel, handler).await
    }

    /// Read the document from the robot, refresh the cache, and hand
    /// the result to the application.
    pub async fn read(&self) -> Result<ConfigDocument, LinkError> {
        let payload = self.transport.read(&self.config_channel).await?;
        let document = protocol::decode_config(&payload)?;

        *self.cache.lock().unwrap() = Some(document.clone());
        let _ = self
            .events
            .send(SessionEvent::ConfigReceived(document.clone()));
        Ok(document)
    }

    /// Point logical `position` at physical motor `actuator`.
    pub async fn write_mapping(&self, position: u8, actuator: u8) -> Result<(), LinkError> {
        self.send(&ConfigCommand::set_mapping(position, actuator)?).await
    }

    /// Set polarity reversal for logical `position`.
    pub async fn write_invert(&self, position: u8, inverted: bool) -> Result<(), LinkError> {
        self.send(&ConfigCommand::set_invert(position, inverted)?).await
    }

    /// Ask the firmware to persist its current config. Completion of the
    /// write does not confirm non-volatile storage on the robot.
    pub async fn persist(&self) -> Result<(), LinkError> {
        self.send(&ConfigCommand::Save).await
    }

    /// Flush a full document field by field, then persist.
    ///
    /// Writes are issued sequentially, each awaited, because the
    /// command channel guarantees ordering only for serialized writes.
    pub async fn push_document(&self, document: &ConfigDocument) -> Result<(), LinkError> {
        for (position, actuator) in document.mapping.iter().enumerate() {
            self.write_mapping(position as u8, *actuator).await?;
        }
        for (position, inverted) in document.invert.iter().enumerate() {
            self.write_invert(position as u8, *inverted).await?;
        }
        self.persist().await
    }

    /// One serialized text write on the command channel.
    pub async fn send(&self, command: &ConfigCommand) -> Result<(), LinkError> {
        let wire = command.to_string();
        debug!(command = %wire, "sending config command");
        self.transport
            .write(&self.command_channel, wire.as_bytes())
            .await?;
        Ok(())
    }

    /// Last document received from the robot, if any.
    pub fn cached(&self) -> Option<ConfigDocument> {
        self.cache.lock().unwrap().clone()
    }
}
