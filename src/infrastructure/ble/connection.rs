//! Connection state machine.
//!
//! Owns the path from `Disconnected` to `Connected`: device selection
//! by advertised name, link connect, primary service discovery, binding
//! of all five channels, notification arming and the end-of-link watch.
//! Any failure tears partial state down, reverts to `Disconnected` and
//! surfaces a single typed failure; there is no automatic retry.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::models::{
    ConfigDocument, ConnectionState, MessageSeverity, SessionEvent, StatusMessage,
};
use crate::error::LinkError;
use crate::infrastructure::ble::config_sync::ConfigSync;
use crate::infrastructure::ble::protocol::{self, ChannelKind};
use crate::infrastructure::transport::{DisconnectHandler, Transport};

/// Link parameters for one robot model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Advertised name the discovery filter matches on.
    pub device_name: String,
    /// Primary control service UUID.
    pub service_uuid: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            device_name: protocol::DEVICE_NAME.to_string(),
            service_uuid: protocol::SERVICE_UUID.to_string(),
        }
    }
}

/// The five bound channel handles. Resolved together, torn down
/// together with the device handle.
pub(crate) struct ChannelSet<T: Transport> {
    pub command: T::Channel,
    pub joystick: T::Channel,
    pub speed: T::Channel,
    pub config: T::Channel,
    pub test: T::Channel,
}

/// An established link: the device handle plus its channel set.
pub(crate) struct ActiveLink<T: Transport> {
    pub device: T::Device,
    pub channels: ChannelSet<T>,
}

pub(crate) struct Connector<T: Transport> {
    transport: Arc<T>,
    config: LinkConfig,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl<T: Transport> Connector<T> {
    pub fn new(
        transport: Arc<T>,
        config: LinkConfig,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            transport,
            config,
            events,
        }
    }

    /// Walk the full connection sequence. On failure the partial link
    /// is torn down and the state reverts before the error surfaces.
    pub async fn establish(
        &self,
        state: &Arc<Mutex<ConnectionState>>,
        cache: &Arc<Mutex<Option<ConfigDocument>>>,
    ) -> Result<(ActiveLink<T>, ConfigSync<T>), LinkError> {
        match self.run(state, cache).await {
            Ok(link) => Ok(link),
            Err((device, err)) => {
                if let Some(device) = device {
                    let _ = self.transport.disconnect(&device).await;
                }
                self.set_state(state, ConnectionState::Disconnected);
                warn!("connection attempt failed: {err}");
                self.status(&format!("Connection failed: {err}"), MessageSeverity::Error);
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        state: &Arc<Mutex<ConnectionState>>,
        cache: &Arc<Mutex<Option<ConfigDocument>>>,
    ) -> Result<(ActiveLink<T>, ConfigSync<T>), (Option<T::Device>, LinkError)> {
        self.set_state(state, ConnectionState::Connecting);
        self.status("Searching for the robot...", MessageSeverity::Info);
        info!(filter = %self.config.device_name, "selecting device");

        let device = self
            .transport
            .select_device(&self.config.device_name)
            .await
            .map_err(|err| {
                warn!("device selection failed: {err}");
                (None, LinkError::DeviceNotFound)
            })?;

        self.status("Connecting...", MessageSeverity::Info);
        self.transport.connect(&device).await.map_err(|err| {
            (
                Some(device.clone()),
                LinkError::TransportConnectFailure(err.to_string()),
            )
        })?;

        self.set_state(state, ConnectionState::BindingChannels);
        info!(service = %self.config.service_uuid, "discovering primary service");
        let service = self
            .transport
            .discover_service(&device, &self.config.service_uuid)
            .await
            .map_err(|err| {
                warn!("service discovery failed: {err}");
                (
                    Some(device.clone()),
                    LinkError::ChannelUnavailable {
                        channel: "primary service",
                    },
                )
            })?;

        let channels = self
            .bind_channels(&service)
            .await
            .map_err(|err| (Some(device.clone()), err))?;

        let sync = ConfigSync::new(
            Arc::clone(&self.transport),
            channels.command.clone(),
            channels.config.clone(),
            Arc::clone(cache),
            self.events.clone(),
        );
        sync.subscribe().await.map_err(|err| {
            (
                Some(device.clone()),
                LinkError::TransportConnectFailure(format!(
                    "failed to arm config notifications: {err}"
                )),
            )
        })?;

        // End-of-link watch: the one place session end is known, for
        // both operator-initiated and link-loss teardown.
        let watch_state = Arc::clone(state);
        let watch_events = self.events.clone();
        let handler: DisconnectHandler = Box::new(move || {
            info!("transport reported end of link");
            *watch_state.lock().unwrap() = ConnectionState::Disconnected;
            let _ = watch_events.send(SessionEvent::Disconnected);
        });
        self.transport.watch_disconnect(&device, handler).map_err(|err| {
            (
                Some(device.clone()),
                LinkError::TransportConnectFailure(format!(
                    "failed to arm disconnect watch: {err}"
                )),
            )
        })?;

        self.set_state(state, ConnectionState::Connected);
        self.status("Connected to the robot", MessageSeverity::Success);
        let _ = self.events.send(SessionEvent::Connected);

        // Seed the cache; the application is handed the result, or a
        // warning when the robot would not serve its document.
        if let Err(err) = sync.read().await {
            warn!("initial config read failed: {err}");
            self.status(
                &format!("Could not read robot config: {err}"),
                MessageSeverity::Warning,
            );
        }

        Ok((ActiveLink { device, channels }, sync))
    }

    async fn bind_channels(&self, service: &T::Service) -> Result<ChannelSet<T>, LinkError> {
        Ok(ChannelSet {
            command: self.bind(service, ChannelKind::Command).await?,
            joystick: self.bind(service, ChannelKind::Joystick).await?,
            speed: self.bind(service, ChannelKind::Speed).await?,
            config: self.bind(service, ChannelKind::Config).await?,
            test: self.bind(service, ChannelKind::Test).await?,
        })
    }

    async fn bind(&self, service: &T::Service, kind: ChannelKind) -> Result<T::Channel, LinkError> {
        match self.transport.resolve_channel(service, kind.uuid()).await {
            Ok(channel) => {
                debug!(channel = kind.name(), "channel bound");
                Ok(channel)
            }
            Err(err) => {
                warn!(channel = kind.name(), "channel resolution failed: {err}");
                Err(LinkError::ChannelUnavailable {
                    channel: kind.name(),
                })
            }
        }
    }

    fn set_state(&self, state: &Arc<Mutex<ConnectionState>>, next: ConnectionState) {
        *state.lock().unwrap() = next;
        debug!(?next, "connection state");
    }

    fn status(&self, message: &str, severity: MessageSeverity) {
        let _ = self.events.send(SessionEvent::Status(StatusMessage {
            message: message.to_string(),
            severity,
        }));
    }
}
