//! Control session façade.
//!
//! The surface the embedding UI drives: connect/disconnect, movement
//! and test commands, speed, joystick updates and config mutation.
//! Every outbound operation is guarded behind the connection state:
//! calls racing a teardown are expected and absorbed as warn-logged
//! no-ops, never raised.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::models::{ConfigDocument, ConnectionState, SessionEvent, StickVector};
use crate::error::LinkError;
use crate::infrastructure::ble::config_sync::ConfigSync;
use crate::infrastructure::ble::connection::{ActiveLink, ChannelSet, Connector, LinkConfig};
use crate::infrastructure::ble::protocol::{self, ConfigCommand, MotionCommand, TestCommand};
use crate::infrastructure::transport::Transport;

pub struct RobotSession<T: Transport> {
    transport: Arc<T>,
    config: LinkConfig,
    events: mpsc::UnboundedSender<SessionEvent>,
    state: Arc<Mutex<ConnectionState>>,
    cache: Arc<Mutex<Option<ConfigDocument>>>,
    link: Option<ActiveLink<T>>,
    sync: Option<ConfigSync<T>>,
}

impl<T: Transport> RobotSession<T> {
    pub fn new(
        transport: T,
        config: LinkConfig,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            transport: Arc::new(transport),
            config,
            events,
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            cache: Arc::new(Mutex::new(None)),
            link: None,
            sync: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Last config document received from the robot, if any.
    pub fn config(&self) -> Option<ConfigDocument> {
        self.cache.lock().unwrap().clone()
    }

    /// Config sync operations, available while connected.
    pub fn config_sync(&self) -> Option<&ConfigSync<T>> {
        if self.is_connected() {
            self.sync.as_ref()
        } else {
            None
        }
    }

    /// Run the connection sequence. On failure the session reverts to
    /// `Disconnected` and the operator has to re-initiate.
    pub async fn connect(&mut self) -> Result<(), LinkError> {
        if self.is_connected() {
            debug!("connect requested while already connected");
            return Ok(());
        }

        let connector = Connector::new(
            Arc::clone(&self.transport),
            self.config.clone(),
            self.events.clone(),
        );
        let (link, sync) = connector.establish(&self.state, &self.cache).await?;
        self.link = Some(link);
        self.sync = Some(sync);
        Ok(())
    }

    /// Tear the link down. The state flip and the `Disconnected` event
    /// come from the transport's end-of-link watch, the same path that
    /// reports link loss.
    pub async fn disconnect(&mut self) {
        let Some(link) = self.link.take() else {
            debug!("disconnect requested while not connected");
            return;
        };
        self.sync = None;
        self.cache.lock().unwrap().take();

        info!("disconnecting from robot");
        if let Err(err) = self.transport.disconnect(&link.device).await {
            warn!("transport disconnect failed: {err}");
        }
    }

    /// Send one movement command on the command channel.
    pub async fn send_command(&self, command: MotionCommand) {
        let Some(channels) = self.guarded("movement command") else {
            return;
        };
        debug!(command = %command, "sending movement command");
        if let Err(err) = self
            .transport
            .write(&channels.command, command.as_str().as_bytes())
            .await
        {
            warn!("movement command '{command}' failed: {err}");
        }
    }

    /// Send one single-motor test command on the test channel.
    pub async fn send_test_command(&self, command: TestCommand) {
        let Some(channels) = self.guarded("test command") else {
            return;
        };
        let wire = command.to_string();
        debug!(command = %wire, "sending test command");
        if let Err(err) = self.transport.write(&channels.test, wire.as_bytes()).await {
            warn!("test command '{wire}' failed: {err}");
        }
    }

    /// Post the current stick vector. Fire-and-forget: pointer events
    /// outpace the link, and only the most recently issued value
    /// matters for a live control signal.
    pub fn send_joystick(&self, x: i16, y: i16) {
        let Some(channels) = self.guarded("joystick update") else {
            return;
        };
        let payload = protocol::encode_joystick(StickVector { x, y });
        if let Err(err) = self.transport.post(&channels.joystick, &payload) {
            warn!("joystick update failed: {err}");
        }
    }

    /// Set the motor speed scalar, saturating into `[0, 255]`.
    pub async fn set_speed(&self, speed: i32) {
        let Some(channels) = self.guarded("speed change") else {
            return;
        };
        let payload = protocol::encode_speed(speed);
        if let Err(err) = self.transport.write(&channels.speed, &payload).await {
            warn!("speed change failed: {err}");
        } else {
            info!(speed = payload[0], "speed set");
        }
    }

    /// Send one config mutation command over the command channel.
    pub async fn send_config_command(&self, command: &ConfigCommand) {
        let Some(sync) = self.config_sync() else {
            warn!("config command ignored: not connected");
            return;
        };
        if let Err(err) = sync.send(command).await {
            warn!("config command '{command}' failed: {err}");
        }
    }

    fn guarded(&self, operation: &str) -> Option<&ChannelSet<T>> {
        if self.is_connected() {
            if let Some(link) = self.link.as_ref() {
                return Some(&link.channels);
            }
        }
        warn!("{operation} ignored: not connected");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::MessageSeverity;
    use crate::infrastructure::ble::protocol::{ChannelKind, TestDirection};
    use crate::infrastructure::transport::mock::MockTransport;
    use tokio::sync::mpsc::UnboundedReceiver;

    const CONFIG_JSON: &[u8] = br#"{"mapping":[1,2,3,4],"invert":[false,false,false,false]}"#;

    fn session(
        transport: &MockTransport,
    ) -> (RobotSession<MockTransport>, UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            RobotSession::new(transport.clone(), LinkConfig::default(), tx),
            rx,
        )
    }

    fn drain(rx: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn connect_reaches_connected_and_seeds_the_config_cache() {
        let transport = MockTransport::new().with_config_payload(CONFIG_JSON);
        let (mut session, mut rx) = session(&transport);

        session.connect().await.unwrap();

        assert!(session.is_connected());
        assert_eq!(session.state(), ConnectionState::Connected);
        assert_eq!(session.config(), Some(ConfigDocument::default()));

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(e, SessionEvent::Connected)));
        assert!(events.iter().any(
            |e| matches!(e, SessionEvent::ConfigReceived(doc) if *doc == ConfigDocument::default())
        ));
    }

    #[tokio::test]
    async fn connect_surfaces_device_not_found() {
        let transport = MockTransport::new().refusing_selection();
        let (mut session, _rx) = session(&transport);

        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, LinkError::DeviceNotFound));
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn connect_surfaces_link_level_failure() {
        let transport = MockTransport::new().refusing_connect();
        let (mut session, _rx) = session(&transport);

        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, LinkError::TransportConnectFailure(_)));
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn missing_test_channel_is_a_hard_failure() {
        let transport = MockTransport::new()
            .with_config_payload(CONFIG_JSON)
            .without_channel(ChannelKind::Test.uuid());
        let (mut session, _rx) = session(&transport);

        let err = session.connect().await.unwrap_err();
        assert!(matches!(
            err,
            LinkError::ChannelUnavailable { channel: "test" }
        ));
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn missing_primary_service_is_channel_unavailable() {
        let transport = MockTransport::new().without_channel(protocol::SERVICE_UUID);
        let (mut session, _rx) = session(&transport);

        let err = session.connect().await.unwrap_err();
        assert!(matches!(
            err,
            LinkError::ChannelUnavailable {
                channel: "primary service"
            }
        ));
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn unreadable_initial_config_does_not_fail_the_connection() {
        // empty payload: the seeding read decodes to an error
        let transport = MockTransport::new();
        let (mut session, mut rx) = session(&transport);

        session.connect().await.unwrap();

        assert!(session.is_connected());
        assert_eq!(session.config(), None);
        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Status(msg) if msg.severity == MessageSeverity::Warning
        )));
    }

    #[tokio::test]
    async fn guarded_operations_are_noops_while_disconnected() {
        let transport = MockTransport::new();
        let (session, _rx) = session(&transport);

        session.send_command(MotionCommand::Forward).await;
        session.set_speed(100).await;
        session.send_joystick(10, 10);
        session
            .send_config_command(&ConfigCommand::Save)
            .await;

        assert!(transport.writes_for(ChannelKind::Command.uuid()).is_empty());
        assert!(transport.writes_for(ChannelKind::Speed.uuid()).is_empty());
        assert!(transport.posts_for(ChannelKind::Joystick.uuid()).is_empty());
    }

    #[tokio::test]
    async fn movement_and_test_commands_use_their_channels() {
        let transport = MockTransport::new().with_config_payload(CONFIG_JSON);
        let (mut session, _rx) = session(&transport);
        session.connect().await.unwrap();

        session.send_command(MotionCommand::Forward).await;
        session
            .send_test_command(TestCommand::new(1, TestDirection::Backward).unwrap())
            .await;

        assert_eq!(
            transport.commands_for(ChannelKind::Command.uuid()),
            vec!["forward"]
        );
        assert_eq!(
            transport.commands_for(ChannelKind::Test.uuid()),
            vec!["test_1_bwd"]
        );
    }

    #[tokio::test]
    async fn speed_values_saturate_on_the_wire() {
        let transport = MockTransport::new().with_config_payload(CONFIG_JSON);
        let (mut session, _rx) = session(&transport);
        session.connect().await.unwrap();

        session.set_speed(300).await;
        session.set_speed(-5).await;

        assert_eq!(
            transport.writes_for(ChannelKind::Speed.uuid()),
            vec![vec![255], vec![0]]
        );
    }

    #[tokio::test]
    async fn joystick_updates_are_posted_without_waiting() {
        let transport = MockTransport::new().with_config_payload(CONFIG_JSON);
        let (mut session, _rx) = session(&transport);
        session.connect().await.unwrap();

        session.send_joystick(255, 0);
        session.send_joystick(-255, 255);

        assert_eq!(
            transport.posts_for(ChannelKind::Joystick.uuid()),
            vec![vec![127, 0], vec![(-127i8) as u8, 127]]
        );
    }

    #[tokio::test]
    async fn config_writes_are_serialized_in_issue_order() {
        let transport = MockTransport::new().with_config_payload(CONFIG_JSON);
        let (mut session, _rx) = session(&transport);
        session.connect().await.unwrap();

        let sync = session.config_sync().unwrap();
        sync.write_mapping(0, 3).await.unwrap();
        sync.write_invert(0, true).await.unwrap();
        sync.persist().await.unwrap();

        assert_eq!(
            transport.commands_for(ChannelKind::Command.uuid()),
            vec!["set_map:0:3", "set_inv:0:true", "save_config"]
        );
    }

    #[tokio::test]
    async fn push_document_flushes_every_field_then_saves() {
        let transport = MockTransport::new().with_config_payload(CONFIG_JSON);
        let (mut session, _rx) = session(&transport);
        session.connect().await.unwrap();

        let document = ConfigDocument {
            mapping: [4, 3, 2, 1],
            invert: [true, false, false, true],
        };
        session
            .config_sync()
            .unwrap()
            .push_document(&document)
            .await
            .unwrap();

        assert_eq!(
            transport.commands_for(ChannelKind::Command.uuid()),
            vec![
                "set_map:0:4",
                "set_map:1:3",
                "set_map:2:2",
                "set_map:3:1",
                "set_inv:0:true",
                "set_inv:1:false",
                "set_inv:2:false",
                "set_inv:3:true",
                "save_config"
            ]
        );
    }

    #[tokio::test]
    async fn notifications_replace_the_cache_wholesale() {
        let transport = MockTransport::new().with_config_payload(CONFIG_JSON);
        let (mut session, mut rx) = session(&transport);
        session.connect().await.unwrap();
        drain(&mut rx);

        transport.push_notification(br#"{"mapping":[2,1,4,3],"invert":[true,true,false,false]}"#);

        let updated = ConfigDocument {
            mapping: [2, 1, 4, 3],
            invert: [true, true, false, false],
        };
        assert_eq!(session.config(), Some(updated.clone()));
        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::ConfigReceived(doc) if *doc == updated)));
    }

    #[tokio::test]
    async fn malformed_notification_keeps_cache_and_connection() {
        let transport = MockTransport::new().with_config_payload(CONFIG_JSON);
        let (mut session, mut rx) = session(&transport);
        session.connect().await.unwrap();
        drain(&mut rx);

        transport.push_notification(b"{\"mapping\":[1,2");

        assert_eq!(session.config(), Some(ConfigDocument::default()));
        assert_eq!(session.state(), ConnectionState::Connected);
        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Status(msg) if msg.severity == MessageSeverity::Error
        )));
    }

    #[tokio::test]
    async fn link_loss_ends_the_session_through_the_watch() {
        let transport = MockTransport::new().with_config_payload(CONFIG_JSON);
        let (mut session, mut rx) = session(&transport);
        session.connect().await.unwrap();
        drain(&mut rx);

        transport.drop_link();

        assert!(!session.is_connected());
        assert_eq!(session.state(), ConnectionState::Disconnected);
        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::Disconnected)));

        // racing UI events after the loss stay absorbed
        session.send_command(MotionCommand::Stop).await;
        assert!(transport.commands_for(ChannelKind::Command.uuid()).is_empty());
    }

    #[tokio::test]
    async fn operator_disconnect_reports_through_the_same_watch() {
        let transport = MockTransport::new().with_config_payload(CONFIG_JSON);
        let (mut session, mut rx) = session(&transport);
        session.connect().await.unwrap();
        drain(&mut rx);

        session.disconnect().await;

        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(session.config(), None);
        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::Disconnected)));
    }
}
