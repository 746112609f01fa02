//! Transport seam.
//!
//! The underlying wireless link expressed as an async trait: device
//! selection, link connect, service discovery, channel resolution,
//! read/write/notify and teardown. Every operation suspends its caller
//! until exactly one success or one failure outcome is available; the
//! only streaming path is the dedicated notification subscription.
//!
//! Discrete writes go through [`Transport::write`] and must be awaited
//! in issue order per channel. [`Transport::post`] is the
//! fire-and-forget path for live control signals: completion is not
//! observed and a later post supersedes an earlier one.

use async_trait::async_trait;

use crate::error::TransportError;

/// Callback invoked with each notification payload on a subscribed
/// channel.
pub type NotificationHandler = Box<dyn FnMut(Vec<u8>) + Send + 'static>;

/// Callback invoked once when the transport reports that the link
/// ended, whether operator-initiated or lost.
pub type DisconnectHandler = Box<dyn FnMut() + Send + 'static>;

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Device: Clone + Send + Sync;
    type Service: Clone + Send + Sync;
    type Channel: Clone + Send + Sync;

    /// Select the peripheral advertising `name_filter`. No broad scan:
    /// the filter string is the only discovery surface.
    async fn select_device(&self, name_filter: &str) -> Result<Self::Device, TransportError>;

    /// Establish the link to a selected device.
    async fn connect(&self, device: &Self::Device) -> Result<(), TransportError>;

    /// Resolve the primary service by UUID.
    async fn discover_service(
        &self,
        device: &Self::Device,
        service_uuid: &str,
    ) -> Result<Self::Service, TransportError>;

    /// Resolve one channel of the service by UUID.
    async fn resolve_channel(
        &self,
        service: &Self::Service,
        channel_uuid: &str,
    ) -> Result<Self::Channel, TransportError>;

    /// Read the channel's current value.
    async fn read(&self, channel: &Self::Channel) -> Result<Vec<u8>, TransportError>;

    /// Write `payload` and suspend until the transport confirms the
    /// write completed.
    async fn write(&self, channel: &Self::Channel, payload: &[u8]) -> Result<(), TransportError>;

    /// Issue a write without observing its completion. Latest wins;
    /// out-of-order completion against other posts is acceptable.
    fn post(&self, channel: &Self::Channel, payload: &[u8]) -> Result<(), TransportError>;

    /// Arm notification delivery on the channel.
    async fn subscribe(
        &self,
        channel: &Self::Channel,
        handler: NotificationHandler,
    ) -> Result<(), TransportError>;

    /// Register the end-of-link watch. The handler fires exactly once
    /// per session, for both requested and unsolicited disconnection.
    fn watch_disconnect(
        &self,
        device: &Self::Device,
        handler: DisconnectHandler,
    ) -> Result<(), TransportError>;

    /// Tear the link down. In-flight operations are abandoned.
    async fn disconnect(&self, device: &Self::Device) -> Result<(), TransportError>;
}
