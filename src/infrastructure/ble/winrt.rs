//! WinRT GATT transport backend.
//!
//! Implements the transport seam over the Windows Bluetooth LE stack:
//! advertisement-watcher discovery filtered by the advertised name, a
//! `GattSession` with maintained connection, characteristic
//! read/write/notify and the connection-status watch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{info, warn};
use windows::core::GUID;
use windows::Devices::Bluetooth::Advertisement::{
    BluetoothLEAdvertisementReceivedEventArgs, BluetoothLEAdvertisementWatcher,
    BluetoothLEScanningMode,
};
use windows::Devices::Bluetooth::GenericAttributeProfile::{
    GattCharacteristic, GattClientCharacteristicConfigurationDescriptorValue,
    GattCommunicationStatus, GattDeviceService, GattSession, GattValueChangedEventArgs,
};
use windows::Devices::Bluetooth::{BluetoothConnectionStatus, BluetoothLEDevice};
use windows::Foundation::TypedEventHandler;
use windows::Storage::Streams::{DataReader, DataWriter, IBuffer};

use crate::error::TransportError;
use crate::infrastructure::transport::{DisconnectHandler, NotificationHandler, Transport};

/// End-of-link watch shared between the status handler and a requested
/// close. Fires at most once per session.
#[derive(Default)]
struct LinkWatch {
    handler: Mutex<Option<DisconnectHandler>>,
    fired: AtomicBool,
}

impl LinkWatch {
    fn fire(&self) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(mut handler) = self.handler.lock().unwrap().take() {
            handler();
        }
    }
}

#[derive(Clone)]
pub struct WinRtDevice {
    address: u64,
    opened: Arc<Mutex<Option<BluetoothLEDevice>>>,
    session: Arc<Mutex<Option<GattSession>>>,
    watch: Arc<LinkWatch>,
}

impl WinRtDevice {
    fn ble(&self) -> Result<BluetoothLEDevice, TransportError> {
        self.opened
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| TransportError::Operation("device is not open".into()))
    }
}

#[derive(Clone)]
pub struct WinRtService(GattDeviceService);

#[derive(Clone)]
pub struct WinRtChannel(GattCharacteristic);

#[derive(Default)]
pub struct WinRtTransport;

impl WinRtTransport {
    pub fn new() -> Self {
        Self
    }

    async fn create_gatt_session(ble: &BluetoothLEDevice) -> windows::core::Result<GattSession> {
        let session = GattSession::FromDeviceIdAsync(&ble.BluetoothDeviceId()?)?.await?;
        session.SetMaintainConnection(true)?;
        Ok(session)
    }
}

#[async_trait]
impl Transport for WinRtTransport {
    type Device = WinRtDevice;
    type Service = WinRtService;
    type Channel = WinRtChannel;

    async fn select_device(&self, name_filter: &str) -> Result<WinRtDevice, TransportError> {
        let watcher = BluetoothLEAdvertisementWatcher::new().map_err(op_err)?;
        watcher
            .SetScanningMode(BluetoothLEScanningMode::Active)
            .map_err(op_err)?;

        let (tx, rx) = oneshot::channel::<u64>();
        let slot = Arc::new(Mutex::new(Some(tx)));
        let filter = name_filter.to_string();
        let sender = Arc::clone(&slot);

        let handler = TypedEventHandler::new(
            move |_: windows::core::Ref<BluetoothLEAdvertisementWatcher>,
                  args: windows::core::Ref<BluetoothLEAdvertisementReceivedEventArgs>| {
                if let Some(args) = args.as_ref() {
                    let name = args.Advertisement()?.LocalName()?.to_string();
                    if name == filter {
                        if let Some(tx) = sender.lock().unwrap().take() {
                            let _ = tx.send(args.BluetoothAddress()?);
                        }
                    }
                }
                Ok(())
            },
        );
        watcher.Received(&handler).map_err(op_err)?;
        watcher.Start().map_err(op_err)?;

        let address = rx.await.map_err(|_| TransportError::NoDevice)?;
        let _ = watcher.Stop();
        info!("matching device found at {:#X}", address);

        Ok(WinRtDevice {
            address,
            opened: Arc::new(Mutex::new(None)),
            session: Arc::new(Mutex::new(None)),
            watch: Arc::new(LinkWatch::default()),
        })
    }

    async fn connect(&self, device: &WinRtDevice) -> Result<(), TransportError> {
        let ble = BluetoothLEDevice::FromBluetoothAddressAsync(device.address)
            .map_err(connect_err)?
            .await
            .map_err(connect_err)?;

        // A maintained GattSession keeps Windows from dropping the link
        // between operations.
        match Self::create_gatt_session(&ble).await {
            Ok(session) => *device.session.lock().unwrap() = Some(session),
            Err(err) => warn!("could not create GattSession: {err}"),
        }

        *device.opened.lock().unwrap() = Some(ble);
        Ok(())
    }

    async fn discover_service(
        &self,
        device: &WinRtDevice,
        service_uuid: &str,
    ) -> Result<WinRtService, TransportError> {
        let ble = device.ble()?;
        let guid = parse_uuid(service_uuid)?;

        let result = ble
            .GetGattServicesForUuidAsync(guid)
            .map_err(op_err)?
            .await
            .map_err(op_err)?;
        if result.Status().map_err(op_err)? != GattCommunicationStatus::Success {
            return Err(TransportError::ServiceMissing(service_uuid.to_string()));
        }

        let services = result.Services().map_err(op_err)?;
        if services.Size().map_err(op_err)? == 0 {
            return Err(TransportError::ServiceMissing(service_uuid.to_string()));
        }
        let service = services.GetAt(0).map_err(op_err)?;

        if let Ok(op) = service.RequestAccessAsync() {
            let _ = op.await;
        }

        Ok(WinRtService(service))
    }

    async fn resolve_channel(
        &self,
        service: &WinRtService,
        channel_uuid: &str,
    ) -> Result<WinRtChannel, TransportError> {
        let guid = parse_uuid(channel_uuid)?;

        let result = service
            .0
            .GetCharacteristicsForUuidAsync(guid)
            .map_err(op_err)?
            .await
            .map_err(op_err)?;
        if result.Status().map_err(op_err)? != GattCommunicationStatus::Success {
            return Err(TransportError::ChannelMissing(channel_uuid.to_string()));
        }

        let characteristics = result.Characteristics().map_err(op_err)?;
        if characteristics.Size().map_err(op_err)? == 0 {
            return Err(TransportError::ChannelMissing(channel_uuid.to_string()));
        }
        Ok(WinRtChannel(characteristics.GetAt(0).map_err(op_err)?))
    }

    async fn read(&self, channel: &WinRtChannel) -> Result<Vec<u8>, TransportError> {
        let result = channel
            .0
            .ReadValueAsync()
            .map_err(op_err)?
            .await
            .map_err(op_err)?;
        if result.Status().map_err(op_err)? != GattCommunicationStatus::Success {
            return Err(TransportError::Operation("characteristic read refused".into()));
        }
        buffer_to_vec(&result.Value().map_err(op_err)?)
    }

    async fn write(&self, channel: &WinRtChannel, payload: &[u8]) -> Result<(), TransportError> {
        let buffer = to_buffer(payload)?;
        let status = channel
            .0
            .WriteValueAsync(&buffer)
            .map_err(op_err)?
            .await
            .map_err(op_err)?;
        if status != GattCommunicationStatus::Success {
            return Err(TransportError::Operation(format!(
                "characteristic write returned {status:?}"
            )));
        }
        Ok(())
    }

    fn post(&self, channel: &WinRtChannel, payload: &[u8]) -> Result<(), TransportError> {
        let buffer = to_buffer(payload)?;
        // Fire-and-forget: start the operation, never observe completion
        let _ = channel.0.WriteValueAsync(&buffer).map_err(op_err)?;
        Ok(())
    }

    async fn subscribe(
        &self,
        channel: &WinRtChannel,
        handler: NotificationHandler,
    ) -> Result<(), TransportError> {
        let status = channel
            .0
            .WriteClientCharacteristicConfigurationDescriptorAsync(
                GattClientCharacteristicConfigurationDescriptorValue::Notify,
            )
            .map_err(op_err)?
            .await
            .map_err(op_err)?;
        if status != GattCommunicationStatus::Success {
            return Err(TransportError::Operation(format!(
                "notification subscription returned {status:?}"
            )));
        }

        let handler = Mutex::new(handler);
        let typed = TypedEventHandler::new(
            move |_: windows::core::Ref<GattCharacteristic>,
                  args: windows::core::Ref<GattValueChangedEventArgs>| {
                if let Some(args) = args.as_ref() {
                    let buffer = args.CharacteristicValue()?;
                    let reader = DataReader::FromBuffer(&buffer)?;
                    let length = reader.UnconsumedBufferLength()? as usize;
                    let mut bytes = vec![0u8; length];
                    reader.ReadBytes(&mut bytes)?;
                    if let Ok(mut callback) = handler.lock() {
                        (*callback)(bytes);
                    }
                }
                Ok(())
            },
        );
        channel.0.ValueChanged(&typed).map_err(op_err)?;
        Ok(())
    }

    fn watch_disconnect(
        &self,
        device: &WinRtDevice,
        handler: DisconnectHandler,
    ) -> Result<(), TransportError> {
        *device.watch.handler.lock().unwrap() = Some(handler);

        let ble = device.ble()?;
        let watch = Arc::clone(&device.watch);
        let typed = TypedEventHandler::new(
            move |dev: windows::core::Ref<BluetoothLEDevice>, _| {
                if let Some(dev) = dev.as_ref() {
                    if dev.ConnectionStatus()? == BluetoothConnectionStatus::Disconnected {
                        watch.fire();
                    }
                }
                Ok(())
            },
        );
        ble.ConnectionStatusChanged(&typed).map_err(op_err)?;
        Ok(())
    }

    async fn disconnect(&self, device: &WinRtDevice) -> Result<(), TransportError> {
        device.session.lock().unwrap().take();
        if let Some(ble) = device.opened.lock().unwrap().take() {
            let _ = ble.Close();
        }
        // Windows does not reliably raise ConnectionStatusChanged for a
        // requested close; the watch still has to fire exactly once.
        device.watch.fire();
        Ok(())
    }
}

fn to_buffer(payload: &[u8]) -> Result<IBuffer, TransportError> {
    let writer = DataWriter::new().map_err(op_err)?;
    writer.WriteBytes(payload).map_err(op_err)?;
    writer.DetachBuffer().map_err(op_err)
}

fn buffer_to_vec(buffer: &IBuffer) -> Result<Vec<u8>, TransportError> {
    let reader = DataReader::FromBuffer(buffer).map_err(op_err)?;
    let length = reader.UnconsumedBufferLength().map_err(op_err)? as usize;
    let mut bytes = vec![0u8; length];
    reader.ReadBytes(&mut bytes).map_err(op_err)?;
    Ok(bytes)
}

/// Parse a canonical UUID string into a Windows GUID.
fn parse_uuid(uuid: &str) -> Result<GUID, TransportError> {
    let hex = uuid.replace('-', "");
    if hex.len() != 32 {
        return Err(TransportError::Operation(format!("invalid UUID: {uuid}")));
    }

    let bad = || TransportError::Operation(format!("invalid UUID: {uuid}"));
    let data1 = u32::from_str_radix(&hex[0..8], 16).map_err(|_| bad())?;
    let data2 = u16::from_str_radix(&hex[8..12], 16).map_err(|_| bad())?;
    let data3 = u16::from_str_radix(&hex[12..16], 16).map_err(|_| bad())?;

    let mut data4 = [0u8; 8];
    for (i, byte) in data4.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[16 + i * 2..18 + i * 2], 16).map_err(|_| bad())?;
    }

    Ok(GUID {
        data1,
        data2,
        data3,
        data4,
    })
}

fn op_err(err: windows::core::Error) -> TransportError {
    TransportError::Operation(err.to_string())
}

fn connect_err(err: windows::core::Error) -> TransportError {
    TransportError::ConnectFailed(err.to_string())
}
