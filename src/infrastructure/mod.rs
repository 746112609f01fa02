pub mod ble;
pub mod logging;
pub mod transport;
