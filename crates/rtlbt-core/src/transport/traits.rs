//! USB Transport layer abstraction.
//!
//! Defines the `HciTransport` trait for talking to a Bluetooth controller
//! in its ROM bootloader, allowing different implementations (nusb, mock).

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: VID={vid:04X} PID={pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("Endpoint not found: type={ep_type}, direction={direction}")]
    EndpointNotFound { ep_type: String, direction: String },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    pub fn timeout(timeout: Duration) -> Self {
        TransportError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }
}

/// Abstract HCI-over-USB transport.
///
/// Two logical channels:
/// - commands go out as control requests, events come back on the
///   interrupt (notification) endpoint;
/// - bulk OUT/IN carry high-volume transfers such as patch fragments.
///
/// Every call blocks until it completes or `timeout` elapses.
pub trait HciTransport: Send + Sync {
    /// Send an encoded HCI command on the control channel.
    fn send_command(&self, packet: &[u8], timeout: Duration) -> Result<(), TransportError>;

    /// Read one event from the notification channel.
    fn read_event(&self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Write raw bytes to the bulk OUT endpoint.
    fn write_bulk(&self, data: &[u8], timeout: Duration) -> Result<(), TransportError>;

    /// Read one response from the bulk IN endpoint.
    fn read_bulk(&self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Get the current VID.
    fn vendor_id(&self) -> u16;

    /// Get the current PID.
    fn product_id(&self) -> u16;
}

impl<T: HciTransport + ?Sized> HciTransport for &T {
    fn send_command(&self, packet: &[u8], timeout: Duration) -> Result<(), TransportError> {
        (**self).send_command(packet, timeout)
    }

    fn read_event(&self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        (**self).read_event(max_len, timeout)
    }

    fn write_bulk(&self, data: &[u8], timeout: Duration) -> Result<(), TransportError> {
        (**self).write_bulk(data, timeout)
    }

    fn read_bulk(&self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        (**self).read_bulk(max_len, timeout)
    }

    fn vendor_id(&self) -> u16 {
        (**self).vendor_id()
    }

    fn product_id(&self) -> u16 {
        (**self).product_id()
    }
}
