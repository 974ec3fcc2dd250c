//! nusb-based USB transport implementation.
//!
//! HCI commands are class control requests on the default pipe, events
//! arrive on the interrupt IN endpoint, and bulk IN/OUT carry the
//! high-volume traffic.

use nusb::descriptors::TransferType;
use nusb::transfer::{
    Buffer, Bulk, ControlOut, ControlType, Direction, In, Interrupt, Out, Recipient,
    TransferError,
};
use nusb::{Interface, MaybeFuture, list_devices};
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::traits::{HciTransport, TransportError};
use crate::protocol::constants::{REALTEK_VENDOR_ID, SUPPORTED_PIDS};

/// nusb-based USB transport.
pub struct NusbTransport {
    interface: Interface,
    event_endpoint: u8,
    bulk_in_endpoint: u8,
    bulk_out_endpoint: u8,
    vid: u16,
    pid: u16,
}

fn map_transfer_error(e: TransferError, timeout: Duration, write: bool) -> TransportError {
    match e {
        // Blocking transfers are cancelled when their timeout expires.
        TransferError::Cancelled => TransportError::timeout(timeout),
        TransferError::Disconnected => TransportError::Disconnected,
        other if write => TransportError::WriteFailed(other.to_string()),
        other => TransportError::ReadFailed(other.to_string()),
    }
}

impl NusbTransport {
    /// Open the first attached Realtek Bluetooth controller.
    #[instrument(level = "info")]
    pub fn open() -> Result<Self, TransportError> {
        let devices = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        for device_info in devices {
            if device_info.vendor_id() == REALTEK_VENDOR_ID
                && SUPPORTED_PIDS.contains(&device_info.product_id())
            {
                return Self::open_device_info(device_info);
            }
        }

        Err(TransportError::DeviceNotFound {
            vid: REALTEK_VENDOR_ID,
            pid: 0,
        })
    }

    /// Open a device with specific VID/PID.
    #[instrument(level = "info", fields(vid = format!("{:04X}", vid), pid = format!("{:04X}", pid)))]
    pub fn open_with_ids(vid: u16, pid: u16) -> Result<Self, TransportError> {
        let device_info = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .find(|d| d.vendor_id() == vid && d.product_id() == pid)
            .ok_or(TransportError::DeviceNotFound { vid, pid })?;

        Self::open_device_info(device_info)
    }

    fn open_device_info(device_info: nusb::DeviceInfo) -> Result<Self, TransportError> {
        let vid = device_info.vendor_id();
        let pid = device_info.product_id();

        info!(
            vendor_id = %format!("{:04X}", vid),
            product_id = %format!("{:04X}", pid),
            "Found device"
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        let interface =
            device
                .claim_interface(0)
                .wait()
                .map_err(|e| TransportError::ClaimInterfaceFailed {
                    interface: 0,
                    message: e.to_string(),
                })?;

        // Interface 0 of a Bluetooth controller: interrupt IN + bulk IN/OUT.
        let mut event_endpoint: u8 = 0;
        let mut bulk_in_endpoint: u8 = 0;
        let mut bulk_out_endpoint: u8 = 0;

        for config in device.configurations() {
            for iface in config.interfaces() {
                if iface.interface_number() != 0 {
                    continue;
                }
                for alt in iface.alt_settings() {
                    for ep in alt.endpoints() {
                        match (ep.transfer_type(), ep.direction()) {
                            (TransferType::Interrupt, Direction::In) => {
                                event_endpoint = ep.address()
                            }
                            (TransferType::Bulk, Direction::In) => bulk_in_endpoint = ep.address(),
                            (TransferType::Bulk, Direction::Out) => {
                                bulk_out_endpoint = ep.address()
                            }
                            _ => {}
                        }
                    }
                }
            }
        }

        let missing = |ep_type: &str, direction: &str| TransportError::EndpointNotFound {
            ep_type: ep_type.into(),
            direction: direction.into(),
        };
        if event_endpoint == 0 {
            return Err(missing("Interrupt", "In"));
        }
        if bulk_in_endpoint == 0 {
            return Err(missing("Bulk", "In"));
        }
        if bulk_out_endpoint == 0 {
            return Err(missing("Bulk", "Out"));
        }

        info!(
            event_ep = %format!("0x{:02X}", event_endpoint),
            bulk_in_ep = %format!("0x{:02X}", bulk_in_endpoint),
            bulk_out_ep = %format!("0x{:02X}", bulk_out_endpoint),
            "Device opened successfully"
        );

        Ok(Self {
            interface,
            event_endpoint,
            bulk_in_endpoint,
            bulk_out_endpoint,
            vid,
            pid,
        })
    }
}

impl HciTransport for NusbTransport {
    #[instrument(skip(self, packet), fields(len = packet.len()))]
    fn send_command(&self, packet: &[u8], timeout: Duration) -> Result<(), TransportError> {
        self.interface
            .control_out(
                ControlOut {
                    control_type: ControlType::Class,
                    recipient: Recipient::Device,
                    request: 0,
                    value: 0,
                    index: 0,
                    data: packet,
                },
                timeout,
            )
            .wait()
            .map_err(|e| map_transfer_error(e, timeout, true))?;

        debug!(bytes_written = packet.len(), "Command sent");
        Ok(())
    }

    #[instrument(skip(self), fields(max_len))]
    fn read_event(&self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let mut ep = self
            .interface
            .endpoint::<Interrupt, In>(self.event_endpoint)
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;

        // Request length must be a multiple of the max packet size.
        let mps = ep.max_packet_size().max(1);
        let request_len = max_len.div_ceil(mps) * mps;
        let mut buf = Buffer::new(request_len);
        buf.set_requested_len(request_len);

        let data = ep
            .transfer_blocking(buf, timeout)
            .into_result()
            .map_err(|e| map_transfer_error(e, timeout, false))?;

        let n = data.len().min(max_len);
        debug!(bytes_read = n, "Event read");
        Ok(data[..n].to_vec())
    }

    #[instrument(skip(self, data), fields(len = data.len()))]
    fn write_bulk(&self, data: &[u8], timeout: Duration) -> Result<(), TransportError> {
        let mut ep = self
            .interface
            .endpoint::<Bulk, Out>(self.bulk_out_endpoint)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;

        let mut buf = Buffer::new(data.len());
        buf.extend_from_slice(data);

        ep.transfer_blocking(buf, timeout)
            .into_result()
            .map_err(|e| map_transfer_error(e, timeout, true))?;

        debug!(bytes_written = data.len(), "Bulk write complete");
        Ok(())
    }

    #[instrument(skip(self), fields(max_len))]
    fn read_bulk(&self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let mut ep = self
            .interface
            .endpoint::<Bulk, In>(self.bulk_in_endpoint)
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;

        let mps = ep.max_packet_size().max(1);
        let request_len = max_len.div_ceil(mps) * mps;
        let mut buf = Buffer::new(request_len);
        buf.set_requested_len(request_len);

        let data = ep
            .transfer_blocking(buf, timeout)
            .into_result()
            .map_err(|e| map_transfer_error(e, timeout, false))?;

        let n = data.len().min(max_len);
        debug!(bytes_read = n, "Bulk read complete");
        Ok(data[..n].to_vec())
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}
