//! USB vendor control-transfer channel to a CanoKey.
//!
//! The token exposes a vendor-specific interface (class `0xFF`). Every
//! transfer is a vendor request addressed to that interface:
//!
//! ```text
//! bmRequestType  vendor | interface, direction per request
//! bRequest       0 = send APDU, 1 = fetch response, 2 = poll status
//! wValue         0
//! wIndex         interface number (1)
//! ```

use std::time::Duration;

use rusb::{Context, Device, DeviceHandle, Direction, Recipient, RequestType, UsbContext};

use crate::infra::config::TransportConfig;
use crate::infra::error::{ConsoleError, ConsoleResult};
use crate::services::manager::Connector;
use crate::services::transceive::ControlChannel;

/// Claimed vendor interface on an open CanoKey.
pub struct UsbControlChannel {
    /// USB device handle.
    handle: DeviceHandle<Context>,
    /// The interface number we claimed.
    interface_number: u8,
    /// Timeout for a single control transfer.
    timeout: Duration,
    /// Whether the interface has been claimed.
    interface_claimed: bool,
}

impl UsbControlChannel {
    /// Open the first device whose configured interface number carries the
    /// vendor-specific class, and claim that interface.
    ///
    /// Candidates that cannot be opened or claimed are skipped.
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if no candidate is attached, or the last
    /// open/claim failure if every candidate was refused.
    pub fn open(config: &TransportConfig) -> ConsoleResult<Self> {
        let context = Context::new().map_err(|e| {
            ConsoleError::TransportFailure(format!("Failed to create USB context: {e}"))
        })?;

        let devices = context.devices().map_err(|e| {
            ConsoleError::TransportFailure(format!("Failed to enumerate USB devices: {e}"))
        })?;

        let mut last_failure = None;
        for device in devices.iter() {
            if !has_vendor_interface(&device, config) {
                continue;
            }

            let ids = device
                .device_descriptor()
                .map(|desc| format!("{:04x}:{:04x}", desc.vendor_id(), desc.product_id()))
                .unwrap_or_else(|_| "unknown".to_string());
            log::debug!("Trying vendor-class device {ids}");

            match Self::claim(&device, config) {
                Ok(channel) => return Ok(channel),
                Err(e) => {
                    log::debug!("Skipping device {ids}: {e}");
                    last_failure = Some(e);
                }
            }
        }

        Err(last_failure.unwrap_or_else(|| {
            ConsoleError::DeviceUnavailable(format!(
                "No USB device with interface {} of class 0x{:02X} found",
                config.interface_number, config.interface_class
            ))
        }))
    }

    fn claim(device: &Device<Context>, config: &TransportConfig) -> ConsoleResult<Self> {
        let interface_number = config.interface_number;
        let handle = device.open().map_err(|e| {
            ConsoleError::TransportFailure(format!("Failed to open USB device: {e}"))
        })?;

        // Detach kernel driver if necessary (Linux)
        #[cfg(target_os = "linux")]
        {
            if handle
                .kernel_driver_active(interface_number)
                .unwrap_or(false)
            {
                handle.detach_kernel_driver(interface_number).map_err(|e| {
                    ConsoleError::TransportFailure(format!("Failed to detach kernel driver: {e}"))
                })?;
            }
        }

        handle.claim_interface(interface_number).map_err(|e| {
            ConsoleError::TransportFailure(format!(
                "Failed to claim USB interface {interface_number}: {e}"
            ))
        })?;
        log::info!("Claimed USB interface {interface_number}");

        Ok(Self {
            handle,
            interface_number,
            timeout: config.usb_timeout(),
            interface_claimed: true,
        })
    }

    fn index(&self) -> u16 {
        u16::from(self.interface_number)
    }
}

fn has_vendor_interface(device: &Device<Context>, config: &TransportConfig) -> bool {
    let Ok(descriptor) = device.active_config_descriptor() else {
        return false;
    };
    let interfaces = descriptor
        .interfaces()
        .flat_map(|interface| interface.descriptors())
        .map(|desc| (desc.interface_number(), desc.class_code()));
    exposes_interface(interfaces, config.interface_number, config.interface_class)
}

/// Whether `(number, class)` pairs include the wanted interface with the
/// wanted class. Another interface of that class does not count.
fn exposes_interface(
    interfaces: impl IntoIterator<Item = (u8, u8)>,
    number: u8,
    class: u8,
) -> bool {
    interfaces
        .into_iter()
        .any(|(n, c)| n == number && c == class)
}

impl ControlChannel for UsbControlChannel {
    fn control_out(&mut self, request: u8, data: &[u8]) -> ConsoleResult<usize> {
        let request_type = rusb::request_type(Direction::Out, RequestType::Vendor, Recipient::Interface);
        self.handle
            .write_control(request_type, request, 0, self.index(), data, self.timeout)
            .map_err(|e| ConsoleError::TransportFailure(format!("USB write failed: {e}")))
    }

    fn control_in(&mut self, request: u8, buf: &mut [u8]) -> ConsoleResult<usize> {
        let request_type = rusb::request_type(Direction::In, RequestType::Vendor, Recipient::Interface);
        self.handle
            .read_control(request_type, request, 0, self.index(), buf, self.timeout)
            .map_err(|e| match e {
                rusb::Error::NoDevice => ConsoleError::from(e),
                other => ConsoleError::TransportFailure(format!("USB read failed: {other}")),
            })
    }
}

impl Drop for UsbControlChannel {
    fn drop(&mut self) {
        if self.interface_claimed {
            let _ = self.handle.release_interface(self.interface_number);
        }
    }
}

/// Opens [`UsbControlChannel`]s with a fixed transport configuration.
#[derive(Debug, Clone)]
pub struct UsbConnector {
    config: TransportConfig,
}

impl UsbConnector {
    #[must_use]
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }
}

impl Connector for UsbConnector {
    type Channel = UsbControlChannel;

    fn connect(&self) -> ConsoleResult<Self::Channel> {
        UsbControlChannel::open(&self.config)
    }
}
