//! USB control-transfer channel
//!
//! [`UsbControl`] is the only thing the [`Usbasp`](crate::Usbasp) device
//! needs from the USB stack: open/close plus vendor control transfers.
//! [`NusbTransport`] implements it on top of `nusb`.

use std::time::Duration;

use nusb::transfer::{ControlIn, ControlOut, ControlType, Recipient};
use nusb::{Interface, MaybeFuture};

use crate::error::{Result, UsbaspError};
use crate::protocol::USBASP_INTERFACE;

/// Timeout for a single control transfer
pub const USB_TIMEOUT: Duration = Duration::from_secs(5);

/// Vendor control-transfer channel to one device
pub trait UsbControl {
    /// Find the device, open it and claim its interface
    fn open(&mut self) -> Result<()>;

    /// Release the interface and the device handle
    ///
    /// Must be safe to call when not open.
    fn close(&mut self);

    /// Whether a device handle is held
    fn is_open(&self) -> bool;

    /// Device-to-host vendor request; returns the bytes actually sent
    fn control_in(&mut self, request: u8, value: u16, index: u16, length: u16)
        -> Result<Vec<u8>>;

    /// Host-to-device vendor request
    fn control_out(&mut self, request: u8, value: u16, index: u16, data: &[u8]) -> Result<()>;
}

/// Information about a connected USBasp
#[derive(Debug, Clone)]
pub struct UsbaspDeviceInfo {
    /// Platform bus identifier
    pub bus_id: String,
    /// Device address on the bus
    pub address: u8,
    /// Product string, if the device reports one
    pub product: Option<String>,
    /// Serial number, if the device reports one
    pub serial: Option<String>,
}

/// List attached devices matching `vendor_id`/`product_id`
pub fn list_devices(vendor_id: u16, product_id: u16) -> Result<Vec<UsbaspDeviceInfo>> {
    let devices = nusb::list_devices()
        .wait()
        .map_err(|e| UsbaspError::OpenFailed(e.to_string()))?
        .filter(|d| d.vendor_id() == vendor_id && d.product_id() == product_id)
        .map(|d| UsbaspDeviceInfo {
            bus_id: d.bus_id().to_string(),
            address: d.device_address(),
            product: d.product_string().map(str::to_string),
            serial: d.serial_number().map(str::to_string),
        })
        .collect();

    Ok(devices)
}

/// `nusb`-backed control channel
pub struct NusbTransport {
    vendor_id: u16,
    product_id: u16,
    interface: Option<Interface>,
}

impl NusbTransport {
    /// Create a closed transport for the given identifiers
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
            interface: None,
        }
    }

    fn interface(&self) -> Result<&Interface> {
        self.interface.as_ref().ok_or(UsbaspError::NotOpen)
    }
}

impl UsbControl for NusbTransport {
    fn open(&mut self) -> Result<()> {
        let device_info = nusb::list_devices()
            .wait()
            .map_err(|e| UsbaspError::OpenFailed(e.to_string()))?
            .find(|d| d.vendor_id() == self.vendor_id && d.product_id() == self.product_id)
            .ok_or(UsbaspError::DeviceNotFound {
                vendor_id: self.vendor_id,
                product_id: self.product_id,
            })?;

        log::info!(
            "Opening USBasp at bus {} address {}",
            device_info.bus_id(),
            device_info.device_address()
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| UsbaspError::OpenFailed(e.to_string()))?;

        let interface = device
            .claim_interface(USBASP_INTERFACE)
            .wait()
            .map_err(|e| UsbaspError::ClaimFailed(e.to_string()))?;

        self.interface = Some(interface);
        Ok(())
    }

    fn close(&mut self) {
        // Dropping the interface releases it and closes the device
        if self.interface.take().is_some() {
            log::debug!("Released USBasp interface");
        }
    }

    fn is_open(&self) -> bool {
        self.interface.is_some()
    }

    fn control_in(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        length: u16,
    ) -> Result<Vec<u8>> {
        let data = self
            .interface()?
            .control_in(
                ControlIn {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request,
                    value,
                    index,
                    length,
                },
                USB_TIMEOUT,
            )
            .wait()
            .map_err(|e| UsbaspError::TransferFailed(e.to_string()))?;

        log::trace!(
            "IN  req={} value=0x{:04X} index=0x{:04X} -> {:02X?}",
            request,
            value,
            index,
            data
        );
        Ok(data)
    }

    fn control_out(&mut self, request: u8, value: u16, index: u16, data: &[u8]) -> Result<()> {
        log::trace!(
            "OUT req={} value=0x{:04X} index=0x{:04X} len={}",
            request,
            value,
            index,
            data.len()
        );

        self.interface()?
            .control_out(
                ControlOut {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request,
                    value,
                    index,
                    data,
                },
                USB_TIMEOUT,
            )
            .wait()
            .map_err(|e| UsbaspError::TransferFailed(e.to_string()))
    }
}
