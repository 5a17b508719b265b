//! Direct USB access to the token through libusb.
//!
//! No smart-card middleware is involved: APDUs travel in vendor control
//! transfers on a single claimed interface.

#[cfg(feature = "direct-usb")]
pub mod transport;

#[cfg(feature = "direct-usb")]
pub use transport::{UsbConnector, UsbControlChannel};
