//! CanoKey Console Library
//!
//! Host-side management of CanoKey security tokens over USB: device
//! information, admin applet control (PIN, LED, HOTP-on-touch, applet reset,
//! DFU) and the OATH applet (list, add, import, delete, set-default,
//! calculate).
//!
//! # Layers
//!
//! - [`domain`]: hex and TLV codecs, APDUs, OATH/admin models, handshake crypto
//! - [`infra`]: error taxonomy and configuration
//! - [`adapters`]: libusb control channel and a scripted in-memory device
//! - [`services`]: transceive engine, sessions, applet clients, otpauth import
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "direct-usb")]
//! # async fn run() -> canokey_console::ConsoleResult<()> {
//! use canokey_console::adapters::usb::UsbConnector;
//! use canokey_console::{ConsoleConfiguration, DeviceManager};
//!
//! let config = ConsoleConfiguration::default();
//! let mut manager = DeviceManager::new(UsbConnector::new(config.transport.clone()), &config);
//! let entries = manager.session()?.oath().list().await?;
//! for entry in entries {
//!     println!("{} {}", entry.oath_type, entry.name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod domain;
pub mod infra;
pub mod services;

pub use domain::admin::{AdminState, ConfigFeature, DeviceInfo, FlashSpace, ResettableApplet};
pub use domain::oath::{
    KeyEncoding, KeyMaterial, NewOathEntry, OathAlgorithm, OathEntry, OathProperties, OathType,
    ProtocolVersion,
};
pub use domain::otp::OtpCode;
pub use domain::types::{AdminPin, Applet, OathPassphrase};
pub use infra::config::{ConfigManager, ConsoleConfiguration};
pub use infra::error::{ConsoleError, ConsoleResult};
pub use services::{
    parse_otpauth, ApduHistory, ApduLogEntry, DeviceManager, DeviceSession, MutationReport,
    SelectOutcome,
};
