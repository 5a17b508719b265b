//! Admin applet value types.

use std::fmt;
use std::str::FromStr;

use crate::domain::constants::admin;
use crate::infra::error::{ConsoleError, ConsoleResult};

/// Where the admin applet stands for this session.
///
/// `Unselected -> Selected -> Authenticated`; the ordering is used for
/// precondition checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AdminState {
    Unselected,
    Selected,
    Authenticated,
}

/// Device features toggled through the CONFIG instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFeature {
    Led,
    HotpTouch,
}

impl ConfigFeature {
    pub fn p1(self) -> u8 {
        match self {
            ConfigFeature::Led => admin::CONFIG_LED,
            ConfigFeature::HotpTouch => admin::CONFIG_HOTP_TOUCH,
        }
    }

    /// Minimum applet state the console requires before sending the toggle.
    /// The device enforces its own authorization on top.
    pub fn required_state(self) -> AdminState {
        match self {
            ConfigFeature::Led | ConfigFeature::HotpTouch => AdminState::Selected,
        }
    }
}

impl FromStr for ConfigFeature {
    type Err = ConsoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "led" => Ok(ConfigFeature::Led),
            "hotp-touch" | "hotp_touch" | "hotp" => Ok(ConfigFeature::HotpTouch),
            _ => Err(ConsoleError::InvalidInput(format!(
                "Unknown config feature '{s}'. Valid: led, hotp-touch"
            ))),
        }
    }
}

impl fmt::Display for ConfigFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigFeature::Led => f.write_str("LED"),
            ConfigFeature::HotpTouch => f.write_str("HOTP on touch"),
        }
    }
}

/// Applets the admin applet can wipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResettableApplet {
    OpenPgp,
    Piv,
    Oath,
}

impl ResettableApplet {
    pub fn instruction(self) -> u8 {
        match self {
            ResettableApplet::OpenPgp => admin::INS_RESET_OPENPGP,
            ResettableApplet::Piv => admin::INS_RESET_PIV,
            ResettableApplet::Oath => admin::INS_RESET_OATH,
        }
    }
}

impl FromStr for ResettableApplet {
    type Err = ConsoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openpgp" | "pgp" => Ok(ResettableApplet::OpenPgp),
            "piv" => Ok(ResettableApplet::Piv),
            "oath" => Ok(ResettableApplet::Oath),
            _ => Err(ConsoleError::InvalidInput(format!(
                "Unknown applet '{s}'. Valid: openpgp, piv, oath"
            ))),
        }
    }
}

impl fmt::Display for ResettableApplet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResettableApplet::OpenPgp => f.write_str("OpenPGP"),
            ResettableApplet::Piv => f.write_str("PIV"),
            ResettableApplet::Oath => f.write_str("OATH"),
        }
    }
}

/// Free and total flash, in KiB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashSpace {
    pub free_kib: u16,
    pub total_kib: u16,
}

impl FlashSpace {
    /// Decode the flash-space response body.
    ///
    /// Four or more bytes are two big-endian `u16`s; two bytes are one byte
    /// each (older firmware).
    pub fn from_response(body: &[u8]) -> ConsoleResult<Self> {
        match body {
            [f0, f1, t0, t1, ..] => Ok(Self {
                free_kib: u16::from_be_bytes([*f0, *f1]),
                total_kib: u16::from_be_bytes([*t0, *t1]),
            }),
            [free, total] => Ok(Self {
                free_kib: u16::from(*free),
                total_kib: u16::from(*total),
            }),
            _ => Err(ConsoleError::MalformedResponse(format!(
                "flash space response has {} bytes",
                body.len()
            ))),
        }
    }
}

impl fmt::Display for FlashSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} KiB free of {} KiB", self.free_kib, self.total_kib)
    }
}

/// Identity of the connected token. Fields the device refuses stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub firmware_version: Option<String>,
    pub model: Option<String>,
    /// Serial number as uppercase hex
    pub serial_number: Option<String>,
    /// Chip id as uppercase hex
    pub chip_id: Option<String>,
}
