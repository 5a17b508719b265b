//! Type-safe wrappers using new-type pattern
//!
//! Secrets (PIN, OATH passphrase) are wiped from memory when dropped and
//! never printed. They are moved into the call that uses them so nothing
//! outlives the handshake.

use std::fmt;

use zeroize::Zeroizing;

use crate::domain::constants::{ADMIN_AID, OATH_AID};
use crate::infra::error::{ConsoleError, ConsoleResult};

/// Longest PIN the admin applet accepts.
const MAX_PIN_LEN: usize = 64;

/// Shortest PIN the admin applet accepts.
const MIN_PIN_LEN: usize = 6;

/// Admin applet PIN
pub struct AdminPin(Zeroizing<String>);

impl AdminPin {
    /// Create a new AdminPin after validation
    pub fn new(pin: impl Into<String>) -> ConsoleResult<Self> {
        let pin = Zeroizing::new(pin.into());
        Self::validate_pin(&pin)?;
        Ok(AdminPin(pin))
    }

    /// Get the PIN as UTF-8 bytes for the VERIFY command
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    fn validate_pin(pin: &str) -> ConsoleResult<()> {
        if pin.len() < MIN_PIN_LEN {
            return Err(ConsoleError::InvalidInput(format!(
                "PIN too short: {} bytes (minimum {MIN_PIN_LEN})",
                pin.len()
            )));
        }
        if pin.len() > MAX_PIN_LEN {
            return Err(ConsoleError::InvalidInput(format!(
                "PIN too long: {} bytes (maximum {MAX_PIN_LEN})",
                pin.len()
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for AdminPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AdminPin([REDACTED])")
    }
}

/// OATH applet passphrase
pub struct OathPassphrase(Zeroizing<String>);

impl OathPassphrase {
    pub fn new(passphrase: impl Into<String>) -> ConsoleResult<Self> {
        let passphrase = Zeroizing::new(passphrase.into());
        if passphrase.is_empty() {
            return Err(ConsoleError::InvalidInput(
                "OATH passphrase cannot be empty".to_string(),
            ));
        }
        Ok(OathPassphrase(passphrase))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for OathPassphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OathPassphrase([REDACTED])")
    }
}

/// On-device applets the console talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applet {
    Admin,
    Oath,
}

impl Applet {
    pub fn aid(self) -> &'static [u8] {
        match self {
            Applet::Admin => ADMIN_AID,
            Applet::Oath => OATH_AID,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Applet::Admin => "admin",
            Applet::Oath => "OATH",
        }
    }
}

impl fmt::Display for Applet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether a command may appear in clear in the APDU history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redaction {
    Plain,
    Secret,
}
