//! Short-form command and response APDUs.
//!
//! ```text
//! Command:  CLA INS P1 P2 [Lc DATA] [Le]
//! Response: DATA... SW1 SW2
//! ```

use std::fmt;

use zeroize::Zeroize;

use crate::domain::codec::bytes_to_hex;
use crate::domain::constants::{CLA, INS_SELECT, SELECT_BY_NAME, SW1_VERIFY_FAILED, SW_SUCCESS};
use crate::domain::tlv;
use crate::infra::error::{ConsoleError, ConsoleResult};

/// A command APDU.
///
/// Commands carrying secrets are wiped with [`Zeroize`] once sent.
#[derive(Debug, Clone, PartialEq, Eq, Zeroize)]
pub struct CommandApdu {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    data: Vec<u8>,
    le: Option<u8>,
}

impl CommandApdu {
    /// Header-only command (`CLA INS P1 P2`).
    pub fn new(ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla: CLA,
            ins,
            p1,
            p2,
            data: Vec::new(),
            le: None,
        }
    }

    /// SELECT by AID.
    pub fn select(aid: &[u8]) -> Self {
        // AIDs are at most 16 bytes
        Self {
            data: aid.to_vec(),
            ..Self::new(INS_SELECT, SELECT_BY_NAME, 0x00)
        }
    }

    /// Attach a command body; `Lc` is derived from its length.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the body exceeds a short APDU.
    pub fn with_data(mut self, data: Vec<u8>) -> ConsoleResult<Self> {
        tlv::ensure_fits("command body", data.len())?;
        self.data = data;
        Ok(self)
    }

    /// Request a response of any length (`Le = 00`).
    pub fn expect_response(mut self) -> Self {
        self.le = Some(0x00);
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Serialize for the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![self.cla, self.ins, self.p1, self.p2];
        if !self.data.is_empty() {
            // length validated in `with_data`
            out.push(self.data.len() as u8);
            out.extend_from_slice(&self.data);
        }
        if let Some(le) = self.le {
            out.push(le);
        }
        out
    }

    pub fn to_hex(&self) -> String {
        bytes_to_hex(&self.to_bytes())
    }
}

/// Trailing two bytes of every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord(u16);

/// What a status word means to the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Success,
    /// `63Cn`: verification failed, `n` attempts left
    RetriesRemaining(u8),
    /// Any other applet-specific code
    Failure,
}

impl StatusWord {
    pub const SUCCESS: StatusWord = StatusWord(SW_SUCCESS);

    pub fn new(sw1: u8, sw2: u8) -> Self {
        StatusWord(u16::from_be_bytes([sw1, sw2]))
    }

    pub fn sw1(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn sw2(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    pub fn as_u16(self) -> u16 {
        self.0
    }

    pub fn is_success(self) -> bool {
        self.0 == SW_SUCCESS
    }

    pub fn kind(self) -> StatusKind {
        if self.is_success() {
            StatusKind::Success
        } else if self.sw1() == SW1_VERIFY_FAILED && self.sw2() & 0xF0 == 0xC0 {
            StatusKind::RetriesRemaining(self.sw2() & 0x0F)
        } else {
            StatusKind::Failure
        }
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

/// A response APDU. Never mutated after receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseApdu {
    data: Vec<u8>,
    status: StatusWord,
}

impl ResponseApdu {
    /// Split raw response bytes into body and status word.
    ///
    /// # Errors
    ///
    /// Returns `TransportFailure` when fewer than two bytes arrived; an empty
    /// read is how the device reports a failed exchange.
    pub fn from_bytes(mut raw: Vec<u8>) -> ConsoleResult<Self> {
        if raw.len() < 2 {
            return Err(ConsoleError::TransportFailure(format!(
                "response too short: {} bytes",
                raw.len()
            )));
        }
        let sw2 = raw.pop().unwrap_or_default();
        let sw1 = raw.pop().unwrap_or_default();
        Ok(Self {
            data: raw,
            status: StatusWord::new(sw1, sw2),
        })
    }

    /// Response body without the status word.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn status(&self) -> StatusWord {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Fail with `CommandFailed` unless the status is `9000`.
    pub fn require_success(self, operation: &'static str) -> ConsoleResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ConsoleError::CommandFailed {
                operation,
                status: self.status,
            })
        }
    }

    /// Body and status word as they appeared on the wire.
    pub fn to_hex(&self) -> String {
        format!("{}{}", bytes_to_hex(&self.data), self.status)
    }
}
