//! TOTP challenge and code extraction.
//!
//! The device computes the HMAC and the dynamic truncation offset; the host
//! only reduces the 31-bit value it returns to a fixed number of digits.

use std::fmt;

use crate::domain::constants::oath;
use crate::infra::error::{ConsoleError, ConsoleResult};

/// A six-digit one-time password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpCode(String);

impl OtpCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OtpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Time-step counter: Unix time divided by the period, floored.
pub fn time_step(unix_secs: u64, period_secs: u64) -> u64 {
    unix_secs / period_secs.max(1)
}

/// 8-byte big-endian challenge for a time step.
pub fn time_challenge(step: u64) -> [u8; 8] {
    step.to_be_bytes()
}

/// Extract the code from a calculate response body.
///
/// The body is `[tag, len, digits, b0, b1, b2, b3]`; the last four bytes are
/// read as a big-endian `u32` and reduced modulo 10^6.
///
/// # Errors
///
/// Returns `MalformedResponse` if fewer than four bytes are present.
pub fn truncate_code(body: &[u8]) -> ConsoleResult<OtpCode> {
    if body.len() < 4 {
        return Err(ConsoleError::MalformedResponse(format!(
            "calculate response has {} bytes, need at least 4",
            body.len()
        )));
    }
    let tail = &body[body.len() - 4..];
    let value = u32::from_be_bytes([tail[0], tail[1], tail[2], tail[3]]);
    Ok(OtpCode(format!("{:06}", value % oath::CODE_MODULUS)))
}
