//! Byte, hex and text conversions used on the APDU wire.
//!
//! The console speaks uppercase hex without separators whenever bytes are
//! shown to a user or written to the APDU history.

use crate::infra::error::{ConsoleError, ConsoleResult};

/// Encode bytes as two uppercase hex digits per byte.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

/// Decode a hex string into bytes.
///
/// # Errors
///
/// Returns `MalformedHex` for odd-length input or any non-hex character.
pub fn hex_to_bytes(text: &str) -> ConsoleResult<Vec<u8>> {
    if text.len() % 2 != 0 {
        return Err(ConsoleError::MalformedHex(format!(
            "odd number of digits ({})",
            text.len()
        )));
    }
    Ok(hex::decode(text)?)
}

/// Decode device-supplied UTF-8 text (names, version strings).
///
/// Invalid sequences are replaced rather than rejected; the device is the
/// source of truth and a garbled name is still worth showing.
pub fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
