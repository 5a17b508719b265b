//! Flat tag-length-value records as used by the Admin and OATH applets.
//!
//! Records are `[tag, len, value...]` with single-byte tag and length. The
//! sequence is kept in encounter order because it mirrors the order in which
//! the device iterates its credentials.

use crate::infra::error::{ConsoleError, ConsoleResult};

/// Largest value that fits the single-byte length field.
pub const MAX_VALUE_LEN: usize = 0xFF;

/// One `{tag, length, value}` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlvRecord {
    pub tag: u8,
    pub value: Vec<u8>,
}

impl TlvRecord {
    pub fn new(tag: u8, value: impl Into<Vec<u8>>) -> Self {
        Self {
            tag,
            value: value.into(),
        }
    }

    /// Declared length of the value.
    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// Parse a buffer into its records.
///
/// # Errors
///
/// Returns `TruncatedTlv` when fewer than two bytes remain for a header or a
/// declared length runs past the end of the buffer.
pub fn parse_tlv(buffer: &[u8]) -> ConsoleResult<Vec<TlvRecord>> {
    let mut records = Vec::new();
    let mut offset = 0;

    while offset < buffer.len() {
        if offset + 2 > buffer.len() {
            return Err(ConsoleError::TruncatedTlv {
                offset,
                reason: "missing length byte".to_string(),
            });
        }

        let tag = buffer[offset];
        let len = buffer[offset + 1] as usize;
        let start = offset + 2;
        let end = start + len;

        if end > buffer.len() {
            return Err(ConsoleError::TruncatedTlv {
                offset,
                reason: format!(
                    "tag 0x{tag:02X} declares {len} bytes, {} available",
                    buffer.len() - start
                ),
            });
        }

        records.push(TlvRecord::new(tag, &buffer[start..end]));
        offset = end;
    }

    log::trace!("Parsed {} TLV records", records.len());
    Ok(records)
}

/// Serialize a single record as `[tag, len, value...]`.
///
/// # Panics
///
/// Panics if `value` is longer than [`MAX_VALUE_LEN`]; callers validate sizes
/// before building records.
pub fn build_tlv(tag: u8, value: &[u8]) -> Vec<u8> {
    assert!(
        value.len() <= MAX_VALUE_LEN,
        "TLV value for tag 0x{tag:02X} is {} bytes, limit is {MAX_VALUE_LEN}",
        value.len()
    );
    let mut out = Vec::with_capacity(value.len() + 2);
    out.push(tag);
    out.push(value.len() as u8);
    out.extend_from_slice(value);
    out
}

/// Serialize records back to back.
pub fn encode_records(records: &[TlvRecord]) -> Vec<u8> {
    records
        .iter()
        .flat_map(|record| build_tlv(record.tag, &record.value))
        .collect()
}

/// Prefix an encoded body with its own total length (the APDU `Lc` byte).
///
/// # Errors
///
/// Returns `InvalidInput` if the body does not fit a single length byte.
pub fn length_prefixed(body: &[u8]) -> ConsoleResult<Vec<u8>> {
    if body.len() > MAX_VALUE_LEN {
        return Err(ConsoleError::InvalidInput(format!(
            "command body is {} bytes, limit is {MAX_VALUE_LEN}",
            body.len()
        )));
    }
    let mut out = Vec::with_capacity(body.len() + 1);
    out.push(body.len() as u8);
    out.extend_from_slice(body);
    Ok(out)
}

/// Reject values that would overflow the single-byte length field.
pub fn ensure_fits(what: &str, len: usize) -> ConsoleResult<()> {
    if len > MAX_VALUE_LEN {
        return Err(ConsoleError::InvalidInput(format!(
            "{what} is {len} bytes, limit is {MAX_VALUE_LEN}"
        )));
    }
    Ok(())
}
