//! Pure protocol logic: no USB, no clocks, no global state.
//!
//! - Byte/hex/text codec and the flat TLV codec
//! - Command and response APDUs with status-word classification
//! - Admin and OATH value types, listing layouts per protocol version
//! - Passphrase handshake crypto and OTP truncation

pub mod admin;
pub mod apdu;
pub mod codec;
pub mod constants;
pub mod handshake;
pub mod oath;
pub mod otp;
pub mod tlv;
pub mod types;
