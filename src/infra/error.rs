//! Error types for CanoKey console operations.
//! Transport, protocol, codec and input failures share one enum so every
//! layer can propagate with `?`.

use crate::domain::apdu::StatusWord;
use thiserror::Error;

/// Result type for console operations
pub type ConsoleResult<T> = Result<T, ConsoleError>;

/// Comprehensive error types for console operations
#[derive(Error, Debug, miette::Diagnostic)]
pub enum ConsoleError {
    #[error("USB transport failure: {0}")]
    #[diagnostic(code(canokey::transport))]
    TransportFailure(String),

    #[error("No CanoKey available: {0}")]
    #[diagnostic(
        code(canokey::unavailable),
        help("plug in the token and check that no other program has claimed it")
    )]
    DeviceUnavailable(String),

    #[error("Device still busy after {attempts} status polls")]
    #[diagnostic(code(canokey::timeout))]
    DeviceTimeout { attempts: u32 },

    #[error("Selecting the {applet} applet failed (SW={status})")]
    #[diagnostic(code(canokey::select))]
    AppletSelectFailed {
        applet: &'static str,
        status: StatusWord,
    },

    #[error("PIN verification failed (SW={0})")]
    #[diagnostic(code(canokey::pin))]
    PinVerifyFailed(StatusWord),

    #[error("PIN verification failed, {0} retries left")]
    #[diagnostic(code(canokey::pin_retries))]
    PinRetriesRemaining(u8),

    #[error("Invalid OATH passphrase (SW={0})")]
    #[diagnostic(code(canokey::passphrase))]
    InvalidPassphrase(StatusWord),

    #[error("The OATH applet is protected by a passphrase; authenticate first")]
    #[diagnostic(code(canokey::passphrase_required))]
    PassphraseRequired,

    #[error("Not authenticated: {0}")]
    #[diagnostic(code(canokey::not_authenticated))]
    NotAuthenticated(String),

    #[error("{operation} failed (SW={status})")]
    #[diagnostic(code(canokey::command))]
    CommandFailed {
        operation: &'static str,
        status: StatusWord,
    },

    #[error("Malformed hex string: {0}")]
    #[diagnostic(code(canokey::hex))]
    MalformedHex(String),

    #[error("Malformed Base32 key: {0}")]
    #[diagnostic(code(canokey::base32))]
    MalformedBase32(String),

    #[error("Truncated TLV at offset {offset}: {reason}")]
    #[diagnostic(code(canokey::tlv_truncated))]
    TruncatedTlv { offset: usize, reason: String },

    #[error("Malformed TLV: {0}")]
    #[diagnostic(code(canokey::tlv))]
    MalformedTlv(String),

    #[error("Malformed OATH listing: {0}")]
    #[diagnostic(code(canokey::listing))]
    MalformedListing(String),

    #[error("Malformed response: {0}")]
    #[diagnostic(code(canokey::response))]
    MalformedResponse(String),

    #[error("Unsupported key encoding: {0}")]
    #[diagnostic(code(canokey::key_encoding), help("use UTF-8, HEX or Base32"))]
    UnsupportedKeyEncoding(String),

    #[error("Invalid OATH entry type: {0}")]
    #[diagnostic(code(canokey::entry_type), help("use HOTP or TOTP"))]
    InvalidEntryType(String),

    #[error("Invalid OATH algorithm: {0}")]
    #[diagnostic(code(canokey::algorithm), help("use HMAC-SHA1 or HMAC-SHA256"))]
    InvalidAlgorithm(String),

    #[error("Cannot import otpauth URI: {0}")]
    #[diagnostic(code(canokey::import))]
    ImportParseFailure(String),

    #[error("Invalid input: {0}")]
    #[diagnostic(code(canokey::input))]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(canokey::config))]
    ConfigurationError(String),

    #[error("IO error: {0}")]
    #[diagnostic(code(canokey::io))]
    IoError(String),
}

impl ConsoleError {
    /// Whether the failure happened below the applet layer (USB, polling).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ConsoleError::TransportFailure(_)
                | ConsoleError::DeviceTimeout { .. }
                | ConsoleError::DeviceUnavailable(_)
        )
    }
}

#[cfg(feature = "direct-usb")]
impl From<rusb::Error> for ConsoleError {
    fn from(error: rusb::Error) -> Self {
        match error {
            rusb::Error::NoDevice | rusb::Error::NotFound => {
                ConsoleError::DeviceUnavailable(error.to_string())
            }
            _ => ConsoleError::TransportFailure(error.to_string()),
        }
    }
}

impl From<hex::FromHexError> for ConsoleError {
    fn from(error: hex::FromHexError) -> Self {
        ConsoleError::MalformedHex(error.to_string())
    }
}

impl From<std::io::Error> for ConsoleError {
    fn from(error: std::io::Error) -> Self {
        ConsoleError::IoError(error.to_string())
    }
}
