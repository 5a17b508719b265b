//! OATH credential model and wire layouts.
//!
//! Firmware before 1.5 ("legacy") and later firmware ("current") use
//! different instruction bytes and listing layouts. [`ProtocolVersion`] is
//! chosen once per session and every builder/parser matches on it.

use std::fmt;
use std::str::FromStr;

use zeroize::Zeroizing;

use crate::domain::codec::{decode_text, hex_to_bytes};
use crate::domain::constants::{oath, CURRENT_PROTOCOL_MIN_VERSION};
use crate::domain::tlv::{self, TlvRecord};
use crate::infra::error::{ConsoleError, ConsoleResult};

/// OATH command/listing dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    Legacy,
    Current,
}

impl ProtocolVersion {
    /// Classify a firmware version string.
    ///
    /// Plain string comparison against `"1.5"`, as the firmware reports
    /// versions like `1.4.2` or `2.0.0`.
    pub fn from_firmware(version: &str) -> Self {
        if version < CURRENT_PROTOCOL_MIN_VERSION {
            ProtocolVersion::Legacy
        } else {
            ProtocolVersion::Current
        }
    }

    pub fn list_instruction(self) -> u8 {
        match self {
            ProtocolVersion::Legacy => oath::INS_LIST_LEGACY,
            ProtocolVersion::Current => oath::INS_LIST,
        }
    }

    pub fn calculate_instruction(self) -> u8 {
        match self {
            ProtocolVersion::Legacy => oath::INS_CALCULATE_LEGACY,
            ProtocolVersion::Current => oath::INS_CALCULATE,
        }
    }

    /// Whether the select response can carry a passphrase challenge.
    pub fn supports_passphrase(self) -> bool {
        matches!(self, ProtocolVersion::Current)
    }

    /// Decode a list response body.
    ///
    /// # Errors
    ///
    /// Returns TLV framing errors, or `MalformedListing` for unexpected tags,
    /// an odd record count (legacy) or empty flag values.
    pub fn parse_list(self, body: &[u8]) -> ConsoleResult<Vec<OathEntry>> {
        let records = tlv::parse_tlv(body)?;
        match self {
            ProtocolVersion::Legacy => parse_legacy_list(&records),
            ProtocolVersion::Current => parse_current_list(&records),
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::Legacy => f.write_str("legacy"),
            ProtocolVersion::Current => f.write_str("current"),
        }
    }
}

fn parse_legacy_list(records: &[TlvRecord]) -> ConsoleResult<Vec<OathEntry>> {
    if records.len() % 2 == 1 {
        return Err(ConsoleError::MalformedListing(format!(
            "odd number of records ({})",
            records.len()
        )));
    }

    records
        .chunks_exact(2)
        .map(|pair| {
            let (name, flags) = (&pair[0], &pair[1]);
            if name.tag != oath::TAG_NAME || flags.tag != oath::TAG_RESPONSE {
                return Err(ConsoleError::MalformedListing(format!(
                    "expected tags 71/75, got {:02X}/{:02X}",
                    name.tag, flags.tag
                )));
            }
            let flag = *flags.value.first().ok_or_else(|| {
                ConsoleError::MalformedListing("empty type/algorithm flag".to_string())
            })?;
            Ok(OathEntry::from_flag(decode_text(&name.value), flag))
        })
        .collect()
}

fn parse_current_list(records: &[TlvRecord]) -> ConsoleResult<Vec<OathEntry>> {
    records
        .iter()
        .map(|record| {
            if record.tag != oath::TAG_NAME_LIST {
                return Err(ConsoleError::MalformedListing(format!(
                    "expected tag 72, got {:02X}",
                    record.tag
                )));
            }
            let (flag, name) = record.value.split_first().ok_or_else(|| {
                ConsoleError::MalformedListing("empty credential record".to_string())
            })?;
            Ok(OathEntry::from_flag(decode_text(name), *flag))
        })
        .collect()
}

/// Credential kind (high nibble of the flag byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OathType {
    Hotp,
    Totp,
    Unknown,
}

impl OathType {
    pub fn from_nibble(nibble: u8) -> Self {
        match nibble {
            0x1 => OathType::Hotp,
            0x2 => OathType::Totp,
            _ => OathType::Unknown,
        }
    }

    /// High-nibble flag for the PUT command.
    pub fn flag(self) -> ConsoleResult<u8> {
        match self {
            OathType::Hotp => Ok(0x10),
            OathType::Totp => Ok(0x20),
            OathType::Unknown => Err(ConsoleError::InvalidEntryType("unknown".to_string())),
        }
    }
}

impl FromStr for OathType {
    type Err = ConsoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HOTP" => Ok(OathType::Hotp),
            "TOTP" => Ok(OathType::Totp),
            _ => Err(ConsoleError::InvalidEntryType(s.to_string())),
        }
    }
}

impl fmt::Display for OathType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OathType::Hotp => f.write_str("HOTP"),
            OathType::Totp => f.write_str("TOTP"),
            OathType::Unknown => f.write_str("unknown"),
        }
    }
}

/// HMAC algorithm (low nibble of the flag byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OathAlgorithm {
    HmacSha1,
    HmacSha256,
    Unknown,
}

impl OathAlgorithm {
    pub fn from_nibble(nibble: u8) -> Self {
        match nibble {
            0x1 => OathAlgorithm::HmacSha1,
            0x2 => OathAlgorithm::HmacSha256,
            _ => OathAlgorithm::Unknown,
        }
    }

    /// Low-nibble flag for the PUT command.
    pub fn flag(self) -> ConsoleResult<u8> {
        match self {
            OathAlgorithm::HmacSha1 => Ok(0x01),
            OathAlgorithm::HmacSha256 => Ok(0x02),
            OathAlgorithm::Unknown => Err(ConsoleError::InvalidAlgorithm("unknown".to_string())),
        }
    }
}

impl FromStr for OathAlgorithm {
    type Err = ConsoleError;

    /// Accepts both the console spelling (`HMAC-SHA1`) and the otpauth one (`SHA1`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        match upper.strip_prefix("HMAC-").unwrap_or(&upper) {
            "SHA1" => Ok(OathAlgorithm::HmacSha1),
            "SHA256" => Ok(OathAlgorithm::HmacSha256),
            _ => Err(ConsoleError::InvalidAlgorithm(s.to_string())),
        }
    }
}

impl fmt::Display for OathAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OathAlgorithm::HmacSha1 => f.write_str("HMAC-SHA1"),
            OathAlgorithm::HmacSha256 => f.write_str("HMAC-SHA256"),
            OathAlgorithm::Unknown => f.write_str("unknown"),
        }
    }
}

/// A credential as listed by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OathEntry {
    pub name: String,
    pub oath_type: OathType,
    pub algorithm: OathAlgorithm,
}

impl OathEntry {
    pub fn new(name: impl Into<String>, oath_type: OathType, algorithm: OathAlgorithm) -> Self {
        Self {
            name: name.into(),
            oath_type,
            algorithm,
        }
    }

    /// Build from a name and a combined type/algorithm flag byte.
    pub fn from_flag(name: String, flag: u8) -> Self {
        Self {
            name,
            oath_type: OathType::from_nibble(flag >> 4),
            algorithm: OathAlgorithm::from_nibble(flag & 0x0F),
        }
    }
}

/// How key material is written by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEncoding {
    Utf8,
    Hex,
    Base32,
}

impl FromStr for KeyEncoding {
    type Err = ConsoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "UTF-8" | "UTF8" => Ok(KeyEncoding::Utf8),
            "HEX" => Ok(KeyEncoding::Hex),
            "BASE32" => Ok(KeyEncoding::Base32),
            _ => Err(ConsoleError::UnsupportedKeyEncoding(s.to_string())),
        }
    }
}

impl fmt::Display for KeyEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyEncoding::Utf8 => f.write_str("UTF-8"),
            KeyEncoding::Hex => f.write_str("HEX"),
            KeyEncoding::Base32 => f.write_str("Base32"),
        }
    }
}

/// Encoded key text plus its encoding. The text is wiped on drop.
pub struct KeyMaterial {
    encoding: KeyEncoding,
    text: Zeroizing<String>,
}

impl KeyMaterial {
    pub fn new(encoding: KeyEncoding, text: impl Into<String>) -> Self {
        Self {
            encoding,
            text: Zeroizing::new(text.into()),
        }
    }

    pub fn encoding(&self) -> KeyEncoding {
        self.encoding
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Decode to raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns `MalformedHex` or `MalformedBase32` for undecodable text.
    pub fn decode(&self) -> ConsoleResult<Zeroizing<Vec<u8>>> {
        let bytes = match self.encoding {
            KeyEncoding::Utf8 => self.text.as_bytes().to_vec(),
            KeyEncoding::Hex => hex_to_bytes(self.text.trim())?,
            KeyEncoding::Base32 => decode_base32(&self.text)?,
        };
        Ok(Zeroizing::new(bytes))
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("encoding", &self.encoding)
            .field("text", &"[REDACTED]")
            .finish()
    }
}

/// Base32 as written by authenticator apps: any case, optional padding,
/// spaces allowed, trailing bits ignored.
fn decode_base32(text: &str) -> ConsoleResult<Vec<u8>> {
    let mut spec = data_encoding::Specification::new();
    spec.symbols.push_str("ABCDEFGHIJKLMNOPQRSTUVWXYZ234567");
    spec.check_trailing_bits = false;
    let encoding = spec
        .encoding()
        .map_err(|e| ConsoleError::MalformedBase32(e.to_string()))?;

    let cleaned: Zeroizing<String> = Zeroizing::new(
        text.chars()
            .filter(|c| !c.is_whitespace() && *c != '=')
            .map(|c| c.to_ascii_uppercase())
            .collect(),
    );
    encoding
        .decode(cleaned.as_bytes())
        .map_err(|e| ConsoleError::MalformedBase32(e.to_string()))
}

/// Property flags stored with a credential.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OathProperties {
    /// HOTP counter may only move forward
    pub increasing_only: bool,
    pub require_touch: bool,
}

impl OathProperties {
    pub fn to_byte(self) -> u8 {
        let mut byte = 0;
        if self.increasing_only {
            byte |= oath::PROPERTY_INCREASING_ONLY;
        }
        if self.require_touch {
            byte |= oath::PROPERTY_REQUIRE_TOUCH;
        }
        byte
    }
}

/// Parameters for creating a credential.
#[derive(Debug)]
pub struct NewOathEntry {
    pub name: String,
    pub oath_type: OathType,
    pub algorithm: OathAlgorithm,
    pub key: KeyMaterial,
    pub properties: OathProperties,
}

impl NewOathEntry {
    /// Encode the PUT command body: name, key with flags, properties.
    ///
    /// # Errors
    ///
    /// Fails for unknown type/algorithm, undecodable keys, or names and keys
    /// that overflow a TLV length byte.
    pub fn encode_put_body(&self) -> ConsoleResult<Vec<u8>> {
        if self.name.is_empty() {
            return Err(ConsoleError::InvalidInput(
                "credential name cannot be empty".to_string(),
            ));
        }
        let flag = self.oath_type.flag()? | self.algorithm.flag()?;
        let key = self.key.decode()?;

        tlv::ensure_fits("credential name", self.name.len())?;
        tlv::ensure_fits("key", key.len() + 2)?;

        let mut key_value = Zeroizing::new(Vec::with_capacity(key.len() + 2));
        key_value.push(flag);
        key_value.push(oath::DIGITS);
        key_value.extend_from_slice(&key);

        let mut body = tlv::build_tlv(oath::TAG_NAME, self.name.as_bytes());
        body.extend_from_slice(&Zeroizing::new(tlv::build_tlv(oath::TAG_KEY, &key_value)));
        body.extend(tlv::build_tlv(
            oath::TAG_PROPERTY,
            &[self.properties.to_byte()],
        ));
        tlv::ensure_fits("command body", body.len())?;
        Ok(body)
    }
}

/// Body addressing a credential by name (delete, set-default).
pub fn name_body(name: &str) -> ConsoleResult<Vec<u8>> {
    tlv::ensure_fits("credential name", name.len())?;
    Ok(tlv::build_tlv(oath::TAG_NAME, name.as_bytes()))
}

/// CALCULATE body: name record followed by the 8-byte time-step challenge.
pub fn calculate_body(name: &str, challenge: &[u8; 8]) -> ConsoleResult<Vec<u8>> {
    let mut body = name_body(name)?;
    body.extend(tlv::build_tlv(oath::TAG_CHALLENGE, challenge));
    tlv::ensure_fits("command body", body.len())?;
    Ok(body)
}

/// Salt and challenge issued by a passphrase-protected OATH applet.
/// Consumed by exactly one authenticate attempt.
pub struct AuthChallenge {
    pub salt: Vec<u8>,
    pub challenge: Vec<u8>,
}

impl AuthChallenge {
    /// Extract the challenge from a select response body.
    ///
    /// A protected applet answers with exactly four records, salt second and
    /// challenge third; anything else means no passphrase is set.
    ///
    /// # Errors
    ///
    /// `MalformedTlv` when a four-record answer has an empty salt or
    /// challenge.
    pub fn from_select_response(body: &[u8]) -> ConsoleResult<Option<Self>> {
        let records = tlv::parse_tlv(body)?;
        if records.len() != 4 {
            return Ok(None);
        }
        let mut records = records.into_iter().skip(1);
        match (records.next(), records.next()) {
            (Some(salt), Some(challenge)) => {
                if salt.value.is_empty() || challenge.value.is_empty() {
                    return Err(ConsoleError::MalformedTlv(format!(
                        "select answer carries a {}-byte salt and a {}-byte challenge",
                        salt.value.len(),
                        challenge.value.len()
                    )));
                }
                Ok(Some(Self {
                    salt: salt.value,
                    challenge: challenge.value,
                }))
            }
            _ => Ok(None),
        }
    }
}

impl fmt::Debug for AuthChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthChallenge")
            .field("salt_len", &self.salt.len())
            .field("challenge_len", &self.challenge.len())
            .finish()
    }
}
