//! `otpauth://` URI import.
//!
//! ```text
//! otpauth://totp/Example:alice?secret=JBSWY3DPEHPK3PXP&algorithm=SHA1
//!           ^^^^ ^^^^^^^^^^^^^        ^^^^^^^^^^^^^^^^           ^^^^
//!           type label (name)         Base32 key                 optional, SHA1 default
//! ```
//!
//! Other query parameters (issuer, digits, period, counter) are ignored: the
//! device stores six-digit codes with a fixed period.

use percent_encoding::percent_decode_str;
use url::Url;

use crate::domain::oath::{
    KeyEncoding, KeyMaterial, NewOathEntry, OathAlgorithm, OathProperties, OathType,
};
use crate::infra::error::{ConsoleError, ConsoleResult};

const SCHEME: &str = "otpauth";

/// Credential parameters carried by an otpauth URI.
#[derive(Debug)]
pub struct OtpauthImport {
    pub oath_type: OathType,
    pub name: String,
    pub key: KeyMaterial,
    pub algorithm: OathAlgorithm,
}

impl OtpauthImport {
    /// Creation parameters for `add`, with the properties the URI cannot carry.
    pub fn into_new_entry(self, properties: OathProperties) -> NewOathEntry {
        NewOathEntry {
            name: self.name,
            oath_type: self.oath_type,
            algorithm: self.algorithm,
            key: self.key,
            properties,
        }
    }
}

/// Parse an otpauth URI.
///
/// # Errors
///
/// `ImportParseFailure` for other schemes, unknown types or algorithms, a
/// missing label, or a missing or undecodable secret.
pub fn parse_otpauth(uri: &str) -> ConsoleResult<OtpauthImport> {
    let url = Url::parse(uri.trim())
        .map_err(|e| ConsoleError::ImportParseFailure(format!("not a URI: {e}")))?;

    if url.scheme() != SCHEME {
        return Err(ConsoleError::ImportParseFailure(format!(
            "expected an otpauth link, got scheme '{}'",
            url.scheme()
        )));
    }

    let oath_type = match url.host_str().map(str::to_ascii_lowercase).as_deref() {
        Some("totp") => OathType::Totp,
        Some("hotp") => OathType::Hotp,
        Some(other) => {
            return Err(ConsoleError::ImportParseFailure(format!(
                "unsupported type '{other}'"
            )))
        }
        None => {
            return Err(ConsoleError::ImportParseFailure(
                "missing credential type".to_string(),
            ))
        }
    };

    let label = url.path().trim_start_matches('/');
    let name = percent_decode_str(label)
        .decode_utf8()
        .map_err(|e| ConsoleError::ImportParseFailure(format!("label is not UTF-8: {e}")))?
        .into_owned();
    if name.is_empty() {
        return Err(ConsoleError::ImportParseFailure(
            "missing credential label".to_string(),
        ));
    }

    let mut secret = None;
    let mut algorithm = OathAlgorithm::HmacSha1;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "secret" => secret = Some(value.into_owned()),
            "algorithm" => {
                algorithm = match value.to_ascii_uppercase().as_str() {
                    "SHA1" => OathAlgorithm::HmacSha1,
                    "SHA256" => OathAlgorithm::HmacSha256,
                    _ => {
                        return Err(ConsoleError::ImportParseFailure(format!(
                            "unsupported algorithm '{value}'"
                        )))
                    }
                };
            }
            _ => {}
        }
    }

    let secret = secret
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConsoleError::ImportParseFailure("missing secret".to_string()))?;
    let key = KeyMaterial::new(KeyEncoding::Base32, secret);
    key.decode()
        .map_err(|e| ConsoleError::ImportParseFailure(format!("bad secret: {e}")))?;

    log::debug!("Parsed otpauth {oath_type} credential '{name}' ({algorithm})");
    Ok(OtpauthImport {
        oath_type,
        name,
        key,
        algorithm,
    })
}
