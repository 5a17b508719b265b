//! OATH passphrase challenge-response.
//!
//! key      = PBKDF2-HMAC-SHA1(passphrase, salt, 1000 iterations, 16 bytes)
//! response = HMAC-SHA1(key, challenge)
//!
//! Both the derived key and the response live in `Zeroizing` buffers so they
//! are wiped as soon as the caller drops them.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use zeroize::Zeroizing;

use crate::domain::constants::oath;
use crate::domain::oath::AuthChallenge;
use crate::domain::tlv;
use crate::domain::types::OathPassphrase;
use crate::infra::error::{ConsoleError, ConsoleResult};

type HmacSha1 = Hmac<Sha1>;

/// Derive the 16-byte OATH access key.
pub fn derive_key(
    passphrase: &OathPassphrase,
    salt: &[u8],
) -> Zeroizing<[u8; oath::DERIVED_KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; oath::DERIVED_KEY_LEN]);
    pbkdf2::pbkdf2_hmac::<Sha1>(
        passphrase.as_bytes(),
        salt,
        oath::PBKDF2_ITERATIONS,
        &mut *key,
    );
    key
}

/// HMAC-SHA1 of `challenge` under `key`.
pub fn challenge_response(key: &[u8], challenge: &[u8]) -> ConsoleResult<Zeroizing<Vec<u8>>> {
    let mut mac = HmacSha1::new_from_slice(key)
        .map_err(|e| ConsoleError::InvalidInput(format!("HMAC key rejected: {e}")))?;
    mac.update(challenge);
    Ok(Zeroizing::new(mac.finalize().into_bytes().to_vec()))
}

/// Build the VALIDATE body for a challenge, consuming the passphrase.
///
/// Layout: `75 14 <hmac>` followed by `74 <len> <challenge>`.
pub fn validate_body(
    passphrase: OathPassphrase,
    challenge: &AuthChallenge,
) -> ConsoleResult<Zeroizing<Vec<u8>>> {
    tlv::ensure_fits("challenge", challenge.challenge.len())?;

    let key = derive_key(&passphrase, &challenge.salt);
    drop(passphrase);
    let response = challenge_response(&key[..], &challenge.challenge)?;

    let mut body = Zeroizing::new(tlv::build_tlv(oath::TAG_RESPONSE, &response));
    body.extend_from_slice(&tlv::build_tlv(oath::TAG_CHALLENGE, &challenge.challenge));
    Ok(body)
}
