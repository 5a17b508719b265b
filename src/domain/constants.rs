//! Centralized constants for the CanoKey wire protocol: applet identifiers,
//! instruction bytes, TLV tags and USB vendor requests.
//! Keep this intentionally small; only broadly reused literals should live here.

// === Applet Identifiers ===

/// Admin applet AID
pub const ADMIN_AID: &[u8] = &[0xF0, 0x00, 0x00, 0x00, 0x00];

/// OATH applet AID
pub const OATH_AID: &[u8] = &[0xA0, 0x00, 0x00, 0x05, 0x27, 0x21, 0x01];

// === ISO 7816 ===

/// Interindustry class byte used by every command
pub const CLA: u8 = 0x00;

/// SELECT instruction
pub const INS_SELECT: u8 = 0xA4;

/// SELECT by DF name
pub const SELECT_BY_NAME: u8 = 0x04;

/// Status word: success
pub const SW_SUCCESS: u16 = 0x9000;

/// Status word high byte for "verification failed, n retries left" (63Cn)
pub const SW1_VERIFY_FAILED: u8 = 0x63;

// === Admin applet instructions ===

pub mod admin {
    /// VERIFY PIN
    pub const INS_VERIFY: u8 = 0x20;
    /// Reset the OpenPGP applet
    pub const INS_RESET_OPENPGP: u8 = 0x03;
    /// Reset the PIV applet
    pub const INS_RESET_PIV: u8 = 0x04;
    /// Reset the OATH applet
    pub const INS_RESET_OATH: u8 = 0x05;
    /// Read firmware version (P1=0) or model (P1=1)
    pub const INS_READ_VERSION: u8 = 0x31;
    /// Read serial number (P1=0) or chip id (P1=1)
    pub const INS_READ_SN: u8 = 0x32;
    /// Toggle a device feature; P1 selects the feature, P2 the state
    pub const INS_CONFIG: u8 = 0x40;
    /// Query free/total flash space
    pub const INS_FLASH_SPACE: u8 = 0x41;
    /// Reboot into the bootloader
    pub const INS_ENTER_DFU: u8 = 0xFF;
    /// P1/P2 guard bytes for DFU entry
    pub const DFU_GUARD: u8 = 0x22;

    /// Config P1: LED
    pub const CONFIG_LED: u8 = 0x01;
    /// Config P1: HOTP on touch
    pub const CONFIG_HOTP_TOUCH: u8 = 0x03;
}

// === OATH applet ===

pub mod oath {
    /// Add a credential
    pub const INS_PUT: u8 = 0x01;
    /// Delete a credential
    pub const INS_DELETE: u8 = 0x02;
    /// List credentials (firmware < 1.5)
    pub const INS_LIST_LEGACY: u8 = 0x03;
    /// Calculate (firmware < 1.5)
    pub const INS_CALCULATE_LEGACY: u8 = 0x04;
    /// Set the default HOTP credential
    pub const INS_SET_DEFAULT: u8 = 0x55;
    /// List credentials
    pub const INS_LIST: u8 = 0xA1;
    /// Calculate
    pub const INS_CALCULATE: u8 = 0xA2;
    /// Validate (passphrase challenge-response)
    pub const INS_VALIDATE: u8 = 0xA3;

    /// Credential name
    pub const TAG_NAME: u8 = 0x71;
    /// Flag byte followed by the name (list response, firmware >= 1.5)
    pub const TAG_NAME_LIST: u8 = 0x72;
    /// Type/algorithm flag, digit count and key
    pub const TAG_KEY: u8 = 0x73;
    /// Challenge
    pub const TAG_CHALLENGE: u8 = 0x74;
    /// Response; also the type/algorithm flag in legacy listings
    pub const TAG_RESPONSE: u8 = 0x75;
    /// Property flags
    pub const TAG_PROPERTY: u8 = 0x78;

    /// Digits of every credential created by the console
    pub const DIGITS: u8 = 6;
    /// Modulus applied to the truncated HMAC
    pub const CODE_MODULUS: u32 = 1_000_000;
    /// Time step for TOTP challenges, in seconds
    pub const TOTP_PERIOD_SECS: u64 = 30;

    /// PBKDF2 iterations for the passphrase key
    pub const PBKDF2_ITERATIONS: u32 = 1000;
    /// Derived key length in bytes
    pub const DERIVED_KEY_LEN: usize = 16;

    /// Property bit: HOTP counter may only increase
    pub const PROPERTY_INCREASING_ONLY: u8 = 0x01;
    /// Property bit: require touch
    pub const PROPERTY_REQUIRE_TOUCH: u8 = 0x02;
}

// === USB vendor requests ===

pub mod usb {
    /// Vendor-specific interface class used by CanoKey's WebUSB interface
    pub const VENDOR_CLASS: u8 = 0xFF;
    /// OUT: deliver a command APDU
    pub const REQUEST_SEND: u8 = 0x00;
    /// IN: fetch the response APDU
    pub const REQUEST_RECEIVE: u8 = 0x01;
    /// IN: one status byte, zero once the command is complete
    pub const REQUEST_STATUS: u8 = 0x02;
    /// Largest response APDU the device returns
    pub const MAX_RESPONSE_LEN: usize = 1500;
}

/// Firmware versions below this (string comparison) use the legacy OATH layout
pub const CURRENT_PROTOCOL_MIN_VERSION: &str = "1.5";

/// Placeholder recorded in the APDU history for secret commands
pub const REDACTED: &str = "REDACTED";
