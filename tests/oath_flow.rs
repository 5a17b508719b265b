//! OATH applet flows against a scripted device.

mod common;

use canokey_console::domain::codec::bytes_to_hex;
use canokey_console::domain::handshake::{challenge_response, derive_key};
use canokey_console::adapters::scripted::ScriptedChannel;
use canokey_console::{
    ConsoleError, KeyEncoding, KeyMaterial, NewOathEntry, OathAlgorithm, OathEntry,
    OathPassphrase, OathProperties, OathType, ProtocolVersion, SelectOutcome,
};

use common::{scripted_manager, version_response, READ_VERSION, SELECT_ADMIN, SELECT_OATH};

const SALT: &str = "0102030405060708";
const CHALLENGE: &str = "A1A2A3A4A5A6A7A8";

/// Select answer of a passphrase-protected applet: version, salt, challenge, algorithm.
fn protected_select() -> String {
    format!("79030102037108{SALT}7408{CHALLENGE}7B01019000")
}

fn expected_validate(passphrase: &str) -> String {
    let passphrase = OathPassphrase::new(passphrase).unwrap();
    let key = derive_key(&passphrase, &hex::decode(SALT).unwrap());
    let mac = challenge_response(&key[..], &hex::decode(CHALLENGE).unwrap()).unwrap();
    format!("00A30000207514{}7408{CHALLENGE}", bytes_to_hex(&mac))
}

fn current_preamble(channel: &ScriptedChannel) {
    channel
        .expect(SELECT_ADMIN, "9000")
        .expect(READ_VERSION, &version_response("2.0.0"));
}

#[tokio::test]
async fn test_passphrase_handshake_then_list() {
    let channel = ScriptedChannel::new();
    current_preamble(&channel);
    channel
        .expect(SELECT_OATH, &protected_select())
        .expect(&expected_validate("hunter22"), "9000")
        .expect("00A1000000", "7204216162637204116A6B6C9000");
    let (mut manager, _) = scripted_manager(&channel, 0);
    let session = manager.session().unwrap();

    assert_eq!(
        session.oath().select().await.unwrap(),
        SelectOutcome::PassphraseRequired
    );
    assert!(!session.oath_unlocked());

    session
        .oath()
        .authenticate(OathPassphrase::new("hunter22").unwrap())
        .await
        .unwrap();
    assert!(session.oath_unlocked());
    assert_eq!(session.protocol(), Some(ProtocolVersion::Current));

    let entries = session.oath().list().await.unwrap();
    assert_eq!(
        entries,
        vec![
            OathEntry::new("abc", OathType::Totp, OathAlgorithm::HmacSha1),
            OathEntry::new("jkl", OathType::Hotp, OathAlgorithm::HmacSha1),
        ]
    );
    assert_eq!(channel.remaining(), 0);
}

#[tokio::test]
async fn test_list_without_passphrase_is_refused() {
    let channel = ScriptedChannel::new();
    current_preamble(&channel);
    channel.expect(SELECT_OATH, &protected_select());
    let (mut manager, _) = scripted_manager(&channel, 0);

    let result = manager.session().unwrap().oath().list().await;
    assert!(matches!(result, Err(ConsoleError::PassphraseRequired)));
    assert_eq!(channel.remaining(), 0);
}

#[tokio::test]
async fn test_wrong_passphrase_spends_the_challenge() {
    let channel = ScriptedChannel::new();
    current_preamble(&channel);
    channel
        .expect(SELECT_OATH, &protected_select())
        .expect(&expected_validate("wrong"), "6982")
        .expect(SELECT_OATH, &protected_select());
    let (mut manager, _) = scripted_manager(&channel, 0);
    let session = manager.session().unwrap();

    let result = session
        .oath()
        .authenticate(OathPassphrase::new("wrong").unwrap())
        .await;
    assert!(matches!(result, Err(ConsoleError::InvalidPassphrase(_))));
    assert!(!session.oath_unlocked());

    // Next command re-selects and finds a fresh challenge waiting.
    assert!(matches!(
        session.oath().list().await,
        Err(ConsoleError::PassphraseRequired)
    ));
    assert_eq!(channel.remaining(), 0);
}

#[tokio::test]
async fn test_unprotected_applet_skips_validate() {
    let channel = ScriptedChannel::new();
    current_preamble(&channel);
    channel
        .expect(SELECT_OATH, "79030102039000")
        .expect("00A1000000", "9000");
    let (mut manager, _) = scripted_manager(&channel, 0);
    let session = manager.session().unwrap();

    session
        .oath()
        .authenticate(OathPassphrase::new("unused").unwrap())
        .await
        .unwrap();
    assert!(session.oath().list().await.unwrap().is_empty());
    assert!(channel.sent().iter().all(|cmd| !cmd.starts_with("00A3")));
}

#[tokio::test]
async fn test_current_calculate() {
    let channel = ScriptedChannel::new();
    current_preamble(&channel);
    channel
        .expect(SELECT_OATH, "9000")
        // 1_000_000_000 / 30 = 33_333_333 = 0x01FCA055
        .expect(
            "00A200000F710361626374080000000001FCA055",
            "7605063ADE68B19000",
        );
    let (mut manager, _) = scripted_manager(&channel, 1_000_000_000);

    let code = manager.session().unwrap().oath().calculate("abc").await.unwrap();
    // 0x3ADE68B1 = 987654321
    assert_eq!(code.as_str(), "654321");
}

#[tokio::test]
async fn test_add_then_set_default() {
    let channel = ScriptedChannel::new();
    current_preamble(&channel);
    channel
        .expect(SELECT_OATH, "9000")
        .expect("0001000010710161730811066B65792D3031780100", "9000")
        .expect("00A1000000", "720211619000")
        .expect("0055000003710161", "9000");
    let (mut manager, _) = scripted_manager(&channel, 0);
    let session = manager.session().unwrap();

    let entries = session
        .oath()
        .add(NewOathEntry {
            name: "a".to_string(),
            oath_type: OathType::Hotp,
            algorithm: OathAlgorithm::HmacSha1,
            key: KeyMaterial::new(KeyEncoding::Hex, "6B65792D3031"),
            properties: OathProperties::default(),
        })
        .await
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(entries.len(), 1);

    session.oath().set_default(&entries[0]).await.unwrap();
    assert_eq!(channel.remaining(), 0);
}

#[tokio::test]
async fn test_failed_add_still_lists() {
    let channel = ScriptedChannel::new();
    current_preamble(&channel);
    channel
        .expect(SELECT_OATH, "9000")
        .expect("0001000010710161730821066B65792D3031780100", "6A84")
        .expect("00A1000000", "9000");
    let (mut manager, _) = scripted_manager(&channel, 0);

    let report = manager
        .session()
        .unwrap()
        .oath()
        .add(NewOathEntry {
            name: "a".to_string(),
            oath_type: OathType::Totp,
            algorithm: OathAlgorithm::HmacSha1,
            key: KeyMaterial::new(KeyEncoding::Hex, "6B65792D3031"),
            properties: OathProperties::default(),
        })
        .await
        .unwrap();

    assert!(report.entries.as_ref().unwrap().is_empty());
    let err = report.into_result().unwrap_err();
    assert_eq!(err.to_string(), "add credential failed (SW=6A84)");
}

#[tokio::test]
async fn test_delete_then_relist() {
    let channel = ScriptedChannel::new();
    current_preamble(&channel);
    channel
        .expect(SELECT_OATH, "9000")
        .expect("00A1000000", "7204216162637204116A6B6C9000")
        .expect("00020000057103616263", "9000")
        .expect("00A1000000", "7204116A6B6C9000");
    let (mut manager, _) = scripted_manager(&channel, 0);
    let session = manager.session().unwrap();

    assert_eq!(session.oath().list().await.unwrap().len(), 2);
    let remaining = session
        .oath()
        .delete("abc")
        .await
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(
        remaining,
        vec![OathEntry::new("jkl", OathType::Hotp, OathAlgorithm::HmacSha1)]
    );
    assert_eq!(channel.remaining(), 0);
}

#[tokio::test]
async fn test_transport_failure_during_delete_still_relists() {
    let channel = ScriptedChannel::new();
    current_preamble(&channel);
    channel
        .expect(SELECT_OATH, "9000")
        .expect("00A1000000", "7204216162639000")
        .expect("00A1000000", "7204216162639000");
    let (mut manager, _) = scripted_manager(&channel, 0);
    let session = manager.session().unwrap();

    session.oath().list().await.unwrap();
    channel.fail_next_write("device busy");

    let report = session.oath().delete("abc").await.unwrap();
    assert!(matches!(
        report.outcome,
        Err(ConsoleError::TransportFailure(ref m)) if m == "device busy"
    ));
    assert_eq!(
        report.entries.unwrap(),
        vec![OathEntry::new("abc", OathType::Totp, OathAlgorithm::HmacSha1)]
    );
    assert_eq!(channel.remaining(), 0);
}

#[tokio::test]
async fn test_select_with_empty_challenge_is_malformed() {
    let channel = ScriptedChannel::new();
    current_preamble(&channel);
    channel.expect(SELECT_OATH, &format!("79030102037108{SALT}74007B01019000"));
    let (mut manager, _) = scripted_manager(&channel, 0);

    let result = manager.session().unwrap().oath().select().await;
    assert!(matches!(result, Err(ConsoleError::MalformedTlv(_))));
}
