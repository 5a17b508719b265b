//! Admin applet flows against a scripted device.

mod common;

use std::sync::Arc;

use canokey_console::adapters::scripted::{InstantPause, ScriptedChannel, ScriptedConnector};
use canokey_console::{
    AdminPin, AdminState, Applet, ConfigFeature, ConsoleConfiguration, ConsoleError,
    DeviceManager, FlashSpace, ResettableApplet,
};

use common::{scripted_manager, version_response, READ_VERSION, SELECT_ADMIN, SELECT_OATH};

const VERIFY_123456: &str = "0020000006313233343536";

#[tokio::test]
async fn test_verify_then_dfu() {
    let channel = ScriptedChannel::new();
    channel
        .expect(SELECT_ADMIN, "9000")
        .expect(VERIFY_123456, "9000")
        .expect("0041000000", "004000809000")
        .expect_disconnect("00FF2222");
    let (mut manager, _) = scripted_manager(&channel, 0);
    let session = manager.session().unwrap();

    let flash = session
        .admin()
        .verify_pin(AdminPin::new("123456").unwrap())
        .await
        .unwrap();
    assert_eq!(
        flash,
        Some(FlashSpace {
            free_kib: 64,
            total_kib: 128
        })
    );
    assert_eq!(session.admin_state(), AdminState::Authenticated);

    session.admin().enter_dfu().await.unwrap();
    assert_eq!(session.admin_state(), AdminState::Unselected);
    assert_eq!(channel.remaining(), 0);
}

#[tokio::test]
async fn test_dfu_not_written_is_an_error() {
    let channel = ScriptedChannel::new();
    channel
        .expect(SELECT_ADMIN, "9000")
        .expect(VERIFY_123456, "9000")
        .expect("0041000000", "004000809000");
    let (mut manager, _) = scripted_manager(&channel, 0);
    let session = manager.session().unwrap();

    session
        .admin()
        .verify_pin(AdminPin::new("123456").unwrap())
        .await
        .unwrap();
    channel.fail_next_write("pipe stalled");

    let err = session.admin().enter_dfu().await.unwrap_err();
    assert!(matches!(err, ConsoleError::TransportFailure(_)));
    assert!(!channel.sent().contains(&"00FF2222".to_string()));
}

#[tokio::test]
async fn test_wrong_pin_reports_retries() {
    let channel = ScriptedChannel::new();
    channel
        .expect(SELECT_ADMIN, "9000")
        .expect(VERIFY_123456, "63C1");
    let (mut manager, _) = scripted_manager(&channel, 0);
    let session = manager.session().unwrap();

    let err = session
        .admin()
        .verify_pin(AdminPin::new("123456").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, ConsoleError::PinRetriesRemaining(1)));
    assert_eq!(session.admin_state(), AdminState::Selected);
}

#[tokio::test]
async fn test_switching_applets_drops_pin() {
    let channel = ScriptedChannel::new();
    channel
        .expect(SELECT_ADMIN, "9000")
        .expect(VERIFY_123456, "9000")
        .expect("0041000000", "6D00")
        .expect(READ_VERSION, &version_response("1.4.0"))
        .expect(SELECT_OATH, "9000")
        .expect("0003000000", "9000")
        .expect(SELECT_ADMIN, "9000")
        .expect("00400101", "9000");
    let (mut manager, _) = scripted_manager(&channel, 0);
    let session = manager.session().unwrap();

    // Flash query refused: verification still counts.
    let flash = session
        .admin()
        .verify_pin(AdminPin::new("123456").unwrap())
        .await
        .unwrap();
    assert_eq!(flash, None);

    assert!(session.oath().list().await.unwrap().is_empty());
    assert_eq!(session.selected(), Some(Applet::Oath));
    assert_eq!(session.admin_state(), AdminState::Unselected);

    // Config only needs the applet selected; DFU needs the PIN again.
    session
        .admin()
        .set_config(ConfigFeature::Led, true)
        .await
        .unwrap();
    assert!(matches!(
        session.admin().enter_dfu().await,
        Err(ConsoleError::NotAuthenticated(_))
    ));
    assert_eq!(channel.remaining(), 0);
}

#[tokio::test]
async fn test_reset_applets() {
    let channel = ScriptedChannel::new();
    channel
        .expect(SELECT_ADMIN, "9000")
        .expect("00030000", "9000")
        .expect("00040000", "9000")
        .expect("00050000", "6985");
    let (mut manager, _) = scripted_manager(&channel, 0);
    let session = manager.session().unwrap();

    session
        .admin()
        .reset_applet(ResettableApplet::OpenPgp)
        .await
        .unwrap();
    session
        .admin()
        .reset_applet(ResettableApplet::Piv)
        .await
        .unwrap();
    let err = session
        .admin()
        .reset_applet(ResettableApplet::Oath)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "reset applet failed (SW=6985)");
}

#[tokio::test]
async fn test_device_info_with_refusals() {
    let channel = ScriptedChannel::new();
    channel
        .expect(SELECT_ADMIN, "9000")
        .expect(READ_VERSION, &version_response("2.0.0"))
        .expect("0031010000", "6D00")
        .expect("0032000000", "DEADBEEF9000")
        .expect("0032010000", "6A81");
    let (mut manager, _) = scripted_manager(&channel, 0);

    let info = manager.session().unwrap().admin().device_info().await.unwrap();
    assert_eq!(info.firmware_version.as_deref(), Some("2.0.0"));
    assert_eq!(info.model, None);
    assert_eq!(info.serial_number.as_deref(), Some("DEADBEEF"));
    assert_eq!(info.chip_id, None);
}

#[tokio::test]
async fn test_select_failure_and_reconnect() {
    let channel = ScriptedChannel::new();
    channel
        .expect(SELECT_ADMIN, "6A82")
        .expect(SELECT_ADMIN, "9000")
        .expect(READ_VERSION, &version_response("2.1.0"));
    let connector = ScriptedConnector::new(channel.clone());
    let mut manager = DeviceManager::new(connector.clone(), &ConsoleConfiguration::default())
        .with_pause(Arc::new(InstantPause::default()));

    let err = manager.session().unwrap().admin().select().await.unwrap_err();
    assert!(matches!(
        err,
        ConsoleError::AppletSelectFailed {
            applet: "admin",
            ..
        }
    ));

    manager.disconnect();
    assert!(!manager.is_connected());
    let version = manager
        .session()
        .unwrap()
        .admin()
        .firmware_version()
        .await
        .unwrap();
    assert_eq!(version, "2.1.0");
    assert_eq!(connector.connects(), 2);
}
