//! Engine behaviour seen through a full session: polling, history, timeouts.

mod common;

use std::sync::Arc;
use std::time::Duration;

use canokey_console::adapters::scripted::{FixedClock, InstantPause, ScriptedChannel, ScriptedConnector};
use canokey_console::{
    AdminPin, ApduHistory, ApduLogEntry, ConsoleConfiguration, ConsoleError, DeviceManager,
};

use common::{READ_VERSION, SELECT_ADMIN};

fn manager_with(
    channel: &ScriptedChannel,
    config: &ConsoleConfiguration,
    history: &Arc<ApduHistory>,
    pause: &Arc<InstantPause>,
) -> DeviceManager<ScriptedConnector> {
    DeviceManager::new(ScriptedConnector::new(channel.clone()), config)
        .with_pause(pause.clone())
        .with_clock(Arc::new(FixedClock(0)))
        .with_log(history.clone())
}

#[tokio::test]
async fn test_history_redacts_pin() {
    let channel = ScriptedChannel::new();
    channel
        .expect(SELECT_ADMIN, "9000")
        .expect("0020000006313233343536", "63C2");
    let config = ConsoleConfiguration::default();
    let history = Arc::new(ApduHistory::new(config.apdu_history_limit));
    let pause = Arc::new(InstantPause::default());
    let mut manager = manager_with(&channel, &config, &history, &pause);

    let result = manager
        .session()
        .unwrap()
        .admin()
        .verify_pin(AdminPin::new("123456").unwrap())
        .await;
    assert!(matches!(result, Err(ConsoleError::PinRetriesRemaining(2))));

    assert_eq!(
        history.entries(),
        vec![
            ApduLogEntry {
                command: SELECT_ADMIN.to_string(),
                response: "9000".to_string(),
            },
            ApduLogEntry {
                command: "REDACTED".to_string(),
                response: "63C2".to_string(),
            },
        ]
    );
    assert!(history
        .entries()
        .iter()
        .all(|entry| !entry.command.contains("313233")));
}

#[tokio::test]
async fn test_busy_device_is_polled_at_configured_interval() {
    let channel = ScriptedChannel::new();
    channel
        .expect_busy(SELECT_ADMIN, 5, "9000")
        .expect(READ_VERSION, "312E352E309000");
    let mut config = ConsoleConfiguration::default();
    config.transport.poll_interval_ms = 20;
    let history = Arc::new(ApduHistory::new(8));
    let pause = Arc::new(InstantPause::default());
    let mut manager = manager_with(&channel, &config, &history, &pause);

    let version = manager
        .session()
        .unwrap()
        .admin()
        .firmware_version()
        .await
        .unwrap();
    assert_eq!(version, "1.5.0");
    assert_eq!(pause.count(), 5);
    assert_eq!(pause.total(), Duration::from_millis(100));
}

#[tokio::test]
async fn test_poll_budget_exhausted() {
    let channel = ScriptedChannel::new();
    channel.expect_busy(SELECT_ADMIN, 10, "9000");
    let mut config = ConsoleConfiguration::default();
    config.transport.max_poll_attempts = Some(3);
    let history = Arc::new(ApduHistory::new(8));
    let pause = Arc::new(InstantPause::default());
    let mut manager = manager_with(&channel, &config, &history, &pause);

    let err = manager.session().unwrap().admin().select().await.unwrap_err();
    assert!(matches!(err, ConsoleError::DeviceTimeout { attempts: 3 }));
    assert!(err.is_transport());
    assert_eq!(
        history.entries(),
        vec![ApduLogEntry {
            command: SELECT_ADMIN.to_string(),
            response: String::new(),
        }]
    );
}

#[tokio::test]
async fn test_unplugged_mid_command() {
    let channel = ScriptedChannel::new();
    channel.expect_disconnect(SELECT_ADMIN);
    let config = ConsoleConfiguration::default();
    let history = Arc::new(ApduHistory::new(8));
    let pause = Arc::new(InstantPause::default());
    let mut manager = manager_with(&channel, &config, &history, &pause);

    let err = manager.session().unwrap().admin().select().await.unwrap_err();
    assert!(matches!(err, ConsoleError::DeviceUnavailable(_)));
}

#[test]
fn test_default_pause_waits_on_tokio_timer() {
    let channel = ScriptedChannel::new();
    channel.expect_busy(SELECT_ADMIN, 2, "9000");
    let mut config = ConsoleConfiguration::default();
    config.transport.poll_interval_ms = 5;
    let mut manager = DeviceManager::new(ScriptedConnector::new(channel.clone()), &config);

    let started = std::time::Instant::now();
    let result = tokio_test::block_on(async {
        manager.session()?.admin().select().await
    });
    assert!(result.is_ok());
    assert!(started.elapsed() >= Duration::from_millis(10));
    assert_eq!(channel.remaining(), 0);
}
