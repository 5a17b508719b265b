//! Shared helpers for integration tests.

#![allow(dead_code)]

pub mod test_env;

use std::sync::Arc;

use canokey_console::adapters::scripted::{FixedClock, InstantPause, ScriptedChannel, ScriptedConnector};
use canokey_console::{ConsoleConfiguration, DeviceManager};

pub const SELECT_ADMIN: &str = "00A4040005F000000000";
pub const SELECT_OATH: &str = "00A4040007A0000005272101";
pub const READ_VERSION: &str = "0031000000";

/// Manager over a scripted device with instant polling and a frozen clock.
pub fn scripted_manager(
    channel: &ScriptedChannel,
    now: u64,
) -> (DeviceManager<ScriptedConnector>, Arc<InstantPause>) {
    let pause = Arc::new(InstantPause::default());
    let manager = DeviceManager::new(
        ScriptedConnector::new(channel.clone()),
        &ConsoleConfiguration::default(),
    )
    .with_pause(pause.clone())
    .with_clock(Arc::new(FixedClock(now)));
    (manager, pause)
}

/// Hex of an ASCII firmware version followed by `9000`.
pub fn version_response(version: &str) -> String {
    format!("{}9000", hex::encode_upper(version))
}
