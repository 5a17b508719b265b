//! Connection lifecycle.
//!
//! [`DeviceManager`] owns at most one [`DeviceSession`]. The first operation
//! connects implicitly; [`DeviceManager::disconnect`] throws away the
//! session together with every cached version, protocol and auth flag.

use std::sync::Arc;

use crate::infra::config::{ConsoleConfiguration, OathConfig};
use crate::infra::error::{ConsoleError, ConsoleResult};
use crate::services::session::{Clock, DeviceSession, SystemClock};
use crate::services::transceive::{
    ApduLog, ControlChannel, Pause, PollSettings, TokioPause, Transceiver,
};

/// Opens a channel to a device.
pub trait Connector {
    type Channel: ControlChannel;

    fn connect(&self) -> ConsoleResult<Self::Channel>;
}

/// Connects on demand and hands out the live session.
pub struct DeviceManager<K: Connector> {
    connector: K,
    settings: PollSettings,
    oath_config: OathConfig,
    pause: Arc<dyn Pause>,
    clock: Arc<dyn Clock>,
    log: Option<Arc<dyn ApduLog>>,
    session: Option<DeviceSession<K::Channel>>,
}

impl<K: Connector> DeviceManager<K> {
    pub fn new(connector: K, config: &ConsoleConfiguration) -> Self {
        Self {
            connector,
            settings: PollSettings::from(&config.transport),
            oath_config: config.oath.clone(),
            pause: Arc::new(TokioPause),
            clock: Arc::new(SystemClock),
            log: None,
            session: None,
        }
    }

    #[must_use]
    pub fn with_pause(mut self, pause: Arc<dyn Pause>) -> Self {
        self.pause = pause;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Record every exchange of future sessions in `log`.
    #[must_use]
    pub fn with_log(mut self, log: Arc<dyn ApduLog>) -> Self {
        self.log = Some(log);
        self
    }

    /// Open a fresh session, replacing any existing one.
    ///
    /// # Errors
    ///
    /// `DeviceUnavailable` when the connector cannot reach a device.
    pub fn connect(&mut self) -> ConsoleResult<()> {
        self.session = None;
        let channel = self.connector.connect().map_err(|e| match e {
            ConsoleError::DeviceUnavailable(_) => e,
            other => ConsoleError::DeviceUnavailable(other.to_string()),
        })?;

        let mut transceiver = Transceiver::new(channel, self.settings.clone(), self.pause.clone());
        if let Some(log) = &self.log {
            transceiver = transceiver.with_log(log.clone());
        }
        self.session = Some(DeviceSession::new(
            transceiver,
            self.clock.clone(),
            self.oath_config.clone(),
        ));
        log::debug!("Device session opened");
        Ok(())
    }

    /// The live session, connecting first if there is none.
    pub fn session(&mut self) -> ConsoleResult<&mut DeviceSession<K::Channel>> {
        if self.session.is_none() {
            self.connect()?;
        }
        self.session
            .as_mut()
            .ok_or_else(|| ConsoleError::DeviceUnavailable("no device session".to_string()))
    }

    /// Drop the session and everything learned about the device.
    pub fn disconnect(&mut self) {
        if self.session.take().is_some() {
            log::debug!("Device session closed");
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::scripted::{InstantPause, ScriptedChannel, ScriptedConnector};
    use crate::domain::types::Applet;

    #[test]
    fn test_implicit_connect_failure() {
        let mut manager =
            DeviceManager::new(ScriptedConnector::unavailable(), &ConsoleConfiguration::default());
        assert!(matches!(
            manager.session(),
            Err(ConsoleError::DeviceUnavailable(_))
        ));
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_resets_state() {
        let channel = ScriptedChannel::new();
        channel
            .expect("00A4040005F000000000", "9000")
            .expect("0031000000", "322E302E309000");
        let connector = ScriptedConnector::new(channel);
        let mut manager = DeviceManager::new(connector.clone(), &ConsoleConfiguration::default())
            .with_pause(Arc::new(InstantPause::default()));

        let version = manager
            .session()
            .unwrap()
            .admin()
            .firmware_version()
            .await
            .unwrap();
        assert_eq!(version, "2.0.0");
        assert_eq!(manager.session().unwrap().selected(), Some(Applet::Admin));
        assert_eq!(connector.connects(), 1);

        manager.disconnect();
        let session = manager.session().unwrap();
        assert_eq!(session.firmware_version(), None);
        assert_eq!(session.selected(), None);
        assert_eq!(connector.connects(), 2);
    }
}
