//! State of one connected token.
//!
//! A [`DeviceSession`] is created when a channel is opened and dropped on
//! disconnect. It owns the transceiver and everything the console learns
//! about the device along the way: firmware version, protocol dialect, the
//! selected applet and both authentication states. Nothing here is global.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::domain::admin::AdminState;
use crate::domain::apdu::{CommandApdu, ResponseApdu};
use crate::domain::oath::{AuthChallenge, ProtocolVersion};
use crate::domain::types::{Applet, Redaction};
use crate::infra::config::OathConfig;
use crate::infra::error::{ConsoleError, ConsoleResult};
use crate::services::admin::AdminClient;
use crate::services::oath::OathClient;
use crate::services::transceive::{ControlChannel, Transceiver};

/// Wall-clock source for TOTP time steps.
pub trait Clock: Send + Sync {
    /// Seconds since the Unix epoch.
    fn unix_time(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn unix_time(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// OATH access for the current selection.
#[derive(Debug)]
pub(crate) enum OathState {
    /// Not selected since connect or since another applet was selected
    Locked,
    /// Selected; the device issued a challenge that must be answered
    AwaitingPassphrase(AuthChallenge),
    Unlocked,
}

/// One connected device and what the console knows about it.
pub struct DeviceSession<C: ControlChannel> {
    transceiver: Transceiver<C>,
    clock: Arc<dyn Clock>,
    oath_config: OathConfig,
    firmware_version: Option<String>,
    protocol: Option<ProtocolVersion>,
    selected: Option<Applet>,
    pub(crate) admin_state: AdminState,
    pub(crate) oath_state: OathState,
}

impl<C: ControlChannel> DeviceSession<C> {
    pub fn new(transceiver: Transceiver<C>, clock: Arc<dyn Clock>, oath_config: OathConfig) -> Self {
        Self {
            transceiver,
            clock,
            oath_config,
            firmware_version: None,
            protocol: None,
            selected: None,
            admin_state: AdminState::Unselected,
            oath_state: OathState::Locked,
        }
    }

    /// Admin applet operations.
    pub fn admin(&mut self) -> AdminClient<'_, C> {
        AdminClient::new(self)
    }

    /// OATH applet operations.
    pub fn oath(&mut self) -> OathClient<'_, C> {
        OathClient::new(self)
    }

    pub async fn transceive(
        &mut self,
        command: &CommandApdu,
        redaction: Redaction,
    ) -> ConsoleResult<ResponseApdu> {
        self.transceiver.transceive(command, redaction).await
    }

    /// Like [`DeviceSession::transceive`], for commands that may knock the
    /// device off the bus. `None` means it left after receiving the command.
    pub async fn transceive_detaching(
        &mut self,
        command: &CommandApdu,
        redaction: Redaction,
    ) -> ConsoleResult<Option<ResponseApdu>> {
        self.transceiver
            .transceive_detaching(command, redaction)
            .await
    }

    /// Forget the selection and both authentication states.
    pub(crate) fn clear_selection(&mut self) {
        self.selected = None;
        self.admin_state = AdminState::Unselected;
        self.oath_state = OathState::Locked;
    }

    /// SELECT an applet by AID.
    ///
    /// Selecting resets the applet's on-device session, so the console drops
    /// any authentication it held for the other applet as well as for this
    /// one.
    ///
    /// # Errors
    ///
    /// `AppletSelectFailed` on any status other than `9000`.
    pub async fn select(&mut self, applet: Applet) -> ConsoleResult<ResponseApdu> {
        self.clear_selection();

        let response = self
            .transceive(&CommandApdu::select(applet.aid()), Redaction::Plain)
            .await?;
        if !response.is_success() {
            log::debug!("Selecting {applet} applet failed: {}", response.status());
            return Err(ConsoleError::AppletSelectFailed {
                applet: applet.name(),
                status: response.status(),
            });
        }

        log::debug!("Selected {applet} applet");
        self.selected = Some(applet);
        if applet == Applet::Admin {
            self.admin_state = AdminState::Selected;
        }
        Ok(response)
    }

    #[must_use]
    pub fn selected(&self) -> Option<Applet> {
        self.selected
    }

    #[must_use]
    pub fn admin_state(&self) -> AdminState {
        self.admin_state
    }

    /// Whether OATH commands may be sent without a handshake.
    #[must_use]
    pub fn oath_unlocked(&self) -> bool {
        matches!(self.oath_state, OathState::Unlocked)
    }

    #[must_use]
    pub fn firmware_version(&self) -> Option<&str> {
        self.firmware_version.as_deref()
    }

    #[must_use]
    pub fn protocol(&self) -> Option<ProtocolVersion> {
        self.protocol
    }

    /// Cache the firmware version and the dialect it implies.
    pub(crate) fn remember_firmware(&mut self, version: String) {
        let protocol = ProtocolVersion::from_firmware(&version);
        log::debug!("Firmware {version} speaks the {protocol} OATH protocol");
        self.protocol = Some(protocol);
        self.firmware_version = Some(version);
    }

    /// Fix the dialect when the firmware would not report a version.
    pub(crate) fn assume_protocol(&mut self, protocol: ProtocolVersion) {
        self.protocol = Some(protocol);
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub(crate) fn oath_config(&self) -> &OathConfig {
        &self.oath_config
    }
}
