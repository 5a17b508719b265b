//! Admin applet client.
//!
//! Commands are fixed short APDUs; the only variable payload is the PIN.
//! Success is `9000` throughout, `63Cn` on VERIFY reports remaining tries.

use zeroize::Zeroize;

use crate::domain::admin::{AdminState, ConfigFeature, DeviceInfo, FlashSpace, ResettableApplet};
use crate::domain::apdu::{CommandApdu, StatusKind};
use crate::domain::codec::{bytes_to_hex, decode_text};
use crate::domain::constants::admin;
use crate::domain::types::{AdminPin, Applet, Redaction};
use crate::infra::error::{ConsoleError, ConsoleResult};
use crate::services::session::DeviceSession;
use crate::services::transceive::ControlChannel;

/// Admin operations borrowed from a [`DeviceSession`].
pub struct AdminClient<'a, C: ControlChannel> {
    session: &'a mut DeviceSession<C>,
}

impl<'a, C: ControlChannel> AdminClient<'a, C> {
    pub(crate) fn new(session: &'a mut DeviceSession<C>) -> Self {
        Self { session }
    }

    #[must_use]
    pub fn state(&self) -> AdminState {
        self.session.admin_state()
    }

    /// SELECT the admin applet. Drops any earlier PIN verification.
    pub async fn select(&mut self) -> ConsoleResult<()> {
        self.session.select(Applet::Admin).await?;
        Ok(())
    }

    async fn ensure_selected(&mut self) -> ConsoleResult<()> {
        if self.session.selected() != Some(Applet::Admin) {
            self.select().await?;
        }
        Ok(())
    }

    fn require_state(&self, required: AdminState, operation: &str) -> ConsoleResult<()> {
        if self.state() < required {
            return Err(ConsoleError::NotAuthenticated(format!(
                "{operation} requires PIN verification"
            )));
        }
        Ok(())
    }

    /// Verify the admin PIN.
    ///
    /// On success the applet is authenticated and the flash usage is read for
    /// display; a failed usage query only loses that extra.
    ///
    /// # Errors
    ///
    /// `PinRetriesRemaining(n)` on `63Cn`, `PinVerifyFailed` on any other
    /// non-success status.
    pub async fn verify_pin(&mut self, pin: AdminPin) -> ConsoleResult<Option<FlashSpace>> {
        self.ensure_selected().await?;
        self.session.admin_state = AdminState::Selected;

        let mut command =
            CommandApdu::new(admin::INS_VERIFY, 0x00, 0x00).with_data(pin.as_bytes().to_vec())?;
        drop(pin);
        let result = self.session.transceive(&command, Redaction::Secret).await;
        command.zeroize();
        let response = result?;

        match response.status().kind() {
            StatusKind::Success => {
                log::info!("PIN verification succeeded");
                self.session.admin_state = AdminState::Authenticated;
            }
            StatusKind::RetriesRemaining(retries) => {
                log::warn!("PIN verification failed, {retries} retries left");
                return Err(ConsoleError::PinRetriesRemaining(retries));
            }
            StatusKind::Failure => {
                return Err(ConsoleError::PinVerifyFailed(response.status()));
            }
        }

        match self.flash_space().await {
            Ok(space) => Ok(Some(space)),
            Err(e) => {
                log::warn!("Could not read flash usage: {e}");
                Ok(None)
            }
        }
    }

    /// Free and total flash in KiB.
    pub async fn flash_space(&mut self) -> ConsoleResult<FlashSpace> {
        self.ensure_selected().await?;
        let command = CommandApdu::new(admin::INS_FLASH_SPACE, 0x00, 0x00).expect_response();
        let response = self
            .session
            .transceive(&command, Redaction::Plain)
            .await?
            .require_success("flash space query")?;
        FlashSpace::from_response(response.data())
    }

    /// Switch the LED or HOTP-on-touch on or off.
    pub async fn set_config(&mut self, feature: ConfigFeature, enabled: bool) -> ConsoleResult<()> {
        self.ensure_selected().await?;
        self.require_state(feature.required_state(), "Changing device configuration")?;

        let command = CommandApdu::new(admin::INS_CONFIG, feature.p1(), u8::from(enabled));
        self.session
            .transceive(&command, Redaction::Plain)
            .await?
            .require_success("set config")?;
        log::info!("{feature} turned {}", if enabled { "on" } else { "off" });
        Ok(())
    }

    /// Wipe an applet. Irreversible.
    pub async fn reset_applet(&mut self, applet: ResettableApplet) -> ConsoleResult<()> {
        self.ensure_selected().await?;
        let command = CommandApdu::new(applet.instruction(), 0x00, 0x00);
        self.session
            .transceive(&command, Redaction::Plain)
            .await?
            .require_success("reset applet")?;
        log::info!("Reset {applet} applet");
        Ok(())
    }

    /// Reboot into the firmware updater.
    ///
    /// The device may drop off the bus instead of answering, so a transport
    /// error after the command is written counts as success. A failed write
    /// does not. On success the selection and PIN state are cleared; the
    /// device has to be reconnected before further use.
    pub async fn enter_dfu(&mut self) -> ConsoleResult<()> {
        self.require_state(AdminState::Authenticated, "Entering DFU")?;

        let command = CommandApdu::new(admin::INS_ENTER_DFU, admin::DFU_GUARD, admin::DFU_GUARD);
        if let Some(response) = self
            .session
            .transceive_detaching(&command, Redaction::Plain)
            .await?
        {
            response.require_success("enter DFU")?;
        }
        self.session.clear_selection();
        log::info!("Device is entering DFU mode");
        Ok(())
    }

    /// Firmware version string, read once per session.
    pub async fn firmware_version(&mut self) -> ConsoleResult<String> {
        if let Some(version) = self.session.firmware_version() {
            return Ok(version.to_string());
        }
        self.fetch_firmware_version()
            .await?
            .ok_or_else(|| ConsoleError::MalformedResponse("firmware version unavailable".to_string()))
    }

    /// Read the version; `None` when the applet refuses the query.
    pub(crate) async fn fetch_firmware_version(&mut self) -> ConsoleResult<Option<String>> {
        self.ensure_selected().await?;
        let version = self
            .read_optional(admin::INS_READ_VERSION, 0x00)
            .await?
            .map(|body| decode_text(&body));
        if let Some(version) = &version {
            self.session.remember_firmware(version.clone());
        }
        Ok(version)
    }

    /// Identity of the connected token.
    ///
    /// Each field is read independently; refused queries leave it `None`.
    pub async fn device_info(&mut self) -> ConsoleResult<DeviceInfo> {
        self.select().await?;
        let firmware_version = self.fetch_firmware_version().await?;
        let model = self
            .read_optional(admin::INS_READ_VERSION, 0x01)
            .await?
            .map(|body| decode_text(&body));
        let serial_number = self
            .read_optional(admin::INS_READ_SN, 0x00)
            .await?
            .map(|body| bytes_to_hex(&body));
        let chip_id = self
            .read_optional(admin::INS_READ_SN, 0x01)
            .await?
            .map(|body| bytes_to_hex(&body));

        Ok(DeviceInfo {
            firmware_version,
            model,
            serial_number,
            chip_id,
        })
    }

    async fn read_optional(&mut self, ins: u8, p1: u8) -> ConsoleResult<Option<Vec<u8>>> {
        let command = CommandApdu::new(ins, p1, 0x00).expect_response();
        let response = self.session.transceive(&command, Redaction::Plain).await?;
        if response.is_success() {
            Ok(Some(response.data().to_vec()))
        } else {
            log::debug!(
                "Query {:02X}/{:02X} refused: {}",
                ins,
                p1,
                response.status()
            );
            Ok(None)
        }
    }
}
