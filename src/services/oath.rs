//! OATH applet client.
//!
//! # Session flow
//!
//! 1. Learn the firmware version once (via the admin applet) to pick the
//!    legacy or current dialect.
//! 2. SELECT the OATH applet. On the current dialect a four-record answer
//!    carries a salt and challenge: a passphrase is set.
//! 3. Answer the challenge with [`OathClient::authenticate`]. The passphrase
//!    and the derived key are dropped inside that call.
//! 4. List, add, delete, set-default and calculate.
//!
//! Add and delete always re-list afterwards, whatever their own outcome.

use zeroize::Zeroize;

use crate::domain::apdu::{CommandApdu, ResponseApdu};
use crate::domain::constants::oath;
use crate::domain::handshake;
use crate::domain::oath::{
    calculate_body, name_body, AuthChallenge, NewOathEntry, OathEntry, OathType, ProtocolVersion,
};
use crate::domain::otp::{time_challenge, time_step, truncate_code, OtpCode};
use crate::domain::types::{Applet, OathPassphrase, Redaction};
use crate::infra::error::{ConsoleError, ConsoleResult};
use crate::services::session::{DeviceSession, OathState};
use crate::services::transceive::ControlChannel;

/// What selecting the applet revealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutcome {
    /// No passphrase configured; commands may follow
    Unlocked,
    /// A challenge is pending; call [`OathClient::authenticate`]
    PassphraseRequired,
}

/// Result of add/delete plus the listing taken right after it.
#[derive(Debug)]
pub struct MutationReport {
    pub outcome: ConsoleResult<()>,
    pub entries: ConsoleResult<Vec<OathEntry>>,
}

impl MutationReport {
    /// The refreshed entries, or the first error.
    pub fn into_result(self) -> ConsoleResult<Vec<OathEntry>> {
        self.outcome?;
        self.entries
    }
}

/// OATH operations borrowed from a [`DeviceSession`].
pub struct OathClient<'a, C: ControlChannel> {
    session: &'a mut DeviceSession<C>,
}

impl<'a, C: ControlChannel> OathClient<'a, C> {
    pub(crate) fn new(session: &'a mut DeviceSession<C>) -> Self {
        Self { session }
    }

    /// Dialect for this session, reading the firmware version on first use.
    pub async fn ensure_protocol(&mut self) -> ConsoleResult<ProtocolVersion> {
        if let Some(protocol) = self.session.protocol() {
            return Ok(protocol);
        }

        match self.session.admin().fetch_firmware_version().await? {
            Some(_) => {}
            None => {
                log::warn!("Firmware version unavailable, assuming the legacy OATH protocol");
                self.session.assume_protocol(ProtocolVersion::Legacy);
            }
        }
        self.session.protocol().ok_or_else(|| {
            ConsoleError::MalformedResponse("OATH protocol could not be determined".to_string())
        })
    }

    /// SELECT the OATH applet and note whether a passphrase is pending.
    pub async fn select(&mut self) -> ConsoleResult<SelectOutcome> {
        let protocol = self.ensure_protocol().await?;
        let response = self.session.select(Applet::Oath).await?;

        if protocol.supports_passphrase() {
            if let Some(challenge) = AuthChallenge::from_select_response(response.data())? {
                log::debug!("OATH applet is passphrase protected");
                self.session.oath_state = OathState::AwaitingPassphrase(challenge);
                return Ok(SelectOutcome::PassphraseRequired);
            }
        }

        self.session.oath_state = OathState::Unlocked;
        Ok(SelectOutcome::Unlocked)
    }

    /// Answer the pending challenge.
    ///
    /// Selects first if needed. Succeeds without sending anything when no
    /// passphrase is set. The challenge is spent either way: a failed attempt
    /// needs a fresh select.
    ///
    /// # Errors
    ///
    /// `InvalidPassphrase` on any non-success status.
    pub async fn authenticate(&mut self, passphrase: OathPassphrase) -> ConsoleResult<()> {
        if matches!(self.session.oath_state, OathState::Locked)
            || self.session.selected() != Some(Applet::Oath)
        {
            self.select().await?;
        }

        let challenge = match std::mem::replace(&mut self.session.oath_state, OathState::Locked) {
            OathState::AwaitingPassphrase(challenge) => challenge,
            other => {
                self.session.oath_state = other;
                log::debug!("No OATH passphrase set, nothing to authenticate");
                return Ok(());
            }
        };

        let mut body = handshake::validate_body(passphrase, &challenge)?;
        let mut command =
            CommandApdu::new(oath::INS_VALIDATE, 0x00, 0x00).with_data(std::mem::take(&mut *body))?;
        let result = self.session.transceive(&command, Redaction::Secret).await;
        command.zeroize();
        let response = result?;

        if !response.is_success() {
            log::warn!("OATH passphrase rejected: {}", response.status());
            return Err(ConsoleError::InvalidPassphrase(response.status()));
        }
        log::info!("OATH applet unlocked");
        self.session.oath_state = OathState::Unlocked;
        Ok(())
    }

    /// Make sure the applet is selected and unlocked; returns the dialect.
    async fn require_unlocked(&mut self) -> ConsoleResult<ProtocolVersion> {
        if self.session.selected() != Some(Applet::Oath)
            || matches!(self.session.oath_state, OathState::Locked)
        {
            self.select().await?;
        }
        match &self.session.oath_state {
            OathState::Unlocked => {}
            OathState::AwaitingPassphrase(_) => return Err(ConsoleError::PassphraseRequired),
            OathState::Locked => {
                return Err(ConsoleError::NotAuthenticated(
                    "OATH applet is not selected".to_string(),
                ))
            }
        }
        self.ensure_protocol().await
    }

    async fn send(
        &mut self,
        command: &CommandApdu,
        redaction: Redaction,
        operation: &'static str,
    ) -> ConsoleResult<ResponseApdu> {
        self.session
            .transceive(command, redaction)
            .await?
            .require_success(operation)
    }

    /// Credentials in on-device order.
    pub async fn list(&mut self) -> ConsoleResult<Vec<OathEntry>> {
        let protocol = self.require_unlocked().await?;
        let command = CommandApdu::new(protocol.list_instruction(), 0x00, 0x00).expect_response();
        let response = self.send(&command, Redaction::Plain, "list credentials").await?;
        let entries = protocol.parse_list(response.data())?;
        log::debug!("Listed {} OATH credentials", entries.len());
        Ok(entries)
    }

    /// Store a credential, then re-list.
    pub async fn add(&mut self, entry: NewOathEntry) -> ConsoleResult<MutationReport> {
        let outcome = self.put(&entry).await;
        drop(entry);
        self.refresh(outcome).await
    }

    async fn put(&mut self, entry: &NewOathEntry) -> ConsoleResult<()> {
        self.require_unlocked().await?;
        let mut command =
            CommandApdu::new(oath::INS_PUT, 0x00, 0x00).with_data(entry.encode_put_body()?)?;
        let result = self.send(&command, Redaction::Secret, "add credential").await;
        command.zeroize();
        result?;
        log::info!("Added OATH credential '{}'", entry.name);
        Ok(())
    }

    /// Remove a credential by name, then re-list.
    pub async fn delete(&mut self, name: &str) -> ConsoleResult<MutationReport> {
        let outcome = self.remove(name).await;
        self.refresh(outcome).await
    }

    async fn remove(&mut self, name: &str) -> ConsoleResult<()> {
        self.require_unlocked().await?;
        let command = CommandApdu::new(oath::INS_DELETE, 0x00, 0x00).with_data(name_body(name)?)?;
        self.send(&command, Redaction::Plain, "delete credential").await?;
        log::info!("Deleted OATH credential '{name}'");
        Ok(())
    }

    async fn refresh(&mut self, outcome: ConsoleResult<()>) -> ConsoleResult<MutationReport> {
        if let Err(e) = &outcome {
            log::warn!("{e}; refreshing the listing anyway");
        }
        let entries = self.list().await;
        Ok(MutationReport { outcome, entries })
    }

    /// Make a HOTP credential the one emitted on touch.
    ///
    /// # Errors
    ///
    /// `InvalidEntryType` for anything but HOTP.
    pub async fn set_default(&mut self, entry: &OathEntry) -> ConsoleResult<()> {
        if entry.oath_type != OathType::Hotp {
            return Err(ConsoleError::InvalidEntryType(format!(
                "'{}' is {}, only HOTP credentials can be the default",
                entry.name, entry.oath_type
            )));
        }
        self.require_unlocked().await?;
        let command =
            CommandApdu::new(oath::INS_SET_DEFAULT, 0x00, 0x00).with_data(name_body(&entry.name)?)?;
        self.send(&command, Redaction::Plain, "set default credential").await?;
        log::info!("'{}' is now the default credential", entry.name);
        Ok(())
    }

    /// Current TOTP code for a credential.
    pub async fn calculate(&mut self, name: &str) -> ConsoleResult<OtpCode> {
        let protocol = self.require_unlocked().await?;
        let step = time_step(
            self.session.clock().unix_time(),
            self.session.oath_config().totp_period_secs,
        );
        let command = CommandApdu::new(protocol.calculate_instruction(), 0x00, 0x00)
            .with_data(calculate_body(name, &time_challenge(step))?)?;
        let response = self.send(&command, Redaction::Plain, "calculate").await?;
        truncate_code(response.data())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::adapters::scripted::{FixedClock, InstantPause, ScriptedChannel};
    use crate::domain::oath::{KeyEncoding, KeyMaterial, OathAlgorithm, OathProperties};
    use crate::infra::config::OathConfig;
    use crate::services::transceive::{PollSettings, Transceiver};

    const SELECT_ADMIN: &str = "00A4040005F000000000";
    const SELECT_OATH: &str = "00A4040007A0000005272101";

    fn session(channel: &ScriptedChannel, now: u64) -> DeviceSession<ScriptedChannel> {
        let transceiver = Transceiver::new(
            channel.clone(),
            PollSettings::default(),
            Arc::new(InstantPause::default()),
        );
        DeviceSession::new(transceiver, Arc::new(FixedClock(now)), OathConfig::default())
    }

    fn legacy_preamble(channel: &ScriptedChannel) {
        channel
            .expect(SELECT_ADMIN, "9000")
            .expect("0031000000", "312E342E329000")
            .expect(SELECT_OATH, "9000");
    }

    #[tokio::test]
    async fn test_legacy_list() {
        let channel = ScriptedChannel::new();
        legacy_preamble(&channel);
        channel.expect("0003000000", "7103666F6F7501117103626172750122 9000".replace(' ', "").as_str());
        let mut session = session(&channel, 0);

        let entries = session.oath().list().await.unwrap();
        assert_eq!(
            entries,
            vec![
                OathEntry::new("foo", OathType::Hotp, OathAlgorithm::HmacSha1),
                OathEntry::new("bar", OathType::Totp, OathAlgorithm::HmacSha256),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_version_falls_back_to_legacy() {
        let channel = ScriptedChannel::new();
        channel
            .expect(SELECT_ADMIN, "9000")
            .expect("0031000000", "6D00")
            .expect(SELECT_OATH, "9000")
            .expect("0003000000", "9000");
        let mut session = session(&channel, 0);

        assert!(session.oath().list().await.unwrap().is_empty());
        assert_eq!(session.protocol(), Some(ProtocolVersion::Legacy));
    }

    #[tokio::test]
    async fn test_calculate_uses_time_step() {
        let channel = ScriptedChannel::new();
        legacy_preamble(&channel);
        // 59 s / 30 = step 1
        channel.expect(
            "0004000010710474657374740800000000000000 01".replace(' ', "").as_str(),
            "76050600001E619000",
        );
        let mut session = session(&channel, 59);

        let code = session.oath().calculate("test").await.unwrap();
        assert_eq!(code.as_str(), "007777");
    }

    #[tokio::test]
    async fn test_delete_failure_still_refreshes() {
        let channel = ScriptedChannel::new();
        legacy_preamble(&channel);
        channel
            .expect("00020000057103666F6F", "6A80")
            .expect("0003000000", "9000");
        let mut session = session(&channel, 0);

        let report = session.oath().delete("foo").await.unwrap();
        assert!(matches!(
            report.outcome,
            Err(ConsoleError::CommandFailed {
                operation: "delete credential",
                ..
            })
        ));
        assert_eq!(report.entries.unwrap(), Vec::new());
        assert_eq!(channel.remaining(), 0);
    }

    #[tokio::test]
    async fn test_add_encodes_put() {
        let channel = ScriptedChannel::new();
        legacy_preamble(&channel);
        channel
            .expect("0001000010710161730821066B65792D3031780103", "9000")
            .expect("0003000000", "7101617501219000");
        let mut session = session(&channel, 0);

        let report = session
            .oath()
            .add(NewOathEntry {
                name: "a".to_string(),
                oath_type: OathType::Totp,
                algorithm: OathAlgorithm::HmacSha1,
                key: KeyMaterial::new(KeyEncoding::Hex, "6B65792D3031"),
                properties: OathProperties {
                    increasing_only: true,
                    require_touch: true,
                },
            })
            .await
            .unwrap();
        assert_eq!(
            report.into_result().unwrap(),
            vec![OathEntry::new("a", OathType::Totp, OathAlgorithm::HmacSha1)]
        );
    }

    #[tokio::test]
    async fn test_add_transport_failure_still_refreshes() {
        let channel = ScriptedChannel::new();
        legacy_preamble(&channel);
        channel
            .expect("0003000000", "9000")
            .expect("0003000000", "9000");
        let mut session = session(&channel, 0);

        session.oath().list().await.unwrap();
        channel.fail_next_write("link reset");
        let report = session
            .oath()
            .add(NewOathEntry {
                name: "a".to_string(),
                oath_type: OathType::Totp,
                algorithm: OathAlgorithm::HmacSha1,
                key: KeyMaterial::new(KeyEncoding::Utf8, "secret"),
                properties: OathProperties::default(),
            })
            .await
            .unwrap();

        assert!(matches!(report.outcome, Err(ConsoleError::TransportFailure(_))));
        assert_eq!(report.entries.unwrap(), Vec::new());
        assert_eq!(channel.remaining(), 0);
    }

    #[tokio::test]
    async fn test_set_default_rejects_totp() {
        let channel = ScriptedChannel::new();
        let mut session = session(&channel, 0);
        let entry = OathEntry::new("t", OathType::Totp, OathAlgorithm::HmacSha1);
        assert!(matches!(
            session.oath().set_default(&entry).await,
            Err(ConsoleError::InvalidEntryType(_))
        ));
        assert!(channel.sent().is_empty());
    }
}
