//! One command/response cycle against the token.
//!
//! # Protocol
//!
//! ```text
//! 1. OUT  vendor request 0  <command APDU>
//! 2. IN   vendor request 2  (1 byte)   repeat every poll interval until 0x00
//! 3. IN   vendor request 1  (<= 1500)  response APDU incl. status word
//! ```
//!
//! The three phases must not interleave with another command on the same
//! channel. [`Transceiver::transceive`] takes `&mut self`, so a second
//! command cannot be issued while one is outstanding.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::domain::apdu::{CommandApdu, ResponseApdu};
use crate::domain::codec::bytes_to_hex;
use crate::domain::constants::{usb, REDACTED};
use crate::domain::types::Redaction;
use crate::infra::config::TransportConfig;
use crate::infra::error::{ConsoleError, ConsoleResult};

/// Vendor control requests on the claimed interface.
///
/// Implementations address the interface themselves; callers only choose the
/// request code and the buffer.
pub trait ControlChannel: Send {
    /// Vendor OUT transfer. Returns the number of bytes written.
    fn control_out(&mut self, request: u8, data: &[u8]) -> ConsoleResult<usize>;

    /// Vendor IN transfer into `buf`. Returns the number of bytes read.
    fn control_in(&mut self, request: u8, buf: &mut [u8]) -> ConsoleResult<usize>;
}

/// Suspends the caller between busy polls.
#[async_trait]
pub trait Pause: Send + Sync {
    async fn pause(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPause;

#[async_trait]
impl Pause for TokioPause {
    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// One line of the APDU history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduLogEntry {
    /// Command hex, or `REDACTED` for secret commands
    pub command: String,
    /// Response hex including status word; empty on transport failure
    pub response: String,
}

/// Receives every exchange. Owned by the caller, not the engine.
pub trait ApduLog: Send + Sync {
    fn record(&self, entry: ApduLogEntry);
}

/// Bounded in-memory history, newest last.
#[derive(Debug)]
pub struct ApduHistory {
    limit: usize,
    entries: Mutex<VecDeque<ApduLogEntry>>,
}

impl ApduHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            entries: Mutex::new(VecDeque::with_capacity(limit.min(256))),
        }
    }

    pub fn entries(&self) -> Vec<ApduLogEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

impl ApduLog for ApduHistory {
    fn record(&self, entry: ApduLogEntry) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        if self.limit == 0 {
            return;
        }
        while entries.len() >= self.limit {
            entries.pop_front();
        }
        entries.push_back(entry);
    }
}

/// Poll timing and buffer sizing for the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    /// `None` waits forever
    pub max_attempts: Option<u32>,
    pub response_capacity: usize,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from(&TransportConfig::default())
    }
}

impl From<&TransportConfig> for PollSettings {
    fn from(config: &TransportConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            max_attempts: config.max_poll_attempts,
            response_capacity: config.response_buffer_size,
        }
    }
}

/// Runs command/response cycles over a [`ControlChannel`].
pub struct Transceiver<C: ControlChannel> {
    channel: C,
    settings: PollSettings,
    pause: Arc<dyn Pause>,
    log: Option<Arc<dyn ApduLog>>,
}

impl<C: ControlChannel> Transceiver<C> {
    pub fn new(channel: C, settings: PollSettings, pause: Arc<dyn Pause>) -> Self {
        Self {
            channel,
            settings,
            pause,
            log: None,
        }
    }

    /// Attach the history sink.
    pub fn with_log(mut self, log: Arc<dyn ApduLog>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// Send a command and return the device's response.
    ///
    /// Every call is recorded in the history, with the command replaced by
    /// `REDACTED` when `redaction` is [`Redaction::Secret`].
    ///
    /// # Errors
    ///
    /// `TransportFailure` for USB errors, short writes and empty responses;
    /// `DeviceTimeout` if the device stays busy past the poll budget.
    /// Applet-level failures are *not* errors here: inspect the status word.
    pub async fn transceive(
        &mut self,
        command: &CommandApdu,
        redaction: Redaction,
    ) -> ConsoleResult<ResponseApdu> {
        let (_, result) = self.cycle(command, redaction).await;
        result
    }

    /// Send a command after which the device may leave the bus.
    ///
    /// Returns `None` when the command was delivered but polling or reading
    /// the response failed at the transport level.
    ///
    /// # Errors
    ///
    /// Failures before the command is fully written propagate unchanged.
    pub async fn transceive_detaching(
        &mut self,
        command: &CommandApdu,
        redaction: Redaction,
    ) -> ConsoleResult<Option<ResponseApdu>> {
        match self.cycle(command, redaction).await {
            (_, Ok(response)) => Ok(Some(response)),
            (true, Err(e)) if e.is_transport() => {
                log::info!("Device went away after the command: {e}");
                Ok(None)
            }
            (_, Err(e)) => Err(e),
        }
    }

    /// One logged exchange. The flag tells whether the command was delivered.
    async fn cycle(
        &mut self,
        command: &CommandApdu,
        redaction: Redaction,
    ) -> (bool, ConsoleResult<ResponseApdu>) {
        let bytes = Zeroizing::new(command.to_bytes());
        let shown = match redaction {
            Redaction::Plain => bytes_to_hex(&bytes),
            Redaction::Secret => REDACTED.to_string(),
        };
        log::trace!("APDU TX: {shown}");

        let written = self.write(&bytes);
        let delivered = written.is_ok();
        let result = match written {
            Ok(()) => self.read_response().await,
            Err(e) => Err(e),
        };

        let response = match &result {
            Ok(response) => response.to_hex(),
            Err(e) => {
                log::debug!("APDU exchange failed: {e}");
                String::new()
            }
        };
        log::trace!("APDU RX: {response}");

        if let Some(log) = &self.log {
            log.record(ApduLogEntry {
                command: shown,
                response,
            });
        }

        (delivered, result)
    }

    fn write(&mut self, bytes: &[u8]) -> ConsoleResult<()> {
        let written = self.channel.control_out(usb::REQUEST_SEND, bytes)?;
        if written != bytes.len() {
            return Err(ConsoleError::TransportFailure(format!(
                "Incomplete USB write: {written}/{} bytes",
                bytes.len()
            )));
        }
        Ok(())
    }

    async fn read_response(&mut self) -> ConsoleResult<ResponseApdu> {
        self.wait_until_done().await?;

        let mut buf = vec![0u8; self.settings.response_capacity];
        let read = self.channel.control_in(usb::REQUEST_RECEIVE, &mut buf)?;
        buf.truncate(read);
        ResponseApdu::from_bytes(buf)
    }

    async fn wait_until_done(&mut self) -> ConsoleResult<()> {
        let mut polls: u32 = 0;
        loop {
            let mut status = [0u8; 1];
            let read = self.channel.control_in(usb::REQUEST_STATUS, &mut status)?;
            if read == 0 {
                return Err(ConsoleError::TransportFailure(
                    "Empty status poll".to_string(),
                ));
            }
            if status[0] == 0 {
                if polls > 0 {
                    log::debug!("Device finished after {polls} busy polls");
                }
                return Ok(());
            }

            polls += 1;
            if let Some(max) = self.settings.max_attempts {
                if polls >= max {
                    return Err(ConsoleError::DeviceTimeout { attempts: polls });
                }
            }
            self.pause.pause(self.settings.interval).await;
        }
    }
}
