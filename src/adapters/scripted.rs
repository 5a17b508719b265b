//! In-memory device double.
//!
//! [`ScriptedChannel`] plays back a fixed conversation: each step names the
//! command it expects, how many busy polls to report and the response to
//! return. Clones share one script, so a test can keep a handle for
//! assertions after moving the channel into a session.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::codec::{bytes_to_hex, hex_to_bytes};
use crate::domain::constants::usb;
use crate::infra::error::{ConsoleError, ConsoleResult};
use crate::services::manager::Connector;
use crate::services::session::Clock;
use crate::services::transceive::{ControlChannel, Pause};

#[derive(Debug, Clone)]
enum Reply {
    /// Response APDU as hex, status word included
    Response(String),
    /// Link drops once the command is written
    Disconnect,
}

#[derive(Debug, Clone)]
struct Step {
    command: String,
    busy_polls: u32,
    reply: Reply,
}

#[derive(Debug, Default)]
struct Script {
    steps: VecDeque<Step>,
    current: Option<Step>,
    sent: Vec<String>,
    write_failure: Option<String>,
}

/// Channel that answers from a script instead of a device.
#[derive(Debug, Clone, Default)]
pub struct ScriptedChannel {
    script: Arc<Mutex<Script>>,
}

impl ScriptedChannel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        match self.script.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Answer `command` (hex) with `response` (hex) immediately.
    pub fn expect(&self, command: &str, response: &str) -> &Self {
        self.expect_busy(command, 0, response)
    }

    /// Report busy `busy_polls` times before answering.
    pub fn expect_busy(&self, command: &str, busy_polls: u32, response: &str) -> &Self {
        self.push(Step {
            command: command.to_ascii_uppercase(),
            busy_polls,
            reply: Reply::Response(response.to_ascii_uppercase()),
        });
        self
    }

    /// Accept `command`, then fail every transfer as if unplugged.
    pub fn expect_disconnect(&self, command: &str) -> &Self {
        self.push(Step {
            command: command.to_ascii_uppercase(),
            busy_polls: 0,
            reply: Reply::Disconnect,
        });
        self
    }

    /// Fail the next OUT transfer with `message`.
    pub fn fail_next_write(&self, message: &str) -> &Self {
        self.script().write_failure = Some(message.to_string());
        self
    }

    fn push(&self, step: Step) {
        self.script().steps.push_back(step);
    }

    /// Every command written so far, as uppercase hex.
    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        self.script().sent.clone()
    }

    /// Steps not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.script().steps.len()
    }
}

impl ControlChannel for ScriptedChannel {
    fn control_out(&mut self, request: u8, data: &[u8]) -> ConsoleResult<usize> {
        let mut script = self.script();
        if request != usb::REQUEST_SEND {
            return Err(ConsoleError::TransportFailure(format!(
                "unexpected OUT request {request}"
            )));
        }
        if let Some(message) = script.write_failure.take() {
            return Err(ConsoleError::TransportFailure(message));
        }

        let command = bytes_to_hex(data);
        script.sent.push(command.clone());
        let step = script.steps.pop_front().ok_or_else(|| {
            ConsoleError::TransportFailure(format!("script exhausted at {command}"))
        })?;
        if step.command != command {
            return Err(ConsoleError::TransportFailure(format!(
                "expected command {}, got {command}",
                step.command
            )));
        }
        script.current = Some(step);
        Ok(data.len())
    }

    fn control_in(&mut self, request: u8, buf: &mut [u8]) -> ConsoleResult<usize> {
        let mut script = self.script();
        let step = script
            .current
            .as_mut()
            .ok_or_else(|| ConsoleError::TransportFailure("no command outstanding".to_string()))?;

        if matches!(step.reply, Reply::Disconnect) {
            return Err(ConsoleError::DeviceUnavailable("device disconnected".to_string()));
        }

        match request {
            usb::REQUEST_STATUS => {
                let Some(flag) = buf.first_mut() else {
                    return Ok(0);
                };
                if step.busy_polls > 0 {
                    step.busy_polls -= 1;
                    *flag = 1;
                } else {
                    *flag = 0;
                }
                Ok(1)
            }
            usb::REQUEST_RECEIVE => {
                let Some(Step {
                    reply: Reply::Response(hex),
                    ..
                }) = script.current.take()
                else {
                    return Ok(0);
                };
                let bytes = hex_to_bytes(&hex)?;
                let len = bytes.len().min(buf.len());
                buf[..len].copy_from_slice(&bytes[..len]);
                Ok(len)
            }
            other => Err(ConsoleError::TransportFailure(format!(
                "unexpected IN request {other}"
            ))),
        }
    }
}

/// Hands out clones of one [`ScriptedChannel`]; optionally refuses.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConnector {
    channel: ScriptedChannel,
    connects: Arc<AtomicU32>,
    unavailable: bool,
}

impl ScriptedConnector {
    #[must_use]
    pub fn new(channel: ScriptedChannel) -> Self {
        Self {
            channel,
            connects: Arc::new(AtomicU32::new(0)),
            unavailable: false,
        }
    }

    /// A connector with nothing plugged in.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Connector for ScriptedConnector {
    type Channel = ScriptedChannel;

    fn connect(&self) -> ConsoleResult<Self::Channel> {
        if self.unavailable {
            return Err(ConsoleError::DeviceUnavailable(
                "no scripted device attached".to_string(),
            ));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.channel.clone())
    }
}

/// Returns immediately and counts what it was asked to wait.
#[derive(Debug, Default)]
pub struct InstantPause {
    count: AtomicU32,
    total_ms: AtomicU64,
}

impl InstantPause {
    #[must_use]
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn total(&self) -> Duration {
        Duration::from_millis(self.total_ms.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl Pause for InstantPause {
    async fn pause(&self, duration: Duration) {
        self.count.fetch_add(1, Ordering::SeqCst);
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.total_ms.fetch_add(millis, Ordering::SeqCst);
    }
}

/// Clock stuck at one Unix timestamp.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn unix_time(&self) -> u64 {
        self.0
    }
}
