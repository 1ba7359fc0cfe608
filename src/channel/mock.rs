//! Mock transports
//!
//! Stand-ins for hardware so the channel, executors and CLI can run without a
//! device attached.
//!
//! # Available Mocks
//!
//! - `ScriptedMock` - fixed replies per command, silent for anything else
//! - `DeviceMock` - emulates an MT768 or FG30x source well enough for a
//!   complete session
//!
//! Reading with nothing queued never completes, like a silent device, so the
//! channel timeout applies.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::trace;

use super::transport::Transport;
use crate::codec::DeviceFamily;
use crate::error::Result;

/// Voltage ranges reported by the MT mock.
pub const MT_VOLTAGE_RANGES: [f64; 6] = [0.25, 5.0, 60.0, 125.0, 250.0, 420.0];
/// Current ranges reported by the MT mock.
pub const MT_CURRENT_RANGES: [f64; 12] = [
    0.02, 0.05, 0.1, 0.2, 0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0,
];

/// Shared record of every line written to a mock.
#[derive(Debug, Clone, Default)]
pub struct CommandLog(Arc<Mutex<Vec<String>>>);

impl CommandLog {
    fn push(&self, line: &str) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }

    /// Every command written so far, oldest first.
    pub fn commands(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Forgets the recorded commands.
    pub fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

async fn next_queued(queue: &mut VecDeque<String>) -> Result<String> {
    match queue.pop_front() {
        Some(line) => Ok(line),
        None => std::future::pending::<Result<String>>().await,
    }
}

/// Mock answering a fixed set of commands with canned lines.
///
/// # Example
///
/// ```rust,ignore
/// let mock = ScriptedMock::new().reply("ATI01", ["ATIACK"]);
/// ```
#[derive(Debug, Default)]
pub struct ScriptedMock {
    replies: HashMap<String, Vec<String>>,
    queue: VecDeque<String>,
    log: CommandLog,
    delay: Option<Duration>,
}

impl ScriptedMock {
    /// Mock without any scripted reply.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `command` with `lines`.
    pub fn reply<I, S>(mut self, command: &str, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.replies
            .insert(command.to_string(), lines.into_iter().map(Into::into).collect());
        self
    }

    /// Delay every reply line by `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Handle on the commands this mock receives.
    pub fn log(&self) -> CommandLog {
        self.log.clone()
    }
}

#[async_trait]
impl Transport for ScriptedMock {
    async fn write_line(&mut self, line: &str) -> Result<()> {
        self.log.push(line);
        if let Some(lines) = self.replies.get(line) {
            self.queue.extend(lines.iter().cloned());
        }
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String> {
        if let Some(delay) = self.delay {
            sleep(delay).await;
        }
        next_queued(&mut self.queue).await
    }

    async fn discard_pending(&mut self) -> Result<()> {
        self.queue.clear();
        Ok(())
    }
}

/// Emulated source of one device family.
///
/// Accepts every well formed source command, reports a fixed firmware and,
/// for MT, the ranges in [`MT_VOLTAGE_RANGES`] and [`MT_CURRENT_RANGES`].
#[derive(Debug)]
pub struct DeviceMock {
    family: DeviceFamily,
    queue: VecDeque<String>,
    log: CommandLog,
    status_bits: u32,
    delay: Option<Duration>,
}

impl DeviceMock {
    /// Healthy device of `family` answering immediately.
    pub fn new(family: DeviceFamily) -> Self {
        Self {
            family,
            queue: VecDeque::new(),
            log: CommandLog::default(),
            status_bits: 0,
            delay: None,
        }
    }

    /// Status bits reported by the error condition query.
    pub fn with_status(mut self, bits: u32) -> Self {
        self.status_bits = bits;
        self
    }

    /// Emulated processing time per reply line.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Handle on the commands this mock receives.
    pub fn log(&self) -> CommandLog {
        self.log.clone()
    }

    fn respond(&self, command: &str) -> Vec<String> {
        match self.family {
            DeviceFamily::Mt => self.respond_mt(command),
            DeviceFamily::Fg => self.respond_fg(command),
        }
    }

    fn respond_mt(&self, command: &str) -> Vec<String> {
        let ranges = |values: &[f64], ack: &str| {
            let mut lines: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            lines.push(ack.to_string());
            lines
        };
        match command {
            "AAV" => vec!["MT786V06.08".into(), "AAVACK".into()],
            "ATI01" => vec!["ATIACK".into()],
            "AVI" => ranges(&MT_VOLTAGE_RANGES[..], "AVIACK"),
            "AII" => ranges(&MT_CURRENT_RANGES[..], "AIIACK"),
            "SSM" => vec![format!("SM{:04X}", self.status_bits), "SOKSM".into()],
            _ => source_ack(command.strip_prefix('S'), "SOK"),
        }
    }

    fn respond_fg(&self, command: &str) -> Vec<String> {
        match command {
            "TS" => vec!["FG301V2.09".into(), "OKTS".into()],
            "SM" => vec![format!("SM{:04X}", self.status_bits), "OKSM".into()],
            _ => source_ack(Some(command), "OK"),
        }
    }
}

/// Acknowledges `FR`, `UP`, `IP` and `UI` commands.
fn source_ack(body: Option<&str>, ok: &str) -> Vec<String> {
    let code = body.filter(|b| b.len() > 2).and_then(|b| b.get(..2));
    match code {
        Some(code @ ("FR" | "UP" | "IP" | "UI")) => vec![format!("{ok}{code}")],
        _ => Vec::new(),
    }
}

#[async_trait]
impl Transport for DeviceMock {
    async fn write_line(&mut self, line: &str) -> Result<()> {
        self.log.push(line);
        let reply = self.respond(line);
        trace!(command = line, lines = reply.len(), "mock reply");
        self.queue.extend(reply);
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String> {
        if let Some(delay) = self.delay {
            sleep(delay).await;
        }
        next_queued(&mut self.queue).await
    }

    async fn discard_pending(&mut self) -> Result<()> {
        self.queue.clear();
        Ok(())
    }
}
