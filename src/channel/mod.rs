//! Serial channel: one link, one command on the wire at a time.
//!
//! A [`SerialChannel`] is a cheap handle to a worker task that owns the
//! [`Transport`]. Callers submit jobs (one or more [`Request`]s) through a
//! queue and the worker runs them strictly FIFO. A job's requests are sent
//! back to back without any other job in between.
//!
//! A reply is complete when the request's terminator line arrives. If it does
//! not arrive before the timeout the job fails with `Timeout` and the link is
//! marked stale; the worker discards leftover input before the next command.
//!
//! If a caller stops waiting, the worker still reads the whole reply and
//! drops it. A job whose caller left before it started is skipped.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::codec::Request;
use crate::error::{MtsError, Result};

pub mod mock;
pub mod transport;

pub use mock::{CommandLog, DeviceMock, ScriptedMock};
pub use transport::{open_transport, MockType, StreamTransport, Transport, TransportSelection};

/// Default reply timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const QUEUE_CAPACITY: usize = 64;

type Replies = Vec<Vec<String>>;

struct Job {
    requests: Vec<Request>,
    respond_to: oneshot::Sender<Result<Replies>>,
}

/// Handle to the worker owning one device link.
#[derive(Clone, Debug)]
pub struct SerialChannel {
    jobs: mpsc::Sender<Job>,
    timeout: Duration,
}

impl SerialChannel {
    /// Starts the worker task for `transport`.
    ///
    /// Must be called inside a tokio runtime. The worker stops once every
    /// handle is dropped.
    pub fn spawn(transport: Box<dyn Transport>, timeout: Duration) -> Self {
        let (jobs, rx) = mpsc::channel(QUEUE_CAPACITY);
        let worker = ChannelWorker {
            transport,
            timeout,
            stale: false,
        };
        tokio::spawn(worker.run(rx));
        Self { jobs, timeout }
    }

    /// Opens the selected transport and starts a worker for it.
    pub async fn open(selection: &TransportSelection, timeout: Duration) -> Result<Self> {
        let transport = open_transport(selection).await?;
        Ok(Self::spawn(transport, timeout))
    }

    /// Time a command may wait for its terminator.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sends one command and returns its reply lines, terminator included.
    pub async fn execute(&self, request: Request) -> Result<Vec<String>> {
        let mut replies = self.submit(vec![request]).await.map_err(|err| match err {
            MtsError::Step { source, .. } => *source,
            other => other,
        })?;
        replies
            .pop()
            .ok_or_else(|| MtsError::Internal("channel returned no reply".into()))
    }

    /// Runs `requests` in order as one uninterrupted exchange.
    ///
    /// # Errors
    ///
    /// The first failing request aborts the rest and is reported as `Step`
    /// with its index and command line.
    pub async fn execute_all(&self, requests: Vec<Request>) -> Result<Replies> {
        self.submit(requests).await
    }

    async fn submit(&self, requests: Vec<Request>) -> Result<Replies> {
        let (respond_to, response) = oneshot::channel();
        self.jobs
            .send(Job {
                requests,
                respond_to,
            })
            .await
            .map_err(|_| MtsError::Internal("serial channel worker has stopped".into()))?;
        response
            .await
            .map_err(|_| MtsError::Internal("serial channel worker dropped the request".into()))?
    }
}

struct ChannelWorker {
    transport: Box<dyn Transport>,
    timeout: Duration,
    stale: bool,
}

impl ChannelWorker {
    async fn run(mut self, mut jobs: mpsc::Receiver<Job>) {
        info!("serial channel worker started");

        while let Some(job) = jobs.recv().await {
            if job.respond_to.is_closed() {
                debug!(commands = job.requests.len(), "caller gone, skipping job");
                continue;
            }
            let result = self.run_job(&job.requests).await;
            if job.respond_to.send(result).is_err() {
                debug!("caller gone, reply discarded");
            }
        }

        info!("serial channel worker stopped");
    }

    async fn run_job(&mut self, requests: &[Request]) -> Result<Replies> {
        let mut replies = Vec::with_capacity(requests.len());
        for (index, request) in requests.iter().enumerate() {
            match self.exchange(request).await {
                Ok(reply) => replies.push(reply),
                Err(source) => {
                    return Err(MtsError::Step {
                        index,
                        command: request.command.clone(),
                        source: Box::new(source),
                    })
                }
            }
        }
        Ok(replies)
    }

    async fn exchange(&mut self, request: &Request) -> Result<Vec<String>> {
        if self.stale {
            self.transport.discard_pending().await?;
            self.stale = false;
        }

        debug!(command = %request.command, "send");
        if let Err(err) = self.transport.write_line(&request.command).await {
            self.stale = true;
            return Err(err);
        }

        let deadline = Instant::now() + self.timeout;
        let mut reply = Vec::new();
        loop {
            match timeout_at(deadline, self.transport.read_line()).await {
                Ok(Ok(line)) => {
                    let done = line == request.terminator;
                    reply.push(line);
                    if done {
                        break;
                    }
                }
                Ok(Err(err)) => {
                    self.stale = true;
                    return Err(err);
                }
                Err(_) => {
                    self.stale = true;
                    warn!(command = %request.command, lines = reply.len(), "reply timed out");
                    return Err(MtsError::Timeout {
                        command: request.command.clone(),
                        timeout: self.timeout,
                    });
                }
            }
        }

        debug!(command = %request.command, reply = ?reply, "received");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(mock: ScriptedMock, timeout_ms: u64) -> SerialChannel {
        SerialChannel::spawn(Box::new(mock), Duration::from_millis(timeout_ms))
    }

    #[tokio::test]
    async fn returns_lines_up_to_terminator() {
        let mock = ScriptedMock::new().reply("AAV", ["MT786V06.08", "AAVACK"]);
        let channel = channel(mock, 500);
        let reply = channel.execute(Request::new("AAV", "AAVACK")).await.unwrap();
        assert_eq!(reply, vec!["MT786V06.08", "AAVACK"]);
    }

    #[tokio::test]
    async fn unexpected_lines_are_passed_through() {
        let mock = ScriptedMock::new().reply("AME", ["noise", "42", "AMEACK"]);
        let reply = channel(mock, 500).execute(Request::new("AME", "AMEACK")).await.unwrap();
        assert_eq!(reply, vec!["noise", "42", "AMEACK"]);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_leaves_channel_usable() {
        let mock = ScriptedMock::new()
            .reply("SILENT", ["partial"])
            .reply("ATI01", ["ATIACK"]);
        let log = mock.log();
        let channel = channel(mock, 100);
        assert_eq!(channel.timeout(), Duration::from_millis(100));

        let err = channel.execute(Request::new("SILENT", "SOK")).await.unwrap_err();
        assert!(matches!(err, MtsError::Timeout { ref command, .. } if command == "SILENT"));

        let reply = channel.execute(Request::new("ATI01", "ATIACK")).await.unwrap();
        assert_eq!(reply, vec!["ATIACK"]);
        assert_eq!(log.commands(), vec!["SILENT", "ATI01"]);
    }

    #[tokio::test(start_paused = true)]
    async fn execute_all_stops_at_first_failure() {
        let mock = ScriptedMock::new()
            .reply("A", ["AOK"])
            .reply("C", ["COK"]);
        let log = mock.log();
        let channel = channel(mock, 50);

        let err = channel
            .execute_all(vec![
                Request::new("A", "AOK"),
                Request::new("B", "BOK"),
                Request::new("C", "COK"),
            ])
            .await
            .unwrap_err();

        match &err {
            MtsError::Step { index, command, .. } => {
                assert_eq!(*index, 1);
                assert_eq!(command, "B");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.is_timeout());
        assert_eq!(log.commands(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn concurrent_callers_are_serialized() {
        let mut mock = ScriptedMock::new().with_delay(Duration::from_millis(5));
        for n in 0..10 {
            mock = mock.reply(&format!("CMD{n}"), [format!("R{n}"), format!("ACK{n}")]);
        }
        let log = mock.log();
        let channel = channel(mock, 1_000);

        let calls = (0..10).map(|n| {
            let channel = channel.clone();
            async move {
                channel
                    .execute(Request::new(format!("CMD{n}"), format!("ACK{n}")))
                    .await
            }
        });
        let replies = futures::future::join_all(calls).await;

        for (n, reply) in replies.into_iter().enumerate() {
            assert_eq!(reply.unwrap(), vec![format!("R{n}"), format!("ACK{n}")]);
        }
        assert_eq!(log.commands().len(), 10);
    }

    #[tokio::test]
    async fn abandoned_call_does_not_leak_reply() {
        let mock = ScriptedMock::new()
            .with_delay(Duration::from_millis(20))
            .reply("SLOW", ["SLOWACK"])
            .reply("NEXT", ["NEXTACK"]);
        let channel = channel(mock, 1_000);

        let slow = tokio::time::timeout(
            Duration::from_millis(5),
            channel.execute(Request::new("SLOW", "SLOWACK")),
        )
        .await;
        assert!(slow.is_err());

        let reply = channel.execute(Request::new("NEXT", "NEXTACK")).await.unwrap();
        assert_eq!(reply, vec!["NEXTACK"]);
    }
}
