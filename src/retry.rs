//! Cancellable background retries.
//!
//! [`spawn_retry`] runs an attempt on its own task until it reports
//! completion, fails with a non-retryable error, or runs out of attempts.
//! Timeouts count as retryable. The returned [`RetryHandle`] cancels the task
//! and waits for it, so shutdown never leaves a detached loop behind.

use std::{future::Future, time::Duration};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{MtsError, Result};

/// Defines a policy for retrying an operation.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Maximum number of attempts, `None` to retry until cancelled.
    pub max_attempts: Option<u32>,
    /// The delay between attempts.
    pub backoff_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(3),
            backoff_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Retry every `interval` until cancelled.
    pub fn forever(interval: Duration) -> Self {
        Self {
            max_attempts: None,
            backoff_delay: interval,
        }
    }
}

/// What one attempt found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// Nothing left to do.
    Finished,
    /// Try again after the backoff delay.
    Again,
}

/// How a retry task ended.
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub enum RetryOutcome {
    Succeeded { attempts: u32 },
    Failed { attempts: u32, error: MtsError },
    Exhausted { attempts: u32 },
    Cancelled { attempts: u32 },
}

/// Owner of a running retry task.
#[derive(Debug)]
pub struct RetryHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<RetryOutcome>,
}

impl RetryHandle {
    /// True once the task has ended, for whatever reason.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the task to end on its own.
    pub async fn join(self) -> RetryOutcome {
        let RetryHandle { cancel, task } = self;
        let outcome = await_task(task).await;
        drop(cancel);
        outcome
    }

    /// Cancels the task and waits until it has stopped.
    pub async fn shutdown(self) -> RetryOutcome {
        let _ = self.cancel.send(true);
        await_task(self.task).await
    }
}

async fn await_task(task: JoinHandle<RetryOutcome>) -> RetryOutcome {
    task.await.unwrap_or_else(|e| RetryOutcome::Failed {
        attempts: 0,
        error: MtsError::Internal(format!("retry task failed: {e}")),
    })
}

/// Spawns `attempt` on a background task under `policy`.
///
/// # Arguments
/// * `name` - Label used in log messages
/// * `policy` - Attempt limit and delay between attempts
/// * `attempt` - Produces one attempt; `Err` with a timeout is retried, any
///   other error ends the task
pub fn spawn_retry<F, Fut>(name: &str, policy: RetryPolicy, mut attempt: F) -> RetryHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Attempt>> + Send + 'static,
{
    let (cancel, mut cancelled) = watch::channel(false);
    let name = name.to_string();

    let task = tokio::spawn(async move {
        let mut attempts = 0;
        loop {
            if *cancelled.borrow() {
                return RetryOutcome::Cancelled { attempts };
            }
            attempts += 1;

            let result = tokio::select! {
                result = attempt() => result,
                _ = cancelled.changed() => {
                    debug!(task = %name, attempts, "cancelled during attempt");
                    return RetryOutcome::Cancelled { attempts };
                }
            };

            match result {
                Ok(Attempt::Finished) => {
                    info!(task = %name, attempts, "retry task finished");
                    return RetryOutcome::Succeeded { attempts };
                }
                Ok(Attempt::Again) => debug!(task = %name, attempts, "attempt asks for another round"),
                Err(error) if error.is_timeout() => debug!(task = %name, attempts, %error, "attempt timed out"),
                Err(error) => {
                    warn!(task = %name, attempts, %error, "retry task failed");
                    return RetryOutcome::Failed { attempts, error };
                }
            }

            if policy.max_attempts.is_some_and(|max| attempts >= max) {
                warn!(task = %name, attempts, "retry attempts exhausted");
                return RetryOutcome::Exhausted { attempts };
            }

            tokio::select! {
                _ = sleep(policy.backoff_delay) => {}
                _ = cancelled.changed() => return RetryOutcome::Cancelled { attempts },
            }
        }
    });

    RetryHandle { cancel, task }
}
