//! Single flight request coalescing.
//!
//! [`ResponseShare`] runs at most one production at a time. Calls arriving
//! while a production is in flight join it and receive the same outcome, so a
//! burst of identical polls costs a single device round trip. When the
//! production finishes the instance is idle again and the next call starts a
//! fresh one.
//!
//! # Example
//!
//! ```rust,ignore
//! let share = ResponseShare::new(move |()| {
//!     let source = source.clone();
//!     async move { source.poll_status().await }
//! });
//! let status = share.execute(()).await?;
//! ```

use std::{
    fmt,
    future::Future,
    sync::{Arc, Mutex, PoisonError},
};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::oneshot;
use tracing::trace;

use crate::error::{MtsError, Result};

type Producer<V, C> = dyn Fn(C) -> BoxFuture<'static, Result<V>> + Send + Sync;
type Pending<V> = Shared<BoxFuture<'static, Result<V>>>;
type Slot<V> = Arc<Mutex<Option<Pending<V>>>>;

/// Shares one in-flight production of `V` among concurrent callers.
///
/// `C` is the context handed to the producer by the call that starts a
/// production. Contexts of calls that join are ignored.
pub struct ResponseShare<V, C = ()> {
    producer: Arc<Producer<V, C>>,
    in_flight: Slot<V>,
}

impl<V, C> Clone for ResponseShare<V, C> {
    fn clone(&self) -> Self {
        Self {
            producer: Arc::clone(&self.producer),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<V, C> fmt::Debug for ResponseShare<V, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseShare")
            .field("busy", &lock(&self.in_flight).is_some())
            .finish()
    }
}

fn lock<V>(slot: &Slot<V>) -> std::sync::MutexGuard<'_, Option<Pending<V>>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Returns the instance to idle when the production task ends, even if the
/// producer panicked.
struct Release<V>(Slot<V>);

impl<V> Drop for Release<V> {
    fn drop(&mut self) {
        lock(&self.0).take();
    }
}

impl<V, C> ResponseShare<V, C>
where
    V: Clone + Send + Sync + 'static,
    C: Send + 'static,
{
    /// Wraps `producer`, which is called once per production.
    pub fn new<F, Fut>(producer: F) -> Self
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        Self {
            producer: Arc::new(move |context: C| producer(context).boxed()),
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    /// True while a production is running.
    pub fn is_busy(&self) -> bool {
        lock(&self.in_flight).is_some()
    }

    /// Joins the running production or starts a new one with `context`.
    ///
    /// The production runs on its own task, so it completes even if every
    /// caller stops waiting.
    pub async fn execute(&self, context: C) -> Result<V> {
        let (pending, launch) = {
            let mut slot = lock(&self.in_flight);
            match slot.as_ref() {
                Some(pending) => {
                    trace!("joining in-flight production");
                    (pending.clone(), None)
                }
                None => {
                    let (pending, launch) = self.prepare(context);
                    *slot = Some(pending.clone());
                    (pending, Some(launch))
                }
            }
        };
        // spawn only after the slot lock is released; a runtime that is
        // shutting down drops the task, and with it the Release, in place
        if let Some(launch) = launch {
            launch.spawn(Arc::clone(&self.in_flight));
        }
        pending.await
    }

    fn prepare(&self, context: C) -> (Pending<V>, Launch<V>) {
        let (tx, rx) = oneshot::channel();
        let launch = Launch {
            production: (self.producer)(context),
            tx,
        };
        let pending = async move {
            rx.await
                .unwrap_or_else(|_| Err(MtsError::Internal("shared production was aborted".into())))
        }
        .boxed()
        .shared();
        (pending, launch)
    }
}

/// A production that has been registered but not yet started.
struct Launch<V> {
    production: BoxFuture<'static, Result<V>>,
    tx: oneshot::Sender<Result<V>>,
}

impl<V: Send + Sync + 'static> Launch<V> {
    fn spawn(self, slot: Slot<V>) {
        let Launch { production, tx } = self;
        let release = Release(slot);
        tokio::spawn(async move {
            let result = production.await;
            drop(release);
            let _ = tx.send(result);
        });
    }
}
