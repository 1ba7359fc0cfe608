//! Energy dosage.
//!
//! A dosage lets the source run until the reference meter has counted the
//! impulses for a requested energy, then switches the current off:
//!
//! ```text
//! impulses = energy [Wh] / 1000 * meter constant [imp/kWh]
//! ```
//!
//! In dosage mode the current stays off until [`Dosage::start_dosage`].
//! [`SimulatedDosage`] integrates the active power of the source loadpoint
//! over time instead of counting real impulses.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{MtsError, Result};
use crate::retry::{spawn_retry, Attempt, RetryHandle, RetryPolicy};
use crate::source::Source;
use crate::units::{ActiveEnergy, ActivePower, Impulses, MeterConstant, Time};

/// Delay between two attempts to announce a missing source.
pub const NO_SOURCE_INTERVAL: Duration = Duration::from_secs(1);

/// State of a dosage, in energies for one meter constant.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DosageProgress {
    /// True while impulses are still being counted.
    pub active: bool,
    /// Energy still to go.
    pub remaining: ActiveEnergy,
    /// Energy delivered so far.
    pub progress: ActiveEnergy,
    /// Requested energy.
    pub total: ActiveEnergy,
}

/// Dosage control of a source.
#[async_trait]
pub trait Dosage: Send + Sync {
    /// Enters or leaves dosage mode. Entering switches the current off.
    async fn set_dosage_mode(&self, on: bool) -> Result<()>;

    /// Sets the energy to deliver, counted with `meter_constant`.
    async fn set_dosage_energy(&self, energy: ActiveEnergy, meter_constant: MeterConstant) -> Result<()>;

    /// Switches the current on and starts counting.
    async fn start_dosage(&self) -> Result<()>;

    /// Stops a running dosage and leaves dosage mode.
    async fn cancel_dosage(&self) -> Result<()>;

    /// Progress expressed for `meter_constant`.
    async fn dosage_progress(&self, meter_constant: MeterConstant) -> Result<DosageProgress>;

    /// True if dosage mode holds the current off while waiting for a start.
    async fn current_switched_off_for_dosage(&self) -> Result<bool>;

    /// Tells the dosage device that no source is attached to it.
    async fn announce_no_source(&self) -> Result<()>;
}

/// Announces the missing source in the background until the device takes
/// note.
///
/// Timeouts are retried every [`NO_SOURCE_INTERVAL`]; any other error means
/// the device does not support the notice and ends the task. Dropping the
/// handle stops the retries.
pub fn spawn_no_source_notice(dosage: Arc<dyn Dosage>) -> RetryHandle {
    spawn_retry("dosage-no-source", RetryPolicy::forever(NO_SOURCE_INTERVAL), move || {
        let dosage = Arc::clone(&dosage);
        async move {
            dosage.announce_no_source().await?;
            Ok(Attempt::Finished)
        }
    })
}

#[derive(Debug, Clone, Copy)]
struct Run {
    started: Instant,
    power: ActivePower,
}

#[derive(Debug, Default)]
struct DosageState {
    mode: bool,
    target: Option<(Impulses, MeterConstant)>,
    run: Option<Run>,
    /// Impulses counted by the last run that was cancelled.
    delivered: Impulses,
    source_attached: bool,
}

impl DosageState {
    fn counted(&self, now: Instant) -> Impulses {
        match (self.run, self.target) {
            (Some(run), Some((target, constant))) => {
                let elapsed = Time::new(now.duration_since(run.started).as_secs_f64());
                let impulses = f64::from((run.power * elapsed) * constant);
                Impulses::new(impulses.min(f64::from(target)))
            }
            _ => self.delivered,
        }
    }

    fn is_running(&self, now: Instant) -> bool {
        match (self.run, self.target) {
            (Some(_), Some((target, _))) => self.counted(now) < target,
            _ => false,
        }
    }
}

/// Dosage driven by the loadpoint of a [`Source`].
///
/// The active power at start is taken as constant for the whole run.
pub struct SimulatedDosage {
    source: Arc<dyn Source>,
    state: Mutex<DosageState>,
}

impl SimulatedDosage {
    /// Dosage for the loadpoints of `source`.
    pub fn new(source: Arc<dyn Source>) -> Self {
        Self {
            source,
            state: Mutex::new(DosageState {
                source_attached: true,
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, DosageState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Dosage for SimulatedDosage {
    async fn set_dosage_mode(&self, on: bool) -> Result<()> {
        let mut state = self.state();
        state.mode = on;
        state.run = None;
        debug!(on, "dosage mode");
        Ok(())
    }

    async fn set_dosage_energy(&self, energy: ActiveEnergy, meter_constant: MeterConstant) -> Result<()> {
        let (wh, constant) = (f64::from(energy), f64::from(meter_constant));
        if !wh.is_finite() || wh < 0.0 {
            return Err(MtsError::Configuration(format!("invalid dosage energy {energy}")));
        }
        if !constant.is_finite() || constant <= 0.0 {
            return Err(MtsError::Configuration(format!("invalid meter constant {meter_constant}")));
        }

        let mut state = self.state();
        if state.is_running(Instant::now()) {
            return Err(MtsError::InvalidState("dosage is running".into()));
        }
        state.target = Some((energy * meter_constant, meter_constant));
        state.run = None;
        state.delivered = Impulses::new(0.0);
        Ok(())
    }

    async fn start_dosage(&self) -> Result<()> {
        let loadpoint = self.source.current_loadpoint();
        let mut state = self.state();
        if !state.source_attached {
            return Err(MtsError::InvalidState("no source attached".into()));
        }
        if state.target.is_none() {
            return Err(MtsError::InvalidState("dosage energy not set".into()));
        }
        let loadpoint = loadpoint.ok_or_else(|| MtsError::InvalidState("no loadpoint active".into()))?;

        let power = loadpoint.active_power().abs();
        state.mode = false;
        state.delivered = Impulses::new(0.0);
        state.run = Some(Run {
            started: Instant::now(),
            power,
        });
        info!(%power, "dosage started");
        Ok(())
    }

    async fn cancel_dosage(&self) -> Result<()> {
        let mut state = self.state();
        state.delivered = state.counted(Instant::now());
        state.run = None;
        state.mode = false;
        info!(delivered = %state.delivered, "dosage cancelled");
        Ok(())
    }

    async fn dosage_progress(&self, meter_constant: MeterConstant) -> Result<DosageProgress> {
        if f64::from(meter_constant) <= 0.0 {
            return Err(MtsError::Configuration(format!("invalid meter constant {meter_constant}")));
        }

        let state = self.state();
        let Some((target, _)) = state.target else {
            return Ok(DosageProgress::default());
        };
        let now = Instant::now();
        let total = target / meter_constant;
        let progress = state.counted(now) / meter_constant;
        Ok(DosageProgress {
            active: state.is_running(now),
            remaining: total - progress,
            progress,
            total,
        })
    }

    async fn current_switched_off_for_dosage(&self) -> Result<bool> {
        let state = self.state();
        Ok(state.mode && state.run.is_none())
    }

    async fn announce_no_source(&self) -> Result<()> {
        let mut state = self.state();
        state.source_attached = false;
        state.run = None;
        info!("dosage runs without source");
        Ok(())
    }
}
