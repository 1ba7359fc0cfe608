//! Reference meter.
//!
//! The reference meter measures what the source actually puts out. Its
//! impulse output is what a dosage counts. [`SimulatedRefMeter`] derives the
//! readings from the loadpoint of a [`Source`] and adds a little noise.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::capabilities::ReferenceMeter;
use crate::error::{MtsError, Result};
use crate::loadpoint::Loadpoint;
use crate::source::Source;
use crate::units::{
    ActivePower, Angle, ApparentPower, Current, Frequency, MeterConstant, PowerFactor, ReactivePower, Voltage,
};

/// Meter constant of the simulated reference meter output.
pub const SIMULATED_METER_CONSTANT: MeterConstant = MeterConstant::new(1_000_000.0);

/// Wiring and quantity a reference meter integrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum MeasurementMode {
    FourWireActivePower,
    FourWireReactivePower,
    FourWireApparentPower,
    ThreeWireActivePower,
    ThreeWireReactivePower,
    ThreeWireApparentPower,
}

impl MeasurementMode {
    /// Every mode, in declaration order.
    pub const ALL: &'static [MeasurementMode] = &[
        MeasurementMode::FourWireActivePower,
        MeasurementMode::FourWireReactivePower,
        MeasurementMode::FourWireApparentPower,
        MeasurementMode::ThreeWireActivePower,
        MeasurementMode::ThreeWireReactivePower,
        MeasurementMode::ThreeWireApparentPower,
    ];
}

/// Readings of one phase.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct MeasuredPhase {
    pub voltage: Voltage,
    pub voltage_angle: Angle,
    pub current: Current,
    pub current_angle: Angle,
    pub active_power: ActivePower,
    pub reactive_power: ReactivePower,
    pub apparent_power: ApparentPower,
    /// `None` while the phase carries no power.
    pub power_factor: Option<PowerFactor>,
}

/// Readings of all phases plus totals.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct MeasuredLoadpoint {
    pub frequency: Frequency,
    pub phases: [MeasuredPhase; 3],
    pub active_power: ActivePower,
    pub reactive_power: ReactivePower,
    pub apparent_power: ApparentPower,
}

impl MeasuredLoadpoint {
    /// What an ideal meter reads for `loadpoint`.
    ///
    /// Switched off channels read zero. `jitter` is applied to every voltage
    /// and current magnitude before the powers are derived from them.
    pub fn from_loadpoint(loadpoint: &Loadpoint, mut jitter: impl FnMut(f64) -> f64) -> Self {
        let mut measured = MeasuredLoadpoint {
            frequency: loadpoint.frequency.value,
            ..Default::default()
        };

        for (phase, target) in measured.phases.iter_mut().zip(loadpoint.phases.iter()) {
            if target.voltage.on {
                phase.voltage = Voltage::new(jitter(f64::from(target.voltage.rms)));
                phase.voltage_angle = target.voltage.angle;
            }
            if target.current.on {
                phase.current = Current::new(jitter(f64::from(target.current.rms)));
                phase.current_angle = target.current.angle;
            }

            let apparent = phase.voltage * phase.current;
            let shift = phase.voltage_angle - phase.current_angle;
            phase.apparent_power = apparent;
            phase.active_power = apparent.active_power(shift);
            phase.reactive_power = apparent.reactive_power(shift);
            phase.power_factor = phase.active_power / apparent;
        }

        measured.active_power = measured.phases.iter().map(|p| p.active_power).sum();
        measured.reactive_power = measured.phases.iter().map(|p| p.reactive_power).sum();
        measured.apparent_power = measured.phases.iter().map(|p| p.apparent_power).sum();
        measured
    }

    /// Rotates all angles so that the voltage of `phase` sits at 0.
    pub fn relative_to(mut self, phase: usize) -> Result<Self> {
        let reference = self
            .phases
            .get(phase)
            .map(|p| p.voltage_angle)
            .ok_or_else(|| MtsError::Configuration(format!("no phase {phase}, expected 0..=2")))?;
        for p in &mut self.phases {
            p.voltage_angle = (p.voltage_angle - reference).normalize();
            p.current_angle = (p.current_angle - reference).normalize();
        }
        Ok(self)
    }
}

/// Identification of a reference meter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceMeterInformation {
    /// Catalog model, shared by all variants of one meter.
    pub model: String,
    /// Variant as fitted.
    pub meter: ReferenceMeter,
    /// Number of measured phases.
    pub number_of_phases: u8,
    /// Firmware version of the meter.
    pub software_version: String,
}

/// A reference meter session.
#[async_trait]
pub trait RefMeter: Send + Sync {
    /// Whether the meter can currently be queried.
    fn is_available(&self) -> bool {
        true
    }

    /// Modes the meter can switch to.
    async fn measurement_modes(&self) -> Result<Vec<MeasurementMode>>;

    /// Mode in use, `None` if the meter cannot tell.
    async fn actual_measurement_mode(&self) -> Result<Option<MeasurementMode>>;

    /// Switches the meter to `mode`.
    async fn set_actual_measurement_mode(&self, mode: MeasurementMode) -> Result<()>;

    /// Impulses per kWh on the meter output.
    async fn meter_constant(&self) -> Result<MeterConstant>;

    /// Current readings.
    ///
    /// With `first_active_voltage_phase` all angles are given relative to the
    /// voltage of that phase.
    async fn actual_values(&self, first_active_voltage_phase: Option<usize>) -> Result<MeasuredLoadpoint>;

    /// Model and firmware of the meter.
    async fn meter_information(&self) -> Result<ReferenceMeterInformation>;
}

/// Reference meter reading back the loadpoint of a [`Source`].
pub struct SimulatedRefMeter {
    source: Arc<dyn Source>,
    meter: ReferenceMeter,
    mode: Mutex<MeasurementMode>,
    deviation_percent: f64,
}

impl SimulatedRefMeter {
    /// Meter of type `meter` watching `source`, with 0.01 % noise.
    pub fn new(source: Arc<dyn Source>, meter: ReferenceMeter) -> Self {
        Self {
            source,
            meter,
            mode: Mutex::new(MeasurementMode::FourWireActivePower),
            deviation_percent: 0.01,
        }
    }

    /// Replaces the relative noise on magnitudes, in percent.
    pub fn with_deviation(mut self, percent: f64) -> Self {
        self.deviation_percent = percent.abs();
        self
    }

    fn jitter(&self) -> impl FnMut(f64) -> f64 {
        let percent = self.deviation_percent;
        let mut rng = rand::thread_rng();
        move |value| {
            let deviation = value.abs() * percent / 100.0;
            if deviation > 0.0 {
                value + rng.gen_range(-deviation..=deviation)
            } else {
                value
            }
        }
    }
}

#[async_trait]
impl RefMeter for SimulatedRefMeter {
    async fn measurement_modes(&self) -> Result<Vec<MeasurementMode>> {
        Ok(MeasurementMode::ALL.to_vec())
    }

    async fn actual_measurement_mode(&self) -> Result<Option<MeasurementMode>> {
        Ok(Some(*self.mode.lock().unwrap_or_else(PoisonError::into_inner)))
    }

    async fn set_actual_measurement_mode(&self, mode: MeasurementMode) -> Result<()> {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner) = mode;
        debug!(?mode, "measurement mode changed");
        Ok(())
    }

    async fn meter_constant(&self) -> Result<MeterConstant> {
        Ok(SIMULATED_METER_CONSTANT)
    }

    async fn actual_values(&self, first_active_voltage_phase: Option<usize>) -> Result<MeasuredLoadpoint> {
        let measured = match self.source.current_loadpoint() {
            Some(loadpoint) => MeasuredLoadpoint::from_loadpoint(&loadpoint, self.jitter()),
            None => MeasuredLoadpoint::default(),
        };
        match first_active_voltage_phase {
            Some(phase) => measured.relative_to(phase),
            None => Ok(measured),
        }
    }

    async fn meter_information(&self) -> Result<ReferenceMeterInformation> {
        Ok(ReferenceMeterInformation {
            model: self.meter.catalog_key().to_string(),
            meter: self.meter,
            number_of_phases: 3,
            software_version: env!("CARGO_PKG_VERSION").into(),
        })
    }
}
