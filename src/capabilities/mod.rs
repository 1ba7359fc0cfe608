//! Capability descriptions of source hardware.
//!
//! A [`CapabilityDescription`] is the operating envelope a configured source
//! accepts: one [`PhaseSpec`] per phase and one [`FrequencyRange`]. The
//! [`catalog`] builds them from the voltage and current amplifiers fitted to a
//! device.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::units::{Current, Frequency, Voltage};

pub mod amplifiers;
pub mod catalog;

pub use amplifiers::{AmplifierSelection, CurrentAmplifier, ReferenceMeter, VoltageAmplifier};

/// Closed interval `[min, max]` with the smallest settable step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct QuantityRange<T> {
    pub min: T,
    pub max: T,
    pub precision: T,
}

impl<T: PartialOrd + Copy> QuantityRange<T> {
    /// Range from `min` to `max` settable in steps of `precision`.
    pub const fn new(min: T, max: T, precision: T) -> Self {
        Self { min, max, precision }
    }

    /// Inclusive at both ends.
    pub fn contains(&self, value: T) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Voltage and current envelope of a single phase.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PhaseSpec {
    /// `None` if the phase has no voltage output.
    pub voltage: Option<QuantityRange<Voltage>>,
    /// `None` if the phase has no current output.
    pub current: Option<QuantityRange<Current>>,
}

/// How the output frequency is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrequencyMode {
    /// Generated internally by the source.
    Synthetic,
    /// Locked to the mains supply.
    GridSynchronous,
    /// Direct current output.
    Direct,
}

impl fmt::Display for FrequencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FrequencyMode::Synthetic => "SYNTHETIC",
            FrequencyMode::GridSynchronous => "GRID_SYNCHRONOUS",
            FrequencyMode::Direct => "DIRECT",
        };
        f.write_str(text)
    }
}

/// Settable frequencies and how they are produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct FrequencyRange {
    pub min: Frequency,
    pub max: Frequency,
    pub precision: Frequency,
    pub mode: FrequencyMode,
}

impl FrequencyRange {
    /// Inclusive at both ends.
    pub fn contains(&self, value: Frequency) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Envelope of a symmetric three phase source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescription {
    /// L1, L2, L3.
    pub phases: [PhaseSpec; 3],
    /// Accepted output frequency.
    pub frequency: FrequencyRange,
}

impl CapabilityDescription {
    /// Replicates one phase spec onto all three phases.
    pub fn symmetric(phase: PhaseSpec, frequency: FrequencyRange) -> Self {
        Self {
            phases: [phase; 3],
            frequency,
        }
    }
}
