//! In-memory source.
//!
//! Behaves like a real session (validation, amplifier configuration, current
//! loadpoint) without any device attached.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use tracing::info;

use super::Source;
use crate::capabilities::{
    catalog, AmplifierSelection, CapabilityDescription, FrequencyMode, FrequencyRange, PhaseSpec,
    QuantityRange,
};
use crate::codec::{ErrorConditions, FirmwareVersion};
use crate::error::{MtsError, Result};
use crate::loadpoint::{ActiveLoadpoint, Loadpoint, LoadpointInfo};
use crate::units::{Current, Frequency, Voltage};
use crate::validation::validate;

/// Source without hardware, validating against a fixed capability.
pub struct SimulatedSource {
    capability: CapabilityDescription,
    amplifiers: OnceCell<AmplifierSelection>,
    loadpoint: RwLock<ActiveLoadpoint>,
}

impl SimulatedSource {
    /// Source with [`Self::default_capability`].
    pub fn new() -> Self {
        Self::with_capability(Self::default_capability())
    }

    /// Source validating against `capability`.
    pub fn with_capability(capability: CapabilityDescription) -> Self {
        Self {
            capability,
            amplifiers: OnceCell::new(),
            loadpoint: RwLock::new(ActiveLoadpoint::default()),
        }
    }

    /// 10..300 V and 0..60 A on every phase, 40..60 Hz synthetic.
    pub fn default_capability() -> CapabilityDescription {
        CapabilityDescription::symmetric(
            PhaseSpec {
                voltage: Some(QuantityRange::new(
                    Voltage::new(10.0),
                    Voltage::new(300.0),
                    Voltage::new(0.01),
                )),
                current: Some(QuantityRange::new(
                    Current::new(0.0),
                    Current::new(60.0),
                    Current::new(0.01),
                )),
            },
            FrequencyRange {
                min: Frequency::new(40.0),
                max: Frequency::new(60.0),
                precision: Frequency::new(0.1),
                mode: FrequencyMode::Synthetic,
            },
        )
    }

    fn configured_amplifiers(&self) -> Result<AmplifierSelection> {
        self.amplifiers
            .get()
            .copied()
            .ok_or_else(|| MtsError::Configuration("simulated source has no amplifiers configured".into()))
    }
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for SimulatedSource {
    async fn capabilities(&self) -> Result<CapabilityDescription> {
        Ok(self.capability.clone())
    }

    fn set_amplifiers(&self, amplifiers: AmplifierSelection) -> Result<()> {
        self.amplifiers
            .set(amplifiers)
            .map_err(|_| MtsError::AlreadyConfigured)
    }

    fn amplifiers(&self) -> Option<AmplifierSelection> {
        self.amplifiers.get().copied()
    }

    async fn set_loadpoint(&self, loadpoint: Loadpoint) -> Result<()> {
        validate(&loadpoint, &self.capability)?;
        self.loadpoint.write().unwrap_or_else(PoisonError::into_inner).activate(loadpoint);
        info!("simulated loadpoint applied");
        Ok(())
    }

    async fn turn_off(&self) -> Result<()> {
        self.loadpoint.write().unwrap_or_else(PoisonError::into_inner).deactivate();
        Ok(())
    }

    fn current_loadpoint(&self) -> Option<Loadpoint> {
        self.loadpoint
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .loadpoint()
            .cloned()
    }

    fn active_loadpoint_info(&self) -> LoadpointInfo {
        self.loadpoint.read().unwrap_or_else(PoisonError::into_inner).info()
    }

    async fn firmware_version(&self) -> Result<FirmwareVersion> {
        Ok(FirmwareVersion {
            model_name: "SIMULATED".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        })
    }

    async fn voltage_ranges(&self) -> Result<Vec<Voltage>> {
        catalog::voltage_ranges_for(self.configured_amplifiers()?.voltage)
    }

    async fn current_ranges(&self) -> Result<Vec<Current>> {
        catalog::current_ranges_for(self.configured_amplifiers()?.current)
    }

    async fn error_conditions(&self) -> Result<ErrorConditions> {
        Ok(ErrorConditions::default())
    }
}
