//! Source devices.
//!
//! A [`Source`] is one logical power source session. It owns the session
//! state (current loadpoint, amplifier selection) and turns caller requests
//! into validated, encoded command sequences.
//!
//! # Implementations
//!
//! - [`SerialPortSource`] - MT768 or FG30x hardware behind a [`SerialChannel`]
//! - [`SimulatedSource`] - in-memory source for demos and tests
//!
//! [`SerialChannel`]: crate::channel::SerialChannel

use async_trait::async_trait;

use crate::capabilities::{AmplifierSelection, CapabilityDescription};
use crate::codec::{ErrorConditions, FirmwareVersion};
use crate::error::Result;
use crate::loadpoint::{Loadpoint, LoadpointInfo};
use crate::units::{Current, Voltage};

pub mod serial;
pub mod simulated;

pub use serial::SerialPortSource;
pub use simulated::SimulatedSource;

/// One power source session.
#[async_trait]
pub trait Source: Send + Sync {
    /// Whether the device can currently accept commands.
    fn is_available(&self) -> bool {
        true
    }

    /// Operating envelope of the configured hardware.
    async fn capabilities(&self) -> Result<CapabilityDescription>;

    /// Records the fitted amplifiers. Allowed once per session.
    ///
    /// # Errors
    ///
    /// `AlreadyConfigured` on a second call; the first selection is kept.
    fn set_amplifiers(&self, amplifiers: AmplifierSelection) -> Result<()>;

    /// Amplifiers recorded by [`Source::set_amplifiers`].
    fn amplifiers(&self) -> Option<AmplifierSelection>;

    /// Validates and applies `loadpoint` as a whole.
    ///
    /// On any failure the current loadpoint is left as it was.
    async fn set_loadpoint(&self, loadpoint: Loadpoint) -> Result<()>;

    /// Switches all outputs off and forgets the current loadpoint.
    async fn turn_off(&self) -> Result<()>;

    /// Loadpoint last acknowledged by the device, `None` after turn off.
    fn current_loadpoint(&self) -> Option<Loadpoint>;

    /// When the current loadpoint was applied and whether it is still active.
    fn active_loadpoint_info(&self) -> LoadpointInfo;

    /// Model and firmware version of the device.
    async fn firmware_version(&self) -> Result<FirmwareVersion>;

    /// Discrete voltage ranges, ascending.
    async fn voltage_ranges(&self) -> Result<Vec<Voltage>>;

    /// Discrete current ranges, ascending.
    async fn current_ranges(&self) -> Result<Vec<Current>>;

    /// Fault flags from the device status query.
    async fn error_conditions(&self) -> Result<ErrorConditions>;
}
