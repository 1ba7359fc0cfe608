//! Metering systems.
//!
//! A metering system groups the source amplifiers with a reference meter.
//! The hardware selection is made once per session.

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::capabilities::{catalog, AmplifierSelection, CapabilityDescription, ReferenceMeter};
use crate::channel::SerialChannel;
use crate::codec::{FamilyCodec, FirmwareVersion, MtCodec};
use crate::error::{MtsError, Result};

/// Hardware fitted to a metering system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct AmplifiersAndReferenceMeter {
    pub amplifiers: AmplifierSelection,
    pub reference_meter: ReferenceMeter,
}

/// A metering system session.
#[async_trait]
pub trait MeteringSystem: Send + Sync {
    /// Model and firmware version of the device.
    async fn firmware_version(&self) -> Result<FirmwareVersion>;

    /// Envelope of the configured amplifiers, `None` before configuration.
    async fn capabilities(&self) -> Result<Option<CapabilityDescription>>;

    /// Records the fitted hardware. Allowed once per session.
    fn set_amplifiers_and_reference_meter(&self, hardware: AmplifiersAndReferenceMeter) -> Result<()>;

    /// Hardware recorded by [`MeteringSystem::set_amplifiers_and_reference_meter`].
    fn amplifiers_and_reference_meter(&self) -> Option<AmplifiersAndReferenceMeter>;
}

/// Metering system of an MT768 meter test system.
pub struct SerialPortMtMeteringSystem {
    channel: SerialChannel,
    hardware: OnceCell<AmplifiersAndReferenceMeter>,
}

impl SerialPortMtMeteringSystem {
    /// Metering system on `channel`, hardware not yet recorded.
    pub fn new(channel: SerialChannel) -> Self {
        Self {
            channel,
            hardware: OnceCell::new(),
        }
    }
}

#[async_trait]
impl MeteringSystem for SerialPortMtMeteringSystem {
    async fn firmware_version(&self) -> Result<FirmwareVersion> {
        let reply = self.channel.execute(MtCodec.firmware_request()).await?;
        MtCodec.decode_firmware(&reply)
    }

    async fn capabilities(&self) -> Result<Option<CapabilityDescription>> {
        self.hardware
            .get()
            .map(|hw| catalog::capabilities_for(hw.amplifiers.voltage, hw.amplifiers.current))
            .transpose()
    }

    fn set_amplifiers_and_reference_meter(&self, hardware: AmplifiersAndReferenceMeter) -> Result<()> {
        catalog::capabilities_for(hardware.amplifiers.voltage, hardware.amplifiers.current)?;
        self.hardware.set(hardware).map_err(|_| {
            warn!("metering system hardware already configured");
            MtsError::AlreadyConfigured
        })?;
        info!(
            amplifiers = %hardware.amplifiers,
            reference_meter = %hardware.reference_meter,
            "metering system configured"
        );
        Ok(())
    }

    fn amplifiers_and_reference_meter(&self) -> Option<AmplifiersAndReferenceMeter> {
        self.hardware.get().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{CurrentAmplifier, VoltageAmplifier};
    use crate::channel::DeviceMock;
    use crate::codec::DeviceFamily;
    use std::time::Duration;

    fn system() -> SerialPortMtMeteringSystem {
        let channel = SerialChannel::spawn(Box::new(DeviceMock::new(DeviceFamily::Mt)), Duration::from_secs(1));
        SerialPortMtMeteringSystem::new(channel)
    }

    fn hardware(meter: ReferenceMeter) -> AmplifiersAndReferenceMeter {
        AmplifiersAndReferenceMeter {
            amplifiers: AmplifierSelection::new(VoltageAmplifier::VU221x1, CurrentAmplifier::VI202x0),
            reference_meter: meter,
        }
    }

    #[tokio::test]
    async fn configure_once() {
        let system = system();
        assert_eq!(system.capabilities().await.unwrap(), None);

        system.set_amplifiers_and_reference_meter(hardware(ReferenceMeter::COM3003)).unwrap();
        let err = system
            .set_amplifiers_and_reference_meter(hardware(ReferenceMeter::EPZ103))
            .unwrap_err();
        assert!(matches!(err, MtsError::AlreadyConfigured));
        assert_eq!(
            system.amplifiers_and_reference_meter().map(|hw| hw.reference_meter),
            Some(ReferenceMeter::COM3003)
        );

        let caps = system.capabilities().await.unwrap().unwrap();
        assert_eq!(f64::from(caps.frequency.min), 40.0);
    }

    #[tokio::test]
    async fn firmware_from_mock() {
        let fw = system().firmware_version().await.unwrap();
        assert_eq!(fw.model_name, "MT786");
        assert_eq!(fw.version, "06.08");
    }
}
