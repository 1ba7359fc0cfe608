//! Source hardware behind a serial channel.
//!
//! Loadpoints are validated against the session capability, encoded by the
//! family codec and sent as one uninterrupted job:
//!
//! 1. frequency
//! 2. voltages of all phases
//! 3. currents of all phases
//! 4. channel enable mask
//!
//! The session loadpoint changes only after the device acknowledged all four.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::Source;
use crate::capabilities::{catalog, AmplifierSelection, CapabilityDescription};
use crate::channel::SerialChannel;
use crate::codec::{DeviceFamily, ErrorConditions, FamilyCodec, FirmwareVersion, Request};
use crate::coalesce::ResponseShare;
use crate::error::{MtsError, Result};
use crate::loadpoint::{ActiveLoadpoint, Loadpoint, LoadpointInfo};
use crate::units::{Current, Voltage};
use crate::validation::validate;

/// One MT768 or FG30x source session.
pub struct SerialPortSource {
    channel: SerialChannel,
    codec: Arc<dyn FamilyCodec>,
    amplifiers: OnceCell<AmplifierSelection>,
    loadpoint: RwLock<ActiveLoadpoint>,
    /// Held while output changing commands are on the wire so session state
    /// updates happen in command order.
    output: Mutex<()>,
    firmware: ResponseShare<FirmwareVersion>,
    status: ResponseShare<ErrorConditions>,
}

impl SerialPortSource {
    /// Creates a session for `family` on `channel`.
    ///
    /// # Arguments
    /// * `channel` - Link to the device, possibly shared with other devices
    /// * `family` - Wire protocol spoken by the source
    pub fn new(channel: SerialChannel, family: DeviceFamily) -> Self {
        let codec = family.codec();

        let firmware = {
            let (channel, codec) = (channel.clone(), Arc::clone(&codec));
            ResponseShare::new(move |()| {
                let (channel, codec) = (channel.clone(), Arc::clone(&codec));
                async move {
                    let reply = channel.execute(codec.firmware_request()).await?;
                    codec.decode_firmware(&reply)
                }
            })
        };

        let status = {
            let (channel, codec) = (channel.clone(), Arc::clone(&codec));
            ResponseShare::new(move |()| {
                let (channel, codec) = (channel.clone(), Arc::clone(&codec));
                async move {
                    let reply = channel.execute(codec.status_request()).await?;
                    codec.decode_status(&reply)
                }
            })
        };

        Self {
            channel,
            codec,
            amplifiers: OnceCell::new(),
            loadpoint: RwLock::new(ActiveLoadpoint::default()),
            output: Mutex::new(()),
            firmware,
            status,
        }
    }

    /// Creates a session with its amplifiers already recorded.
    pub fn with_amplifiers(
        channel: SerialChannel,
        family: DeviceFamily,
        amplifiers: AmplifierSelection,
    ) -> Result<Self> {
        let source = Self::new(channel, family);
        source.set_amplifiers(amplifiers)?;
        Ok(source)
    }

    /// Wire protocol of this session.
    pub fn family(&self) -> DeviceFamily {
        self.codec.family()
    }

    fn configured_amplifiers(&self) -> Result<AmplifierSelection> {
        self.amplifiers.get().copied().ok_or_else(|| {
            MtsError::Configuration(format!("{} source has no amplifiers configured", self.family()))
        })
    }

    fn with_loadpoint(&self, update: impl FnOnce(&mut ActiveLoadpoint)) {
        update(&mut self.loadpoint.write().unwrap_or_else(PoisonError::into_inner));
    }

    async fn query_ranges(&self, request: Request) -> Result<Vec<f64>> {
        let reply = self.channel.execute(request.clone()).await?;
        self.codec.decode_ranges(&request, &reply)
    }
}

#[async_trait]
impl Source for SerialPortSource {
    async fn capabilities(&self) -> Result<CapabilityDescription> {
        match self.family() {
            DeviceFamily::Mt => catalog::capabilities_by_model(catalog::MT_MODEL_KEY),
            DeviceFamily::Fg => {
                let amplifiers = self.configured_amplifiers()?;
                catalog::capabilities_for(amplifiers.voltage, amplifiers.current)
            }
        }
    }

    fn set_amplifiers(&self, amplifiers: AmplifierSelection) -> Result<()> {
        catalog::capabilities_for(amplifiers.voltage, amplifiers.current)?;
        self.amplifiers.set(amplifiers).map_err(|_| {
            warn!(requested = %amplifiers, "amplifiers already configured");
            MtsError::AlreadyConfigured
        })?;
        info!(amplifiers = %amplifiers, "amplifiers configured");
        Ok(())
    }

    fn amplifiers(&self) -> Option<AmplifierSelection> {
        self.amplifiers.get().copied()
    }

    async fn set_loadpoint(&self, loadpoint: Loadpoint) -> Result<()> {
        let capability = self.capabilities().await?;
        if let Err(rejection) = validate(&loadpoint, &capability) {
            info!(%rejection, "loadpoint rejected");
            return Err(rejection.into());
        }

        let requests = self.codec.encode_loadpoint(&loadpoint);
        let frequency = loadpoint.frequency.value;

        let _output = self.output.lock().await;
        self.channel.execute_all(requests).await.map_err(|err| {
            warn!(error = %err, "loadpoint not applied");
            err
        })?;
        self.with_loadpoint(|active| active.activate(loadpoint));
        info!(%frequency, "loadpoint applied");
        Ok(())
    }

    async fn turn_off(&self) -> Result<()> {
        let _output = self.output.lock().await;
        self.channel.execute(self.codec.turn_off()).await?;
        self.with_loadpoint(ActiveLoadpoint::deactivate);
        info!("source turned off");
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
        self.firmware.execute(()).await
    }

    async fn voltage_ranges(&self) -> Result<Vec<Voltage>> {
        match self.codec.voltage_ranges_request() {
            Some(request) => Ok(self
                .query_ranges(request)
                .await?
                .into_iter()
                .map(Voltage::new)
                .collect()),
            None => {
                debug!("voltage ranges from catalog");
                catalog::voltage_ranges_for(self.configured_amplifiers()?.voltage)
            }
        }
    }

    async fn current_ranges(&self) -> Result<Vec<Current>> {
        match self.codec.current_ranges_request() {
            Some(request) => Ok(self
                .query_ranges(request)
                .await?
                .into_iter()
                .map(Current::new)
                .collect()),
            None => {
                debug!("current ranges from catalog");
                catalog::current_ranges_for(self.configured_amplifiers()?.current)
            }
        }
    }

    async fn error_conditions(&self) -> Result<ErrorConditions> {
        self.status.execute(()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{CurrentAmplifier, VoltageAmplifier};
    use crate::channel::DeviceMock;
    use std::time::Duration;

    fn source(family: DeviceFamily) -> SerialPortSource {
        let channel = SerialChannel::spawn(Box::new(DeviceMock::new(family)), Duration::from_secs(1));
        SerialPortSource::new(channel, family)
    }

    #[tokio::test]
    async fn fg_needs_amplifiers_for_capabilities() {
        let source = source(DeviceFamily::Fg);
        assert!(matches!(source.capabilities().await, Err(MtsError::Configuration(_))));

        source
            .set_amplifiers(AmplifierSelection::new(VoltageAmplifier::VU220, CurrentAmplifier::VI220))
            .unwrap();
        let caps = source.capabilities().await.unwrap();
        assert_eq!(f64::from(caps.frequency.min), 40.0);
    }

    #[tokio::test]
    async fn fg_ranges_come_from_catalog() {
        let source = source(DeviceFamily::Fg);
        assert!(source.voltage_ranges().await.is_err());
        source
            .set_amplifiers(AmplifierSelection::new(VoltageAmplifier::VU220x02, CurrentAmplifier::VI201x0))
            .unwrap();
        let ranges = source.voltage_ranges().await.unwrap();
        assert_eq!(ranges.last().copied(), Some(Voltage::new(250.0)));
        assert_eq!(source.current_ranges().await.unwrap().len(), 12);
    }

    #[tokio::test]
    async fn firmware_and_status() {
        let source = source(DeviceFamily::Fg);
        let fw = source.firmware_version().await.unwrap();
        assert_eq!(fw.model_name, "FG301");
        assert!(!source.error_conditions().await.unwrap().any());
    }
}
