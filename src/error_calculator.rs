//! Error calculator devices.
//!
//! The MT768 error calculator shares the serial link of the meter test
//! system. Only identification is sent to the device; the job control
//! operations are accepted without any wire traffic.

use async_trait::async_trait;
use tracing::debug;

use crate::channel::SerialChannel;
use crate::codec::{FamilyCodec, FirmwareVersion, MtCodec};
use crate::error::Result;

/// An error calculator session.
#[async_trait]
pub trait ErrorCalculator: Send + Sync {
    /// Whether the device can currently accept commands.
    fn is_available(&self) -> bool {
        true
    }

    /// Model and firmware version of the device.
    async fn firmware_version(&self) -> Result<FirmwareVersion>;

    /// Stops every running error measurement.
    async fn abort_all_jobs(&self) -> Result<()>;

    /// Connects or disconnects the source from the calculator.
    async fn activate_source(&self, on: bool) -> Result<()>;
}

/// Error calculator of an MT768 meter test system.
pub struct SerialPortMtErrorCalculator {
    channel: SerialChannel,
    codec: MtCodec,
}

impl SerialPortMtErrorCalculator {
    /// Calculator on `channel`, usually shared with the source.
    pub fn new(channel: SerialChannel) -> Self {
        Self {
            channel,
            codec: MtCodec,
        }
    }
}

#[async_trait]
impl ErrorCalculator for SerialPortMtErrorCalculator {
    async fn firmware_version(&self) -> Result<FirmwareVersion> {
        let reply = self.channel.execute(self.codec.firmware_request()).await?;
        self.codec.decode_firmware(&reply)
    }

    async fn abort_all_jobs(&self) -> Result<()> {
        debug!("abort all jobs: nothing running on MT error calculator");
        Ok(())
    }

    async fn activate_source(&self, on: bool) -> Result<()> {
        debug!(on, "activate source: handled by the MT source itself");
        Ok(())
    }
}
