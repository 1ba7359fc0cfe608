//! Settings loaded with figment.
//!
//! Settings come from a TOML file, overridden by environment variables with
//! the `RUST_MTS_` prefix. Nested keys are separated by a double underscore:
//!
//! ```text
//! RUST_MTS_LOG_LEVEL=debug
//! RUST_MTS_DEVICE__PORT_NAME=/dev/ttyUSB1
//! RUST_MTS_DEVICE__TIMEOUT_MS=5000
//! ```
//!
//! # Example
//!
//! ```no_run
//! use rust_mts::config::Settings;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load("rust_mts.toml")?;
//!     println!("family: {}", settings.family()?);
//!     println!("link: {}", settings.transport_selection()?);
//!     Ok(())
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capabilities::AmplifierSelection;
use crate::channel::{MockType, TransportSelection};
use crate::codec::DeviceFamily;
use crate::error::MtsError;

const ENV_PREFIX: &str = "RUST_MTS_";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File or environment could not be read or deserialized.
    #[error("Configuration load error: {0}")]
    LoadError(#[from] figment::Error),
    /// Values were read but contradict each other or are out of range.
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for MtsError {
    fn from(err: ConfigError) -> Self {
        MtsError::Configuration(err.to_string())
    }
}

/// Top-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Device link settings
    pub device: DeviceSettings,
    /// Amplifiers fitted to the source, if known up front
    #[serde(default)]
    pub amplifiers: Option<AmplifierSettings>,
}

/// How to reach the device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// "MT" or "FG"
    pub family: String,
    /// Serial port (e.g., "/dev/ttyUSB0"), or "host:port" for a network bridge
    #[serde(default)]
    pub port_name: Option<String>,
    /// Mock device ("mt" or "fg") used instead of a port
    #[serde(default)]
    pub mock_type: Option<String>,
    /// Baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Reply timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Amplifier identifiers as written on the hardware
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmplifierSettings {
    /// e.g. `VU220`
    pub voltage: String,
    /// e.g. `VI220`
    pub current: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Settings {
    /// Loads settings from `path` plus `RUST_MTS_` environment overrides and
    /// validates them.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file(path.as_ref()))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    /// Extracts and validates settings from an already assembled figment.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let settings: Settings = figment.extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks everything that can be checked before a transport is opened.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.family()?;
        self.transport_selection()?;
        self.amplifier_selection()?;
        if self.device.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "device.timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Configured device family.
    pub fn family(&self) -> Result<DeviceFamily, ConfigError> {
        self.device.family.parse().map_err(invalid)
    }

    /// Link described by `port_name` or `mock_type`; exactly one must be set.
    pub fn transport_selection(&self) -> Result<TransportSelection, ConfigError> {
        match (&self.device.port_name, &self.device.mock_type) {
            (Some(_), Some(_)) => Err(ConfigError::ValidationError(
                "device.port_name and device.mock_type are mutually exclusive".to_string(),
            )),
            (None, None) => Err(ConfigError::ValidationError(
                "either device.port_name or device.mock_type must be set".to_string(),
            )),
            (Some(port), None) if port.contains(':') && !port.starts_with('/') => {
                Ok(TransportSelection::Network {
                    address: port.clone(),
                })
            }
            (Some(port), None) => Ok(TransportSelection::Serial {
                port: port.clone(),
                baud_rate: self.device.baud_rate,
            }),
            (None, Some(mock)) => {
                let kind: MockType = mock.parse().map_err(invalid)?;
                Ok(TransportSelection::Mock(kind))
            }
        }
    }

    /// Parsed `[amplifiers]` section, if present.
    pub fn amplifier_selection(&self) -> Result<Option<AmplifierSelection>, ConfigError> {
        self.amplifiers
            .as_ref()
            .map(|amps| AmplifierSelection::parse(&amps.voltage, &amps.current))
            .transpose()
            .map_err(invalid)
    }

    /// Reply timeout of the channel.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.device.timeout_ms)
    }
}

fn invalid(err: MtsError) -> ConfigError {
    match err {
        MtsError::Configuration(msg) => ConfigError::ValidationError(msg),
        other => ConfigError::ValidationError(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{CurrentAmplifier, VoltageAmplifier};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn settings(toml: &str) -> Result<Settings, ConfigError> {
        Settings::from_figment(Figment::new().merge(Toml::string(toml)))
    }

    #[test]
    fn loads_file_with_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[device]
family = "FG"
port_name = "/dev/ttyUSB0"

[amplifiers]
voltage = "VU220"
current = "VI220"
"#
        )
        .unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.family().unwrap(), DeviceFamily::Fg);
        assert_eq!(settings.timeout(), Duration::from_secs(30));
        assert_eq!(
            settings.transport_selection().unwrap(),
            TransportSelection::Serial {
                port: "/dev/ttyUSB0".into(),
                baud_rate: 9600
            }
        );
        assert_eq!(
            settings.amplifier_selection().unwrap(),
            Some(AmplifierSelection::new(VoltageAmplifier::VU220, CurrentAmplifier::VI220))
        );
    }

    #[test]
    fn mock_and_network_links() {
        let mock = settings("[device]\nfamily = \"MT\"\nmock_type = \"mt768\"\n").unwrap();
        assert_eq!(mock.transport_selection().unwrap(), TransportSelection::Mock(MockType::Mt));
        assert_eq!(mock.amplifier_selection().unwrap(), None);

        let tcp = settings("[device]\nfamily = \"MT\"\nport_name = \"10.0.0.7:4001\"\n").unwrap();
        assert_eq!(
            tcp.transport_selection().unwrap(),
            TransportSelection::Network {
                address: "10.0.0.7:4001".into()
            }
        );
    }

    #[test]
    fn rejects_contradictory_link() {
        let both = settings("[device]\nfamily = \"MT\"\nport_name = \"COM3\"\nmock_type = \"mt\"\n");
        assert!(matches!(both, Err(ConfigError::ValidationError(_))));

        let neither = settings("[device]\nfamily = \"MT\"\n");
        assert!(matches!(neither, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn rejects_unknown_identifiers() {
        let family = settings("[device]\nfamily = \"XY\"\nmock_type = \"mt\"\n").unwrap_err();
        assert!(family.to_string().contains("XY"));

        let mock = settings("[device]\nfamily = \"FG\"\nmock_type = \"zz\"\n").unwrap_err();
        assert!(mock.to_string().contains("zz"));

        let amp = settings(
            "[device]\nfamily = \"FG\"\nmock_type = \"fg\"\n[amplifiers]\nvoltage = \"VU999\"\ncurrent = \"VI220\"\n",
        )
        .unwrap_err();
        assert!(amp.to_string().contains("VU999"));
        assert!(matches!(MtsError::from(amp), MtsError::Configuration(_)));
    }

    #[test]
    fn missing_device_section_is_load_error() {
        assert!(matches!(settings("log_level = \"debug\"\n"), Err(ConfigError::LoadError(_))));
    }
}
