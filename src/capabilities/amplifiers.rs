//! Amplifier and reference meter identifiers.
//!
//! Many hardware variants share one envelope; `catalog_key` names the catalog
//! row that describes a variant.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::MtsError;

macro_rules! hardware_ids {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $key:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[allow(missing_docs)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Every known variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Identifier as written on the hardware and accepted by `FromStr`.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant)),+
                }
            }

            /// Canonical catalog row for this variant.
            pub fn catalog_key(&self) -> &'static str {
                match self {
                    $($name::$variant => $key),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = MtsError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim();
                $name::ALL
                    .iter()
                    .copied()
                    .find(|id| id.as_str().eq_ignore_ascii_case(wanted))
                    .ok_or_else(|| MtsError::Configuration(format!("unknown {} '{}'", $kind, wanted)))
            }
        }
    };
}

hardware_ids!(
    /// Voltage amplifier fitted to a source.
    VoltageAmplifier, "voltage amplifier" {
        VU211x0 => "VU211",
        VU211x1 => "VU211",
        VU211x2 => "VU211",
        VU220 => "VU220",
        VU220x01 => "VU220",
        VU220x02 => "VU220",
        VU220x03 => "VU220",
        VU220x04 => "VU220",
        VU221x0 => "VU221",
        VU221x1 => "VU221",
        VU221x2 => "VU221",
        VU221x3 => "VU221",
        VU221x0x2 => "VU221",
        VU221x0x3 => "VU221",
        SVG3020 => "SVG3020",
        VUI301 => "VUI302",
        VUI302 => "VUI302",
    }
);

hardware_ids!(
    /// Current amplifier fitted to a source.
    CurrentAmplifier, "current amplifier" {
        VI201x0 => "VI201",
        VI201x0x1 => "VI201",
        VI201x1 => "VI201",
        VI202x0 => "VI202",
        VI202x0x1 => "VI202",
        VI202x0x2 => "VI202",
        VI202x0x5 => "VI202",
        VI220 => "VI220",
        VI221x0 => "VI221",
        VI222x0 => "VI222",
        VI222x0x1 => "VI222",
        SCG1020 => "SCG1020",
        VUI301 => "VUI302",
        VUI302 => "VUI302",
    }
);

hardware_ids!(
    /// Reference meter wired into a metering system.
    ReferenceMeter, "reference meter" {
        COM3000 => "COM3000",
        COM3003 => "COM3003",
        COM3003x1x2 => "COM3003",
        EPZ103 => "EPZ103",
    }
);

/// Voltage and current amplifier pair fitted to a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct AmplifierSelection {
    pub voltage: VoltageAmplifier,
    pub current: CurrentAmplifier,
}

impl AmplifierSelection {
    #[allow(missing_docs)]
    pub fn new(voltage: VoltageAmplifier, current: CurrentAmplifier) -> Self {
        Self { voltage, current }
    }

    /// Parses both identifiers, failing on the first unknown one.
    pub fn parse(voltage: &str, current: &str) -> Result<Self, MtsError> {
        Ok(Self {
            voltage: voltage.parse()?,
            current: current.parse()?,
        })
    }
}

impl fmt::Display for AmplifierSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.voltage, self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_collapse_to_catalog_keys() {
        assert_eq!(VoltageAmplifier::VU220x03.catalog_key(), "VU220");
        assert_eq!(VoltageAmplifier::VU221x0x2.catalog_key(), "VU221");
        assert_eq!(VoltageAmplifier::VUI301.catalog_key(), "VUI302");
        assert_eq!(CurrentAmplifier::VI202x0x5.catalog_key(), "VI202");
        assert_eq!(CurrentAmplifier::VI221x0.catalog_key(), "VI221");
    }

    #[test]
    fn parse_is_case_insensitive() {
        let amp: VoltageAmplifier = "vu221x0x3".parse().unwrap();
        assert_eq!(amp, VoltageAmplifier::VU221x0x3);
        let amp: CurrentAmplifier = " SCG1020 ".parse().unwrap();
        assert_eq!(amp, CurrentAmplifier::SCG1020);
    }

    #[test]
    fn selection_parse() {
        let selection = AmplifierSelection::parse("VU220", "VI220").unwrap();
        assert_eq!(selection.to_string(), "VU220/VI220");
        assert!(AmplifierSelection::parse("VU220", "VU220").is_err());
    }

    #[test]
    fn unknown_identifier_names_itself() {
        let err = "VU999".parse::<VoltageAmplifier>().unwrap_err();
        match err {
            MtsError::Configuration(msg) => assert!(msg.contains("VU999")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
