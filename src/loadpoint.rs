//! Target operating point of a source.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::capabilities::FrequencyMode;
use crate::units::{ActivePower, Angle, Current, Frequency, Voltage};

/// Requested output frequency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct FrequencySetting {
    pub mode: FrequencyMode,
    pub value: Frequency,
}

/// Magnitude, angle and on/off flag of one output channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseComponent<T> {
    /// Root mean square magnitude.
    pub rms: T,
    /// Phase angle in degrees, `[0, 360)` when the channel is on.
    pub angle: Angle,
    /// Only switched on channels are validated.
    pub on: bool,
}

impl<T> PhaseComponent<T> {
    /// Component with `angle` given in degrees.
    pub fn new(rms: T, angle: f64, on: bool) -> Self {
        Self {
            rms,
            angle: Angle::new(angle),
            on,
        }
    }
}

/// Voltage and current of one phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct PhaseLoadpoint {
    pub voltage: PhaseComponent<Voltage>,
    pub current: PhaseComponent<Current>,
}

/// Frequency plus three phases, in phase order L1, L2, L3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loadpoint {
    /// Output frequency.
    pub frequency: FrequencySetting,
    /// L1, L2, L3.
    pub phases: [PhaseLoadpoint; 3],
    /// Carried along for callers, not sent to the device.
    #[serde(default)]
    pub voltage_neutral_connected: bool,
}

impl Loadpoint {
    /// Total active power of all phases where both voltage and current are on.
    pub fn active_power(&self) -> ActivePower {
        self.phases
            .iter()
            .filter(|phase| phase.voltage.on && phase.current.on)
            .map(|phase| {
                (phase.voltage.rms * phase.current.rms)
                    .active_power(phase.voltage.angle - phase.current.angle)
            })
            .sum()
    }
}

/// Bookkeeping about the loadpoint a session last applied.
///
/// All fields stay `None` until the first loadpoint goes out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadpointInfo {
    /// When the loadpoint was accepted by the session.
    pub saved_at: Option<SystemTime>,
    /// When the device acknowledged it.
    pub activated_at: Option<SystemTime>,
    /// `false` after the outputs were turned off.
    pub is_active: Option<bool>,
}

/// Session loadpoint together with its [`LoadpointInfo`].
#[derive(Debug, Clone, Default)]
pub struct ActiveLoadpoint {
    loadpoint: Option<Loadpoint>,
    info: LoadpointInfo,
}

impl ActiveLoadpoint {
    /// Records `loadpoint` as acknowledged by the device.
    pub fn activate(&mut self, loadpoint: Loadpoint) {
        let now = SystemTime::now();
        self.loadpoint = Some(loadpoint);
        self.info = LoadpointInfo {
            saved_at: Some(now),
            activated_at: Some(now),
            is_active: Some(true),
        };
    }

    /// Forgets the loadpoint after the outputs were switched off.
    ///
    /// The timestamps of the last activation are kept.
    pub fn deactivate(&mut self) {
        self.loadpoint = None;
        self.info.is_active = Some(false);
    }

    /// The applied loadpoint, if any.
    pub fn loadpoint(&self) -> Option<&Loadpoint> {
        self.loadpoint.as_ref()
    }

    /// Info about the last activation.
    pub fn info(&self) -> LoadpointInfo {
        self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phase(u: f64, i: f64, angle: f64, lag: f64) -> PhaseLoadpoint {
        PhaseLoadpoint {
            voltage: PhaseComponent::new(Voltage::new(u), angle, true),
            current: PhaseComponent::new(Current::new(i), angle + lag, true),
        }
    }

    #[test]
    fn active_power_sums_enabled_phases() {
        let mut lp = Loadpoint {
            frequency: FrequencySetting {
                mode: FrequencyMode::Synthetic,
                value: Frequency::new(50.0),
            },
            phases: [phase(230.0, 10.0, 0.0, 0.0), phase(230.0, 10.0, 120.0, 60.0), phase(230.0, 10.0, 240.0, 0.0)],
            voltage_neutral_connected: true,
        };
        let total = f64::from(lp.active_power());
        assert!((total - (2300.0 + 1150.0 + 2300.0)).abs() < 1e-6);

        lp.phases[2].current.on = false;
        let total = f64::from(lp.active_power());
        assert!((total - 3450.0).abs() < 1e-6);
    }

    #[test]
    fn deserializes_from_json() {
        let json = r#"{
            "frequency": { "mode": "SYNTHETIC", "value": 50.0 },
            "phases": [
                { "voltage": { "rms": 230.0, "angle": 0.0, "on": true }, "current": { "rms": 5.0, "angle": 0.0, "on": true } },
                { "voltage": { "rms": 230.0, "angle": 120.0, "on": true }, "current": { "rms": 5.0, "angle": 120.0, "on": true } },
                { "voltage": { "rms": 230.0, "angle": 240.0, "on": true }, "current": { "rms": 5.0, "angle": 240.0, "on": false } }
            ]
        }"#;
        let lp: Loadpoint = serde_json::from_str(json).unwrap();
        assert_eq!(lp.frequency.value, Frequency::new(50.0));
        assert!(!lp.voltage_neutral_connected);
        assert!(!lp.phases[2].current.on);
    }

    #[test]
    fn info_follows_activation() {
        let mut active = ActiveLoadpoint::default();
        assert_eq!(active.info(), LoadpointInfo::default());

        let lp = Loadpoint {
            frequency: FrequencySetting {
                mode: FrequencyMode::Synthetic,
                value: Frequency::new(50.0),
            },
            phases: [phase(230.0, 1.0, 0.0, 0.0); 3],
            voltage_neutral_connected: false,
        };
        active.activate(lp.clone());
        let info = active.info();
        assert_eq!(info.is_active, Some(true));
        assert!(info.activated_at.is_some());
        assert_eq!(info.saved_at, info.activated_at);
        assert_eq!(active.loadpoint(), Some(&lp));

        active.deactivate();
        assert_eq!(active.info().is_active, Some(false));
        assert_eq!(active.info().activated_at, info.activated_at);
        assert!(active.loadpoint().is_none());
    }
}
