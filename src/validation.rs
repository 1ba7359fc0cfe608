//! Loadpoint validation against a capability description.
//!
//! [`validate`] is a pure predicate. It scans phases L1, L2, L3 and inside
//! each phase checks voltage, then current, then the angles of the enabled
//! channels. The frequency is checked last. The first violation wins.

use crate::capabilities::{CapabilityDescription, QuantityRange};
use crate::error::Rejection;
use crate::loadpoint::{Loadpoint, PhaseComponent};
use crate::units::Angle;

/// Accepted angles are `[0, 360)` degrees. 360 must be sent as 0.
pub fn angle_in_domain(angle: Angle) -> bool {
    let degrees = f64::from(angle);
    (0.0..360.0).contains(&degrees)
}

fn within<T: PartialOrd + Copy>(range: Option<&QuantityRange<T>>, component: &PhaseComponent<T>) -> bool {
    range.is_some_and(|range| range.contains(component.rms))
}

/// Checks `loadpoint` against `capability`.
///
/// # Errors
///
/// Returns the first [`Rejection`] found. A channel that is switched on but
/// whose phase spec has no range for it is treated as out of range.
pub fn validate(loadpoint: &Loadpoint, capability: &CapabilityDescription) -> Result<(), Rejection> {
    for (phase, spec) in loadpoint.phases.iter().zip(capability.phases.iter()) {
        if phase.voltage.on && !within(spec.voltage.as_ref(), &phase.voltage) {
            return Err(Rejection::VoltageOutOfRange);
        }

        if phase.current.on && !within(spec.current.as_ref(), &phase.current) {
            return Err(Rejection::CurrentOutOfRange);
        }

        if phase.voltage.on && !angle_in_domain(phase.voltage.angle) {
            return Err(Rejection::AngleOutOfRange);
        }

        if phase.current.on && !angle_in_domain(phase.current.angle) {
            return Err(Rejection::AngleOutOfRange);
        }
    }

    let frequency = &capability.frequency;
    if loadpoint.frequency.mode != frequency.mode || !frequency.contains(loadpoint.frequency.value) {
        return Err(Rejection::FrequencyOutOfRange);
    }

    Ok(())
}
