//! Physical quantity newtypes.
//!
//! Every quantity wraps an `f64` and only supports arithmetic with operands of
//! the same unit, plus scaling by plain numbers. Cross-unit operations exist
//! only where they are physically meaningful, e.g. `Voltage * Current` yields
//! an `ApparentPower`. Getting the raw number out requires an explicit
//! `f64::from(quantity)`.
//!
//! ```compile_fail
//! use rust_mts::units::{Current, Voltage};
//! let _ = Voltage::new(230.0) + Current::new(5.0);
//! ```
//!
//! ```
//! use rust_mts::units::{ActivePower, Time};
//! let energy = ActivePower::new(1000.0) * Time::new(3600.0);
//! assert_eq!(f64::from(energy), 1000.0);
//! ```

use std::{
    fmt,
    iter::Sum,
    ops::{Add, Div, Mul, Neg, Rem, Sub},
};

use serde::{Deserialize, Serialize};

macro_rules! quantity {
    ($(#[$meta:meta])* $name:ident, $unit:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(f64);

        impl $name {
            /// Unit label used when displaying the quantity.
            pub const UNIT: &'static str = $unit;

            /// Wraps a raw value given in [`Self::UNIT`].
            pub const fn new(value: f64) -> Self {
                Self(value)
            }

            /// Magnitude without sign.
            pub fn abs(self) -> Self {
                Self(self.0.abs())
            }
        }

        impl From<$name> for f64 {
            fn from(quantity: $name) -> f64 {
                quantity.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if Self::UNIT.is_empty() {
                    write!(f, "{}", self.0)
                } else {
                    write!(f, "{} {}", self.0, Self::UNIT)
                }
            }
        }

        impl Add for $name {
            type Output = $name;
            fn add(self, rhs: $name) -> $name {
                $name(self.0 + rhs.0)
            }
        }

        impl Sub for $name {
            type Output = $name;
            fn sub(self, rhs: $name) -> $name {
                $name(self.0 - rhs.0)
            }
        }

        impl Neg for $name {
            type Output = $name;
            fn neg(self) -> $name {
                $name(-self.0)
            }
        }

        impl Rem for $name {
            type Output = $name;
            fn rem(self, rhs: $name) -> $name {
                $name(self.0 % rhs.0)
            }
        }

        impl Mul<f64> for $name {
            type Output = $name;
            fn mul(self, rhs: f64) -> $name {
                $name(self.0 * rhs)
            }
        }

        impl Mul<$name> for f64 {
            type Output = $name;
            fn mul(self, rhs: $name) -> $name {
                $name(self * rhs.0)
            }
        }

        impl Div<f64> for $name {
            type Output = $name;
            fn div(self, rhs: f64) -> $name {
                $name(self.0 / rhs)
            }
        }

        /// Ratio of two quantities of the same unit.
        impl Div for $name {
            type Output = f64;
            fn div(self, rhs: $name) -> f64 {
                self.0 / rhs.0
            }
        }

        impl Sum for $name {
            fn sum<I: Iterator<Item = $name>>(iter: I) -> $name {
                $name(iter.map(|q| q.0).sum())
            }
        }
    };
}

quantity!(
    /// Phase angle in degrees.
    Angle,
    "°"
);
quantity!(
    /// RMS voltage in volts.
    Voltage,
    "V"
);
quantity!(
    /// RMS current in amperes.
    Current,
    "A"
);
quantity!(
    /// Active power in watts.
    ActivePower,
    "W"
);
quantity!(
    /// Apparent power in volt-amperes.
    ApparentPower,
    "VA"
);
quantity!(
    /// Reactive power in volt-amperes reactive.
    ReactivePower,
    "var"
);
quantity!(
    /// Active energy in watt-hours.
    ActiveEnergy,
    "Wh"
);
quantity!(
    /// Impulse count emitted by a meter under test.
    Impulses,
    "imp"
);
quantity!(
    /// Meter constant in impulses per kilowatt-hour.
    MeterConstant,
    "imp/kWh"
);
quantity!(
    /// Ratio of active to apparent power.
    PowerFactor,
    ""
);
quantity!(
    /// Duration in seconds.
    Time,
    "s"
);
quantity!(
    /// Frequency in hertz.
    Frequency,
    "Hz"
);

impl Angle {
    /// The angle in radians.
    pub fn to_radians(self) -> f64 {
        self.0.to_radians()
    }

    #[allow(missing_docs)]
    pub fn sin(self) -> f64 {
        self.to_radians().sin()
    }

    #[allow(missing_docs)]
    pub fn cos(self) -> f64 {
        self.to_radians().cos()
    }

    /// Maps the angle into `[0, 360)`.
    pub fn normalize(self) -> Angle {
        Angle(self.0.rem_euclid(360.0))
    }
}

impl Mul<Current> for Voltage {
    type Output = ApparentPower;
    fn mul(self, rhs: Current) -> ApparentPower {
        ApparentPower(self.0 * rhs.0)
    }
}

impl Mul<Voltage> for Current {
    type Output = ApparentPower;
    fn mul(self, rhs: Voltage) -> ApparentPower {
        ApparentPower(self.0 * rhs.0)
    }
}

impl ApparentPower {
    /// `S * cos(phi)`
    pub fn active_power(self, angle: Angle) -> ActivePower {
        ActivePower(self.0 * angle.cos())
    }

    /// `S * sin(phi)`
    pub fn reactive_power(self, angle: Angle) -> ReactivePower {
        ReactivePower(self.0 * angle.sin())
    }
}

impl Mul<Time> for ActivePower {
    type Output = ActiveEnergy;
    fn mul(self, rhs: Time) -> ActiveEnergy {
        ActiveEnergy(self.0 * rhs.0 / 3600.0)
    }
}

/// Power factor, undefined when there is no apparent power.
impl Div<ApparentPower> for ActivePower {
    type Output = Option<PowerFactor>;
    fn div(self, rhs: ApparentPower) -> Option<PowerFactor> {
        if rhs.0 == 0.0 {
            None
        } else {
            Some(PowerFactor(self.0 / rhs.0))
        }
    }
}

impl Div<MeterConstant> for Impulses {
    type Output = ActiveEnergy;
    fn div(self, rhs: MeterConstant) -> ActiveEnergy {
        ActiveEnergy(self.0 / rhs.0 * 1000.0)
    }
}

impl Mul<MeterConstant> for ActiveEnergy {
    type Output = Impulses;
    fn mul(self, rhs: MeterConstant) -> Impulses {
        Impulses(self.0 / 1000.0 * rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn same_unit_arithmetic() {
        let sum = Voltage::new(220.0) + Voltage::new(10.0) - Voltage::new(5.0);
        assert_eq!(f64::from(sum), 225.0);
        assert_eq!(f64::from(-sum), -225.0);
        assert_eq!(f64::from(Angle::new(370.0) % Angle::new(360.0)), 10.0);
        assert_eq!(f64::from(Current::new(2.0) * 3.0), 6.0);
        assert_eq!(Current::new(6.0) / Current::new(2.0), 3.0);
        let total: ActivePower = [1.0, 2.0, 3.0].into_iter().map(ActivePower::new).sum();
        assert_eq!(f64::from(total), 6.0);
    }

    #[test]
    fn energy_from_power_and_time() {
        let energy = ActivePower::new(1800.0) * Time::new(60.0);
        assert!(close(f64::from(energy), 30.0));
    }

    #[test]
    fn power_factor_requires_apparent_power() {
        let pf = ActivePower::new(50.0) / ApparentPower::new(100.0);
        assert_eq!(pf, Some(PowerFactor::new(0.5)));
        assert_eq!(ActivePower::new(50.0) / ApparentPower::new(0.0), None);
    }

    #[test]
    fn impulses_and_meter_constant() {
        let energy = Impulses::new(600.0) / MeterConstant::new(10_000.0);
        assert!(close(f64::from(energy), 60.0));
        let impulses = energy * MeterConstant::new(10_000.0);
        assert!(close(f64::from(impulses), 600.0));
    }

    #[test]
    fn power_triangle() {
        let s = Voltage::new(230.0) * Current::new(10.0);
        assert_eq!(f64::from(s), 2300.0);
        assert!(close(f64::from(s.active_power(Angle::new(60.0))), 1150.0));
        assert!(close(f64::from(s.reactive_power(Angle::new(90.0))), 2300.0));
    }

    #[test]
    fn angle_helpers() {
        assert!(close(Angle::new(90.0).sin(), 1.0));
        assert!(close(Angle::new(180.0).cos(), -1.0));
        assert_eq!(Angle::new(-30.0).normalize(), Angle::new(330.0));
        assert_eq!(Angle::new(360.0).normalize(), Angle::new(0.0));
    }

    #[test]
    fn display_includes_unit() {
        assert_eq!(Voltage::new(230.0).to_string(), "230 V");
        assert_eq!(PowerFactor::new(0.5).to_string(), "0.5");
        assert_eq!(serde_json::to_string(&Current::new(1.5)).ok().as_deref(), Some("1.5"));
    }
}
