//! FG30x family.
//!
//! No command prefix, acknowledgements are `OK` plus the command code. The
//! generator counts angles against the L1 voltage in the opposite direction,
//! so every angle is sent as `(angle(U1) - angle) mod 360`.
//!
//! FG devices do not report their ranges; those come from the amplifier
//! catalog.

use super::{DeviceFamily, FamilyCodec, Request};
use crate::loadpoint::Loadpoint;
use crate::units::Angle;

/// Codec for FG30x frequency generators.
#[derive(Debug, Clone, Copy, Default)]
pub struct FgCodec;

impl FamilyCodec for FgCodec {
    fn family(&self) -> DeviceFamily {
        DeviceFamily::Fg
    }

    fn prefix(&self) -> &'static str {
        ""
    }

    fn ack(&self, code: &str) -> String {
        format!("OK{code}")
    }

    fn wire_angle(&self, loadpoint: &Loadpoint, angle: Angle) -> Angle {
        // a switched off U1 is not validated and may hold NaN
        let reference = loadpoint.phases[0].voltage.angle;
        let reference = if f64::from(reference).is_finite() { reference } else { Angle::new(0.0) };
        (reference - angle).normalize()
    }

    fn firmware_request(&self) -> Request {
        Request::new("TS", "OKTS").with_min_lines(2)
    }

    fn voltage_ranges_request(&self) -> Option<Request> {
        None
    }

    fn current_ranges_request(&self) -> Option<Request> {
        None
    }

    fn status_request(&self) -> Request {
        self.source_command("SM", "").with_min_lines(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::tests::{fixture_loadpoint, lines};
    use crate::loadpoint::{PhaseComponent, PhaseLoadpoint};
    use crate::units::{Current, Voltage};

    fn commands(loadpoint: &Loadpoint) -> Vec<String> {
        FgCodec
            .encode_loadpoint(loadpoint)
            .into_iter()
            .map(|r| r.command)
            .collect()
    }

    #[test]
    fn encodes_fixture_loadpoint() {
        assert_eq!(
            commands(&fixture_loadpoint(0.01)),
            vec![
                "FR50.00",
                "UPAER220.000000.00S221.000240.00T222.000120.00",
                "IPAAR000.010000.00S000.020240.00T000.030120.00",
                "UIEAEPPAAAA",
            ]
        );
        assert_eq!(
            commands(&fixture_loadpoint(0.5))[2],
            "IPAAR000.500000.00S001.000240.00T001.500120.00"
        );
    }

    #[test]
    fn angles_are_relative_to_first_voltage() {
        let phase = |u_angle: f64, i_angle: f64| PhaseLoadpoint {
            voltage: PhaseComponent::new(Voltage::new(120.0), u_angle, true),
            current: PhaseComponent::new(Current::new(10.0), i_angle, true),
        };
        let mut loadpoint = fixture_loadpoint(1.0);
        loadpoint.phases = [phase(330.0, 0.0), phase(210.0, 240.0), phase(90.0, 120.0)];

        assert_eq!(
            commands(&loadpoint),
            vec![
                "FR50.00",
                "UPAER120.000000.00S120.000120.00T120.000240.00",
                "IPAAR010.000330.00S010.000090.00T010.000210.00",
                "UIEEEPPPAAA",
            ]
        );
    }

    #[test]
    fn relative_angle_just_below_full_turn_is_sent_as_zero() {
        let mut loadpoint = fixture_loadpoint(1.0);
        loadpoint.phases[0].voltage.angle = Angle::new(10.0);
        loadpoint.phases[0].current.angle = Angle::new(10.001);

        let current = &commands(&loadpoint)[2];
        assert!(current.starts_with("IPAAR001.000000.00S"), "{current}");
    }

    #[test]
    fn disabled_first_voltage_with_nan_angle() {
        let mut loadpoint = fixture_loadpoint(1.0);
        loadpoint.phases[0].voltage = PhaseComponent::new(Voltage::new(f64::NAN), f64::NAN, false);

        let commands = commands(&loadpoint);
        assert_eq!(commands[1], "UPAER000.000000.00S221.000240.00T222.000120.00");
        assert_eq!(commands[2], "IPAAR001.000000.00S002.000240.00T003.000120.00");
    }

    #[test]
    fn disabled_phase_with_garbage_keeps_width() {
        let commands = commands(&crate::codec::tests::garbage_in_disabled_phase());
        assert_eq!(commands[1], "UPAER220.000000.00S221.000240.00T000.000000.00");
        assert_eq!(commands[2], "IPAAR000.010000.00S000.020240.00T000.000000.00");
    }

    #[test]
    fn acknowledgements() {
        let acks: Vec<String> = FgCodec
            .encode_loadpoint(&fixture_loadpoint(0.01))
            .into_iter()
            .map(|r| r.terminator)
            .collect();
        assert_eq!(acks, vec!["OKFR", "OKUP", "OKIP", "OKUI"]);
        assert_eq!(FgCodec.turn_off().command, "UIAAAAAAAAA");
        assert!(FgCodec.voltage_ranges_request().is_none());
    }

    #[test]
    fn firmware() {
        let fw = FgCodec.decode_firmware(&lines(&["FG301V2.09", "OKTS"])).unwrap();
        assert_eq!(fw.model_name, "FG301");
        assert_eq!(fw.version, "2.09");
    }
}
