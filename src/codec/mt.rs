//! MT768 family.
//!
//! Source commands carry an `S` prefix and are acknowledged with `SOK` plus
//! the command code. Angles go on the wire exactly as requested. The system
//! level queries (firmware, ranges) have no prefix and answer with their own
//! code followed by `ACK`.

use super::{DeviceFamily, FamilyCodec, Request};
use crate::loadpoint::Loadpoint;
use crate::units::Angle;

/// Codec for MT768 meter test systems.
#[derive(Debug, Clone, Copy, Default)]
pub struct MtCodec;

impl FamilyCodec for MtCodec {
    fn family(&self) -> DeviceFamily {
        DeviceFamily::Mt
    }

    fn prefix(&self) -> &'static str {
        "S"
    }

    fn ack(&self, code: &str) -> String {
        format!("SOK{code}")
    }

    fn wire_angle(&self, _loadpoint: &Loadpoint, angle: Angle) -> Angle {
        angle
    }

    fn firmware_request(&self) -> Request {
        Request::new("AAV", "AAVACK").with_min_lines(2)
    }

    fn voltage_ranges_request(&self) -> Option<Request> {
        Some(Request::new("AVI", "AVIACK").with_min_lines(2))
    }

    fn current_ranges_request(&self) -> Option<Request> {
        Some(Request::new("AII", "AIIACK").with_min_lines(2))
    }

    fn status_request(&self) -> Request {
        self.source_command("SM", "").with_min_lines(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::tests::{fixture_loadpoint, lines};

    fn commands(current_base: f64) -> Vec<String> {
        MtCodec
            .encode_loadpoint(&fixture_loadpoint(current_base))
            .into_iter()
            .map(|r| r.command)
            .collect()
    }

    #[test]
    fn encodes_fixture_loadpoint() {
        assert_eq!(
            commands(0.01),
            vec![
                "SFR50.00",
                "SUPAER220.000000.00S221.000120.00T222.000240.00",
                "SIPAAR000.010000.00S000.020120.00T000.030240.00",
                "SUIEAEPPAAAA",
            ]
        );
        assert_eq!(commands(0.5)[2], "SIPAAR000.500000.00S001.000120.00T001.500240.00");
    }

    #[test]
    fn encoding_is_deterministic() {
        assert_eq!(commands(0.01), commands(0.01));
    }

    #[test]
    fn disabled_phase_with_garbage_keeps_width() {
        let requests = MtCodec.encode_loadpoint(&crate::codec::tests::garbage_in_disabled_phase());
        assert_eq!(requests[1].command, "SUPAER220.000000.00S221.000120.00T000.000000.00");
        assert_eq!(requests[2].command, "SIPAAR000.010000.00S000.020120.00T000.000000.00");
        assert_eq!(requests[3].command, "SUIEAAPPAAAA");
    }

    #[test]
    fn angle_just_below_full_turn_is_sent_as_zero() {
        let mut loadpoint = fixture_loadpoint(0.01);
        loadpoint.phases[0].voltage.angle = Angle::new(359.996);

        let voltage = &MtCodec.encode_voltage(&loadpoint).command;
        assert_eq!(voltage, "SUPAER220.000000.00S221.000120.00T222.000240.00");
    }

    #[test]
    fn acknowledgements() {
        let requests = MtCodec.encode_loadpoint(&fixture_loadpoint(0.01));
        let acks: Vec<&str> = requests.iter().map(|r| r.terminator.as_str()).collect();
        assert_eq!(acks, vec!["SOKFR", "SOKUP", "SOKIP", "SOKUI"]);
        assert_eq!(MtCodec.turn_off(), Request::new("SUIAAAAAAAAA", "SOKUI"));
        assert_eq!(MtCodec.status_request().command, "SSM");
        assert_eq!(MtCodec.status_request().terminator, "SOKSM");
    }

    #[test]
    fn firmware_uses_line_before_ack() {
        let fw = MtCodec.decode_firmware(&lines(&["MT786V06.08", "AAVACK"])).unwrap();
        assert_eq!(fw.model_name, "MT786");
        assert_eq!(fw.version, "06.08");
    }
}
