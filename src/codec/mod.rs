//! Wire codecs for the supported device families.
//!
//! A codec turns a validated [`Loadpoint`] into the ordered command lines of
//! one family and interprets the reply lines coming back. Codecs are pure:
//! the same input always yields the same commands.
//!
//! Both families share the numeric layout of a command:
//!
//! | field     | format     | example   |
//! |-----------|------------|-----------|
//! | frequency | `{:05.2}`  | `50.00`   |
//! | rms       | `{:07.3}`  | `220.000` |
//! | angle     | `{:06.2}`  | `120.00`  |
//!
//! and tag the phases `R`, `S`, `T`. They differ in command prefix,
//! acknowledgement tokens and angle reference, see [`mt`] and [`fg`].

use std::{fmt, str::FromStr, sync::Arc};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{MtsError, Result};
use crate::loadpoint::Loadpoint;
use crate::units::{Angle, Frequency};
use crate::validation::angle_in_domain;

pub mod fg;
pub mod mt;

pub use fg::FgCodec;
pub use mt::MtCodec;

/// Phase labels in wire order.
pub const PHASE_TAGS: [char; 3] = ['R', 'S', 'T'];

/// One command line and the reply line that completes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Line written to the device, without line ending.
    pub command: String,
    /// Reply line that ends the exchange.
    pub terminator: String,
    /// Reply lines the command must produce, terminator included.
    pub min_lines: usize,
}

impl Request {
    /// Request expecting nothing but the terminator.
    pub fn new(command: impl Into<String>, terminator: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            terminator: terminator.into(),
            min_lines: 1,
        }
    }

    /// Sets the number of reply lines, terminator included.
    pub fn with_min_lines(mut self, min_lines: usize) -> Self {
        self.min_lines = min_lines;
        self
    }

    /// Fails with `Protocol` when `reply` is shorter than declared.
    pub fn check_reply(&self, reply: &[String]) -> Result<()> {
        if reply.len() < self.min_lines {
            return Err(MtsError::Protocol(format!(
                "wrong number of response lines to '{}' - expected {} but got {}",
                self.command,
                self.min_lines,
                reply.len()
            )));
        }
        Ok(())
    }
}

/// Model name and firmware version reported by a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareVersion {
    /// Everything before the last `V`.
    pub model_name: String,
    /// Everything after it.
    pub version: String,
}

/// Fault flags reported by the source status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct ErrorConditions {
    pub voltage_overload: [bool; 3],
    pub current_overload: [bool; 3],
    pub emergency_stop: bool,
    pub isolation_failure: bool,
    pub long_term_overload: bool,
    pub amplifier_fault: bool,
}

impl ErrorConditions {
    /// Decodes the status word; bits 0 to 9 in field order.
    pub fn from_bits(bits: u32) -> Self {
        let bit = |n: u32| bits & (1 << n) != 0;
        Self {
            voltage_overload: [bit(0), bit(1), bit(2)],
            current_overload: [bit(3), bit(4), bit(5)],
            emergency_stop: bit(6),
            isolation_failure: bit(7),
            long_term_overload: bit(8),
            amplifier_fault: bit(9),
        }
    }

    /// True if any flag is set.
    pub fn any(&self) -> bool {
        *self != Self::default()
    }
}

/// Device family a session talks to, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceFamily {
    /// MT768 meter test systems.
    #[serde(rename = "MT")]
    Mt,
    /// FG30x frequency generators.
    #[serde(rename = "FG")]
    Fg,
}

impl DeviceFamily {
    /// Codec speaking this family's protocol.
    pub fn codec(self) -> Arc<dyn FamilyCodec> {
        match self {
            DeviceFamily::Mt => Arc::new(MtCodec),
            DeviceFamily::Fg => Arc::new(FgCodec),
        }
    }
}

impl fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceFamily::Mt => "MT",
            DeviceFamily::Fg => "FG",
        })
    }
}

impl FromStr for DeviceFamily {
    type Err = MtsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MT" => Ok(DeviceFamily::Mt),
            "FG" => Ok(DeviceFamily::Fg),
            other => Err(MtsError::Configuration(format!("unknown device family '{other}'"))),
        }
    }
}

#[allow(clippy::expect_used)]
static FIRMWARE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^(.+)V([^V]+)$").expect("firmware pattern is valid"));

/// Splits `<model>V<version>` at the last literal `V`.
pub fn parse_firmware_line(line: &str) -> Result<FirmwareVersion> {
    let captures = FIRMWARE_PATTERN
        .captures(line)
        .ok_or_else(|| MtsError::Protocol(format!("invalid response {line} from device")))?;
    Ok(FirmwareVersion {
        model_name: captures[1].to_string(),
        version: captures[2].to_string(),
    })
}

/// Frequency field, `{:05.2}`.
pub fn format_frequency(value: Frequency) -> String {
    format!("{:05.2}", f64::from(value))
}

/// Magnitude field, `{:07.3}`.
pub fn format_rms(value: f64) -> String {
    format!("{:07.3}", value + 0.0)
}

/// Angle field, `{:06.2}`, see [`wire_degrees`].
pub fn format_angle(value: Angle) -> String {
    format!("{:06.2}", wire_degrees(value))
}

/// Degrees rounded to the 0.01 wire resolution and wrapped into `[0, 360)`.
///
/// Rounding happens first so that 359.996 goes out as `000.00` and never
/// as `360.00`.
pub fn wire_degrees(value: Angle) -> f64 {
    // `+ 0.0` turns -0.0 into 0.0, which would otherwise print with a sign
    ((f64::from(value) * 100.0).round() / 100.0).rem_euclid(360.0) + 0.0
}

/// True if `value` fits the seven character magnitude field.
pub fn rms_encodable(value: f64) -> bool {
    value.is_finite() && value >= 0.0 && (value * 1000.0).round() < 1_000_000.0
}

/// Field sent for a switched off channel whose values do not fit the layout.
pub const NEUTRAL_COMPONENT: &str = "000.000000.00";

/// The wire protocol of one device family.
///
/// Implementors supply the family specific hooks (prefix, acknowledgement
/// tokens, angle reference, query commands). The encoders built on top of
/// them are shared.
pub trait FamilyCodec: Send + Sync + fmt::Debug {
    /// Family this codec speaks.
    fn family(&self) -> DeviceFamily;

    /// Literal prepended to every source command.
    fn prefix(&self) -> &'static str;

    /// Acknowledgement token for a source command code such as `FR`.
    fn ack(&self, code: &str) -> String;

    /// Angle as it goes on the wire for `loadpoint`.
    fn wire_angle(&self, loadpoint: &Loadpoint, angle: Angle) -> Angle;

    /// Identification query.
    fn firmware_request(&self) -> Request;

    /// Device query for its voltage ranges, `None` if the family has none.
    fn voltage_ranges_request(&self) -> Option<Request>;

    /// Device query for its current ranges, `None` if the family has none.
    fn current_ranges_request(&self) -> Option<Request>;

    /// Error condition query.
    fn status_request(&self) -> Request;

    /// Wraps `body` into a prefixed source command acknowledged by [`Self::ack`].
    fn source_command(&self, code: &str, body: &str) -> Request {
        Request::new(format!("{}{code}{body}", self.prefix()), self.ack(code))
    }

    /// `FR` command.
    fn encode_frequency(&self, loadpoint: &Loadpoint) -> Request {
        self.source_command("FR", &format_frequency(loadpoint.frequency.value))
    }

    /// Magnitude and angle of one channel.
    ///
    /// Only switched on channels are validated, so a switched off channel
    /// may still hold NaN, a negative magnitude or an angle outside
    /// `[0, 360)`. Such a channel goes out as [`NEUTRAL_COMPONENT`] to keep
    /// the command at its fixed width.
    fn encode_component(&self, loadpoint: &Loadpoint, rms: f64, angle: Angle, on: bool) -> String {
        if !on && !(rms_encodable(rms) && angle_in_domain(angle)) {
            return NEUTRAL_COMPONENT.to_string();
        }
        format!("{}{}", format_rms(rms), format_angle(self.wire_angle(loadpoint, angle)))
    }

    /// Voltage of all three phases in one command.
    fn encode_voltage(&self, loadpoint: &Loadpoint) -> Request {
        let mut body = String::from("AE");
        for (tag, phase) in PHASE_TAGS.iter().zip(loadpoint.phases.iter()) {
            let voltage = &phase.voltage;
            body.push(*tag);
            body.push_str(&self.encode_component(loadpoint, f64::from(voltage.rms), voltage.angle, voltage.on));
        }
        self.source_command("UP", &body)
    }

    /// Current of all three phases in one command.
    fn encode_current(&self, loadpoint: &Loadpoint) -> Request {
        let mut body = String::from("AA");
        for (tag, phase) in PHASE_TAGS.iter().zip(loadpoint.phases.iter()) {
            let current = &phase.current;
            body.push(*tag);
            body.push_str(&self.encode_component(loadpoint, f64::from(current.rms), current.angle, current.on));
        }
        self.source_command("IP", &body)
    }

    /// Channel enable mask: three voltage flags, three current flags and
    /// three auxiliary flags which are always off.
    fn encode_enable(&self, loadpoint: &Loadpoint) -> Request {
        let voltages = loadpoint.phases.iter().map(|p| if p.voltage.on { 'E' } else { 'A' });
        let currents = loadpoint.phases.iter().map(|p| if p.current.on { 'P' } else { 'A' });
        let mask: String = voltages.chain(currents).chain("AAA".chars()).collect();
        self.source_command("UI", &mask)
    }

    /// Frequency, voltage, current, enable. Always in that order.
    fn encode_loadpoint(&self, loadpoint: &Loadpoint) -> Vec<Request> {
        vec![
            self.encode_frequency(loadpoint),
            self.encode_voltage(loadpoint),
            self.encode_current(loadpoint),
            self.encode_enable(loadpoint),
        ]
    }

    /// Switches every channel off.
    fn turn_off(&self) -> Request {
        self.source_command("UI", "AAAAAAAAA")
    }

    /// Identification line precedes the terminator.
    fn decode_firmware(&self, reply: &[String]) -> Result<FirmwareVersion> {
        self.firmware_request().check_reply(reply)?;
        parse_firmware_line(&reply[reply.len() - 2])
    }

    /// Every line except the terminator is one magnitude.
    fn decode_ranges(&self, request: &Request, reply: &[String]) -> Result<Vec<f64>> {
        request.check_reply(reply)?;
        let mut ranges = reply
            .iter()
            .filter(|line| **line != request.terminator)
            .map(|line| {
                line.trim().parse::<f64>().map_err(|_| {
                    MtsError::Protocol(format!("invalid range '{line}' in reply to '{}'", request.command))
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        ranges.sort_by(f64::total_cmp);
        Ok(ranges)
    }

    /// Status line `SM<hex>` precedes the terminator.
    fn decode_status(&self, reply: &[String]) -> Result<ErrorConditions> {
        let request = self.status_request();
        request.check_reply(reply)?;
        let line = &reply[reply.len() - 2];
        let bits = line
            .strip_prefix("SM")
            .and_then(|hex| u32::from_str_radix(hex.trim(), 16).ok())
            .ok_or_else(|| MtsError::Protocol(format!("invalid status '{line}'")))?;
        Ok(ErrorConditions::from_bits(bits))
    }
}
