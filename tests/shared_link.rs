//! Several MT768 devices sharing one serial link.

use std::time::Duration;

use rust_mts::capabilities::{AmplifierSelection, CurrentAmplifier, ReferenceMeter, VoltageAmplifier};
use rust_mts::channel::{DeviceMock, SerialChannel};
use rust_mts::codec::DeviceFamily;
use rust_mts::error_calculator::{ErrorCalculator, SerialPortMtErrorCalculator};
use rust_mts::metering_system::{AmplifiersAndReferenceMeter, MeteringSystem, SerialPortMtMeteringSystem};
use rust_mts::source::{SerialPortSource, Source};

#[tokio::test]
async fn devices_on_one_link_take_turns() {
    let mock = DeviceMock::new(DeviceFamily::Mt).with_delay(Duration::from_millis(5));
    let log = mock.log();
    let channel = SerialChannel::spawn(Box::new(mock), Duration::from_secs(2));

    let source = SerialPortSource::new(channel.clone(), DeviceFamily::Mt);
    let calculator = SerialPortMtErrorCalculator::new(channel.clone());
    let metering = SerialPortMtMeteringSystem::new(channel);

    let (source_fw, calc_fw, meter_fw, ranges) = tokio::join!(
        source.firmware_version(),
        calculator.firmware_version(),
        metering.firmware_version(),
        source.voltage_ranges(),
    );

    for fw in [source_fw.unwrap(), calc_fw.unwrap(), meter_fw.unwrap()] {
        assert_eq!(fw.model_name, "MT786");
    }
    assert_eq!(ranges.unwrap().len(), 6);

    let commands = log.commands();
    assert_eq!(commands.len(), 4);
    assert_eq!(commands.iter().filter(|c| c.as_str() == "AAV").count(), 3);
    assert!(commands.contains(&"AVI".to_string()));
}

#[tokio::test]
async fn metering_system_hardware_is_fixed_per_session() {
    let channel = SerialChannel::spawn(Box::new(DeviceMock::new(DeviceFamily::Mt)), Duration::from_secs(1));
    let metering = SerialPortMtMeteringSystem::new(channel);

    let hardware = AmplifiersAndReferenceMeter {
        amplifiers: AmplifierSelection::parse("vu211x1", "VI201X0").unwrap(),
        reference_meter: "COM3003x1x2".parse::<ReferenceMeter>().unwrap(),
    };
    metering.set_amplifiers_and_reference_meter(hardware).unwrap();
    assert!(metering.set_amplifiers_and_reference_meter(hardware).is_err());

    let fitted = metering.amplifiers_and_reference_meter().unwrap();
    assert_eq!(fitted.amplifiers.voltage, VoltageAmplifier::VU211x1);
    assert_eq!(fitted.amplifiers.current, CurrentAmplifier::VI201x0);

    let caps = metering.capabilities().await.unwrap().unwrap();
    assert_eq!(f64::from(caps.phases[2].voltage.unwrap().max), 480.0);
    assert_eq!(f64::from(caps.phases[2].current.unwrap().max), 160.0);
    assert_eq!(f64::from(caps.frequency.min), 40.0);
}

#[tokio::test]
async fn error_calculator_job_control_is_immediate() {
    let mock = DeviceMock::new(DeviceFamily::Mt);
    let log = mock.log();
    let calculator = SerialPortMtErrorCalculator::new(SerialChannel::spawn(Box::new(mock), Duration::from_secs(1)));

    calculator.activate_source(true).await.unwrap();
    calculator.abort_all_jobs().await.unwrap();
    calculator.activate_source(false).await.unwrap();
    assert!(log.commands().is_empty());
}
