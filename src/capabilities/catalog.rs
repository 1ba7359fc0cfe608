//! Static amplifier catalog.
//!
//! Two process wide tables, built once on first use and never mutated, map a
//! canonical amplifier key to the envelope that amplifier contributes. A
//! device capability is the merge of one voltage row and one current row.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use tracing::debug;

use super::{
    CapabilityDescription, CurrentAmplifier, FrequencyMode, FrequencyRange, PhaseSpec,
    QuantityRange, VoltageAmplifier,
};
use crate::error::{MtsError, Result};
use crate::units::{Current, Frequency, Voltage};

/// Key shared by both tables for the integrated MT source.
pub const MT_MODEL_KEY: &str = "MT786";

const VOLTAGE_RANGES: [f64; 5] = [5.0, 60.0, 125.0, 250.0, 420.0];
const VOLTAGE_RANGES_LOW: [f64; 4] = [5.0, 60.0, 125.0, 250.0];
const CURRENT_RANGES: [f64; 12] = [
    0.02, 0.05, 0.1, 0.2, 0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0,
];

/// One catalog row.
///
/// Rows are lists so that the merge can check it received exactly one phase
/// spec and exactly one frequency range from each side.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    /// Phase envelopes, exactly one in a well formed row.
    pub phases: Vec<PhaseSpec>,
    /// Frequency envelopes, exactly one in a well formed row.
    pub frequency_ranges: Vec<FrequencyRange>,
    /// Discrete hardware ranges, ascending.
    pub ranges: Vec<f64>,
}

fn synthetic(min: f64, max: f64) -> FrequencyRange {
    FrequencyRange {
        min: Frequency::new(min),
        max: Frequency::new(max),
        precision: Frequency::new(0.01),
        mode: FrequencyMode::Synthetic,
    }
}

fn voltage_row(frequency: FrequencyRange, min: f64, max: f64, ranges: &[f64]) -> CatalogEntry {
    CatalogEntry {
        phases: vec![PhaseSpec {
            voltage: Some(QuantityRange::new(
                Voltage::new(min),
                Voltage::new(max),
                Voltage::new(0.001),
            )),
            current: None,
        }],
        frequency_ranges: vec![frequency],
        ranges: ranges.to_vec(),
    }
}

fn current_row(frequency: FrequencyRange, min: f64, max: f64, precision: f64) -> CatalogEntry {
    CatalogEntry {
        phases: vec![PhaseSpec {
            voltage: None,
            current: Some(QuantityRange::new(
                Current::new(min),
                Current::new(max),
                Current::new(precision),
            )),
        }],
        frequency_ranges: vec![frequency],
        ranges: CURRENT_RANGES.to_vec(),
    }
}

static VOLTAGE_TABLE: Lazy<HashMap<&'static str, CatalogEntry>> = Lazy::new(|| {
    HashMap::from([
        (MT_MODEL_KEY, voltage_row(synthetic(45.0, 65.0), 20.0, 500.0, &VOLTAGE_RANGES)),
        ("VU211", voltage_row(synthetic(40.0, 70.0), 30.0, 480.0, &VOLTAGE_RANGES)),
        ("VU220", voltage_row(synthetic(40.0, 70.0), 30.0, 320.0, &VOLTAGE_RANGES_LOW)),
        ("VU221", voltage_row(synthetic(40.0, 70.0), 30.0, 320.0, &VOLTAGE_RANGES_LOW)),
        ("VUI302", voltage_row(synthetic(40.0, 70.0), 30.0, 320.0, &VOLTAGE_RANGES_LOW)),
        ("SVG3020", voltage_row(synthetic(15.0, 70.0), 30.0, 600.0, &VOLTAGE_RANGES)),
    ])
});

static CURRENT_TABLE: Lazy<HashMap<&'static str, CatalogEntry>> = Lazy::new(|| {
    HashMap::from([
        (MT_MODEL_KEY, current_row(synthetic(45.0, 65.0), 0.001, 120.0, 0.001)),
        ("VI201", current_row(synthetic(15.0, 70.0), 500e-6, 160.0, 0.0001)),
        ("VI202", current_row(synthetic(15.0, 70.0), 500e-6, 120.0, 0.0001)),
        ("VI220", current_row(synthetic(15.0, 70.0), 500e-6, 120.0, 0.0001)),
        ("VI221", current_row(synthetic(15.0, 70.0), 500e-6, 120.0, 0.0001)),
        ("VI222", current_row(synthetic(40.0, 70.0), 500e-6, 120.0, 0.0001)),
        ("VUI302", current_row(synthetic(40.0, 70.0), 12e-3, 120.0, 0.001)),
        ("SCG1020", current_row(synthetic(15.0, 70.0), 0.001, 120.0, 0.0001)),
    ])
});

/// Voltage row for a canonical key.
pub fn voltage_entry(key: &str) -> Result<&'static CatalogEntry> {
    VOLTAGE_TABLE
        .get(key)
        .ok_or_else(|| MtsError::Configuration(format!("unknown voltage amplifier '{key}'")))
}

/// Current row for a canonical key.
pub fn current_entry(key: &str) -> Result<&'static CatalogEntry> {
    CURRENT_TABLE
        .get(key)
        .ok_or_else(|| MtsError::Configuration(format!("unknown current amplifier '{key}'")))
}

/// Row of the catalog model behind `amplifier`.
pub fn lookup_voltage(amplifier: VoltageAmplifier) -> Result<&'static CatalogEntry> {
    voltage_entry(amplifier.catalog_key())
}

/// Row of the catalog model behind `amplifier`.
pub fn lookup_current(amplifier: CurrentAmplifier) -> Result<&'static CatalogEntry> {
    current_entry(amplifier.catalog_key())
}

/// Combines a voltage row and a current row into a three phase description.
///
/// # Errors
///
/// `Configuration` for unknown keys, `Internal` when a row breaks the merge
/// invariants.
pub fn merge(voltage_key: &str, current_key: &str) -> Result<CapabilityDescription> {
    let merged = merge_entries(voltage_entry(voltage_key)?, current_entry(current_key)?)?;
    debug!(voltage_key, current_key, "merged amplifier capabilities");
    Ok(merged)
}

/// Capability of a voltage and current amplifier pair.
pub fn capabilities_for(
    voltage: VoltageAmplifier,
    current: CurrentAmplifier,
) -> Result<CapabilityDescription> {
    merge(voltage.catalog_key(), current.catalog_key())
}

/// Capability of an integrated device whose model name keys both tables.
pub fn capabilities_by_model(model: &str) -> Result<CapabilityDescription> {
    merge(model, model)
}

/// Merges two rows, checking that each holds one phase spec and one
/// frequency range and that both frequency modes agree.
pub fn merge_entries(voltage: &CatalogEntry, current: &CatalogEntry) -> Result<CapabilityDescription> {
    let (voltage_phase, voltage_freq) = single(voltage, "voltage")?;
    let (current_phase, current_freq) = single(current, "current")?;

    if voltage_freq.mode != current_freq.mode {
        return Err(MtsError::Internal(format!(
            "frequency modes differ: {} vs {}",
            voltage_freq.mode, current_freq.mode
        )));
    }

    let frequency = FrequencyRange {
        min: max_of(voltage_freq.min, current_freq.min),
        max: min_of(voltage_freq.max, current_freq.max),
        precision: max_of(voltage_freq.precision, current_freq.precision),
        mode: voltage_freq.mode,
    };

    if frequency.min > frequency.max {
        return Err(MtsError::Internal(
            "amplifier frequency ranges do not overlap".into(),
        ));
    }

    let phase = PhaseSpec {
        voltage: voltage_phase.voltage,
        current: current_phase.current,
    };

    Ok(CapabilityDescription::symmetric(phase, frequency))
}

fn single<'a>(entry: &'a CatalogEntry, side: &str) -> Result<(&'a PhaseSpec, &'a FrequencyRange)> {
    match (entry.phases.as_slice(), entry.frequency_ranges.as_slice()) {
        ([phase], [frequency]) => Ok((phase, frequency)),
        (phases, frequencies) => Err(MtsError::Internal(format!(
            "{side} entry must have exactly one phase and one frequency range, got {} and {}",
            phases.len(),
            frequencies.len()
        ))),
    }
}

fn max_of(a: Frequency, b: Frequency) -> Frequency {
    if a >= b {
        a
    } else {
        b
    }
}

fn min_of(a: Frequency, b: Frequency) -> Frequency {
    if a <= b {
        a
    } else {
        b
    }
}

fn sorted(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(f64::total_cmp);
    values
}

/// Discrete voltage ranges of an amplifier, ascending.
pub fn voltage_ranges_for(amplifier: VoltageAmplifier) -> Result<Vec<Voltage>> {
    let entry = lookup_voltage(amplifier)?;
    Ok(sorted(entry.ranges.clone()).into_iter().map(Voltage::new).collect())
}

/// Discrete current ranges of an amplifier, ascending.
pub fn current_ranges_for(amplifier: CurrentAmplifier) -> Result<Vec<Current>> {
    let entry = lookup_current(amplifier)?;
    Ok(sorted(entry.ranges.clone()).into_iter().map(Current::new).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_catalog_pair_merges_symmetric() {
        for voltage in VoltageAmplifier::ALL {
            for current in CurrentAmplifier::ALL {
                let caps = capabilities_for(*voltage, *current).unwrap();
                assert_eq!(caps.phases[0], caps.phases[1]);
                assert_eq!(caps.phases[1], caps.phases[2]);

                let v = lookup_voltage(*voltage).unwrap().frequency_ranges[0];
                let c = lookup_current(*current).unwrap().frequency_ranges[0];
                assert_eq!(caps.frequency.min, max_of(v.min, c.min));
                assert_eq!(caps.frequency.max, min_of(v.max, c.max));
            }
        }
    }

    #[test]
    fn model_capabilities() {
        let caps = capabilities_by_model(MT_MODEL_KEY).unwrap();
        assert_eq!(caps.frequency.min, Frequency::new(45.0));
        assert_eq!(caps.frequency.max, Frequency::new(65.0));
        let voltage = caps.phases[0].voltage.unwrap();
        assert_eq!(voltage.max, Voltage::new(500.0));
        let current = caps.phases[2].current.unwrap();
        assert_eq!(current.max, Current::new(120.0));
    }

    #[test]
    fn frequency_intersection_takes_tighter_bounds() {
        let caps = merge("SVG3020", "VI222").unwrap();
        assert_eq!(caps.frequency.min, Frequency::new(40.0));
        assert_eq!(caps.frequency.max, Frequency::new(70.0));

        let caps = merge("VU220", "VI201").unwrap();
        assert_eq!(caps.frequency.min, Frequency::new(40.0));
    }

    #[test]
    fn unknown_key_is_configuration_error() {
        assert!(matches!(merge("VU999", "VI220"), Err(MtsError::Configuration(_))));
        assert!(matches!(merge("VU220", "VI999"), Err(MtsError::Configuration(_))));
    }

    #[test]
    fn merge_rejects_malformed_rows() {
        let voltage = voltage_entry("VU220").unwrap();
        let current = current_entry("VI220").unwrap();

        let mut doubled = voltage.clone();
        doubled.phases.push(doubled.phases[0]);
        assert!(matches!(merge_entries(&doubled, current), Err(MtsError::Internal(_))));

        let mut no_frequency = current.clone();
        no_frequency.frequency_ranges.clear();
        assert!(matches!(merge_entries(voltage, &no_frequency), Err(MtsError::Internal(_))));

        let mut grid = current.clone();
        grid.frequency_ranges[0].mode = FrequencyMode::GridSynchronous;
        assert!(matches!(merge_entries(voltage, &grid), Err(MtsError::Internal(_))));
    }

    #[test]
    fn ranges_are_ascending() {
        let ranges = voltage_ranges_for(VoltageAmplifier::VU220x01).unwrap();
        assert_eq!(ranges.first().copied(), Some(Voltage::new(5.0)));
        assert_eq!(ranges.last().copied(), Some(Voltage::new(250.0)));
        assert!(ranges.windows(2).all(|w| w[0] < w[1]));

        let ranges = current_ranges_for(CurrentAmplifier::VUI302).unwrap();
        assert_eq!(ranges.len(), 12);
        assert_eq!(ranges[0], Current::new(0.02));
    }
}
