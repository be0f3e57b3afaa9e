//! Local bus record schema
//!
//! Accepted readings are republished on the trusted multicast bus as
//! human-readable YAML, keyed by meter serial number. Downstream sinks
//! (database writers, plotters) consume these independently; the schema
//! is fixed so they can address fields by name.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::ReadingRecord;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("Malformed bus record: {0}")]
    Malformed(#[from] serde_yaml::Error),
}

/// One published reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusRecord {
    pub meter: BusMeter,
    /// Reading time, seconds since the Unix epoch
    pub timestamp: u32,
    /// Meter uptime in seconds
    pub uptime: u32,
    /// Link round-trip time in milliseconds
    pub rtt: f64,
}

/// Meter identity and the decoded reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMeter {
    pub model: String,
    #[serde(rename = "serialNumber")]
    pub serial_number: String,
    pub reading: BusReading,
}

/// Electrical values in conventional units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusReading {
    /// Volts
    pub voltage: f64,
    /// Amperes
    pub current: f64,
    /// Hertz
    pub frequency: f64,
    /// Watts
    pub active_power: i16,
    /// Volt-amperes reactive
    pub reactive_power: i16,
    /// Volt-amperes
    pub apparent_power: i16,
    /// Percent
    pub power_factor: f64,
    /// Kilowatt-hours
    pub active_energy: f64,
    /// Kilowatt-hours
    pub reactive_energy: f64,
    /// Degrees Celsius
    pub temperature: i8,
}

impl BusRecord {
    /// Build a bus record from a decoded reading and the configured
    /// meter identity. Timestamp, uptime, and rtt live at the top
    /// level, not inside the nested reading.
    pub fn from_reading(serial_number: &str, model: &str, record: &ReadingRecord) -> Self {
        Self {
            meter: BusMeter {
                model: model.to_string(),
                serial_number: serial_number.to_string(),
                reading: BusReading {
                    voltage: record.volts(),
                    current: record.amps(),
                    frequency: record.hertz(),
                    active_power: record.active_power,
                    reactive_power: record.reactive_power,
                    apparent_power: record.apparent_power,
                    power_factor: record.power_factor_percent(),
                    active_energy: record.active_kwh(),
                    reactive_energy: record.reactive_kwh(),
                    temperature: record.temperature,
                },
            },
            timestamp: record.timestamp,
            uptime: record.uptime_secs(),
            rtt: record.rtt_ms(),
        }
    }

    /// Serialize for the bus
    pub fn to_yaml(&self) -> Result<String, BusError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Parse a record received from the bus
    pub fn from_yaml(data: &str) -> Result<Self, BusError> {
        Ok(serde_yaml::from_str(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> ReadingRecord {
        ReadingRecord {
            timestamp: 1_700_000_000,
            voltage: 2300,
            current: 15,
            frequency: 500,
            active_power: 500,
            reactive_power: -120,
            apparent_power: 520,
            power_factor: 961,
            active_energy: 123_456,
            reactive_energy: 7_890,
            temperature: 21,
            uptime_high: 0,
            uptime_low: 3600,
            rtt_raw: 625,
        }
    }

    #[test]
    fn test_from_reading() {
        let record = BusRecord::from_reading("22081234", "RI-D19-80-C", &sample_record());

        assert_eq!(record.meter.serial_number, "22081234");
        assert_eq!(record.meter.model, "RI-D19-80-C");
        assert_eq!(record.meter.reading.voltage, 230.0);
        assert_eq!(record.meter.reading.active_power, 500);
        assert_eq!(record.meter.reading.active_energy, 1234.56);
        assert_eq!(record.timestamp, 1_700_000_000);
        assert_eq!(record.uptime, 3600);
        assert_eq!(record.rtt, 10.0);
    }

    #[test]
    fn test_yaml_round_trip() {
        let record = BusRecord::from_reading("22081234", "RI-D19-80-C", &sample_record());

        let yaml = record.to_yaml().unwrap();
        // Field names are the bus contract, not an implementation detail.
        assert!(yaml.contains("serialNumber:"));
        assert!(yaml.contains("22081234"));
        assert!(yaml.contains("activePower: 500"));
        assert!(yaml.contains("voltage: 230.0"));
        assert!(yaml.contains("timestamp: 1700000000"));

        assert_eq!(BusRecord::from_yaml(&yaml).unwrap(), record);
    }

    #[test]
    fn test_malformed_record_rejected() {
        assert!(BusRecord::from_yaml("meter: [not, a, mapping]").is_err());
        assert!(BusRecord::from_yaml(":::").is_err());
    }
}
