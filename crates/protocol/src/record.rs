//! Meter reading record codec
//!
//! Each reading is a fixed 32-byte big-endian record produced by the
//! meter firmware. Scaling factors (tenths for the electrical values,
//! hundredths for the energy counters, the split uptime encoding and
//! the 16 µs RTT unit) are fixed by the firmware and carried here as
//! opaque wire constants.

use thiserror::Error;

/// Wire length of one reading record
pub const READING_RECORD_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Invalid record length: expected {READING_RECORD_LEN}, got {0}")]
    InvalidLength(usize),
}

/// One decoded meter reading, in raw wire units.
///
/// Use the accessor methods for values in conventional units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadingRecord {
    /// Reading time, seconds since the Unix epoch
    pub timestamp: u32,
    /// Tenths of a volt
    pub voltage: u16,
    /// Tenths of an ampere
    pub current: u16,
    /// Tenths of a hertz
    pub frequency: u16,
    /// Watts
    pub active_power: i16,
    /// Volt-amperes reactive
    pub reactive_power: i16,
    /// Volt-amperes
    pub apparent_power: i16,
    /// Tenths of a percent
    pub power_factor: i16,
    /// Hundredths of a kilowatt-hour
    pub active_energy: u32,
    /// Hundredths of a kilowatt-hour
    pub reactive_energy: u32,
    /// Degrees Celsius
    pub temperature: i8,
    /// High byte of the 24-bit uptime
    pub uptime_high: u8,
    /// Low 16 bits of the 24-bit uptime
    pub uptime_low: u16,
    /// Round-trip time in 16 µs units
    pub rtt_raw: u16,
}

impl ReadingRecord {
    /// Decode one record from its 32-byte wire form
    pub fn decode(buf: &[u8]) -> Result<Self, RecordError> {
        if buf.len() != READING_RECORD_LEN {
            return Err(RecordError::InvalidLength(buf.len()));
        }

        Ok(Self {
            timestamp: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            voltage: u16::from_be_bytes([buf[4], buf[5]]),
            current: u16::from_be_bytes([buf[6], buf[7]]),
            frequency: u16::from_be_bytes([buf[8], buf[9]]),
            active_power: i16::from_be_bytes([buf[10], buf[11]]),
            reactive_power: i16::from_be_bytes([buf[12], buf[13]]),
            apparent_power: i16::from_be_bytes([buf[14], buf[15]]),
            power_factor: i16::from_be_bytes([buf[16], buf[17]]),
            active_energy: u32::from_be_bytes([buf[18], buf[19], buf[20], buf[21]]),
            reactive_energy: u32::from_be_bytes([buf[22], buf[23], buf[24], buf[25]]),
            temperature: buf[26] as i8,
            uptime_high: buf[27],
            uptime_low: u16::from_be_bytes([buf[28], buf[29]]),
            rtt_raw: u16::from_be_bytes([buf[30], buf[31]]),
        })
    }

    /// Encode the record back to its 32-byte wire form
    pub fn encode(&self) -> [u8; READING_RECORD_LEN] {
        let mut buf = [0u8; READING_RECORD_LEN];
        buf[0..4].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[4..6].copy_from_slice(&self.voltage.to_be_bytes());
        buf[6..8].copy_from_slice(&self.current.to_be_bytes());
        buf[8..10].copy_from_slice(&self.frequency.to_be_bytes());
        buf[10..12].copy_from_slice(&self.active_power.to_be_bytes());
        buf[12..14].copy_from_slice(&self.reactive_power.to_be_bytes());
        buf[14..16].copy_from_slice(&self.apparent_power.to_be_bytes());
        buf[16..18].copy_from_slice(&self.power_factor.to_be_bytes());
        buf[18..22].copy_from_slice(&self.active_energy.to_be_bytes());
        buf[22..26].copy_from_slice(&self.reactive_energy.to_be_bytes());
        buf[26] = self.temperature as u8;
        buf[27] = self.uptime_high;
        buf[28..30].copy_from_slice(&self.uptime_low.to_be_bytes());
        buf[30..32].copy_from_slice(&self.rtt_raw.to_be_bytes());
        buf
    }

    /// Line voltage in volts
    pub fn volts(&self) -> f64 {
        f64::from(self.voltage) / 10.0
    }

    /// Line current in amperes
    pub fn amps(&self) -> f64 {
        f64::from(self.current) / 10.0
    }

    /// Line frequency in hertz
    pub fn hertz(&self) -> f64 {
        f64::from(self.frequency) / 10.0
    }

    /// Power factor in percent
    pub fn power_factor_percent(&self) -> f64 {
        f64::from(self.power_factor) / 10.0
    }

    /// Active energy counter in kilowatt-hours
    pub fn active_kwh(&self) -> f64 {
        f64::from(self.active_energy) / 100.0
    }

    /// Reactive energy counter in kilowatt-hours
    pub fn reactive_kwh(&self) -> f64 {
        f64::from(self.reactive_energy) / 100.0
    }

    /// Meter uptime in seconds (24-bit split encoding)
    pub fn uptime_secs(&self) -> u32 {
        (u32::from(self.uptime_high) << 16) | u32::from(self.uptime_low)
    }

    /// Link round-trip time in milliseconds
    pub fn rtt_ms(&self) -> f64 {
        f64::from(self.rtt_raw) * 16.0 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_known_record() {
        let record = ReadingRecord {
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
            temperature: -5,
            uptime_high: 0x01,
            uptime_low: 0x2345,
            rtt_raw: 625,
        };

        let decoded = ReadingRecord::decode(&record.encode()).unwrap();
        assert_eq!(decoded, record);

        assert_eq!(decoded.volts(), 230.0);
        assert_eq!(decoded.amps(), 1.5);
        assert_eq!(decoded.hertz(), 50.0);
        assert_eq!(decoded.power_factor_percent(), 96.1);
        assert_eq!(decoded.active_kwh(), 1234.56);
        assert_eq!(decoded.reactive_kwh(), 78.9);
        assert_eq!(decoded.uptime_secs(), 0x012345);
        assert_eq!(decoded.rtt_ms(), 10.0);
    }

    #[test]
    fn test_field_offsets() {
        let mut buf = [0u8; READING_RECORD_LEN];
        buf[0..4].copy_from_slice(&0x6553_F100u32.to_be_bytes());
        buf[4] = 0x08; // voltage = 0x08FC = 2300
        buf[5] = 0xFC;
        buf[26] = 0xFF; // temperature = -1
        buf[27] = 0x02; // uptime = 0x020001
        buf[29] = 0x01;

        let record = ReadingRecord::decode(&buf).unwrap();
        assert_eq!(record.timestamp, 0x6553_F100);
        assert_eq!(record.voltage, 2300);
        assert_eq!(record.temperature, -1);
        assert_eq!(record.uptime_secs(), 0x020001);
    }

    #[test]
    fn test_wrong_length() {
        assert!(matches!(
            ReadingRecord::decode(&[0u8; 31]),
            Err(RecordError::InvalidLength(31))
        ));
        assert!(matches!(
            ReadingRecord::decode(&[0u8; 33]),
            Err(RecordError::InvalidLength(33))
        ));
    }
}
