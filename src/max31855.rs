//! MAX31855 thermocouple-to-digital converter.
//!
//! One 32-bit SPI frame per sample, read as two 16-bit words. The high
//! word carries the 14-bit signed thermocouple value (sign-extended via
//! the word itself, 1/16 °C per masked-word LSB) plus a fault-summary
//! bit; the low word carries the cold-junction reference temperature and
//! three independent fault bits. The reference temperature is for
//! display/diagnostics only and is not handed to the control engine.

use bitflags::bitflags;
use embedded_hal_async::spi::SpiDevice;

use crate::temperature_sensor::{SensorStatus, TemperatureReader, TemperatureReading};

const TC_DATA_MASK: u16 = 0b1111_1111_1111_1100;
const REF_DATA_MASK: u16 = 0b1111_1111_1111_0000;

bitflags! {
    /// Fault bits from the low word of the frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Faults: u16 {
        const OPEN_CIRCUIT = 0b0000_0000_0000_0001;
        const SHORT_TO_GND = 0b0000_0000_0000_0010;
        const SHORT_TO_VCC = 0b0000_0000_0000_0100;
    }
}

/// One decoded 32-bit frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub thermocouple_c: f32,
    pub reference_c: f32,
    pub faults: Faults,
}

impl Frame {
    /// Highest-priority fault reported by the chip: open circuit, then
    /// short to Vcc, then short to ground.
    pub fn status(&self) -> SensorStatus {
        if self.faults.contains(Faults::OPEN_CIRCUIT) {
            SensorStatus::OpenCircuit
        } else if self.faults.contains(Faults::SHORT_TO_VCC) {
            SensorStatus::ShortToVcc
        } else if self.faults.contains(Faults::SHORT_TO_GND) {
            SensorStatus::ShortToGround
        } else {
            SensorStatus::Ok
        }
    }
}

pub struct Max31855<SPI> {
    spi: SPI,
}

impl<SPI: SpiDevice> Max31855<SPI> {
    pub fn new(spi: SPI) -> Self {
        Self { spi }
    }

    /// Decode the two words of one transaction. Pure; defined for every
    /// bit pattern.
    pub fn decode(high: u16, low: u16) -> Frame {
        // Clear the reserved and fault-summary bits, keep the sign by
        // going through i16 at full word width
        let thermocouple_c = (high & TC_DATA_MASK) as i16 as f32 / 16.0;
        let reference_c = (low & REF_DATA_MASK) as i16 as f32 / 256.0;
        Frame {
            thermocouple_c,
            reference_c,
            faults: Faults::from_bits_truncate(low),
        }
    }
}

impl<SPI: SpiDevice> TemperatureReader for Max31855<SPI> {
    async fn read_temperature(&mut self) -> TemperatureReading {
        let mut buf = [0u8; 4];
        match self.spi.read(&mut buf).await {
            Ok(()) => {
                let high = u16::from_be_bytes([buf[0], buf[1]]);
                let low = u16::from_be_bytes([buf[2], buf[3]]);
                let frame = Self::decode(high, low);
                TemperatureReading {
                    celsius: frame.thermocouple_c,
                    status: frame.status(),
                }
            }
            Err(_) => TemperatureReading::bus_fault(),
        }
    }
}
