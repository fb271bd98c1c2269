//! MAX6675 thermocouple-to-digital converter.
//!
//! One 16-bit SPI read per sample. Bits 14..3 carry the magnitude in
//! 0.25 °C steps; bit 2 flags a disconnected thermocouple. The chip
//! reports no other fault conditions and no negative temperatures.

use embedded_hal_async::spi::SpiDevice;

use crate::temperature_sensor::{SensorStatus, TemperatureReader, TemperatureReading};

const DATA_MASK: u16 = 0b0111_1111_1111_1000;
const OPEN_CIRCUIT_MASK: u16 = 0b0000_0000_0000_0100;

/// Scaling factor for the magnitude field (°C/LSB)
const TEMP_SCALE: f32 = 0.25;

pub struct Max6675<SPI> {
    spi: SPI,
}

impl<SPI: SpiDevice> Max6675<SPI> {
    pub fn new(spi: SPI) -> Self {
        Self { spi }
    }

    /// Decode one raw frame. Pure; defined for every bit pattern.
    pub fn decode(raw: u16) -> TemperatureReading {
        let celsius = ((raw & DATA_MASK) >> 3) as f32 * TEMP_SCALE;
        if raw & OPEN_CIRCUIT_MASK != 0 {
            TemperatureReading::fault(celsius, SensorStatus::OpenCircuit)
        } else {
            TemperatureReading::ok(celsius)
        }
    }
}

impl<SPI: SpiDevice> TemperatureReader for Max6675<SPI> {
    async fn read_temperature(&mut self) -> TemperatureReading {
        let mut buf = [0u8; 2];
        match self.spi.read(&mut buf).await {
            Ok(()) => Self::decode(u16::from_be_bytes(buf)),
            Err(_) => TemperatureReading::bus_fault(),
        }
    }
}
