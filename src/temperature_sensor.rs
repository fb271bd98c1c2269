use serde::{Deserialize, Serialize};

/// Fault classification attached to every reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorStatus {
    Ok,
    /// Thermocouple disconnected.
    OpenCircuit,
    /// Thermocouple shorted to the supply rail.
    ShortToVcc,
    /// Thermocouple shorted to ground.
    ShortToGround,
    /// The bus transaction itself failed; the temperature value carries no
    /// information.
    BusFault,
}

/// One calibrated temperature sample.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TemperatureReading {
    pub celsius: f32,
    pub status: SensorStatus,
}

impl TemperatureReading {
    pub const fn ok(celsius: f32) -> Self {
        Self {
            celsius,
            status: SensorStatus::Ok,
        }
    }

    pub const fn fault(celsius: f32, status: SensorStatus) -> Self {
        Self { celsius, status }
    }

    pub const fn bus_fault() -> Self {
        Self {
            celsius: 0.0,
            status: SensorStatus::BusFault,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == SensorStatus::Ok
    }
}

/// Capability over the concrete thermocouple-interface chips.
///
/// One call performs exactly one bus transaction; the bus is held only for
/// the duration of that transaction. Faults come back as data in the
/// reading, never as an error — retry policy belongs to the caller.
#[allow(async_fn_in_trait)]
pub trait TemperatureReader {
    async fn read_temperature(&mut self) -> TemperatureReading;
}

// Only one chip is ever wired to a given board, so the active reader is a
// build-time choice, not a run-time one.
#[cfg(all(feature = "max31855", not(feature = "max6675")))]
pub type DefaultTemperatureReader<Spi> = crate::max31855::Max31855<Spi>;
#[cfg(all(feature = "max6675", not(feature = "max31855")))]
pub type DefaultTemperatureReader<Spi> = crate::max6675::Max6675<Spi>;
