#![no_std]

#[cfg(test)]
extern crate std;

pub mod max31855;
pub mod max6675;
pub mod pid;
pub mod profile;
pub mod reflow_engine;
pub mod relay;
pub mod temperature_sensor;

#[cfg(feature = "defmt")]
pub use defmt as log;
#[cfg(not(feature = "defmt"))]
pub use log;

pub static VERSION: &str = "v0.1";

/// How often the control loop polls the command channel and offers the
/// engine a tick. The engine gates itself to 1 Hz internally regardless
/// of this value.
pub static CONTROL_TICK_MILLIS: u64 = 100;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::watch::Watch;
use serde::{Deserialize, Serialize};

use crate::temperature_sensor::SensorStatus;

/// Commands accepted by the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    Start,
    Stop,
    Pause,
    Restart,
    SetTuning { kp: f32, ki: f32, kd: f32 },
}

/// PID gains handed to the engine at construction or between runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReflowParameters {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

/// Configuration rejected when the engine is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    EmptyProfile,
    ZeroDurationSegment,
    NonFiniteTarget,
    InvalidGains,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ConfigError::EmptyProfile => write!(f, "profile has no segments"),
            ConfigError::ZeroDurationSegment => write!(f, "segment duration must be positive"),
            ConfigError::NonFiniteTarget => write!(f, "segment target is not finite"),
            ConfigError::InvalidGains => write!(f, "invalid PID gains"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    Stopped,
    Running,
    Paused,
}

/// Engine state published once per control-loop pass for the UI and
/// host-interface collaborators.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReflowSnapshot {
    pub status: Status,
    pub elapsed_seconds: u16,
    pub current_temperature: f32,
    pub desired_temperature: f32,
    pub sensor_status: SensorStatus,
    pub relay_percentage: u8,
    pub segment_index: u8,
    pub phase: &'static str,
    pub profile_name: &'static str,
}

pub static COMMAND_CHANNEL: Channel<CriticalSectionRawMutex, Command, 3> = Channel::new();
pub static CURRENT_STATE: Watch<CriticalSectionRawMutex, ReflowSnapshot, 3> = Watch::new();
