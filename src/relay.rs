//! Actuator sink for the heating element. The engine only ever hands
//! over a duty percentage; timer/channel wiring stays in the board layer.

use embedded_hal::pwm::SetDutyCycle;

/// Single-method sink applying a relay duty cycle in the range 0..=100.
pub trait RelayControl {
    fn set_duty_percent(&mut self, percent: u8);
}

/// Drives any `embedded_hal` PWM channel as the relay output.
pub struct PwmRelay<T> {
    pwm: T,
}

impl<T: SetDutyCycle> PwmRelay<T> {
    pub fn new(pwm: T) -> Self {
        Self { pwm }
    }

    pub fn release(self) -> T {
        self.pwm
    }
}

impl<T: SetDutyCycle> RelayControl for PwmRelay<T> {
    fn set_duty_percent(&mut self, percent: u8) {
        // No recovery at this level if the channel rejects the write
        let _ = self.pwm.set_duty_cycle_percent(percent.min(100));
    }
}
