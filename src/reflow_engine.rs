use embassy_futures::select::{select, Either};
use embassy_time::{Duration, Instant, Timer};

use crate::log::*;
use crate::pid::PidController;
use crate::profile::{ReflowProfile, ReflowSegment};
use crate::relay::RelayControl;
use crate::temperature_sensor::{SensorStatus, TemperatureReader};
use crate::{
    Command, ConfigError, ReflowParameters, ReflowSnapshot, Status, COMMAND_CHANNEL,
    CONTROL_TICK_MILLIS, CURRENT_STATE,
};

/// Outcome of one `update()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UpdateResult {
    /// Not running, paused, or less than a second since the last tick.
    Nothing,
    /// A normal 1 Hz control tick.
    Updated,
    /// The profile is exhausted; the engine is now stopped.
    Stop,
}

/// Drives one reflow run: advances the setpoint ramp through the profile
/// segments once per second, regulates the relay duty through the PID and
/// reports when the profile is exhausted.
///
/// The engine is failure-oblivious to sensor faults: the fault status is
/// carried in the snapshot for the caller's policy, but the duty cycle is
/// always computed from whatever numeric value the sensor returned.
/// Silently dropping the actuator mid-profile is the more dangerous
/// default.
pub struct ReflowEngine<'a, R, H> {
    reader: R,
    relay: H,
    profile: &'a ReflowProfile,
    pid: PidController,
    running: bool,
    paused: bool,
    relay_percentage: u8,
    last_tick: Instant,
    current_seconds: u16,
    current_segment: usize,
    desired_temperature: f32,
    current_temperature: f32,
    sensor_status: SensorStatus,
    temperature_step: f32,
}

impl<'a, R, H> ReflowEngine<'a, R, H>
where
    R: TemperatureReader,
    H: RelayControl,
{
    pub fn new(
        reader: R,
        relay: H,
        profile: &'a ReflowProfile,
        params: ReflowParameters,
    ) -> Result<Self, ConfigError> {
        validate_profile(profile)?;
        validate_parameters(&params)?;

        Ok(Self {
            reader,
            relay,
            profile,
            pid: PidController::new(params),
            running: false,
            paused: false,
            relay_percentage: 0,
            last_tick: Instant::from_ticks(0),
            current_seconds: 0,
            current_segment: 0,
            desired_temperature: 0.0,
            current_temperature: 0.0,
            sensor_status: SensorStatus::Ok,
            temperature_step: 0.0,
        })
    }

    /// Begin a fresh run. Samples the sensor first so the setpoint ramp
    /// starts from the oven's actual temperature.
    pub async fn start(&mut self, now: Instant) {
        let reading = self.reader.read_temperature().await;
        self.current_temperature = reading.celsius;
        self.sensor_status = reading.status;

        self.pid.reset();
        self.current_seconds = 0;
        self.current_segment = 0;
        self.desired_temperature = reading.celsius;
        self.temperature_step = ramp_step(reading.celsius, self.profile.segment(0));
        self.relay_percentage = 0;
        self.last_tick = now;
        self.paused = false;
        self.running = true;

        info!("starting reflow: {}", self.profile.name);
    }

    /// Abort or finish the run: actuator off, remaining state frozen for
    /// inspection until the next `start()`.
    pub fn stop(&mut self) {
        self.running = false;
        self.paused = false;
        self.relay_percentage = 0;
        self.relay.set_duty_percent(0);
        info!("reflow stopped");
    }

    /// Freeze time advance. The control loop keeps sampling and holding
    /// the frozen setpoint.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resume time advance after a pause.
    pub fn restart(&mut self) {
        self.paused = false;
    }

    /// Retune the PID. Accumulated regulator state is cleared, so this
    /// belongs between runs, not in the middle of one.
    pub fn set_parameters(&mut self, params: ReflowParameters) -> Result<(), ConfigError> {
        validate_parameters(&params)?;
        self.pid.set_gains(params);
        Ok(())
    }

    /// Offer the engine a tick. Callers may poll at any rate; control
    /// work happens only once a full second has elapsed since the
    /// previous tick.
    pub async fn update(&mut self, now: Instant) -> UpdateResult {
        if !self.running {
            return UpdateResult::Nothing;
        }
        if now.duration_since(self.last_tick) < Duration::from_secs(1) {
            return UpdateResult::Nothing;
        }
        self.last_tick = now;

        let reading = self.reader.read_temperature().await;
        self.current_temperature = reading.celsius;
        self.sensor_status = reading.status;

        if self.paused {
            // Hold the frozen setpoint so the oven does not go cold
            self.relay_percentage = self
                .pid
                .update(self.desired_temperature, self.current_temperature);
            self.relay.set_duty_percent(self.relay_percentage);
            return UpdateResult::Nothing;
        }

        self.current_seconds += 1;
        self.advance_setpoint();

        self.relay_percentage = self
            .pid
            .update(self.desired_temperature, self.current_temperature);
        self.relay.set_duty_percent(self.relay_percentage);

        // Boundaries are strict: segment i ends exactly when elapsed
        // seconds reaches the cumulative duration of segments 0..=i. A
        // zero-duration segment is an instantaneous jump and cascades
        // within the same call.
        while self.current_seconds as u32 >= self.profile.segment_end(self.current_segment) {
            let finished = self.profile.segment(self.current_segment);
            self.desired_temperature = finished.target_celsius;

            if self.current_segment + 1 >= self.profile.segment_count() {
                debug!("profile exhausted after {} s", self.current_seconds);
                self.stop();
                return UpdateResult::Stop;
            }

            self.current_segment += 1;
            let next = self.profile.segment(self.current_segment);
            self.temperature_step = ramp_step(finished.target_celsius, next);
            debug!(
                "segment {} ({}): to {} over {} s",
                self.current_segment,
                next.phase.as_str(),
                next.target_celsius,
                next.duration_seconds
            );

            if next.duration_seconds > 0 {
                break;
            }
            self.desired_temperature = next.target_celsius;
        }

        UpdateResult::Updated
    }

    /// Drive the engine from the command channel and the wall clock,
    /// publishing a state snapshot each pass. Firmware wraps this in an
    /// executor task.
    pub async fn run(&mut self) -> ! {
        let receiver = COMMAND_CHANNEL.receiver();
        loop {
            match select(receiver.receive(), Timer::after_millis(CONTROL_TICK_MILLIS)).await {
                Either::First(command) => self.handle_command(command).await,
                Either::Second(()) => {
                    if self.update(Instant::now()).await == UpdateResult::Stop {
                        info!("reflow profile complete");
                    }
                }
            }
            CURRENT_STATE.sender().send(self.snapshot());
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start => {
                if self.running {
                    warn!("start ignored: already running");
                } else {
                    self.start(Instant::now()).await;
                }
            }
            Command::Stop => self.stop(),
            Command::Pause => self.pause(),
            Command::Restart => self.restart(),
            Command::SetTuning { kp, ki, kd } => {
                if self.running {
                    warn!("retune ignored while running");
                } else if self.set_parameters(ReflowParameters { kp, ki, kd }).is_err() {
                    warn!("rejected tuning: kp={} ki={} kd={}", kp, ki, kd);
                }
            }
        }
    }

    pub fn snapshot(&self) -> ReflowSnapshot {
        let segment = self.profile.segment(self.current_segment);
        ReflowSnapshot {
            status: if !self.running {
                Status::Stopped
            } else if self.paused {
                Status::Paused
            } else {
                Status::Running
            },
            elapsed_seconds: self.current_seconds,
            current_temperature: self.current_temperature,
            desired_temperature: self.desired_temperature,
            sensor_status: self.sensor_status,
            relay_percentage: self.relay_percentage,
            segment_index: self.current_segment as u8,
            phase: segment.phase.as_str(),
            profile_name: self.profile.name,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn current_seconds(&self) -> u16 {
        self.current_seconds
    }

    pub fn current_temperature(&self) -> f32 {
        self.current_temperature
    }

    pub fn desired_temperature(&self) -> f32 {
        self.desired_temperature
    }

    pub fn relay_percentage(&self) -> u8 {
        self.relay_percentage
    }

    pub fn sensor_status(&self) -> SensorStatus {
        self.sensor_status
    }

    /// Move the setpoint one ramp step toward the current segment's
    /// target without overshooting it.
    fn advance_setpoint(&mut self) {
        let target = self.profile.segment(self.current_segment).target_celsius;
        let next = self.desired_temperature + self.temperature_step;
        self.desired_temperature = if self.temperature_step >= 0.0 {
            next.min(target)
        } else {
            next.max(target)
        };
    }
}

/// Per-second setpoint increment for one segment, ramping from `from` to
/// the segment's target. A zero-duration segment is an instantaneous
/// jump.
fn ramp_step(from: f32, segment: &ReflowSegment) -> f32 {
    if segment.duration_seconds == 0 {
        segment.target_celsius - from
    } else {
        (segment.target_celsius - from) / segment.duration_seconds as f32
    }
}

fn validate_profile(profile: &ReflowProfile) -> Result<(), ConfigError> {
    if profile.segment_count() == 0 {
        return Err(ConfigError::EmptyProfile);
    }
    for segment in profile.segments {
        if segment.duration_seconds == 0 {
            return Err(ConfigError::ZeroDurationSegment);
        }
        if !segment.target_celsius.is_finite() {
            return Err(ConfigError::NonFiniteTarget);
        }
    }
    Ok(())
}

fn validate_parameters(params: &ReflowParameters) -> Result<(), ConfigError> {
    let ReflowParameters { kp, ki, kd } = *params;
    if !(kp.is_finite() && ki.is_finite() && kd.is_finite()) {
        return Err(ConfigError::InvalidGains);
    }
    if kp <= 0.0 || ki < 0.0 || kd < 0.0 {
        return Err(ConfigError::InvalidGains);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Phase;
    use crate::temperature_sensor::TemperatureReading;
    use core::cell::Cell;
    use embassy_futures::block_on;
    use std::rc::Rc;

    static TRAJECTORY: ReflowProfile = ReflowProfile {
        name: "trajectory",
        segments: &[
            ReflowSegment {
                phase: Phase::Preheat,
                duration_seconds: 10,
                target_celsius: 150.0,
            },
            ReflowSegment {
                phase: Phase::Soak,
                duration_seconds: 5,
                target_celsius: 150.0,
            },
            ReflowSegment {
                phase: Phase::Ramp,
                duration_seconds: 20,
                target_celsius: 217.0,
            },
        ],
    };

    static SHORT: ReflowProfile = ReflowProfile {
        name: "short",
        segments: &[ReflowSegment {
            phase: Phase::Preheat,
            duration_seconds: 3,
            target_celsius: 100.0,
        }],
    };

    static EMPTY: ReflowProfile = ReflowProfile {
        name: "empty",
        segments: &[],
    };

    struct FixedReader {
        celsius: f32,
        status: SensorStatus,
    }

    impl FixedReader {
        fn at(celsius: f32) -> Self {
            Self {
                celsius,
                status: SensorStatus::Ok,
            }
        }
    }

    impl TemperatureReader for FixedReader {
        async fn read_temperature(&mut self) -> TemperatureReading {
            TemperatureReading {
                celsius: self.celsius,
                status: self.status,
            }
        }
    }

    #[derive(Clone, Default)]
    struct SharedRelay(Rc<Cell<u8>>);

    impl RelayControl for SharedRelay {
        fn set_duty_percent(&mut self, percent: u8) {
            self.0.set(percent);
        }
    }

    fn at(millis: u64) -> Instant {
        Instant::from_millis(millis)
    }

    fn params() -> ReflowParameters {
        ReflowParameters {
            kp: 4.0,
            ki: 0.5,
            kd: 1.0,
        }
    }

    fn engine(profile: &'static ReflowProfile) -> ReflowEngine<'static, FixedReader, SharedRelay> {
        ReflowEngine::new(FixedReader::at(25.0), SharedRelay::default(), profile, params())
            .unwrap()
    }

    #[test]
    fn setpoint_ramps_linearly_through_segments() {
        let mut engine = engine(&TRAJECTORY);
        block_on(engine.start(at(0)));
        assert_eq!(engine.desired_temperature(), 25.0);

        for tick in 1..=35u64 {
            let result = block_on(engine.update(at(tick * 1000)));
            match tick {
                35 => assert_eq!(result, UpdateResult::Stop),
                _ => assert_eq!(result, UpdateResult::Updated),
            }
            match tick {
                // preheat: 12.5 °C/s from ambient 25 to 150
                5 => assert_eq!(engine.desired_temperature(), 87.5),
                10 => assert_eq!(engine.desired_temperature(), 150.0),
                // soak holds flat
                11..=15 => assert_eq!(engine.desired_temperature(), 150.0),
                // ramp: 3.35 °C/s toward 217
                25 => assert!((engine.desired_temperature() - 183.5).abs() < 1e-3),
                35 => assert_eq!(engine.desired_temperature(), 217.0),
                _ => {}
            }
        }
        assert_eq!(engine.current_seconds(), 35);
        assert!(!engine.is_running());
    }

    #[test]
    fn sub_second_polls_are_no_ops() {
        let mut engine = engine(&TRAJECTORY);
        block_on(engine.start(at(0)));

        for millis in [100, 500, 999] {
            assert_eq!(block_on(engine.update(at(millis))), UpdateResult::Nothing);
        }
        assert_eq!(engine.current_seconds(), 0);

        assert_eq!(block_on(engine.update(at(1000))), UpdateResult::Updated);
        assert_eq!(block_on(engine.update(at(1500))), UpdateResult::Nothing);
        assert_eq!(block_on(engine.update(at(2000))), UpdateResult::Updated);
        assert_eq!(engine.current_seconds(), 2);
    }

    #[test]
    fn stop_result_is_reported_exactly_once() {
        let mut engine = engine(&SHORT);
        block_on(engine.start(at(0)));

        assert_eq!(block_on(engine.update(at(1000))), UpdateResult::Updated);
        assert_eq!(block_on(engine.update(at(2000))), UpdateResult::Updated);
        assert_eq!(block_on(engine.update(at(3000))), UpdateResult::Stop);

        for tick in 4..10u64 {
            assert_eq!(
                block_on(engine.update(at(tick * 1000))),
                UpdateResult::Nothing
            );
        }
        assert_eq!(engine.current_seconds(), 3);
    }

    #[test]
    fn engine_restarts_after_completion() {
        let mut engine = engine(&SHORT);
        block_on(engine.start(at(0)));
        for tick in 1..=3u64 {
            block_on(engine.update(at(tick * 1000)));
        }
        assert!(!engine.is_running());

        block_on(engine.start(at(10_000)));
        assert!(engine.is_running());
        assert_eq!(engine.current_seconds(), 0);
        assert_eq!(block_on(engine.update(at(11_000))), UpdateResult::Updated);
        assert_eq!(engine.current_seconds(), 1);
    }

    #[test]
    fn pause_freezes_time_and_setpoint() {
        let mut engine = engine(&TRAJECTORY);
        block_on(engine.start(at(0)));
        for tick in 1..=3u64 {
            block_on(engine.update(at(tick * 1000)));
        }
        let frozen_desired = engine.desired_temperature();
        assert_eq!(engine.current_seconds(), 3);

        engine.pause();
        assert!(engine.is_paused());
        for tick in 4..=6u64 {
            assert_eq!(
                block_on(engine.update(at(tick * 1000))),
                UpdateResult::Nothing
            );
        }
        assert_eq!(engine.current_seconds(), 3);
        assert_eq!(engine.desired_temperature(), frozen_desired);
        // the loop does not go cold: duty is still recomputed while paused
        assert!(engine.relay_percentage() > 0);

        engine.restart();
        assert_eq!(block_on(engine.update(at(7000))), UpdateResult::Updated);
        assert_eq!(engine.current_seconds(), 4);
    }

    #[test]
    fn stop_forces_relay_off_and_freezes_state() {
        let relay = SharedRelay::default();
        let mut engine = ReflowEngine::new(
            FixedReader::at(25.0),
            relay.clone(),
            &TRAJECTORY,
            params(),
        )
        .unwrap();

        block_on(engine.start(at(0)));
        for tick in 1..=5u64 {
            block_on(engine.update(at(tick * 1000)));
        }
        assert!(relay.0.get() > 0);
        let seconds = engine.current_seconds();
        let desired = engine.desired_temperature();

        engine.stop();
        assert_eq!(relay.0.get(), 0);
        assert_eq!(engine.relay_percentage(), 0);
        assert_eq!(engine.current_seconds(), seconds);
        assert_eq!(engine.desired_temperature(), desired);
        assert_eq!(block_on(engine.update(at(60_000))), UpdateResult::Nothing);
    }

    #[test]
    fn exhaustion_forces_relay_off() {
        let relay = SharedRelay::default();
        let mut engine =
            ReflowEngine::new(FixedReader::at(25.0), relay.clone(), &SHORT, params()).unwrap();

        block_on(engine.start(at(0)));
        for tick in 1..=3u64 {
            block_on(engine.update(at(tick * 1000)));
        }
        assert_eq!(relay.0.get(), 0);
    }

    #[test]
    fn identical_tick_sequences_produce_identical_trajectories() {
        let mut first = engine(&TRAJECTORY);
        let mut second = engine(&TRAJECTORY);
        block_on(first.start(at(0)));
        block_on(second.start(at(0)));

        for tick in 1..=35u64 {
            let a = block_on(first.update(at(tick * 1000)));
            let b = block_on(second.update(at(tick * 1000)));
            assert_eq!(a, b);
            assert_eq!(first.current_seconds(), second.current_seconds());
            assert_eq!(first.desired_temperature(), second.desired_temperature());
            assert_eq!(first.relay_percentage(), second.relay_percentage());
        }
    }

    #[test]
    fn sensor_fault_does_not_stop_the_run() {
        let mut engine = ReflowEngine::new(
            FixedReader {
                celsius: 25.0,
                status: SensorStatus::OpenCircuit,
            },
            SharedRelay::default(),
            &TRAJECTORY,
            params(),
        )
        .unwrap();

        block_on(engine.start(at(0)));
        assert_eq!(block_on(engine.update(at(1000))), UpdateResult::Updated);
        assert_eq!(engine.sensor_status(), SensorStatus::OpenCircuit);
        assert!(engine.is_running());
        assert!(engine.relay_percentage() > 0);
    }

    #[test]
    fn rejects_invalid_configuration() {
        static ZERO_DURATION: ReflowProfile = ReflowProfile {
            name: "zero",
            segments: &[ReflowSegment {
                phase: Phase::Preheat,
                duration_seconds: 0,
                target_celsius: 100.0,
            }],
        };
        static NAN_TARGET: ReflowProfile = ReflowProfile {
            name: "nan",
            segments: &[ReflowSegment {
                phase: Phase::Preheat,
                duration_seconds: 10,
                target_celsius: f32::NAN,
            }],
        };

        let build = |profile: &'static ReflowProfile, p: ReflowParameters| {
            ReflowEngine::new(FixedReader::at(25.0), SharedRelay::default(), profile, p)
                .map(|_| ())
                .unwrap_err()
        };

        assert_eq!(build(&EMPTY, params()), ConfigError::EmptyProfile);
        assert_eq!(build(&ZERO_DURATION, params()), ConfigError::ZeroDurationSegment);
        assert_eq!(build(&NAN_TARGET, params()), ConfigError::NonFiniteTarget);

        let mut gains = params();
        gains.kp = 0.0;
        assert_eq!(build(&TRAJECTORY, gains), ConfigError::InvalidGains);
        gains = params();
        gains.ki = -1.0;
        assert_eq!(build(&TRAJECTORY, gains), ConfigError::InvalidGains);
        gains = params();
        gains.kd = f32::NAN;
        assert_eq!(build(&TRAJECTORY, gains), ConfigError::InvalidGains);
    }

    #[test]
    fn retune_rejects_bad_gains() {
        let mut engine = engine(&TRAJECTORY);
        assert!(engine
            .set_parameters(ReflowParameters {
                kp: 2.0,
                ki: 0.1,
                kd: 0.0,
            })
            .is_ok());
        assert_eq!(
            engine.set_parameters(ReflowParameters {
                kp: -2.0,
                ki: 0.1,
                kd: 0.0,
            }),
            Err(ConfigError::InvalidGains)
        );
    }

    #[test]
    fn snapshot_reflects_engine_state() {
        let mut engine = engine(&TRAJECTORY);
        assert_eq!(engine.snapshot().status, Status::Stopped);

        block_on(engine.start(at(0)));
        block_on(engine.update(at(1000)));
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.status, Status::Running);
        assert_eq!(snapshot.elapsed_seconds, 1);
        assert_eq!(snapshot.phase, "Preheat");
        assert_eq!(snapshot.profile_name, "trajectory");
        assert_eq!(snapshot.segment_index, 0);

        engine.pause();
        assert_eq!(engine.snapshot().status, Status::Paused);
    }
}
