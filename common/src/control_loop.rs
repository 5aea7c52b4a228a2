//! The per-tick flight control pipeline.
//!
//! raw sample → conditioner → estimator → flight state → setpoints →
//! rate controllers → mixer. The gesture engine runs alongside while
//! disarmed, and parameter saves are deferred to [`ControlLoop::idle`].

use crate::airframe::{Mixer, WHOOP_MOTOR_SETUP};
use crate::battery::{BatteryMonitor, WarningChange};
use crate::conditioner::SampleConditioner;
use crate::config::Config;
use crate::errors::{ConfigError, PersistError};
use crate::estimator::{AttitudeEstimator, Estimate};
use crate::flight_modes::controller::RateController;
use crate::flight_modes::{resolve_mode, SetpointGenerator, SetpointInputs};
use crate::flight_state::{push, FlightInputs, FlightStateMachine};
use crate::gesture::{GestureEngine, StickTravelCheck};
use crate::params::storage::ParamStore;
use crate::params::{ActionOutcome, ParamTable, PidProfile, TunableParams};
use crate::sync::watch::Receiver;
use crate::types::actuators::ArmingState;
use crate::types::flight_mode::FlightMode;
use crate::types::measurements::AxisSample;
use crate::types::rc::{ChannelVector, RcInput};
use crate::types::status::{StatusEvent, TickEvents};
use crate::NUM_MOTORS;

const ID: &str = "control_loop";

/// Fresh inputs of a single tick. `None` means nothing new arrived.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct TickInputs {
    pub sample: Option<AxisSample>,
    pub rc: Option<RcInput>,
    pub cell_voltage: Option<f32>,
    /// The previous tick ran past its deadline
    pub overran: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickOutput {
    pub motors: [f32; NUM_MOTORS],
    pub state: ArmingState,
    pub mode: FlightMode,
    pub events: TickEvents,
}

/// Receivers of the three producer watches.
pub struct InputPorts<'a> {
    pub sensor: Receiver<'a, AxisSample>,
    pub rc: Receiver<'a, RcInput>,
    pub battery: Receiver<'a, f32>,
}

impl InputPorts<'_> {
    /// Collect whatever changed since the last poll.
    pub fn poll(&mut self, overran: bool) -> TickInputs {
        TickInputs {
            sample: self.sensor.try_changed(),
            rc: self.rc.try_changed(),
            cell_voltage: self.battery.try_changed(),
            overran,
        }
    }
}

pub struct ControlLoop {
    config: Config,
    dt: f32,

    conditioner: SampleConditioner,
    estimator: AttitudeEstimator,
    setpoints: SetpointGenerator,
    controller: RateController,
    mixer: Mixer,
    battery: BatteryMonitor,
    flight: FlightStateMachine,
    gestures: GestureEngine,
    stick_check: Option<StickTravelCheck>,

    params: ParamTable,
    applied: Option<(u32, PidProfile)>,
    save_pending: bool,
    load_failed: bool,

    channels: ChannelVector,
    throttle: f32,
    gyr: [f32; 3],
    estimate: Estimate,
    last_sample_us: Option<u64>,
}

impl ControlLoop {
    /// Build the loop. An invalid configuration never produces a loop, so
    /// the vehicle cannot arm with it.
    pub fn new(config: Config, params: TunableParams) -> Result<Self, ConfigError> {
        config.validate()?;

        let dt = config.dt();
        let filters = config.filters.resolve();
        let rate_control = config.rate_control.with_d_filter(filters.d_filter);

        let params = if params.is_valid() {
            params
        } else {
            warn!("{}: Parameters out of range, using defaults", ID);
            TunableParams::const_default()
        };

        info!("{}: Loop period {} us", ID, config.loop_period_us);

        Ok(Self {
            config,
            dt,
            conditioner: SampleConditioner::new(filters, dt),
            estimator: AttitudeEstimator::new(config.estimator),
            setpoints: SetpointGenerator::new(config.rates, config.level, dt),
            controller: RateController::new(
                &rate_control,
                params.gains(PidProfile::A),
                config.level.attenuation,
                dt,
            ),
            mixer: Mixer::new(config.mixer, &WHOOP_MOTOR_SETUP),
            battery: BatteryMonitor::new(config.battery, dt),
            flight: FlightStateMachine::new(config.flight_state, dt),
            gestures: GestureEngine::new(config.gesture),
            stick_check: None,
            params: ParamTable::new(params),
            applied: None,
            save_pending: false,
            load_failed: false,
            channels: ChannelVector::default(),
            throttle: 0.0,
            gyr: [0.0; 3],
            estimate: Estimate::default(),
            last_sample_us: None,
        })
    }

    /// Build the loop with the stored parameters, falling back to the
    /// defaults if none can be loaded. A failed read is reported as
    /// [`StatusEvent::LoadFailed`] on the first tick.
    pub fn with_store(config: Config, store: &mut impl ParamStore) -> Result<Self, ConfigError> {
        let (params, load_failed) = match store.load() {
            Ok(params) => (params, false),
            Err(PersistError::UseDefaults) => {
                info!("{}: No stored parameters, using defaults", ID);
                (TunableParams::const_default(), false)
            }
            Err(e) => {
                error!("{}: Loading parameters failed: {:?}", ID, e);
                (TunableParams::const_default(), true)
            }
        };
        let mut ctrl = Self::new(config, params)?;
        ctrl.load_failed = load_failed;
        Ok(ctrl)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn params(&self) -> &ParamTable {
        &self.params
    }

    pub fn state(&self) -> ArmingState {
        self.flight.state()
    }

    pub fn estimate(&self) -> &Estimate {
        &self.estimate
    }

    pub fn tick(&mut self, inputs: &TickInputs) -> TickOutput {
        let mut events = TickEvents::new();

        if core::mem::take(&mut self.load_failed) {
            push(&mut events, StatusEvent::LoadFailed);
        }

        if inputs.overran {
            push(&mut events, StatusEvent::TickOverrun);
        }

        // Radio, keeping the last healthy vector while the link is down
        let link_fresh = match inputs.rc {
            Some(rc) if rc.link_ok => {
                self.channels = rc.channels.sanitized();
                true
            }
            _ => false,
        };

        let aux = self.config.aux.resolve(&self.channels);
        let mode = resolve_mode(&aux);
        let profile = if aux.pid_profile_b {
            PidProfile::B
        } else {
            PidProfile::A
        };
        self.apply_params(profile);

        // Sensors
        let sample = inputs.sample.filter(AxisSample::is_usable);
        let sensor_fresh = sample.is_some();
        if let Some(sample) = sample {
            let dt = match self.last_sample_us {
                Some(last) => sample.timestamp_us.saturating_sub(last) as f32 * 1e-6,
                None => self.dt,
            };
            self.last_sample_us = Some(sample.timestamp_us);

            self.gyr = self.conditioner.filter_gyr(sample.gyr, dt);
            let offsets = self.params.params().acc_offsets;
            let acc = sample.acc.map(|acc| {
                let acc = [acc[0] - offsets[0], acc[1] - offsets[1], acc[2] - offsets[2]];
                self.conditioner.filter_acc(acc, dt)
            });
            self.estimate = self
                .estimator
                .update(self.gyr, acc, dt, mode.is_leveling());
        }

        // Battery, with the sag estimated from the throttle in use
        if let Some(voltage) = inputs.cell_voltage {
            match self.battery.update(voltage, self.throttle) {
                Some(WarningChange::Raised) => push(&mut events, StatusEvent::LowBattery),
                Some(WarningChange::Cleared) => push(&mut events, StatusEvent::BatteryOk),
                None => {}
            }
        }
        let battery = *self.battery.state();

        let flight = self.flight.update(
            &FlightInputs {
                arm_switch: aux.arm_switch,
                idle_up: aux.idle_up,
                throttle: self.channels.throttle(),
                link_fresh,
                sensor_fresh,
                lvc: battery.lvc,
                lvc_enabled: self.params.params().lvc_enabled,
                startup_low: self.battery.startup_low(),
                landing_decay: self.battery.landing_decay(),
            },
            &mut events,
        );

        self.throttle = flight.throttle;

        if flight.transition {
            self.controller.reset();
            self.setpoints.reset();
        }

        if flight.state.is_disarmed() {
            self.run_gestures(&mut events);
        } else {
            self.gestures.reset();
        }

        let commands = if flight.state.motors_enabled() {
            // The pilot has no say during a failsafe landing
            let sticks = match flight.state {
                ArmingState::FailsafeLanding => [0.0; 3],
                _ => self.channels.roll_pitch_yaw(),
            };
            let setpoints = self.setpoints.setpoints(&SetpointInputs {
                sticks,
                mode,
                attitude: self.estimate.attitude,
                trims: self.params.params().trims,
                high_rates: aux.high_rates,
            });
            self.controller.prepare(battery.v_comp, flight.on_ground);
            self.controller.compute_all(&setpoints, &self.gyr, mode)
        } else {
            Default::default()
        };

        let motors = self.mixer.mix(commands, flight.throttle, flight.state);

        TickOutput {
            motors,
            state: flight.state,
            mode,
            events,
        }
    }

    /// Run deferred work between ticks. Returns the outcome of a queued
    /// parameter save, if one was performed.
    pub fn idle(&mut self, store: &mut impl ParamStore) -> Option<StatusEvent> {
        if !core::mem::take(&mut self.save_pending) {
            return None;
        }

        match store.save(self.params.params()) {
            Ok(()) => {
                info!("{}: Parameters saved", ID);
                Some(StatusEvent::SaveComplete)
            }
            Err(e) => {
                error!("{}: Saving parameters failed: {:?}", ID, e);
                Some(StatusEvent::SaveFailed)
            }
        }
    }

    /// Reconfigure the controllers if the parameter set or the selected
    /// profile changed since the last tick.
    fn apply_params(&mut self, profile: PidProfile) {
        let current = (self.params.generation(), profile);
        if self.applied == Some(current) {
            return;
        }
        let params = self.params.params();
        self.controller.set_gains(params.gains(profile));
        self.mixer.set_yaw_inverted(params.yaw_inverted);
        debug!("{}: Applied parameter generation {}", ID, current.0);
        self.applied = Some(current);
    }

    fn run_gestures(&mut self, events: &mut TickEvents) {
        if let Some(check) = &mut self.stick_check {
            if check.update(&self.channels) {
                push(events, StatusEvent::FullStickTravel);
            }
        }

        // Stale sticks must not complete a gesture
        let sticks_live = self.flight.fault().is_none();
        let Some(action) = self.gestures.update(&self.channels, sticks_live) else {
            return;
        };
        push(events, StatusEvent::GestureMatched(action));

        let profile = self.applied.map_or(PidProfile::A, |(_, profile)| profile);
        match self.params.apply(action, profile) {
            ActionOutcome::SaveRequested => self.save_pending = true,
            ActionOutcome::StickCheck(active) => {
                self.flight.set_stick_check(active);
                self.stick_check = active.then(StickTravelCheck::default);
            }
            ActionOutcome::Changed | ActionOutcome::Selected => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::BatteryCfg;
    use crate::gesture::GestureAction;
    use crate::params::storage::MemParamStore;
    use crate::errors::adapter::embedded_storage::StorageError;

    const PERIOD_US: u64 = 1000;

    /// Drives the loop tick by tick with a vehicle sitting level.
    struct Harness {
        ctrl: ControlLoop,
        tick: u64,
        channels: ChannelVector,
        link_ok: bool,
        voltage: f32,
    }

    impl Harness {
        fn new(config: Config) -> Self {
            Self {
                ctrl: ControlLoop::new(config, TunableParams::const_default()).unwrap(),
                tick: 0,
                channels: ChannelVector::default(),
                link_ok: true,
                voltage: 4.2,
            }
        }

        fn step(&mut self) -> TickOutput {
            self.tick += 1;
            let inputs = TickInputs {
                sample: Some(AxisSample::new(
                    self.tick * PERIOD_US,
                    [0.0; 3],
                    Some([0.0, 0.0, 1.0]),
                )),
                rc: Some(RcInput {
                    channels: self.channels,
                    link_ok: self.link_ok,
                }),
                cell_voltage: Some(self.voltage),
                overran: false,
            };
            self.ctrl.tick(&inputs)
        }

        fn run(&mut self, ticks: usize) -> TickOutput {
            let mut out = self.step();
            for _ in 1..ticks {
                out = self.step();
            }
            out
        }

        fn arm(&mut self) {
            self.channels = ChannelVector::new(0.0, 0.0, 0.0, 0.0).with_aux(0, false);
            self.run(10);
            self.channels = self.channels.with_aux(0, true);
            let out = self.step();
            assert_eq!(out.state, ArmingState::Armed);
        }
    }

    #[test]
    fn invalid_config_never_builds() {
        let config = Config {
            loop_period_us: 5,
            ..Config::const_default()
        };
        assert!(ControlLoop::new(config, TunableParams::const_default()).is_err());
    }

    #[test]
    fn disarmed_outputs_zero() {
        let mut harness = Harness::new(Config::const_default());
        harness.channels = ChannelVector::new(1.0, -1.0, 1.0, 1.0);
        for _ in 0..100 {
            assert_eq!(harness.step().motors, [0.0; NUM_MOTORS]);
        }
    }

    #[test]
    fn high_throttle_never_arms() {
        let mut harness = Harness::new(Config::const_default());
        for throttle in [0.1, 0.5, 1.0] {
            harness.channels = ChannelVector::new(0.0, 0.0, 0.0, throttle).with_aux(0, false);
            harness.run(5);
            harness.channels = harness.channels.with_aux(0, true);
            let out = harness.run(50);
            assert_eq!(out.state, ArmingState::Disarmed);
        }
    }

    #[test]
    fn armed_hover_spins_motors() {
        let mut harness = Harness::new(Config::const_default());
        harness.arm();
        harness.channels = ChannelVector::new(0.0, 0.0, 0.0, 0.5).with_aux(0, true);
        let out = harness.run(100);
        assert_eq!(out.state, ArmingState::Armed);

        // Idle-up shares the arm switch, mapping throttle onto [idle, 1]
        let idle = Config::const_default().flight_state.idle_throttle;
        for duty in out.motors {
            approx::assert_relative_eq!(duty, idle + 0.5 * (1.0 - idle), epsilon = 1e-3);
        }
    }

    #[test]
    fn link_loss_lands_and_disarms() {
        let mut harness = Harness::new(Config::const_default());
        harness.arm();
        harness.channels = ChannelVector::new(0.0, 0.0, 0.0, 0.6).with_aux(0, true);
        harness.run(100);

        harness.link_ok = false;
        let mut landing = false;
        let mut last = f32::MAX;
        for _ in 0..6000 {
            let out = harness.step();
            let throttle = out.motors.iter().sum::<f32>() / NUM_MOTORS as f32;
            if out.state == ArmingState::FailsafeLanding {
                landing = true;
                assert!(throttle <= last + 1e-6);
                last = throttle;
            }
        }
        assert!(landing);
        assert_eq!(harness.ctrl.state(), ArmingState::Disarmed);
    }

    #[test]
    fn lvc_triggers_at_crossing_and_decays() {
        // Unfiltered and uncompensated voltage, so the crossing is exact
        let config = Config {
            battery: BatteryCfg {
                filter_cutoff_hz: 1000.0,
                vdrop_factor: 0.0,
                ..BatteryCfg::const_default()
            },
            ..Config::const_default()
        };
        let mut harness = Harness::new(config);
        harness.arm();
        harness.channels = ChannelVector::new(0.0, 0.0, 0.0, 0.5).with_aux(0, true);

        const N: usize = 1000;
        let mut activated_at = None;
        let mut last_throttle = f32::MAX;
        for i in 0..=N {
            harness.voltage = 4.2 - 1.0 * i as f32 / N as f32;
            let out = harness.step();
            if out.events.contains(&StatusEvent::LvcActive) {
                assert!(activated_at.is_none());
                activated_at = Some(i);
                assert!(out
                    .events
                    .contains(&StatusEvent::FailsafeLanding(crate::types::actuators::FailsafeReason::LowVoltage)));
            }
            if activated_at.is_some() && out.state == ArmingState::FailsafeLanding {
                let throttle = out.motors.iter().sum::<f32>() / NUM_MOTORS as f32;
                assert!(throttle <= last_throttle + 1e-6);
                last_throttle = throttle;
            }
        }

        let i = activated_at.unwrap();
        let at = 4.2 - 1.0 * i as f32 / N as f32;
        let before = 4.2 - 1.0 * (i - 1) as f32 / N as f32;
        assert!(at < 3.3 && before >= 3.3);
    }

    #[test]
    fn lvc_gesture_keeps_vehicle_armed_on_low_battery() {
        let mut harness = Harness::new(Config::const_default());
        let generation = harness.ctrl.params().generation();
        let left = ChannelVector::new(-1.0, 0.0, 0.0, 0.0);
        for _ in 0..3 {
            harness.channels = ChannelVector::default();
            harness.run(50);
            harness.channels = left;
            harness.run(50);
        }
        assert_eq!(harness.ctrl.params().generation(), generation + 1);
        assert!(!harness.ctrl.params().params().lvc_enabled);

        harness.arm();
        harness.channels = ChannelVector::new(0.0, 0.0, 0.0, 0.5).with_aux(0, true);
        harness.voltage = 3.0;
        let out = harness.run(500);
        assert_eq!(out.state, ArmingState::Armed);
    }

    #[test]
    fn gesture_save_is_deferred_to_idle() {
        let mut harness = Harness::new(Config::const_default());
        let mut store = MemParamStore::new();
        let down = ChannelVector::new(0.0, -1.0, 0.0, 0.0);
        let center = ChannelVector::default();

        let mut matched = false;
        for _ in 0..3 {
            harness.channels = center;
            harness.run(50);
            for _ in 0..50 {
                harness.channels = down;
                let out = harness.step();
                matched |= out
                    .events
                    .contains(&StatusEvent::GestureMatched(GestureAction::SaveParams));
            }
            // Nothing is written within a tick
            assert_eq!(store.saves, 0);
        }
        assert!(matched);
        assert_eq!(harness.ctrl.idle(&mut store), Some(StatusEvent::SaveComplete));
        assert_eq!(harness.ctrl.idle(&mut store), None);
        assert_eq!(store.saves, 1);
    }

    #[test]
    fn gesture_retune_applies_next_tick() {
        let mut harness = Harness::new(Config::const_default());
        let before = harness.ctrl.params().generation();
        let up = ChannelVector::new(0.0, 1.0, 0.0, 0.0);
        let down = ChannelVector::new(0.0, -1.0, 0.0, 0.0);
        let right = ChannelVector::new(1.0, 0.0, 0.0, 0.0);
        for stick in [up, down, right] {
            harness.channels = ChannelVector::default();
            harness.run(50);
            harness.channels = stick;
            harness.run(50);
        }
        assert_eq!(harness.ctrl.params().generation(), before + 1);
        approx::assert_relative_eq!(
            harness.ctrl.params().params().gains(PidProfile::A)[0].kp,
            0.187,
            epsilon = 1e-6
        );
    }

    #[test]
    fn stored_parameters_are_loaded() {
        let mut store = MemParamStore::new();
        let mut params = TunableParams::const_default();
        params.yaw_inverted = true;
        store.save(&params).unwrap();

        let ctrl = ControlLoop::with_store(Config::const_default(), &mut store).unwrap();
        assert!(ctrl.params().params().yaw_inverted);

        let ctrl = ControlLoop::with_store(Config::const_default(), &mut MemParamStore::new()).unwrap();
        assert_eq!(*ctrl.params().params(), TunableParams::const_default());
    }

    /// A store whose medium cannot be read.
    struct UnreadableStore;

    impl ParamStore for UnreadableStore {
        fn load(&mut self) -> Result<TunableParams, PersistError> {
            Err(StorageError::Other.into())
        }

        fn save(&mut self, _params: &TunableParams) -> Result<(), PersistError> {
            Err(StorageError::Other.into())
        }
    }

    #[test]
    fn failed_load_is_reported_once() {
        let ctrl = ControlLoop::with_store(Config::const_default(), &mut UnreadableStore).unwrap();
        let mut harness = Harness {
            ctrl,
            ..Harness::new(Config::const_default())
        };
        assert_eq!(*harness.ctrl.params().params(), TunableParams::const_default());

        let first = harness.step();
        assert!(first.events.contains(&StatusEvent::LoadFailed));
        let second = harness.step();
        assert!(!second.events.contains(&StatusEvent::LoadFailed));
    }

    #[test]
    fn missing_record_is_not_a_failure() {
        let mut store = MemParamStore::new();
        store.save(&TunableParams::const_default()).unwrap();
        store.corrupt();
        let ctrl = ControlLoop::with_store(Config::const_default(), &mut store).unwrap();
        let mut harness = Harness {
            ctrl,
            ..Harness::new(Config::const_default())
        };
        assert!(!harness.step().events.contains(&StatusEvent::LoadFailed));
    }
}
