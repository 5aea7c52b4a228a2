//! The flight core flying the simulated whoop.

use common::config::Config;
use common::control_loop::{ControlLoop, TickInputs, TickOutput};
use common::params::storage::{FlashParamStore, ParamStore};
use common::params::TunableParams;
use common::scheduler::MotorOutput;
use common::types::actuators::{ArmingState, FailsafeReason};
use common::types::flight_mode::FlightMode;
use common::types::rc::{ChannelVector, RcInput};
use common::types::status::StatusEvent;
use whoop_sim::{initialize, Configuration, Resources, SimHandle};

const ARM: usize = 0;
const LEVEL: usize = 1;
const HOVER_THROTTLE: f32 = 0.65;

struct Flight {
    ctrl: ControlLoop,
    res: Resources,
    sim: SimHandle,
    dt: f32,
    channels: ChannelVector,
    link_ok: bool,
    events: Vec<StatusEvent>,
}

impl Flight {
    fn new(leveling: bool) -> Self {
        let config = Configuration::ideal();
        let (res, sim) = initialize(&config).unwrap();
        Self {
            ctrl: ControlLoop::new(Config::const_default(), TunableParams::const_default()).unwrap(),
            res,
            sim,
            dt: config.step_dt,
            channels: ChannelVector::default().with_aux(LEVEL, leveling),
            link_ok: true,
            events: Vec::new(),
        }
    }

    fn step(&mut self) -> TickOutput {
        let inputs = TickInputs {
            sample: Some(self.res.imu.read()),
            rc: Some(RcInput {
                channels: self.channels,
                link_ok: self.link_ok,
            }),
            cell_voltage: Some(self.res.battery.read()),
            overran: false,
        };
        let out = self.ctrl.tick(&inputs);
        self.events.extend_from_slice(&out.events);
        self.res.motors.write(&out.motors);
        self.sim.step(self.dt);
        out
    }

    fn run(&mut self, seconds: f32) -> TickOutput {
        let ticks = (seconds / self.dt).round() as usize;
        let mut out = self.step();
        for _ in 1..ticks {
            out = self.step();
        }
        out
    }

    fn sticks(&mut self, roll: f32, pitch: f32, yaw: f32, throttle: f32) {
        let mut channels = ChannelVector::new(roll, pitch, yaw, throttle);
        channels.0[4..].copy_from_slice(&self.channels.0[4..]);
        self.channels = channels;
    }

    fn take_off(&mut self) {
        self.sticks(0.0, 0.0, 0.0, 0.0);
        self.run(0.1);
        self.channels = self.channels.with_aux(ARM, true);
        let out = self.run(0.01);
        assert_eq!(out.state, ArmingState::Armed);

        self.sticks(0.0, 0.0, 0.0, HOVER_THROTTLE);
        self.run(1.0);
        assert!(!self.sim.vehicle_state().on_ground, "never left the floor");
    }

    fn max_tilt_deg(&self) -> f32 {
        let [roll, pitch] = self.sim.vehicle_state().roll_pitch();
        roll.abs().max(pitch.abs()).to_degrees()
    }
}

#[test]
fn angle_mode_hovers_level() {
    let mut flight = Flight::new(true);
    flight.take_off();
    let out = flight.run(2.0);
    assert_eq!(out.mode, FlightMode::Angle);
    assert!(flight.max_tilt_deg() < 5.0, "tilted {} deg", flight.max_tilt_deg());
    assert!(flight.sim.vehicle_state().body_gyr.norm() < 0.5);
}

#[test]
fn angle_mode_follows_stick_angle() {
    let mut flight = Flight::new(true);
    flight.take_off();
    flight.sticks(0.3, 0.0, 0.0, HOVER_THROTTLE);
    flight.run(0.5);

    // 30 % of the 66 deg maximum
    let [roll, pitch] = flight.sim.vehicle_state().roll_pitch();
    assert!((roll.to_degrees() - 19.8).abs() < 5.0, "roll {} deg", roll.to_degrees());
    assert!(pitch.to_degrees().abs() < 5.0);
}

#[test]
fn attitude_estimate_holds_through_sustained_bank() {
    let mut flight = Flight::new(true);
    flight.take_off();
    flight.sticks(0.3, 0.0, 0.0, HOVER_THROTTLE);

    for _ in 0..25 {
        flight.run(0.1);
        let truth = flight.sim.vehicle_state().roll_pitch()[0].to_degrees();
        let estimate = flight.ctrl.estimate().attitude.unwrap()[0].to_degrees();
        assert!((truth - estimate).abs() < 5.0, "truth {truth} deg, estimate {estimate} deg");
    }
    assert!(!flight.sim.vehicle_state().on_ground);
}

#[test]
fn acro_roll_stick_rolls_right() {
    let mut flight = Flight::new(false);
    flight.take_off();
    assert!(flight.sim.vehicle_state().body_gyr.norm() < 0.5);

    flight.sticks(0.3, 0.0, 0.0, HOVER_THROTTLE);
    let out = flight.run(0.1);
    assert_eq!(out.mode, FlightMode::Acro);
    let state = flight.sim.vehicle_state();
    assert!(state.body_gyr.x > 1.0, "roll rate {}", state.body_gyr.x);
    assert!(state.body_gyr.y.abs() < 1.0);
    assert!(state.roll_pitch()[0] > 0.0);
}

#[test]
fn yaw_stick_turns_left() {
    let mut flight = Flight::new(true);
    flight.take_off();
    flight.sticks(0.0, 0.0, 0.1, HOVER_THROTTLE);
    flight.run(0.3);
    assert!(flight.sim.vehicle_state().body_gyr.z > 0.5);
}

#[test]
fn link_loss_lands_and_disarms() {
    let mut flight = Flight::new(true);
    flight.take_off();

    flight.link_ok = false;
    flight.run(1.5);
    assert_eq!(flight.ctrl.state(), ArmingState::FailsafeLanding);
    assert!(flight
        .events
        .contains(&StatusEvent::FailsafeLanding(FailsafeReason::LinkLoss)));
    assert!(flight.max_tilt_deg() < 10.0);

    let out = flight.run(4.0);
    assert_eq!(out.state, ArmingState::Disarmed);
    assert_eq!(out.motors, [0.0; 4]);
}

#[test]
fn drained_battery_triggers_lvc() {
    let mut flight = Flight::new(true);
    flight.take_off();
    flight.sim.set_battery_soc(0.0);
    flight.run(1.0);
    assert!(flight.events.contains(&StatusEvent::LowBattery));
    assert!(flight.events.contains(&StatusEvent::LvcActive));
    assert!(flight
        .events
        .contains(&StatusEvent::FailsafeLanding(FailsafeReason::LowVoltage)));
}

#[test]
fn saved_gains_survive_reboot() {
    let mut flight = Flight::new(false);
    let mut store = FlashParamStore::new(
        std::mem::replace(&mut flight.res.flash, whoop_sim::SimulatedFlash::new(0)),
        0,
    );

    // Increase the roll and pitch P gain, then save
    let gestures = [[0.0, 1.0], [0.0, -1.0], [1.0, 0.0], [0.0, -1.0], [0.0, -1.0], [0.0, -1.0]];
    for [roll, pitch] in gestures {
        flight.sticks(0.0, 0.0, 0.0, 0.0);
        flight.run(0.05);
        flight.sticks(roll, pitch, 0.0, 0.0);
        flight.run(0.05);
        if let Some(outcome) = flight.ctrl.idle(&mut store) {
            assert_eq!(outcome, StatusEvent::SaveComplete);
        }
    }
    assert_eq!(flight.ctrl.state(), ArmingState::Disarmed);

    let expected = *flight.ctrl.params().params();
    assert!(expected.pid_profiles[0][0].kp > TunableParams::const_default().pid_profiles[0][0].kp);
    assert_eq!(store.load(), Ok(expected));

    let rebooted = ControlLoop::with_store(Config::const_default(), &mut store).unwrap();
    assert_eq!(*rebooted.params().params(), expected);
}
