//! Software-in-the-loop simulation of a tiny whoop.
//!
//! The vehicle is shared between the simulated peripherals through a
//! [`SimHandle`], so the inertial sensor, the battery and the motors can be
//! handed to different owners, just like real hardware.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub mod battery;
pub mod config;
mod distortion;
pub mod flash;
pub mod physics;
pub mod thrust;

use battery::{BatteryModel, BatteryParams};
use common::scheduler::MotorOutput;
use common::types::measurements::AxisSample;
use common::NUM_MOTORS;
use physics::{Initial, Simulation, VehicleParams, VehicleState};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

pub use distortion::{DistortConfig, Distortion};
pub use flash::SimulatedFlash;

type E = Box<dyn std::error::Error>;

/// Flash capacity of the simulated flight controller
pub const FLASH_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct Configuration {
    /// Physics step [s]
    pub step_dt: f32,
    pub seed: u64,
    pub vehicle: VehicleParams,
    pub initial: Initial,
    pub battery: BatteryParams,
    pub accelerometer: DistortConfig,
    pub gyroscope: DistortConfig,
    /// Standard deviation of the cell voltage reading [V]
    pub vbat_noise: f32,
}

impl Configuration {
    /// An ideal whoop at rest on the floor, with noiseless sensors.
    pub fn ideal() -> Self {
        config::ToplevelConfig::default().assemble(0)
    }
}

struct World {
    sim: Simulation,
    battery: BatteryModel,
}

#[derive(Clone)]
pub struct SimHandle(Arc<Mutex<World>>);

impl SimHandle {
    pub fn new(config: &Configuration) -> Self {
        Self(Arc::new(Mutex::new(World {
            sim: Simulation::new(config.vehicle.clone(), config.initial.clone()),
            battery: BatteryModel::new(config.battery),
        })))
    }

    fn world(&self) -> MutexGuard<'_, World> {
        // A panicking reader cannot leave the world half-updated
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn timestamp_us(&self) -> u64 {
        self.world().sim.time_us()
    }

    pub fn vehicle_state(&self) -> VehicleState {
        self.world().sim.state().clone()
    }

    pub fn cell_voltage(&self) -> f32 {
        self.world().battery.cell_voltage()
    }

    pub fn set_battery_soc(&self, soc: f32) {
        self.world().battery.set_soc(soc);
    }

    pub fn make_upright(&self) {
        self.world().sim.make_upright();
    }

    /// Advance physics and battery by `dt` seconds.
    pub fn step(&self, dt: f32) {
        let mut world = self.world();
        let duties = *world.sim.commands();
        world.battery.step(&duties, dt);
        world.sim.step(dt);
    }
}

/// Bundle of simulated peripherals.
pub struct Resources {
    pub imu: SimulatedImu,
    pub motors: SimulatedMotors,
    pub battery: SimulatedBattery,
    pub flash: SimulatedFlash,
}

pub fn initialize(config: &Configuration) -> Result<(Resources, SimHandle), E> {
    let sim = SimHandle::new(config);
    log::info!(
        "Initialized a {:.0} g vehicle, physics step {} us",
        config.vehicle.mass * 1e3,
        (config.step_dt * 1e6).round()
    );

    let imu = SimulatedImu::new(sim.clone(), config)?;
    let motors = SimulatedMotors::new(sim.clone());
    let battery = SimulatedBattery::new(sim.clone(), config.vbat_noise, config.seed)?;
    let flash = SimulatedFlash::new(FLASH_CAPACITY);

    Ok((
        Resources {
            imu,
            motors,
            battery,
            flash,
        },
        sim,
    ))
}

pub struct SimulatedImu {
    sim: SimHandle,
    acc_dist: Distortion,
    gyr_dist: Distortion,
}

impl SimulatedImu {
    pub fn new(sim: SimHandle, config: &Configuration) -> Result<Self, E> {
        Ok(Self {
            sim,
            acc_dist: Distortion::new(&config.accelerometer, config.step_dt, config.seed)?,
            gyr_dist: Distortion::new(&config.gyroscope, config.step_dt, config.seed.wrapping_add(1))?,
        })
    }

    /// Sample the sensor at the current simulation time.
    pub fn read(&mut self) -> AxisSample {
        let state = self.sim.vehicle_state();
        AxisSample::new(
            self.sim.timestamp_us(),
            self.gyr_dist.apply(state.body_gyr).into(),
            Some(self.acc_dist.apply(state.body_acc).into()),
        )
    }
}

pub struct SimulatedMotors {
    sim: SimHandle,
}

impl SimulatedMotors {
    pub fn new(sim: SimHandle) -> Self {
        SimulatedMotors { sim }
    }
}

impl MotorOutput for SimulatedMotors {
    fn write(&mut self, duties: &[f32; NUM_MOTORS]) {
        self.sim.world().sim.set_motors(duties);
    }
}

pub struct SimulatedBattery {
    sim: SimHandle,
    noise: Normal<f32>,
    rng: StdRng,
}

impl SimulatedBattery {
    pub fn new(sim: SimHandle, noise: f32, seed: u64) -> Result<Self, E> {
        Ok(Self {
            sim,
            noise: Normal::new(0.0, noise)?,
            rng: StdRng::seed_from_u64(seed.wrapping_add(2)),
        })
    }

    /// Per-cell voltage [V]
    pub fn read(&mut self) -> f32 {
        self.sim.cell_voltage() + self.noise.sample(&mut self.rng)
    }
}
