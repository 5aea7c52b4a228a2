use serde::{Deserialize, Serialize};

use crate::{
    battery::BatteryParams,
    distortion::DistortConfig,
    physics::{Initial, VehicleParams},
    thrust::ThrustCurve,
    Configuration,
};

type E = Box<dyn std::error::Error>;

pub fn load_from_file_path(path: &str) -> Result<Configuration, E> {
    let string = std::fs::read_to_string(path)?;
    load_from_str(&string)
}

pub fn load_from_str(string: &str) -> Result<Configuration, E> {
    let config: ToplevelConfig = toml::from_str(string)?;
    config.build()
}

#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct ToplevelConfig {
    #[serde(default)]
    pub simulation: SimConfig,
    #[serde(default)]
    pub initial: InitialConfig,
    #[serde(default)]
    pub vehicle: VehicleConfig,
    #[serde(default)]
    pub battery: BatteryParams,
    #[serde(default)]
    pub acc_dist: DistortConfig,
    #[serde(default)]
    pub gyr_dist: DistortConfig,
    #[serde(default)]
    pub vbat_dist: Option<f32>,
}

impl ToplevelConfig {
    pub fn build(self) -> Result<Configuration, E> {
        let sim = &self.simulation;
        if !(sim.rate_hz.is_finite() && sim.rate_hz > 0.0) {
            return Err(format!("simulation rate must be positive, got {}", sim.rate_hz).into());
        }

        let v = &self.vehicle;
        if !(v.mass > 0.0 && v.inertia.iter().all(|i| *i > 0.0)) {
            return Err("vehicle mass and inertia must be positive".into());
        }

        let seed = sim.seed.unwrap_or_else(rand::random);
        Ok(self.assemble(seed))
    }

    pub(crate) fn assemble(self, seed: u64) -> Configuration {
        let v = &self.vehicle;
        Configuration {
            step_dt: 1.0 / self.simulation.rate_hz,
            seed,
            vehicle: VehicleParams {
                mass: v.mass,
                inertia: v.inertia.into(),
                lin_damp: v.linear_damp,
                ang_damp: v.angular_damp,
                motor_time_constant: v.motor_time_constant.max(0.0),
                thrust: ThrustCurve::new(v.max_thrust, v.thrust_curvature),
                setup: common::airframe::MotorSetup::quad_x_basic(
                    v.motor_spacing[0],
                    v.motor_spacing[1],
                    v.reaction_torque,
                ),
            },
            initial: Initial {
                rotation: self.initial.rotation.into(),
                height: self.initial.height,
                ang_velocity: self.initial.ang_velocity.into(),
            },
            battery: self.battery,
            accelerometer: self.acc_dist,
            gyroscope: self.gyr_dist,
            vbat_noise: self.vbat_dist.unwrap_or(0.0).max(0.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Physics steps per second, also the rate at which the sensors are read
    pub rate_hz: f32,
    /// Seed of the sensor noise, random if absent
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            rate_hz: 1000.0,
            seed: None,
        }
    }
}

/// Initial condition of the vehicle. Any fields not defined will be
/// initialized with zero, i.e. level and at rest on the floor.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct InitialConfig {
    #[serde(default)]
    pub rotation: [f32; 3],
    #[serde(default)]
    pub height: f32,
    #[serde(default)]
    pub ang_velocity: [f32; 3],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    /// The total mass of the vehicle [kg]
    pub mass: f32,
    /// The angular inertia along the principal axes [kg m^2]
    pub inertia: [f32; 3],
    /// Linear velocity damping (air resistance)
    pub linear_damp: f32,
    /// Angular velocity damping (air resistance)
    pub angular_damp: f32,
    /// Distance between the front and back, and left and right motors [m]
    pub motor_spacing: [f32; 2],
    /// Propeller reaction torque per unit of thrust [m]
    pub reaction_torque: f32,
    pub motor_time_constant: f32,
    /// Thrust of a single motor at full duty [N]
    pub max_thrust: f32,
    pub thrust_curvature: f32,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            mass: 0.025,
            inertia: [2e-5, 2e-5, 3.5e-5],
            linear_damp: 0.01,
            angular_damp: 1e-6,
            motor_spacing: [0.046, 0.046],
            reaction_torque: 0.01,
            motor_time_constant: 0.01,
            max_thrust: 0.12,
            thrust_curvature: 0.3,
        }
    }
}
