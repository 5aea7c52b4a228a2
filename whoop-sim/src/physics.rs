//! Rigid body model of a small quadcopter.
//!
//! World frame is z up. Body frame is x forward, y left and z up, the same
//! frame the flight core works in. The motor geometry is shared with the
//! mixer, so the torque of every motor matches the sign the mixer expects.

use common::airframe::MotorSetup;
use common::consts::GRAVITY;
use common::NUM_MOTORS;
use nalgebra::{Matrix3, UnitQuaternion, Vector3};

use crate::thrust::ThrustCurve;

#[derive(Debug, Clone)]
pub struct VehicleParams {
    /// Total mass [kg]
    pub mass: f32,
    /// Inertia along the principal body axes [kg m^2]
    pub inertia: Vector3<f32>,
    /// Linear velocity damping [N s/m]
    pub lin_damp: f32,
    /// Angular velocity damping [N m s/rad]
    pub ang_damp: f32,
    /// Time constant of the command to thrust response [s]
    pub motor_time_constant: f32,
    pub thrust: ThrustCurve,
    pub setup: MotorSetup,
}

/// The physical initial condition of the vehicle.
#[derive(Debug, Clone, Default)]
pub struct Initial {
    /// Roll, pitch and yaw [rad]
    pub rotation: Vector3<f32>,
    /// Height above the floor [m]
    pub height: f32,
    /// Body rates [rad/s]
    pub ang_velocity: Vector3<f32>,
}

/// The current physical state of the vehicle.
#[derive(Debug, Clone)]
pub struct VehicleState {
    /// Body to world rotation
    pub rotation: UnitQuaternion<f32>,
    /// Position in the world frame [m]
    pub position: Vector3<f32>,
    /// Velocity in the world frame [m/s]
    pub velocity: Vector3<f32>,
    /// Specific force in the body frame, as an accelerometer reads it [g]
    pub body_acc: Vector3<f32>,
    /// Angular velocity in the body frame [rad/s]
    pub body_gyr: Vector3<f32>,
    /// Thrust of every motor [N]
    pub thrust: [f32; NUM_MOTORS],
    pub on_ground: bool,
}

impl VehicleState {
    /// Roll and pitch [rad] in the convention of the flight core
    pub fn roll_pitch(&self) -> [f32; 2] {
        let up = self.rotation.inverse() * Vector3::z();
        let roll = up.y.atan2(up.z);
        let pitch = (-up.x).atan2((up.y * up.y + up.z * up.z).sqrt());
        [roll, pitch]
    }
}

pub struct Simulation {
    pub(crate) params: VehicleParams,
    pub(crate) state: VehicleState,
    commands: [f32; NUM_MOTORS],
    time_us: u64,
}

impl Simulation {
    pub fn new(params: VehicleParams, initial: Initial) -> Self {
        let rotation = UnitQuaternion::from_euler_angles(
            initial.rotation.x,
            initial.rotation.y,
            initial.rotation.z,
        );
        let height = initial.height.max(0.0);
        Simulation {
            params,
            state: VehicleState {
                rotation,
                position: Vector3::new(0.0, 0.0, height),
                velocity: Vector3::zeros(),
                body_acc: rotation.inverse() * Vector3::z(),
                body_gyr: initial.ang_velocity,
                thrust: [0.0; NUM_MOTORS],
                on_ground: height == 0.0,
            },
            commands: [0.0; NUM_MOTORS],
            time_us: 0,
        }
    }

    pub fn time_us(&self) -> u64 {
        self.time_us
    }

    pub fn state(&self) -> &VehicleState {
        &self.state
    }

    pub fn params(&self) -> &VehicleParams {
        &self.params
    }

    /// Commanded duties in `[0, 1]`. Anything else reads as zero.
    pub fn set_motors(&mut self, duties: &[f32; NUM_MOTORS]) {
        self.commands = duties.map(|d| if d.is_finite() { d.clamp(0.0, 1.0) } else { 0.0 });
    }

    pub fn commands(&self) -> &[f32; NUM_MOTORS] {
        &self.commands
    }

    /// Keep the heading, but level the vehicle and stop it from turning.
    pub fn make_upright(&mut self) {
        let yaw = self.state.rotation.euler_angles().2;
        self.state.rotation = UnitQuaternion::from_euler_angles(0.0, 0.0, yaw);
        self.state.body_gyr = Vector3::zeros();
    }

    /// Move the simulation forward a single time step of `dt` seconds.
    pub fn step(&mut self, dt: f32) {
        let p = &self.params;
        let state = &mut self.state;

        // First order motor response
        let alpha = dt / (p.motor_time_constant + dt);
        let mut body_force = Vector3::zeros();
        let mut body_torque = Vector3::zeros();
        for ((thrust, command), motor) in state
            .thrust
            .iter_mut()
            .zip(self.commands)
            .zip(p.setup.motor.iter())
        {
            *thrust += (p.thrust.force(command) - *thrust) * alpha;
            body_force += motor.direction.normalize() * *thrust;
            body_torque += motor.torque_per_thrust() * *thrust;
        }

        // Euler's rotation equations
        let inertia = Matrix3::from_diagonal(&p.inertia);
        let omega = state.body_gyr;
        let gyroscopic = omega.cross(&(inertia * omega));
        let omega_dot = (body_torque - gyroscopic - omega * p.ang_damp).component_div(&p.inertia);
        let omega = omega + omega_dot * dt;

        let gravity = Vector3::new(0.0, 0.0, -GRAVITY);
        let world_acc =
            state.rotation * body_force / p.mass + gravity - state.velocity * (p.lin_damp / p.mass);

        state.velocity += world_acc * dt;
        state.position += state.velocity * dt;
        state.rotation *= UnitQuaternion::from_scaled_axis(omega * dt);
        state.body_gyr = omega;

        // Resting on the floor, until the thrust lifts the vehicle off
        let mut specific = world_acc - gravity;
        let was_on_ground = state.on_ground;
        state.on_ground = state.position.z <= 0.0 && state.velocity.z <= 0.0;
        if state.on_ground != was_on_ground {
            let event = if state.on_ground { "Touchdown" } else { "Liftoff" };
            log::debug!("{} at t = {:.3} s", event, self.time_us as f32 * 1e-6);
        }
        if state.on_ground {
            state.position.z = 0.0;
            state.velocity = Vector3::zeros();
            specific = -gravity;
            let yaw = state.rotation.euler_angles().2;
            state.rotation = UnitQuaternion::from_euler_angles(0.0, 0.0, yaw);
            state.body_gyr = Vector3::zeros();
        }

        state.body_acc = state.rotation.inverse() * specific / GRAVITY;
        self.time_us += (dt * 1e6).round() as u64;
    }
}
