//! Motor geometry and output mixing.
//!
//! Body frame is x forward, y left and z up. Motors are ordered
//! `[back-left, front-left, back-right, front-right]`.

use nalgebra::{Point3, SMatrix, Vector3};
use serde::{Deserialize, Serialize};

use crate::types::actuators::ArmingState;
use crate::types::control::AxisCommands;
use crate::utils::func::finite_or_zero;
use crate::NUM_MOTORS;

pub const WHOOP_MOTOR_SETUP: MotorSetup = MotorSetup::quad_x_basic(0.046, 0.046, 0.01);

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Motor {
    /// The position of this motor relative to the vehicle center of mass.
    pub position: Point3<f32>,

    /// The direction along which this motor will produce its thrust.
    pub direction: Vector3<f32>,

    /// The reaction torque caused by the propeller spinning, per unit of
    /// thrust. Positive values turn the frame counter-clockwise seen from
    /// above, which is what a clockwise spinning propeller does.
    pub reaction: f32,
}

impl Motor {
    /// Torque [Nm] produced about the center of mass per unit of thrust.
    pub fn torque_per_thrust(&self) -> Vector3<f32> {
        let direction = self.direction.normalize();
        self.position.coords.cross(&direction) + direction * self.reaction
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MotorSetup {
    pub motor: [Motor; NUM_MOTORS],
}

impl MotorSetup {
    /// Quad in X configuration with the front-left and back-right
    /// propellers spinning clockwise.
    pub const fn quad_x_basic(x_dist: f32, y_dist: f32, reaction: f32) -> MotorSetup {
        let x_half_dist = x_dist / 2.0;
        let y_half_dist = y_dist / 2.0;
        MotorSetup {
            motor: [
                Motor {
                    // back left
                    position: Point3::new(-x_half_dist, y_half_dist, 0.0),
                    direction: Vector3::new(0.0, 0.0, 1.0),
                    reaction: -reaction,
                },
                Motor {
                    // front left
                    position: Point3::new(x_half_dist, y_half_dist, 0.0),
                    direction: Vector3::new(0.0, 0.0, 1.0),
                    reaction,
                },
                Motor {
                    // back right
                    position: Point3::new(-x_half_dist, -y_half_dist, 0.0),
                    direction: Vector3::new(0.0, 0.0, 1.0),
                    reaction,
                },
                Motor {
                    // front right
                    position: Point3::new(x_half_dist, -y_half_dist, 0.0),
                    direction: Vector3::new(0.0, 0.0, 1.0),
                    reaction: -reaction,
                },
            ],
        }
    }

    /// Unit mixing table, where each row holds the roll, pitch and yaw
    /// sign of one motor. Derived from the sign of the torque each motor
    /// produces about the three body axes.
    pub fn sign_table(&self) -> SMatrix<f32, NUM_MOTORS, 3> {
        let mut table = SMatrix::<f32, NUM_MOTORS, 3>::zeros();
        for (i, motor) in self.motor.iter().enumerate() {
            let torque = motor.torque_per_thrust();
            for axis in 0..3 {
                table[(i, axis)] = if torque[axis] > 0.0 {
                    1.0
                } else if torque[axis] < 0.0 {
                    -1.0
                } else {
                    0.0
                };
            }
        }
        table
    }
}

/// Optional post-mix stages and output limits.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MixerCfg {
    /// Lower all motors when one exceeds full output, by at most this much
    pub lower_throttle_max: Option<f32>,
    /// Raise all motors when one is below zero, by at most this much
    pub boost_max: Option<f32>,
    /// Throttle which must be crossed once after arming before the boost
    /// is allowed
    pub boost_latch_throttle: f32,
    /// Carry output clipped above full into the next tick, bounded by this
    pub clip_carry_max: Option<f32>,
    /// Lowest duty of a spinning motor
    pub motor_min: f32,
}

crate::const_default!(
    MixerCfg => {
        lower_throttle_max: Some(0.10),
        boost_max: Some(0.2),
        boost_latch_throttle: 0.10,
        clip_carry_max: Some(0.2),
        motor_min: 0.05,
    }
);

/// Maps throttle and axis commands onto per-motor duties in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct Mixer {
    cfg: MixerCfg,
    table: SMatrix<f32, NUM_MOTORS, 3>,
    yaw_inverted: bool,
    boost_latched: bool,
    clip_carry: [f32; NUM_MOTORS],
}

impl Mixer {
    pub fn new(cfg: MixerCfg, setup: &MotorSetup) -> Self {
        Self {
            cfg,
            table: setup.sign_table(),
            yaw_inverted: false,
            boost_latched: false,
            clip_carry: [0.0; NUM_MOTORS],
        }
    }

    pub fn set_yaw_inverted(&mut self, inverted: bool) {
        self.yaw_inverted = inverted;
    }

    pub fn boost_latched(&self) -> bool {
        self.boost_latched
    }

    pub fn mix(
        &mut self,
        commands: AxisCommands,
        throttle: f32,
        arming_state: ArmingState,
    ) -> [f32; NUM_MOTORS] {
        if !arming_state.motors_enabled() {
            self.boost_latched = false;
            self.clip_carry = [0.0; NUM_MOTORS];
            return [0.0; NUM_MOTORS];
        }

        let throttle = finite_or_zero(throttle);
        let [roll, pitch, mut yaw] = commands.0.map(finite_or_zero);
        if self.yaw_inverted {
            yaw = -yaw;
        }

        if throttle > self.cfg.boost_latch_throttle {
            self.boost_latched = true;
        }

        let mut duty = [0.0; NUM_MOTORS];
        for (i, duty) in duty.iter_mut().enumerate() {
            *duty = throttle
                + self.table[(i, 0)] * roll
                + self.table[(i, 1)] * pitch
                + self.table[(i, 2)] * yaw;
        }

        let max = duty.iter().copied().fold(f32::MIN, f32::max);
        let min = duty.iter().copied().fold(f32::MAX, f32::min);

        if let Some(limit) = self.cfg.lower_throttle_max {
            if max > 1.0 {
                let lower = (max - 1.0).min(limit);
                duty.iter_mut().for_each(|d| *d -= lower);
            }
        }

        if let Some(limit) = self.cfg.boost_max {
            if self.boost_latched && min < 0.0 {
                let raise = (-min).min(limit);
                duty.iter_mut().for_each(|d| *d += raise);
            }
        }

        if let Some(limit) = self.cfg.clip_carry_max {
            for (duty, carry) in duty.iter_mut().zip(self.clip_carry.iter_mut()) {
                *duty += *carry;
                *carry = (*duty - 1.0).clamp(0.0, limit);
            }
        }

        duty.map(|d| d.clamp(self.cfg.motor_min, 1.0))
    }
}
