//! Arming, failsafe and landing state machine.
//!
//! The state machine runs every tick ahead of the mixer. It decides which
//! throttle is in use, and whether the motors may spin at all.

use serde::{Deserialize, Serialize};

use crate::errors::{ConfigError, Fault};
use crate::filters::Linear;
use crate::types::actuators::{ArmingState, DisarmReason, FailsafeReason};
use crate::types::status::{ArmingBlocker, StatusEvent, TickEvents};

const ID: &str = "flight_state";

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlightStateCfg {
    /// Throttle stick position below which arming is allowed, and below
    /// which the vehicle is considered on the ground
    pub throttle_safety: f32,
    /// Ticks without a fresh and healthy link before failsafe
    pub failsafe_ticks: u32,
    /// Ticks without a fresh and valid sensor sample before failsafe
    pub sensor_timeout_ticks: u32,
    /// Landing throttle decay rate [1/s]
    pub landing_rate: f32,
    /// Throttle floor while the idle-up switch is on
    pub idle_throttle: f32,
}

crate::const_default!(
    FlightStateCfg => {
        throttle_safety: 0.10,
        failsafe_ticks: 1000,
        sensor_timeout_ticks: 50,
        landing_rate: 0.25,
        idle_throttle: 0.05,
    }
);

impl FlightStateCfg {
    pub fn sanity_check(&self) -> Result<(), ConfigError> {
        if self.failsafe_ticks == 0 || self.sensor_timeout_ticks == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if !(0.0..1.0).contains(&self.throttle_safety) {
            return Err(ConfigError::InvalidThreshold("flight_state.throttle_safety"));
        }
        if !(self.landing_rate.is_finite() && self.landing_rate > 0.0) {
            return Err(ConfigError::InvalidThreshold("flight_state.landing_rate"));
        }
        if !(0.0..1.0).contains(&self.idle_throttle) {
            return Err(ConfigError::InvalidThreshold("flight_state.idle_throttle"));
        }
        Ok(())
    }
}

/// Everything the state machine observes on a single tick.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FlightInputs {
    pub arm_switch: bool,
    pub idle_up: bool,
    /// Throttle stick position in `[0, 1]`
    pub throttle: f32,
    /// A fresh channel vector with a healthy link arrived this tick
    pub link_fresh: bool,
    /// A fresh and usable sensor sample arrived this tick
    pub sensor_fresh: bool,
    /// The low-voltage cutoff condition is met
    pub lvc: bool,
    /// Low-voltage cutoff is enabled in the tunable parameters
    pub lvc_enabled: bool,
    /// The battery was already below cutoff on the first reading
    pub startup_low: bool,
    /// Extra landing decay rate [1/s] from a deeply drained battery
    pub landing_decay: f32,
}

/// Outcome of a single tick.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlightOutput {
    pub state: ArmingState,
    /// Throttle to hand to the mixer
    pub throttle: f32,
    /// The throttle stick is below the safety threshold
    pub on_ground: bool,
    /// The arming state changed on this tick
    pub transition: bool,
}

/// Counts ticks since the last fresh input, saturating at the timeout.
#[derive(Debug, Copy, Clone)]
struct Staleness {
    ticks: u32,
    timeout: u32,
}

impl Staleness {
    fn new(timeout: u32) -> Self {
        // Nothing received yet, so start out as timed out
        Self {
            ticks: timeout,
            timeout,
        }
    }

    fn update(&mut self, fresh: bool) {
        self.ticks = if fresh {
            0
        } else {
            self.ticks.saturating_add(1).min(self.timeout)
        };
    }

    fn lost(&self) -> bool {
        self.ticks >= self.timeout
    }
}

pub struct FlightStateMachine {
    cfg: FlightStateCfg,
    dt: f32,
    state: ArmingState,
    idle_map: Linear<f32>,
    link: Staleness,
    sensor: Staleness,
    link_was_lost: bool,
    switch_latched: bool,
    stick_check: bool,
    prev_arm_switch: bool,
    prev_lvc: bool,
    throttle: f32,
}

impl FlightStateMachine {
    pub fn new(cfg: FlightStateCfg, dt: f32) -> Self {
        Self {
            cfg,
            dt,
            state: ArmingState::Disarmed,
            idle_map: Linear::new(0.0, 1.0, cfg.idle_throttle, 1.0),
            link: Staleness::new(cfg.failsafe_ticks),
            sensor: Staleness::new(cfg.sensor_timeout_ticks),
            link_was_lost: true,
            switch_latched: false,
            stick_check: false,
            prev_arm_switch: false,
            prev_lvc: false,
            throttle: 0.0,
        }
    }

    pub fn state(&self) -> ArmingState {
        self.state
    }

    /// Block arming while the stick travel check is active.
    pub fn set_stick_check(&mut self, active: bool) {
        self.stick_check = active;
    }

    /// The currently active arming blockers, given the throttle stick.
    pub fn blockers(&self, throttle: f32, startup_low: bool) -> ArmingBlocker {
        let mut blockers = ArmingBlocker::empty();
        blockers.set(ArmingBlocker::NO_GYR_DATA, self.sensor.lost());
        blockers.set(ArmingBlocker::RX_FAILSAFE, self.link.lost());
        blockers.set(
            ArmingBlocker::HIGH_THROTTLE_CMD,
            !(throttle < self.cfg.throttle_safety),
        );
        blockers.set(ArmingBlocker::LOW_BATTERY, startup_low);
        blockers.set(ArmingBlocker::STICK_CHECK, self.stick_check);
        blockers.set(ArmingBlocker::SWITCH_LATCHED, self.switch_latched);
        blockers
    }

    /// The fault which currently forces a landing, if any.
    pub fn fault(&self) -> Option<Fault> {
        if self.link.lost() {
            Some(Fault::Link {
                ticks: self.link.ticks,
            })
        } else if self.sensor.lost() {
            Some(Fault::Sensor {
                ticks: self.sensor.ticks,
            })
        } else {
            None
        }
    }

    pub fn update(&mut self, inputs: &FlightInputs, events: &mut TickEvents) -> FlightOutput {
        self.link.update(inputs.link_fresh);
        self.sensor.update(inputs.sensor_fresh);

        let stick_throttle = if inputs.throttle.is_finite() {
            inputs.throttle.clamp(0.0, 1.0)
        } else {
            0.0
        };

        // The switch value is meaningless without a link
        let link_lost = self.link.lost();
        let arm_switch = inputs.arm_switch && !link_lost;

        if self.link_was_lost && !link_lost && arm_switch {
            warn!("{}: Arm switch on at link-up, release it to arm", ID);
            self.switch_latched = true;
        }
        self.link_was_lost = link_lost;
        if !arm_switch && !link_lost {
            self.switch_latched = false;
        }

        let lvc_rising = inputs.lvc && !self.prev_lvc;
        self.prev_lvc = inputs.lvc;
        if lvc_rising {
            push(events, StatusEvent::LvcActive);
        }

        let previous = self.state;
        match self.state {
            ArmingState::Disarmed => {
                let blockers = self.blockers(stick_throttle, inputs.startup_low);
                if arm_switch && blockers.is_empty() {
                    info!("{}: Armed", ID);
                    self.state = ArmingState::Armed;
                    push(events, StatusEvent::Armed);
                } else if arm_switch && !self.prev_arm_switch {
                    warn!("{}: Arming rejected, blockers {}", ID, blockers.bits());
                    push(events, StatusEvent::ArmingRejected(blockers));
                }
            }
            ArmingState::Armed => {
                let reason = if link_lost {
                    Some(FailsafeReason::LinkLoss)
                } else if self.sensor.lost() {
                    Some(FailsafeReason::SensorLoss)
                } else if inputs.lvc && inputs.lvc_enabled {
                    Some(FailsafeReason::LowVoltage)
                } else {
                    None
                };

                if let Some(reason) = reason {
                    warn!("{}: Failsafe landing, {:?}", ID, reason);
                    self.state = ArmingState::FailsafeLanding;
                    push(events, StatusEvent::FailsafeLanding(reason));
                } else if !arm_switch {
                    self.disarm(DisarmReason::UserCommand, events);
                }
            }
            ArmingState::FailsafeLanding => {
                let decay = (self.cfg.landing_rate + inputs.landing_decay.max(0.0)) * self.dt;
                self.throttle = (self.throttle - decay).max(0.0);

                if inputs.link_fresh && !arm_switch {
                    self.disarm(DisarmReason::UserCommand, events);
                } else if self.throttle <= 0.0 {
                    self.disarm(DisarmReason::LandingComplete, events);
                    self.switch_latched = arm_switch || link_lost;
                }
            }
        }
        self.prev_arm_switch = arm_switch;

        // The landing throttle carries over from the last throttle in use,
        // so only a regular armed tick picks up the stick.
        match self.state {
            ArmingState::Armed => {
                self.throttle = if inputs.idle_up {
                    self.idle_map.map(stick_throttle)
                } else {
                    stick_throttle
                };
            }
            ArmingState::Disarmed => self.throttle = 0.0,
            ArmingState::FailsafeLanding => {}
        }

        // A failsafe descent is airborne until its throttle runs low
        let ground_throttle = match self.state {
            ArmingState::FailsafeLanding => self.throttle,
            _ => stick_throttle,
        };

        FlightOutput {
            state: self.state,
            throttle: self.throttle,
            on_ground: ground_throttle < self.cfg.throttle_safety,
            transition: previous != self.state,
        }
    }

    fn disarm(&mut self, reason: DisarmReason, events: &mut TickEvents) {
        info!("{}: Disarmed, {:?}", ID, reason);
        self.state = ArmingState::Disarmed;
        self.throttle = 0.0;
        push(events, StatusEvent::Disarmed(reason));
    }
}

pub(crate) fn push(events: &mut TickEvents, event: StatusEvent) {
    if events.push(event).is_err() {
        debug!("{}: Event queue full, dropped event", ID);
    }
}
