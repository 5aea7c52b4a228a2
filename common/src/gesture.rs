//! Stick gesture recognition.
//!
//! While disarmed, the roll and pitch sticks are discretized into direction
//! symbols. A symbol only registers after the sticks returned to center, and
//! the last few symbols are matched against a fixed table of sequences.

use heapless::Deque;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::types::rc::ChannelVector;

const ID: &str = "gesture";

/// Number of symbols in every gesture
pub const GESTURE_LEN: usize = 3;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Symbol {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GestureAction {
    ToggleLvc,
    ToggleYawInversion,
    SaveParams,
    StickCheckOn,
    StickCheckOff,
    NextTerm,
    NextAxis,
    IncreaseGain,
    DecreaseGain,
}

use Symbol::{Down as D, Left as L, Right as R, Up as U};

pub const GESTURE_TABLE: [([Symbol; GESTURE_LEN], GestureAction); 9] = [
    ([L, L, L], GestureAction::ToggleLvc),
    ([D, U, D], GestureAction::ToggleYawInversion),
    ([D, D, D], GestureAction::SaveParams),
    ([R, R, D], GestureAction::StickCheckOn),
    ([L, L, D], GestureAction::StickCheckOff),
    ([U, D, U], GestureAction::NextTerm),
    ([U, D, D], GestureAction::NextAxis),
    ([U, D, R], GestureAction::IncreaseGain),
    ([U, D, L], GestureAction::DecreaseGain),
];

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GestureCfg {
    /// Sample the sticks every `divider` ticks
    pub divider: u32,
    /// Stick deflection which registers a direction
    pub threshold: f32,
    /// Stick deflection below which the sticks count as centered
    pub center: f32,
    /// Ticks without a new symbol before the history is dropped
    pub timeout_ticks: u32,
}

crate::const_default!(
    GestureCfg => {
        divider: 5,
        threshold: 0.8,
        center: 0.2,
        timeout_ticks: 1500,
    }
);

impl GestureCfg {
    pub fn sanity_check(&self) -> Result<(), ConfigError> {
        if self.divider == 0 {
            return Err(ConfigError::ZeroDivider);
        }
        if self.timeout_ticks == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if !(self.center > 0.0 && self.center < self.threshold && self.threshold <= 1.0) {
            return Err(ConfigError::InvalidThreshold("gesture.threshold"));
        }
        Ok(())
    }
}

pub struct GestureEngine {
    cfg: GestureCfg,
    history: Deque<Symbol, GESTURE_LEN>,
    tick: u32,
    idle_ticks: u32,
    centered: bool,
}

impl GestureEngine {
    pub fn new(cfg: GestureCfg) -> Self {
        Self {
            cfg,
            history: Deque::new(),
            tick: 0,
            idle_ticks: 0,
            centered: false,
        }
    }

    /// Feed the sticks of a single tick. Returns the matched action, if a
    /// gesture completed on this tick. Sticks which are not live drop any
    /// partial gesture.
    pub fn update(&mut self, channels: &ChannelVector, sticks_live: bool) -> Option<GestureAction> {
        if !sticks_live {
            self.reset();
            return None;
        }

        self.idle_ticks = self.idle_ticks.saturating_add(1);
        if self.idle_ticks > self.cfg.timeout_ticks && !self.history.is_empty() {
            trace!("{}: Timed out, dropping history", ID);
            self.history.clear();
        }

        self.tick = self.tick.wrapping_add(1);
        if self.tick % self.cfg.divider != 0 {
            return None;
        }

        let roll = channels.roll();
        let pitch = channels.pitch();

        if roll.abs() < self.cfg.center && pitch.abs() < self.cfg.center {
            self.centered = true;
            return None;
        }

        if !self.centered {
            return None;
        }

        let symbol = self.symbol(roll, pitch)?;
        self.centered = false;
        self.idle_ticks = 0;

        if self.history.is_full() {
            self.history.pop_front();
        }
        // Cannot fail, a slot was just freed
        let _ = self.history.push_back(symbol);

        let action = self.matched()?;
        info!("{}: Matched {:?}", ID, action);
        self.history.clear();
        Some(action)
    }

    fn symbol(&self, roll: f32, pitch: f32) -> Option<Symbol> {
        let threshold = self.cfg.threshold;
        if roll <= -threshold {
            Some(Symbol::Left)
        } else if roll >= threshold {
            Some(Symbol::Right)
        } else if pitch >= threshold {
            Some(Symbol::Up)
        } else if pitch <= -threshold {
            Some(Symbol::Down)
        } else {
            None
        }
    }

    fn matched(&self) -> Option<GestureAction> {
        if !self.history.is_full() {
            return None;
        }
        GESTURE_TABLE
            .iter()
            .find(|(sequence, _)| self.history.iter().eq(sequence.iter()))
            .map(|(_, action)| *action)
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.idle_ticks = 0;
        self.centered = false;
    }
}

/// Reports sticks reaching full throw while the stick travel check is on.
#[derive(Debug, Default)]
pub struct StickTravelCheck {
    at_full: [bool; 4],
}

impl StickTravelCheck {
    const FULL: f32 = 0.98;

    /// Returns true when any stick newly reached full throw.
    pub fn update(&mut self, channels: &ChannelVector) -> bool {
        let [roll, pitch, yaw] = channels.roll_pitch_yaw();
        let values = [roll.abs(), pitch.abs(), yaw.abs(), channels.throttle()];
        let mut reached = false;
        for (value, at_full) in values.iter().zip(self.at_full.iter_mut()) {
            let full = *value >= Self::FULL;
            reached |= full && !*at_full;
            *at_full = full;
        }
        reached
    }
}
