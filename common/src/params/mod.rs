//! In-flight tunable parameters.
//!
//! The parameter set is owned by the control loop and only mutated by
//! gesture actions between ticks. Every change bumps a generation counter,
//! which the loop compares at the start of a tick to reconfigure its
//! controllers at once.

use serde::{Deserialize, Serialize};

use crate::errors::ParamError;
use crate::filters::rate_pid::PidGains;
use crate::gesture::GestureAction;
use crate::types::control::Axis;

pub mod storage;

const ID: &str = "params";

/// Relative gain change of a single tuning step
const GAIN_STEP: f32 = 0.10;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PidProfile {
    A,
    B,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TunableParams {
    /// Rate controller gains of profile A and B, in axis order
    pub pid_profiles: [[PidGains; 3]; 2],
    /// Level trims of roll and pitch [rad]
    pub trims: [f32; 2],
    /// Accelerometer offsets [g]
    pub acc_offsets: [f32; 3],
    pub lvc_enabled: bool,
    pub yaw_inverted: bool,
}

const PROFILE_A: [PidGains; 3] = [
    PidGains::new(0.17, 1.5, 0.0022),
    PidGains::new(0.17, 1.5, 0.0022),
    PidGains::new(0.25, 1.5, 0.0),
];

const PROFILE_B: [PidGains; 3] = [
    PidGains::new(0.14, 1.2, 0.0019),
    PidGains::new(0.14, 1.2, 0.0019),
    PidGains::new(0.22, 1.2, 0.0),
];

crate::const_default!(
    TunableParams => {
        pid_profiles: [PROFILE_A, PROFILE_B],
        trims: [0.0; 2],
        acc_offsets: [0.0; 3],
        lvc_enabled: true,
        yaw_inverted: false,
    }
);

impl TunableParams {
    pub fn gains(&self, profile: PidProfile) -> &[PidGains; 3] {
        &self.pid_profiles[profile as usize]
    }

    pub fn is_valid(&self) -> bool {
        self.pid_profiles.iter().flatten().all(PidGains::is_valid)
            && self.trims.iter().all(|t| t.is_finite() && t.abs() <= MAX_TRIM)
            && self.acc_offsets.iter().all(|o| o.is_finite() && o.abs() <= MAX_ACC_OFFSET)
    }

    /// Read a parameter by name, e.g. `"rate.roll.kp"` or `"trim.pitch"`.
    /// Flags read as `0.0` or `1.0`.
    pub fn get(&self, name: &str) -> Result<f32, ParamError> {
        match ParamName::parse(name)? {
            ParamName::Gain(profile, axis, term) => {
                Ok(term.get(&self.pid_profiles[profile as usize][axis.index()]))
            }
            ParamName::Trim(index) => Ok(self.trims[index]),
            ParamName::AccOffset(index) => Ok(self.acc_offsets[index]),
            ParamName::LvcEnabled => Ok(flag_value(self.lvc_enabled)),
            ParamName::YawInverted => Ok(flag_value(self.yaw_inverted)),
        }
    }

    /// Write a parameter by name. The value is validated before it is
    /// applied, leaving the set untouched on error.
    pub fn set(&mut self, name: &str, value: f32) -> Result<(), ParamError> {
        if !value.is_finite() {
            return Err(ParamError::InvalidValue);
        }
        match ParamName::parse(name)? {
            ParamName::Gain(profile, axis, term) => {
                if value < 0.0 {
                    return Err(ParamError::InvalidValue);
                }
                term.set(&mut self.pid_profiles[profile as usize][axis.index()], value);
            }
            ParamName::Trim(index) => {
                if value.abs() > MAX_TRIM {
                    return Err(ParamError::InvalidValue);
                }
                self.trims[index] = value;
            }
            ParamName::AccOffset(index) => {
                if value.abs() > MAX_ACC_OFFSET {
                    return Err(ParamError::InvalidValue);
                }
                self.acc_offsets[index] = value;
            }
            ParamName::LvcEnabled => self.lvc_enabled = flag_from(value)?,
            ParamName::YawInverted => self.yaw_inverted = flag_from(value)?,
        }
        Ok(())
    }
}

const MAX_TRIM: f32 = 0.5;
const MAX_ACC_OFFSET: f32 = 0.5;

fn flag_value(flag: bool) -> f32 {
    if flag {
        1.0
    } else {
        0.0
    }
}

fn flag_from(value: f32) -> Result<bool, ParamError> {
    match value {
        v if v == 0.0 => Ok(false),
        v if v == 1.0 => Ok(true),
        _ => Err(ParamError::InvalidValue),
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Term {
    P,
    I,
    D,
}

impl Term {
    fn get(self, gains: &PidGains) -> f32 {
        match self {
            Term::P => gains.kp,
            Term::I => gains.ki,
            Term::D => gains.kd,
        }
    }

    fn set(self, gains: &mut PidGains, value: f32) {
        match self {
            Term::P => gains.kp = value,
            Term::I => gains.ki = value,
            Term::D => gains.kd = value,
        }
    }

    fn next(self) -> Term {
        match self {
            Term::P => Term::I,
            Term::I => Term::D,
            Term::D => Term::P,
        }
    }
}

/// Axis group selected for tuning. Roll and pitch are tuned together.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TuneAxis {
    RollPitch,
    Yaw,
}

impl TuneAxis {
    fn axes(self) -> &'static [Axis] {
        match self {
            TuneAxis::RollPitch => &[Axis::Roll, Axis::Pitch],
            TuneAxis::Yaw => &[Axis::Yaw],
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ParamName {
    Gain(PidProfile, Axis, Term),
    Trim(usize),
    AccOffset(usize),
    LvcEnabled,
    YawInverted,
}

impl ParamName {
    fn parse(name: &str) -> Result<ParamName, ParamError> {
        let mut split = name.split('.');
        let group = split.next().ok_or(ParamError::UnknownName)?;
        let first = split.next();
        let second = split.next();
        if split.next().is_some() {
            return Err(ParamError::UnknownName);
        }

        let parsed = match (group, first, second) {
            ("rate" | "rate_b", Some(axis), Some(term)) => {
                let profile = if group == "rate" {
                    PidProfile::A
                } else {
                    PidProfile::B
                };
                let axis = match axis {
                    "roll" => Axis::Roll,
                    "pitch" => Axis::Pitch,
                    "yaw" => Axis::Yaw,
                    _ => return Err(ParamError::UnknownName),
                };
                let term = match term {
                    "kp" => Term::P,
                    "ki" => Term::I,
                    "kd" => Term::D,
                    _ => return Err(ParamError::UnknownName),
                };
                ParamName::Gain(profile, axis, term)
            }
            ("trim", Some("roll"), None) => ParamName::Trim(0),
            ("trim", Some("pitch"), None) => ParamName::Trim(1),
            ("acc_offset", Some("x"), None) => ParamName::AccOffset(0),
            ("acc_offset", Some("y"), None) => ParamName::AccOffset(1),
            ("acc_offset", Some("z"), None) => ParamName::AccOffset(2),
            ("lvc_enabled", None, None) => ParamName::LvcEnabled,
            ("yaw_inverted", None, None) => ParamName::YawInverted,
            _ => return Err(ParamError::UnknownName),
        };
        Ok(parsed)
    }
}

/// What the loop has to do after a gesture action was applied.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ActionOutcome {
    /// The parameter set changed, the generation was bumped
    Changed,
    /// Only the tuning selection moved
    Selected,
    /// Persist the parameter set once the tick is done
    SaveRequested,
    /// Enter or leave the stick travel check
    StickCheck(bool),
}

/// The parameter set of the running loop, with its generation counter and
/// the gesture tuning selection.
#[derive(Debug, Clone)]
pub struct ParamTable {
    params: TunableParams,
    generation: u32,
    axis: TuneAxis,
    term: Term,
}

impl ParamTable {
    pub fn new(params: TunableParams) -> Self {
        Self {
            params,
            generation: 0,
            axis: TuneAxis::RollPitch,
            term: Term::P,
        }
    }

    pub fn params(&self) -> &TunableParams {
        &self.params
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn selection(&self) -> (TuneAxis, Term) {
        (self.axis, self.term)
    }

    /// Mutate the parameter set, bumping the generation if the closure
    /// returns `Ok`.
    pub fn modify<R>(
        &mut self,
        f: impl FnOnce(&mut TunableParams) -> Result<R, ParamError>,
    ) -> Result<R, ParamError> {
        let mut params = self.params;
        let result = f(&mut params)?;
        self.params = params;
        self.generation = self.generation.wrapping_add(1);
        Ok(result)
    }

    pub fn set(&mut self, name: &str, value: f32) -> Result<(), ParamError> {
        self.modify(|params| params.set(name, value))
    }

    /// Apply a gesture action. Gain changes act on the given profile.
    pub fn apply(&mut self, action: GestureAction, profile: PidProfile) -> ActionOutcome {
        match action {
            GestureAction::ToggleLvc => {
                self.bump(|params| params.lvc_enabled = !params.lvc_enabled);
                info!("{}: LVC enabled: {}", ID, self.params.lvc_enabled);
                ActionOutcome::Changed
            }
            GestureAction::ToggleYawInversion => {
                self.bump(|params| params.yaw_inverted = !params.yaw_inverted);
                info!("{}: Yaw inverted: {}", ID, self.params.yaw_inverted);
                ActionOutcome::Changed
            }
            GestureAction::SaveParams => ActionOutcome::SaveRequested,
            GestureAction::StickCheckOn => ActionOutcome::StickCheck(true),
            GestureAction::StickCheckOff => ActionOutcome::StickCheck(false),
            GestureAction::NextTerm => {
                self.term = self.term.next();
                ActionOutcome::Selected
            }
            GestureAction::NextAxis => {
                self.axis = match self.axis {
                    TuneAxis::RollPitch => TuneAxis::Yaw,
                    TuneAxis::Yaw => TuneAxis::RollPitch,
                };
                ActionOutcome::Selected
            }
            GestureAction::IncreaseGain => {
                self.scale_selected(profile, 1.0 + GAIN_STEP);
                ActionOutcome::Changed
            }
            GestureAction::DecreaseGain => {
                self.scale_selected(profile, 1.0 - GAIN_STEP);
                ActionOutcome::Changed
            }
        }
    }

    fn bump(&mut self, f: impl FnOnce(&mut TunableParams)) {
        f(&mut self.params);
        self.generation = self.generation.wrapping_add(1);
    }

    fn scale_selected(&mut self, profile: PidProfile, factor: f32) {
        let (tune_axis, term) = (self.axis, self.term);
        self.bump(|params| {
            for axis in tune_axis.axes() {
                let gains = &mut params.pid_profiles[profile as usize][axis.index()];
                term.set(gains, term.get(gains) * factor);
            }
        });
        debug!("{}: Scaled {:?} of {:?} by {}", ID, term, tune_axis, factor);
    }
}
