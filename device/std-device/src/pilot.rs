//! Scripted pilot, standing in for the radio.

use common::types::rc::{ChannelVector, RcInput};

const ARM: usize = 0;
const LEVEL: usize = 1;
const HOVER: f32 = 0.65;

#[derive(Debug, Copy, Clone, PartialEq, Eq, clap::ValueEnum)]
pub enum Script {
    /// Take off, hover and land
    Hover,
    /// Take off and do a roll flip in acro
    Flip,
    /// Take off and lose the radio link
    LinkLoss,
    /// Take off and drain the battery
    Lvc,
    /// Raise the P gain and save it, without flying
    Tune,
}

pub struct Pilot {
    script: Script,
    duration: f32,
}

impl Pilot {
    pub fn new(script: Script, duration: f32) -> Self {
        Self { script, duration }
    }

    /// Time [s] at which the battery is emptied, if ever.
    pub fn drain_at(&self) -> Option<f32> {
        (self.script == Script::Lvc).then_some(2.0)
    }

    /// The radio frame at time `t` [s].
    pub fn rc(&self, t: f32) -> RcInput {
        match self.script {
            Script::Tune => self.tune(t),
            _ => self.fly(t),
        }
    }

    fn fly(&self, t: f32) -> RcInput {
        let landing = t > self.duration - 1.0;
        let armed = (0.5..self.duration - 0.5).contains(&t);
        let throttle = if t < 0.7 || landing { 0.0 } else { HOVER };

        let flipping = self.script == Script::Flip && (2.0..2.5).contains(&t);
        let roll = if flipping { 1.0 } else { 0.0 };

        let channels = ChannelVector::new(roll, 0.0, 0.0, throttle)
            .with_aux(ARM, armed)
            .with_aux(LEVEL, !flipping);

        RcInput {
            channels,
            link_ok: !(self.script == Script::LinkLoss && t >= 2.0),
        }
    }

    /// Up, down, right raises the gain, then down three times saves.
    fn tune(&self, t: f32) -> RcInput {
        const SEQUENCE: [(f32, f32); 6] = [
            (0.0, 1.0),
            (0.0, -1.0),
            (1.0, 0.0),
            (0.0, -1.0),
            (0.0, -1.0),
            (0.0, -1.0),
        ];

        // Every symbol gets 100 ms centered and 100 ms deflected
        let slot = (t / 0.2) as usize;
        let deflected = (t % 0.2) >= 0.1;
        let (roll, pitch) = match SEQUENCE.get(slot) {
            Some(stick) if deflected => *stick,
            _ => (0.0, 0.0),
        };

        RcInput {
            channels: ChannelVector::new(roll, pitch, 0.0, 0.0).with_aux(LEVEL, true),
            link_ok: true,
        }
    }
}
