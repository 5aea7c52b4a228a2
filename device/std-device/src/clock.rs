use std::time::{Duration, Instant};

use common::scheduler::Clock;
use whoop_sim::SimHandle;

/// Clock driven by the simulation. Waiting steps the physics until the
/// deadline, and optionally sleeps to keep pace with the wall clock.
pub struct SimClock {
    sim: SimHandle,
    step_dt: f32,
    paced_since: Option<Instant>,
}

impl SimClock {
    pub fn new(sim: SimHandle, step_dt: f32, realtime: bool) -> Self {
        Self {
            sim,
            step_dt,
            paced_since: realtime.then(Instant::now),
        }
    }
}

impl Clock for SimClock {
    fn now_us(&mut self) -> u64 {
        self.sim.timestamp_us()
    }

    fn wait_until_us(&mut self, deadline_us: u64) {
        while self.sim.timestamp_us() < deadline_us {
            self.sim.step(self.step_dt);
        }

        // If the deadline is already in the past, return right away
        if let Some(start) = self.paced_since {
            let expires_at = start + Duration::from_micros(deadline_us);
            if let Some(duration) = expires_at.checked_duration_since(Instant::now()) {
                std::thread::sleep(duration);
            }
        }
    }
}
