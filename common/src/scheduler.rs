//! Fixed-period tick scheduling.
//!
//! The scheduler only keeps time. Hardware timers and host sleeps live
//! behind the [`Clock`] trait, and motor drivers behind [`MotorOutput`].

use crate::filters::statistics::Statistics;
use crate::NUM_MOTORS;

const ID: &str = "scheduler";

/// Monotonic time source of the loop.
pub trait Clock {
    /// Microseconds since an arbitrary, fixed epoch
    fn now_us(&mut self) -> u64;

    /// Block until `deadline_us` has passed. Returns immediately if it
    /// already has.
    fn wait_until_us(&mut self, deadline_us: u64);
}

/// Sink of the per-tick motor duties, each in `[0, 1]`.
pub trait MotorOutput {
    fn write(&mut self, duties: &[f32; NUM_MOTORS]);
}

/// Timing of a single tick.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TickTiming {
    /// Start of this tick [us]
    pub start_us: u64,
    /// The previous tick ran past its period
    pub overran: bool,
}

pub struct LoopScheduler<C: Clock> {
    clock: C,
    period_us: u64,
    deadline_us: Option<u64>,
    tick_start_us: u64,
    overruns: u32,
    exec_time: Statistics<f32>,
}

impl<C: Clock> LoopScheduler<C> {
    pub fn new(clock: C, period_us: u32) -> Self {
        Self {
            clock,
            period_us: period_us.max(1) as u64,
            deadline_us: None,
            tick_start_us: 0,
            overruns: 0,
            exec_time: Statistics::new(0.01),
        }
    }

    /// Wait for the next period boundary. A tick which ran past one or
    /// more boundaries counts as an overrun, and the schedule skips ahead
    /// to the first boundary still in the future.
    pub fn wait_next(&mut self) -> TickTiming {
        let now = self.clock.now_us();

        let Some(deadline) = self.deadline_us else {
            self.deadline_us = Some(now + self.period_us);
            self.tick_start_us = now;
            return TickTiming {
                start_us: now,
                overran: false,
            };
        };

        let exec_us = now.saturating_sub(self.tick_start_us);
        self.exec_time.add_sample(exec_us as f32);

        let mut next = deadline;
        let overran = now > deadline;
        if overran {
            let missed = (now - deadline) / self.period_us + 1;
            next = deadline + missed * self.period_us;
            self.overruns = self.overruns.saturating_add(1);
            warn!("{}: Tick overrun by {} us, skipping {} periods", ID, now - deadline, missed);
        }

        self.clock.wait_until_us(next);
        self.tick_start_us = next;
        self.deadline_us = Some(next + self.period_us);
        TickTiming {
            start_us: next,
            overran,
        }
    }

    pub fn overruns(&self) -> u32 {
        self.overruns
    }

    /// Mean and standard deviation of the tick execution time [us]
    pub fn exec_time(&self) -> (f32, f32) {
        (self.exec_time.mean_var().0, self.exec_time.std_dev())
    }

    pub fn clock(&mut self) -> &mut C {
        &mut self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Clock where every wait jumps straight to the deadline, and work is
    /// simulated by advancing `now` manually.
    struct FakeClock {
        now: u64,
    }

    impl Clock for FakeClock {
        fn now_us(&mut self) -> u64 {
            self.now
        }

        fn wait_until_us(&mut self, deadline_us: u64) {
            self.now = self.now.max(deadline_us);
        }
    }

    #[test]
    fn ticks_on_period_boundaries() {
        let mut scheduler = LoopScheduler::new(FakeClock { now: 500 }, 1000);
        assert_eq!(scheduler.wait_next().start_us, 500);
        for i in 1..10 {
            scheduler.clock().now += 300;
            let timing = scheduler.wait_next();
            assert_eq!(timing.start_us, 500 + i * 1000);
            assert!(!timing.overran);
        }
        assert_eq!(scheduler.overruns(), 0);
        assert_eq!(scheduler.exec_time(), (300.0, 0.0));
    }

    #[test]
    fn overrun_skips_to_next_boundary() {
        let mut scheduler = LoopScheduler::new(FakeClock { now: 0 }, 1000);
        scheduler.wait_next();
        scheduler.clock().now += 2500;
        let timing = scheduler.wait_next();
        assert!(timing.overran);
        assert_eq!(timing.start_us, 3000);
        assert_eq!(scheduler.overruns(), 1);

        scheduler.clock().now += 100;
        let timing = scheduler.wait_next();
        assert!(!timing.overran);
        assert_eq!(timing.start_us, 4000);
    }
}
