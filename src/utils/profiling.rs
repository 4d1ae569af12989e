use std::time::{Duration, Instant};

use crate::dynamics::solver::SolverStepMetrics;

/// Timing and counters of one fixed step, logged at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct StepProfile {
    pub grouping_time: Duration,
    pub detection_time: Duration,
    pub solver_time: Duration,
    pub integrator_time: Duration,
    pub total_time: Duration,

    pub body_count: usize,
    pub group_count: usize,
    pub substep_count: usize,
    pub contact_count: usize,
    /// Solver aggregates summed over every group and substep.
    pub solver: SolverStepMetrics,
}

impl StepProfile {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn report(&self) {
        if !log::log_enabled!(log::Level::Debug) {
            return;
        }
        let total_us = self.total_time.as_micros().max(1) as f32;
        let share = |d: Duration| d.as_micros() as f32 / total_us * 100.0;
        log::debug!(
            "step: {} bodies, {} groups, {} substeps, {} contacts in {:.2} ms \
             (grouping {:.0}%, detection {:.0}%, solver {:.0}%, integrator {:.0}%), \
             impulses: normal {:.3} N·s, tangent {:.3} N·s",
            self.body_count,
            self.group_count,
            self.substep_count,
            self.contact_count,
            self.total_time.as_secs_f32() * 1000.0,
            share(self.grouping_time),
            share(self.detection_time),
            share(self.solver_time),
            share(self.integrator_time),
            self.solver.normal_impulse_sum,
            self.solver.tangent_impulse_sum,
        );
    }
}

/// Adds the lifetime of the guard to a duration slot.
pub struct Accumulate<'a> {
    start: Instant,
    output: &'a mut Duration,
}

impl<'a> Accumulate<'a> {
    pub fn new(output: &'a mut Duration) -> Self {
        Self {
            start: Instant::now(),
            output,
        }
    }
}

impl<'a> Drop for Accumulate<'a> {
    fn drop(&mut self) {
        *self.output += self.start.elapsed();
    }
}
