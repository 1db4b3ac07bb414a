use std::time::{Duration, Instant};

/// Per-world timing and counter data for the most recent step.
#[derive(Debug, Default, Clone, Copy)]
pub struct PhysicsProfiler {
    pub broad_phase_time: Duration,
    pub integrator_time: Duration,
    pub narrow_phase_time: Duration,
    pub position_solve_time: Duration,
    pub velocity_solve_time: Duration,
    pub total_step_time: Duration,

    pub body_count: usize,
    pub candidate_count: usize,
    /// Contacts processed by the solvers, summed over all substeps.
    pub contact_count: usize,
    /// Manifolds that did not fit in the contact buffer, summed over all substeps.
    pub dropped_contacts: usize,
    pub event_count: usize,
}

impl PhysicsProfiler {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Folds another world's numbers into this one.
    pub fn merge(&mut self, other: &Self) {
        self.broad_phase_time += other.broad_phase_time;
        self.integrator_time += other.integrator_time;
        self.narrow_phase_time += other.narrow_phase_time;
        self.position_solve_time += other.position_solve_time;
        self.velocity_solve_time += other.velocity_solve_time;
        self.total_step_time += other.total_step_time;
        self.body_count += other.body_count;
        self.candidate_count += other.candidate_count;
        self.contact_count += other.contact_count;
        self.dropped_contacts += other.dropped_contacts;
        self.event_count += other.event_count;
    }

    pub fn report(&self) {
        let total_us = self.total_step_time.as_micros() as f32;
        if total_us < 1.0 {
            return;
        }

        let share = |d: Duration| (d.as_micros() as f32 / total_us) * 100.0;

        log::info!("--- Physics Profile ---");
        log::info!(
            "Bodies: {}, Candidates: {}, Contacts: {}, Dropped: {}, Events: {}",
            self.body_count,
            self.candidate_count,
            self.contact_count,
            self.dropped_contacts,
            self.event_count
        );
        log::info!(
            "Total Step: {:.2} ms",
            self.total_step_time.as_secs_f32() * 1000.0
        );
        log::info!(
            "  Broad Phase:    {:.2} ms ({:.1}%)",
            self.broad_phase_time.as_secs_f32() * 1000.0,
            share(self.broad_phase_time)
        );
        log::info!(
            "  Integrator:     {:.2} ms ({:.1}%)",
            self.integrator_time.as_secs_f32() * 1000.0,
            share(self.integrator_time)
        );
        log::info!(
            "  Narrow Phase:   {:.2} ms ({:.1}%)",
            self.narrow_phase_time.as_secs_f32() * 1000.0,
            share(self.narrow_phase_time)
        );
        log::info!(
            "  Position Solve: {:.2} ms ({:.1}%)",
            self.position_solve_time.as_secs_f32() * 1000.0,
            share(self.position_solve_time)
        );
        log::info!(
            "  Velocity Solve: {:.2} ms ({:.1}%)",
            self.velocity_solve_time.as_secs_f32() * 1000.0,
            share(self.velocity_solve_time)
        );
    }
}

/// Adds the lifetime of the guard to the referenced duration.
pub struct StageTimer<'a> {
    start: Instant,
    output: &'a mut Duration,
}

impl<'a> StageTimer<'a> {
    pub fn new(output: &'a mut Duration) -> Self {
        Self {
            start: Instant::now(),
            output,
        }
    }
}

impl<'a> Drop for StageTimer<'a> {
    fn drop(&mut self) {
        *self.output += self.start.elapsed();
    }
}
