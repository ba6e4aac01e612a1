use std::time::Duration;

/// Per-step phase timings and headline counts. Attached to the world and
/// overwritten at the start of every step.
#[derive(Debug, Default, Clone, Copy)]
pub struct StepProfile {
    pub update_pairs_time: Duration,
    pub narrow_phase_time: Duration,
    pub solve_time: Duration,
    pub continuous_time: Duration,
    pub total_step_time: Duration,

    pub body_count: usize,
    pub contact_count: usize,
    pub joint_count: usize,
    pub island_count: usize,
}

impl StepProfile {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn report(&self) {
        let total_us = self.total_step_time.as_micros() as f32;
        if total_us < 1.0 {
            return;
        }

        let percent = |d: Duration| (d.as_micros() as f32 / total_us) * 100.0;
        log::debug!(
            "step {:.2} ms | pairs {:.1}% narrow {:.1}% solve {:.1}% continuous {:.1}% | bodies {} contacts {} joints {} islands {}",
            self.total_step_time.as_secs_f32() * 1000.0,
            percent(self.update_pairs_time),
            percent(self.narrow_phase_time),
            percent(self.solve_time),
            percent(self.continuous_time),
            self.body_count,
            self.contact_count,
            self.joint_count,
            self.island_count,
        );
    }
}

/// Snapshot of entity and solver diagnostics.
#[derive(Debug, Default, Clone)]
pub struct Counters {
    pub body_count: usize,
    pub shape_count: usize,
    pub contact_count: usize,
    pub joint_count: usize,
    pub island_count: usize,
    pub sleeping_set_count: usize,
    pub tree_height: i32,
    /// Constraints per graph color; the last entry is the overflow color.
    pub color_counts: Vec<usize>,
}
