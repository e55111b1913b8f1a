//! Approximate memory projection based on an average batch time.
//!
//! Instead of the exact round axis used by the feasibility oracle, each job's
//! future is extrapolated in wall-clock time: a job with `k` processed steps
//! completes at `now + (output + 1 - k) * a`, and at any later instant `t'` it
//! holds `input + s + min(k + floor((t' - now) / a), output + 1)`. Usage is
//! evaluated at every projected completion instant.
//!
//! This check never drives admission. The engine runs it next to the exact
//! oracle and reports disagreements.

use batchsim_policies::{JobView, UsagePoint};

const COMPLETION_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionCheck {
    capacity: f64,
    prompt_overhead: f64,
}

impl ProjectionCheck {
    pub fn new(capacity: f64, prompt_overhead: f64) -> Self {
        Self {
            capacity,
            prompt_overhead,
        }
    }

    /// Whether the projected usage stays within capacity at every projected
    /// completion instant.
    pub fn is_feasible(&self, jobs: &[JobView], now: f64, average_batch_time: f64) -> bool {
        self.first_violation(jobs, now, average_batch_time).is_none()
    }

    /// Earliest projected completion instant whose usage exceeds capacity.
    pub fn first_violation(
        &self,
        jobs: &[JobView],
        now: f64,
        average_batch_time: f64,
    ) -> Option<UsagePoint> {
        if average_batch_time <= 0.0 {
            return None;
        }
        let completions: Vec<f64> = jobs
            .iter()
            .map(|job| projected_completion(job, now, average_batch_time))
            .collect();
        let mut instants = completions.clone();
        instants.sort_by(f64::total_cmp);
        instants.dedup();

        for t in instants {
            let elapsed_steps = ((t - now) / average_batch_time).floor() as u64;
            let usage: f64 = jobs
                .iter()
                .zip(&completions)
                .filter(|(_, done)| **done >= t - COMPLETION_TOLERANCE)
                .map(|(job, _)| {
                    let steps =
                        (job.tokens_processed as u64 + elapsed_steps).min(job.output_size as u64 + 1);
                    job.input_size as f64 + self.prompt_overhead + steps as f64
                })
                .sum();
            if usage > self.capacity {
                return Some(UsagePoint { time: t, usage });
            }
        }
        None
    }
}

fn projected_completion(job: &JobView, now: f64, average_batch_time: f64) -> f64 {
    now + job.remaining_steps() as f64 * average_batch_time
}
