//! Shortest-job-first admission.
//!
//! Same skeleton as FCFS, but waiting prompts are tried in ascending order of
//! output size. Shorter jobs release their memory sooner, which lets more
//! jobs share the capacity.

use crate::traits::*;

/// SJF batch former.
pub struct Sjf;

impl Sjf {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Sjf {
    fn default() -> Self {
        Self::new()
    }
}

/// Waiting jobs ordered by output size, then arrival time, then id.
pub fn shortest_first(waiting: &[JobView]) -> Vec<&JobView> {
    let mut ordered: Vec<&JobView> = waiting.iter().collect();
    ordered.sort_by(|a, b| {
        a.output_size
            .cmp(&b.output_size)
            .then(a.arrival_time.total_cmp(&b.arrival_time))
            .then(a.id.cmp(&b.id))
    });
    ordered
}

impl BatchPolicy for Sjf {
    fn form_batch(&mut self, ctx: &PolicyContext<'_>) -> BatchPlan {
        let mut plan = BatchPlan::new();
        for job in tokens_in_order(ctx.ready_tokens) {
            plan.entries.push(job.token_entry());
        }
        admit_greedy(ctx, &shortest_first(ctx.waiting), &mut plan, None);
        plan
    }

    fn name(&self) -> &str {
        "sjf"
    }
}
