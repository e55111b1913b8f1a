//! First-come-first-served admission.
//!
//! Every ready token is dispatched, then waiting prompts are admitted in
//! arrival order until the feasibility oracle rejects one.

use crate::traits::*;

/// FCFS batch former.
pub struct Fcfs;

impl Fcfs {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Fcfs {
    fn default() -> Self {
        Self::new()
    }
}

/// Waiting jobs ordered by arrival time, ties by id.
pub fn arrival_order(waiting: &[JobView]) -> Vec<&JobView> {
    let mut ordered: Vec<&JobView> = waiting.iter().collect();
    ordered.sort_by(|a, b| {
        a.arrival_time
            .total_cmp(&b.arrival_time)
            .then(a.id.cmp(&b.id))
    });
    ordered
}

impl BatchPolicy for Fcfs {
    fn form_batch(&mut self, ctx: &PolicyContext<'_>) -> BatchPlan {
        let mut plan = BatchPlan::new();
        for job in tokens_in_order(ctx.ready_tokens) {
            plan.entries.push(job.token_entry());
        }
        admit_greedy(ctx, &arrival_order(ctx.waiting), &mut plan, None);
        plan
    }

    fn name(&self) -> &str {
        "fcfs"
    }
}
