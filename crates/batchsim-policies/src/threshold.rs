//! Threshold admission with a batch-size cap and eviction on overflow.
//!
//! Tokens are dispatched first, up to `max_batch_size` entries. New prompts
//! are admitted in arrival order only while the running set's memory stays at
//! or below `capacity * (1 - alpha)`; the remaining `alpha` fraction is
//! headroom for running jobs to grow into. When realized memory still
//! overflows, the engine evicts running jobs at random (see
//! [`OverflowResponse::Evict`]).

use crate::fcfs::arrival_order;
use crate::traits::*;
use std::collections::BTreeMap;

/// Threshold batch former.
pub struct Threshold {
    /// Fraction of capacity held back from new admissions, in (0, 1).
    alpha: f64,
    /// Maximum entries (tokens and prompts) per batch.
    max_batch_size: usize,
    /// Also consult the feasibility oracle for each admission.
    admission_check: bool,
    /// Batch formations where the alpha gate blocked new prompts.
    gate_closures: u64,
    /// Ready tokens left out of a batch by the size cap.
    deferred_tokens: u64,
}

impl Threshold {
    pub fn new(alpha: f64, max_batch_size: usize, admission_check: bool) -> Self {
        Self {
            alpha,
            max_batch_size: max_batch_size.max(1),
            admission_check,
            gate_closures: 0,
            deferred_tokens: 0,
        }
    }

    /// Memory level above which no new prompt is admitted.
    pub fn admission_threshold(&self, capacity: f64) -> f64 {
        capacity * (1.0 - self.alpha)
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self::new(0.1, 256, true)
    }
}

impl BatchPolicy for Threshold {
    fn form_batch(&mut self, ctx: &PolicyContext<'_>) -> BatchPlan {
        let mut plan = BatchPlan::new();
        let tokens = tokens_in_order(ctx.ready_tokens);
        for job in tokens.iter().take(self.max_batch_size) {
            plan.entries.push(job.token_entry());
        }
        self.deferred_tokens += tokens.len().saturating_sub(self.max_batch_size) as u64;

        if ctx.memory_in_use as f64 > self.admission_threshold(ctx.capacity) {
            self.gate_closures += 1;
            return plan;
        }

        let candidates = arrival_order(ctx.waiting);
        let limit = Some(self.max_batch_size);
        if self.admission_check {
            admit_greedy(ctx, &candidates, &mut plan, limit);
        } else {
            admit_unchecked(ctx, &candidates, &mut plan, limit);
        }
        plan
    }

    fn name(&self) -> &str {
        "threshold"
    }

    fn overflow_response(&self) -> OverflowResponse {
        OverflowResponse::Evict
    }

    fn custom_metrics(&self) -> BTreeMap<String, f64> {
        let mut m = BTreeMap::new();
        m.insert("alpha_gate_closures".to_string(), self.gate_closures as f64);
        m.insert("deferred_tokens".to_string(), self.deferred_tokens as f64);
        m
    }
}
