//! Batch formation policy trait definitions.
//!
//! All policies implement the [`BatchPolicy`] trait, which receives a
//! [`PolicyContext`] describing the waiting pool, the ready-token pool and the
//! running set, and returns a [`BatchPlan`] for the next dispatch.

use crate::oracle::{FeasibilityOracle, Span};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stable job identifier.
pub type JobId = u64;

/// Kind of step a batch entry performs for its job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepKind {
    /// The job's prompt step (first dispatch).
    Prompt,
    /// One token step of an already-running job.
    Token,
}

/// Read-only view of a job, provided to policies.
///
/// This is the policy crate's view of a job: only what batch formation
/// needs, not the full simulation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    pub id: JobId,
    pub arrival_time: f64,
    pub input_size: u32,
    pub output_size: u32,
    pub tokens_processed: u32,
    pub context_length: u32,
}

impl JobView {
    /// Realized memory footprint of the job while it holds resources.
    pub fn footprint(&self) -> u64 {
        self.input_size as u64 + self.tokens_processed as u64
    }

    /// Steps still outstanding, counting the prompt step.
    pub fn remaining_steps(&self) -> u64 {
        (self.output_size as u64 + 1).saturating_sub(self.tokens_processed as u64)
    }

    /// Batch entry dispatching this job's prompt step.
    pub fn prompt_entry(&self) -> BatchEntry {
        BatchEntry {
            job_id: self.id,
            kind: StepKind::Prompt,
            context_length: 0,
            prompt_tokens: self.input_size,
        }
    }

    /// Batch entry dispatching this job's next token step.
    pub fn token_entry(&self) -> BatchEntry {
        BatchEntry {
            job_id: self.id,
            kind: StepKind::Token,
            context_length: self.context_length,
            prompt_tokens: 0,
        }
    }
}

/// One job step inside a dispatched batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub job_id: JobId,
    pub kind: StepKind,
    /// Context length seen by the cost model (0 for prompt entries).
    pub context_length: u32,
    /// Input tokens processed by this entry (0 for token entries).
    pub prompt_tokens: u32,
}

/// Decision returned by a batch formation policy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchPlan {
    /// Ordered entries to dispatch as one batch. Empty means stay idle.
    pub entries: Vec<BatchEntry>,
    /// Waiting jobs the oracle rejected even with nothing else running.
    /// They can never be admitted and must not be retried.
    pub stalled: Vec<JobId>,
}

impl BatchPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of prompt entries admitted by this plan.
    pub fn admitted_prompts(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.kind == StepKind::Prompt)
            .count()
    }
}

/// What the engine should do when realized memory exceeds capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverflowResponse {
    /// Overflow means the admission oracle was wrong: halt with a diagnostic.
    Halt,
    /// Relieve pressure by randomly evicting running jobs.
    Evict,
}

/// Scheduler-visible state at a batch formation opportunity.
#[derive(Debug, Clone, Copy)]
pub struct PolicyContext<'a> {
    /// Current simulation time.
    pub now: f64,
    /// Number of batches completed so far. This is the time axis of the
    /// feasibility oracle: every running job advances one step per round.
    pub round: u64,
    /// Jobs whose next step is a token step and is immediately schedulable.
    pub ready_tokens: &'a [JobView],
    /// Jobs whose next step is their prompt step.
    pub waiting: &'a [JobView],
    /// Jobs that have started and not completed.
    pub running: &'a [JobView],
    /// Realized memory held by the running set.
    pub memory_in_use: u64,
    /// Memory capacity M.
    pub capacity: f64,
    /// Per-job base overhead `s` charged by the oracle.
    pub prompt_overhead: f64,
}

impl<'a> PolicyContext<'a> {
    /// Oracle configured with this context's capacity.
    pub fn oracle(&self) -> FeasibilityOracle {
        FeasibilityOracle::new(self.capacity)
    }

    /// Oracle spans of the current running set.
    pub fn running_spans(&self) -> Vec<Span> {
        self.running
            .iter()
            .map(|job| Span::running(job, self.round, self.prompt_overhead))
            .collect()
    }
}

/// The core batch formation trait.
///
/// Implement this trait to create custom admission strategies. The engine
/// calls [`BatchPolicy::form_batch`] every time the execution resource is idle.
pub trait BatchPolicy: Send + Sync {
    /// Build the next batch. An empty plan leaves the resource idle.
    fn form_batch(&mut self, ctx: &PolicyContext<'_>) -> BatchPlan;

    /// Human-readable name for reports.
    fn name(&self) -> &str;

    /// How realized overflow should be handled under this policy.
    fn overflow_response(&self) -> OverflowResponse {
        OverflowResponse::Halt
    }

    /// Optional: policy-specific metrics to include in output.
    fn custom_metrics(&self) -> BTreeMap<String, f64> {
        BTreeMap::new()
    }
}

/// Ready tokens in dispatch order: oldest arrival first, then by id.
pub fn tokens_in_order(ready: &[JobView]) -> Vec<&JobView> {
    let mut ordered: Vec<&JobView> = ready.iter().collect();
    ordered.sort_by(|a, b| {
        a.arrival_time
            .total_cmp(&b.arrival_time)
            .then(a.id.cmp(&b.id))
    });
    ordered
}

/// Greedy admission shared by every policy.
///
/// Walks `candidates` in order and commits each one whose prompt keeps the
/// committed set feasible. Scanning stops at the first rejection, except for
/// jobs the oracle rejects even alone: those are reported as stalled and
/// skipped. `limit` caps the total number of entries in the plan.
pub fn admit_greedy(
    ctx: &PolicyContext<'_>,
    candidates: &[&JobView],
    plan: &mut BatchPlan,
    limit: Option<usize>,
) {
    let oracle = ctx.oracle();
    let mut committed = ctx.running_spans();

    for job in candidates {
        if limit.is_some_and(|cap| plan.entries.len() >= cap) {
            break;
        }
        let span = Span::admission(job, ctx.round, ctx.prompt_overhead);
        if oracle.admits(&committed, span) {
            committed.push(span);
            plan.entries.push(job.prompt_entry());
        } else if !oracle.fits_alone(span) {
            tracing::debug!(job_id = job.id, "prompt can never fit; reporting stalled");
            plan.stalled.push(job.id);
        } else {
            break;
        }
    }
}

/// Admission without a feasibility check against the committed set, bounded
/// only by `limit`. Jobs that cannot fit even alone are still reported as
/// stalled, since re-admitting them could only overflow again.
pub fn admit_unchecked(
    ctx: &PolicyContext<'_>,
    candidates: &[&JobView],
    plan: &mut BatchPlan,
    limit: Option<usize>,
) {
    let oracle = ctx.oracle();
    for job in candidates {
        if limit.is_some_and(|cap| plan.entries.len() >= cap) {
            break;
        }
        if !oracle.fits_alone(Span::admission(job, ctx.round, ctx.prompt_overhead)) {
            tracing::debug!(job_id = job.id, "prompt can never fit; reporting stalled");
            plan.stalled.push(job.id);
            continue;
        }
        plan.entries.push(job.prompt_entry());
    }
}
