//! Job model and per-job state machine.
//!
//! A [`Job`] is a prompt step of known size followed by `output_size` unit
//! token steps. The prompt step counts as the first processed unit, so a job
//! needs `output_size + 1` dispatches in total:
//!
//! ```text
//!   Waiting ──prompt──▶ Running ──token──▶ Running ──last token──▶ Completed
//!      ▲                   │
//!      └─────evict─────────┘   (all progress discarded)
//! ```

use batchsim_policies::{JobId, JobView, StepKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobError {
    #[error("job {0} not found")]
    UnknownJob(JobId),
    #[error("job {id} already exists")]
    DuplicateJob { id: JobId },
    #[error("invalid {step:?} step for job {id} in phase {phase:?}")]
    InvalidTransition {
        id: JobId,
        phase: JobPhase,
        step: StepKind,
    },
    #[error("step accounting broken for job {id}: processed {processed} + remaining {remaining} != {expected}")]
    StepAccounting {
        id: JobId,
        processed: u32,
        remaining: u64,
        expected: u64,
    },
}

/// Lifecycle phase of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobPhase {
    /// Arrived (or evicted) and waiting for its prompt step.
    Waiting,
    /// Prompt processed, token steps outstanding.
    Running,
    /// All steps processed; resources released.
    Completed,
}

/// Immutable workload record for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub id: JobId,
    pub arrival_time: f64,
    pub input_size: u32,
    pub output_size: u32,
}

impl JobSpec {
    pub fn new(id: JobId, arrival_time: f64, input_size: u32, output_size: u32) -> Self {
        Self {
            id,
            arrival_time,
            input_size,
            output_size,
        }
    }
}

/// Result of applying one dispatched step to a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Prompt processed; the job is now running.
    Started,
    /// Token processed; more steps remain.
    Advanced,
    /// Last token processed.
    Completed,
    /// Token entry for a job evicted while its batch was in flight.
    Discarded,
}

/// Mutable simulation record of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub spec: JobSpec,
    pub phase: JobPhase,
    pub tokens_processed: u32,
    pub remaining_tokens: u64,
    /// Token steps processed since the prompt step.
    pub context_length: u32,
    pub start_time: Option<f64>,
    pub finish_time: Option<f64>,
    /// Times this job was evicted back to Waiting.
    pub evictions: u32,
}

impl Job {
    pub fn new(spec: JobSpec) -> Self {
        let remaining_tokens = spec.output_size as u64 + 1;
        Self {
            spec,
            phase: JobPhase::Waiting,
            tokens_processed: 0,
            remaining_tokens,
            context_length: 0,
            start_time: None,
            finish_time: None,
            evictions: 0,
        }
    }

    pub fn id(&self) -> JobId {
        self.spec.id
    }

    /// Memory held right now: `input_size + tokens_processed` while started
    /// and not completed, otherwise zero.
    pub fn footprint(&self) -> u64 {
        match self.phase {
            JobPhase::Running => self.spec.input_size as u64 + self.tokens_processed as u64,
            JobPhase::Waiting | JobPhase::Completed => 0,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.phase == JobPhase::Completed
    }

    /// End-to-end latency, if the job completed.
    pub fn latency(&self) -> Option<f64> {
        self.finish_time.map(|f| f - self.spec.arrival_time)
    }

    /// Whether `tokens_processed + remaining_tokens == output_size + 1`.
    pub fn check_step_accounting(&self) -> Result<(), JobError> {
        let expected = self.spec.output_size as u64 + 1;
        if self.tokens_processed as u64 + self.remaining_tokens == expected {
            Ok(())
        } else {
            Err(JobError::StepAccounting {
                id: self.id(),
                processed: self.tokens_processed,
                remaining: self.remaining_tokens,
                expected,
            })
        }
    }

    /// Apply one dispatched step at time `now`.
    pub fn apply_step(&mut self, step: StepKind, now: f64) -> Result<StepOutcome, JobError> {
        match (self.phase, step) {
            (JobPhase::Waiting, StepKind::Prompt) => {
                self.phase = JobPhase::Running;
                self.tokens_processed += 1;
                self.remaining_tokens -= 1;
                self.start_time = Some(now);
                self.context_length = 1;
                Ok(StepOutcome::Started)
            }
            (JobPhase::Running, StepKind::Token) => {
                self.tokens_processed += 1;
                self.remaining_tokens -= 1;
                if self.remaining_tokens == 0 {
                    self.phase = JobPhase::Completed;
                    self.finish_time = Some(now);
                    Ok(StepOutcome::Completed)
                } else {
                    self.context_length += 1;
                    Ok(StepOutcome::Advanced)
                }
            }
            (JobPhase::Waiting, StepKind::Token) if self.evictions > 0 => {
                Ok(StepOutcome::Discarded)
            }
            (phase, step) => Err(JobError::InvalidTransition {
                id: self.id(),
                phase,
                step,
            }),
        }
    }

    /// Revert a running job to Waiting, discarding all progress.
    pub fn evict(&mut self) -> Result<(), JobError> {
        if self.phase != JobPhase::Running {
            return Err(JobError::InvalidTransition {
                id: self.id(),
                phase: self.phase,
                step: StepKind::Token,
            });
        }
        self.phase = JobPhase::Waiting;
        self.tokens_processed = 0;
        self.remaining_tokens = self.spec.output_size as u64 + 1;
        self.start_time = None;
        self.context_length = 0;
        self.evictions += 1;
        Ok(())
    }

    /// Policy-facing view of this job.
    pub fn view(&self) -> JobView {
        JobView {
            id: self.spec.id,
            arrival_time: self.spec.arrival_time,
            input_size: self.spec.input_size,
            output_size: self.spec.output_size,
            tokens_processed: self.tokens_processed,
            context_length: self.context_length,
        }
    }
}
