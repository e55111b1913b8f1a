//! Interface to offline (hindsight) schedulers.
//!
//! An offline solver sees every arrival in advance and assigns each job a
//! start time so that the unit-time memory model never exceeds capacity.
//! This module defines the problem handed to such a solver, the assignment
//! it returns, and checks on that assignment. Solvers plug in through
//! [`HindsightSolver`]; the crate ships only the semi-online baseline.

use crate::job::JobSpec;
use crate::metrics::SimulationReport;
use batchsim_policies::{FeasibilityOracle, JobId, Span, UsagePoint};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

const LATENCY_TOLERANCE: f64 = 1e-6;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HindsightError {
    #[error("no start time assigned to job {0}")]
    MissingJob(JobId),
    #[error("job {id} starts at {start} before its arrival at {arrival}")]
    StartBeforeArrival { id: JobId, start: f64, arrival: f64 },
    #[error("job {0} cannot fit within capacity even alone")]
    Unschedulable(JobId),
    #[error("reported total latency {reported} does not match assignment total {computed}")]
    LatencyMismatch { reported: f64, computed: f64 },
    #[error("solver failed: {0}")]
    Solver(String),
}

/// Arrival and length of one job as seen by an offline solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HindsightJob {
    pub arrival_time: f64,
    pub length: u32,
}

/// Everything an offline solver needs: `{id -> (arrival, length)}`, the
/// per-job base cost `s` and the capacity `M`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HindsightProblem {
    pub jobs: BTreeMap<JobId, HindsightJob>,
    pub base_cost: f64,
    pub capacity: f64,
}

/// Start time per job plus the solver's total latency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub start_times: BTreeMap<JobId, f64>,
    pub total_latency: f64,
}

/// A solver for the offline problem.
pub trait HindsightSolver {
    /// Solve `problem`. `warm_start` is an optional initial assignment the
    /// solver may use as a starting point.
    fn solve(
        &self,
        problem: &HindsightProblem,
        warm_start: Option<&Assignment>,
    ) -> Result<Assignment, HindsightError>;

    fn name(&self) -> &str;
}

impl HindsightProblem {
    /// Export jobs with their output sizes as lengths.
    pub fn from_specs(specs: &[JobSpec], base_cost: f64, capacity: f64) -> Self {
        let jobs = specs
            .iter()
            .map(|spec| {
                (
                    spec.id,
                    HindsightJob {
                        arrival_time: spec.arrival_time,
                        length: spec.output_size,
                    },
                )
            })
            .collect();
        Self {
            jobs,
            base_cost,
            capacity,
        }
    }

    /// Sum of `start + length - arrival` over every job in `start_times`.
    pub fn total_latency(&self, start_times: &BTreeMap<JobId, f64>) -> Result<f64, HindsightError> {
        let mut total = 0.0;
        for (&id, job) in &self.jobs {
            let start = start_times
                .get(&id)
                .ok_or(HindsightError::MissingJob(id))?;
            total += start + job.length as f64 - job.arrival_time;
        }
        Ok(total)
    }

    /// Build an assignment whose total latency is computed from `start_times`.
    pub fn assignment(&self, start_times: BTreeMap<JobId, f64>) -> Result<Assignment, HindsightError> {
        let total_latency = self.total_latency(&start_times)?;
        Ok(Assignment {
            start_times,
            total_latency,
        })
    }

    /// Structural checks: every job assigned, no start before arrival, and a
    /// total latency consistent with the start times.
    pub fn verify(&self, assignment: &Assignment) -> Result<(), HindsightError> {
        for (&id, job) in &self.jobs {
            let start = *assignment
                .start_times
                .get(&id)
                .ok_or(HindsightError::MissingJob(id))?;
            if start < job.arrival_time {
                return Err(HindsightError::StartBeforeArrival {
                    id,
                    start,
                    arrival: job.arrival_time,
                });
            }
        }
        let computed = self.total_latency(&assignment.start_times)?;
        let tolerance = LATENCY_TOLERANCE * computed.abs().max(1.0);
        if (computed - assignment.total_latency).abs() > tolerance {
            return Err(HindsightError::LatencyMismatch {
                reported: assignment.total_latency,
                computed,
            });
        }
        Ok(())
    }

    /// Oracle spans of an assignment.
    pub fn spans(&self, assignment: &Assignment) -> Result<Vec<Span>, HindsightError> {
        self.jobs
            .iter()
            .map(|(&id, job)| {
                let start = assignment
                    .start_times
                    .get(&id)
                    .ok_or(HindsightError::MissingJob(id))?;
                Ok(Span::new(*start, job.length as f64, self.base_cost))
            })
            .collect()
    }

    /// Highest aggregate usage of an assignment over its critical points.
    pub fn peak_usage(&self, assignment: &Assignment) -> Result<Option<UsagePoint>, HindsightError> {
        let spans = self.spans(assignment)?;
        Ok(FeasibilityOracle::new(self.capacity).peak(&spans))
    }
}

/// Online result next to an offline assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HindsightComparison {
    pub policy: String,
    pub online_total_latency: f64,
    pub hindsight_total_latency: f64,
    /// Online over hindsight total latency; `None` when the latter is zero.
    pub ratio: Option<f64>,
    /// Jobs the online run left unfinished; their latency is missing from
    /// the online total.
    pub unfinished_jobs: usize,
}

/// Compare an online run with an offline assignment. Both totals must be in
/// the same time unit for the ratio to be meaningful.
pub fn compare_with_hindsight(
    report: &SimulationReport,
    assignment: &Assignment,
) -> HindsightComparison {
    let ratio = if assignment.total_latency > 0.0 {
        Some(report.total_latency / assignment.total_latency)
    } else {
        None
    };
    HindsightComparison {
        policy: report.policy.clone(),
        online_total_latency: report.total_latency,
        hindsight_total_latency: assignment.total_latency,
        ratio,
        unfinished_jobs: report.unfinished_jobs + report.stalled_jobs,
    }
}
