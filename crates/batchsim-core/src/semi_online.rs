//! Semi-online scheduler on a discrete unit-time axis.
//!
//! Time advances in whole steps `t = 0, 1, 2, ...`. At each step, jobs that
//! have arrived by `t` join the available list, jobs with `t >= p + o` leave
//! the ongoing set, and available jobs are admitted shortest-first with the
//! critical-point oracle until the first rejection. Admitted jobs start at
//! `t`. The result is an upper bound on the hindsight optimum and a warm
//! start for offline solvers.

use crate::hindsight::{Assignment, HindsightError, HindsightProblem, HindsightSolver};
use batchsim_policies::{FeasibilityOracle, JobId, Span};
use std::collections::BTreeMap;

/// Schedule every job of `problem` on the unit-time axis.
pub fn schedule_semi_online(problem: &HindsightProblem) -> Result<Assignment, HindsightError> {
    let oracle = FeasibilityOracle::new(problem.capacity);
    for (&id, job) in &problem.jobs {
        if problem.base_cost + job.length as f64 > problem.capacity {
            return Err(HindsightError::Unschedulable(id));
        }
    }

    let mut arrivals: Vec<(JobId, f64, u32)> = problem
        .jobs
        .iter()
        .map(|(&id, job)| (id, job.arrival_time, job.length))
        .collect();
    arrivals.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

    let mut next_arrival = 0;
    let mut available: Vec<(JobId, u32)> = Vec::new();
    let mut ongoing: BTreeMap<JobId, Span> = BTreeMap::new();
    let mut start_times: BTreeMap<JobId, f64> = BTreeMap::new();
    let mut t: u64 = 0;

    while next_arrival < arrivals.len() || !available.is_empty() || !ongoing.is_empty() {
        // Nothing to do until the next arrival.
        if available.is_empty() && ongoing.is_empty() {
            let arrival = arrivals[next_arrival].1;
            t = t.max(arrival.ceil() as u64);
        }
        let now = t as f64;

        while next_arrival < arrivals.len() && arrivals[next_arrival].1 <= now {
            let (id, _, length) = arrivals[next_arrival];
            available.push((id, length));
            next_arrival += 1;
        }
        ongoing.retain(|_, span| now < span.end());

        available.sort_by_key(|&(id, length)| (length, id));
        let mut committed: Vec<Span> = ongoing.values().copied().collect();
        let mut admitted = 0;
        for &(id, length) in &available {
            let span = Span::new(now, length as f64, problem.base_cost);
            if !oracle.admits(&committed, span) {
                break;
            }
            committed.push(span);
            ongoing.insert(id, span);
            start_times.insert(id, now);
            admitted += 1;
        }
        available.drain(..admitted);

        t += 1;
    }

    problem.assignment(start_times)
}

/// The semi-online scheduler exposed as an offline solver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SemiOnlineBaseline;

impl HindsightSolver for SemiOnlineBaseline {
    fn solve(
        &self,
        problem: &HindsightProblem,
        _warm_start: Option<&Assignment>,
    ) -> Result<Assignment, HindsightError> {
        schedule_semi_online(problem)
    }

    fn name(&self) -> &str {
        "semi_online"
    }
}
