//! Job arena with id-set pool membership.
//!
//! Every job lives exactly once in [`JobArena::jobs`]. Pool membership is
//! expressed only through id sets, so a job's state never diverges between
//! collections:
//!
//! - `waiting`: arrived, next step is the prompt step
//! - `ready`: running, next token step is immediately dispatchable
//! - `running`: started and not completed (superset of `ready`)
//! - `in_flight`: has an entry in the batch currently executing
//! - `completed`: terminal
//! - `stalled`: can never be admitted under the configured capacity
//!
//! Jobs loaded but not yet arrived belong to no pool.

use crate::job::{Job, JobError, JobPhase, JobSpec, StepOutcome};
use batchsim_policies::{BatchEntry, JobId, JobView};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default)]
pub struct JobArena {
    jobs: BTreeMap<JobId, Job>,
    waiting: BTreeSet<JobId>,
    ready: BTreeSet<JobId>,
    running: BTreeSet<JobId>,
    in_flight: BTreeSet<JobId>,
    completed: BTreeSet<JobId>,
    stalled: BTreeSet<JobId>,
}

impl JobArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job. It joins no pool until [`JobArena::admit_arrival`].
    pub fn insert(&mut self, spec: JobSpec) -> Result<(), JobError> {
        if self.jobs.contains_key(&spec.id) {
            return Err(JobError::DuplicateJob { id: spec.id });
        }
        self.jobs.insert(spec.id, Job::new(spec));
        Ok(())
    }

    pub fn get(&self, id: JobId) -> Result<&Job, JobError> {
        self.jobs.get(&id).ok_or(JobError::UnknownJob(id))
    }

    fn get_mut(&mut self, id: JobId) -> Result<&mut Job, JobError> {
        self.jobs.get_mut(&id).ok_or(JobError::UnknownJob(id))
    }

    /// All jobs, ordered by id.
    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Move an arrived job into the waiting pool.
    pub fn admit_arrival(&mut self, id: JobId) -> Result<(), JobError> {
        self.get(id)?;
        self.waiting.insert(id);
        Ok(())
    }

    /// Take the batch's jobs out of the dispatchable pools.
    pub fn dispatch(&mut self, entries: &[BatchEntry]) -> Result<(), JobError> {
        for entry in entries {
            self.get(entry.job_id)?;
            self.waiting.remove(&entry.job_id);
            self.ready.remove(&entry.job_id);
            self.in_flight.insert(entry.job_id);
        }
        Ok(())
    }

    /// Apply one completed batch entry at time `now` and update pools.
    pub fn apply_step(&mut self, entry: &BatchEntry, now: f64) -> Result<StepOutcome, JobError> {
        let id = entry.job_id;
        let job = self.get_mut(id)?;
        let outcome = job.apply_step(entry.kind, now)?;
        job.check_step_accounting()?;
        self.in_flight.remove(&id);

        match outcome {
            StepOutcome::Started => {
                self.running.insert(id);
                self.ready.insert(id);
            }
            StepOutcome::Advanced => {
                self.ready.insert(id);
            }
            StepOutcome::Completed => {
                self.running.remove(&id);
                self.completed.insert(id);
            }
            StepOutcome::Discarded => {}
        }
        Ok(outcome)
    }

    /// Return the jobs of an abandoned batch to the pools they came from.
    pub fn release_in_flight(&mut self, entries: &[BatchEntry]) -> Result<(), JobError> {
        for entry in entries {
            if !self.in_flight.remove(&entry.job_id) {
                continue;
            }
            match self.get(entry.job_id)?.phase {
                JobPhase::Waiting => {
                    self.waiting.insert(entry.job_id);
                }
                JobPhase::Running => {
                    self.ready.insert(entry.job_id);
                }
                JobPhase::Completed => {}
            }
        }
        Ok(())
    }

    /// Revert a running job to Waiting, discarding its progress.
    pub fn evict(&mut self, id: JobId) -> Result<(), JobError> {
        self.get_mut(id)?.evict()?;
        self.running.remove(&id);
        self.ready.remove(&id);
        self.waiting.insert(id);
        Ok(())
    }

    /// Move a waiting job that can never fit into the stalled pool.
    pub fn mark_stalled(&mut self, id: JobId) -> Result<bool, JobError> {
        self.get(id)?;
        if self.waiting.remove(&id) {
            self.stalled.insert(id);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Realized memory held by the running set.
    pub fn memory_in_use(&self) -> u64 {
        self.running
            .iter()
            .filter_map(|id| self.jobs.get(id))
            .map(Job::footprint)
            .sum()
    }

    /// Number of started, not completed jobs.
    pub fn active_count(&self) -> usize {
        self.running.len()
    }

    pub fn running_ids(&self) -> Vec<JobId> {
        self.running.iter().copied().collect()
    }

    pub fn waiting_count(&self) -> usize {
        self.waiting.len()
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    pub fn stalled_ids(&self) -> &BTreeSet<JobId> {
        &self.stalled
    }

    pub fn is_in_flight(&self, id: JobId) -> bool {
        self.in_flight.contains(&id)
    }

    /// Whether every loaded job is either completed or stalled.
    pub fn all_settled(&self) -> bool {
        self.completed.len() + self.stalled.len() == self.jobs.len()
    }

    pub fn waiting_views(&self) -> Vec<JobView> {
        self.views(&self.waiting)
    }

    pub fn ready_views(&self) -> Vec<JobView> {
        self.views(&self.ready)
    }

    pub fn running_views(&self) -> Vec<JobView> {
        self.views(&self.running)
    }

    fn views(&self, pool: &BTreeSet<JobId>) -> Vec<JobView> {
        pool.iter()
            .filter_map(|id| self.jobs.get(id))
            .map(Job::view)
            .collect()
    }
}
